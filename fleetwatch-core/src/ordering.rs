use std::cmp::Ordering;
use std::collections::HashMap;

use crate::fleet::Fleet;
use crate::model::HostId;
use crate::severity::Status;

/// Status descending, then name ascending ignoring case.
pub fn compare(a: (Status, &str), b: (Status, &str)) -> Ordering {
    b.0.cmp(&a.0)
        .then_with(|| a.1.to_lowercase().cmp(&b.1.to_lowercase()))
        .then_with(|| a.1.cmp(b.1))
}

/// Display order of hosts plus an id → row index map
#[derive(Clone, Debug, Default)]
pub struct RowOrder {
    keys: Vec<HostId>,
    index: HashMap<HostId, usize>,
}

impl RowOrder {
    pub fn new(fleet: &Fleet) -> Self {
        let mut order = Self {
            keys: fleet.ids().cloned().collect(),
            index: HashMap::new(),
        };
        order.resort(fleet);
        order
    }

    /// Rebuild the order from the current host statuses
    pub fn resort(&mut self, fleet: &Fleet) {
        let mut rows: Vec<(Status, HostId)> = self
            .keys
            .drain(..)
            .map(|id| {
                let status = fleet.get(&id).map(|h| h.status()).unwrap_or_default();
                (status, id)
            })
            .collect();
        rows.sort_by(|a, b| compare((a.0, &a.1), (b.0, &b.1)));
        self.keys = rows.into_iter().map(|(_, id)| id).collect();
        self.index = self
            .keys
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
    }

    pub fn keys(&self) -> &[HostId] {
        &self.keys
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HostSpec;
    use crate::probe::parse_probe;
    use crate::severity::Severity;

    const OK: &str = "0.1 0.1 0.1\n0.2\n5\n4\n/=5%\n/=5%\n100\n1\n";
    const WARN: &str = "0.1 0.1 0.1\n0.85\n5\n4\n/=5%\n/=5%\n100\n1\n";
    const ERR: &str = "0.1 0.1 0.1\n0.95\n5\n4\n/=5%\n/=5%\n100\n1\n";

    fn fleet(names: &[&str]) -> Fleet {
        Fleet::new(names.iter().map(|n| HostSpec::new(*n, "ops", format!("{}.lan", n))))
    }

    #[test]
    fn test_name_order_case_insensitive() {
        let f = fleet(&["beta", "Alpha", "gamma", "ALPHA2"]);
        let order = RowOrder::new(&f);
        assert_eq!(order.keys(), ["Alpha", "ALPHA2", "beta", "gamma"]);
        assert_eq!(order.position("beta"), Some(2));
    }

    #[test]
    fn test_higher_status_first() {
        let f = fleet(&["a", "b", "c", "d"]);
        f.get("a").unwrap().record_success(&parse_probe(OK));
        f.get("b").unwrap().record_success(&parse_probe(ERR));
        f.get("c").unwrap().record_failure("refused");
        f.get("d").unwrap().record_success(&parse_probe(WARN));

        let order = RowOrder::new(&f);
        assert_eq!(order.keys(), ["c", "b", "d", "a"]);

        let statuses: Vec<Status> = order
            .keys()
            .iter()
            .map(|k| f.get(k).unwrap().status())
            .collect();
        for pair in statuses.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        assert!(statuses[0].contains(Severity::Unknown));
    }

    #[test]
    fn test_resort_updates_index() {
        let f = fleet(&["x", "y"]);
        let mut order = RowOrder::new(&f);
        assert_eq!(order.position("x"), Some(0));

        f.get("y").unwrap().record_success(&parse_probe(ERR));
        f.get("x").unwrap().record_success(&parse_probe(OK));
        order.resort(&f);
        assert_eq!(order.position("y"), Some(0));
        assert_eq!(order.position("x"), Some(1));
        assert_eq!(order.len(), 2);
    }
}
