//! State shared by the fetch tasks, the two coordinators and the command loop

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Local};

use fleetwatch_core::coalesce::{CoalesceReceiver, CoalesceSender, coalescer};
use fleetwatch_core::fleet::Fleet;
use fleetwatch_core::model::HostId;
use fleetwatch_core::ordering::RowOrder;
use fleetwatch_core::search;

use crate::ui::grid::RenderGrid;
use crate::ui::view::ViewState;

/// Consumer ends of the two coalescing queues
pub struct Signals {
    pub resort: CoalesceReceiver,
    pub redraw: CoalesceReceiver,
}

pub struct Dashboard {
    pub fleet: Fleet,
    pub grid: RenderGrid,
    order: RwLock<RowOrder>,
    view: Mutex<ViewState>,
    fetched_at: Mutex<Option<DateTime<Local>>>,
    resort_tx: CoalesceSender,
    redraw_tx: CoalesceSender,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Dashboard {
    pub fn new(fleet: Fleet) -> (Arc<Self>, Signals) {
        let (resort_tx, resort) = coalescer();
        let (redraw_tx, redraw) = coalescer();
        let dashboard = Arc::new(Self {
            grid: RenderGrid::new(fleet.ids()),
            order: RwLock::new(RowOrder::new(&fleet)),
            fleet,
            view: Mutex::new(ViewState::default()),
            fetched_at: Mutex::new(None),
            resort_tx,
            redraw_tx,
        });
        dashboard.format_all();
        (dashboard, Signals { resort, redraw })
    }

    pub fn request_resort(&self) {
        self.resort_tx.request();
    }

    pub fn request_redraw(&self) {
        self.redraw_tx.request();
    }

    /// Reformat one host's row; a column that grew shifts every row, so
    /// that case asks for a redraw
    pub fn format_host(&self, id: &str) {
        let Some(entry) = self.fleet.get(id) else {
            return;
        };
        if self.grid.format_host(&entry.snapshot()) {
            self.request_redraw();
        }
    }

    /// Reformat every row, after a display toggle
    pub fn format_all(&self) {
        let mut grew = false;
        for entry in self.fleet.iter() {
            grew |= self.grid.format_host(&entry.snapshot());
        }
        if grew {
            self.request_redraw();
        }
    }

    /// Recompute the row order from current statuses, keeping the selection
    /// on the host it was on. Only the resort consumer calls this.
    pub fn resort(&self) {
        let mut view = self.view();
        let selected = self.visible_rows(view.search()).get(view.selected).cloned();
        {
            let mut order = self.order.write().unwrap_or_else(PoisonError::into_inner);
            order.resort(&self.fleet);
            let moved_to = selected.and_then(|id| match view.search() {
                None => order.position(&id),
                Some(needle) => search::filter(order.keys(), needle, |id| self.identity(id))
                    .iter()
                    .position(|k| *k == id),
            });
            if let Some(row) = moved_to {
                view.selected = row;
            }
        }
        drop(view);
        self.request_redraw();
    }

    pub fn order(&self) -> Vec<HostId> {
        self.order
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .to_vec()
    }

    /// Label shown in the identity column for `id`
    pub fn identity(&self, id: &str) -> Option<String> {
        let show_address = self.grid.shows_address();
        self.fleet
            .get(id)
            .map(|e| e.spec.identity(show_address).to_string())
    }

    /// Rows in display order, restricted to search matches when searching
    pub fn visible_rows(&self, search: Option<&str>) -> Vec<HostId> {
        let order = self.order();
        match search {
            Some(needle) => search::filter(&order, needle, |id| self.identity(id)),
            None => order,
        }
    }

    pub fn view(&self) -> MutexGuard<'_, ViewState> {
        lock(&self.view)
    }

    /// Clamp the selection into the current row set and return that set
    pub fn settle_view(&self, page: usize) -> (ViewState, Vec<HostId>) {
        let mut view = self.view();
        let rows = self.visible_rows(view.search());
        view.clamp(rows.len(), page);
        (view.clone(), rows)
    }

    pub fn mark_fetched(&self, at: DateTime<Local>) {
        *lock(&self.fetched_at) = Some(at);
    }

    pub fn fetched_at(&self) -> Option<DateTime<Local>> {
        *lock(&self.fetched_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetwatch_core::model::HostSpec;
    use fleetwatch_core::probe::parse_probe;

    const ERR: &str = "0.1 0.1 0.1\n0.95\n5\n4\n/=5%\n/=5%\n100\n1\n";

    fn dashboard() -> (Arc<Dashboard>, Signals) {
        Dashboard::new(Fleet::new([
            HostSpec::new("web-1", "ops", "10.0.0.1"),
            HostSpec::new("web-2", "ops", "10.0.0.2"),
            HostSpec::new("db-1", "ops", "10.0.1.1"),
        ]))
    }

    #[test]
    fn test_new_formats_rows_and_signals_redraw() {
        let (d, mut signals) = dashboard();
        assert!(d.grid.row("db-1").is_some());
        assert!(signals.redraw.try_wait());
        assert!(!signals.resort.try_wait());
    }

    #[test]
    fn test_resort_always_requests_redraw() {
        let (d, mut signals) = dashboard();
        signals.redraw.try_wait();

        d.fleet.get("web-2").unwrap().record_success(&parse_probe(ERR));
        d.resort();
        assert_eq!(d.order()[0], "web-2");
        assert!(signals.redraw.try_wait());
    }

    #[test]
    fn test_selection_follows_host_across_resort() {
        let (d, _signals) = dashboard();
        // name order: db-1, web-1, web-2
        d.view().selected = 2;
        d.fleet.get("web-2").unwrap().record_success(&parse_probe(ERR));
        d.resort();
        assert_eq!(d.order(), vec!["web-2", "db-1", "web-1"]);
        assert_eq!(d.view().selected, 0);

        {
            let mut view = d.view();
            view.start_search();
            view.push_search('w');
            view.selected = 1;
        }
        d.fleet.get("web-2").unwrap().record_failure("refused");
        d.fleet.get("web-1").unwrap().record_failure("refused");
        d.resort();
        // both Unknown now, so name order puts web-1 first among matches
        assert_eq!(d.visible_rows(Some("w")), vec!["web-1", "web-2"]);
        assert_eq!(d.view().selected, 0);
    }

    #[test]
    fn test_search_filters_visible_rows() {
        let (d, _signals) = dashboard();
        assert_eq!(d.visible_rows(Some("WEB")), vec!["web-1", "web-2"]);
        assert_eq!(d.visible_rows(Some("web-2")), vec!["web-2"]);
        assert_eq!(d.visible_rows(None).len(), 3);

        d.grid.toggle_show_address();
        assert_eq!(d.visible_rows(Some("10.0.1")), vec!["db-1"]);
    }

    #[test]
    fn test_settle_view_clamps_to_matches() {
        let (d, _signals) = dashboard();
        {
            let mut view = d.view();
            view.end(3, 10);
            view.start_search();
            view.push_search('d');
            view.selected = 2;
        }
        let (view, rows) = d.settle_view(10);
        assert_eq!(rows, vec!["db-1"]);
        assert_eq!(view.selected, 0);
    }
}
