//! Host registry
//!
//! Hosts are created once from the host list and mutated in place by fetch
//! tasks for the life of the process. Each entry has its own lock, so tasks
//! working on different hosts never contend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::model::{HostId, HostSpec, Metrics};
use crate::probe::ProbeResult;
use crate::severity::{Status, host_status};

/// Result of the most recent fetch attempt
#[derive(Clone, Debug, Default, PartialEq)]
pub enum FetchOutcome {
    /// Never fetched yet
    #[default]
    Pending,
    Succeeded,
    Failed { message: String },
}

#[derive(Clone, Debug)]
pub struct HostState {
    pub outcome: FetchOutcome,
    pub metrics: Metrics,
    pub status: Status,
}

impl HostState {
    pub fn got_result(&self) -> bool {
        self.outcome == FetchOutcome::Succeeded
    }

    pub fn last_error(&self) -> Option<&str> {
        match &self.outcome {
            FetchOutcome::Failed { message } => Some(message),
            _ => None,
        }
    }
}

/// Copy of a host's state taken under its lock
#[derive(Clone, Debug)]
pub struct HostSnapshot {
    pub spec: HostSpec,
    pub fetching: bool,
    pub state: HostState,
}

#[derive(Debug)]
pub struct HostEntry {
    pub spec: HostSpec,
    fetching: AtomicBool,
    state: Mutex<HostState>,
}

impl HostEntry {
    pub fn new(spec: HostSpec) -> Self {
        let metrics = Metrics::new(&spec.thresholds);
        Self {
            spec,
            fetching: AtomicBool::new(false),
            state: Mutex::new(HostState {
                outcome: FetchOutcome::Pending,
                metrics,
                status: Status::NONE,
            }),
        }
    }

    pub fn id(&self) -> &HostId {
        &self.spec.name
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching.load(Ordering::Acquire)
    }

    /// Claim the host for one fetch. Returns `None` if another fetch already
    /// owns it; the claim is released when the guard drops.
    pub fn begin_fetch(self: &Arc<Self>) -> Option<FetchGuard> {
        self.fetching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FetchGuard {
                entry: Arc::clone(self),
            })
    }

    pub fn record_success(&self, probe: &ProbeResult) {
        let mut state = self.lock();
        state.metrics.apply(probe);
        state.status = host_status(&state.metrics);
        state.outcome = FetchOutcome::Succeeded;
    }

    /// A failed fetch makes the host Unknown regardless of stale metrics
    pub fn record_failure(&self, message: impl Into<String>) {
        let mut state = self.lock();
        state.status = Status::UNKNOWN;
        state.outcome = FetchOutcome::Failed {
            message: message.into(),
        };
    }

    pub fn status(&self) -> Status {
        self.lock().status
    }

    pub fn snapshot(&self) -> HostSnapshot {
        HostSnapshot {
            spec: self.spec.clone(),
            fetching: self.is_fetching(),
            state: self.lock().clone(),
        }
    }
}

/// Exclusive claim on a host's fetch slot
#[derive(Debug)]
pub struct FetchGuard {
    entry: Arc<HostEntry>,
}

impl FetchGuard {
    pub fn entry(&self) -> &Arc<HostEntry> {
        &self.entry
    }
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        self.entry.fetching.store(false, Ordering::Release);
    }
}

/// All monitored hosts, keyed by name
#[derive(Debug, Default)]
pub struct Fleet {
    hosts: BTreeMap<HostId, Arc<HostEntry>>,
}

impl Fleet {
    pub fn new(specs: impl IntoIterator<Item = HostSpec>) -> Self {
        let hosts = specs
            .into_iter()
            .map(|spec| (spec.name.clone(), Arc::new(HostEntry::new(spec))))
            .collect();
        Self { hosts }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<HostEntry>> {
        self.hosts.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &HostId> {
        self.hosts.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<HostEntry>> {
        self.hosts.values()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::parse_probe;
    use crate::severity::Severity;

    fn fleet() -> Fleet {
        Fleet::new([
            HostSpec::new("web-1", "ops", "10.0.0.1"),
            HostSpec::new("db-1", "ops", "10.0.0.2"),
        ])
    }

    #[test]
    fn test_begin_fetch_is_exclusive() {
        let f = fleet();
        let entry = f.get("web-1").unwrap();
        let guard = entry.begin_fetch().expect("first claim");
        assert!(entry.is_fetching());
        assert!(entry.begin_fetch().is_none());
        drop(guard);
        assert!(!entry.is_fetching());
        assert!(entry.begin_fetch().is_some());
    }

    #[test]
    fn test_failure_is_exactly_unknown() {
        let f = fleet();
        let entry = f.get("db-1").unwrap();
        entry.record_success(&parse_probe(
            "9 9 9\n0.95\n10\n4\n/=99%\n/=10%\n100\n10\n",
        ));
        assert!(entry.status().contains(Severity::Error));

        entry.record_failure("connection refused");
        let snap = entry.snapshot();
        assert_eq!(snap.state.status, Status::UNKNOWN);
        assert!(!snap.state.got_result());
        assert_eq!(snap.state.last_error(), Some("connection refused"));
    }

    #[test]
    fn test_success_clears_error() {
        let f = fleet();
        let entry = f.get("web-1").unwrap();
        entry.record_failure("timeout");
        entry.record_success(&parse_probe("0.1 0.1 0.1\n0.2\n5\n4\n/=5%\n/=5%\n100\n1\n"));
        let snap = entry.snapshot();
        assert!(snap.state.got_result());
        assert_eq!(snap.state.last_error(), None);
        assert!(!snap.state.status.contains(Severity::Unknown));
        assert!(snap.state.status.contains(Severity::Ok));
    }

    #[test]
    fn test_fresh_host_has_no_status() {
        let f = fleet();
        let snap = f.get("web-1").unwrap().snapshot();
        assert_eq!(snap.state.outcome, FetchOutcome::Pending);
        assert_eq!(snap.state.status, Status::NONE);
        assert_eq!(f.len(), 2);
    }
}
