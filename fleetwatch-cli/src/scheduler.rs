//! Fetch scheduler
//!
//! Every fetch runs in its own task. A host is never fetched twice at once,
//! fleet refreshes never overlap, and sessions are cached per host between
//! fetches. A timed-out probe or a probe that exits non-zero keeps its
//! session; a network failure closes it so the next fetch redials.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Local;
use rand::seq::SliceRandom;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use fleetwatch_core::executor::{RemoteExecutor, TransportError};
use fleetwatch_core::fleet::FetchGuard;
use fleetwatch_core::model::{HostId, HostSpec};
use fleetwatch_core::probe::{parse_probe, probe_command};

use crate::dashboard::Dashboard;

const MIN_STAGGER: Duration = Duration::from_millis(100);

pub struct Scheduler<E: RemoteExecutor> {
    executor: E,
    dashboard: Arc<Dashboard>,
    sessions: Mutex<HashMap<HostId, E::Session>>,
    refreshing: AtomicBool,
    timeout: Duration,
    probe: String,
}

impl<E: RemoteExecutor> Scheduler<E> {
    pub fn new(executor: E, dashboard: Arc<Dashboard>, timeout: Duration) -> Self {
        Self {
            executor,
            dashboard,
            sessions: Mutex::new(HashMap::new()),
            refreshing: AtomicBool::new(false),
            timeout,
            probe: probe_command(),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<HostId, E::Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Fetch one host unless it is already being fetched. The host is
    /// claimed before this returns.
    pub fn fetch_one(self: &Arc<Self>, id: &str, force: bool) -> Option<JoinHandle<()>> {
        let guard = self.dashboard.fleet.get(id)?.begin_fetch()?;
        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.run_fetch(guard, force).await }))
    }

    /// Fetch every host not already in flight, unless a fleet refresh is
    /// still outstanding. Returns whether a refresh was started.
    pub fn request_fleet_refresh(self: &Arc<Self>, force: bool) -> bool {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("fleet refresh already running");
            return false;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.fetch_all(force).await;
            this.refreshing.store(false, Ordering::Release);
            this.dashboard.request_redraw();
        });
        true
    }

    async fn fetch_all(self: &Arc<Self>, force: bool) {
        let mut tasks = JoinSet::new();
        for entry in self.dashboard.fleet.iter() {
            let Some(guard) = entry.begin_fetch() else {
                continue;
            };
            let this = Arc::clone(self);
            tasks.spawn(async move { this.run_fetch(guard, force).await });
        }
        info!(hosts = tasks.len(), force, "fleet refresh started");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "fetch task aborted");
            }
        }
        debug!("fleet refresh finished");
    }

    async fn run_fetch(&self, guard: FetchGuard, force: bool) {
        let entry = Arc::clone(guard.entry());
        let id = entry.id().clone();
        self.dashboard.mark_fetched(Local::now());
        self.dashboard.request_redraw();
        debug!(host = %id, force, "fetch started");

        match self.probe_host(&entry.spec, force).await {
            Ok(output) => {
                entry.record_success(&parse_probe(&output));
                debug!(host = %id, status = entry.status().bits(), "fetch finished");
            }
            Err(e) if e.is_timeout() => {
                info!(host = %id, "fetch timed out");
                entry.record_failure(e.to_string());
            }
            Err(e) => {
                warn!(host = %id, error = %e, "fetch failed");
                entry.record_failure(e.to_string());
            }
        }

        self.dashboard.format_host(&id);
        self.dashboard.request_resort();
        drop(guard);
        self.dashboard.request_redraw();
    }

    async fn probe_host(&self, spec: &HostSpec, force: bool) -> Result<String, TransportError> {
        let cached = self.sessions().remove(&spec.name);
        let session = match cached {
            Some(session) if !force => session,
            stale => {
                if let Some(old) = stale {
                    self.executor.close(old).await;
                }
                debug!(host = %spec.name, executor = self.executor.name(), "dialing");
                self.with_timeout(self.executor.dial(&spec.target())).await?
            }
        };

        let result = self
            .with_timeout(self.executor.run(&session, &self.probe))
            .await;
        match &result {
            Err(e) if !e.keeps_session() => self.executor.close(session).await,
            _ => {
                self.sessions().insert(spec.name.clone(), session);
            }
        }
        result
    }

    async fn with_timeout<T>(
        &self,
        operation: impl Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        tokio::time::timeout(self.timeout, operation)
            .await
            .unwrap_or(Err(TransportError::Timeout(self.timeout)))
    }

    /// Fetch one random host every `period / hosts`, so the whole fleet is
    /// covered about once per period. Skipped while a fleet refresh runs.
    pub async fn stagger(self: Arc<Self>, period: Duration) {
        let ids: Vec<HostId> = self.dashboard.fleet.ids().cloned().collect();
        let Ok(count) = u32::try_from(ids.len()) else {
            return;
        };
        if count == 0 {
            return;
        }
        let pause = (period / count).max(MIN_STAGGER);
        loop {
            tokio::time::sleep(pause).await;
            if self.is_refreshing() {
                continue;
            }
            let pick = ids.choose(&mut rand::thread_rng()).cloned();
            if let Some(id) = pick {
                self.fetch_one(&id, false);
            }
        }
    }

    /// Close every cached session
    pub async fn close_all(&self) {
        let sessions: Vec<E::Session> = self.sessions().drain().map(|(_, s)| s).collect();
        info!(count = sessions.len(), "closing sessions");
        for session in sessions {
            self.executor.close(session).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;
    use fleetwatch_core::fleet::Fleet;
    use fleetwatch_core::model::ConnectTarget;
    use fleetwatch_core::severity::{Severity, Status};

    use crate::dashboard::Signals;

    const OK: &str = "0.1 0.1 0.1\n0.2\n5\n4\n/=5%\n/=5%\n100\n1\n";

    enum Outcome {
        Output(&'static str),
        Reset,
        ExitStatus,
        Timeout,
        Hang,
    }

    #[derive(Default)]
    struct MockExecutor {
        dials: AtomicU32,
        runs: AtomicU32,
        closed: Mutex<Vec<u32>>,
        script: Mutex<VecDeque<Outcome>>,
    }

    impl MockExecutor {
        fn closed(&self) -> Vec<u32> {
            self.closed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteExecutor for MockExecutor {
        type Session = u32;

        fn name(&self) -> &'static str {
            "mock"
        }

        async fn dial(&self, _target: &ConnectTarget) -> Result<u32, TransportError> {
            Ok(self.dials.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn run(&self, _session: &u32, _command: &str) -> Result<String, TransportError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next.unwrap_or(Outcome::Output(OK)) {
                Outcome::Output(out) => Ok(out.to_string()),
                Outcome::Reset => Err(TransportError::Connection("connection reset by peer".into())),
                Outcome::ExitStatus => Err(TransportError::Exec(
                    "exit status: 127: sh: netstat: not found".into(),
                )),
                Outcome::Timeout => Err(TransportError::Timeout(Duration::from_secs(1))),
                Outcome::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(OK.to_string())
                }
            }
        }

        async fn close(&self, session: u32) {
            self.closed.lock().unwrap().push(session);
        }
    }

    fn scheduler(script: Vec<Outcome>) -> (Arc<Scheduler<MockExecutor>>, Signals) {
        let (dashboard, signals) = Dashboard::new(Fleet::new([
            HostSpec::new("web-1", "ops", "10.0.0.1"),
            HostSpec::new("db-1", "ops", "10.0.0.2"),
        ]));
        let executor = MockExecutor {
            script: Mutex::new(script.into()),
            ..Default::default()
        };
        let s = Arc::new(Scheduler::new(executor, dashboard, Duration::from_secs(1)));
        (s, signals)
    }

    fn status(s: &Scheduler<MockExecutor>, id: &str) -> Status {
        s.dashboard.fleet.get(id).unwrap().status()
    }

    #[tokio::test]
    async fn test_success_formats_row_and_requests_resort() {
        let (s, mut signals) = scheduler(vec![]);
        signals.redraw.try_wait();

        assert!(s.dashboard.fetched_at().is_none());
        s.fetch_one("web-1", false).unwrap().await.unwrap();
        assert!(s.dashboard.fetched_at().is_some());
        assert!(status(&s, "web-1").contains(Severity::Ok));
        assert_eq!(s.dashboard.grid.row("web-1").unwrap()[1].text(), "0.10");
        assert!(signals.resort.try_wait());
        assert!(signals.redraw.try_wait());
        assert!(!s.dashboard.fleet.get("web-1").unwrap().is_fetching());

        s.fetch_one("web-1", false).unwrap().await.unwrap();
        assert_eq!(s.executor.dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_host_is_not_fetched_twice() {
        let (s, _signals) = scheduler(vec![Outcome::Hang]);
        let first = s.fetch_one("web-1", false).unwrap();
        assert!(s.dashboard.fleet.get("web-1").unwrap().is_fetching());
        assert!(s.fetch_one("web-1", false).is_none());

        first.await.unwrap();
        assert_eq!(status(&s, "web-1"), Status::UNKNOWN);
        assert_eq!(s.executor.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_session() {
        let (s, _signals) = scheduler(vec![Outcome::Hang, Outcome::Timeout]);
        s.fetch_one("web-1", false).unwrap().await.unwrap();
        s.fetch_one("web-1", false).unwrap().await.unwrap();
        assert!(status(&s, "web-1").is_unknown());
        assert!(s.executor.closed().is_empty());

        s.fetch_one("web-1", false).unwrap().await.unwrap();
        assert_eq!(s.executor.dials.load(Ordering::SeqCst), 1);
        assert!(status(&s, "web-1").contains(Severity::Ok));
    }

    #[tokio::test]
    async fn test_network_errors_drop_session() {
        let (s, _signals) = scheduler(vec![Outcome::Reset]);
        s.fetch_one("db-1", false).unwrap().await.unwrap();
        assert_eq!(status(&s, "db-1"), Status::UNKNOWN);
        assert_eq!(s.executor.closed(), vec![1]);
        assert_eq!(
            s.dashboard.grid.error("db-1").as_deref(),
            Some("connection lost: connection reset by peer")
        );

        s.fetch_one("db-1", false).unwrap().await.unwrap();
        assert_eq!(s.executor.dials.load(Ordering::SeqCst), 2);
        assert_eq!(s.dashboard.grid.error("db-1"), None);
    }

    #[tokio::test]
    async fn test_failing_command_keeps_session() {
        let (s, _signals) = scheduler(vec![
            Outcome::ExitStatus,
            Outcome::ExitStatus,
            Outcome::ExitStatus,
        ]);
        for _ in 0..3 {
            s.fetch_one("web-1", false).unwrap().await.unwrap();
            assert_eq!(status(&s, "web-1"), Status::UNKNOWN);
        }
        assert_eq!(s.executor.dials.load(Ordering::SeqCst), 1);
        assert!(s.executor.closed().is_empty());
        assert_eq!(
            s.dashboard.grid.error("web-1").as_deref(),
            Some("remote command failed: exit status: 127: sh: netstat: not found")
        );

        s.fetch_one("web-1", false).unwrap().await.unwrap();
        assert!(status(&s, "web-1").contains(Severity::Ok));
        assert_eq!(s.executor.dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_reconnect_redials() {
        let (s, _signals) = scheduler(vec![]);
        s.fetch_one("web-1", false).unwrap().await.unwrap();
        s.fetch_one("web-1", true).unwrap().await.unwrap();
        assert_eq!(s.executor.closed(), vec![1]);
        assert_eq!(s.executor.dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fleet_refresh_does_not_overlap() {
        let (s, _signals) = scheduler(vec![]);
        assert!(s.request_fleet_refresh(false));
        assert!(!s.request_fleet_refresh(false));
        while s.is_refreshing() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(s.dashboard.fetched_at().is_some());
        assert!(status(&s, "web-1").contains(Severity::Ok));
        assert!(status(&s, "db-1").contains(Severity::Ok));
        assert!(s.request_fleet_refresh(false));
    }

    #[tokio::test]
    async fn test_close_all_closes_cached_sessions() {
        let (s, _signals) = scheduler(vec![]);
        s.fetch_one("web-1", false).unwrap().await.unwrap();
        s.fetch_one("db-1", false).unwrap().await.unwrap();
        s.close_all().await;
        let mut closed = s.executor.closed();
        closed.sort();
        assert_eq!(closed, vec![1, 2]);
    }
}
