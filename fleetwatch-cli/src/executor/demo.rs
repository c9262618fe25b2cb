use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;

use fleetwatch_core::executor::{RemoteExecutor, TransportError};
use fleetwatch_core::model::ConnectTarget;

/// Executor that fabricates probe output, for trying the dashboard without
/// a fleet. Some dials are refused and some probes hang until the caller's
/// timeout fires.
pub struct DemoExecutor {
    latency: (Duration, Duration),
    dial_failure: f64,
    stall: f64,
    stall_for: Duration,
}

pub struct DemoSession {
    destination: String,
    nproc: u32,
    booted_secs_ago: i64,
    dialed_at: Instant,
}

impl DemoExecutor {
    pub fn new() -> Self {
        Self {
            latency: (Duration::from_millis(150), Duration::from_millis(1200)),
            dial_failure: 0.05,
            stall: 0.03,
            stall_for: Duration::from_secs(3600),
        }
    }

    #[cfg(test)]
    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.latency = (min, max.max(min));
        self
    }

    #[cfg(test)]
    pub fn with_failure_rates(mut self, dial_failure: f64, stall: f64) -> Self {
        self.dial_failure = dial_failure.clamp(0.0, 1.0);
        self.stall = stall.clamp(0.0, 1.0);
        self
    }

    fn pick_latency(&self) -> Duration {
        let (min, max) = self.latency;
        if max <= min {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }

    fn roll(&self, probability: f64) -> bool {
        rand::thread_rng().gen_bool(probability)
    }
}

impl Default for DemoExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn devices(rng: &mut impl Rng, mounts: &[&str], hot: f64) -> String {
    let mut line = String::new();
    for mount in mounts {
        let percent = if rng.gen_bool(hot) {
            rng.gen_range(80..=99)
        } else {
            rng.gen_range(3..=70)
        };
        line.push_str(&format!("{}={}% ", mount, percent));
    }
    line
}

fn services(rng: &mut impl Rng) -> String {
    if rng.gen_bool(0.3) {
        return String::new();
    }
    let checks: Vec<String> = (0..rng.gen_range(1..=5))
        .map(|_| {
            let status = match rng.gen_range(0..100) {
                0..=84 => "passing",
                85..=91 => "warning",
                92..=95 => "unknown",
                _ => "critical",
            };
            format!("{{\"Status\":\"{}\"}}", status)
        })
        .collect();
    format!("[{}]", checks.join(","))
}

/// Output in the probe's line format
fn sample(session: &DemoSession) -> String {
    let mut rng = rand::thread_rng();
    let cores = f64::from(session.nproc);
    let busy = if rng.gen_bool(0.1) { 1.2 } else { 0.4 };
    let load1 = cores * rng.gen_range(0.0..busy);
    let load5 = (load1 * rng.gen_range(0.7..1.1)).max(0.0);
    let load15 = (load5 * rng.gen_range(0.7..1.1)).max(0.0);
    let uptime = session.booted_secs_ago + session.dialed_at.elapsed().as_secs() as i64;

    format!(
        "{:.2} {:.2} {:.2}\n{:.3}\n{}\n{}\n{}\n{}\n{}\n{:.1}\n{}\n",
        load1,
        load5,
        load15,
        rng.gen_range(0.15..0.97),
        rng.gen_range(20..4000),
        session.nproc,
        devices(&mut rng, &["/", "/boot", "/var"], 0.08),
        devices(&mut rng, &["/", "/boot", "/var"], 0.02),
        uptime,
        rng.gen_range(0.0..95.0) * cores,
        services(&mut rng),
    )
}

fn new_session(target: &ConnectTarget) -> DemoSession {
    let mut rng = rand::thread_rng();
    let booted_secs_ago = if rng.gen_bool(0.1) {
        rng.gen_range(5..3000)
    } else {
        rng.gen_range(1..120) * 86_400
    };
    DemoSession {
        destination: target.destination(),
        nproc: [2, 4, 8, 16][rng.gen_range(0..4)],
        booted_secs_ago,
        dialed_at: Instant::now(),
    }
}

#[async_trait]
impl RemoteExecutor for DemoExecutor {
    type Session = DemoSession;

    fn name(&self) -> &'static str {
        "demo"
    }

    async fn dial(&self, target: &ConnectTarget) -> Result<DemoSession, TransportError> {
        tokio::time::sleep(self.pick_latency()).await;
        if self.roll(self.dial_failure) {
            return Err(TransportError::Dial {
                destination: target.destination(),
                message: "connection refused".into(),
            });
        }
        Ok(new_session(target))
    }

    async fn run(&self, session: &DemoSession, _command: &str) -> Result<String, TransportError> {
        let delay = if self.roll(self.stall) {
            self.stall_for
        } else {
            self.pick_latency()
        };
        tokio::time::sleep(delay).await;
        tracing::trace!(destination = %session.destination, "demo probe answered");
        Ok(sample(session))
    }
}
