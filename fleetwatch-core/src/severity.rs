//! Severity classification
//!
//! Every tracked metric is judged against a warning and an error threshold.
//! A host's composite [`Status`] is the bitwise OR of the one [`Severity`]
//! each metric contributes, or exactly [`Severity::Unknown`] when the last
//! fetch failed.

use crate::model::{Measurement, MetricValue, Metrics};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Ok,
    Warning,
    Error,
    Unknown,
}

impl Severity {
    pub const fn bit(self) -> u8 {
        match self {
            Severity::Ok => 1,
            Severity::Warning => 1 << 1,
            Severity::Error => 1 << 2,
            Severity::Unknown => 1 << 3,
        }
    }
}

/// Bitmask of the severity levels present on a host.
///
/// Ordered by raw value, so a host with only an Error bit sorts behind one
/// with OK|Warning|Error but ahead of one with OK|Warning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Status(u8);

impl Status {
    pub const NONE: Status = Status(0);
    pub const UNKNOWN: Status = Status(Severity::Unknown.bit());

    pub fn from_bits(bits: u8) -> Self {
        Status(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn with(self, severity: Severity) -> Self {
        Status(self.0 | severity.bit())
    }

    pub fn contains(self, severity: Severity) -> bool {
        self.0 & severity.bit() != 0
    }

    pub fn is_unknown(self) -> bool {
        self == Status::UNKNOWN
    }

    /// Worst single level present, if any
    pub fn worst(self) -> Option<Severity> {
        [Severity::Unknown, Severity::Error, Severity::Warning, Severity::Ok]
            .into_iter()
            .find(|s| self.contains(*s))
    }
}

impl FromIterator<Severity> for Status {
    fn from_iter<I: IntoIterator<Item = Severity>>(iter: I) -> Self {
        iter.into_iter().fold(Status::NONE, Status::with)
    }
}

/// `value < warning` is OK, `warning <= value < error` is Warning, else Error.
pub fn classify(value: f64, warning: f64, error: f64) -> Severity {
    if value < warning {
        Severity::Ok
    } else if value < error {
        Severity::Warning
    } else {
        Severity::Error
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Load1,
    Load5,
    Load15,
    Cpu,
    Free,
    Storage,
    Inode,
    Conns,
    Uptime,
    Services,
}

const DAY_SECS: f64 = 24.0 * 60.0 * 60.0;

impl MetricKind {
    pub const ALL: [MetricKind; 10] = [
        MetricKind::Load1,
        MetricKind::Load5,
        MetricKind::Load15,
        MetricKind::Cpu,
        MetricKind::Free,
        MetricKind::Storage,
        MetricKind::Inode,
        MetricKind::Conns,
        MetricKind::Uptime,
        MetricKind::Services,
    ];

    /// Default (warning, error) thresholds; load and CPU scale with core count
    pub fn default_limits(self, nproc: i64) -> (f64, f64) {
        let cores = nproc as f64;
        match self {
            MetricKind::Load1 | MetricKind::Load5 | MetricKind::Load15 => (0.8 * cores, cores),
            MetricKind::Cpu => (80.0, 90.0),
            MetricKind::Free => (0.8, 0.9),
            MetricKind::Storage | MetricKind::Inode => (80.0, 90.0),
            MetricKind::Conns => (52429.0, 58982.0),
            MetricKind::Uptime => (90.0 * DAY_SECS, 100.0 * DAY_SECS),
            MetricKind::Services => (f64::INFINITY, f64::INFINITY),
        }
    }

    pub fn measurement(self, metrics: &Metrics) -> &Measurement {
        match self {
            MetricKind::Load1 => &metrics.load1,
            MetricKind::Load5 => &metrics.load5,
            MetricKind::Load15 => &metrics.load15,
            MetricKind::Cpu => &metrics.cpu,
            MetricKind::Free => &metrics.free,
            MetricKind::Storage => &metrics.storage,
            MetricKind::Inode => &metrics.inode,
            MetricKind::Conns => &metrics.conns,
            MetricKind::Uptime => &metrics.uptime,
            MetricKind::Services => &metrics.services,
        }
    }

    /// Effective thresholds: per-host override, else the metric default.
    ///
    /// CPU is reported on a 0..100×cores scale, so its thresholds are scaled
    /// by the core count whether overridden or not.
    pub fn limits(self, m: &Measurement, nproc: i64) -> (f64, f64) {
        let (dw, de) = self.default_limits(nproc);
        let warning = m.warning.unwrap_or(dw);
        let error = m.error.unwrap_or(de);
        match self {
            MetricKind::Cpu => (warning * nproc as f64, error * nproc as f64),
            _ => (warning, error),
        }
    }

    /// The single severity this metric contributes to the host status
    pub fn classify(self, metrics: &Metrics) -> Severity {
        let m = self.measurement(metrics);
        let (warning, error) = self.limits(m, metrics.nproc);
        match self {
            MetricKind::Storage | MetricKind::Inode => m
                .value
                .devices()
                .iter()
                .map(|d| classify(d.percent as f64, warning, error))
                .max_by_key(|s| s.bit())
                .unwrap_or(Severity::Ok),
            MetricKind::Services => match &m.value {
                MetricValue::ServiceTally(t) if t.critical() > 0 => Severity::Error,
                MetricValue::ServiceTally(t) if t.warning() > 0 || t.unknown() > 0 => {
                    Severity::Warning
                }
                _ => Severity::Ok,
            },
            _ => match m.value.as_f64() {
                Some(v) => classify(v, warning, error),
                None => Severity::Ok,
            },
        }
    }
}

/// Composite status of a host whose last fetch succeeded
pub fn host_status(metrics: &Metrics) -> Status {
    MetricKind::ALL.iter().map(|k| k.classify(metrics)).collect()
}
