use serde::{Deserialize, Deserializer, Serialize};

pub type HostId = String;

/// Sentinel used for any probe field that could not be parsed.
pub const UNAVAILABLE: f64 = -1.0;

/// Where and as whom to connect for a host.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectTarget {
    pub user: String,
    pub address: String,
    pub port: u16,
}

impl ConnectTarget {
    /// `user@address`, the ssh destination form
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }
}

/// Optional per-host overrides for a metric's thresholds
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default)]
    pub warning: Option<f64>,
    #[serde(default)]
    pub error: Option<f64>,
}

/// Threshold overrides for every tracked metric of a host
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default)]
    pub load1: Limits,
    #[serde(default)]
    pub load5: Limits,
    #[serde(default)]
    pub load15: Limits,
    #[serde(default)]
    pub cpu: Limits,
    #[serde(default)]
    pub free: Limits,
    #[serde(default)]
    pub storage: Limits,
    #[serde(default)]
    pub inode: Limits,
    #[serde(default)]
    pub conns: Limits,
    #[serde(default)]
    pub uptime: Limits,
}

/// One monitored host as described by the host list
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostSpec {
    pub name: HostId,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(rename = "host")]
    pub address: String,
    #[serde(default = "default_port", deserialize_with = "deserialize_port")]
    pub port: u16,
    #[serde(flatten)]
    pub thresholds: Thresholds,
}

fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "root".into())
}

fn default_port() -> u16 {
    22
}

/// Ports show up both as `"22"` and `22` in host lists.
fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(p) => Ok(p),
        Port::Text(s) if s.trim().is_empty() => Ok(default_port()),
        Port::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {}", s))),
    }
}

impl HostSpec {
    pub fn new(name: impl Into<String>, user: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user: user.into(),
            address: address.into(),
            port: default_port(),
            thresholds: Thresholds::default(),
        }
    }

    pub fn target(&self) -> ConnectTarget {
        ConnectTarget {
            user: self.user.clone(),
            address: self.address.clone(),
            port: self.port,
        }
    }

    /// The label shown in the identity column
    pub fn identity(&self, show_address: bool) -> &str {
        if show_address { &self.address } else { &self.name }
    }
}

/// Usage of one mounted filesystem, in percent
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceUsage {
    pub device: String,
    pub percent: i64,
}

/// Tally of service-health checks: passing, unknown, warning, critical
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServiceTally(pub [u32; 4]);

impl ServiceTally {
    pub fn passing(&self) -> u32 {
        self.0[0]
    }
    pub fn unknown(&self) -> u32 {
        self.0[1]
    }
    pub fn warning(&self) -> u32 {
        self.0[2]
    }
    pub fn critical(&self) -> u32 {
        self.0[3]
    }
    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }
}

/// The value half of a measurement
#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    Scalar(f64),
    Int(i64),
    Vector(Vec<DeviceUsage>),
    ServiceTally(ServiceTally),
}

impl MetricValue {
    /// Numeric view of scalar-like values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Scalar(v) => Some(*v),
            MetricValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn devices(&self) -> &[DeviceUsage] {
        match self {
            MetricValue::Vector(d) => d,
            _ => &[],
        }
    }

    /// Highest device percentage, or the sentinel when there are none
    pub fn worst_device(&self) -> i64 {
        self.devices()
            .iter()
            .map(|d| d.percent)
            .max()
            .unwrap_or(UNAVAILABLE as i64)
    }
}

/// A value plus the thresholds it is judged against
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub value: MetricValue,
    pub warning: Option<f64>,
    pub error: Option<f64>,
}

impl Measurement {
    pub fn new(value: MetricValue, limits: Limits) -> Self {
        Self {
            value,
            warning: limits.warning,
            error: limits.error,
        }
    }
}

/// Last known metrics of one host
#[derive(Clone, Debug, PartialEq)]
pub struct Metrics {
    pub load1: Measurement,
    pub load5: Measurement,
    pub load15: Measurement,
    pub cpu: Measurement,
    pub free: Measurement,
    pub storage: Measurement,
    pub inode: Measurement,
    pub conns: Measurement,
    pub uptime: Measurement,
    pub services: Measurement,
    /// Logical CPU count; scales load and CPU thresholds
    pub nproc: i64,
}

impl Metrics {
    /// Empty metrics carrying the host's threshold overrides
    pub fn new(t: &Thresholds) -> Self {
        let scalar = |l: Limits| Measurement::new(MetricValue::Scalar(UNAVAILABLE), l);
        Self {
            load1: scalar(t.load1),
            load5: scalar(t.load5),
            load15: scalar(t.load15),
            cpu: scalar(t.cpu),
            free: scalar(t.free),
            storage: Measurement::new(MetricValue::Vector(Vec::new()), t.storage),
            inode: Measurement::new(MetricValue::Vector(Vec::new()), t.inode),
            conns: Measurement::new(MetricValue::Int(UNAVAILABLE as i64), t.conns),
            uptime: Measurement::new(MetricValue::Int(UNAVAILABLE as i64), t.uptime),
            services: Measurement::new(
                MetricValue::ServiceTally(ServiceTally::default()),
                Limits::default(),
            ),
            nproc: UNAVAILABLE as i64,
        }
    }

    /// Overwrite values from a parsed probe, keeping thresholds
    pub fn apply(&mut self, probe: &crate::probe::ProbeResult) {
        self.load1.value = MetricValue::Scalar(probe.load[0]);
        self.load5.value = MetricValue::Scalar(probe.load[1]);
        self.load15.value = MetricValue::Scalar(probe.load[2]);
        self.free.value = MetricValue::Scalar(probe.free);
        self.conns.value = MetricValue::Int(probe.conns);
        self.nproc = probe.nproc;
        self.storage.value = MetricValue::Vector(probe.storage.clone());
        self.inode.value = MetricValue::Vector(probe.inode.clone());
        self.uptime.value = MetricValue::Int(probe.uptime);
        self.cpu.value = MetricValue::Scalar(probe.cpu);
        self.services.value = MetricValue::ServiceTally(probe.services.unwrap_or_default());
    }
}
