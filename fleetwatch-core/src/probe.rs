//! The remote health probe
//!
//! One compound shell command is run per host; its output is one field per
//! line. Parsing is positional and tolerant: a field that does not parse is
//! replaced by the `-1` sentinel and the rest of the output is still used.

use serde::Deserialize;

use crate::model::{DeviceUsage, ServiceTally, UNAVAILABLE};

const LOAD_CMD: &str = "cat /proc/loadavg | awk '{print $1,$2,$3}'";
const FREE_CMD: &str = "if [ \"$(free | grep available)\" ]; then free | grep Mem | awk '{print ($2-$7)/$2}'; else free | grep Mem | awk '{print ($3-$6-$7)/$2}'; fi";
const CONNS_CMD: &str = "netstat -ant | awk '{print $5}' | uniq -u | wc -l";
const NPROC_CMD: &str = "nproc";
const STORAGE_CMD: &str = "df -x tmpfs -x none | grep '/' | grep '%' | awk '{print $6 \"=\" $5}' | sort -g | awk '{printf \"%s \",$0} END {print \" \"}'";
const INODE_CMD: &str = "df -i -x tmpfs -x none | grep '/' | grep '%' | awk '{print $6 \"=\" $5}' | sort -g | awk '{printf \"%s \",$0} END {print \" \"}'";
const UPTIME_CMD: &str = "cat /proc/uptime | awk '{print $1}'";
const CPU_CMD: &str = "top -b -n2 | grep 'Cpu(s)' | tail -n 1 | awk '{print $2 + $4}'";
const SERVICES_CMD: &str = "curl -s http://localhost:8500/v1/health/node/$(hostname) 2>/dev/null || echo";

/// Build the compound probe command.
pub fn probe_command() -> String {
    let required = [
        LOAD_CMD,
        FREE_CMD,
        CONNS_CMD,
        NPROC_CMD,
        STORAGE_CMD,
        INODE_CMD,
        UPTIME_CMD,
        CPU_CMD,
    ]
    .join(" && ");
    format!("{} && {{ {}; }}", required, SERVICES_CMD)
}

/// Values extracted from one probe run
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeResult {
    pub load: [f64; 3],
    /// Used fraction of system memory, 0.0..=1.0
    pub free: f64,
    pub conns: i64,
    pub nproc: i64,
    pub storage: Vec<DeviceUsage>,
    pub inode: Vec<DeviceUsage>,
    /// Seconds, truncated
    pub uptime: i64,
    /// Percent on a 0..100×cores scale
    pub cpu: f64,
    pub services: Option<ServiceTally>,
}

#[derive(Deserialize)]
struct HealthCheck {
    #[serde(rename = "Status", default)]
    status: String,
}

fn float(field: Option<&str>) -> f64 {
    field
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(UNAVAILABLE)
}

fn int(field: Option<&str>) -> i64 {
    field
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(UNAVAILABLE as i64)
}

/// `"/=50% /home=7%"` into device usages; a token that does not parse keeps
/// its device name with a `-1` percentage.
fn devices(line: Option<&str>) -> Vec<DeviceUsage> {
    line.unwrap_or_default()
        .split_whitespace()
        .map(|token| {
            let (device, percent) = token.split_once('=').unwrap_or((token, ""));
            DeviceUsage {
                device: device.to_string(),
                percent: percent
                    .trim_end_matches('%')
                    .parse()
                    .unwrap_or(UNAVAILABLE as i64),
            }
        })
        .collect()
}

/// Tally a JSON array of health checks by status. Statuses other than
/// passing, unknown and warning count as critical.
pub fn tally_services(json: &str) -> Option<ServiceTally> {
    let json = json.trim();
    if json.is_empty() {
        return None;
    }
    let checks: Vec<HealthCheck> = serde_json::from_str(json).ok()?;
    let mut tally = [0u32; 4];
    for check in checks {
        let slot = match check.status.as_str() {
            "passing" => 0,
            "unknown" => 1,
            "warning" => 2,
            _ => 3,
        };
        tally[slot] += 1;
    }
    Some(ServiceTally(tally))
}

/// Parse probe output. Never fails; missing lines yield sentinels.
pub fn parse_probe(output: &str) -> ProbeResult {
    let lines: Vec<&str> = output.split('\n').collect();
    let line = |i: usize| lines.get(i).copied();

    let mut loads = line(0).unwrap_or_default().split_whitespace();
    let load = [float(loads.next()), float(loads.next()), float(loads.next())];

    ProbeResult {
        load,
        free: float(line(1)),
        conns: int(line(2)),
        nproc: int(line(3)),
        storage: devices(line(4)),
        inode: devices(line(5)),
        uptime: match float(line(6)) {
            v if v < 0.0 => UNAVAILABLE as i64,
            v => v.trunc() as i64,
        },
        cpu: float(line(7)),
        services: line(8).and_then(tally_services),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "0.52 0.48 0.40\n0.37\n42\n4\n/=50% /boot=23% \n/=10% /boot=1% \n3600.75\n12.5\n[{\"Status\":\"passing\"},{\"Status\":\"warning\"},{\"Status\":\"bogus\"}]\n";

    #[test]
    fn test_parse_full_output() {
        let r = parse_probe(SAMPLE);
        assert_eq!(r.load, [0.52, 0.48, 0.40]);
        assert_eq!(r.free, 0.37);
        assert_eq!(r.conns, 42);
        assert_eq!(r.nproc, 4);
        assert_eq!(r.storage.len(), 2);
        assert_eq!(r.storage[1].device, "/boot");
        assert_eq!(r.storage[1].percent, 23);
        assert_eq!(r.inode[0].percent, 10);
        assert_eq!(r.uptime, 3600);
        assert_eq!(r.cpu, 12.5);
        assert_eq!(r.services, Some(ServiceTally([1, 0, 1, 1])));
    }

    #[test]
    fn test_single_bad_field_is_sentineled() {
        let r = parse_probe("abc 0.1 0.2\n0.5\n10\n4\n/=50%\n/=10%\n3600\n12.0\n");
        assert_eq!(r.load, [-1.0, 0.1, 0.2]);
        assert_eq!(r.free, 0.5);
        assert_eq!(r.conns, 10);
        assert_eq!(r.nproc, 4);
        assert_eq!(r.storage, vec![DeviceUsage { device: "/".into(), percent: 50 }]);
        assert_eq!(r.inode, vec![DeviceUsage { device: "/".into(), percent: 10 }]);
        assert_eq!(r.uptime, 3600);
        assert_eq!(r.cpu, 12.0);
        assert_eq!(r.services, None);
    }

    #[test]
    fn test_bad_fields_in_the_middle() {
        let r = parse_probe("1 2 3\nnope\nx\n4\n/=oops% /var=70%\n\nforever\n5\n");
        assert_eq!(r.load, [1.0, 2.0, 3.0]);
        assert_eq!(r.free, -1.0);
        assert_eq!(r.conns, -1);
        assert_eq!(r.storage[0].percent, -1);
        assert_eq!(r.storage[1].percent, 70);
        assert!(r.inode.is_empty());
        assert_eq!(r.uptime, -1);
        assert_eq!(r.cpu, 5.0);
    }

    #[test]
    fn test_truncated_output() {
        let r = parse_probe("0.1");
        assert_eq!(r.load, [0.1, -1.0, -1.0]);
        assert_eq!(r.nproc, -1);
        assert!(r.storage.is_empty());
    }

    #[test]
    fn test_service_json_garbage_is_ignored() {
        assert_eq!(tally_services("not json"), None);
        assert_eq!(tally_services("  "), None);
        assert_eq!(tally_services("[]"), Some(ServiceTally([0, 0, 0, 0])));
    }

    #[test]
    fn test_probe_command_chains_every_field() {
        let cmd = probe_command();
        assert!(cmd.starts_with(LOAD_CMD));
        assert!(cmd.contains(CPU_CMD));
        assert!(cmd.ends_with("|| echo; }"));
    }
}
