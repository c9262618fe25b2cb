use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::model::HostSpec;

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("host list is empty")]
    NoHosts,
    #[error("host '{name}' is listed more than once")]
    DuplicateHost { name: String },
    #[error("line {line}: expected F1..F12=<command>, got '{text}'")]
    BadCommandLine { line: usize, text: String },
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Expand a leading `~` to the home directory
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).into_owned())
}

/// The monitored hosts, as read from the host list file
#[derive(Clone, Debug)]
pub struct FleetConfig {
    pub hosts: Vec<HostSpec>,
}

impl FleetConfig {
    /// Load a host list; `.yml`/`.yaml` files are YAML, anything else JSON
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let path = expand_path(path);
        let content = read(&path)?;
        let yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );
        if yaml {
            Self::from_yaml(&content)
        } else {
            Self::from_json(&content)
        }
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let hosts: Vec<HostSpec> = serde_json::from_str(content)?;
        Self::validated(hosts)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let hosts: Vec<HostSpec> = serde_yaml::from_str(content)?;
        Self::validated(hosts)
    }

    fn validated(hosts: Vec<HostSpec>) -> Result<Self, ConfigError> {
        if hosts.is_empty() {
            return Err(ConfigError::NoHosts);
        }
        let mut seen = BTreeSet::new();
        for host in &hosts {
            if !seen.insert(host.name.as_str()) {
                return Err(ConfigError::DuplicateHost {
                    name: host.name.clone(),
                });
            }
        }
        Ok(Self { hosts })
    }
}

/// Remote commands bound to function keys F1..F12
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandMap {
    keys: [Option<String>; 12],
}

impl CommandMap {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::parse(&read(&expand_path(path))?)
    }

    /// Parse `F<n>=<command>` lines; blank lines and `#` comments are skipped
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut map = Self::default();
        for (i, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let bad = || ConfigError::BadCommandLine {
                line: i + 1,
                text: raw.to_string(),
            };
            let (key, command) = line.split_once('=').ok_or_else(bad)?;
            let n: usize = key
                .trim()
                .strip_prefix('F')
                .and_then(|n| n.parse().ok())
                .filter(|n| (1..=12).contains(n))
                .ok_or_else(bad)?;
            let command = command.trim();
            map.keys[n - 1] = (!command.is_empty()).then(|| command.to_string());
        }
        Ok(map)
    }

    /// Command for function key `n` (1-based)
    pub fn get(&self, n: u8) -> Option<&str> {
        let idx = usize::from(n).checked_sub(1)?;
        self.keys.get(idx)?.as_deref()
    }

    pub fn len(&self) -> usize {
        self.keys.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_json_host_list() {
        let json = r#"[
            {"name": "web-1", "user": "ops", "host": "10.0.0.1", "port": "22"},
            {"name": "db-1", "user": "ops", "host": "10.0.0.2", "port": "2222",
             "storage": {"warning": 70, "error": 85}}
        ]"#;
        let config = FleetConfig::from_json(json).unwrap();
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.hosts[1].port, 2222);
        assert_eq!(config.hosts[1].thresholds.storage.error, Some(85.0));
    }

    #[test]
    fn test_parse_yaml_host_list() {
        let yaml = r#"
- name: web-1
  user: ops
  host: 10.0.0.1
- name: web-2
  user: ops
  host: 10.0.0.3
  port: 2200
  load1:
    warning: 2.5
"#;
        let config = FleetConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.hosts[1].port, 2200);
        assert_eq!(config.hosts[1].thresholds.load1.warning, Some(2.5));
    }

    #[test]
    fn test_duplicate_and_empty_rejected() {
        let dup = r#"[{"name":"a","user":"u","host":"h"},{"name":"a","user":"u","host":"h2"}]"#;
        assert!(matches!(
            FleetConfig::from_json(dup),
            Err(ConfigError::DuplicateHost { .. })
        ));
        assert!(matches!(FleetConfig::from_json("[]"), Err(ConfigError::NoHosts)));
    }

    #[test]
    fn test_load_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "- {{name: a, user: u, host: h}}").unwrap();
        let config = FleetConfig::load(file.path()).unwrap();
        assert_eq!(config.hosts[0].address, "h");

        let missing = FleetConfig::load(Path::new("/nonexistent/hosts.json"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_command_map() {
        let map = CommandMap::parse(
            "# operator shortcuts\nF1=htop\nF2=tail -f /var/log/syslog\n\nF12=df -h=human\n",
        )
        .unwrap();
        assert_eq!(map.get(1), Some("htop"));
        assert_eq!(map.get(2), Some("tail -f /var/log/syslog"));
        assert_eq!(map.get(12), Some("df -h=human"));
        assert_eq!(map.get(3), None);
        assert_eq!(map.get(0), None);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_command_map_rejects_garbage() {
        assert!(CommandMap::parse("F13=ls").is_err());
        assert!(CommandMap::parse("just text").is_err());
    }
}
