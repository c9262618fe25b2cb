//! known_hosts matching
//!
//! Binds each configured host to the first trust-store entry whose host
//! pattern matches it. Hashed patterns (`|1|salt|hash`) are checked by
//! recomputing HMAC-SHA1 of the candidate name keyed with the salt.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ring::hmac;

use crate::model::{HostId, HostSpec};

#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: malformed entry")]
    Malformed { line: usize },
    #[error("line {line}: unsupported host hash type '{kind}'")]
    UnsupportedHash { line: usize, kind: String },
    #[error("line {line}: bad base64 in hashed host")]
    BadBase64 { line: usize },
}

/// A public key accepted for a host
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostKey {
    pub key_type: String,
    pub key: String,
}

impl HostKey {
    /// A known_hosts line binding this key to `address:port`
    pub fn known_hosts_line(&self, address: &str, port: u16) -> String {
        format!("{} {} {}", host_label(address, port), self.key_type, self.key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Pattern {
    Plain(String),
    Hashed { salt: Vec<u8>, hash: Vec<u8> },
}

#[derive(Clone, Debug)]
pub struct KnownHostEntry {
    patterns: Vec<Pattern>,
    pub key: HostKey,
}

/// The name ssh looks up: `addr` on port 22, `[addr]:port` otherwise
fn host_label(address: &str, port: u16) -> String {
    if port == 22 {
        address.to_string()
    } else {
        format!("[{}]:{}", address, port)
    }
}

fn parse_hashed(field: &str, line: usize) -> Result<Pattern, TrustError> {
    let mut parts = field.split('|').skip(1);
    let (Some(kind), Some(salt), Some(hash), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TrustError::Malformed { line });
    };
    if kind != "1" {
        return Err(TrustError::UnsupportedHash {
            line,
            kind: kind.to_string(),
        });
    }
    let decode = |s: &str| STANDARD.decode(s).map_err(|_| TrustError::BadBase64 { line });
    Ok(Pattern::Hashed {
        salt: decode(salt)?,
        hash: decode(hash)?,
    })
}

/// Parse known_hosts content. Blank lines, comments and `@marker` lines
/// are skipped.
pub fn parse_known_hosts(content: &str) -> Result<Vec<KnownHostEntry>, TrustError> {
    let mut entries = Vec::new();
    for (i, raw) in content.lines().enumerate() {
        let line = i + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') || text.starts_with('@') {
            continue;
        }
        let mut fields = text.split_whitespace();
        let (Some(hosts), Some(key_type), Some(key)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(TrustError::Malformed { line });
        };
        let patterns = hosts
            .split(',')
            .map(|p| {
                if p.starts_with('|') {
                    parse_hashed(p, line)
                } else {
                    Ok(Pattern::Plain(p.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        entries.push(KnownHostEntry {
            patterns,
            key: HostKey {
                key_type: key_type.to_string(),
                key: key.to_string(),
            },
        });
    }
    Ok(entries)
}

pub fn load_known_hosts(path: &Path) -> Result<Vec<KnownHostEntry>, TrustError> {
    let content = std::fs::read_to_string(path).map_err(|source| TrustError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_known_hosts(&content)
}

fn hmac_sha1(salt: &[u8], name: &str) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, salt);
    hmac::sign(&key, name.as_bytes()).as_ref().to_vec()
}

fn pattern_matches(pattern: &Pattern, address: &str, port: u16) -> bool {
    let label = host_label(address, port);
    match pattern {
        Pattern::Plain(p) => {
            p == &label
                || p == address
                || p.strip_prefix('[')
                    .and_then(|rest| rest.strip_suffix(']'))
                    .is_some_and(|inner| inner == address)
        }
        Pattern::Hashed { salt, hash } => {
            let hashes_to = |name: &str| hmac_sha1(salt, name) == *hash;
            hashes_to(&label) || (label != address && hashes_to(address))
        }
    }
}

impl KnownHostEntry {
    pub fn matches(&self, address: &str, port: u16) -> bool {
        self.patterns.iter().any(|p| pattern_matches(p, address, port))
    }
}

/// Bind every host that has a matching entry to that entry's key. The first
/// matching entry wins.
pub fn bind_host_keys(entries: &[KnownHostEntry], hosts: &[HostSpec]) -> HashMap<HostId, HostKey> {
    hosts
        .iter()
        .filter_map(|host| {
            entries
                .iter()
                .find(|e| e.matches(&host.address, host.port))
                .map(|e| (host.name.clone(), e.key.clone()))
        })
        .collect()
}
