//! Remote execution through the system `ssh` client
//!
//! Each host gets one OpenSSH control master, started on dial and kept
//! running in the background. Probe commands are multiplexed over its control
//! socket, so only the first fetch pays for the handshake.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::process::{Child, Command};

use fleetwatch_core::executor::{RemoteExecutor, TransportError};
use fleetwatch_core::model::ConnectTarget;
use fleetwatch_core::trust::HostKey;

const READY_POLL: Duration = Duration::from_millis(100);
const SSH_FAILURE: i32 = 255;

pub struct SshOptions {
    pub identity: Option<PathBuf>,
    /// Passphrase of the identity, fed through `sshpass`
    pub passphrase: Option<SecretString>,
    pub connect_timeout: Duration,
    /// Pinned host keys by (address, port)
    pub host_keys: HashMap<(String, u16), HostKey>,
}

pub struct SshExecutor {
    options: SshOptions,
    runtime_dir: tempfile::TempDir,
    next_id: AtomicU64,
}

/// A running control master for one host
pub struct SshSession {
    destination: String,
    port: u16,
    control_path: PathBuf,
    known_hosts: Option<PathBuf>,
    master: Mutex<Option<Child>>,
}

impl SshExecutor {
    pub fn new(options: SshOptions) -> std::io::Result<Self> {
        let runtime_dir = tempfile::Builder::new().prefix("fleetwatch-").tempdir()?;
        Ok(Self {
            options,
            runtime_dir,
            next_id: AtomicU64::new(0),
        })
    }

    /// `ssh` with the options every invocation shares
    fn ssh(&self, session: &SshSession) -> Command {
        let mut cmd = match &self.options.passphrase {
            Some(pass) => {
                let mut cmd = Command::new("sshpass");
                cmd.args(["-P", "passphrase", "-e", "ssh"]);
                cmd.env("SSHPASS", pass.expose_secret());
                cmd
            }
            None => {
                let mut cmd = Command::new("ssh");
                cmd.arg("-o").arg("BatchMode=yes");
                cmd
            }
        };
        cmd.arg("-o").arg(format!(
            "ConnectTimeout={}",
            self.options.connect_timeout.as_secs().max(1)
        ));
        match &session.known_hosts {
            Some(file) => {
                cmd.arg("-o").arg(format!("UserKnownHostsFile={}", file.display()));
                cmd.arg("-o").arg("StrictHostKeyChecking=yes");
            }
            None => {
                cmd.arg("-o").arg("StrictHostKeyChecking=accept-new");
            }
        }
        if let Some(identity) = &self.options.identity {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg("-p").arg(session.port.to_string());
        cmd.arg("-S").arg(&session.control_path);
        cmd.stdin(Stdio::null());
        cmd
    }

    fn pin_host_key(&self, target: &ConnectTarget, id: u64) -> std::io::Result<Option<PathBuf>> {
        let key = self
            .options
            .host_keys
            .get(&(target.address.clone(), target.port));
        let Some(key) = key else {
            return Ok(None);
        };
        let path = self.runtime_dir.path().join(format!("known_hosts-{}", id));
        std::fs::write(
            &path,
            format!("{}\n", key.known_hosts_line(&target.address, target.port)),
        )?;
        Ok(Some(path))
    }
}

fn dial_error(target: &ConnectTarget, message: impl Into<String>) -> TransportError {
    TransportError::Dial {
        destination: target.destination(),
        message: message.into(),
    }
}

/// ssh reserves 255 for its own failures; anything else came from the
/// remote command
fn exit_error(code: Option<i32>, message: String) -> TransportError {
    match code {
        Some(SSH_FAILURE) | None => TransportError::Connection(message),
        Some(_) => TransportError::Exec(message),
    }
}

async fn wait_for_socket(path: &Path, master: &mut Child) -> Result<(), String> {
    loop {
        if path.exists() {
            return Ok(());
        }
        if let Some(status) = master.try_wait().map_err(|e| e.to_string())? {
            return Err(format!("ssh exited with {}", status));
        }
        tokio::time::sleep(READY_POLL).await;
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    type Session = SshSession;

    fn name(&self) -> &'static str {
        "ssh"
    }

    async fn dial(&self, target: &ConnectTarget) -> Result<SshSession, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = SshSession {
            destination: target.destination(),
            port: target.port,
            control_path: self.runtime_dir.path().join(format!("cm-{}", id)),
            known_hosts: self.pin_host_key(target, id)?,
            master: Mutex::new(None),
        };

        let mut cmd = self.ssh(&session);
        cmd.args(["-M", "-N"])
            .arg(&session.destination)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut master = cmd.spawn()?;

        if let Err(reason) = wait_for_socket(&session.control_path, &mut master).await {
            let stderr = match master.wait_with_output().await {
                Ok(out) => String::from_utf8_lossy(&out.stderr).trim().to_string(),
                Err(_) => String::new(),
            };
            let message = if stderr.is_empty() { reason } else { stderr };
            return Err(dial_error(target, message));
        }

        tracing::debug!(destination = %session.destination, "control master ready");
        *session.master.lock().unwrap_or_else(|e| e.into_inner()) = Some(master);
        Ok(session)
    }

    async fn run(&self, session: &SshSession, command: &str) -> Result<String, TransportError> {
        let mut cmd = self.ssh(session);
        cmd.arg(&session.destination)
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output().await?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(exit_error(
            output.status.code(),
            format!("{}: {}", output.status, stderr.trim()),
        ))
    }

    async fn close(&self, session: SshSession) {
        let mut cmd = self.ssh(&session);
        cmd.args(["-O", "exit"])
            .arg(&session.destination)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Err(e) = cmd.status().await {
            tracing::debug!(destination = %session.destination, error = %e, "ssh -O exit failed");
        }

        let master = session
            .master
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut master) = master {
            let _ = master.kill().await;
        }
        if let Some(file) = &session.known_hosts {
            let _ = std::fs::remove_file(file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(passphrase: Option<&str>, pinned: bool) -> SshExecutor {
        let mut host_keys = HashMap::new();
        if pinned {
            host_keys.insert(
                ("10.0.0.1".to_string(), 2222),
                HostKey {
                    key_type: "ssh-ed25519".into(),
                    key: "AAAAC3Nza".into(),
                },
            );
        }
        SshExecutor::new(SshOptions {
            identity: Some(PathBuf::from("/home/ops/.ssh/id_ed25519")),
            passphrase: passphrase.map(|p| SecretString::from(p.to_string())),
            connect_timeout: Duration::from_secs(15),
            host_keys,
        })
        .unwrap()
    }

    fn target() -> ConnectTarget {
        ConnectTarget {
            user: "ops".into(),
            address: "10.0.0.1".into(),
            port: 2222,
        }
    }

    fn session(known_hosts: Option<PathBuf>) -> SshSession {
        SshSession {
            destination: "ops@10.0.0.1".into(),
            port: 2222,
            control_path: PathBuf::from("/tmp/cm-0"),
            known_hosts,
            master: Mutex::new(None),
        }
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_key_auth_uses_batch_mode() {
        let exec = executor(None, false);
        let cmd = exec.ssh(&session(None));
        assert_eq!(cmd.as_std().get_program(), "ssh");
        let args = args(&cmd);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=accept-new".to_string()));
        assert!(args.contains(&"ConnectTimeout=15".to_string()));
        assert!(args.windows(2).any(|w| w == ["-p", "2222"]));
        assert!(args.windows(2).any(|w| w == ["-S", "/tmp/cm-0"]));
    }

    #[test]
    fn test_passphrase_goes_through_sshpass() {
        let exec = executor(Some("hunter2"), false);
        let cmd = exec.ssh(&session(None));
        assert_eq!(cmd.as_std().get_program(), "sshpass");
        let args = args(&cmd);
        assert_eq!(&args[..4], ["-P", "passphrase", "-e", "ssh"]);
        assert!(!args.iter().any(|a| a.contains("hunter2")));
        assert!(!args.contains(&"BatchMode=yes".to_string()));
    }

    #[test]
    fn test_exit_255_is_a_connection_failure() {
        let lost = exit_error(Some(255), "exit status: 255: broken pipe".into());
        assert!(matches!(lost, TransportError::Connection(_)));
        assert!(!lost.keeps_session());

        let killed = exit_error(None, "signal: 9".into());
        assert!(!killed.keeps_session());

        let remote = exit_error(Some(127), "exit status: 127: netstat: not found".into());
        assert!(matches!(remote, TransportError::Exec(_)));
        assert!(remote.keeps_session());
    }

    #[test]
    fn test_pinned_key_is_written_and_enforced() {
        let exec = executor(None, true);
        let file = exec.pin_host_key(&target(), 7).unwrap().unwrap();
        let content = std::fs::read_to_string(&file).unwrap();
        assert_eq!(content, "[10.0.0.1]:2222 ssh-ed25519 AAAAC3Nza\n");

        let args = args(&exec.ssh(&session(Some(file))));
        assert!(args.contains(&"StrictHostKeyChecking=yes".to_string()));

        let other = ConnectTarget {
            port: 22,
            ..target()
        };
        assert!(exec.pin_host_key(&other, 8).unwrap().is_none());
    }
}
