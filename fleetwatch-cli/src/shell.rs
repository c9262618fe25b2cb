//! Interactive shells in an external terminal window

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use fleetwatch_core::model::ConnectTarget;

pub struct ShellLauncher {
    terminal: String,
    identity: Option<PathBuf>,
}

impl ShellLauncher {
    pub fn new(terminal: impl Into<String>, identity: Option<PathBuf>) -> Self {
        Self {
            terminal: terminal.into(),
            identity,
        }
    }

    /// `<terminal> -e ssh ...`; with a remote command the session runs it and
    /// then stays in a login shell
    pub fn command(&self, target: &ConnectTarget, remote: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.terminal);
        cmd.arg("-e").arg("ssh");
        if let Some(identity) = &self.identity {
            cmd.arg("-i").arg(identity);
        }
        if target.port != 22 {
            cmd.arg("-p").arg(target.port.to_string());
        }
        match remote {
            Some(remote) => {
                cmd.arg("-t")
                    .arg(target.destination())
                    .arg(format!("{}; exec $SHELL -l", remote));
            }
            None => {
                cmd.arg(target.destination());
            }
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }

    /// Start the terminal without waiting for it. Spawn failures are
    /// returned; a non-zero exit later is only logged.
    pub fn open(&self, target: &ConnectTarget, remote: Option<&str>) -> std::io::Result<()> {
        let mut child = self.command(target, remote).spawn()?;
        info!(destination = %target.destination(), terminal = %self.terminal, "opened shell");
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => warn!(%status, "terminal exited with error"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "waiting for terminal failed"),
            }
        });
        Ok(())
    }
}
