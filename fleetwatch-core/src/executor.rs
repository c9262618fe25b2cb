use std::time::Duration;

use async_trait::async_trait;

use crate::model::ConnectTarget;

/// Failures talking to a remote host
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("dial {destination}: {message}")]
    Dial { destination: String, message: String },
    /// The transport broke while running a command
    #[error("connection lost: {0}")]
    Connection(String),
    /// The command ran and exited non-zero; the connection is fine
    #[error("remote command failed: {0}")]
    Exec(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// A timed-out operation leaves the session usable
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }

    /// Only network-level failures make a cached session suspect
    pub fn keeps_session(&self) -> bool {
        matches!(self, TransportError::Timeout(_) | TransportError::Exec(_))
    }
}

/// Opens sessions to hosts and runs commands over them.
///
/// Implementations do not enforce deadlines themselves; callers wrap
/// `dial` and `run` in a timeout.
#[async_trait]
pub trait RemoteExecutor: Send + Sync + 'static {
    type Session: Send + Sync + 'static;

    fn name(&self) -> &'static str;

    async fn dial(&self, target: &ConnectTarget) -> Result<Self::Session, TransportError>;

    /// Run one command and return its standard output
    async fn run(&self, session: &Self::Session, command: &str) -> Result<String, TransportError>;

    async fn close(&self, _session: Self::Session) {}
}
