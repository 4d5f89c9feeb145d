//! Placeholder SSH transport for builds without an SSH client stack.
//!
//! Every session fails to connect, so SSH actions complete as `Failed`
//! with a transport message instead of hanging. A libssh2-backed adapter
//! implements the same [`SshTransport`] trait.

use log::warn;

use crate::app::ports::{ExecOutput, SshConnectConfig, SshError, SshSession, SshTransport};

#[derive(Debug, Default)]
pub struct UnavailableSsh;

struct DeadSession {
    target: String,
}

impl SshTransport for UnavailableSsh {
    fn create_session(&self, config: SshConnectConfig) -> Result<Box<dyn SshSession>, SshError> {
        Ok(Box::new(DeadSession {
            target: format!("{}@{}:{}", config.username, config.host, config.port),
        }))
    }
}

impl SshSession for DeadSession {
    fn connect(&mut self) -> Result<(), SshError> {
        warn!("ssh: no transport linked, cannot reach {}", self.target);
        Err(SshError::ConnectFailed)
    }

    fn exec(&mut self, _command: &str) -> Result<ExecOutput, SshError> {
        Err(SshError::ChannelFailed)
    }

    fn disconnect(&mut self) {}
}
