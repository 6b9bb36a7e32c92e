use std::fmt;
use std::time::Duration;

use log::{debug, error};

use crate::kecontact::client::Transport;
use crate::kecontact::{CommandError, HandshakeError};

/// Probe the device must see before it accepts a command.
pub const HANDSHAKE_PROBE: &[u8] = b"i";

/// Answer to an accepted command.
pub const ACKNOWLEDGEMENT: &str = "TCH-OK :done\n";

pub const MIN_CURRENT: u32 = 6000;
pub const MAX_CURRENT: u32 = 63000;
pub const MAX_DELAY: u32 = 860400;

pub enum Command {
    /// Charging current limit in mA (0 or 6000..=63000), applied after
    /// `delay` seconds (0..=860400).
    CurrTime { current: u32, delay: u32 },
}

impl Command {
    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            Command::CurrTime { current, delay } => {
                if *current != 0 && !(MIN_CURRENT..=MAX_CURRENT).contains(current) {
                    return Err(CommandError::InvalidArgument {
                        name: "current",
                        value: *current,
                        expected: "0 or 6000..=63000 mA",
                    });
                }
                if *delay > MAX_DELAY {
                    return Err(CommandError::InvalidArgument {
                        name: "delay",
                        value: *delay,
                        expected: "0..=860400 s",
                    });
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // trailing space is part of the command
            Command::CurrTime { current, delay } => write!(f, "currtime {} {} ", current, delay),
        }
    }
}

/// Outcome of a command the device answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Acknowledged,
    /// The device answered with something other than [`ACKNOWLEDGEMENT`].
    Failed { response: String },
}

impl CommandStatus {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, CommandStatus::Acknowledged)
    }
}

/// Handshake-then-command sequence.
pub struct CommandProtocol {
    timeout: Duration,
}

impl CommandProtocol {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn handshake<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
    ) -> Result<(), HandshakeError> {
        let rsp = transport
            .send_receive(Some(HANDSHAKE_PROBE), self.timeout)
            .await
            .map_err(|e| {
                error!("Handshake failed: {}", e);
                HandshakeError::Transport(e)
            })?;
        if rsp.is_empty() {
            error!("Handshake failed: empty response");
            return Err(HandshakeError::EmptyResponse);
        }
        Ok(())
    }

    /// Probe, then send `text`. A non-acknowledging answer is returned as
    /// [`CommandStatus::Failed`], not as an error.
    pub async fn execute<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        text: &str,
    ) -> Result<CommandStatus, CommandError> {
        self.handshake(transport).await?;

        let rsp = transport
            .send_receive(Some(text.as_bytes()), self.timeout)
            .await
            .map_err(CommandError::Transport)?;
        let rsp = String::from_utf8_lossy(&rsp);

        if rsp == ACKNOWLEDGEMENT {
            debug!("Command {:?} acknowledged", text);
            Ok(CommandStatus::Acknowledged)
        } else {
            error!("Command failed: {:?} answered {:?}", text, rsp);
            Ok(CommandStatus::Failed {
                response: rsp.into_owned(),
            })
        }
    }
}
