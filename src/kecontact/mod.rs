use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub mod client;
pub mod command;
pub mod gateway;
pub mod report;
pub mod sensor;

#[cfg(test)]
pub(crate) mod mock;

pub use report::ReportId;

/// Default UDP port of the charging station.
pub const DEFAULT_PORT: u16 = 7090;

/// (host, port) of the device as configured, plus the resolved socket address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
    pub addr: SocketAddr,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot resolve device address {host}:{port}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("cannot bind UDP socket on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("send to {addr} failed")]
    Send {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("receive failed")]
    Receive(#[source] io::Error),

    #[error("no response within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("no socket bound")]
    NotBound,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("payload is not valid JSON")]
    Json(#[from] serde_json::Error),

    #[error("payload is JSON but not an object")]
    NotAnObject,
}

/// Why a report exchange failed.
#[derive(Debug, Error)]
pub enum RefreshCause {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Error)]
#[error("report {report} failed: {cause}")]
pub struct RefreshError {
    pub report: ReportId,
    #[source]
    pub cause: RefreshCause,
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake probe failed")]
    Transport(#[source] TransportError),

    #[error("handshake probe got an empty response")]
    EmptyResponse,
}

/// Hard command failures. A device answering with something other than the
/// acknowledgement is not one of these, see [`command::CommandStatus`].
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("command exchange failed")]
    Transport(#[source] TransportError),

    #[error("invalid {name} {value}: expected {expected}")]
    InvalidArgument {
        name: &'static str,
        value: u32,
        expected: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum KeContactError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("initial refresh failed")]
    Refresh(#[from] RefreshError),
}
