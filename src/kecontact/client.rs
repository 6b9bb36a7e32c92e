use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{sleep, timeout, timeout_at, Instant};

use crate::kecontact::{DeviceAddress, TransportError};

/// Default time to wait for the answer datagram.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// The device needs this gap between a request and having its answer ready.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// How long a single stale-datagram poll waits before a request.
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);

const MAX_DATAGRAM: usize = 2048;
const MAX_DRAIN: usize = 16;

/// Single-shot request/response exchange with the device.
///
/// One request in flight at a time: the next datagram from the device is
/// taken to be the answer. No retries happen at this level.
#[async_trait]
pub trait Transport: Send {
    /// Flush stale datagrams, send `payload` (if any) and return the next
    /// datagram received within `timeout`.
    async fn send_receive(
        &mut self,
        payload: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;
}

/// UDP socket exclusively owned by one gateway.
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    device: SocketAddr,
}

impl UdpTransport {
    pub async fn bind(local: SocketAddr, device: SocketAddr) -> Result<Self, TransportError> {
        debug!("Binding UDP socket on {}", local);
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::Bind { addr: local, source })?;
        Ok(Self {
            socket: Some(socket),
            device,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket
            .as_ref()
            .ok_or(TransportError::NotBound)?
            .local_addr()
            .map_err(TransportError::Receive)
    }

    /// Release the socket. Later exchanges fail with [`TransportError::NotBound`].
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("Closed UDP socket for {}", self.device);
        }
    }

    async fn drain(socket: &UdpSocket) {
        let mut buf = [0u8; MAX_DATAGRAM];
        for _ in 0..MAX_DRAIN {
            match timeout(DRAIN_TIMEOUT, socket.recv_from(&mut buf)).await {
                Ok(Ok((n, from))) => {
                    warn!(
                        "Unexpected data received {:?} from {}",
                        String::from_utf8_lossy(&buf[..n]),
                        from
                    );
                }
                Ok(Err(e)) => {
                    debug!("Receive buffer flush failed: {}", e);
                    return;
                }
                Err(_) => return,
            }
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_receive(
        &mut self,
        payload: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotBound)?;
        Self::drain(socket).await;

        if let Some(payload) = payload {
            debug!(
                "Sending {:?} to {}",
                String::from_utf8_lossy(payload),
                self.device
            );
            socket
                .send_to(payload, self.device)
                .await
                .map_err(|source| TransportError::Send {
                    addr: self.device,
                    source,
                })?;
            sleep(SETTLE_DELAY).await;
        }

        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (n, from) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(r) => r.map_err(TransportError::Receive)?,
                Err(_) => return Err(TransportError::Timeout { timeout }),
            };
            if from != self.device {
                warn!("Ignoring datagram from {} while waiting on {}", from, self.device);
                continue;
            }
            debug!("Received {:?} from {}", String::from_utf8_lossy(&buf[..n]), from);
            return Ok(buf[..n].to_vec());
        }
    }
}

/// Resolve a configured host and port to the device address.
pub async fn resolve(host: &str, port: u16) -> Result<DeviceAddress, TransportError> {
    let resolve_err = |source| TransportError::Resolve {
        host: host.to_owned(),
        port,
        source,
    };
    let addr = lookup_host((host, port))
        .await
        .map_err(resolve_err)?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| {
            resolve_err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no IPv4 address",
            ))
        })?;
    Ok(DeviceAddress {
        host: host.to_owned(),
        port,
        addr,
    })
}
