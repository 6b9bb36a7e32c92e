use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::kecontact::client::Transport;
use crate::kecontact::TransportError;

type Responder = Box<dyn FnMut(&str) -> Result<Vec<u8>, TransportError> + Send>;

/// Scripted transport: answers each request through `respond` and journals it.
pub(crate) struct MockTransport {
    respond: Responder,
    journal: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    pub fn new(
        respond: impl FnMut(&str) -> Result<Vec<u8>, TransportError> + Send + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            journal: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answers `report 1/2/3` with the given payloads, anything else with `other`.
    pub fn reports(r1: &str, r2: &str, r3: &str, other: &str) -> Self {
        let (r1, r2, r3, other) = (r1.to_owned(), r2.to_owned(), r3.to_owned(), other.to_owned());
        Self::new(move |req| {
            Ok(match req {
                "report 1" => r1.clone(),
                "report 2" => r2.clone(),
                "report 3" => r3.clone(),
                _ => other.clone(),
            }
            .into_bytes())
        })
    }

    pub fn journal(&self) -> Arc<Mutex<Vec<String>>> {
        self.journal.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_receive(
        &mut self,
        payload: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let req = payload
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default();
        self.journal.lock().unwrap().push(req.clone());
        match (self.respond)(&req) {
            Err(TransportError::Timeout { .. }) => Err(TransportError::Timeout { timeout }),
            other => other,
        }
    }
}

/// A fake charging station on a loopback UDP socket.
pub(crate) struct FixtureDevice {
    socket: Arc<UdpSocket>,
    requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl FixtureDevice {
    /// `respond` returns `None` to stay silent.
    pub async fn spawn(respond: impl Fn(&str) -> Option<Vec<u8>> + Send + 'static) -> Self {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let socket = socket.clone();
            let requests = requests.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                while let Ok((n, from)) = socket.recv_from(&mut buf).await {
                    let req = String::from_utf8_lossy(&buf[..n]).into_owned();
                    let rsp = respond(&req);
                    requests.lock().unwrap().push(req);
                    if let Some(rsp) = rsp {
                        let _ = socket.send_to(&rsp, from).await;
                    }
                }
            })
        };

        Self {
            socket,
            requests,
            task,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap()
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Send an unsolicited datagram.
    pub async fn push_to(&self, to: SocketAddr, data: &[u8]) {
        self.socket.send_to(data, to).await.unwrap();
    }
}

impl Drop for FixtureDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}
