use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::kecontact::client::{self, Transport, UdpTransport};
use crate::kecontact::command::{Command, CommandProtocol, CommandStatus};
use crate::kecontact::report::{parse_report, ReportId, ReportStore};
use crate::kecontact::{
    CommandError, DeviceAddress, KeContactError, RefreshCause, RefreshError,
};

/// Everything touched by an exchange. Held under one lock so report
/// refreshes and commands never interleave datagrams on the socket.
struct Session<T> {
    transport: T,
    reports: ReportStore,
    valid: bool,
    last_refresh: Option<DateTime<Utc>>,
}

/// One charging station behind one exclusively owned transport.
pub struct Gateway<T: Transport = UdpTransport> {
    name: String,
    address: DeviceAddress,
    timeout: Duration,
    protocol: CommandProtocol,
    session: Mutex<Session<T>>,
}

impl Gateway<UdpTransport> {
    /// Bind `local`, resolve the device and run the initial refresh.
    ///
    /// The station answers on its own port number, so `local` normally
    /// carries the device port.
    pub async fn connect(
        name: &str,
        host: &str,
        port: u16,
        local: SocketAddr,
        timeout: Duration,
    ) -> Result<Self, KeContactError> {
        let address = client::resolve(host, port).await?;
        let transport = UdpTransport::bind(local, address.addr).await?;
        Self::with_transport(name, address, transport, timeout).await
    }

    /// Release the socket; the gateway is unusable afterwards.
    pub async fn close(&self) {
        let mut session = self.session.lock().await;
        session.transport.close();
        session.valid = false;
    }
}

impl<T: Transport> Gateway<T> {
    /// Construct and run the initial refresh. No gateway exists if it fails.
    pub async fn with_transport(
        name: &str,
        address: DeviceAddress,
        transport: T,
        timeout: Duration,
    ) -> Result<Self, KeContactError> {
        let gw = Self {
            name: name.to_owned(),
            address,
            timeout,
            protocol: CommandProtocol::new(timeout),
            session: Mutex::new(Session {
                transport,
                reports: ReportStore::new(),
                valid: false,
                last_refresh: None,
            }),
        };
        gw.refresh().await?;
        info!(
            "{}: connected to {}:{} ({})",
            gw.name, gw.address.host, gw.address.port, gw.address.addr
        );
        Ok(gw)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.address.host
    }

    /// Request reports 1, 2 and 3 in turn. The first failing report aborts
    /// the cycle, clears its slot and marks the gateway invalid.
    pub async fn refresh(&self) -> Result<(), RefreshError> {
        let mut session = self.session.lock().await;
        debug!("{}: refreshing", self.name);

        for report in ReportId::ALL {
            let request = report.request();
            let parsed = match session
                .transport
                .send_receive(Some(request.as_bytes()), self.timeout)
                .await
            {
                Ok(data) => parse_report(&data).map_err(|e| {
                    warn!(
                        "{}: data received is no JSON: {:?}",
                        self.name,
                        String::from_utf8_lossy(&data)
                    );
                    RefreshCause::from(e)
                }),
                Err(e) => Err(RefreshCause::from(e)),
            };

            match parsed {
                Ok(parsed) => session.reports.set_report(report, Some(parsed)),
                Err(cause) => {
                    session.valid = false;
                    session.reports.set_report(report, None);
                    return Err(RefreshError { report, cause });
                }
            }
        }

        session.valid = true;
        session.last_refresh = Some(Utc::now());
        Ok(())
    }

    /// Field from the latest reports, whether or not they are valid.
    /// Check [`Gateway::is_valid`] before trusting the value.
    pub async fn lookup(&self, field: &str) -> Option<Value> {
        self.session.lock().await.reports.get_field(field).cloned()
    }

    pub async fn is_valid(&self) -> bool {
        self.session.lock().await.valid
    }

    /// Time of the last refresh that returned all three reports.
    pub async fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.session.lock().await.last_refresh
    }

    pub async fn send_command(&self, text: &str) -> Result<CommandStatus, CommandError> {
        let mut session = self.session.lock().await;
        self.protocol.execute(&mut session.transport, text).await
    }

    /// Limit the charging current to `current` mA after `delay` seconds.
    pub async fn set_current_limit(
        &self,
        current: u32,
        delay: u32,
    ) -> Result<CommandStatus, CommandError> {
        let cmd = Command::CurrTime { current, delay };
        cmd.validate()?;
        self.send_command(&cmd.to_string()).await
    }
}
