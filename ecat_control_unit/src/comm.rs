//! Communication thread: velocity commands in, odometry out.
//!
//! The thread runs at ordinary priority and only touches the control loop
//! through [`CommandExchange`]. The transport sits behind [`CommLink`];
//! [`UdpJsonLink`] is the default.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ecat_common::config::ConfigError;
use ecat_common::motion::{OdometryEstimate, VelocityCommand};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::command::CommandExchange;

/// Largest datagram accepted; a JSON command is well below this.
const MAX_DATAGRAM: usize = 1024;

#[derive(Debug, Error)]
pub enum CommError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    #[error("failed to encode odometry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Transport carrying commands in and odometry out.
pub trait CommLink: Send {
    /// Newest pending command, if any arrived since the last call. Never blocks.
    fn receive_command(&mut self) -> Result<Option<VelocityCommand>, CommError>;

    fn publish_odometry(&mut self, odometry: &OdometryEstimate) -> Result<(), CommError>;
}

// ─── Configuration ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommConfig {
    /// Local address commands are received on.
    pub bind_addr: SocketAddr,
    /// Odometry destination. When unset, replies go to the last command sender.
    pub peer_addr: Option<SocketAddr>,
    /// Poll period of the communication thread [ms].
    pub poll_interval_ms: u64,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 47800)),
            peer_addr: None,
            poll_interval_ms: 10,
        }
    }
}

impl CommConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 || self.poll_interval_ms > 1000 {
            return Err(ConfigError::ValidationError(format!(
                "comm.poll_interval_ms {} out of range [1, 1000]",
                self.poll_interval_ms
            )));
        }
        Ok(())
    }
}

// ─── UDP / JSON link ────────────────────────────────────────────────

/// Non-blocking UDP socket exchanging JSON documents.
///
/// Commands are `{"linear": f64, "angular": f64}`; odometry is the serialized
/// [`OdometryEstimate`].
pub struct UdpJsonLink {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    last_sender: Option<SocketAddr>,
    buf: [u8; MAX_DATAGRAM],
}

impl UdpJsonLink {
    pub fn bind(config: &CommConfig) -> Result<Self, CommError> {
        let socket = UdpSocket::bind(config.bind_addr).map_err(|source| CommError::Bind {
            addr: config.bind_addr,
            source,
        })?;
        socket.set_nonblocking(true)?;
        let bound = socket.local_addr()?;
        info!(
            bind = %bound,
            peer = ?config.peer_addr,
            "UDP command link ready"
        );
        Ok(Self {
            socket,
            peer: config.peer_addr,
            last_sender: None,
            buf: [0; MAX_DATAGRAM],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CommError> {
        Ok(self.socket.local_addr()?)
    }
}

impl CommLink for UdpJsonLink {
    fn receive_command(&mut self) -> Result<Option<VelocityCommand>, CommError> {
        let mut latest = None;
        loop {
            let (len, sender) = match self.socket.recv_from(&mut self.buf) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_slice::<VelocityCommand>(&self.buf[..len]) {
                Ok(command) if command.linear.is_finite() && command.angular.is_finite() => {
                    trace!(%sender, ?command, "command received");
                    self.last_sender = Some(sender);
                    latest = Some(command);
                }
                Ok(command) => warn!(%sender, ?command, "dropping non-finite command"),
                Err(e) => warn!(%sender, len, "dropping malformed command: {e}"),
            }
        }
        Ok(latest)
    }

    fn publish_odometry(&mut self, odometry: &OdometryEstimate) -> Result<(), CommError> {
        let Some(target) = self.peer.or(self.last_sender) else {
            return Ok(());
        };
        let payload = serde_json::to_vec(odometry)?;
        match self.socket.send_to(&payload, target) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                trace!(%target, "odometry dropped, socket busy");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ─── Thread ─────────────────────────────────────────────────────────

/// Spawn the communication thread.
///
/// Each poll forwards the newest received command into `exchange` and sends the
/// newest odometry estimate if the control loop published one since the last
/// send. Exits once `shutdown` is set.
pub fn spawn_comm_thread<L>(
    mut link: L,
    exchange: Arc<CommandExchange>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
) -> io::Result<JoinHandle<()>>
where
    L: CommLink + 'static,
{
    thread::Builder::new()
        .name("comm".to_string())
        .spawn(move || {
            let mut last_sent = 0;
            while !shutdown.load(Ordering::Acquire) {
                match link.receive_command() {
                    Ok(Some(command)) => exchange.publish_command(command),
                    Ok(None) => {}
                    Err(e) => warn!("command receive failed: {e}"),
                }

                if let Some((seq, odometry)) = exchange.odometry_since(last_sent) {
                    if let Err(e) = link.publish_odometry(&odometry) {
                        debug!("odometry publish failed: {e}");
                    }
                    last_sent = seq;
                }

                thread::sleep(poll_interval);
            }
            debug!("communication thread stopped");
        })
}
