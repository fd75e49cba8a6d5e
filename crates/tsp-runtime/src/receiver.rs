//! UDP intake for priority schedules.
//!
//! Each datagram carries one complete schedule document. Rejected datagrams
//! are logged and dropped; the loop only ends on a socket error or when the
//! shutdown future resolves.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use tsp_core::config::ReceiverConfig;

use crate::error::Result;
use crate::manager::ScheduleManager;

pub struct ScheduleReceiver {
    socket: UdpSocket,
    manager: Arc<ScheduleManager>,
    max_datagram_bytes: usize,
}

impl ScheduleReceiver {
    pub async fn bind(config: &ReceiverConfig, manager: Arc<ScheduleManager>) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind.as_str()).await?;
        info!(addr = %socket.local_addr()?, "schedule receiver listening");
        Ok(Self {
            socket,
            manager,
            max_datagram_bytes: config.max_datagram_bytes,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive and install schedules until `shutdown` resolves.
    ///
    /// Returns the number of schedules installed.
    pub async fn run<S>(self, shutdown: S) -> Result<usize>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut buf = vec![0u8; self.max_datagram_bytes];
        let mut installed = 0;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(installed, "schedule receiver stopping");
                    return Ok(installed);
                }
                recv = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = recv?;
                    if self.handle_datagram(&buf[..len], peer) {
                        installed += 1;
                    }
                }
            }
        }
    }

    fn handle_datagram(&self, payload: &[u8], peer: SocketAddr) -> bool {
        debug!(%peer, bytes = payload.len(), "datagram received");
        let text = match std::str::from_utf8(payload) {
            Ok(t) => t,
            Err(e) => {
                warn!(%peer, error = %e, "dropping non-UTF-8 datagram");
                return false;
            }
        };
        match self.manager.process_schedule_json(text) {
            Ok(report) => {
                debug!(%peer, groups = report.plan.len(), "schedule accepted");
                true
            }
            Err(e) => {
                warn!(%peer, error = %e, "schedule rejected");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
