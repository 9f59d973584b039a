//! Bulb discovery, original-state capture, and shutdown restore.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::protocol::{self, Pilot};
use crate::error::{LightError, Result};

const RECV_BUF_LEN: usize = 2048;

/// Upper bound for a single restore datagram.
const RESTORE_SEND_TIMEOUT: Duration = Duration::from_millis(200);

/// Known bulbs and what they looked like before the run.
#[derive(Debug, Clone, Default)]
pub struct BulbRegistry {
    bulbs: Vec<SocketAddr>,
    originals: HashMap<SocketAddr, Pilot>,
}

impl BulbRegistry {
    pub fn new(bulbs: Vec<SocketAddr>) -> Self {
        let mut unique = Vec::with_capacity(bulbs.len());
        for addr in bulbs {
            if !unique.contains(&addr) {
                unique.push(addr);
            }
        }
        Self {
            bulbs: unique,
            originals: HashMap::new(),
        }
    }

    pub fn addresses(&self) -> &[SocketAddr] {
        &self.bulbs
    }

    pub fn is_empty(&self) -> bool {
        self.bulbs.is_empty()
    }

    pub fn original(&self, addr: &SocketAddr) -> Option<&Pilot> {
        self.originals.get(addr)
    }

    /// Query every bulb once. Bulbs that do not answer in time keep running
    /// but will not be restored. Returns how many states were captured.
    pub async fn capture_originals(&mut self, socket: &UdpSocket, timeout: Duration) -> usize {
        for addr in &self.bulbs {
            match query_pilot(socket, *addr, timeout).await {
                Ok(pilot) => {
                    debug!("Captured state of {}: {:?}", addr, pilot);
                    self.originals.insert(*addr, pilot);
                }
                Err(e) => warn!("No original state for {}, it will not be restored: {}", addr, e),
            }
        }
        self.originals.len()
    }

    /// Replay the captured state of every bulb, then wait `settle` so the
    /// datagrams leave before the process exits. Consumes the registry.
    pub async fn restore(self, socket: &UdpSocket, settle: Duration) -> usize {
        let mut restored = 0;
        for addr in &self.bulbs {
            let Some(params) = self.originals.get(addr).and_then(Pilot::restore_params) else {
                continue;
            };
            let payload = match protocol::encode_set_pilot(&params) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Failed to encode restore for {}: {}", addr, e);
                    continue;
                }
            };
            match tokio::time::timeout(RESTORE_SEND_TIMEOUT, socket.send_to(&payload, addr)).await {
                Ok(Ok(_)) => {
                    debug!("Restored {}: {:?}", addr, params);
                    restored += 1;
                }
                Ok(Err(e)) => warn!("Restore of {} failed: {}", addr, e),
                Err(_) => warn!("Restore of {} timed out", addr),
            }
        }
        if restored > 0 {
            tokio::time::sleep(settle).await;
        }
        info!("Restored {} of {} bulb(s)", restored, self.bulbs.len());
        restored
    }
}

/// Broadcast `getPilot` and collect every responder for `window`.
pub async fn discover(
    socket: &UdpSocket,
    target: SocketAddr,
    window: Duration,
) -> Result<Vec<SocketAddr>> {
    socket.set_broadcast(true)?;
    socket.send_to(&protocol::encode_get_pilot()?, target).await?;
    info!("Discovery broadcast sent to {}", target);

    let deadline = Instant::now() + window;
    let mut found = Vec::new();
    let mut buf = [0u8; RECV_BUF_LEN];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok((_, from))) => {
                if !found.contains(&from) {
                    info!("Found bulb at {}", from);
                    found.push(from);
                }
            }
            Ok(Err(e)) => debug!("Discovery receive error: {}", e),
            Err(_) => break,
        }
    }
    Ok(found)
}

/// Ask one bulb for its current state. Datagrams from other addresses and
/// receive errors are skipped; the whole exchange is bounded by `timeout`.
pub async fn query_pilot(socket: &UdpSocket, addr: SocketAddr, timeout: Duration) -> Result<Pilot> {
    socket.send_to(&protocol::encode_get_pilot()?, addr).await?;

    let exchange = async {
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, from)) if from == addr => {
                    return protocol::decode_pilot_reply(&buf[..len]);
                }
                Ok((_, from)) => debug!("Ignoring datagram from {} while querying {}", from, addr),
                // Windows reports an earlier ICMP port-unreachable here
                Err(e) => debug!("Receive error while querying {}: {}", addr, e),
            }
        }
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| LightError::Timeout(timeout))?
}
