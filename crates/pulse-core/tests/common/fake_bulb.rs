#![allow(dead_code)]

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A bulb on a localhost UDP port. Answers `getPilot` with `state` (or stays
/// silent when `state` is `None`) and records the params of every `setPilot`.
pub struct FakeBulb {
    pub addr: SocketAddr,
    received: mpsc::UnboundedReceiver<Value>,
    task: JoinHandle<()>,
}

impl FakeBulb {
    pub async fn spawn(state: Option<Value>) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("fake bulb should bind");
        let addr = socket.local_addr().expect("bound socket has an address");
        let (tx, received) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    continue;
                };
                let Ok(msg) = serde_json::from_slice::<Value>(&buf[..len]) else {
                    continue;
                };
                match msg["method"].as_str() {
                    Some("getPilot") => {
                        if let Some(state) = &state {
                            let reply = json!({"method": "getPilot", "env": "pro", "result": state});
                            let _ = socket.send_to(reply.to_string().as_bytes(), from).await;
                        }
                    }
                    Some("setPilot") => {
                        let _ = tx.send(msg["params"].clone());
                    }
                    _ => {}
                }
            }
        });

        Self {
            addr,
            received,
            task,
        }
    }

    /// Next `setPilot` params, or `None` if nothing arrives within `wait`.
    pub async fn next_set_pilot(&mut self, wait: Duration) -> Option<Value> {
        tokio::time::timeout(wait, self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Everything that arrives until the line goes quiet for `quiet`.
    pub async fn drain(&mut self, quiet: Duration) -> Vec<Value> {
        let mut out = Vec::new();
        while let Some(v) = self.next_set_pilot(quiet).await {
            out.push(v);
        }
        out
    }

    /// Wait for the first `setPilot` whose params satisfy `pred`.
    pub async fn wait_for<F>(&mut self, wait: Duration, mut pred: F) -> Option<Value>
    where
        F: FnMut(&Value) -> bool,
    {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let v = self.next_set_pilot(remaining).await?;
            if pred(&v) {
                return Some(v);
            }
        }
    }
}

impl Drop for FakeBulb {
    fn drop(&mut self) {
        self.task.abort();
    }
}
