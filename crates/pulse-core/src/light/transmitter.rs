//! Rate-limited transmit loop.
//!
//! Polls the shared target on a short tick and pushes it to every bulb at most
//! once per `min_send_interval`. Sends are fire-and-forget with a per-send
//! timeout; one dead bulb never holds up the others or the tick.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::color::Rgb;
use super::controller::BulbTarget;
use super::protocol::{self, Pilot};
use crate::config::LightConfig;

/// Targets below this are sent as blackout (black at the floor brightness).
const BLACKOUT_BELOW: u8 = 5;

/// Lowest dimming the bulbs accept.
const MIN_SENT_DIMMING: u8 = 10;

#[derive(Debug, Clone, Copy)]
pub struct SendTiming {
    pub tick: Duration,
    pub min_send_interval: Duration,
    pub send_timeout: Duration,
}

impl From<&LightConfig> for SendTiming {
    fn from(config: &LightConfig) -> Self {
        Self {
            tick: config.tick(),
            min_send_interval: config.min_send_interval(),
            send_timeout: config.send_timeout(),
        }
    }
}

/// The `setPilot` params actually put on the wire for a target.
pub fn outgoing_pilot(target: &BulbTarget) -> Pilot {
    let color = if target.dimming < BLACKOUT_BELOW {
        Rgb::BLACK
    } else {
        target.color
    };
    Pilot {
        r: Some(color.r),
        g: Some(color.g),
        b: Some(color.b),
        dimming: Some(target.dimming.clamp(MIN_SENT_DIMMING, 100)),
        ..Pilot::default()
    }
}

/// Handle to the running transmit task.
pub struct Transmitter {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Transmitter {
    pub fn spawn(
        socket: Arc<UdpSocket>,
        bulbs: Vec<SocketAddr>,
        targets: watch::Receiver<BulbTarget>,
        timing: SendTiming,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_transmit_loop(
            socket,
            bulbs,
            targets,
            timing,
            cancel.clone(),
        ));
        Self { cancel, handle }
    }

    /// Stop the loop and wait up to `join_timeout` for it to finish.
    /// Returns `false` if it had to be aborted.
    pub async fn shutdown(mut self, join_timeout: Duration) -> bool {
        self.cancel.cancel();
        join_or_abort(&mut self.handle, join_timeout).await
    }
}

/// Wait up to `budget` for `handle`; past that, abort it and wait until the
/// task is really gone. Returns `false` on abort.
async fn join_or_abort(handle: &mut JoinHandle<()>, budget: Duration) -> bool {
    match tokio::time::timeout(budget, &mut *handle).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("Transmit task ended abnormally: {}", e);
            true
        }
        Err(_) => {
            warn!("Transmit task did not stop within {:?}, aborting", budget);
            handle.abort();
            let _ = handle.await;
            false
        }
    }
}

async fn run_transmit_loop(
    socket: Arc<UdpSocket>,
    bulbs: Vec<SocketAddr>,
    targets: watch::Receiver<BulbTarget>,
    timing: SendTiming,
    cancel: CancellationToken,
) {
    info!(
        "Transmit loop started: {} bulb(s), tick {:?}, interval {:?}",
        bulbs.len(),
        timing.tick,
        timing.min_send_interval
    );

    let mut ticker = tokio::time::interval(timing.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_sent: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        if let Some(last) = last_sent {
            if now.duration_since(last) <= timing.min_send_interval {
                continue;
            }
        }

        // Copy out so the borrow (and its read lock) ends before any await
        let target = *targets.borrow();
        match protocol::encode_set_pilot(&outgoing_pilot(&target)) {
            Ok(payload) => send_all(&socket, &bulbs, &payload, timing.send_timeout).await,
            Err(e) => warn!("Failed to encode pilot: {}", e),
        }
        last_sent = Some(now);
    }

    debug!("Transmit loop stopped");
}

/// One datagram to every address; failures are logged per bulb and dropped.
async fn send_all(socket: &UdpSocket, bulbs: &[SocketAddr], payload: &[u8], timeout: Duration) {
    for addr in bulbs {
        match tokio::time::timeout(timeout, socket.send_to(payload, addr)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("Send to {} failed: {}", addr, e),
            Err(_) => debug!("Send to {} timed out", addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(dimming: u8) -> BulbTarget {
        BulbTarget {
            color: Rgb::new(12, 200, 255),
            dimming,
            last_beat: None,
        }
    }

    #[test]
    fn blackout_sends_black_at_floor() {
        for dimming in 0..BLACKOUT_BELOW {
            let pilot = outgoing_pilot(&target(dimming));
            assert_eq!(pilot.dimming, Some(10));
            assert_eq!((pilot.r, pilot.g, pilot.b), (Some(0), Some(0), Some(0)));
        }
    }

    #[test]
    fn dim_targets_are_floored_at_ten() {
        let pilot = outgoing_pilot(&target(7));
        assert_eq!(pilot.dimming, Some(10));
        assert_eq!(pilot.g, Some(200));
    }

    #[test]
    fn bright_targets_pass_through() {
        let pilot = outgoing_pilot(&target(73));
        assert_eq!(pilot.dimming, Some(73));
        assert_eq!((pilot.r, pilot.g, pilot.b), (Some(12), Some(200), Some(255)));
        assert_eq!(pilot.state, None);
        assert_eq!(pilot.scene_id, None);
    }

    #[test]
    fn sent_dimming_never_below_floor() {
        for dimming in 0..=100u8 {
            let sent = outgoing_pilot(&target(dimming)).dimming.unwrap();
            assert!(sent >= MIN_SENT_DIMMING);
            assert!(sent <= 100);
        }
    }

    #[tokio::test]
    async fn shutdown_stops_an_idle_loop() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let (_tx, rx) = watch::channel(BulbTarget::default());
        let timing = SendTiming::from(&LightConfig::default());
        let tx = Transmitter::spawn(socket, Vec::new(), rx, timing);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(tx.shutdown(Duration::from_millis(500)).await);
    }

    /// Count datagrams until the socket has been quiet for 20 ms.
    async fn drain(socket: &UdpSocket) -> usize {
        let mut buf = [0u8; 512];
        let mut count = 0;
        while let Ok(Ok(_)) =
            tokio::time::timeout(Duration::from_millis(20), socket.recv_from(&mut buf)).await
        {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn shutdown_while_sending_is_prompt_and_final() {
        let bulb = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let (_tx, rx) = watch::channel(target(60));
        let timing = SendTiming {
            tick: Duration::from_millis(5),
            min_send_interval: Duration::from_millis(10),
            send_timeout: Duration::from_millis(5),
        };
        let tx = Transmitter::spawn(socket, vec![bulb.local_addr().unwrap()], rx, timing);

        let mut buf = [0u8; 512];
        tokio::time::timeout(Duration::from_secs(1), bulb.recv_from(&mut buf))
            .await
            .expect("loop should be sending")
            .unwrap();

        assert!(tx.shutdown(timing.tick * 4).await);

        drain(&bulb).await;
        tokio::time::sleep(timing.min_send_interval * 5).await;
        assert_eq!(drain(&bulb).await, 0, "pilot sent after shutdown returned");
    }

    #[tokio::test]
    async fn stuck_task_is_aborted_and_gone_before_return() {
        let bulb = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = bulb.local_addr().unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        // Ignores cancellation and keeps sending
        let mut handle = tokio::spawn(async move {
            loop {
                let _ = socket.send_to(b"{}", addr).await;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        let mut buf = [0u8; 64];
        tokio::time::timeout(Duration::from_secs(1), bulb.recv_from(&mut buf))
            .await
            .expect("task should be sending")
            .unwrap();

        assert!(!join_or_abort(&mut handle, Duration::from_millis(10)).await);
        assert!(handle.is_finished());

        drain(&bulb).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(drain(&bulb).await, 0, "datagram sent after abort returned");
    }

    #[tokio::test(start_paused = true)]
    async fn sends_are_spaced_by_the_minimum_interval() {
        let bulb = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let (_tx, rx) = watch::channel(target(60));
        // 5 ms tick, 40 ms interval: a send every 45 ms of paused time
        let timing = SendTiming::from(&LightConfig::default());
        let tx = Transmitter::spawn(socket, vec![bulb.local_addr().unwrap()], rx, timing);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(tx.shutdown(Duration::from_millis(100)).await);

        let sent = drain(&bulb).await;
        assert!((11..=12).contains(&sent), "sent {sent} pilots in 500 ms");
    }
}
