//! Smart-bulb control driven by the bass envelope.
//!
//! ```text
//!   processing thread                      tokio runtime
//!   ─────────────────                      ─────────────
//!   LightStateController::update(bass)
//!         │ send_replace(BulbTarget)
//!         └──────── watch ────────────────► Transmitter (tick / rate limit)
//!                                                 │ setPilot
//!                                                 ▼
//!                                           bulbs (UDP)
//! ```
//!
//! [`LightSession`] owns the transmit task and the bulb registry for the
//! lifetime of a run, and puts the bulbs back the way it found them.

pub mod color;
pub mod controller;
pub mod protocol;
pub mod registry;
pub mod transmitter;

use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::info;

use crate::config::LightConfig;
use crate::error::Result;

pub use color::Rgb;
pub use controller::{BulbTarget, LightStateController};
pub use registry::BulbRegistry;
pub use transmitter::{SendTiming, Transmitter};

pub struct LightSession {
    config: LightConfig,
    socket: Arc<UdpSocket>,
    registry: BulbRegistry,
    transmitter: Transmitter,
}

impl LightSession {
    /// Find bulbs, capture their state and start transmitting.
    ///
    /// Returns `Ok(None)` when no bulb is known; the caller then runs
    /// without light control.
    pub async fn start(config: &LightConfig) -> Result<Option<(LightStateController, LightSession)>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;

        let static_bulbs = config.static_bulbs()?;
        let bulbs = if static_bulbs.is_empty() {
            registry::discover(&socket, config.broadcast_target()?, config.discovery_timeout()).await?
        } else {
            info!("Using {} configured bulb(s), skipping discovery", static_bulbs.len());
            static_bulbs
        };

        let mut registry = BulbRegistry::new(bulbs);
        if registry.is_empty() {
            info!("No bulbs found, light control disabled");
            return Ok(None);
        }

        let captured = registry
            .capture_originals(&socket, config.query_timeout())
            .await;
        info!(
            "Captured original state of {} of {} bulb(s)",
            captured,
            registry.addresses().len()
        );

        let socket = Arc::new(socket);
        let (publisher, targets) = watch::channel(BulbTarget::default());
        let transmitter = Transmitter::spawn(
            Arc::clone(&socket),
            registry.addresses().to_vec(),
            targets,
            SendTiming::from(config),
        );
        let controller = LightStateController::new(config, publisher);

        Ok(Some((
            controller,
            LightSession {
                config: config.clone(),
                socket,
                registry,
                transmitter,
            },
        )))
    }

    pub fn registry(&self) -> &BulbRegistry {
        &self.registry
    }

    /// Stop transmitting, then restore every bulb with a captured state.
    /// Returns how many bulbs were restored.
    pub async fn shutdown(self) -> usize {
        // The loop must be gone before restore so no regular send races it
        self.transmitter.shutdown(self.config.join_timeout()).await;
        self.registry
            .restore(&self.socket, self.config.settle_delay())
            .await
    }
}
