//! Background expiry of silent producers and old tombstones.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use waypost_registry::{RegistrationDb, SweepReport};

pub struct Sweeper {
    registry: Arc<RegistrationDb>,
    inactive_timeout: Duration,
    tombstone_lifetime: Duration,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl Sweeper {
    pub fn new(
        registry: Arc<RegistrationDb>,
        inactive_timeout: Duration,
        tombstone_lifetime: Duration,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            registry,
            inactive_timeout,
            tombstone_lifetime,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(interval = ?self.interval, "sweeper started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("sweeper shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep_once(Instant::now());
                }
            }
        }
    }

    /// One pass over the registry as of `now`.
    pub fn sweep_once(&self, now: Instant) -> SweepReport {
        let report = self
            .registry
            .sweep(now, self.inactive_timeout, self.tombstone_lifetime);

        for (id, keys) in &report.evicted {
            tracing::info!(
                producer = %id,
                registrations = keys.len(),
                timeout = ?self.inactive_timeout,
                "evicted inactive producer"
            );
        }
        for (key, id) in &report.purged {
            tracing::info!(producer = %id, registration = %key, "purged expired tombstone");
        }
        report
    }
}
