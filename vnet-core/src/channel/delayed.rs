use super::{Channel, Passthrough};
use crate::{internet::PacketConsumer, packet::Packet};
use async_trait::async_trait;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

/// Holds each packet for a random duration, up to a fixed ceiling, before
/// delegating to the wrapped channel. Concurrent deliveries sleep
/// independently, so this also reorders.
pub struct Delayed {
    rng: Mutex<SmallRng>,
    ceiling: Duration,
    inner: Arc<dyn Channel>,
}

impl Delayed {
    /// The delay ceiling used by [`Delayed::default`].
    pub const DEFAULT_CEILING: Duration = Duration::from_secs(7);

    /// A delayed channel that delivers directly after the delay.
    pub fn new(ceiling: Duration) -> Self {
        Self::wrapping(Arc::new(Passthrough), ceiling)
    }

    /// Decorates `inner`, delaying packets before they reach it.
    pub fn wrapping(inner: Arc<dyn Channel>, ceiling: Duration) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(0xDE1A7)),
            ceiling,
            inner,
        }
    }
}

impl Default for Delayed {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CEILING)
    }
}

#[async_trait]
impl Channel for Delayed {
    async fn route(&self, consumer: Arc<dyn PacketConsumer>, packet: Packet) {
        let delay = self.rng.lock().unwrap().gen_range(Duration::ZERO..self.ceiling);
        tokio::time::sleep(delay).await;
        self.inner.route(consumer, packet).await;
    }
}
