use super::{Channel, Passthrough};
use crate::{internet::PacketConsumer, packet::Packet};
use async_trait::async_trait;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::sync::{Arc, Mutex};

/// Drops packets with a fixed probability before delegating to the wrapped
/// channel.
pub struct Lossy {
    rng: Mutex<SmallRng>,
    loss_probability: f64,
    inner: Arc<dyn Channel>,
}

impl Lossy {
    /// The drop probability used by [`Lossy::default`].
    pub const DEFAULT_LOSS: f64 = 0.1;

    /// A lossy channel that delivers directly whenever it does not drop.
    pub fn new(loss_probability: f64) -> Self {
        Self::wrapping(Arc::new(Passthrough), loss_probability)
    }

    /// Decorates `inner`, dropping packets before they reach it.
    pub fn wrapping(inner: Arc<dyn Channel>, loss_probability: f64) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(0xBAD5EED)),
            loss_probability,
            inner,
        }
    }
}

impl Default for Lossy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LOSS)
    }
}

#[async_trait]
impl Channel for Lossy {
    async fn route(&self, consumer: Arc<dyn PacketConsumer>, packet: Packet) {
        let dropped = self.rng.lock().unwrap().gen_bool(self.loss_probability);
        if dropped {
            tracing::debug!(?packet, "lossy channel dropped a packet");
            return;
        }
        self.inner.route(consumer, packet).await;
    }
}
