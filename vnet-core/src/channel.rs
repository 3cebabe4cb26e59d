//! Pluggable packet-routing policies.
//!
//! The fabric hands every routed packet to the active [`Channel`], which
//! decides whether, when, and how it reaches its consumer. The base policy
//! is immediate delivery; [`Lossy`] and [`Delayed`] wrap another channel to
//! simulate an unreliable internet and compose freely. CLOSE packets never
//! reach a channel at all: [`Internet::send`](crate::Internet::send)
//! delivers them directly, so no policy can interfere with teardown.

use crate::{internet::PacketConsumer, packet::Packet};
use async_trait::async_trait;
use std::sync::Arc;

/// Decides whether and when a routed packet reaches its consumer.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Routes `packet` toward `consumer`.
    async fn route(&self, consumer: Arc<dyn PacketConsumer>, packet: Packet);
}

/// Delivers every packet immediately. The default policy.
pub struct Passthrough;

#[async_trait]
impl Channel for Passthrough {
    async fn route(&self, consumer: Arc<dyn PacketConsumer>, packet: Packet) {
        consumer.accept(packet);
    }
}

mod lossy;
pub use lossy::Lossy;

mod delayed;
pub use delayed::Delayed;
