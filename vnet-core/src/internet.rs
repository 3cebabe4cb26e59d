//! The fabric connecting ports to endpoints.
//!
//! An [`Internet`] is the one piece of shared mutable state in a simulation:
//! a concurrent registry from port numbers to packet consumers, plus the
//! active [`Channel`] every routed packet passes through. Construct one per
//! simulation and share it with [`Arc`]; nothing here is a process global,
//! so tests can run isolated fabrics in parallel.

use crate::{
    channel::{Channel, Passthrough},
    packet::{Packet, PacketType},
    FxDashMap,
};
use dashmap::mapref::entry::Entry;
use rand::Rng;
use std::sync::{Arc, RwLock};
use thiserror::Error as ThisError;

/// A port number. The `u16` range is exactly the simulated address space.
pub type Port = u16;

/// The number of distinct ports.
pub const PORT_SPACE: usize = 1 << 16;

/// Anything capable of consuming a packet delivered by the fabric.
pub trait PacketConsumer: Send + Sync {
    /// Handles one inbound packet.
    fn accept(&self, packet: Packet);
}

/// The virtual internet: routes packets to registered endpoints.
pub struct Internet {
    ports: FxDashMap<Port, Arc<dyn PacketConsumer>>,
    channel: RwLock<Arc<dyn Channel>>,
}

impl Internet {
    /// A fresh, empty fabric with the default pass-through channel.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ports: FxDashMap::default(),
            channel: RwLock::new(Arc::new(Passthrough)),
        })
    }

    /// Registers an endpoint on `port`.
    ///
    /// Fails without touching the existing registration if the port is
    /// taken. Callers must treat that as fatal misuse, not retry it.
    pub fn register(
        &self,
        port: Port,
        consumer: Arc<dyn PacketConsumer>,
    ) -> Result<(), RegisterError> {
        match self.ports.entry(port) {
            Entry::Occupied(_) => Err(RegisterError::Occupied(port)),
            Entry::Vacant(entry) => {
                entry.insert(consumer);
                Ok(())
            }
        }
    }

    /// Removes the endpoint on `port`. A no-op if the port is free.
    pub fn unregister(&self, port: Port) {
        self.ports.remove(&port);
    }

    /// Hands `packet` to the endpoint on `port` through the active channel.
    ///
    /// Dispatch is fire-and-forget: each delivery runs on its own task, and
    /// this returning says nothing about whether the packet ever arrives.
    /// CLOSE packets skip the channel entirely; teardown signaling is not
    /// subject to simulated unreliability.
    pub fn send(&self, port: Port, packet: Packet) -> Result<(), SendError> {
        let consumer = self
            .ports
            .get(&port)
            .map(|entry| entry.value().clone())
            .ok_or(SendError::UnknownPort(port))?;
        let channel = self.channel.read().unwrap().clone();
        tokio::spawn(async move {
            if packet.header().ty == PacketType::Close {
                consumer.accept(packet);
            } else {
                channel.route(consumer, packet).await;
            }
        });
        Ok(())
    }

    /// Finds an unused port.
    ///
    /// Random probing is expected O(1) while the registry is sparse; past
    /// half occupancy a linear scan takes over, which terminates even when
    /// nearly every port is taken.
    pub fn free_port(&self) -> Result<Port, FreePortError> {
        if self.ports.len() >= PORT_SPACE {
            return Err(FreePortError::Exhausted);
        }
        if self.ports.len() >= PORT_SPACE / 2 {
            return (0..=Port::MAX)
                .find(|port| !self.ports.contains_key(port))
                .ok_or(FreePortError::Exhausted);
        }
        let mut rng = rand::thread_rng();
        loop {
            let port = rng.gen::<Port>();
            if !self.ports.contains_key(&port) {
                return Ok(port);
            }
        }
    }

    /// Replaces the routing policy. A hook for tests and simulations.
    pub fn set_channel(&self, channel: Arc<dyn Channel>) {
        *self.channel.write().unwrap() = channel;
    }
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    #[error("port {0} is already allocated")]
    Occupied(Port),
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("no endpoint is registered on port {0}")]
    UnknownPort(Port),
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum FreePortError {
    #[error("no free port could be found")]
    Exhausted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Delayed, Lossy};
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedSender};

    /// Forwards everything it accepts into an mpsc channel.
    struct Forward(UnboundedSender<Packet>);

    impl PacketConsumer for Forward {
        fn accept(&self, packet: Packet) {
            self.0.send(packet).unwrap();
        }
    }

    /// Swallows everything it accepts.
    struct Sink;

    impl PacketConsumer for Sink {
        fn accept(&self, _packet: Packet) {}
    }

    #[test]
    fn occupied_ports_cannot_be_reregistered() {
        let internet = Internet::new();
        internet.register(80, Arc::new(Sink)).unwrap();
        assert_eq!(
            internet.register(80, Arc::new(Sink)),
            Err(RegisterError::Occupied(80))
        );
        internet.unregister(80);
        internet.register(80, Arc::new(Sink)).unwrap();
    }

    #[test]
    fn unregistering_a_free_port_is_a_no_op() {
        let internet = Internet::new();
        internet.unregister(1234);
        internet.register(1234, Arc::new(Sink)).unwrap();
    }

    #[test]
    fn free_ports_are_actually_free() {
        let internet = Internet::new();
        for _ in 0..50 {
            let port = internet.free_port().unwrap();
            internet.register(port, Arc::new(Sink)).unwrap();
        }
    }

    #[test]
    fn free_port_scans_linearly_once_the_registry_is_half_full() {
        let internet = Internet::new();
        for port in 0..(PORT_SPACE / 2) as u32 {
            internet.register(port as Port, Arc::new(Sink)).unwrap();
        }
        assert_eq!(internet.free_port(), Ok((PORT_SPACE / 2) as Port));
    }

    #[test]
    fn a_full_registry_has_no_free_port() {
        let internet = Internet::new();
        let sink: Arc<dyn PacketConsumer> = Arc::new(Sink);
        for port in 0..=Port::MAX {
            internet.register(port, sink.clone()).unwrap();
        }
        assert_eq!(internet.free_port(), Err(FreePortError::Exhausted));
    }

    #[tokio::test]
    async fn sending_to_an_unregistered_port_fails() {
        let internet = Internet::new();
        let packet = Packet::new(1, 9, 5, PacketType::Ack, None);
        assert_eq!(internet.send(9, packet), Err(SendError::UnknownPort(9)));
    }

    #[tokio::test(start_paused = true)]
    async fn send_returns_before_the_packet_is_delivered() {
        let internet = Internet::new();
        internet.set_channel(Arc::new(Delayed::new(Duration::from_secs(1))));
        let (sender, mut receiver) = mpsc::unbounded_channel();
        internet.register(9, Arc::new(Forward(sender))).unwrap();

        internet
            .send(9, Packet::new(1, 9, 5, PacketType::Ack, None))
            .unwrap();
        assert!(receiver.try_recv().is_err());
        assert_eq!(receiver.recv().await.unwrap().header().sequence_number, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn close_packets_bypass_even_a_total_loss_channel() {
        let internet = Internet::new();
        internet.set_channel(Arc::new(Lossy::new(1.0)));
        let (sender, mut receiver) = mpsc::unbounded_channel();
        internet.register(9, Arc::new(Forward(sender))).unwrap();

        internet
            .send(9, Packet::new(1, 9, 3, PacketType::Data, Some("gone")))
            .unwrap();
        internet
            .send(9, Packet::new(1, 9, u32::MAX, PacketType::Close, None))
            .unwrap();

        let delivered = receiver.recv().await.unwrap();
        assert_eq!(delivered.header().ty, PacketType::Close);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(receiver.try_recv().is_err());
    }
}
