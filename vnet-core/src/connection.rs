//! The per-connection mailbox and its send path.

use crate::{
    internet::{Internet, Port, SendError},
    packet::{Packet, PacketType},
    retry::TransportError,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    Mutex,
};

/// One end of a conversation between two ports.
///
/// A connection owns the inbound mailbox for its (source, destination) port
/// pair: an unbounded, ordered queue fed by the fabric and drained by the
/// owning state machine. It is never shared between unrelated endpoint
/// pairs, and it lives exactly as long as the state machine that opened it.
pub struct Connection {
    source_port: Port,
    destination_port: Port,
    internet: Arc<Internet>,
    mailbox: UnboundedSender<Packet>,
    inbound: Mutex<UnboundedReceiver<Packet>>,
}

impl Connection {
    /// A connection from `source_port` to `destination_port` with a fresh,
    /// empty mailbox.
    pub fn new(internet: Arc<Internet>, source_port: Port, destination_port: Port) -> Self {
        let (mailbox, inbound) = mpsc::unbounded_channel();
        Self {
            source_port,
            destination_port,
            internet,
            mailbox,
            inbound: Mutex::new(inbound),
        }
    }

    /// The local port of this connection.
    pub fn source_port(&self) -> Port {
        self.source_port
    }

    /// The remote port of this connection.
    pub fn destination_port(&self) -> Port {
        self.destination_port
    }

    /// Enqueues an inbound packet. Never blocks and never fails: the
    /// connection owns the receiving half, so the queue outlives every
    /// sender that can reach it.
    pub fn add_packet(&self, packet: Packet) {
        let _ = self.mailbox.send(packet);
    }

    /// Waits until a packet is available. Cancelling the owning task is the
    /// way to give up on this wait.
    pub async fn wait_for_packet(&self) -> Result<Packet, TransportError> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Closed)
    }

    /// Waits up to `timeout` for a packet.
    pub async fn wait_for_packet_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Packet, TransportError> {
        match tokio::time::timeout(timeout, self.wait_for_packet()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Builds a packet addressed to the remote port and hands it to the
    /// fabric.
    pub fn send_packet(
        &self,
        sequence_number: u32,
        ty: PacketType,
        data: Option<&str>,
    ) -> Result<(), SendError> {
        self.internet.send(
            self.destination_port,
            Packet::new(
                self.source_port,
                self.destination_port,
                sequence_number,
                ty,
                data,
            ),
        )
    }
}
