//! The client half of the transport state machine.

use crate::{
    connection::Connection,
    internet::{Internet, PacketConsumer, Port},
    packet::{Packet, PacketType, EOF, MAX_SEGMENT},
    retry::{with_retry, TransportError, REPLY_TIMEOUT},
};
use rand::Rng;
use std::sync::{Arc, Weak};

/// A TCP-like client.
///
/// Holds exactly one fabric port and one [`Connection`] for its lifetime,
/// moving through Disconnected → Connecting → Connected → Closed. Every
/// operation validates the peer's replies and propagates failures; only
/// [`close`](TcpClient::close) is best-effort.
pub struct TcpClient {
    internet: Arc<Internet>,
    port: Port,
    connection: Option<Arc<Connection>>,
    sequence: u32,
}

impl TcpClient {
    /// Allocates a free port, registers the client's inbox on it, and
    /// prepares a connection to `server_port`. The handshake happens later,
    /// in [`connect`](TcpClient::connect).
    pub fn new(internet: Arc<Internet>, server_port: Port) -> Result<Self, TransportError> {
        let port = internet.free_port()?;
        let connection = Arc::new(Connection::new(internet.clone(), port, server_port));
        let inbox = Arc::new(Inbox {
            port,
            internet: internet.clone(),
            connection: Arc::downgrade(&connection),
        });
        internet.register(port, inbox)?;
        Ok(Self {
            internet,
            port,
            connection: Some(connection),
            sequence: rand::thread_rng().gen_range(1..1000),
        })
    }

    /// The fabric port this client answers on.
    pub fn port(&self) -> Port {
        self.port
    }

    fn connection(&self) -> Result<&Arc<Connection>, TransportError> {
        self.connection.as_ref().ok_or(TransportError::Closed)
    }

    /// Performs the SYN handshake with the server.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        let conn = self.connection()?.clone();
        let sequence = self.sequence;
        let reply = with_retry(
            || {
                let conn = conn.clone();
                async move {
                    conn.send_packet(sequence, PacketType::Syn, None)?;
                    conn.wait_for_packet_timeout(REPLY_TIMEOUT).await
                }
            },
            sequence + 1,
        )
        .await?;
        reply.expect_type(PacketType::Syn)?;
        reply.expect_sequence_number(sequence + 1)?;
        reply.validate_checksum()?;
        self.sequence = sequence + 2;
        Ok(())
    }

    /// Uploads `data` of arbitrary length, chunked into
    /// [`MAX_SEGMENT`]-character pieces and terminated by an [`EOF`] chunk,
    /// waiting for the matching acknowledgment after every chunk.
    pub async fn send(&mut self, data: &str) -> Result<(), TransportError> {
        let mut remaining = data;
        while !remaining.is_empty() {
            let split = remaining
                .char_indices()
                .nth(MAX_SEGMENT)
                .map_or(remaining.len(), |(index, _)| index);
            let (chunk, rest) = remaining.split_at(split);
            remaining = rest;
            self.send_chunk(chunk).await?;
        }
        self.send_chunk(EOF).await
    }

    async fn send_chunk(&mut self, chunk: &str) -> Result<(), TransportError> {
        let conn = self.connection()?.clone();
        let sequence = self.sequence;
        let expected = sequence + 1 + chunk.chars().count() as u32;
        let ack = with_retry(
            || {
                let conn = conn.clone();
                async move {
                    conn.send_packet(sequence, PacketType::Data, Some(chunk))?;
                    conn.wait_for_packet_timeout(REPLY_TIMEOUT).await
                }
            },
            expected,
        )
        .await?;
        ack.expect_type(PacketType::Ack)?;
        ack.expect_sequence_number(expected)?;
        ack.validate_checksum()?;
        // The acknowledgment consumed `expected`; the next chunk starts one
        // past it.
        self.sequence = expected + 1;
        Ok(())
    }

    /// Downloads the server's message, acknowledging each DATA chunk, until
    /// an [`EOF`] chunk ends the transmission. The sentinel itself is
    /// neither appended to the result nor separately acknowledged.
    pub async fn receive(&mut self) -> Result<String, TransportError> {
        let conn = self.connection()?.clone();
        let mut message = String::new();
        let mut ack_sequence = self.sequence;
        loop {
            let expected = ack_sequence + 1;
            let packet = with_retry(
                || {
                    let conn = conn.clone();
                    async move {
                        conn.send_packet(ack_sequence, PacketType::Ack, None)?;
                        conn.wait_for_packet_timeout(REPLY_TIMEOUT).await
                    }
                },
                expected,
            )
            .await?;
            self.sequence = ack_sequence + 2;
            packet.expect_type(PacketType::Data)?;
            packet.expect_sequence_number(expected)?;
            packet.validate_checksum()?;
            let chunk = packet.data()?;
            let advanced = expected + 1 + chunk.chars().count() as u32;
            if chunk == EOF {
                self.sequence = advanced;
                return Ok(message);
            }
            message.push_str(chunk);
            ack_sequence = advanced;
        }
    }

    /// Tears the connection down.
    ///
    /// Sends a best-effort CLOSE with the maximal sequence number; the peer
    /// may already be gone, so a failed send is ignored. The local port and
    /// the connection are always released.
    pub fn close(&mut self) {
        if let Some(conn) = self.connection.take() {
            let _ = conn.send_packet(u32::MAX, PacketType::Close, None);
        }
        self.internet.unregister(self.port);
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.internet.unregister(self.port);
    }
}

/// The client's registered endpoint: forwards inbound packets into the
/// connection's mailbox.
struct Inbox {
    port: Port,
    internet: Arc<Internet>,
    connection: Weak<Connection>,
}

impl PacketConsumer for Inbox {
    fn accept(&self, packet: Packet) {
        tracing::debug!(port = self.port, ?packet, "client received packet");
        let closing = packet.header().ty == PacketType::Close;
        // Duplicates can still arrive after the client has gone away.
        if let Some(connection) = self.connection.upgrade() {
            connection.add_packet(packet);
        }
        if closing {
            self.internet.unregister(self.port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internet::RegisterError;

    struct Sink;

    impl PacketConsumer for Sink {
        fn accept(&self, _packet: Packet) {}
    }

    #[tokio::test]
    async fn holds_its_port_until_closed() {
        let internet = Internet::new();
        let mut client = TcpClient::new(internet.clone(), 443).unwrap();
        let port = client.port();
        assert_eq!(
            internet.register(port, Arc::new(Sink)),
            Err(RegisterError::Occupied(port))
        );

        client.close();
        internet.register(port, Arc::new(Sink)).unwrap();
    }

    #[tokio::test]
    async fn operations_after_close_report_the_closed_connection() {
        let internet = Internet::new();
        let mut client = TcpClient::new(internet, 443).unwrap();
        client.close();
        assert_eq!(client.connect().await, Err(TransportError::Closed));
        assert_eq!(client.send("hi").await, Err(TransportError::Closed));
        assert_eq!(client.receive().await, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn dropping_a_client_releases_its_port() {
        let internet = Internet::new();
        let port = {
            let client = TcpClient::new(internet.clone(), 443).unwrap();
            client.port()
        };
        internet.register(port, Arc::new(Sink)).unwrap();
    }
}
