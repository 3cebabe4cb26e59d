//! The server half of the transport state machine.

use crate::{
    connection::Connection,
    internet::{Internet, PacketConsumer, Port, RegisterError},
    packet::{Packet, PacketType, EOF, MAX_SEGMENT},
    retry::{with_retry, TransportError, REPLY_TIMEOUT},
    FxDashMap,
};
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A live per-client session: the handler task and the connection it
/// drains.
struct Session {
    task: JoinHandle<()>,
    connection: Arc<Connection>,
}

/// A TCP-like server listening on a fixed port.
///
/// Every new client, identified by its remote port, gets a dedicated
/// handler task running the mirrored handshake / data exchange / teardown
/// protocol against its own [`Connection`]. A handler failure tears down
/// that one session and nothing else.
pub struct TcpServer {
    internet: Arc<Internet>,
    port: Port,
    sessions: Arc<FxDashMap<Port, Session>>,
}

impl TcpServer {
    /// Registers a server on `port`.
    pub fn new(internet: Arc<Internet>, port: Port) -> Result<Arc<Self>, RegisterError> {
        let server = Arc::new(Self {
            internet: internet.clone(),
            port,
            sessions: Arc::new(FxDashMap::default()),
        });
        internet.register(port, server.clone())?;
        Ok(server)
    }

    /// The port this server listens on.
    pub fn port(&self) -> Port {
        self.port
    }

    /// The number of live client sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Shuts the server down: every live session is aborted and the
    /// listening port released.
    pub fn close(&self) {
        for session in self.sessions.iter() {
            session.value().task.abort();
        }
        self.sessions.clear();
        self.internet.unregister(self.port);
    }
}

impl PacketConsumer for TcpServer {
    fn accept(&self, packet: Packet) {
        tracing::debug!(port = self.port, ?packet, "server received packet");
        let peer = packet.header().source_port;
        if packet.header().ty == PacketType::Close {
            // CLOSE tears the session down; it is never queued.
            if let Some((_, session)) = self.sessions.remove(&peer) {
                session.task.abort();
            }
            return;
        }
        match self.sessions.entry(peer) {
            Entry::Occupied(entry) => entry.get().connection.add_packet(packet),
            Entry::Vacant(entry) => {
                if packet.header().ty != PacketType::Syn {
                    // No handler to deliver to; stale or garbage traffic.
                    return;
                }
                tracing::debug!(port = self.port, peer, "starting session handler");
                let connection = Arc::new(Connection::new(self.internet.clone(), self.port, peer));
                let task = tokio::spawn(run_session(
                    connection.clone(),
                    self.sessions.clone(),
                    peer,
                ));
                // The handler and its mailbox exist before the triggering
                // packet is enqueued.
                entry
                    .insert(Session { task, connection })
                    .value()
                    .connection
                    .add_packet(packet);
            }
        }
    }
}

/// Supervises one session: runs the protocol and removes the session entry
/// when it ends, however it ends.
async fn run_session(
    connection: Arc<Connection>,
    sessions: Arc<FxDashMap<Port, Session>>,
    peer: Port,
) {
    if let Err(error) = handle_session(&connection).await {
        tracing::error!(peer, %error, "session handler failed");
    }
    sessions.remove(&peer);
    tracing::debug!(peer, "session handler finished");
}

/// The mirrored TCP-like protocol for a single client.
async fn handle_session(conn: &Arc<Connection>) -> Result<(), TransportError> {
    // Session creation guarantees at least one queued packet, and the
    // protocol demands it be a SYN.
    let syn = conn.wait_for_packet().await?;
    syn.expect_type(PacketType::Syn)?;
    let mut sequence = syn.header().sequence_number;
    tracing::debug!(peer = conn.destination_port(), sequence, "handshake SYN received");

    // Request phase: answer with SYN once and ACKs afterwards, collecting
    // DATA chunks until the EOF sentinel.
    let mut response_type = PacketType::Syn;
    let mut request = String::new();
    loop {
        let reply_sequence = sequence + 1;
        let packet = with_retry(
            || {
                let conn = conn.clone();
                async move {
                    conn.send_packet(reply_sequence, response_type, None)?;
                    conn.wait_for_packet_timeout(REPLY_TIMEOUT).await
                }
            },
            sequence + 2,
        )
        .await?;
        packet.expect_type(PacketType::Data)?;
        sequence += 2;
        packet.expect_sequence_number(sequence)?;
        packet.validate_checksum()?;
        let chunk = packet.data()?;
        sequence += chunk.chars().count() as u32;
        response_type = PacketType::Ack;
        if chunk == EOF {
            break;
        }
        request.push_str(chunk);
    }
    tracing::debug!(peer = conn.destination_port(), %request, "request complete");

    // The EOF gets its ACK, answered by the client's round-closing ACK. The
    // client is cooperative at this point, so the wait is unbounded.
    let reply_sequence = sequence + 1;
    let closing = with_retry(
        || {
            let conn = conn.clone();
            async move {
                conn.send_packet(reply_sequence, PacketType::Ack, None)?;
                conn.wait_for_packet().await
            }
        },
        sequence + 2,
    )
    .await?;
    closing.expect_type(PacketType::Ack)?;
    sequence += 2;
    closing.expect_sequence_number(sequence)?;
    closing.validate_checksum()?;

    // Response phase: stream the reply in bounded chunks, each
    // acknowledged before the next goes out.
    let response = respond_to(&request);
    let mut remaining = response.as_str();
    while !remaining.is_empty() {
        let split = remaining
            .char_indices()
            .nth(MAX_SEGMENT)
            .map_or(remaining.len(), |(index, _)| index);
        let (chunk, rest) = remaining.split_at(split);
        remaining = rest;

        let reply_sequence = sequence + 1;
        let expected = sequence + chunk.chars().count() as u32 + 2;
        let ack = with_retry(
            || {
                let conn = conn.clone();
                async move {
                    conn.send_packet(reply_sequence, PacketType::Data, Some(chunk))?;
                    conn.wait_for_packet_timeout(REPLY_TIMEOUT).await
                }
            },
            expected,
        )
        .await?;
        ack.expect_type(PacketType::Ack)?;
        ack.expect_sequence_number(expected)?;
        sequence = expected;
        tracing::debug!(peer = conn.destination_port(), "response chunk acknowledged");
    }

    // The terminal EOF needs no acknowledgment. Stale re-requests (old
    // sequence numbers) mean the client missed it, so it goes out again;
    // anything newer means the client has everything. Timeouts are not
    // failures here: transmission is complete whether or not the client is
    // still around, so the wait repeats indefinitely.
    conn.send_packet(sequence + 1, PacketType::Data, Some(EOF))?;
    loop {
        match conn.wait_for_packet_timeout(REPLY_TIMEOUT).await {
            Ok(packet) if packet.header().sequence_number <= sequence => {
                tracing::debug!(peer = conn.destination_port(), "resending response EOF");
                conn.send_packet(sequence + 1, PacketType::Data, Some(EOF))?;
            }
            Ok(_) => break,
            Err(TransportError::Timeout) => continue,
            Err(other) => return Err(other),
        }
    }
    tracing::debug!(peer = conn.destination_port(), "response sent and acknowledged");
    Ok(())
}

/// The canned response table. Application-level, not part of the protocol.
fn respond_to(request: &str) -> String {
    if request == "Hello Server" {
        "Hello Client :)".to_owned()
    } else {
        "Sorry. I did not understand that.".to_owned()
    }
}
