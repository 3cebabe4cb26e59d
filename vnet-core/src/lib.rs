//! A virtual internet and a minimal TCP-like reliable transport that runs on
//! top of it.
//!
//! The crate simulates a request/response protocol (SYN handshake, chunked
//! DATA transfer with per-chunk acknowledgment, CLOSE teardown) over an
//! in-process delivery substrate that may lose, delay, and reorder packets.
//! There are no real sockets anywhere; the point is to exercise building a
//! correct protocol on top of an unreliable fabric.
//!
//! # Organization
//!
//! - [`Packet`] and its [`Header`] are the wire format, with the protocol's
//!   deliberately weak additive checksum.
//! - [`Internet`] is the fabric: a registry from ports to endpoints that
//!   dispatches every packet on its own task through the active [`Channel`].
//! - [`Channel`] implementations decide whether and when a routed packet
//!   reaches its consumer; [`channel::Lossy`] and [`channel::Delayed`]
//!   simulate an unreliable internet.
//! - [`Connection`] is one endpoint's mailbox for a (local, remote) port
//!   pair, with blocking and timed receives.
//! - [`retry::with_retry`] makes an exchange tolerant of timeouts and stale
//!   duplicates.
//! - [`TcpClient`] and [`TcpServer`] are the two halves of the protocol
//!   state machine.
//!
//! Delivery order between different senders is not guaranteed; the sequence
//! number checks in the state machines are the correctness mechanism, not
//! the scheduler.

use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;

/// A [`DashMap`] keyed with the fast, non-cryptographic `FxHasher`.
pub type FxDashMap<K, V> = DashMap<K, V, BuildHasherDefault<FxHasher>>;

pub mod packet;
pub use packet::{Header, Packet, PacketType};

pub mod internet;
pub use internet::{Internet, PacketConsumer, Port};

pub mod channel;
pub use channel::Channel;

pub mod connection;
pub use connection::Connection;

pub mod retry;
pub use retry::TransportError;

pub mod client;
pub use client::TcpClient;

pub mod server;
pub use server::TcpServer;
