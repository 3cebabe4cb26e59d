//! The packet format: a validated [`Header`] plus an optional bounded
//! payload, with the protocol's integrity checks.

use crate::internet::Port;
use thiserror::Error as ThisError;

/// The largest number of characters a single DATA packet may carry. Callers
/// above this layer are responsible for chunking.
pub const MAX_SEGMENT: usize = 8;

/// Payload sentinel marking the end of a chunked transmission.
pub const EOF: &str = "<EOF>";

/// The kinds of packets exchanged over a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Synchronization, used to establish a connection.
    Syn,
    /// Carries a chunk of application data.
    Data,
    /// Acknowledges receipt of previous packets.
    Ack,
    /// Terminates a connection.
    Close,
}

/// Routing information and metadata for a [`Packet`].
///
/// Headers are immutable once built. The `u16` port type covers exactly the
/// simulated address space, so only the sequence number needs a runtime
/// check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// The port the packet came from.
    pub source_port: Port,
    /// The port the packet is going to.
    pub destination_port: Port,
    /// The sequence number, strictly positive.
    pub sequence_number: u32,
    /// The additive integrity tag.
    pub checksum: u32,
    /// What kind of packet this is.
    pub ty: PacketType,
}

impl Header {
    /// Builds a header.
    ///
    /// # Panics
    ///
    /// Panics if `sequence_number` is zero. Misconstruction is a programming
    /// error, not a recoverable condition.
    pub fn new(
        source_port: Port,
        destination_port: Port,
        sequence_number: u32,
        checksum: u32,
        ty: PacketType,
    ) -> Self {
        assert!(sequence_number > 0, "sequence numbers start at 1");
        Self {
            source_port,
            destination_port,
            sequence_number,
            checksum,
            ty,
        }
    }
}

/// Data that can be sent over the virtual internet.
///
/// A packet is created once and never mutated afterwards; the fabric and the
/// mailboxes hand it around as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: Header,
    data: Option<String>,
}

impl Packet {
    /// Builds a packet from its fields, computing the checksum.
    ///
    /// # Panics
    ///
    /// Panics if a DATA packet has no payload, a non-DATA packet has one, or
    /// the payload exceeds [`MAX_SEGMENT`] characters.
    pub fn new(
        source_port: Port,
        destination_port: Port,
        sequence_number: u32,
        ty: PacketType,
        data: Option<&str>,
    ) -> Self {
        assert_eq!(
            data.is_some(),
            ty == PacketType::Data,
            "a payload goes with DATA packets and nothing else"
        );
        if let Some(data) = data {
            assert!(
                data.chars().count() <= MAX_SEGMENT,
                "payload exceeds {MAX_SEGMENT} characters"
            );
        }
        let header = Header::new(
            source_port,
            destination_port,
            sequence_number,
            checksum(sequence_number, data),
            ty,
        );
        Self {
            header,
            data: data.map(str::to_owned),
        }
    }

    /// Wraps an existing header and payload as given, without recomputing
    /// the checksum.
    pub fn from_parts(header: Header, data: Option<String>) -> Self {
        Self { header, data }
    }

    /// The packet header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The payload of a DATA packet.
    pub fn data(&self) -> Result<&str, PacketError> {
        self.data.as_deref().ok_or(PacketError::NoData(self.header.ty))
    }

    /// Checks that this packet has the expected type.
    pub fn expect_type(&self, expected: PacketType) -> Result<(), PacketError> {
        if self.header.ty == expected {
            Ok(())
        } else {
            Err(PacketError::UnexpectedType {
                expected,
                got: self.header.ty,
            })
        }
    }

    /// Checks that this packet has the expected sequence number.
    pub fn expect_sequence_number(&self, expected: u32) -> Result<(), PacketError> {
        if self.header.sequence_number == expected {
            Ok(())
        } else {
            Err(PacketError::UnexpectedSequence {
                expected,
                got: self.header.sequence_number,
            })
        }
    }

    /// Recomputes the additive checksum and compares it against the one in
    /// the header.
    pub fn validate_checksum(&self) -> Result<(), PacketError> {
        let expected = checksum(self.header.sequence_number, self.data.as_deref());
        if self.header.checksum == expected {
            Ok(())
        } else {
            Err(PacketError::Checksum {
                expected,
                got: self.header.checksum,
            })
        }
    }
}

/// `sequence number + payload length`: an integrity tag, not a
/// cryptographic one. Wrapping, so the CLOSE sentinel sequence number stays
/// in range.
fn checksum(sequence_number: u32, data: Option<&str>) -> u32 {
    sequence_number.wrapping_add(data.map_or(0, |data| data.chars().count() as u32))
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    #[error("expected a {expected:?} packet, got {got:?}")]
    UnexpectedType {
        expected: PacketType,
        got: PacketType,
    },
    #[error("expected sequence number {expected}, got {got}")]
    UnexpectedSequence { expected: u32, got: u32 },
    #[error("expected checksum {expected}, got {got}")]
    Checksum { expected: u32, got: u32 },
    #[error("no data in a {0:?} packet")]
    NoData(PacketType),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_fields_and_computes_the_checksum() {
        let packet = Packet::new(3, 4, 10, PacketType::Data, Some("hello"));
        assert_eq!(packet.header().source_port, 3);
        assert_eq!(packet.header().destination_port, 4);
        assert_eq!(packet.header().sequence_number, 10);
        assert_eq!(packet.header().ty, PacketType::Data);
        assert_eq!(packet.header().checksum, 15);
        assert_eq!(packet.data().unwrap(), "hello");
        assert_eq!(packet.validate_checksum(), Ok(()));
    }

    #[test]
    fn packets_without_payload_use_the_bare_sequence_number_as_checksum() {
        let packet = Packet::new(1, 2, 42, PacketType::Ack, None);
        assert_eq!(packet.header().checksum, 42);
        assert_eq!(packet.data(), Err(PacketError::NoData(PacketType::Ack)));
    }

    #[test]
    #[should_panic(expected = "a payload goes with DATA packets")]
    fn data_packets_need_a_payload() {
        Packet::new(1, 2, 3, PacketType::Data, None);
    }

    #[test]
    #[should_panic(expected = "a payload goes with DATA packets")]
    fn only_data_packets_carry_a_payload() {
        Packet::new(1, 2, 3, PacketType::Ack, Some("nope"));
    }

    #[test]
    #[should_panic(expected = "payload exceeds")]
    fn payloads_are_bounded() {
        Packet::new(1, 2, 3, PacketType::Data, Some("way too long"));
    }

    #[test]
    #[should_panic(expected = "sequence numbers start at 1")]
    fn sequence_numbers_are_strictly_positive() {
        Packet::new(1, 2, 0, PacketType::Ack, None);
    }

    #[test]
    fn validators_report_the_specific_mismatch() {
        let packet = Packet::new(1, 2, 7, PacketType::Syn, None);
        assert_eq!(packet.expect_type(PacketType::Syn), Ok(()));
        assert_eq!(
            packet.expect_type(PacketType::Ack),
            Err(PacketError::UnexpectedType {
                expected: PacketType::Ack,
                got: PacketType::Syn,
            })
        );
        assert_eq!(packet.expect_sequence_number(7), Ok(()));
        assert_eq!(
            packet.expect_sequence_number(8),
            Err(PacketError::UnexpectedSequence { expected: 8, got: 7 })
        );
    }

    #[test]
    fn corrupted_checksums_are_detected() {
        let header = Header::new(1, 2, 5, 99, PacketType::Data);
        let packet = Packet::from_parts(header, Some("abc".to_owned()));
        assert_eq!(
            packet.validate_checksum(),
            Err(PacketError::Checksum { expected: 8, got: 99 })
        );
    }
}
