//! Timeout-tolerant request/response exchanges.

use crate::{
    internet::{FreePortError, RegisterError, SendError},
    packet::{Packet, PacketError},
};
use std::{future::Future, time::Duration};
use thiserror::Error as ThisError;

/// How many timed-out attempts an exchange tolerates before giving up.
pub const MAX_ATTEMPTS: u32 = 3;

/// How long a single wait for a reply lasts before it counts as a timeout.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors surfaced by transport operations.
///
/// Composes the leaf taxonomies of the fabric and the packet format with
/// the conditions that arise while driving an exchange.
#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error(transparent)]
    Register(#[from] RegisterError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    FreePort(#[from] FreePortError),
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("timed out waiting for a packet")]
    Timeout,
    #[error("the connection is already closed")]
    Closed,
    #[error("unstable connection, too many timeouts")]
    Unstable,
}

/// Runs `attempt` until it yields a packet at or above `expected_sequence`.
///
/// `attempt` typically sends a request packet and then waits with a timeout
/// for the reply. A reply below `expected_sequence` is a stale duplicate:
/// it is discarded and the attempt re-runs without touching the retry
/// budget, which only timeouts consume. After [`MAX_ATTEMPTS`] timeouts the
/// exchange ends with [`TransportError::Unstable`]. Every other error
/// propagates immediately. A slow network and a confusing duplicate are
/// different failure modes and are never conflated.
pub async fn with_retry<F, Fut>(
    mut attempt: F,
    expected_sequence: u32,
) -> Result<Packet, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Packet, TransportError>>,
{
    let mut timeouts = 0;
    while timeouts < MAX_ATTEMPTS {
        match attempt().await {
            Ok(packet) if packet.header().sequence_number < expected_sequence => {
                tracing::debug!(
                    got = packet.header().sequence_number,
                    expected = expected_sequence,
                    "discarding stale packet"
                );
            }
            Ok(packet) => return Ok(packet),
            Err(TransportError::Timeout) => {
                tracing::debug!("attempt timed out");
                timeouts += 1;
            }
            Err(other) => return Err(other),
        }
    }
    Err(TransportError::Unstable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;
    use std::cell::Cell;

    fn reply(sequence_number: u32) -> Packet {
        Packet::new(1, 2, sequence_number, PacketType::Ack, None)
    }

    #[tokio::test]
    async fn returns_the_reply_after_two_timeouts() {
        let calls = Cell::new(0);
        let result = with_retry(
            || {
                let call = calls.get();
                calls.set(call + 1);
                async move {
                    if call < 2 {
                        Err(TransportError::Timeout)
                    } else {
                        Ok(reply(42))
                    }
                }
            },
            42,
        )
        .await;
        assert_eq!(result.unwrap().header().sequence_number, 42);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_exactly_three_timeouts() {
        let calls = Cell::new(0);
        let result = with_retry(
            || {
                calls.set(calls.get() + 1);
                async { Err(TransportError::Timeout) }
            },
            1,
        )
        .await;
        assert_eq!(result, Err(TransportError::Unstable));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn stale_replies_are_skipped_without_spending_an_attempt() {
        let calls = Cell::new(0);
        let result = with_retry(
            || {
                let call = calls.get();
                calls.set(call + 1);
                async move {
                    match call {
                        0 => Ok(reply(7)),
                        _ => Ok(reply(40)),
                    }
                }
            },
            40,
        )
        .await;
        assert_eq!(result.unwrap().header().sequence_number, 40);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn stale_replies_leave_the_full_budget_for_timeouts() {
        let calls = Cell::new(0);
        let result = with_retry(
            || {
                let call = calls.get();
                calls.set(call + 1);
                async move {
                    if call == 0 {
                        Ok(reply(7))
                    } else {
                        Err(TransportError::Timeout)
                    }
                }
            },
            40,
        )
        .await;
        assert_eq!(result, Err(TransportError::Unstable));
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn other_errors_propagate_immediately() {
        let calls = Cell::new(0);
        let result = with_retry(
            || {
                calls.set(calls.get() + 1);
                async { Err(SendError::UnknownPort(9).into()) }
            },
            1,
        )
        .await;
        assert_eq!(result, Err(TransportError::Send(SendError::UnknownPort(9))));
        assert_eq!(calls.get(), 1);
    }
}
