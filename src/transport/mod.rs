//! Types related to the non-blocking control-message transport.
//!
//! The consensus core publishes its control messages through the [`Transport`] trait, which
//! models a claim/commit stream: a fixed-length write region is claimed, encoded into, and then
//! published atomically. The physical transport (framing, flow control, media) lives behind this
//! trait and is supplied to the [`StatusChannel`](crate::channel::StatusChannel).

pub mod memory;

use thiserror::Error;

/// An interface to a non-blocking message stream with claim/commit publication.
///
/// # Atomic visibility
///
/// A message becomes visible to subscribers only when the claimed region is published, which
/// happens exactly once, after the write closure returns. A failed claim leaves nothing visible;
/// there is no partially written or interleaved state observable by a receiver.
///
/// # Single-writer discipline
///
/// A transport instance must be driven by one execution context at a time. Concurrent senders
/// require independent instances; the `&mut self` receiver enforces this at the type level.
pub trait Transport {
    /// Claims a write region of exactly `length` bytes, runs `write` to fill it, and publishes
    /// the region atomically when `write` returns.
    ///
    /// # Errors
    ///
    /// If no region can be claimed, the claim status is returned and `write` is never run.
    /// [`Backpressured`](ClaimError::Backpressured) and [`AdminAction`](ClaimError::AdminAction)
    /// are transient; [`Closed`](ClaimError::Closed) and
    /// [`MaxPositionExceeded`](ClaimError::MaxPositionExceeded) are terminal for this instance.
    fn try_claim<F>(&mut self, length: usize, write: F) -> Result<(), ClaimError>
    where
        F: FnOnce(&mut [u8]);
}

/// The status of a failed claim on a [`Transport`].
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum ClaimError {
    /// The stream cannot accept a new message right now; a later attempt may succeed.
    #[error("transport back pressured")]
    Backpressured,

    /// The stream is administratively paused; a later attempt may succeed.
    #[error("transport administratively paused")]
    AdminAction,

    /// The stream has been closed; this instance will never accept a message again.
    #[error("transport closed")]
    Closed,

    /// The stream has exhausted its position space; this instance must be discarded.
    #[error("transport position space exhausted")]
    MaxPositionExceeded,
}

impl ClaimError {
    /// Returns whether a later claim on the same instance may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClaimError::Backpressured | ClaimError::AdminAction)
    }
}
