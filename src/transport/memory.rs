//! A naive in-memory implementation of [`Transport`](super::Transport), primarily for testing.

use std::collections::VecDeque;

use bytes::Bytes;

use super::{ClaimError, Transport};

/// A naive in-memory implementation of [`Transport`](super::Transport), primarily for testing.
///
/// Published frames queue up until drained with [`drain`](Self::drain). Backpressure can be
/// simulated by bounding the number of undrained frames, and any claim status can be forced with
/// [`fail_claims_with`](Self::fail_claims_with).
pub struct InMemoryTransport {
    frames: VecDeque<Bytes>,
    max_in_flight: usize,
    forced_status: Option<ClaimError>,
    claim_count: u64,
}

impl InMemoryTransport {
    /// Constructs a transport that accepts any number of undrained frames.
    pub fn new_unbounded() -> Self {
        Self::with_in_flight_limit(usize::max_value())
    }

    /// Constructs a transport that reports backpressure once `max_in_flight` frames are queued
    /// and undrained.
    pub fn with_in_flight_limit(max_in_flight: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            max_in_flight,
            forced_status: None,
            claim_count: 0,
        }
    }

    /// Forces every subsequent claim to fail with `status` until cleared with `None`.
    pub fn fail_claims_with(&mut self, status: Option<ClaimError>) {
        self.forced_status = status;
    }

    /// Returns the number of claims attempted over the lifetime of this transport, failed claims
    /// included.
    pub fn claim_count(&self) -> u64 {
        self.claim_count
    }

    /// Returns the number of published frames not yet drained.
    pub fn in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Removes and returns all published frames, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = Bytes> + '_ {
        self.frames.drain(..)
    }
}

impl Transport for InMemoryTransport {
    fn try_claim<F>(&mut self, length: usize, write: F) -> Result<(), ClaimError>
    where
        F: FnOnce(&mut [u8]),
    {
        self.claim_count = self.claim_count.saturating_add(1);

        if let Some(status) = self.forced_status {
            return Err(status);
        }
        if self.frames.len() >= self.max_in_flight {
            return Err(ClaimError::Backpressured);
        }

        let mut region = vec![0u8; length];
        write(&mut region);
        // The frame is appended whole after the writer returns; a receiver never observes a
        // partially written region.
        self.frames.push_back(Bytes::from(region));
        Ok(())
    }
}
