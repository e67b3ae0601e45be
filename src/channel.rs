//! Bounded-retry publication of consensus control messages.
//!
//! The [`StatusChannel`] publishes the four control messages over a [`Transport`] handle using
//! the claim/commit discipline: the exact frame length is claimed, the message is encoded
//! directly into the claimed region, and the region is published atomically. A claim that fails
//! with a transient status is retried up to a configured attempt budget; the operation never
//! blocks and never spins beyond that budget.

use log::{debug, warn};
use thiserror::Error;

use crate::message::{
    AppendedPosition, CommitPosition, LeadershipTermId, MemberId, RequestVote, StatusMessage,
    Vote, VoteDecision,
};
use crate::transport::{ClaimError, Transport};

/// The default number of claim attempts per send.
pub const DEFAULT_SEND_ATTEMPTS: u32 = 3;

/// Publisher for the member status stream.
///
/// Each send operation returns `Ok(true)` when exactly one well-formed frame was published,
/// `Ok(false)` when the attempt budget was exhausted on transient backpressure (the caller
/// re-attempts at the protocol level, typically on its next timer tick), and `Err` on a terminal
/// transport failure: the transport instance must then be discarded and recreated by a higher
/// layer, never silently retried.
pub struct StatusChannel {
    send_attempts: u32,
}

/// An error returned when the transport has failed terminally under a send.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("unexpected transport state: {status}")]
pub struct SendError {
    /// The terminal claim status reported by the transport.
    pub status: ClaimError,
}

impl StatusChannel {
    /// Constructs a channel retrying each send up to `send_attempts` times on transient claim
    /// failures.
    ///
    /// # Panics
    ///
    /// Panics if `send_attempts` is zero.
    pub fn new(send_attempts: u32) -> Self {
        assert!(send_attempts > 0, "send_attempts must be positive");
        Self { send_attempts }
    }

    /// Returns the configured attempt budget.
    pub fn send_attempts(&self) -> u32 {
        self.send_attempts
    }

    /// Publishes a [`RequestVote`] for `candidate_term_id` from `candidate_member_id`.
    pub fn request_vote<T: Transport>(
        &self,
        transport: &mut T,
        candidate_term_id: LeadershipTermId,
        last_base_position: i64,
        last_term_position: i64,
        candidate_member_id: MemberId,
    ) -> Result<bool, SendError> {
        self.publish(
            transport,
            &StatusMessage::RequestVote(RequestVote {
                candidate_term_id,
                last_base_position,
                last_term_position,
                candidate_member_id,
            }),
        )
    }

    /// Publishes a [`Vote`] from `follower_member_id` answering `candidate_member_id`.
    pub fn vote<T: Transport>(
        &self,
        transport: &mut T,
        candidate_term_id: LeadershipTermId,
        last_base_position: i64,
        last_term_position: i64,
        candidate_member_id: MemberId,
        follower_member_id: MemberId,
        vote: VoteDecision,
    ) -> Result<bool, SendError> {
        self.publish(
            transport,
            &StatusMessage::Vote(Vote {
                candidate_term_id,
                last_base_position,
                last_term_position,
                candidate_member_id,
                follower_member_id,
                vote,
            }),
        )
    }

    /// Publishes an [`AppendedPosition`] report from `follower_member_id`.
    pub fn appended_position<T: Transport>(
        &self,
        transport: &mut T,
        term_position: i64,
        leadership_term_id: LeadershipTermId,
        follower_member_id: MemberId,
    ) -> Result<bool, SendError> {
        self.publish(
            transport,
            &StatusMessage::AppendedPosition(AppendedPosition {
                term_position,
                leadership_term_id,
                follower_member_id,
            }),
        )
    }

    /// Publishes a [`CommitPosition`] broadcast from `leader_member_id`.
    pub fn commit_position<T: Transport>(
        &self,
        transport: &mut T,
        term_position: i64,
        leadership_term_id: LeadershipTermId,
        leader_member_id: MemberId,
        log_session_id: i32,
    ) -> Result<bool, SendError> {
        self.publish(
            transport,
            &StatusMessage::CommitPosition(CommitPosition {
                term_position,
                leadership_term_id,
                leader_member_id,
                log_session_id,
            }),
        )
    }

    fn publish<T: Transport>(
        &self,
        transport: &mut T,
        message: &StatusMessage,
    ) -> Result<bool, SendError> {
        let length = message.encoded_len();

        let mut attempts = self.send_attempts;
        loop {
            match transport.try_claim(length, |region| message.encode(region)) {
                Ok(()) => return Ok(true),
                Err(status) if status.is_transient() => {
                    attempts -= 1;
                    if attempts == 0 {
                        debug!(
                            "dropped {} after {} send attempts: {}",
                            message, self.send_attempts, status
                        );
                        return Ok(false);
                    }
                }
                Err(status) => {
                    warn!("failed to send {}: {}", message, status);
                    return Err(SendError { status });
                }
            }
        }
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_ATTEMPTS)
    }
}
