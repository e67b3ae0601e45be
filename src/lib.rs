//! Consensus and replication control core for a clustered service.
//!
//! This crate holds the in-memory protocol state and message contracts a cluster uses to elect a
//! single leader per term, replicate a log-position stream from leader to followers, and decide
//! when a position is durably committed by quorum agreement. It is deliberately sans-io: control
//! messages are published over a non-blocking claim/commit [`transport`] abstraction with a
//! bounded retry budget, time is injected on every call that needs it, and all state is mutated
//! by a single execution context per member.
//!
//! The pieces, leaf first:
//!
//! - [`liveness`] is generic last-seen/timeout tracking with a one-way end-of-life latch.
//! - [`message`] + [`channel`] are the four control messages (RequestVote, Vote, AppendedPosition,
//!   CommitPosition) and their bounded-retry publication.
//! - [`replication`] is leader-side quorum computation over follower replication progress.
//! - [`core`](crate::core) / [`node`] is the Follower/Candidate/Leader election state machine,
//!   low-level and wrapped.

#![warn(missing_docs)]

pub mod channel;
pub mod core;
pub mod liveness;
pub mod message;
pub mod node;
pub mod replication;
pub mod transport;
