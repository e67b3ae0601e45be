//! Higher-level API for a cluster member.

use std::collections::BTreeSet;

use rand_core::RngCore;

use crate::channel::SendError;
use crate::core::{Role, State};
use crate::message::{
    AppendedPosition, CommitPosition, LeadershipTermId, MemberId, RequestVote, StatusMessage, Vote,
};
use crate::transport::Transport;

/// A cluster member running the consensus control protocol: leader election by term-based
/// voting and quorum-based commit-position computation over per-follower replication progress.
///
/// # Time
///
/// The member holds no clock. Every timeout decision is made against a `now_ns` timestamp
/// supplied by the caller, which makes runs deterministic and replayable: feeding the same
/// messages and timestamps produces the same transitions. [`on_time_event`] should be called on
/// a regular tick; the member compares the supplied time against its leader-heartbeat tracker
/// (follower), its election window (candidate), or its heartbeat interval (leader).
///
/// # Message exchange
///
/// Control messages travel on a shared status stream. Each member publishes through the
/// [`Transport`] handle passed into the sending call and receives every other member's frames,
/// dispatching decoded messages through [`on_message`]; frames a member is not concerned with
/// (its own echoes, votes addressed to another candidate) are ignored by the handlers. Sends
/// never block: a message dropped under transport backpressure is not an error, and the protocol
/// recovers it on a later tick (a lost RequestVote is re-broadcast when the election window
/// closes, a lost heartbeat is followed by the next one). A terminal transport failure is
/// returned as [`SendError`] and the transport instance must be replaced by the caller.
///
/// # Single-writer discipline
///
/// A member and its transport handle must be driven by one execution context at a time; all
/// mutation happens through `&mut self`. Members share nothing; cross-member coordination is
/// purely by message exchange.
///
/// [`on_message`]: Self::on_message
/// [`on_time_event`]: Self::on_time_event
pub struct Member<Random> {
    state: State<Random>,
}

/// Configurable parameters of a cluster member.
#[derive(Clone, Eq, PartialEq)]
pub struct Config {
    /// How long the leader may stay silent before a follower starts an election, in nanoseconds.
    ///
    /// Also the base of a candidate's election window: each round waits
    /// `election_timeout_ns` plus a random jitter below `election_timeout_ns`, so competing
    /// candidates fall out of step with each other.
    pub election_timeout_ns: u64,

    /// The interval between the leader's commit-position heartbeats, in nanoseconds.
    pub heartbeat_interval_ns: u64,

    /// The number of transport claim attempts per control-message send.
    pub send_attempts: u32,

    /// The session id of the leader's log stream, stamped on commit broadcasts.
    pub log_session_id: i32,
}

impl<Random> Member<Random>
where
    Random: RngCore,
{
    /// Constructs a member with the configured member set.
    ///
    /// Every member of a cluster must be constructed with the same `members` set and `config`;
    /// `members` may contain `member_id` or omit it to the same effect. `random` must produce
    /// different values on every member, and `now_ns` seeds the leader-heartbeat tracker so the
    /// first election fires one election timeout after start.
    pub fn new(
        member_id: MemberId,
        members: BTreeSet<MemberId>,
        random: Random,
        config: Config,
        now_ns: u64,
    ) -> Self {
        Self {
            state: State::new(member_id, members, random, config, now_ns),
        }
    }

    /// Returns this member's configurable parameters.
    pub fn config(&self) -> &Config {
        self.state.config()
    }

    /// Returns the latest leadership term this member has seen.
    pub fn current_term(&self) -> LeadershipTermId {
        self.state.current_term()
    }

    /// Returns whether this member leads the latest known term.
    pub fn is_leader(&self) -> bool {
        self.state.is_leader()
    }

    /// Returns the pair of base and term position last reported by the log layer.
    pub fn last_appended_position(&self) -> (i64, i64) {
        self.state.last_appended_position()
    }

    /// Returns the highest commit position this member has observed or computed.
    ///
    /// The value never decreases over the lifetime of the member.
    pub fn last_commit_position(&self) -> i64 {
        self.state.last_commit_position()
    }

    /// Returns the id of the leader of the latest known term, if one is known, along with the
    /// term.
    pub fn leader(&self) -> (Option<MemberId>, LeadershipTermId) {
        self.state.leader()
    }

    /// Returns this member's id.
    pub fn member_id(&self) -> MemberId {
        self.state.member_id()
    }

    /// Returns the configured member set, this member included.
    pub fn members(&self) -> &BTreeSet<MemberId> {
        self.state.members()
    }

    /// Returns this member's current role.
    pub fn role(&self) -> Role {
        self.state.role()
    }

    /// Records local log append progress; see [`State::log_appended`].
    ///
    /// # Errors
    ///
    /// If the transport has failed terminally, an error is returned.
    pub fn log_appended<T: Transport>(
        &mut self,
        transport: &mut T,
        base_position: i64,
        term_position: i64,
    ) -> Result<(), SendError> {
        self.state.log_appended(transport, base_position, term_position)
    }

    /// Handles a decoded control message of any type.
    ///
    /// # Errors
    ///
    /// If the transport has failed terminally, an error is returned.
    pub fn on_message<T: Transport>(
        &mut self,
        transport: &mut T,
        message: &StatusMessage,
        now_ns: u64,
    ) -> Result<(), SendError> {
        self.state.on_message(transport, message, now_ns)
    }

    /// Handles a candidate's [`RequestVote`].
    ///
    /// # Errors
    ///
    /// If the transport has failed terminally, an error is returned.
    pub fn on_request_vote<T: Transport>(
        &mut self,
        transport: &mut T,
        request: &RequestVote,
        now_ns: u64,
    ) -> Result<(), SendError> {
        self.state.on_request_vote(transport, request, now_ns)
    }

    /// Handles a [`Vote`] addressed to this member.
    ///
    /// # Errors
    ///
    /// If the transport has failed terminally, an error is returned.
    pub fn on_vote<T: Transport>(
        &mut self,
        transport: &mut T,
        vote: &Vote,
        now_ns: u64,
    ) -> Result<(), SendError> {
        self.state.on_vote(transport, vote, now_ns)
    }

    /// Handles a follower's [`AppendedPosition`] report.
    ///
    /// # Errors
    ///
    /// If the transport has failed terminally, an error is returned.
    pub fn on_appended_position<T: Transport>(
        &mut self,
        transport: &mut T,
        report: &AppendedPosition,
        now_ns: u64,
    ) -> Result<(), SendError> {
        self.state.on_appended_position(transport, report, now_ns)
    }

    /// Handles the leader's [`CommitPosition`] broadcast.
    pub fn on_commit_position(&mut self, commit: &CommitPosition, now_ns: u64) {
        self.state.on_commit_position(commit, now_ns)
    }

    /// Advances time to `now_ns`, firing whatever timeout work is due for the current role.
    ///
    /// # Errors
    ///
    /// If the transport has failed terminally, an error is returned.
    pub fn on_time_event<T: Transport>(
        &mut self,
        transport: &mut T,
        now_ns: u64,
    ) -> Result<(), SendError> {
        self.state.on_time_event(transport, now_ns)
    }

    /// Forces the next election round; see [`State::timeout`].
    ///
    /// # Errors
    ///
    /// If the transport has failed terminally, an error is returned.
    pub fn timeout<T: Transport>(
        &mut self,
        transport: &mut T,
        now_ns: u64,
    ) -> Result<(), SendError> {
        self.state.timeout(transport, now_ns)
    }

    /// Returns a reference to the low-level state of the member.
    pub fn state(&self) -> &State<Random> {
        &self.state
    }

    /// Returns a mutable reference to the low-level state of the member.
    pub fn state_mut(&mut self) -> &mut State<Random> {
        &mut self.state
    }
}
