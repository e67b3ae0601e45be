//! Unstable, low-level API for the complete consensus state of a cluster member.

use std::collections::BTreeSet;
use std::iter;

use log::{debug, info};
use rand_core::RngCore;

use crate::channel::{SendError, StatusChannel};
use crate::liveness::Liveness;
use crate::message::{
    AppendedPosition, CommitPosition, LeadershipTermId, MemberId, RequestVote, StatusMessage,
    Vote, VoteDecision,
};
use crate::node::Config;
use crate::replication::{majority, ReplicationTracker};
use crate::transport::Transport;

use self::RoleState::*;

/// The three mutually exclusive roles a member holds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// Replicating the leader's log and watching its heartbeat.
    Follower,

    /// Requesting votes for a new leadership term.
    Candidate,

    /// Leading the current term and computing the quorum commit position.
    Leader,
}

enum RoleState {
    Follower(FollowerState),
    Candidate(CandidateState),
    Leader(LeaderState),
}

struct FollowerState {
    // The tracked entity is the known leader; None until one is heard from.
    heartbeat: Liveness<Option<MemberId>>,
}

struct CandidateState {
    votes_granted: BTreeSet<MemberId>,

    election_deadline_ns: u64,
}

struct LeaderState {
    tracker: ReplicationTracker,

    last_heartbeat_ns: u64,
}

/// The complete consensus state of a cluster member.
pub struct State<Random> {
    member_id: MemberId,
    members: BTreeSet<MemberId>,
    random: Random,
    config: Config,
    channel: StatusChannel,

    current_term: LeadershipTermId,

    // The term a vote was granted in, if any; at most one vote per term.
    voted_in_term: Option<LeadershipTermId>,

    last_base_position: i64,
    last_term_position: i64,
    last_commit_position: i64,

    role: RoleState,
}

#[allow(missing_docs)]
impl<Random> State<Random>
where
    Random: RngCore,
{
    pub fn new(
        member_id: MemberId,
        mut members: BTreeSet<MemberId>,
        random: Random,
        config: Config,
        now_ns: u64,
    ) -> Self {
        members.insert(member_id);
        let heartbeat = Liveness::new(None, config.election_timeout_ns, now_ns);
        Self {
            member_id,
            members,
            random,
            channel: StatusChannel::new(config.send_attempts),
            config,
            current_term: LeadershipTermId::default(),
            voted_in_term: None,
            last_base_position: 0,
            last_term_position: 0,
            last_commit_position: 0,
            role: Follower(FollowerState { heartbeat }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn current_term(&self) -> LeadershipTermId {
        self.current_term
    }

    pub fn is_leader(&self) -> bool {
        matches!(&self.role, Leader(_))
    }

    pub fn last_appended_position(&self) -> (i64, i64) {
        (self.last_base_position, self.last_term_position)
    }

    pub fn last_commit_position(&self) -> i64 {
        self.last_commit_position
    }

    pub fn leader(&self) -> (Option<MemberId>, LeadershipTermId) {
        let leader = match &self.role {
            Follower(follower_state) => *follower_state.heartbeat.entity_id(),
            Candidate(_) => None,
            Leader(_) => Some(self.member_id),
        };
        (leader, self.current_term)
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn members(&self) -> &BTreeSet<MemberId> {
        &self.members
    }

    pub fn role(&self) -> Role {
        match &self.role {
            Follower(_) => Role::Follower,
            Candidate(_) => Role::Candidate,
            Leader(_) => Role::Leader,
        }
    }

    //
    // state transitions
    //

    /// Advances time to `now_ns`: a follower checks the leader heartbeat for expiry, a candidate
    /// checks its election window, a leader emits commit-position heartbeats on its interval.
    pub fn on_time_event<T: Transport>(
        &mut self,
        transport: &mut T,
        now_ns: u64,
    ) -> Result<(), SendError> {
        match &mut self.role {
            Follower(follower_state) => {
                follower_state.heartbeat.on_time_event(now_ns);
                if follower_state.heartbeat.has_reached_end_of_life() {
                    info!("leader heartbeat timeout at {}", &self.current_term);
                    self.timeout(transport, now_ns)?;
                }
            }
            Candidate(candidate_state) => {
                if now_ns > candidate_state.election_deadline_ns {
                    info!("election window expired at {}", &self.current_term);
                    self.timeout(transport, now_ns)?;
                }
            }
            Leader(leader_state) => {
                let due_ns = (leader_state.last_heartbeat_ns)
                    .saturating_add(self.config.heartbeat_interval_ns);
                if now_ns >= due_ns {
                    leader_state.last_heartbeat_ns = now_ns;
                    debug!("sending commit position heartbeat");
                    self.channel.commit_position(
                        transport,
                        self.last_commit_position,
                        self.current_term,
                        self.member_id,
                        self.config.log_session_id,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Starts the next election round: a new term, a vote for itself, and a RequestVote
    /// broadcast. Called when the leader heartbeat expires or a candidate's election window
    /// closes; a leader ignores it.
    pub fn timeout<T: Transport>(
        &mut self,
        transport: &mut T,
        now_ns: u64,
    ) -> Result<(), SendError> {
        if self.is_leader() {
            return Ok(());
        }
        self.current_term += 1;
        self.voted_in_term = Some(self.current_term);
        let votes_granted = iter::once(self.member_id).collect();
        self.role = Candidate(CandidateState {
            votes_granted,
            election_deadline_ns: now_ns.saturating_add(self.random_election_window()),
        });

        info!("became candidate at {}", &self.current_term);
        self.try_become_leader(transport, now_ns)?;
        if !self.is_leader() {
            self.channel.request_vote(
                transport,
                self.current_term,
                self.last_base_position,
                self.last_term_position,
                self.member_id,
            )?;
        }
        Ok(())
    }

    // A candidate holding affirmative votes (its own included) from a strict majority of the
    // configured member set takes leadership and announces itself with an immediate
    // commit-position heartbeat.
    fn try_become_leader<T: Transport>(
        &mut self,
        transport: &mut T,
        now_ns: u64,
    ) -> Result<(), SendError> {
        if let Candidate(candidate_state) = &self.role {
            if candidate_state.votes_granted.len() >= majority(self.members.len()) {
                info!("became leader at {}", &self.current_term);
                self.role = Leader(LeaderState {
                    tracker: ReplicationTracker::new(self.current_term),
                    last_heartbeat_ns: now_ns,
                });
                self.channel.commit_position(
                    transport,
                    self.last_commit_position,
                    self.current_term,
                    self.member_id,
                    self.config.log_session_id,
                )?;
            }
        }
        Ok(())
    }

    // Any message with a newer term causes the recipient to adopt the term first.
    fn update_term(&mut self, message_term: LeadershipTermId, now_ns: u64) {
        if message_term > self.current_term {
            info!(
                "became follower at {} (from {})",
                &message_term, &self.current_term
            );
            self.current_term = message_term;
            self.voted_in_term = None;
            self.role = Follower(FollowerState {
                heartbeat: Liveness::new(None, self.config.election_timeout_ns, now_ns),
            });
        }
    }

    //
    // message handlers
    //

    /// Handles a decoded message of any type, replying through `transport` where the protocol
    /// asks for it.
    pub fn on_message<T: Transport>(
        &mut self,
        transport: &mut T,
        message: &StatusMessage,
        now_ns: u64,
    ) -> Result<(), SendError> {
        match message {
            StatusMessage::RequestVote(request) => {
                self.on_request_vote(transport, request, now_ns)
            }
            StatusMessage::Vote(vote) => self.on_vote(transport, vote, now_ns),
            StatusMessage::AppendedPosition(report) => {
                self.on_appended_position(transport, report, now_ns)
            }
            StatusMessage::CommitPosition(commit) => {
                self.on_commit_position(commit, now_ns);
                Ok(())
            }
        }
    }

    /// Handles a candidate's request for a vote, answering with a granted or denied [`Vote`].
    pub fn on_request_vote<T: Transport>(
        &mut self,
        transport: &mut T,
        request: &RequestVote,
        now_ns: u64,
    ) -> Result<(), SendError> {
        self.update_term(request.candidate_term_id, now_ns);
        if request.candidate_member_id == self.member_id {
            return Ok(());
        }

        let log_ok = request.last_base_position > self.last_base_position
            || (request.last_base_position == self.last_base_position
                && request.last_term_position >= self.last_term_position);
        let grant = request.candidate_term_id == self.current_term
            && log_ok
            && self.voted_in_term != Some(self.current_term);

        if grant {
            // Recorded before the reply so an immediate retry cannot obtain a second grant.
            self.voted_in_term = Some(self.current_term);
            info!(
                "granted vote at {} to {} with ({}, {})",
                &self.current_term,
                &request.candidate_member_id,
                &request.last_base_position,
                &request.last_term_position
            );
            if let Follower(follower_state) = &mut self.role {
                follower_state.heartbeat.keep_alive(now_ns);
            }
        } else if request.candidate_term_id != self.current_term {
            info!(
                "denied vote to {} with stale {} at {}",
                &request.candidate_member_id, &request.candidate_term_id, &self.current_term
            );
        } else if let Some(voted_term) = &self.voted_in_term {
            info!(
                "denied vote at {} to {} as already voted in {}",
                &self.current_term, &request.candidate_member_id, voted_term
            );
        } else {
            info!(
                "denied vote at {} to {} with ({}, {}) behind ({}, {})",
                &self.current_term,
                &request.candidate_member_id,
                &request.last_base_position,
                &request.last_term_position,
                &self.last_base_position,
                &self.last_term_position
            );
        }

        let decision = if grant {
            VoteDecision::Granted
        } else {
            VoteDecision::Denied
        };
        self.channel.vote(
            transport,
            request.candidate_term_id,
            request.last_base_position,
            request.last_term_position,
            request.candidate_member_id,
            self.member_id,
            decision,
        )?;
        Ok(())
    }

    /// Handles a vote addressed to this member, tallying grants while a candidate.
    pub fn on_vote<T: Transport>(
        &mut self,
        transport: &mut T,
        vote: &Vote,
        now_ns: u64,
    ) -> Result<(), SendError> {
        self.update_term(vote.candidate_term_id, now_ns);
        if vote.candidate_member_id != self.member_id {
            return Ok(());
        }
        if vote.candidate_term_id < self.current_term {
            info!(
                "ignored vote with {} < current {} from {}",
                &vote.candidate_term_id, &self.current_term, &vote.follower_member_id
            );
            return Ok(());
        }

        if let Candidate(candidate_state) = &mut self.role {
            match vote.vote {
                VoteDecision::Granted => {
                    info!(
                        "received vote granted from {} at {}",
                        &vote.follower_member_id, &self.current_term
                    );
                    candidate_state.votes_granted.insert(vote.follower_member_id);
                    self.try_become_leader(transport, now_ns)?;
                }
                VoteDecision::Denied => {
                    info!(
                        "received vote denied from {} at {}",
                        &vote.follower_member_id, &self.current_term
                    );
                }
                VoteDecision::Unset => (),
            }
        }
        Ok(())
    }

    /// Handles a follower's appended-position report, advancing the commit position when a
    /// quorum agrees.
    pub fn on_appended_position<T: Transport>(
        &mut self,
        transport: &mut T,
        report: &AppendedPosition,
        now_ns: u64,
    ) -> Result<(), SendError> {
        self.update_term(report.leadership_term_id, now_ns);
        if report.follower_member_id == self.member_id {
            return Ok(());
        }

        let advanced = match &mut self.role {
            Leader(leader_state) => {
                report.leadership_term_id == leader_state.tracker.leadership_term_id()
                    && leader_state
                        .tracker
                        .record(report.follower_member_id, report.term_position)
            }
            Follower(_) | Candidate(_) => false,
        };
        if advanced {
            self.advance_commit_position(transport)?;
        }
        Ok(())
    }

    /// Handles the leader's commit broadcast: the follower's heartbeat refresh and the
    /// cluster-wide monotonic commit position.
    pub fn on_commit_position(&mut self, commit: &CommitPosition, now_ns: u64) {
        self.update_term(commit.leadership_term_id, now_ns);
        if commit.leader_member_id == self.member_id {
            return;
        }
        if commit.leadership_term_id < self.current_term {
            debug!(
                "ignored commit position with {} < current {}",
                &commit.leadership_term_id, &self.current_term
            );
            return;
        }

        if let Follower(follower_state) = &mut self.role {
            if follower_state.heartbeat.entity_id() != &Some(commit.leader_member_id) {
                info!(
                    "following {} at {}",
                    &commit.leader_member_id, &self.current_term
                );
                follower_state.heartbeat = Liveness::new(
                    Some(commit.leader_member_id),
                    self.config.election_timeout_ns,
                    now_ns,
                );
            } else {
                follower_state.heartbeat.keep_alive(now_ns);
            }
        }
        if commit.term_position > self.last_commit_position {
            self.last_commit_position = commit.term_position;
        }
    }

    /// Records local log append progress as reported by the log layer.
    ///
    /// A follower publishes the new position to the leader; the leader re-evaluates the quorum
    /// commit position with its own progress counted.
    pub fn log_appended<T: Transport>(
        &mut self,
        transport: &mut T,
        base_position: i64,
        term_position: i64,
    ) -> Result<(), SendError> {
        if (base_position, term_position) <= (self.last_base_position, self.last_term_position) {
            return Ok(());
        }
        self.last_base_position = base_position;
        self.last_term_position = term_position;

        match self.role() {
            Role::Follower => {
                self.channel.appended_position(
                    transport,
                    term_position,
                    self.current_term,
                    self.member_id,
                )?;
            }
            Role::Candidate => (),
            Role::Leader => self.advance_commit_position(transport)?,
        }
        Ok(())
    }

    //
    // helpers
    //

    fn advance_commit_position<T: Transport>(
        &mut self,
        transport: &mut T,
    ) -> Result<(), SendError> {
        let quorum_position = match &self.role {
            Leader(leader_state) => leader_state
                .tracker
                .quorum_position(self.last_term_position, self.members.len()),
            Follower(_) | Candidate(_) => None,
        };

        if let Some(position) = quorum_position {
            if position > self.last_commit_position {
                debug!(
                    "advanced commit position from {} to {}",
                    &self.last_commit_position, &position
                );
                self.last_commit_position = position;
                self.channel.commit_position(
                    transport,
                    position,
                    self.current_term,
                    self.member_id,
                    self.config.log_session_id,
                )?;
            }
        }
        Ok(())
    }

    fn random_election_window(&mut self) -> u64 {
        let jitter = (self.random.next_u64())
            .checked_rem(self.config.election_timeout_ns)
            .unwrap_or(0);
        self.config.election_timeout_ns.saturating_add(jitter)
    }
}
