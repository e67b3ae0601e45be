//! Leader-side tracking of follower replication progress and quorum commit computation.

use std::collections::BTreeMap;
use std::iter;

use log::debug;

use crate::message::{LeadershipTermId, MemberId};

/// The replication progress of the followers within one leadership term.
///
/// One live value is kept per follower; a report that does not advance a follower's recorded
/// position is a no-op. The tracker is created when a member becomes leader and discarded when it
/// loses leadership, so recorded positions never cross terms.
pub struct ReplicationTracker {
    leadership_term_id: LeadershipTermId,
    appended: BTreeMap<MemberId, i64>,
}

impl ReplicationTracker {
    /// Constructs an empty tracker for `leadership_term_id`.
    pub fn new(leadership_term_id: LeadershipTermId) -> Self {
        Self {
            leadership_term_id,
            appended: BTreeMap::new(),
        }
    }

    /// Returns the leadership term this tracker covers.
    pub fn leadership_term_id(&self) -> LeadershipTermId {
        self.leadership_term_id
    }

    /// Returns the recorded appended position for `follower_member_id`, if any.
    pub fn appended_position(&self, follower_member_id: &MemberId) -> Option<i64> {
        self.appended.get(follower_member_id).copied()
    }

    /// Records `term_position` as appended by `follower_member_id`.
    ///
    /// Returns whether the follower's recorded position advanced; a position at or below the
    /// recorded value is ignored.
    pub fn record(&mut self, follower_member_id: MemberId, term_position: i64) -> bool {
        match self.appended.get(&follower_member_id) {
            Some(&recorded) if term_position <= recorded => {
                debug!(
                    "ignored appended position {} from {} having {}",
                    term_position, &follower_member_id, recorded
                );
                false
            }
            _ => {
                self.appended.insert(follower_member_id, term_position);
                true
            }
        }
    }

    /// Computes the largest position appended by a quorum of the `member_count` configured
    /// members, the leader's `own_position` counting as one. Returns `None` while fewer than a
    /// quorum of members have a known position.
    pub fn quorum_position(&self, own_position: i64, member_count: usize) -> Option<i64> {
        let mut positions: Vec<i64> = (self.appended.values().copied())
            .chain(iter::once(own_position))
            .collect();
        positions.sort_unstable();
        positions
            .into_iter()
            .rev()
            .skip(majority(member_count) - 1)
            .max()
    }
}

/// Computes the minimum size of a quorum of a cluster with `member_count` configured members.
///
/// Returns the strict majority, `member_count / 2 + 1`: the number of members which must have
/// appended a position before it may be committed, and the number of affirmative votes (the
/// candidate's own included) required to win an election.
pub fn majority(member_count: usize) -> usize {
    member_count / 2 + 1
}
