//! Control messages exchanged between cluster members.
//!
//! This module provides the data types for the four consensus control messages, together with a
//! stateless fixed-width codec. Every frame starts with a common eight-byte header
//! (block length, template id, schema id, version, all little-endian `u16`) followed by a
//! fixed-width body; there are no variable-length fields, so a frame's length is known before it
//! is claimed from the transport.

use std::fmt;
use std::ops::AddAssign;

use bytes::{Buf, BufMut};
use thiserror::Error;

/// The schema id carried in every frame header.
pub const SCHEMA_ID: u16 = 111;

/// The schema version carried in every frame header.
pub const SCHEMA_VERSION: u16 = 1;

/// The encoded length of the common frame header.
pub const HEADER_LEN: usize = 8;

const REQUEST_VOTE_TEMPLATE_ID: u16 = 1;
const VOTE_TEMPLATE_ID: u16 = 2;
const APPENDED_POSITION_TEMPLATE_ID: u16 = 3;
const COMMIT_POSITION_TEMPLATE_ID: u16 = 4;

const REQUEST_VOTE_BLOCK_LENGTH: u16 = 28;
const VOTE_BLOCK_LENGTH: u16 = 33;
const APPENDED_POSITION_BLOCK_LENGTH: u16 = 20;
const COMMIT_POSITION_BLOCK_LENGTH: u16 = 24;

/// A consensus control message, tagged by type.
///
/// One value of this enum corresponds to exactly one frame on the member status stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusMessage {
    /// A candidate's request for leadership votes.
    RequestVote(RequestVote),

    /// A follower's answer to a [`RequestVote`].
    Vote(Vote),

    /// A follower's report of its local log append progress.
    AppendedPosition(AppendedPosition),

    /// The leader's broadcast of the quorum-committed position, doubling as its heartbeat.
    CommitPosition(CommitPosition),
}

/// A request to obtain leadership of the cluster for a term.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RequestVote {
    /// The term the candidate is requesting leadership of.
    pub candidate_term_id: LeadershipTermId,

    /// The base log position of the candidate's last known leadership term.
    pub last_base_position: i64,

    /// The position reached by the candidate within its last known leadership term.
    pub last_term_position: i64,

    /// The id of the candidate member.
    pub candidate_member_id: MemberId,
}

/// The answer to a [`RequestVote`], granting or denying leadership.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Vote {
    /// The term the vote applies to, echoed from the request.
    pub candidate_term_id: LeadershipTermId,

    /// The candidate's base log position, echoed from the request.
    pub last_base_position: i64,

    /// The candidate's term position, echoed from the request.
    pub last_term_position: i64,

    /// The id of the candidate member the vote is addressed to.
    pub candidate_member_id: MemberId,

    /// The id of the member casting the vote.
    pub follower_member_id: MemberId,

    /// The decision: granted, denied, or not yet answered.
    pub vote: VoteDecision,
}

/// A follower's report of the position it has appended to its local log for a leadership term.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AppendedPosition {
    /// The position appended within the leadership term.
    pub term_position: i64,

    /// The leadership term the position belongs to.
    pub leadership_term_id: LeadershipTermId,

    /// The id of the reporting follower.
    pub follower_member_id: MemberId,
}

/// The leader's broadcast of the position committed by quorum agreement.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CommitPosition {
    /// The committed position within the leadership term.
    pub term_position: i64,

    /// The leadership term the position belongs to.
    pub leadership_term_id: LeadershipTermId,

    /// The id of the leader broadcasting the commit.
    pub leader_member_id: MemberId,

    /// The session id of the leader's log stream.
    pub log_session_id: i32,
}

/// The tri-state decision carried by a [`Vote`].
///
/// The explicit [`Unset`](Self::Unset) sentinel distinguishes "not yet answered" from "denied" and
/// encodes as the one-byte null value `255`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VoteDecision {
    /// The vote was denied.
    Denied,

    /// The vote was granted.
    Granted,

    /// No decision has been recorded.
    Unset,
}

/// The unique, monotonically non-decreasing id of a term of cluster leadership.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct LeadershipTermId {
    /// The non-negative integer assigned to this term.
    pub id: i64,
}

/// The id of a configured cluster member.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct MemberId {
    /// The integer assigned to this member.
    pub id: i32,
}

/// An error returned when a frame cannot be decoded.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum DecodeError {
    /// The frame is shorter than its header or declared body.
    #[error("frame truncated at {len} bytes")]
    Truncated {
        /// The observed frame length.
        len: usize,
    },

    /// The header carries a schema id this codec does not speak.
    #[error("unknown schema id {0}")]
    UnknownSchema(u16),

    /// The header carries a template id this codec does not know.
    #[error("unknown template id {0}")]
    UnknownTemplate(u16),

    /// The vote byte is outside the tri-state encoding.
    #[error("invalid vote encoding {0}")]
    InvalidVote(u8),
}

//
// StatusMessage impls
//

impl StatusMessage {
    /// Returns the template id identifying this message type on the wire.
    pub fn template_id(&self) -> u16 {
        match self {
            StatusMessage::RequestVote(_) => REQUEST_VOTE_TEMPLATE_ID,
            StatusMessage::Vote(_) => VOTE_TEMPLATE_ID,
            StatusMessage::AppendedPosition(_) => APPENDED_POSITION_TEMPLATE_ID,
            StatusMessage::CommitPosition(_) => COMMIT_POSITION_TEMPLATE_ID,
        }
    }

    /// Returns the fixed body length of this message type.
    pub fn block_length(&self) -> u16 {
        match self {
            StatusMessage::RequestVote(_) => REQUEST_VOTE_BLOCK_LENGTH,
            StatusMessage::Vote(_) => VOTE_BLOCK_LENGTH,
            StatusMessage::AppendedPosition(_) => APPENDED_POSITION_BLOCK_LENGTH,
            StatusMessage::CommitPosition(_) => COMMIT_POSITION_BLOCK_LENGTH,
        }
    }

    /// Returns the exact encoded length of this message, header included.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.block_length() as usize
    }

    /// Encodes this message into `buf`, which must be exactly [`encoded_len`](Self::encoded_len)
    /// bytes long.
    pub fn encode(&self, mut buf: &mut [u8]) {
        assert_eq!(
            buf.len(),
            self.encoded_len(),
            "claimed region does not match the encoded length"
        );
        buf.put_u16_le(self.block_length());
        buf.put_u16_le(self.template_id());
        buf.put_u16_le(SCHEMA_ID);
        buf.put_u16_le(SCHEMA_VERSION);

        match self {
            StatusMessage::RequestVote(msg) => {
                buf.put_i64_le(msg.candidate_term_id.id);
                buf.put_i64_le(msg.last_base_position);
                buf.put_i64_le(msg.last_term_position);
                buf.put_i32_le(msg.candidate_member_id.id);
            }
            StatusMessage::Vote(msg) => {
                buf.put_i64_le(msg.candidate_term_id.id);
                buf.put_i64_le(msg.last_base_position);
                buf.put_i64_le(msg.last_term_position);
                buf.put_i32_le(msg.candidate_member_id.id);
                buf.put_i32_le(msg.follower_member_id.id);
                buf.put_u8(msg.vote.to_wire());
            }
            StatusMessage::AppendedPosition(msg) => {
                buf.put_i64_le(msg.term_position);
                buf.put_i64_le(msg.leadership_term_id.id);
                buf.put_i32_le(msg.follower_member_id.id);
            }
            StatusMessage::CommitPosition(msg) => {
                buf.put_i64_le(msg.term_position);
                buf.put_i64_le(msg.leadership_term_id.id);
                buf.put_i32_le(msg.leader_member_id.id);
                buf.put_i32_le(msg.log_session_id);
            }
        }
    }

    /// Decodes one frame from `buf`.
    ///
    /// # Errors
    ///
    /// If the frame is truncated, carries an unknown schema or template id, or holds an invalid
    /// vote byte, an error is returned.
    pub fn decode(mut buf: &[u8]) -> Result<Self, DecodeError> {
        let frame_len = buf.len();
        if frame_len < HEADER_LEN {
            return Err(DecodeError::Truncated { len: frame_len });
        }
        let block_length = buf.get_u16_le();
        let template_id = buf.get_u16_le();
        let schema_id = buf.get_u16_le();
        let _version = buf.get_u16_le();

        if schema_id != SCHEMA_ID {
            return Err(DecodeError::UnknownSchema(schema_id));
        }
        if buf.len() < block_length as usize {
            return Err(DecodeError::Truncated { len: frame_len });
        }

        match template_id {
            REQUEST_VOTE_TEMPLATE_ID => Ok(StatusMessage::RequestVote(RequestVote {
                candidate_term_id: LeadershipTermId { id: buf.get_i64_le() },
                last_base_position: buf.get_i64_le(),
                last_term_position: buf.get_i64_le(),
                candidate_member_id: MemberId { id: buf.get_i32_le() },
            })),
            VOTE_TEMPLATE_ID => Ok(StatusMessage::Vote(Vote {
                candidate_term_id: LeadershipTermId { id: buf.get_i64_le() },
                last_base_position: buf.get_i64_le(),
                last_term_position: buf.get_i64_le(),
                candidate_member_id: MemberId { id: buf.get_i32_le() },
                follower_member_id: MemberId { id: buf.get_i32_le() },
                vote: VoteDecision::from_wire(buf.get_u8())?,
            })),
            APPENDED_POSITION_TEMPLATE_ID => Ok(StatusMessage::AppendedPosition(AppendedPosition {
                term_position: buf.get_i64_le(),
                leadership_term_id: LeadershipTermId { id: buf.get_i64_le() },
                follower_member_id: MemberId { id: buf.get_i32_le() },
            })),
            COMMIT_POSITION_TEMPLATE_ID => Ok(StatusMessage::CommitPosition(CommitPosition {
                term_position: buf.get_i64_le(),
                leadership_term_id: LeadershipTermId { id: buf.get_i64_le() },
                leader_member_id: MemberId { id: buf.get_i32_le() },
                log_session_id: buf.get_i32_le(),
            })),
            other => Err(DecodeError::UnknownTemplate(other)),
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            StatusMessage::RequestVote(msg) => fmt::Display::fmt(msg, fmt),
            StatusMessage::Vote(msg) => fmt::Display::fmt(msg, fmt),
            StatusMessage::AppendedPosition(msg) => fmt::Display::fmt(msg, fmt),
            StatusMessage::CommitPosition(msg) => fmt::Display::fmt(msg, fmt),
        }
    }
}

//
// RequestVote impls
//

impl fmt::Display for RequestVote {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            candidate_term_id,
            last_base_position,
            last_term_position,
            candidate_member_id,
        } = self;
        fmt.debug_struct("RequestVote")
            .field("candidate_term_id", &format_args!("{}", candidate_term_id))
            .field("last_base_position", last_base_position)
            .field("last_term_position", last_term_position)
            .field("candidate_member_id", &format_args!("{}", candidate_member_id))
            .finish()
    }
}

//
// Vote impls
//

impl fmt::Display for Vote {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            candidate_term_id,
            candidate_member_id,
            follower_member_id,
            vote,
            ..
        } = self;
        fmt.debug_struct("Vote")
            .field("candidate_term_id", &format_args!("{}", candidate_term_id))
            .field("candidate_member_id", &format_args!("{}", candidate_member_id))
            .field("follower_member_id", &format_args!("{}", follower_member_id))
            .field("vote", &format_args!("{}", vote))
            .finish()
    }
}

//
// AppendedPosition impls
//

impl fmt::Display for AppendedPosition {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            term_position,
            leadership_term_id,
            follower_member_id,
        } = self;
        fmt.debug_struct("AppendedPosition")
            .field("term_position", term_position)
            .field("leadership_term_id", &format_args!("{}", leadership_term_id))
            .field("follower_member_id", &format_args!("{}", follower_member_id))
            .finish()
    }
}

//
// CommitPosition impls
//

impl fmt::Display for CommitPosition {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            term_position,
            leadership_term_id,
            leader_member_id,
            log_session_id,
        } = self;
        fmt.debug_struct("CommitPosition")
            .field("term_position", term_position)
            .field("leadership_term_id", &format_args!("{}", leadership_term_id))
            .field("leader_member_id", &format_args!("{}", leader_member_id))
            .field("log_session_id", log_session_id)
            .finish()
    }
}

//
// VoteDecision impls
//

impl VoteDecision {
    const NULL_VALUE: u8 = 255;

    fn to_wire(self) -> u8 {
        match self {
            VoteDecision::Denied => 0,
            VoteDecision::Granted => 1,
            VoteDecision::Unset => Self::NULL_VALUE,
        }
    }

    fn from_wire(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(VoteDecision::Denied),
            1 => Ok(VoteDecision::Granted),
            Self::NULL_VALUE => Ok(VoteDecision::Unset),
            other => Err(DecodeError::InvalidVote(other)),
        }
    }
}

impl Default for VoteDecision {
    fn default() -> Self {
        VoteDecision::Unset
    }
}

impl fmt::Display for VoteDecision {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            VoteDecision::Denied => "DENIED",
            VoteDecision::Granted => "GRANTED",
            VoteDecision::Unset => "UNSET",
        })
    }
}

//
// LeadershipTermId impls
//

impl fmt::Display for LeadershipTermId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { id } = self;
        fmt.debug_tuple("Term").field(id).finish()
    }
}

impl AddAssign<i64> for LeadershipTermId {
    fn add_assign(&mut self, rhs: i64) {
        self.id = self
            .id
            .checked_add(rhs)
            .unwrap_or_else(|| panic!("overflow"));
    }
}

//
// MemberId impls
//

impl fmt::Display for MemberId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { id } = self;
        fmt.debug_tuple("Member").field(id).finish()
    }
}
