// src/models/vote.rs

use serde::{Deserialize, Serialize};

/// A single ledger entry value.
/// Stored as `SMALLINT` in the 'comment_votes' table: `1` for like, `-1` for dislike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteValue {
    Like,
    Dislike,
}

impl VoteValue {
    pub fn from_liking(liking: bool) -> Self {
        if liking { VoteValue::Like } else { VoteValue::Dislike }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            VoteValue::Like => 1,
            VoteValue::Dislike => -1,
        }
    }

    /// Decodes the stored column value. Anything other than `1` or `-1` is rejected.
    pub fn from_i16(raw: i16) -> Option<Self> {
        match raw {
            1 => Some(VoteValue::Like),
            -1 => Some(VoteValue::Dislike),
            _ => None,
        }
    }
}

/// The current viewer's vote status on one comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerVoteState {
    Liked,
    Disliked,
    #[default]
    None,
}

impl From<Option<VoteValue>> for ViewerVoteState {
    fn from(value: Option<VoteValue>) -> Self {
        match value {
            Some(VoteValue::Like) => ViewerVoteState::Liked,
            Some(VoteValue::Dislike) => ViewerVoteState::Disliked,
            None => ViewerVoteState::None,
        }
    }
}

/// Ledger-derived truth for a comment after a vote commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub comment_id: i64,
    pub like_count: i32,
    pub state: ViewerVoteState,
}

/// DTO for casting a vote.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub value: VoteValue,
}
