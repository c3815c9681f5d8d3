//! Like-count arithmetic shared by the optimistic client path and the ledger.
//!
//! Comments carry a single counter for both actions; there is no separate
//! dislike tally.

use crate::models::vote::{ViewerVoteState, VoteValue};

/// What the ledger does with an existing record when a vote arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastResolution {
    Insert(VoteValue),
    Update(VoteValue),
    Remove,
}

impl CastResolution {
    /// The record stored after the cast applies.
    pub fn resulting(self) -> Option<VoteValue> {
        match self {
            CastResolution::Insert(value) | CastResolution::Update(value) => Some(value),
            CastResolution::Remove => None,
        }
    }
}

/// Optimistic counter after `action`, given the viewer's prior state.
///
/// | prior    | like  | dislike |
/// |----------|-------|---------|
/// | Liked    | -1    | +1      |
/// | Disliked | +1    | -1      |
/// | None     | +1    | -1      |
///
/// Decrements never go below zero.
pub fn next_like_count(prior: ViewerVoteState, action: VoteValue, count: i32) -> i32 {
    let delta = match (prior, action) {
        (ViewerVoteState::Liked, VoteValue::Like) => -1,
        (ViewerVoteState::Liked, VoteValue::Dislike) => 1,
        (ViewerVoteState::Disliked, VoteValue::Like) => 1,
        (ViewerVoteState::Disliked, VoteValue::Dislike) => -1,
        (ViewerVoteState::None, VoteValue::Like) => 1,
        (ViewerVoteState::None, VoteValue::Dislike) => -1,
    };
    apply_delta(count, delta)
}

/// The state shown right after a click. Never `None`, even for a toggle-off;
/// reconciliation supplies the true value.
pub fn optimistic_state(action: VoteValue) -> ViewerVoteState {
    match action {
        VoteValue::Like => ViewerVoteState::Liked,
        VoteValue::Dislike => ViewerVoteState::Disliked,
    }
}

pub fn apply_delta(count: i32, delta: i32) -> i32 {
    count.saturating_add(delta).max(0)
}

pub fn resolve_cast(existing: Option<VoteValue>, requested: VoteValue) -> CastResolution {
    match existing {
        None => CastResolution::Insert(requested),
        Some(current) if current == requested => CastResolution::Remove,
        Some(_) => CastResolution::Update(requested),
    }
}

/// Change to the stored counter when a record goes from `before` to `after`.
/// The stored counter is the number of `Like` records.
pub fn tally_delta(before: Option<VoteValue>, after: Option<VoteValue>) -> i32 {
    let likes = |v: Option<VoteValue>| i32::from(v == Some(VoteValue::Like));
    likes(after) - likes(before)
}
