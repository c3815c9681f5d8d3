//! Assembles a fully hydrated thread snapshot.

use std::collections::{BTreeSet, HashMap};

use futures::future::{join_all, try_join_all};

use crate::{
    models::{
        comment::{Comment, CommentNode, Thread},
        profile::AuthorProfile,
        vote::ViewerVoteState,
    },
    store::{Backend, StoreResult},
};

/// Loads the first page of a target's thread as seen by `viewer_id`.
///
/// Top-level and reply queries are required; any failure there fails the load.
/// Profile and vote lookups run concurrently and fall back to `None` on error,
/// so the comment still renders. The result is returned only after every
/// lookup has settled.
pub async fn load_thread<B>(
    backend: &B,
    target_id: &str,
    viewer_id: Option<i64>,
    limit: i64,
) -> StoreResult<Thread>
where
    B: Backend + ?Sized,
{
    let tops = backend.top_level(target_id, limit).await?;
    let replies = try_join_all(tops.iter().map(|top| backend.replies(top.id))).await?;

    let authors: BTreeSet<i64> = tops
        .iter()
        .chain(replies.iter().flatten())
        .map(|c| c.author_id)
        .collect();
    let comment_ids: Vec<i64> = tops
        .iter()
        .chain(replies.iter().flatten())
        .map(|c| c.id)
        .collect();

    let (profiles, votes) = futures::join!(
        fetch_profiles(backend, authors),
        fetch_vote_states(backend, viewer_id, &comment_ids)
    );

    let hydrate = |comment: Comment| {
        let profile = profiles.get(&comment.author_id).cloned().flatten();
        let vote = votes.get(&comment.id).copied().unwrap_or_default();
        CommentNode::hydrate(comment, profile, vote)
    };

    let mut comments = Vec::with_capacity(tops.len());
    for (top, replies) in tops.into_iter().zip(replies) {
        let mut node = hydrate(top);
        node.replies = replies.into_iter().map(&hydrate).collect();
        comments.push(node);
    }

    let mut thread = Thread {
        target_id: target_id.to_string(),
        comments,
    };
    thread.normalize();

    tracing::debug!(
        target_id,
        nodes = thread.node_count(),
        "thread loaded"
    );
    Ok(thread)
}

async fn fetch_profiles<B>(backend: &B, authors: BTreeSet<i64>) -> HashMap<i64, Option<AuthorProfile>>
where
    B: Backend + ?Sized,
{
    let lookups = authors.into_iter().map(|author_id| async move {
        let profile = match backend.profile(author_id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(author_id, "profile lookup failed, rendering without it: {}", e);
                None
            }
        };
        (author_id, profile)
    });
    join_all(lookups).await.into_iter().collect()
}

async fn fetch_vote_states<B>(
    backend: &B,
    viewer_id: Option<i64>,
    comment_ids: &[i64],
) -> HashMap<i64, ViewerVoteState>
where
    B: Backend + ?Sized,
{
    // Anonymous viewers have no votes to look up.
    let Some(viewer_id) = viewer_id else {
        return HashMap::new();
    };

    let lookups = comment_ids.iter().map(|&comment_id| async move {
        let state = match backend.vote_state(viewer_id, comment_id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(comment_id, "vote state lookup failed, assuming none: {}", e);
                ViewerVoteState::None
            }
        };
        (comment_id, state)
    });
    join_all(lookups).await.into_iter().collect()
}
