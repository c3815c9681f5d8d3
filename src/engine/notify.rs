//! Keyed, user-readable notices raised by the engine.

use std::{fmt, sync::Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notice {
    SignInToComment,
    SignInToVote,
    EmptyComment,
    UnknownComment,
    ReplyNotAllowed,
    NotYourComment,
    FailedToLoadComments,
    FailedToPostComment,
    FailedToDeleteComment,
    FailedToVote,
}

impl Notice {
    /// Stable key for UI lookup and tests.
    pub fn key(self) -> &'static str {
        match self {
            Notice::SignInToComment => "sign_in_to_comment",
            Notice::SignInToVote => "sign_in_to_vote",
            Notice::EmptyComment => "empty_comment",
            Notice::UnknownComment => "unknown_comment",
            Notice::ReplyNotAllowed => "reply_not_allowed",
            Notice::NotYourComment => "not_your_comment",
            Notice::FailedToLoadComments => "failed_to_load_comments",
            Notice::FailedToPostComment => "failed_to_post_comment",
            Notice::FailedToDeleteComment => "failed_to_delete_comment",
            Notice::FailedToVote => "failed_to_vote",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Notice::SignInToComment => "Sign in to comment.",
            Notice::SignInToVote => "Sign in to vote.",
            Notice::EmptyComment => "Comment cannot be empty.",
            Notice::UnknownComment => "That comment no longer exists.",
            Notice::ReplyNotAllowed => "You can only reply to top-level comments.",
            Notice::NotYourComment => "You can only delete your own comments.",
            Notice::FailedToLoadComments => "Failed to load comments.",
            Notice::FailedToPostComment => "Failed to post your comment. Please try again.",
            Notice::FailedToDeleteComment => "Failed to delete the comment.",
            Notice::FailedToVote => "Failed to record your vote.",
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Surface that shows notices to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Keeps every notice in order. Useful for headless embedders and tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        match self.notices.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn contains(&self, notice: Notice) -> bool {
        self.notices().contains(&notice)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        tracing::info!(key = notice.key(), "{}", notice);
        match self.notices.lock() {
            Ok(mut guard) => guard.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_are_recorded_in_order() {
        let sink = RecordingNotifier::new();
        sink.notify(Notice::EmptyComment);
        sink.notify(Notice::FailedToVote);
        assert_eq!(sink.notices(), vec![Notice::EmptyComment, Notice::FailedToVote]);
        assert!(sink.contains(Notice::FailedToVote));
        assert!(!sink.contains(Notice::SignInToComment));
    }

    #[test]
    fn messages_are_readable() {
        assert_eq!(Notice::EmptyComment.key(), "empty_comment");
        assert_eq!(Notice::EmptyComment.to_string(), "Comment cannot be empty.");
    }
}
