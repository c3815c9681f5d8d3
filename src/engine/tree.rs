//! In-memory transforms on a rendered thread. None of these touch the store.

use uuid::Uuid;

use crate::models::comment::{CommentKey, CommentNode, Thread};

impl Thread {
    pub fn empty(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            comments: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// Total node count, replies included.
    pub fn node_count(&self) -> usize {
        self.comments.iter().map(|c| 1 + c.replies.len()).sum()
    }

    pub fn find(&self, key: CommentKey) -> Option<&CommentNode> {
        self.comments.iter().find_map(|top| {
            if top.key == key {
                Some(top)
            } else {
                top.replies.iter().find(|r| r.key == key)
            }
        })
    }

    pub fn find_mut(&mut self, key: CommentKey) -> Option<&mut CommentNode> {
        for top in &mut self.comments {
            if top.key == key {
                return Some(top);
            }
            if let Some(reply) = top.replies.iter_mut().find(|r| r.key == key) {
                return Some(reply);
            }
        }
        None
    }

    pub fn get(&self, id: i64) -> Option<&CommentNode> {
        self.find(CommentKey::Saved(id))
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut CommentNode> {
        self.find_mut(CommentKey::Saved(id))
    }

    /// Removes a node. A top-level node takes its replies with it.
    /// Returns the number of nodes removed.
    pub fn remove(&mut self, key: CommentKey) -> usize {
        if let Some(pos) = self.comments.iter().position(|c| c.key == key) {
            let top = self.comments.remove(pos);
            return 1 + top.replies.len();
        }
        for top in &mut self.comments {
            if let Some(pos) = top.replies.iter().position(|r| r.key == key) {
                top.replies.remove(pos);
                return 1;
            }
        }
        0
    }

    /// Appends a reply under a top-level parent. Returns `false` if the parent is absent.
    pub fn push_reply(&mut self, parent_id: i64, reply: CommentNode) -> bool {
        let key = CommentKey::Saved(parent_id);
        match self.comments.iter_mut().find(|c| c.key == key) {
            Some(parent) => {
                parent.replies.push(reply);
                parent
                    .replies
                    .sort_by(|a, b| a.created_at.cmp(&b.created_at));
                true
            }
            None => false,
        }
    }

    /// Swaps an optimistic reply for the stored record, keeping reply order.
    pub fn replace_pending(&mut self, temp: Uuid, node: CommentNode) -> bool {
        let key = CommentKey::Pending(temp);
        for top in &mut self.comments {
            if let Some(slot) = top.replies.iter_mut().find(|r| r.key == key) {
                *slot = node;
                top.replies.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                return true;
            }
        }
        false
    }

    /// Restores the ordering invariants: top level newest first, replies oldest first.
    pub fn normalize(&mut self) {
        self.comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        for top in &mut self.comments {
            top.replies.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        }
    }

    /// Visits every node mutably, each top-level node before its replies.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut CommentNode)) {
        for top in &mut self.comments {
            f(top);
            for reply in &mut top.replies {
                f(reply);
            }
        }
    }

    /// Every node, top-level first then its replies.
    pub fn iter(&self) -> impl Iterator<Item = &CommentNode> {
        self.comments
            .iter()
            .flat_map(|top| std::iter::once(top).chain(top.replies.iter()))
    }
}
