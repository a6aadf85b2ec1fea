//! Content and access collaborators consulted while delivering trees.
//!
//! # Responsibility
//! - Describe what the outline needs from the content store (titles,
//!   publication state) and from the viewer's access policy.
//! - Provide small in-process implementations for embedding and tests.
//!
//! # Invariants
//! - Content metadata is never cached beyond one tree delivery.

use crate::model::book_link::NodeId;
use std::collections::HashMap;

/// Content metadata the outline needs for display and access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentInfo {
    pub title: String,
    pub is_published: bool,
}

impl ContentInfo {
    pub fn published(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            is_published: true,
        }
    }

    pub fn unpublished(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            is_published: false,
        }
    }
}

/// Read-only view of the content store.
pub trait ContentStore {
    /// Loads one content item.
    fn load(&self, nid: NodeId) -> Option<ContentInfo>;

    /// Loads every existing item among `nids`.
    fn load_many(&self, nids: &[NodeId]) -> HashMap<NodeId, ContentInfo> {
        nids.iter()
            .filter_map(|nid| self.load(*nid).map(|info| (*nid, info)))
            .collect()
    }
}

impl<T: ContentStore + ?Sized> ContentStore for &T {
    fn load(&self, nid: NodeId) -> Option<ContentInfo> {
        (**self).load(nid)
    }

    fn load_many(&self, nids: &[NodeId]) -> HashMap<NodeId, ContentInfo> {
        (**self).load_many(nids)
    }
}

/// Per-viewer access decision.
pub trait AccessPolicy {
    fn can_view(&self, nid: NodeId) -> bool;
}

impl<F> AccessPolicy for F
where
    F: Fn(NodeId) -> bool,
{
    fn can_view(&self, nid: NodeId) -> bool {
        self(nid)
    }
}

/// Policy granting view access to every node.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_view(&self, _nid: NodeId) -> bool {
        true
    }
}

/// In-memory content store.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    items: HashMap<NodeId, ContentInfo>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces one item.
    pub fn insert(&mut self, nid: NodeId, info: ContentInfo) {
        self.items.insert(nid, info);
    }
}

impl ContentStore for MemoryContentStore {
    fn load(&self, nid: NodeId) -> Option<ContentInfo> {
        self.items.get(&nid).cloned()
    }
}

impl FromIterator<(NodeId, ContentInfo)> for MemoryContentStore {
    fn from_iter<I: IntoIterator<Item = (NodeId, ContentInfo)>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
