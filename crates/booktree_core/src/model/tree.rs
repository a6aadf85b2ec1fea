//! Derived tree views over book links.
//!
//! # Invariants
//! - `below` preserves the depth-first order of the rows it was built from
//!   until a consumer explicitly sorts it.
//! - `title` is only filled after content lookup for a specific viewer.

use crate::model::book_link::{BookLink, NodeId};
use serde::{Deserialize, Serialize};

/// One node of a built book tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookTreeItem {
    pub link: BookLink,
    /// Display title, attached by the access check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Whether this node lies on the path from the focused page to the root.
    pub in_active_trail: bool,
    pub below: Vec<BookTreeItem>,
}

impl BookTreeItem {
    pub fn new(link: BookLink, in_active_trail: bool) -> Self {
        Self {
            link,
            title: None,
            in_active_trail,
            below: Vec::new(),
        }
    }
}

/// A readable book exposed to callers listing books.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSummary {
    pub bid: NodeId,
    pub title: String,
    pub link: BookLink,
}

/// One line of a book's table of contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub nid: NodeId,
    /// Indented, truncated label such as `-- Chapter one`.
    pub label: String,
}

/// Expansion state of a rendered outline item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Has children and they are part of the delivered tree.
    Expanded,
    /// Has children that were not loaded for this view.
    Collapsed,
    /// Has no children.
    Leaf,
}

/// Presentation model of one visible tree item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineItem {
    pub nid: NodeId,
    pub bid: NodeId,
    pub title: String,
    pub first: bool,
    pub last: bool,
    pub state: ItemState,
    pub active_trail: bool,
    pub below: Vec<OutlineItem>,
}

/// Target book of an outline save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookTarget {
    /// The page is not part of any book.
    None,
    /// The page becomes the top-level page of a new book.
    New,
    /// The page belongs to the book with this id.
    Existing(NodeId),
}

/// Outline fields submitted for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineRequest {
    pub nid: NodeId,
    pub book: BookTarget,
    /// Requested parent; `None` defaults to the book's top-level page.
    pub pid: Option<NodeId>,
    pub weight: i32,
}
