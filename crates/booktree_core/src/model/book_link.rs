//! Materialized-path book link model.
//!
//! # Responsibility
//! - Represent one node's position in a book (`bid`, `pid`, `depth`, `p1..p9`).
//! - Compute ancestor chains for placement under a parent and for subtree shifts.
//!
//! # Invariants
//! - `1 <= depth <= MAX_DEPTH`.
//! - `parents[depth - 1] == nid` and every slot past `depth` is `0`.
//! - A root has `bid == nid`, `pid == 0` and `depth == 1`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Identifier of a content item placed in a book.
pub type NodeId = i64;

/// Maximum supported depth of a book tree (`p1..p9`).
pub const MAX_DEPTH: usize = 9;

/// Parent id stored on book roots.
pub const ROOT_PARENT: NodeId = 0;

/// Fixed-width ancestor chain, `p1` at index 0.
pub type ParentChain = [NodeId; MAX_DEPTH];

/// Invariant violations detected on a book link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkValidationError {
    /// Node id must be positive.
    InvalidNodeId(NodeId),
    /// Placement would exceed `MAX_DEPTH`.
    DepthExceeded { nid: NodeId, depth: usize },
    /// Depth is zero or larger than `MAX_DEPTH`.
    DepthOutOfRange { nid: NodeId, depth: u32 },
    /// `p{depth}` does not hold the node id.
    ChainTailMismatch { nid: NodeId, found: NodeId },
    /// A slot past `depth` is non-zero.
    ChainNotPadded { nid: NodeId, slot: usize },
    /// Root shape (`bid == nid`, `pid == 0`, `depth == 1`) is inconsistent.
    InconsistentRoot { nid: NodeId },
}

impl Display for LinkValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNodeId(nid) => write!(f, "book link id must be positive, got {nid}"),
            Self::DepthExceeded { nid, depth } => write!(
                f,
                "book link {nid} would be placed at depth {depth}, maximum is {MAX_DEPTH}"
            ),
            Self::DepthOutOfRange { nid, depth } => {
                write!(f, "book link {nid} has out of range depth {depth}")
            }
            Self::ChainTailMismatch { nid, found } => {
                write!(f, "book link {nid} has p(depth) = {found}")
            }
            Self::ChainNotPadded { nid, slot } => {
                write!(f, "book link {nid} has non-zero p{slot} past its depth")
            }
            Self::InconsistentRoot { nid } => {
                write!(f, "book link {nid} has an inconsistent root shape")
            }
        }
    }
}

impl Error for LinkValidationError {}

/// One persisted row of the book outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLink {
    /// Content id of this page.
    pub nid: NodeId,
    /// Book id; equals `nid` for the book's top-level page.
    pub bid: NodeId,
    /// Parent page id, `ROOT_PARENT` for top-level pages.
    pub pid: NodeId,
    /// Whether at least one row uses this page as `pid`.
    pub has_children: bool,
    /// Sibling ordering key; lower sorts first.
    pub weight: i32,
    /// Depth in the book, `1` for the top-level page.
    pub depth: u32,
    /// Ancestor chain `p1..p9`.
    pub parents: ParentChain,
}

impl BookLink {
    /// Builds the row of a new book whose top-level page is `nid`.
    pub fn root(nid: NodeId, weight: i32) -> Self {
        let mut parents = [0; MAX_DEPTH];
        parents[0] = nid;
        Self {
            nid,
            bid: nid,
            pid: ROOT_PARENT,
            has_children: false,
            weight,
            depth: 1,
            parents,
        }
    }

    /// Builds the row of `nid` placed directly under `parent`.
    ///
    /// # Errors
    /// - `DepthExceeded` when the parent already sits at `MAX_DEPTH`.
    pub fn child_of(
        nid: NodeId,
        parent: &BookLink,
        weight: i32,
    ) -> Result<Self, LinkValidationError> {
        let (depth, parents) = book_parents(nid, Some(parent))?;
        Ok(Self {
            nid,
            bid: parent.bid,
            pid: parent.nid,
            has_children: false,
            weight,
            depth,
            parents,
        })
    }

    /// Returns `p{index}` (1-based); out of range indexes read as `0`.
    pub fn p(&self, index: usize) -> NodeId {
        if index == 0 || index > MAX_DEPTH {
            return 0;
        }
        self.parents[index - 1]
    }

    /// Non-zero part of the ancestor chain, root first, ending with `nid`.
    pub fn ancestor_prefix(&self) -> &[NodeId] {
        let depth = (self.depth as usize).min(MAX_DEPTH);
        &self.parents[..depth]
    }

    /// Whether this row is the top-level page of its book.
    pub fn is_book_root(&self) -> bool {
        self.nid == self.bid
    }

    /// Whether `nid` appears in this link's chain (including itself).
    pub fn contains_ancestor(&self, nid: NodeId) -> bool {
        self.ancestor_prefix().contains(&nid)
    }

    /// Parent ids whose children must be loaded to show this link in context.
    ///
    /// Always starts with `ROOT_PARENT`, then the non-zero `p1..p8`.
    pub fn active_trail_ids(&self) -> Vec<NodeId> {
        let mut trail = vec![ROOT_PARENT];
        trail.extend(
            self.parents[..MAX_DEPTH - 1]
                .iter()
                .copied()
                .filter(|value| *value != 0),
        );
        trail
    }

    /// Checks every row invariant.
    pub fn validate(&self) -> Result<(), LinkValidationError> {
        if self.nid <= 0 {
            return Err(LinkValidationError::InvalidNodeId(self.nid));
        }
        let depth = self.depth as usize;
        if depth == 0 || depth > MAX_DEPTH {
            return Err(LinkValidationError::DepthOutOfRange {
                nid: self.nid,
                depth: self.depth,
            });
        }
        if self.parents[depth - 1] != self.nid {
            return Err(LinkValidationError::ChainTailMismatch {
                nid: self.nid,
                found: self.parents[depth - 1],
            });
        }
        if let Some(offset) = self.parents[depth..].iter().position(|value| *value != 0) {
            return Err(LinkValidationError::ChainNotPadded {
                nid: self.nid,
                slot: depth + offset + 1,
            });
        }
        let root_shaped = self.pid == ROOT_PARENT;
        if root_shaped != (depth == 1) || (root_shaped && self.bid != self.nid) {
            return Err(LinkValidationError::InconsistentRoot { nid: self.nid });
        }
        if !root_shaped && self.bid != self.parents[0] {
            return Err(LinkValidationError::InconsistentRoot { nid: self.nid });
        }
        Ok(())
    }
}

/// Computes depth and `p1..p9` for `nid` placed under `parent` (or as a root).
///
/// # Errors
/// - `DepthExceeded` when `parent.depth + 1 > MAX_DEPTH`.
pub fn book_parents(
    nid: NodeId,
    parent: Option<&BookLink>,
) -> Result<(u32, ParentChain), LinkValidationError> {
    let mut parents = [0; MAX_DEPTH];
    let Some(parent) = parent else {
        parents[0] = nid;
        return Ok((1, parents));
    };

    let depth = parent.depth as usize + 1;
    if depth > MAX_DEPTH {
        return Err(LinkValidationError::DepthExceeded { nid, depth });
    }
    parents[..depth - 1].copy_from_slice(parent.ancestor_prefix());
    parents[depth - 1] = nid;
    Ok((depth as u32, parents))
}

/// Rewrites a descendant's chain after its ancestor moved.
///
/// `moved_prefix` is the moved link's new chain (ending with its id) and
/// `old_depth` its depth before the move. The descendant keeps its suffix
/// below the moved link; slots shifted past `MAX_DEPTH` are dropped.
pub fn shift_parents(
    moved_prefix: &[NodeId],
    old_depth: u32,
    descendant: &ParentChain,
) -> ParentChain {
    let mut shifted = [0; MAX_DEPTH];
    let keep = moved_prefix.len().min(MAX_DEPTH);
    shifted[..keep].copy_from_slice(&moved_prefix[..keep]);

    let suffix = &descendant[(old_depth as usize).min(MAX_DEPTH)..];
    for (slot, value) in shifted[keep..].iter_mut().zip(suffix) {
        *slot = *value;
    }
    shifted
}

#[cfg(test)]
mod tests {
    use super::{book_parents, shift_parents, BookLink, LinkValidationError, MAX_DEPTH};

    fn chain(values: &[i64]) -> [i64; MAX_DEPTH] {
        let mut parents = [0; MAX_DEPTH];
        parents[..values.len()].copy_from_slice(values);
        parents
    }

    #[test]
    fn root_link_satisfies_invariants() {
        let root = BookLink::root(7, 0);
        assert_eq!(root.parents, chain(&[7]));
        assert!(root.is_book_root());
        root.validate().unwrap();
    }

    #[test]
    fn child_of_copies_parent_prefix() {
        let root = BookLink::root(1, 0);
        let child = BookLink::child_of(2, &root, 3).unwrap();
        let grandchild = BookLink::child_of(5, &child, 0).unwrap();

        assert_eq!(grandchild.depth, 3);
        assert_eq!(grandchild.bid, 1);
        assert_eq!(grandchild.pid, 2);
        assert_eq!(grandchild.parents, chain(&[1, 2, 5]));
        grandchild.validate().unwrap();
    }

    #[test]
    fn book_parents_rejects_tenth_level() {
        let mut link = BookLink::root(1, 0);
        for nid in 2..=9 {
            link = BookLink::child_of(nid, &link, 0).unwrap();
        }
        assert_eq!(link.depth, 9);

        let err = book_parents(10, Some(&link)).unwrap_err();
        assert_eq!(err, LinkValidationError::DepthExceeded { nid: 10, depth: 10 });
    }

    #[test]
    fn shift_parents_moves_suffix_deeper() {
        // C at [R, A, C] with A moving from depth 2 to [R, B, A].
        let shifted = shift_parents(&[1, 3, 2], 2, &chain(&[1, 2, 4]));
        assert_eq!(shifted, chain(&[1, 3, 2, 4]));
    }

    #[test]
    fn shift_parents_moves_suffix_shallower() {
        // D at [R, B, A, D] with A becoming a root.
        let shifted = shift_parents(&[2], 3, &chain(&[1, 3, 2, 4]));
        assert_eq!(shifted, chain(&[2, 4]));
    }

    #[test]
    fn shift_parents_truncates_at_max_depth() {
        let deep = chain(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let shifted = shift_parents(&[20, 21, 22], 1, &deep);
        assert_eq!(shifted, chain(&[20, 21, 22, 2, 3, 4, 5, 6, 7]));
    }

    #[test]
    fn active_trail_starts_with_root_parent() {
        let root = BookLink::root(1, 0);
        let child = BookLink::child_of(2, &root, 0).unwrap();
        assert_eq!(child.active_trail_ids(), vec![0, 1, 2]);
    }

    #[test]
    fn validate_flags_unpadded_chain() {
        let mut link = BookLink::root(1, 0);
        link.parents[4] = 9;
        assert_eq!(
            link.validate().unwrap_err(),
            LinkValidationError::ChainNotPadded { nid: 1, slot: 5 }
        );
    }
}
