//! Memoization of built book trees on top of a tagged cache backend.
//!
//! # Responsibility
//! - Derive cache keys for whole-book and subtree reads.
//! - Share identical subtree payloads through a content-hash indirection.
//!
//! # Invariants
//! - Every entry is tagged with the `bid` of the book it was built from.
//! - Undecodable entries and dangling subtree pointers read as misses.

use crate::cache::CacheBackend;
use crate::model::book_link::{BookLink, NodeId};
use crate::model::tree::BookTreeItem;
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt::{Display, Formatter, Write};

/// Payload encoding failure while writing a tree to the cache.
#[derive(Debug)]
pub struct TreeCacheError(serde_json::Error);

impl Display for TreeCacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to encode cached book tree: {}", self.0)
    }
}

impl Error for TreeCacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

/// Invalidation tag for every cache entry built from book `bid`.
pub fn book_tag(bid: NodeId) -> String {
    format!("bid:{bid}")
}

/// Tree memoization layer, scoped to one locale.
pub struct TreeCache<K: CacheBackend> {
    backend: K,
    locale: String,
}

impl<K: CacheBackend> TreeCache<K> {
    pub fn new(backend: K, locale: impl Into<String>) -> Self {
        Self {
            backend,
            locale: locale.into(),
        }
    }

    pub fn backend(&self) -> &K {
        &self.backend
    }

    /// Key of a whole-book read, optionally focused on `focus` and depth-limited.
    pub fn all_data_key(&self, bid: NodeId, focus: NodeId, max_depth: Option<u32>) -> String {
        format!(
            "book-links:{bid}:all:{focus}:{}:{}",
            self.locale,
            max_depth.unwrap_or(0)
        )
    }

    /// Key of the pointer entry for the subtree rooted at `nid`.
    pub fn subtree_pointer_key(&self, nid: NodeId) -> String {
        format!("book-links:subtree-cid:{nid}:{}", self.locale)
    }

    pub fn get_tree(&self, key: &str) -> Option<Vec<BookTreeItem>> {
        let Some(bytes) = self.backend.get(key) else {
            debug!("event=tree_cache module=cache status=miss key={key}");
            return None;
        };
        match serde_json::from_slice(&bytes) {
            Ok(tree) => {
                debug!("event=tree_cache module=cache status=hit key={key}");
                Some(tree)
            }
            Err(err) => {
                warn!(
                    "event=tree_cache module=cache status=error error_code=decode_failed key={key} error={err}"
                );
                None
            }
        }
    }

    pub fn put_tree(
        &self,
        key: &str,
        bid: NodeId,
        tree: &[BookTreeItem],
    ) -> Result<(), TreeCacheError> {
        let bytes = serde_json::to_vec(tree).map_err(TreeCacheError)?;
        self.backend.set(key, bytes, &[book_tag(bid)]);
        Ok(())
    }

    /// Reads the subtree of `nid` through its pointer entry.
    pub fn get_subtree(&self, nid: NodeId) -> Option<Vec<BookTreeItem>> {
        let pointer_key = self.subtree_pointer_key(nid);
        let pointer = self.backend.get(&pointer_key)?;
        let Ok(payload_key) = String::from_utf8(pointer) else {
            warn!(
                "event=tree_cache module=cache status=error error_code=bad_pointer key={pointer_key}"
            );
            return None;
        };
        self.get_tree(&payload_key)
    }

    /// Stores the subtree of `link`, sharing the payload with identical subtrees.
    pub fn put_subtree(
        &self,
        link: &BookLink,
        tree: &[BookTreeItem],
    ) -> Result<(), TreeCacheError> {
        let bytes = serde_json::to_vec(tree).map_err(TreeCacheError)?;
        let payload_key = format!("book-links:subtree-data:{}", sha256_hex(&bytes));
        let tags = [book_tag(link.bid)];

        if self.backend.get(&payload_key).is_none() {
            self.backend.set(&payload_key, bytes, &tags);
        }
        self.backend.set(
            &self.subtree_pointer_key(link.nid),
            payload_key.into_bytes(),
            &tags,
        );
        Ok(())
    }

    /// Drops every entry built from any of `bids`.
    pub fn invalidate_books(&self, bids: impl IntoIterator<Item = NodeId>) {
        for bid in bids {
            self.backend.invalidate_by_tag(&book_tag(bid));
            debug!("event=tree_cache module=cache status=invalidated bid={bid}");
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
