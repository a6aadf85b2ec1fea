//! Tree assembly from depth-first ordered book rows.
//!
//! # Responsibility
//! - Turn a flat `p1..p9`-ordered row list into nested `BookTreeItem`s.
//! - Flatten, prune and sort built trees for delivery.
//!
//! # Invariants
//! - Builders never mutate their input; every call returns a fresh tree.
//! - Input sibling order is preserved until `sort_siblings` runs.
//! - Each input row appears at most once in the output.

use crate::model::book_link::{BookLink, NodeId};
use crate::model::tree::BookTreeItem;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Builds a nested tree from rows in depth-first pre-order.
///
/// Rows shallower than `min_depth` are dropped together with the rows
/// below them. `in_active_trail` is set for every id in `active_trail`.
pub fn build_outline(
    links: &[BookLink],
    active_trail: &HashSet<NodeId>,
    min_depth: u32,
) -> Vec<BookTreeItem> {
    let mut visible = Vec::with_capacity(links.len());
    let mut skip_below: Option<u32> = None;
    for link in links {
        if let Some(depth) = skip_below {
            if link.depth > depth {
                continue;
            }
            skip_below = None;
        }
        if link.depth < min_depth {
            skip_below = Some(link.depth);
            continue;
        }
        visible.push(link);
    }

    let Some(first) = visible.first() else {
        return Vec::new();
    };
    let mut cursor = 0;
    let mut tree = Vec::new();
    // Rows shallower than the first one open a new top-level run.
    let mut level_depth = first.depth;
    while cursor < visible.len() {
        tree.extend(build_level(&visible, &mut cursor, active_trail, level_depth));
        if let Some(next) = visible.get(cursor) {
            level_depth = next.depth;
        }
    }
    tree
}

fn build_level(
    links: &[&BookLink],
    cursor: &mut usize,
    active_trail: &HashSet<NodeId>,
    level_depth: u32,
) -> Vec<BookTreeItem> {
    let mut level = Vec::new();
    while let Some(link) = links.get(*cursor).copied() {
        if link.depth < level_depth {
            break;
        }
        *cursor += 1;

        let mut item = BookTreeItem::new(link.clone(), active_trail.contains(&link.nid));
        // Everything deeper that follows in pre-order belongs to this item.
        while let Some(next) = links.get(*cursor) {
            if next.depth <= link.depth {
                break;
            }
            let child_depth = next.depth;
            item.below.extend(build_level(links, cursor, active_trail, child_depth));
        }
        level.push(item);
    }
    level
}

/// Flattens a tree back to rows in pre-order.
pub fn flatten_outline(tree: &[BookTreeItem]) -> Vec<BookLink> {
    let mut flat = Vec::new();
    collect_links(tree, &mut flat);
    flat
}

fn collect_links(tree: &[BookTreeItem], flat: &mut Vec<BookLink>) {
    for item in tree {
        flat.push(item.link.clone());
        collect_links(&item.below, flat);
    }
}

/// Every node id in the tree, pre-order.
pub fn collect_nids(tree: &[BookTreeItem]) -> Vec<NodeId> {
    let mut nids = Vec::new();
    let mut stack: Vec<&BookTreeItem> = tree.iter().rev().collect();
    while let Some(item) = stack.pop() {
        nids.push(item.link.nid);
        stack.extend(item.below.iter().rev());
    }
    nids
}

/// Keeps only items present in `titles` and attaches their titles.
///
/// A pruned item takes its whole subtree with it.
pub fn prune_to_visible(
    tree: Vec<BookTreeItem>,
    titles: &HashMap<NodeId, String>,
) -> Vec<BookTreeItem> {
    tree.into_iter()
        .filter_map(|mut item| {
            let title = titles.get(&item.link.nid)?;
            item.title = Some(title.clone());
            item.below = prune_to_visible(std::mem::take(&mut item.below), titles);
            Some(item)
        })
        .collect()
}

/// Sorts siblings at every level by weight, then title, then id.
pub fn sort_siblings(tree: &mut [BookTreeItem]) {
    tree.sort_by_cached_key(|item| {
        (
            item.link.weight,
            normalize_title(item.title.as_deref().unwrap_or_default()),
            item.link.nid,
        )
    });
    for item in tree.iter_mut() {
        sort_siblings(&mut item.below);
    }
}

/// Case- and whitespace-insensitive sort key for titles.
pub fn normalize_title(title: &str) -> String {
    WHITESPACE_RE.replace_all(title.trim(), " ").to_lowercase()
}
