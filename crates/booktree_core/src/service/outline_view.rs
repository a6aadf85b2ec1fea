//! Presentation projections of delivered book trees.
//!
//! # Responsibility
//! - Produce the indented, truncated table of contents of a book.
//! - Produce per-item display state (first/last, expanded/collapsed/leaf).
//!
//! # Invariants
//! - Inputs are trees already pruned for the viewer; nothing here checks access.

use crate::model::book_link::NodeId;
use crate::model::tree::{BookTreeItem, ItemState, OutlineItem, TocEntry};
use once_cell::sync::Lazy;
use regex::Regex;

static WORD_BOUNDARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\p{P}]").expect("valid word boundary regex"));

const ELLIPSIS: char = '…';
const TOC_INDENT: &str = "--";

/// Table of contents lines for `tree`.
///
/// Levels deeper than `depth_limit` are skipped, and excluded ids drop
/// their subtree. Labels carry one `--` per level below the top.
pub fn table_of_contents(
    tree: &[BookTreeItem],
    depth_limit: u32,
    exclude: &[NodeId],
    max_title_chars: usize,
) -> Vec<TocEntry> {
    let mut toc = Vec::new();
    recurse_table_of_contents(tree, "", &mut toc, exclude, depth_limit, max_title_chars);
    toc
}

fn recurse_table_of_contents(
    tree: &[BookTreeItem],
    indent: &str,
    toc: &mut Vec<TocEntry>,
    exclude: &[NodeId],
    depth_limit: u32,
    max_title_chars: usize,
) {
    if tree.iter().any(|item| item.link.depth > depth_limit) {
        return;
    }

    for item in tree {
        if exclude.contains(&item.link.nid) {
            continue;
        }
        let title = item.title.as_deref().unwrap_or_default();
        toc.push(TocEntry {
            nid: item.link.nid,
            label: format!("{indent} {}", truncate_title(title, max_title_chars)),
        });
        if !item.below.is_empty() {
            let deeper = format!("{indent}{TOC_INDENT}");
            recurse_table_of_contents(
                &item.below,
                &deeper,
                toc,
                exclude,
                depth_limit,
                max_title_chars,
            );
        }
    }
}

/// Shortens `title` to at most `max_chars` characters, ellipsis included.
///
/// Cuts at the last word boundary that fits, falling back to a hard cut
/// when the first word alone is too long.
pub fn truncate_title(title: &str, max_chars: usize) -> String {
    if title.chars().count() <= max_chars {
        return title.to_string();
    }

    let keep = max_chars.saturating_sub(1);
    // One extra char so a boundary right after the cut is still found.
    let window: String = title.chars().take(keep + 1).collect();
    let cut = WORD_BOUNDARY_RE
        .find_iter(&window)
        .map(|found| found.start())
        .filter(|start| *start > 0)
        .last()
        .unwrap_or_else(|| {
            window
                .char_indices()
                .nth(keep)
                .map_or(window.len(), |(offset, _)| offset)
        });

    let mut truncated = window[..cut].trim_end().to_string();
    truncated.push(ELLIPSIS);
    truncated
}

/// Display state of every item in `tree`.
pub fn outline_items(tree: &[BookTreeItem]) -> Vec<OutlineItem> {
    let count = tree.len();
    tree.iter()
        .enumerate()
        .map(|(index, item)| {
            let state = match (item.link.has_children, item.below.is_empty()) {
                (true, false) => ItemState::Expanded,
                (true, true) => ItemState::Collapsed,
                (false, _) => ItemState::Leaf,
            };
            OutlineItem {
                nid: item.link.nid,
                bid: item.link.bid,
                title: item.title.clone().unwrap_or_default(),
                first: index == 0,
                last: index + 1 == count,
                state,
                active_trail: item.in_active_trail,
                below: outline_items(&item.below),
            }
        })
        .collect()
}
