//! Book outline manager: structural mutations and tree reads.
//!
//! # Responsibility
//! - Place, move and remove pages while keeping `p1..p9`, `depth`, `bid`
//!   and `has_children` consistent for the page and its whole subtree.
//! - Deliver cached, access-checked trees, flat trails and tables of contents.
//!
//! # Invariants
//! - Every mutation is validated before its first write and runs in one
//!   repository transaction.
//! - Descendants of a moved page are read under the old prefix before any
//!   row is rewritten.
//! - Cache entries of every touched book are invalidated after commit.
//! - Read paths never fail on missing or hidden pages; they shrink the tree.

use crate::cache::tree_cache::{TreeCache, TreeCacheError};
use crate::cache::CacheBackend;
use crate::content::{AccessPolicy, ContentStore};
use crate::model::book_link::{
    book_parents, shift_parents, BookLink, LinkValidationError, NodeId, MAX_DEPTH, ROOT_PARENT,
};
use crate::model::tree::{BookSummary, BookTarget, BookTreeItem, OutlineRequest, TocEntry};
use crate::repo::book_repo::{BookRepoError, BookRepository, TreeQuery};
use crate::service::outline_view;
use crate::service::tree_builder::{
    build_outline, collect_nids, flatten_outline, normalize_title, prune_to_visible,
    sort_siblings,
};
use crate::settings::{OutlineSettings, SettingsError};
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Errors from outline manager operations.
#[derive(Debug)]
pub enum OutlineError {
    /// The page (or its deepest descendant) would end up below `MAX_DEPTH`.
    DepthExceeded { nid: NodeId, depth: usize },
    /// Referenced page has no outline row.
    NodeNotFound(NodeId),
    /// Target parent is the page itself or one of its descendants.
    InvalidMove { nid: NodeId, parent: NodeId },
    /// Page already has an outline row.
    AlreadyInBook(NodeId),
    /// Link fields violate a row invariant.
    InvalidLink(LinkValidationError),
    /// Persistence backend failure.
    StoreUnavailable(BookRepoError),
    /// Built tree could not be written to the cache.
    Cache(TreeCacheError),
}

impl Display for OutlineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DepthExceeded { nid, depth } => write!(
                f,
                "placing page {nid} would reach depth {depth}, maximum is {MAX_DEPTH}"
            ),
            Self::NodeNotFound(nid) => write!(f, "page not in any book: {nid}"),
            Self::InvalidMove { nid, parent } => {
                write!(f, "cannot move page {nid} under its own descendant {parent}")
            }
            Self::AlreadyInBook(nid) => write!(f, "page already in a book: {nid}"),
            Self::InvalidLink(err) => write!(f, "{err}"),
            Self::StoreUnavailable(err) => write!(f, "book store unavailable: {err}"),
            Self::Cache(err) => write!(f, "{err}"),
        }
    }
}

impl Error for OutlineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidLink(err) => Some(err),
            Self::StoreUnavailable(err) => Some(err),
            Self::Cache(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BookRepoError> for OutlineError {
    fn from(value: BookRepoError) -> Self {
        match value {
            BookRepoError::NodeNotFound(nid) => Self::NodeNotFound(nid),
            other => Self::StoreUnavailable(other),
        }
    }
}

impl From<LinkValidationError> for OutlineError {
    fn from(value: LinkValidationError) -> Self {
        match value {
            LinkValidationError::DepthExceeded { nid, depth } => {
                Self::DepthExceeded { nid, depth }
            }
            other => Self::InvalidLink(other),
        }
    }
}

impl From<TreeCacheError> for OutlineError {
    fn from(value: TreeCacheError) -> Self {
        Self::Cache(value)
    }
}

pub type OutlineResult<T> = Result<T, OutlineError>;

/// Outline manager over a book repository, a content store and a cache.
pub struct BookManager<R: BookRepository, C: ContentStore, K: CacheBackend> {
    repo: R,
    content: C,
    cache: TreeCache<K>,
    settings: OutlineSettings,
}

impl<R: BookRepository, C: ContentStore, K: CacheBackend> BookManager<R, C, K> {
    /// # Errors
    /// - `SettingsError` when `settings` fail validation.
    pub fn new(
        repo: R,
        content: C,
        cache_backend: K,
        settings: OutlineSettings,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;
        let cache = TreeCache::new(cache_backend, settings.locale.clone());
        Ok(Self {
            repo,
            content,
            cache,
            settings,
        })
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn cache(&self) -> &TreeCache<K> {
        &self.cache
    }

    pub fn settings(&self) -> &OutlineSettings {
        &self.settings
    }

    /// Starts a new book whose top-level page is `nid`.
    pub fn add_root(&self, nid: NodeId, weight: i32) -> OutlineResult<BookLink> {
        let started_at = Instant::now();
        let link = BookLink::root(nid, weight);
        let result = self.repo.transaction(|repo| -> OutlineResult<()> {
            link.validate()?;
            ensure_not_in_book(repo, nid)?;
            repo.insert_link(&link)?;
            Ok(())
        });
        log_mutation("outline_save", nid, started_at, &result);
        result?;

        self.cache.invalidate_books([link.bid]);
        Ok(link)
    }

    /// Places `nid` directly under `pid`, inside `pid`'s book.
    pub fn add_child(&self, nid: NodeId, pid: NodeId, weight: i32) -> OutlineResult<BookLink> {
        let started_at = Instant::now();
        let result = self.repo.transaction(|repo| -> OutlineResult<BookLink> {
            ensure_not_in_book(repo, nid)?;
            let parent = repo.get_link(pid)?.ok_or(OutlineError::NodeNotFound(pid))?;
            let link = BookLink::child_of(nid, &parent, weight)?;
            link.validate()?;
            repo.insert_link(&link)?;
            repo.set_has_children(parent.nid, true)?;
            Ok(link)
        });
        log_mutation("outline_save", nid, started_at, &result);

        let link = result?;
        self.cache.invalidate_books([link.bid]);
        Ok(link)
    }

    /// Moves `nid` and its subtree under `new_pid` (`ROOT_PARENT` re-roots it).
    ///
    /// The new parent's book always wins. `weight` of `None` keeps the
    /// current weight.
    pub fn move_link(
        &self,
        nid: NodeId,
        new_pid: NodeId,
        weight: Option<i32>,
    ) -> OutlineResult<BookLink> {
        let started_at = Instant::now();
        let result = self.repo.transaction(|repo| -> OutlineResult<(BookLink, Vec<NodeId>)> {
            let original = repo.get_link(nid)?.ok_or(OutlineError::NodeNotFound(nid))?;
            move_in_tx(repo, &original, new_pid, weight)
        });
        log_mutation("outline_move", nid, started_at, &result);

        let (moved, touched) = result?;
        self.cache.invalidate_books(touched);
        Ok(moved)
    }

    /// Applies an outline form submission for one page.
    ///
    /// Returns `None` when the page is not meant to be in a book.
    pub fn update_outline(&self, request: &OutlineRequest) -> OutlineResult<Option<BookLink>> {
        let bid = match request.book {
            BookTarget::None => return Ok(None),
            BookTarget::New => request.nid,
            BookTarget::Existing(bid) => bid,
        };
        let pid = if bid == request.nid {
            ROOT_PARENT
        } else {
            request.pid.filter(|pid| *pid > 0).unwrap_or(bid)
        };

        let saved = match self.repo.get_link(request.nid)? {
            Some(_) => self.move_link(request.nid, pid, Some(request.weight))?,
            None if pid == ROOT_PARENT => self.add_root(request.nid, request.weight)?,
            None => self.add_child(request.nid, pid, request.weight)?,
        };
        Ok(Some(saved))
    }

    /// Removes `nid` from its book.
    ///
    /// Direct children of a removed top-level page become top-level pages of
    /// their own books; children of any other page are left in place.
    pub fn delete_from_book(&self, nid: NodeId) -> OutlineResult<()> {
        let started_at = Instant::now();
        let result = self.repo.transaction(|repo| -> OutlineResult<Vec<NodeId>> {
            let original = repo.get_link(nid)?.ok_or(OutlineError::NodeNotFound(nid))?;
            let orphans = if original.is_book_root() {
                repo.query_tree(&TreeQuery::book(original.bid).children_of(nid))?
            } else {
                Vec::new()
            };

            repo.delete_link(nid)?;
            let mut touched = vec![original.bid];
            for child in &orphans {
                let (_, child_books) = move_in_tx(repo, child, ROOT_PARENT, None)?;
                touched.extend(child_books);
            }
            update_original_parent(repo, &original)?;
            Ok(touched)
        });
        log_mutation("outline_delete", nid, started_at, &result);

        self.cache.invalidate_books(result?);
        Ok(())
    }

    pub fn load_link(&self, nid: NodeId) -> OutlineResult<Option<BookLink>> {
        Ok(self.repo.get_link(nid)?)
    }

    pub fn load_links(&self, nids: &[NodeId]) -> OutlineResult<HashMap<NodeId, BookLink>> {
        Ok(self.repo.get_links(nids)?)
    }

    /// Books whose top-level page is published and visible to `viewer`.
    pub fn all_books(&self, viewer: &impl AccessPolicy) -> OutlineResult<Vec<BookSummary>> {
        let bids = self.repo.list_book_ids()?;
        let links = self.repo.get_links(&bids)?;
        let content = self.content.load_many(&bids);

        let mut books: Vec<BookSummary> = bids
            .into_iter()
            .filter_map(|bid| {
                let link = links.get(&bid)?;
                let info = content.get(&bid)?;
                (info.is_published && viewer.can_view(bid)).then(|| BookSummary {
                    bid,
                    title: info.title.clone(),
                    link: link.clone(),
                })
            })
            .collect();
        books.sort_by_cached_key(|book| (book.link.weight, normalize_title(&book.title), book.bid));
        Ok(books)
    }

    /// Whole-book tree, optionally expanded only along `focus`'s trail.
    ///
    /// A `focus` without an outline row yields an empty tree.
    pub fn book_tree_all_data(
        &self,
        bid: NodeId,
        focus: Option<NodeId>,
        max_depth: Option<u32>,
        viewer: &impl AccessPolicy,
    ) -> OutlineResult<Vec<BookTreeItem>> {
        let focus_link = match focus {
            Some(nid) => match self.repo.get_link(nid)? {
                Some(link) => Some(link),
                None => return Ok(Vec::new()),
            },
            None => None,
        };
        let tree = self.cached_book_tree(bid, focus_link.as_ref(), max_depth)?;
        Ok(self.check_access(tree, viewer))
    }

    /// Parent ids whose children are shown around `link`.
    pub fn active_trail_ids(&self, link: &BookLink) -> Vec<NodeId> {
        link.active_trail_ids()
    }

    /// Pages around `nid` (its trail plus one level below it), pre-order.
    pub fn book_tree_flat(
        &self,
        nid: NodeId,
        viewer: &impl AccessPolicy,
    ) -> OutlineResult<Vec<BookLink>> {
        let Some(link) = self.repo.get_link(nid)? else {
            return Ok(Vec::new());
        };
        let tree = self.cached_book_tree(link.bid, Some(&link), Some(link.depth + 1))?;
        Ok(flatten_outline(&self.check_access(tree, viewer)))
    }

    /// Tree rooted at `nid` with every descendant.
    pub fn book_subtree_data(
        &self,
        nid: NodeId,
        viewer: &impl AccessPolicy,
    ) -> OutlineResult<Vec<BookTreeItem>> {
        let Some(link) = self.repo.get_link(nid)? else {
            return Ok(Vec::new());
        };

        let tree = match self.cache.get_subtree(nid) {
            Some(tree) => tree,
            None => {
                let links = self
                    .repo
                    .query_tree(&TreeQuery::book(link.bid).within(&link))?;
                let tree = build_outline(&links, &HashSet::new(), link.depth);
                self.cache.put_subtree(&link, &tree)?;
                tree
            }
        };
        Ok(self.check_access(tree, viewer))
    }

    /// Indented table of contents of book `bid`.
    pub fn table_of_contents(
        &self,
        bid: NodeId,
        depth_limit: u32,
        exclude: &[NodeId],
        viewer: &impl AccessPolicy,
    ) -> OutlineResult<Vec<TocEntry>> {
        let tree = self.book_tree_all_data(bid, None, None, viewer)?;
        Ok(outline_view::table_of_contents(
            &tree,
            depth_limit,
            exclude,
            self.settings.toc_title_max_chars,
        ))
    }

    /// Deepest depth a new parent of `link` may have.
    pub fn parent_depth_limit(&self, link: &BookLink) -> OutlineResult<u32> {
        let relative = if link.has_children {
            self.repo
                .max_depth_in_subtree(link)?
                .saturating_sub(link.depth)
        } else {
            0
        };
        Ok((MAX_DEPTH as u32 - 1).saturating_sub(relative))
    }

    /// Whether `link` may be removed from its book through the outline form.
    pub fn is_removable(&self, link: &BookLink) -> bool {
        !link.is_book_root() || !link.has_children
    }

    fn cached_book_tree(
        &self,
        bid: NodeId,
        focus: Option<&BookLink>,
        max_depth: Option<u32>,
    ) -> OutlineResult<Vec<BookTreeItem>> {
        let key = self
            .cache
            .all_data_key(bid, focus.map_or(0, |link| link.nid), max_depth);
        if let Some(tree) = self.cache.get_tree(&key) {
            return Ok(tree);
        }

        let mut query = TreeQuery::book(bid).max_depth(max_depth);
        let mut active_trail = HashSet::new();
        if let Some(focus) = focus {
            let trail = focus.active_trail_ids();
            active_trail.extend(trail.iter().copied());
            active_trail.insert(focus.nid);
            query = query.expanded(trail);
        }

        let links = self.repo.query_tree(&query)?;
        let tree = build_outline(&links, &active_trail, 1);
        self.cache.put_tree(&key, bid, &tree)?;
        Ok(tree)
    }

    fn check_access(
        &self,
        tree: Vec<BookTreeItem>,
        viewer: &impl AccessPolicy,
    ) -> Vec<BookTreeItem> {
        let nids = collect_nids(&tree);
        let titles: HashMap<NodeId, String> = self
            .content
            .load_many(&nids)
            .into_iter()
            .filter(|(nid, info)| info.is_published && viewer.can_view(*nid))
            .map(|(nid, info)| (nid, info.title))
            .collect();

        let mut visible = prune_to_visible(tree, &titles);
        sort_siblings(&mut visible);
        visible
    }
}

fn ensure_not_in_book<R: BookRepository>(repo: &R, nid: NodeId) -> OutlineResult<()> {
    if repo.get_link(nid)?.is_some() {
        return Err(OutlineError::AlreadyInBook(nid));
    }
    Ok(())
}

/// Moves `original` and its subtree; must run inside a repository transaction.
///
/// Returns the saved link and the ids of every book it touched.
fn move_in_tx<R: BookRepository>(
    repo: &R,
    original: &BookLink,
    new_pid: NodeId,
    weight: Option<i32>,
) -> OutlineResult<(BookLink, Vec<NodeId>)> {
    let nid = original.nid;
    let weight = weight.unwrap_or(original.weight);

    if new_pid == original.pid {
        let mut saved = original.clone();
        if saved.weight != weight {
            saved.weight = weight;
            repo.update_link(&saved)?;
        }
        return Ok((saved, vec![original.bid]));
    }

    let parent = match new_pid {
        ROOT_PARENT => None,
        pid => {
            let parent = repo.get_link(pid)?.ok_or(OutlineError::NodeNotFound(pid))?;
            if parent.contains_ancestor(nid) {
                return Err(OutlineError::InvalidMove { nid, parent: pid });
            }
            Some(parent)
        }
    };

    let (depth, parents) = book_parents(nid, parent.as_ref())?;
    let height = repo
        .max_depth_in_subtree(original)?
        .saturating_sub(original.depth);
    let deepest = depth as usize + height as usize;
    if deepest > MAX_DEPTH {
        return Err(OutlineError::DepthExceeded {
            nid,
            depth: deepest,
        });
    }

    // Read the whole subtree under the old prefix before rewriting anything.
    let descendants: Vec<BookLink> = repo
        .query_tree(&TreeQuery::book(original.bid).within(original))?
        .into_iter()
        .filter(|link| link.nid != nid)
        .collect();

    let moved = BookLink {
        nid,
        bid: parent.as_ref().map_or(nid, |parent| parent.bid),
        pid: new_pid,
        has_children: original.has_children,
        weight,
        depth,
        parents,
    };
    moved.validate()?;
    repo.update_link(&moved)?;

    let shift = i64::from(moved.depth) - i64::from(original.depth);
    for descendant in descendants {
        let depth = u32::try_from(i64::from(descendant.depth) + shift).map_err(|_| {
            OutlineError::DepthExceeded {
                nid: descendant.nid,
                depth: 0,
            }
        })?;
        let parents = shift_parents(moved.ancestor_prefix(), original.depth, &descendant.parents);
        let shifted = BookLink {
            bid: moved.bid,
            depth,
            parents,
            ..descendant
        };
        repo.update_link(&shifted)?;
    }

    update_original_parent(repo, original)?;
    if new_pid != ROOT_PARENT {
        repo.set_has_children(new_pid, true)?;
    }

    let mut touched = vec![original.bid];
    if moved.bid != original.bid {
        touched.push(moved.bid);
    }
    Ok((moved, touched))
}

/// Recomputes `has_children` of the parent `original` is leaving.
fn update_original_parent<R: BookRepository>(repo: &R, original: &BookLink) -> OutlineResult<()> {
    if original.pid == ROOT_PARENT {
        return Ok(());
    }
    let remaining = repo.count_children(original.bid, original.pid, Some(original.nid))?;
    repo.set_has_children(original.pid, remaining > 0)?;
    Ok(())
}

fn log_mutation<T>(
    event: &'static str,
    nid: NodeId,
    started_at: Instant,
    result: &OutlineResult<T>,
) {
    match result {
        Ok(_) => info!(
            "event={event} module=outline status=ok nid={nid} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(OutlineError::StoreUnavailable(err)) => error!(
            "event={event} module=outline status=error nid={nid} duration_ms={} error_code=store_unavailable error={err}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event={event} module=outline status=rejected nid={nid} duration_ms={} error={err}",
            started_at.elapsed().as_millis()
        ),
    }
}
