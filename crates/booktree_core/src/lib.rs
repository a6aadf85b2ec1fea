//! Core domain logic for book outlines.
//! Pages are kept in a materialized-path tree of at most nine levels.

pub mod cache;
pub mod content;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod settings;

pub use cache::tree_cache::{TreeCache, TreeCacheError};
pub use cache::{CacheBackend, MemoryCacheBackend};
pub use content::{AccessPolicy, AllowAll, ContentInfo, ContentStore, MemoryContentStore};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::book_link::{BookLink, LinkValidationError, NodeId, MAX_DEPTH, ROOT_PARENT};
pub use model::tree::{
    BookSummary, BookTarget, BookTreeItem, ItemState, OutlineItem, OutlineRequest, TocEntry,
};
pub use repo::book_repo::{
    BookRepoError, BookRepoResult, BookRepository, SqliteBookRepository, TreeQuery,
};
pub use service::outline_service::{BookManager, OutlineError, OutlineResult};
pub use service::outline_view::{outline_items, truncate_title};
pub use settings::{OutlineSettings, SettingsError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, MAX_DEPTH};

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn outline_is_nine_levels_deep() {
        assert_eq!(MAX_DEPTH, 9);
    }
}
