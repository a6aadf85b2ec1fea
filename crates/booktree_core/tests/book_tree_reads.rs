use booktree_core::cache::MemoryCacheBackend;
use booktree_core::content::{AllowAll, ContentInfo, MemoryContentStore};
use booktree_core::db::open_db_in_memory;
use booktree_core::model::book_link::NodeId;
use booktree_core::model::tree::{BookTreeItem, ItemState};
use booktree_core::repo::book_repo::SqliteBookRepository;
use booktree_core::service::outline_service::BookManager;
use booktree_core::service::outline_view::outline_items;
use booktree_core::settings::{OutlineSettings, SettingsError};
use rusqlite::Connection;

type Manager<'conn> =
    BookManager<SqliteBookRepository<'conn>, MemoryContentStore, MemoryCacheBackend>;

const R: NodeId = 1;
const A: NodeId = 2;
const B: NodeId = 3;
const C: NodeId = 4;

fn published_content() -> MemoryContentStore {
    [
        (R, ContentInfo::published("Handbook")),
        (A, ContentInfo::published("Alpha")),
        (B, ContentInfo::published("Beta")),
        (C, ContentInfo::published("Gamma")),
        (5, ContentInfo::published("Delta")),
        (10, ContentInfo::published("Almanac")),
        (11, ContentInfo::published("Index")),
        (12, ContentInfo::published("Jot")),
    ]
    .into_iter()
    .collect()
}

/// R -> [A -> [C], B]
fn sample_manager(conn: &Connection, content: MemoryContentStore) -> Manager<'_> {
    let repo = SqliteBookRepository::try_new(conn).unwrap();
    let manager = BookManager::new(
        repo,
        content,
        MemoryCacheBackend::new(),
        OutlineSettings::default(),
    )
    .unwrap();
    manager.add_root(R, 0).unwrap();
    manager.add_child(A, R, 0).unwrap();
    manager.add_child(B, R, 0).unwrap();
    manager.add_child(C, A, 0).unwrap();
    manager
}

fn shape(tree: &[BookTreeItem]) -> String {
    tree.iter()
        .map(|item| {
            let title = item.title.clone().unwrap_or_default();
            if item.below.is_empty() {
                title
            } else {
                format!("{title}[{}]", shape(&item.below))
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[test]
fn whole_book_tree_nests_titled_pages() {
    let conn = open_db_in_memory().unwrap();
    let manager = sample_manager(&conn, published_content());

    let tree = manager.book_tree_all_data(R, None, None, &AllowAll).unwrap();

    assert_eq!(shape(&tree), "Handbook[Alpha[Gamma],Beta]");
    assert!(tree.iter().all(|item| !item.in_active_trail));
}

#[test]
fn siblings_sort_by_weight_before_title() {
    let conn = open_db_in_memory().unwrap();
    let manager = sample_manager(&conn, published_content());
    manager.move_link(B, R, Some(-1)).unwrap();

    let tree = manager.book_tree_all_data(R, None, None, &AllowAll).unwrap();

    assert_eq!(shape(&tree), "Handbook[Beta,Alpha[Gamma]]");
}

#[test]
fn hidden_or_unpublished_pages_drop_their_subtree() {
    let conn = open_db_in_memory().unwrap();
    let mut content = published_content();
    content.insert(A, ContentInfo::unpublished("Alpha"));
    let manager = sample_manager(&conn, content);

    let tree = manager.book_tree_all_data(R, None, None, &AllowAll).unwrap();
    assert_eq!(shape(&tree), "Handbook[Beta]");

    let deny_beta = |nid: NodeId| nid != B;
    let tree = manager.book_tree_all_data(R, None, None, &deny_beta).unwrap();
    assert_eq!(shape(&tree), "Handbook");
}

#[test]
fn focused_tree_expands_only_the_active_trail() {
    let conn = open_db_in_memory().unwrap();
    let manager = sample_manager(&conn, published_content());
    manager.add_child(5, B, 0).unwrap();

    let tree = manager
        .book_tree_all_data(R, Some(C), None, &AllowAll)
        .unwrap();

    assert_eq!(shape(&tree), "Handbook[Alpha[Gamma],Beta]");
    let root = &tree[0];
    assert!(root.in_active_trail);
    assert!(root.below[0].in_active_trail);
    assert!(root.below[0].below[0].in_active_trail);
    assert!(!root.below[1].in_active_trail);

    let items = outline_items(&tree);
    assert_eq!(items[0].below[1].state, ItemState::Collapsed);
    assert_eq!(items[0].below[0].state, ItemState::Expanded);
}

#[test]
fn missing_focus_or_scope_gives_empty_results() {
    let conn = open_db_in_memory().unwrap();
    let manager = sample_manager(&conn, published_content());

    assert!(manager
        .book_tree_all_data(R, Some(99), None, &AllowAll)
        .unwrap()
        .is_empty());
    assert!(manager.book_tree_flat(99, &AllowAll).unwrap().is_empty());
    assert!(manager.book_subtree_data(99, &AllowAll).unwrap().is_empty());
}

#[test]
fn mutations_invalidate_cached_trees() {
    let conn = open_db_in_memory().unwrap();
    let manager = sample_manager(&conn, published_content());
    let key = manager.cache().all_data_key(R, 0, None);

    manager.book_tree_all_data(R, None, None, &AllowAll).unwrap();
    assert!(manager.cache().backend().contains_key(&key));

    manager.add_child(5, B, 0).unwrap();
    assert!(!manager.cache().backend().contains_key(&key));

    let tree = manager.book_tree_all_data(R, None, None, &AllowAll).unwrap();
    assert_eq!(shape(&tree), "Handbook[Alpha[Gamma],Beta[Delta]]");
}

#[test]
fn cached_tree_is_checked_per_viewer() {
    let conn = open_db_in_memory().unwrap();
    let manager = sample_manager(&conn, published_content());

    let full = manager.book_tree_all_data(R, None, None, &AllowAll).unwrap();
    let deny_alpha = |nid: NodeId| nid != A;
    let partial = manager
        .book_tree_all_data(R, None, None, &deny_alpha)
        .unwrap();

    assert_eq!(shape(&full), "Handbook[Alpha[Gamma],Beta]");
    assert_eq!(shape(&partial), "Handbook[Beta]");
}

#[test]
fn flat_tree_lists_trail_and_next_level_in_order() {
    let conn = open_db_in_memory().unwrap();
    let manager = sample_manager(&conn, published_content());
    manager.add_child(5, C, 0).unwrap();

    let flat = manager.book_tree_flat(A, &AllowAll).unwrap();
    let nids: Vec<NodeId> = flat.iter().map(|link| link.nid).collect();

    assert_eq!(nids, vec![R, A, C, B]);
}

#[test]
fn subtree_is_cached_and_dropped_on_move() {
    let conn = open_db_in_memory().unwrap();
    let manager = sample_manager(&conn, published_content());
    let pointer = manager.cache().subtree_pointer_key(A);

    let subtree = manager.book_subtree_data(A, &AllowAll).unwrap();
    assert_eq!(shape(&subtree), "Alpha[Gamma]");
    assert!(manager.cache().backend().contains_key(&pointer));

    manager.move_link(C, B, None).unwrap();
    assert!(!manager.cache().backend().contains_key(&pointer));
    let subtree = manager.book_subtree_data(A, &AllowAll).unwrap();
    assert_eq!(shape(&subtree), "Alpha");
}

#[test]
fn all_books_lists_visible_book_roots_by_title() {
    let conn = open_db_in_memory().unwrap();
    let manager = sample_manager(&conn, published_content());
    manager.add_root(10, 0).unwrap();
    manager.add_root(20, 0).unwrap();

    let books = manager.all_books(&AllowAll).unwrap();
    let titles: Vec<&str> = books.iter().map(|book| book.title.as_str()).collect();
    assert_eq!(titles, vec!["Almanac", "Handbook"]);

    let deny_almanac = |nid: NodeId| nid != 10;
    let books = manager.all_books(&deny_almanac).unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].bid, R);
}

#[test]
fn table_of_contents_indents_and_truncates() {
    let conn = open_db_in_memory().unwrap();
    let mut content = published_content();
    content.insert(
        B,
        ContentInfo::published("Beta chapter with a rather long heading"),
    );
    let manager = sample_manager(&conn, content);

    let toc = manager.table_of_contents(R, 9, &[], &AllowAll).unwrap();
    let labels: Vec<&str> = toc.iter().map(|entry| entry.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            " Handbook",
            "-- Alpha",
            "---- Gamma",
            "-- Beta chapter with a rather…",
        ]
    );

    let toc = manager.table_of_contents(R, 2, &[A], &AllowAll).unwrap();
    let nids: Vec<NodeId> = toc.iter().map(|entry| entry.nid).collect();
    assert_eq!(nids, vec![R, B]);
}

#[test]
fn moving_between_books_invalidates_both_books() {
    let conn = open_db_in_memory().unwrap();
    let manager = sample_manager(&conn, published_content());
    manager.add_root(10, 0).unwrap();
    manager.add_child(11, 10, 0).unwrap();
    manager.add_child(12, 11, 0).unwrap();

    let handbook_key = manager.cache().all_data_key(R, 0, None);
    let almanac_key = manager.cache().all_data_key(10, 0, None);
    let pointer = manager.cache().subtree_pointer_key(11);
    manager.book_tree_all_data(R, None, None, &AllowAll).unwrap();
    let almanac = manager.book_tree_all_data(10, None, None, &AllowAll).unwrap();
    assert_eq!(shape(&almanac), "Almanac[Index[Jot]]");
    manager.book_subtree_data(11, &AllowAll).unwrap();
    for key in [&handbook_key, &almanac_key, &pointer] {
        assert!(manager.cache().backend().contains_key(key), "{key} not warmed");
    }

    manager.move_link(11, A, None).unwrap();

    for key in [&handbook_key, &almanac_key, &pointer] {
        assert!(!manager.cache().backend().contains_key(key), "{key} is stale");
    }
    let handbook = manager.book_tree_all_data(R, None, None, &AllowAll).unwrap();
    assert_eq!(shape(&handbook), "Handbook[Alpha[Gamma,Index[Jot]],Beta]");
    let almanac = manager.book_tree_all_data(10, None, None, &AllowAll).unwrap();
    assert_eq!(shape(&almanac), "Almanac");
    let subtree = manager.book_subtree_data(11, &AllowAll).unwrap();
    assert_eq!(shape(&subtree), "Index[Jot]");
    assert_eq!(subtree[0].below[0].link.bid, R);

    let flat: Vec<NodeId> = manager
        .book_tree_flat(12, &AllowAll)
        .unwrap()
        .iter()
        .map(|link| link.nid)
        .collect();
    assert_eq!(flat, vec![R, A, C, 11, 12, B]);
}

#[test]
fn promoted_children_are_read_fresh_after_root_delete() {
    let conn = open_db_in_memory().unwrap();
    let manager = sample_manager(&conn, published_content());
    manager.book_tree_all_data(R, None, None, &AllowAll).unwrap();
    assert!(manager
        .book_tree_all_data(A, None, None, &AllowAll)
        .unwrap()
        .is_empty());

    manager.delete_from_book(R).unwrap();

    let alpha = manager.book_tree_all_data(A, None, None, &AllowAll).unwrap();
    assert_eq!(shape(&alpha), "Alpha[Gamma]");
    let beta = manager.book_tree_all_data(B, None, None, &AllowAll).unwrap();
    assert_eq!(shape(&beta), "Beta");
    assert!(manager
        .book_tree_all_data(R, None, None, &AllowAll)
        .unwrap()
        .is_empty());
}

#[test]
fn manager_validates_settings_it_is_given() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteBookRepository::try_new(&conn).unwrap();
    let too_narrow = OutlineSettings {
        toc_title_max_chars: 1,
        ..OutlineSettings::default()
    };
    let rejected = BookManager::new(
        repo,
        published_content(),
        MemoryCacheBackend::new(),
        too_narrow,
    );
    assert!(matches!(rejected, Err(SettingsError::TitleWidthTooSmall(1))));

    let settings = OutlineSettings {
        locale: "de-AT".to_string(),
        toc_title_max_chars: 8,
    };
    let mut content = published_content();
    content.insert(R, ContentInfo::published("Handbook of trees"));
    let manager = BookManager::new(
        SqliteBookRepository::try_new(&conn).unwrap(),
        content,
        MemoryCacheBackend::new(),
        settings,
    )
    .unwrap();
    assert_eq!(manager.settings().locale, "de-AT");
    assert_eq!(manager.settings().toc_title_max_chars, 8);
    assert!(manager.cache().all_data_key(R, 0, None).contains(":de-AT:"));

    manager.add_root(R, 0).unwrap();
    let toc = manager.table_of_contents(R, 9, &[], &AllowAll).unwrap();
    assert_eq!(toc[0].label, " Handboo…");
}
