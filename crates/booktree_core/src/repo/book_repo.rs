//! Book outline repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide point, batch and range access to `book` rows.
//! - Provide the transactional boundary used by structural mutations.
//!
//! # Invariants
//! - `query_tree` ordering is `p1..p9 ASC`, which is a depth-first pre-order.
//! - A prefix constraint `p1..pk` scans exactly one subtree.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::book_link::{BookLink, NodeId, MAX_DEPTH};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const BOOK_SELECT_SQL: &str = "SELECT
    nid,
    bid,
    pid,
    has_children,
    weight,
    depth,
    p1, p2, p3, p4, p5, p6, p7, p8, p9
FROM book";

const PARENT_COLUMNS: [&str; MAX_DEPTH] = ["p1", "p2", "p3", "p4", "p5", "p6", "p7", "p8", "p9"];

/// Result type used by book repository operations.
pub type BookRepoResult<T> = Result<T, BookRepoError>;

/// Errors from book repository operations.
#[derive(Debug)]
pub enum BookRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target row does not exist.
    NodeNotFound(NodeId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid link.
    InvalidData(String),
}

impl Display for BookRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NodeNotFound(nid) => write!(f, "book link not found: {nid}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "book repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "book repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "book repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid book data: {message}"),
        }
    }
}

impl Error for BookRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for BookRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for BookRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Row filter for one book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeQuery {
    /// Book to scan.
    pub bid: NodeId,
    /// Only rows whose `pid` is in this list. Empty means no restriction.
    pub expanded: Vec<NodeId>,
    /// Optional maximum depth.
    pub max_depth: Option<u32>,
    /// Exact `p1..pk` prefix, restricting the scan to one subtree.
    pub prefix: Vec<NodeId>,
    /// Only direct children of this parent.
    pub pid: Option<NodeId>,
}

impl TreeQuery {
    /// Whole-book query.
    pub fn book(bid: NodeId) -> Self {
        Self {
            bid,
            ..Self::default()
        }
    }

    /// Restricts rows to children of the given parents.
    pub fn expanded(mut self, mut parents: Vec<NodeId>) -> Self {
        parents.sort_unstable();
        parents.dedup();
        self.expanded = parents;
        self
    }

    pub fn max_depth(mut self, depth: Option<u32>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Restricts rows to `link` and everything below it.
    pub fn within(mut self, link: &BookLink) -> Self {
        self.prefix = link.ancestor_prefix().to_vec();
        self
    }

    /// Restricts rows to direct children of `pid`.
    pub fn children_of(mut self, pid: NodeId) -> Self {
        self.pid = Some(pid);
        self
    }
}

/// Repository interface for book outline rows.
pub trait BookRepository {
    /// Loads one link by node id.
    fn get_link(&self, nid: NodeId) -> BookRepoResult<Option<BookLink>>;
    /// Loads every existing link among `nids`.
    fn get_links(&self, nids: &[NodeId]) -> BookRepoResult<HashMap<NodeId, BookLink>>;
    /// Inserts one new link.
    fn insert_link(&self, link: &BookLink) -> BookRepoResult<()>;
    /// Overwrites every column of an existing link.
    fn update_link(&self, link: &BookLink) -> BookRepoResult<()>;
    /// Deletes one link row.
    fn delete_link(&self, nid: NodeId) -> BookRepoResult<()>;
    /// Lists rows of one book in `p1..p9` order.
    fn query_tree(&self, query: &TreeQuery) -> BookRepoResult<Vec<BookLink>>;
    /// Lists distinct book ids.
    fn list_book_ids(&self) -> BookRepoResult<Vec<NodeId>>;
    /// Counts rows under `(bid, pid)`, optionally ignoring one node.
    fn count_children(
        &self,
        bid: NodeId,
        pid: NodeId,
        excluding: Option<NodeId>,
    ) -> BookRepoResult<u64>;
    /// Writes the cached `has_children` flag. Missing rows are ignored.
    fn set_has_children(&self, nid: NodeId, has_children: bool) -> BookRepoResult<()>;
    /// Deepest depth found in the subtree rooted at `link`.
    fn max_depth_in_subtree(&self, link: &BookLink) -> BookRepoResult<u32>;
    /// Runs `f` inside one write transaction; rolls back when `f` fails.
    fn transaction<T, E>(&self, f: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        Self: Sized,
        E: From<BookRepoError>;
}

/// SQLite-backed book repository.
pub struct SqliteBookRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBookRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> BookRepoResult<Self> {
        ensure_book_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl BookRepository for SqliteBookRepository<'_> {
    fn get_link(&self, nid: NodeId) -> BookRepoResult<Option<BookLink>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{BOOK_SELECT_SQL} WHERE nid = ?1;"))?;
        let mut rows = stmt.query([nid])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_book_row(row)?));
        }
        Ok(None)
    }

    fn get_links(&self, nids: &[NodeId]) -> BookRepoResult<HashMap<NodeId, BookLink>> {
        let mut links = HashMap::with_capacity(nids.len());
        if nids.is_empty() {
            return Ok(links);
        }

        let placeholders = vec!["?"; nids.len()].join(", ");
        let mut stmt = self
            .conn
            .prepare(&format!("{BOOK_SELECT_SQL} WHERE nid IN ({placeholders});"))?;
        let mut rows = stmt.query(params_from_iter(nids.iter()))?;
        while let Some(row) = rows.next()? {
            let link = parse_book_row(row)?;
            links.insert(link.nid, link);
        }
        Ok(links)
    }

    fn insert_link(&self, link: &BookLink) -> BookRepoResult<()> {
        let mut values = vec![
            Value::Integer(link.nid),
            Value::Integer(link.bid),
            Value::Integer(link.pid),
            Value::Integer(i64::from(link.has_children)),
            Value::Integer(i64::from(link.weight)),
            Value::Integer(i64::from(link.depth)),
        ];
        values.extend(link.parents.iter().map(|value| Value::Integer(*value)));

        self.conn.execute(
            "INSERT INTO book (
                nid, bid, pid, has_children, weight, depth,
                p1, p2, p3, p4, p5, p6, p7, p8, p9
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15);",
            params_from_iter(values),
        )?;
        Ok(())
    }

    fn update_link(&self, link: &BookLink) -> BookRepoResult<()> {
        let mut values = vec![
            Value::Integer(link.bid),
            Value::Integer(link.pid),
            Value::Integer(i64::from(link.has_children)),
            Value::Integer(i64::from(link.weight)),
            Value::Integer(i64::from(link.depth)),
        ];
        values.extend(link.parents.iter().map(|value| Value::Integer(*value)));
        values.push(Value::Integer(link.nid));

        let changed = self.conn.execute(
            "UPDATE book
             SET bid = ?1,
                 pid = ?2,
                 has_children = ?3,
                 weight = ?4,
                 depth = ?5,
                 p1 = ?6, p2 = ?7, p3 = ?8, p4 = ?9, p5 = ?10,
                 p6 = ?11, p7 = ?12, p8 = ?13, p9 = ?14
             WHERE nid = ?15;",
            params_from_iter(values),
        )?;
        if changed == 0 {
            return Err(BookRepoError::NodeNotFound(link.nid));
        }
        Ok(())
    }

    fn delete_link(&self, nid: NodeId) -> BookRepoResult<()> {
        let changed = self.conn.execute("DELETE FROM book WHERE nid = ?1;", [nid])?;
        if changed == 0 {
            return Err(BookRepoError::NodeNotFound(nid));
        }
        Ok(())
    }

    fn query_tree(&self, query: &TreeQuery) -> BookRepoResult<Vec<BookLink>> {
        let mut sql = format!("{BOOK_SELECT_SQL} WHERE bid = ?");
        let mut bind_values = vec![Value::Integer(query.bid)];

        if !query.expanded.is_empty() {
            let placeholders = vec!["?"; query.expanded.len()].join(", ");
            sql.push_str(&format!(" AND pid IN ({placeholders})"));
            bind_values.extend(query.expanded.iter().map(|pid| Value::Integer(*pid)));
        }
        if let Some(max_depth) = query.max_depth {
            sql.push_str(" AND depth <= ?");
            bind_values.push(Value::Integer(i64::from(max_depth)));
        }
        for (column, value) in PARENT_COLUMNS.iter().zip(&query.prefix) {
            sql.push_str(&format!(" AND {column} = ?"));
            bind_values.push(Value::Integer(*value));
        }
        if let Some(pid) = query.pid {
            sql.push_str(" AND pid = ?");
            bind_values.push(Value::Integer(pid));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&PARENT_COLUMNS.map(|column| format!("{column} ASC")).join(", "));
        sql.push(';');

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut links = Vec::new();
        while let Some(row) = rows.next()? {
            links.push(parse_book_row(row)?);
        }
        Ok(links)
    }

    fn list_book_ids(&self) -> BookRepoResult<Vec<NodeId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT bid FROM book ORDER BY bid ASC;")?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }

    fn count_children(
        &self,
        bid: NodeId,
        pid: NodeId,
        excluding: Option<NodeId>,
    ) -> BookRepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM book
             WHERE bid = ?1
               AND pid = ?2
               AND (?3 IS NULL OR nid <> ?3);",
            params![bid, pid, excluding],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| BookRepoError::InvalidData(format!("negative child count `{count}`")))
    }

    fn set_has_children(&self, nid: NodeId, has_children: bool) -> BookRepoResult<()> {
        self.conn.execute(
            "UPDATE book SET has_children = ?2 WHERE nid = ?1;",
            params![nid, has_children],
        )?;
        Ok(())
    }

    fn max_depth_in_subtree(&self, link: &BookLink) -> BookRepoResult<u32> {
        let mut sql = String::from("SELECT MAX(depth) FROM book WHERE bid = ?");
        let mut bind_values = vec![Value::Integer(link.bid)];
        for (column, value) in PARENT_COLUMNS.iter().zip(link.ancestor_prefix()) {
            sql.push_str(&format!(" AND {column} = ?"));
            bind_values.push(Value::Integer(*value));
        }
        sql.push(';');

        let max_depth: Option<i64> = self
            .conn
            .query_row(&sql, params_from_iter(bind_values), |row| row.get(0))
            .optional()?
            .flatten();
        match max_depth {
            None => Ok(link.depth),
            Some(value) => parse_depth(value),
        }
    }

    fn transaction<T, E>(&self, f: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<BookRepoError>,
    {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(BookRepoError::from)?;
        // Dropping `tx` on the error path rolls every statement back.
        let value = f(self)?;
        tx.commit().map_err(BookRepoError::from)?;
        Ok(value)
    }
}

fn parse_book_row(row: &Row<'_>) -> BookRepoResult<BookLink> {
    let has_children = match row.get::<_, i64>("has_children")? {
        0 => false,
        1 => true,
        other => {
            return Err(BookRepoError::InvalidData(format!(
                "invalid has_children value `{other}` in book.has_children"
            )));
        }
    };
    let weight: i64 = row.get("weight")?;
    let weight = i32::try_from(weight).map_err(|_| {
        BookRepoError::InvalidData(format!("weight `{weight}` out of range in book.weight"))
    })?;

    let mut parents = [0; MAX_DEPTH];
    for (slot, column) in parents.iter_mut().zip(PARENT_COLUMNS) {
        *slot = row.get(column)?;
    }

    let link = BookLink {
        nid: row.get("nid")?,
        bid: row.get("bid")?,
        pid: row.get("pid")?,
        has_children,
        weight,
        depth: parse_depth(row.get("depth")?)?,
        parents,
    };
    link.validate().map_err(|err| BookRepoError::InvalidData(err.to_string()))?;
    Ok(link)
}

fn parse_depth(value: i64) -> BookRepoResult<u32> {
    u32::try_from(value)
        .ok()
        .filter(|depth| (1..=MAX_DEPTH as u32).contains(depth))
        .ok_or_else(|| BookRepoError::InvalidData(format!("invalid depth `{value}` in book.depth")))
}

fn ensure_book_connection_ready(conn: &Connection) -> BookRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(BookRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "book")? {
        return Err(BookRepoError::MissingRequiredTable("book"));
    }

    for column in ["nid", "bid", "pid", "has_children", "weight", "depth"]
        .into_iter()
        .chain(PARENT_COLUMNS)
    {
        if !table_has_column(conn, "book", column)? {
            return Err(BookRepoError::MissingRequiredColumn {
                table: "book",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> BookRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> BookRepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
