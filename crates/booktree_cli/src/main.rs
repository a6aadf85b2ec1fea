//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `booktree_core` linkage end to end: open a database, build a
//!   small book and print its table of contents.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `booktree_cli [--log-dir <abs dir>] [db path]`. Without a db path
//! an in-memory database is used; without `--log-dir` nothing is logged.

use booktree_core::{
    default_log_level, init_logging, open_db, open_db_in_memory, AllowAll, BookManager,
    ContentInfo, MemoryCacheBackend, MemoryContentStore, OutlineSettings, SqliteBookRepository,
};
use std::error::Error;

const DEMO_PAGES: [(i64, i64, &str); 5] = [
    (1, 0, "Field guide"),
    (2, 1, "Getting started"),
    (3, 1, "Reference"),
    (4, 2, "Installing the tools on every supported platform"),
    (5, 3, "Glossary"),
];

fn main() -> Result<(), Box<dyn Error>> {
    println!("booktree_core version={}", booktree_core::core_version());

    let args = CliArgs::parse(std::env::args().skip(1))?;
    if let Some(log_dir) = &args.log_dir {
        init_logging(default_log_level(), log_dir)?;
    }

    let conn = match args.db_path {
        Some(path) => open_db(path)?,
        None => open_db_in_memory()?,
    };
    let content: MemoryContentStore = DEMO_PAGES
        .iter()
        .map(|(nid, _, title)| (*nid, ContentInfo::published(*title)))
        .collect();
    let manager = BookManager::new(
        SqliteBookRepository::try_new(&conn)?,
        content,
        MemoryCacheBackend::new(),
        OutlineSettings::default(),
    )?;

    if manager.load_link(1)?.is_none() {
        for (nid, pid, _) in DEMO_PAGES {
            if pid == 0 {
                manager.add_root(nid, 0)?;
            } else {
                manager.add_child(nid, pid, 0)?;
            }
        }
    }

    for entry in manager.table_of_contents(1, 9, &[], &AllowAll)? {
        println!("{:>3} {}", entry.nid, entry.label);
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    log_dir: Option<String>,
    db_path: Option<String>,
}

impl CliArgs {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut parsed = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--log-dir" => {
                    let dir = args.next().ok_or("--log-dir needs a directory")?;
                    parsed.log_dir = Some(dir);
                }
                flag if flag.starts_with("--") => return Err(format!("unknown flag `{flag}`")),
                path if parsed.db_path.is_none() => parsed.db_path = Some(path.to_string()),
                _ => return Err(format!("unexpected argument `{arg}`")),
            }
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::CliArgs;

    fn parse(args: &[&str]) -> Result<CliArgs, String> {
        CliArgs::parse(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn log_dir_and_db_path_are_both_optional() {
        assert_eq!(parse(&[]).unwrap(), CliArgs::default());
        let parsed = parse(&["--log-dir", "/tmp/booktree", "books.db"]).unwrap();
        assert_eq!(parsed.log_dir.as_deref(), Some("/tmp/booktree"));
        assert_eq!(parsed.db_path.as_deref(), Some("books.db"));
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        assert!(parse(&["--log-dir"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
        assert!(parse(&["a.db", "b.db"]).is_err());
    }
}
