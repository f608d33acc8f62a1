use std::{
    path::Path,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

use firehose::Cursor;
use rusqlite::{
    params,
    Connection,
    OptionalExtension,
};

use crate::{
    error::StorageError,
    storage::{
        page_of,
        parse_feed_cursor,
        CursorStore,
        NewPost,
        PostPage,
        PostReader,
        PostWriter,
        SourceKey,
        StorageResult,
    },
};

/// Current schema version. Bump it and add a step to [migrate] for schema changes.
const SCHEMA_VERSION: i32 = 1;

/// Open this path to keep everything in memory.
pub const IN_MEMORY: &str = ":memory:";

/// SQLite storage. Clones share one connection, and writes are serialized behind its lock.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) a database file, or [IN_MEMORY], and bring its schema up to date.
    pub fn open(location: impl AsRef<Path>) -> StorageResult<Self> {
        let location = location.as_ref();
        let conn = if location.as_os_str() == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            let conn = Connection::open(location).map_err(|e| {
                StorageError::InitError(format!("Failed to open sqlite at {location:?}: {e}"))
            })?;
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
            conn
        };
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Self::open(IN_MEMORY)
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::BadStateError("sqlite connection lock poisoned".into()))
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;
    let current: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?
        .unwrap_or(0);
    if current < SCHEMA_VERSION {
        migrate(conn, current)?;
        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )?;
    }
    Ok(())
}

fn migrate(conn: &Connection, from: i32) -> rusqlite::Result<()> {
    for version in from..SCHEMA_VERSION {
        if version == 0 {
            log::info!("creating feedgen tables");
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS post (
                    uri TEXT PRIMARY KEY,
                    cid TEXT NOT NULL,
                    indexedAt TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_post_indexed_at ON post(indexedAt DESC, cid DESC);

                CREATE TABLE IF NOT EXISTS sub_state (
                    service TEXT PRIMARY KEY,
                    cursor INTEGER NOT NULL
                );
                "#,
            )?;
        }
    }
    Ok(())
}

impl PostWriter for SqliteStorage {
    fn insert_posts(&self, posts: &[NewPost]) -> StorageResult<usize> {
        if posts.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO post (uri, cid, indexedAt) VALUES (?1, ?2, ?3)",
            )?;
            for post in posts {
                inserted += stmt.execute(params![post.uri, post.cid, post.indexed_at])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn delete_posts(&self, uris: &[String]) -> StorageResult<usize> {
        if uris.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM post WHERE uri = ?1")?;
            for uri in uris {
                deleted += stmt.execute([uri])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }
}

impl CursorStore for SqliteStorage {
    fn get_cursor(&self, source: &SourceKey) -> StorageResult<Option<Cursor>> {
        let stored: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT cursor FROM sub_state WHERE service = ?1",
                [source.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        stored
            .map(|c| {
                u64::try_from(c).map(Cursor::from_raw_u64).map_err(|_| {
                    StorageError::BadStateError(format!("negative cursor {c} for {source:?}"))
                })
            })
            .transpose()
    }

    fn set_cursor(&self, source: &SourceKey, cursor: Cursor) -> StorageResult<()> {
        let raw = i64::try_from(cursor.to_raw_u64()).map_err(|_| {
            StorageError::BadStateError(format!("cursor {cursor} does not fit in sqlite"))
        })?;
        self.conn()?.execute(
            "INSERT INTO sub_state (service, cursor) VALUES (?1, ?2)
             ON CONFLICT(service) DO UPDATE SET cursor = excluded.cursor
             WHERE excluded.cursor > sub_state.cursor",
            params![source.as_str(), raw],
        )?;
        Ok(())
    }
}

fn post_from_row(row: &rusqlite::Row) -> rusqlite::Result<NewPost> {
    Ok(NewPost {
        uri: row.get(0)?,
        cid: row.get(1)?,
        indexed_at: row.get(2)?,
    })
}

impl PostReader for SqliteStorage {
    fn list_since(&self, cursor: Option<&str>, limit: usize) -> StorageResult<PostPage> {
        let limit_param = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.conn()?;
        let posts = match cursor {
            None => {
                let mut stmt = conn.prepare_cached(
                    "SELECT uri, cid, indexedAt FROM post
                     ORDER BY indexedAt DESC, cid DESC
                     LIMIT ?1",
                )?;
                let rows = stmt.query_map([limit_param], post_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            Some(cursor) => {
                let (indexed_at, cid) = parse_feed_cursor(cursor)?;
                let mut stmt = conn.prepare_cached(
                    "SELECT uri, cid, indexedAt FROM post
                     WHERE indexedAt < ?1 OR (indexedAt = ?1 AND cid < ?2)
                     ORDER BY indexedAt DESC, cid DESC
                     LIMIT ?3",
                )?;
                let rows = stmt.query_map(params![indexed_at, cid, limit_param], post_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(page_of(posts, limit))
    }

    fn get_post(&self, uri: &str) -> StorageResult<Option<NewPost>> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT uri, cid, indexedAt FROM post WHERE uri = ?1",
                [uri],
                post_from_row,
            )
            .optional()?)
    }
}

#[cfg(test)]
mod tests {
    use firehose::SubscriptionMode;
    use tempfile::tempdir;

    use super::*;
    use crate::storage::conformance;

    #[test]
    fn test_create_is_idempotent() -> anyhow::Result<()> {
        conformance::create_is_idempotent(&SqliteStorage::open_in_memory()?)
    }

    #[test]
    fn test_delete_is_idempotent() -> anyhow::Result<()> {
        conformance::delete_is_idempotent(&SqliteStorage::open_in_memory()?)
    }

    #[test]
    fn test_empty_batches() -> anyhow::Result<()> {
        conformance::empty_batches_do_nothing(&SqliteStorage::open_in_memory()?)
    }

    #[test]
    fn test_batches() -> anyhow::Result<()> {
        conformance::batches(&SqliteStorage::open_in_memory()?)
    }

    #[test]
    fn test_cursor_never_goes_back() -> anyhow::Result<()> {
        conformance::cursor_never_goes_back(&SqliteStorage::open_in_memory()?)
    }

    #[test]
    fn test_list_since() -> anyhow::Result<()> {
        conformance::list_since_pages(&SqliteStorage::open_in_memory()?)
    }

    #[test]
    fn test_persists_across_reopen() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("feedgen.sqlite");
        let source = SourceKey::new(SubscriptionMode::Jetstream, "wss://jetstream.test");
        {
            let storage = SqliteStorage::open(&path)?;
            storage.apply_create("at://a/app.bsky.feed.post/1", "c1")?;
            storage.set_cursor(&source, Cursor::from_raw_u64(1743526687419798))?;
        }
        let storage = SqliteStorage::open(&path)?;
        assert!(storage.get_post("at://a/app.bsky.feed.post/1")?.is_some());
        assert_eq!(
            storage.get_cursor(&source)?,
            Some(Cursor::from_raw_u64(1743526687419798))
        );
        Ok(())
    }

    #[test]
    fn test_clones_share_the_database() -> anyhow::Result<()> {
        let storage = SqliteStorage::open_in_memory()?;
        let other = storage.clone();
        other.apply_create("at://a/app.bsky.feed.post/1", "c1")?;
        assert!(storage.get_post("at://a/app.bsky.feed.post/1")?.is_some());
        Ok(())
    }
}
