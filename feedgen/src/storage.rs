use chrono::{
    SecondsFormat,
    Utc,
};
use firehose::{
    Cursor,
    SubscriptionMode,
};

use crate::error::StorageError;

pub type StorageResult<T> = Result<T, StorageError>;

/// Identifies one upstream for cursor bookkeeping: `<mode>|<endpoint>`.
///
/// A cursor from one server means nothing to another, so each gets its own row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey(String);

impl SourceKey {
    pub fn new(mode: SubscriptionMode, endpoint: &str) -> Self {
        Self(format!("{mode}|{endpoint}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub uri: String,
    pub cid: String,
    /// RFC 3339, millisecond precision, UTC
    pub indexed_at: String,
}

impl NewPost {
    pub fn now(uri: &str, cid: &str) -> Self {
        Self {
            uri: uri.to_string(),
            cid: cid.to_string(),
            indexed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    fn feed_cursor(&self) -> String {
        format!("{}::{}", self.indexed_at, self.cid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostPage {
    pub items: Vec<FeedItem>,
    /// present when there may be more
    pub cursor: Option<String>,
}

/// Split a feed cursor into `(indexed_at, cid)`.
pub(crate) fn parse_feed_cursor(cursor: &str) -> StorageResult<(&str, &str)> {
    cursor
        .split_once("::")
        .filter(|(indexed_at, cid)| !indexed_at.is_empty() && !cid.is_empty())
        .ok_or_else(|| StorageError::InvalidFeedCursor(cursor.to_string()))
}

/// Build a page from posts already sorted newest first, at most `limit` long.
pub(crate) fn page_of(posts: Vec<NewPost>, limit: usize) -> PostPage {
    let cursor = if posts.len() == limit {
        posts.last().map(NewPost::feed_cursor)
    } else {
        None
    };
    PostPage {
        items: posts.into_iter().map(|p| FeedItem { uri: p.uri }).collect(),
        cursor,
    }
}

/// Idempotent writes to the `post` table.
pub trait PostWriter {
    /// Insert posts whose uri isn't stored yet. Existing rows win. Returns how many were new.
    fn insert_posts(&self, posts: &[NewPost]) -> StorageResult<usize>;

    /// Remove posts by uri, ignoring ones that aren't there. Returns how many were removed.
    fn delete_posts(&self, uris: &[String]) -> StorageResult<usize>;

    fn apply_create(&self, uri: &str, cid: &str) -> StorageResult<bool> {
        Ok(self.insert_posts(&[NewPost::now(uri, cid)])? > 0)
    }

    fn apply_delete(&self, uri: &str) -> StorageResult<bool> {
        Ok(self.delete_posts(&[uri.to_string()])? > 0)
    }
}

pub trait CursorStore {
    fn get_cursor(&self, source: &SourceKey) -> StorageResult<Option<Cursor>>;

    /// Record progress for a source. A cursor lower than the stored one is ignored.
    fn set_cursor(&self, source: &SourceKey, cursor: Cursor) -> StorageResult<()>;
}

pub trait PostReader {
    /// Newest posts first, ordered by `(indexedAt, cid)`, starting after `cursor`.
    fn list_since(&self, cursor: Option<&str>, limit: usize) -> StorageResult<PostPage>;

    fn get_post(&self, uri: &str) -> StorageResult<Option<NewPost>>;
}

/// Everything the ingester needs from a backend. Handles are cheap to clone and share one
/// underlying store.
pub trait Storage: PostWriter + CursorStore + PostReader + Clone + Send + Sync + 'static {}

impl<S> Storage for S where S: PostWriter + CursorStore + PostReader + Clone + Send + Sync + 'static {}

/// Run a storage call on the blocking pool.
pub async fn blocking<S, T, F>(storage: &S, f: F) -> StorageResult<T>
where
    S: Storage,
    T: Send + 'static,
    F: FnOnce(S) -> StorageResult<T> + Send + 'static,
{
    let storage = storage.clone();
    tokio::task::spawn_blocking(move || f(storage)).await?
}

/// Behaviour every backend has to share. Each backend's tests run these.
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;

    fn post(uri: &str, cid: &str, indexed_at: &str) -> NewPost {
        NewPost {
            uri: uri.to_string(),
            cid: cid.to_string(),
            indexed_at: indexed_at.to_string(),
        }
    }

    pub(crate) fn create_is_idempotent(storage: &impl Storage) -> anyhow::Result<()> {
        let uri = "at://did:plc:ai3dzf35cth7s3st7n7jsd7r/app.bsky.feed.post/3llrdsglqdc2s";
        assert!(storage.apply_create(uri, "bafy-first")?);
        assert!(!storage.apply_create(uri, "bafy-second")?);
        let stored = storage.get_post(uri)?.expect("stored");
        assert_eq!(stored.cid, "bafy-first");
        assert_eq!(storage.list_since(None, 10)?.items.len(), 1);
        Ok(())
    }

    pub(crate) fn delete_is_idempotent(storage: &impl Storage) -> anyhow::Result<()> {
        let kept = "at://did:plc:ai3dzf35cth7s3st7n7jsd7r/app.bsky.feed.post/kept";
        storage.apply_create(kept, "bafy")?;
        assert!(!storage.apply_delete("at://did:plc:ai3dzf35cth7s3st7n7jsd7r/app.bsky.feed.post/nope")?);
        assert!(storage.get_post(kept)?.is_some());
        assert!(storage.apply_delete(kept)?);
        assert!(!storage.apply_delete(kept)?);
        assert!(storage.get_post(kept)?.is_none());
        Ok(())
    }

    pub(crate) fn empty_batches_do_nothing(storage: &impl Storage) -> anyhow::Result<()> {
        assert_eq!(storage.insert_posts(&[])?, 0);
        assert_eq!(storage.delete_posts(&[])?, 0);
        assert_eq!(storage.list_since(None, 10)?.items, vec![]);
        Ok(())
    }

    pub(crate) fn batches(storage: &impl Storage) -> anyhow::Result<()> {
        let inserted = storage.insert_posts(&[
            post("at://a/app.bsky.feed.post/1", "c1", "2025-04-01T00:00:00.000Z"),
            post("at://a/app.bsky.feed.post/2", "c2", "2025-04-01T00:00:01.000Z"),
            post("at://a/app.bsky.feed.post/1", "c3", "2025-04-01T00:00:02.000Z"),
        ])?;
        assert_eq!(inserted, 2);
        let deleted = storage.delete_posts(&[
            "at://a/app.bsky.feed.post/2".to_string(),
            "at://a/app.bsky.feed.post/9".to_string(),
        ])?;
        assert_eq!(deleted, 1);
        assert_eq!(
            storage.get_post("at://a/app.bsky.feed.post/1")?.map(|p| p.cid),
            Some("c1".to_string())
        );
        Ok(())
    }

    pub(crate) fn cursor_never_goes_back(storage: &impl Storage) -> anyhow::Result<()> {
        let jetstream = SourceKey::new(SubscriptionMode::Jetstream, "wss://jetstream.test");
        let firehose = SourceKey::new(SubscriptionMode::Firehose, "wss://jetstream.test");
        assert_eq!(storage.get_cursor(&jetstream)?, None);

        storage.set_cursor(&jetstream, Cursor::from_raw_u64(1743526687419798))?;
        storage.set_cursor(&jetstream, Cursor::from_raw_u64(1743526687419000))?;
        assert_eq!(
            storage.get_cursor(&jetstream)?,
            Some(Cursor::from_raw_u64(1743526687419798))
        );
        storage.set_cursor(&jetstream, Cursor::from_raw_u64(1743526687419999))?;
        assert_eq!(
            storage.get_cursor(&jetstream)?,
            Some(Cursor::from_raw_u64(1743526687419999))
        );

        // same endpoint, different protocol: separate row
        assert_eq!(storage.get_cursor(&firehose)?, None);
        storage.set_cursor(&firehose, Cursor::from_raw_u64(8204315443))?;
        assert_eq!(storage.get_cursor(&firehose)?, Some(Cursor::from_raw_u64(8204315443)));
        Ok(())
    }

    pub(crate) fn list_since_pages(storage: &impl Storage) -> anyhow::Result<()> {
        storage.insert_posts(&[
            post("at://a/app.bsky.feed.post/1", "c1", "2025-04-01T00:00:00.000Z"),
            post("at://a/app.bsky.feed.post/2", "c2", "2025-04-01T00:00:01.000Z"),
            post("at://a/app.bsky.feed.post/3", "c3", "2025-04-01T00:00:01.000Z"),
            post("at://a/app.bsky.feed.post/4", "c4", "2025-04-01T00:00:02.000Z"),
        ])?;

        let first = storage.list_since(None, 2)?;
        let uris: Vec<_> = first.items.iter().map(|i| i.uri.as_str()).collect();
        assert_eq!(uris, vec!["at://a/app.bsky.feed.post/4", "at://a/app.bsky.feed.post/3"]);
        assert_eq!(first.cursor.as_deref(), Some("2025-04-01T00:00:01.000Z::c3"));

        let second = storage.list_since(first.cursor.as_deref(), 2)?;
        let uris: Vec<_> = second.items.iter().map(|i| i.uri.as_str()).collect();
        assert_eq!(uris, vec!["at://a/app.bsky.feed.post/2", "at://a/app.bsky.feed.post/1"]);

        let third = storage.list_since(second.cursor.as_deref(), 2)?;
        assert!(third.items.is_empty());
        assert_eq!(third.cursor, None);

        assert!(matches!(
            storage.list_since(Some("garbage"), 2),
            Err(StorageError::InvalidFeedCursor(_))
        ));
        Ok(())
    }
}
