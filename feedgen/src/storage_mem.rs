use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

use firehose::Cursor;

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

/// How many recent checkpoint writes [MemStorage::cursor_writes] remembers.
pub const CURSOR_WRITE_LOG_LEN: usize = 64;

// hopefully-correct simple hashmap version, for tests and for running without a database file
#[derive(Debug, Clone, Default)]
pub struct MemStorage(Arc<Mutex<MemStorageData>>);

#[derive(Debug, Default)]
struct MemStorageData {
    posts: HashMap<String, NewPost>,
    cursors: HashMap<SourceKey, Cursor>,
    /// most recent set_cursor calls, accepted or not
    cursor_writes: VecDeque<(SourceKey, Cursor)>,
    cursor_write_count: u64,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> StorageResult<MutexGuard<'_, MemStorageData>> {
        self.0
            .lock()
            .map_err(|_| StorageError::BadStateError("mem storage lock poisoned".into()))
    }

    /// The last [CURSOR_WRITE_LOG_LEN] checkpoint writes, oldest first.
    pub fn cursor_writes(&self) -> StorageResult<Vec<(SourceKey, Cursor)>> {
        Ok(self.data()?.cursor_writes.iter().cloned().collect())
    }

    /// Checkpoint writes since this storage was created.
    pub fn cursor_write_count(&self) -> StorageResult<u64> {
        Ok(self.data()?.cursor_write_count)
    }

    pub fn post_uris(&self) -> StorageResult<Vec<String>> {
        let mut uris: Vec<String> = self.data()?.posts.keys().cloned().collect();
        uris.sort();
        Ok(uris)
    }
}

impl PostWriter for MemStorage {
    fn insert_posts(&self, posts: &[NewPost]) -> StorageResult<usize> {
        let mut data = self.data()?;
        let mut inserted = 0;
        for post in posts {
            if !data.posts.contains_key(&post.uri) {
                data.posts.insert(post.uri.clone(), post.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn delete_posts(&self, uris: &[String]) -> StorageResult<usize> {
        let mut data = self.data()?;
        Ok(uris
            .iter()
            .filter(|uri| data.posts.remove(uri.as_str()).is_some())
            .count())
    }
}

impl CursorStore for MemStorage {
    fn get_cursor(&self, source: &SourceKey) -> StorageResult<Option<Cursor>> {
        Ok(self.data()?.cursors.get(source).copied())
    }

    fn set_cursor(&self, source: &SourceKey, cursor: Cursor) -> StorageResult<()> {
        let mut data = self.data()?;
        if data.cursor_writes.len() == CURSOR_WRITE_LOG_LEN {
            data.cursor_writes.pop_front();
        }
        data.cursor_writes.push_back((source.clone(), cursor));
        data.cursor_write_count += 1;
        let stored = data.cursors.entry(source.clone()).or_insert(cursor);
        if cursor > *stored {
            *stored = cursor;
        }
        Ok(())
    }
}

impl PostReader for MemStorage {
    fn list_since(&self, cursor: Option<&str>, limit: usize) -> StorageResult<PostPage> {
        let after = cursor.map(parse_feed_cursor).transpose()?;
        let data = self.data()?;
        let mut posts: Vec<NewPost> = data
            .posts
            .values()
            .filter(|p| match after {
                None => true,
                Some((indexed_at, cid)) => {
                    (p.indexed_at.as_str(), p.cid.as_str()) < (indexed_at, cid)
                }
            })
            .cloned()
            .collect();
        posts.sort_by(|a, b| {
            (b.indexed_at.as_str(), b.cid.as_str()).cmp(&(a.indexed_at.as_str(), a.cid.as_str()))
        });
        posts.truncate(limit);
        Ok(page_of(posts, limit))
    }

    fn get_post(&self, uri: &str) -> StorageResult<Option<NewPost>> {
        Ok(self.data()?.posts.get(uri).cloned())
    }
}
