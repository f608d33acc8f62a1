//! Resume bookkeeping for one subscription.

use firehose::{
    Cursor,
    CursorSource,
};

use crate::storage::{
    blocking,
    SourceKey,
    Storage,
    StorageResult,
};

/// Reads a source's checkpointed cursor from storage whenever the subscription (re)connects.
#[derive(Debug, Clone)]
pub struct StoredCursor<S> {
    storage: S,
    source: SourceKey,
}

impl<S: Storage> StoredCursor<S> {
    pub fn new(storage: S, source: SourceKey) -> Self {
        Self { storage, source }
    }
}

impl<S: Storage> CursorSource for StoredCursor<S> {
    /// A read failure live-tails rather than stalling the subscription. It gets logged.
    async fn resume_cursor(&self) -> Option<Cursor> {
        let source = self.source.clone();
        match blocking(&self.storage, move |s| s.get_cursor(&source)).await {
            Ok(cursor) => cursor,
            Err(e) => {
                log::error!("could not read the stored cursor for {:?}: {e}", self.source);
                None
            }
        }
    }
}

/// Counts processed events and writes a checkpoint every `interval` of them.
///
/// The count belongs to this one subscription, so concurrent subscriptions keep their own
/// cadence. Call [Checkpointer::processed] only after an event's writes have landed.
#[derive(Debug)]
pub struct Checkpointer<S> {
    storage: S,
    source: SourceKey,
    interval: u64,
    processed: u64,
}

impl<S: Storage> Checkpointer<S> {
    /// An `interval` of zero is treated as one.
    pub fn new(storage: S, source: SourceKey, interval: u64) -> Self {
        Self {
            storage,
            source,
            interval: interval.max(1),
            processed: 0,
        }
    }

    pub fn processed_count(&self) -> u64 {
        self.processed
    }

    /// Count one more processed event. Returns whether that event's cursor was checkpointed.
    pub async fn processed(&mut self, cursor: Cursor) -> StorageResult<bool> {
        self.processed += 1;
        if self.processed % self.interval != 0 {
            return Ok(false);
        }
        let source = self.source.clone();
        blocking(&self.storage, move |s| s.set_cursor(&source, cursor)).await?;
        log::debug!("checkpointed {:?} at {cursor}", self.source);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use firehose::SubscriptionMode;

    use super::*;
    use crate::{
        storage::CursorStore,
        storage_mem::MemStorage,
    };

    fn source() -> SourceKey {
        SourceKey::new(SubscriptionMode::Jetstream, "wss://jetstream.test")
    }

    #[tokio::test]
    async fn test_every_nth_event() -> anyhow::Result<()> {
        let storage = MemStorage::new();
        let mut checkpointer = Checkpointer::new(storage.clone(), source(), 3);
        let mut written = vec![];
        for i in 1..=7 {
            if checkpointer.processed(Cursor::from_raw_u64(i * 10)).await? {
                written.push(i);
            }
        }
        assert_eq!(written, vec![3, 6]);
        assert_eq!(
            storage.cursor_writes()?,
            vec![
                (source(), Cursor::from_raw_u64(30)),
                (source(), Cursor::from_raw_u64(60)),
            ]
        );
        assert_eq!(checkpointer.processed_count(), 7);
        Ok(())
    }

    #[tokio::test]
    async fn test_counters_are_per_subscription() -> anyhow::Result<()> {
        let storage = MemStorage::new();
        let other = SourceKey::new(SubscriptionMode::Firehose, "wss://bsky.network");
        let mut a = Checkpointer::new(storage.clone(), source(), 2);
        let mut b = Checkpointer::new(storage.clone(), other.clone(), 2);
        assert!(!a.processed(Cursor::from_raw_u64(1)).await?);
        assert!(!b.processed(Cursor::from_raw_u64(100)).await?);
        assert!(a.processed(Cursor::from_raw_u64(2)).await?);
        assert_eq!(storage.get_cursor(&other)?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_stored_cursor() -> anyhow::Result<()> {
        let storage = MemStorage::new();
        let resume = StoredCursor::new(storage.clone(), source());
        assert_eq!(resume.resume_cursor().await, None);
        storage.set_cursor(&source(), Cursor::from_raw_u64(42))?;
        assert_eq!(resume.resume_cursor().await, Some(Cursor::from_raw_u64(42)));
        Ok(())
    }
}
