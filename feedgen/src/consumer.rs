use std::sync::Arc;

use firehose::{
    error::ConfigValidationError,
    transport::Transport,
    StreamEvent,
    Subscription,
    SubscriptionConfig,
    SubscriptionMode,
};
use tokio_util::sync::CancellationToken;

use crate::{
    algos::FeedFilter,
    checkpoint::{
        Checkpointer,
        StoredCursor,
    },
    ops::{
        classify,
        Collection,
        Operation,
    },
    storage::{
        blocking,
        NewPost,
        SourceKey,
        Storage,
        StorageResult,
    },
};

/// What one ingester did before it stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub events: u64,
    pub created: u64,
    pub deleted: u64,
    pub checkpoints: u64,
    pub storage_errors: u64,
}

/// Reads one subscription and applies what it sees to storage, one event at a time.
pub struct Ingester<T: Transport, S: Storage> {
    subscription: Subscription<T, StoredCursor<S>>,
    storage: S,
    filter: Arc<dyn FeedFilter>,
    checkpointer: Checkpointer<S>,
    stats: IngestStats,
}

impl<T: Transport, S: Storage> Ingester<T, S> {
    pub fn new(
        mode: SubscriptionMode,
        config: SubscriptionConfig,
        transport: T,
        storage: S,
        filter: Arc<dyn FeedFilter>,
        checkpoint_interval: u64,
    ) -> Result<Self, ConfigValidationError> {
        let source = SourceKey::new(mode, &config.endpoint);
        let resume = StoredCursor::new(storage.clone(), source.clone());
        let subscription = Subscription::new(mode.protocol(), config, transport, resume)?;
        Ok(Self {
            subscription,
            checkpointer: Checkpointer::new(storage.clone(), source, checkpoint_interval),
            storage,
            filter,
            stats: IngestStats::default(),
        })
    }

    /// Run until `stop` is cancelled. An event being applied when that happens is finished
    /// first.
    pub async fn run(mut self, stop: CancellationToken) -> IngestStats {
        let mode = self.subscription.protocol().mode();
        log::info!("{mode}: ingesting from {}", self.subscription.endpoint());
        while let Some(event) = self.subscription.next(&stop).await {
            self.handle(event).await;
        }
        log::info!("{mode}: ingester stopped after {:?}", self.stats);
        self.stats
    }

    async fn handle(&mut self, event: StreamEvent) {
        self.stats.events += 1;
        let cursor = event.cursor();
        if let StreamEvent::Commit(commit) = &event {
            if let Some(op) = classify(commit) {
                if let Err(e) = self.apply(op).await {
                    self.stats.storage_errors += 1;
                    log::error!("failed to apply {}: {e}", commit.uri());
                }
            }
        }
        match self.checkpointer.processed(cursor).await {
            Ok(true) => self.stats.checkpoints += 1,
            Ok(false) => {}
            Err(e) => {
                self.stats.storage_errors += 1;
                log::error!("failed to checkpoint cursor {cursor}: {e}");
            }
        }
    }

    /// Only posts are stored. Everything else is classified and then left alone.
    async fn apply(&mut self, op: Operation) -> StorageResult<()> {
        match op {
            Operation::Create(create) if create.collection == Collection::Post => {
                if !self.filter.includes(&create) {
                    return Ok(());
                }
                let post = NewPost::now(&create.uri, &create.cid);
                let inserted = blocking(&self.storage, move |s| s.insert_posts(&[post])).await?;
                self.stats.created += inserted as u64;
            }
            Operation::Delete(delete) if delete.collection == Collection::Post => {
                let uris = vec![delete.uri];
                let deleted = blocking(&self.storage, move |s| s.delete_posts(&uris)).await?;
                self.stats.deleted += deleted as u64;
            }
            other => log::trace!("nothing stored for {:?} {}", other.collection(), other.uri()),
        }
        Ok(())
    }
}
