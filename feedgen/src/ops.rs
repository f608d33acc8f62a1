use firehose::{
    events::{
        CommitEvent,
        CommitOp,
    },
    exports,
    Cursor,
};

use crate::records::KnownRecord;

/// Record collections the classifier knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Post,
    Repost,
    Like,
    Follow,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Post,
        Collection::Repost,
        Collection::Like,
        Collection::Follow,
    ];

    pub fn from_nsid(nsid: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.nsid() == nsid)
    }

    pub fn nsid(&self) -> &'static str {
        match self {
            Collection::Post => "app.bsky.feed.post",
            Collection::Repost => "app.bsky.feed.repost",
            Collection::Like => "app.bsky.feed.like",
            Collection::Follow => "app.bsky.graph.follow",
        }
    }

    /// All known collections, for asking a stream to filter server-side.
    pub fn wanted() -> Vec<exports::Nsid> {
        Self::ALL
            .into_iter()
            .filter_map(|c| exports::Nsid::new(c.nsid().to_string()).ok())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateOp {
    pub uri: String,
    pub cid: String,
    pub author: exports::Did,
    pub collection: Collection,
    pub record: KnownRecord,
    pub cursor: Cursor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOp {
    pub uri: String,
    pub collection: Collection,
    pub cursor: Cursor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create(CreateOp),
    Delete(DeleteOp),
}

impl Operation {
    pub fn collection(&self) -> Collection {
        match self {
            Operation::Create(op) => op.collection,
            Operation::Delete(op) => op.collection,
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            Operation::Create(op) => &op.uri,
            Operation::Delete(op) => &op.uri,
        }
    }
}

/// Turn a commit into at most one operation on a known collection.
///
/// `None` for unknown collections, for creates whose record doesn't have the collection's
/// shape, and for updates, which nothing downstream handles.
pub fn classify(commit: &CommitEvent) -> Option<Operation> {
    let collection = Collection::from_nsid(commit.collection.as_str())?;
    match commit.operation {
        CommitOp::Create => {
            let cid = commit.cid.as_ref()?;
            let record = KnownRecord::from_json(commit.record.as_ref()?.get())?;
            if record.nsid() != collection.nsid() {
                return None;
            }
            Some(Operation::Create(CreateOp {
                uri: commit.uri(),
                cid: cid.as_ref().to_string(),
                author: commit.did.clone(),
                collection,
                record,
                cursor: commit.cursor,
            }))
        }
        CommitOp::Delete => Some(Operation::Delete(DeleteOp {
            uri: commit.uri(),
            collection,
            cursor: commit.cursor,
        })),
        CommitOp::Update => {
            log::trace!("ignoring update to {}", commit.uri());
            None
        }
    }
}
