use chrono::Utc;
use serde::Deserialize;
use serde_json::{
    value::RawValue,
    Value,
};

use super::{
    cursor_param,
    Protocol,
    SubscriptionMode,
};
use crate::{
    error::DecodeError,
    events::{
        AccountEvent,
        CommitEvent,
        CommitOp,
        Cursor,
        IdentityEvent,
        StreamEvent,
    },
    exports,
};

/// The relay firehose (`com.atproto.sync.subscribeRepos`), with frames as JSON.
///
/// A commit frame can carry many ops; each becomes its own [StreamEvent] sharing the frame's
/// `seq` cursor. Records are expected inline on each op. The relay can't filter by collection,
/// so no `wantedCollections` param is sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Firehose;

/// Only the message type. The body is decoded again once the type is known, since records
/// are kept as raw json and serde can't buffer those through a tagged enum.
#[derive(Debug, Deserialize)]
struct MessageType {
    #[serde(rename = "$type")]
    kind: String,
}

#[derive(Debug, PartialEq)]
enum MessageKind {
    Commit,
    Identity,
    Account,
    Other,
}

impl MessageKind {
    fn from_type(kind: &str) -> Self {
        let name = kind
            .strip_prefix("com.atproto.sync.subscribeRepos")
            .unwrap_or(kind);
        match name {
            "#commit" => MessageKind::Commit,
            "#identity" => MessageKind::Identity,
            "#account" => MessageKind::Account,
            _ => MessageKind::Other,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FirehoseCommit {
    seq: u64,
    repo: exports::Did,
    rev: Option<String>,
    #[serde(default)]
    ops: Vec<RepoOp>,
}

#[derive(Debug, Deserialize)]
struct RepoOp {
    action: CommitOp,
    path: String,
    cid: Option<exports::Cid>,
    record: Option<Box<RawValue>>,
}

#[derive(Debug, Deserialize)]
struct FirehoseIdentity {
    seq: u64,
    did: exports::Did,
    handle: Option<exports::Handle>,
    time: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct FirehoseAccount {
    seq: u64,
    did: exports::Did,
    active: bool,
    status: Option<String>,
    time: Option<chrono::DateTime<Utc>>,
}

fn split_path(path: &str) -> Result<(exports::Nsid, exports::RecordKey), DecodeError> {
    let (collection, rkey) = path
        .split_once('/')
        .ok_or_else(|| DecodeError::MalformedPath(path.to_string()))?;
    let collection =
        exports::Nsid::new(collection.to_string()).map_err(|reason| DecodeError::InvalidField {
            field: "collection",
            reason,
        })?;
    let rkey = exports::RecordKey::new(rkey.to_string())
        .map_err(|reason| DecodeError::InvalidField {
            field: "rkey",
            reason,
        })?;
    Ok((collection, rkey))
}

impl Protocol for Firehose {
    fn mode(&self) -> SubscriptionMode {
        SubscriptionMode::Firehose
    }

    fn method(&self) -> &'static str {
        "xrpc/com.atproto.sync.subscribeRepos"
    }

    fn params(
        &self,
        cursor: Option<Cursor>,
        _wanted_collections: &[exports::Nsid],
    ) -> Vec<(&'static str, Value)> {
        vec![("cursor", cursor_param(cursor))]
    }

    fn decode(&self, frame: &[u8]) -> Result<Vec<StreamEvent>, DecodeError> {
        let MessageType { kind } = serde_json::from_slice(frame)?;
        let events = match MessageKind::from_type(&kind) {
            MessageKind::Commit => {
                let commit: FirehoseCommit = serde_json::from_slice(frame)?;
                let cursor = Cursor::from_raw_u64(commit.seq);
                let mut events = Vec::with_capacity(commit.ops.len());
                for op in commit.ops {
                    let (collection, rkey) = match split_path(&op.path) {
                        Ok(parts) => parts,
                        Err(e) => {
                            log::warn!("firehose: skipping op in commit {}: {e}", commit.seq);
                            continue;
                        }
                    };
                    events.push(StreamEvent::Commit(CommitEvent {
                        did: commit.repo.clone(),
                        cursor,
                        operation: op.action,
                        collection,
                        rkey,
                        rev: commit.rev.clone(),
                        cid: op.cid,
                        record: op.record,
                        hydrated: None,
                    }));
                }
                events
            }
            MessageKind::Identity => {
                let identity: FirehoseIdentity = serde_json::from_slice(frame)?;
                vec![StreamEvent::Identity(IdentityEvent {
                    did: identity.did,
                    cursor: Cursor::from_raw_u64(identity.seq),
                    handle: identity.handle,
                    seq: Some(identity.seq),
                    time: identity.time,
                })]
            }
            MessageKind::Account => {
                let account: FirehoseAccount = serde_json::from_slice(frame)?;
                vec![StreamEvent::Account(AccountEvent {
                    did: account.did,
                    cursor: Cursor::from_raw_u64(account.seq),
                    active: account.active,
                    status: account.status,
                    seq: Some(account.seq),
                    time: account.time,
                })]
            }
            MessageKind::Other => {
                log::trace!("firehose: ignoring {kind} message");
                vec![]
            }
        };
        Ok(events)
    }
}
