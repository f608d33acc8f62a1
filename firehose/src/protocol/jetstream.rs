use chrono::Utc;
use serde::Deserialize;
use serde_json::{
    value::RawValue,
    Value,
};

use super::{
    collections_param,
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
        HydratedMetadata,
        IdentityEvent,
        StreamEvent,
    },
    exports,
};

/// Jetstream's compact JSON stream: one event object per frame, cursor is `time_us`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Jetstream;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct JetstreamEvent {
    #[serde(rename = "time_us")]
    pub cursor: Cursor,
    pub did: exports::Did,
    pub kind: EventKind,
    pub commit: Option<JetstreamCommit>,
    pub identity: Option<JetstreamIdentity>,
    pub account: Option<JetstreamAccount>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum EventKind {
    Commit,
    Identity,
    Account,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JetstreamCommit {
    pub collection: exports::Nsid,
    pub rkey: exports::RecordKey,
    pub rev: Option<String>,
    pub operation: CommitOp,
    pub record: Option<Box<RawValue>>,
    pub cid: Option<exports::Cid>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JetstreamIdentity {
    pub handle: Option<exports::Handle>,
    pub seq: Option<u64>,
    pub time: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JetstreamAccount {
    pub active: bool,
    pub status: Option<String>,
    pub seq: Option<u64>,
    pub time: Option<chrono::DateTime<Utc>>,
}

impl JetstreamEvent {
    pub(crate) fn into_stream_event(
        self,
        hydrated: Option<HydratedMetadata>,
    ) -> Result<StreamEvent, DecodeError> {
        let JetstreamEvent {
            cursor,
            did,
            kind,
            commit,
            identity,
            account,
        } = self;
        let event = match kind {
            EventKind::Commit => {
                let commit = commit.ok_or(DecodeError::MissingPayload { kind: "commit" })?;
                StreamEvent::Commit(CommitEvent {
                    did,
                    cursor,
                    operation: commit.operation,
                    collection: commit.collection,
                    rkey: commit.rkey,
                    rev: commit.rev,
                    cid: commit.cid,
                    record: commit.record,
                    hydrated,
                })
            }
            EventKind::Identity => {
                let identity = identity.ok_or(DecodeError::MissingPayload { kind: "identity" })?;
                StreamEvent::Identity(IdentityEvent {
                    did,
                    cursor,
                    handle: identity.handle,
                    seq: identity.seq,
                    time: identity.time,
                })
            }
            EventKind::Account => {
                let account = account.ok_or(DecodeError::MissingPayload { kind: "account" })?;
                StreamEvent::Account(AccountEvent {
                    did,
                    cursor,
                    active: account.active,
                    status: account.status,
                    seq: account.seq,
                    time: account.time,
                })
            }
        };
        Ok(event)
    }
}

impl Protocol for Jetstream {
    fn mode(&self) -> SubscriptionMode {
        SubscriptionMode::Jetstream
    }

    fn method(&self) -> &'static str {
        "subscribe"
    }

    fn params(
        &self,
        cursor: Option<Cursor>,
        wanted_collections: &[exports::Nsid],
    ) -> Vec<(&'static str, Value)> {
        vec![
            ("cursor", cursor_param(cursor)),
            ("wantedCollections", collections_param(wanted_collections)),
        ]
    }

    fn decode(&self, frame: &[u8]) -> Result<Vec<StreamEvent>, DecodeError> {
        let event: JetstreamEvent = serde_json::from_slice(frame)?;
        Ok(vec![event.into_stream_event(None)?])
    }
}
