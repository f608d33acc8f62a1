use serde::Deserialize;
use serde_json::value::RawValue;

use crate::{
    events::{
        Cursor,
        HydratedMetadata,
    },
    exports,
};

/// An event representing a single repo commit operation: a `create`, `update`, or `delete` of
/// one record.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    /// The repo (account) the record lives in.
    pub did: exports::Did,
    /// Stream position of the event that carried this operation.
    pub cursor: Cursor,
    /// The type of commit operation that was performed.
    pub operation: CommitOp,
    /// The NSID of the record type that this commit is associated with.
    pub collection: exports::Nsid,
    pub rkey: exports::RecordKey,
    /// Repo revision, when the protocol includes it.
    pub rev: Option<String>,
    /// The CID of the record that was operated on. Absent for deletes.
    pub cid: Option<exports::Cid>,
    /// The raw record JSON. Only present for `create` and `update`.
    pub record: Option<Box<RawValue>>,
    /// Extra metadata attached by metadata-enriching streams (turbostream).
    pub hydrated: Option<HydratedMetadata>,
}

/// The type of commit operation that was performed.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommitOp {
    Create,
    Update,
    Delete,
}

impl CommitEvent {
    /// The `at://` uri of the record this commit touches.
    pub fn uri(&self) -> String {
        format!(
            "at://{}/{}/{}",
            self.did.as_str(),
            self.collection.as_str(),
            self.rkey.as_str()
        )
    }
}
