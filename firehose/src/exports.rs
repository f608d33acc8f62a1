//! Re-exported atproto string types used in event payloads, so consumers don't need a direct
//! dependency on `atrium-api` to name them.

pub use atrium_api::types::string::{
    Cid,
    Did,
    Handle,
    Nsid,
    RecordKey,
};
