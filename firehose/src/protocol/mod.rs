//! Wire protocols that deliver repo commits.
//!
//! Each protocol knows how to build its connection url and how to decode its frames into
//! [StreamEvent]s. Everything else (connecting, reconnecting, resuming) is shared and lives in
//! [crate::subscription].

pub mod firehose;
pub mod jetstream;
pub mod turbostream;

use std::fmt;

use serde_json::Value;
use url::Url;

use crate::{
    error::{
        ConnectionError,
        DecodeError,
    },
    events::{
        Cursor,
        StreamEvent,
    },
    exports,
    query::encode_query_params,
};

pub use self::{
    firehose::Firehose,
    jetstream::Jetstream,
    turbostream::Turbostream,
};

/// Which kind of upstream a subscription talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionMode {
    /// The full relay firehose (`com.atproto.sync.subscribeRepos`), JSON-encoded.
    Firehose,
    /// Jetstream's compact JSON event stream.
    Jetstream,
    /// Graze's turbostream: jetstream events plus hydrated metadata.
    Turbostream,
}

impl SubscriptionMode {
    pub fn protocol(self) -> Box<dyn Protocol> {
        match self {
            SubscriptionMode::Firehose => Box::new(Firehose),
            SubscriptionMode::Jetstream => Box::new(Jetstream),
            SubscriptionMode::Turbostream => Box::new(Turbostream),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionMode::Firehose => "firehose",
            SubscriptionMode::Jetstream => "jetstream",
            SubscriptionMode::Turbostream => "turbostream",
        }
    }
}

impl fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Protocol: Send + Sync {
    fn mode(&self) -> SubscriptionMode;

    /// Path segment appended to the endpoint, e.g. `subscribe`.
    fn method(&self) -> &'static str;

    /// Connection params for a (re)connect.
    fn params(
        &self,
        cursor: Option<Cursor>,
        wanted_collections: &[exports::Nsid],
    ) -> Vec<(&'static str, Value)>;

    /// Decode one frame. A frame may hold zero or more events.
    fn decode(&self, frame: &[u8]) -> Result<Vec<StreamEvent>, DecodeError>;

    /// `<endpoint>/<method>?<params>`
    fn request_url(
        &self,
        endpoint: &str,
        cursor: Option<Cursor>,
        wanted_collections: &[exports::Nsid],
    ) -> Result<Url, ConnectionError> {
        let query = encode_query_params(&self.params(cursor, wanted_collections))?;
        let base = endpoint.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/{}", self.method()))?;
        url.set_query(Some(&query));
        Ok(url)
    }
}

/// Wanted collections as a json param value, shared by the jetstream-style protocols.
pub(crate) fn collections_param(wanted_collections: &[exports::Nsid]) -> Value {
    Value::Array(
        wanted_collections
            .iter()
            .map(|c| Value::String(c.as_str().to_string()))
            .collect(),
    )
}

pub(crate) fn cursor_param(cursor: Option<Cursor>) -> Value {
    cursor
        .map(|c| Value::from(c.to_raw_u64()))
        .unwrap_or(Value::Null)
}
