use serde::Deserialize;
use serde_json::Value;

use super::{
    collections_param,
    cursor_param,
    jetstream::JetstreamEvent,
    Protocol,
    SubscriptionMode,
};
use crate::{
    error::DecodeError,
    events::{
        Cursor,
        HydratedMetadata,
        StreamEvent,
    },
    exports,
};

/// Graze's turbostream: a jetstream event wrapped in an envelope with hydrated metadata.
///
/// The envelope's own `time_us` may be null, so the cursor always comes from the wrapped
/// jetstream message.
#[derive(Debug, Clone, Copy, Default)]
pub struct Turbostream;

#[derive(Debug, Deserialize)]
struct TurbostreamEnvelope {
    message: JetstreamEvent,
    #[serde(default)]
    hydrated_metadata: Option<HydratedMetadata>,
}

impl Protocol for Turbostream {
    fn mode(&self) -> SubscriptionMode {
        SubscriptionMode::Turbostream
    }

    fn method(&self) -> &'static str {
        "turbostream"
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
        let envelope: TurbostreamEnvelope = serde_json::from_slice(frame)?;
        let event = envelope
            .message
            .into_stream_event(envelope.hydrated_metadata)?;
        Ok(vec![event])
    }
}
