//! Resumable clients for atproto repo event streams.
//!
//! Three upstreams are supported, see [protocol::SubscriptionMode]. They all decode to the same
//! [events::StreamEvent] shape, and all reconnect the same way through
//! [subscription::Subscription].

pub mod error;
pub mod events;
pub mod exports;
pub mod protocol;
pub mod query;
pub mod subscription;
pub mod transport;

pub use crate::{
    events::{
        Cursor,
        StreamEvent,
    },
    protocol::{
        Protocol,
        SubscriptionMode,
    },
    subscription::{
        CursorSource,
        DefaultJetstreamEndpoints,
        Subscription,
        SubscriptionConfig,
        SubscriptionState,
    },
    transport::{
        ReplayTransport,
        WebSocketTransport,
    },
};
