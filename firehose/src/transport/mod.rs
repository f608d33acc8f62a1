//! Byte-frame transports that a [crate::subscription::Subscription] reads from.
//!
//! A transport only knows how to open one connection to one url and hand back raw frames. It
//! never reconnects on its own: when a connection ends, with or without an error, the
//! subscription decides what happens next.

pub mod replay;
pub mod websocket;

use std::future::Future;

use url::Url;

use crate::error::ConnectionError;

pub use self::{
    replay::{
        ReplayLog,
        ReplayStep,
        ReplayTransport,
    },
    websocket::{
        KeepAlive,
        WebSocketTransport,
    },
};

/// One raw message off the wire, still undecoded.
pub type Frame = Vec<u8>;

pub trait Transport: Send {
    type Connection: Connection;

    /// Open a connection to `url`. Resolving the url is the caller's job, so a reconnect can
    /// ask for a different cursor.
    fn connect(
        &mut self,
        url: &Url,
    ) -> impl Future<Output = Result<Self::Connection, ConnectionError>> + Send;
}

pub trait Connection: Send {
    /// The next frame, `None` once the connection has ended cleanly.
    ///
    /// After an `Err` the connection is dead and only `None` follows.
    fn next_frame(&mut self) -> impl Future<Output = Option<Result<Frame, ConnectionError>>> + Send;

    /// Politely end the connection. Safe to call more than once.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}
