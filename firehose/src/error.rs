use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite::{
    self,
    http::uri::InvalidUri,
};

/// Possible errors that can occur when a subscription config is validated.
#[derive(Error, Debug)]
pub enum ConfigValidationError {
    #[error("Too many wanted collections: {0} > 100")]
    TooManyWantedCollections(usize),
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("Endpoint must use the ws:// or wss:// scheme, got {0:?}")]
    UnsupportedScheme(String),
}

/// Possible errors that can occur while connecting to, or reading from, a stream endpoint.
///
/// Every one of these ends the current connection. The subscription reconnects after its
/// configured delay.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Could not build the connection url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Could not encode query params: {0}")]
    QueryEncoding(#[from] QueryEncodeError),
    #[error("Invalid request uri: {0}")]
    InvalidRequest(#[from] InvalidUri),
    #[error("Timed out after {0:?} waiting for the websocket handshake")]
    ConnectTimeout(Duration),
    #[error("No response to keep-alive ping within {0:?}")]
    PingTimeout(Duration),
    #[error("Websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("Failed to read fixture: {0}")]
    Fixture(#[from] std::io::Error),
    #[error("Connection closed: {0}")]
    Closed(String),
}

/// A single frame could not be turned into events. The frame is skipped.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Received malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("Invalid {field} in event: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("Malformed record path {0:?}, expected `<collection>/<rkey>`")]
    MalformedPath(String),
    #[error("{kind} event is missing its {kind} payload")]
    MissingPayload { kind: &'static str },
}

/// A query parameter value had a type that can't be put in a url.
#[derive(Error, Debug, PartialEq)]
pub enum QueryEncodeError {
    #[error("Cannot encode {0}s into query params")]
    UnsupportedType(&'static str),
}
