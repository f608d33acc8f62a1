//! A resumable, self-healing subscription to one stream endpoint.
//!
//! ```text
//! Connecting -> Streaming -> (Erred -> Backoff -> Connecting) | Stopped
//! ```
//!
//! The resume cursor is asked for again on every connect, so whatever was checkpointed most
//! recently is where a reconnect picks up. Any connection failure leads to a fixed delay and
//! another attempt, forever. Only the stop token ends a subscription.

use std::{
    collections::VecDeque,
    future::Future,
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    error::ConfigValidationError,
    events::{
        Cursor,
        StreamEvent,
    },
    exports,
    protocol::Protocol,
    transport::{
        Connection,
        Transport,
    },
};

/// The public Jetstream instances run by Bluesky.
///
/// There are no guarantees that these endpoints will always be available, but you are free
/// to run your own Jetstream instance in any case.
pub enum DefaultJetstreamEndpoints {
    /// `jetstream1.us-east.bsky.network`
    USEastOne,
    /// `jetstream2.us-east.bsky.network`
    USEastTwo,
    /// `jetstream1.us-west.bsky.network`
    USWestOne,
    /// `jetstream2.us-west.bsky.network`
    USWestTwo,
}

impl DefaultJetstreamEndpoints {
    /// Pass an endpoint through unless it is one of the shortcuts `us-east-1`, `us-east-2`,
    /// `us-west-1` or `us-west-2`.
    pub fn endpoint_or_shortcut(s: &str) -> String {
        match s {
            "us-east-1" => DefaultJetstreamEndpoints::USEastOne.into(),
            "us-east-2" => DefaultJetstreamEndpoints::USEastTwo.into(),
            "us-west-1" => DefaultJetstreamEndpoints::USWestOne.into(),
            "us-west-2" => DefaultJetstreamEndpoints::USWestTwo.into(),
            custom => custom.into(),
        }
    }
}

impl From<DefaultJetstreamEndpoints> for String {
    fn from(endpoint: DefaultJetstreamEndpoints) -> Self {
        match endpoint {
            DefaultJetstreamEndpoints::USEastOne => "wss://jetstream1.us-east.bsky.network",
            DefaultJetstreamEndpoints::USEastTwo => "wss://jetstream2.us-east.bsky.network",
            DefaultJetstreamEndpoints::USWestOne => "wss://jetstream1.us-west.bsky.network",
            DefaultJetstreamEndpoints::USWestTwo => "wss://jetstream2.us-west.bsky.network",
        }
        .to_owned()
    }
}

/// The maximum number of wanted collections that can be requested on a single connection.
const MAX_WANTED_COLLECTIONS: usize = 100;

#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Base url with a websocket scheme, without the method path, i.e.
    /// `wss://jetstream1.us-east.bsky.network`.
    pub endpoint: String,
    /// Collection [NSIDs](https://atproto.com/specs/nsid) to ask the server for.
    ///
    /// Ignored by protocols that can't filter. Empty means everything.
    pub wanted_collections: Vec<exports::Nsid>,
    /// Fixed wait between a failed connection and the next attempt.
    pub reconnect_delay: Duration,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: DefaultJetstreamEndpoints::USEastOne.into(),
            wanted_collections: Vec::new(),
            reconnect_delay: Duration::from_millis(3000),
        }
    }
}

impl SubscriptionConfig {
    /// Check the config against the server limits, and that the endpoint is a websocket url.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let collections = self.wanted_collections.len();
        if collections > MAX_WANTED_COLLECTIONS {
            return Err(ConfigValidationError::TooManyWantedCollections(collections));
        }
        let url = self.endpoint.parse::<Url>()?;
        match url.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(ConfigValidationError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Where a subscription resumes from. Asked once per connection attempt.
pub trait CursorSource: Send + Sync {
    fn resume_cursor(&self) -> impl Future<Output = Option<Cursor>> + Send;
}

/// A fixed cursor. `None` live-tails on every connect.
impl CursorSource for Option<Cursor> {
    async fn resume_cursor(&self) -> Option<Cursor> {
        *self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Connecting,
    Streaming,
    Backoff,
    Stopped,
}

enum State<C> {
    Connecting,
    Streaming(C),
    Backoff,
    Stopped,
}

pub struct Subscription<T: Transport, S: CursorSource> {
    protocol: Box<dyn Protocol>,
    config: SubscriptionConfig,
    transport: T,
    cursors: S,
    state: State<T::Connection>,
    /// the cursor requested for the current connection
    connect_cursor: Option<Cursor>,
    pending: VecDeque<StreamEvent>,
}

impl<T: Transport, S: CursorSource> Subscription<T, S> {
    /// Set up a subscription. Nothing connects until the first [Subscription::next].
    pub fn new(
        protocol: Box<dyn Protocol>,
        config: SubscriptionConfig,
        transport: T,
        cursors: S,
    ) -> Result<Self, ConfigValidationError> {
        config.validate()?;
        Ok(Self {
            protocol,
            config,
            transport,
            cursors,
            state: State::Connecting,
            connect_cursor: None,
            pending: VecDeque::new(),
        })
    }

    pub fn protocol(&self) -> &dyn Protocol {
        self.protocol.as_ref()
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn state(&self) -> SubscriptionState {
        match self.state {
            State::Connecting => SubscriptionState::Connecting,
            State::Streaming(_) => SubscriptionState::Streaming,
            State::Backoff => SubscriptionState::Backoff,
            State::Stopped => SubscriptionState::Stopped,
        }
    }

    /// Wait for the next event, reconnecting as often as it takes.
    ///
    /// Returns `None` only once `stop` is cancelled. Events already decoded from the last
    /// frame are still handed out after cancellation is noticed mid-frame.
    pub async fn next(&mut self, stop: &CancellationToken) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if stop.is_cancelled() {
                self.shut_down().await;
                return None;
            }
            match &mut self.state {
                State::Stopped => return None,
                State::Connecting => {
                    self.state = self.connect(stop).await;
                }
                State::Backoff => {
                    let delay = self.config.reconnect_delay;
                    log::info!(
                        "{}: reconnecting to {} in {delay:?}",
                        self.protocol.mode(),
                        self.config.endpoint
                    );
                    tokio::select! {
                        _ = stop.cancelled() => {}
                        _ = tokio::time::sleep(delay) => self.state = State::Connecting,
                    }
                }
                State::Streaming(conn) => {
                    let next = tokio::select! {
                        _ = stop.cancelled() => continue,
                        next = conn.next_frame() => next,
                    };
                    match next {
                        Some(Ok(frame)) => self.accept_frame(&frame),
                        Some(Err(e)) => {
                            log::error!(
                                "{}: connection to {} failed: {e}",
                                self.protocol.mode(),
                                self.config.endpoint
                            );
                            self.state = State::Backoff;
                        }
                        None => {
                            log::warn!(
                                "{}: connection to {} closed",
                                self.protocol.mode(),
                                self.config.endpoint
                            );
                            self.state = State::Backoff;
                        }
                    }
                }
            }
        }
    }

    async fn connect(&mut self, stop: &CancellationToken) -> State<T::Connection> {
        let cursor = self.cursors.resume_cursor().await;
        let url = match self.protocol.request_url(
            &self.config.endpoint,
            cursor,
            &self.config.wanted_collections,
        ) {
            Ok(url) => url,
            Err(e) => {
                log::error!("{}: could not build request url: {e}", self.protocol.mode());
                return State::Backoff;
            }
        };
        log::info!("{}: connecting to {url}", self.protocol.mode());
        let connected = tokio::select! {
            _ = stop.cancelled() => return State::Connecting,
            connected = self.transport.connect(&url) => connected,
        };
        match connected {
            Ok(conn) => {
                log::info!("{}: connected, resuming from {cursor:?}", self.protocol.mode());
                self.connect_cursor = cursor;
                State::Streaming(conn)
            }
            Err(e) => {
                log::error!("{}: failed to connect to {url}: {e}", self.protocol.mode());
                State::Backoff
            }
        }
    }

    fn accept_frame(&mut self, frame: &[u8]) {
        let events = match self.protocol.decode(frame) {
            Ok(events) => events,
            Err(e) => {
                log::warn!(
                    "{}: skipping undecodable frame: {e} (from {})",
                    self.protocol.mode(),
                    String::from_utf8_lossy(frame.get(..24).unwrap_or(frame))
                );
                return;
            }
        };
        for event in events {
            if let Some(floor) = self.connect_cursor {
                if event.cursor() < floor {
                    log::debug!(
                        "event cursor {} is older than the connect cursor {floor}. dropping event.",
                        event.cursor()
                    );
                    continue;
                }
            }
            self.pending.push_back(event);
        }
    }

    async fn shut_down(&mut self) {
        if let State::Streaming(conn) = &mut self.state {
            conn.close().await;
        }
        if !matches!(self.state, State::Stopped) {
            log::info!(
                "{}: subscription to {} stopped",
                self.protocol.mode(),
                self.config.endpoint
            );
        }
        self.state = State::Stopped;
    }
}
