use std::{
    collections::VecDeque,
    path::Path,
    sync::{
        Arc,
        Mutex,
    },
};

use url::Url;

use super::{
    Connection,
    Frame,
    Transport,
};
use crate::error::ConnectionError;

/// One scripted thing that happens on a replayed connection.
#[derive(Debug, Clone)]
pub enum ReplayStep {
    Frame(Frame),
    /// the connection dies with this reason
    Fail(String),
}

impl ReplayStep {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Frame(s.into().into_bytes())
    }
}

/// Every url a [ReplayTransport] was asked to connect to, in order.
#[derive(Debug, Clone, Default)]
pub struct ReplayLog(Arc<Mutex<Vec<Url>>>);

impl ReplayLog {
    fn push(&self, url: &Url) {
        if let Ok(mut urls) = self.0.lock() {
            urls.push(url.clone());
        }
    }

    pub fn urls(&self) -> Vec<Url> {
        self.0.lock().map(|urls| urls.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|urls| urls.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A transport that plays back scripted sessions instead of touching the network.
///
/// Each `connect` uses up the next session: either a refusal or a list of steps. Once every
/// session has been used, `connect` never resolves, which looks like a server that stopped
/// answering. Cancel the subscription to get out of that.
#[derive(Debug, Default)]
pub struct ReplayTransport {
    sessions: VecDeque<Result<Vec<ReplayStep>, String>>,
    log: ReplayLog,
}

impl ReplayTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection that delivers `steps` and then closes cleanly (unless a step fails it).
    pub fn session(mut self, steps: impl IntoIterator<Item = ReplayStep>) -> Self {
        self.sessions.push_back(Ok(steps.into_iter().collect()));
        self
    }

    /// A connection attempt that fails outright.
    pub fn refuse(mut self, reason: impl Into<String>) -> Self {
        self.sessions.push_back(Err(reason.into()));
        self
    }

    /// One session holding every non-empty line of a JSON-lines capture as a frame.
    pub fn from_jsonl(path: impl AsRef<Path>) -> Result<Self, ConnectionError> {
        let contents = std::fs::read_to_string(path)?;
        let frames = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ReplayStep::text);
        Ok(Self::new().session(frames))
    }

    /// A handle on the urls requested so far. Stays valid after the transport is moved.
    pub fn log(&self) -> ReplayLog {
        self.log.clone()
    }
}

impl Transport for ReplayTransport {
    type Connection = ReplayConnection;

    async fn connect(&mut self, url: &Url) -> Result<ReplayConnection, ConnectionError> {
        self.log.push(url);
        match self.sessions.pop_front() {
            Some(Ok(steps)) => Ok(ReplayConnection {
                steps: steps.into(),
            }),
            Some(Err(reason)) => Err(ConnectionError::Closed(reason)),
            None => std::future::pending().await,
        }
    }
}

#[derive(Debug)]
pub struct ReplayConnection {
    steps: VecDeque<ReplayStep>,
}

impl Connection for ReplayConnection {
    async fn next_frame(&mut self) -> Option<Result<Frame, ConnectionError>> {
        match self.steps.pop_front()? {
            ReplayStep::Frame(frame) => Some(Ok(frame)),
            ReplayStep::Fail(reason) => {
                self.steps.clear();
                Some(Err(ConnectionError::Closed(reason)))
            }
        }
    }

    async fn close(&mut self) {
        self.steps.clear();
    }
}
