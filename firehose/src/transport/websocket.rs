use std::time::Duration;

use futures_util::{
    stream::StreamExt,
    SinkExt,
};
use tokio::{
    net::TcpStream,
    time::{
        sleep_until,
        timeout,
        Instant,
    },
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::{
            ClientRequestBuilder,
            IntoClientRequest,
        },
        handshake::client::Request,
        Message,
    },
    MaybeTlsStream,
    WebSocketStream,
};
use url::Url;

use super::{
    Connection,
    Frame,
    Transport,
};
use crate::error::ConnectionError;

/// Keep-alive timing for a websocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    /// Send a ping after this long without hearing anything from the server.
    pub ping_interval: Duration,
    /// After a ping, give up if nothing at all arrives within this long.
    pub pong_timeout: Duration,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

/// Connects with tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    user_agent: Option<String>,
    connect_timeout: Duration,
    keepalive: KeepAlive,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl WebSocketTransport {
    /// `user_agent` gets this library's name and version appended to it.
    pub fn new(user_agent: Option<String>) -> Self {
        let info = format!("firehose/v{}", env!("CARGO_PKG_VERSION"));
        let user_agent = match user_agent {
            Some(ua) => format!("{ua} {info}"),
            None => info,
        };
        Self {
            user_agent: Some(user_agent),
            connect_timeout: Duration::from_secs(30),
            keepalive: KeepAlive::default(),
        }
    }

    pub fn with_keepalive(mut self, keepalive: KeepAlive) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    fn request(&self, url: &Url) -> Result<Request, ConnectionError> {
        let mut req = ClientRequestBuilder::new(url.as_str().parse()?);
        if let Some(ua) = &self.user_agent {
            req = req.with_header("user-agent", ua);
        }
        Ok(req.into_client_request()?)
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    async fn connect(&mut self, url: &Url) -> Result<WebSocketConnection, ConnectionError> {
        let req = self.request(url)?;
        let (ws, _) = timeout(self.connect_timeout, connect_async(req))
            .await
            .map_err(|_| ConnectionError::ConnectTimeout(self.connect_timeout))??;
        log::trace!("websocket connected to {url}");
        Ok(WebSocketConnection {
            ws,
            keepalive: self.keepalive,
            idle_deadline: Instant::now() + self.keepalive.ping_interval,
            pong_deadline: None,
            done: false,
        })
    }
}

pub struct WebSocketConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    keepalive: KeepAlive,
    /// when to ping if nothing arrives first
    idle_deadline: Instant,
    /// set while a ping is outstanding
    pong_deadline: Option<Instant>,
    done: bool,
}

impl WebSocketConnection {
    fn heard_from_server(&mut self) {
        self.pong_deadline = None;
        self.idle_deadline = Instant::now() + self.keepalive.ping_interval;
    }

    fn fail(&mut self, e: ConnectionError) -> Option<Result<Frame, ConnectionError>> {
        self.done = true;
        Some(Err(e))
    }
}

impl Connection for WebSocketConnection {
    async fn next_frame(&mut self) -> Option<Result<Frame, ConnectionError>> {
        loop {
            if self.done {
                return None;
            }
            let idle_deadline = self.idle_deadline;
            let awaiting_pong = self.pong_deadline.is_some();
            let pong_deadline = self.pong_deadline.unwrap_or(idle_deadline);

            tokio::select! {
                _ = sleep_until(pong_deadline), if awaiting_pong => {
                    log::warn!(
                        "no response to keep-alive ping within {:?}, dropping connection",
                        self.keepalive.pong_timeout
                    );
                    return self.fail(ConnectionError::PingTimeout(self.keepalive.pong_timeout));
                }
                _ = sleep_until(idle_deadline), if !awaiting_pong => {
                    log::trace!("connection idle, sending keep-alive ping");
                    if let Err(e) = self.ws.send(Message::Ping(Vec::new().into())).await {
                        return self.fail(e.into());
                    }
                    self.pong_deadline = Some(Instant::now() + self.keepalive.pong_timeout);
                }
                message = self.ws.next() => {
                    self.heard_from_server();
                    match message {
                        Some(Ok(Message::Text(text))) => return Some(Ok(text.as_bytes().to_vec())),
                        Some(Ok(Message::Binary(bytes))) => return Some(Ok(bytes.to_vec())),
                        Some(Ok(Message::Ping(payload))) => {
                            log::trace!("ping received, responding");
                            if let Err(e) = self.ws.send(Message::Pong(payload)).await {
                                return self.fail(e.into());
                            }
                        }
                        Some(Ok(Message::Pong(_))) => log::trace!("pong received"),
                        Some(Ok(Message::Close(close_frame))) => {
                            if let Some(close_frame) = close_frame {
                                log::info!(
                                    "connection closed by server. reason: {}, code: {}",
                                    close_frame.reason,
                                    close_frame.code
                                );
                            }
                            self.done = true;
                            return None;
                        }
                        Some(Ok(Message::Frame(_))) => (),
                        Some(Err(e)) => return self.fail(e.into()),
                        None => {
                            log::debug!("websocket stream ended");
                            self.done = true;
                            return None;
                        }
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        if !self.done {
            self.done = true;
            if let Err(e) = self.ws.close(None).await {
                log::debug!("error while closing websocket: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        net::TcpListener,
        task::JoinHandle,
    };
    use tokio_tungstenite::accept_async;

    use super::*;

    /// A local websocket server. `serve` runs on the accepted, handshaken socket.
    async fn local_server<F, Fut>(serve: F) -> anyhow::Result<(Url, JoinHandle<()>)>
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = Url::parse(&format!("ws://{}/subscribe", listener.local_addr()?))?;
        let server = tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            if let Ok(ws) = accept_async(stream).await {
                serve(ws).await;
            }
        });
        Ok((url, server))
    }

    fn quick_keepalive() -> KeepAlive {
        KeepAlive {
            ping_interval: Duration::from_millis(50),
            pong_timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_silent_server_times_out() -> anyhow::Result<()> {
        // holds the socket open but never reads, so pings go unanswered
        let (url, server) = local_server(|ws| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(ws);
        })
        .await?;
        let mut transport = WebSocketTransport::default().with_keepalive(quick_keepalive());
        let mut conn = transport.connect(&url).await?;
        let next = timeout(Duration::from_secs(5), conn.next_frame()).await?;
        assert!(matches!(next, Some(Err(ConnectionError::PingTimeout(_)))));
        // dead after the timeout
        assert!(conn.next_frame().await.is_none());
        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn test_idle_connection_pings() -> anyhow::Result<()> {
        let (url, server) = local_server(|mut ws| async move {
            while let Some(Ok(message)) = ws.next().await {
                if message.is_ping() {
                    let _ = ws.send(Message::text("pinged")).await;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_secs(10)).await;
        })
        .await?;
        let keepalive = KeepAlive {
            pong_timeout: Duration::from_secs(5),
            ..quick_keepalive()
        };
        let mut transport = WebSocketTransport::default().with_keepalive(keepalive);
        let mut conn = transport.connect(&url).await?;
        let frame = timeout(Duration::from_secs(5), conn.next_frame()).await?;
        assert_eq!(frame.transpose()?, Some(b"pinged".to_vec()));
        conn.close().await;
        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn test_connect_timeout() -> anyhow::Result<()> {
        // accepts tcp but never answers the handshake
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = Url::parse(&format!("ws://{}/subscribe", listener.local_addr()?))?;
        let server = tokio::spawn(async move {
            let accepted = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(accepted);
        });
        let mut transport =
            WebSocketTransport::default().with_connect_timeout(Duration::from_millis(100));
        let result = transport.connect(&url).await;
        assert!(matches!(result, Err(ConnectionError::ConnectTimeout(_))));
        server.abort();
        Ok(())
    }

    #[test]
    fn test_request_carries_user_agent() -> anyhow::Result<()> {
        let transport = WebSocketTransport::new(Some("feedgen-test".to_string()));
        let url = Url::parse("wss://jetstream1.us-east.bsky.network/subscribe?cursor=")?;
        let req = transport.request(&url)?;
        let ua = req
            .headers()
            .get("user-agent")
            .expect("user agent set")
            .to_str()?;
        assert!(ua.starts_with("feedgen-test firehose/v"));
        assert_eq!(req.uri().host(), Some("jetstream1.us-east.bsky.network"));
        Ok(())
    }

    #[test]
    fn test_default_keepalive() {
        let transport = WebSocketTransport::default();
        assert_eq!(transport.keepalive, KeepAlive::default());
        assert_eq!(transport.keepalive.pong_timeout, Duration::from_secs(10));
    }
}
