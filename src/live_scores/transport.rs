//! Live transport seam: one WebSocket per viewed game.
//!
//! The synchronizer only sees [`Connector`] / [`Connection`]; production code
//! plugs in [`TungsteniteConnector`], tests plug in scripted fakes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::COOKIE, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::db::models::GameId;

/// Close code for an intentional, non-error shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code used when the stream dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported when a close frame carried no status.
pub const NO_STATUS: u16 = 1005;

/// What a connection hands back to the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close(Option<u16>),
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>>;
}

#[async_trait]
pub trait Connection: Send {
    /// Next frame from the server. `None` means the stream ended without a
    /// close frame.
    async fn recv(&mut self) -> Option<Result<Frame>>;

    /// Client-side keep-alive.
    async fn ping(&mut self) -> Result<()>;

    async fn close(&mut self, code: u16) -> Result<()>;
}

/// Build `ws(s)://<base>/ws/games/{game_id}/`.
///
/// An `http`/`https` base is accepted and switched to `ws`/`wss`.
pub fn game_socket_url(base: &Url, game_id: &GameId) -> Result<Url> {
    let mut url = base.clone();
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => anyhow::bail!("unsupported live transport scheme: {}", other),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("cannot use scheme {} for {}", scheme, base))?;
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("live transport base cannot be a base URL: {}", base))?
        .pop_if_empty()
        .extend(["ws", "games", game_id.as_str(), ""]);
    Ok(url)
}

/// `tokio-tungstenite` backed connector.
pub struct TungsteniteConnector {
    session_cookie: Option<String>,
}

impl TungsteniteConnector {
    pub fn new(session_cookie: Option<String>) -> Self {
        TungsteniteConnector { session_cookie }
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>> {
        let mut request = url
            .as_str()
            .into_client_request()
            .context("Invalid live transport URL")?;
        if let Some(cookie) = &self.session_cookie {
            let value = HeaderValue::from_str(cookie).context("Invalid session cookie")?;
            request.headers_mut().insert(COOKIE, value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .with_context(|| format!("WebSocket handshake with {} failed", url))?;
        Ok(Box::new(TungsteniteConnection { stream }))
    }
}

struct TungsteniteConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for TungsteniteConnection {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Close(frame)) => {
                    return Some(Ok(Frame::Close(frame.map(|f| u16::from(f.code)))))
                }
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        return Some(Err(e.into()));
                    }
                }
                Ok(other) => debug!("Ignoring non-text frame ({} bytes)", other.len()),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn ping(&mut self) -> Result<()> {
        self.stream.send(Message::Ping(vec![])).await?;
        Ok(())
    }

    async fn close(&mut self, code: u16) -> Result<()> {
        self.stream
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_socket_url_from_ws_base() {
        let base = Url::parse("wss://athletics.example.edu").unwrap();
        let url = game_socket_url(&base, &GameId::from(7)).unwrap();
        assert_eq!(url.as_str(), "wss://athletics.example.edu/ws/games/7/");
    }

    #[test]
    fn test_game_socket_url_swaps_http_scheme_and_keeps_prefix() {
        let base = Url::parse("http://localhost:8000/api/").unwrap();
        let url = game_socket_url(&base, &GameId::from("42")).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/api/ws/games/42/");
    }

    #[test]
    fn test_game_socket_url_rejects_other_schemes() {
        let base = Url::parse("ftp://example.edu").unwrap();
        assert!(game_socket_url(&base, &GameId::from(1)).is_err());
    }
}
