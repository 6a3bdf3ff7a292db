use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{TransportError, TransportResult};

/// One stateful request/response exchange over the upstream socket.
///
/// Protocol: the server greets first, the client answers with its access
/// token, and the server must reply `auth_ok` before any request is sent.
/// Anything else, including a reply of the wrong shape, is fatal for the
/// channel.
pub struct MessageChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    exchange_timeout: Duration,
}

impl MessageChannel {
    pub(crate) async fn connect(url: &str, exchange_timeout: Duration) -> TransportResult<Self> {
        let seconds = exchange_timeout.as_secs();
        let (stream, _) = timeout(exchange_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "channel connect",
                seconds,
            })??;
        Ok(Self {
            stream,
            exchange_timeout,
        })
    }

    pub async fn authenticate(&mut self, token: &str) -> TransportResult<()> {
        let greeting = self.receive().await?;
        debug!(
            kind = greeting.get("type").and_then(|v| v.as_str()).unwrap_or("?"),
            "channel greeting"
        );
        self.send(&json!({ "type": "auth", "access_token": token }))
            .await?;
        let reply = self.receive().await?;
        match reply.get("type").and_then(Value::as_str) {
            Some("auth_ok") => Ok(()),
            Some(other) => Err(TransportError::AuthFailed(other.to_string())),
            None => Err(TransportError::AuthFailed(
                "reply missing type field".to_string(),
            )),
        }
    }

    pub async fn send(&mut self, message: &Value) -> TransportResult<()> {
        let seconds = self.exchange_timeout.as_secs();
        timeout(
            self.exchange_timeout,
            self.stream.send(Message::Text(message.to_string())),
        )
        .await
        .map_err(|_| TransportError::Timeout {
            operation: "channel send",
            seconds,
        })??;
        Ok(())
    }

    pub async fn receive(&mut self) -> TransportResult<Value> {
        let seconds = self.exchange_timeout.as_secs();
        loop {
            let frame = timeout(self.exchange_timeout, self.stream.next())
                .await
                .map_err(|_| TransportError::Timeout {
                    operation: "channel receive",
                    seconds,
                })?
                .ok_or_else(|| TransportError::Socket("channel closed".to_string()))??;
            match frame {
                Message::Text(text) => {
                    return serde_json::from_str(&text)
                        .map_err(|err| TransportError::MalformedMessage(err.to_string()));
                }
                Message::Close(_) => {
                    return Err(TransportError::Socket("channel closed".to_string()))
                }
                // Control and binary frames are not part of the exchange.
                _ => continue,
            }
        }
    }

    /// Resolves an opaque content id to a host-relative byte-stream URL.
    ///
    /// `correlation_id` comes from the caller's counter: strictly
    /// increasing for the owning browser's lifetime, never reset per
    /// channel.
    pub async fn resolve_media(
        &mut self,
        content_id: &str,
        correlation_id: u64,
    ) -> TransportResult<String> {
        self.send(&json!({
            "id": correlation_id,
            "type": "media_source/resolve_media",
            "media_content_id": content_id,
        }))
        .await?;
        let reply = self.receive().await?;
        if reply.get("success").and_then(Value::as_bool) == Some(false) {
            let message = reply
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(TransportError::Socket(format!(
                "media resolve rejected: {message}"
            )));
        }
        reply
            .pointer("/result/url")
            .and_then(Value::as_str)
            .map(|url| url.to_string())
            .ok_or_else(|| {
                TransportError::MalformedMessage("resolve reply missing result.url".to_string())
            })
    }

    /// Best-effort close, used on every exit path.
    pub async fn close(mut self) {
        if let Err(error) = self.stream.close(None).await {
            debug!(%error, "channel close failed");
        }
    }
}
