//! WebSocket transport built on tokio-tungstenite.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::context::StreamContext;
use crate::error::{BoxError, DialError};
use crate::transport::{CloseFrame, Connection, Dialer, Frame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Longest error body kept for diagnostics
const MAX_ERROR_BODY: usize = 512;

/// Dials `ws://` and `wss://` endpoints
#[derive(Clone, Copy, Debug, Default)]
pub struct WsDialer;

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(
        &self,
        ctx: &StreamContext,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<Arc<dyn Connection>, DialError> {
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(DialError::new(format!(
                "invalid stream URL: {url}, must start with ws:// or wss://"
            )));
        }

        let mut request = url
            .into_client_request()
            .map_err(|e| DialError::new(format!("invalid request: {e}")))?;

        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| DialError::new(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| DialError::new(format!("invalid value for header {name}: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        debug!(url = %url, "Opening WebSocket");

        let result = tokio::select! {
            reason = ctx.done() => return Err(DialError::new(reason.to_string())),
            result = connect_async(request) => result,
        };

        match result {
            Ok((ws, response)) => {
                debug!(status = %response.status(), "WebSocket connected");
                Ok(Arc::new(WsConnection::new(ws)))
            }
            Err(tungstenite::Error::Http(response)) => {
                let status = response.status();
                let mut err = DialError::new("handshake rejected").with_status(status.as_u16());
                if let Some(body) = response.body().as_deref().and_then(decode_error_body) {
                    err = err.with_body(body);
                }
                Err(err)
            }
            Err(e) => Err(DialError::new(e.to_string())),
        }
    }
}

/// Pull a readable message out of an error response body.
///
/// JSON bodies shaped like `{"error": "..."}`, `{"error": {"message": "..."}}`
/// or `{"message": "..."}` yield the message; anything else is returned as
/// trimmed text.
pub fn decode_error_body(body: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        let message = value
            .get("error")
            .and_then(|e| e.as_str().or_else(|| e.get("message").and_then(|m| m.as_str())))
            .or_else(|| value.get("message").and_then(|m| m.as_str()));
        if let Some(message) = message {
            return Some(message.to_string());
        }
    }

    let mut text = text.to_string();
    if text.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    Some(text)
}

/// An open WebSocket, split so a close can be sent while a read is pending
pub struct WsConnection {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WsConnection {
    fn new(ws: WsStream) -> Self {
        let (sink, stream) = ws.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send_text(&self, text: String) -> Result<(), BoxError> {
        self.sink.lock().await.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Frame>, BoxError> {
        let mut stream = self.stream.lock().await;
        loop {
            let frame = match stream.next().await {
                Some(Ok(Message::Text(text))) => Frame::Text(text),
                Some(Ok(Message::Binary(data))) => Frame::Binary(data),
                Some(Ok(Message::Close(close))) => Frame::Close(close.map(|c| {
                    CloseFrame::new(u16::from(c.code), c.reason.into_owned())
                })),
                // Pings are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            };
            return Ok(Some(frame));
        }
    }

    async fn close(&self, code: u16, reason: &str) -> Result<(), BoxError> {
        let mut sink = self.sink.lock().await;
        let frame = WsCloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        sink.send(Message::Close(Some(frame))).await?;
        sink.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_json_error() {
        assert_eq!(
            decode_error_body(br#"{"error":"token expired"}"#).as_deref(),
            Some("token expired")
        );
        assert_eq!(
            decode_error_body(br#"{"error":{"code":7,"message":"no such app"}}"#).as_deref(),
            Some("no such app")
        );
        assert_eq!(
            decode_error_body(br#"{"message":"slow down"}"#).as_deref(),
            Some("slow down")
        );
    }

    #[test]
    fn test_decode_plain_error() {
        assert_eq!(
            decode_error_body(b"  Bad Gateway\n").as_deref(),
            Some("Bad Gateway")
        );
        assert_eq!(decode_error_body(b"   "), None);
        assert_eq!(
            decode_error_body(br#"{"status":"down"}"#).as_deref(),
            Some(r#"{"status":"down"}"#)
        );
    }

    #[test]
    fn test_decode_truncates_long_body() {
        let body = "é".repeat(400);
        let decoded = decode_error_body(body.as_bytes()).unwrap();
        assert!(decoded.len() <= MAX_ERROR_BODY);
        assert!(decoded.chars().all(|c| c == 'é'));
    }

    #[tokio::test]
    async fn test_rejects_non_websocket_url() {
        let err = WsDialer
            .dial(&StreamContext::default(), "http://example.com/logs", &[])
            .await
            .err()
            .unwrap();
        assert!(err.message.contains("ws://"));
        assert_eq!(err.status, None);
    }
}
