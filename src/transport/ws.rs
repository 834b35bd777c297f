use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::header::HeaderValue;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{ClientEvent, ServerEvent};

use super::Transport;

pub const DEFAULT_REALTIME_ENDPOINT: &str = "wss://api.openai.com/v1/realtime";

const TRACE_LOG_MAX_BYTES: usize = 1024;

#[derive(Debug)]
pub struct WsStream(WebSocketStream<MaybeTlsStream<TcpStream>>);

impl futures::Stream for WsStream {
    type Item = std::result::Result<
        tokio_tungstenite::tungstenite::Message,
        tokio_tungstenite::tungstenite::Error,
    >;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.0).poll_next(cx)
    }
}

impl futures::Sink<tokio_tungstenite::tungstenite::Message> for WsStream {
    type Error = tokio_tungstenite::tungstenite::Error;

    fn poll_ready(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_ready(cx)
    }

    fn start_send(
        mut self: std::pin::Pin<&mut Self>,
        item: tokio_tungstenite::tungstenite::Message,
    ) -> std::result::Result<(), Self::Error> {
        std::pin::Pin::new(&mut self.0).start_send(item)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_close(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_close(cx)
    }
}

/// Open a WebSocket to the realtime endpoint with the model as a query
/// parameter and the API key as a bearer header.
///
/// # Errors
/// Returns an error if the URL is invalid, the handshake fails, or the
/// connection attempt exceeds `connect_timeout`.
pub async fn connect(
    endpoint: &str,
    api_key: &str,
    model: &str,
    connect_timeout: Duration,
) -> Result<WsStream> {
    let mut url = Url::parse(endpoint)?;
    url.query_pairs_mut().append_pair("model", model);

    let auth_header = HeaderValue::from_str(&format!("Bearer {api_key}"))?;

    let mut req = tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(
        url.as_str(),
    )?;
    req.headers_mut()
        .insert(reqwest::header::AUTHORIZATION, auth_header);

    let (ws_stream, _) = tokio::time::timeout(connect_timeout, connect_async(req))
        .await
        .map_err(|_| Error::ConnectTimeout)??;

    tracing::info!(model, "connected to realtime endpoint");

    Ok(WsStream(ws_stream))
}

/// The production transport: one exclusively-owned WebSocket per session.
pub struct WsTransport {
    stream: WsStream,
}

impl WsTransport {
    #[must_use]
    pub const fn new(stream: WsStream) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, event: ClientEvent) -> Result<()> {
        let json = serde_json::to_string(&event)?;
        tracing::trace!("sending frame: {}", safe_truncate(&json, TRACE_LOG_MAX_BYTES));
        self.stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<ServerEvent>> {
        while let Some(msg) = self.stream.next().await {
            match classify(msg?) {
                Inbound::Event(event) => return Ok(Some(event)),
                Inbound::Skip => (),
                Inbound::Pong(payload) => {
                    self.stream.send(Message::Pong(payload)).await?;
                }
                Inbound::Closed => return Ok(None),
            }
        }
        Ok(None)
    }

    async fn close(&mut self) {
        let _ = SinkExt::close(&mut self.stream).await;
    }
}

/// What the receive loop should do with one inbound message.
enum Inbound {
    Event(ServerEvent),
    Skip,
    Pong(tokio_tungstenite::tungstenite::Bytes),
    Closed,
}

fn classify(msg: Message) -> Inbound {
    match msg {
        Message::Text(text) => {
            tracing::trace!(
                "received frame: {}",
                safe_truncate(&text, TRACE_LOG_MAX_BYTES)
            );
            parse_frame(&text).map_or(Inbound::Skip, Inbound::Event)
        }
        Message::Close(_) => {
            tracing::info!("connection closed by server");
            Inbound::Closed
        }
        Message::Ping(payload) => Inbound::Pong(payload),
        Message::Binary(bytes) => {
            tracing::warn!("ignoring {} byte binary frame", bytes.len());
            Inbound::Skip
        }
        _ => Inbound::Skip,
    }
}

/// Parse one text frame. A frame that is not valid JSON at all is logged
/// and skipped; it never surfaces as an error, so a corrupt frame cannot
/// end the session.
fn parse_frame(text: &str) -> Option<ServerEvent> {
    match serde_json::from_str::<ServerEvent>(text) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::warn!("skipping malformed frame: {err}");
            None
        }
    }
}

fn safe_truncate(s: &str, max_bytes: usize) -> std::borrow::Cow<'_, str> {
    if s.len() <= max_bytes {
        return std::borrow::Cow::Borrowed(s);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(format!(
        "{} ... (truncated) {} bytes",
        &s[..end],
        s.len() - end
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_json_text_frames_are_skipped() {
        assert!(parse_frame("not json").is_none());
        assert!(parse_frame("").is_none());
        // Truncated mid-object.
        assert!(parse_frame(r#"{"type": "session.created"#).is_none());
    }

    #[test]
    fn valid_text_frames_parse_to_events() {
        let event = parse_frame(r#"{"type": "session.created"}"#).expect("valid frame");
        assert_eq!(event.type_tag(), Some("session.created"));
        // Valid JSON with an unrecognized tag still comes through.
        let event = parse_frame(r#"{"type": "rate_limits.updated"}"#).expect("unknown tag");
        assert!(matches!(event, ServerEvent::Unknown(_)));
    }

    #[test]
    fn close_frame_ends_the_stream() {
        assert!(matches!(classify(Message::Close(None)), Inbound::Closed));
    }

    #[test]
    fn ping_is_answered_with_its_payload() {
        let Inbound::Pong(payload) = classify(Message::Ping(vec![1, 2, 3].into())) else {
            panic!("expected a pong");
        };
        assert_eq!(payload.as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn binary_and_malformed_text_frames_are_skipped() {
        assert!(matches!(
            classify(Message::Binary(vec![0, 1].into())),
            Inbound::Skip
        ));
        assert!(matches!(classify(Message::Text("nope".into())), Inbound::Skip));
    }
}
