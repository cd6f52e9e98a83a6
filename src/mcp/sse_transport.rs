//! Server-Sent Events transport
//!
//! One [`SseTransport`] per open `GET` stream. Client→server frames arrive
//! as POST bodies and are written into an in-process pipe that the bound
//! instance reads; server→client frames written by the instance are read
//! back line by line and sent as `message` events on the stream.
//!
//! ```text
//!  POST body ──► deliver() ──► pipe ──► instance reader
//!  SSE stream ◄── SessionEventStream ◄── pipe ◄── instance writer
//! ```

use crate::error::DispatchError;
use crate::mcp::instance::Transport;
use crate::mcp::session::SessionId;
use axum::response::sse::Event;
use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, LinesCodec};

/// Largest accepted frame in either direction
pub const MAXIMUM_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Halves of a freshly created transport that are handed out once
pub struct SseTransportParts {
    /// Server→client frames, consumed by [`SseTransport::event_stream`]
    pub events: ReadHalf<DuplexStream>,
    /// The instance's end of the pipe
    pub instance: Transport,
}

/// Transport handle bound to exactly one open SSE response stream
pub struct SseTransport {
    session_id: SessionId,
    endpoint: String,
    inbound: Mutex<WriteHalf<DuplexStream>>,
    closed: AtomicBool,
}

impl SseTransport {
    /// Creates a transport and mints its session id
    ///
    /// `endpoint` is the path clients POST to; it is advertised in the
    /// first event of the stream.
    pub fn new(endpoint: &str) -> (Arc<Self>, SseTransportParts) {
        let (host_side, instance_side) = tokio::io::duplex(PIPE_CAPACITY);
        let (events, inbound) = tokio::io::split(host_side);
        let (instance_reader, instance_writer) = tokio::io::split(instance_side);

        let transport = Arc::new(Self {
            session_id: SessionId::new(),
            endpoint: endpoint.to_string(),
            inbound: Mutex::new(inbound),
            closed: AtomicBool::new(false),
        });

        let parts = SseTransportParts {
            events,
            instance: Transport::new(instance_reader, instance_writer),
        };

        (transport, parts)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Endpoint URL (path and query) the client must POST to
    pub fn endpoint_url(&self) -> String {
        format!("{}?sessionId={}", self.endpoint, self.session_id)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Marks the stream as gone; later deliveries fail with `UnknownSession`
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Forwards one client frame to the bound instance
    ///
    /// Deliveries for one session are written in the order they acquire
    /// the pipe lock, which is the order they were dispatched. A delivery
    /// that finds the stream already closed is rejected as an unknown
    /// session.
    pub async fn deliver(&self, message: &serde_json::Value) -> Result<(), DispatchError> {
        let mut line =
            serde_json::to_vec(message).map_err(|e| DispatchError::InvalidMessage(e.to_string()))?;
        line.push(b'\n');

        let mut inbound = self.inbound.lock().await;
        if self.is_closed() {
            return Err(DispatchError::UnknownSession(self.session_id.to_string()));
        }

        let written = match inbound.write_all(&line).await {
            Ok(()) => inbound.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::debug!(session_id = %self.session_id, error = %e, "Session pipe closed");
            self.mark_closed();
            return Err(DispatchError::UnknownSession(self.session_id.to_string()));
        }

        Ok(())
    }

    /// Builds the event stream for the GET response
    ///
    /// The stream starts with the `endpoint` event and then carries one
    /// `message` event per frame written by the instance. It ends when the
    /// instance closes its end of the pipe. `on_close` runs exactly once,
    /// when the stream is dropped for any reason.
    pub fn event_stream<F>(&self, events: ReadHalf<DuplexStream>, on_close: F) -> SessionEventStream
    where
        F: FnOnce() + Send + 'static,
    {
        let session_id = self.session_id.clone();
        let endpoint = stream::once(future::ready(Ok::<_, Infallible>(Event::default()
            .event("endpoint")
            .data(self.endpoint_url()))));

        let messages = FramedRead::new(
            events,
            LinesCodec::new_with_max_length(MAXIMUM_MESSAGE_SIZE),
        )
        .scan((), move |_, line| {
            future::ready(match line {
                Ok(line) => Some(line),
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Dropping SSE stream");
                    None
                }
            })
        })
        .filter(|line| future::ready(!line.trim().is_empty()))
        .map(|line| Ok::<_, Infallible>(Event::default().event("message").data(line)));

        SessionEventStream {
            inner: endpoint.chain(messages).boxed(),
            _observer: CloseObserver(Some(Box::new(on_close))),
        }
    }
}

struct CloseObserver(Option<Box<dyn FnOnce() + Send>>);

impl Drop for CloseObserver {
    fn drop(&mut self) {
        if let Some(on_close) = self.0.take() {
            on_close();
        }
    }
}

/// Event stream of one SSE session
///
/// Dropping it (client disconnect, error, or end of the instance output)
/// fires the close observer registered by the dispatcher.
pub struct SessionEventStream {
    inner: BoxStream<'static, Result<Event, Infallible>>,
    _observer: CloseObserver,
}

impl Stream for SessionEventStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_deliver_writes_one_line_per_message() {
        let (transport, parts) = SseTransport::new("/sse");
        let (reader, _writer) = parts.instance.into_parts();
        let mut lines = BufReader::new(reader).lines();

        transport
            .deliver(&json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
            .await
            .unwrap();
        transport
            .deliver(&json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}))
            .await
            .unwrap();

        let first: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);
    }

    #[tokio::test]
    async fn test_deliver_after_close_is_unknown_session() {
        let (transport, _parts) = SseTransport::new("/sse");
        transport.mark_closed();

        let err = transport.deliver(&json!({"id": 1})).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn test_deliver_to_dropped_instance_is_unknown_session() {
        let (transport, parts) = SseTransport::new("/sse");
        drop(parts);

        let err = transport.deliver(&json!({"id": 1})).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownSession(_)));
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_stream_announces_endpoint_then_relays_frames() {
        let (transport, parts) = SseTransport::new("/sse");
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closes);

        let (_reader, mut writer) = parts.instance.into_parts();
        let mut stream = transport.event_stream(parts.events, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(stream.next().await.is_some(), "endpoint event expected");

        writer.write_all(b"{\"id\":1}\n\n").await.unwrap();
        writer.flush().await.unwrap();
        assert!(stream.next().await.is_some(), "message event expected");

        writer.shutdown().await.unwrap();
        assert!(stream.next().await.is_none(), "stream ends with the instance output");
        assert_eq!(closes.load(Ordering::SeqCst), 0);

        drop(stream);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
