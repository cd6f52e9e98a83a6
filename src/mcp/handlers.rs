//! HTTP dispatcher for the SSE transport
//!
//! A single path serves two request shapes:
//!
//! * `GET /sse` opens a new session: a fresh transport, a fresh backend
//!   instance and an SSE response stream that stays open.
//! * `POST /sse?sessionId=<id>` delivers one protocol frame to the session
//!   that minted `<id>`.
//!
//! Anything else is answered with `405 Method not allowed`.

use crate::error::DispatchError;
use crate::mcp::instance::Instance;
use crate::mcp::registry::SharedServerList;
use crate::mcp::session::{SessionRegistry, SharedSessionRegistry};
use crate::mcp::sse_transport::{SessionEventStream, SseTransport, MAXIMUM_MESSAGE_SIZE};
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{
        sse::{KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::any,
    Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Path serving both the event stream and message delivery
pub const SSE_PATH: &str = "/sse";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Owns the session registry and routes requests to sessions
#[derive(Clone)]
pub struct SseDispatcher {
    sessions: SharedSessionRegistry,
    servers: SharedServerList,
    endpoint: String,
}

impl SseDispatcher {
    pub fn new(servers: SharedServerList) -> Self {
        Self::with_registry(servers, Arc::new(SessionRegistry::new()))
    }

    /// Dispatcher over an externally owned registry
    pub fn with_registry(servers: SharedServerList, sessions: SharedSessionRegistry) -> Self {
        Self {
            sessions,
            servers,
            endpoint: SSE_PATH.to_string(),
        }
    }

    pub fn sessions(&self) -> &SharedSessionRegistry {
        &self.sessions
    }

    pub fn servers(&self) -> &SharedServerList {
        &self.servers
    }

    /// Opens a new session and returns its event stream
    ///
    /// The session is registered before the instance is requested. If the
    /// instance cannot be created or bound, or the caller stops waiting
    /// halfway, the entry is removed again and no session is left behind.
    pub async fn open_session(&self) -> Result<SessionEventStream, DispatchError> {
        let (transport, parts) = SseTransport::new(&self.endpoint);
        let session_id = transport.session_id().clone();
        self.sessions.insert(Arc::clone(&transport))?;

        let mut pending = PendingSession {
            sessions: Arc::clone(&self.sessions),
            servers: Arc::clone(&self.servers),
            transport: Arc::clone(&transport),
            instance: None,
            armed: true,
        };

        let instance = self.servers.create().await?;
        pending.instance = Some(Arc::clone(&instance));

        let on_close = {
            let sessions = Arc::clone(&self.sessions);
            let servers = Arc::clone(&self.servers);
            let transport = Arc::clone(&transport);
            let instance = Arc::clone(&instance);
            move || {
                discard_session(&sessions, &transport);
                tracing::info!(
                    session_id = %transport.session_id(),
                    instance_id = %instance.id(),
                    "SSE session closed"
                );
                spawn_close(servers, instance);
            }
        };

        // From here on the stream's observer owns cleanup, including a
        // failed or abandoned bind.
        let stream = transport.event_stream(parts.events, on_close);
        pending.disarm();
        instance.connect(parts.instance).await?;

        tracing::info!(
            session_id = %session_id,
            instance_id = %instance.id(),
            "SSE session opened"
        );
        Ok(stream)
    }

    /// Delivers one POSTed frame to its session
    ///
    /// The registry lookup happens before the body is inspected so that an
    /// unknown session is reported as such regardless of the payload.
    pub async fn deliver(
        &self,
        session_id: Option<&str>,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<(), DispatchError> {
        let session_id = session_id
            .filter(|id| !id.is_empty())
            .ok_or(DispatchError::MissingSession)?;

        let transport = self
            .sessions
            .get(session_id)
            .ok_or_else(|| DispatchError::UnknownSession(session_id.to_string()))?;

        check_content_type(headers)?;
        let bytes = read_body(headers, body).await?;
        let message: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| DispatchError::InvalidMessage(e.to_string()))?;

        transport.deliver(&message).await?;
        tracing::debug!(session_id = %session_id, "Delivered message");
        Ok(())
    }
}

/// Registry entry (and instance, once created) of a session whose stream
/// does not exist yet
struct PendingSession {
    sessions: SharedSessionRegistry,
    servers: SharedServerList,
    transport: Arc<SseTransport>,
    instance: Option<Arc<dyn Instance>>,
    armed: bool,
}

impl PendingSession {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingSession {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        discard_session(&self.sessions, &self.transport);
        tracing::debug!(session_id = %self.transport.session_id(), "SSE session abandoned while opening");
        if let Some(instance) = self.instance.take() {
            spawn_close(Arc::clone(&self.servers), instance);
        }
    }
}

fn discard_session(sessions: &SessionRegistry, transport: &SseTransport) {
    transport.mark_closed();
    sessions.remove(transport.session_id().as_str());
}

/// Closes `instance` in the background; the request that owned it is gone
fn spawn_close(servers: SharedServerList, instance: Arc<dyn Instance>) {
    let close = async move {
        if let Err(e) = servers.close(&instance).await {
            tracing::error!(instance_id = %instance.id(), error = %e, "Failed to close instance");
        }
    };
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(close);
        }
        Err(_) => {
            tracing::warn!("No runtime available, instance left for shutdown");
        }
    }
}

fn check_content_type(headers: &HeaderMap) -> Result<(), DispatchError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();
    if mime.eq_ignore_ascii_case("application/json") {
        Ok(())
    } else {
        Err(DispatchError::UnsupportedContentType(content_type.to_string()))
    }
}

async fn read_body(headers: &HeaderMap, body: Body) -> Result<Bytes, DispatchError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|len| len > MAXIMUM_MESSAGE_SIZE) {
        return Err(DispatchError::PayloadTooLarge);
    }

    axum::body::to_bytes(body, MAXIMUM_MESSAGE_SIZE)
        .await
        .map_err(|e| {
            let inner = e.into_inner();
            if inner.is::<http_body_util::LengthLimitError>() {
                DispatchError::PayloadTooLarge
            } else {
                DispatchError::InvalidMessage(inner.to_string())
            }
        })
}

/// Entry point for every request on [`SSE_PATH`]
pub async fn dispatch(
    State(dispatcher): State<SseDispatcher>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let result = match method {
        Method::GET => dispatcher.open_session().await.map(|stream| {
            Sse::new(stream)
                .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
                .into_response()
        }),
        Method::POST => dispatcher
            .deliver(query.get("sessionId").map(String::as_str), &headers, body)
            .await
            .map(|()| (StatusCode::ACCEPTED, "Accepted").into_response()),
        other => Err(DispatchError::MethodNotAllowed(other.to_string())),
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(error = %e, status = %e.status(), "Rejected request");
            e.into_response()
        }
    }
}

/// Router serving the SSE transport
pub fn router(dispatcher: SseDispatcher) -> Router {
    Router::new()
        .route(SSE_PATH, any(dispatch))
        .with_state(dispatcher)
        .layer(TraceLayer::new_for_http())
}

/// URL clients should use to reach a listener bound to `addr`
///
/// Wildcard addresses are shown as `localhost`.
pub fn listen_url(addr: SocketAddr) -> String {
    let host = match addr {
        SocketAddr::V4(v4) if v4.ip().is_unspecified() => "localhost".to_string(),
        SocketAddr::V6(v6) if v6.ip().is_unspecified() => "localhost".to_string(),
        SocketAddr::V4(v4) => v4.ip().to_string(),
        SocketAddr::V6(v6) => format!("[{}]", v6.ip()),
    };
    format!("http://{}:{}", host, addr.port())
}

/// Client configuration snippet printed once the listener is up
pub fn client_config(url: &str) -> serde_json::Value {
    serde_json::json!({
        "mcpServers": {
            "browser": {
                "url": format!("{}{}", url, SSE_PATH)
            }
        }
    })
}

/// Binds the SSE listener and serves until the process exits
pub async fn serve_sse(host: &str, port: u16, dispatcher: SseDispatcher) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    let url = listen_url(listener.local_addr()?);

    tracing::info!(url = %url, "SSE transport listening");
    println!("Listening on {}", url);
    println!("Put this in your client config:");
    println!("{}", serde_json::to_string_pretty(&client_config(&url))?);

    axum::serve(listener, router(dispatcher)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_listen_url_wildcards_become_localhost() {
        assert_eq!(
            listen_url("0.0.0.0:8931".parse().unwrap()),
            "http://localhost:8931"
        );
        assert_eq!(listen_url("[::]:8931".parse().unwrap()), "http://localhost:8931");
        assert_eq!(
            listen_url("127.0.0.1:9000".parse().unwrap()),
            "http://127.0.0.1:9000"
        );
        assert_eq!(listen_url("[::1]:9000".parse().unwrap()), "http://[::1]:9000");
    }

    #[test]
    fn test_client_config_points_at_sse_path() {
        let config = client_config("http://localhost:8931");
        assert_eq!(
            config["mcpServers"]["browser"]["url"],
            "http://localhost:8931/sse"
        );
    }

    #[test]
    fn test_content_type_accepts_charset() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert!(check_content_type(&headers).is_ok());

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(matches!(
            check_content_type(&headers),
            Err(DispatchError::UnsupportedContentType(_))
        ));

        assert!(check_content_type(&HeaderMap::new()).is_err());
    }
}
