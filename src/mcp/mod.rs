//! MCP transports, sessions and backend instances
//!
//! # Architecture
//!
//! - [`ServerList`] - Tracks every backend instance until it is closed
//! - [`Instance`] / [`InstanceFactory`] - One backend server and its producer
//! - [`BrowserMcpService`] - rmcp protocol handler run by each instance
//! - [`SessionRegistry`] - Session id → transport map for the SSE path
//! - [`SseTransport`] - One open event stream plus its delivery pipe
//! - [`SseDispatcher`] - HTTP entry point for `GET`/`POST /sse`
//! - [`stdio`] - The single implicit session over stdin/stdout
//!
//! # Example
//!
//! ```rust,no_run
//! use browsermcp::config::Config;
//! use browsermcp::mcp::{router, BrowserServerFactory, ServerList, SseDispatcher};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let servers = Arc::new(ServerList::new(Arc::new(BrowserServerFactory::new(
//!     Config::default(),
//! ))));
//! let app = router(SseDispatcher::new(servers));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8931").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod handlers;
pub mod instance;
pub mod registry;
pub mod service;
pub mod session;
pub mod sse_transport;
pub mod stdio;

pub use handlers::{dispatch, router, serve_sse, SseDispatcher, SSE_PATH};
pub use instance::{
    BrowserServerFactory, Instance, InstanceFactory, InstanceId, RmcpInstance, Transport,
};
pub use registry::{ServerList, SharedServerList};
pub use service::BrowserMcpService;
pub use session::{SessionId, SessionRegistry, SharedSessionRegistry};
pub use sse_transport::{SessionEventStream, SseTransport};
