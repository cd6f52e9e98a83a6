//! Backend instance management
//!
//! An [`Instance`] is one backend MCP server bound to at most one
//! [`Transport`]. Instances are produced by an [`InstanceFactory`] and their
//! lifetime is owned by the [`ServerList`](crate::mcp::registry::ServerList).

use crate::config::Config;
use crate::error::InstanceError;
use crate::mcp::service::BrowserMcpService;
use async_trait::async_trait;
use rmcp::handler::server::ServerHandler;
use rmcp::ServiceExt;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a backend instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Byte-level protocol channel handed to an instance
///
/// Frames are newline-delimited JSON in both directions. The reader
/// yields client→server frames, the writer takes server→client frames.
pub struct Transport {
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl Transport {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    /// The process's standard input/output
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    pub fn into_parts(self) -> (BoxedReader, BoxedWriter) {
        (self.reader, self.writer)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// One backend server object
#[async_trait]
pub trait Instance: Send + Sync {
    fn id(&self) -> InstanceId;

    /// Binds the instance to `transport`
    ///
    /// Returns once the protocol loop is running; the loop itself runs in
    /// the background until the peer goes away or [`Instance::close`] is
    /// called.
    async fn connect(&self, transport: Transport) -> Result<(), InstanceError>;

    /// Resolves once the protocol loop has ended
    async fn closed(&self);

    /// Stops the protocol loop and releases the instance
    ///
    /// Closing an already closed instance succeeds without doing anything.
    async fn close(&self) -> Result<(), InstanceError>;
}

/// Produces fully formed backend instances
#[async_trait]
pub trait InstanceFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn Instance>, InstanceError>;
}

/// [`Instance`] backed by an rmcp [`ServerHandler`]
pub struct RmcpInstance<S> {
    id: InstanceId,
    handler: S,
    ct: CancellationToken,
    finished: CancellationToken,
    connected: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S> RmcpInstance<S>
where
    S: ServerHandler + Clone,
{
    pub fn new(handler: S) -> Self {
        Self {
            id: InstanceId::next(),
            handler,
            ct: CancellationToken::new(),
            finished: CancellationToken::new(),
            connected: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }
}

/// Runs the rmcp service over `transport` until the peer disconnects
async fn run_service<S>(handler: S, transport: Transport) -> Result<String, String>
where
    S: ServerHandler,
{
    let running = handler
        .serve(transport.into_parts())
        .await
        .map_err(|e| e.to_string())?;

    running
        .waiting()
        .await
        .map(|reason| format!("{:?}", reason))
        .map_err(|e| e.to_string())
}

#[async_trait]
impl<S> Instance for RmcpInstance<S>
where
    S: ServerHandler + Clone,
{
    fn id(&self) -> InstanceId {
        self.id
    }

    async fn connect(&self, transport: Transport) -> Result<(), InstanceError> {
        if self.ct.is_cancelled() {
            return Err(InstanceError::Connect(format!(
                "instance {} is closed",
                self.id
            )));
        }
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(InstanceError::Connect(format!(
                "instance {} is already connected",
                self.id
            )));
        }

        let id = self.id;
        let handler = self.handler.clone();
        let ct = self.ct.clone();
        let finished = self.finished.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = ct.cancelled() => {
                    tracing::debug!(instance_id = %id, "Instance cancelled");
                }
                result = run_service(handler, transport) => match result {
                    Ok(reason) => {
                        tracing::debug!(instance_id = %id, reason = %reason, "Instance session ended");
                    }
                    Err(e) => {
                        tracing::warn!(instance_id = %id, error = %e, "Instance session failed");
                    }
                },
            }
            finished.cancel();
        });

        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn closed(&self) {
        self.finished.cancelled().await;
    }

    async fn close(&self) -> Result<(), InstanceError> {
        self.ct.cancel();

        let task = self.task.lock().await.take();
        let result = match task {
            Some(handle) => handle
                .await
                .map_err(|e| InstanceError::Close(format!("instance {}: {}", self.id, e))),
            None => Ok(()),
        };

        self.finished.cancel();
        result
    }
}

/// Factory for [`BrowserMcpService`] instances sharing one [`Config`]
#[derive(Debug, Clone)]
pub struct BrowserServerFactory {
    config: Config,
}

impl BrowserServerFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait]
impl InstanceFactory for BrowserServerFactory {
    async fn create(&self) -> Result<Arc<dyn Instance>, InstanceError> {
        let service = BrowserMcpService::new(self.config.clone())?;
        let instance = RmcpInstance::new(service);
        tracing::debug!(instance_id = %instance.id(), "Created browser server instance");
        Ok(Arc::new(instance))
    }
}
