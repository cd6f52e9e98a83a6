//! Registry of live backend instances
//!
//! [`ServerList`] is the sole owner of instance lifetime: every instance is
//! created through it and closed through it, so "close everything" on exit
//! sees exactly the set of instances that are still alive.

use crate::error::InstanceError;
use crate::mcp::instance::{Instance, InstanceFactory, InstanceId};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Tracks every instance created by the factory until it is closed
///
/// # Examples
///
/// ```rust,no_run
/// use browsermcp::config::Config;
/// use browsermcp::mcp::instance::BrowserServerFactory;
/// use browsermcp::mcp::registry::ServerList;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let servers = ServerList::new(Arc::new(BrowserServerFactory::new(Config::default())));
/// let instance = servers.create().await?;
/// servers.close(&instance).await?;
/// # Ok(())
/// # }
/// ```
pub struct ServerList {
    factory: Arc<dyn InstanceFactory>,
    instances: Mutex<HashMap<InstanceId, Arc<dyn Instance>>>,
}

pub type SharedServerList = Arc<ServerList>;

impl ServerList {
    pub fn new(factory: Arc<dyn InstanceFactory>) -> Self {
        Self {
            factory,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a new instance and starts tracking it
    ///
    /// A factory failure leaves nothing tracked.
    pub async fn create(&self) -> Result<Arc<dyn Instance>, InstanceError> {
        let instance = self.factory.create().await?;
        self.instances
            .lock()
            .await
            .insert(instance.id(), Arc::clone(&instance));

        tracing::debug!(instance_id = %instance.id(), "Tracking instance");
        Ok(instance)
    }

    /// Stops tracking `instance` and closes it
    ///
    /// Closing an instance that is no longer tracked still calls its close
    /// routine, which is a no-op for an already closed instance.
    pub async fn close(&self, instance: &Arc<dyn Instance>) -> Result<(), InstanceError> {
        self.instances.lock().await.remove(&instance.id());
        instance.close().await
    }

    /// Closes every tracked instance, best effort
    ///
    /// All closes run concurrently; a failing or slow instance does not
    /// prevent the others from being closed. Failures are logged.
    pub async fn close_all(&self) {
        let instances: Vec<_> = self.instances.lock().await.drain().collect();
        if instances.is_empty() {
            return;
        }

        tracing::info!(count = instances.len(), "Closing all instances");

        let closes = instances.into_iter().map(|(id, instance)| async move {
            if let Err(e) = instance.close().await {
                tracing::error!(instance_id = %id, error = %e, "Failed to close instance");
            }
        });
        join_all(closes).await;
    }

    pub async fn len(&self) -> usize {
        self.instances.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.lock().await.is_empty()
    }

    pub async fn contains(&self, id: InstanceId) -> bool {
        self.instances.lock().await.contains_key(&id)
    }
}
