//! Stdio session path
//!
//! Exactly one backend instance bound to the process's stdin/stdout for the
//! whole process lifetime. No session ids and no registry are involved.

use crate::error::InstanceError;
use crate::mcp::instance::{Instance, Transport};
use crate::mcp::registry::{ServerList, SharedServerList};
use crate::watchdog::{ExitReason, ExitWatchdog};
use std::sync::Arc;

/// Creates the single instance and binds it to `transport`
///
/// If the bind fails the instance is closed again, so nothing is left
/// tracked.
pub async fn serve_stdio(
    servers: &ServerList,
    transport: Transport,
) -> Result<Arc<dyn Instance>, InstanceError> {
    let instance = servers.create().await?;

    if let Err(e) = instance.connect(transport).await {
        if let Err(close_err) = servers.close(&instance).await {
            tracing::warn!(instance_id = %instance.id(), error = %close_err, "Failed to close instance");
        }
        return Err(e);
    }

    tracing::info!(instance_id = %instance.id(), "Serving over stdio");
    Ok(instance)
}

/// Serves stdin/stdout until stdin closes, then hands over to the watchdog
pub async fn run_stdio(servers: SharedServerList, watchdog: Arc<ExitWatchdog>) -> anyhow::Result<()> {
    run_session(&servers, &watchdog, Transport::stdio()).await
}

/// Serves `transport` until its input ends, then triggers shutdown
///
/// End of input on the process's stdin is one of the termination triggers;
/// the watchdog takes over from there.
pub async fn run_session(
    servers: &ServerList,
    watchdog: &ExitWatchdog,
    transport: Transport,
) -> anyhow::Result<()> {
    let instance = serve_stdio(servers, transport).await?;
    instance.closed().await;

    watchdog.shutdown(ExitReason::StdinClosed).await;
    Ok(())
}
