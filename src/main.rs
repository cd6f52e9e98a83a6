use browsermcp::{
    config::{cli::Cli, Config, TransportMode},
    mcp::{self, BrowserServerFactory, ServerList, SseDispatcher},
    watchdog::ExitWatchdog,
};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing; stdout is reserved for protocol frames in stdio mode
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "browsermcp=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config: Config = Cli::parse().into();
    let mode = config.transport_mode();

    let factory = Arc::new(BrowserServerFactory::new(config));
    let servers = Arc::new(ServerList::new(factory));

    let watchdog = Arc::new(ExitWatchdog::new(servers.clone()));
    watchdog.install();

    match mode {
        TransportMode::Stdio => mcp::stdio::run_stdio(servers, watchdog).await,
        TransportMode::Sse { host, port } => {
            mcp::serve_sse(&host, port, SseDispatcher::new(servers)).await
        }
    }
}
