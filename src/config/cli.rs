use super::{Capability, Config, DEFAULT_HOST, DEFAULT_VIDEO_DIR};
use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Command line surface of the host
///
/// Every flag can also come from a `BROWSERMCP_*` environment variable
/// (or a `.env` file loaded at startup).
#[derive(Debug, Parser)]
#[command(name = "browsermcp")]
#[command(version, about = "Browser automation MCP server over stdio or HTTP+SSE", long_about = None)]
pub struct Cli {
    /// Browser or chrome channel to use, possible values: chrome, firefox, webkit, msedge
    #[arg(long, env = "BROWSERMCP_BROWSER")]
    pub browser: Option<String>,

    /// Comma-separated list of capabilities to enable, possible values: tabs, pdf, history,
    /// wait, files, install. Default is all
    #[arg(long, env = "BROWSERMCP_CAPS", value_parser = Capability::parse_list)]
    pub caps: Option<BTreeSet<Capability>>,

    /// CDP endpoint to connect to
    #[arg(long, env = "BROWSERMCP_CDP_ENDPOINT")]
    pub cdp_endpoint: Option<String>,

    /// Path to the browser executable
    #[arg(long, env = "BROWSERMCP_EXECUTABLE_PATH")]
    pub executable_path: Option<PathBuf>,

    /// Run browser in headless mode, headed by default
    #[arg(long, env = "BROWSERMCP_HEADLESS")]
    pub headless: bool,

    /// Interface to bind the SSE listener to
    #[arg(long, env = "BROWSERMCP_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on for SSE transport
    #[arg(long, env = "BROWSERMCP_PORT")]
    pub port: Option<u16>,

    /// Path to the user data directory
    #[arg(long, env = "BROWSERMCP_USER_DATA_DIR")]
    pub user_data_dir: Option<PathBuf>,

    /// Run server that uses screenshots (Aria snapshots are used by default)
    #[arg(long, env = "BROWSERMCP_VISION")]
    pub vision: bool,

    /// Record video of the browser session
    #[arg(long, env = "BROWSERMCP_RECORD_VIDEO")]
    pub record_video: bool,

    /// Directory to save videos (default: mcp_videos)
    #[arg(long, env = "BROWSERMCP_VIDEO_DIR")]
    pub video_dir: Option<PathBuf>,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        let video_dir = match (cli.video_dir, cli.record_video) {
            (Some(dir), _) => Some(dir),
            (None, true) => Some(PathBuf::from(DEFAULT_VIDEO_DIR)),
            (None, false) => None,
        };

        Config {
            browser: cli.browser,
            capabilities: cli
                .caps
                .unwrap_or_else(|| Capability::ALL.into_iter().collect()),
            cdp_endpoint: cli.cdp_endpoint,
            executable_path: cli.executable_path,
            headless: cli.headless,
            host: cli.host,
            port: cli.port,
            user_data_dir: cli.user_data_dir,
            vision: cli.vision,
            record_video: cli.record_video,
            video_dir,
        }
    }
}
