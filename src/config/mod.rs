//! Host configuration
//!
//! [`Config`] is produced once from process input (see [`cli::Cli`]) and is
//! passed by value into every instance-creation call. The host itself only
//! looks at the listen settings; everything else is pass-through for the
//! instance factory.

pub mod cli;

use crate::error::ConfigError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Directory used for recordings when `--record-video` is set without `--video-dir`
pub const DEFAULT_VIDEO_DIR: &str = "mcp_videos";

/// Interface the SSE listener binds to when no host is given
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Optional tool groups a backend instance may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Tabs,
    Pdf,
    History,
    Wait,
    Files,
    Install,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::Tabs,
        Capability::Pdf,
        Capability::History,
        Capability::Wait,
        Capability::Files,
        Capability::Install,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Tabs => "tabs",
            Capability::Pdf => "pdf",
            Capability::History => "history",
            Capability::Wait => "wait",
            Capability::Files => "files",
            Capability::Install => "install",
        }
    }

    /// Parses a comma-separated capability list into a set
    ///
    /// Entries are trimmed and matched case-insensitively. Empty entries
    /// (for example a trailing comma) are ignored.
    pub fn parse_list(list: &str) -> Result<BTreeSet<Capability>, ConfigError> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(Capability::from_str)
            .collect()
    }
}

impl FromStr for Capability {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Capability::ALL
            .into_iter()
            .find(|cap| cap.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigError::UnknownCapability(name.to_string()))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which transport the process serves, chosen once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    /// One implicit session over stdin/stdout
    Stdio,
    /// HTTP + Server-Sent Events listener serving many sessions
    Sse { host: String, port: u16 },
}

/// Immutable configuration record handed to the instance factory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub browser: Option<String>,
    pub capabilities: BTreeSet<Capability>,
    pub cdp_endpoint: Option<String>,
    pub executable_path: Option<PathBuf>,
    pub headless: bool,
    pub host: String,
    pub port: Option<u16>,
    pub user_data_dir: Option<PathBuf>,
    pub vision: bool,
    pub record_video: bool,
    pub video_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser: None,
            capabilities: Capability::ALL.into_iter().collect(),
            cdp_endpoint: None,
            executable_path: None,
            headless: false,
            host: DEFAULT_HOST.to_string(),
            port: None,
            user_data_dir: None,
            vision: false,
            record_video: false,
            video_dir: None,
        }
    }
}

impl Config {
    /// Absence of a listen port selects stdio, presence selects SSE
    pub fn transport_mode(&self) -> TransportMode {
        match self.port {
            None => TransportMode::Stdio,
            Some(port) => TransportMode::Sse {
                host: self.host.clone(),
                port,
            },
        }
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}
