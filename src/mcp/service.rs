//! MCP ServerHandler for browser sessions
//!
//! [`BrowserMcpService`] is the protocol handler each backend instance runs.
//! It is built from the host [`Config`] and reports the browser launch
//! settings it resolved from it. Page automation itself lives outside this
//! crate; the service advertises the enabled capability groups so clients
//! can see what an instance was configured with.

use crate::config::{Capability, Config};
use crate::error::InstanceError;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router};
use serde::Serialize;
use std::sync::Arc;

/// Browser engine and release channel resolved from `--browser`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSelection {
    pub browser_name: &'static str,
    pub channel: Option<String>,
}

impl BrowserSelection {
    /// Chrome and Edge channels run on chromium; no selector means stable Chrome
    pub fn resolve(browser: Option<&str>) -> Self {
        match browser {
            Some(
                channel @ ("chrome" | "chrome-beta" | "chrome-canary" | "chrome-dev" | "msedge"
                | "msedge-beta" | "msedge-canary" | "msedge-dev"),
            ) => Self {
                browser_name: "chromium",
                channel: Some(channel.to_string()),
            },
            Some("chromium") => Self {
                browser_name: "chromium",
                channel: None,
            },
            Some("firefox") => Self {
                browser_name: "firefox",
                channel: None,
            },
            Some("webkit") => Self {
                browser_name: "webkit",
                channel: None,
            },
            _ => Self {
                browser_name: "chromium",
                channel: Some("chrome".to_string()),
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigReport<'a> {
    launch: &'a BrowserSelection,
    #[serde(flatten)]
    config: &'a Config,
}

#[derive(Debug, Clone)]
pub struct BrowserMcpService {
    config: Arc<Config>,
    browser: BrowserSelection,
    tool_router: ToolRouter<Self>,
}

impl BrowserMcpService {
    /// Create a service for one backend instance
    ///
    /// # Errors
    ///
    /// * `InstanceError::Creation` - `executable_path` is set but does not exist
    pub fn new(config: Config) -> Result<Self, InstanceError> {
        if let Some(path) = &config.executable_path {
            if !path.exists() {
                return Err(InstanceError::Creation(format!(
                    "Browser executable not found: {}",
                    path.display()
                )));
            }
        }

        let browser = BrowserSelection::resolve(config.browser.as_deref());

        Ok(Self {
            config: Arc::new(config),
            browser,
            tool_router: Self::tool_router(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn browser(&self) -> &BrowserSelection {
        &self.browser
    }

    fn config_report(&self) -> String {
        let report = ConfigReport {
            launch: &self.browser,
            config: &self.config,
        };
        serde_json::to_string_pretty(&report)
            .unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
    }
}

#[tool_router]
impl BrowserMcpService {
    #[tool(description = "Report the browser launch configuration of this server")]
    pub async fn browser_config(&self) -> String {
        self.config_report()
    }
}

#[tool_handler]
impl ServerHandler for BrowserMcpService {
    fn get_info(&self) -> ServerInfo {
        let capabilities = self
            .config
            .capabilities
            .iter()
            .map(Capability::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "browsermcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                website_url: None,
                icons: None,
            },
            instructions: Some(format!(
                "Browser automation server ({}), capabilities: {}",
                self.browser.browser_name, capabilities
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_resolve_channels() {
        assert_eq!(
            BrowserSelection::resolve(Some("msedge")),
            BrowserSelection {
                browser_name: "chromium",
                channel: Some("msedge".to_string())
            }
        );
        assert_eq!(BrowserSelection::resolve(Some("firefox")).channel, None);
        assert_eq!(
            BrowserSelection::resolve(None).channel.as_deref(),
            Some("chrome")
        );
    }

    #[test]
    fn test_missing_executable_fails_creation() {
        let config = Config {
            executable_path: Some(PathBuf::from("/definitely/not/a/browser")),
            ..Config::default()
        };
        let err = BrowserMcpService::new(config).unwrap_err();
        assert!(matches!(err, InstanceError::Creation(_)));
    }

    #[test]
    fn test_config_report_includes_selection() {
        let service = BrowserMcpService::new(Config {
            browser: Some("webkit".to_string()),
            headless: true,
            ..Config::default()
        })
        .unwrap();

        let report: serde_json::Value = serde_json::from_str(&service.config_report()).unwrap();
        assert_eq!(report["launch"]["browserName"], "webkit");
        assert_eq!(report["headless"], true);
        assert_eq!(report["browser"], "webkit");
        assert_eq!(report["capabilities"].as_array().unwrap().len(), 6);
    }
}
