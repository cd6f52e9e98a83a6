//! Integration tests for the rmcp-backed instance
//!
//! Speaks newline-delimited JSON-RPC to a [`BrowserServerFactory`] instance
//! over an in-process pipe, the same framing both transports use.

use browsermcp::config::{Capability, Config};
use browsermcp::mcp::{BrowserServerFactory, InstanceFactory, Transport};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};

struct Client {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Client {
    async fn send(&mut self, message: Value) {
        let mut line = message.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("response in time")
            .unwrap()
            .expect("open pipe");
        serde_json::from_str(&line).unwrap()
    }

    async fn initialize(&mut self) -> Value {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "0.1.0"}
            }
        }))
        .await;
        let response = self.recv().await;

        self.send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        response
    }
}

fn pipe() -> (Client, Transport) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_reader, server_writer) = tokio::io::split(server);
    let (client_reader, client_writer) = tokio::io::split(client);
    (
        Client {
            lines: BufReader::new(client_reader).lines(),
            writer: client_writer,
        },
        Transport::new(server_reader, server_writer),
    )
}

#[tokio::test]
async fn test_initialize_reports_server_info() {
    let factory = BrowserServerFactory::new(Config::default());
    let instance = factory.create().await.unwrap();
    let (mut client, transport) = pipe();
    instance.connect(transport).await.unwrap();

    let response = client.initialize().await;
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["serverInfo"]["name"], "browsermcp");
    assert!(response["result"]["capabilities"]["tools"].is_object());

    instance.close().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), instance.closed())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_browser_config_tool_reports_config() {
    let config = Config {
        browser: Some("firefox".to_string()),
        capabilities: [Capability::Tabs].into_iter().collect(),
        headless: true,
        ..Config::default()
    };
    let instance = BrowserServerFactory::new(config).create().await.unwrap();
    let (mut client, transport) = pipe();
    instance.connect(transport).await.unwrap();
    client.initialize().await;

    client
        .send(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .await;
    let tools = client.recv().await;
    let names: Vec<&str> = tools["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|tool| tool["name"].as_str())
        .collect();
    assert!(names.contains(&"browser_config"));

    client
        .send(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "browser_config", "arguments": {}}
        }))
        .await;
    let result = client.recv().await;
    let text = result["result"]["content"][0]["text"].as_str().unwrap();
    let report: Value = serde_json::from_str(text).unwrap();
    assert_eq!(report["launch"]["browserName"], "firefox");
    assert_eq!(report["headless"], true);
    assert_eq!(report["capabilities"], json!(["tabs"]));

    instance.close().await.unwrap();
}

#[tokio::test]
async fn test_peer_hangup_finishes_instance() {
    let instance = BrowserServerFactory::new(Config::default())
        .create()
        .await
        .unwrap();
    let (mut client, transport) = pipe();
    instance.connect(transport).await.unwrap();
    client.initialize().await;

    drop(client);

    tokio::time::timeout(Duration::from_secs(5), instance.closed())
        .await
        .unwrap();
    instance.close().await.unwrap();
}

#[tokio::test]
async fn test_connect_is_single_use() {
    let instance = BrowserServerFactory::new(Config::default())
        .create()
        .await
        .unwrap();

    let (_first, transport) = pipe();
    instance.connect(transport).await.unwrap();

    let (_second, transport) = pipe();
    assert!(instance.connect(transport).await.is_err());

    instance.close().await.unwrap();
    instance.close().await.unwrap();

    let (_third, transport) = pipe();
    assert!(instance.connect(transport).await.is_err());
}

#[tokio::test]
async fn test_missing_executable_fails_creation() {
    let config = Config {
        executable_path: Some("/nonexistent/browser".into()),
        ..Config::default()
    };
    assert!(BrowserServerFactory::new(config).create().await.is_err());
}
