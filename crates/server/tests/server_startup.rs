use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::{sleep, timeout};

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Create a minimal valid config with state kept under `dir`
fn minimal_config(port: u16, dir: &Path) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {}

[database]
path = "{}"

[image_cache]
dir = "{}"

[sync]
scheduler_enabled = false
"#,
        port,
        dir.join("threadwatch.db").display(),
        dir.join("images").display()
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

/// Spawn the server and return a handle
async fn spawn_server(config_path: &Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_threadwatch"))
        .env("THREADWATCH_CONFIG", config_path)
        .env("RUST_LOG", "error")
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

/// Wait for server to be ready
async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

async fn run_to_exit(config_path: &Path) -> std::process::Output {
    timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_threadwatch"))
            .env("THREADWATCH_CONFIG", config_path)
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command")
}

#[tokio::test]
async fn test_health_endpoint() {
    let port = get_available_port();
    let state_dir = TempDir::new().unwrap();
    let config = write_config(&minimal_config(port, state_dir.path()));

    let mut server = spawn_server(config.path()).await;
    assert!(wait_for_server(port, 60).await, "Server did not start in time");

    let response = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/health", port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["status"], "ok");

    assert!(state_dir.path().join("threadwatch.db").exists());

    server.kill().await.ok();
}

#[tokio::test]
async fn test_config_endpoint_returns_sanitized() {
    let port = get_available_port();
    let state_dir = TempDir::new().unwrap();
    let config = write_config(&minimal_config(port, state_dir.path()));

    let mut server = spawn_server(config.path()).await;
    assert!(wait_for_server(port, 60).await, "Server did not start in time");

    let response = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/config", port))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let json: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(json["server"]["port"], port);
    assert_eq!(json["sync"]["scheduler_enabled"], false);
    assert_eq!(json["scraper"]["webdriver_configured"], true);
    assert!(json.get("push").is_none());

    server.kill().await.ok();
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let result = run_to_exit(Path::new("/nonexistent/config.toml")).await;
    assert!(!result.status.success());
}

#[tokio::test]
async fn test_invalid_port_exits_with_error() {
    let state_dir = TempDir::new().unwrap();
    let config = write_config(&minimal_config(0, state_dir.path()));

    let result = run_to_exit(config.path()).await;
    assert!(!result.status.success());
}
