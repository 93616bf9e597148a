//! Echo channel over a real Unix socket, including the client binary.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::time::Duration;

use tokio::sync::watch;

use sandbox_bridge_echo::{EchoClient, EchoError, EchoServer};

struct Running {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<Result<(), EchoError>>,
}

impl Running {
    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.task.await.unwrap().unwrap();
    }
}

fn start(path: &Path) -> Running {
    let server = EchoServer::bind(path).unwrap();
    let (shutdown, rx) = watch::channel(false);
    Running {
        shutdown,
        task: tokio::spawn(server.serve(rx)),
    }
}

#[tokio::test]
async fn request_gets_prefixed_response() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("echo.sock");
    let server = start(&path);

    let client = EchoClient::new(&path);
    assert_eq!(client.request("Hello").await.unwrap(), "ECHO: Hello");
    assert_eq!(client.request("").await.unwrap(), "ECHO: ");
    assert_eq!(
        client.request("héllo wörld").await.unwrap(),
        "ECHO: héllo wörld"
    );

    server.stop().await;
    assert!(!path.exists());
}

#[tokio::test]
async fn concurrent_clients_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("echo.sock");
    let server = start(&path);

    let mut handles = Vec::new();
    for i in 0..8 {
        let client = EchoClient::new(&path);
        handles.push(tokio::spawn(async move {
            client.request(&format!("msg-{i}")).await.unwrap()
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), format!("ECHO: msg-{i}"));
    }

    server.stop().await;
}

#[tokio::test]
async fn no_listener_after_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("echo.sock");
    let server = start(&path);
    server.stop().await;

    let err = EchoClient::new(&path)
        .with_timeout(Duration::from_millis(200))
        .request("Hello")
        .await
        .unwrap_err();
    assert!(err.is_connection_unavailable(), "{err}");
}

#[tokio::test]
async fn client_binary_prints_response_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("echo.sock");
    let server = start(&path);

    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_sandbox-echo-client"))
        .arg("--socket")
        .arg(&path)
        .arg("--")
        .arg("Hello")
        .arg("there")
        .output()
        .await
        .unwrap();

    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "ECHO: Hello there\n");

    server.stop().await;
}

#[tokio::test]
async fn client_binary_fails_without_server() {
    let dir = tempfile::tempdir().unwrap();

    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_sandbox-echo-client"))
        .arg("--socket")
        .arg(dir.path().join("absent.sock"))
        .arg("--")
        .arg("Hello")
        .output()
        .await
        .unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(!output.stderr.is_empty());
}

#[tokio::test]
async fn client_binary_requires_a_message() {
    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_sandbox-echo-client"))
        .output()
        .await
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}
