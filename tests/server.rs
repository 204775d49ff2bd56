#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Client and server talking to each other

use rpc_protocol::core::packet::{read_frame, write_frame};
use rpc_protocol::error::RpcError;
use rpc_protocol::{Arguments, Dispatcher, Fault, Peer, ProtocolDialect, RpcClient, Server};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

fn accounts(dialect: ProtocolDialect) -> Arc<Server> {
    let dispatcher = Dispatcher::new();
    dispatcher
        .register("whoami", |_args: &Arguments| {
            let mut out = Arguments::new();
            out.insert("user".into(), json!("alice"));
            Ok(out)
        })
        .unwrap();
    dispatcher
        .register("chsh", |args: &Arguments| {
            let shell = args
                .get("shell")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Fault::invalid_argument("shell is required"))?;
            if !shell.starts_with('/') {
                return Err(Fault::invalid_argument("shell must be an absolute path"));
            }
            Ok(Arguments::new())
        })
        .unwrap();
    dispatcher
        .register("reboot", |_args: &Arguments| {
            Err(Fault::access_denied("not in group wheel"))
        })
        .unwrap();
    Arc::new(Server::with_dispatcher(dispatcher, dialect))
}

fn spawn_session(
    server: Arc<Server>,
    stream: tokio::io::DuplexStream,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut peer = Peer::from_stream(stream);
        server.serve(&mut peer).await.unwrap();
    })
}

#[tokio::test]
async fn test_full_session_current_dialect() {
    let (local, remote) = duplex(8192);
    let session = spawn_session(accounts(ProtocolDialect::Current), remote);

    let (reader, writer) = tokio::io::split(local);
    let mut client = RpcClient::from_halves(reader, writer, ProtocolDialect::Current);

    assert_eq!(
        client.methods().await.unwrap(),
        vec!["chsh", "reboot", "whoami"]
    );

    let me = client.call("whoami", &()).await.unwrap();
    assert_eq!(me.get_str("user"), Some("alice"));

    client
        .call("chsh", &json!({"shell": "/bin/zsh"}))
        .await
        .unwrap();

    let err = client
        .call("chsh", &json!({"shell": "zsh"}))
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());

    let err = client.call("reboot", &()).await.unwrap_err();
    assert!(err.is_access_denied());

    let err = client.call("format", &()).await.unwrap_err();
    assert!(err.is_unknown_function());
    assert_eq!(err.to_string(), "unknown function: format");

    client.close().await.unwrap();
    session.await.unwrap();
}

#[tokio::test]
async fn test_full_session_legacy_dialect() {
    let (local, remote) = duplex(8192);
    let session = spawn_session(accounts(ProtocolDialect::Legacy), remote);

    let (reader, writer) = tokio::io::split(local);
    let mut client = RpcClient::from_halves(reader, writer, ProtocolDialect::Legacy);

    assert_eq!(client.methods().await.unwrap().len(), 3);

    let err = client.call("format", &()).await.unwrap_err();
    assert!(err.is_unknown_function());
    assert_eq!(err.to_string(), "invalid function: format");

    client.close().await.unwrap();
    session.await.unwrap();
}

#[tokio::test]
async fn test_server_answers_garbage_payload() {
    let (local, remote) = duplex(8192);
    let session = spawn_session(accounts(ProtocolDialect::Current), remote);
    let (mut r, mut w) = tokio::io::split(local);

    write_frame(&mut w, b"not json").await.unwrap();
    let answer: serde_json::Value =
        serde_json::from_slice(&read_frame(&mut r, &mut w).await.unwrap()).unwrap();
    assert_eq!(answer["success"], false);
    assert!(answer["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid argument:"));

    w.shutdown().await.unwrap();
    session.await.unwrap();
}

#[tokio::test]
async fn test_server_rejects_foreign_client() {
    let (mut local, remote) = duplex(8192);
    let server = accounts(ProtocolDialect::Current);
    let session = tokio::spawn(async move {
        let mut peer = Peer::from_stream(remote);
        let result = server.serve(&mut peer).await;
        assert!(peer.is_closed());
        result
    });

    local.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();

    let mut reply = Vec::new();
    local.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply, b"Protocol mismatch\n");

    assert!(matches!(
        session.await.unwrap(),
        Err(RpcError::ProtocolMismatch(_))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_socket_server() {
    use rpc_protocol::transport::local;
    use std::time::Duration;
    use tokio::sync::mpsc;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rpc.sock");
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

    let server = accounts(ProtocolDialect::Current);
    let server_path = path.clone();
    let handle = tokio::spawn(async move {
        local::start_server_with_shutdown(&server_path, server, shutdown_rx).await
    });

    let mut client = None;
    for _ in 0..50 {
        match local::connect(&path, ProtocolDialect::Current).await {
            Ok(c) => {
                client = Some(c);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    let mut client = client.expect("server did not come up");

    let me = client.call("whoami", &()).await.unwrap();
    assert_eq!(me.get_str("user"), Some("alice"));
    client.close().await.unwrap();

    shutdown_tx.send(()).await.unwrap();
    handle.await.unwrap().unwrap();
    assert!(!path.exists());
}
