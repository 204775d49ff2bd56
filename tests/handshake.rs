#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Authentication handshake against a scripted remote

use async_trait::async_trait;
use rpc_protocol::auth::{decode_token, encode_token};
use rpc_protocol::core::packet::{read_frame, write_frame};
use rpc_protocol::error::{Result, RpcError};
use rpc_protocol::{AuthOptions, AuthProvider, AuthSession, ProtocolDialect, RpcClient};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::io::{duplex, DuplexStream, ReadHalf, WriteHalf};

const KEY: u8 = 0x42;

type TestClient = RpcClient<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;
type RemoteReader = ReadHalf<DuplexStream>;
type RemoteWriter = WriteHalf<DuplexStream>;

/// Provider with a fixed initial token that answers challenges by reversing
/// them and seals by XOR.
#[derive(Clone, Default)]
struct ScriptedProvider {
    sessions: Arc<Mutex<Vec<AuthSession>>>,
    challenges: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[async_trait]
impl AuthProvider for ScriptedProvider {
    async fn start(&mut self, session: &AuthSession) -> Result<Vec<u8>> {
        self.sessions.lock().unwrap().push(session.clone());
        Ok(b"init".to_vec())
    }

    async fn step(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        self.challenges.lock().unwrap().push(challenge.to_vec());
        Ok(challenge.iter().rev().copied().collect())
    }

    async fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(xor(plaintext))
    }

    async fn unseal(&mut self, sealed: &[u8]) -> Result<Vec<u8>> {
        Ok(xor(sealed))
    }
}

fn xor(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().map(|b| b ^ KEY).collect()
}

fn pair(dialect: ProtocolDialect) -> (TestClient, RemoteReader, RemoteWriter) {
    let (local, remote) = duplex(8192);
    let (reader, writer) = tokio::io::split(local);
    let client = RpcClient::from_halves(reader, writer, dialect)
        .with_service("rpc")
        .with_remote_host("rpc.example.org");
    let (r, w) = tokio::io::split(remote);
    (client, r, w)
}

async fn recv(r: &mut RemoteReader, w: &mut RemoteWriter) -> Value {
    serde_json::from_slice(&read_frame(r, w).await.unwrap()).unwrap()
}

async fn reply(w: &mut RemoteWriter, value: Value) {
    write_frame(w, &serde_json::to_vec(&value).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_current_dialect_sealed_session() {
    let (mut client, mut r, mut w) = pair(ProtocolDialect::Current);
    let provider = ScriptedProvider::default();

    let remote = tokio::spawn(async move {
        let first = recv(&mut r, &mut w).await;
        assert_eq!(first[0], "auth");
        assert_eq!(first[1]["mechanism"], "GSSAPI");
        assert_eq!(decode_token(first[1]["data"].as_str().unwrap()).unwrap(), b"init");
        assert!(first[1].get("seal").is_none());
        reply(
            &mut w,
            json!({"success": true, "finished": false, "data": encode_token(b"abc")}),
        )
        .await;

        let second = recv(&mut r, &mut w).await;
        assert_eq!(second, json!(["auth", {"data": encode_token(b"cba")}]));
        reply(
            &mut w,
            json!({"success": true, "finished": true, "seal": true, "user": "alice"}),
        )
        .await;

        // From here on every payload is sealed
        let raw = read_frame(&mut r, &mut w).await.unwrap();
        let call: Value = serde_json::from_slice(&xor(&raw)).unwrap();
        assert_eq!(call, json!(["whoami", {}]));
        let answer = serde_json::to_vec(&json!({"success": true, "user": "alice"})).unwrap();
        write_frame(&mut w, &xor(&answer)).await.unwrap();
    });

    let info = client
        .authenticate(Box::new(provider.clone()), AuthOptions::default())
        .await
        .unwrap();
    assert_eq!(info.get_str("user"), Some("alice"));
    assert!(client.is_sealed());

    let me = client.call("whoami", &()).await.unwrap();
    assert_eq!(me.get_str("user"), Some("alice"));
    remote.await.unwrap();

    assert_eq!(*provider.challenges.lock().unwrap(), vec![b"abc".to_vec()]);
    let sessions = provider.sessions.lock().unwrap();
    assert_eq!(sessions[0].service, "rpc");
    assert_eq!(sessions[0].host, "rpc.example.org");
}

#[tokio::test]
async fn test_current_dialect_defaults_to_sealing() {
    let (mut client, mut r, mut w) = pair(ProtocolDialect::Current);

    let remote = tokio::spawn(async move {
        recv(&mut r, &mut w).await;
        reply(&mut w, json!({"success": true, "finished": 1})).await;
    });

    client
        .authenticate(Box::new(ScriptedProvider::default()), AuthOptions::default())
        .await
        .unwrap();
    assert!(client.is_sealed());
    remote.await.unwrap();
}

#[tokio::test]
async fn test_seal_refused_stays_plaintext() {
    let (mut client, mut r, mut w) = pair(ProtocolDialect::Current);

    let remote = tokio::spawn(async move {
        let first = recv(&mut r, &mut w).await;
        assert_eq!(first[1]["seal"], 0);
        reply(&mut w, json!({"success": true, "finished": true, "seal": false})).await;

        let call = recv(&mut r, &mut w).await;
        assert_eq!(call, json!(["whoami", {}]));
        reply(&mut w, json!({"success": true})).await;
    });

    client
        .authenticate(
            Box::new(ScriptedProvider::default()),
            AuthOptions::default().with_seal_request(false),
        )
        .await
        .unwrap();
    assert!(!client.is_sealed());

    client.call("whoami", &()).await.unwrap();
    remote.await.unwrap();
}

#[tokio::test]
async fn test_legacy_dialect_ends_when_data_is_absent() {
    let (mut client, mut r, mut w) = pair(ProtocolDialect::Legacy);
    let provider = ScriptedProvider::default();

    let remote = tokio::spawn(async move {
        let first = recv(&mut r, &mut w).await;
        assert_eq!(first[1]["seal"], 0);
        reply(&mut w, json!({"success": true, "data": encode_token(b"xy")})).await;

        let second = recv(&mut r, &mut w).await;
        assert_eq!(second[1]["data"], encode_token(b"yx"));
        reply(&mut w, json!({"success": true, "data": encode_token(b"12")})).await;

        let third = recv(&mut r, &mut w).await;
        assert_eq!(third[1]["data"], encode_token(b"21"));
        reply(&mut w, json!({"success": true, "user": "bob"})).await;
    });

    let info = client
        .authenticate(
            Box::new(provider.clone()),
            AuthOptions::new("DIGEST-MD5").with_authz("root"),
        )
        .await
        .unwrap();
    assert_eq!(info.get_str("user"), Some("bob"));
    assert!(!client.is_sealed());
    remote.await.unwrap();

    assert_eq!(provider.challenges.lock().unwrap().len(), 2);
    let sessions = provider.sessions.lock().unwrap();
    assert_eq!(sessions[0].mechanism, "DIGEST-MD5");
    assert_eq!(sessions[0].authz.as_deref(), Some("root"));
}

#[tokio::test]
async fn test_missing_finished_flag_is_protocol_error() {
    let (mut client, mut r, mut w) = pair(ProtocolDialect::Current);

    let remote = tokio::spawn(async move {
        recv(&mut r, &mut w).await;
        reply(&mut w, json!({"success": true, "data": encode_token(b"abc")})).await;
    });

    let err = client
        .authenticate(Box::new(ScriptedProvider::default()), AuthOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Protocol(_)), "got {err:?}");
    assert!(!client.is_sealed());
    assert!(client.auth_info().is_none());
    remote.await.unwrap();
}

#[tokio::test]
async fn test_rejection_is_authentication_error() {
    let (mut client, mut r, mut w) = pair(ProtocolDialect::Current);

    let remote = tokio::spawn(async move {
        recv(&mut r, &mut w).await;
        reply(&mut w, json!({"success": false, "error": "access denied: bad ticket"})).await;
    });

    let err = client
        .authenticate(Box::new(ScriptedProvider::default()), AuthOptions::default())
        .await
        .unwrap_err();
    match err {
        RpcError::Authentication(msg) => assert_eq!(msg, "access denied: bad ticket"),
        other => panic!("Expected Authentication error, got {other:?}"),
    }
    remote.await.unwrap();
}

#[tokio::test]
async fn test_second_authenticate_returns_cached_info() {
    let (mut client, mut r, mut w) = pair(ProtocolDialect::Current);

    let remote = tokio::spawn(async move {
        recv(&mut r, &mut w).await;
        reply(
            &mut w,
            json!({"success": true, "finished": true, "seal": false, "user": "carol"}),
        )
        .await;
    });

    let first = client
        .authenticate(Box::new(ScriptedProvider::default()), AuthOptions::default())
        .await
        .unwrap();
    remote.await.unwrap();

    // Remote is gone; a second negotiation would fail
    let provider = ScriptedProvider::default();
    let second = client
        .authenticate(Box::new(provider.clone()), AuthOptions::default())
        .await
        .unwrap();
    assert_eq!(first, second);
    assert!(provider.sessions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_transport_failure_mid_handshake_passes_through() {
    let (mut client, mut r, mut w) = pair(ProtocolDialect::Current);

    let remote = tokio::spawn(async move {
        recv(&mut r, &mut w).await;
        reply(
            &mut w,
            json!({"success": true, "finished": false, "data": encode_token(b"abc")}),
        )
        .await;
        // Take the answer, then hang up without replying
        recv(&mut r, &mut w).await;
    });

    let err = client
        .authenticate(Box::new(ScriptedProvider::default()), AuthOptions::default())
        .await
        .unwrap_err();
    remote.await.unwrap();

    assert!(matches!(err, RpcError::ConnectionClosed), "got {err:?}");
    assert!(!client.is_sealed());
    assert!(client.auth_info().is_none());
}

#[tokio::test]
async fn test_unfinished_without_challenge_is_protocol_error() {
    let (mut client, mut r, mut w) = pair(ProtocolDialect::Current);

    let remote = tokio::spawn(async move {
        recv(&mut r, &mut w).await;
        reply(&mut w, json!({"success": true, "finished": false})).await;
    });

    let err = client
        .authenticate(Box::new(ScriptedProvider::default()), AuthOptions::default())
        .await
        .unwrap_err();
    match err {
        RpcError::Protocol(msg) => assert_eq!(msg, "auth response has no challenge data"),
        other => panic!("Expected Protocol error, got {other:?}"),
    }
    assert!(!client.is_sealed());
    assert!(client.auth_info().is_none());
    remote.await.unwrap();
}

#[tokio::test]
async fn test_undecodable_challenge_is_protocol_error() {
    let (mut client, mut r, mut w) = pair(ProtocolDialect::Legacy);
    let provider = ScriptedProvider::default();

    let remote = tokio::spawn(async move {
        recv(&mut r, &mut w).await;
        reply(&mut w, json!({"success": true, "data": "!!notb64"})).await;
    });

    let err = client
        .authenticate(Box::new(provider.clone()), AuthOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Protocol(_)), "got {err:?}");
    assert!(!client.is_sealed());
    assert!(client.auth_info().is_none());
    assert!(provider.challenges.lock().unwrap().is_empty());
    remote.await.unwrap();
}
