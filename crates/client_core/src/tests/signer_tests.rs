use super::*;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode as HttpStatus,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::protocol::PureArgument;
use tokio::{net::TcpListener, sync::Mutex};

const DIGEST: &str = "9gXbdKsnbbYFQ3gNxXkGm6UMiW2rwPnE9yyHtGBeAt8Q";

#[derive(Clone)]
struct BridgeState {
    address: Option<&'static str>,
    reject: bool,
    submitted: Arc<Mutex<Vec<Value>>>,
}

async fn handle_identity(State(state): State<BridgeState>) -> Json<Value> {
    Json(json!({ "address": state.address }))
}

async fn handle_sign(
    State(state): State<BridgeState>,
    Json(payload): Json<Value>,
) -> (HttpStatus, Json<Value>) {
    state.submitted.lock().await.push(payload);
    if state.reject {
        return (
            HttpStatus::FORBIDDEN,
            Json(json!({ "error": "user rejected the request" })),
        );
    }
    (HttpStatus::OK, Json(json!({ "digest": DIGEST })))
}

async fn spawn_bridge(
    address: Option<&'static str>,
    reject: bool,
) -> Result<(String, Arc<Mutex<Vec<Value>>>)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = BridgeState {
        address,
        reject,
        submitted: Arc::new(Mutex::new(Vec::new())),
    };
    let submitted = state.submitted.clone();
    let routes = Router::new()
        .route("/v1/identity", get(handle_identity))
        .route("/v1/sign-and-execute", post(handle_sign));
    let app = Router::new()
        .merge(routes.clone())
        .nest("/wallet", routes)
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), submitted))
}

fn request_from(sender: &str) -> MoveCallRequest {
    MoveCallRequest {
        sender: Address::new(sender),
        package: "0x79".into(),
        module: "calc".into(),
        function: "calculate".into(),
        type_arguments: Vec::new(),
        arguments: vec![
            PureArgument::u64(7),
            PureArgument::u64(5),
            PureArgument::u8(2),
        ],
    }
}

fn timeout() -> Duration {
    Duration::from_secs(5)
}

#[tokio::test]
async fn connect_queries_identity_from_bridge() {
    let (url, _) = spawn_bridge(Some("0xsender"), false)
        .await
        .expect("spawn bridge");
    let signer = RemoteSigner::connect(&url, None, timeout())
        .await
        .expect("connect");
    assert_eq!(signer.identity(), Some(Address::new("0xsender")));
}

#[tokio::test]
async fn bridge_without_account_leaves_identity_empty() {
    let (url, _) = spawn_bridge(None, false).await.expect("spawn bridge");
    let signer = RemoteSigner::connect(&url, None, timeout())
        .await
        .expect("connect");
    assert!(signer.identity().is_none());
}

#[tokio::test]
async fn unreachable_bridge_leaves_identity_empty() {
    let signer = RemoteSigner::connect("http://127.0.0.1:1", None, Duration::from_millis(500))
        .await
        .expect("connect");
    assert!(signer.identity().is_none());
}

#[tokio::test]
async fn configured_identity_skips_bridge_query() {
    let signer = RemoteSigner::connect(
        "http://127.0.0.1:1",
        Some(Address::new("0xconfigured")),
        timeout(),
    )
    .await
    .expect("connect");
    assert_eq!(signer.identity(), Some(Address::new("0xconfigured")));
}

#[tokio::test]
async fn sign_and_execute_posts_call_and_returns_digest() {
    let (url, submitted) = spawn_bridge(Some("0xsender"), false)
        .await
        .expect("spawn bridge");
    let signer = RemoteSigner::connect(&url, None, timeout())
        .await
        .expect("connect");

    let digest = signer
        .sign_and_execute(&request_from("0xsender"))
        .await
        .expect("signed");

    assert_eq!(digest, TransactionDigest::new(DIGEST));
    let submitted = submitted.lock().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0]["sender"], "0xsender");
    assert_eq!(submitted[0]["transaction"]["module"], "calc");
    assert_eq!(submitted[0]["transaction"]["arguments"][2]["value"], "2");
}

#[tokio::test]
async fn base_url_path_prefix_is_preserved() {
    let (url, submitted) = spawn_bridge(Some("0xsender"), false)
        .await
        .expect("spawn bridge");
    let signer = RemoteSigner::connect(&format!("{url}/wallet"), None, timeout())
        .await
        .expect("connect");

    assert_eq!(signer.identity(), Some(Address::new("0xsender")));
    signer
        .sign_and_execute(&request_from("0xsender"))
        .await
        .expect("signed");
    assert_eq!(submitted.lock().await.len(), 1);
}

#[tokio::test]
async fn bridge_rejection_carries_status_and_body() {
    let (url, _) = spawn_bridge(Some("0xsender"), true)
        .await
        .expect("spawn bridge");
    let signer = RemoteSigner::connect(&url, None, timeout())
        .await
        .expect("connect");

    let err = signer
        .sign_and_execute(&request_from("0xsender"))
        .await
        .expect_err("must be rejected");

    match err.downcast_ref::<SignerError>() {
        Some(SignerError::Rejected { status, message }) => {
            assert_eq!(*status, StatusCode::FORBIDDEN);
            assert!(message.contains("user rejected"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn sender_mismatch_is_refused_before_contacting_bridge() {
    let (url, submitted) = spawn_bridge(Some("0xsender"), false)
        .await
        .expect("spawn bridge");
    let signer = RemoteSigner::connect(&url, None, timeout())
        .await
        .expect("connect");

    let err = signer
        .sign_and_execute(&request_from("0xsomeone-else"))
        .await
        .expect_err("must refuse");

    assert!(matches!(
        err.downcast_ref::<SignerError>(),
        Some(SignerError::SenderMismatch { .. })
    ));
    assert!(submitted.lock().await.is_empty());
}

#[tokio::test]
async fn rejects_invalid_base_url() {
    let result = RemoteSigner::connect("::not a url::", None, timeout()).await;
    assert!(matches!(result, Err(SignerError::InvalidUrl(_))));
}
