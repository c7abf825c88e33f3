//! End-to-end checks of the HTTP transport and upstream pool against local
//! fake Signum nodes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use signum_notify_core::error::ApiError;
use signum_notify_core::pool::SpreadPolicy;
use signum_notify_core::types::{Nqt, SecretPhrase};
use signum_notify_core::{Config, SignumClient};

static TRACING_INIT: Once = Once::new();

fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("signum_notify_core=debug")),
            )
            .with_target(true)
            .with_test_writer()
            .try_init();
    });
}

const PHRASE: &str = "correct horse battery staple";

// ==============================================================================
// Fake Node
// ==============================================================================

struct FakeNode {
    height: u64,
    calls: AtomicUsize,
    /// Reply to transaction-creating requests.
    send_reply: Value,
}

async fn burst(
    State(node): State<Arc<FakeNode>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    node.calls.fetch_add(1, Ordering::SeqCst);
    let reply = match params.get("requestType").map(String::as_str) {
        Some("getBlockchainStatus") => json!({
            "numberOfBlocks": node.height,
            "lastBlock": "1",
            "time": 0,
        }),
        Some("getAccount") => json!({
            "account": params.get("account").cloned().unwrap_or_default(),
            "balanceNQT": "250000000",
            "name": "fake",
        }),
        Some("sendMoney") => node.send_reply.clone(),
        _ => json!({ "errorCode": 1, "errorDescription": "Incorrect request" }),
    };
    Json(reply)
}

async fn spawn_node(height: u64, send_reply: Value) -> (String, Arc<FakeNode>) {
    let node = Arc::new(FakeNode {
        height,
        calls: AtomicUsize::new(0),
        send_reply,
    });
    let app = Router::new()
        .route("/burst", get(burst).post(burst))
        .with_state(node.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake node");
    let addr = listener.local_addr().expect("fake node address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake node must serve");
    });
    (format!("http://{addr}"), node)
}

/// An address nothing listens on.
async fn dead_host() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe port");
    let addr = listener.local_addr().expect("probe address");
    drop(listener);
    format!("http://{addr}")
}

fn client(hosts: Vec<String>) -> SignumClient {
    let config = Config {
        api_hosts: hosts,
        spread_policy: SpreadPolicy::Keep,
        rng_seed: Some(5),
        request_timeout: Duration::from_secs(5),
        ..Config::default()
    };
    SignumClient::from_config(&config).expect("client must construct")
}

fn calls(node: &FakeNode) -> usize {
    node.calls.load(Ordering::SeqCst)
}

// ==============================================================================
// Tests
// ==============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn read_fails_over_past_refused_node_and_stops_at_first_answer() {
    init_tracing();
    let dead = dead_host().await;
    let (second, second_node) = spawn_node(10, json!({})).await;
    let (third, third_node) = spawn_node(10, json!({})).await;
    let client = client(vec![dead, second, third]);

    let account = client.get_account("42").await.expect("second node answers");
    assert_eq!(account.total_balance, Nqt(250_000_000));
    assert_eq!(account.display_name(), Some("fake"));
    assert_eq!(calls(&second_node), 1);
    assert_eq!(calls(&third_node), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn node_error_on_send_is_final_and_hides_the_phrase() {
    init_tracing();
    let (first, first_node) = spawn_node(
        10,
        json!({ "errorCode": 6, "errorDescription": format!("Not enough funds for secretPhrase={PHRASE}") }),
    )
    .await;
    let (second, second_node) = spawn_node(10, json!({ "transaction": "77", "broadcasted": true })).await;
    let client = client(vec![first, second]);

    let err = client
        .send_money(&SecretPhrase::new(PHRASE), "S-AAAA", 1.5, Nqt(735_000))
        .await
        .expect_err("node rejected the payment");
    assert!(matches!(err.api_error(), Some(ApiError::Domain { code: 6, .. })));
    let rendered = format!("{err} {err:?}");
    assert!(!rendered.contains("horse"), "phrase leaked: {rendered}");
    assert_eq!(calls(&first_node), 1);
    assert_eq!(calls(&second_node), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn send_fails_over_refused_node_without_leaking_url_parameters() {
    init_tracing();
    let dead = dead_host().await;
    let (live, live_node) = spawn_node(10, json!({ "transaction": "77", "broadcasted": true })).await;
    let client = client(vec![dead.clone(), live]);

    let sent = client
        .send_money(&SecretPhrase::new(PHRASE), "S-AAAA", 1.0, Nqt(735_000))
        .await
        .expect("refused connection is safe to replay");
    assert_eq!(sent.transaction.as_deref(), Some("77"));
    assert_eq!(calls(&live_node), 1);

    let only_dead = self::client(vec![dead]);
    let err = only_dead
        .send_money(&SecretPhrase::new(PHRASE), "S-AAAA", 1.0, Nqt(735_000))
        .await
        .expect_err("no node reachable");
    let rendered = format!("{err} {err:?}");
    assert!(rendered.contains("couldn't get sendMoney method"), "{rendered}");
    assert!(!rendered.contains("horse"), "phrase leaked: {rendered}");
}

#[tokio::test(flavor = "multi_thread")]
async fn rebuild_ranks_tallest_node_first_and_drops_dead_ones() {
    init_tracing();
    let dead = dead_host().await;
    let (short, _) = spawn_node(10, json!({})).await;
    let (tall, _) = spawn_node(12, json!({})).await;
    let client = client(vec![dead, short.clone(), tall.clone()]);

    assert_eq!(client.refresh_upstreams().await, 2);
    let ranked = client.pool().snapshot().await;
    let hosts: Vec<&str> = ranked.iter().map(|u| u.host.as_str()).collect();
    assert_eq!(hosts, vec![tall.as_str(), short.as_str()]);
    assert_eq!(ranked[0].observed_height, 12);
}
