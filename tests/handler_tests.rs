//! End-to-end tests for the HTTP API.
//!
//! Each controller gets at least one scenario that drives the full router
//! (sessions included) through `oneshot`, verifying:
//! - Success envelopes carry the documented payload.
//! - Mutating endpoints refuse requests without a session and leave the
//!   graph untouched.
//! - Failure envelopes carry the documented messages.
//!
//! Run with: `cargo test --test handler_tests`

use std::sync::{Arc, Once};

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use graphjs::{
    config::{FounderConfig, GraphBackend, ServerConfig},
    graph::{Entity, Graph, GraphFlavor},
    handlers::{build_router, ServiceState},
};

// ═══════════════════════════════════════════════════════════════════════
// Test infrastructure
// ═══════════════════════════════════════════════════════════════════════

static METRICS_INIT: Once = Once::new();

fn init_metrics() {
    METRICS_INIT.call_once(|| {
        let _ = graphjs::metrics::register_metrics();
    });
}

/// Self-contained harness over a fresh in-memory graph.
struct Harness {
    state: Arc<ServiceState>,
    app: Router,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(ServerConfig {
            backend: GraphBackend::Memory,
            ..ServerConfig::default()
        })
    }

    fn with_config(cfg: ServerConfig) -> Self {
        let graph = Graph::in_memory(cfg.flavor);
        let state = Arc::new(ServiceState::with_graph(graph, cfg).expect("create state"));
        Self::from_state(state)
    }

    fn from_state(state: Arc<ServiceState>) -> Self {
        let app = build_router(state.clone());
        Self { state, app }
    }

    async fn call(&self, req: Request<Body>) -> axum::response::Response {
        self.app.clone().oneshot(req).await.unwrap()
    }

    async fn signup(&self, username: &str) -> (String, String) {
        let resp = self
            .call(get(
                &format!(
                    "/signup?username={username}&email={username}%40example.com&password=pass_word1"
                ),
                None,
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK, "signup {username}");
        let cookie = cookie_of(&resp).expect("signup sets a session cookie");
        let body = json_of(resp).await;
        (cookie, body["id"].as_str().unwrap().to_string())
    }

    fn graph_size(&self) -> (usize, usize) {
        let stats = self.state.graph.stats();
        (stats.node_count, stats.edge_count)
    }
}

// ── request helpers ──

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    request(Method::GET, uri, cookie)
}

fn post(uri: &str, cookie: Option<&str>) -> Request<Body> {
    request(Method::POST, uri, cookie)
}

fn request(method: Method, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn cookie_of(resp: &axum::response::Response) -> Option<String> {
    resp.headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

async fn json_of(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

async fn text_of(resp: axum::response::Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

async fn status_and_json(h: &Harness, req: Request<Body>) -> (StatusCode, Value) {
    let resp = h.call(req).await;
    let status = resp.status();
    (status, json_of(resp).await)
}

// ═══════════════════════════════════════════════════════════════════════
// Health & metrics
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_health_reports_installation_and_graph() {
    let h = Harness::new();
    h.signup("alice").await;

    let (status, body) = status_and_json(&h, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["installation"], "site");
    assert_eq!(body["graph"]["node_count"], 1);
}

#[tokio::test]
async fn test_probes() {
    let h = Harness::new();
    let (status, body) = status_and_json(&h, get("/health/live", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");

    let (status, body) = status_and_json(&h, get("/health/ready", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_metrics_exposes_graph_gauges() {
    init_metrics();
    let h = Harness::new();
    let resp = h.call(get("/metrics", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let text = text_of(resp).await;
    assert!(text.contains("graphjs_graph_nodes"));
    assert!(text.contains("graphjs_graph_edges"));
}

// ═══════════════════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_mutations_require_session_and_change_nothing() {
    let h = Harness::new();
    let (alice, alice_id) = h.signup("alice").await;

    let (_, thread) = status_and_json(&h, get("/startThread?title=T&message=M", Some(&alice))).await;
    let thread_id = thread["id"].as_str().unwrap().to_string();
    let (_, group) = status_and_json(&h, get("/createGroup?title=G&description=D", Some(&alice))).await;
    let group_id = group["id"].as_str().unwrap().to_string();

    let before = h.graph_size();
    let attempts = [
        "/startThread?title=T&message=M".to_string(),
        format!("/reply?id={thread_id}&message=hi"),
        format!("/editForumPost?id={thread_id}&content=new"),
        format!("/deleteForumPost?id={thread_id}"),
        "/createGroup?title=G2&description=D2".to_string(),
        format!("/setGroup?id={group_id}&title=New"),
        format!("/joinGroup?id={group_id}"),
        format!("/leaveGroup?id={group_id}"),
        "/setProfile?about=x".to_string(),
        format!("/follow?id={alice_id}"),
        format!("/unfollow?id={alice_id}"),
        "/whoami".to_string(),
    ];

    for uri in &attempts {
        let (status, body) = status_and_json(&h, get(uri, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["success"], false, "{uri}");
        assert_eq!(body["code"], "SESSION_REQUIRED", "{uri}");
    }

    assert_eq!(h.graph_size(), before);
}

#[tokio::test]
async fn test_login_logout_cycle() {
    let h = Harness::new();
    let (_, alice_id) = h.signup("alice").await;

    let (status, body) = status_and_json(&h, get("/login?username=alice&password=wrong1", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Information don't match records");

    let (status, body) = status_and_json(&h, get("/login?username=nobody&password=pass_word1", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Information don't match records");

    let resp = h
        .call(post("/login?username=ALICE&password=pass_word1", None))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = cookie_of(&resp).expect("login sets a session cookie");
    let body = json_of(resp).await;
    assert_eq!(body["id"], alice_id.as_str());

    let (status, body) = status_and_json(&h, get("/whoami", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");

    let (status, _) = status_and_json(&h, get("/logout", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = status_and_json(&h, get("/whoami", Some(&cookie))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signup_rules() {
    let h = Harness::new();
    h.signup("alice").await;

    let (status, body) = status_and_json(
        &h,
        get("/signup?username=Alice&email=a%40example.com&password=pass_word1", None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Username already exists.");

    let (status, body) = status_and_json(&h, get("/signup?username=bob", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Valid username, email and password required.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_signups_create_one_user() {
    let h = Harness::new();
    let uri = "/signup?username=alice&email=alice%40example.com&password=pass_word1";

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let app = h.app.clone();
            tokio::spawn(async move { app.oneshot(get(uri, None)).await.unwrap().status() })
        })
        .collect();
    let mut statuses = Vec::new();
    for task in tasks {
        statuses.push(task.await.unwrap());
    }

    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::OK).count(),
        1,
        "{statuses:?}"
    );
    assert!(statuses
        .iter()
        .all(|s| *s == StatusCode::OK || *s == StatusCode::CONFLICT));

    let alices = h
        .state
        .graph
        .members()
        .unwrap()
        .into_iter()
        .filter(|e| matches!(e, Entity::User(u) if u.attributes["username"] == "alice"))
        .count();
    assert_eq!(alices, 1);

    let (status, _) = status_and_json(&h, get("/login?username=alice&password=pass_word1", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_founder_is_seeded() {
    let h = Harness::with_config(ServerConfig {
        backend: GraphBackend::Memory,
        founder: Some(FounderConfig {
            username: "founder".into(),
            password: "f0under_pw".into(),
            email: "founder@example.com".into(),
        }),
        ..ServerConfig::default()
    });

    let (status, _) = status_and_json(&h, get("/login?username=founder&password=f0under_pw", None)).await;
    assert_eq!(status, StatusCode::OK);
}

// ═══════════════════════════════════════════════════════════════════════
// Forum
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_thread_conversation() {
    let h = Harness::new();
    let (alice, alice_id) = h.signup("alice").await;
    let (bob, bob_id) = h.signup("bob").await;

    let (status, body) = status_and_json(&h, get("/startThread?title=Hi&message=First", Some(&alice))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let thread_id = body["id"].as_str().unwrap().to_string();

    let (status, _) = status_and_json(
        &h,
        get(&format!("/reply?id={thread_id}&message=Second"), Some(&bob)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = status_and_json(&h, get(&format!("/getThread?id={thread_id}"), None)).await;
    assert_eq!(body["title"], "Hi");
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["id"], thread_id.as_str());
    assert_eq!(messages[0]["author"], alice_id.as_str());
    assert_eq!(messages[0]["content"], "First");
    assert_eq!(messages[1]["author"], bob_id.as_str());
    assert_eq!(messages[1]["content"], "Second");

    let (_, listing) = status_and_json(&h, get("/getThreads", None)).await;
    assert_eq!(listing["total"], 1);
    let summary = &listing["threads"][0];
    assert_eq!(summary["title"], "Hi");
    assert_eq!(summary["author"], alice_id.as_str());
    let contributors = summary["contributors"].as_object().unwrap();
    assert_eq!(contributors.len(), 2);
    assert_eq!(contributors[&alice_id]["username"], "alice");
    assert!(contributors[&bob_id].get("password").is_none());
}

#[tokio::test]
async fn test_contributors_list_author_then_repliers() {
    let h = Harness::new();
    let (carol, carol_id) = h.signup("carol").await;
    let (bob, bob_id) = h.signup("bob").await;
    let (alice, alice_id) = h.signup("alice").await;

    let (_, body) = status_and_json(&h, get("/startThread?title=T&message=M", Some(&carol))).await;
    let thread_id = body["id"].as_str().unwrap().to_string();
    for cookie in [&bob, &alice, &bob, &carol] {
        let (status, _) = status_and_json(
            &h,
            get(&format!("/reply?id={thread_id}&message=r"), Some(cookie)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, listing) = status_and_json(&h, get("/getThreads", None)).await;
    let order: Vec<&str> = listing["threads"][0]["contributors"]
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(order, vec![carol_id.as_str(), bob_id.as_str(), alice_id.as_str()]);
}

#[tokio::test]
async fn test_reads_are_idempotent() {
    let h = Harness::new();
    let (alice, alice_id) = h.signup("alice").await;
    let (_, body) = status_and_json(&h, get("/startThread?title=T&message=M", Some(&alice))).await;
    let thread_id = body["id"].as_str().unwrap().to_string();

    let before = h.graph_size();
    let (_, first) = status_and_json(&h, get(&format!("/getThread?id={thread_id}"), None)).await;
    let (_, second) = status_and_json(&h, post(&format!("/getThread?id={thread_id}"), None)).await;
    assert_eq!(first, second);

    let (_, first) = status_and_json(&h, get(&format!("/getProfile?id={alice_id}"), None)).await;
    let (_, second) = status_and_json(&h, get(&format!("/getProfile?id={alice_id}"), None)).await;
    assert_eq!(first, second);
    assert_eq!(h.graph_size(), before);
}

#[tokio::test]
async fn test_thread_listing_pagination() {
    let h = Harness::new();
    let (alice, _) = h.signup("alice").await;
    for i in 0..45 {
        let (status, _) = status_and_json(
            &h,
            get(&format!("/startThread?title=T{i}&message=M"), Some(&alice)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = status_and_json(&h, get("/getThreads", None)).await;
    assert_eq!(body["threads"].as_array().unwrap().len(), 20);
    assert_eq!(body["total"], 45);

    let (_, body) = status_and_json(&h, get("/getThreads?offset=40&count=20", None)).await;
    assert_eq!(body["threads"].as_array().unwrap().len(), 5);

    let (_, body) = status_and_json(&h, get("/getThreads?offset=45", None)).await;
    assert!(body["threads"].as_array().unwrap().is_empty());
    assert_eq!(body["total"], 45);
}

#[tokio::test]
async fn test_thread_title_and_ownership() {
    let h = Harness::new();
    let (alice, _) = h.signup("alice").await;
    let (bob, _) = h.signup("bob").await;

    let long_title = "x".repeat(81);
    let (status, body) = status_and_json(
        &h,
        get(&format!("/startThread?title={long_title}&message=M"), Some(&alice)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Title (up to 80 chars) and Message are required.");

    let (_, body) = status_and_json(&h, get("/startThread?title=T&message=M", Some(&alice))).await;
    let thread_id = body["id"].as_str().unwrap().to_string();

    let (status, _) = status_and_json(
        &h,
        get(&format!("/deleteForumPost?id={thread_id}"), Some(&bob)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = status_and_json(
        &h,
        get(&format!("/deleteForumPost?id={thread_id}"), Some(&alice)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"][0], thread_id.as_str());

    let (status, body) = status_and_json(&h, get(&format!("/getThread?id={thread_id}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Not a Thread");
}

// ═══════════════════════════════════════════════════════════════════════
// Groups
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_group_membership_scenario() {
    let h = Harness::new();
    let (alice, alice_id) = h.signup("alice").await;
    let (bob, bob_id) = h.signup("bob").await;

    let (status, body) = status_and_json(
        &h,
        get("/createGroup?title=Rustaceans&description=Crabs", Some(&alice)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let group_id = body["id"].as_str().unwrap().to_string();

    let (_, body) = status_and_json(&h, get(&format!("/fetchGroup?id={group_id}"), None)).await;
    assert_eq!(body["group"]["creator"], alice_id.as_str());
    assert_eq!(body["group"]["count"], "1");

    let (status, body) = status_and_json(&h, get(&format!("/leaveGroup?id={group_id}"), Some(&bob))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User is not a member of given Group");

    for _ in 0..2 {
        let (status, _) = status_and_json(&h, get(&format!("/joinGroup?id={group_id}"), Some(&bob))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = status_and_json(&h, get(&format!("/listMembers?id={group_id}"), None)).await;
    let members = body["members"].as_array().unwrap();
    assert_eq!(members.len(), 2);
    assert!(members.contains(&Value::from(bob_id.as_str())));

    let (_, body) = status_and_json(&h, get(&format!("/listMemberships?id={bob_id}"), None)).await;
    assert_eq!(body["groups"][0]["id"], group_id.as_str());
    assert!(body.get("total").is_none());

    let (status, _) = status_and_json(&h, get(&format!("/leaveGroup?id={group_id}"), Some(&bob))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = status_and_json(&h, get(&format!("/listMemberships?id={bob_id}"), None)).await;
    assert!(body["groups"].as_array().unwrap().is_empty());

    let (_, body) = status_and_json(&h, get("/listGroups", None)).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["groups"][0]["count"], "1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_make_one_membership() {
    let h = Harness::new();
    let (alice, _) = h.signup("alice").await;
    let (bob, bob_id) = h.signup("bob").await;
    let (_, body) = status_and_json(&h, get("/createGroup?title=G&description=D", Some(&alice))).await;
    let group_id = body["id"].as_str().unwrap().to_string();

    let uri = format!("/joinGroup?id={group_id}");
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let (app, uri, bob) = (h.app.clone(), uri.clone(), bob.clone());
            tokio::spawn(async move { app.oneshot(get(&uri, Some(&bob))).await.unwrap().status() })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    let (_, body) = status_and_json(&h, get(&format!("/fetchGroup?id={group_id}"), None)).await;
    assert_eq!(body["group"]["count"], "2");

    let (status, _) = status_and_json(&h, get(&format!("/leaveGroup?id={group_id}"), Some(&bob))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = status_and_json(&h, get(&format!("/listMemberships?id={bob_id}"), None)).await;
    assert!(body["groups"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_only_creator_edits_group() {
    let h = Harness::new();
    let (alice, _) = h.signup("alice").await;
    let (bob, _) = h.signup("bob").await;
    let (_, body) = status_and_json(&h, get("/createGroup?title=G&description=D", Some(&alice))).await;
    let group_id = body["id"].as_str().unwrap().to_string();

    let (status, _) = status_and_json(
        &h,
        get(&format!("/setGroup?id={group_id}&title=Mine"), Some(&bob)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = status_and_json(
        &h,
        get(&format!("/setGroup?id={group_id}&title=Renamed"), Some(&alice)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Following fields set successfully: title");

    let (_, body) = status_and_json(&h, get(&format!("/fetchGroup?id={group_id}"), None)).await;
    assert_eq!(body["group"]["title"], "Renamed");
}

// ═══════════════════════════════════════════════════════════════════════
// Profile
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_username_rules_on_profile_edit() {
    let h = Harness::new();
    let (alice, alice_id) = h.signup("alice").await;

    let (status, _) = status_and_json(&h, get("/setProfile?username=ab", Some(&alice))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = status_and_json(&h, get("/setProfile?username=a%20b!", Some(&alice))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid username");

    let (_, body) = status_and_json(&h, get(&format!("/getProfile?id={alice_id}"), None)).await;
    assert_eq!(body["profile"]["username"], "ab");
}

#[tokio::test]
async fn test_follow_counts() {
    let h = Harness::new();
    let (alice, _) = h.signup("alice").await;
    let (_, bob_id) = h.signup("bob").await;

    let (status, _) = status_and_json(&h, get(&format!("/follow?id={bob_id}"), Some(&alice))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = status_and_json(&h, get(&format!("/getProfile?id={bob_id}"), None)).await;
    assert_eq!(body["profile"]["follower_count"], 1);

    let (status, _) = status_and_json(&h, get(&format!("/unfollow?id={bob_id}"), Some(&alice))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = status_and_json(&h, get(&format!("/getProfile?id={bob_id}"), None)).await;
    assert_eq!(body["profile"]["follower_count"], 0);
}

#[tokio::test]
async fn test_network_installation_reports_flavor() {
    let h = Harness::with_config(ServerConfig {
        backend: GraphBackend::Memory,
        flavor: GraphFlavor::Network,
        ..ServerConfig::default()
    });
    let (_, body) = status_and_json(&h, get("/health", None)).await;
    assert_eq!(body["installation"], "network");
}

// ═══════════════════════════════════════════════════════════════════════
// Persistence
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = TempDir::new().expect("create temp dir");
    let cfg = ServerConfig {
        backend: GraphBackend::Snapshot,
        snapshot_path: dir.path().join("graph.json"),
        ..ServerConfig::default()
    };

    let thread_id = {
        let h = Harness::from_state(Arc::new(ServiceState::new(cfg.clone()).unwrap()));
        let (alice, _) = h.signup("alice").await;
        let (_, body) = status_and_json(&h, get("/startThread?title=Kept&message=M", Some(&alice))).await;
        h.state.graph.flush().unwrap();
        body["id"].as_str().unwrap().to_string()
    };

    let h = Harness::from_state(Arc::new(ServiceState::new(cfg).unwrap()));
    let (_, body) = status_and_json(&h, get(&format!("/getThread?id={thread_id}"), None)).await;
    assert_eq!(body["title"], "Kept");

    let (status, _) = status_and_json(&h, get("/login?username=alice&password=pass_word1", None)).await;
    assert_eq!(status, StatusCode::OK);
}
