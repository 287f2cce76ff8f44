//! Integration tests for the relay REST API.
//!
//! Each test spins up the relay router on a random port backed by an
//! in-memory database, plus a local webhook receiver that records what the
//! relay delivers, and exercises the real HTTP contract with reqwest.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use aria_relay::api;
use aria_relay::config::RelayConfig;
use aria_relay::dispatch::Dispatcher;
use aria_relay::routing::{RoutingEngine, RuleMatcher};
use aria_relay::store::LibSqlBackend;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Start the relay on a random port, return its base URL.
async fn start_server() -> String {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let dispatcher = Arc::new(Dispatcher::from_config(&RelayConfig::default()).unwrap());
    let engine = Arc::new(RoutingEngine::new(store, dispatcher, RuleMatcher::default()));
    let app = api::router(engine);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

/// Start a webhook receiver that records JSON bodies, return (url, bodies).
async fn start_receiver(status: StatusCode) -> (String, Arc<Mutex<Vec<Value>>>) {
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&bodies);
    let app = Router::new().fallback(move |body: String| {
        let captured = Arc::clone(&captured);
        async move {
            captured
                .lock()
                .unwrap()
                .push(serde_json::from_str(&body).unwrap_or(Value::Null));
            status
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/hook"), bodies)
}

struct Client {
    http: reqwest::Client,
    base: String,
    owner: &'static str,
}

impl Client {
    fn new(base: &str, owner: &'static str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.to_string(),
            owner,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base))
            .header(api::OWNER_HEADER, self.owner)
    }

    async fn create_rule(&self, rule: Value) -> Value {
        let resp = self
            .request(reqwest::Method::POST, "/api/rules")
            .json(&rule)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        resp.json().await.unwrap()
    }

    async fn route(&self, content: &str) -> Value {
        let resp = self
            .request(reqwest::Method::POST, "/api/route")
            .json(&json!({"content": content}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        resp.json().await.unwrap()
    }
}

#[tokio::test]
async fn health_check() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_owner_header_is_unauthorized() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let resp = reqwest::get(format!("{base}/api/rules")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn route_delivers_to_slack_and_logs() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let (hook, bodies) = start_receiver(StatusCode::OK).await;
        let client = Client::new(&base, "u1");

        let rule = client
            .create_rule(json!({
                "name": "Team updates",
                "conditions": [{"type": "contains", "value": "team"}],
                "actions": [{"channel": "slack", "destination": hook}],
                "priority": 5
            }))
            .await;
        assert_eq!(rule["is_enabled"], true);

        let report = client.route("Send update to the team").await;
        assert_eq!(report["matched_rules"], json!([rule["id"]]));
        let deliveries = report["deliveries"].as_array().unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0]["status"], "sent");
        assert_eq!(deliveries[0]["rule_id"], rule["id"]);

        assert_eq!(
            bodies.lock().unwrap().clone(),
            vec![json!({"text": "Send update to the team"})]
        );

        let logs: Value = client
            .request(reqwest::Method::GET, "/api/delivery-logs?limit=10")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(logs.as_array().unwrap().len(), 1);
        assert_eq!(logs[0]["channel"], "slack");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failing_webhook_is_reported_not_raised() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let (hook, _) = start_receiver(StatusCode::INTERNAL_SERVER_ERROR).await;
        let client = Client::new(&base, "u1");

        client
            .create_rule(json!({
                "name": "broken",
                "actions": [{"channel": "webhook", "destination": hook}]
            }))
            .await;

        let report = client.route("anything").await;
        assert_eq!(report["deliveries"][0]["status"], "failed");
        assert!(
            report["deliveries"][0]["error"]
                .as_str()
                .unwrap()
                .contains("500")
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn validation_errors_name_the_field() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = Client::new(&base, "u1");

        let resp = client
            .request(reqwest::Method::POST, "/api/rules")
            .json(&json!({
                "name": "bad",
                "conditions": [{"type": "mood", "value": "happy"}]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["field"], "conditions[0].type");

        let resp = client
            .request(reqwest::Method::POST, "/api/route")
            .json(&json!({"content": "  "}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rules_are_owner_scoped() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let alice = Client::new(&base, "alice");
        let bob = Client::new(&base, "bob");

        let rule = alice.create_rule(json!({"name": "private"})).await;
        let id = rule["id"].as_str().unwrap();

        let resp = bob
            .request(reqwest::Method::GET, &format!("/api/rules/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = bob
            .request(reqwest::Method::DELETE, &format!("/api/rules/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let listed: Value = bob
            .request(reqwest::Method::GET, "/api/rules")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(listed.as_array().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rule_lifecycle() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = Client::new(&base, "u1");

        let rule = client
            .create_rule(json!({
                "name": "greetings",
                "conditions": [{"type": "starts_with", "value": "hello"}]
            }))
            .await;
        let id = rule["id"].as_str().unwrap().to_string();

        // Dry run
        let resp: Value = client
            .request(reqwest::Method::POST, "/api/rules/test")
            .json(&json!({"rule_id": id, "content": "Hello world"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resp["matches"], true);

        // Toggle off
        let toggled: Value = client
            .request(reqwest::Method::POST, &format!("/api/rules/{id}/toggle"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(toggled["is_enabled"], false);

        // Update
        let updated: Value = client
            .request(reqwest::Method::PUT, &format!("/api/rules/{id}"))
            .json(&json!({"name": "renamed", "priority": 2}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(updated["name"], "renamed");
        assert_eq!(updated["priority"], 2);
        assert!(updated["conditions"].as_array().unwrap().is_empty());

        // Delete
        let resp = client
            .request(reqwest::Method::DELETE, &format!("/api/rules/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = client
            .request(reqwest::Method::GET, &format!("/api/rules/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn malformed_payloads_are_json_validation_errors() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = Client::new(&base, "u1");

        let resp = client
            .request(reqwest::Method::POST, "/api/route")
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["field"], "body");
        assert!(body["error"].as_str().unwrap().contains("content"));

        let resp = client
            .request(reqwest::Method::POST, "/api/rules")
            .json(&json!({
                "name": "fax",
                "actions": [{"channel": "fax", "destination": "+15550100"}]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["field"], "body");
        assert!(body["error"].is_string());

        let resp = client
            .request(reqwest::Method::POST, "/api/rules/test")
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["field"], "body");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn telegram_tokens_are_masked_and_survive_updates() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = Client::new(&base, "u1");

        let rule = client
            .create_rule(json!({
                "name": "tg",
                "actions": [{"channel": "telegram", "destination": "4242", "bot_token": "123:SECRET"}]
            }))
            .await;
        let id = rule["id"].as_str().unwrap().to_string();
        assert_eq!(rule["actions"][0]["bot_token"], "********");

        // Send the masked rule straight back.
        let mut draft = rule.clone();
        draft["name"] = json!("renamed");
        let updated: Value = client
            .request(reqwest::Method::PUT, &format!("/api/rules/{id}"))
            .json(&draft)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(updated["name"], "renamed");
        assert_eq!(updated["actions"][0]["bot_token"], "********");

        let listed = client
            .request(reqwest::Method::GET, "/api/rules")
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(!listed.contains("123:SECRET"));
    })
    .await
    .expect("test timed out");
}
