//! Integration tests for the funnel session API and the notify relay.
//!
//! Each test spins up an Axum server on a random port and exercises the real
//! HTTP contract with reqwest, substituting stub store/push clients for the
//! external services.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::timeout;

use lead_funnel::config::FunnelTiming;
use lead_funnel::error::{NotifyError, StoreError};
use lead_funnel::funnel::model::LeadRecord;
use lead_funnel::funnel::routes::funnel_routes;
use lead_funnel::notify::{PushClient, notify_routes};
use lead_funnel::store::LeadStore;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

// ── Stubs ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct StubStore {
    inserts: Mutex<Vec<LeadRecord>>,
    fail: AtomicBool,
}

#[async_trait]
impl LeadStore for StubStore {
    async fn insert_lead(&self, record: &LeadRecord) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Request("stub store down".to_string()));
        }
        self.inserts.lock().await.push(record.clone());
        Ok(())
    }
}

/// Recorded outbound push call: (token, title, content).
type PushCall = (String, String, String);

struct StubPush {
    calls: Mutex<Vec<PushCall>>,
    fail: AtomicBool,
    response: Value,
}

impl StubPush {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            response: serde_json::json!({ "code": 200, "msg": "请求成功" }),
        })
    }
}

#[async_trait]
impl PushClient for StubPush {
    async fn push(
        &self,
        token: &SecretString,
        title: &str,
        content: &str,
    ) -> Result<Value, NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Request("stub push down".to_string()));
        }
        self.calls.lock().await.push((
            token.expose_secret().to_string(),
            title.to_string(),
            content.to_string(),
        ));
        Ok(self.response.clone())
    }
}

// ── Harness ─────────────────────────────────────────────────────────────

/// Start the full app on a random port; returns (base_url, store, push).
async fn start_server(token: Option<&str>) -> (String, Arc<StubStore>, Arc<StubPush>) {
    let store = Arc::new(StubStore::default());
    let push = StubPush::new();

    let app = funnel_routes(
        Arc::clone(&store) as Arc<dyn LeadStore>,
        FunnelTiming::fast(),
    )
    .merge(notify_routes(
        token.map(SecretString::from),
        Arc::clone(&push) as Arc<dyn PushClient>,
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), store, push)
}

async fn post_json(url: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap();
    (status, body)
}

async fn get_json(url: &str) -> (u16, Value) {
    let resp = reqwest::get(url).await.unwrap();
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap();
    (status, body)
}

/// Create a session and walk it to the gate with the canonical answers.
async fn session_at_gate(base: &str) -> String {
    let (status, body) = post_json(&format!("{base}/api/session"), Value::Null).await;
    assert_eq!(status, 201);
    let id = body["id"].as_str().unwrap().to_string();

    let (status, _) = post_json(&format!("{base}/api/session/{id}/begin"), Value::Null).await;
    assert_eq!(status, 200);

    for option in ["大三/大四", "GPA 3.5+ / 85分+", "美国 US"] {
        let (status, _) = post_json(
            &format!("{base}/api/session/{id}/answer"),
            serde_json::json!({ "option": option }),
        )
        .await;
        assert_eq!(status, 200);
    }

    // The scripted analysis runs on fast timings; poll until the gate opens.
    loop {
        let (_, body) = get_json(&format!("{base}/api/session/{id}")).await;
        match body["state"]["phase"].as_str().unwrap() {
            "gate" => break,
            "analyzing" | "wizard" => tokio::time::sleep(Duration::from_millis(10)).await,
            other => panic!("unexpected phase before gate: {other}"),
        }
    }
    id
}

// ── Relay tests ─────────────────────────────────────────────────────────

#[tokio::test]
async fn notify_without_token_is_config_error_and_no_outbound_call() {
    timeout(TEST_TIMEOUT, async {
        let (base, _store, push) = start_server(None).await;

        let (status, body) = post_json(
            &format!("{base}/api/notify"),
            serde_json::json!({
                "phone": "13800138000",
                "country": "美国 US",
                "gpa": "GPA 3.5+ / 85分+"
            }),
        )
        .await;

        assert_eq!(status, 500);
        assert_eq!(body, serde_json::json!({ "error": "Token not configured" }));
        assert!(push.calls.lock().await.is_empty());
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn notify_passes_push_response_through() {
    timeout(TEST_TIMEOUT, async {
        let (base, _store, push) = start_server(Some("tok-123456")).await;

        let (status, body) = post_json(
            &format!("{base}/api/notify"),
            serde_json::json!({
                "phone": "13800138000",
                "country": "美国 US",
                "gpa": "GPA 3.5+ / 85分+"
            }),
        )
        .await;

        assert_eq!(status, 200);
        assert_eq!(
            body,
            serde_json::json!({
                "success": true,
                "data": { "code": 200, "msg": "请求成功" }
            })
        );

        let calls = push.calls.lock().await;
        assert_eq!(calls.len(), 1);
        let (token, title, content) = &calls[0];
        assert_eq!(token, "tok-123456");
        assert_eq!(title, "💰 新留学线索到账！");
        assert!(content.contains("13800138000"));
        assert!(content.contains("美国 US"));
        assert!(content.contains("GPA 3.5+ / 85分+"));
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn notify_push_failure_is_generic_internal_error() {
    timeout(TEST_TIMEOUT, async {
        let (base, _store, push) = start_server(Some("tok-123456")).await;
        push.fail.store(true, Ordering::SeqCst);

        let (status, body) = post_json(
            &format!("{base}/api/notify"),
            serde_json::json!({
                "phone": "13800138000",
                "country": "英国 UK",
                "gpa": "暂不清楚"
            }),
        )
        .await;

        assert_eq!(status, 500);
        assert_eq!(body, serde_json::json!({ "error": "Internal Server Error" }));
    })
    .await
    .unwrap();
}

// ── Funnel tests ────────────────────────────────────────────────────────

#[tokio::test]
async fn full_funnel_persists_the_example_lead() {
    timeout(TEST_TIMEOUT, async {
        let (base, store, _push) = start_server(None).await;
        let id = session_at_gate(&base).await;

        let (status, body) = post_json(
            &format!("{base}/api/session/{id}/submit"),
            serde_json::json!({ "phone": "13800138000" }),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["state"]["phase"], "success");

        let inserts = store.inserts.lock().await;
        assert_eq!(
            *inserts,
            vec![LeadRecord {
                phone: "13800138000".to_string(),
                target_country: "美国 US".to_string(),
                gpa: "GPA 3.5+ / 85分+".to_string(),
                status: "new".to_string(),
            }]
        );
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn invalid_phone_is_rejected_without_insert() {
    timeout(TEST_TIMEOUT, async {
        let (base, store, _push) = start_server(None).await;
        let id = session_at_gate(&base).await;

        let (status, body) = post_json(
            &format!("{base}/api/session/{id}/submit"),
            serde_json::json!({ "phone": "12345" }),
        )
        .await;
        assert_eq!(status, 422);
        assert_eq!(body["error"], "请输入正确的 11 位手机号");
        assert!(store.inserts.lock().await.is_empty());

        let (_, body) = get_json(&format!("{base}/api/session/{id}")).await;
        assert_eq!(body["state"]["phase"], "gate");
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn failed_insert_keeps_gate_open_for_retry() {
    timeout(TEST_TIMEOUT, async {
        let (base, store, _push) = start_server(None).await;
        let id = session_at_gate(&base).await;

        store.fail.store(true, Ordering::SeqCst);
        let (status, body) = post_json(
            &format!("{base}/api/session/{id}/submit"),
            serde_json::json!({ "phone": "13800138000" }),
        )
        .await;
        assert_eq!(status, 502);
        assert_eq!(body["error"], "网络繁忙，请稍后重试");

        let (_, body) = get_json(&format!("{base}/api/session/{id}")).await;
        assert_eq!(body["state"]["phase"], "gate");

        store.fail.store(false, Ordering::SeqCst);
        let (status, body) = post_json(
            &format!("{base}/api/session/{id}/submit"),
            serde_json::json!({ "phone": "13800138000" }),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["state"]["phase"], "success");
        assert_eq!(store.inserts.lock().await.len(), 1);
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn options_follow_the_wizard_step() {
    timeout(TEST_TIMEOUT, async {
        let (base, _store, _push) = start_server(None).await;

        let (_, body) = post_json(&format!("{base}/api/session"), Value::Null).await;
        let id = body["id"].as_str().unwrap().to_string();

        // No options on the landing page
        let (status, _) = get_json(&format!("{base}/api/session/{id}/options")).await;
        assert_eq!(status, 409);

        post_json(&format!("{base}/api/session/{id}/begin"), Value::Null).await;
        let (status, body) = get_json(&format!("{base}/api/session/{id}/options")).await;
        assert_eq!(status, 200);
        assert_eq!(body["step"], "grade");
        assert_eq!(body["options"].as_array().unwrap().len(), 4);

        post_json(
            &format!("{base}/api/session/{id}/answer"),
            serde_json::json!({ "option": "已毕业工作" }),
        )
        .await;
        post_json(
            &format!("{base}/api/session/{id}/answer"),
            serde_json::json!({ "option": "GPA 3.0-3.5 / 80-85" }),
        )
        .await;
        let (_, body) = get_json(&format!("{base}/api/session/{id}/options")).await;
        assert_eq!(body["step"], "country");
        assert_eq!(body["options"].as_array().unwrap().len(), 5);
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn free_text_answer_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let (base, _store, _push) = start_server(None).await;

        let (_, body) = post_json(&format!("{base}/api/session"), Value::Null).await;
        let id = body["id"].as_str().unwrap().to_string();
        post_json(&format!("{base}/api/session/{id}/begin"), Value::Null).await;

        let (status, _) = post_json(
            &format!("{base}/api/session/{id}/answer"),
            serde_json::json!({ "option": "DROP TABLE leads" }),
        )
        .await;
        assert_eq!(status, 422);
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn deleted_session_is_gone() {
    timeout(TEST_TIMEOUT, async {
        let (base, _store, _push) = start_server(None).await;

        let (_, body) = post_json(&format!("{base}/api/session"), Value::Null).await;
        let id = body["id"].as_str().unwrap().to_string();

        let resp = reqwest::Client::new()
            .delete(format!("{base}/api/session/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);

        let (status, _) = get_json(&format!("{base}/api/session/{id}")).await;
        assert_eq!(status, 404);
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn abandoned_session_is_swept_after_ttl() {
    timeout(TEST_TIMEOUT, async {
        let (base, _store, _push) = start_server(None).await;

        // Abandoned after creation: no further requests touch it.
        let (_, body) = post_json(&format!("{base}/api/session"), Value::Null).await;
        let abandoned = body["id"].as_str().unwrap().to_string();

        // Active in parallel: polled well within the (fast) TTL.
        let (_, body) = post_json(&format!("{base}/api/session"), Value::Null).await;
        let active = body["id"].as_str().unwrap().to_string();

        // FunnelTiming::fast has a 500ms TTL; poll the active session past
        // two sweep periods while the abandoned one goes idle.
        for _ in 0..12 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let (status, _) = get_json(&format!("{base}/api/session/{active}")).await;
            assert_eq!(status, 200);
        }

        let (status, _) = get_json(&format!("{base}/api/session/{abandoned}")).await;
        assert_eq!(status, 404);
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn unknown_session_is_404() {
    timeout(TEST_TIMEOUT, async {
        let (base, _store, _push) = start_server(None).await;
        let (status, _) = get_json(&format!(
            "{base}/api/session/00000000-0000-0000-0000-000000000000"
        ))
        .await;
        assert_eq!(status, 404);
    })
    .await
    .unwrap();
}
