use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use churn_risk::models::{
    ActivityKind, CustomerActivity, CustomerStatus, NewCustomer, Subscription,
};
use churn_risk::{build_router, AppState, ChurnStore, MemoryStore};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

async fn spawn_app() -> (SocketAddr, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let shared: Arc<dyn ChurnStore> = store.clone();
    let app = build_router(AppState::new(shared));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    (addr, store)
}

async fn send_raw(
    addr: SocketAddr,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> (u16, String, String) {
    let headers: &[(&str, &str)] = if body.is_some() {
        &[("Content-Type", "application/json")]
    } else {
        &[]
    };
    send_raw_with_headers(addr, method, path, headers, body).await
}

async fn send_raw_with_headers(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> (u16, String, String) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    for (name, value) in headers {
        req.push_str(&format!("{name}: {value}\r\n"));
    }
    if let Some(payload) = body {
        req.push_str(&format!("Content-Length: {}\r\n", payload.len()));
    }
    req.push_str("\r\n");
    if let Some(payload) = body {
        req.push_str(payload);
    }
    stream
        .write_all(req.as_bytes())
        .await
        .expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response must have separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    (status, head.to_string(), body.to_string())
}

async fn post_json(addr: SocketAddr, path: &str, body: Value) -> (u16, Value) {
    let (status, _, body) = send_raw(addr, "POST", path, Some(&body.to_string())).await;
    let json = serde_json::from_str(&body).expect("json body");
    (status, json)
}

async fn add_customer(store: &MemoryStore, user_id: Uuid, status: CustomerStatus) -> Uuid {
    let id = Uuid::new_v4();
    store
        .insert_customer(&NewCustomer {
            id,
            user_id: Some(user_id),
            name: format!("Customer {id}"),
            email: format!("{id}@example.com"),
            status,
            created_at: Utc::now() - Duration::days(90),
        })
        .await
        .expect("insert customer");
    id
}

async fn add_subscription(store: &MemoryStore, customer_id: Uuid, plan: &str) {
    let at = Utc::now() - Duration::days(60);
    store
        .insert_subscription(&Subscription {
            id: Uuid::new_v4(),
            customer_id,
            status: "active".to_string(),
            plan_id: plan.to_string(),
            created_at: at,
            updated_at: at,
            cancelled_at: None,
        })
        .await
        .expect("insert subscription");
}

#[tokio::test]
async fn healthz_and_preflight_carry_cors_headers() {
    let (addr, _) = spawn_app().await;

    let (status, head, body) = send_raw(addr, "GET", "/healthz", None).await;
    assert_eq!(status, 200);
    assert_eq!(body, "ok");
    assert!(head
        .to_ascii_lowercase()
        .contains("access-control-allow-origin: *"));

    let (status, head, body) = send_raw(addr, "OPTIONS", "/churnai-analyze", None).await;
    assert_eq!(status, 200);
    assert_eq!(body, "ok");
    assert!(head.to_ascii_lowercase().contains(
        "access-control-allow-headers: authorization, x-client-info, apikey, content-type"
    ));
}

#[tokio::test]
async fn unknown_customer_is_a_400_with_error_envelope() {
    let (addr, _) = spawn_app().await;
    let missing = Uuid::new_v4();

    let (status, body) = post_json(addr, "/churnai-analyze", json!({"customerId": missing})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], format!("customer {missing} not found"));

    let (status, body) = post_json(addr, "/churnai-predict", json!({"customerId": missing})).await;
    assert_eq!(status, 400);
    assert!(body.get("error").is_some());
}

#[tokio::test]
async fn malformed_bodies_use_the_route_envelope() {
    let (addr, _) = spawn_app().await;

    let (status, _, body) = send_raw(addr, "POST", "/churnai-analyze", Some("{not json")).await;
    assert_eq!(status, 400);
    let body: Value = serde_json::from_str(&body).expect("json");
    assert!(body["error"].is_string());

    let (status, _, body) = send_raw(addr, "POST", "/churnai-webhook", Some("{not json")).await;
    assert_eq!(status, 400);
    let body: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(body["success"], false);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn analyze_and_predict_score_a_fresh_subscriber() {
    let (addr, store) = spawn_app().await;
    let customer = add_customer(&store, Uuid::new_v4(), CustomerStatus::Active).await;
    add_subscription(&store, customer, "growth").await;

    let (status, analysis) =
        post_json(addr, "/churnai-analyze", json!({"customerId": customer})).await;
    assert_eq!(status, 200);
    assert_eq!(analysis["risk"], 50);
    let titles: Vec<_> = analysis["insights"]
        .as_array()
        .expect("insights")
        .iter()
        .map(|i| i["title"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(titles, vec!["Low Engagement Detected", "Low Feature Adoption"]);
    assert_eq!(analysis["insights"][0]["affectedCustomers"][0], customer.to_string());

    let (status, prediction) =
        post_json(addr, "/churnai-predict", json!({"customerId": customer})).await;
    assert_eq!(status, 200);
    assert_eq!(prediction["risk"], 20);
    assert_eq!(prediction["confidence"], 20);
    assert_eq!(prediction["trend"], "stable");
    assert_eq!(prediction["factors"], json!(["Limited feature adoption"]));
}

#[tokio::test]
async fn insights_require_a_subscription() {
    let (addr, store) = spawn_app().await;
    let customer = add_customer(&store, Uuid::new_v4(), CustomerStatus::Active).await;

    let (status, body) =
        post_json(addr, "/churnai-insights", json!({"customerId": customer})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "subscription not found");

    add_subscription(&store, customer, "growth").await;
    let (status, body) =
        post_json(addr, "/churnai-insights", json!({"customerId": customer})).await;
    assert_eq!(status, 200);
    assert!(body["insights"].is_array());
    assert_eq!(body["patterns"], json!([]));
}

#[tokio::test]
async fn intervention_plan_can_be_tracked() {
    let (addr, store) = spawn_app().await;
    let customer = add_customer(&store, Uuid::new_v4(), CustomerStatus::AtRisk).await;
    store
        .insert_activity(&CustomerActivity {
            id: Uuid::new_v4(),
            customer_id: customer,
            kind: ActivityKind::FeatureUse,
            timestamp: Utc::now() - Duration::days(2),
            feature_id: Some("reports".to_string()),
            sentiment: None,
            note: None,
        })
        .await
        .expect("activity");

    let (status, created) = post_json(
        addr,
        "/churnai-intervention",
        json!({"customerId": customer, "interventionType": "reactive"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(created["success"], true);
    assert_eq!(created["message"], "Intervention plan created successfully");
    assert_eq!(created["plan"]["status"], "draft");
    assert_eq!(created["plan"]["type"], "reactive");
    let steps = created["plan"]["steps"].as_array().expect("steps");
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0]["title"], "Emergency Response Call");
    assert_eq!(steps[0]["status"], "pending");

    let plan_id = created["plan"]["id"].as_str().expect("plan id").to_string();
    let step_id = steps[0]["id"].as_str().expect("step id").to_string();

    let (status, tracked) = post_json(
        addr,
        "/churnai-track",
        json!({
            "interventionId": plan_id,
            "stepId": step_id,
            "status": "completed",
            "notes": "Call held with the account owner"
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(tracked["success"], true);
    assert_eq!(tracked["steps"][0]["status"], "completed");
    assert_eq!(
        tracked["steps"][0]["notes"],
        json!(["Call held with the account owner"])
    );
    assert_eq!(tracked["metrics"]["current"]["featureUsage"], 20.0);
    assert!(tracked["metrics"]["progress"]["engagement"].is_number());

    let (status, rejected) = post_json(
        addr,
        "/churnai-track",
        json!({"interventionId": plan_id, "stepId": step_id, "status": "in_progress"}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(rejected["success"], false);
}

#[tokio::test]
async fn tracking_an_unknown_step_still_refreshes_metrics() {
    let (addr, store) = spawn_app().await;
    let customer = add_customer(&store, Uuid::new_v4(), CustomerStatus::AtRisk).await;
    store
        .insert_activity(&CustomerActivity {
            id: Uuid::new_v4(),
            customer_id: customer,
            kind: ActivityKind::FeatureUse,
            timestamp: Utc::now() - Duration::days(1),
            feature_id: Some("exports".to_string()),
            sentiment: None,
            note: None,
        })
        .await
        .expect("activity");

    let (status, created) = post_json(
        addr,
        "/churnai-intervention",
        json!({"customerId": customer, "interventionType": "proactive"}),
    )
    .await;
    assert_eq!(status, 200);
    let plan_id: Uuid = created["plan"]["id"]
        .as_str()
        .and_then(|id| id.parse().ok())
        .expect("plan id");

    let (status, tracked) = post_json(
        addr,
        "/churnai-track",
        json!({
            "interventionId": plan_id,
            "stepId": "step-that-does-not-exist",
            "status": "completed"
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(tracked["success"], true);
    assert_eq!(tracked["steps"], created["plan"]["steps"]);
    assert_eq!(tracked["metrics"]["current"]["featureUsage"], 20.0);
    assert!(tracked["metrics"]["progress"]["featureUsage"].is_number());

    let plan = store.plan(plan_id).await.expect("plan");
    let stored = plan.metrics.expect("metrics written");
    assert_eq!(stored.current.feature_usage, 20.0);
}

#[tokio::test]
async fn bodies_parse_without_content_type() {
    let (addr, store) = spawn_app().await;
    let customer = add_customer(&store, Uuid::new_v4(), CustomerStatus::Active).await;
    add_subscription(&store, customer, "growth").await;

    let payload = json!({"customerId": customer}).to_string();
    let (status, _, body) =
        send_raw_with_headers(addr, "POST", "/churnai-analyze", &[], Some(&payload)).await;
    assert_eq!(status, 200);
    let body: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(body["risk"], 50);

    let (status, _, body) = send_raw_with_headers(
        addr,
        "POST",
        "/churnai-predict",
        &[("Content-Type", "text/plain")],
        Some(&payload),
    )
    .await;
    assert_eq!(status, 200);
    let body: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(body["trend"], "stable");
}

#[tokio::test]
async fn webhook_builds_customer_records() {
    let (addr, store) = spawn_app().await;
    let customer = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();

    let (status, body) = post_json(
        addr,
        "/churnai-webhook",
        json!({
            "type": "customer.created",
            "customerId": customer,
            "timestamp": now,
            "data": {"name": "Hooli", "email": "ops@hooli.example"}
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Webhook processed successfully");
    assert_eq!(body["actions"][0]["type"], "customer_creation");

    let (status, body) = post_json(
        addr,
        "/churnai-webhook",
        json!({
            "type": "subscription.created",
            "customerId": customer,
            "timestamp": now,
            "data": {"plan_id": "growth"}
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["actions"][0]["type"], "welcome_intervention");
    assert_eq!(body["actions"][0]["status"], "triggered");

    let loaded = store.customer(customer).await.expect("customer");
    assert_eq!(loaded.plan_id.as_deref(), Some("growth"));

    let (status, body) = post_json(
        addr,
        "/churnai-webhook",
        json!({"type": "invoice.paid", "customerId": customer, "timestamp": now}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["actions"][0]["status"], "skipped");
}

#[tokio::test]
async fn webhook_update_for_unknown_customer_succeeds() {
    let (addr, store) = spawn_app().await;
    let stranger = Uuid::new_v4();

    let (status, body) = post_json(
        addr,
        "/churnai-webhook",
        json!({
            "type": "customer.updated",
            "customerId": stranger,
            "timestamp": Utc::now().to_rfc3339(),
            "data": {"name": "Nobody"}
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["actions"][0]["type"], "customer_update");
    assert_eq!(body["actions"][0]["status"], "triggered");
    assert!(store.customer(stranger).await.is_err());
}

#[tokio::test]
async fn dashboard_metrics_need_a_user() {
    let (addr, store) = spawn_app().await;

    let (status, body) = post_json(addr, "/get-dashboard-metrics", json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "User ID is required");

    let user = Uuid::new_v4();
    add_customer(&store, user, CustomerStatus::Active).await;
    add_customer(&store, user, CustomerStatus::Churned).await;
    add_customer(&store, user, CustomerStatus::AtRisk).await;

    let (status, body) = post_json(
        addr,
        "/get-dashboard-metrics",
        json!({"userId": user, "timeRange": "30d"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["customers"]["total"], 3);
    assert_eq!(body["customers"]["atRisk"], 1);
    assert_eq!(body["churnRate"], 0.5);
    assert_eq!(body["revenueAtRisk"], 0.0);
    assert_eq!(body["revenue"]["total"], 0);
}

#[tokio::test]
async fn account_type_is_upserted() {
    let (addr, _) = spawn_app().await;

    let (status, body) = post_json(addr, "/update-account-type", json!({"account_type": "paid"})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Missing required fields");

    let user = Uuid::new_v4();
    let (status, body) = post_json(
        addr,
        "/update-account-type",
        json!({"user_id": user, "account_type": "paid", "subscription_tier": "pro"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["user_id"], user.to_string());
    assert_eq!(body["data"]["account_type"], "paid");
    assert_eq!(body["data"]["subscription_tier"], "pro");

    let (status, body) = post_json(
        addr,
        "/update-account-type",
        json!({"user_id": user, "account_type": "enterprise"}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "unknown account type: enterprise");
}
