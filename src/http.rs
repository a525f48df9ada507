use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::Instrument;
use uuid::Uuid;

use crate::dashboard::{self, DashboardMetrics};
use crate::error::{ServiceError, ServiceResult};
use crate::insights::{self, InsightReport, SIMILAR_CUSTOMER_LIMIT};
use crate::intervention::{apply_step_update, generate_plan};
use crate::metrics::{current_metrics, progress};
use crate::models::{
    AccountStatus, AccountStatusUpdate, AccountType, HealthMetrics, InterventionKind,
    InterventionPlan, InterventionStep, NewInterventionPlan, PlanMetrics, StepStatus,
};
use crate::risk::{self, Analysis, Prediction};
use crate::store::ChurnStore;
use crate::webhook::{self, WebhookAction, WebhookEvent};

const ANALYSIS_ACTIVITY_LIMIT: i64 = 100;
const ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChurnStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn ChurnStore>) -> Self {
        Self { store }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/churnai-analyze", post(analyze))
        .route("/churnai-predict", post(predict))
        .route("/churnai-insights", post(customer_insights))
        .route("/churnai-intervention", post(create_intervention))
        .route("/churnai-track", post(track_intervention))
        .route("/churnai-webhook", post(handle_webhook))
        .route("/get-dashboard-metrics", post(dashboard_metrics))
        .route("/update-account-type", post(update_account_type))
        .layer(from_fn(cors_middleware))
        .layer(from_fn(request_tracing_middleware))
        .with_state(state)
}

async fn request_tracing_middleware(request: Request, next: Next) -> Response {
    let span = tracing::info_span!(
        "http.request",
        method = %request.method(),
        route = %request.uri().path(),
    );
    async move {
        let response = next.run(request).await;
        tracing::info!(status = response.status().as_u16(), "request finished");
        response
    }
    .instrument(span)
    .await
}

/// Any origin may call; preflight requests are answered here.
async fn cors_middleware(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        (StatusCode::OK, "ok").into_response()
    } else {
        next.run(request).await
    };
    let headers = response.headers_mut();
    headers.insert(
        "access-control-allow-origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    response
}

/// Bodies are read as JSON whatever the `Content-Type` header says.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> ServiceResult<T> {
    Ok(serde_json::from_slice(body)?)
}

/// Failure rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "request failed");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Failure rendered as `{"success": false, "message": message}`.
#[derive(Debug)]
pub struct ActionError(ServiceError);

impl From<ServiceError> for ActionError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "action failed");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": self.0.to_string() })),
        )
            .into_response()
    }
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub customer_id: Uuid,
}

async fn analyze(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Analysis>, ApiError> {
    let request: CustomerRequest = parse_body(&body)?;
    let store = state.store.as_ref();
    let customer = store.customer(request.customer_id).await?;
    let activities = store
        .latest_activities(customer.id, ANALYSIS_ACTIVITY_LIMIT)
        .await?;
    let subscription = store.latest_subscription(customer.id).await?;

    let analysis = risk::analyze(&customer, &activities, subscription.as_ref(), Utc::now());
    tracing::info!(customer_id = %customer.id, risk = analysis.risk, "customer analyzed");
    Ok(Json(analysis))
}

async fn predict(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Prediction>, ApiError> {
    let request: CustomerRequest = parse_body(&body)?;
    let store = state.store.as_ref();
    let customer = store.customer(request.customer_id).await?;
    let activities = store.activities(customer.id).await?;
    let subscriptions = store.subscriptions(customer.id).await?;

    let prediction = risk::predict(&activities, &subscriptions, Utc::now());
    tracing::info!(
        customer_id = %customer.id,
        risk = prediction.risk,
        confidence = prediction.confidence,
        "churn predicted"
    );
    Ok(Json(prediction))
}

async fn customer_insights(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<InsightReport>, ApiError> {
    let request: CustomerRequest = parse_body(&body)?;
    let store = state.store.as_ref();
    let customer = store.customer(request.customer_id).await?;
    let activities = store.activities(customer.id).await?;
    let subscription = store
        .latest_subscription(customer.id)
        .await?
        .ok_or_else(|| ServiceError::not_found("subscription"))?;
    let similar = store
        .similar_customers(&subscription.plan_id, customer.id, SIMILAR_CUSTOMER_LIMIT)
        .await?;

    Ok(Json(insights::generate(
        &customer,
        &activities,
        &similar,
        Utc::now(),
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub customer_id: Uuid,
    #[serde(default)]
    pub intervention_type: InterventionKind,
}

#[derive(Debug, Serialize)]
pub struct InterventionResponse {
    pub plan: InterventionPlan,
    pub success: bool,
    pub message: &'static str,
}

async fn create_intervention(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<InterventionResponse>, ActionError> {
    let request: InterventionRequest = parse_body(&body)?;
    let store = state.store.as_ref();
    let now = Utc::now();
    let customer = store.customer(request.customer_id).await?;
    let activities = store.activities(customer.id).await?;

    let draft = generate_plan(&activities, request.intervention_type, now);
    let plan = store
        .insert_plan(&NewInterventionPlan {
            customer_id: customer.id,
            kind: request.intervention_type,
            steps: draft.steps,
            metrics: Some(draft.metrics),
            created_at: now,
        })
        .await?;
    tracing::info!(
        plan_id = %plan.id,
        customer_id = %customer.id,
        kind = plan.kind.as_str(),
        steps = plan.steps.len(),
        "intervention plan created"
    );

    Ok(Json(InterventionResponse {
        plan,
        success: true,
        message: "Intervention plan created successfully",
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub intervention_id: Uuid,
    pub step_id: Option<String>,
    pub status: Option<StepStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TrackedMetrics {
    pub current: HealthMetrics,
    pub target: HealthMetrics,
    pub progress: HealthMetrics,
}

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub success: bool,
    pub message: &'static str,
    pub metrics: TrackedMetrics,
    pub steps: Vec<InterventionStep>,
}

async fn track_intervention(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TrackResponse>, ActionError> {
    let request: TrackRequest = parse_body(&body)?;
    let store = state.store.as_ref();
    let now = Utc::now();
    let plan = store.plan(request.intervention_id).await?;
    let activities = store.activities(plan.customer_id).await?;

    let mut steps = plan.steps.clone();
    if let (Some(step_id), Some(status)) = (request.step_id.as_deref(), request.status) {
        if apply_step_update(&mut steps, step_id, status, request.notes.clone())? {
            store.update_plan_steps(plan.id, &steps, now).await?;
            tracing::info!(plan_id = %plan.id, step_id, ?status, "intervention step updated");
        } else {
            tracing::debug!(plan_id = %plan.id, step_id, "no matching intervention step");
        }
    }

    let current = current_metrics(&activities, now);
    let target = plan.metrics.map(|m| m.target).unwrap_or_default();
    store
        .update_plan_metrics(plan.id, &PlanMetrics { target, current }, now)
        .await?;

    Ok(Json(TrackResponse {
        success: true,
        message: "Intervention tracking updated successfully",
        metrics: TrackedMetrics {
            current,
            target,
            progress: progress(&current, &target),
        },
        steps,
    }))
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message: &'static str,
    pub actions: Vec<WebhookAction>,
}

async fn handle_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ActionError> {
    let event: WebhookEvent = parse_body(&body)?;
    tracing::info!(event = %event.kind, customer_id = %event.customer_id, "webhook received");
    let actions = webhook::process(state.store.as_ref(), &event, Utc::now()).await?;

    Ok(Json(WebhookResponse {
        success: true,
        message: "Webhook processed successfully",
        actions,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardRequest {
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub time_range: Option<String>,
}

async fn dashboard_metrics(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DashboardMetrics>, ApiError> {
    let request: DashboardRequest = parse_body(&body)?;
    let user_id = request
        .user_id
        .ok_or_else(|| ServiceError::invalid("User ID is required"))?;
    let store = state.store.as_ref();
    let customers = store.customers_for_user(user_id).await?;
    let billing = store.billing_metrics(user_id).await?;

    Ok(Json(dashboard::compute(&customers, billing.as_ref())))
}

#[derive(Debug, Deserialize)]
pub struct AccountTypeRequest {
    pub user_id: Option<Uuid>,
    pub account_type: Option<String>,
    pub subscription_id: Option<String>,
    pub subscription_tier: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AccountTypeResponse {
    pub data: AccountStatus,
}

async fn update_account_type(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AccountTypeResponse>, ApiError> {
    let request: AccountTypeRequest = parse_body(&body)?;
    let (Some(user_id), Some(account_type)) = (request.user_id, request.account_type.as_deref())
    else {
        return Err(ServiceError::invalid("Missing required fields").into());
    };
    let account_type: AccountType = account_type.parse()?;

    let data = state
        .store
        .upsert_account_status(
            &AccountStatusUpdate {
                user_id,
                account_type,
                subscription_id: request.subscription_id,
                subscription_tier: request.subscription_tier,
                expires_at: request.expires_at,
            },
            Utc::now(),
        )
        .await?;
    tracing::info!(%user_id, account_type = account_type.as_str(), "account type updated");

    Ok(Json(AccountTypeResponse { data }))
}
