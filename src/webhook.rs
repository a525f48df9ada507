//! Lifecycle events pushed by the billing and product platforms.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::intervention::PlanTemplate;
use crate::metrics::{distinct_features, WINDOW_DAYS};
use crate::models::{
    ActivityKind, CustomerActivity, CustomerPatch, CustomerStatus, NewCustomer, Subscription,
    SubscriptionUpdate,
};
use crate::store::ChurnStore;

const SUPPORT_TICKET_TRIGGER: usize = 5;
const FEATURE_SPREAD_TRIGGER: usize = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub customer_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Triggered,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub status: ActionStatus,
}

impl WebhookAction {
    fn new(kind: &str, description: impl Into<String>, status: ActionStatus) -> Self {
        Self {
            kind: kind.to_string(),
            description: description.into(),
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    CustomerCreated,
    CustomerUpdated,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCancelled,
    SupportTicketCreated,
    FeatureUsage,
}

impl EventKind {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "customer.created" => Some(Self::CustomerCreated),
            "customer.updated" => Some(Self::CustomerUpdated),
            "subscription.created" => Some(Self::SubscriptionCreated),
            "subscription.updated" => Some(Self::SubscriptionUpdated),
            "subscription.cancelled" => Some(Self::SubscriptionCancelled),
            "support.ticket.created" => Some(Self::SupportTicketCreated),
            "feature.usage" => Some(Self::FeatureUsage),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CustomerData {
    name: String,
    email: String,
    user_id: Option<Uuid>,
    status: Option<CustomerStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct SubscriptionData {
    status: Option<String>,
    plan_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TicketData {
    subject: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UsageData {
    feature_id: Option<String>,
}

fn optional_payload<T: serde::de::DeserializeOwned + Default>(data: &Value) -> ServiceResult<T> {
    if data.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(data.clone())?)
}

async fn trigger_plan(
    store: &dyn ChurnStore,
    template: PlanTemplate,
    customer_id: Uuid,
    now: DateTime<Utc>,
    actions: &mut Vec<WebhookAction>,
) {
    match store.insert_plan(&template.build(customer_id, now)).await {
        Ok(plan) => {
            tracing::info!(plan_id = %plan.id, %customer_id, action = template.action(), "intervention plan created");
            actions.push(WebhookAction::new(
                template.action(),
                format!("{} intervention plan created successfully", template.label()),
                ActionStatus::Triggered,
            ));
        }
        Err(err) => {
            tracing::warn!(%customer_id, action = template.action(), error = %err, "intervention plan failed");
            actions.push(WebhookAction::new(
                template.action(),
                format!(
                    "Failed to create {} intervention plan",
                    template.label().to_lowercase()
                ),
                ActionStatus::Failed,
            ));
        }
    }
}

async fn recent_activity(
    store: &dyn ChurnStore,
    customer_id: Uuid,
    kind: ActivityKind,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<CustomerActivity>> {
    let cutoff = now - Duration::days(WINDOW_DAYS);
    Ok(store
        .activities(customer_id)
        .await?
        .into_iter()
        .filter(|a| a.kind == kind && a.timestamp >= cutoff)
        .collect())
}

/// Applies one event and reports every action taken.
///
/// Failing primary writes abort with an error; failing follow-up plans are
/// reported as `failed` actions instead.
pub async fn process(
    store: &dyn ChurnStore,
    event: &WebhookEvent,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<WebhookAction>> {
    let mut actions = Vec::new();
    let customer_id = event.customer_id;

    let Some(kind) = EventKind::parse(&event.kind) else {
        tracing::debug!(event = %event.kind, "unhandled webhook event");
        actions.push(WebhookAction::new(
            "unknown_event",
            format!("Unhandled event type: {}", event.kind),
            ActionStatus::Skipped,
        ));
        return Ok(actions);
    };

    match kind {
        EventKind::CustomerCreated => {
            let data: CustomerData = serde_json::from_value(event.data.clone())?;
            store
                .insert_customer(&NewCustomer {
                    id: customer_id,
                    user_id: data.user_id,
                    name: data.name,
                    email: data.email,
                    status: data.status.unwrap_or(CustomerStatus::Active),
                    created_at: event.timestamp,
                })
                .await?;
            actions.push(WebhookAction::new(
                "customer_creation",
                "Customer record created successfully",
                ActionStatus::Triggered,
            ));
        }
        EventKind::CustomerUpdated => {
            let patch: CustomerPatch = optional_payload(&event.data)?;
            let touched = store
                .update_customer(customer_id, &patch, event.timestamp)
                .await?;
            tracing::debug!(%customer_id, touched, "customer update applied");
            actions.push(WebhookAction::new(
                "customer_update",
                "Customer record updated successfully",
                ActionStatus::Triggered,
            ));
        }
        EventKind::SubscriptionCreated => {
            let data: SubscriptionData = optional_payload(&event.data)?;
            let plan_id = data
                .plan_id
                .ok_or_else(|| ServiceError::invalid("plan_id is required"))?;
            store
                .insert_subscription(&Subscription {
                    id: Uuid::new_v4(),
                    customer_id,
                    status: data.status.unwrap_or_else(|| "active".to_string()),
                    plan_id,
                    created_at: event.timestamp,
                    updated_at: event.timestamp,
                    cancelled_at: None,
                })
                .await?;
            trigger_plan(store, PlanTemplate::Welcome, customer_id, now, &mut actions).await;
            actions.push(WebhookAction::new(
                "subscription_creation",
                "Subscription record created successfully",
                ActionStatus::Triggered,
            ));
        }
        EventKind::SubscriptionUpdated => {
            let data: SubscriptionData = optional_payload(&event.data)?;
            let plan_changed = data.plan_id.is_some();
            store
                .update_subscriptions(
                    customer_id,
                    &SubscriptionUpdate {
                        status: data.status,
                        plan_id: data.plan_id,
                        cancelled_at: None,
                    },
                    event.timestamp,
                )
                .await?;
            if plan_changed {
                trigger_plan(store, PlanTemplate::PlanChange, customer_id, now, &mut actions)
                    .await;
            }
            actions.push(WebhookAction::new(
                "subscription_update",
                "Subscription record updated successfully",
                ActionStatus::Triggered,
            ));
        }
        EventKind::SubscriptionCancelled => {
            store
                .update_subscriptions(
                    customer_id,
                    &SubscriptionUpdate {
                        status: Some("cancelled".to_string()),
                        plan_id: None,
                        cancelled_at: Some(event.timestamp),
                    },
                    event.timestamp,
                )
                .await?;
            trigger_plan(store, PlanTemplate::Retention, customer_id, now, &mut actions).await;
            actions.push(WebhookAction::new(
                "subscription_cancellation",
                "Subscription record updated successfully",
                ActionStatus::Triggered,
            ));
        }
        EventKind::SupportTicketCreated => {
            let data: TicketData = optional_payload(&event.data)?;
            store
                .insert_activity(&CustomerActivity {
                    id: Uuid::new_v4(),
                    customer_id,
                    kind: ActivityKind::SupportTicket,
                    timestamp: event.timestamp,
                    feature_id: None,
                    sentiment: None,
                    note: data.subject.or(data.description),
                })
                .await?;

            match recent_activity(store, customer_id, ActivityKind::SupportTicket, now).await {
                Ok(tickets) if tickets.len() >= SUPPORT_TICKET_TRIGGER => {
                    trigger_plan(store, PlanTemplate::Support, customer_id, now, &mut actions)
                        .await;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(%customer_id, error = %err, "support check failed");
                    actions.push(WebhookAction::new(
                        "support_intervention_check",
                        "Failed to check support intervention need",
                        ActionStatus::Failed,
                    ));
                }
            }

            actions.push(WebhookAction::new(
                "support_ticket_creation",
                "Support ticket record created successfully",
                ActionStatus::Triggered,
            ));
        }
        EventKind::FeatureUsage => {
            let data: UsageData = optional_payload(&event.data)?;
            store
                .insert_activity(&CustomerActivity {
                    id: Uuid::new_v4(),
                    customer_id,
                    kind: ActivityKind::FeatureUse,
                    timestamp: event.timestamp,
                    feature_id: data.feature_id,
                    sentiment: None,
                    note: None,
                })
                .await?;

            match recent_activity(store, customer_id, ActivityKind::FeatureUse, now).await {
                Ok(usage) if distinct_features(&usage) < FEATURE_SPREAD_TRIGGER => {
                    trigger_plan(
                        store,
                        PlanTemplate::FeatureAdoption,
                        customer_id,
                        now,
                        &mut actions,
                    )
                    .await;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(%customer_id, error = %err, "feature usage check failed");
                    actions.push(WebhookAction::new(
                        "feature_usage_intervention_check",
                        "Failed to check feature usage intervention need",
                        ActionStatus::Failed,
                    ));
                }
            }

            actions.push(WebhookAction::new(
                "feature_usage",
                "Feature usage record created successfully",
                ActionStatus::Triggered,
            ));
        }
    }

    Ok(actions)
}
