use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    Active,
    Inactive,
    Churned,
    AtRisk,
}

impl CustomerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Churned => "churned",
            Self::AtRisk => "at_risk",
        }
    }
}

impl std::str::FromStr for CustomerStatus {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "churned" => Ok(Self::Churned),
            "at_risk" => Ok(Self::AtRisk),
            other => Err(ServiceError::InvalidInput(format!(
                "unknown customer status: {other}"
            ))),
        }
    }
}

/// A customer row joined with its latest subscription and activity counters.
///
/// `plan_id` and `subscription_status` come from the newest subscription;
/// `support_tickets` counts support activities and `feature_usage` counts
/// distinct features used. Stores derive these on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub status: CustomerStatus,
    pub plan_id: Option<String>,
    pub subscription_status: Option<String>,
    #[serde(default)]
    pub support_tickets: i64,
    #[serde(default)]
    pub feature_usage: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub status: CustomerStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerPatch {
    pub user_id: Option<Uuid>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub status: Option<CustomerStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    FeatureUse,
    SupportTicket,
    Feedback,
    #[serde(other)]
    Other,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FeatureUse => "feature_use",
            Self::SupportTicket => "support_ticket",
            Self::Feedback => "feedback",
            Self::Other => "other",
        }
    }

    /// Unknown kinds are kept rather than rejected.
    pub fn from_db(value: &str) -> Self {
        match value {
            "feature_use" => Self::FeatureUse,
            "support_ticket" => Self::SupportTicket,
            "feedback" => Self::Feedback,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerActivity {
    pub id: Uuid,
    pub customer_id: Uuid,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub timestamp: DateTime<Utc>,
    pub feature_id: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub note: Option<String>,
}

impl CustomerActivity {
    pub fn is_positive_feedback(&self) -> bool {
        self.kind == ActivityKind::Feedback && self.sentiment == Some(Sentiment::Positive)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: String,
    pub plan_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionUpdate {
    pub status: Option<String>,
    pub plan_id: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterventionKind {
    #[default]
    Proactive,
    Reactive,
}

impl InterventionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proactive => "proactive",
            Self::Reactive => "reactive",
        }
    }
}

impl std::str::FromStr for InterventionKind {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "proactive" => Ok(Self::Proactive),
            "reactive" => Ok(Self::Reactive),
            other => Err(ServiceError::InvalidInput(format!(
                "unknown intervention type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Draft,
    Active,
    Completed,
    Cancelled,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for PlanStatus {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ServiceError::InvalidInput(format!(
                "unknown plan status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionStep {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: StepStatus,
    pub due_date: DateTime<Utc>,
    pub assigned_to: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Engagement, feature usage and satisfaction, each on a 0-100 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetrics {
    pub engagement: f64,
    pub feature_usage: f64,
    pub satisfaction: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanMetrics {
    pub target: HealthMetrics,
    pub current: HealthMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionPlan {
    pub id: Uuid,
    pub customer_id: Uuid,
    #[serde(rename = "type")]
    pub kind: InterventionKind,
    pub status: PlanStatus,
    pub steps: Vec<InterventionStep>,
    pub metrics: Option<PlanMetrics>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A plan about to be stored; stores assign the id and `draft` status.
#[derive(Debug, Clone)]
pub struct NewInterventionPlan {
    pub customer_id: Uuid,
    pub kind: InterventionKind,
    pub steps: Vec<InterventionStep>,
    pub metrics: Option<PlanMetrics>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Stable,
    Decreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Pattern,
    Prediction,
    Opportunity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Impact {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub impact: Impact,
    pub recommendation: String,
    pub confidence: u8,
    pub affected_customers: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub impact: Impact,
    pub customers: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingMetrics {
    pub user_id: Uuid,
    pub total_revenue: i64,
    pub pending_payouts: i64,
    pub last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Demo,
    Trial,
    Paid,
}

impl AccountType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Trial => "trial",
            Self::Paid => "paid",
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "demo" => Ok(Self::Demo),
            "trial" => Ok(Self::Trial),
            "paid" => Ok(Self::Paid),
            other => Err(ServiceError::InvalidInput(format!(
                "unknown account type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountStatus {
    pub user_id: Uuid,
    pub account_type: AccountType,
    pub subscription_id: Option<String>,
    pub subscription_tier: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AccountStatusUpdate {
    pub user_id: Uuid,
    pub account_type: AccountType,
    pub subscription_id: Option<String>,
    pub subscription_tier: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct CustomerScore {
    pub customer_name: String,
    pub customer_email: String,
    pub status: CustomerStatus,
    pub risk: u8,
    pub confidence: u8,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StatusSummary {
    pub status: CustomerStatus,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct ActivityNote {
    pub customer_name: String,
    pub kind: ActivityKind,
    pub timestamp: DateTime<Utc>,
    pub note: String,
}
