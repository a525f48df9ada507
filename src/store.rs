use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ServiceResult;
use crate::models::{
    AccountStatus, AccountStatusUpdate, BillingMetrics, Customer, CustomerActivity,
    CustomerPatch, InterventionPlan, InterventionStep, NewCustomer, NewInterventionPlan,
    PlanMetrics, Subscription, SubscriptionUpdate,
};

/// Backend tables the handlers read and write.
///
/// Activity and subscription lists come back oldest first unless the method
/// says otherwise. Lookups by id fail with `ServiceError::NotFound`.
#[async_trait]
pub trait ChurnStore: Send + Sync + 'static {
    async fn customer(&self, id: Uuid) -> ServiceResult<Customer>;

    /// Oldest first.
    async fn customers_for_user(&self, user_id: Uuid) -> ServiceResult<Vec<Customer>>;

    /// Customers whose latest subscription is on `plan_id`, excluding `exclude`,
    /// oldest first.
    async fn similar_customers(
        &self,
        plan_id: &str,
        exclude: Uuid,
        limit: i64,
    ) -> ServiceResult<Vec<Customer>>;

    async fn insert_customer(&self, customer: &NewCustomer) -> ServiceResult<()>;

    /// Returns the number of customers touched; an unknown id touches none.
    async fn update_customer(
        &self,
        id: Uuid,
        patch: &CustomerPatch,
        at: DateTime<Utc>,
    ) -> ServiceResult<u64>;

    async fn activities(&self, customer_id: Uuid) -> ServiceResult<Vec<CustomerActivity>>;

    /// Newest first.
    async fn latest_activities(
        &self,
        customer_id: Uuid,
        limit: i64,
    ) -> ServiceResult<Vec<CustomerActivity>>;

    async fn insert_activity(&self, activity: &CustomerActivity) -> ServiceResult<()>;

    async fn subscriptions(&self, customer_id: Uuid) -> ServiceResult<Vec<Subscription>>;

    async fn latest_subscription(&self, customer_id: Uuid) -> ServiceResult<Option<Subscription>>;

    async fn insert_subscription(&self, subscription: &Subscription) -> ServiceResult<()>;

    /// Applies `update` to every subscription of the customer; returns rows touched.
    async fn update_subscriptions(
        &self,
        customer_id: Uuid,
        update: &SubscriptionUpdate,
        at: DateTime<Utc>,
    ) -> ServiceResult<u64>;

    async fn insert_plan(&self, plan: &NewInterventionPlan) -> ServiceResult<InterventionPlan>;

    async fn plan(&self, id: Uuid) -> ServiceResult<InterventionPlan>;

    async fn update_plan_steps(
        &self,
        id: Uuid,
        steps: &[InterventionStep],
        at: DateTime<Utc>,
    ) -> ServiceResult<()>;

    async fn update_plan_metrics(
        &self,
        id: Uuid,
        metrics: &PlanMetrics,
        at: DateTime<Utc>,
    ) -> ServiceResult<()>;

    async fn billing_metrics(&self, user_id: Uuid) -> ServiceResult<Option<BillingMetrics>>;

    async fn upsert_billing_metrics(&self, metrics: &BillingMetrics) -> ServiceResult<()>;

    async fn upsert_account_status(
        &self,
        update: &AccountStatusUpdate,
        at: DateTime<Utc>,
    ) -> ServiceResult<AccountStatus>;
}
