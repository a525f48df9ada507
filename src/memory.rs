use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{
    AccountStatus, AccountStatusUpdate, ActivityKind, BillingMetrics, Customer,
    CustomerActivity, CustomerPatch, CustomerStatus, InterventionPlan, InterventionStep,
    NewCustomer, NewInterventionPlan, PlanMetrics, PlanStatus, Subscription, SubscriptionUpdate,
};
use crate::store::ChurnStore;

#[derive(Debug, Clone)]
struct CustomerRow {
    id: Uuid,
    user_id: Option<Uuid>,
    name: String,
    email: String,
    status: CustomerStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    customers: Vec<CustomerRow>,
    activities: Vec<CustomerActivity>,
    subscriptions: Vec<Subscription>,
    plans: Vec<InterventionPlan>,
    billing: HashMap<Uuid, BillingMetrics>,
    accounts: HashMap<Uuid, AccountStatus>,
}

impl Tables {
    fn hydrate(&self, row: &CustomerRow) -> Customer {
        let latest = self
            .subscriptions
            .iter()
            .filter(|s| s.customer_id == row.id)
            .max_by_key(|s| s.created_at);
        let own: Vec<_> = self
            .activities
            .iter()
            .filter(|a| a.customer_id == row.id)
            .collect();
        let support_tickets = own
            .iter()
            .filter(|a| a.kind == ActivityKind::SupportTicket)
            .count();
        let feature_usage = own
            .iter()
            .filter(|a| a.kind == ActivityKind::FeatureUse)
            .filter_map(|a| a.feature_id.as_deref())
            .collect::<HashSet<_>>()
            .len();

        Customer {
            id: row.id,
            user_id: row.user_id,
            name: row.name.clone(),
            email: row.email.clone(),
            status: row.status,
            plan_id: latest.map(|s| s.plan_id.clone()),
            subscription_status: latest.map(|s| s.status.clone()),
            support_tickets: support_tickets as i64,
            feature_usage: feature_usage as i64,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn require_customer(&self, id: Uuid) -> ServiceResult<()> {
        if self.customers.iter().any(|c| c.id == id) {
            Ok(())
        } else {
            Err(ServiceError::not_found(format!("customer {id}")))
        }
    }

    fn plan_mut(&mut self, id: Uuid) -> ServiceResult<&mut InterventionPlan> {
        self.plans
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ServiceError::not_found(format!("intervention plan {id}")))
    }
}

/// In-process store with the same read semantics as the Postgres one.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChurnStore for MemoryStore {
    async fn customer(&self, id: Uuid) -> ServiceResult<Customer> {
        let tables = self.tables.lock().await;
        tables
            .customers
            .iter()
            .find(|c| c.id == id)
            .map(|row| tables.hydrate(row))
            .ok_or_else(|| ServiceError::not_found(format!("customer {id}")))
    }

    async fn customers_for_user(&self, user_id: Uuid) -> ServiceResult<Vec<Customer>> {
        let tables = self.tables.lock().await;
        let mut customers: Vec<Customer> = tables
            .customers
            .iter()
            .filter(|c| c.user_id == Some(user_id))
            .map(|row| tables.hydrate(row))
            .collect();
        customers.sort_by_key(|c| c.created_at);
        Ok(customers)
    }

    async fn similar_customers(
        &self,
        plan_id: &str,
        exclude: Uuid,
        limit: i64,
    ) -> ServiceResult<Vec<Customer>> {
        let tables = self.tables.lock().await;
        let mut peers: Vec<Customer> = tables
            .customers
            .iter()
            .filter(|c| c.id != exclude)
            .map(|row| tables.hydrate(row))
            .filter(|c| c.plan_id.as_deref() == Some(plan_id))
            .collect();
        peers.sort_by_key(|c| c.created_at);
        peers.truncate(limit.max(0) as usize);
        Ok(peers)
    }

    async fn insert_customer(&self, customer: &NewCustomer) -> ServiceResult<()> {
        let mut tables = self.tables.lock().await;
        if tables
            .customers
            .iter()
            .any(|c| c.id == customer.id || c.email == customer.email)
        {
            return Err(ServiceError::invalid(format!(
                "customer {} already exists",
                customer.email
            )));
        }
        tables.customers.push(CustomerRow {
            id: customer.id,
            user_id: customer.user_id,
            name: customer.name.clone(),
            email: customer.email.clone(),
            status: customer.status,
            created_at: customer.created_at,
            updated_at: customer.created_at,
        });
        Ok(())
    }

    async fn update_customer(
        &self,
        id: Uuid,
        patch: &CustomerPatch,
        at: DateTime<Utc>,
    ) -> ServiceResult<u64> {
        let mut tables = self.tables.lock().await;
        let Some(row) = tables.customers.iter_mut().find(|c| c.id == id) else {
            return Ok(0);
        };
        if let Some(user_id) = patch.user_id {
            row.user_id = Some(user_id);
        }
        if let Some(name) = &patch.name {
            row.name = name.clone();
        }
        if let Some(email) = &patch.email {
            row.email = email.clone();
        }
        if let Some(status) = patch.status {
            row.status = status;
        }
        row.updated_at = at;
        Ok(1)
    }

    async fn activities(&self, customer_id: Uuid) -> ServiceResult<Vec<CustomerActivity>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<_> = tables
            .activities
            .iter()
            .filter(|a| a.customer_id == customer_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.timestamp);
        Ok(rows)
    }

    async fn latest_activities(
        &self,
        customer_id: Uuid,
        limit: i64,
    ) -> ServiceResult<Vec<CustomerActivity>> {
        let mut rows = self.activities(customer_id).await?;
        rows.reverse();
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn insert_activity(&self, activity: &CustomerActivity) -> ServiceResult<()> {
        let mut tables = self.tables.lock().await;
        tables.require_customer(activity.customer_id)?;
        tables.activities.push(activity.clone());
        Ok(())
    }

    async fn subscriptions(&self, customer_id: Uuid) -> ServiceResult<Vec<Subscription>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<_> = tables
            .subscriptions
            .iter()
            .filter(|s| s.customer_id == customer_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.created_at);
        Ok(rows)
    }

    async fn latest_subscription(&self, customer_id: Uuid) -> ServiceResult<Option<Subscription>> {
        Ok(self.subscriptions(customer_id).await?.pop())
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> ServiceResult<()> {
        let mut tables = self.tables.lock().await;
        tables.require_customer(subscription.customer_id)?;
        tables.subscriptions.push(subscription.clone());
        Ok(())
    }

    async fn update_subscriptions(
        &self,
        customer_id: Uuid,
        update: &SubscriptionUpdate,
        at: DateTime<Utc>,
    ) -> ServiceResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut touched = 0;
        for sub in tables
            .subscriptions
            .iter_mut()
            .filter(|s| s.customer_id == customer_id)
        {
            if let Some(status) = &update.status {
                sub.status = status.clone();
            }
            if let Some(plan_id) = &update.plan_id {
                sub.plan_id = plan_id.clone();
            }
            if update.cancelled_at.is_some() {
                sub.cancelled_at = update.cancelled_at;
            }
            sub.updated_at = at;
            touched += 1;
        }
        Ok(touched)
    }

    async fn insert_plan(&self, plan: &NewInterventionPlan) -> ServiceResult<InterventionPlan> {
        let mut tables = self.tables.lock().await;
        tables.require_customer(plan.customer_id)?;
        let stored = InterventionPlan {
            id: Uuid::new_v4(),
            customer_id: plan.customer_id,
            kind: plan.kind,
            status: PlanStatus::Draft,
            steps: plan.steps.clone(),
            metrics: plan.metrics,
            created_at: plan.created_at,
            updated_at: plan.created_at,
        };
        tables.plans.push(stored.clone());
        Ok(stored)
    }

    async fn plan(&self, id: Uuid) -> ServiceResult<InterventionPlan> {
        let mut tables = self.tables.lock().await;
        tables.plan_mut(id).map(|p| p.clone())
    }

    async fn update_plan_steps(
        &self,
        id: Uuid,
        steps: &[InterventionStep],
        at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let mut tables = self.tables.lock().await;
        let plan = tables.plan_mut(id)?;
        plan.steps = steps.to_vec();
        plan.updated_at = at;
        Ok(())
    }

    async fn update_plan_metrics(
        &self,
        id: Uuid,
        metrics: &PlanMetrics,
        at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let mut tables = self.tables.lock().await;
        let plan = tables.plan_mut(id)?;
        plan.metrics = Some(*metrics);
        plan.updated_at = at;
        Ok(())
    }

    async fn billing_metrics(&self, user_id: Uuid) -> ServiceResult<Option<BillingMetrics>> {
        Ok(self.tables.lock().await.billing.get(&user_id).cloned())
    }

    async fn upsert_billing_metrics(&self, metrics: &BillingMetrics) -> ServiceResult<()> {
        self.tables
            .lock()
            .await
            .billing
            .insert(metrics.user_id, metrics.clone());
        Ok(())
    }

    async fn upsert_account_status(
        &self,
        update: &AccountStatusUpdate,
        at: DateTime<Utc>,
    ) -> ServiceResult<AccountStatus> {
        let status = AccountStatus {
            user_id: update.user_id,
            account_type: update.account_type,
            subscription_id: update.subscription_id.clone(),
            subscription_tier: update.subscription_tier.clone(),
            expires_at: update.expires_at,
            last_updated_at: at,
        };
        self.tables
            .lock()
            .await
            .accounts
            .insert(update.user_id, status.clone());
        Ok(status)
    }
}
