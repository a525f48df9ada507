use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{
    AccountStatus, AccountStatusUpdate, ActivityKind, BillingMetrics, Customer,
    CustomerActivity, CustomerPatch, CustomerStatus, InterventionPlan, InterventionStep,
    NewCustomer, NewInterventionPlan, PlanMetrics, Sentiment, Subscription, SubscriptionUpdate,
};
use crate::store::ChurnStore;

const CUSTOMER_SELECT: &str = "SELECT c.id, c.user_id, c.name, c.email, c.status, \
     c.created_at, c.updated_at, s.plan_id, s.status AS subscription_status, \
     (SELECT COUNT(*) FROM churn.customer_activities a \
      WHERE a.customer_id = c.id AND a.kind = 'support_ticket') AS support_tickets, \
     (SELECT COUNT(DISTINCT a.feature_id) FROM churn.customer_activities a \
      WHERE a.customer_id = c.id AND a.kind = 'feature_use') AS feature_usage \
     FROM churn.customers c \
     LEFT JOIN LATERAL (SELECT plan_id, status FROM churn.subscriptions \
      WHERE customer_id = c.id ORDER BY created_at DESC LIMIT 1) s ON TRUE";

const ACTIVITY_COLUMNS: &str =
    "id, customer_id, kind, occurred_at, feature_id, sentiment, note";

const SUBSCRIPTION_COLUMNS: &str =
    "id, customer_id, status, plan_id, created_at, updated_at, cancelled_at";

pub async fn init_db(pool: &PgPool) -> ServiceResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn customer_from_row(row: &PgRow) -> ServiceResult<Customer> {
    let status: String = row.try_get("status")?;
    Ok(Customer {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        status: status.parse()?,
        plan_id: row.try_get("plan_id")?,
        subscription_status: row.try_get("subscription_status")?,
        support_tickets: row.try_get("support_tickets")?,
        feature_usage: row.try_get("feature_usage")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn activity_from_row(row: &PgRow) -> ServiceResult<CustomerActivity> {
    let kind: String = row.try_get("kind")?;
    let sentiment: Option<String> = row.try_get("sentiment")?;
    Ok(CustomerActivity {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        kind: ActivityKind::from_db(&kind),
        timestamp: row.try_get("occurred_at")?,
        feature_id: row.try_get("feature_id")?,
        sentiment: sentiment.as_deref().and_then(Sentiment::from_db),
        note: row.try_get("note")?,
    })
}

fn subscription_from_row(row: &PgRow) -> ServiceResult<Subscription> {
    Ok(Subscription {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        status: row.try_get("status")?,
        plan_id: row.try_get("plan_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
    })
}

fn plan_from_row(row: &PgRow) -> ServiceResult<InterventionPlan> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let steps: Json<Vec<InterventionStep>> = row.try_get("steps")?;
    let metrics: Option<Json<PlanMetrics>> = row.try_get("metrics")?;
    Ok(InterventionPlan {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        kind: kind.parse()?,
        status: status.parse()?,
        steps: steps.0,
        metrics: metrics.map(|m| m.0),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn account_from_row(row: &PgRow) -> ServiceResult<AccountStatus> {
    let account_type: String = row.try_get("account_type")?;
    Ok(AccountStatus {
        user_id: row.try_get("user_id")?,
        account_type: account_type.parse()?,
        subscription_id: row.try_get("subscription_id")?,
        subscription_tier: row.try_get("subscription_tier")?,
        expires_at: row.try_get("expires_at")?,
        last_updated_at: row.try_get("last_updated_at")?,
    })
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChurnStore for PgStore {
    async fn customer(&self, id: Uuid) -> ServiceResult<Customer> {
        let row = sqlx::query(&format!("{CUSTOMER_SELECT} WHERE c.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("customer {id}")))?;
        customer_from_row(&row)
    }

    async fn customers_for_user(&self, user_id: Uuid) -> ServiceResult<Vec<Customer>> {
        let rows = sqlx::query(&format!(
            "{CUSTOMER_SELECT} WHERE c.user_id = $1 ORDER BY c.created_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(customer_from_row).collect()
    }

    async fn similar_customers(
        &self,
        plan_id: &str,
        exclude: Uuid,
        limit: i64,
    ) -> ServiceResult<Vec<Customer>> {
        let rows = sqlx::query(&format!(
            "{CUSTOMER_SELECT} WHERE s.plan_id = $1 AND c.id <> $2 \
             ORDER BY c.created_at LIMIT $3"
        ))
        .bind(plan_id)
        .bind(exclude)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(customer_from_row).collect()
    }

    async fn insert_customer(&self, customer: &NewCustomer) -> ServiceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO churn.customers (id, user_id, name, email, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            "#,
        )
        .bind(customer.id)
        .bind(customer.user_id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(customer.status.as_str())
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_customer(
        &self,
        id: Uuid,
        patch: &CustomerPatch,
        at: DateTime<Utc>,
    ) -> ServiceResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE churn.customers
            SET user_id = COALESCE($2, user_id),
                name = COALESCE($3, name),
                email = COALESCE($4, email),
                status = COALESCE($5, status),
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(patch.user_id)
        .bind(patch.name.as_deref())
        .bind(patch.email.as_deref())
        .bind(patch.status.map(CustomerStatus::as_str))
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn activities(&self, customer_id: Uuid) -> ServiceResult<Vec<CustomerActivity>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM churn.customer_activities \
             WHERE customer_id = $1 ORDER BY occurred_at ASC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(activity_from_row).collect()
    }

    async fn latest_activities(
        &self,
        customer_id: Uuid,
        limit: i64,
    ) -> ServiceResult<Vec<CustomerActivity>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM churn.customer_activities \
             WHERE customer_id = $1 ORDER BY occurred_at DESC LIMIT $2"
        ))
        .bind(customer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(activity_from_row).collect()
    }

    async fn insert_activity(&self, activity: &CustomerActivity) -> ServiceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO churn.customer_activities
            (id, customer_id, kind, occurred_at, feature_id, sentiment, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(activity.id)
        .bind(activity.customer_id)
        .bind(activity.kind.as_str())
        .bind(activity.timestamp)
        .bind(activity.feature_id.as_deref())
        .bind(activity.sentiment.map(Sentiment::as_str))
        .bind(activity.note.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn subscriptions(&self, customer_id: Uuid) -> ServiceResult<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM churn.subscriptions \
             WHERE customer_id = $1 ORDER BY created_at ASC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(subscription_from_row).collect()
    }

    async fn latest_subscription(&self, customer_id: Uuid) -> ServiceResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM churn.subscriptions \
             WHERE customer_id = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> ServiceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO churn.subscriptions
            (id, customer_id, status, plan_id, created_at, updated_at, cancelled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.customer_id)
        .bind(&subscription.status)
        .bind(&subscription.plan_id)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .bind(subscription.cancelled_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_subscriptions(
        &self,
        customer_id: Uuid,
        update: &SubscriptionUpdate,
        at: DateTime<Utc>,
    ) -> ServiceResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE churn.subscriptions
            SET status = COALESCE($2, status),
                plan_id = COALESCE($3, plan_id),
                cancelled_at = COALESCE($4, cancelled_at),
                updated_at = $5
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .bind(update.status.as_deref())
        .bind(update.plan_id.as_deref())
        .bind(update.cancelled_at)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_plan(&self, plan: &NewInterventionPlan) -> ServiceResult<InterventionPlan> {
        let row = sqlx::query(
            r#"
            INSERT INTO churn.intervention_plans
            (id, customer_id, kind, status, steps, metrics, created_at, updated_at)
            VALUES ($1, $2, $3, 'draft', $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(plan.customer_id)
        .bind(plan.kind.as_str())
        .bind(Json(&plan.steps))
        .bind(plan.metrics.as_ref().map(Json))
        .bind(plan.created_at)
        .fetch_one(&self.pool)
        .await?;
        plan_from_row(&row)
    }

    async fn plan(&self, id: Uuid) -> ServiceResult<InterventionPlan> {
        let row = sqlx::query("SELECT * FROM churn.intervention_plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("intervention plan {id}")))?;
        plan_from_row(&row)
    }

    async fn update_plan_steps(
        &self,
        id: Uuid,
        steps: &[InterventionStep],
        at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE churn.intervention_plans SET steps = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(Json(steps))
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found(format!("intervention plan {id}")));
        }
        Ok(())
    }

    async fn update_plan_metrics(
        &self,
        id: Uuid,
        metrics: &PlanMetrics,
        at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let result = sqlx::query(
            "UPDATE churn.intervention_plans SET metrics = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(Json(metrics))
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found(format!("intervention plan {id}")));
        }
        Ok(())
    }

    async fn billing_metrics(&self, user_id: Uuid) -> ServiceResult<Option<BillingMetrics>> {
        let row = sqlx::query(
            "SELECT user_id, total_revenue, pending_payouts, last_sync \
             FROM churn.billing_metrics WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> ServiceResult<BillingMetrics> {
            Ok(BillingMetrics {
                user_id: row.try_get("user_id")?,
                total_revenue: row.try_get("total_revenue")?,
                pending_payouts: row.try_get("pending_payouts")?,
                last_sync: row.try_get("last_sync")?,
            })
        })
        .transpose()
    }

    async fn upsert_billing_metrics(&self, metrics: &BillingMetrics) -> ServiceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO churn.billing_metrics (user_id, total_revenue, pending_payouts, last_sync)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET total_revenue = EXCLUDED.total_revenue,
                pending_payouts = EXCLUDED.pending_payouts,
                last_sync = EXCLUDED.last_sync
            "#,
        )
        .bind(metrics.user_id)
        .bind(metrics.total_revenue)
        .bind(metrics.pending_payouts)
        .bind(metrics.last_sync)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_account_status(
        &self,
        update: &AccountStatusUpdate,
        at: DateTime<Utc>,
    ) -> ServiceResult<AccountStatus> {
        let row = sqlx::query(
            r#"
            INSERT INTO churn.account_status
            (user_id, account_type, subscription_id, subscription_tier, expires_at, last_updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE
            SET account_type = EXCLUDED.account_type,
                subscription_id = EXCLUDED.subscription_id,
                subscription_tier = EXCLUDED.subscription_tier,
                expires_at = EXCLUDED.expires_at,
                last_updated_at = EXCLUDED.last_updated_at
            RETURNING *
            "#,
        )
        .bind(update.user_id)
        .bind(update.account_type.as_str())
        .bind(update.subscription_id.as_deref())
        .bind(update.subscription_tier.as_deref())
        .bind(update.expires_at)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;
        account_from_row(&row)
    }
}

/// Imports activity rows from CSV, creating customers by email as needed.
/// Rows with a `source_key` seen before are skipped.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        customer_name: String,
        customer_email: String,
        user_id: Option<Uuid>,
        activity_type: String,
        feature_id: Option<String>,
        sentiment: Option<String>,
        note: Option<String>,
        occurred_at: DateTime<Utc>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let customer_id: Uuid = sqlx::query(
            r#"
            INSERT INTO churn.customers (id, user_id, name, email, status)
            VALUES ($1, $2, $3, $4, 'active')
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name,
                user_id = COALESCE(EXCLUDED.user_id, churn.customers.user_id),
                updated_at = now()
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.user_id)
        .bind(&row.customer_name)
        .bind(&row.customer_email)
        .fetch_one(pool)
        .await?
        .get("id");

        let kind = ActivityKind::from_db(&row.activity_type);
        let sentiment = row.sentiment.as_deref().and_then(Sentiment::from_db);
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO churn.customer_activities
            (id, customer_id, kind, occurred_at, feature_id, sentiment, note, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(kind.as_str())
        .bind(row.occurred_at)
        .bind(row.feature_id.as_deref())
        .bind(sentiment.map(Sentiment::as_str))
        .bind(row.note.as_deref())
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
