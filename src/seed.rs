use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{
    ActivityKind, BillingMetrics, CustomerActivity, CustomerStatus, NewCustomer, Sentiment,
    Subscription,
};
use crate::store::ChurnStore;

/// Owner of the seeded portfolio.
pub const DEMO_USER_ID: Uuid = Uuid::from_u128(0x6f1c_2d3e_4a5b_4c6d_8e7f_9a0b1c2d3e4f);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub customers: usize,
    pub subscriptions: usize,
    pub activities: usize,
}

struct SeedCustomer {
    key: u128,
    name: &'static str,
    email: &'static str,
    status: CustomerStatus,
    plans: &'static [(&'static str, &'static str, i64)],
    features: &'static [(&'static str, i64)],
    tickets: &'static [(&'static str, i64)],
    feedback: &'static [(Sentiment, &'static str, i64)],
}

const CUSTOMERS: &[SeedCustomer] = &[
    SeedCustomer {
        key: 0x3d7f_5d6f_24f7_4e8e_8b4b_3e7e44b4a7b2,
        name: "Northwind Traders",
        email: "ops@northwind.example",
        status: CustomerStatus::Active,
        plans: &[("growth", "active", 240)],
        features: &[
            ("dashboards", 2),
            ("exports", 4),
            ("alerts", 6),
            ("reports", 9),
            ("integrations", 12),
        ],
        tickets: &[],
        feedback: &[(Sentiment::Positive, "Alerts saved our quarter close", 5)],
    },
    SeedCustomer {
        key: 0x0c22_f1f1_9184_4fd4_9b21_28c68a6a89dc,
        name: "Globex Logistics",
        email: "it@globex.example",
        status: CustomerStatus::AtRisk,
        plans: &[
            ("starter", "active", 300),
            ("growth", "active", 200),
            ("starter", "active", 120),
            ("growth", "past_due", 20),
        ],
        features: &[("dashboards", 25)],
        tickets: &[
            ("Invoices fail to sync", 2),
            ("Export times out", 4),
            ("SSO login loop", 7),
            ("Export times out again", 10),
            ("Billing page blank", 14),
        ],
        feedback: &[(Sentiment::Negative, "Considering alternatives", 3)],
    },
    SeedCustomer {
        key: 0xd5a0_a1a2_2a3c_44c2_8f73_60b7897a9dd2,
        name: "Initech",
        email: "admin@initech.example",
        status: CustomerStatus::Churned,
        plans: &[("starter", "cancelled", 180)],
        features: &[],
        tickets: &[("Cannot cancel subscription", 40)],
        feedback: &[],
    },
    SeedCustomer {
        key: 0x8b4e_0f8d_5c61_4b1a_9d2e_7f3c5a6b8d90,
        name: "Umbrella Health",
        email: "success@umbrella.example",
        status: CustomerStatus::Active,
        plans: &[("scale", "active", 60)],
        features: &[("dashboards", 1), ("reports", 3), ("alerts", 8)],
        tickets: &[("Question about audit logs", 6)],
        feedback: &[(Sentiment::Neutral, "Onboarding went fine", 20)],
    },
];

impl SeedCustomer {
    /// Stable per owner, so each user gets a separate copy of the portfolio.
    fn id_for(&self, user_id: Uuid) -> Uuid {
        Uuid::from_u128(self.key ^ user_id.as_u128())
    }

    fn email_for(&self, user_id: Uuid) -> String {
        let tag = &user_id.simple().to_string()[..8];
        match self.email.split_once('@') {
            Some((local, domain)) => format!("{local}+{tag}@{domain}"),
            None => format!("{}+{tag}", self.email),
        }
    }
}

fn activity(
    customer_id: Uuid,
    kind: ActivityKind,
    timestamp: DateTime<Utc>,
    feature_id: Option<&str>,
    sentiment: Option<Sentiment>,
    note: Option<&str>,
) -> CustomerActivity {
    CustomerActivity {
        id: Uuid::new_v4(),
        customer_id,
        kind,
        timestamp,
        feature_id: feature_id.map(str::to_string),
        sentiment,
        note: note.map(str::to_string),
    }
}

/// Writes a demo portfolio for `user_id` relative to `now`.
///
/// Customers that already exist are left untouched, so seeding twice is a no-op.
pub async fn seed(
    store: &dyn ChurnStore,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> ServiceResult<SeedSummary> {
    let mut summary = SeedSummary::default();

    for entry in CUSTOMERS {
        let customer_id = entry.id_for(user_id);
        match store.customer(customer_id).await {
            Ok(_) => {
                tracing::debug!(
                    %customer_id,
                    customer = entry.name,
                    "seed customer already present"
                );
                continue;
            }
            Err(ServiceError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        let oldest = entry.plans.first().map(|(_, _, days)| *days).unwrap_or(30);
        store
            .insert_customer(&NewCustomer {
                id: customer_id,
                user_id: Some(user_id),
                name: entry.name.to_string(),
                email: entry.email_for(user_id),
                status: entry.status,
                created_at: now - Duration::days(oldest),
            })
            .await?;
        summary.customers += 1;

        for (plan_id, status, days_ago) in entry.plans {
            let created_at = now - Duration::days(*days_ago);
            store
                .insert_subscription(&Subscription {
                    id: Uuid::new_v4(),
                    customer_id,
                    status: status.to_string(),
                    plan_id: plan_id.to_string(),
                    created_at,
                    updated_at: created_at,
                    cancelled_at: (*status == "cancelled").then_some(now - Duration::days(30)),
                })
                .await?;
            summary.subscriptions += 1;
        }

        let mut activities = Vec::new();
        for (feature, days_ago) in entry.features {
            activities.push(activity(
                customer_id,
                ActivityKind::FeatureUse,
                now - Duration::days(*days_ago),
                Some(*feature),
                None,
                None,
            ));
        }
        for (note, days_ago) in entry.tickets {
            activities.push(activity(
                customer_id,
                ActivityKind::SupportTicket,
                now - Duration::days(*days_ago),
                None,
                None,
                Some(*note),
            ));
        }
        for (sentiment, note, days_ago) in entry.feedback {
            activities.push(activity(
                customer_id,
                ActivityKind::Feedback,
                now - Duration::days(*days_ago),
                None,
                Some(*sentiment),
                Some(*note),
            ));
        }
        for item in &activities {
            store.insert_activity(item).await?;
        }
        summary.activities += activities.len();
    }

    if store.billing_metrics(user_id).await?.is_none() {
        store
            .upsert_billing_metrics(&BillingMetrics {
                user_id,
                total_revenue: 48_000,
                pending_payouts: 3_200,
                last_sync: Some(now),
            })
            .await?;
    }

    tracing::info!(
        customers = summary.customers,
        subscriptions = summary.subscriptions,
        activities = summary.activities,
        "seed complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let store = MemoryStore::new();
        let first = seed(&store, DEMO_USER_ID, now()).await.expect("seed");
        assert_eq!(first.customers, CUSTOMERS.len());
        assert!(first.activities > 0);

        let second = seed(&store, DEMO_USER_ID, now()).await.expect("reseed");
        assert_eq!(second, SeedSummary::default());

        let customers = store
            .customers_for_user(DEMO_USER_ID)
            .await
            .expect("customers");
        assert_eq!(customers.len(), CUSTOMERS.len());
        let billing = store
            .billing_metrics(DEMO_USER_ID)
            .await
            .expect("billing")
            .expect("present");
        assert_eq!(billing.total_revenue, 48_000);
    }

    #[tokio::test]
    async fn seeded_globex_reads_as_unstable() {
        let store = MemoryStore::new();
        seed(&store, DEMO_USER_ID, now()).await.expect("seed");
        let globex = store
            .customer(CUSTOMERS[1].id_for(DEMO_USER_ID))
            .await
            .expect("globex");
        assert_eq!(globex.name, "Globex Logistics");
        assert_eq!(globex.plan_id.as_deref(), Some("growth"));
        assert_eq!(globex.subscription_status.as_deref(), Some("past_due"));
        assert_eq!(globex.support_tickets, 5);
    }

    #[tokio::test]
    async fn each_user_gets_their_own_portfolio() {
        let store = MemoryStore::new();
        let other = Uuid::new_v4();
        seed(&store, DEMO_USER_ID, now()).await.expect("demo seed");
        let summary = seed(&store, other, now()).await.expect("second seed");
        assert_eq!(summary.customers, CUSTOMERS.len());

        let demo = store
            .customers_for_user(DEMO_USER_ID)
            .await
            .expect("demo customers");
        let theirs = store.customers_for_user(other).await.expect("customers");
        assert_eq!(demo.len(), CUSTOMERS.len());
        assert_eq!(theirs.len(), CUSTOMERS.len());
        assert!(theirs
            .iter()
            .all(|c| demo.iter().all(|d| d.id != c.id && d.email != c.email)));
        let tag = &other.simple().to_string()[..8];
        assert!(theirs[0].email.contains(&format!("+{tag}@")));
    }
}
