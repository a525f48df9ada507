use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ServiceResult;
use crate::models::{ActivityKind, ActivityNote, Customer, CustomerScore, StatusSummary};
use crate::risk;
use crate::store::ChurnStore;

const NOTES_PER_CUSTOMER: i64 = 20;
const REPORT_CUSTOMERS: usize = 10;
const REPORT_NOTES: usize = 5;

pub fn summarize_by_status(customers: &[Customer]) -> Vec<StatusSummary> {
    let mut map: HashMap<_, usize> = HashMap::new();
    for customer in customers {
        *map.entry(customer.status).or_insert(0) += 1;
    }

    let mut summaries: Vec<StatusSummary> = map
        .into_iter()
        .map(|(status, count)| StatusSummary { status, count })
        .collect();
    summaries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.status.as_str().cmp(b.status.as_str()))
    });
    summaries
}

#[derive(Debug, Clone)]
pub struct Portfolio {
    pub customers: Vec<Customer>,
    pub scores: Vec<CustomerScore>,
    pub notes: Vec<ActivityNote>,
}

/// Predicts every customer of `user_id` and gathers their support and
/// feedback notes, newest first.
pub async fn collect_portfolio(
    store: &dyn ChurnStore,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> ServiceResult<Portfolio> {
    let customers = store.customers_for_user(user_id).await?;
    let mut scores = Vec::with_capacity(customers.len());
    let mut notes = Vec::new();

    for customer in &customers {
        let activities = store.activities(customer.id).await?;
        let subscriptions = store.subscriptions(customer.id).await?;
        let prediction = risk::predict(&activities, &subscriptions, now);
        tracing::debug!(customer_id = %customer.id, risk = prediction.risk, "scored customer");

        scores.push(CustomerScore {
            customer_name: customer.name.clone(),
            customer_email: customer.email.clone(),
            status: customer.status,
            risk: prediction.risk,
            confidence: prediction.confidence,
            factors: prediction.factors,
        });

        for activity in store
            .latest_activities(customer.id, NOTES_PER_CUSTOMER)
            .await?
        {
            if !matches!(
                activity.kind,
                ActivityKind::SupportTicket | ActivityKind::Feedback
            ) {
                continue;
            }
            if let Some(note) = activity.note {
                notes.push(ActivityNote {
                    customer_name: customer.name.clone(),
                    kind: activity.kind,
                    timestamp: activity.timestamp,
                    note,
                });
            }
        }
    }

    notes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(Portfolio {
        customers,
        scores: risk::rank_scores(scores),
        notes,
    })
}

pub fn build_report(label: &str, generated: DateTime<Utc>, portfolio: &Portfolio) -> String {
    let summaries = summarize_by_status(&portfolio.customers);

    let mut output = String::new();

    let _ = writeln!(output, "# Churn Risk Report");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        label,
        generated.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No customers recorded for this account.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} customers",
                summary.status.as_str(),
                summary.count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Customers");

    if portfolio.scores.is_empty() {
        let _ = writeln!(output, "No customers to score.");
    } else {
        for score in portfolio.scores.iter().take(REPORT_CUSTOMERS) {
            let _ = writeln!(
                output,
                "- {} ({}, {}) risk {} at {}% confidence",
                score.customer_name,
                score.customer_email,
                score.status.as_str(),
                score.risk,
                score.confidence
            );
            for factor in &score.factors {
                let _ = writeln!(output, "  - {factor}");
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Customer Notes");

    if portfolio.notes.is_empty() {
        let _ = writeln!(output, "No support or feedback notes recorded.");
    } else {
        for note in portfolio.notes.iter().take(REPORT_NOTES) {
            let _ = writeln!(
                output,
                "- {} ({}) on {}: {}",
                note.customer_name,
                note.kind.as_str(),
                note.timestamp.format("%Y-%m-%d"),
                note.note
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::{CustomerActivity, CustomerStatus, NewCustomer};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    async fn add_customer(
        store: &MemoryStore,
        user_id: Uuid,
        name: &str,
        status: CustomerStatus,
    ) -> Uuid {
        let id = Uuid::new_v4();
        store
            .insert_customer(&NewCustomer {
                id,
                user_id: Some(user_id),
                name: name.to_string(),
                email: format!("{}@example.com", name.to_lowercase()),
                status,
                created_at: now() - Duration::days(120),
            })
            .await
            .expect("insert customer");
        id
    }

    #[test]
    fn empty_portfolio_report_says_so() {
        let empty = build_report(
            "nobody",
            now(),
            &Portfolio {
                customers: Vec::new(),
                scores: Vec::new(),
                notes: Vec::new(),
            },
        );
        assert!(empty.contains("No customers recorded for this account."));
        assert!(empty.contains("No support or feedback notes recorded."));
    }

    #[tokio::test]
    async fn report_lists_risky_customers_and_notes() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let quiet = add_customer(&store, user, "Quiet", CustomerStatus::AtRisk).await;
        add_customer(&store, user, "Busy", CustomerStatus::Active).await;
        add_customer(&store, Uuid::new_v4(), "Elsewhere", CustomerStatus::Active).await;

        for days in 1..=5 {
            store
                .insert_activity(&CustomerActivity {
                    id: Uuid::new_v4(),
                    customer_id: quiet,
                    kind: ActivityKind::SupportTicket,
                    timestamp: now() - Duration::days(days),
                    feature_id: None,
                    sentiment: None,
                    note: Some(format!("export broken #{days}")),
                })
                .await
                .expect("activity");
        }

        let portfolio = collect_portfolio(&store, user, now())
            .await
            .expect("portfolio");
        assert_eq!(portfolio.customers.len(), 2);
        assert_eq!(portfolio.scores[0].customer_name, "Quiet");
        assert_eq!(portfolio.notes[0].note, "export broken #1");

        let summaries = summarize_by_status(&portfolio.customers);
        assert_eq!(summaries.len(), 2);

        let report = build_report("demo", now(), &portfolio);
        assert!(report.starts_with("# Churn Risk Report"));
        assert!(report.contains("## Highest Risk Customers"));
        assert!(report.contains("- Quiet (quiet@example.com, at_risk) risk"));
        assert!(report.contains("  - High volume of recent support tickets"));
        assert!(report.contains("export broken #1"));
        assert!(!report.contains("Elsewhere"));
    }
}
