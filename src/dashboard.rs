use serde::Serialize;

use crate::models::{BillingMetrics, Customer, CustomerStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummary {
    pub total: i64,
    pub growth: f64,
    pub previous_period: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerCounts {
    pub total: usize,
    pub active: usize,
    pub at_risk: usize,
    pub churned: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub revenue: RevenueSummary,
    pub customers: CustomerCounts,
    pub churn_rate: f64,
    pub revenue_at_risk: f64,
}

pub fn count_customers(customers: &[Customer]) -> CustomerCounts {
    let count = |status: CustomerStatus| customers.iter().filter(|c| c.status == status).count();
    CustomerCounts {
        total: customers.len(),
        active: count(CustomerStatus::Active),
        at_risk: count(CustomerStatus::AtRisk),
        churned: count(CustomerStatus::Churned),
    }
}

/// Churned share of customers that ever paid; 0 when there are none.
pub fn churn_rate(counts: &CustomerCounts) -> f64 {
    let base = counts.active + counts.churned;
    if base == 0 {
        0.0
    } else {
        counts.churned as f64 / base as f64
    }
}

/// Average revenue per active customer times the at-risk head count.
pub fn revenue_at_risk(counts: &CustomerCounts, total_revenue: i64) -> f64 {
    if counts.active == 0 {
        0.0
    } else {
        counts.at_risk as f64 * total_revenue as f64 / counts.active as f64
    }
}

pub fn compute(customers: &[Customer], billing: Option<&BillingMetrics>) -> DashboardMetrics {
    let counts = count_customers(customers);
    let total_revenue = billing.map(|b| b.total_revenue).unwrap_or(0);

    DashboardMetrics {
        revenue: RevenueSummary {
            total: total_revenue,
            growth: 0.0,
            previous_period: 0,
        },
        churn_rate: churn_rate(&counts),
        revenue_at_risk: revenue_at_risk(&counts, total_revenue),
        customers: counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn customer(status: CustomerStatus) -> Customer {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        Customer {
            id: Uuid::new_v4(),
            user_id: None,
            name: "Initech".to_string(),
            email: format!("{}@initech.example", Uuid::new_v4()),
            status,
            plan_id: None,
            subscription_status: None,
            support_tickets: 0,
            feature_usage: 0,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn empty_portfolio_has_zero_rates() {
        let metrics = compute(&[], None);
        assert_eq!(metrics.customers.total, 0);
        assert_eq!(metrics.churn_rate, 0.0);
        assert_eq!(metrics.revenue_at_risk, 0.0);
        assert_eq!(metrics.revenue.total, 0);
    }

    #[test]
    fn rates_follow_status_counts() {
        let customers = vec![
            customer(CustomerStatus::Active),
            customer(CustomerStatus::Active),
            customer(CustomerStatus::Active),
            customer(CustomerStatus::Churned),
            customer(CustomerStatus::AtRisk),
            customer(CustomerStatus::Inactive),
        ];
        let billing = BillingMetrics {
            user_id: Uuid::new_v4(),
            total_revenue: 9_000,
            pending_payouts: 0,
            last_sync: None,
        };
        let metrics = compute(&customers, Some(&billing));
        assert_eq!(
            metrics.customers,
            CustomerCounts {
                total: 6,
                active: 3,
                at_risk: 1,
                churned: 1,
            }
        );
        assert!((metrics.churn_rate - 0.25).abs() < 1e-9);
        assert!((metrics.revenue_at_risk - 3_000.0).abs() < 1e-9);
    }

    #[test]
    fn no_active_customers_never_divides_by_zero() {
        let customers = vec![
            customer(CustomerStatus::AtRisk),
            customer(CustomerStatus::Churned),
        ];
        let metrics = compute(&customers, None);
        assert_eq!(metrics.churn_rate, 1.0);
        assert_eq!(metrics.revenue_at_risk, 0.0);
        assert!(!metrics.revenue_at_risk.is_nan());
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(compute(&[], None)).expect("json");
        assert!(value["customers"].get("atRisk").is_some());
        assert!(value["revenue"].get("previousPeriod").is_some());
        assert!(value.get("revenueAtRisk").is_some());
    }
}
