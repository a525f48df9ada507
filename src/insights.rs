//! Pattern-matched insights for one customer and its plan cohort.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics::{distinct_features, recent_window, WINDOW_DAYS};
use crate::models::{ActivityKind, Customer, CustomerActivity, Impact, Insight, InsightKind, Pattern};

/// How many same-plan customers the cohort checks look at.
pub const SIMILAR_CUSTOMER_LIMIT: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct InsightReport {
    pub insights: Vec<Insight>,
    pub patterns: Vec<Pattern>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub description: &'static str,
    pub impact: Impact,
    pub recommendation: &'static str,
    pub confidence: u8,
}

pub fn engagement_pattern(activities: &[CustomerActivity], now: DateTime<Utc>) -> Option<Finding> {
    if activities.len() < 10 {
        return None;
    }

    let window = recent_window(activities, now, WINDOW_DAYS);
    let frequency = window.len() as f64 / WINDOW_DAYS as f64;

    if frequency < 0.5 {
        return Some(Finding {
            description: "Low engagement detected in the last 30 days",
            impact: Impact::High,
            recommendation:
                "Schedule a check-in call to understand customer needs and provide guidance",
            confidence: 85,
        });
    }

    if distinct_features(window.iter().copied()) < 3 {
        return Some(Finding {
            description: "Limited feature adoption detected",
            impact: Impact::Medium,
            recommendation: "Provide personalized feature training and highlight key benefits",
            confidence: 75,
        });
    }

    None
}

pub fn feature_opportunity(activities: &[CustomerActivity]) -> Option<Finding> {
    let unique = distinct_features(
        activities
            .iter()
            .filter(|a| a.kind == ActivityKind::FeatureUse),
    );
    (unique < 3).then_some(Finding {
        description: "Customer is not utilizing key features",
        impact: Impact::Medium,
        recommendation: "Schedule a feature walkthrough and identify potential use cases",
        confidence: 80,
    })
}

/// Retention among similar customers; silent when there is no cohort.
pub fn subscription_health(similar: &[Customer]) -> Option<Finding> {
    if similar.is_empty() {
        return None;
    }

    let active = similar
        .iter()
        .filter(|c| c.subscription_status.as_deref() == Some("active"))
        .count();
    let health = active as f64 / similar.len() as f64 * 100.0;

    (health < 70.0).then_some(Finding {
        description: "Low retention rate among similar customers",
        impact: Impact::Critical,
        recommendation: "Implement proactive retention strategies and monitor closely",
        confidence: 90,
    })
}

pub fn cohort_patterns(similar: &[Customer]) -> Vec<Pattern> {
    let mut patterns = Vec::new();

    let with_issues: Vec<_> = similar
        .iter()
        .filter(|c| c.support_tickets > 3)
        .map(|c| c.id)
        .collect();
    if with_issues.len() >= 3 {
        patterns.push(Pattern {
            kind: "support_issues".to_string(),
            description: "Multiple customers experiencing support issues".to_string(),
            impact: Impact::High,
            customers: with_issues,
        });
    }

    let low_usage: Vec<_> = similar
        .iter()
        .filter(|c| c.feature_usage < 3)
        .map(|c| c.id)
        .collect();
    if low_usage.len() >= 5 {
        patterns.push(Pattern {
            kind: "feature_usage".to_string(),
            description: "Low feature adoption among similar customers".to_string(),
            impact: Impact::Medium,
            customers: low_usage,
        });
    }

    patterns
}

pub fn generate(
    customer: &Customer,
    activities: &[CustomerActivity],
    similar: &[Customer],
    now: DateTime<Utc>,
) -> InsightReport {
    let candidates = [
        (
            InsightKind::Pattern,
            "Engagement Pattern Detected",
            engagement_pattern(activities, now),
        ),
        (
            InsightKind::Opportunity,
            "Feature Usage Opportunity",
            feature_opportunity(activities),
        ),
        (
            InsightKind::Prediction,
            "Subscription Health Analysis",
            subscription_health(similar),
        ),
    ];

    let insights = candidates
        .into_iter()
        .filter_map(|(kind, title, finding)| {
            finding.map(|f| Insight {
                kind,
                title: title.to_string(),
                description: f.description.to_string(),
                impact: f.impact,
                recommendation: f.recommendation.to_string(),
                confidence: f.confidence,
                affected_customers: vec![customer.id],
            })
        })
        .collect();

    InsightReport {
        insights,
        patterns: cohort_patterns(similar),
    }
}
