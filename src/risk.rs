use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::metrics::{distinct_features, recent_window, WINDOW_DAYS};
use crate::models::{
    ActivityKind, Customer, CustomerActivity, CustomerScore, Impact, Insight, InsightKind,
    Subscription, Trend,
};

#[derive(Debug, Clone, Copy)]
pub struct RiskWeights {
    pub engagement: f64,
    pub payment: f64,
    pub support: f64,
    pub usage: f64,
}

pub const RISK_WEIGHTS: RiskWeights = RiskWeights {
    engagement: 0.3,
    payment: 0.3,
    support: 0.2,
    usage: 0.2,
};

const SUPPORT_TICKET_LIMIT: usize = 3;
const FEATURE_USE_FLOOR: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub risk: u8,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub risk: u8,
    pub confidence: u8,
    pub factors: Vec<String>,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStability {
    Stable,
    Unstable(String),
}

impl SubscriptionStability {
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Stable)
    }
}

fn count_kind(activities: &[CustomerActivity], kind: ActivityKind) -> usize {
    activities.iter().filter(|a| a.kind == kind).count()
}

fn to_score(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

/// Weighted sum of four binary indicators, scaled to 0-100.
pub fn risk_score(
    activities: &[CustomerActivity],
    subscription: Option<&Subscription>,
    now: DateTime<Utc>,
) -> u8 {
    let engaged = !recent_window(activities, now, WINDOW_DAYS).is_empty();
    let paying = subscription.is_some_and(Subscription::is_active);
    let calm_support = count_kind(activities, ActivityKind::SupportTicket) < SUPPORT_TICKET_LIMIT;
    let using = count_kind(activities, ActivityKind::FeatureUse) > FEATURE_USE_FLOOR;

    let indicator = |flag: bool| if flag { 1.0 } else { 0.0 };
    let score = indicator(engaged) * RISK_WEIGHTS.engagement
        + indicator(paying) * RISK_WEIGHTS.payment
        + indicator(calm_support) * RISK_WEIGHTS.support
        + indicator(using) * RISK_WEIGHTS.usage;

    to_score(score * 100.0)
}

fn analysis_insights(
    customer: &Customer,
    activities: &[CustomerActivity],
    subscription: Option<&Subscription>,
    now: DateTime<Utc>,
) -> Vec<Insight> {
    let mut insights = Vec::new();
    let insight = |kind, title: &str, description: String, impact, recommendation: &str, confidence| {
        Insight {
            kind,
            title: title.to_string(),
            description,
            impact,
            recommendation: recommendation.to_string(),
            confidence,
            affected_customers: vec![customer.id],
        }
    };

    if recent_window(activities, now, WINDOW_DAYS).is_empty() {
        insights.push(insight(
            InsightKind::Pattern,
            "Low Engagement Detected",
            "No activity in the last 30 days".to_string(),
            Impact::High,
            "Initiate re-engagement campaign",
            90,
        ));
    }

    if !subscription.is_some_and(Subscription::is_active) {
        let status = subscription.map_or("missing", |s| s.status.as_str());
        insights.push(insight(
            InsightKind::Prediction,
            "Subscription Status Alert",
            format!("Subscription is {status}"),
            Impact::Critical,
            "Review payment status and contact customer",
            95,
        ));
    }

    let tickets = count_kind(activities, ActivityKind::SupportTicket);
    if tickets >= SUPPORT_TICKET_LIMIT {
        insights.push(insight(
            InsightKind::Pattern,
            "High Support Volume",
            format!("{tickets} support tickets in recent period"),
            Impact::Medium,
            "Review support issues and implement solutions",
            85,
        ));
    }

    if count_kind(activities, ActivityKind::FeatureUse) <= FEATURE_USE_FLOOR {
        insights.push(insight(
            InsightKind::Opportunity,
            "Low Feature Adoption",
            "Limited use of key features".to_string(),
            Impact::Medium,
            "Schedule feature training session",
            80,
        ));
    }

    insights
}

pub fn recommendations(insights: &[Insight], risk: u8) -> Vec<String> {
    let tier: [&str; 3] = match risk {
        80.. => [
            "Schedule immediate intervention call",
            "Review customer success plan",
            "Prepare retention offer",
        ],
        60..=79 => [
            "Increase engagement frequency",
            "Schedule success review",
            "Identify upsell opportunities",
        ],
        _ => [
            "Maintain regular check-ins",
            "Monitor engagement metrics",
            "Plan next success milestone",
        ],
    };

    let mut out: Vec<String> = Vec::new();
    let candidates = tier
        .iter()
        .map(|s| s.to_string())
        .chain(insights.iter().map(|i| i.recommendation.clone()));
    for item in candidates {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Scores a customer from its newest activities and current subscription.
pub fn analyze(
    customer: &Customer,
    activities: &[CustomerActivity],
    subscription: Option<&Subscription>,
    now: DateTime<Utc>,
) -> Analysis {
    let risk = risk_score(activities, subscription, now);
    let insights = analysis_insights(customer, activities, subscription, now);
    let recommendations = recommendations(&insights, risk);
    Analysis {
        risk,
        insights,
        recommendations,
    }
}

/// Compares the last 30 rows against the 30 before them.
pub fn activity_trend(activities: &[CustomerActivity]) -> Trend {
    if activities.len() < 2 {
        return Trend::Stable;
    }

    let len = activities.len();
    let recent = len.min(30) as f64;
    let older = len.saturating_sub(30).min(30) as f64;

    if recent > older * 1.2 {
        Trend::Increasing
    } else if recent < older * 0.8 {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

pub fn subscription_stability(subscriptions: &[Subscription]) -> SubscriptionStability {
    let Some(current) = subscriptions.last() else {
        return SubscriptionStability::Unstable("No active subscription".to_string());
    };

    if !current.is_active() {
        return SubscriptionStability::Unstable(format!(
            "Subscription status: {}",
            current.status
        ));
    }

    let plan_changes = subscriptions
        .windows(2)
        .filter(|pair| pair[0].plan_id != pair[1].plan_id)
        .count();
    if plan_changes > 2 {
        return SubscriptionStability::Unstable("Frequent plan changes detected".to_string());
    }

    SubscriptionStability::Stable
}

fn support_risk(activities: &[CustomerActivity], now: DateTime<Utc>) -> Option<(u8, &'static str)> {
    let cutoff = now - Duration::days(WINDOW_DAYS);
    let tickets: Vec<_> = activities
        .iter()
        .filter(|a| a.kind == ActivityKind::SupportTicket)
        .collect();
    let recent = tickets.iter().filter(|a| a.timestamp > cutoff).count();

    if recent >= 5 {
        Some((25, "High volume of recent support tickets"))
    } else if tickets.len() >= 10 {
        Some((15, "High total support ticket volume"))
    } else {
        None
    }
}

fn usage_risk(activities: &[CustomerActivity]) -> Option<(u8, &'static str)> {
    let unique = distinct_features(
        activities
            .iter()
            .filter(|a| a.kind == ActivityKind::FeatureUse),
    );
    (unique < 3).then_some((20, "Limited feature adoption"))
}

/// Confidence from data volume and time span only.
pub fn confidence(activities: &[CustomerActivity], subscriptions: &[Subscription]) -> u8 {
    let mut confidence: u32 = match activities.len() {
        101.. => 30,
        51..=100 => 20,
        21..=50 => 10,
        _ => 0,
    };

    let first = activities.iter().map(|a| a.timestamp).min();
    let last = activities.iter().map(|a| a.timestamp).max();
    if let (Some(first), Some(last)) = (first, last) {
        let months = (last - first).num_seconds() as f64 / (30.0 * 24.0 * 60.0 * 60.0);
        confidence += if months > 6.0 {
            30
        } else if months > 3.0 {
            20
        } else if months > 1.0 {
            10
        } else {
            0
        };
    }

    if !subscriptions.is_empty() {
        confidence += 20;
    }

    confidence.min(100) as u8
}

/// Direction of churn risk, inverse to engagement.
pub fn churn_trend(activity: Trend, stability: &SubscriptionStability) -> Trend {
    if activity == Trend::Decreasing || !stability.is_stable() {
        Trend::Increasing
    } else if activity == Trend::Increasing {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

/// Predicts churn risk from the full activity and subscription history,
/// both in ascending time order.
pub fn predict(
    activities: &[CustomerActivity],
    subscriptions: &[Subscription],
    now: DateTime<Utc>,
) -> Prediction {
    let mut factors = Vec::new();
    let mut risk: u32 = 0;

    let trend = activity_trend(activities);
    if trend == Trend::Decreasing {
        risk += 30;
        factors.push("Decreasing engagement over time".to_string());
    }

    let stability = subscription_stability(subscriptions);
    if let SubscriptionStability::Unstable(factor) = &stability {
        risk += 25;
        factors.push(factor.clone());
    }

    for (weight, factor) in [support_risk(activities, now), usage_risk(activities)]
        .into_iter()
        .flatten()
    {
        risk += u32::from(weight);
        factors.push(factor.to_string());
    }

    Prediction {
        risk: risk.min(100) as u8,
        confidence: confidence(activities, subscriptions),
        factors,
        trend: churn_trend(trend, &stability),
    }
}

pub fn rank_scores(mut scores: Vec<CustomerScore>) -> Vec<CustomerScore> {
    scores.sort_by(|a, b| {
        b.risk
            .cmp(&a.risk)
            .then_with(|| b.confidence.cmp(&a.confidence))
            .then_with(|| a.customer_name.cmp(&b.customer_name))
    });
    scores
}
