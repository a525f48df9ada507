use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::models::{ActivityKind, CustomerActivity, HealthMetrics};

pub const WINDOW_DAYS: i64 = 30;

/// Activities strictly newer than `now - days`.
pub fn recent_window(
    activities: &[CustomerActivity],
    now: DateTime<Utc>,
    days: i64,
) -> Vec<&CustomerActivity> {
    let cutoff = now - Duration::days(days);
    activities.iter().filter(|a| a.timestamp > cutoff).collect()
}

/// Distinct feature ids, with a missing id counted as its own value.
pub fn distinct_features<'a, I>(activities: I) -> usize
where
    I: IntoIterator<Item = &'a CustomerActivity>,
{
    activities
        .into_iter()
        .map(|a| a.feature_id.as_deref())
        .collect::<HashSet<_>>()
        .len()
}

pub fn engagement_score(window: &[&CustomerActivity]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }

    let frequency = window.len() as f64 / WINDOW_DAYS as f64;
    let unique_features = distinct_features(window.iter().copied());
    (frequency * 50.0 + unique_features as f64 * 10.0).min(100.0)
}

pub fn feature_usage_score(window: &[&CustomerActivity]) -> f64 {
    let unique_features = distinct_features(
        window
            .iter()
            .copied()
            .filter(|a| a.kind == ActivityKind::FeatureUse),
    );
    (unique_features as f64 * 20.0).min(100.0)
}

pub fn satisfaction_score(window: &[&CustomerActivity]) -> f64 {
    let tickets = window
        .iter()
        .filter(|a| a.kind == ActivityKind::SupportTicket)
        .count();
    let positive = window.iter().filter(|a| a.is_positive_feedback()).count();

    let ticket_score = (100.0 - tickets as f64 * 10.0).max(0.0);
    let feedback_score = (positive as f64 * 20.0).min(100.0);
    ((ticket_score + feedback_score) / 2.0).round()
}

pub fn current_metrics(activities: &[CustomerActivity], now: DateTime<Utc>) -> HealthMetrics {
    let window = recent_window(activities, now, WINDOW_DAYS);
    HealthMetrics {
        engagement: engagement_score(&window),
        feature_usage: feature_usage_score(&window),
        satisfaction: satisfaction_score(&window),
    }
}

pub fn target_metrics(current: &HealthMetrics) -> HealthMetrics {
    HealthMetrics {
        engagement: (current.engagement * 1.2).min(100.0),
        feature_usage: (current.feature_usage * 1.3).min(100.0),
        satisfaction: (current.satisfaction * 1.1).min(100.0),
    }
}

pub fn metric_progress(current: f64, target: f64) -> f64 {
    if target == 0.0 {
        return 0.0;
    }
    ((current / target) * 100.0).round().min(100.0)
}

pub fn progress(current: &HealthMetrics, target: &HealthMetrics) -> HealthMetrics {
    HealthMetrics {
        engagement: metric_progress(current.engagement, target.engagement),
        feature_usage: metric_progress(current.feature_usage, target.feature_usage),
        satisfaction: metric_progress(current.satisfaction, target.satisfaction),
    }
}
