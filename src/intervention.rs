use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::metrics::{current_metrics, target_metrics};
use crate::models::{
    CustomerActivity, HealthMetrics, InterventionKind, InterventionStep, NewInterventionPlan,
    PlanMetrics, StepStatus,
};

pub const CUSTOMER_SUCCESS: &str = "customer_success";
pub const PRODUCT_SUCCESS: &str = "product_success";
pub const SALES: &str = "sales";

#[derive(Debug, Clone, Copy)]
struct StepTemplate {
    title: &'static str,
    description: &'static str,
    assigned_to: &'static str,
    due_in: Duration,
}

impl StepTemplate {
    const fn new(
        title: &'static str,
        description: &'static str,
        assigned_to: &'static str,
        due_in: Duration,
    ) -> Self {
        Self {
            title,
            description,
            assigned_to,
            due_in,
        }
    }

    fn instantiate(&self, prefix: &str, index: usize, now: DateTime<Utc>) -> InterventionStep {
        InterventionStep {
            id: format!("{prefix}-{}-{index}", now.timestamp_millis()),
            title: self.title.to_string(),
            description: self.description.to_string(),
            status: StepStatus::Pending,
            due_date: now + self.due_in,
            assigned_to: self.assigned_to.to_string(),
            notes: Vec::new(),
        }
    }
}

fn instantiate_all(
    templates: &[StepTemplate],
    prefix: &str,
    now: DateTime<Utc>,
) -> Vec<InterventionStep> {
    templates
        .iter()
        .enumerate()
        .map(|(i, t)| t.instantiate(prefix, i + 1, now))
        .collect()
}

#[derive(Debug, Clone)]
pub struct PlanDraft {
    pub steps: Vec<InterventionStep>,
    pub metrics: PlanMetrics,
}

/// Steps are gated on the current metrics; all share a 30-day due date.
pub fn proactive_steps(current: &HealthMetrics, now: DateTime<Utc>) -> Vec<InterventionStep> {
    let due = Duration::days(30);
    let gated = [
        (
            current.engagement < 70.0,
            StepTemplate::new(
                "Schedule Engagement Review",
                "Schedule a call to review customer engagement and identify improvement opportunities",
                CUSTOMER_SUCCESS,
                due,
            ),
            1,
        ),
        (
            current.feature_usage < 60.0,
            StepTemplate::new(
                "Feature Adoption Workshop",
                "Organize a workshop to demonstrate key features and their benefits",
                PRODUCT_SUCCESS,
                due,
            ),
            2,
        ),
        (
            current.satisfaction < 80.0,
            StepTemplate::new(
                "Customer Satisfaction Survey",
                "Send a detailed satisfaction survey to gather feedback and identify areas for improvement",
                CUSTOMER_SUCCESS,
                due,
            ),
            3,
        ),
    ];

    gated
        .iter()
        .filter(|(applies, _, _)| *applies)
        .map(|(_, template, index)| template.instantiate("step", *index, now))
        .collect()
}

pub fn reactive_steps(now: DateTime<Utc>) -> Vec<InterventionStep> {
    let templates = [
        StepTemplate::new(
            "Emergency Response Call",
            "Schedule an immediate call to address customer concerns and prevent churn",
            CUSTOMER_SUCCESS,
            Duration::days(1),
        ),
        StepTemplate::new(
            "Retention Offer Review",
            "Review and prepare retention offers based on customer value and history",
            SALES,
            Duration::days(14),
        ),
        StepTemplate::new(
            "Detailed Feedback Collection",
            "Conduct in-depth interviews to understand customer pain points and concerns",
            CUSTOMER_SUCCESS,
            Duration::days(14),
        ),
    ];
    instantiate_all(&templates, "step", now)
}

pub fn generate_plan(
    activities: &[CustomerActivity],
    kind: InterventionKind,
    now: DateTime<Utc>,
) -> PlanDraft {
    let current = current_metrics(activities, now);
    let steps = match kind {
        InterventionKind::Proactive => proactive_steps(&current, now),
        InterventionKind::Reactive => reactive_steps(now),
    };

    PlanDraft {
        steps,
        metrics: PlanMetrics {
            target: target_metrics(&current),
            current,
        },
    }
}

/// Fixed plans raised by lifecycle webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanTemplate {
    Welcome,
    PlanChange,
    Retention,
    Support,
    FeatureAdoption,
}

impl PlanTemplate {
    pub fn kind(self) -> InterventionKind {
        match self {
            Self::Welcome | Self::PlanChange | Self::FeatureAdoption => InterventionKind::Proactive,
            Self::Retention | Self::Support => InterventionKind::Reactive,
        }
    }

    /// Action type reported back to webhook callers.
    pub fn action(self) -> &'static str {
        match self {
            Self::Welcome => "welcome_intervention",
            Self::PlanChange => "plan_change_intervention",
            Self::Retention => "retention_intervention",
            Self::Support => "support_intervention",
            Self::FeatureAdoption => "feature_usage_intervention",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Welcome => "Welcome",
            Self::PlanChange => "Plan change",
            Self::Retention => "Retention",
            Self::Support => "Support",
            Self::FeatureAdoption => "Feature usage",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::PlanChange => "plan-change",
            Self::Retention => "retention",
            Self::Support => "support",
            Self::FeatureAdoption => "feature",
        }
    }

    fn templates(self) -> Vec<StepTemplate> {
        match self {
            Self::Welcome => vec![
                StepTemplate::new(
                    "Welcome Call",
                    "Schedule a welcome call to introduce key features and set expectations",
                    CUSTOMER_SUCCESS,
                    Duration::days(7),
                ),
                StepTemplate::new(
                    "Feature Onboarding",
                    "Provide guided tour of key features and best practices",
                    PRODUCT_SUCCESS,
                    Duration::days(14),
                ),
            ],
            Self::PlanChange => vec![StepTemplate::new(
                "Plan Change Review",
                "Schedule a call to review plan changes and ensure smooth transition",
                CUSTOMER_SUCCESS,
                Duration::days(3),
            )],
            Self::Retention => vec![
                StepTemplate::new(
                    "Retention Call",
                    "Schedule an immediate call to understand cancellation reasons and offer retention options",
                    CUSTOMER_SUCCESS,
                    Duration::days(1),
                ),
                StepTemplate::new(
                    "Retention Offer Review",
                    "Review and prepare retention offers based on customer value",
                    SALES,
                    Duration::hours(48),
                ),
            ],
            Self::Support => vec![StepTemplate::new(
                "Support Review Call",
                "Schedule a call to review support issues and provide solutions",
                CUSTOMER_SUCCESS,
                Duration::days(3),
            )],
            Self::FeatureAdoption => vec![StepTemplate::new(
                "Feature Adoption Review",
                "Schedule a call to review feature adoption and provide guidance",
                PRODUCT_SUCCESS,
                Duration::days(7),
            )],
        }
    }

    pub fn build(self, customer_id: Uuid, now: DateTime<Utc>) -> NewInterventionPlan {
        NewInterventionPlan {
            customer_id,
            kind: self.kind(),
            steps: instantiate_all(&self.templates(), self.prefix(), now),
            metrics: None,
            created_at: now,
        }
    }
}

/// Records a step outcome; only `completed` and `failed` are accepted.
/// Returns whether a step with `step_id` was found.
pub fn apply_step_update(
    steps: &mut [InterventionStep],
    step_id: &str,
    status: StepStatus,
    note: Option<String>,
) -> ServiceResult<bool> {
    if !matches!(status, StepStatus::Completed | StepStatus::Failed) {
        return Err(ServiceError::invalid(
            "step status must be completed or failed",
        ));
    }

    let Some(step) = steps.iter_mut().find(|s| s.id == step_id) else {
        return Ok(false);
    };
    step.status = status;
    if let Some(note) = note {
        step.notes.push(note);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn proactive_plan_for_quiet_customer_has_every_step() {
        let plan = generate_plan(&[], InterventionKind::Proactive, now());
        let titles: Vec<_> = plan.steps.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Schedule Engagement Review",
                "Feature Adoption Workshop",
                "Customer Satisfaction Survey",
            ]
        );
        assert!(plan
            .steps
            .iter()
            .all(|s| s.due_date == now() + Duration::days(30) && s.status == StepStatus::Pending));
        assert_eq!(plan.metrics.current.satisfaction, 50.0);
        assert!((plan.metrics.target.satisfaction - 55.0).abs() < 1e-9);
    }

    #[test]
    fn proactive_steps_skip_healthy_metrics() {
        let healthy = HealthMetrics {
            engagement: 90.0,
            feature_usage: 40.0,
            satisfaction: 85.0,
        };
        let steps = proactive_steps(&healthy, now());
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].assigned_to, PRODUCT_SUCCESS);
        assert_eq!(steps[0].id, format!("step-{}-2", now().timestamp_millis()));
    }

    #[test]
    fn reactive_plan_is_fixed() {
        let plan = generate_plan(&[], InterventionKind::Reactive, now());
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[0].due_date, now() + Duration::days(1));
        assert_eq!(plan.steps[1].assigned_to, SALES);
        assert_eq!(plan.steps[2].due_date, now() + Duration::days(14));
    }

    #[test]
    fn templates_carry_kind_and_offsets() {
        let customer = Uuid::new_v4();
        let retention = PlanTemplate::Retention.build(customer, now());
        assert_eq!(retention.kind, InterventionKind::Reactive);
        assert_eq!(retention.steps[1].due_date, now() + Duration::hours(48));
        assert!(retention.steps[0].id.starts_with("retention-"));

        let welcome = PlanTemplate::Welcome.build(customer, now());
        assert_eq!(welcome.kind, InterventionKind::Proactive);
        assert_eq!(welcome.steps.len(), 2);
        assert!(welcome.metrics.is_none());
    }

    #[test]
    fn step_update_appends_note() {
        let mut steps = reactive_steps(now());
        let id = steps[1].id.clone();
        apply_step_update(&mut steps, &id, StepStatus::Completed, Some("offer sent".to_string()))
            .expect("update");
        assert_eq!(steps[1].status, StepStatus::Completed);
        assert_eq!(steps[1].notes, vec!["offer sent".to_string()]);
    }

    #[test]
    fn step_update_ignores_unknown_step_and_rejects_open_status() {
        let mut steps = reactive_steps(now());
        let before = steps.clone();
        assert!(!apply_step_update(&mut steps, "missing", StepStatus::Failed, Some("n/a".into()))
            .expect("unknown step is a no-op"));
        assert_eq!(steps, before);

        let id = steps[0].id.clone();
        assert!(matches!(
            apply_step_update(&mut steps, &id, StepStatus::InProgress, None),
            Err(ServiceError::InvalidInput(_))
        ));
    }
}
