use crate::plan::{Plan, PlanCategory};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingCycle::Monthly => write!(f, "monthly"),
            BillingCycle::Yearly => write!(f, "yearly"),
        }
    }
}

/// A record of a user's enrollment in a plan.
///
/// `plan_name` and `category` are denormalized copies taken at subscribe
/// time; they are not re-synced if the plan changes later. Cancellation
/// flips `active` to false and the record is kept as history, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: String,
    pub plan_id: String,
    pub plan_name: String,
    pub category: PlanCategory,
    pub billing: BillingCycle,
    /// Unix seconds at creation time.
    pub started_at: i64,
    pub active: bool,
}

impl Subscription {
    /// Create a new active subscription for `plan`.
    pub fn new(plan: &Plan, billing: BillingCycle) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            plan_id: plan.id.clone(),
            plan_name: plan.name.clone(),
            category: plan.category,
            billing,
            started_at: chrono::Utc::now().timestamp(),
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_subscription_is_active() {
        let plan = Plan::new("stream-ind", "Individual", PlanCategory::Streaming, 22900, 19900);
        let sub = Subscription::new(&plan, BillingCycle::Monthly);

        assert!(sub.active);
        assert!(!sub.id.is_empty());
        assert_eq!(sub.plan_id, "stream-ind");
        assert_eq!(sub.plan_name, "Individual");
        assert_eq!(sub.category, PlanCategory::Streaming);
        assert!(sub.started_at > 0);
    }

    #[test]
    fn test_denormalized_fields_do_not_track_plan() {
        let mut plan = Plan::new("edu-mes", "Monthly", PlanCategory::Elearning, 39900, 29900);
        let sub = Subscription::new(&plan, BillingCycle::Yearly);

        plan.name = "Renamed".to_string();
        assert_eq!(sub.plan_name, "Monthly");
    }

    #[test]
    fn test_serde_round_trip() {
        let plan = Plan::new("dig-free", "Free", PlanCategory::Digital, 0, 0);
        let sub = Subscription::new(&plan, BillingCycle::Monthly);

        let json = serde_json::to_string(&sub).unwrap();
        let back: Subscription = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sub);
    }
}
