//! The subscription rules engine: guarded mutations over a user's
//! subscription set, enforcing one active subscription per category.

use crate::plan::Plan;
use crate::storage::SubscriptionStore;
use crate::subscription::{BillingCycle, Subscription};
use crate::{MembershipError, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct RulesEngine {
    store: Arc<dyn SubscriptionStore>,
}

impl RulesEngine {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Create a new active subscription for `plan`.
    ///
    /// Fails with [`MembershipError::CategoryConflict`] when the user
    /// already holds an active subscription in the plan's category, even if
    /// it is a different plan. Cancel-then-resubscribe cycles are allowed;
    /// each produces a fresh historical record.
    ///
    /// The category check runs against a read snapshot and the write is
    /// unconditional: two racing calls in one category can both pass
    /// validation and leave two active records until the next re-read. The
    /// store stays the source of truth and [`RulesEngine::cancel`]
    /// deactivates all matching records, so the state is always repairable.
    pub async fn subscribe(
        &self,
        user_id: &str,
        plan: &Plan,
        billing: BillingCycle,
    ) -> Result<Subscription> {
        let active = self.store.list_subscriptions(user_id, true).await?;
        if active.iter().any(|s| s.category == plan.category) {
            return Err(MembershipError::CategoryConflict(plan.category).into());
        }

        let sub = Subscription::new(plan, billing);
        self.store.add_subscription(user_id, &sub).await?;
        tracing::info!(user = user_id, plan = %plan.id, "subscription created");
        Ok(sub)
    }

    /// Deactivate the user's active subscription(s) for `plan_id`.
    ///
    /// Idempotent: cancelling a missing or already-inactive subscription is
    /// a no-op, not an error. Repeated calls yield the same active set.
    pub async fn cancel(&self, user_id: &str, plan_id: &str) -> Result<()> {
        self.store.deactivate_by_plan(user_id, plan_id).await?;
        tracing::info!(user = user_id, plan = plan_id, "subscription cancelled");
        Ok(())
    }

    /// Deactivate every active subscription for the user.
    ///
    /// No all-or-nothing guarantee: on partial failure the set is mixed and
    /// the caller must re-read to learn the true state.
    pub async fn cancel_all(&self, user_id: &str) -> Result<()> {
        self.store.deactivate_all(user_id).await?;
        tracing::info!(user = user_id, "all subscriptions cancelled");
        Ok(())
    }

    /// Aggregate active status: true iff any record is active.
    pub fn derive_status(subscriptions: &[Subscription]) -> bool {
        subscriptions.iter().any(|s| s.active)
    }

    /// Store reference (for testing and session integration)
    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanCategory;
    use crate::storage::MemoryMembershipStore;

    fn engine() -> RulesEngine {
        RulesEngine::new(Arc::new(MemoryMembershipStore::new()))
    }

    fn plan(id: &str, category: PlanCategory) -> Plan {
        Plan::new(id, format!("Plan {id}"), category, 1000, 900)
    }

    #[tokio::test]
    async fn test_subscribe_creates_active_record() {
        let engine = engine();
        let sub = engine
            .subscribe("u1", &plan("fit-basic", PlanCategory::Fitness), BillingCycle::Monthly)
            .await
            .unwrap();
        assert!(sub.active);

        let active = engine.store().list_subscriptions("u1", true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].plan_id, "fit-basic");
        assert!(RulesEngine::derive_status(&active));
    }

    #[tokio::test]
    async fn test_same_category_conflicts_even_for_different_plan() {
        let engine = engine();
        engine
            .subscribe("u1", &plan("fit-basic", PlanCategory::Fitness), BillingCycle::Monthly)
            .await
            .unwrap();

        let err = engine
            .subscribe("u1", &plan("fit-plus", PlanCategory::Fitness), BillingCycle::Monthly)
            .await
            .unwrap_err();
        match err.downcast_ref::<MembershipError>() {
            Some(MembershipError::CategoryConflict(c)) => assert_eq!(*c, PlanCategory::Fitness),
            other => panic!("expected CategoryConflict, got {other:?}"),
        }

        // The active set is unchanged by the rejected operation.
        let active = engine.store().list_subscriptions("u1", true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].plan_id, "fit-basic");
    }

    #[tokio::test]
    async fn test_different_categories_coexist() {
        let engine = engine();
        engine
            .subscribe("u1", &plan("fit-basic", PlanCategory::Fitness), BillingCycle::Monthly)
            .await
            .unwrap();
        engine
            .subscribe("u1", &plan("stream-ind", PlanCategory::Streaming), BillingCycle::Yearly)
            .await
            .unwrap();

        let active = engine.store().list_subscriptions("u1", true).await.unwrap();
        assert_eq!(active.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_then_resubscribe_accumulates_history() {
        let engine = engine();
        let fit = plan("fit-basic", PlanCategory::Fitness);

        engine.subscribe("u1", &fit, BillingCycle::Monthly).await.unwrap();
        engine.cancel("u1", "fit-basic").await.unwrap();
        engine.subscribe("u1", &fit, BillingCycle::Monthly).await.unwrap();

        let all = engine.store().list_subscriptions("u1", false).await.unwrap();
        assert_eq!(all.len(), 2);
        let active = engine.store().list_subscriptions("u1", true).await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let engine = engine();
        engine
            .subscribe("u1", &plan("fit-basic", PlanCategory::Fitness), BillingCycle::Monthly)
            .await
            .unwrap();

        engine.cancel("u1", "fit-basic").await.unwrap();
        let after_once = engine.store().list_subscriptions("u1", false).await.unwrap();

        engine.cancel("u1", "fit-basic").await.unwrap();
        let after_twice = engine.store().list_subscriptions("u1", false).await.unwrap();
        assert_eq!(after_once, after_twice);

        // Cancelling something that never existed is also fine.
        engine.cancel("u1", "no-such-plan").await.unwrap();
        engine.cancel("u2", "fit-basic").await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_all_clears_status() {
        let engine = engine();
        engine
            .subscribe("u1", &plan("fit-basic", PlanCategory::Fitness), BillingCycle::Monthly)
            .await
            .unwrap();
        engine
            .subscribe("u1", &plan("edu-mes", PlanCategory::Elearning), BillingCycle::Monthly)
            .await
            .unwrap();

        engine.cancel_all("u1").await.unwrap();

        let active = engine.store().list_subscriptions("u1", true).await.unwrap();
        assert!(active.is_empty());
        assert!(!RulesEngine::derive_status(
            &engine.store().list_subscriptions("u1", false).await.unwrap()
        ));
    }

    #[test]
    fn test_derive_status_is_pure() {
        assert!(!RulesEngine::derive_status(&[]));

        let p = plan("dig-free", PlanCategory::Digital);
        let mut sub = Subscription::new(&p, BillingCycle::Monthly);
        assert!(RulesEngine::derive_status(std::slice::from_ref(&sub)));
        sub.active = false;
        assert!(!RulesEngine::derive_status(std::slice::from_ref(&sub)));
    }
}
