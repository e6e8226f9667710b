//! Plan catalog access: remote-first with an idempotent seed and a builtin
//! fallback so the catalog stays available under backend outage.

use crate::plan::{Plan, PlanCategory};
use crate::storage::PlanStore;
use crate::Result;
use std::sync::Arc;

/// The fixed seed list, written into an empty store on first catalog read.
pub fn builtin_plans() -> Vec<Plan> {
    vec![
        Plan::new("fit-basic", "Fit Basic", PlanCategory::Fitness, 69900, 59900)
            .with_description("Gym access during regular hours plus the cardio area.")
            .with_emoji("💪")
            .with_tier("Basic")
            .with_features(vec![
                "Access 6am-9pm".to_string(),
                "Cardio and weights area".to_string(),
                "1 intro assessment".to_string(),
            ]),
        Plan::new("fit-plus", "Fit Plus", PlanCategory::Fitness, 119900, 99900)
            .with_description("Group classes and extended access to train at your own pace.")
            .with_emoji("🏋️")
            .with_tier("Premium")
            .with_features(vec![
                "24/7 access".to_string(),
                "Unlimited group classes".to_string(),
                "Standard locker".to_string(),
                "2 coaching sessions a month".to_string(),
            ]),
        Plan::new("fit-elite", "Fit Elite", PlanCategory::Fitness, 199900, 169900)
            .with_description("The full experience with spa, personal trainer and premium towels.")
            .with_emoji("👑")
            .with_tier("VIP")
            .with_features(vec![
                "24/7 access".to_string(),
                "Monthly personal trainer".to_string(),
                "Spa and sauna".to_string(),
                "Premium locker and towels".to_string(),
            ]),
        Plan::new("stream-ind", "Individual", PlanCategory::Streaming, 22900, 19900)
            .with_description("Single profile with HD quality.")
            .with_emoji("📺")
            .with_tier("Individual")
            .with_features(vec!["1 user".to_string(), "HD".to_string()]),
        Plan::new("stream-fam", "Family", PlanCategory::Streaming, 42900, 36900)
            .with_description("Up to 4 profiles with parental controls.")
            .with_emoji("👨‍👩‍👧‍👦")
            .with_tier("Family")
            .with_features(vec![
                "4 users".to_string(),
                "Full HD".to_string(),
                "Parental controls".to_string(),
            ]),
        Plan::new("stream-pre", "Premium", PlanCategory::Streaming, 62900, 54900)
            .with_description("4K quality and downloads.")
            .with_emoji("⭐")
            .with_tier("Premium")
            .with_features(vec!["4K".to_string(), "Downloads".to_string()]),
        Plan::new("edu-mes", "Monthly", PlanCategory::Elearning, 39900, 29900)
            .with_description("Access to every course.")
            .with_emoji("🎓")
            .with_tier("Monthly")
            .with_features(vec![
                "Unlimited courses".to_string(),
                "Certificates".to_string(),
            ]),
        Plan::new("edu-anu", "Annual", PlanCategory::Elearning, 29900, 24900)
            .with_description("Best price per month.")
            .with_emoji("📚")
            .with_tier("Annual")
            .with_features(vec!["Mentoring".to_string(), "Certificates".to_string()]),
        Plan::new("cw-pt", "Part-time", PlanCategory::Coworking, 299000, 249000)
            .with_description("A monthly allowance of coworking hours.")
            .with_emoji("🏢")
            .with_tier("Part-time")
            .with_features(vec![
                "40h/month".to_string(),
                "Meeting rooms".to_string(),
                "Coffee".to_string(),
            ]),
        Plan::new("dig-free", "Free", PlanCategory::Digital, 0, 0)
            .with_description("Free ad-supported plan.")
            .with_emoji("🆓")
            .with_tier("Free")
            .with_features(vec!["Basics".to_string()]),
    ]
}

/// Read access to the plan catalog over an injected [`PlanStore`].
#[derive(Clone)]
pub struct PlanCatalog {
    store: Arc<dyn PlanStore>,
}

impl PlanCatalog {
    pub fn new(store: Arc<dyn PlanStore>) -> Self {
        Self { store }
    }

    /// The full catalog, sorted by category then monthly price.
    ///
    /// An empty store is seeded from [`builtin_plans`] once, then re-read.
    /// If the store is unreachable the builtin list is served instead, so
    /// this read never fails.
    pub async fn fetch_plans(&self) -> Vec<Plan> {
        let mut plans = match self.try_fetch_plans().await {
            Ok(plans) => plans,
            Err(err) => {
                tracing::warn!("plan store unavailable, serving builtin catalog: {err:#}");
                builtin_plans()
            }
        };
        plans.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then(a.price_monthly.cmp(&b.price_monthly))
                .then(a.id.cmp(&b.id))
        });
        plans
    }

    async fn try_fetch_plans(&self) -> Result<Vec<Plan>> {
        let plans = self.store.list_plans().await?;
        if !plans.is_empty() {
            return Ok(plans);
        }
        tracing::info!("plan store empty, seeding builtin catalog");
        self.store.seed_plans(&builtin_plans()).await?;
        self.store.list_plans().await
    }

    /// Point lookup, falling back to the builtin list on a store failure or
    /// miss.
    pub async fn fetch_plan_by_id(&self, plan_id: &str) -> Option<Plan> {
        match self.store.get_plan(plan_id).await {
            Ok(Some(plan)) => return Some(plan),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("plan lookup for '{plan_id}' failed, trying builtin list: {err:#}");
            }
        }
        builtin_plans().into_iter().find(|p| p.id == plan_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryMembershipStore, PlanStore};
    use async_trait::async_trait;

    /// A store that fails every read, for exercising the degraded path.
    struct UnreachableStore;

    #[async_trait]
    impl PlanStore for UnreachableStore {
        async fn list_plans(&self) -> crate::Result<Vec<Plan>> {
            anyhow::bail!("connection refused")
        }
        async fn get_plan(&self, _id: &str) -> crate::Result<Option<Plan>> {
            anyhow::bail!("connection refused")
        }
        async fn put_plan(&self, _plan: &Plan) -> crate::Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn seed_plans(&self, _plans: &[Plan]) -> crate::Result<()> {
            anyhow::bail!("connection refused")
        }
    }

    #[test]
    fn test_builtin_plans_cover_every_category() {
        let plans = builtin_plans();
        assert_eq!(plans.len(), 10);
        for category in PlanCategory::ALL {
            assert!(plans.iter().any(|p| p.category == category));
        }
        for plan in &plans {
            plan.validate().unwrap();
        }
    }

    #[tokio::test]
    async fn test_fetch_plans_seeds_empty_store() {
        let store = Arc::new(MemoryMembershipStore::new());
        let catalog = PlanCatalog::new(store.clone());

        let plans = catalog.fetch_plans().await;
        assert_eq!(plans.len(), builtin_plans().len());

        // The data came from the store, not the fallback.
        let stored = store.list_plans().await.unwrap();
        assert_eq!(stored.len(), plans.len());
    }

    #[tokio::test]
    async fn test_fetch_plans_sorted_by_category_then_price() {
        let catalog = PlanCatalog::new(Arc::new(MemoryMembershipStore::new()));
        let plans = catalog.fetch_plans().await;

        let keys: Vec<_> = plans.iter().map(|p| (p.category, p.price_monthly)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[tokio::test]
    async fn test_fetch_plans_degrades_to_builtin() {
        let catalog = PlanCatalog::new(Arc::new(UnreachableStore));
        let plans = catalog.fetch_plans().await;
        assert_eq!(plans.len(), builtin_plans().len());
    }

    #[tokio::test]
    async fn test_fetch_plan_by_id_falls_back_on_failure() {
        let catalog = PlanCatalog::new(Arc::new(UnreachableStore));
        let plan = catalog.fetch_plan_by_id("fit-basic").await.unwrap();
        assert_eq!(plan.id, "fit-basic");
        assert!(catalog.fetch_plan_by_id("no-such-plan").await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_plan_prefers_store_copy() {
        let store = Arc::new(MemoryMembershipStore::new());
        let modified = Plan::new("fit-basic", "Renamed", PlanCategory::Fitness, 1, 1);
        store.put_plan(&modified).await.unwrap();

        let catalog = PlanCatalog::new(store);
        let plan = catalog.fetch_plan_by_id("fit-basic").await.unwrap();
        assert_eq!(plan.name, "Renamed");
    }
}
