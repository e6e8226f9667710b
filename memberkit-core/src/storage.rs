use crate::plan::Plan;
use crate::subscription::Subscription;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::watch;

use crate::Result;

/// Handle to a live stream of active-subscription snapshots for one user.
///
/// The stream is lazy, infinite and non-restartable: once released, a new
/// handle must be obtained from the store. Dropping the handle detaches the
/// listener; [`SubscriptionWatch::release`] does the same explicitly.
pub struct SubscriptionWatch {
    rx: watch::Receiver<Vec<Subscription>>,
}

impl SubscriptionWatch {
    /// Wait for the next snapshot. Returns `None` once the store side has
    /// gone away, which ends the stream.
    pub async fn changed(&mut self) -> Option<Vec<Subscription>> {
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow_and_update().clone()),
            Err(_) => None,
        }
    }

    /// The most recently published snapshot, without waiting.
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.rx.borrow().clone()
    }

    /// Detach the listener.
    pub fn release(self) {}
}

/// Per-user change notification, shared by the store implementations.
///
/// Each mutation publishes the full active set; watchers always observe the
/// latest snapshot (last write wins, intermediate snapshots may be skipped).
#[derive(Default)]
struct ChangeNotifier {
    senders: Mutex<HashMap<String, watch::Sender<Vec<Subscription>>>>,
}

impl ChangeNotifier {
    fn watch(&self, user_id: &str, current: Vec<Subscription>) -> SubscriptionWatch {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        let tx = senders
            .entry(user_id.to_string())
            .or_insert_with(|| watch::channel(current).0);
        SubscriptionWatch { rx: tx.subscribe() }
    }

    fn publish(&self, user_id: &str, snapshot: Vec<Subscription>) {
        let senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = senders.get(user_id) {
            let _ = tx.send_replace(snapshot);
        }
    }
}

/// Storage trait for the plan catalog
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn list_plans(&self) -> Result<Vec<Plan>>;
    async fn get_plan(&self, id: &str) -> Result<Option<Plan>>;
    async fn put_plan(&self, plan: &Plan) -> Result<()>;

    /// Write `plans` only if the store is observed empty.
    ///
    /// Must be safe to call concurrently: exactly one caller performs the
    /// writes, the others see either the seeded data or an empty store that
    /// is about to be seeded. Implementations serialize the observe/write
    /// step (mutex for the memory backend, an exclusive file lock for the
    /// file backend).
    async fn seed_plans(&self, plans: &[Plan]) -> Result<()>;
}

/// Storage trait for per-user subscription records
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn add_subscription(&self, user_id: &str, sub: &Subscription) -> Result<()>;

    /// List subscriptions, newest `started_at` first. Sorting happens
    /// in-memory so the backend needs no composite index.
    async fn list_subscriptions(&self, user_id: &str, only_active: bool)
        -> Result<Vec<Subscription>>;

    /// Set `active = false` on ALL currently-active records matching
    /// `plan_id`. Normally that is exactly one record, but the operation is
    /// defined over "all matching" so an out-of-band invariant violation is
    /// repaired rather than preserved. No-op when nothing matches.
    async fn deactivate_by_plan(&self, user_id: &str, plan_id: &str) -> Result<()>;

    /// Set `active = false` on every active record. The batch is not
    /// transactional: partial failure leaves a mixed state and the caller
    /// must re-read to learn the truth.
    async fn deactivate_all(&self, user_id: &str) -> Result<()>;

    /// Attach a live change listener for the user's active set.
    async fn watch_active(&self, user_id: &str) -> Result<SubscriptionWatch>;
}

fn sort_newest_first(subs: &mut [Subscription]) {
    subs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
}

/// In-memory store, used by tests and embedded demos.
///
/// Implements both [`PlanStore`] and [`SubscriptionStore`]; all state lives
/// behind plain mutexes and notifications go out synchronously with each
/// mutation.
#[derive(Default)]
pub struct MemoryMembershipStore {
    plans: Mutex<HashMap<String, Plan>>,
    subscriptions: Mutex<HashMap<String, Vec<Subscription>>>,
    notifier: ChangeNotifier,
}

impl MemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn active_snapshot(&self, user_id: &str) -> Vec<Subscription> {
        let subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        let mut snapshot: Vec<Subscription> = subs
            .get(user_id)
            .map(|list| list.iter().filter(|s| s.active).cloned().collect())
            .unwrap_or_default();
        sort_newest_first(&mut snapshot);
        snapshot
    }
}

#[async_trait]
impl PlanStore for MemoryMembershipStore {
    async fn list_plans(&self) -> Result<Vec<Plan>> {
        let plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        Ok(plans.values().cloned().collect())
    }

    async fn get_plan(&self, id: &str) -> Result<Option<Plan>> {
        let plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        Ok(plans.get(id).cloned())
    }

    async fn put_plan(&self, plan: &Plan) -> Result<()> {
        let mut plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn seed_plans(&self, seed: &[Plan]) -> Result<()> {
        let mut plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        if plans.is_empty() {
            for plan in seed {
                plans.insert(plan.id.clone(), plan.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryMembershipStore {
    async fn add_subscription(&self, user_id: &str, sub: &Subscription) -> Result<()> {
        {
            let mut subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
            subs.entry(user_id.to_string()).or_default().push(sub.clone());
        }
        self.notifier.publish(user_id, self.active_snapshot(user_id));
        Ok(())
    }

    async fn list_subscriptions(
        &self,
        user_id: &str,
        only_active: bool,
    ) -> Result<Vec<Subscription>> {
        let subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        let mut result: Vec<Subscription> = subs
            .get(user_id)
            .map(|list| {
                list.iter()
                    .filter(|s| !only_active || s.active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(subs);
        sort_newest_first(&mut result);
        Ok(result)
    }

    async fn deactivate_by_plan(&self, user_id: &str, plan_id: &str) -> Result<()> {
        {
            let mut subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(list) = subs.get_mut(user_id) {
                for sub in list.iter_mut().filter(|s| s.active && s.plan_id == plan_id) {
                    sub.active = false;
                }
            }
        }
        self.notifier.publish(user_id, self.active_snapshot(user_id));
        Ok(())
    }

    async fn deactivate_all(&self, user_id: &str) -> Result<()> {
        {
            let mut subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(list) = subs.get_mut(user_id) {
                for sub in list.iter_mut().filter(|s| s.active) {
                    sub.active = false;
                }
            }
        }
        self.notifier.publish(user_id, self.active_snapshot(user_id));
        Ok(())
    }

    async fn watch_active(&self, user_id: &str) -> Result<SubscriptionWatch> {
        Ok(self.notifier.watch(user_id, self.active_snapshot(user_id)))
    }
}

/// File-backed store: one JSON document per record under a base directory.
///
/// Layout:
/// ```text
/// <base>/plans/<plan-id>.json
/// <base>/subscriptions/<user-id>/<subscription-id>.json
/// ```
///
/// Change notification is process-local; a second process watching the same
/// directory will not observe writes made here.
pub struct FileMembershipStore {
    base_path: PathBuf,
    notifier: ChangeNotifier,
}

impl FileMembershipStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(base_path.join("plans"))?;
        std::fs::create_dir_all(base_path.join("subscriptions"))?;
        Ok(Self {
            base_path,
            notifier: ChangeNotifier::default(),
        })
    }

    fn plans_dir(&self) -> PathBuf {
        self.base_path.join("plans")
    }

    fn plan_path(&self, id: &str) -> PathBuf {
        self.plans_dir().join(format!("{}.json", id))
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        self.base_path.join("subscriptions").join(user_id)
    }

    fn sub_path(&self, user_id: &str, sub_id: &str) -> PathBuf {
        self.user_dir(user_id).join(format!("{}.json", sub_id))
    }

    fn read_json_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
        let mut result = Vec::new();
        if !dir.exists() {
            return Ok(result);
        }
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let json = std::fs::read_to_string(&path)?;
            result.push(serde_json::from_str(&json)?);
        }
        Ok(result)
    }

    fn read_all_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>> {
        Self::read_json_dir(&self.user_dir(user_id))
    }

    fn write_subscription(&self, user_id: &str, sub: &Subscription) -> Result<()> {
        std::fs::create_dir_all(self.user_dir(user_id))?;
        let json = serde_json::to_string_pretty(sub)?;
        std::fs::write(self.sub_path(user_id, &sub.id), json)?;
        Ok(())
    }

    fn active_snapshot(&self, user_id: &str) -> Vec<Subscription> {
        let mut snapshot: Vec<Subscription> = self
            .read_all_subscriptions(user_id)
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.active)
            .collect();
        sort_newest_first(&mut snapshot);
        snapshot
    }
}

#[async_trait]
impl PlanStore for FileMembershipStore {
    async fn list_plans(&self) -> Result<Vec<Plan>> {
        Self::read_json_dir(&self.plans_dir())
    }

    async fn get_plan(&self, id: &str) -> Result<Option<Plan>> {
        let path = self.plan_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    async fn put_plan(&self, plan: &Plan) -> Result<()> {
        let json = serde_json::to_string_pretty(plan)?;
        std::fs::write(self.plan_path(&plan.id), json)?;
        Ok(())
    }

    async fn seed_plans(&self, seed: &[Plan]) -> Result<()> {
        use fs2::FileExt;

        // Exclusive lock around the observe-empty/write step so concurrent
        // callers cannot double-seed. The marker has no "json" extension and
        // is invisible to `list_plans`.
        let lock_path = self.plans_dir().join(".seed.lock");
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        file.lock_exclusive()?;

        let result = (|| -> Result<()> {
            let existing: Vec<Plan> = Self::read_json_dir(&self.plans_dir())?;
            if existing.is_empty() {
                for plan in seed {
                    let json = serde_json::to_string_pretty(plan)?;
                    std::fs::write(self.plan_path(&plan.id), json)?;
                }
            }
            Ok(())
        })();

        FileExt::unlock(&file)?;
        result
    }
}

#[async_trait]
impl SubscriptionStore for FileMembershipStore {
    async fn add_subscription(&self, user_id: &str, sub: &Subscription) -> Result<()> {
        self.write_subscription(user_id, sub)?;
        self.notifier.publish(user_id, self.active_snapshot(user_id));
        Ok(())
    }

    async fn list_subscriptions(
        &self,
        user_id: &str,
        only_active: bool,
    ) -> Result<Vec<Subscription>> {
        let mut result: Vec<Subscription> = self
            .read_all_subscriptions(user_id)?
            .into_iter()
            .filter(|s| !only_active || s.active)
            .collect();
        sort_newest_first(&mut result);
        Ok(result)
    }

    async fn deactivate_by_plan(&self, user_id: &str, plan_id: &str) -> Result<()> {
        let matching: Vec<Subscription> = self
            .read_all_subscriptions(user_id)?
            .into_iter()
            .filter(|s| s.active && s.plan_id == plan_id)
            .collect();
        for mut sub in matching {
            sub.active = false;
            self.write_subscription(user_id, &sub)?;
        }
        self.notifier.publish(user_id, self.active_snapshot(user_id));
        Ok(())
    }

    async fn deactivate_all(&self, user_id: &str) -> Result<()> {
        let active: Vec<Subscription> = self
            .read_all_subscriptions(user_id)?
            .into_iter()
            .filter(|s| s.active)
            .collect();
        for mut sub in active {
            sub.active = false;
            self.write_subscription(user_id, &sub)?;
        }
        self.notifier.publish(user_id, self.active_snapshot(user_id));
        Ok(())
    }

    async fn watch_active(&self, user_id: &str) -> Result<SubscriptionWatch> {
        Ok(self.notifier.watch(user_id, self.active_snapshot(user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanCategory;
    use crate::subscription::BillingCycle;
    use tempfile::tempdir;

    fn test_plan(id: &str, category: PlanCategory) -> Plan {
        Plan::new(id, format!("Plan {id}"), category, 1000, 900)
    }

    fn test_sub(plan: &Plan, started_at: i64) -> Subscription {
        let mut sub = Subscription::new(plan, BillingCycle::Monthly);
        sub.started_at = started_at;
        sub
    }

    #[tokio::test]
    async fn test_memory_list_newest_first() {
        let store = MemoryMembershipStore::new();
        let older = test_sub(&test_plan("fit-basic", PlanCategory::Fitness), 100);
        let newer = test_sub(&test_plan("stream-ind", PlanCategory::Streaming), 200);

        store.add_subscription("u1", &older).await.unwrap();
        store.add_subscription("u1", &newer).await.unwrap();

        let subs = store.list_subscriptions("u1", true).await.unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].plan_id, "stream-ind");
        assert_eq!(subs[1].plan_id, "fit-basic");
    }

    #[tokio::test]
    async fn test_memory_deactivate_by_plan_flips_all_matching() {
        let store = MemoryMembershipStore::new();
        let plan = test_plan("fit-basic", PlanCategory::Fitness);
        // Two active records for one plan: an out-of-band invariant
        // violation that deactivation must repair wholesale.
        store.add_subscription("u1", &test_sub(&plan, 100)).await.unwrap();
        store.add_subscription("u1", &test_sub(&plan, 200)).await.unwrap();

        store.deactivate_by_plan("u1", "fit-basic").await.unwrap();

        let active = store.list_subscriptions("u1", true).await.unwrap();
        assert!(active.is_empty());
        let all = store.list_subscriptions("u1", false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|s| !s.active));
    }

    #[tokio::test]
    async fn test_memory_deactivate_unknown_plan_is_noop() {
        let store = MemoryMembershipStore::new();
        store.deactivate_by_plan("u1", "missing").await.unwrap();
        assert!(store.list_subscriptions("u1", false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_watch_sees_mutations() {
        let store = MemoryMembershipStore::new();
        let mut watch = store.watch_active("u1").await.unwrap();
        assert!(watch.snapshot().is_empty());

        let plan = test_plan("cw-pt", PlanCategory::Coworking);
        store
            .add_subscription("u1", &Subscription::new(&plan, BillingCycle::Monthly))
            .await
            .unwrap();

        let snapshot = watch.changed().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].plan_id, "cw-pt");

        store.deactivate_all("u1").await.unwrap();
        let snapshot = watch.changed().await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_watch_is_per_user() {
        let store = MemoryMembershipStore::new();
        let watch_other = store.watch_active("u2").await.unwrap();

        let plan = test_plan("dig-free", PlanCategory::Digital);
        store
            .add_subscription("u1", &Subscription::new(&plan, BillingCycle::Monthly))
            .await
            .unwrap();

        assert!(watch_other.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileMembershipStore::new(dir.path().to_path_buf()).unwrap();

        let plan = test_plan("fit-plus", PlanCategory::Fitness);
        store.put_plan(&plan).await.unwrap();
        let loaded = store.get_plan("fit-plus").await.unwrap();
        assert_eq!(loaded, Some(plan.clone()));

        let sub = Subscription::new(&plan, BillingCycle::Yearly);
        store.add_subscription("u1", &sub).await.unwrap();
        let subs = store.list_subscriptions("u1", true).await.unwrap();
        assert_eq!(subs, vec![sub.clone()]);

        store.deactivate_by_plan("u1", "fit-plus").await.unwrap();
        assert!(store.list_subscriptions("u1", true).await.unwrap().is_empty());
        let all = store.list_subscriptions("u1", false).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].active);
    }

    #[tokio::test]
    async fn test_file_store_seed_only_writes_when_empty() {
        let dir = tempdir().unwrap();
        let store = FileMembershipStore::new(dir.path().to_path_buf()).unwrap();

        let first = vec![test_plan("fit-basic", PlanCategory::Fitness)];
        store.seed_plans(&first).await.unwrap();
        assert_eq!(store.list_plans().await.unwrap().len(), 1);

        // Second seed observes a non-empty store and writes nothing.
        let second = vec![
            test_plan("stream-ind", PlanCategory::Streaming),
            test_plan("stream-fam", PlanCategory::Streaming),
        ];
        store.seed_plans(&second).await.unwrap();
        let plans = store.list_plans().await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].id, "fit-basic");
    }

    #[tokio::test]
    async fn test_file_store_missing_plan() {
        let dir = tempdir().unwrap();
        let store = FileMembershipStore::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(store.get_plan("nope").await.unwrap(), None);
    }
}
