//! Session/user aggregate: composes the auth provider's identity with the
//! live subscription set into a single view model for the UI.
//!
//! State is published through a `tokio::sync::watch` channel; screens hold a
//! receiver and re-render on every emission. While a mutation is in flight
//! the previous snapshot stays visible with `syncing` set
//! (stale-while-revalidate, not blank-while-loading). Change notifications
//! from the store replace the subscription list wholesale; the last arrival
//! wins and no merge logic exists because the store is the single source of
//! truth. The manager also follows the provider's auth-state stream: an
//! external sign-out tears the session down, a new identity re-attaches.

use crate::auth::{AuthProvider, Identity};
use crate::catalog::PlanCatalog;
use crate::rules::RulesEngine;
use crate::storage::{PlanStore, SubscriptionStore};
use crate::subscription::{BillingCycle, Subscription};
use crate::{MembershipError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// The user-facing view model: identity plus the active subscription set.
#[derive(Debug, Clone, PartialEq)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Active subscriptions, newest first.
    pub subscriptions: Vec<Subscription>,
    /// Derived: true iff any subscription is active.
    pub is_active: bool,
}

impl UserView {
    fn new(identity: Identity, subscriptions: Vec<Subscription>) -> Self {
        let is_active = RulesEngine::derive_status(&subscriptions);
        Self {
            id: identity.id,
            name: identity.name,
            email: identity.email,
            subscriptions,
            is_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    /// Login or registration in flight.
    Authenticating,
    Authenticated {
        user: UserView,
        /// A subscribe/cancel is in flight; the snapshot shown is stale.
        syncing: bool,
    },
}

impl SessionState {
    pub fn user(&self) -> Option<&UserView> {
        match self {
            SessionState::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }
}

/// Drives the session state machine over an auth provider and a
/// subscription store.
pub struct SessionManager {
    auth: Arc<dyn AuthProvider>,
    catalog: PlanCatalog,
    rules: RulesEngine,
    store: Arc<dyn SubscriptionStore>,
    state: Arc<watch::Sender<SessionState>>,
    listener: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
    auth_listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        plans: Arc<dyn PlanStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            auth,
            catalog: PlanCatalog::new(plans),
            rules: RulesEngine::new(subscriptions.clone()),
            store: subscriptions,
            state: Arc::new(state),
            listener: Arc::new(tokio::sync::Mutex::new(None)),
            auth_listener: std::sync::Mutex::new(None),
        }
    }

    /// Receiver for state changes; the UI re-renders on each emission.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// The current state snapshot.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Store reference (for history views and tests)
    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    /// Register a new account and start a session.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<()> {
        self.state.send_replace(SessionState::Authenticating);
        match self.auth.sign_up(name, email, password).await {
            Ok(identity) => {
                self.attach(identity).await;
                Ok(())
            }
            Err(err) => {
                self.state.send_replace(SessionState::Unauthenticated);
                Err(err)
            }
        }
    }

    /// Sign in and start a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        self.state.send_replace(SessionState::Authenticating);
        match self.auth.sign_in(email, password).await {
            Ok(identity) => {
                self.attach(identity).await;
                Ok(())
            }
            Err(err) => {
                self.state.send_replace(SessionState::Unauthenticated);
                Err(err)
            }
        }
    }

    /// Resume a persisted session, if the auth provider has one.
    ///
    /// Returns false when nobody is signed in.
    pub async fn resume(&self) -> Result<bool> {
        match self.auth.current_identity().await? {
            Some(identity) => {
                self.attach(identity).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// End the session. The change listener is detached FIRST so a late
    /// emission cannot write into a torn-down session, then identity is
    /// cleared.
    pub async fn logout(&self) -> Result<()> {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
        }
        self.auth.sign_out().await?;
        self.state.send_replace(SessionState::Unauthenticated);
        tracing::debug!("session ended");
        Ok(())
    }

    /// Subscribe the current user to `plan_id`.
    pub async fn subscribe(&self, plan_id: &str, billing: BillingCycle) -> Result<Subscription> {
        let user_id = self.require_user_id()?;
        let plan = self
            .catalog
            .fetch_plan_by_id(plan_id)
            .await
            .ok_or_else(|| MembershipError::NotFound(format!("plan '{plan_id}'")))?;

        self.set_syncing(true);
        let result = self.rules.subscribe(&user_id, &plan, billing).await;
        self.resync(&user_id).await;
        self.set_syncing(false);
        result
    }

    /// Cancel the current user's subscription to `plan_id` (idempotent).
    pub async fn cancel_plan(&self, plan_id: &str) -> Result<()> {
        let user_id = self.require_user_id()?;
        self.set_syncing(true);
        let result = self.rules.cancel(&user_id, plan_id).await;
        self.resync(&user_id).await;
        self.set_syncing(false);
        result
    }

    /// Cancel every active subscription of the current user.
    pub async fn cancel_all(&self) -> Result<()> {
        let user_id = self.require_user_id()?;
        self.set_syncing(true);
        let result = self.rules.cancel_all(&user_id).await;
        self.resync(&user_id).await;
        self.set_syncing(false);
        result
    }

    /// Manually re-read the subscription snapshot.
    pub async fn refresh(&self) -> Result<()> {
        let user_id = self.require_user_id()?;
        self.resync(&user_id).await;
        Ok(())
    }

    /// Start an authenticated session and make sure the auth-state stream
    /// is being followed.
    async fn attach(&self, identity: Identity) {
        attach_session(&self.store, &self.state, &self.listener, identity).await;
        self.ensure_auth_listener();
    }

    /// Follow the provider's auth-state stream, once per manager. A `None`
    /// emission (external sign-out) releases the subscription listener and
    /// clears the session; a new identity re-attaches. Emissions for the
    /// identity already attached are skipped.
    fn ensure_auth_listener(&self) {
        let mut guard = self.auth_listener.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return;
        }
        let mut auth_watch = self.auth.subscribe_auth_state();
        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);
        let listener = Arc::clone(&self.listener);
        *guard = Some(tokio::spawn(async move {
            while let Some(change) = auth_watch.changed().await {
                match change {
                    Some(identity) => {
                        let attached = state
                            .borrow()
                            .user()
                            .is_some_and(|u| u.id == identity.id);
                        if !attached {
                            attach_session(&store, &state, &listener, identity).await;
                        }
                    }
                    None => {
                        if let Some(handle) = listener.lock().await.take() {
                            handle.abort();
                        }
                        state.send_replace(SessionState::Unauthenticated);
                        tracing::debug!("identity cleared by the auth provider");
                    }
                }
            }
        }));
    }

    async fn resync(&self, user_id: &str) {
        match self.store.list_subscriptions(user_id, true).await {
            Ok(subs) => {
                self.state
                    .send_if_modified(|current| apply_snapshot(current, user_id, subs));
            }
            Err(err) => {
                tracing::warn!("subscription re-read failed, keeping previous snapshot: {err:#}");
            }
        }
    }

    fn set_syncing(&self, syncing: bool) {
        self.state.send_if_modified(|current| {
            if let SessionState::Authenticated { syncing: flag, .. } = current {
                if *flag != syncing {
                    *flag = syncing;
                    return true;
                }
            }
            false
        });
    }

    fn require_user_id(&self) -> Result<String> {
        match self.state.borrow().user() {
            Some(user) => Ok(user.id.clone()),
            None => Err(MembershipError::Auth("not signed in".to_string()).into()),
        }
    }
}

/// One snapshot read, then a live listener replacing any previous one. The
/// listener applies the watch's creation-time snapshot before waiting, so a
/// write landing between the read and the watch attach is not lost. Both
/// failures degrade (empty list, no listener) rather than failing the login.
async fn attach_session(
    store: &Arc<dyn SubscriptionStore>,
    state: &Arc<watch::Sender<SessionState>>,
    listener: &tokio::sync::Mutex<Option<JoinHandle<()>>>,
    identity: Identity,
) {
    let subscriptions = match store.list_subscriptions(&identity.id, true).await {
        Ok(subs) => subs,
        Err(err) => {
            tracing::warn!("subscription snapshot failed on login, starting empty: {err:#}");
            Vec::new()
        }
    };
    state.send_replace(SessionState::Authenticated {
        user: UserView::new(identity.clone(), subscriptions),
        syncing: false,
    });

    match store.watch_active(&identity.id).await {
        Ok(mut sub_watch) => {
            let state = Arc::clone(state);
            let user_id = identity.id;
            let handle = tokio::spawn(async move {
                let current = sub_watch.snapshot();
                state.send_if_modified(|s| apply_snapshot(s, &user_id, current));
                while let Some(snapshot) = sub_watch.changed().await {
                    state.send_if_modified(|s| apply_snapshot(s, &user_id, snapshot));
                }
            });
            let mut guard = listener.lock().await;
            if let Some(old) = guard.replace(handle) {
                old.abort();
            }
        }
        Err(err) => {
            tracing::warn!("change listener unavailable, relying on re-reads: {err:#}");
        }
    }
}

/// Replace the subscription list for `user_id`, recomputing `is_active`.
/// Emissions for any other (logged-out or switched) user are dropped.
fn apply_snapshot(state: &mut SessionState, user_id: &str, snapshot: Vec<Subscription>) -> bool {
    if let SessionState::Authenticated { user, .. } = state {
        if user.id == user_id {
            user.subscriptions = snapshot;
            user.is_active = RulesEngine::derive_status(&user.subscriptions);
            return true;
        }
    }
    false
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self
            .auth_listener
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
        if let Ok(mut guard) = self.listener.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
