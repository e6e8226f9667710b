//! # Memberkit Core
//!
//! Subscription lifecycle rules for a membership app: users hold at most one
//! active subscription per plan category, cancellation is a soft state
//! transition (records are never deleted), and the user-facing view is kept
//! in sync with the backing store through change-notification streams.
//!
//! The store and the auth provider are external collaborators behind the
//! [`storage::SubscriptionStore`] / [`storage::PlanStore`] and
//! [`auth::AuthProvider`] traits. Local memory- and file-backed
//! implementations are provided for tests and demo applications.
//!
//! ## Error policy
//! Read paths degrade gracefully (builtin catalog fallback, empty snapshot
//! on login). Write paths never retry automatically and always surface the
//! failure to the caller.

pub mod auth;
pub mod catalog;
pub mod plan;
pub mod rules;
pub mod session;
pub mod storage;
pub mod subscription;

pub use auth::{AuthProvider, AuthWatch, FileAuthProvider, Identity, MemoryAuthProvider};
pub use catalog::{builtin_plans, PlanCatalog};
pub use plan::{Plan, PlanCategory};
pub use rules::RulesEngine;
pub use session::{SessionManager, SessionState, UserView};
pub use storage::{
    FileMembershipStore, MemoryMembershipStore, PlanStore, SubscriptionStore, SubscriptionWatch,
};
pub use subscription::{BillingCycle, Subscription};

pub type Result<T> = anyhow::Result<T>;

#[derive(thiserror::Error, Debug)]
pub enum MembershipError {
    /// The user already holds an active subscription in this category.
    /// Surfaced to the user as a blocking message; never retried.
    #[error("an active subscription already exists in category '{0}'")]
    CategoryConflict(PlanCategory),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("backend unavailable: {0}")]
    Backend(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
