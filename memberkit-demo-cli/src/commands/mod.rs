//! Command implementations

pub mod auth;
pub mod plans;
pub mod profile;
pub mod subscriptions;

use anyhow::{anyhow, Result};
use memberkit_core::{FileAuthProvider, FileMembershipStore, SessionManager};
use std::path::Path;
use std::sync::Arc;

/// Build a session manager over the file-backed store and auth provider.
pub fn build_session(storage_dir: &Path) -> Result<SessionManager> {
    let store = Arc::new(FileMembershipStore::new(storage_dir.join("store"))?);
    let auth = Arc::new(FileAuthProvider::new(storage_dir.join("auth"))?);
    Ok(SessionManager::new(auth, store.clone(), store))
}

/// Build a session manager and resume the persisted sign-in.
pub async fn resume_session(storage_dir: &Path) -> Result<SessionManager> {
    let session = build_session(storage_dir)?;
    if !session.resume().await? {
        return Err(anyhow!(
            "not signed in. Run 'memberkit-demo login' or 'memberkit-demo register' first."
        ));
    }
    Ok(session)
}
