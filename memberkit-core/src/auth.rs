//! Auth provider abstraction with local implementations.
//!
//! The real system delegates identity to a hosted provider; these local
//! providers reproduce its contract (sign-up, sign-in, sign-out, and an
//! auth-state stream) for tests and demos. Passwords are argon2-hashed even
//! in the mock; plaintext credentials are never stored.

use crate::{MembershipError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::watch;

/// Identity fields owned by the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Handle to the auth-state stream; emits the current identity (or `None`)
/// on every sign-in and sign-out.
pub struct AuthWatch {
    rx: watch::Receiver<Option<Identity>>,
}

impl AuthWatch {
    /// Wait for the next auth-state change. Returns `None` once the
    /// provider has gone away.
    pub async fn changed(&mut self) -> Option<Option<Identity>> {
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow_and_update().clone()),
            Err(_) => None,
        }
    }

    pub fn current(&self) -> Option<Identity> {
        self.rx.borrow().clone()
    }

    pub fn release(self) {}
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Register a new account and sign it in.
    async fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<Identity>;

    /// Sign in with credentials.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;

    /// Sign out the current identity, if any.
    async fn sign_out(&self) -> Result<()>;

    /// The currently signed-in identity, if any.
    async fn current_identity(&self) -> Result<Option<Identity>>;

    /// Attach a listener for auth-state changes.
    fn subscribe_auth_state(&self) -> AuthWatch;
}

#[derive(Clone, Serialize, Deserialize)]
struct StoredUser {
    identity: Identity,
    password_hash: String,
}

fn hash_password(password: &str) -> Result<String> {
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
    use argon2::Argon2;

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| MembershipError::Auth(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::password_hash::{PasswordHash, PasswordVerifier};
    use argon2::Argon2;

    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn validate_credentials(email: &str, password: &str) -> Result<()> {
    if !email.contains('@') {
        return Err(MembershipError::InvalidArgument(format!("invalid email '{email}'")).into());
    }
    if password.is_empty() {
        return Err(
            MembershipError::InvalidArgument("password cannot be empty".to_string()).into(),
        );
    }
    Ok(())
}

/// In-memory auth provider for tests and embedded demos.
pub struct MemoryAuthProvider {
    users: Mutex<HashMap<String, StoredUser>>,
    state: watch::Sender<Option<Identity>>,
}

impl MemoryAuthProvider {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            users: Mutex::new(HashMap::new()),
            state,
        }
    }
}

impl Default for MemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    async fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<Identity> {
        validate_credentials(email, password)?;
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        if users.contains_key(email) {
            return Err(MembershipError::Auth("email already registered".to_string()).into());
        }

        let identity = Identity {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
        };
        users.insert(
            email.to_string(),
            StoredUser {
                identity: identity.clone(),
                password_hash: hash_password(password)?,
            },
        );
        drop(users);

        self.state.send_replace(Some(identity.clone()));
        tracing::info!(email, "account registered");
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let identity = users
            .get(email)
            .filter(|u| verify_password(password, &u.password_hash))
            .map(|u| u.identity.clone())
            .ok_or_else(|| MembershipError::Auth("invalid credentials".to_string()))?;
        drop(users);

        self.state.send_replace(Some(identity.clone()));
        tracing::debug!(email, "signed in");
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<()> {
        self.state.send_replace(None);
        Ok(())
    }

    async fn current_identity(&self) -> Result<Option<Identity>> {
        Ok(self.state.borrow().clone())
    }

    fn subscribe_auth_state(&self) -> AuthWatch {
        AuthWatch {
            rx: self.state.subscribe(),
        }
    }
}

/// File-backed auth provider for the demo CLI.
///
/// Accounts live in `users.json`; the signed-in identity persists across
/// processes in `session.json`, mirroring a hosted provider's session
/// persistence.
pub struct FileAuthProvider {
    base_path: PathBuf,
    state: watch::Sender<Option<Identity>>,
}

impl FileAuthProvider {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path)?;
        let initial = Self::read_session(&base_path)?;
        let (state, _) = watch::channel(initial);
        Ok(Self { base_path, state })
    }

    fn users_path(&self) -> PathBuf {
        self.base_path.join("users.json")
    }

    fn session_path(base: &Path) -> PathBuf {
        base.join("session.json")
    }

    fn load_users(&self) -> Result<HashMap<String, StoredUser>> {
        let path = self.users_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn save_users(&self, users: &HashMap<String, StoredUser>) -> Result<()> {
        let json = serde_json::to_string_pretty(users)?;
        std::fs::write(self.users_path(), json)?;
        Ok(())
    }

    fn read_session(base: &Path) -> Result<Option<Identity>> {
        let path = Self::session_path(base);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn write_session(&self, identity: Option<&Identity>) -> Result<()> {
        let path = Self::session_path(&self.base_path);
        match identity {
            Some(identity) => {
                std::fs::write(path, serde_json::to_string_pretty(identity)?)?;
            }
            None if path.exists() => std::fs::remove_file(path)?,
            None => {}
        }
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for FileAuthProvider {
    async fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<Identity> {
        validate_credentials(email, password)?;
        let mut users = self.load_users()?;
        if users.contains_key(email) {
            return Err(MembershipError::Auth("email already registered".to_string()).into());
        }

        let identity = Identity {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
        };
        users.insert(
            email.to_string(),
            StoredUser {
                identity: identity.clone(),
                password_hash: hash_password(password)?,
            },
        );
        self.save_users(&users)?;
        self.write_session(Some(&identity))?;
        self.state.send_replace(Some(identity.clone()));
        tracing::info!(email, "account registered");
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let users = self.load_users()?;
        let identity = users
            .get(email)
            .filter(|u| verify_password(password, &u.password_hash))
            .map(|u| u.identity.clone())
            .ok_or_else(|| MembershipError::Auth("invalid credentials".to_string()))?;

        self.write_session(Some(&identity))?;
        self.state.send_replace(Some(identity.clone()));
        tracing::debug!(email, "signed in");
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<()> {
        self.write_session(None)?;
        self.state.send_replace(None);
        Ok(())
    }

    async fn current_identity(&self) -> Result<Option<Identity>> {
        Ok(self.state.borrow().clone())
    }

    fn subscribe_auth_state(&self) -> AuthWatch {
        AuthWatch {
            rx: self.state.subscribe(),
        }
    }
}
