//! Account commands: register, login, logout, whoami

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::ui;

#[tracing::instrument(skip(storage_dir, name, email))]
pub async fn register(storage_dir: &Path, name: Option<String>, email: Option<String>) -> Result<()> {
    ui::header("Register");

    let name = match name {
        Some(n) => n,
        None => ui::input("Name")?,
    };
    let email = match email {
        Some(e) => e,
        None => ui::input("Email")?,
    };
    let password = ui::password("Password")?;

    let session = super::build_session(storage_dir)?;
    session.register(&name, &email, &password).await?;

    let state = session.state();
    let user = state.user().ok_or_else(|| anyhow!("registration did not start a session"))?;
    ui::success(&format!("Welcome, {}! You are signed in.", user.name));
    ui::info("Browse plans with 'memberkit-demo plans'.");
    Ok(())
}

#[tracing::instrument(skip(storage_dir, email))]
pub async fn login(storage_dir: &Path, email: Option<String>) -> Result<()> {
    ui::header("Login");

    let email = match email {
        Some(e) => e,
        None => ui::input("Email")?,
    };
    let password = ui::password("Password")?;

    let session = super::build_session(storage_dir)?;
    session.login(&email, &password).await?;

    let state = session.state();
    let user = state.user().ok_or_else(|| anyhow!("login did not start a session"))?;
    if user.is_active {
        ui::success(&format!(
            "Welcome back, {} ({} active subscription(s)).",
            user.name,
            user.subscriptions.len()
        ));
    } else {
        ui::success(&format!("Welcome back, {}.", user.name));
    }
    Ok(())
}

#[tracing::instrument(skip(storage_dir))]
pub async fn logout(storage_dir: &Path) -> Result<()> {
    let session = super::build_session(storage_dir)?;
    session.resume().await?;
    session.logout().await?;
    ui::success("Signed out.");
    Ok(())
}

#[tracing::instrument(skip(storage_dir))]
pub async fn whoami(storage_dir: &Path) -> Result<()> {
    let session = super::resume_session(storage_dir).await?;
    let state = session.state();
    let user = state.user().ok_or_else(|| anyhow!("no signed-in user"))?;

    ui::key_value("Name", &user.name);
    ui::key_value("Email", &user.email);
    ui::key_value("Active", if user.is_active { "yes" } else { "no" });
    Ok(())
}
