//! Profile view

use anyhow::{anyhow, Result};
use memberkit_core::{SubscriptionStore, UserView};
use std::path::Path;

use crate::ui;

#[tracing::instrument(skip(storage_dir))]
pub async fn show(storage_dir: &Path, include_history: bool) -> Result<()> {
    let session = super::resume_session(storage_dir).await?;
    let state = session.state();
    let user = state.user().ok_or_else(|| anyhow!("no signed-in user"))?;

    ui::header("Profile");
    ui::key_value("Name", &user.name);
    ui::key_value("Email", &user.email);
    ui::key_value(
        "Status",
        if user.is_active { "active member" } else { "no active subscriptions" },
    );

    print_subscriptions(user);

    if include_history {
        let history = history_for(&session, user).await?;
        if !history.is_empty() {
            ui::header("Cancelled");
            for sub in history {
                println!(
                    "  {}  {} ({})",
                    started_on(sub.started_at),
                    sub.plan_name,
                    sub.category
                );
            }
        }
    }
    Ok(())
}

fn print_subscriptions(user: &UserView) {
    if user.subscriptions.is_empty() {
        return;
    }
    ui::header("Active subscriptions");
    for sub in &user.subscriptions {
        println!(
            "  {}  {} ({}), {} billing",
            started_on(sub.started_at),
            sub.plan_name,
            sub.category,
            sub.billing
        );
    }
    ui::separator();
}

async fn history_for(
    session: &memberkit_core::SessionManager,
    user: &UserView,
) -> Result<Vec<memberkit_core::Subscription>> {
    let all = session.store().list_subscriptions(&user.id, false).await?;
    Ok(all.into_iter().filter(|s| !s.active).collect())
}

fn started_on(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
