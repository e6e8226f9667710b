//! Subscribe and cancel commands

use anyhow::{anyhow, Result};
use memberkit_core::{BillingCycle, MembershipError};
use std::path::Path;

use crate::ui;

#[tracing::instrument(skip(storage_dir))]
pub async fn subscribe(storage_dir: &Path, plan_id: &str, yearly: bool) -> Result<()> {
    let session = super::resume_session(storage_dir).await?;
    let billing = if yearly {
        BillingCycle::Yearly
    } else {
        BillingCycle::Monthly
    };

    let spinner = ui::spinner("Subscribing...");
    let result = session.subscribe(plan_id, billing).await;
    spinner.finish_and_clear();

    match result {
        Ok(sub) => {
            ui::success(&format!(
                "Subscribed to {} ({} billing).",
                sub.plan_name, sub.billing
            ));
            Ok(())
        }
        // A category conflict is a user-facing rule, not a failure of the
        // command itself.
        Err(err) if is_category_conflict(&err) => {
            ui::error(&format!("{err:#}"));
            ui::info("Cancel the current plan in this category first, then subscribe again.");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn is_category_conflict(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<MembershipError>(),
        Some(MembershipError::CategoryConflict(_))
    )
}

#[tracing::instrument(skip(storage_dir))]
pub async fn cancel(storage_dir: &Path, plan_id: &str, yes: bool) -> Result<()> {
    let session = super::resume_session(storage_dir).await?;

    if !yes && !ui::confirm(&format!("Cancel the subscription to '{plan_id}'?"), false)? {
        ui::info("Nothing cancelled.");
        return Ok(());
    }

    session.cancel_plan(plan_id).await?;
    ui::success(&format!("Subscription to '{plan_id}' cancelled."));
    Ok(())
}

#[tracing::instrument(skip(storage_dir))]
pub async fn cancel_all(storage_dir: &Path, yes: bool) -> Result<()> {
    let session = super::resume_session(storage_dir).await?;
    let state = session.state();
    let user = state.user().ok_or_else(|| anyhow!("no signed-in user"))?;

    if user.subscriptions.is_empty() {
        ui::info("No active subscriptions.");
        return Ok(());
    }

    if !yes
        && !ui::confirm(
            &format!("Cancel all {} active subscription(s)?", user.subscriptions.len()),
            false,
        )?
    {
        ui::info("Nothing cancelled.");
        return Ok(());
    }

    session.cancel_all().await?;
    ui::success("All subscriptions cancelled.");
    Ok(())
}
