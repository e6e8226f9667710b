//! Plan catalog commands

use anyhow::{anyhow, Result};
use memberkit_core::{Plan, PlanCategory};
use std::path::Path;
use std::str::FromStr;

use crate::ui;

#[tracing::instrument(skip(storage_dir))]
pub async fn list(storage_dir: &Path, category: Option<String>) -> Result<()> {
    let filter = category
        .as_deref()
        .map(PlanCategory::from_str)
        .transpose()?;

    let session = super::build_session(storage_dir)?;
    let spinner = ui::spinner("Loading catalog...");
    let plans = session.catalog().fetch_plans().await;
    spinner.finish_and_clear();

    ui::header("Plan Catalog");
    for category in PlanCategory::ALL {
        if filter.is_some_and(|f| f != category) {
            continue;
        }
        let in_category: Vec<&Plan> = plans.iter().filter(|p| p.category == category).collect();
        if in_category.is_empty() {
            continue;
        }
        println!("\n  [{category}]");
        for plan in in_category {
            println!(
                "  {} {:<12} {:<10} {}/mo  {}/yr",
                plan.image_emoji,
                plan.name,
                plan.id,
                ui::price(plan.price_monthly),
                ui::price(plan.price_yearly),
            );
        }
    }
    println!();
    ui::info("See details with 'memberkit-demo plan <id>'.");
    Ok(())
}

#[tracing::instrument(skip(storage_dir))]
pub async fn show(storage_dir: &Path, plan_id: &str) -> Result<()> {
    let session = super::build_session(storage_dir)?;
    let plan = session
        .catalog()
        .fetch_plan_by_id(plan_id)
        .await
        .ok_or_else(|| anyhow!("no plan with id '{plan_id}'"))?;

    ui::header(&format!("{} {}", plan.image_emoji, plan.name));
    ui::key_value("Id", &plan.id);
    ui::key_value("Category", plan.category.as_str());
    if let Some(tier) = &plan.tier {
        ui::key_value("Tier", tier);
    }
    ui::key_value("Monthly", &ui::price(plan.price_monthly));
    ui::key_value("Yearly", &ui::price(plan.price_yearly));
    if !plan.description.is_empty() {
        println!("\n  {}", plan.description);
    }
    if !plan.features.is_empty() {
        println!();
        for feature in &plan.features {
            println!("  • {feature}");
        }
    }
    Ok(())
}
