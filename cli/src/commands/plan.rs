use anyhow::{Result, bail};
use chrono::Local;
use rand::seq::IndexedRandom;
use tabled::{Table, Tabled, settings::Style};

use larder_core::models::{Meal, MealSlot, Recipe};
use larder_core::planner::SlotState;
use larder_core::service::RecipeFilter;

use super::Kitchen;
use super::helpers::{
    format_amount, not_found, parse_date, parse_meal_ref, report_persistence, resolve_recipe,
    truncate,
};

pub(crate) async fn cmd_plan_show(kitchen: &Kitchen, start: Option<String>, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct DayRow {
        #[tabled(rename = "Day")]
        day: String,
        #[tabled(rename = "Breakfast")]
        breakfast: String,
        #[tabled(rename = "Lunch")]
        lunch: String,
        #[tabled(rename = "Dinner")]
        dinner: String,
    }

    let start = parse_date(start)?;
    let today = Local::now().date_naive();
    let session = kitchen.session().await;
    let days = session.week(start, today);

    if json {
        println!(
            "{}",
            serde_json::json!({ "user_id": session.user_id(), "days": days })
        );
        return Ok(());
    }

    let cell = |r: Option<&Recipe>| r.map_or_else(|| "-".to_string(), |r| truncate(&r.name, 24));
    let rows: Vec<DayRow> = days
        .iter()
        .map(|d| DayRow {
            day: format!(
                "{}{} {} {}",
                if d.is_today { "* " } else { "" },
                d.weekday,
                d.day_num,
                d.date.format("%b")
            ),
            breakfast: cell(d.meal(Meal::Breakfast)),
            lunch: cell(d.meal(Meal::Lunch)),
            dinner: cell(d.meal(Meal::Dinner)),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    let planned = session.plan().len();
    println!("{planned} meal(s) planned in total");
    Ok(())
}

/// Assign a recipe to a slot. Without a recipe a random one is picked.
pub(crate) async fn cmd_plan_assign(
    kitchen: &Kitchen,
    slot: &str,
    recipe: Option<String>,
    json: bool,
) -> Result<()> {
    let (date, meal) = parse_meal_ref(slot)?;
    let recipe = match recipe {
        Some(query) => match resolve_recipe(&kitchen.service, &query).await? {
            Some(r) => r,
            None => not_found(&format!("Recipe '{query}' not found"), json),
        },
        None => {
            let recipes = kitchen.service.list_recipes(&RecipeFilter::default()).await?;
            match recipes.choose(&mut rand::rng()) {
                Some(r) => r.clone(),
                None => bail!("No recipes to pick from"),
            }
        }
    };

    let mut session = kitchen.session().await;
    let replaced = match session.plan().state(date, meal) {
        SlotState::Assigned(previous) => Some(previous.name.clone()),
        SlotState::Empty => None,
    };
    let outcome = session.assign(date, meal, recipe.clone()).await;

    if json {
        let slot = MealSlot {
            date,
            meal,
            recipe: Some(recipe),
        };
        println!(
            "{}",
            serde_json::json!({ "slot": slot, "persistence": outcome })
        );
    } else {
        println!("Planned {} for {meal} on {date}", recipe.name);
        if let Some(previous) = replaced {
            println!("  (replaces {previous})");
        }
        report_persistence(&outcome);
    }
    Ok(())
}

pub(crate) async fn cmd_plan_remove(kitchen: &Kitchen, slot: &str, json: bool) -> Result<()> {
    let (date, meal) = parse_meal_ref(slot)?;
    let mut session = kitchen.session().await;
    let (removed, outcome) = session.remove(date, meal).await;

    if json {
        println!(
            "{}",
            serde_json::json!({ "removed": removed, "persistence": outcome })
        );
        return Ok(());
    }
    match removed {
        Some(r) => println!("Removed {} from {meal} on {date}", r.name),
        None => println!("Nothing planned for {meal} on {date}"),
    }
    report_persistence(&outcome);
    Ok(())
}

pub(crate) async fn cmd_plan_ingredients(kitchen: &Kitchen, json: bool) -> Result<()> {
    let session = kitchen.session().await;
    let ingredients = session.planned_ingredients();

    if json {
        println!("{}", serde_json::to_string_pretty(&ingredients)?);
        return Ok(());
    }
    if ingredients.is_empty() {
        println!("No meals planned.");
        return Ok(());
    }
    for ing in &ingredients {
        println!(
            "  {} {} {} {}",
            ing.category.icon(),
            format_amount(ing.amount),
            ing.unit,
            ing.name
        );
    }
    Ok(())
}
