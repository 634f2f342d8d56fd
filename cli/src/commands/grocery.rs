use anyhow::Result;

use larder_core::models::{Category, NewCustomItem};

use super::Kitchen;
use super::helpers::{format_amount, not_found, report_persistence};

pub(crate) async fn cmd_grocery_show(kitchen: &Kitchen, json: bool) -> Result<()> {
    let session = kitchen.session().await;
    let view = session.grocery_view();

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    if view.groups.is_empty() {
        println!("Grocery list is empty. Plan some meals with: larder plan assign <date:meal>");
        return Ok(());
    }

    let p = &view.progress;
    println!(
        "Grocery list: {}/{} checked ({}%), from {} planned meal(s)\n",
        p.checked, p.total, p.percent, view.planned_recipes
    );
    for group in &view.groups {
        println!("{} {}", group.category.icon(), group.category.as_str().to_uppercase());
        for item in &group.items {
            let mark = if item.checked { "[x]" } else { "[ ]" };
            let custom = if item.is_custom { " (custom)" } else { "" };
            println!(
                "  {mark} {} {} {}{custom}",
                format_amount(item.amount),
                item.unit,
                item.name
            );
        }
    }
    Ok(())
}

pub(crate) async fn cmd_grocery_check(kitchen: &Kitchen, query: &str, json: bool) -> Result<()> {
    let mut session = kitchen.session().await;
    let Some(id) = session.find_item(query).map(|i| i.id.clone()) else {
        not_found(&format!("Grocery item '{query}' not found"), json);
    };
    let Some((item, outcome)) = session.toggle_item(&id).await else {
        not_found(&format!("Grocery item '{query}' not found"), json);
    };

    if json {
        println!(
            "{}",
            serde_json::json!({ "item": item, "persistence": outcome })
        );
    } else {
        let state = if item.checked { "Checked" } else { "Unchecked" };
        println!("{state} {}", item.name);
        report_persistence(&outcome);
    }
    Ok(())
}

pub(crate) async fn cmd_grocery_add(
    kitchen: &Kitchen,
    name: Option<String>,
    amount: Option<f64>,
    unit: Option<String>,
    category: Option<Category>,
    json: bool,
) -> Result<()> {
    let mut session = kitchen.session().await;
    let (item, outcome) = session
        .add_custom_item(NewCustomItem {
            name,
            amount,
            unit,
            category,
        })
        .await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "item": item, "persistence": outcome })
        );
    } else {
        println!(
            "Added {} {} {}",
            format_amount(item.amount),
            item.unit,
            item.name
        );
        report_persistence(&outcome);
    }
    Ok(())
}

pub(crate) async fn cmd_grocery_remove(kitchen: &Kitchen, query: &str, json: bool) -> Result<()> {
    let mut session = kitchen.session().await;
    let Some(id) = session.find_item(query).map(|i| i.id.clone()) else {
        not_found(&format!("Grocery item '{query}' not found"), json);
    };
    let Some((item, outcome)) = session.remove_item(&id).await else {
        not_found(&format!("Grocery item '{query}' not found"), json);
    };

    if json {
        println!(
            "{}",
            serde_json::json!({ "item": item, "persistence": outcome })
        );
    } else {
        println!("Removed {}", item.name);
        if !item.is_custom {
            eprintln!("Note: planned ingredients come back while their meals stay planned");
        }
        report_persistence(&outcome);
    }
    Ok(())
}

pub(crate) async fn cmd_grocery_clear(kitchen: &Kitchen, json: bool) -> Result<()> {
    let mut session = kitchen.session().await;
    let count = session.grocery().len();
    let outcome = session.clear_list().await;

    if json {
        println!(
            "{}",
            serde_json::json!({ "cleared": count, "persistence": outcome })
        );
    } else {
        println!("Cleared {count} item(s)");
        report_persistence(&outcome);
    }
    Ok(())
}
