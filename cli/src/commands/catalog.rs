use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::models::{CatalogItem, Category, NewPackagingOption};
use larder_core::service::KitchenService;

use super::helpers::{format_amount, not_found, truncate};

pub(crate) async fn cmd_catalog_list(service: &KitchenService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct CatalogRow {
        #[tabled(rename = "Ingredient")]
        name: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Category")]
        category: String,
    }

    let items = service.list_catalog().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    if items.is_empty() {
        println!("Catalog is empty. Ingredients are remembered when recipes are saved.");
        return Ok(());
    }

    let rows: Vec<CatalogRow> = items
        .iter()
        .map(|i| CatalogRow {
            name: truncate(&i.name, 35),
            unit: i.default_unit.clone(),
            category: format!("{} {}", i.category.icon(), i.category),
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) async fn cmd_catalog_suggest(service: &KitchenService, name: &str, json: bool) -> Result<()> {
    let Some(item) = service.suggest(name).await? else {
        not_found(&format!("No catalog entry for '{name}'"), json);
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!("{}: {} ({})", item.name, item.default_unit, item.category);
    }
    Ok(())
}

pub(crate) async fn cmd_catalog_set(
    service: &KitchenService,
    name: &str,
    unit: &str,
    category: Category,
    json: bool,
) -> Result<()> {
    let item = CatalogItem {
        name: name.to_string(),
        default_unit: unit.to_string(),
        category,
    };
    service.upsert_catalog(vec![item.clone()]).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!("Saved {}: {} ({})", item.name.trim(), item.default_unit.trim(), item.category);
    }
    Ok(())
}

pub(crate) async fn cmd_packaging_list(
    service: &KitchenService,
    ingredient: &str,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct PackRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Pack size")]
        size: String,
        #[tabled(rename = "Unit")]
        unit: String,
    }

    let options = service.list_packaging(ingredient).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&options)?);
        return Ok(());
    }
    if options.is_empty() {
        println!("No pack sizes recorded for {ingredient}");
        return Ok(());
    }

    let rows: Vec<PackRow> = options
        .iter()
        .map(|o| PackRow {
            id: o.id.clone(),
            size: format_amount(o.pack_amount),
            unit: o.unit.clone(),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) async fn cmd_packaging_add(
    service: &KitchenService,
    ingredient: &str,
    pack_amount: f64,
    unit: &str,
    json: bool,
) -> Result<()> {
    let saved = service
        .add_packaging(NewPackagingOption {
            ingredient_name: ingredient.to_string(),
            unit: unit.to_string(),
            pack_amount,
        })
        .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!(
            "Added pack size {} {} for {} (id: {})",
            format_amount(saved.pack_amount),
            saved.unit,
            saved.ingredient_name,
            saved.id
        );
    }
    Ok(())
}

pub(crate) async fn cmd_packaging_delete(service: &KitchenService, id: &str, json: bool) -> Result<()> {
    service.delete_packaging(id).await?;
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted pack size {id}");
    }
    Ok(())
}
