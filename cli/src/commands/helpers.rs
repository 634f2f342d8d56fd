use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::models::{Category, Meal, NewIngredient, Recipe};
use larder_core::service::{KitchenService, PersistOutcome, RecipeFilter};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Parse a slot reference like `today:lunch` or `2024-01-15:dinner`.
pub(crate) fn parse_meal_ref(s: &str) -> Result<(NaiveDate, Meal)> {
    let Some((date, meal)) = s.split_once(':') else {
        bail!("Invalid meal reference '{s}'. Use format 'date:meal' (e.g. 'today:lunch')");
    };
    let date = parse_date(Some(date.to_string()))?;
    let meal = meal.parse::<Meal>()?;
    Ok((date, meal))
}

/// Parse `name[:amount[:unit[:category]]]`. A missing amount means 1.
pub(crate) fn parse_ingredient(s: &str) -> Result<NewIngredient> {
    let mut parts = s.split(':').map(str::trim);
    let name = parts.next().unwrap_or_default();
    if name.is_empty() {
        bail!("Ingredient '{s}' has no name. Use 'name:amount:unit:category'");
    }
    let amount = match parts.next().filter(|p| !p.is_empty()) {
        Some(raw) => raw
            .parse::<f64>()
            .with_context(|| format!("Invalid amount '{raw}' for ingredient {name}"))?,
        None => 1.0,
    };
    let unit = parts.next().unwrap_or_default().to_string();
    let category = match parts.next().filter(|p| !p.is_empty()) {
        Some(raw) => raw.parse::<Category>()?,
        None => Category::Other,
    };
    if parts.next().is_some() {
        bail!("Ingredient '{s}' has too many fields. Use 'name:amount:unit:category'");
    }
    Ok(NewIngredient {
        name: name.to_string(),
        amount,
        unit,
        category,
    })
}

/// Look a recipe up by id, falling back to a case-insensitive name match.
pub(crate) async fn resolve_recipe(service: &KitchenService, query: &str) -> Result<Option<Recipe>> {
    if let Some(recipe) = service.get_recipe(query).await? {
        return Ok(Some(recipe));
    }
    let wanted = query.trim().to_lowercase();
    Ok(service
        .list_recipes(&RecipeFilter::default())
        .await?
        .into_iter()
        .find(|r| r.name.to_lowercase() == wanted))
}

/// Print a not-found message (JSON or plain) and exit with status 2.
pub(crate) fn not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

/// One-line note about a best-effort write that did not land.
pub(crate) fn report_persistence(outcome: &PersistOutcome) {
    match outcome {
        PersistOutcome::Saved => {}
        PersistOutcome::Skipped(reason) => eprintln!("Note: not saved ({reason})"),
        PersistOutcome::Failed(reason) => {
            eprintln!("Warning: change kept for this run only, save failed: {reason}");
        }
    }
}

pub(crate) fn print_recipe_table(recipes: &[Recipe]) {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Serves")]
        servings: u32,
        #[tabled(rename = "Difficulty")]
        difficulty: String,
        #[tabled(rename = "Tags")]
        tags: String,
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: truncate(&r.id, 13),
            name: truncate(&r.name, 35),
            time: format!("{} min", r.cook_time),
            servings: r.servings,
            difficulty: r.difficulty.to_string(),
            tags: truncate(&r.tags.join(", "), 30),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Amounts without trailing zeros: `2`, `0.5`, `1.25`.
pub(crate) fn format_amount(v: f64) -> String {
    let v = if v == 0.0 { 0.0 } else { v };
    let s = format!("{v:.2}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_none() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
        assert_eq!(
            parse_date(Some("tomorrow".to_string())).unwrap(),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2024-01-15".to_string())).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date(Some("nope".to_string())).is_err());
    }

    #[test]
    fn test_parse_meal_ref() {
        let (date, meal) = parse_meal_ref("today:lunch").unwrap();
        assert_eq!(date, Local::now().date_naive());
        assert_eq!(meal, Meal::Lunch);

        let (date, meal) = parse_meal_ref("2024-03-04:Dinner").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(meal, Meal::Dinner);
    }

    #[test]
    fn test_parse_meal_ref_invalid() {
        assert!(parse_meal_ref("nocolon").is_err());
        assert!(parse_meal_ref("today:snack").is_err());
    }

    #[test]
    fn test_parse_ingredient_full() {
        let ing = parse_ingredient("Garlic:3:cloves:spice").unwrap();
        assert_eq!(ing.name, "Garlic");
        assert!((ing.amount - 3.0).abs() < f64::EPSILON);
        assert_eq!(ing.unit, "cloves");
        assert_eq!(ing.category, Category::Spice);
    }

    #[test]
    fn test_parse_ingredient_defaults() {
        let ing = parse_ingredient("Lemon").unwrap();
        assert!((ing.amount - 1.0).abs() < f64::EPSILON);
        assert_eq!(ing.unit, "");
        assert_eq!(ing.category, Category::Other);

        let ing = parse_ingredient(" Rice : 200 : g ").unwrap();
        assert_eq!(ing.name, "Rice");
        assert_eq!(ing.unit, "g");
    }

    #[test]
    fn test_parse_ingredient_invalid() {
        assert!(parse_ingredient(":2:g").is_err());
        assert!(parse_ingredient("Rice:lots").is_err());
        assert!(parse_ingredient("Rice:1:g:mineral").is_err());
        assert!(parse_ingredient("Rice:1:g:grain:extra").is_err());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(2.0), "2");
        assert_eq!(format_amount(0.5), "0.5");
        assert_eq!(format_amount(1.25), "1.25");
        assert_eq!(format_amount(-0.0), "0");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
        assert_eq!(truncate("Müsli", 10), "Müsli");
    }
}
