use anyhow::{Context, Result, bail};
use std::path::Path;

use larder_core::backend::BackendKind;
use larder_core::imaging::to_data_url;
use larder_core::models::{
    Category, CooklangIngredient, Difficulty, NewIngredient, NewRecipe, normalize_tags,
};
use larder_core::service::{KitchenService, RecipeFilter};

use super::helpers::{format_amount, not_found, print_recipe_table, resolve_recipe};

pub(crate) async fn cmd_recipe_list(
    service: &KitchenService,
    search: Option<String>,
    tags: Vec<String>,
    json: bool,
) -> Result<()> {
    let filter = RecipeFilter { search, tags };
    let recipes = service.list_recipes(&filter).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }
    if recipes.is_empty() {
        println!("No recipes match.");
        return Ok(());
    }
    print_recipe_table(&recipes);
    Ok(())
}

pub(crate) async fn cmd_recipe_show(service: &KitchenService, query: &str, json: bool) -> Result<()> {
    let Some(recipe) = resolve_recipe(service, query).await? else {
        not_found(&format!("Recipe '{query}' not found"), json);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
        return Ok(());
    }

    let name = &recipe.name;
    println!("=== {name} ===");
    if !recipe.description.is_empty() {
        println!("  {}", recipe.description);
    }
    println!(
        "  {} min  |  serves {}  |  {}",
        recipe.cook_time, recipe.servings, recipe.difficulty
    );
    if !recipe.tags.is_empty() {
        println!("  Tags: {}", recipe.tags.join(", "));
    }
    if !recipe.image.is_empty() && !recipe.image.starts_with("data:") {
        println!("  Image: {}", recipe.image);
    }

    println!("\n  INGREDIENTS:");
    for ing in &recipe.ingredients {
        println!(
            "    {} {} {} {}",
            ing.category.icon(),
            format_amount(ing.amount),
            ing.unit,
            ing.name
        );
    }

    println!("\n  STEPS:");
    for (i, step) in recipe.instructions.iter().enumerate() {
        println!("    {}. {step}", i + 1);
    }
    Ok(())
}

pub(crate) async fn cmd_recipe_tags(service: &KitchenService, json: bool) -> Result<()> {
    let tags = service.tags().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
    } else if tags.is_empty() {
        println!("No tags yet.");
    } else {
        println!("{}", tags.join(", "));
    }
    Ok(())
}

pub(crate) async fn cmd_recipe_seed(service: &KitchenService, json: bool) -> Result<()> {
    if service.kind() == BackendKind::Local {
        bail!("Sample recipes are built in locally; seeding needs a remote backend");
    }
    let inserted = service.seed_samples().await?;
    if json {
        println!("{}", serde_json::json!({ "inserted": inserted }));
    } else if inserted == 0 {
        println!("Recipe table already has recipes, nothing seeded");
    } else {
        println!("Seeded {inserted} sample recipes");
    }
    Ok(())
}

/// Fields for `recipe create` collected from the command line.
pub(crate) struct RecipeArgs {
    pub file: Option<std::path::PathBuf>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub cook_time: u32,
    pub servings: u32,
    pub difficulty: Difficulty,
    pub ingredients: Vec<NewIngredient>,
    pub steps: Vec<String>,
    pub tags: Vec<String>,
    pub image: Option<String>,
}

pub(crate) async fn cmd_recipe_create(
    service: &KitchenService,
    args: RecipeArgs,
    json: bool,
) -> Result<()> {
    let mut input = match &args.file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            serde_json::from_str::<NewRecipe>(&raw)
                .with_context(|| format!("Invalid recipe JSON in {}", path.display()))?
        }
        None => NewRecipe {
            name: args.name.clone().context("--name is required without --file")?,
            description: args.description.clone().unwrap_or_default(),
            image: None,
            cook_time: args.cook_time,
            servings: args.servings,
            difficulty: args.difficulty,
            ingredients: args.ingredients,
            instructions: args.steps,
            tags: args.tags,
        },
    };
    if let Some(image) = args.image.as_deref() {
        input.image = Some(load_image(image)?);
    }

    autofill(service, &mut input).await;
    let recipe = service.create_recipe(input).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let (id, name) = (&recipe.id, &recipe.name);
        println!("Created recipe: {name} (id: {id})");
        if recipe.image.is_empty() && args.image.is_some() {
            eprintln!("Note: image could not be stored, recipe saved without it");
        }
    }
    Ok(())
}

/// Paths become embedded data URLs; anything else is used as an image URL.
fn load_image(image: &str) -> Result<String> {
    let path = Path::new(image);
    if !path.exists() {
        return Ok(image.to_string());
    }
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read image: {}", path.display()))?;
    let mime = match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase) {
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "webp" => "image/webp",
        _ => "image/jpeg",
    };
    Ok(to_data_url(mime, &data))
}

/// Catalog autofill is a convenience; a catalog read failure only costs the hints.
async fn autofill(service: &KitchenService, input: &mut NewRecipe) {
    match service.autofill(input, false).await {
        Ok(0) => {}
        Ok(n) => tracing::debug!(matched = n, "filled ingredient defaults from catalog"),
        Err(e) => tracing::warn!(error = %format!("{e:#}"), "catalog unavailable, skipping autofill"),
    }
}

/// Overrides for `recipe import`.
pub(crate) struct ImportArgs {
    pub name: Option<String>,
    pub description: Option<String>,
    pub servings: Option<u32>,
    pub cook_time: Option<u32>,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
}

pub(crate) async fn cmd_recipe_import(
    service: &KitchenService,
    file: &Path,
    args: ImportArgs,
    json: bool,
) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let (recipe_data, _report) = cooklang::parse(&input)
        .into_result()
        .map_err(|e| anyhow::anyhow!("Failed to parse Cooklang file: {e}"))?;

    let name = args
        .name
        .or_else(|| recipe_data.metadata.title().map(String::from))
        .or_else(|| file.file_stem().and_then(|s| s.to_str()).map(String::from))
        .context("Could not determine recipe name. Use --name to specify one")?;

    let servings = args
        .servings
        .or_else(|| {
            recipe_data
                .metadata
                .servings()
                .and_then(|s| s.as_number())
        })
        .unwrap_or(1);

    let converter = cooklang::Converter::default();
    let grouped = recipe_data.group_ingredients(&converter);
    let ingredients: Vec<NewIngredient> = grouped
        .iter()
        .map(|gi| to_new_ingredient(&cooklang_ingredient(gi)))
        .collect();

    if ingredients.is_empty() {
        bail!("No ingredients found in recipe");
    }

    let instructions = plain_steps(&recipe_data);
    let description = args
        .description
        .unwrap_or_else(|| format!("Imported from {}", file.display()));

    let mut new_recipe = NewRecipe {
        name,
        description,
        image: None,
        cook_time: args.cook_time.unwrap_or(0),
        servings,
        difficulty: args.difficulty,
        ingredients,
        instructions,
        tags: normalize_tags(args.tags),
    };
    autofill(service, &mut new_recipe).await;
    let recipe = service.create_recipe(new_recipe).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let rname = &recipe.name;
        let ing_count = recipe.ingredients.len();
        let step_count = recipe.instructions.len();
        println!(
            "Imported recipe: {rname} ({ing_count} ingredients, {step_count} steps, serves {})",
            recipe.servings
        );
    }
    Ok(())
}

fn cooklang_ingredient(gi: &cooklang::ingredient_list::GroupedIngredient<'_>) -> CooklangIngredient {
    // First quantity of the group, if any
    let (quantity, units) =
        gi.quantity
            .iter()
            .next()
            .map_or((None, None), |qty: &cooklang::Quantity| {
                let value = match qty.value() {
                    cooklang::Value::Number(n) => serde_json::Number::from_f64(n.value())
                        .map(serde_json::Value::Number),
                    cooklang::Value::Range { start, .. } => {
                        serde_json::Number::from_f64(start.value()).map(serde_json::Value::Number)
                    }
                    cooklang::Value::Text(t) => Some(serde_json::Value::String(t.clone())),
                };
                (value, qty.unit().map(String::from))
            });

    CooklangIngredient {
        name: gi.ingredient.display_name().to_string(),
        quantity,
        units,
    }
}

fn to_new_ingredient(ing: &CooklangIngredient) -> NewIngredient {
    NewIngredient {
        name: ing.name.clone(),
        amount: ing.amount(),
        unit: ing.units.clone().unwrap_or_default(),
        category: Category::Other,
    }
}

/// Step text of a parsed Cooklang recipe, one string per step.
///
/// Ingredients and cookware appear by display name and timers by their
/// duration. Note paragraphs are dropped.
pub(crate) fn plain_steps(recipe: &cooklang::Recipe) -> Vec<String> {
    recipe
        .sections
        .iter()
        .flat_map(|section| &section.content)
        .filter_map(|content| match content {
            cooklang::Content::Step(step) => Some(step_text(recipe, &step.items)),
            cooklang::Content::Text(_) => None,
        })
        .filter(|text| !text.is_empty())
        .collect()
}

fn step_text(recipe: &cooklang::Recipe, items: &[cooklang::Item]) -> String {
    let mut out = String::new();
    for item in items {
        match item {
            cooklang::Item::Text { value } => out.push_str(value),
            cooklang::Item::Ingredient { index } => {
                if let Some(ing) = recipe.ingredients.get(*index) {
                    out.push_str(&ing.display_name());
                }
            }
            cooklang::Item::Cookware { index } => {
                if let Some(cw) = recipe.cookware.get(*index) {
                    out.push_str(cw.display_name());
                }
            }
            cooklang::Item::Timer { index } => {
                if let Some(timer) = recipe.timers.get(*index) {
                    match (&timer.quantity, &timer.name) {
                        (Some(q), _) => out.push_str(&q.to_string()),
                        (None, Some(name)) => out.push_str(name),
                        (None, None) => {}
                    }
                }
            }
            cooklang::Item::InlineQuantity { index } => {
                if let Some(q) = recipe.inline_quantities.get(*index) {
                    out.push_str(&q.to_string());
                }
            }
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps_of(input: &str) -> Vec<String> {
        let (recipe, _report) = cooklang::parse(input).into_result().unwrap();
        plain_steps(&recipe)
    }

    #[test]
    fn test_steps_render_components_as_words() {
        assert_eq!(
            steps_of("Heat @olive oil{2%tbsp} in a #large pan{}. Chop @onion{1}(diced) finely."),
            vec!["Heat olive oil in a large pan. Chop onion finely.".to_string()]
        );
        assert_eq!(
            steps_of("Bake for ~{25%minutes}."),
            vec!["Bake for 25 minutes.".to_string()]
        );
    }

    #[test]
    fn test_steps_drop_comments() {
        let input = ">> servings: 2\n\
                     Boil @water{1%l}. -- a comment\n\
                     Add @pasta{200%g} and stir.\n\
                     \n\
                     Mix @flour{200%g} [- grandma's secret -] well. -- trailing\n";
        assert_eq!(
            steps_of(input),
            vec![
                "Boil water. Add pasta and stir.".to_string(),
                "Mix flour well.".to_string(),
            ]
        );
    }

    #[test]
    fn test_steps_across_sections() {
        let input = "---\ntitle: Toast\n---\n= Prep\nSlice @bread{2%slices}.\n\n= Cook\nToast it.";
        assert_eq!(
            steps_of(input),
            vec!["Slice bread.".to_string(), "Toast it.".to_string()]
        );
    }

    #[test]
    fn test_cooklang_amounts() {
        let ing = CooklangIngredient {
            name: "flour".to_string(),
            quantity: Some(serde_json::json!(250.0)),
            units: Some("g".to_string()),
        };
        let converted = to_new_ingredient(&ing);
        assert!((converted.amount - 250.0).abs() < f64::EPSILON);
        assert_eq!(converted.unit, "g");

        let vague = CooklangIngredient {
            name: "salt".to_string(),
            quantity: Some(serde_json::json!("a pinch")),
            units: None,
        };
        let converted = to_new_ingredient(&vague);
        assert!(converted.amount.abs() < f64::EPSILON);
        assert_eq!(converted.unit, "");
    }

    #[tokio::test]
    async fn test_import_creates_recipe() {
        use larder_core::local::LocalBackend;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garlic_toast.cook");
        std::fs::write(
            &path,
            "Rub @garlic{2%cloves} over @bread{2%slices}.\n\nToast for ~{3%minutes}.\n",
        )
        .unwrap();

        let service = KitchenService::new(Arc::new(LocalBackend::in_memory().unwrap()));
        let args = ImportArgs {
            name: None,
            description: None,
            servings: Some(2),
            cook_time: Some(5),
            difficulty: Difficulty::Easy,
            tags: vec!["snack".to_string()],
        };
        cmd_recipe_import(&service, &path, args, true).await.unwrap();

        let recipes = service
            .list_recipes(&RecipeFilter {
                search: Some("garlic_toast".to_string()),
                tags: vec![],
            })
            .await
            .unwrap();
        assert_eq!(recipes.len(), 1);
        let recipe = &recipes[0];
        assert_eq!(recipe.servings, 2);
        assert_eq!(recipe.instructions.len(), 2);
        assert_eq!(recipe.ingredients.len(), 2);
        assert!(recipe.ingredients.iter().any(|i| i.name == "garlic"));
    }
}
