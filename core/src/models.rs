use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// --- Enumerations ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Protein,
    Vegetable,
    Grain,
    Dairy,
    Spice,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Protein,
        Category::Vegetable,
        Category::Grain,
        Category::Dairy,
        Category::Spice,
        Category::Other,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Protein => "protein",
            Self::Vegetable => "vegetable",
            Self::Grain => "grain",
            Self::Dairy => "dairy",
            Self::Spice => "spice",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::Protein => "🥩",
            Self::Vegetable => "🥕",
            Self::Grain => "🌾",
            Self::Dairy => "🥛",
            Self::Spice => "🧄",
            Self::Other => "📦",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        match Self::ALL.iter().find(|c| c.as_str() == lower) {
            Some(c) => Ok(*c),
            None => bail!(
                "Invalid category '{s}'. Must be one of: {}",
                Self::ALL.map(Category::as_str).join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        match Self::ALL.iter().find(|d| d.as_str() == lower) {
            Some(d) => Ok(*d),
            None => bail!(
                "Invalid difficulty '{s}'. Must be one of: {}",
                Self::ALL.map(Difficulty::as_str).join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Meal {
    Breakfast,
    Lunch,
    Dinner,
}

pub const MEALS: [Meal; 3] = [Meal::Breakfast, Meal::Lunch, Meal::Dinner];

impl Meal {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
        }
    }
}

impl fmt::Display for Meal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Meal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        validate_meal(s)
    }
}

pub fn validate_meal(meal: &str) -> Result<Meal> {
    let lower = meal.trim().to_lowercase();
    match MEALS.iter().find(|m| m.as_str() == lower) {
        Some(m) => Ok(*m),
        None => bail!(
            "Invalid meal '{meal}'. Must be one of: {}",
            MEALS.map(Meal::as_str).join(", ")
        ),
    }
}

// --- Recipes ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub amount: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub category: Category,
}

fn default_servings() -> u32 {
    1
}

/// A recipe as stored in the `recipes` table. Field names follow the table's
/// camelCase columns (`cookTime`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub cook_time: u32,
    #[serde(default = "default_servings")]
    pub servings: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub category: Category,
}

/// Recipe authoring input. `image` may be a URL or an embedded `data:` URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecipe {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, alias = "cookTime")]
    pub cook_time: u32,
    #[serde(default = "default_servings")]
    pub servings: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub ingredients: Vec<NewIngredient>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewRecipe {
    /// Build the stored recipe, assigning fresh ingredient ids.
    #[must_use]
    pub fn into_recipe(self, id: String, image: String) -> Recipe {
        Recipe {
            id,
            name: self.name,
            description: self.description,
            image,
            cook_time: self.cook_time,
            servings: self.servings,
            difficulty: self.difficulty,
            ingredients: self
                .ingredients
                .into_iter()
                .map(|i| Ingredient {
                    id: new_id(),
                    name: i.name,
                    amount: i.amount,
                    unit: i.unit,
                    category: i.category,
                })
                .collect(),
            instructions: self.instructions,
            tags: self.tags,
        }
    }
}

pub fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() {
        bail!("Amount must be a finite number");
    }
    if amount < 0.0 {
        bail!("Amount must not be negative");
    }
    Ok(())
}

/// Trim the authoring input, drop blank steps and unnamed ingredients, dedupe
/// tags, then validate what is left.
pub fn normalize_new_recipe(mut recipe: NewRecipe) -> Result<NewRecipe> {
    recipe.name = recipe.name.trim().to_string();
    recipe.description = recipe.description.trim().to_string();
    recipe.image = recipe
        .image
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty());
    recipe.instructions = recipe
        .instructions
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    recipe.ingredients = recipe
        .ingredients
        .into_iter()
        .filter_map(|mut i| {
            i.name = i.name.trim().to_string();
            i.unit = i.unit.trim().to_string();
            (!i.name.is_empty()).then_some(i)
        })
        .collect();
    recipe.tags = normalize_tags(recipe.tags);

    validate_new_recipe(&recipe)?;
    Ok(recipe)
}

pub fn validate_new_recipe(recipe: &NewRecipe) -> Result<()> {
    if recipe.name.trim().is_empty() {
        bail!("Recipe name must not be empty");
    }
    if recipe.description.trim().is_empty() {
        bail!("Recipe description must not be empty");
    }
    if recipe.servings == 0 {
        bail!("Servings must be at least 1");
    }
    if !recipe.instructions.iter().any(|s| !s.trim().is_empty()) {
        bail!("Recipe needs at least one instruction step");
    }
    if !recipe.ingredients.iter().any(|i| !i.name.trim().is_empty()) {
        bail!("Recipe needs at least one named ingredient");
    }
    for ing in &recipe.ingredients {
        validate_amount(ing.amount)
            .map_err(|e| anyhow::anyhow!("Ingredient '{}': {e}", ing.name))?;
    }
    Ok(())
}

/// Tags behave as a set: trimmed, blanks dropped, first occurrence kept.
#[must_use]
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

// --- Ingredient catalog ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub name: String,
    #[serde(rename = "defaultUnit", alias = "default_unit")]
    pub default_unit: String,
    #[serde(default)]
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagingOption {
    pub id: String,
    pub ingredient_name: String,
    pub unit: String,
    pub pack_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPackagingOption {
    pub ingredient_name: String,
    pub unit: String,
    pub pack_amount: f64,
}

pub fn validate_packaging(option: &NewPackagingOption) -> Result<()> {
    if option.ingredient_name.trim().is_empty() {
        bail!("Packaging ingredient_name must not be empty");
    }
    if option.unit.trim().is_empty() {
        bail!("Packaging unit must not be empty");
    }
    if !option.pack_amount.is_finite() || option.pack_amount <= 0.0 {
        bail!("pack_amount must be greater than 0");
    }
    Ok(())
}

// --- Meal planning ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealSlot {
    pub date: NaiveDate,
    pub meal: Meal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe: Option<Recipe>,
}

/// Persisted meal-plan row, unique per `(user_id, date, meal)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub date: NaiveDate,
    pub meal: Meal,
    pub recipe: Option<Recipe>,
}

// --- Grocery list ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryItem {
    pub id: String,
    pub name: String,
    pub amount: f64,
    pub unit: String,
    pub category: Category,
    pub checked: bool,
    #[serde(default)]
    pub is_custom: bool,
}

/// Persisted checklist row, unique per `(user_id, ingredient_name, unit)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub ingredient_name: String,
    pub amount: f64,
    pub unit: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub is_custom: bool,
}

impl GroceryRow {
    /// Row for writing `item` back. The id is left for the backend to keep or assign.
    #[must_use]
    pub fn from_item(user_id: &str, item: &GroceryItem) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            ingredient_name: item.name.clone(),
            amount: item.amount,
            unit: item.unit.clone(),
            category: item.category,
            checked: item.checked,
            is_custom: item.is_custom,
        }
    }

    #[must_use]
    pub fn into_item(self) -> GroceryItem {
        GroceryItem {
            id: self.id.unwrap_or_else(new_id),
            name: self.ingredient_name,
            amount: self.amount,
            unit: self.unit,
            category: self.category,
            checked: self.checked,
            is_custom: self.is_custom,
        }
    }
}

/// User-added grocery entry. Missing fields fall back to a generic placeholder item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewCustomItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub category: Option<Category>,
}

impl NewCustomItem {
    pub fn into_item(self) -> Result<GroceryItem> {
        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Custom Item".to_string());
        let amount = self.amount.unwrap_or(1.0);
        validate_amount(amount)?;
        Ok(GroceryItem {
            id: new_id(),
            name,
            amount,
            unit: self
                .unit
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| "piece".to_string()),
            category: self.category.unwrap_or_default(),
            checked: false,
            is_custom: true,
        })
    }
}

// --- Import ---

#[derive(Debug, Clone, Deserialize)]
pub struct CooklangIngredient {
    pub name: String,
    pub quantity: Option<serde_json::Value>,
    pub units: Option<String>,
}

impl CooklangIngredient {
    /// Numeric amount, or 0 when the quantity is missing or free text.
    #[must_use]
    pub fn amount(&self) -> f64 {
        let raw = match &self.quantity {
            Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };
        if raw.is_finite() && raw > 0.0 { raw } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_new_recipe() -> NewRecipe {
        NewRecipe {
            name: "  Garlic Bread ".to_string(),
            description: "Crispy bread".to_string(),
            image: Some("   ".to_string()),
            cook_time: 10,
            servings: 2,
            difficulty: Difficulty::Easy,
            ingredients: vec![
                NewIngredient {
                    name: " Garlic ".to_string(),
                    amount: 3.0,
                    unit: "cloves".to_string(),
                    category: Category::Spice,
                },
                NewIngredient {
                    name: "   ".to_string(),
                    amount: 0.0,
                    unit: "g".to_string(),
                    category: Category::Other,
                },
            ],
            instructions: vec!["Slice".to_string(), "  ".to_string(), "Bake".to_string()],
            tags: vec![
                "quick".to_string(),
                " quick ".to_string(),
                String::new(),
                "vegetarian".to_string(),
            ],
        }
    }

    #[test]
    fn test_category_parse_case_insensitive() {
        assert_eq!("Protein".parse::<Category>().unwrap(), Category::Protein);
        assert_eq!(" SPICE ".parse::<Category>().unwrap(), Category::Spice);
        assert!("meat".parse::<Category>().is_err());
    }

    #[test]
    fn test_meal_parse() {
        assert_eq!(validate_meal("breakfast").unwrap(), Meal::Breakfast);
        assert_eq!(validate_meal("Lunch").unwrap(), Meal::Lunch);
        assert_eq!("DINNER".parse::<Meal>().unwrap(), Meal::Dinner);
        assert!(validate_meal("snack").is_err());
        assert!(validate_meal("").is_err());
    }

    #[test]
    fn test_difficulty_parse() {
        assert_eq!("hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("extreme".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_enums_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&Category::Vegetable).unwrap(),
            "\"vegetable\""
        );
        assert_eq!(serde_json::to_string(&Meal::Dinner).unwrap(), "\"dinner\"");
        assert_eq!(
            serde_json::to_string(&Difficulty::Medium).unwrap(),
            "\"medium\""
        );
    }

    #[test]
    fn test_recipe_uses_camel_case_cook_time() {
        let json = serde_json::json!({
            "id": "r1",
            "name": "Toast",
            "cookTime": 5,
            "servings": 1,
            "difficulty": "easy",
        });
        let recipe: Recipe = serde_json::from_value(json).unwrap();
        assert_eq!(recipe.cook_time, 5);
        assert!(recipe.ingredients.is_empty());
        let back = serde_json::to_value(&recipe).unwrap();
        assert_eq!(back["cookTime"], 5);
    }

    #[test]
    fn test_normalize_new_recipe_trims_and_filters() {
        let recipe = normalize_new_recipe(sample_new_recipe()).unwrap();
        assert_eq!(recipe.name, "Garlic Bread");
        assert!(recipe.image.is_none());
        assert_eq!(recipe.instructions, vec!["Slice", "Bake"]);
        assert_eq!(recipe.ingredients.len(), 1);
        assert_eq!(recipe.ingredients[0].name, "Garlic");
        assert_eq!(recipe.tags, vec!["quick", "vegetarian"]);
    }

    #[test]
    fn test_normalize_rejects_missing_description() {
        let mut input = sample_new_recipe();
        input.description = "  ".to_string();
        assert!(normalize_new_recipe(input).is_err());
    }

    #[test]
    fn test_normalize_rejects_no_instructions() {
        let mut input = sample_new_recipe();
        input.instructions = vec![" ".to_string()];
        assert!(normalize_new_recipe(input).is_err());
    }

    #[test]
    fn test_normalize_rejects_no_named_ingredient() {
        let mut input = sample_new_recipe();
        input.ingredients.remove(0);
        assert!(normalize_new_recipe(input).is_err());
    }

    #[test]
    fn test_normalize_rejects_zero_servings() {
        let mut input = sample_new_recipe();
        input.servings = 0;
        assert!(normalize_new_recipe(input).is_err());
    }

    #[test]
    fn test_normalize_rejects_negative_amount() {
        let mut input = sample_new_recipe();
        input.ingredients[0].amount = -1.0;
        assert!(normalize_new_recipe(input).is_err());
    }

    #[test]
    fn test_into_recipe_assigns_ingredient_ids() {
        let recipe = normalize_new_recipe(sample_new_recipe())
            .unwrap()
            .into_recipe("r1".to_string(), String::new());
        assert_eq!(recipe.id, "r1");
        assert_eq!(recipe.ingredients.len(), 1);
        assert!(!recipe.ingredients[0].id.is_empty());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(0.0).is_ok());
        assert!(validate_amount(2.5).is_ok());
        assert!(validate_amount(-0.1).is_err());
        assert!(validate_amount(f64::NAN).is_err());
        assert!(validate_amount(f64::INFINITY).is_err());
    }

    #[test]
    fn test_catalog_item_default_unit_wire_name() {
        let item = CatalogItem {
            name: "Garlic".to_string(),
            default_unit: "cloves".to_string(),
            category: Category::Spice,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["defaultUnit"], "cloves");

        let parsed: CatalogItem = serde_json::from_value(serde_json::json!({
            "name": "Rice",
            "default_unit": "g",
            "category": "grain"
        }))
        .unwrap();
        assert_eq!(parsed.default_unit, "g");
        assert_eq!(parsed.category, Category::Grain);
    }

    #[test]
    fn test_validate_packaging() {
        let ok = NewPackagingOption {
            ingredient_name: "Milk".to_string(),
            unit: "ml".to_string(),
            pack_amount: 1000.0,
        };
        assert!(validate_packaging(&ok).is_ok());

        let zero = NewPackagingOption {
            pack_amount: 0.0,
            ..ok.clone()
        };
        assert!(validate_packaging(&zero).is_err());

        let unnamed = NewPackagingOption {
            ingredient_name: " ".to_string(),
            ..ok
        };
        assert!(validate_packaging(&unnamed).is_err());
    }

    #[test]
    fn test_custom_item_defaults() {
        let item = NewCustomItem::default().into_item().unwrap();
        assert_eq!(item.name, "Custom Item");
        assert!((item.amount - 1.0).abs() < f64::EPSILON);
        assert_eq!(item.unit, "piece");
        assert_eq!(item.category, Category::Other);
        assert!(item.is_custom);
        assert!(!item.checked);
    }

    #[test]
    fn test_custom_item_rejects_negative_amount() {
        let input = NewCustomItem {
            amount: Some(-2.0),
            ..NewCustomItem::default()
        };
        assert!(input.into_item().is_err());
    }

    #[test]
    fn test_grocery_row_round_trips_provenance() {
        let item = GroceryItem {
            id: "g1".to_string(),
            name: "Paper towels".to_string(),
            amount: 1.0,
            unit: "piece".to_string(),
            category: Category::Other,
            checked: true,
            is_custom: true,
        };
        let row = GroceryRow::from_item("user-1", &item);
        assert_eq!(row.user_id, "user-1");
        assert!(row.id.is_none());
        assert!(row.is_custom);
        assert!(row.checked);
    }

    #[test]
    fn test_cooklang_ingredient_amount() {
        let numeric = CooklangIngredient {
            name: "flour".to_string(),
            quantity: Some(serde_json::json!(250.0)),
            units: Some("g".to_string()),
        };
        assert!((numeric.amount() - 250.0).abs() < f64::EPSILON);

        let text = CooklangIngredient {
            name: "salt".to_string(),
            quantity: Some(serde_json::json!("a pinch")),
            units: None,
        };
        assert!(text.amount().abs() < f64::EPSILON);

        let missing = CooklangIngredient {
            name: "pepper".to_string(),
            quantity: None,
            units: None,
        };
        assert!(missing.amount().abs() < f64::EPSILON);
    }
}
