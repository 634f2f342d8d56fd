use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{
    CatalogItem, GroceryRow, Meal, MealPlanRow, NewPackagingOption, PackagingOption, Recipe,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Remote,
    Local,
}

/// Storage the application runs against.
///
/// The CLI implements this over the managed service's REST API, and
/// [`crate::local::LocalBackend`] implements it over the on-disk key/value
/// store for when no service is configured. Aggregation and merge logic never
/// look at which one is active.
///
/// Every method is an exact-key select, upsert or delete. Nothing spans
/// more than one table.
#[async_trait]
pub trait DataBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Install (or drop) the signed-in user's access token. Backends without
    /// authentication ignore it.
    fn set_access_token(&self, _token: Option<String>) {}

    // --- Recipes ---

    async fn list_recipes(&self) -> Result<Vec<Recipe>>;
    async fn get_recipe(&self, id: &str) -> Result<Option<Recipe>>;
    async fn create_recipe(&self, recipe: &Recipe) -> Result<Recipe>;
    /// Full replace of an existing recipe. Returns `None` if there is no such recipe.
    async fn replace_recipe(&self, recipe: &Recipe) -> Result<Option<Recipe>>;
    async fn bulk_insert_recipes(&self, recipes: &[Recipe]) -> Result<()>;

    // --- Ingredient catalog ---

    async fn list_catalog(&self) -> Result<Vec<CatalogItem>>;
    /// Upsert keyed by ingredient name.
    async fn upsert_catalog(&self, items: &[CatalogItem]) -> Result<()>;

    /// Options for one ingredient, smallest pack first.
    async fn list_packaging(&self, ingredient_name: &str) -> Result<Vec<PackagingOption>>;
    /// Upsert keyed by `(ingredient_name, unit, pack_amount)`.
    async fn upsert_packaging(&self, option: &NewPackagingOption) -> Result<PackagingOption>;
    async fn delete_packaging(&self, id: &str) -> Result<()>;

    // --- Per-user meal plan, keyed by (user_id, date, meal) ---

    async fn fetch_meal_plan(&self, user_id: &str) -> Result<Vec<MealPlanRow>>;
    async fn upsert_meal_plan(&self, row: &MealPlanRow) -> Result<()>;
    async fn delete_meal_plan(&self, user_id: &str, date: NaiveDate, meal: Meal) -> Result<()>;

    // --- Per-user grocery list, keyed by (user_id, ingredient_name, unit) ---

    async fn fetch_grocery_list(&self, user_id: &str) -> Result<Vec<GroceryRow>>;
    async fn upsert_grocery_item(&self, row: &GroceryRow) -> Result<()>;
    async fn delete_grocery_item(&self, user_id: &str, ingredient_name: &str, unit: &str)
    -> Result<()>;
    async fn clear_grocery_list(&self, user_id: &str) -> Result<()>;

    // --- Object storage ---

    /// Store an already-compressed JPEG and return a URL the recipe can reference.
    async fn upload_image(&self, data: &[u8]) -> Result<String>;
}
