use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aggregate::{derive_grocery_items, ingredient_key};
use crate::backend::{BackendKind, DataBackend};
use crate::grocery::{GroceryList, GroceryView, merge_key, merge_or_fallback};
use crate::imaging::{JPEG_QUALITY, MAX_IMAGE_WIDTH, compress_image, decode_data_url, is_data_url};
use crate::models::{
    CatalogItem, GroceryItem, GroceryRow, Ingredient, Meal, MealPlanRow, NewCustomItem,
    NewIngredient, NewPackagingOption, NewRecipe, PackagingOption, Recipe, new_id,
    normalize_new_recipe, validate_packaging,
};
use crate::planner::{DayPlan, MealPlan};
use crate::samples::{find_sample, sample_recipes};

/// Result of the write-back that follows an optimistic local change.
///
/// The local change is never rolled back; this only reports whether the
/// backend saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum PersistOutcome {
    Saved,
    Skipped(String),
    Failed(String),
}

impl PersistOutcome {
    fn no_user() -> Self {
        Self::Skipped("not signed in".to_string())
    }

    fn from_result(action: &str, result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::Saved,
            Err(e) => {
                let message = format!("{e:#}");
                tracing::warn!(action, error = %message, "best-effort persistence failed");
                Self::Failed(message)
            }
        }
    }

    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RecipeFilter {
    /// Search text matches name or description, case-insensitively. Any
    /// selected tag is enough; no tags selects everything.
    #[must_use]
    pub fn matches(&self, recipe: &Recipe) -> bool {
        let matches_search = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                recipe.name.to_lowercase().contains(&term)
                    || recipe.description.to_lowercase().contains(&term)
            }
        };
        let matches_tags =
            self.tags.is_empty() || self.tags.iter().any(|t| recipe.tags.contains(t));
        matches_search && matches_tags
    }
}

/// Distinct tags in first-seen order.
#[must_use]
pub fn all_tags(recipes: &[Recipe]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in recipes.iter().flat_map(|r| r.tags.iter()) {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    tags
}

/// Fill unit and category from a catalog entry with the same name.
///
/// With `override_unit` unset an ingredient that already has a unit keeps it.
pub fn autofill_ingredient(
    catalog: &[CatalogItem],
    ingredient: &mut NewIngredient,
    override_unit: bool,
) -> bool {
    let key = ingredient_key(&ingredient.name);
    let Some(found) = catalog.iter().find(|c| ingredient_key(&c.name) == key) else {
        return false;
    };
    if override_unit || ingredient.unit.trim().is_empty() {
        ingredient.unit.clone_from(&found.default_unit);
    }
    ingredient.category = found.category;
    true
}

/// Recipe book, ingredient catalog and image handling on top of a [`DataBackend`].
pub struct KitchenService {
    backend: Arc<dyn DataBackend>,
}

impl KitchenService {
    pub fn new(backend: Arc<dyn DataBackend>) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn backend(&self) -> Arc<dyn DataBackend> {
        Arc::clone(&self.backend)
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    // --- Recipes ---

    pub async fn list_recipes(&self, filter: &RecipeFilter) -> Result<Vec<Recipe>> {
        let recipes = self.all_recipes().await;
        Ok(recipes.into_iter().filter(|r| filter.matches(r)).collect())
    }

    /// Everything the backend lists. An empty remote catalog is seeded with the
    /// bundled samples first; if the backend cannot be read the samples are shown.
    async fn all_recipes(&self) -> Vec<Recipe> {
        let listed = match self.backend.list_recipes().await {
            Ok(recipes) if recipes.is_empty() && self.kind() == BackendKind::Remote => {
                match self.insert_samples().await {
                    Ok(_) => self.backend.list_recipes().await,
                    Err(e) => Err(e),
                }
            }
            other => other,
        };
        match listed {
            Ok(recipes) => recipes,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "recipe listing failed, showing bundled samples");
                sample_recipes()
            }
        }
    }

    pub async fn tags(&self) -> Result<Vec<String>> {
        Ok(all_tags(&self.all_recipes().await))
    }

    /// Bundled samples resolve without touching the backend.
    pub async fn get_recipe(&self, id: &str) -> Result<Option<Recipe>> {
        if let Some(sample) = find_sample(id) {
            return Ok(Some(sample));
        }
        self.backend.get_recipe(id).await
    }

    pub async fn create_recipe(&self, input: NewRecipe) -> Result<Recipe> {
        let input = normalize_new_recipe(input)?;
        self.remember_ingredients(&input.ingredients).await?;
        let image = self.resolve_image(input.image.as_deref()).await;
        let recipe = input.into_recipe(new_id(), image);
        let created = self.backend.create_recipe(&recipe).await?;
        tracing::info!(id = %created.id, name = %created.name, "recipe created");
        Ok(created)
    }

    pub async fn replace_recipe(&self, id: &str, input: NewRecipe) -> Result<Option<Recipe>> {
        if find_sample(id).is_some() {
            bail!("Sample recipe '{id}' is read-only");
        }
        let input = normalize_new_recipe(input)?;
        self.remember_ingredients(&input.ingredients).await?;
        let image = self.resolve_image(input.image.as_deref()).await;
        let recipe = input.into_recipe(id.to_string(), image);
        self.backend.replace_recipe(&recipe).await
    }

    /// Insert the bundled samples if the backend has no recipes. Returns how
    /// many were inserted.
    pub async fn seed_samples(&self) -> Result<usize> {
        if !self.backend.list_recipes().await?.is_empty() {
            return Ok(0);
        }
        self.insert_samples().await
    }

    async fn insert_samples(&self) -> Result<usize> {
        let samples: Vec<Recipe> = sample_recipes()
            .into_iter()
            .map(|mut r| {
                r.id = new_id();
                for ing in &mut r.ingredients {
                    ing.id = new_id();
                }
                r
            })
            .collect();
        self.backend.bulk_insert_recipes(&samples).await?;
        tracing::info!(count = samples.len(), "seeded sample recipes");
        Ok(samples.len())
    }

    async fn remember_ingredients(&self, ingredients: &[NewIngredient]) -> Result<()> {
        let items: Vec<CatalogItem> = ingredients
            .iter()
            .map(|i| CatalogItem {
                name: i.name.clone(),
                default_unit: i.unit.clone(),
                category: i.category,
            })
            .collect();
        if items.is_empty() {
            return Ok(());
        }
        self.backend.upsert_catalog(&items).await
    }

    /// Embedded images are compressed and uploaded. Upload failure leaves the
    /// recipe without an image.
    async fn resolve_image(&self, image: Option<&str>) -> String {
        let Some(image) = image else {
            return String::new();
        };
        if !is_data_url(image) {
            return image.to_string();
        }
        let Some((_, bytes)) = decode_data_url(image) else {
            tracing::warn!("recipe image is not a base64 data URL, dropping it");
            return String::new();
        };
        self.upload_image(&bytes).await
    }

    /// Compress and store an image, returning its URL or an empty string on failure.
    pub async fn upload_image(&self, data: &[u8]) -> String {
        let jpeg = compress_image(data, MAX_IMAGE_WIDTH, JPEG_QUALITY);
        match self.backend.upload_image(&jpeg).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "image upload failed, saving recipe without image");
                String::new()
            }
        }
    }

    // --- Catalog ---

    pub async fn list_catalog(&self) -> Result<Vec<CatalogItem>> {
        let mut items = self.backend.list_catalog().await?;
        items.sort_by_key(|i| i.name.to_lowercase());
        Ok(items)
    }

    pub async fn upsert_catalog(&self, items: Vec<CatalogItem>) -> Result<()> {
        let items: Vec<CatalogItem> = items
            .into_iter()
            .map(|mut i| {
                i.name = i.name.trim().to_string();
                i.default_unit = i.default_unit.trim().to_string();
                i
            })
            .filter(|i| !i.name.is_empty())
            .collect();
        if items.is_empty() {
            bail!("No named catalog items to save");
        }
        self.backend.upsert_catalog(&items).await
    }

    pub async fn suggest(&self, name: &str) -> Result<Option<CatalogItem>> {
        let key = ingredient_key(name);
        Ok(self
            .backend
            .list_catalog()
            .await?
            .into_iter()
            .find(|c| ingredient_key(&c.name) == key))
    }

    /// Fill catalog defaults into every ingredient of `recipe`. Returns how many matched.
    pub async fn autofill(&self, recipe: &mut NewRecipe, override_unit: bool) -> Result<usize> {
        let catalog = self.backend.list_catalog().await?;
        Ok(recipe
            .ingredients
            .iter_mut()
            .map(|ing| autofill_ingredient(&catalog, ing, override_unit))
            .filter(|matched| *matched)
            .count())
    }

    pub async fn list_packaging(&self, ingredient_name: &str) -> Result<Vec<PackagingOption>> {
        self.backend.list_packaging(ingredient_name.trim()).await
    }

    pub async fn add_packaging(&self, option: NewPackagingOption) -> Result<PackagingOption> {
        let option = NewPackagingOption {
            ingredient_name: option.ingredient_name.trim().to_string(),
            unit: option.unit.trim().to_string(),
            pack_amount: option.pack_amount,
        };
        validate_packaging(&option)?;
        self.backend.upsert_packaging(&option).await
    }

    pub async fn delete_packaging(&self, id: &str) -> Result<()> {
        self.backend.delete_packaging(id).await
    }

    // --- Sessions ---

    /// Planner state for `user_id`, loaded from the backend.
    pub async fn open_session(&self, user_id: Option<String>) -> PlannerSession {
        let mut session = PlannerSession::new(self.backend());
        session.set_user(user_id).await;
        session
    }
}

/// Meal plan and grocery checklist of the signed-in user.
///
/// Every edit is applied to local state first. The backend write that follows
/// is best effort and reported as a [`PersistOutcome`].
pub struct PlannerSession {
    backend: Arc<dyn DataBackend>,
    user_id: Option<String>,
    plan: MealPlan,
    grocery: GroceryList,
    /// Spelling each persisted row was saved under, by merge key. Remote
    /// filters match names exactly, so writes reuse it.
    stored_names: HashMap<(String, String), String>,
}

impl PlannerSession {
    pub fn new(backend: Arc<dyn DataBackend>) -> Self {
        Self {
            backend,
            user_id: None,
            plan: MealPlan::new(),
            grocery: GroceryList::default(),
            stored_names: HashMap::new(),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    #[must_use]
    pub fn plan(&self) -> &MealPlan {
        &self.plan
    }

    #[must_use]
    pub fn grocery(&self) -> &GroceryList {
        &self.grocery
    }

    #[must_use]
    pub fn grocery_view(&self) -> GroceryView {
        self.grocery.view(self.plan.len())
    }

    #[must_use]
    pub fn week(&self, start: NaiveDate, today: NaiveDate) -> Vec<DayPlan> {
        self.plan.week(start, today)
    }

    #[must_use]
    pub fn planned_ingredients(&self) -> Vec<Ingredient> {
        self.plan.planned_ingredients()
    }

    /// Switch to another user (or sign out) and reload user-scoped state.
    pub async fn set_user(&mut self, user_id: Option<String>) {
        self.user_id = user_id;
        self.plan.clear();
        self.grocery.clear();
        self.stored_names.clear();

        let Some(user) = self.user_id.clone() else {
            return;
        };
        match self.backend.fetch_meal_plan(&user).await {
            Ok(rows) => self.plan = MealPlan::from_rows(rows),
            Err(e) => {
                tracing::warn!(user = %user, error = %format!("{e:#}"), "meal plan fetch failed");
            }
        }
        self.refresh_grocery().await;
    }

    /// Recompute derived items from the plan and overlay persisted checklist state.
    pub async fn refresh_grocery(&mut self) {
        let derived = derive_grocery_items(self.plan.planned_ingredients());
        let persisted = match &self.user_id {
            Some(user) => self.backend.fetch_grocery_list(user).await,
            None => Ok(Vec::new()),
        };
        if let Ok(rows) = &persisted {
            self.stored_names = rows
                .iter()
                .map(|r| (merge_key(&r.ingredient_name, &r.unit), r.ingredient_name.clone()))
                .collect();
        }
        self.grocery.replace(merge_or_fallback(derived, persisted));
    }

    pub async fn assign(&mut self, date: NaiveDate, meal: Meal, recipe: Recipe) -> PersistOutcome {
        self.plan.assign(date, meal, recipe.clone());
        let outcome = match self.user_id.clone() {
            Some(user_id) => {
                let row = MealPlanRow {
                    id: None,
                    user_id,
                    date,
                    meal,
                    recipe: Some(recipe),
                };
                PersistOutcome::from_result(
                    "assign meal",
                    self.backend.upsert_meal_plan(&row).await,
                )
            }
            None => PersistOutcome::no_user(),
        };
        self.refresh_grocery().await;
        outcome
    }

    /// Empty a slot. Returns the removed recipe, if the slot held one.
    pub async fn remove(&mut self, date: NaiveDate, meal: Meal) -> (Option<Recipe>, PersistOutcome) {
        let removed = self.plan.remove(date, meal);
        let outcome = match self.user_id.clone() {
            Some(user) => PersistOutcome::from_result(
                "remove meal",
                self.backend.delete_meal_plan(&user, date, meal).await,
            ),
            None => PersistOutcome::no_user(),
        };
        self.refresh_grocery().await;
        (removed, outcome)
    }

    /// Find an item by id, falling back to a case-insensitive name match.
    #[must_use]
    pub fn find_item(&self, query: &str) -> Option<&GroceryItem> {
        let key = ingredient_key(query);
        self.grocery
            .get(query)
            .or_else(|| self.grocery.items().iter().find(|i| ingredient_key(&i.name) == key))
    }

    /// Flip the checked state. The written row keeps the item's custom flag.
    pub async fn toggle_item(&mut self, id: &str) -> Option<(GroceryItem, PersistOutcome)> {
        let item = self.grocery.toggle(id)?.clone();
        let outcome = self.write_item("toggle grocery item", &item).await;
        Some((item, outcome))
    }

    pub async fn add_custom_item(
        &mut self,
        input: NewCustomItem,
    ) -> Result<(GroceryItem, PersistOutcome)> {
        let item = input.into_item()?;
        self.grocery.add(item.clone());
        let outcome = self.write_item("add grocery item", &item).await;
        Ok((item, outcome))
    }

    pub async fn remove_item(&mut self, id: &str) -> Option<(GroceryItem, PersistOutcome)> {
        let item = self.grocery.remove(id)?;
        let Some(user) = self.user_id.clone() else {
            return Some((item, PersistOutcome::no_user()));
        };
        let key = merge_key(&item.name, &item.unit);
        let name = self
            .stored_names
            .get(&key)
            .map_or(item.name.as_str(), String::as_str);
        let result = self.backend.delete_grocery_item(&user, name, &item.unit).await;
        if result.is_ok() {
            self.stored_names.remove(&key);
        }
        let outcome = PersistOutcome::from_result("remove grocery item", result);
        Some((item, outcome))
    }

    /// Empty the checklist, including persisted rows.
    pub async fn clear_list(&mut self) -> PersistOutcome {
        self.grocery.clear();
        self.stored_names.clear();
        match self.user_id.clone() {
            Some(user) => PersistOutcome::from_result(
                "clear grocery list",
                self.backend.clear_grocery_list(&user).await,
            ),
            None => PersistOutcome::no_user(),
        }
    }

    async fn write_item(&mut self, action: &str, item: &GroceryItem) -> PersistOutcome {
        let Some(user) = &self.user_id else {
            return PersistOutcome::no_user();
        };
        let key = merge_key(&item.name, &item.unit);
        let mut row = GroceryRow::from_item(user, item);
        if let Some(name) = self.stored_names.get(&key) {
            row.ingredient_name.clone_from(name);
        }
        let result = self.backend.upsert_grocery_item(&row).await;
        if result.is_ok() {
            self.stored_names.insert(key, row.ingredient_name);
        }
        PersistOutcome::from_result(action, result)
    }
}
