use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backend::{BackendKind, DataBackend};
use crate::db::Database;
use crate::error::StoreError;
use crate::grocery::merge_key;
use crate::imaging::{is_data_url, to_data_url};
use crate::models::{
    CatalogItem, GroceryRow, Meal, MealPlanRow, NewPackagingOption, PackagingOption, Recipe,
    new_id,
};
use crate::samples::sample_recipes;

pub const RECIPES_KEY: &str = "custom_recipes_v1";
pub const CATALOG_KEY: &str = "ingredient_catalog_v1";
pub const PACKAGING_KEY: &str = "ingredient_packaging_v1";
pub const MEAL_PLANS_KEY: &str = "meal_plans_v1";
pub const GROCERY_KEY: &str = "grocery_lists_v1";

/// Backend used when no managed service is configured. Each collection is a
/// whole JSON array under one key of the local store.
pub struct LocalBackend {
    db: Mutex<Database>,
}

impl LocalBackend {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn lock(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locally authored recipes, without the bundled samples.
    pub fn stored_recipes(&self) -> Result<Vec<Recipe>> {
        read_collection(&self.lock(), RECIPES_KEY)
    }
}

fn read_collection<T: DeserializeOwned>(db: &Database, key: &str) -> Result<Vec<T>> {
    let Some(raw) = db.kv_get(key)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str(&raw) {
        Ok(items) => Ok(items),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding unreadable local collection");
            Ok(Vec::new())
        }
    }
}

fn write_collection<T: Serialize>(db: &Database, key: &str, items: &[T]) -> Result<()> {
    let raw = serde_json::to_string(items)
        .with_context(|| format!("Failed to serialize local collection '{key}'"))?;
    db.kv_set(key, &raw)
}

/// Insert or replace `recipe` (moving it to the end). When the write does not
/// fit, retry once without its embedded image; if that fails too, the first
/// error is returned.
fn save_recipe(db: &Database, recipe: &Recipe) -> Result<()> {
    let mut list: Vec<Recipe> = read_collection(db, RECIPES_KEY)?;
    list.retain(|r| r.id != recipe.id);
    list.push(recipe.clone());

    match write_collection(db, RECIPES_KEY, &list) {
        Err(err) if StoreError::is_quota_exceeded(&err) => {
            if let Some(last) = list.last_mut().filter(|r| is_data_url(&r.image)) {
                last.image = String::new();
            }
            tracing::warn!(recipe = %recipe.name, "local store full, retrying without embedded image");
            write_collection(db, RECIPES_KEY, &list).map_err(|_| err)
        }
        other => other,
    }
}

#[async_trait]
impl DataBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let mut recipes = sample_recipes();
        recipes.extend(self.stored_recipes()?);
        Ok(recipes)
    }

    async fn get_recipe(&self, id: &str) -> Result<Option<Recipe>> {
        Ok(self.list_recipes().await?.into_iter().find(|r| r.id == id))
    }

    async fn create_recipe(&self, recipe: &Recipe) -> Result<Recipe> {
        let db = self.lock();
        save_recipe(&db, recipe)?;
        let stored: Vec<Recipe> = read_collection(&db, RECIPES_KEY)?;
        Ok(stored
            .into_iter()
            .find(|r| r.id == recipe.id)
            .unwrap_or_else(|| recipe.clone()))
    }

    async fn replace_recipe(&self, recipe: &Recipe) -> Result<Option<Recipe>> {
        let db = self.lock();
        let stored: Vec<Recipe> = read_collection(&db, RECIPES_KEY)?;
        if !stored.iter().any(|r| r.id == recipe.id) {
            return Ok(None);
        }
        save_recipe(&db, recipe)?;
        Ok(Some(recipe.clone()))
    }

    async fn bulk_insert_recipes(&self, recipes: &[Recipe]) -> Result<()> {
        let db = self.lock();
        let mut stored: Vec<Recipe> = read_collection(&db, RECIPES_KEY)?;
        stored.extend_from_slice(recipes);
        write_collection(&db, RECIPES_KEY, &stored)
    }

    async fn list_catalog(&self) -> Result<Vec<CatalogItem>> {
        read_collection(&self.lock(), CATALOG_KEY)
    }

    async fn upsert_catalog(&self, items: &[CatalogItem]) -> Result<()> {
        let db = self.lock();
        let mut catalog: Vec<CatalogItem> = read_collection(&db, CATALOG_KEY)?;
        for item in items {
            let key = item.name.to_lowercase();
            match catalog.iter_mut().find(|c| c.name.to_lowercase() == key) {
                Some(existing) => *existing = item.clone(),
                None => catalog.push(item.clone()),
            }
        }
        write_collection(&db, CATALOG_KEY, &catalog)
    }

    async fn list_packaging(&self, ingredient_name: &str) -> Result<Vec<PackagingOption>> {
        let all: Vec<PackagingOption> = read_collection(&self.lock(), PACKAGING_KEY)?;
        let mut options: Vec<PackagingOption> = all
            .into_iter()
            .filter(|o| o.ingredient_name == ingredient_name)
            .collect();
        options.sort_by(|a, b| a.pack_amount.total_cmp(&b.pack_amount));
        Ok(options)
    }

    async fn upsert_packaging(&self, option: &NewPackagingOption) -> Result<PackagingOption> {
        let db = self.lock();
        let mut all: Vec<PackagingOption> = read_collection(&db, PACKAGING_KEY)?;
        let existing = all.iter().find(|o| {
            o.ingredient_name == option.ingredient_name
                && o.unit == option.unit
                && (o.pack_amount - option.pack_amount).abs() < f64::EPSILON
        });
        let saved = match existing {
            Some(o) => o.clone(),
            None => {
                let created = PackagingOption {
                    id: new_id(),
                    ingredient_name: option.ingredient_name.clone(),
                    unit: option.unit.clone(),
                    pack_amount: option.pack_amount,
                };
                all.push(created.clone());
                write_collection(&db, PACKAGING_KEY, &all)?;
                created
            }
        };
        Ok(saved)
    }

    async fn delete_packaging(&self, id: &str) -> Result<()> {
        let db = self.lock();
        let mut all: Vec<PackagingOption> = read_collection(&db, PACKAGING_KEY)?;
        all.retain(|o| o.id != id);
        write_collection(&db, PACKAGING_KEY, &all)
    }

    async fn fetch_meal_plan(&self, user_id: &str) -> Result<Vec<MealPlanRow>> {
        let rows: Vec<MealPlanRow> = read_collection(&self.lock(), MEAL_PLANS_KEY)?;
        Ok(rows.into_iter().filter(|r| r.user_id == user_id).collect())
    }

    async fn upsert_meal_plan(&self, row: &MealPlanRow) -> Result<()> {
        let db = self.lock();
        let mut rows: Vec<MealPlanRow> = read_collection(&db, MEAL_PLANS_KEY)?;
        let slot = rows
            .iter_mut()
            .find(|r| r.user_id == row.user_id && r.date == row.date && r.meal == row.meal);
        match slot {
            Some(existing) => {
                existing.recipe.clone_from(&row.recipe);
            }
            None => {
                let mut row = row.clone();
                row.id.get_or_insert_with(new_id);
                rows.push(row);
            }
        }
        write_collection(&db, MEAL_PLANS_KEY, &rows)
    }

    async fn delete_meal_plan(&self, user_id: &str, date: NaiveDate, meal: Meal) -> Result<()> {
        let db = self.lock();
        let mut rows: Vec<MealPlanRow> = read_collection(&db, MEAL_PLANS_KEY)?;
        rows.retain(|r| !(r.user_id == user_id && r.date == date && r.meal == meal));
        write_collection(&db, MEAL_PLANS_KEY, &rows)
    }

    async fn fetch_grocery_list(&self, user_id: &str) -> Result<Vec<GroceryRow>> {
        let rows: Vec<GroceryRow> = read_collection(&self.lock(), GROCERY_KEY)?;
        Ok(rows.into_iter().filter(|r| r.user_id == user_id).collect())
    }

    async fn upsert_grocery_item(&self, row: &GroceryRow) -> Result<()> {
        let db = self.lock();
        let mut rows: Vec<GroceryRow> = read_collection(&db, GROCERY_KEY)?;
        let key = merge_key(&row.ingredient_name, &row.unit);
        let existing = rows
            .iter_mut()
            .find(|r| r.user_id == row.user_id && merge_key(&r.ingredient_name, &r.unit) == key);
        match existing {
            Some(existing) => {
                let id = existing.id.take().or_else(|| row.id.clone());
                *existing = GroceryRow { id, ..row.clone() };
            }
            None => {
                let mut row = row.clone();
                row.id.get_or_insert_with(new_id);
                rows.push(row);
            }
        }
        write_collection(&db, GROCERY_KEY, &rows)
    }

    async fn delete_grocery_item(
        &self,
        user_id: &str,
        ingredient_name: &str,
        unit: &str,
    ) -> Result<()> {
        let db = self.lock();
        let mut rows: Vec<GroceryRow> = read_collection(&db, GROCERY_KEY)?;
        let key = merge_key(ingredient_name, unit);
        rows.retain(|r| !(r.user_id == user_id && merge_key(&r.ingredient_name, &r.unit) == key));
        write_collection(&db, GROCERY_KEY, &rows)
    }

    async fn clear_grocery_list(&self, user_id: &str) -> Result<()> {
        let db = self.lock();
        let mut rows: Vec<GroceryRow> = read_collection(&db, GROCERY_KEY)?;
        rows.retain(|r| r.user_id != user_id);
        write_collection(&db, GROCERY_KEY, &rows)
    }

    async fn upload_image(&self, data: &[u8]) -> Result<String> {
        Ok(to_data_url("image/jpeg", data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Difficulty, Ingredient};

    fn recipe(id: &str, image: &str) -> Recipe {
        Recipe {
            id: id.to_string(),
            name: format!("Recipe {id}"),
            description: "Tasty".to_string(),
            image: image.to_string(),
            cook_time: 10,
            servings: 2,
            difficulty: Difficulty::Easy,
            ingredients: vec![Ingredient {
                id: new_id(),
                name: "Rice".to_string(),
                amount: 1.0,
                unit: "cup".to_string(),
                category: Category::Grain,
            }],
            instructions: vec!["Boil".to_string()],
            tags: vec![],
        }
    }

    fn grocery_row(user: &str, name: &str, unit: &str, checked: bool) -> GroceryRow {
        GroceryRow {
            id: None,
            user_id: user.to_string(),
            ingredient_name: name.to_string(),
            amount: 1.0,
            unit: unit.to_string(),
            category: Category::Other,
            checked,
            is_custom: false,
        }
    }

    #[tokio::test]
    async fn test_samples_listed_before_stored_recipes() {
        let backend = LocalBackend::in_memory().unwrap();
        backend.create_recipe(&recipe("r1", "")).await.unwrap();

        let all = backend.list_recipes().await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].id, "sample-1");
        assert_eq!(all[3].id, "r1");
        assert!(backend.get_recipe("r1").await.unwrap().is_some());
        assert!(backend.get_recipe("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_recipe() {
        let backend = LocalBackend::in_memory().unwrap();
        assert!(
            backend
                .replace_recipe(&recipe("r1", ""))
                .await
                .unwrap()
                .is_none()
        );

        backend.create_recipe(&recipe("r1", "")).await.unwrap();
        let mut updated = recipe("r1", "");
        updated.name = "Renamed".to_string();
        backend.replace_recipe(&updated).await.unwrap().unwrap();

        let stored = backend.stored_recipes().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Renamed");
    }

    #[tokio::test]
    async fn test_quota_retry_strips_embedded_image() {
        let image = format!("data:image/jpeg;base64,{}", "A".repeat(4000));
        let db = Database::open_in_memory().unwrap().with_quota(Some(2000));
        let backend = LocalBackend::new(db);

        let saved = backend.create_recipe(&recipe("r1", &image)).await.unwrap();
        assert_eq!(saved.image, "");
        assert_eq!(backend.stored_recipes().unwrap()[0].image, "");
    }

    #[tokio::test]
    async fn test_quota_retry_failure_propagates() {
        let db = Database::open_in_memory().unwrap().with_quota(Some(50));
        let backend = LocalBackend::new(db);

        let err = backend
            .create_recipe(&recipe("r1", "https://example.com/x.jpg"))
            .await
            .unwrap_err();
        assert!(StoreError::is_quota_exceeded(&err));
        assert!(backend.stored_recipes().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_collection_reads_empty() {
        let db = Database::open_in_memory().unwrap();
        db.kv_set(RECIPES_KEY, "{not json").unwrap();
        let backend = LocalBackend::new(db);
        assert!(backend.stored_recipes().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_catalog_upsert_is_case_insensitive() {
        let backend = LocalBackend::in_memory().unwrap();
        let item = |name: &str, unit: &str| CatalogItem {
            name: name.to_string(),
            default_unit: unit.to_string(),
            category: Category::Spice,
        };
        backend
            .upsert_catalog(&[item("Garlic", "cloves"), item("Salt", "g")])
            .await
            .unwrap();
        backend.upsert_catalog(&[item("garlic", "heads")]).await.unwrap();

        let catalog = backend.list_catalog().await.unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].name, "garlic");
        assert_eq!(catalog[0].default_unit, "heads");
    }

    #[tokio::test]
    async fn test_packaging_sorted_and_deduplicated() {
        let backend = LocalBackend::in_memory().unwrap();
        let opt = |amount: f64| NewPackagingOption {
            ingredient_name: "Milk".to_string(),
            unit: "ml".to_string(),
            pack_amount: amount,
        };
        let big = backend.upsert_packaging(&opt(1000.0)).await.unwrap();
        backend.upsert_packaging(&opt(500.0)).await.unwrap();
        let again = backend.upsert_packaging(&opt(1000.0)).await.unwrap();
        assert_eq!(big.id, again.id);

        let options = backend.list_packaging("Milk").await.unwrap();
        assert_eq!(options.len(), 2);
        assert!((options[0].pack_amount - 500.0).abs() < f64::EPSILON);

        backend.delete_packaging(&big.id).await.unwrap();
        assert_eq!(backend.list_packaging("Milk").await.unwrap().len(), 1);
        assert!(backend.list_packaging("Eggs").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_meal_plan_rows_are_per_user_and_slot() {
        let backend = LocalBackend::in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let row = |user: &str, r: Recipe| MealPlanRow {
            id: None,
            user_id: user.to_string(),
            date,
            meal: Meal::Dinner,
            recipe: Some(r),
        };

        backend.upsert_meal_plan(&row("a", recipe("r1", ""))).await.unwrap();
        backend.upsert_meal_plan(&row("a", recipe("r2", ""))).await.unwrap();
        backend.upsert_meal_plan(&row("b", recipe("r3", ""))).await.unwrap();

        let rows = backend.fetch_meal_plan("a").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].recipe.as_ref().unwrap().id, "r2");
        assert!(rows[0].id.is_some());

        backend.delete_meal_plan("a", date, Meal::Dinner).await.unwrap();
        assert!(backend.fetch_meal_plan("a").await.unwrap().is_empty());
        assert_eq!(backend.fetch_meal_plan("b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_grocery_rows_upsert_delete_clear() {
        let backend = LocalBackend::in_memory().unwrap();
        backend
            .upsert_grocery_item(&grocery_row("a", "Garlic", "cloves", false))
            .await
            .unwrap();
        let first_id = backend.fetch_grocery_list("a").await.unwrap()[0].id.clone();

        backend
            .upsert_grocery_item(&grocery_row("a", "Garlic", "cloves", true))
            .await
            .unwrap();
        backend
            .upsert_grocery_item(&grocery_row("a", "Garlic", "heads", false))
            .await
            .unwrap();
        backend
            .upsert_grocery_item(&grocery_row("b", "Milk", "l", false))
            .await
            .unwrap();

        let rows = backend.fetch_grocery_list("a").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].checked);
        assert_eq!(rows[0].id, first_id);

        backend
            .delete_grocery_item("a", "Garlic", "heads")
            .await
            .unwrap();
        assert_eq!(backend.fetch_grocery_list("a").await.unwrap().len(), 1);

        backend.clear_grocery_list("a").await.unwrap();
        assert!(backend.fetch_grocery_list("a").await.unwrap().is_empty());
        assert_eq!(backend.fetch_grocery_list("b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_grocery_rows_match_names_case_insensitively() {
        let backend = LocalBackend::in_memory().unwrap();
        backend
            .upsert_grocery_item(&grocery_row("a", "garlic", "cloves", true))
            .await
            .unwrap();
        backend
            .upsert_grocery_item(&grocery_row("a", "Garlic ", "cloves", false))
            .await
            .unwrap();
        let rows = backend.fetch_grocery_list("a").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].checked);

        backend
            .delete_grocery_item("a", "GARLIC", "cloves")
            .await
            .unwrap();
        assert!(backend.fetch_grocery_list("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_image_returns_data_url() {
        let backend = LocalBackend::in_memory().unwrap();
        let url = backend.upload_image(&[0xFF, 0xD8]).await.unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(backend.kind(), BackendKind::Local);
    }
}
