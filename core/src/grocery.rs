//! Grocery checklist state: reconciling freshly derived items with the
//! persisted checklist, plus the in-memory list the planner session edits.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::{Category, GroceryItem, GroceryRow};

/// Persistence identity of a grocery entry. Names compare case-insensitively,
/// units exactly.
#[must_use]
pub fn merge_key(name: &str, unit: &str) -> (String, String) {
    (name.trim().to_lowercase(), unit.to_string())
}

/// Overlay persisted checklist state on derived items.
///
/// Derived items keep their freshly computed amount and take the persisted
/// row's id and `checked` flag. Persisted custom rows that match no derived
/// item are appended after the derived items.
#[must_use]
pub fn merge(derived: Vec<GroceryItem>, persisted: &[GroceryRow]) -> Vec<GroceryItem> {
    let lookup: HashMap<(String, String), &GroceryRow> = persisted
        .iter()
        .map(|row| (merge_key(&row.ingredient_name, &row.unit), row))
        .collect();

    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(derived.len());
    let mut out: Vec<GroceryItem> = Vec::with_capacity(derived.len());

    for mut item in derived {
        let key = merge_key(&item.name, &item.unit);
        if let Some(row) = lookup.get(&key) {
            if let Some(id) = &row.id {
                item.id.clone_from(id);
            }
            item.checked = row.checked;
        }
        seen.insert(key);
        out.push(item);
    }

    for row in persisted.iter().filter(|r| r.is_custom) {
        let key = merge_key(&row.ingredient_name, &row.unit);
        if seen.insert(key) {
            out.push(row.clone().into_item());
        }
    }
    out
}

/// Merge against a persisted fetch that may have failed. On failure the
/// derived items are used as they are.
#[must_use]
pub fn merge_or_fallback(
    derived: Vec<GroceryItem>,
    persisted: anyhow::Result<Vec<GroceryRow>>,
) -> Vec<GroceryItem> {
    match persisted {
        Ok(rows) => merge(derived, &rows),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "grocery list fetch failed, showing derived items");
            derived
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryGroup {
    pub category: Category,
    pub items: Vec<GroceryItem>,
}

/// Group items by category. Groups are ordered by category name, items keep
/// list order.
#[must_use]
pub fn group_by_category(items: &[GroceryItem]) -> Vec<CategoryGroup> {
    let mut groups: Vec<CategoryGroup> = Vec::new();
    for item in items {
        match groups.iter_mut().find(|g| g.category == item.category) {
            Some(group) => group.items.push(item.clone()),
            None => groups.push(CategoryGroup {
                category: item.category,
                items: vec![item.clone()],
            }),
        }
    }
    groups.sort_by(|a, b| a.category.as_str().cmp(b.category.as_str()));
    groups
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroceryProgress {
    pub checked: usize,
    pub total: usize,
    pub percent: u32,
}

#[must_use]
pub fn progress(items: &[GroceryItem]) -> GroceryProgress {
    let total = items.len();
    let checked = items.iter().filter(|i| i.checked).count();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let percent = if total == 0 {
        0
    } else {
        ((checked as f64 / total as f64) * 100.0).round() as u32
    };
    GroceryProgress {
        checked,
        total,
        percent,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroceryView {
    pub groups: Vec<CategoryGroup>,
    pub progress: GroceryProgress,
    pub planned_recipes: usize,
}

/// The checklist as currently shown to the user.
#[derive(Debug, Clone, Default)]
pub struct GroceryList {
    items: Vec<GroceryItem>,
}

impl GroceryList {
    #[must_use]
    pub fn new(items: Vec<GroceryItem>) -> Self {
        Self { items }
    }

    #[must_use]
    pub fn items(&self) -> &[GroceryItem] {
        &self.items
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&GroceryItem> {
        self.items.iter().find(|i| i.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn replace(&mut self, items: Vec<GroceryItem>) {
        self.items = items;
    }

    /// Flip `checked` on the item with `id`, returning the updated item.
    pub fn toggle(&mut self, id: &str) -> Option<&GroceryItem> {
        let item = self.items.iter_mut().find(|i| i.id == id)?;
        item.checked = !item.checked;
        Some(item)
    }

    pub fn add(&mut self, item: GroceryItem) {
        self.items.push(item);
    }

    pub fn remove(&mut self, id: &str) -> Option<GroceryItem> {
        let pos = self.items.iter().position(|i| i.id == id)?;
        Some(self.items.remove(pos))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn view(&self, planned_recipes: usize) -> GroceryView {
        GroceryView {
            groups: group_by_category(&self.items),
            progress: progress(&self.items),
            planned_recipes,
        }
    }
}
