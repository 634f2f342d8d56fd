//! Ingredient aggregation across planned recipes.
//!
//! Ingredients are matched by trimmed, lowercased name. The first occurrence
//! decides the displayed name, unit and category; later occurrences only add to
//! the amount. Units are never converted, so "200 g" and "1 cup" of the same
//! ingredient are summed as 201.

use std::collections::HashMap;

use crate::models::{GroceryItem, Ingredient, Recipe, new_id};

#[must_use]
pub fn ingredient_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn sanitize_amount(amount: f64) -> f64 {
    if amount.is_finite() && amount > 0.0 {
        amount
    } else {
        0.0
    }
}

/// Aggregate every ingredient of every recipe. Output is in first-seen order.
#[must_use]
pub fn aggregate<'a, I>(recipes: I) -> Vec<Ingredient>
where
    I: IntoIterator<Item = &'a Recipe>,
{
    aggregate_ingredients(recipes.into_iter().flat_map(|r| r.ingredients.iter()))
}

#[must_use]
pub fn aggregate_ingredients<'a, I>(ingredients: I) -> Vec<Ingredient>
where
    I: IntoIterator<Item = &'a Ingredient>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Ingredient> = Vec::new();

    for ing in ingredients {
        let key = ingredient_key(&ing.name);
        if key.is_empty() {
            continue;
        }
        let amount = sanitize_amount(ing.amount);
        match index.get(&key) {
            Some(&pos) => out[pos].amount += amount,
            None => {
                index.insert(key, out.len());
                out.push(Ingredient {
                    amount,
                    ..ing.clone()
                });
            }
        }
    }
    out
}

/// Turn aggregated ingredients into fresh, unchecked grocery entries.
#[must_use]
pub fn derive_grocery_items(ingredients: Vec<Ingredient>) -> Vec<GroceryItem> {
    ingredients
        .into_iter()
        .map(|ing| GroceryItem {
            id: new_id(),
            name: ing.name,
            amount: ing.amount,
            unit: ing.unit,
            category: ing.category,
            checked: false,
            is_custom: false,
        })
        .collect()
}
