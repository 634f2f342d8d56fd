use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::aggregate::aggregate;
use crate::models::{Ingredient, Meal, MealPlanRow, Recipe};

pub const DAYS_PER_WEEK: usize = 7;

/// State of one `(date, meal)` slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotState<'a> {
    Empty,
    Assigned(&'a Recipe),
}

/// Planned meals for one user. Each `(date, meal)` holds at most one recipe.
///
/// Iteration is chronological, breakfast before lunch before dinner.
#[derive(Debug, Clone, Default)]
pub struct MealPlan {
    slots: BTreeMap<(NaiveDate, Meal), Recipe>,
}

impl MealPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted rows. Rows without a recipe leave the slot empty;
    /// a later row for the same slot wins.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = MealPlanRow>,
    {
        let mut plan = Self::new();
        for row in rows {
            if let Some(recipe) = row.recipe {
                plan.assign(row.date, row.meal, recipe);
            }
        }
        plan
    }

    /// Bind `recipe` to the slot, returning whatever it replaced.
    pub fn assign(&mut self, date: NaiveDate, meal: Meal, recipe: Recipe) -> Option<Recipe> {
        self.slots.insert((date, meal), recipe)
    }

    /// Empty the slot. Removing an empty slot is a no-op.
    pub fn remove(&mut self, date: NaiveDate, meal: Meal) -> Option<Recipe> {
        self.slots.remove(&(date, meal))
    }

    #[must_use]
    pub fn get(&self, date: NaiveDate, meal: Meal) -> Option<&Recipe> {
        self.slots.get(&(date, meal))
    }

    #[must_use]
    pub fn state(&self, date: NaiveDate, meal: Meal) -> SlotState<'_> {
        match self.get(date, meal) {
            Some(recipe) => SlotState::Assigned(recipe),
            None => SlotState::Empty,
        }
    }

    pub fn planned_recipes(&self) -> impl Iterator<Item = &Recipe> {
        self.slots.values()
    }

    /// Ingredient totals over every planned meal.
    #[must_use]
    pub fn planned_ingredients(&self) -> Vec<Ingredient> {
        aggregate(self.planned_recipes())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Seven consecutive days starting at `start`.
    #[must_use]
    pub fn week(&self, start: NaiveDate, today: NaiveDate) -> Vec<DayPlan> {
        start
            .iter_days()
            .take(DAYS_PER_WEEK)
            .map(|date| DayPlan {
                date,
                weekday: date.format("%a").to_string(),
                day_num: date.day(),
                is_today: date == today,
                breakfast: self.get(date, Meal::Breakfast).cloned(),
                lunch: self.get(date, Meal::Lunch).cloned(),
                dinner: self.get(date, Meal::Dinner).cloned(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub weekday: String,
    pub day_num: u32,
    pub is_today: bool,
    pub breakfast: Option<Recipe>,
    pub lunch: Option<Recipe>,
    pub dinner: Option<Recipe>,
}

impl DayPlan {
    #[must_use]
    pub fn meal(&self, meal: Meal) -> Option<&Recipe> {
        match meal {
            Meal::Breakfast => self.breakfast.as_ref(),
            Meal::Lunch => self.lunch.as_ref(),
            Meal::Dinner => self.dinner.as_ref(),
        }
    }
}
