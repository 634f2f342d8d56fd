mod auth;
mod catalog;
mod grocery;
mod helpers;
mod plan;
mod recipe;

use larder_core::service::{KitchenService, PlannerSession};

pub(crate) use auth::{
    cmd_auth_login, cmd_auth_logout, cmd_auth_oauth, cmd_auth_session, cmd_auth_status,
};
pub(crate) use catalog::{
    cmd_catalog_list, cmd_catalog_set, cmd_catalog_suggest, cmd_packaging_add,
    cmd_packaging_delete, cmd_packaging_list,
};
pub(crate) use grocery::{
    cmd_grocery_add, cmd_grocery_check, cmd_grocery_clear, cmd_grocery_remove, cmd_grocery_show,
};
pub(crate) use helpers::parse_ingredient;
pub(crate) use plan::{cmd_plan_assign, cmd_plan_ingredients, cmd_plan_remove, cmd_plan_show};
pub(crate) use recipe::{
    ImportArgs, RecipeArgs, cmd_recipe_create, cmd_recipe_import, cmd_recipe_list,
    cmd_recipe_seed, cmd_recipe_show, cmd_recipe_tags,
};

/// The selected backend plus whoever is signed in to it.
pub(crate) struct Kitchen {
    pub service: KitchenService,
    pub user_id: Option<String>,
}

impl Kitchen {
    /// Planner state for the current user, loaded fresh for this run.
    pub(crate) async fn session(&self) -> PlannerSession {
        self.service.open_session(self.user_id.clone()).await
    }
}
