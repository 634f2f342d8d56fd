mod commands;
mod config;
mod remote;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    ImportArgs, Kitchen, RecipeArgs, cmd_auth_login, cmd_auth_logout, cmd_auth_oauth,
    cmd_auth_session, cmd_auth_status, cmd_catalog_list, cmd_catalog_set, cmd_catalog_suggest,
    cmd_grocery_add, cmd_grocery_check, cmd_grocery_clear, cmd_grocery_remove, cmd_grocery_show,
    cmd_packaging_add, cmd_packaging_delete, cmd_packaging_list, cmd_plan_assign,
    cmd_plan_ingredients, cmd_plan_remove, cmd_plan_show, cmd_recipe_create, cmd_recipe_import,
    cmd_recipe_list, cmd_recipe_seed, cmd_recipe_show, cmd_recipe_tags, parse_ingredient,
};
use crate::config::{BackendSettings, Config};
use crate::remote::{AuthClient, OAuthProvider, RestBackend};
use larder_core::backend::DataBackend;
use larder_core::db::{DEFAULT_QUOTA_BYTES, Database};
use larder_core::local::LocalBackend;
use larder_core::models::{Category, Difficulty};
use larder_core::service::KitchenService;

/// User id the local store files plan and grocery rows under.
const LOCAL_USER: &str = "local";

#[derive(Parser)]
#[command(
    name = "larder",
    version,
    about = "Recipes, a weekly meal plan and the grocery list that follows from it",
    long_about = "\n\n  ██╗      █████╗ ██████╗ ██████╗ ███████╗██████╗
  ██║     ██╔══██╗██╔══██╗██╔══██╗██╔════╝██╔══██╗
  ██║     ███████║██████╔╝██║  ██║█████╗  ██████╔╝
  ██║     ██╔══██║██╔══██╗██║  ██║██╔══╝  ██╔══██╗
  ███████╗██║  ██║██║  ██║██████╔╝███████╗██║  ██║
  ╚══════╝╚═╝  ╚═╝╚═╝  ╚═╝╚═════╝ ╚══════╝╚═╝  ╚═╝
        plan the week, shop once.
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Managed backend base URL (local store is used when unset)
    #[arg(long, global = true, env = "LARDER_BACKEND_URL", hide_env_values = true)]
    backend_url: Option<String>,
    /// Managed backend public API key
    #[arg(long, global = true, env = "LARDER_BACKEND_KEY", hide_env_values = true)]
    backend_key: Option<String>,
    /// Storage bucket for recipe images
    #[arg(long, global = true, env = "LARDER_IMAGES_BUCKET", default_value = "images")]
    images_bucket: String,
    /// Local store quota in bytes
    #[arg(long, global = true, env = "LARDER_STORE_QUOTA", default_value_t = DEFAULT_QUOTA_BYTES)]
    store_quota: usize,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse and author recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Weekly meal plan
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Grocery list derived from the plan
    Grocery {
        #[command(subcommand)]
        command: GroceryCommands,
    },
    /// Ingredient catalog and pack sizes
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
    /// Sign in to the managed backend
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// List recipes, optionally filtered
    List {
        /// Match against name or description
        #[arg(short, long)]
        search: Option<String>,
        /// Only recipes with any of these tags (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe by id or name
    Show {
        /// Recipe id or name
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a recipe from flags or a JSON file
    Create {
        /// Read the recipe from a JSON file instead of flags
        #[arg(long, value_name = "PATH", conflicts_with_all = ["name", "ingredients", "steps"])]
        file: Option<PathBuf>,
        /// Recipe name
        #[arg(long)]
        name: Option<String>,
        /// Short description
        #[arg(short, long)]
        description: Option<String>,
        /// Cooking time in minutes
        #[arg(long, default_value = "0")]
        cook_time: u32,
        /// Number of servings
        #[arg(long, default_value = "1")]
        servings: u32,
        /// easy, medium or hard
        #[arg(long, default_value = "easy")]
        difficulty: Difficulty,
        /// Ingredient as "name:amount:unit:category" (repeatable; unit and category autofill from the catalog)
        #[arg(short, long = "ingredient")]
        ingredients: Vec<String>,
        /// Instruction step (repeatable, in order)
        #[arg(long = "step")]
        steps: Vec<String>,
        /// Tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Image file or URL
        #[arg(long)]
        image: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a recipe from a Cooklang (.cook) file
    Import {
        /// Path to the .cook file
        file: PathBuf,
        /// Recipe name override (defaults to metadata title or filename)
        #[arg(long)]
        name: Option<String>,
        /// Description (defaults to a note naming the file)
        #[arg(short, long)]
        description: Option<String>,
        /// Servings override (defaults to metadata servings)
        #[arg(long)]
        servings: Option<u32>,
        /// Cooking time in minutes
        #[arg(long)]
        cook_time: Option<u32>,
        /// easy, medium or hard
        #[arg(long, default_value = "easy")]
        difficulty: Difficulty,
        /// Tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Insert the sample recipes into an empty remote recipe table
    Seed {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List every tag in use
    Tags {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Show seven days of meals
    Show {
        /// First day (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        start: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Put a recipe in a slot; picks a random recipe when none is given
    Assign {
        /// Slot as "date:meal" (e.g. "today:dinner" or "2024-01-15:lunch")
        slot: String,
        /// Recipe id or name
        recipe: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Empty a slot
    Remove {
        /// Slot as "date:meal"
        slot: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Combined ingredients of everything planned
    Ingredients {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GroceryCommands {
    /// Show the list grouped by category
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Toggle an item's checked state
    Check {
        /// Item id or name
        item: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a custom item
    Add {
        /// Item name (default: "Custom Item")
        name: Option<String>,
        /// Amount (default: 1)
        #[arg(short, long)]
        amount: Option<f64>,
        /// Unit (default: piece)
        #[arg(short, long)]
        unit: Option<String>,
        /// protein, vegetable, grain, dairy, spice or other
        #[arg(short, long)]
        category: Option<Category>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an item
    Remove {
        /// Item id or name
        item: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove every item
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CatalogCommands {
    /// List known ingredients
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Default unit and category for an ingredient
    Suggest {
        /// Ingredient name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record an ingredient's default unit and category
    Set {
        /// Ingredient name
        name: String,
        /// Default unit
        #[arg(short, long)]
        unit: String,
        /// protein, vegetable, grain, dairy, spice or other
        #[arg(short, long, default_value = "other")]
        category: Category,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pack sizes an ingredient is sold in
    Packaging {
        #[command(subcommand)]
        command: PackagingCommands,
    },
}

#[derive(Subcommand)]
enum PackagingCommands {
    /// List pack sizes for an ingredient
    List {
        /// Ingredient name
        ingredient: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a pack size
    Add {
        /// Ingredient name
        ingredient: String,
        /// Amount per pack
        amount: f64,
        /// Unit of the amount
        unit: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a pack size by id
    Delete {
        /// Pack size id
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Email a sign-in link
    Login {
        /// Email address
        email: String,
        /// Where the link should send the browser
        #[arg(long)]
        redirect_to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the sign-in URL for an OAuth provider
    Oauth {
        /// google or github
        provider: OAuthProvider,
        /// Where the provider should send the browser
        #[arg(long)]
        redirect_to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Store an access token obtained from a sign-in
    Session {
        /// Access token
        token: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget the stored session
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show backend and sign-in state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// The server logs requests at info; one-shot commands only surface warnings.
fn init_tracing(cli: &Cli) {
    let default = if matches!(cli.command, Commands::Serve { .. }) {
        "larder=info,larder_core=info,tower_http=info"
    } else {
        "larder=warn,larder_core=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Pick the remote backend when it is configured, else the local store.
async fn connect(config: &Config, settings: &BackendSettings) -> Result<(Kitchen, Option<AuthClient>)> {
    let Some((url, key)) = settings.remote() else {
        tracing::warn!(
            path = %config.db_path.display(),
            "remote backend not configured, using local store"
        );
        let db = Database::open(&config.db_path)?.with_quota(Some(settings.store_quota));
        let kitchen = Kitchen {
            service: KitchenService::new(Arc::new(LocalBackend::new(db))),
            user_id: Some(LOCAL_USER.to_string()),
        };
        return Ok((kitchen, None));
    };

    let backend = RestBackend::new(url, key, &settings.bucket)?;
    let auth = AuthClient::new(url, key)?;
    let mut user_id = None;
    if let Some(session) = config.load_session()? {
        backend.set_access_token(Some(session.access_token.clone()));
        user_id = match session.user_id {
            Some(id) => Some(id),
            None => match auth.current_user(&session.access_token).await {
                Ok(user) => Some(user.id),
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "stored session is no longer valid");
                    None
                }
            },
        };
    }

    let kitchen = Kitchen {
        service: KitchenService::new(Arc::new(backend)),
        user_id,
    };
    Ok((kitchen, Some(auth)))
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let settings = BackendSettings {
        url: cli.backend_url,
        key: cli.backend_key,
        bucket: cli.images_bucket,
        store_quota: cli.store_quota,
    };
    let (kitchen, auth) = connect(&config, &settings).await?;
    let service = &kitchen.service;

    match cli.command {
        Commands::Recipe { command } => match command {
            RecipeCommands::List { search, tags, json } => {
                cmd_recipe_list(service, search, tags, json).await
            }
            RecipeCommands::Show { recipe, json } => cmd_recipe_show(service, &recipe, json).await,
            RecipeCommands::Create {
                file,
                name,
                description,
                cook_time,
                servings,
                difficulty,
                ingredients,
                steps,
                tags,
                image,
                json,
            } => {
                let ingredients = ingredients
                    .iter()
                    .map(|s| parse_ingredient(s))
                    .collect::<Result<Vec<_>>>()?;
                let args = RecipeArgs {
                    file,
                    name,
                    description,
                    cook_time,
                    servings,
                    difficulty,
                    ingredients,
                    steps,
                    tags,
                    image,
                };
                cmd_recipe_create(service, args, json).await
            }
            RecipeCommands::Import {
                file,
                name,
                description,
                servings,
                cook_time,
                difficulty,
                tags,
                json,
            } => {
                let args = ImportArgs {
                    name,
                    description,
                    servings,
                    cook_time,
                    difficulty,
                    tags,
                };
                cmd_recipe_import(service, &file, args, json).await
            }
            RecipeCommands::Seed { json } => cmd_recipe_seed(service, json).await,
            RecipeCommands::Tags { json } => cmd_recipe_tags(service, json).await,
        },
        Commands::Plan { command } => match command {
            PlanCommands::Show { start, json } => cmd_plan_show(&kitchen, start, json).await,
            PlanCommands::Assign { slot, recipe, json } => {
                cmd_plan_assign(&kitchen, &slot, recipe, json).await
            }
            PlanCommands::Remove { slot, json } => cmd_plan_remove(&kitchen, &slot, json).await,
            PlanCommands::Ingredients { json } => cmd_plan_ingredients(&kitchen, json).await,
        },
        Commands::Grocery { command } => match command {
            GroceryCommands::Show { json } => cmd_grocery_show(&kitchen, json).await,
            GroceryCommands::Check { item, json } => cmd_grocery_check(&kitchen, &item, json).await,
            GroceryCommands::Add {
                name,
                amount,
                unit,
                category,
                json,
            } => cmd_grocery_add(&kitchen, name, amount, unit, category, json).await,
            GroceryCommands::Remove { item, json } => {
                cmd_grocery_remove(&kitchen, &item, json).await
            }
            GroceryCommands::Clear { json } => cmd_grocery_clear(&kitchen, json).await,
        },
        Commands::Catalog { command } => match command {
            CatalogCommands::List { json } => cmd_catalog_list(service, json).await,
            CatalogCommands::Suggest { name, json } => {
                cmd_catalog_suggest(service, &name, json).await
            }
            CatalogCommands::Set {
                name,
                unit,
                category,
                json,
            } => cmd_catalog_set(service, &name, &unit, category, json).await,
            CatalogCommands::Packaging { command } => match command {
                PackagingCommands::List { ingredient, json } => {
                    cmd_packaging_list(service, &ingredient, json).await
                }
                PackagingCommands::Add {
                    ingredient,
                    amount,
                    unit,
                    json,
                } => cmd_packaging_add(service, &ingredient, amount, &unit, json).await,
                PackagingCommands::Delete { id, json } => {
                    cmd_packaging_delete(service, &id, json).await
                }
            },
        },
        Commands::Auth { command } => match command {
            AuthCommands::Login {
                email,
                redirect_to,
                json,
            } => cmd_auth_login(auth.as_ref(), &email, redirect_to.as_deref(), json).await,
            AuthCommands::Oauth {
                provider,
                redirect_to,
                json,
            } => cmd_auth_oauth(auth.as_ref(), provider, redirect_to.as_deref(), json),
            AuthCommands::Session { token, json } => {
                cmd_auth_session(&config, auth.as_ref(), &token, json).await
            }
            AuthCommands::Logout { json } => cmd_auth_logout(&config, auth.as_ref(), json).await,
            AuthCommands::Status { json } => cmd_auth_status(&config, &kitchen, json),
        },
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?.0)
            };
            let Kitchen { service, user_id } = kitchen;
            let session = service.open_session(user_id).await;
            server::start_server(service, session, auth, port, &bind, api_key).await
        }
    }
}
