use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::remote::{AuthClient, AuthUser, OAuthProvider};
use larder_core::backend::BackendKind;
use larder_core::error::StoreError;
use larder_core::grocery::GroceryView;
use larder_core::models::{
    CatalogItem, GroceryItem, Ingredient, MealSlot, NewCustomItem, NewPackagingOption, NewRecipe,
    PackagingOption, Recipe, normalize_new_recipe, validate_amount, validate_meal,
    validate_packaging,
};
use larder_core::planner::DayPlan;
use larder_core::samples::find_sample;
use larder_core::service::{KitchenService, PersistOutcome, PlannerSession, RecipeFilter};

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

#[derive(Clone)]
struct AppState {
    service: Arc<KitchenService>,
    session: Arc<Mutex<PlannerSession>>,
    auth: Option<Arc<AuthClient>>,
    api_key: Option<String>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct RecipeQuery {
    search: Option<String>,
    /// Comma-separated tag list.
    tags: Option<String>,
}

#[derive(Deserialize)]
struct SuggestQuery {
    name: String,
}

#[derive(Deserialize)]
struct PackagingRequest {
    unit: String,
    pack_amount: f64,
}

#[derive(Deserialize)]
struct WeekQuery {
    start: Option<String>,
}

#[derive(Serialize)]
struct WeekResponse {
    user_id: Option<String>,
    days: Vec<DayPlan>,
}

#[derive(Deserialize)]
struct AssignRequest {
    recipe_id: String,
}

#[derive(Serialize)]
struct SlotResponse {
    slot: MealSlot,
    persistence: PersistOutcome,
}

#[derive(Serialize)]
struct RemovedSlotResponse {
    removed: Option<Recipe>,
    persistence: PersistOutcome,
}

#[derive(Serialize)]
struct ItemResponse {
    item: GroceryItem,
    persistence: PersistOutcome,
}

#[derive(Serialize)]
struct PersistenceResponse {
    persistence: PersistOutcome,
}

#[derive(Deserialize)]
struct MagicLinkRequest {
    email: String,
    redirect_to: Option<String>,
}

#[derive(Deserialize)]
struct RedirectQuery {
    redirect_to: Option<String>,
}

#[derive(Deserialize)]
struct SessionRequest {
    access_token: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(err) => {
                tracing::error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let mapped = match err.downcast_ref::<StoreError>() {
            Some(e @ StoreError::NotConfigured(_)) => Some(Self::Unavailable(e.to_string())),
            Some(StoreError::Backend { status, .. }) => {
                tracing::warn!(status, error = %format!("{err:#}"), "backend request failed");
                Some(Self::Unavailable(format!(
                    "Backend request failed (status {status})"
                )))
            }
            _ => None,
        };
        mapped.unwrap_or(Self::Internal(err))
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err:#}"))
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{raw}', expected YYYY-MM-DD")))
}

fn require_auth_client(state: &AppState) -> Result<Arc<AuthClient>, ApiError> {
    state
        .auth
        .clone()
        .ok_or_else(|| ApiError::from(anyhow::Error::from(StoreError::NotConfigured("auth"))))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Recipe Handlers ---

async fn list_recipes(
    State(state): State<AppState>,
    Query(query): Query<RecipeQuery>,
) -> Result<Json<Vec<Recipe>>, ApiError> {
    let filter = RecipeFilter {
        search: query.search,
        tags: query
            .tags
            .map(|t| {
                t.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
    };
    Ok(Json(state.service.list_recipes(&filter).await?))
}

async fn create_recipe(
    State(state): State<AppState>,
    Json(req): Json<NewRecipe>,
) -> Result<(StatusCode, Json<Recipe>), ApiError> {
    let req = normalize_new_recipe(req).map_err(|e| bad_request(&e))?;
    let recipe = state.service.create_recipe(req).await?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Recipe>, ApiError> {
    state
        .service
        .get_recipe(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Recipe {id} not found")))
}

async fn replace_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<NewRecipe>,
) -> Result<Json<Recipe>, ApiError> {
    if find_sample(&id).is_some() {
        return Err(ApiError::BadRequest(format!(
            "Sample recipe {id} cannot be modified"
        )));
    }
    let req = normalize_new_recipe(req).map_err(|e| bad_request(&e))?;
    state
        .service
        .replace_recipe(&id, req)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Recipe {id} not found")))
}

async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.service.tags().await?))
}

// --- Catalog Handlers ---

async fn list_catalog(State(state): State<AppState>) -> Result<Json<Vec<CatalogItem>>, ApiError> {
    Ok(Json(state.service.list_catalog().await?))
}

async fn upsert_catalog(
    State(state): State<AppState>,
    Json(items): Json<Vec<CatalogItem>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if items.iter().all(|i| i.name.trim().is_empty()) {
        return Err(ApiError::BadRequest(
            "at least one named catalog item is required".to_string(),
        ));
    }
    let count = items.len();
    state.service.upsert_catalog(items).await?;
    Ok(Json(serde_json::json!({ "saved": count })))
}

async fn suggest_catalog(
    State(state): State<AppState>,
    Query(query): Query<SuggestQuery>,
) -> Result<Json<CatalogItem>, ApiError> {
    state
        .service
        .suggest(&query.name)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No catalog entry for '{}'", query.name)))
}

async fn list_packaging(
    State(state): State<AppState>,
    Path(ingredient): Path<String>,
) -> Result<Json<Vec<PackagingOption>>, ApiError> {
    Ok(Json(state.service.list_packaging(&ingredient).await?))
}

async fn add_packaging(
    State(state): State<AppState>,
    Path(ingredient): Path<String>,
    Json(req): Json<PackagingRequest>,
) -> Result<(StatusCode, Json<PackagingOption>), ApiError> {
    let option = NewPackagingOption {
        ingredient_name: ingredient.trim().to_string(),
        unit: req.unit.trim().to_string(),
        pack_amount: req.pack_amount,
    };
    validate_packaging(&option).map_err(|e| bad_request(&e))?;
    let saved = state.service.add_packaging(option).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn delete_packaging(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.service.delete_packaging(&id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

// --- Planner Handlers ---

async fn get_week(
    State(state): State<AppState>,
    Query(query): Query<WeekQuery>,
) -> Result<Json<WeekResponse>, ApiError> {
    let today = Local::now().date_naive();
    let start = match query.start.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => today,
    };
    let session = state.session.lock().await;
    Ok(Json(WeekResponse {
        user_id: session.user_id().map(str::to_string),
        days: session.week(start, today),
    }))
}

async fn planned_ingredients(State(state): State<AppState>) -> Json<Vec<Ingredient>> {
    Json(state.session.lock().await.planned_ingredients())
}

async fn assign_slot(
    State(state): State<AppState>,
    Path((date, meal)): Path<(String, String)>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<SlotResponse>, ApiError> {
    let date = parse_date(&date)?;
    let meal = validate_meal(&meal).map_err(|e| bad_request(&e))?;
    let recipe = state
        .service
        .get_recipe(&req.recipe_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Recipe {} not found", req.recipe_id)))?;

    let mut session = state.session.lock().await;
    let persistence = session.assign(date, meal, recipe.clone()).await;
    Ok(Json(SlotResponse {
        slot: MealSlot {
            date,
            meal,
            recipe: Some(recipe),
        },
        persistence,
    }))
}

async fn remove_slot(
    State(state): State<AppState>,
    Path((date, meal)): Path<(String, String)>,
) -> Result<Json<RemovedSlotResponse>, ApiError> {
    let date = parse_date(&date)?;
    let meal = validate_meal(&meal).map_err(|e| bad_request(&e))?;
    let mut session = state.session.lock().await;
    let (removed, persistence) = session.remove(date, meal).await;
    Ok(Json(RemovedSlotResponse {
        removed,
        persistence,
    }))
}

// --- Grocery Handlers ---

async fn get_grocery(State(state): State<AppState>) -> Json<GroceryView> {
    Json(state.session.lock().await.grocery_view())
}

async fn clear_grocery(State(state): State<AppState>) -> Json<PersistenceResponse> {
    let persistence = state.session.lock().await.clear_list().await;
    Json(PersistenceResponse { persistence })
}

async fn add_grocery_item(
    State(state): State<AppState>,
    Json(req): Json<NewCustomItem>,
) -> Result<(StatusCode, Json<ItemResponse>), ApiError> {
    if let Some(amount) = req.amount {
        validate_amount(amount).map_err(|e| bad_request(&e))?;
    }
    let (item, persistence) = state
        .session
        .lock()
        .await
        .add_custom_item(req)
        .await
        .map_err(|e| bad_request(&e))?;
    Ok((StatusCode::CREATED, Json(ItemResponse { item, persistence })))
}

async fn toggle_grocery_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ItemResponse>, ApiError> {
    let (item, persistence) = state
        .session
        .lock()
        .await
        .toggle_item(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Grocery item {id} not found")))?;
    Ok(Json(ItemResponse { item, persistence }))
}

async fn remove_grocery_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ItemResponse>, ApiError> {
    let (item, persistence) = state
        .session
        .lock()
        .await
        .remove_item(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Grocery item {id} not found")))?;
    Ok(Json(ItemResponse { item, persistence }))
}

// --- Image Handler ---

async fn upload_image(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("image body is empty".to_string()));
    }
    let url = state.service.upload_image(&body).await;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "url": url }))))
}

// --- Auth Handlers ---

async fn send_magic_link(
    State(state): State<AppState>,
    Json(req): Json<MagicLinkRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let auth = require_auth_client(&state)?;
    if !req.email.contains('@') {
        return Err(ApiError::BadRequest(format!(
            "Invalid email address '{}'",
            req.email
        )));
    }
    auth.send_magic_link(&req.email, req.redirect_to.as_deref())
        .await?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "sent": true }))))
}

async fn oauth_url(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<RedirectQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let auth = require_auth_client(&state)?;
    let provider: OAuthProvider = provider.parse().map_err(|e| bad_request(&e))?;
    let url = auth.oauth_url(provider, query.redirect_to.as_deref())?;
    Ok(Json(serde_json::json!({ "url": url })))
}

async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<AuthUser>, ApiError> {
    let auth = require_auth_client(&state)?;
    let token = req.access_token.trim().to_string();
    if token.is_empty() {
        return Err(ApiError::BadRequest("access_token is required".to_string()));
    }
    let user = auth.current_user(&token).await?;

    let backend = state.service.backend();
    backend.set_access_token(Some(token));
    state
        .session
        .lock()
        .await
        .set_user(Some(user.id.clone()))
        .await;
    tracing::info!(user = %user.id, "session started");
    Ok(Json(user))
}

async fn end_session(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    require_auth_client(&state)?;
    state.service.backend().set_access_token(None);
    state.session.lock().await.set_user(None).await;
    tracing::info!("session ended");
    Ok(Json(serde_json::json!({ "signed_out": true })))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/recipes", get(list_recipes).post(create_recipe))
        .route("/api/recipes/{id}", get(get_recipe).put(replace_recipe))
        .route("/api/tags", get(list_tags))
        .route("/api/catalog", get(list_catalog).put(upsert_catalog))
        .route("/api/catalog/suggest", get(suggest_catalog))
        .route(
            "/api/packaging/{ingredient}",
            get(list_packaging).post(add_packaging),
        )
        .route("/api/packaging/option/{id}", delete(delete_packaging))
        .route("/api/plan", get(get_week))
        .route("/api/plan/ingredients", get(planned_ingredients))
        .route(
            "/api/plan/{date}/{meal}",
            put(assign_slot).delete(remove_slot),
        )
        .route("/api/grocery", get(get_grocery).delete(clear_grocery))
        .route("/api/grocery/items", post(add_grocery_item))
        .route("/api/grocery/items/{id}", delete(remove_grocery_item))
        .route("/api/grocery/items/{id}/toggle", post(toggle_grocery_item))
        .route("/api/images", post(upload_image))
        .route("/api/auth/magic-link", post(send_magic_link))
        .route("/api/auth/oauth/{provider}", get(oauth_url))
        .route("/api/auth/session", put(start_session).delete(end_session))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

/// First and last four characters of `key`. Short keys are masked entirely.
fn key_preview(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub async fn start_server(
    service: KitchenService,
    session: PlannerSession,
    auth: Option<AuthClient>,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let kind = service.kind();
    let state = AppState {
        service: Arc::new(service),
        session: Arc::new(Mutex::new(session)),
        auth: auth.map(Arc::new),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {} (see api_key file in data directory)",
            key_preview(key)
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    if kind == BackendKind::Local {
        eprintln!("Backend: local store (no remote backend configured)");
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    tracing::info!(bind, port, backend = ?kind, "listening");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
