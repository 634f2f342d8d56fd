use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};

use larder_core::backend::{BackendKind, DataBackend};
use larder_core::error::StoreError;
use larder_core::models::{
    CatalogItem, GroceryRow, Meal, MealPlanRow, NewPackagingOption, PackagingOption, Recipe,
    new_id,
};

const RECIPES: &str = "recipes";
const CATALOG: &str = "ingredients";
const PACKAGING: &str = "ingredient_packaging";
const MEAL_PLANS: &str = "meal_plans";
const GROCERY: &str = "grocery_lists";

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!(
            "larder/{} (meal planner)",
            env!("CARGO_PKG_VERSION")
        ))
        .timeout(std::time::Duration::from_secs(10))
        .connect_timeout(std::time::Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")
}

fn eq(value: impl fmt::Display) -> String {
    format!("eq.{value}")
}

/// Turn a non-2xx response into [`StoreError::Backend`], keeping the
/// service's own message when it sends one.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Backend {
        status: status.as_u16(),
        message: error_message(&body),
    }
    .into())
}

fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["message", "msg", "error_description", "error"] {
            if let Some(text) = value.get(field).and_then(serde_json::Value::as_str) {
                return text.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

/// [`DataBackend`] over the managed service's PostgREST tables and storage API.
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    bucket: String,
    access_token: RwLock<Option<String>>,
}

impl RestBackend {
    pub fn new(base_url: &str, api_key: &str, bucket: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bucket: bucket.to_string(),
            access_token: RwLock::new(None),
        })
    }

    fn bearer(&self) -> String {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.api_key.clone())
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{table}", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(self.bearer())
    }

    fn upsert(&self, table: &str, on_conflict: &str) -> RequestBuilder {
        self.table(Method::POST, table)
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
    }

    async fn select<T: serde::de::DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<Vec<T>> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("Failed to reach backend fetching {what}"))?;
        check(resp)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse {what} response"))
    }

    async fn execute(&self, req: RequestBuilder, what: &str) -> Result<()> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("Failed to reach backend for {what}"))?;
        check(resp).await?;
        Ok(())
    }

    #[must_use]
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{path}",
            self.base_url, self.bucket
        )
    }
}

#[async_trait]
impl DataBackend for RestBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn set_access_token(&self, token: Option<String>) {
        *self
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    async fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let req = self
            .table(Method::GET, RECIPES)
            .query(&[("select", "*"), ("order", "name")]);
        self.select(req, "recipes").await
    }

    async fn get_recipe(&self, id: &str) -> Result<Option<Recipe>> {
        let req = self
            .table(Method::GET, RECIPES)
            .query(&[("select", "*".to_string()), ("id", eq(id))]);
        match self.select::<Recipe>(req, "recipe").await {
            Ok(rows) => Ok(rows.into_iter().next()),
            // Malformed ids come back as 4xx; treat them like a missing row.
            Err(e) => match e.downcast_ref::<StoreError>() {
                Some(StoreError::Backend { status, .. }) if (400..500).contains(status) => {
                    tracing::debug!(id, status, "recipe lookup rejected, treating as not found");
                    Ok(None)
                }
                _ => Err(e),
            },
        }
    }

    async fn create_recipe(&self, recipe: &Recipe) -> Result<Recipe> {
        let req = self
            .table(Method::POST, RECIPES)
            .header("Prefer", "return=representation")
            .json(recipe);
        let rows: Vec<Recipe> = self.select(req, "created recipe").await?;
        Ok(rows.into_iter().next().unwrap_or_else(|| recipe.clone()))
    }

    async fn replace_recipe(&self, recipe: &Recipe) -> Result<Option<Recipe>> {
        let req = self
            .table(Method::PATCH, RECIPES)
            .query(&[("id", eq(&recipe.id))])
            .header("Prefer", "return=representation")
            .json(recipe);
        let rows: Vec<Recipe> = self.select(req, "replaced recipe").await?;
        Ok(rows.into_iter().next())
    }

    async fn bulk_insert_recipes(&self, recipes: &[Recipe]) -> Result<()> {
        let req = self
            .table(Method::POST, RECIPES)
            .header("Prefer", "return=minimal")
            .json(recipes);
        self.execute(req, "recipe seed").await
    }

    async fn list_catalog(&self) -> Result<Vec<CatalogItem>> {
        let req = self
            .table(Method::GET, CATALOG)
            .query(&[("select", "name,defaultUnit,category"), ("order", "name")]);
        self.select(req, "ingredient catalog").await
    }

    async fn upsert_catalog(&self, items: &[CatalogItem]) -> Result<()> {
        let req = self.upsert(CATALOG, "name").json(items);
        self.execute(req, "catalog upsert").await
    }

    async fn list_packaging(&self, ingredient_name: &str) -> Result<Vec<PackagingOption>> {
        let req = self.table(Method::GET, PACKAGING).query(&[
            ("select", "*".to_string()),
            ("ingredient_name", eq(ingredient_name)),
            ("order", "pack_amount".to_string()),
        ]);
        self.select(req, "packaging options").await
    }

    async fn upsert_packaging(&self, option: &NewPackagingOption) -> Result<PackagingOption> {
        let req = self
            .table(Method::POST, PACKAGING)
            .query(&[("on_conflict", "ingredient_name,unit,pack_amount")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[option]);
        let rows: Vec<PackagingOption> = self.select(req, "packaging upsert").await?;
        match rows.into_iter().next() {
            Some(saved) => Ok(saved),
            None => bail!("Backend returned no packaging row"),
        }
    }

    async fn delete_packaging(&self, id: &str) -> Result<()> {
        let req = self
            .table(Method::DELETE, PACKAGING)
            .query(&[("id", eq(id))]);
        self.execute(req, "packaging delete").await
    }

    async fn fetch_meal_plan(&self, user_id: &str) -> Result<Vec<MealPlanRow>> {
        let req = self.table(Method::GET, MEAL_PLANS).query(&[
            ("select", "*".to_string()),
            ("user_id", eq(user_id)),
            ("order", "date".to_string()),
        ]);
        self.select(req, "meal plan").await
    }

    async fn upsert_meal_plan(&self, row: &MealPlanRow) -> Result<()> {
        let req = self.upsert(MEAL_PLANS, "user_id,date,meal").json(row);
        self.execute(req, "meal plan upsert").await
    }

    async fn delete_meal_plan(&self, user_id: &str, date: NaiveDate, meal: Meal) -> Result<()> {
        let req = self.table(Method::DELETE, MEAL_PLANS).query(&[
            ("user_id", eq(user_id)),
            ("date", eq(date)),
            ("meal", eq(meal)),
        ]);
        self.execute(req, "meal plan delete").await
    }

    async fn fetch_grocery_list(&self, user_id: &str) -> Result<Vec<GroceryRow>> {
        let req = self.table(Method::GET, GROCERY).query(&[
            ("select", "*".to_string()),
            ("user_id", eq(user_id)),
            ("order", "ingredient_name".to_string()),
        ]);
        self.select(req, "grocery list").await
    }

    async fn upsert_grocery_item(&self, row: &GroceryRow) -> Result<()> {
        let req = self.upsert(GROCERY, "user_id,ingredient_name,unit").json(row);
        self.execute(req, "grocery upsert").await
    }

    async fn delete_grocery_item(
        &self,
        user_id: &str,
        ingredient_name: &str,
        unit: &str,
    ) -> Result<()> {
        let req = self.table(Method::DELETE, GROCERY).query(&[
            ("user_id", eq(user_id)),
            ("ingredient_name", eq(ingredient_name)),
            ("unit", eq(unit)),
        ]);
        self.execute(req, "grocery delete").await
    }

    async fn clear_grocery_list(&self, user_id: &str) -> Result<()> {
        let req = self
            .table(Method::DELETE, GROCERY)
            .query(&[("user_id", eq(user_id))]);
        self.execute(req, "grocery clear").await
    }

    async fn upload_image(&self, data: &[u8]) -> Result<String> {
        let path = format!("recipes/{}.jpg", new_id());
        let req = self
            .client
            .post(format!(
                "{}/storage/v1/object/{}/{path}",
                self.base_url, self.bucket
            ))
            .header("apikey", &self.api_key)
            .bearer_auth(self.bearer())
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .header("x-upsert", "false")
            .body(data.to_vec());
        self.execute(req, "image upload").await?;
        Ok(self.public_url(&path))
    }
}

// --- Auth ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OAuthProvider {
    Google,
    Github,
}

impl OAuthProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
        }
    }
}

impl FromStr for OAuthProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::Github),
            _ => bail!("Unknown OAuth provider '{s}'. Must be one of: google, github"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Client for the managed service's auth endpoints.
pub struct AuthClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AuthClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/auth/v1/{endpoint}", self.base_url)
    }

    /// Email a one-time sign-in link.
    pub async fn send_magic_link(&self, email: &str, redirect_to: Option<&str>) -> Result<()> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            bail!("Invalid email address '{email}'");
        }
        let mut req = self
            .client
            .post(self.auth_url("otp"))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "create_user": true }));
        if let Some(redirect) = redirect_to {
            req = req.query(&[("redirect_to", redirect)]);
        }
        let resp = req.send().await.context("Failed to reach auth service")?;
        check(resp).await?;
        Ok(())
    }

    /// URL the user opens in a browser to sign in with `provider`.
    pub fn oauth_url(&self, provider: OAuthProvider, redirect_to: Option<&str>) -> Result<String> {
        let mut params = vec![("provider", provider.as_str())];
        if let Some(redirect) = redirect_to {
            params.push(("redirect_to", redirect));
        }
        let url = Url::parse_with_params(&self.auth_url("authorize"), &params)
            .context("Invalid backend URL")?;
        Ok(url.to_string())
    }

    /// Resolve the user behind an access token.
    pub async fn current_user(&self, access_token: &str) -> Result<AuthUser> {
        let resp = self
            .client
            .get(self.auth_url("user"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to reach auth service")?;
        check(resp)
            .await?
            .json()
            .await
            .context("Failed to parse auth user response")
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.auth_url("logout"))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to reach auth service")?;
        check(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{any, get, post};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Seen {
        query: HashMap<String, String>,
        headers: HeaderMap,
    }

    type Log = Arc<Mutex<Vec<Seen>>>;

    async fn recipes_handler(
        State(log): State<Log>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> (StatusCode, String) {
        log.lock().unwrap().push(Seen {
            query: query.clone(),
            headers,
        });
        if query.get("id").is_some_and(|id| id == "eq.bad") {
            return (
                StatusCode::BAD_REQUEST,
                r#"{"message":"invalid input syntax for type uuid"}"#.to_string(),
            );
        }
        let body = serde_json::json!([{
            "id": "r1",
            "name": "Toast",
            "description": "Crunchy",
            "image": "",
            "cookTime": 5,
            "servings": 1,
            "difficulty": "easy",
            "ingredients": [],
            "instructions": ["Toast it"],
            "tags": []
        }]);
        (StatusCode::OK, body.to_string())
    }

    async fn grocery_handler(
        State(log): State<Log>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> StatusCode {
        log.lock().unwrap().push(Seen { query, headers });
        StatusCode::CREATED
    }

    async fn broken_handler() -> (StatusCode, String) {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"message":"database is waking up"}"#.to_string(),
        )
    }

    async fn fake_service() -> (String, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/rest/v1/recipes", get(recipes_handler))
            .route("/rest/v1/grocery_lists", any(grocery_handler))
            .route("/rest/v1/meal_plans", any(broken_handler))
            .route("/storage/v1/object/{bucket}/{*path}", post(|| async { StatusCode::OK }))
            .with_state(Arc::clone(&log));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), log)
    }

    #[tokio::test]
    async fn test_list_recipes_sends_keys_and_order() {
        let (url, log) = fake_service().await;
        let backend = RestBackend::new(&format!("{url}/"), "anon-key", "images").unwrap();

        let recipes = backend.list_recipes().await.unwrap();
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].cook_time, 5);

        let seen = log.lock().unwrap()[0].clone();
        assert_eq!(seen.query.get("order").map(String::as_str), Some("name"));
        assert_eq!(seen.headers["apikey"], "anon-key");
        assert_eq!(seen.headers["authorization"], "Bearer anon-key");
    }

    #[tokio::test]
    async fn test_access_token_replaces_key_in_bearer() {
        let (url, log) = fake_service().await;
        let backend = RestBackend::new(&url, "anon-key", "images").unwrap();
        backend.set_access_token(Some("user-token".to_string()));
        backend.list_recipes().await.unwrap();
        let seen = log.lock().unwrap()[0].clone();
        assert_eq!(seen.headers["authorization"], "Bearer user-token");
        assert_eq!(seen.headers["apikey"], "anon-key");
    }

    #[tokio::test]
    async fn test_get_recipe_bad_id_is_not_found() {
        let (url, _log) = fake_service().await;
        let backend = RestBackend::new(&url, "k", "images").unwrap();
        assert!(backend.get_recipe("bad").await.unwrap().is_none());
        assert_eq!(backend.get_recipe("r1").await.unwrap().unwrap().name, "Toast");
    }

    #[tokio::test]
    async fn test_grocery_upsert_uses_conflict_key() {
        let (url, log) = fake_service().await;
        let backend = RestBackend::new(&url, "k", "images").unwrap();
        let row = GroceryRow {
            id: None,
            user_id: "u1".to_string(),
            ingredient_name: "Garlic".to_string(),
            amount: 5.0,
            unit: "cloves".to_string(),
            category: larder_core::models::Category::Spice,
            checked: true,
            is_custom: false,
        };
        backend.upsert_grocery_item(&row).await.unwrap();
        backend
            .delete_grocery_item("u1", "Garlic", "cloves")
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(
            log[0].query.get("on_conflict").map(String::as_str),
            Some("user_id,ingredient_name,unit")
        );
        assert!(
            log[0].headers["prefer"]
                .to_str()
                .unwrap()
                .contains("resolution=merge-duplicates")
        );
        assert_eq!(log[1].query.get("unit").map(String::as_str), Some("eq.cloves"));
        assert_eq!(
            log[1].query.get("ingredient_name").map(String::as_str),
            Some("eq.Garlic")
        );
    }

    #[tokio::test]
    async fn test_backend_errors_are_typed() {
        let (url, _log) = fake_service().await;
        let backend = RestBackend::new(&url, "k", "images").unwrap();
        let err = backend.fetch_meal_plan("u1").await.unwrap_err();
        match err.downcast_ref::<StoreError>() {
            Some(StoreError::Backend { status, message }) => {
                assert_eq!(*status, 503);
                assert_eq!(message, "database is waking up");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_returns_public_url() {
        let (url, _log) = fake_service().await;
        let backend = RestBackend::new(&url, "k", "pics").unwrap();
        let public = backend.upload_image(&[0xFF, 0xD8]).await.unwrap();
        assert!(public.starts_with(&format!("{url}/storage/v1/object/public/pics/recipes/")));
        assert!(public.ends_with(".jpg"));
    }

    #[test]
    fn test_oauth_url() {
        let auth = AuthClient::new("https://abc.example.co/", "k").unwrap();
        let url = auth
            .oauth_url(OAuthProvider::Github, Some("http://localhost:3000/"))
            .unwrap();
        assert!(url.starts_with("https://abc.example.co/auth/v1/authorize?provider=github"));
        assert!(url.contains("redirect_to=http%3A%2F%2Flocalhost%3A3000%2F"));
    }

    #[test]
    fn test_oauth_provider_parse() {
        assert_eq!("Google".parse::<OAuthProvider>().unwrap(), OAuthProvider::Google);
        assert!("facebook".parse::<OAuthProvider>().is_err());
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"msg":"Token expired"}"#), "Token expired");
        assert_eq!(error_message(""), "empty response");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}
