use anyhow::Result;

use crate::config::{Config, StoredSession};
use crate::remote::{AuthClient, OAuthProvider};
use larder_core::backend::BackendKind;
use larder_core::error::StoreError;

use super::Kitchen;

fn require(auth: Option<&AuthClient>) -> Result<&AuthClient> {
    auth.ok_or_else(|| {
        StoreError::NotConfigured("auth (set LARDER_BACKEND_URL and LARDER_BACKEND_KEY)").into()
    })
}

pub(crate) async fn cmd_auth_login(
    auth: Option<&AuthClient>,
    email: &str,
    redirect_to: Option<&str>,
    json: bool,
) -> Result<()> {
    let auth = require(auth)?;
    auth.send_magic_link(email, redirect_to).await?;
    if json {
        println!("{}", serde_json::json!({ "sent": true, "email": email }));
    } else {
        println!("Sign-in link sent to {email}.");
        println!("After following it, store the access token with: larder auth session <token>");
    }
    Ok(())
}

pub(crate) fn cmd_auth_oauth(
    auth: Option<&AuthClient>,
    provider: OAuthProvider,
    redirect_to: Option<&str>,
    json: bool,
) -> Result<()> {
    let auth = require(auth)?;
    let url = auth.oauth_url(provider, redirect_to)?;
    if json {
        println!("{}", serde_json::json!({ "provider": provider.as_str(), "url": url }));
    } else {
        println!("Open this URL to sign in with {}:\n\n  {url}\n", provider.as_str());
        println!("Then store the access token with: larder auth session <token>");
    }
    Ok(())
}

/// Validate `token` against the auth service and store it for later runs.
pub(crate) async fn cmd_auth_session(
    config: &Config,
    auth: Option<&AuthClient>,
    token: &str,
    json: bool,
) -> Result<()> {
    let auth = require(auth)?;
    let token = token.trim();
    let user = auth.current_user(token).await?;
    config.save_session(&StoredSession {
        access_token: token.to_string(),
        user_id: Some(user.id.clone()),
        email: user.email.clone(),
    })?;
    tracing::info!(user = %user.id, "session stored");

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        let who = user.email.as_deref().unwrap_or(&user.id);
        println!("Signed in as {who}");
    }
    Ok(())
}

pub(crate) async fn cmd_auth_logout(
    config: &Config,
    auth: Option<&AuthClient>,
    json: bool,
) -> Result<()> {
    if let (Some(auth), Some(session)) = (auth, config.load_session()?) {
        if let Err(e) = auth.sign_out(&session.access_token).await {
            tracing::warn!(error = %format!("{e:#}"), "remote sign-out failed, clearing local session anyway");
        }
    }
    let removed = config.clear_session()?;
    if json {
        println!("{}", serde_json::json!({ "signed_out": removed }));
    } else if removed {
        println!("Signed out");
    } else {
        println!("Not signed in");
    }
    Ok(())
}

pub(crate) fn cmd_auth_status(config: &Config, kitchen: &Kitchen, json: bool) -> Result<()> {
    let session = config.load_session()?;
    let backend = kitchen.service.kind();
    if json {
        println!(
            "{}",
            serde_json::json!({
                "backend": backend,
                "user_id": kitchen.user_id,
                "email": session.as_ref().and_then(|s| s.email.clone()),
            })
        );
        return Ok(());
    }

    match backend {
        BackendKind::Local => println!("Backend: local store at {}", config.db_path.display()),
        BackendKind::Remote => println!("Backend: remote"),
    }
    match (&kitchen.user_id, session.as_ref().and_then(|s| s.email.as_deref())) {
        (Some(_), Some(email)) => println!("Signed in as {email}"),
        (Some(id), None) => println!("User: {id}"),
        (None, _) => println!("Not signed in; plan and grocery changes are not saved"),
    }
    Ok(())
}
