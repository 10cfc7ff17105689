use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect},
};
use serde::Deserialize;

use crate::{error::AppError, google::oauth::ConsentClient, state::AppState};

const NO_REFRESH_TOKEN: &str =
    "No refresh token returned. Ensure access_type=offline and prompt=consent.";

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

fn consent_client(state: &AppState) -> Result<ConsentClient, AppError> {
    ConsentClient::from_config(&state.config.google).map_err(|missing| {
        AppError::BadRequest(format!("missing configuration: {}", missing.join(", ")))
    })
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn callback_page(refresh_token: Option<&str>, access_token: Option<&str>) -> String {
    format!(
        r#"<!doctype html>
<html>
  <body style="font-family: sans-serif; padding: 24px;">
    <h2>Google Analytics authorization</h2>
    <p>Store the refresh token below as <code>GA_OAUTH_REFRESH_TOKEN</code>.</p>
    <pre style="background:#111;color:#0f0;padding:12px;border-radius:8px;">{}</pre>
    <p>Access token (short-lived):</p>
    <pre style="background:#111;color:#0cf;padding:12px;border-radius:8px;">{}</pre>
  </body>
</html>
"#,
        escape_html(refresh_token.unwrap_or(NO_REFRESH_TOKEN)),
        escape_html(access_token.unwrap_or("None")),
    )
}

/// `GET /api/oauth/google/start` - redirect to Google's consent screen.
#[tracing::instrument(skip(state))]
pub async fn start(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let client = consent_client(&state)?;
    let url = client.consent_url(&state.config.google.scopes)?;
    Ok(Redirect::temporary(url.as_str()))
}

/// `GET /api/oauth/google/callback?code=` - exchange the code and show the
/// tokens to the operator.
#[tracing::instrument(skip(state, q))]
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CallbackQuery>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(error) = q.error {
        return Err(AppError::BadRequest(format!("authorization denied: {error}")));
    }
    let code = q
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("missing code".to_string()))?;
    let client = consent_client(&state)?;

    let tokens = client
        .exchange_code(&state.http, &code)
        .await
        .map_err(|e| AppError::Upstream(format!("{e:#}")))?;
    if tokens.refresh_token.is_none() {
        tracing::warn!("OAuth exchange returned no refresh token");
    }

    Ok(Html(callback_page(
        tokens.refresh_token.as_deref(),
        tokens.access_token.as_deref(),
    )))
}
