//! HTTP API over the trained pipeline: rankings, per-user features, raw logs, refresh.

use crate::error::Error;
use crate::pipeline::{train_and_store, ThreatPipeline};
use crate::storage::SecureStore;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RwLock<ThreatPipeline>>,
    pub store: Option<Arc<SecureStore>>,
    pub default_top_n: usize,
}

impl AppState {
    pub fn new(pipeline: ThreatPipeline, store: Option<Arc<SecureStore>>) -> Self {
        let default_top_n = pipeline.config().server.default_top_n;
        Self {
            pipeline: Arc::new(RwLock::new(pipeline)),
            store,
            default_top_n,
        }
    }
}

/// JSON error body `{"error": ...}` with a status code
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct TopNParams {
    top_n: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserParams {
    user: Option<String>,
}

fn parse_top_n(params: &TopNParams, default: usize) -> Result<usize, ApiError> {
    match params.top_n.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) => v.parse::<usize>().map_err(|_| {
            ApiError(
                StatusCode::BAD_REQUEST,
                format!("top_n must be a non-negative integer, got {v:?}"),
            )
        }),
    }
}

fn require_user(params: &UserParams) -> Result<&str, ApiError> {
    params
        .user
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError(StatusCode::BAD_REQUEST, "pass user param".into()))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/risky_users", get(risky_users))
        .route("/risky_users/table", get(risky_users_table))
        .route("/user/features", get(user_features))
        .route("/user/raw", get(user_raw))
        .route("/refresh", post(refresh))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let p = state.pipeline.read().await;
    Json(json!({
        "status": "ok",
        "users": p.user_count(),
        "trained": p.is_trained(),
    }))
}

async fn risky_users(
    State(state): State<AppState>,
    Query(params): Query<TopNParams>,
) -> Result<impl IntoResponse, ApiError> {
    let top_n = parse_top_n(&params, state.default_top_n)?;
    let p = state.pipeline.read().await;
    Ok(Json(p.risky_users(top_n)))
}

async fn risky_users_table(
    State(state): State<AppState>,
    Query(params): Query<TopNParams>,
) -> Result<Html<String>, ApiError> {
    let top_n = parse_top_n(&params, state.default_top_n)?;
    let records = state.pipeline.read().await.risky_users(top_n);
    if records.is_empty() {
        return Ok(Html("<h3>No data available</h3>".to_string()));
    }
    let rows: Vec<Value> = records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<_, _>>()
        .map_err(|e| ApiError::from(Error::from(e)))?;
    Ok(Html(render_table_page(&rows)))
}

async fn user_features(
    State(state): State<AppState>,
    Query(params): Query<UserParams>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&params)?;
    let p = state.pipeline.read().await;
    Ok(Json(p.user_features(user)))
}

async fn user_raw(
    State(state): State<AppState>,
    Query(params): Query<UserParams>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&params)?;
    let p = state.pipeline.read().await;
    Ok(Json(p.user_raw(user)))
}

/// Retrain from the CSVs on a blocking thread, then swap the live pipeline.
async fn refresh(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    info!("refreshing model");
    let config = state.pipeline.read().await.config().clone();
    let store = state.store.clone();
    let fresh = tokio::task::spawn_blocking(move || train_and_store(config, store.as_deref()))
        .await
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            warn!(error = %e, "refresh failed");
            ApiError::from(e)
        })?;
    let users = fresh.user_count();
    *state.pipeline.write().await = fresh;
    info!(users, "model refreshed");
    Ok(Json(json!({ "status": "ok" })))
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn cell(v: &Value) -> String {
    match v {
        Value::String(s) => escape_html(s),
        Value::Null => String::new(),
        other => escape_html(&other.to_string()),
    }
}

/// Bordered HTML table; columns come from the first record's keys.
pub fn render_table_page(records: &[Value]) -> String {
    let columns: Vec<&String> = records
        .first()
        .and_then(Value::as_object)
        .map(|o| o.keys().collect())
        .unwrap_or_default();

    let mut table = String::from("<table border='1' style='border-collapse:collapse;padding:6px;'>");
    table.push_str("<tr>");
    for col in &columns {
        table.push_str(&format!("<th>{}</th>", escape_html(col)));
    }
    table.push_str("</tr>");
    for row in records {
        table.push_str("<tr>");
        for col in &columns {
            let v = row.get(col.as_str()).unwrap_or(&Value::Null);
            table.push_str(&format!("<td>{}</td>", cell(v)));
        }
        table.push_str("</tr>");
    }
    table.push_str("</table>");

    format!(
        r#"<html>
  <head>
    <title>Risky Users</title>
    <style>
      body {{ font-family: Arial, sans-serif; padding: 20px; }}
      table {{ border: 1px solid #ccc; width: 100%; }}
      th {{ background: #f2f2f2; text-align: left; padding: 6px; }}
      td {{ padding: 6px; }}
    </style>
  </head>
  <body>
    <h2>Top Risky Users (Ranked)</h2>
    {table}
  </body>
</html>
"#
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// Bind and serve until Ctrl-C.
pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
