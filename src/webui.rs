use crate::config::{self, AppConfig};
use crate::dashboard::{self, DashboardRequest, DashboardView};
use crate::forecast_page::{self, ForecastRequest, ForecastView};
use anyhow::Result;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

const INDEX_HTML: &str = include_str!("../web/index.html");
const APP_JS: &str = include_str!("../web/app.js");

/// Longest ticker field accepted from the page.
const MAX_TICKER_INPUT: usize = 512;

#[derive(Clone)]
struct WebState {
    config: Arc<AppConfig>,
}

#[derive(Clone, Debug, Serialize)]
struct ApiError {
    error: String,
}

#[derive(Clone, Debug, Serialize)]
struct PageConfig {
    title: &'static str,
    default_dashboard_tickers: &'static str,
    default_forecast_ticker: &'static str,
    forecast_horizon: usize,
    seasonal_period: usize,
    provider: &'static str,
}

pub fn router(config: AppConfig) -> Router {
    let state = WebState {
        config: Arc::new(config),
    };

    Router::new()
        .route("/", get(index))
        .route("/app.js", get(app_js))
        .route("/api/health", get(health))
        .route("/api/config", get(page_config))
        .route("/api/dashboard", post(dashboard_view))
        .route("/api/forecast", post(forecast_view))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_webui_server(host: &str, port: u16, config: AppConfig) -> Result<()> {
    let app = router(config);

    let addr = format!("{}:{}", host, port);
    info!("WebUI listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn app_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/javascript; charset=utf-8")], APP_JS)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn page_config(State(state): State<WebState>) -> Json<PageConfig> {
    Json(PageConfig {
        title: config::DASHBOARD_TITLE,
        default_dashboard_tickers: config::DEFAULT_DASHBOARD_TICKERS,
        default_forecast_ticker: config::DEFAULT_FORECAST_TICKER,
        forecast_horizon: state.config.forecast_horizon,
        seasonal_period: state.config.seasonal_period,
        provider: state.config.fetch.provider.as_str(),
    })
}

async fn dashboard_view(
    State(state): State<WebState>,
    Json(req): Json<DashboardRequest>,
) -> Result<Json<DashboardView>, (StatusCode, Json<ApiError>)> {
    if req.tickers.len() > MAX_TICKER_INPUT {
        return Err(api_err(StatusCode::BAD_REQUEST, "ticker list is too long"));
    }
    Ok(Json(dashboard::render_dashboard(&req, &state.config).await))
}

async fn forecast_view(
    State(state): State<WebState>,
    Json(req): Json<ForecastRequest>,
) -> Result<Json<ForecastView>, (StatusCode, Json<ApiError>)> {
    if req.tickers.len() > MAX_TICKER_INPUT {
        return Err(api_err(StatusCode::BAD_REQUEST, "ticker list is too long"));
    }
    Ok(Json(forecast_page::render_forecast(&req, &state.config).await))
}

fn api_err(status: StatusCode, message: &str) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: message.to_string(),
        }),
    )
}
