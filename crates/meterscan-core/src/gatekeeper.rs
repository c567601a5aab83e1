//! meterscan gate: HTTP front for batch analysis
//!
//! Endpoints:
//! - POST /analyze  CSV or workbook sheet in the body, threshold overrides as
//!                  query params
//! - GET  /config   effective engine configuration
//! - GET  /metrics  Prometheus metrics
//! - GET  /health   liveness

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use meterscan_core::{
    AnalysisReport, EngineConfig, RiskTier, Thresholds, analyze_table, metrics, table::load_table_bytes,
};

#[derive(Parser, Debug)]
#[command(name = "meterscan-gate", about = "HTTP server for meter anomaly analysis")]
struct Args {
    /// Listen address
    #[arg(long, default_value = "0.0.0.0:3000")]
    addr: String,

    /// JSON engine configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Analysis worker threads per request
    #[arg(long, default_value_t = 1)]
    workers: usize,
}

#[derive(Clone)]
struct AppState {
    config: Arc<EngineConfig>,
    workers: usize,
}

/// Query parameters of `POST /analyze`. Missing thresholds fall back to the
/// server configuration.
#[derive(Debug, Default, Deserialize)]
struct AnalyzeParams {
    low: Option<f64>,
    neighbor: Option<f64>,
    drop: Option<f64>,
    tier: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl ToString) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn analyze_handler(
    State(state): State<AppState>,
    Query(params): Query<AnalyzeParams>,
    body: Bytes,
) -> Result<Json<AnalysisReport>, ApiError> {
    let mut config = (*state.config).clone();
    config.thresholds = Thresholds {
        low_consumption_threshold: params
            .low
            .unwrap_or(config.thresholds.low_consumption_threshold),
        neighbor_ratio_threshold: params
            .neighbor
            .unwrap_or(config.thresholds.neighbor_ratio_threshold),
        sudden_drop_threshold: params
            .drop
            .unwrap_or(config.thresholds.sudden_drop_threshold),
    };
    config.thresholds.validate().map_err(ApiError::bad_request)?;

    let tier = match params.tier.as_deref() {
        Some(raw) => Some(
            RiskTier::parse(raw).ok_or_else(|| ApiError::bad_request(format!("unknown tier: {raw}")))?,
        ),
        None => None,
    };

    let workers = state.workers;
    let result = tokio::task::spawn_blocking(move || {
        let raw = load_table_bytes(&body)?;
        analyze_table(&raw, &config, workers)
    })
    .await
    .map_err(|e| ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: e.to_string(),
    })?;

    let mut report = result.map_err(|e| {
        warn!(error = %e, "Rejected analysis request.");
        ApiError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: e.to_string(),
        }
    })?;

    if let Some(tier) = tier {
        report.retain_tiers(&[tier]);
    }

    info!(
        run_id = %report.run_id,
        facilities = report.dataset.facilities,
        findings = report.flagged_count(),
        "Analysis served."
    );
    Ok(Json(report))
}

async fn config_handler(State(state): State<AppState>) -> Json<EngineConfig> {
    Json((*state.config).clone())
}

async fn metrics_handler() -> String {
    metrics::render()
}

async fn health_handler() -> &'static str {
    "OK"
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(analyze_handler))
        .route("/config", get(config_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

// ============================================================================
// MAIN
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    config.validate()?;

    // Register metrics before the first scrape.
    let _ = &*metrics::FACILITIES_SCANNED;
    let _ = &*metrics::FINDINGS_TOTAL;
    let _ = &*metrics::RULE_FIRED_TOTAL;
    let _ = &*metrics::ANALYSIS_DURATION;

    let state = AppState {
        config: Arc::new(config),
        workers: args.workers.max(1),
    };

    let listener = TcpListener::bind(&args.addr).await?;
    info!(addr = %args.addr, workers = state.workers, "Gate listening.");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("Failed to install CTRL+C handler");
                std::future::pending::<()>().await;
            }
            info!("Shutting down.");
        })
        .await?;

    Ok(())
}
