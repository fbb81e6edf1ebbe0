use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::AppState;
use crate::api::auth::RequireAdmin;
use crate::api::models::{EnrichRequest, EnrichResponse};
use crate::api::response;
use crate::enrich::EntityKind;
use crate::error::Result;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/enrich/organizations", post(enrich_organizations))
        .route("/api/enrich/investors", post(enrich_investors))
        .route("/api/enrich/sections", post(enrich_sections))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn enrich_organizations(
    admin: RequireAdmin,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    run_enrichment(EntityKind::Organizations, admin, &state, &body).await
}

async fn enrich_investors(
    admin: RequireAdmin,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    run_enrichment(EntityKind::Investors, admin, &state, &body).await
}

async fn enrich_sections(
    admin: RequireAdmin,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    run_enrichment(EntityKind::Sections, admin, &state, &body).await
}

/// Runs the whole batch before responding; per-target failures are part of
/// the 200 response, only configuration and selection errors are not.
async fn run_enrichment(
    kind: EntityKind,
    RequireAdmin(admin): RequireAdmin,
    state: &AppState,
    body: &[u8],
) -> Result<(StatusCode, Json<EnrichResponse>)> {
    let pipeline = state.pipeline(kind)?;
    let selection = EnrichRequest::from_body(body)?.into_selection(kind)?;

    info!(
        kind = %kind,
        admin = %admin.user_id,
        target_id = ?selection.target_id,
        only_missing = selection.only_missing,
        "Enrichment run requested"
    );

    let start_time = std::time::Instant::now();
    let summary = pipeline.run(kind.adapter(), &selection).await?;
    info!(kind = %kind, elapsed = ?start_time.elapsed(), "Enrichment request finished");

    Ok(response::success(EnrichResponse::from_summary(kind, summary)))
}
