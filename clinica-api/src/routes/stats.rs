//! Reporting REST Routes
//!
//! Thin handlers over the aggregation engine. Every report is scoped to
//! the calling clinician's own activity regardless of role.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use clinica_core::SortDirection;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::middleware::AuthExtractor;
use crate::state::AppState;
use crate::stats::{RecordsReportFilter, Reports};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopQuery {
    pub days: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotesQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordsReportQuery {
    pub q: Option<String>,
    #[serde(alias = "sex")]
    pub sexo: Option<String>,
    pub order: Option<String>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

/// GET /stats/overview
pub async fn overview(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
) -> ApiResult<impl IntoResponse> {
    let client = state.db.client().await?;
    let report = Reports::new(&client, ctx.user_id).overview().await?;
    Ok(Json(report))
}

/// GET /stats/records
pub async fn records_report(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Query(params): Query<RecordsReportQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = RecordsReportFilter {
        q: params.q,
        sex: params.sexo,
        order: SortDirection::from_param(params.order.as_deref().unwrap_or("")),
        limit: params.limit,
        page: params.page,
    };
    let client = state.db.client().await?;
    let report = Reports::new(&client, ctx.user_id)
        .records_report(&filter)
        .await?;
    Ok(Json(report))
}

/// GET /stats/modules
pub async fn modules(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Query(params): Query<WindowQuery>,
) -> ApiResult<impl IntoResponse> {
    let client = state.db.client().await?;
    let report = Reports::new(&client, ctx.user_id).modules(params.days).await?;
    Ok(Json(report))
}

/// GET /stats/module/:kind/summary
pub async fn module_summary(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Path(kind): Path<String>,
    Query(params): Query<WindowQuery>,
) -> ApiResult<impl IntoResponse> {
    let client = state.db.client().await?;
    let report = Reports::new(&client, ctx.user_id)
        .module_summary(&kind, params.days)
        .await?;
    Ok(Json(report))
}

/// GET /stats/module/:kind/series
pub async fn module_series(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Path(kind): Path<String>,
    Query(params): Query<WindowQuery>,
) -> ApiResult<impl IntoResponse> {
    let client = state.db.client().await?;
    let report = Reports::new(&client, ctx.user_id)
        .module_series(&kind, params.days)
        .await?;
    Ok(Json(report))
}

/// GET /stats/module/:kind/top-records
pub async fn module_top(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Path(kind): Path<String>,
    Query(params): Query<TopQuery>,
) -> ApiResult<impl IntoResponse> {
    let client = state.db.client().await?;
    let report = Reports::new(&client, ctx.user_id)
        .module_top(&kind, params.days, params.limit)
        .await?;
    Ok(Json(report))
}

/// GET /stats/notes
pub async fn recent_notes(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Query(params): Query<NotesQuery>,
) -> ApiResult<impl IntoResponse> {
    let client = state.db.client().await?;
    let report = Reports::new(&client, ctx.user_id)
        .recent_notes(params.limit)
        .await?;
    Ok(Json(report))
}
