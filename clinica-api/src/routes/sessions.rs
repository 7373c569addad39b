//! Session Note REST Routes
//!
//! Listing and creation of therapy session notes over the discovered
//! session shape.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use clinica_core::{bounds, SortDirection};

use crate::audit::AuditEntry;
use crate::error::ApiResult;
use crate::middleware::AuthExtractor;
use crate::policy::AccessPolicy;
use crate::query::{InsertBuilder, ProjType, SelectBuilder};
use crate::schema::{field, PgCatalog, Shape, SESSION};
use crate::state::AppState;
use crate::types::{CreateSessionRequest, ListSessionsQuery, SessionRecord};
use crate::validation::ValidateNonEmpty;

const MAX_LIST_LIMIT: i64 = 500;
const DEFAULT_LIST_LIMIT: i64 = 200;

fn project_session(builder: SelectBuilder<'_>) -> SelectBuilder<'_> {
    builder
        .project(field::ID, ProjType::BigInt)
        .project(field::PATIENT_ID, ProjType::BigInt)
        .project(field::CLINICIAN_ID, ProjType::BigInt)
        .project(field::OCCURRED_AT, ProjType::Timestamp)
        .project(field::TITLE, ProjType::Text)
        .project(field::NOTE, ProjType::Text)
}

/// GET /sessions - List session notes
pub async fn list_sessions(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Query(params): Query<ListSessionsQuery>,
) -> ApiResult<impl IntoResponse> {
    let policy = AccessPolicy::new(&ctx);
    let limit = bounds::clamp_limit(params.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);

    let client = state.db.client().await?;
    let shape = Shape::discover(&PgCatalog::new(&client), &SESSION).await?;

    let mut builder = project_session(SelectBuilder::new(&shape));
    builder = policy.scope_select(builder, policy.list_scope(false, None));
    if let Some(patient_id) = params.patient_id {
        builder = builder.filter_eq(field::PATIENT_ID, patient_id);
    }

    let (sql, bind) = builder
        .order_preferring(&[field::OCCURRED_AT, field::ID], SortDirection::Desc)
        .limit(limit)
        .build();

    let rows = client.query(&sql, &bind.as_refs()).await?;
    let sessions = rows
        .iter()
        .map(SessionRecord::from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(sessions))
}

/// POST /sessions - Create a session note
///
/// The session is always owned by its author; the session date is the
/// server's clock, never the payload's.
pub async fn create_session(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    req.note.validate_non_empty("note")?;

    let client = state.db.client().await?;
    let shape = Shape::discover(&PgCatalog::new(&client), &SESSION).await?;

    let mut builder = InsertBuilder::new(&shape);
    builder.set(field::PATIENT_ID, req.patient_id);
    builder.set(field::CLINICIAN_ID, ctx.user_id);
    builder.set(field::NOTE, req.note.trim().to_string());
    if let Some(title) = req.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        builder.set(field::TITLE, title.to_string());
    }
    builder.set_expr(field::OCCURRED_AT, "NOW()");

    builder
        .returning(field::ID, ProjType::BigInt)
        .returning(field::PATIENT_ID, ProjType::BigInt)
        .returning(field::CLINICIAN_ID, ProjType::BigInt)
        .returning_first(
            &[field::OCCURRED_AT],
            ProjType::Timestamp,
            field::OCCURRED_AT,
            Some("NOW()"),
        )
        .returning(field::TITLE, ProjType::Text)
        .returning(field::NOTE, ProjType::Text);

    let (sql, bind) = builder.build("session create")?;
    let row = client.query_one(&sql, &bind.as_refs()).await?;
    let session = SessionRecord::from_row(&row)?;

    state.audit.record(
        AuditEntry::new(ctx.user_id, "CREAR_SESION", "session")
            .entity_id(session.id.unwrap_or_default())
            .detail(serde_json::json!({ "patient_id": req.patient_id })),
    );

    Ok((StatusCode::CREATED, Json(session)))
}
