//! Session Comment REST Routes
//!
//! Comments attach to sessions. Two creation flows exist: a direct one
//! against an existing session, and an implicit one that opens and
//! closes a session and attaches the comment in a single transaction.
//! The feed endpoint joins comments with their session and patient
//! context.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use clinica_core::{bounds, EntityId, Sex, SortDirection};
use tokio_postgres::Client;

use crate::audit::AuditEntry;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::policy::AccessPolicy;
use crate::query::{InsertBuilder, ParamBuffer, ProjType, SelectBuilder};
use crate::schema::{field, PgCatalog, Shape, COMMENT, PATIENT, SESSION};
use crate::state::AppState;
use crate::types::{
    CommentFeedItem, CommentRecord, CreateCommentRequest, CreateLogCommentRequest,
    ListCommentsQuery, LogCommentResponse,
};
use crate::validation::ValidateNonEmpty;

const MAX_LIST_LIMIT: i64 = 500;
const DEFAULT_LIST_LIMIT: i64 = 200;

/// The session must exist and be visible to the caller; an invisible
/// session answers exactly like a missing one.
async fn require_visible_session(
    client: &Client,
    ses: &Shape,
    policy: &AccessPolicy,
    session_id: EntityId,
) -> ApiResult<()> {
    let id_col = ses.require(field::ID)?;
    let mut bind = ParamBuffer::new();
    let ph = bind.push(session_id);
    let mut sql = format!("SELECT 1 FROM {} WHERE {} = {}", ses.table, id_col, ph);
    if !policy.is_admin() {
        if let Some(owner) = ses.col(field::CLINICIAN_ID) {
            let ph = bind.push(policy.user_id);
            sql.push_str(&format!(" AND {} = {}", owner, ph));
        }
    }
    if client.query_opt(&sql, &bind.as_refs()).await?.is_none() {
        return Err(ApiError::entity_not_found("Session", session_id));
    }
    Ok(())
}

/// Columns the feed's text search runs over: the comment body plus the
/// joined patient's name columns, whichever exist.
fn feed_search_haystack(cmt: &Shape, pac: Option<&Shape>) -> Vec<String> {
    let mut cols = Vec::new();
    if let Some(body) = cmt.col(field::BODY) {
        cols.push(format!("COALESCE(c.{}, '')", body));
    }
    if let Some(p) = pac {
        for f in [field::LAST_NAME, field::FIRST_NAME] {
            if let Some(c) = p.col(f) {
                cols.push(format!("COALESCE(p.{}, '')", c));
            }
        }
    }
    cols
}

fn comment_returning(builder: &mut InsertBuilder<'_>) {
    builder
        .returning(field::ID, ProjType::BigInt)
        .returning(field::SESSION_ID, ProjType::BigInt)
        .returning(field::AUTHOR_ID, ProjType::BigInt)
        .returning(field::BODY, ProjType::Text)
        .returning_first(
            &[field::CREATED],
            ProjType::Timestamp,
            field::CREATED,
            Some("NOW()"),
        )
        .returning_first(
            &[field::UPDATED, field::CREATED],
            ProjType::Timestamp,
            field::UPDATED,
            Some("NOW()"),
        );
}

fn build_comment_insert(
    cmt: &Shape,
    session_id: EntityId,
    author_id: EntityId,
    body: &str,
) -> ApiResult<(String, ParamBuffer)> {
    let mut builder = InsertBuilder::new(cmt);
    builder.set(field::SESSION_ID, session_id);
    builder.set(field::AUTHOR_ID, author_id);
    builder.set(field::BODY, body.trim().to_string());
    builder.set_expr(field::CREATED, "NOW()");
    builder.set_expr(field::UPDATED, "NOW()");
    comment_returning(&mut builder);
    Ok(builder.build("comment create")?)
}

/// POST /sessions/:id/comments - Comment on an existing session
pub async fn create_comment(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Path(session_id): Path<EntityId>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    let policy = AccessPolicy::new(&ctx);
    req.body.validate_non_empty("body")?;

    let client = state.db.client().await?;
    let catalog = PgCatalog::new(&client);
    let ses = Shape::discover(&catalog, &SESSION).await?;
    let cmt = Shape::discover(&catalog, &COMMENT).await?;

    require_visible_session(&client, &ses, &policy, session_id).await?;

    let (sql, bind) = build_comment_insert(&cmt, session_id, ctx.user_id, &req.body)?;
    let row = client.query_one(&sql, &bind.as_refs()).await?;
    let comment = CommentRecord::from_row(&row)?;

    state.audit.record(
        AuditEntry::new(ctx.user_id, "CREAR_COMENTARIO", "comment")
            .entity_id(comment.id.unwrap_or_default())
            .detail(serde_json::json!({ "session_id": session_id })),
    );

    Ok((StatusCode::CREATED, Json(comment)))
}

/// POST /sessions/comments - Comment without an open session
///
/// Opens an already-closed session for the patient and attaches the
/// comment to it, atomically: either both rows land or neither does.
pub async fn create_log_comment(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Json(req): Json<CreateLogCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    req.body.validate_non_empty("body")?;

    let mut client = state.db.client().await?;
    let (ses, cmt) = {
        let catalog = PgCatalog::new(&client);
        (
            Shape::discover(&catalog, &SESSION).await?,
            Shape::discover(&catalog, &COMMENT).await?,
        )
    };
    ses.require(field::ID)?;

    let tx = client.transaction().await?;

    let mut builder = InsertBuilder::new(&ses);
    builder.set(field::PATIENT_ID, req.patient_id);
    builder.set(field::CLINICIAN_ID, ctx.user_id);
    builder.set(field::STATUS, "CERRADA");
    builder.set_expr(field::OCCURRED_AT, "NOW()");
    builder.set_expr(field::ENDED_AT, "NOW()");
    builder.returning(field::ID, ProjType::BigInt);

    let (sql, bind) = builder.build("implicit session create")?;
    let row = tx.query_one(&sql, &bind.as_refs()).await?;
    let session_id: EntityId = row.try_get("id")?;

    let (sql, bind) = build_comment_insert(&cmt, session_id, ctx.user_id, &req.body)?;
    let row = tx.query_one(&sql, &bind.as_refs()).await?;
    let comment = CommentRecord::from_row(&row)?;

    tx.commit().await?;

    state.audit.record(
        AuditEntry::new(ctx.user_id, "CREAR_COMENTARIO", "comment")
            .entity_id(comment.id.unwrap_or_default())
            .detail(serde_json::json!({
                "session_id": session_id,
                "patient_id": req.patient_id,
                "implicit_session": true,
            })),
    );

    Ok((
        StatusCode::CREATED,
        Json(LogCommentResponse {
            session_id,
            comment,
        }),
    ))
}

/// GET /sessions/:id/comments - Comments of one session, newest first
pub async fn list_session_comments(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Path(session_id): Path<EntityId>,
    Query(params): Query<ListCommentsQuery>,
) -> ApiResult<impl IntoResponse> {
    let policy = AccessPolicy::new(&ctx);
    let limit = bounds::clamp_limit(params.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);

    let client = state.db.client().await?;
    let catalog = PgCatalog::new(&client);
    let ses = Shape::discover(&catalog, &SESSION).await?;
    let cmt = Shape::discover(&catalog, &COMMENT).await?;

    require_visible_session(&client, &ses, &policy, session_id).await?;

    let (sql, bind) = SelectBuilder::new(&cmt)
        .project(field::ID, ProjType::BigInt)
        .project(field::SESSION_ID, ProjType::BigInt)
        .project(field::AUTHOR_ID, ProjType::BigInt)
        .project(field::BODY, ProjType::Text)
        .project(field::CREATED, ProjType::Timestamp)
        .project_first(
            &[field::UPDATED, field::CREATED],
            ProjType::Timestamp,
            field::UPDATED,
            None,
        )
        .filter_eq(field::SESSION_ID, session_id)
        .order_preferring(&[field::CREATED, field::ID], SortDirection::Desc)
        .limit(limit)
        .build();

    let rows = client.query(&sql, &bind.as_refs()).await?;
    let comments = rows
        .iter()
        .map(CommentRecord::from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(comments))
}

/// GET /sessions/comments - Cross-session comment feed
///
/// Joins each comment with its session, and with the patient when the
/// deployment allows that second join; patient columns degrade to NULL
/// otherwise.
pub async fn comment_feed(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Query(params): Query<ListCommentsQuery>,
) -> ApiResult<impl IntoResponse> {
    let policy = AccessPolicy::new(&ctx);
    let limit = bounds::clamp_limit(params.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
    let order = SortDirection::from_param(params.order.as_deref().unwrap_or(""));

    let client = state.db.client().await?;
    let catalog = PgCatalog::new(&client);
    let ses = Shape::discover(&catalog, &SESSION).await?;
    let cmt = Shape::discover(&catalog, &COMMENT).await?;
    let pac = match Shape::discover(&catalog, &PATIENT).await {
        Ok(shape) => Some(shape),
        Err(crate::schema::SchemaError::NotFound { .. }) => None,
        Err(e) => return Err(e.into()),
    };

    let s_id = ses.require(field::ID)?;
    let c_sid = cmt.require(field::SESSION_ID)?;

    // Patient join only when both ends of it exist.
    let patient_join = pac.as_ref().and_then(|p| {
        match (p.col(field::ID), ses.col(field::PATIENT_ID)) {
            (Some(p_id), Some(s_pid)) => Some((p, p_id, s_pid)),
            _ => None,
        }
    });

    let cproj = |f: &'static str, ty: ProjType, alias: &str| match cmt.col(f) {
        Some(col) => format!("(c.{})::{} AS {}", col, ty.sql(), alias),
        None => format!("NULL::{} AS {}", ty.sql(), alias),
    };
    let sproj = |f: &'static str, ty: ProjType, alias: &str| match ses.col(f) {
        Some(col) => format!("(s.{})::{} AS {}", col, ty.sql(), alias),
        None => format!("NULL::{} AS {}", ty.sql(), alias),
    };
    let pproj = |f: &'static str, ty: ProjType, alias: &str| match patient_join
        .as_ref()
        .and_then(|(p, _, _)| p.col(f))
    {
        Some(col) => format!("(p.{})::{} AS {}", col, ty.sql(), alias),
        None => format!("NULL::{} AS {}", ty.sql(), alias),
    };

    let select = [
        cproj(field::ID, ProjType::BigInt, "id"),
        cproj(field::BODY, ProjType::Text, "body"),
        cproj(field::CREATED, ProjType::Timestamp, "created"),
        cproj(field::AUTHOR_ID, ProjType::BigInt, "author_id"),
        cproj(field::SESSION_ID, ProjType::BigInt, "session_id"),
        sproj(field::PATIENT_ID, ProjType::BigInt, "patient_id"),
        sproj(field::CLINICIAN_ID, ProjType::BigInt, "clinician_id"),
        pproj(field::FIRST_NAME, ProjType::Text, "patient_first_name"),
        pproj(field::LAST_NAME, ProjType::Text, "patient_last_name"),
        pproj(field::SEX, ProjType::Text, "patient_sex"),
    ]
    .join(", ");

    let mut sql = format!(
        "SELECT {} FROM {} c JOIN {} s ON s.{} = c.{}",
        select, cmt.table, ses.table, s_id, c_sid
    );
    if let Some((p, p_id, s_pid)) = patient_join.as_ref() {
        sql.push_str(&format!(" LEFT JOIN {} p ON p.{} = s.{}", p.table, p_id, s_pid));
    }

    let mut bind = ParamBuffer::new();
    let mut conds: Vec<String> = Vec::new();

    if !policy.is_admin() {
        if let Some(owner) = ses.col(field::CLINICIAN_ID) {
            let ph = bind.push(ctx.user_id);
            conds.push(format!("s.{} = {}", owner, ph));
        }
    }
    if let Some(patient_id) = params.patient_id {
        if let Some(s_pid) = ses.col(field::PATIENT_ID) {
            let ph = bind.push(patient_id);
            conds.push(format!("s.{} = {}", s_pid, ph));
        }
    }
    if let Some(sex) = params.sexo.as_deref().and_then(Sex::parse) {
        if let Some(col) = patient_join.as_ref().and_then(|(p, _, _)| p.col(field::SEX)) {
            let ph = bind.push(sex.as_str());
            conds.push(format!("p.{} = {}", col, ph));
        }
    }
    if let Some(q) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let cols = feed_search_haystack(&cmt, patient_join.as_ref().map(|(p, _, _)| *p));
        if !cols.is_empty() {
            let ph = bind.push(format!("%{}%", q.to_lowercase()));
            conds.push(format!("LOWER({}) LIKE {}", cols.join(" || ' ' || "), ph));
        }
    }

    if !conds.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conds.join(" AND "));
    }

    let order_col = cmt
        .col(field::CREATED)
        .or_else(|| cmt.col(field::ID))
        .map(|c| format!("c.{}", c));
    if let Some(col) = order_col {
        sql.push_str(&format!(" ORDER BY {} {}", col, order.as_sql()));
    }
    sql.push_str(&format!(" LIMIT {}", limit));

    let rows = client.query(&sql, &bind.as_refs()).await?;
    let feed = rows
        .iter()
        .map(CommentFeedItem::from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(feed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_insert_shape() -> ApiResult<()> {
        let cmt = Shape::for_test(
            "comment",
            "comentarios_sesion",
            &[
                (field::ID, "id", "integer"),
                (field::SESSION_ID, "sesion_id", "integer"),
                (field::AUTHOR_ID, "autor_id", "integer"),
                (field::BODY, "texto", "text"),
                (field::CREATED, "fecha_crea", "timestamp without time zone"),
            ],
        );

        let (sql, bind) = build_comment_insert(&cmt, 9, 3, "  avanza bien ")?;
        assert!(sql.starts_with(
            "INSERT INTO comentarios_sesion (sesion_id, autor_id, texto, fecha_crea) \
             VALUES ($1, $2, $3, NOW())"
        ));
        // Missing updated column falls back to NOW() in RETURNING
        assert!(sql.contains("(fecha_crea)::timestamptz AS updated"));
        assert_eq!(bind.len(), 3);
        Ok(())
    }

    #[test]
    fn test_comment_insert_without_timestamps() -> ApiResult<()> {
        let cmt = Shape::for_test(
            "comment",
            "comentarios",
            &[
                (field::ID, "id", "integer"),
                (field::SESSION_ID, "sesion_id", "integer"),
                (field::BODY, "comentario", "text"),
            ],
        );

        let (sql, _) = build_comment_insert(&cmt, 9, 3, "hola")?;
        // No created column: both returning timestamps come from NOW()
        assert!(sql.contains("(NOW())::timestamptz AS created"));
        assert!(sql.contains("(NOW())::timestamptz AS updated"));
        assert!(sql.contains("NULL::bigint AS author_id"));
        Ok(())
    }

    #[test]
    fn test_feed_search_covers_comment_body_and_patient_names() {
        let cmt = Shape::for_test(
            "comment",
            "comentarios_sesion",
            &[(field::BODY, "texto", "text")],
        );
        let pac = Shape::for_test(
            "patient",
            "pacientes",
            &[
                (field::FIRST_NAME, "nombres", "text"),
                (field::LAST_NAME, "apellidos", "text"),
            ],
        );

        let cols = feed_search_haystack(&cmt, Some(&pac));
        assert_eq!(
            cols,
            vec![
                "COALESCE(c.texto, '')",
                "COALESCE(p.apellidos, '')",
                "COALESCE(p.nombres, '')",
            ]
        );

        // Without the patient join the body alone stays searchable.
        let cols = feed_search_haystack(&cmt, None);
        assert_eq!(cols, vec!["COALESCE(c.texto, '')"]);
    }
}
