//! User Administration REST Routes
//!
//! Administrator-only management of the `usuarios` table. Unlike the
//! clinical entities, the user store is owned by this application and
//! has a fixed layout, so no shape discovery runs here. Credentials are
//! out of scope: there is no account creation and no password handling,
//! only profile edits, activation toggles and deletion.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use clinica_core::EntityId;

use crate::audit::AuditEntry;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::policy::AccessPolicy;
use crate::query::ParamBuffer;
use crate::state::AppState;
use crate::types::{
    ListUsersQuery, OkResponse, SetUserActiveRequest, UpdateUserRequest, UserRecord,
};
use crate::validation::{HasUpdates, ValidateNonEmpty};

const USER_PROJECTION: &str = "(id)::bigint AS id, (rol)::text AS role, \
    (nombre)::text AS first_name, (apellido)::text AS last_name, \
    (email)::text AS email, activo AS active, \
    (fecha_crea)::timestamptz AS created, (fecha_modifica)::timestamptz AS updated";

/// GET /users - List accounts
pub async fn list_users(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Query(params): Query<ListUsersQuery>,
) -> ApiResult<impl IntoResponse> {
    AccessPolicy::new(&ctx).require_admin()?;

    let client = state.db.client().await?;
    let mut bind = ParamBuffer::new();
    let mut conds: Vec<String> = Vec::new();

    if let Some(rol) = params.rol.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        let ph = bind.push(rol.to_uppercase());
        conds.push(format!("UPPER(rol) = {}", ph));
    }
    if let Some(q) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let ph = bind.push(format!("%{}%", q.to_lowercase()));
        conds.push(format!(
            "LOWER(COALESCE(nombre, '') || ' ' || COALESCE(apellido, '') \
             || ' ' || COALESCE(email, '')) LIKE {}",
            ph
        ));
    }

    let mut sql = format!("SELECT {} FROM usuarios", USER_PROJECTION);
    if !conds.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conds.join(" AND "));
    }
    sql.push_str(" ORDER BY id");

    let rows = client.query(&sql, &bind.as_refs()).await?;
    let users = rows
        .iter()
        .map(UserRecord::from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(users))
}

/// GET /users/:id - Fetch one account
pub async fn get_user(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    AccessPolicy::new(&ctx).require_admin()?;

    let client = state.db.client().await?;
    let sql = format!("SELECT {} FROM usuarios WHERE id = $1", USER_PROJECTION);
    let row = client
        .query_opt(&sql, &[&id])
        .await?
        .ok_or_else(|| ApiError::entity_not_found("User", id))?;

    Ok(Json(UserRecord::from_row(&row)?))
}

/// PUT /users/:id - Edit an account profile
///
/// The role is immutable here. Email uniqueness is checked explicitly
/// (case-insensitive) so the caller gets a conflict instead of a
/// constraint error.
pub async fn update_user(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Path(id): Path<EntityId>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    AccessPolicy::new(&ctx).require_admin()?;
    req.validate_has_updates()?;

    let client = state.db.client().await?;

    let mut bind = ParamBuffer::new();
    let mut sets: Vec<String> = Vec::new();

    if let Some(first_name) = req.first_name.as_deref() {
        first_name.validate_non_empty("first_name")?;
        let ph = bind.push(first_name.trim().to_string());
        sets.push(format!("nombre = {}", ph));
    }
    if let Some(last_name) = req.last_name.as_deref() {
        last_name.validate_non_empty("last_name")?;
        let ph = bind.push(last_name.trim().to_string());
        sets.push(format!("apellido = {}", ph));
    }
    if let Some(email) = req.email.as_deref() {
        email.validate_non_empty("email")?;
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(ApiError::invalid_format("email", "an email address"));
        }
        let taken = client
            .query_opt(
                "SELECT 1 FROM usuarios WHERE LOWER(email) = LOWER($1) AND id <> $2",
                &[&email, &id],
            )
            .await?;
        if taken.is_some() {
            return Err(ApiError::conflict("Email already in use"));
        }
        let ph = bind.push(email);
        sets.push(format!("email = {}", ph));
    }

    sets.push("fecha_modifica = NOW()".to_string());
    let ph = bind.push(id);
    let sql = format!(
        "UPDATE usuarios SET {} WHERE id = {} RETURNING {}",
        sets.join(", "),
        ph,
        USER_PROJECTION
    );

    let row = client
        .query_opt(&sql, &bind.as_refs())
        .await?
        .ok_or_else(|| ApiError::entity_not_found("User", id))?;
    let user = UserRecord::from_row(&row)?;

    state
        .audit
        .record(AuditEntry::new(ctx.user_id, "ACTUALIZAR_USUARIO", "user").entity_id(id));

    Ok(Json(user))
}

/// POST /users/:id/active - Toggle account activation
pub async fn set_user_active(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Path(id): Path<EntityId>,
    Json(req): Json<SetUserActiveRequest>,
) -> ApiResult<impl IntoResponse> {
    AccessPolicy::new(&ctx).require_admin()?;

    let client = state.db.client().await?;
    let sql = format!(
        "UPDATE usuarios SET activo = $2, fecha_modifica = NOW() \
         WHERE id = $1 RETURNING {}",
        USER_PROJECTION
    );
    let row = client
        .query_opt(&sql, &[&id, &req.active])
        .await?
        .ok_or_else(|| ApiError::entity_not_found("User", id))?;
    let user = UserRecord::from_row(&row)?;

    state.audit.record(
        AuditEntry::new(ctx.user_id, "CAMBIAR_ESTADO_USUARIO", "user")
            .entity_id(id)
            .detail(serde_json::json!({ "active": req.active })),
    );

    Ok(Json(user))
}

/// DELETE /users/:id - Remove an account
///
/// Administrators cannot delete their own account.
pub async fn delete_user(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    AccessPolicy::new(&ctx).require_admin()?;

    if id == ctx.user_id {
        return Err(ApiError::invalid_input("You cannot delete your own account"));
    }

    let client = state.db.client().await?;
    let affected = client
        .execute("DELETE FROM usuarios WHERE id = $1", &[&id])
        .await?;
    if affected == 0 {
        return Err(ApiError::entity_not_found("User", id));
    }

    state
        .audit
        .record(AuditEntry::new(ctx.user_id, "ELIMINAR_USUARIO", "user").entity_id(id));

    Ok(Json(OkResponse::new()))
}
