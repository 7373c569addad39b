//! Patient Record REST Routes
//!
//! CRUD over the discovered patient shape. Every handler checks out one
//! pooled client, discovers the shape on it, and runs the data query on
//! the same connection. Ownership conditions live inside the WHERE of
//! the data query, so an out-of-scope row answers exactly like a
//! missing one.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use clinica_core::{bounds, EntityId, Sex, SortDirection};

use crate::audit::AuditEntry;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::policy::AccessPolicy;
use crate::query::{InsertBuilder, ParamBuffer, ProjType, SelectBuilder, UpdateBuilder};
use crate::schema::{field, PgCatalog, Shape, PATIENT};
use crate::state::AppState;
use crate::types::{
    flag_param, CreateRecordRequest, ListRecordsQuery, OkResponse, PatientRecord,
    UpdateRecordRequest,
};
use crate::validation::{HasUpdates, ValidateNonEmpty, ValidateRange};

const MAX_LIST_LIMIT: i64 = 500;
const DEFAULT_LIST_LIMIT: i64 = 200;
const MAX_AGE: i32 = 120;

/// Canonical SELECT projection of a patient row.
fn project_patient(builder: SelectBuilder<'_>) -> SelectBuilder<'_> {
    builder
        .project(field::ID, ProjType::BigInt)
        .project(field::FIRST_NAME, ProjType::Text)
        .project(field::LAST_NAME, ProjType::Text)
        .project(field::SEX, ProjType::Text)
        .project(field::AGE, ProjType::Int)
        .project(field::BIRTH_DATE, ProjType::Date)
        .project(field::CLINICIAN_ID, ProjType::BigInt)
        .project(field::CREATED, ProjType::Timestamp)
        .project_first(
            &[field::UPDATED, field::CREATED],
            ProjType::Timestamp,
            field::UPDATED,
            None,
        )
}

/// Sex and name-search filters of `GET /records`. Soft-deleted rows
/// stay listable; the active flag only gates deletion semantics.
fn apply_list_filters<'a>(
    mut builder: SelectBuilder<'a>,
    params: &ListRecordsQuery,
) -> SelectBuilder<'a> {
    if let Some(sex) = params.sexo.as_deref().and_then(Sex::parse) {
        builder = builder.filter_eq(field::SEX, sex.as_str());
    }
    if let Some(q) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        builder = builder.text_search(q, &[field::LAST_NAME, field::FIRST_NAME]);
    }
    builder
}

/// Same projection for RETURNING clauses of writes.
fn returning_patient(returning: &mut dyn FnMut(&'static str, ProjType)) {
    returning(field::ID, ProjType::BigInt);
    returning(field::FIRST_NAME, ProjType::Text);
    returning(field::LAST_NAME, ProjType::Text);
    returning(field::SEX, ProjType::Text);
    returning(field::AGE, ProjType::Int);
    returning(field::BIRTH_DATE, ProjType::Date);
    returning(field::CLINICIAN_ID, ProjType::BigInt);
    returning(field::CREATED, ProjType::Timestamp);
}

/// GET /records - List patient records
pub async fn list_records(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Query(params): Query<ListRecordsQuery>,
) -> ApiResult<impl IntoResponse> {
    let policy = AccessPolicy::new(&ctx);
    let limit = bounds::clamp_limit(params.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
    let order = SortDirection::from_param(params.order.as_deref().unwrap_or(""));
    let scope = policy.list_scope(
        flag_param(&params.all).unwrap_or(false),
        flag_param(&params.mine),
    );

    let client = state.db.client().await?;
    let shape = Shape::discover(&PgCatalog::new(&client), &PATIENT).await?;

    let mut builder = project_patient(SelectBuilder::new(&shape));
    builder = policy.scope_select(builder, scope);
    builder = apply_list_filters(builder, &params);

    let (sql, bind) = builder
        .order_preferring(&[field::UPDATED, field::CREATED, field::ID], order)
        .limit(limit)
        .build();

    let rows = client.query(&sql, &bind.as_refs()).await?;
    let records = rows
        .iter()
        .map(PatientRecord::from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(records))
}

/// POST /records - Create a patient record
pub async fn create_record(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Json(req): Json<CreateRecordRequest>,
) -> ApiResult<impl IntoResponse> {
    let policy = AccessPolicy::new(&ctx);

    req.first_name.validate_non_empty("first_name")?;
    req.last_name.validate_non_empty("last_name")?;
    let sex = Sex::parse(&req.sex)
        .ok_or_else(|| ApiError::invalid_format("sex", "one of M, F"))?;
    if let Some(age) = req.age {
        age.validate_range("age", 0, MAX_AGE)?;
    }
    let owner = policy.assign_owner_on_create(req.clinician_id)?;

    let client = state.db.client().await?;
    let shape = Shape::discover(&PgCatalog::new(&client), &PATIENT).await?;

    let mut builder = InsertBuilder::new(&shape);
    builder.set(field::FIRST_NAME, req.first_name.trim().to_string());
    builder.set(field::LAST_NAME, req.last_name.trim().to_string());
    builder.set(field::SEX, sex.as_str());
    if let Some(age) = req.age {
        builder.set(field::AGE, age);
    }
    if let Some(birth_date) = req.birth_date {
        builder.set(field::BIRTH_DATE, birth_date);
    }
    builder.set(field::CLINICIAN_ID, owner);
    builder.set(field::ACTIVE, true);
    builder.set_expr(field::CREATED, "NOW()");
    builder.set_expr(field::UPDATED, "NOW()");

    returning_patient(&mut |f, ty| {
        builder.returning(f, ty);
    });
    builder.returning_first(
        &[field::UPDATED, field::CREATED],
        ProjType::Timestamp,
        field::UPDATED,
        Some("NOW()"),
    );

    let (sql, bind) = builder.build("patient create")?;
    let row = client.query_one(&sql, &bind.as_refs()).await?;
    let record = PatientRecord::from_row(&row)?;

    state.audit.record(
        AuditEntry::new(ctx.user_id, "CREAR_PACIENTE", "patient")
            .entity_id(record.id.unwrap_or_default())
            .detail(serde_json::json!({ "clinician_id": owner })),
    );

    Ok((StatusCode::CREATED, Json(record)))
}

/// PUT /records/:id - Update a patient record
///
/// Sex is immutable after creation. Owner reassignment is honored only
/// for administrators (an explicit null clears the assignment); a
/// clinician's `clinician_id` is ignored.
pub async fn update_record(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Path(id): Path<EntityId>,
    Json(req): Json<UpdateRecordRequest>,
) -> ApiResult<impl IntoResponse> {
    let policy = AccessPolicy::new(&ctx);
    req.validate_has_updates()?;
    if let Some(age) = req.age {
        age.validate_range("age", 0, MAX_AGE)?;
    }

    let client = state.db.client().await?;
    let shape = Shape::discover(&PgCatalog::new(&client), &PATIENT).await?;
    shape.require(field::ID)?;

    let mut builder = UpdateBuilder::new(&shape);
    if let Some(first_name) = req.first_name.as_deref() {
        first_name.validate_non_empty("first_name")?;
        builder.set(field::FIRST_NAME, first_name.trim().to_string());
    }
    if let Some(last_name) = req.last_name.as_deref() {
        last_name.validate_non_empty("last_name")?;
        builder.set(field::LAST_NAME, last_name.trim().to_string());
    }
    if let Some(age) = req.age {
        builder.set(field::AGE, age);
    }
    if let Some(birth_date) = req.birth_date {
        builder.set(field::BIRTH_DATE, birth_date);
    }
    if let Some(new_owner) = req.clinician_id {
        if policy.can_reassign_owner() {
            builder.set(field::CLINICIAN_ID, new_owner);
        }
    }

    // All requested edits fell to absent columns (or to ignored owner
    // reassignment); nothing real would change.
    if builder.set_count() == 0 {
        return Err(ApiError::invalid_input(
            "None of the provided fields are editable in this deployment",
        ));
    }

    builder.set_expr(field::UPDATED, "NOW()");
    builder.filter_eq(field::ID, id);
    policy.scope_update(&mut builder);

    returning_patient(&mut |f, ty| {
        builder.returning(f, ty);
    });
    builder.returning_first(
        &[field::UPDATED, field::CREATED],
        ProjType::Timestamp,
        field::UPDATED,
        Some("NOW()"),
    );

    let (sql, bind) = builder.build("patient update")?;
    let row = client
        .query_opt(&sql, &bind.as_refs())
        .await?
        .ok_or_else(|| ApiError::entity_not_found("Patient", id))?;
    let record = PatientRecord::from_row(&row)?;

    state.audit.record(
        AuditEntry::new(ctx.user_id, "ACTUALIZAR_PACIENTE", "patient").entity_id(id),
    );

    Ok(Json(record))
}

/// DELETE /records/:id - Retire a patient record
///
/// Soft delete (active flag cleared, row touched) when the deployment
/// has an active column; hard delete otherwise.
pub async fn delete_record(
    State(state): State<AppState>,
    AuthExtractor(ctx): AuthExtractor,
    Path(id): Path<EntityId>,
) -> ApiResult<impl IntoResponse> {
    let policy = AccessPolicy::new(&ctx);

    let client = state.db.client().await?;
    let shape = Shape::discover(&PgCatalog::new(&client), &PATIENT).await?;

    let affected = if shape.has(field::ACTIVE) {
        shape.require(field::ID)?;
        let mut builder = UpdateBuilder::new(&shape);
        builder.set(field::ACTIVE, false);
        builder.set_expr(field::UPDATED, "NOW()");
        builder.filter_eq(field::ID, id);
        policy.scope_update(&mut builder);
        let (sql, bind) = builder.build("patient delete")?;
        client.execute(&sql, &bind.as_refs()).await?
    } else {
        let id_col = shape.require(field::ID)?;
        let mut bind = ParamBuffer::new();
        let ph = bind.push(id);
        let mut sql = format!("DELETE FROM {} WHERE {} = {}", shape.table, id_col, ph);
        if !policy.is_admin() {
            if let Some(owner) = shape.col(field::CLINICIAN_ID) {
                let ph = bind.push(ctx.user_id);
                sql.push_str(&format!(" AND {} = {}", owner, ph));
            }
        }
        client.execute(&sql, &bind.as_refs()).await?
    };

    if affected == 0 {
        return Err(ApiError::entity_not_found("Patient", id));
    }

    state.audit.record(
        AuditEntry::new(ctx.user_id, "ELIMINAR_PACIENTE", "patient").entity_id(id),
    );

    Ok(Json(OkResponse::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_shape() -> Shape {
        Shape::for_test(
            "patient",
            "pacientes",
            &[
                (field::ID, "id", "integer"),
                (field::FIRST_NAME, "nombres", "text"),
                (field::LAST_NAME, "apellidos", "text"),
                (field::SEX, "sexo", "character varying"),
                (field::ACTIVE, "activo", "boolean"),
                (field::CLINICIAN_ID, "terapeuta_id", "integer"),
                (field::CREATED, "fecha_crea", "timestamp without time zone"),
                (field::UPDATED, "fecha_modifica", "timestamp without time zone"),
            ],
        )
    }

    #[test]
    fn test_projection_covers_every_canonical_field() {
        let shape = full_shape();
        let (sql, _) = project_patient(SelectBuilder::new(&shape)).build();

        for alias in [
            "AS id",
            "AS first_name",
            "AS last_name",
            "AS sex",
            "AS age",
            "AS birth_date",
            "AS clinician_id",
            "AS created",
            "AS updated",
        ] {
            assert!(sql.contains(alias), "missing {} in {}", alias, sql);
        }
        // age and birth_date have no physical column here
        assert!(sql.contains("NULL::integer AS age"));
        assert!(sql.contains("NULL::date AS birth_date"));
    }

    #[test]
    fn test_updated_projection_falls_back_to_created() {
        let shape = Shape::for_test(
            "patient",
            "pacientes",
            &[
                (field::ID, "id", "integer"),
                (field::CREATED, "fecha_crea", "timestamp without time zone"),
            ],
        );
        let (sql, _) = project_patient(SelectBuilder::new(&shape)).build();
        assert!(sql.contains("(fecha_crea)::timestamptz AS updated"));
    }

    #[test]
    fn test_list_filters_keep_inactive_rows_visible() {
        // The active flag gates deletion semantics only; retired rows
        // remain listable.
        let shape = full_shape();
        let query = ListRecordsQuery {
            sexo: Some("F".into()),
            ..Default::default()
        };
        let (sql, params) =
            apply_list_filters(project_patient(SelectBuilder::new(&shape)), &query).build();
        assert!(sql.contains("sexo = $1"));
        assert!(!sql.contains("activo"));
        assert_eq!(params.len(), 1);
    }
}
