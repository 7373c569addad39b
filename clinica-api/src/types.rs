//! Request and Response Types for the CLINICA API
//!
//! Responses carry the canonical field vocabulary regardless of the
//! physical layout underneath: every row is projected (or typed-NULL
//! padded) under canonical aliases, so `from_row` decodes by alias and
//! clients see one stable contract across deployments.
//!
//! Query parameter names keep the spellings the legacy frontend sends
//! (`sexo`, `pacienteId`), with English aliases accepted.

use crate::validation::HasUpdates;
use chrono::NaiveDate;
use clinica_core::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

// ============================================================================
// RECORDS (PATIENTS)
// ============================================================================

/// One patient record in canonical form.
#[derive(Debug, Clone, Serialize)]
pub struct PatientRecord {
    pub id: Option<EntityId>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub sex: Option<String>,
    pub age: Option<i32>,
    pub birth_date: Option<NaiveDate>,
    pub clinician_id: Option<EntityId>,
    pub created: Option<Timestamp>,
    pub updated: Option<Timestamp>,
}

impl PatientRecord {
    pub fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            sex: row.try_get("sex")?,
            age: row.try_get("age")?,
            birth_date: row.try_get("birth_date")?,
            clinician_id: row.try_get("clinician_id")?,
            created: row.try_get("created")?,
            updated: row.try_get("updated")?,
        })
    }
}

/// Listing filters for `GET /records`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRecordsQuery {
    /// Substring search over last + first name
    pub q: Option<String>,
    #[serde(alias = "sex")]
    pub sexo: Option<String>,
    pub order: Option<String>,
    pub limit: Option<i64>,
    /// "1" widens administrators to every row; outranks `mine`
    pub all: Option<String>,
    /// "1" restricts to own rows, "0" asks for everything
    pub mine: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecordRequest {
    #[serde(alias = "nombres")]
    pub first_name: String,
    #[serde(alias = "apellidos")]
    pub last_name: String,
    #[serde(alias = "sexo")]
    pub sex: String,
    #[serde(default, alias = "edad")]
    pub age: Option<i32>,
    #[serde(default, alias = "fecha_nacimiento")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, alias = "terapeuta_id")]
    pub clinician_id: Option<EntityId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRecordRequest {
    #[serde(default, alias = "nombres")]
    pub first_name: Option<String>,
    #[serde(default, alias = "apellidos")]
    pub last_name: Option<String>,
    #[serde(default, alias = "edad")]
    pub age: Option<i32>,
    #[serde(default, alias = "fecha_nacimiento")]
    pub birth_date: Option<NaiveDate>,
    /// Honored only for administrators. An absent field leaves the
    /// assignment alone; an explicit null clears it.
    #[serde(
        default,
        alias = "terapeuta_id",
        deserialize_with = "double_option"
    )]
    pub clinician_id: Option<Option<EntityId>>,
}

/// Distinguish an absent field (outer `None`) from an explicit null
/// (inner `None`) when paired with `#[serde(default)]`.
fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<EntityId>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<EntityId>::deserialize(deserializer).map(Some)
}

impl HasUpdates for UpdateRecordRequest {
    fn has_any_updates(&self) -> bool {
        self.first_name.is_some()
            || self.last_name.is_some()
            || self.age.is_some()
            || self.birth_date.is_some()
            || self.clinician_id.is_some()
    }
}

// ============================================================================
// SESSIONS
// ============================================================================

/// One session note in canonical form.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: Option<EntityId>,
    pub patient_id: Option<EntityId>,
    pub clinician_id: Option<EntityId>,
    pub occurred_at: Option<Timestamp>,
    pub title: Option<String>,
    pub note: Option<String>,
}

impl SessionRecord {
    pub fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            patient_id: row.try_get("patient_id")?,
            clinician_id: row.try_get("clinician_id")?,
            occurred_at: row.try_get("occurred_at")?,
            title: row.try_get("title")?,
            note: row.try_get("note")?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsQuery {
    #[serde(default, alias = "paciente_id")]
    pub patient_id: Option<EntityId>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(alias = "pacienteId", alias = "paciente_id")]
    pub patient_id: EntityId,
    #[serde(alias = "nota")]
    pub note: String,
    #[serde(default, alias = "titulo")]
    pub title: Option<String>,
}

// ============================================================================
// COMMENTS
// ============================================================================

/// One session comment in canonical form.
#[derive(Debug, Clone, Serialize)]
pub struct CommentRecord {
    pub id: Option<EntityId>,
    pub session_id: Option<EntityId>,
    pub author_id: Option<EntityId>,
    pub body: Option<String>,
    pub created: Option<Timestamp>,
    pub updated: Option<Timestamp>,
}

impl CommentRecord {
    pub fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            author_id: row.try_get("author_id")?,
            body: row.try_get("body")?,
            created: row.try_get("created")?,
            updated: row.try_get("updated")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(alias = "comentario")]
    pub body: String,
}

/// Body for the implicit-session comment flow.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLogCommentRequest {
    #[serde(alias = "pacienteId", alias = "paciente_id")]
    pub patient_id: EntityId,
    #[serde(alias = "comentario")]
    pub body: String,
}

/// Response of the implicit-session comment flow.
#[derive(Debug, Clone, Serialize)]
pub struct LogCommentResponse {
    pub session_id: EntityId,
    pub comment: CommentRecord,
}

/// One entry of the global comment feed: comment plus joined session
/// and patient context.
#[derive(Debug, Clone, Serialize)]
pub struct CommentFeedItem {
    pub id: Option<EntityId>,
    pub body: Option<String>,
    pub created: Option<Timestamp>,
    pub author_id: Option<EntityId>,
    pub session_id: Option<EntityId>,
    pub patient_id: Option<EntityId>,
    pub clinician_id: Option<EntityId>,
    pub patient_first_name: Option<String>,
    pub patient_last_name: Option<String>,
    pub patient_sex: Option<String>,
}

impl CommentFeedItem {
    pub fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            body: row.try_get("body")?,
            created: row.try_get("created")?,
            author_id: row.try_get("author_id")?,
            session_id: row.try_get("session_id")?,
            patient_id: row.try_get("patient_id")?,
            clinician_id: row.try_get("clinician_id")?,
            patient_first_name: row.try_get("patient_first_name")?,
            patient_last_name: row.try_get("patient_last_name")?,
            patient_sex: row.try_get("patient_sex")?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListCommentsQuery {
    #[serde(default, alias = "pacienteId", alias = "paciente_id")]
    pub patient_id: Option<EntityId>,
    #[serde(alias = "sex")]
    pub sexo: Option<String>,
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub order: Option<String>,
}

// ============================================================================
// USERS
// ============================================================================

/// One account row. The user store is the one fixed-layout table in the
/// system (it is owned by this application, not inherited).
#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: EntityId,
    pub role: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub active: Option<bool>,
    pub created: Option<Timestamp>,
    pub updated: Option<Timestamp>,
}

impl UserRecord {
    pub fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            role: row.try_get("role")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            active: row.try_get("active")?,
            created: row.try_get("created")?,
            updated: row.try_get("updated")?,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListUsersQuery {
    pub q: Option<String>,
    #[serde(alias = "role")]
    pub rol: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default, alias = "nombre")]
    pub first_name: Option<String>,
    #[serde(default, alias = "apellido")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl HasUpdates for UpdateUserRequest {
    fn has_any_updates(&self) -> bool {
        self.first_name.is_some() || self.last_name.is_some() || self.email.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetUserActiveRequest {
    #[serde(alias = "activo")]
    pub active: bool,
}

// ============================================================================
// MISC RESPONSES
// ============================================================================

/// `GET /auth/me` response.
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub id: EntityId,
    pub role: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Generic acknowledgement body.
#[derive(Debug, Clone, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn new() -> Self {
        Self { ok: true }
    }
}

impl Default for OkResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// `GET /health` response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub pool_size: usize,
    pub pool_available: usize,
}

// ============================================================================
// HELPERS
// ============================================================================

/// Parse the legacy "1"/"0" boolean query parameters.
pub fn flag_param(value: &Option<String>) -> Option<bool> {
    match value.as_deref().map(str::trim) {
        Some("1") => Some(true),
        Some("0") => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_param() {
        assert_eq!(flag_param(&Some("1".into())), Some(true));
        assert_eq!(flag_param(&Some("0".into())), Some(false));
        assert_eq!(flag_param(&Some("yes".into())), None);
        assert_eq!(flag_param(&None), None);
    }

    #[test]
    fn test_create_record_accepts_legacy_field_names() {
        let req: CreateRecordRequest = serde_json::from_value(serde_json::json!({
            "nombres": "Ana",
            "apellidos": "García",
            "sexo": "f",
            "edad": 9,
            "terapeuta_id": 4
        }))
        .unwrap();
        assert_eq!(req.first_name, "Ana");
        assert_eq!(req.age, Some(9));
        assert_eq!(req.clinician_id, Some(4));
    }

    #[test]
    fn test_update_record_has_updates() {
        let empty = UpdateRecordRequest::default();
        assert!(!empty.has_any_updates());

        let req: UpdateRecordRequest = serde_json::from_value(serde_json::json!({
            "apellidos": "López"
        }))
        .unwrap();
        assert!(req.has_any_updates());
    }

    #[test]
    fn test_update_record_owner_absent_null_and_set() {
        let absent: UpdateRecordRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(absent.clinician_id, None);

        // Explicit null counts as an edit: it releases the assignment.
        let cleared: UpdateRecordRequest =
            serde_json::from_value(serde_json::json!({ "terapeuta_id": null })).unwrap();
        assert_eq!(cleared.clinician_id, Some(None));
        assert!(cleared.has_any_updates());

        let assigned: UpdateRecordRequest =
            serde_json::from_value(serde_json::json!({ "clinician_id": 4 })).unwrap();
        assert_eq!(assigned.clinician_id, Some(Some(4)));
    }

    #[test]
    fn test_log_comment_request_aliases() {
        let req: CreateLogCommentRequest = serde_json::from_value(serde_json::json!({
            "pacienteId": 12,
            "comentario": "avanza bien"
        }))
        .unwrap();
        assert_eq!(req.patient_id, 12);
        assert_eq!(req.body, "avanza bien");
    }
}
