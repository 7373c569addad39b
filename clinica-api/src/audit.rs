//! Audit Trail Module
//!
//! Best-effort audit log for mutating operations. Entries go to the
//! `auditoria` table on a connection of their own, off the request
//! path: a failed or missing audit table never fails the operation it
//! describes. Failures are logged and dropped.

use crate::db::Db;
use clinica_core::EntityId;
use serde_json::Value as JsonValue;

/// One audit record.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    /// Acting user
    pub user_id: EntityId,
    /// Action code, e.g. "CREAR_PACIENTE"
    pub action: &'static str,
    /// Logical entity name
    pub entity: &'static str,
    /// Affected row id, when known
    pub entity_id: Option<EntityId>,
    /// Free-form detail payload
    pub detail: JsonValue,
}

impl AuditEntry {
    pub fn new(user_id: EntityId, action: &'static str, entity: &'static str) -> Self {
        Self {
            user_id,
            action,
            entity,
            entity_id: None,
            detail: JsonValue::Null,
        }
    }

    pub fn entity_id(mut self, id: EntityId) -> Self {
        self.entity_id = Some(id);
        self
    }

    pub fn detail(mut self, detail: JsonValue) -> Self {
        self.detail = detail;
        self
    }
}

/// Fire-and-forget writer for audit entries.
#[derive(Clone)]
pub struct AuditSink {
    db: Db,
}

impl AuditSink {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Queue an entry. Returns immediately; the insert happens on a
    /// background task.
    pub fn record(&self, entry: AuditEntry) {
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(e) = write_entry(&db, &entry).await {
                tracing::warn!(
                    action = entry.action,
                    entity = entry.entity,
                    "audit write failed: {}",
                    e
                );
            }
        });
    }
}

async fn write_entry(db: &Db, entry: &AuditEntry) -> crate::error::ApiResult<()> {
    let client = db.client().await?;
    client
        .execute(
            "INSERT INTO auditoria (usuario_id, accion, entidad, entidad_id, detalle) \
             VALUES ($1, $2, $3, $4, $5::jsonb)",
            &[
                &entry.user_id,
                &entry.action,
                &entry.entity,
                &entry.entity_id,
                &entry.detail,
            ],
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_builder() {
        let entry = AuditEntry::new(3, "CREAR_PACIENTE", "patient")
            .entity_id(42)
            .detail(serde_json::json!({ "sexo": "F" }));
        assert_eq!(entry.user_id, 3);
        assert_eq!(entry.entity_id, Some(42));
        assert_eq!(entry.detail["sexo"], "F");
    }

    #[test]
    fn test_entry_defaults() {
        let entry = AuditEntry::new(1, "ELIMINAR_PACIENTE", "patient");
        assert!(entry.entity_id.is_none());
        assert!(entry.detail.is_null());
    }
}
