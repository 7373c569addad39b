//! Shared application state for Axum routers.

use crate::audit::AuditSink;
use crate::db::Db;

/// Application-wide state shared across all routes.
///
/// Cheap to clone; both members are handles over the same pool.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub audit: AuditSink,
}

impl AppState {
    pub fn new(db: Db) -> Self {
        let audit = AuditSink::new(db.clone());
        Self { db, audit }
    }
}
