//! Schema Discovery Module
//!
//! Deployments of the clinic system named their tables and columns
//! differently (legacy imports, partial migrations), so the physical
//! layout is discovered per request from `information_schema.columns`
//! instead of being assumed. The flow is:
//!
//! 1. `catalog`: list the live columns of a candidate table
//! 2. `shape`: resolve canonical fields against those columns through
//!    prioritized synonym lists, producing a `Shape`
//!
//! Every identifier that reaches SQL text comes out of a `Shape`, which
//! only ever contains catalog-verified names. Values always travel as
//! bind parameters. Nothing here is cached: each request re-discovers,
//! so a migration mid-flight is picked up by the next request.

pub mod catalog;
pub mod shape;

pub use catalog::{ColumnInfo, PgCatalog, SchemaCatalog};
pub use shape::{field, Shape, ShapeProfile, COMMENT, PATIENT, RUN, SESSION};

use crate::error::ApiError;
use thiserror::Error;

/// Errors from schema discovery and field resolution.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// None of the candidate tables exist in the public schema.
    #[error("no physical table found for {entity}")]
    NotFound { entity: &'static str },

    /// The table exists but a field required by the operation has no
    /// physical column.
    #[error("{entity} has no column for required field {field}")]
    MissingColumn {
        entity: &'static str,
        field: &'static str,
    },

    /// An insert or update resolved zero of its fields to real columns.
    #[error("no field of {operation} maps to a physical column")]
    NoMappableColumns { operation: &'static str },

    /// An update ended up with no WHERE condition. Writes are always
    /// row-targeted; a mutation must never widen when a filter column
    /// is missing.
    #[error("refusing {operation} without a row condition")]
    UnscopedWrite { operation: &'static str },

    /// The catalog query itself failed.
    #[error("catalog query failed")]
    Storage(#[from] tokio_postgres::Error),
}

impl From<SchemaError> for ApiError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::NotFound { entity } => ApiError::schema_not_found(entity),
            SchemaError::MissingColumn { entity, field } => {
                tracing::error!("missing physical column: entity={} field={}", entity, field);
                ApiError::new(
                    crate::error::ErrorCode::NoMappableColumns,
                    format!("{} storage has no column for {}", entity, field),
                )
            }
            SchemaError::NoMappableColumns { operation } => {
                ApiError::no_mappable_columns(operation)
            }
            SchemaError::UnscopedWrite { operation } => {
                tracing::error!("write without row condition: operation={}", operation);
                ApiError::internal_error(format!(
                    "{} could not be scoped to a target row",
                    operation
                ))
            }
            SchemaError::Storage(e) => e.into(),
        }
    }
}
