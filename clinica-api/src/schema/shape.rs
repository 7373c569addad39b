//! Shapes: canonical fields resolved to physical columns.
//!
//! A `ShapeProfile` is the static knowledge about one entity family:
//! which table names deployments were observed to use, and for each
//! canonical field, the physical spellings in priority order. Discovery
//! probes the candidate tables in order, takes the first that exists,
//! and resolves each field to the first synonym present.
//!
//! The resulting `Shape` is the only source of identifiers for SQL
//! construction. Synonym lists are ordered: when a legacy table carries
//! both `fecha_ingreso` and `created_at`, the earlier spelling wins,
//! deterministically.

use super::catalog::{ColumnInfo, SchemaCatalog};
use super::SchemaError;
use std::collections::HashMap;

// ============================================================================
// CANONICAL FIELD NAMES
// ============================================================================

/// Canonical field names shared by profiles, query builders and DTOs.
pub mod field {
    // Common
    pub const ID: &str = "id";
    pub const CREATED: &str = "created";
    pub const UPDATED: &str = "updated";

    // Patient
    pub const FIRST_NAME: &str = "first_name";
    pub const LAST_NAME: &str = "last_name";
    pub const BIRTH_DATE: &str = "birth_date";
    pub const SEX: &str = "sex";
    pub const AGE: &str = "age";
    pub const ACTIVE: &str = "active";
    pub const CLINICIAN_ID: &str = "clinician_id";

    // Session
    pub const PATIENT_ID: &str = "patient_id";
    pub const OCCURRED_AT: &str = "occurred_at";
    pub const NOTE: &str = "note";
    pub const TITLE: &str = "title";
    pub const ENDED_AT: &str = "ended_at";
    pub const STATUS: &str = "status";

    // Run
    pub const SESSION_ID: &str = "session_id";
    pub const KIND: &str = "kind";
    pub const STARTED_AT: &str = "started_at";

    // Comment
    pub const AUTHOR_ID: &str = "author_id";
    pub const BODY: &str = "body";
}

// ============================================================================
// PROFILES
// ============================================================================

/// Synonym list for one canonical field, highest priority first.
#[derive(Debug, Clone, Copy)]
pub struct FieldSynonyms {
    pub field: &'static str,
    pub synonyms: &'static [&'static str],
}

/// Static discovery knowledge for one entity family.
#[derive(Debug, Clone, Copy)]
pub struct ShapeProfile {
    /// Logical entity name, used in errors and audit entries.
    pub entity: &'static str,
    /// Physical table candidates, probed in order.
    pub tables: &'static [&'static str],
    /// Canonical fields and their physical spellings.
    pub fields: &'static [FieldSynonyms],
}

macro_rules! syn {
    ($field:expr => [$($s:expr),+ $(,)?]) => {
        FieldSynonyms { field: $field, synonyms: &[$($s),+] }
    };
}

/// Patient records. Table and column spellings observed across
/// deployments, legacy imports included.
pub static PATIENT: ShapeProfile = ShapeProfile {
    entity: "patient",
    tables: &["pacientes", "cliente_paciente", "tbl_pacientes"],
    fields: &[
        syn!(field::ID => ["id", "paciente_id", "id_paciente"]),
        syn!(field::FIRST_NAME => ["nombres", "nombre", "primer_nombre"]),
        syn!(field::LAST_NAME => [
            "apellidos", "apellido", "apellido_paterno", "apellido_materno", "segundo_nombre"
        ]),
        syn!(field::BIRTH_DATE => ["fecha_nacimiento", "fecha", "fnac", "fec_nac"]),
        syn!(field::SEX => ["sexo", "sexo_enum", "genero"]),
        syn!(field::AGE => ["edad", "age", "anios", "años", "anos"]),
        syn!(field::ACTIVE => ["activo", "estado", "is_active"]),
        syn!(field::CLINICIAN_ID => [
            "terapeuta_id", "usuario_id", "id_terapeuta", "id_usuario", "creado_por",
            "registrado_por"
        ]),
        syn!(field::CREATED => [
            "fecha_ingreso", "creado", "created_at", "fecha_alta", "fecha_creacion"
        ]),
        syn!(field::UPDATED => [
            "fecha_modifica", "actualizado", "updated_at", "fecha_actualizacion", "modificado",
            "modificado_en"
        ]),
    ],
};

/// Session notes. The same family covers the session log and the older
/// free-form note tables.
pub static SESSION: ShapeProfile = ShapeProfile {
    entity: "session",
    tables: &["sesiones", "bitacora", "notas_terapia", "notas", "sesion"],
    fields: &[
        syn!(field::ID => ["id", "sesion_id", "id_sesion", "nota_id", "id_nota"]),
        syn!(field::PATIENT_ID => ["paciente_id", "id_paciente", "cliente_paciente_id"]),
        syn!(field::CLINICIAN_ID => ["terapeuta_id", "id_terapeuta", "usuario_id", "id_usuario"]),
        syn!(field::OCCURRED_AT => [
            "fecha", "fecha_inicio", "created_at", "creado", "ts", "timestamp"
        ]),
        syn!(field::NOTE => [
            "nota", "observacion", "observaciones", "detalle", "descripcion", "texto"
        ]),
        syn!(field::TITLE => ["titulo", "asunto", "subject"]),
        syn!(field::ENDED_AT => ["fecha_fin", "fin", "ended_at", "ts_fin"]),
        syn!(field::STATUS => ["estado", "estatus", "status"]),
    ],
};

/// Module runs (device usage events).
pub static RUN: ShapeProfile = ShapeProfile {
    entity: "run",
    tables: &["runs_modulo", "runs", "actividades", "modulo_usos", "ejecuciones"],
    fields: &[
        syn!(field::ID => ["id", "run_id", "id_run", "actividad_id"]),
        syn!(field::SESSION_ID => ["sesion_id", "id_sesion", "nota_id"]),
        syn!(field::PATIENT_ID => ["paciente_id", "id_paciente"]),
        syn!(field::CLINICIAN_ID => ["terapeuta_id", "id_terapeuta", "usuario_id"]),
        syn!(field::KIND => ["tipo", "modulo", "modulo_tipo", "nombre_modulo"]),
        syn!(field::STARTED_AT => ["inicio", "started_at", "fecha_inicio", "ts_inicio"]),
        syn!(field::ENDED_AT => ["fin", "ended_at", "fecha_fin", "ts_fin"]),
    ],
};

/// Session comments.
pub static COMMENT: ShapeProfile = ShapeProfile {
    entity: "comment",
    tables: &[
        "comentarios_sesion",
        "comentarios",
        "comentario_sesion",
        "bitacora_comentarios",
    ],
    fields: &[
        syn!(field::ID => ["id", "comentario_id", "id_comentario"]),
        syn!(field::SESSION_ID => ["sesion_id", "id_sesion", "nota_id", "id_nota"]),
        syn!(field::AUTHOR_ID => ["autor_id", "usuario_id", "id_usuario"]),
        syn!(field::BODY => ["texto", "comentario", "detalle"]),
        syn!(field::CREATED => ["fecha_crea", "timestamp", "created_at", "creado"]),
        syn!(field::UPDATED => ["fecha_modifica", "updated_at", "actualizado"]),
    ],
};

// ============================================================================
// SHAPE
// ============================================================================

/// Resolved physical layout for one entity family.
///
/// Holds only names that came back from the catalog; every identifier
/// in generated SQL passes through here.
#[derive(Debug, Clone)]
pub struct Shape {
    pub entity: &'static str,
    pub table: String,
    columns: HashMap<&'static str, ColumnInfo>,
}

impl Shape {
    /// Probe the profile's candidate tables and resolve its fields.
    ///
    /// Deterministic for a given catalog state: first existing table
    /// wins, first present synonym per field wins.
    pub async fn discover(
        catalog: &dyn SchemaCatalog,
        profile: &ShapeProfile,
    ) -> Result<Self, SchemaError> {
        for table in profile.tables {
            let cols = catalog.columns_of(table).await?;
            if cols.is_empty() {
                continue;
            }

            let by_name: HashMap<&str, &ColumnInfo> =
                cols.iter().map(|c| (c.name.as_str(), c)).collect();

            let mut columns = HashMap::new();
            for fs in profile.fields {
                if let Some(info) = fs.synonyms.iter().find_map(|s| by_name.get(s)) {
                    columns.insert(fs.field, (*info).clone());
                }
            }

            return Ok(Shape {
                entity: profile.entity,
                table: table.to_string(),
                columns,
            });
        }

        Err(SchemaError::NotFound {
            entity: profile.entity,
        })
    }

    /// Physical column for a canonical field, if the deployment has one.
    pub fn col(&self, field: &'static str) -> Option<&str> {
        self.columns.get(field).map(|c| c.name.as_str())
    }

    /// Column info for a canonical field.
    pub fn info(&self, field: &'static str) -> Option<&ColumnInfo> {
        self.columns.get(field)
    }

    pub fn has(&self, field: &'static str) -> bool {
        self.columns.contains_key(field)
    }

    /// Physical column for a field the operation cannot work without.
    pub fn require(&self, field: &'static str) -> Result<&str, SchemaError> {
        self.col(field).ok_or(SchemaError::MissingColumn {
            entity: self.entity,
            field,
        })
    }

    /// Whether the field resolved to a timestamp or date column.
    pub fn is_date_like(&self, field: &'static str) -> bool {
        self.info(field).map(|c| c.is_date_like()).unwrap_or(false)
    }

    /// Test constructor bypassing discovery.
    #[cfg(test)]
    pub fn for_test(
        entity: &'static str,
        table: &str,
        columns: &[(&'static str, &str, &str)],
    ) -> Self {
        Self {
            entity,
            table: table.to_string(),
            columns: columns
                .iter()
                .map(|(f, n, t)| {
                    (
                        *f,
                        ColumnInfo {
                            name: n.to_string(),
                            data_type: t.to_string(),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::catalog::MemoryCatalog;

    fn modern_patient_catalog() -> MemoryCatalog {
        MemoryCatalog::new().with_table(
            "pacientes",
            &[
                ("id", "bigint"),
                ("nombres", "text"),
                ("apellidos", "text"),
                ("fecha_nacimiento", "date"),
                ("sexo", "character varying"),
                ("activo", "boolean"),
                ("terapeuta_id", "bigint"),
                ("fecha_ingreso", "timestamp without time zone"),
                ("fecha_modifica", "timestamp without time zone"),
            ],
        )
    }

    #[tokio::test]
    async fn test_discover_resolves_fields() -> Result<(), SchemaError> {
        let catalog = modern_patient_catalog();
        let shape = Shape::discover(&catalog, &PATIENT).await?;

        assert_eq!(shape.table, "pacientes");
        assert_eq!(shape.col(field::FIRST_NAME), Some("nombres"));
        assert_eq!(shape.col(field::CREATED), Some("fecha_ingreso"));
        assert!(shape.col(field::AGE).is_none());
        assert!(shape.is_date_like(field::BIRTH_DATE));
        assert!(!shape.is_date_like(field::SEX));
        Ok(())
    }

    #[tokio::test]
    async fn test_discover_table_priority() -> Result<(), SchemaError> {
        // Both candidates exist; the earlier one wins.
        let catalog = MemoryCatalog::new()
            .with_table("pacientes", &[("id", "integer")])
            .with_table("cliente_paciente", &[("paciente_id", "integer")]);
        let shape = Shape::discover(&catalog, &PATIENT).await?;
        assert_eq!(shape.table, "pacientes");

        // Only the legacy one exists.
        let catalog = MemoryCatalog::new()
            .with_table("cliente_paciente", &[("paciente_id", "integer"), ("nombre", "text")]);
        let shape = Shape::discover(&catalog, &PATIENT).await?;
        assert_eq!(shape.table, "cliente_paciente");
        assert_eq!(shape.col(field::ID), Some("paciente_id"));
        assert_eq!(shape.col(field::FIRST_NAME), Some("nombre"));
        Ok(())
    }

    #[tokio::test]
    async fn test_discover_synonym_priority() -> Result<(), SchemaError> {
        // Both spellings present: the earlier synonym wins.
        let catalog = MemoryCatalog::new().with_table(
            "pacientes",
            &[
                ("id", "bigint"),
                ("created_at", "timestamp with time zone"),
                ("fecha_ingreso", "timestamp without time zone"),
            ],
        );
        let shape = Shape::discover(&catalog, &PATIENT).await?;
        assert_eq!(shape.col(field::CREATED), Some("fecha_ingreso"));
        Ok(())
    }

    #[tokio::test]
    async fn test_discover_is_deterministic() -> Result<(), SchemaError> {
        let catalog = modern_patient_catalog();
        let a = Shape::discover(&catalog, &PATIENT).await?;
        let b = Shape::discover(&catalog, &PATIENT).await?;
        assert_eq!(a.table, b.table);
        for fs in PATIENT.fields {
            assert_eq!(a.col(fs.field), b.col(fs.field), "field: {}", fs.field);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_discover_no_table() {
        let catalog = MemoryCatalog::new().with_table("unrelated", &[("id", "bigint")]);
        let err = Shape::discover(&catalog, &PATIENT).await.unwrap_err();
        assert!(matches!(err, SchemaError::NotFound { entity: "patient" }));
    }

    #[tokio::test]
    async fn test_require_missing_field() -> Result<(), SchemaError> {
        let catalog = MemoryCatalog::new().with_table("sesiones", &[("id", "bigint")]);
        let shape = Shape::discover(&catalog, &SESSION).await?;
        let err = shape.require(field::PATIENT_ID).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingColumn {
                entity: "session",
                field: field::PATIENT_ID
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_run_profile_resolves_production_layout() -> Result<(), SchemaError> {
        let catalog = MemoryCatalog::new().with_table(
            "runs_modulo",
            &[
                ("id", "bigint"),
                ("sesion_id", "bigint"),
                ("modulo", "character varying"),
                ("inicio", "timestamp with time zone"),
                ("fin", "timestamp with time zone"),
            ],
        );
        let shape = Shape::discover(&catalog, &RUN).await?;
        assert_eq!(shape.table, "runs_modulo");
        assert_eq!(shape.col(field::KIND), Some("modulo"));
        assert_eq!(shape.col(field::SESSION_ID), Some("sesion_id"));
        assert!(shape.is_date_like(field::STARTED_AT));
        Ok(())
    }

    #[tokio::test]
    async fn test_comment_profile_resolves_production_layout() -> Result<(), SchemaError> {
        let catalog = MemoryCatalog::new().with_table(
            "comentarios_sesion",
            &[
                ("id", "bigint"),
                ("sesion_id", "bigint"),
                ("autor_id", "bigint"),
                ("texto", "text"),
                ("timestamp", "timestamp with time zone"),
                ("fecha_crea", "timestamp with time zone"),
                ("fecha_modifica", "timestamp with time zone"),
            ],
        );
        let shape = Shape::discover(&catalog, &COMMENT).await?;
        assert_eq!(shape.col(field::BODY), Some("texto"));
        // fecha_crea outranks the bare timestamp column
        assert_eq!(shape.col(field::CREATED), Some("fecha_crea"));
        Ok(())
    }
}
