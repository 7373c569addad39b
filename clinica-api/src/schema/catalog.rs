//! Catalog access: live column listings from `information_schema`.

use super::SchemaError;
use async_trait::async_trait;

/// One column of a physical table, as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Physical column name
    pub name: String,
    /// Postgres data type string, e.g. "timestamp without time zone"
    pub data_type: String,
}

impl ColumnInfo {
    /// Whether this column holds a point in time. Matches any timestamp
    /// flavor and plain `date`.
    pub fn is_date_like(&self) -> bool {
        let t = self.data_type.to_lowercase();
        t.contains("timestamp") || t == "date"
    }
}

/// Source of physical column listings.
///
/// The trait is the seam between discovery and the database: production
/// uses `PgCatalog` over a pooled client, tests use an in-memory catalog
/// with fabricated deployments.
#[async_trait]
pub trait SchemaCatalog: Send + Sync {
    /// List the columns of `table` in the public schema. An empty vec
    /// means the table does not exist.
    async fn columns_of(&self, table: &str) -> Result<Vec<ColumnInfo>, SchemaError>;
}

/// Catalog backed by `information_schema.columns`.
///
/// Borrows the request's pooled client so discovery and the data query
/// run on the same connection.
pub struct PgCatalog<'a> {
    client: &'a tokio_postgres::Client,
}

impl<'a> PgCatalog<'a> {
    pub fn new(client: &'a tokio_postgres::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SchemaCatalog for PgCatalog<'_> {
    async fn columns_of(&self, table: &str) -> Result<Vec<ColumnInfo>, SchemaError> {
        let rows = self
            .client
            .query(
                "SELECT column_name, data_type \
                   FROM information_schema.columns \
                  WHERE table_schema = 'public' AND table_name = $1",
                &[&table],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| ColumnInfo {
                name: r.get(0),
                data_type: r.get(1),
            })
            .collect())
    }
}

/// In-memory catalog describing a fabricated deployment.
///
/// Test-only: lets discovery tests pick table/column layouts without a
/// database.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: std::collections::HashMap<String, Vec<ColumnInfo>>,
}

#[cfg(test)]
impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table with `(name, data_type)` column pairs.
    pub fn with_table(mut self, table: &str, columns: &[(&str, &str)]) -> Self {
        self.tables.insert(
            table.to_string(),
            columns
                .iter()
                .map(|(n, t)| ColumnInfo {
                    name: n.to_string(),
                    data_type: t.to_string(),
                })
                .collect(),
        );
        self
    }
}

#[cfg(test)]
#[async_trait]
impl SchemaCatalog for MemoryCatalog {
    async fn columns_of(&self, table: &str) -> Result<Vec<ColumnInfo>, SchemaError> {
        Ok(self.tables.get(table).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_like_detection() {
        let ts = ColumnInfo {
            name: "fecha".into(),
            data_type: "timestamp without time zone".into(),
        };
        let tstz = ColumnInfo {
            name: "creado".into(),
            data_type: "timestamp with time zone".into(),
        };
        let date = ColumnInfo {
            name: "fecha_nacimiento".into(),
            data_type: "date".into(),
        };
        let text = ColumnInfo {
            name: "fecha".into(),
            data_type: "character varying".into(),
        };

        assert!(ts.is_date_like());
        assert!(tstz.is_date_like());
        assert!(date.is_date_like());
        assert!(!text.is_date_like());
    }

    #[tokio::test]
    async fn test_memory_catalog_missing_table_is_empty() -> Result<(), SchemaError> {
        let catalog = MemoryCatalog::new().with_table("pacientes", &[("id", "bigint")]);
        assert_eq!(catalog.columns_of("pacientes").await?.len(), 1);
        assert!(catalog.columns_of("sesiones").await?.is_empty());
        Ok(())
    }
}
