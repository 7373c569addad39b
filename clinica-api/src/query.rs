//! SQL Construction Module
//!
//! Builders that turn a discovered `Shape` plus request values into SQL
//! text and a bind parameter buffer. The safety rule is structural:
//! identifiers come only from the `Shape` (catalog-verified), values go
//! only into `ParamBuffer` as positional binds. No request string is
//! ever interpolated into SQL text.
//!
//! Projections carry an explicit SQL type cast. Deployments disagree on
//! physical types (int4 vs int8 ids, timestamp vs timestamptz), and the
//! cast gives row decoding one stable type per canonical field. Fields
//! without a physical column project as a typed NULL under the same
//! alias, so response rows always have the full canonical set.

use crate::schema::{Shape, SchemaError};
use clinica_core::SortDirection;
use tokio_postgres::types::ToSql;

// ============================================================================
// PARAMETERS
// ============================================================================

/// Positional bind parameter buffer.
///
/// `push` stores the value and returns its `$n` placeholder for
/// inclusion in SQL text.
#[derive(Default)]
pub struct ParamBuffer {
    params: Vec<Box<dyn ToSql + Sync + Send>>,
}

impl ParamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning its placeholder ("$1", "$2", ...).
    pub fn push<T: ToSql + Sync + Send + 'static>(&mut self, value: T) -> String {
        self.params.push(Box::new(value));
        format!("${}", self.params.len())
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Borrow the parameters in the form `tokio_postgres` queries take.
    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }
}

impl std::fmt::Debug for ParamBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ParamBuffer({} params)", self.params.len())
    }
}

// ============================================================================
// PROJECTION TYPES
// ============================================================================

/// Canonical SQL type a projected field is cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjType {
    BigInt,
    Int,
    Text,
    Bool,
    Date,
    Timestamp,
}

impl ProjType {
    pub fn sql(self) -> &'static str {
        match self {
            ProjType::BigInt => "bigint",
            ProjType::Int => "integer",
            ProjType::Text => "text",
            ProjType::Bool => "boolean",
            ProjType::Date => "date",
            ProjType::Timestamp => "timestamptz",
        }
    }
}

/// Shared projection logic for SELECT and RETURNING clauses.
fn first_projection(
    shape: &Shape,
    preferred: &[&'static str],
    ty: ProjType,
    alias: &'static str,
    fallback: Option<&'static str>,
) -> String {
    match preferred.iter().find_map(|f| shape.col(f)) {
        Some(col) => format!("({})::{} AS {}", col, ty.sql(), alias),
        None => match fallback {
            Some(expr) => format!("({})::{} AS {}", expr, ty.sql(), alias),
            None => format!("NULL::{} AS {}", ty.sql(), alias),
        },
    }
}

// ============================================================================
// SELECT BUILDER
// ============================================================================

/// Builder for SELECT statements over one discovered shape.
pub struct SelectBuilder<'a> {
    shape: &'a Shape,
    select: Vec<String>,
    conds: Vec<String>,
    order: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    params: ParamBuffer,
}

impl<'a> SelectBuilder<'a> {
    pub fn new(shape: &'a Shape) -> Self {
        Self {
            shape,
            select: Vec::new(),
            conds: Vec::new(),
            order: None,
            limit: None,
            offset: None,
            params: ParamBuffer::new(),
        }
    }

    /// Project a canonical field under its canonical alias. Absent
    /// fields project as a typed NULL so the row stays decodable.
    pub fn project(mut self, field: &'static str, ty: ProjType) -> Self {
        self.select
            .push(first_projection(self.shape, &[field], ty, field, None));
        self
    }

    /// Project the first present field of `preferred` under `alias`.
    /// When none resolve, `fallback` (a trusted expression such as
    /// `NOW()`) is projected instead, or a typed NULL without one.
    pub fn project_first(
        mut self,
        preferred: &[&'static str],
        ty: ProjType,
        alias: &'static str,
        fallback: Option<&'static str>,
    ) -> Self {
        self.select.push(first_projection(
            self.shape, preferred, ty, alias, fallback,
        ));
        self
    }

    /// Project a raw expression. Identifier inputs must already be
    /// shape-resolved by the caller.
    pub fn project_expr(mut self, expr: String) -> Self {
        self.select.push(expr);
        self
    }

    /// Equality filter on a canonical field. Skipped when the
    /// deployment has no such column, matching the permissive read
    /// behavior of the legacy system.
    pub fn filter_eq<T: ToSql + Sync + Send + 'static>(
        mut self,
        field: &'static str,
        value: T,
    ) -> Self {
        if let Some(col) = self.shape.col(field) {
            let ph = self.params.push(value);
            self.conds.push(format!("{} = {}", col, ph));
        }
        self
    }

    /// Raw condition with values already pushed through `params_mut`.
    pub fn filter_expr(mut self, cond: String) -> Self {
        self.conds.push(cond);
        self
    }

    /// Case-insensitive substring search across the given fields,
    /// space-joined with NULL-safe coalescing. No-op when none of the
    /// fields exist.
    pub fn text_search(mut self, query: &str, fields: &[&'static str]) -> Self {
        let cols: Vec<&str> = fields.iter().filter_map(|f| self.shape.col(f)).collect();
        if cols.is_empty() {
            return self;
        }
        let haystack = cols
            .iter()
            .map(|c| format!("COALESCE({}, '')", c))
            .collect::<Vec<_>>()
            .join(" || ' ' || ");
        let ph = self.params.push(format!("%{}%", query.trim().to_lowercase()));
        self.conds.push(format!("LOWER({}) LIKE {}", haystack, ph));
        self
    }

    /// Order by the first of `preferred` that exists; silently ordered
    /// by nothing when none do.
    pub fn order_preferring(mut self, preferred: &[&'static str], dir: SortDirection) -> Self {
        if let Some(col) = preferred.iter().find_map(|f| self.shape.col(f)) {
            self.order = Some(format!("{} {}", col, dir.as_sql()));
        }
        self
    }

    /// Order by a raw expression (shape-resolved by the caller).
    pub fn order_expr(mut self, expr: String) -> Self {
        self.order = Some(expr);
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Access the parameter buffer for raw filter/projection values.
    pub fn params_mut(&mut self) -> &mut ParamBuffer {
        &mut self.params
    }

    pub fn build(self) -> (String, ParamBuffer) {
        let mut sql = format!(
            "SELECT {} FROM {}",
            if self.select.is_empty() {
                "*".to_string()
            } else {
                self.select.join(", ")
            },
            self.shape.table
        );
        if !self.conds.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conds.join(" AND "));
        }
        if let Some(order) = &self.order {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        (sql, self.params)
    }
}

// ============================================================================
// INSERT BUILDER
// ============================================================================

/// Builder for INSERT statements.
///
/// Fields whose canonical name does not resolve to a physical column
/// are dropped; if every field drops, the insert is refused rather than
/// sent as `INSERT ... DEFAULT VALUES` into an unknown table.
pub struct InsertBuilder<'a> {
    shape: &'a Shape,
    columns: Vec<String>,
    values: Vec<String>,
    returning: Vec<String>,
    params: ParamBuffer,
}

impl<'a> InsertBuilder<'a> {
    pub fn new(shape: &'a Shape) -> Self {
        Self {
            shape,
            columns: Vec::new(),
            values: Vec::new(),
            returning: Vec::new(),
            params: ParamBuffer::new(),
        }
    }

    /// Bind a value for a canonical field. Dropped when the column is
    /// absent; returns whether it mapped.
    pub fn set<T: ToSql + Sync + Send + 'static>(&mut self, field: &'static str, value: T) -> bool {
        match self.shape.col(field) {
            Some(col) => {
                let col = col.to_string();
                let ph = self.params.push(value);
                self.columns.push(col);
                self.values.push(ph);
                true
            }
            None => false,
        }
    }

    /// Assign a trusted SQL expression (e.g. `NOW()`) to a field.
    /// Dropped when the column is absent.
    pub fn set_expr(&mut self, field: &'static str, expr: &str) -> bool {
        match self.shape.col(field) {
            Some(col) => {
                self.columns.push(col.to_string());
                self.values.push(expr.to_string());
                true
            }
            None => false,
        }
    }

    /// Add a RETURNING projection (canonical alias, typed cast).
    pub fn returning(&mut self, field: &'static str, ty: ProjType) -> &mut Self {
        self.returning
            .push(first_projection(self.shape, &[field], ty, field, None));
        self
    }

    /// RETURNING projection over the first present field, with an
    /// optional trusted fallback expression.
    pub fn returning_first(
        &mut self,
        preferred: &[&'static str],
        ty: ProjType,
        alias: &'static str,
        fallback: Option<&'static str>,
    ) -> &mut Self {
        self.returning
            .push(first_projection(self.shape, preferred, ty, alias, fallback));
        self
    }

    pub fn build(self, operation: &'static str) -> Result<(String, ParamBuffer), SchemaError> {
        if self.columns.is_empty() {
            return Err(SchemaError::NoMappableColumns { operation });
        }
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.shape.table,
            self.columns.join(", "),
            self.values.join(", ")
        );
        if !self.returning.is_empty() {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.returning.join(", "));
        }
        Ok((sql, self.params))
    }
}

// ============================================================================
// UPDATE BUILDER
// ============================================================================

/// Builder for UPDATE statements.
///
/// The WHERE clause always includes the id; ownership conditions are
/// added by the caller so an out-of-scope row and a missing row are the
/// same zero-row result. A statement whose every condition fell to
/// absent columns is refused at build time.
pub struct UpdateBuilder<'a> {
    shape: &'a Shape,
    sets: Vec<String>,
    conds: Vec<String>,
    returning: Vec<String>,
    params: ParamBuffer,
}

impl<'a> UpdateBuilder<'a> {
    pub fn new(shape: &'a Shape) -> Self {
        Self {
            shape,
            sets: Vec::new(),
            conds: Vec::new(),
            returning: Vec::new(),
            params: ParamBuffer::new(),
        }
    }

    /// Bind a new value for a canonical field. Dropped when the column
    /// is absent; returns whether it mapped.
    pub fn set<T: ToSql + Sync + Send + 'static>(&mut self, field: &'static str, value: T) -> bool {
        match self.shape.col(field) {
            Some(col) => {
                let col = col.to_string();
                let ph = self.params.push(value);
                self.sets.push(format!("{} = {}", col, ph));
                true
            }
            None => false,
        }
    }

    /// Assign a trusted SQL expression (e.g. `NOW()`) to a field.
    pub fn set_expr(&mut self, field: &'static str, expr: &str) -> bool {
        match self.shape.col(field) {
            Some(col) => {
                self.sets.push(format!("{} = {}", col, expr));
                true
            }
            None => false,
        }
    }

    /// Equality condition on a canonical field. Unlike value sets, a
    /// condition on an absent column is skipped.
    pub fn filter_eq<T: ToSql + Sync + Send + 'static>(
        &mut self,
        field: &'static str,
        value: T,
    ) -> bool {
        match self.shape.col(field) {
            Some(col) => {
                let col = col.to_string();
                let ph = self.params.push(value);
                self.conds.push(format!("{} = {}", col, ph));
                true
            }
            None => false,
        }
    }

    /// Add a RETURNING projection (canonical alias, typed cast).
    pub fn returning(&mut self, field: &'static str, ty: ProjType) -> &mut Self {
        self.returning
            .push(first_projection(self.shape, &[field], ty, field, None));
        self
    }

    /// RETURNING projection over the first present field, with an
    /// optional trusted fallback expression.
    pub fn returning_first(
        &mut self,
        preferred: &[&'static str],
        ty: ProjType,
        alias: &'static str,
        fallback: Option<&'static str>,
    ) -> &mut Self {
        self.returning
            .push(first_projection(self.shape, preferred, ty, alias, fallback));
        self
    }

    /// Number of SET clauses accumulated so far.
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    pub fn build(self, operation: &'static str) -> Result<(String, ParamBuffer), SchemaError> {
        if self.sets.is_empty() {
            return Err(SchemaError::NoMappableColumns { operation });
        }
        // Skipped filters must narrow the statement to nothing, never
        // widen it to the whole table.
        if self.conds.is_empty() {
            return Err(SchemaError::UnscopedWrite { operation });
        }
        let mut sql = format!("UPDATE {} SET {}", self.shape.table, self.sets.join(", "));
        sql.push_str(" WHERE ");
        sql.push_str(&self.conds.join(" AND "));
        if !self.returning.is_empty() {
            sql.push_str(" RETURNING ");
            sql.push_str(&self.returning.join(", "));
        }
        Ok((sql, self.params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field;

    fn patient_shape() -> Shape {
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
                (field::CREATED, "fecha_ingreso", "timestamp without time zone"),
            ],
        )
    }

    #[test]
    fn test_select_projects_typed_nulls_for_missing_fields() {
        let shape = patient_shape();
        let (sql, params) = SelectBuilder::new(&shape)
            .project(field::ID, ProjType::BigInt)
            .project(field::AGE, ProjType::Int)
            .build();

        assert!(sql.contains("(id)::bigint AS id"));
        assert!(sql.contains("NULL::integer AS age"));
        assert!(sql.contains("FROM pacientes"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_project_first_prefers_then_falls_back() {
        let shape = patient_shape(); // has CREATED, lacks UPDATED
        let (sql, _) = SelectBuilder::new(&shape)
            .project_first(
                &[field::UPDATED, field::CREATED],
                ProjType::Timestamp,
                field::UPDATED,
                Some("NOW()"),
            )
            .build();
        assert!(sql.contains("(fecha_ingreso)::timestamptz AS updated"));

        let bare = Shape::for_test("patient", "pacientes", &[(field::ID, "id", "integer")]);
        let (sql, _) = SelectBuilder::new(&bare)
            .project_first(
                &[field::UPDATED, field::CREATED],
                ProjType::Timestamp,
                field::UPDATED,
                Some("NOW()"),
            )
            .build();
        assert!(sql.contains("(NOW())::timestamptz AS updated"));
    }

    #[test]
    fn test_select_filters_bind_values() {
        let shape = patient_shape();
        let (sql, params) = SelectBuilder::new(&shape)
            .project(field::ID, ProjType::BigInt)
            .filter_eq(field::ACTIVE, true)
            .filter_eq(field::SEX, "F".to_string())
            .build();

        assert!(sql.contains("WHERE activo = $1 AND sexo = $2"));
        assert_eq!(params.len(), 2);
        // Raw request value never appears in the SQL text
        assert!(!sql.contains('F'));
    }

    #[test]
    fn test_select_filter_on_absent_column_is_skipped() {
        let shape = Shape::for_test("patient", "pacientes", &[(field::ID, "id", "integer")]);
        let (sql, params) = SelectBuilder::new(&shape)
            .project(field::ID, ProjType::BigInt)
            .filter_eq(field::ACTIVE, true)
            .build();

        assert!(!sql.contains("WHERE"));
        assert!(params.is_empty());
    }

    #[test]
    fn test_text_search_shape() {
        let shape = patient_shape();
        let (sql, params) = SelectBuilder::new(&shape)
            .project(field::ID, ProjType::BigInt)
            .text_search("  GARCÍA  ", &[field::LAST_NAME, field::FIRST_NAME])
            .build();

        assert!(sql.contains(
            "LOWER(COALESCE(apellidos, '') || ' ' || COALESCE(nombres, '')) LIKE $1"
        ));
        assert_eq!(params.len(), 1);
        // The needle itself stays out of the SQL text
        assert!(!sql.to_lowercase().contains("garcía"));
    }

    #[test]
    fn test_order_and_pagination() {
        let shape = patient_shape();
        let (sql, _) = SelectBuilder::new(&shape)
            .project(field::ID, ProjType::BigInt)
            .order_preferring(&[field::UPDATED, field::CREATED, field::ID], SortDirection::Desc)
            .limit(200)
            .offset(400)
            .build();

        // UPDATED is absent from this shape, CREATED is the fallback
        assert!(sql.contains("ORDER BY fecha_ingreso DESC"));
        assert!(sql.ends_with("LIMIT 200 OFFSET 400"));
    }

    #[test]
    fn test_insert_drops_unmapped_and_returns() -> Result<(), SchemaError> {
        let shape = patient_shape();
        let mut b = InsertBuilder::new(&shape);
        assert!(b.set(field::FIRST_NAME, "Ana".to_string()));
        assert!(!b.set(field::AGE, 7i32));
        assert!(b.set_expr(field::CREATED, "NOW()"));
        b.returning(field::ID, ProjType::BigInt)
            .returning(field::AGE, ProjType::Int);

        let (sql, params) = b.build("patient create")?;
        assert!(sql.starts_with("INSERT INTO pacientes (nombres, fecha_ingreso) VALUES ($1, NOW())"));
        assert!(sql.contains("RETURNING (id)::bigint AS id, NULL::integer AS age"));
        assert_eq!(params.len(), 1);
        Ok(())
    }

    #[test]
    fn test_insert_with_zero_columns_is_refused() {
        let shape = Shape::for_test("patient", "pacientes", &[(field::ID, "id", "integer")]);
        let mut b = InsertBuilder::new(&shape);
        b.set(field::AGE, 5i32);

        let err = b.build("patient create").unwrap_err();
        assert!(matches!(
            err,
            SchemaError::NoMappableColumns {
                operation: "patient create"
            }
        ));
    }

    #[test]
    fn test_update_builds_where_and_touch() -> Result<(), SchemaError> {
        let shape = patient_shape();
        let mut b = UpdateBuilder::new(&shape);
        b.set(field::FIRST_NAME, "Luz".to_string());
        b.set_expr(field::UPDATED, "NOW()"); // absent here, dropped
        b.filter_eq(field::ID, 9i64);
        b.filter_eq(field::CLINICIAN_ID, 3i64);
        b.returning(field::ID, ProjType::BigInt);

        let (sql, params) = b.build("patient update")?;
        assert_eq!(
            sql,
            "UPDATE pacientes SET nombres = $1 WHERE id = $2 AND terapeuta_id = $3 \
             RETURNING (id)::bigint AS id"
        );
        assert_eq!(params.len(), 3);
        Ok(())
    }

    #[test]
    fn test_update_with_no_sets_is_refused() {
        let shape = patient_shape();
        let mut b = UpdateBuilder::new(&shape);
        b.filter_eq(field::ID, 1i64);
        assert!(b.build("patient update").is_err());
    }

    #[test]
    fn test_update_without_row_condition_is_refused() {
        // No ID mapping: the id filter is skipped, and the soft-delete
        // style statement must not go out hitting every row.
        let shape = Shape::for_test(
            "patient",
            "pacientes",
            &[
                (field::ACTIVE, "activo", "boolean"),
                (field::UPDATED, "fecha_modifica", "timestamp without time zone"),
            ],
        );
        let mut b = UpdateBuilder::new(&shape);
        b.set(field::ACTIVE, false);
        b.set_expr(field::UPDATED, "NOW()");
        assert!(!b.filter_eq(field::ID, 7i64));

        let err = b.build("patient delete").unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnscopedWrite {
                operation: "patient delete"
            }
        ));
    }
}
