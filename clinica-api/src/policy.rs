//! Access Policy Module
//!
//! Role-based row visibility and owner assignment, decided once per
//! request from the authenticated context. Ownership is enforced inside
//! the WHERE clause of the data query itself, never as a separate
//! pre-check, so a row outside the caller's scope and a missing row are
//! the same zero-row result (both surface as 404).

use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult};
use crate::query::{SelectBuilder, UpdateBuilder};
use crate::schema::field;
use clinica_core::{EntityId, Role};

/// Visibility scope for listing endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// No ownership condition.
    All,
    /// Rows owned by the caller.
    Mine,
}

/// Per-request access decisions.
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy {
    pub role: Role,
    pub user_id: EntityId,
}

impl AccessPolicy {
    pub fn new(ctx: &AuthContext) -> Self {
        Self {
            role: ctx.role,
            user_id: ctx.user_id,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Resolve the visibility scope for a listing.
    ///
    /// `all=1` outranks `mine` but is honored only for administrators;
    /// a clinician sending `all=1` still gets their own rows. Without
    /// explicit parameters, administrators see everything and
    /// clinicians see their own.
    pub fn list_scope(&self, all: bool, mine: Option<bool>) -> Scope {
        if all && self.is_admin() {
            return Scope::All;
        }
        match mine {
            Some(true) => Scope::Mine,
            Some(false) if self.is_admin() => Scope::All,
            Some(false) => Scope::Mine,
            None if self.is_admin() => Scope::All,
            None => Scope::Mine,
        }
    }

    /// Apply the ownership condition to a SELECT.
    ///
    /// When the deployment has no owner column the condition is
    /// skipped, matching the legacy system's permissive reads.
    pub fn scope_select<'a>(&self, builder: SelectBuilder<'a>, scope: Scope) -> SelectBuilder<'a> {
        match scope {
            Scope::All => builder,
            Scope::Mine => builder.filter_eq(field::CLINICIAN_ID, self.user_id),
        }
    }

    /// Apply the ownership condition to an UPDATE/soft-delete.
    /// Administrators write any row; clinicians only their own.
    pub fn scope_update(&self, builder: &mut UpdateBuilder<'_>) {
        if !self.is_admin() {
            builder.filter_eq(field::CLINICIAN_ID, self.user_id);
        }
    }

    /// Decide the owner of a newly created record.
    ///
    /// Administrators must name the owner explicitly; clinicians are
    /// assigned themselves and any owner in the payload is ignored.
    pub fn assign_owner_on_create(&self, requested: Option<EntityId>) -> ApiResult<EntityId> {
        if self.is_admin() {
            requested.ok_or_else(|| {
                ApiError::validation_failed("A clinician must be assigned (clinician_id)")
            })
        } else {
            Ok(self.user_id)
        }
    }

    /// Only administrators may move a record to another owner.
    pub fn can_reassign_owner(&self) -> bool {
        self.is_admin()
    }

    /// User management is administrator-only.
    pub fn require_admin(&self) -> ApiResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Administrator access required"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ProjType;
    use crate::schema::Shape;

    fn admin() -> AccessPolicy {
        AccessPolicy {
            role: Role::Administrator,
            user_id: 1,
        }
    }

    fn clinician() -> AccessPolicy {
        AccessPolicy {
            role: Role::Clinician,
            user_id: 7,
        }
    }

    fn shape() -> Shape {
        Shape::for_test(
            "patient",
            "pacientes",
            &[
                (field::ID, "id", "integer"),
                (field::CLINICIAN_ID, "terapeuta_id", "integer"),
            ],
        )
    }

    #[test]
    fn test_list_scope_defaults() {
        assert_eq!(admin().list_scope(false, None), Scope::All);
        assert_eq!(clinician().list_scope(false, None), Scope::Mine);
    }

    #[test]
    fn test_all_param_only_widens_for_admin() {
        assert_eq!(admin().list_scope(true, Some(true)), Scope::All);
        assert_eq!(clinician().list_scope(true, None), Scope::Mine);
        assert_eq!(clinician().list_scope(true, Some(false)), Scope::Mine);
    }

    #[test]
    fn test_admin_can_narrow_to_mine() {
        assert_eq!(admin().list_scope(false, Some(true)), Scope::Mine);
        assert_eq!(admin().list_scope(false, Some(false)), Scope::All);
    }

    #[test]
    fn test_scope_select_adds_owner_condition() {
        let shape = shape();
        let policy = clinician();
        let builder = SelectBuilder::new(&shape).project(field::ID, ProjType::BigInt);
        let (sql, params) = policy
            .scope_select(builder, policy.list_scope(false, None))
            .build();
        assert!(sql.contains("terapeuta_id = $1"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_scope_update_ownership() -> Result<(), crate::schema::SchemaError> {
        let shape = shape();
        let mut b = UpdateBuilder::new(&shape);
        b.set(field::CLINICIAN_ID, 2i64);
        b.filter_eq(field::ID, 5i64);
        clinician().scope_update(&mut b);
        let (sql, _) = b.build("test")?;
        assert!(sql.contains("WHERE id = $2 AND terapeuta_id = $3"));

        let mut b = UpdateBuilder::new(&shape);
        b.set(field::CLINICIAN_ID, 2i64);
        b.filter_eq(field::ID, 5i64);
        admin().scope_update(&mut b);
        let (sql, _) = b.build("test")?;
        assert!(sql.ends_with("WHERE id = $2"));
        Ok(())
    }

    #[test]
    fn test_owner_assignment() {
        // Admin must name the owner
        assert!(admin().assign_owner_on_create(None).is_err());
        assert_eq!(admin().assign_owner_on_create(Some(9)).unwrap(), 9);

        // Clinician is self-assigned, payload ignored
        assert_eq!(clinician().assign_owner_on_create(None).unwrap(), 7);
        assert_eq!(clinician().assign_owner_on_create(Some(9)).unwrap(), 7);
    }

    #[test]
    fn test_reassignment_and_admin_gate() {
        assert!(admin().can_reassign_owner());
        assert!(!clinician().can_reassign_owner());
        assert!(admin().require_admin().is_ok());
        assert!(clinician().require_admin().is_err());
    }
}
