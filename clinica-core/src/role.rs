//! Caller roles and the canonical alias table.
//!
//! Role claims arrive as free text minted by external systems, with
//! spelling drift across deployments ("ADMIN", "SUPER_ADMIN",
//! "ADMINISTRADOR", ...). One alias table normalizes all of them; every
//! consumer (record access, user management, reports) goes through it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized caller role.
///
/// Anything that does not match a known administrator or clinician alias
/// is treated as `Clinician`: unrecognized roles get the narrowest row
/// visibility, never the widest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Administrator,
    Clinician,
}

/// Free-text variants accepted as administrator.
const ADMIN_ALIASES: &[&str] = &[
    "ADMIN",
    "SUPERADMIN",
    "ADMINISTRADOR",
    "ADMINISTRATOR",
    "SUPER ADMIN",
    "SUPER_ADMIN",
    "ROOT",
];

impl Role {
    /// Normalize a free-text role claim.
    pub fn from_claim(raw: &str) -> Self {
        let r = raw.trim().to_uppercase();
        if ADMIN_ALIASES.contains(&r.as_str()) {
            Role::Administrator
        } else {
            Role::Clinician
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::Administrator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Administrator => write!(f, "ADMINISTRATOR"),
            Role::Clinician => write!(f, "CLINICIAN"),
        }
    }
}
