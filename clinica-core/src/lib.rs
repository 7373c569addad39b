//! CLINICA Core - Shared Vocabulary
//!
//! Pure data types with no I/O. The API crate depends on this for the
//! canonical role table, record enums, and bound-clamping helpers that
//! must behave identically across every endpoint.

pub mod bounds;
pub mod enums;
pub mod role;

pub use bounds::{clamp_days, clamp_limit, clamp_page, MAX_WINDOW_DAYS};
pub use enums::{canonical_module_kind, Sex, SortDirection};
pub use role::Role;

use chrono::{DateTime, Utc};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier. Clinical record ids are integer sequences in every
/// observed deployment, so this is an i64 rather than a UUID.
pub type EntityId = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
