//! Validation Traits
//!
//! Common validation patterns extracted from route handlers.

use crate::error::{ApiError, ApiResult};

/// Trait for validating non-empty strings.
pub trait ValidateNonEmpty {
    /// Validate that the value is non-empty (whitespace-only counts as
    /// empty). `field_name` feeds the error message.
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()>;
}

impl ValidateNonEmpty for str {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        if self.trim().is_empty() {
            return Err(ApiError::missing_field(field_name));
        }
        Ok(())
    }
}

// Needed so Option<&str> picks up the blanket Option impl below.
impl ValidateNonEmpty for &str {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        (**self).validate_non_empty(field_name)
    }
}

impl ValidateNonEmpty for String {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        self.as_str().validate_non_empty(field_name)
    }
}

impl<T: ValidateNonEmpty> ValidateNonEmpty for Option<T> {
    fn validate_non_empty(&self, field_name: &str) -> ApiResult<()> {
        match self {
            Some(value) => value.validate_non_empty(field_name),
            None => Err(ApiError::missing_field(field_name)),
        }
    }
}

/// Trait for validating numeric ranges.
///
/// Used for payload fields with hard bounds, e.g. a patient age of
/// 0..=120. Query-side pagination goes through `clinica_core::bounds`
/// clamping instead and never errors.
pub trait ValidateRange {
    /// Validate that the value is within an inclusive range.
    fn validate_range(&self, field_name: &str, min: Self, max: Self) -> ApiResult<()>
    where
        Self: Sized;
}

macro_rules! impl_validate_range {
    ($($t:ty),*) => {
        $(
            impl ValidateRange for $t {
                fn validate_range(&self, field_name: &str, min: Self, max: Self) -> ApiResult<()> {
                    if *self < min || *self > max {
                        return Err(ApiError::invalid_range(field_name, min, max));
                    }
                    Ok(())
                }
            }
        )*
    };
}

impl_validate_range!(i16, i32, i64);

/// Trait for checking if an update request carries any edits.
///
/// An update with an empty edit set is a validation error, not a no-op
/// touch of the row.
pub trait HasUpdates {
    /// Check if any update fields are set.
    fn has_any_updates(&self) -> bool;

    /// Validate that at least one update field is set.
    fn validate_has_updates(&self) -> ApiResult<()> {
        if !self.has_any_updates() {
            return Err(ApiError::invalid_input(
                "At least one field must be provided for update",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_non_empty_str() {
        assert!("hola".validate_non_empty("nombres").is_ok());
        assert!("".validate_non_empty("nombres").is_err());
        assert!("   ".validate_non_empty("nombres").is_err());
    }

    #[test]
    fn test_validate_non_empty_option() {
        let present: Option<&str> = Some("García");
        let blank: Option<&str> = Some("  ");
        let absent: Option<&str> = None;

        assert!(present.validate_non_empty("apellidos").is_ok());
        assert!(blank.validate_non_empty("apellidos").is_err());
        assert!(absent.validate_non_empty("apellidos").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(0i32.validate_range("age", 0, 120).is_ok());
        assert!(120i32.validate_range("age", 0, 120).is_ok());
        assert!(121i32.validate_range("age", 0, 120).is_err());
        assert!((-1i32).validate_range("age", 0, 120).is_err());
    }

    #[test]
    fn test_has_updates_default() {
        struct Req {
            name: Option<String>,
        }
        impl HasUpdates for Req {
            fn has_any_updates(&self) -> bool {
                self.name.is_some()
            }
        }

        assert!(Req { name: None }.validate_has_updates().is_err());
        assert!(Req {
            name: Some("x".into())
        }
        .validate_has_updates()
        .is_ok());
    }
}
