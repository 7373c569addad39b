//! Bound clamping for pagination and aggregation windows.
//!
//! Every listing endpoint clamps its `limit` into a documented range and
//! every report clamps its day window; the helpers here are the single
//! implementation so the ranges cannot drift between routes.

/// Maximum aggregation window in days.
pub const MAX_WINDOW_DAYS: i64 = 365;

/// Clamp a requested page size into `[1, max]`, substituting `default`
/// when the caller sent nothing. Zero and negative requests clamp to 1.
pub fn clamp_limit(requested: Option<i64>, default: i64, max: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, max)
}

/// Clamp a requested day window into `[1, MAX_WINDOW_DAYS]`.
pub fn clamp_days(requested: Option<i64>, default: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, MAX_WINDOW_DAYS)
}

/// Clamp a 1-based page number; anything below 1 becomes page 1.
pub fn clamp_page(requested: Option<i64>) -> i64 {
    requested.unwrap_or(1).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clamp_limit_edges() {
        assert_eq!(clamp_limit(None, 200, 500), 200);
        assert_eq!(clamp_limit(Some(0), 200, 500), 1);
        assert_eq!(clamp_limit(Some(-5), 200, 500), 1);
        assert_eq!(clamp_limit(Some(9999), 200, 500), 500);
        assert_eq!(clamp_limit(Some(500), 200, 500), 500);
        assert_eq!(clamp_limit(Some(1), 200, 500), 1);
    }

    #[test]
    fn test_clamp_days_edges() {
        assert_eq!(clamp_days(None, 30), 30);
        assert_eq!(clamp_days(Some(0), 30), 1);
        assert_eq!(clamp_days(Some(400), 30), MAX_WINDOW_DAYS);
    }

    #[test]
    fn test_clamp_page() {
        assert_eq!(clamp_page(None), 1);
        assert_eq!(clamp_page(Some(-3)), 1);
        assert_eq!(clamp_page(Some(7)), 7);
    }

    proptest! {
        #[test]
        fn prop_limit_always_in_range(req in proptest::option::of(i64::MIN..i64::MAX)) {
            let v = clamp_limit(req, 200, 500);
            prop_assert!((1..=500).contains(&v));
        }

        #[test]
        fn prop_days_always_in_range(req in proptest::option::of(i64::MIN..i64::MAX)) {
            let v = clamp_days(req, 30);
            prop_assert!((1..=MAX_WINDOW_DAYS).contains(&v));
        }
    }
}
