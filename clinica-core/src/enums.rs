//! Canonical record enums and code normalization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Biological sex code as stored by every observed deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    M,
    F,
}

impl Sex {
    /// Parse a free-text sex code (case-insensitive). Returns `None` for
    /// anything other than M/F so callers can reject or skip the filter.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "M" => Some(Sex::M),
            "F" => Some(Sex::F),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sex::M => "M",
            Sex::F => "F",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction for listings. `DESC` unless the caller explicitly asks
/// for ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn from_param(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("asc") {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Normalize a module/run type code into its canonical category name.
///
/// Deployments store either single-letter codes or prefixed names for the
/// two hardware module families; anything else passes through uppercased.
pub fn canonical_module_kind(raw: &str) -> String {
    let t = raw.trim().to_uppercase();
    if t == "A" || t.starts_with("ULTRA") {
        "ULTRASONICOS".to_string()
    } else if t == "B" || t.starts_with("PULS") {
        "PULSADORES".to_string()
    } else {
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sex_parse() {
        assert_eq!(Sex::parse("m"), Some(Sex::M));
        assert_eq!(Sex::parse(" F "), Some(Sex::F));
        assert_eq!(Sex::parse("x"), None);
        assert_eq!(Sex::parse(""), None);
    }

    #[test]
    fn test_sort_direction_defaults_desc() {
        assert_eq!(SortDirection::from_param("asc"), SortDirection::Asc);
        assert_eq!(SortDirection::from_param("ASC"), SortDirection::Asc);
        assert_eq!(SortDirection::from_param("desc"), SortDirection::Desc);
        assert_eq!(SortDirection::from_param("sideways"), SortDirection::Desc);
        assert_eq!(SortDirection::from_param(""), SortDirection::Desc);
    }

    #[test]
    fn test_module_kind_canonicalization() {
        assert_eq!(canonical_module_kind("A"), "ULTRASONICOS");
        assert_eq!(canonical_module_kind("ultrasonido"), "ULTRASONICOS");
        assert_eq!(canonical_module_kind("b"), "PULSADORES");
        assert_eq!(canonical_module_kind("Pulsadores"), "PULSADORES");
        assert_eq!(canonical_module_kind("memoria"), "MEMORIA");
    }

    #[test]
    fn test_module_kind_is_stable() {
        for raw in ["A", "B", "ULTRA_X", "PULSO", "OTRO"] {
            let once = canonical_module_kind(raw);
            assert_eq!(canonical_module_kind(&once), once);
        }
    }
}
