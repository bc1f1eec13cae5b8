//! Role entities and the role-type → category mapping.

use serde::{Deserialize, Serialize};

/// Coarse category of a company role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleCategory {
    /// Board members, deputies, chairs.
    Board,
    /// CEO and other executives.
    Management,
    /// Auditors and audit deputies.
    Auditor,
    /// Everything else (partners, liquidators, signatories).
    Other,
}

impl RoleCategory {
    /// Database string representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Board => "BOARD",
            Self::Management => "MANAGEMENT",
            Self::Auditor => "AUDITOR",
            Self::Other => "OTHER",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "BOARD" => Self::Board,
            "MANAGEMENT" => Self::Management,
            "AUDITOR" => Self::Auditor,
            _ => Self::Other,
        }
    }

    /// Map a Swedish role type to its category.
    ///
    /// Returns `None` for unrecognized role types so callers can fall back
    /// to the role-group mapping.
    pub fn from_role_type(role_type: &str) -> Option<Self> {
        match role_type {
            "Styrelseledamot" | "Styrelsesuppleant" | "Styrelseordförande" | "Ledamot"
            | "Suppleant" | "Ordförande" => Some(Self::Board),
            "Verkställande direktör" | "Vice verkställande direktör"
            | "Extern verkställande direktör" | "VD" => Some(Self::Management),
            "Revisor" | "Revisorssuppleant" | "Huvudansvarig revisor" | "Lekmannarevisor" => {
                Some(Self::Auditor)
            }
            // Not really management despite appearing under that group.
            "Extern firmatecknare" => Some(Self::Other),
            "Bolagsman" | "Komplementär" | "Likvidator" => Some(Self::Other),
            _ => None,
        }
    }

    /// Map a scraper role-group name to a category.
    ///
    /// Used as a fallback when the role type itself is unrecognized.
    pub fn from_group_name(group: &str) -> Self {
        match group {
            "Management" => Self::Management,
            "Board" => Self::Board,
            "Revision" => Self::Auditor,
            _ => Self::Other,
        }
    }
}

/// A person (or entity) holding a position at a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Person name as reported by the provider.
    pub name: String,
    /// Birth year, when available.
    pub birth_year: Option<i32>,
    /// Provider-reported role type (e.g. "Styrelseledamot").
    pub role_type: String,
    /// Computed category, never stored by the provider.
    pub role_category: RoleCategory,
    /// Which provider reported the role.
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_type_mapping() {
        assert_eq!(
            RoleCategory::from_role_type("Styrelseledamot"),
            Some(RoleCategory::Board)
        );
        assert_eq!(
            RoleCategory::from_role_type("Verkställande direktör"),
            Some(RoleCategory::Management)
        );
        assert_eq!(
            RoleCategory::from_role_type("Huvudansvarig revisor"),
            Some(RoleCategory::Auditor)
        );
        assert_eq!(
            RoleCategory::from_role_type("Extern firmatecknare"),
            Some(RoleCategory::Other)
        );
        assert_eq!(RoleCategory::from_role_type("Okänd titel"), None);
    }

    #[test]
    fn test_group_fallback() {
        assert_eq!(
            RoleCategory::from_group_name("Revision"),
            RoleCategory::Auditor
        );
        assert_eq!(RoleCategory::from_group_name("Board"), RoleCategory::Board);
        assert_eq!(
            RoleCategory::from_group_name("Something"),
            RoleCategory::Other
        );
    }

    #[test]
    fn test_db_round_trip() {
        for cat in [
            RoleCategory::Board,
            RoleCategory::Management,
            RoleCategory::Auditor,
            RoleCategory::Other,
        ] {
            assert_eq!(RoleCategory::from_db_str(cat.as_str()), cat);
        }
    }
}
