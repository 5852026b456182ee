use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of failure categories recorded against a tenant or reported operationally.
///
/// The kebab-case names are what lands in the `error_category` column of the error store,
/// so they must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    EmptyPayload,
    InvalidTenant,
    InvalidMetadataKey,
    UnexpectedTypeForNumber,
    UnexpectedObject,
    Connectivity,
    Operational,
    UnclassifiedStorageFault,
    InfrastructureFault,
    DecodeFailure,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 10] = [
        ErrorCategory::EmptyPayload,
        ErrorCategory::InvalidTenant,
        ErrorCategory::InvalidMetadataKey,
        ErrorCategory::UnexpectedTypeForNumber,
        ErrorCategory::UnexpectedObject,
        ErrorCategory::Connectivity,
        ErrorCategory::Operational,
        ErrorCategory::UnclassifiedStorageFault,
        ErrorCategory::InfrastructureFault,
        ErrorCategory::DecodeFailure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::EmptyPayload => "empty-payload",
            ErrorCategory::InvalidTenant => "invalid-tenant",
            ErrorCategory::InvalidMetadataKey => "invalid-metadata-key",
            ErrorCategory::UnexpectedTypeForNumber => "unexpected-type-for-number",
            ErrorCategory::UnexpectedObject => "unexpected-object",
            ErrorCategory::Connectivity => "connectivity",
            ErrorCategory::Operational => "operational",
            ErrorCategory::UnclassifiedStorageFault => "unclassified-storage-fault",
            ErrorCategory::InfrastructureFault => "infrastructure-fault",
            ErrorCategory::DecodeFailure => "decode-failure",
        }
    }

    /// Whether a failure in this category is the tenant's doing and belongs in the error store.
    ///
    /// Connectivity and infrastructure faults describe the store itself and only go to the
    /// operational log.
    pub fn is_tenant_attributable(&self) -> bool {
        !matches!(
            self,
            ErrorCategory::Connectivity | ErrorCategory::InfrastructureFault
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| format!("unknown error category: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip_through_from_str() {
        for category in ErrorCategory::ALL {
            assert_eq!(category.as_str().parse::<ErrorCategory>(), Ok(category));
        }
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let json = serde_json::to_string(&ErrorCategory::UnexpectedTypeForNumber).unwrap();
        assert_eq!(json, "\"unexpected-type-for-number\"");

        let parsed: ErrorCategory = serde_json::from_str("\"invalid-metadata-key\"").unwrap();
        assert_eq!(parsed, ErrorCategory::InvalidMetadataKey);
    }

    #[test]
    fn test_store_faults_are_not_attributed_to_tenant() {
        assert!(!ErrorCategory::Connectivity.is_tenant_attributable());
        assert!(!ErrorCategory::InfrastructureFault.is_tenant_attributable());
        assert!(ErrorCategory::InvalidTenant.is_tenant_attributable());
        assert!(ErrorCategory::Operational.is_tenant_attributable());
        assert!(ErrorCategory::DecodeFailure.is_tenant_attributable());
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        assert!("disk-full".parse::<ErrorCategory>().is_err());
    }
}
