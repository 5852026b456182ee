use common::domain::{ErrorCategory, StoreFailure, StoreFailureKind};

/// Category plus operator-facing detail for one storage failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFailure {
    pub category: ErrorCategory,
    pub diagnostic: String,
}

impl ClassifiedFailure {
    fn new(category: ErrorCategory, diagnostic: impl Into<String>) -> Self {
        Self {
            category,
            diagnostic: diagnostic.into(),
        }
    }
}

const CONNECTION_EXCEPTION_CLASS: &str = "08";

// insufficient resources, program limit exceeded, object not in prerequisite state,
// operator intervention, system error
const OPERATIONAL_CLASSES: [&str; 5] = ["53", "54", "55", "57", "58"];

const INVALID_TEXT_REPRESENTATION: &str = "22P02";
const DATATYPE_MISMATCH: &str = "42804";
const UNDEFINED_TABLE: &str = "42P01";
const UNDEFINED_COLUMN: &str = "42703";

/// Map a storage failure onto the closed category set.
///
/// Rules are checked in priority order; the first match wins.
///
/// | failure                                   | category                     |
/// |-------------------------------------------|------------------------------|
/// | connection lost, or SQLSTATE class `08`   | `connectivity`               |
/// | SQLSTATE class `53` `54` `55` `57` `58`   | `operational`                |
/// | `22P02` or `42804`                        | `unexpected-type-for-number` |
/// | `42P01`                                   | `invalid-tenant`             |
/// | `42703`                                   | `invalid-metadata-key`       |
/// | object or array failed to bind            | `unexpected-object`          |
/// | any other SQLSTATE                        | `unclassified-storage-fault` |
/// | request could not be framed for the wire  | `unclassified-storage-fault` |
/// | driver-internal fault                     | `infrastructure-fault`       |
pub fn classify(failure: &StoreFailure) -> ClassifiedFailure {
    let code = failure.code.as_deref().unwrap_or_default();

    if failure.kind == StoreFailureKind::Connectivity || code.starts_with(CONNECTION_EXCEPTION_CLASS)
    {
        return ClassifiedFailure::new(ErrorCategory::Connectivity, failure.message.clone());
    }

    if failure.kind == StoreFailureKind::Database {
        if OPERATIONAL_CLASSES.iter().any(|class| code.starts_with(class)) {
            return ClassifiedFailure::new(ErrorCategory::Operational, failure.message.clone());
        }

        match code {
            INVALID_TEXT_REPRESENTATION | DATATYPE_MISMATCH => {
                let detail = if is_boolean_rejection(&failure.message) {
                    "boolean supplied for numeric column"
                } else {
                    "non-numeric value supplied for numeric column"
                };
                return ClassifiedFailure::new(
                    ErrorCategory::UnexpectedTypeForNumber,
                    format!("{}: {}", detail, failure.message),
                );
            }
            UNDEFINED_TABLE => {
                return ClassifiedFailure::new(
                    ErrorCategory::InvalidTenant,
                    format!("tenant table does not exist: {}", failure.message),
                );
            }
            UNDEFINED_COLUMN => {
                return ClassifiedFailure::new(
                    ErrorCategory::InvalidMetadataKey,
                    format!("metadata column does not exist: {}", failure.message),
                );
            }
            _ => {}
        }
    }

    match failure.kind {
        StoreFailureKind::ParameterEncoding => {
            ClassifiedFailure::new(ErrorCategory::UnexpectedObject, failure.message.clone())
        }
        StoreFailureKind::Database => ClassifiedFailure::new(
            ErrorCategory::UnclassifiedStorageFault,
            format!("SQLSTATE {}: {}", code, failure.message),
        ),
        StoreFailureKind::Request => ClassifiedFailure::new(
            ErrorCategory::UnclassifiedStorageFault,
            format!("statement could not be sent: {}", failure.message),
        ),
        StoreFailureKind::Driver | StoreFailureKind::Connectivity => {
            ClassifiedFailure::new(ErrorCategory::InfrastructureFault, failure.message.clone())
        }
    }
}

fn is_boolean_rejection(message: &str) -> bool {
    message.contains("type boolean") || message.contains(": \"true\"") || message.contains(": \"false\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category_of(failure: StoreFailure) -> ErrorCategory {
        classify(&failure).category
    }

    #[test]
    fn test_connection_loss_is_connectivity() {
        assert_eq!(
            category_of(StoreFailure::connectivity("connection closed")),
            ErrorCategory::Connectivity
        );
        assert_eq!(
            category_of(StoreFailure::database("08006", "connection failure")),
            ErrorCategory::Connectivity
        );
    }

    #[test]
    fn test_server_resource_conditions_are_operational() {
        for code in ["53100", "53300", "54000", "55P03", "57014", "57P01", "58030"] {
            assert_eq!(
                category_of(StoreFailure::database(code, "server unhappy")),
                ErrorCategory::Operational,
                "{}",
                code
            );
        }
    }

    #[test]
    fn test_string_in_numeric_column() {
        let classified = classify(&StoreFailure::database(
            "22P02",
            "invalid input syntax for type double precision: \"warm\"",
        ));

        assert_eq!(classified.category, ErrorCategory::UnexpectedTypeForNumber);
        assert!(classified
            .diagnostic
            .starts_with("non-numeric value supplied for numeric column"));
    }

    #[test]
    fn test_boolean_in_numeric_column_shares_category() {
        let classified = classify(&StoreFailure::database(
            "22P02",
            "invalid input syntax for type double precision: \"true\"",
        ));
        assert_eq!(classified.category, ErrorCategory::UnexpectedTypeForNumber);
        assert!(classified
            .diagnostic
            .starts_with("boolean supplied for numeric column"));

        let mismatch = classify(&StoreFailure::database(
            "42804",
            "column \"value\" is of type double precision but expression is of type boolean",
        ));
        assert_eq!(mismatch.category, ErrorCategory::UnexpectedTypeForNumber);
        assert!(mismatch.diagnostic.starts_with("boolean supplied"));
    }

    #[test]
    fn test_unknown_table_is_invalid_tenant() {
        assert_eq!(
            category_of(StoreFailure::database("42P01", "relation \"acme\" does not exist")),
            ErrorCategory::InvalidTenant
        );
    }

    #[test]
    fn test_unknown_column_is_invalid_metadata_key() {
        assert_eq!(
            category_of(StoreFailure::database(
                "42703",
                "column \"region\" of relation \"acme\" does not exist"
            )),
            ErrorCategory::InvalidMetadataKey
        );
    }

    #[test]
    fn test_structured_value_is_unexpected_object() {
        assert_eq!(
            category_of(StoreFailure::parameter_encoding(
                "cannot bind structured object value to column of type text"
            )),
            ErrorCategory::UnexpectedObject
        );
    }

    #[test]
    fn test_other_sqlstate_is_unclassified() {
        let classified = classify(&StoreFailure::database("23505", "duplicate key value"));

        assert_eq!(classified.category, ErrorCategory::UnclassifiedStorageFault);
        assert!(classified.diagnostic.contains("23505"));
    }

    #[test]
    fn test_unsendable_request_is_attributed_to_tenant() {
        let classified = classify(&StoreFailure::request(
            "error serializing parameters: value too large to transmit",
        ));

        assert_eq!(classified.category, ErrorCategory::UnclassifiedStorageFault);
        assert!(classified.category.is_tenant_attributable());
    }

    #[test]
    fn test_driver_fault_is_infrastructure() {
        let classified = classify(&StoreFailure::driver("unexpected message from server"));

        assert_eq!(classified.category, ErrorCategory::InfrastructureFault);
        assert!(!classified.category.is_tenant_attributable());
    }

    #[test]
    fn test_connectivity_wins_over_encoding_class() {
        // a connection-class code is never mistaken for a data problem
        assert_eq!(
            category_of(StoreFailure::database("08P01", "invalid input syntax: \"true\"")),
            ErrorCategory::Connectivity
        );
    }
}
