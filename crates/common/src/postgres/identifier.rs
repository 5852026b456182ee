use std::fmt;
use thiserror::Error;

/// PostgreSQL truncates identifiers longer than `NAMEDATALEN - 1` bytes.
pub const MAX_IDENTIFIER_BYTES: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier {0:?} exceeds {max} bytes", max = MAX_IDENTIFIER_BYTES)]
    TooLong(String),

    #[error("identifier {0:?} contains a control character")]
    IllegalCharacter(String),
}

/// A double-quoted, escaped PostgreSQL identifier, safe to place in statement text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotedIdentifier(String);

impl QuotedIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuotedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quote `raw` as a PostgreSQL identifier.
///
/// Embedded double quotes are doubled. Empty names, names PostgreSQL would silently
/// truncate, and names containing NUL or other control characters are rejected.
pub fn quote_identifier(raw: &str) -> Result<QuotedIdentifier, IdentifierError> {
    if raw.is_empty() {
        return Err(IdentifierError::Empty);
    }

    if raw.len() > MAX_IDENTIFIER_BYTES {
        return Err(IdentifierError::TooLong(raw.to_string()));
    }

    if raw.chars().any(char::is_control) {
        return Err(IdentifierError::IllegalCharacter(raw.to_string()));
    }

    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');
    for c in raw.chars() {
        if c == '"' {
            quoted.push('"');
        }
        quoted.push(c);
    }
    quoted.push('"');

    Ok(QuotedIdentifier(quoted))
}
