use crate::domain::{SqlParam, StoreFailure};
use bytes::BytesMut;
use std::error::Error as StdError;
use std::io;
use thiserror::Error;
use tokio_postgres::types::{to_sql_checked, Format, IsNull, ToSql, Type};

/// Raised while binding an object or array to a scalar column.
#[derive(Debug, Error)]
#[error("cannot bind structured {kind} value to column of type {column_type}")]
pub struct StructuredValueError {
    pub kind: &'static str,
    pub column_type: String,
}

/// Parameters travel in text format and are parsed by the server against the target
/// column type, the same way a literal would be. A string sent to a numeric column is
/// therefore rejected by the server, not silently coerced by the driver.
impl ToSql for SqlParam {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self {
            SqlParam::Null => return Ok(IsNull::Yes),
            SqlParam::Bool(b) => {
                let text: &[u8] = if *b { b"true" } else { b"false" };
                out.extend_from_slice(text);
            }
            SqlParam::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
            SqlParam::Text(s) => out.extend_from_slice(s.as_bytes()),
            SqlParam::Structured(value) => {
                let kind = if value.is_array() { "array" } else { "object" };
                return Err(Box::new(StructuredValueError {
                    kind,
                    column_type: ty.name().to_string(),
                }));
            }
        }
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

impl From<tokio_postgres::Error> for StoreFailure {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            return StoreFailure::database(db_err.code().code(), db_err.message());
        }

        if err.is_closed() {
            return StoreFailure::connectivity(err.to_string());
        }

        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(structured) = cause.downcast_ref::<StructuredValueError>() {
                return StoreFailure::parameter_encoding(format!("{}: {}", err, structured));
            }
            if let Some(io_err) = cause.downcast_ref::<io::Error>() {
                let message = format!("{}: {}", err, cause);
                return if is_socket_failure(io_err) {
                    StoreFailure::connectivity(message)
                } else {
                    StoreFailure::request(message)
                };
            }
            source = cause.source();
        }

        StoreFailure::driver(err.to_string())
    }
}

/// Io errors that mean the session itself is gone. tokio-postgres also reports requests
/// it cannot frame (more than 65535 parameters, oversized values) as io errors.
fn is_socket_failure(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::TimedOut
            | io::ErrorKind::NotConnected
    )
}
