use crate::domain::InsertCommand;
use async_trait::async_trait;
use serde_json::{Number, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// A single positional statement parameter.
///
/// Parameters are always bound, never spliced into statement text. `Structured` carries
/// an object or array that arrived where a scalar was expected; binding it fails at the
/// driver, which surfaces as an `unexpected-object` failure.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    Structured(Value),
}

impl From<&Value> for SqlParam {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Null,
            Value::Bool(b) => SqlParam::Bool(*b),
            Value::Number(n) => SqlParam::Number(n.clone()),
            Value::String(s) => SqlParam::Text(s.clone()),
            other => SqlParam::Structured(other.clone()),
        }
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Number(value.into())
    }
}

impl fmt::Display for SqlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlParam::Null => f.write_str("null"),
            SqlParam::Bool(b) => write!(f, "{}", b),
            SqlParam::Number(n) => write!(f, "{}", n),
            SqlParam::Text(s) => write!(f, "{:?}", s),
            SqlParam::Structured(v) => write!(f, "{}", v),
        }
    }
}

/// Where a storage failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFailureKind {
    /// The connection was already closed or dropped mid-statement.
    Connectivity,
    /// The server rejected the statement; `code` carries the SQLSTATE.
    Database,
    /// A parameter could not be encoded for the wire.
    ParameterEncoding,
    /// The request could not be framed on a live connection, e.g. too many parameters.
    Request,
    /// Anything raised inside the driver that is not a rejection of the data.
    Driver,
}

/// Structured descriptor of a failed storage call: origin, optional SQLSTATE code and
/// the driver's message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StoreFailure {
    pub kind: StoreFailureKind,
    pub code: Option<String>,
    pub message: String,
}

impl StoreFailure {
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self {
            kind: StoreFailureKind::Connectivity,
            code: None,
            message: message.into(),
        }
    }

    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: StoreFailureKind::Database,
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn parameter_encoding(message: impl Into<String>) -> Self {
        Self {
            kind: StoreFailureKind::ParameterEncoding,
            code: None,
            message: message.into(),
        }
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self {
            kind: StoreFailureKind::Request,
            code: None,
            message: message.into(),
        }
    }

    pub fn driver(message: impl Into<String>) -> Self {
        Self {
            kind: StoreFailureKind::Driver,
            code: None,
            message: message.into(),
        }
    }
}

/// A live connection to one relational database.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait StoreConnection: Send + Sync {
    /// Whether the underlying session has terminated
    fn is_closed(&self) -> bool;

    /// Execute one parameterized statement inside its own transaction.
    ///
    /// Commits on success and rolls back before returning on failure, so no transaction
    /// is left open across calls. Returns the number of affected rows.
    async fn execute_in_transaction(
        &self,
        statement: &str,
        params: &[SqlParam],
    ) -> Result<u64, StoreFailure>;

    /// Terminate the session
    fn close(&self);
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything a factory needs to open a connection to a named database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTarget {
    pub credentials: Credentials,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl fmt::Display for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.credentials.username, self.host, self.port, self.database)
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {target}: {message}")]
    Connect { target: String, message: String },

    #[error("timed out connecting to {target} after {timeout_secs}s")]
    Timeout { target: String, timeout_secs: u64 },
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(
        &self,
        target: &DatabaseTarget,
    ) -> Result<Arc<dyn StoreConnection>, ConnectionError>;
}

/// Synchronized, replaceable handle to the current connection for one database.
///
/// Writers take a clone of the current `Arc` and run their whole transaction on it, so a
/// replacement never affects a write that is already in progress.
#[derive(Clone)]
pub struct SharedConnection {
    name: Arc<str>,
    current: Arc<RwLock<Arc<dyn StoreConnection>>>,
}

impl SharedConnection {
    pub fn new(name: impl Into<Arc<str>>, connection: Arc<dyn StoreConnection>) -> Self {
        Self {
            name: name.into(),
            current: Arc::new(RwLock::new(connection)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn current(&self) -> Arc<dyn StoreConnection> {
        Arc::clone(&*self.current.read().await)
    }

    /// Swap in a new connection, returning the one it replaced
    pub async fn replace(&self, connection: Arc<dyn StoreConnection>) -> Arc<dyn StoreConnection> {
        let mut guard = self.current.write().await;
        std::mem::replace(&mut *guard, connection)
    }

    pub async fn close(&self) {
        self.current.read().await.close();
    }
}

impl fmt::Debug for SharedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedConnection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Writes translated telemetry into the tenant's table.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TelemetryWriter: Send + Sync {
    async fn write(&self, command: &InsertCommand) -> Result<u64, StoreFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sql_param_from_json_value() {
        assert_eq!(SqlParam::from(&json!(null)), SqlParam::Null);
        assert_eq!(SqlParam::from(&json!(true)), SqlParam::Bool(true));
        assert_eq!(SqlParam::from(&json!(0.5)), SqlParam::Number(Number::from_f64(0.5).unwrap()));
        assert_eq!(SqlParam::from(&json!("us")), SqlParam::Text("us".to_string()));
        assert_eq!(
            SqlParam::from(&json!({"nested": 1})),
            SqlParam::Structured(json!({"nested": 1}))
        );
        assert_eq!(SqlParam::from(&json!([1, 2])), SqlParam::Structured(json!([1, 2])));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials {
            username: "ingest".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", credentials);
        assert!(rendered.contains("ingest"));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_shared_connection_replace_returns_previous() {
        let mut first = MockStoreConnection::new();
        first.expect_is_closed().return_const(true);
        let mut second = MockStoreConnection::new();
        second.expect_is_closed().return_const(false);

        let shared = SharedConnection::new("telemetry", Arc::new(first));
        let held_by_writer = shared.current().await;

        let previous = shared.replace(Arc::new(second)).await;

        assert!(previous.is_closed());
        assert!(held_by_writer.is_closed());
        assert!(!shared.current().await.is_closed());
        assert_eq!(shared.name(), "telemetry");
    }
}
