use crate::domain::{Credentials, DatabaseTarget};
use serde::{Deserialize, Serialize};

/// PostgreSQL server configuration shared by the telemetry and error-log databases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl PostgresConfig {
    /// Target for one database on this server
    pub fn target(&self, database: &str) -> DatabaseTarget {
        DatabaseTarget {
            credentials: Credentials {
                username: self.username.clone(),
                password: self.password.clone(),
            },
            host: self.host.clone(),
            port: self.port,
            database: database.to_string(),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: "postgres".to_string(),
        }
    }
}
