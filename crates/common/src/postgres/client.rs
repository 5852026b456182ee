use crate::domain::{
    ConnectionError, ConnectionFactory, DatabaseTarget, SqlParam, StoreConnection, StoreFailure,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info, warn};

/// One PostgreSQL session plus the task driving its socket.
///
/// The client sits behind a mutex because a transaction needs `&mut Client`; callers on
/// the ingest path are serial, so the lock is uncontended in practice.
pub struct PostgresConnection {
    client: Mutex<Client>,
    driver: JoinHandle<()>,
    database: String,
}

impl PostgresConnection {
    /// Opens a connection to `target`
    ///
    /// # Arguments
    /// * `target` - Credentials, host, port and database name
    /// * `connect_timeout` - Bound on establishing the TCP session
    pub async fn connect(
        target: &DatabaseTarget,
        connect_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&target.host)
            .port(target.port)
            .dbname(&target.database)
            .user(&target.credentials.username)
            .password(&target.credentials.password)
            .application_name("sif-stream")
            .connect_timeout(connect_timeout);

        let (client, connection) =
            config
                .connect(NoTls)
                .await
                .map_err(|e| ConnectionError::Connect {
                    target: target.to_string(),
                    message: e.to_string(),
                })?;

        let database = target.database.clone();
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(database = %database, error = %e, "postgres connection terminated");
            } else {
                debug!(database = %database, "postgres connection closed");
            }
        });

        info!(database_target = %target, "connected to postgres");

        Ok(Self {
            client: Mutex::new(client),
            driver,
            database: target.database.clone(),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

#[async_trait]
impl StoreConnection for PostgresConnection {
    fn is_closed(&self) -> bool {
        self.driver.is_finished()
    }

    async fn execute_in_transaction(
        &self,
        statement: &str,
        params: &[SqlParam],
    ) -> Result<u64, StoreFailure> {
        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;

        let bound: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        match transaction.execute(statement, &bound).await {
            Ok(rows) => {
                transaction.commit().await?;
                debug!(database = %self.database, rows, "transaction committed");
                Ok(rows)
            }
            Err(e) => {
                if let Err(rollback_err) = transaction.rollback().await {
                    warn!(
                        database = %self.database,
                        error = %rollback_err,
                        "failed to roll back transaction"
                    );
                }
                Err(e.into())
            }
        }
    }

    fn close(&self) {
        debug!(database = %self.database, "closing postgres connection");
        self.driver.abort();
    }
}

/// Creates [`PostgresConnection`]s for the connection supervisor and at startup.
#[derive(Debug, Clone)]
pub struct PostgresConnectionFactory {
    connect_timeout: Duration,
}

impl PostgresConnectionFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl ConnectionFactory for PostgresConnectionFactory {
    async fn create(
        &self,
        target: &DatabaseTarget,
    ) -> Result<Arc<dyn StoreConnection>, ConnectionError> {
        let connection = PostgresConnection::connect(target, self.connect_timeout).await?;
        Ok(Arc::new(connection))
    }
}
