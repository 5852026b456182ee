use async_trait::async_trait;
use chrono::SecondsFormat;
use common::domain::{
    ClassifiedError, DomainError, DomainResult, ErrorLogRepository, SharedConnection, SqlParam,
    StoreFailure,
};
use common::postgres::{quote_identifier, QuotedIdentifier};
use tracing::{debug, info};

/// Error store backed by a table in the error-log database.
///
/// One row per `(tenant_id, device)`. A repeat failure only refreshes `timestamp`; the
/// category recorded first is kept.
#[derive(Debug, Clone)]
pub struct PostgresErrorLogRepository {
    connection: SharedConnection,
    table: QuotedIdentifier,
}

impl PostgresErrorLogRepository {
    pub fn new(connection: SharedConnection, table: &str) -> DomainResult<Self> {
        Ok(Self {
            connection,
            table: quote_identifier(table)?,
        })
    }

    /// Create the error table if it does not exist yet
    pub async fn ensure_table(&self) -> DomainResult<()> {
        let statement = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             tenant_id text NOT NULL, \
             error_category text NOT NULL, \
             device text NOT NULL, \
             timestamp timestamptz NOT NULL, \
             PRIMARY KEY (tenant_id, device))",
            self.table
        );

        self.connection
            .current()
            .await
            .execute_in_transaction(&statement, &[])
            .await?;

        info!(table = %self.table, "error log table ready");
        Ok(())
    }

    fn upsert_statement(&self) -> String {
        format!(
            "INSERT INTO {} (tenant_id, error_category, device, timestamp) \
             VALUES ($1, $2, $3, $4::timestamptz) \
             ON CONFLICT (tenant_id, device) DO UPDATE SET timestamp = EXCLUDED.timestamp",
            self.table
        )
    }
}

#[async_trait]
impl ErrorLogRepository for PostgresErrorLogRepository {
    async fn record(&self, error: &ClassifiedError) -> DomainResult<()> {
        debug!(
            tenant_id = %error.tenant_id,
            device = %error.device,
            category = %error.category,
            "recording error"
        );

        let connection = self.connection.current().await;
        if connection.is_closed() {
            return Err(DomainError::Storage(StoreFailure::connectivity(format!(
                "{} connection is closed",
                self.connection.name()
            ))));
        }

        let params = [
            SqlParam::from(error.tenant_id.as_str()),
            SqlParam::from(error.category.as_str()),
            SqlParam::from(error.device.as_str()),
            SqlParam::Text(error.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)),
        ];

        connection
            .execute_in_transaction(&self.upsert_statement(), &params)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::domain::ErrorCategory;
    use common::MockStoreConnection;
    use std::sync::Arc;

    fn entry() -> ClassifiedError {
        ClassifiedError {
            tenant_id: "acme".to_string(),
            device: "sensor-7".to_string(),
            category: ErrorCategory::InvalidTenant,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_record_upserts_on_tenant_and_device() {
        let mut connection = MockStoreConnection::new();
        connection.expect_is_closed().return_const(false);
        connection
            .expect_execute_in_transaction()
            .withf(|statement: &str, params: &[SqlParam]| {
                statement.starts_with("INSERT INTO \"error_log\" (tenant_id, error_category, device, timestamp)")
                    && statement.ends_with(
                        "ON CONFLICT (tenant_id, device) DO UPDATE SET timestamp = EXCLUDED.timestamp",
                    )
                    && params
                        == [
                            SqlParam::from("acme"),
                            SqlParam::from("invalid-tenant"),
                            SqlParam::from("sensor-7"),
                            SqlParam::from("2024-03-01T12:00:00.000000Z"),
                        ]
            })
            .times(1)
            .returning(|_, _| Ok(1));

        let repository = PostgresErrorLogRepository::new(
            SharedConnection::new("errors", Arc::new(connection)),
            "error_log",
        )
        .unwrap();

        repository.record(&entry()).await.unwrap();
    }

    #[tokio::test]
    async fn test_record_surfaces_store_failure() {
        let mut connection = MockStoreConnection::new();
        connection.expect_is_closed().return_const(false);
        connection
            .expect_execute_in_transaction()
            .returning(|_, _| Err(StoreFailure::database("42P01", "relation \"error_log\" does not exist")));

        let repository = PostgresErrorLogRepository::new(
            SharedConnection::new("errors", Arc::new(connection)),
            "error_log",
        )
        .unwrap();

        let err = repository.record(&entry()).await.unwrap_err();

        assert!(matches!(err, DomainError::Storage(ref failure) if failure.code.as_deref() == Some("42P01")));
    }

    #[tokio::test]
    async fn test_record_on_closed_connection_fails_fast() {
        let mut connection = MockStoreConnection::new();
        connection.expect_is_closed().return_const(true);
        connection.expect_execute_in_transaction().never();

        let repository = PostgresErrorLogRepository::new(
            SharedConnection::new("errors", Arc::new(connection)),
            "error_log",
        )
        .unwrap();

        assert!(repository.record(&entry()).await.is_err());
    }

    #[tokio::test]
    async fn test_ensure_table_creates_keyed_table() {
        let mut connection = MockStoreConnection::new();
        connection
            .expect_execute_in_transaction()
            .withf(|statement: &str, params: &[SqlParam]| {
                statement.starts_with("CREATE TABLE IF NOT EXISTS \"tenant_errors\" (")
                    && statement.contains("PRIMARY KEY (tenant_id, device)")
                    && params.is_empty()
            })
            .times(1)
            .returning(|_, _| Ok(0));

        let repository = PostgresErrorLogRepository::new(
            SharedConnection::new("errors", Arc::new(connection)),
            "tenant_errors",
        )
        .unwrap();

        repository.ensure_table().await.unwrap();
    }

    #[test]
    fn test_illegal_table_name_is_rejected() {
        let connection = SharedConnection::new("errors", Arc::new(MockStoreConnection::new()));

        let result = PostgresErrorLogRepository::new(connection, "");

        assert!(matches!(result, Err(DomainError::InvalidIdentifier(_))));
    }
}
