use async_trait::async_trait;
use common::domain::{InsertCommand, SharedConnection, StoreFailure, TelemetryWriter};
use tracing::{debug, instrument};

/// Runs translated inserts against whichever telemetry connection is current.
///
/// Each write is one transaction: committed on success, rolled back before the failure is
/// returned. Failed writes are never retried here.
pub struct StorageGateway {
    connection: SharedConnection,
}

impl StorageGateway {
    pub fn new(connection: SharedConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl TelemetryWriter for StorageGateway {
    #[instrument(skip(self, command), fields(table = %command.table, rows = command.rows.len()))]
    async fn write(&self, command: &InsertCommand) -> Result<u64, StoreFailure> {
        let connection = self.connection.current().await;
        if connection.is_closed() {
            return Err(StoreFailure::connectivity(format!(
                "{} connection is closed",
                self.connection.name()
            )));
        }

        let statement = command.statement();
        let params = command.params();
        debug!(statement = %statement, params = params.len(), "executing insert");

        connection.execute_in_transaction(&statement, &params).await
    }
}
