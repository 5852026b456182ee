use crate::domain::{ConnectionSupervisor, IngestService, StorageGateway, SupervisorConfig};
use crate::mqtt::{run_mqtt_subscriber, MqttSubscriberConfig};
use common::domain::{ConnectionFactory, DatabaseTarget, ErrorLogRepository, SharedConnection};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A long-running worker process, started with the runner's cancellation token
pub type WorkerProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

#[derive(Debug, Clone, Default)]
pub struct StreamWorkerConfig {
    pub mqtt: MqttSubscriberConfig,
    pub supervisor: SupervisorConfig,
}

/// A connection the worker writes through, plus where to reconnect it
pub struct ManagedConnection {
    pub handle: SharedConnection,
    pub target: DatabaseTarget,
}

pub struct StreamWorker {
    service: Arc<IngestService>,
    supervisor: Arc<ConnectionSupervisor>,
    mqtt_config: MqttSubscriberConfig,
}

impl StreamWorker {
    /// Wire the ingest path and the supervisor around the two shared connections
    pub fn new(
        telemetry: ManagedConnection,
        errors: ManagedConnection,
        error_log: Arc<dyn ErrorLogRepository>,
        factory: Arc<dyn ConnectionFactory>,
        config: StreamWorkerConfig,
    ) -> Self {
        info!("Initializing stream worker");

        let gateway = Arc::new(StorageGateway::new(telemetry.handle.clone()));
        let service = Arc::new(IngestService::new(gateway, error_log));

        let supervisor = Arc::new(
            ConnectionSupervisor::new(factory, config.supervisor)
                .supervise(telemetry.handle, telemetry.target)
                .supervise(errors.handle, errors.target),
        );

        info!("Stream worker initialized");

        Self {
            service,
            supervisor,
            mqtt_config: config.mqtt,
        }
    }

    pub fn service(&self) -> Arc<IngestService> {
        Arc::clone(&self.service)
    }

    pub fn into_runner_processes(self) -> Vec<(&'static str, WorkerProcess)> {
        vec![
            (
                "mqtt_subscriber",
                Box::new({
                    let service = self.service;
                    let config = self.mqtt_config;
                    move |ctx| Box::pin(async move { run_mqtt_subscriber(config, service, ctx).await })
                }),
            ),
            (
                "connection_supervisor",
                Box::new({
                    let supervisor = self.supervisor;
                    move |ctx| Box::pin(async move { supervisor.run(ctx).await })
                }),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::Credentials;
    use common::{MockConnectionFactory, MockErrorLogRepository, MockStoreConnection};

    fn managed(name: &str, database: &str) -> ManagedConnection {
        let mut connection = MockStoreConnection::new();
        connection.expect_is_closed().return_const(false);
        ManagedConnection {
            handle: SharedConnection::new(name.to_string(), Arc::new(connection)),
            target: DatabaseTarget {
                credentials: Credentials {
                    username: "postgres".to_string(),
                    password: "postgres".to_string(),
                },
                host: "localhost".to_string(),
                port: 5432,
                database: database.to_string(),
            },
        }
    }

    fn worker() -> StreamWorker {
        StreamWorker::new(
            managed("telemetry", "tsdb"),
            managed("errors", "tsdb_errors"),
            Arc::new(MockErrorLogRepository::new()),
            Arc::new(MockConnectionFactory::new()),
            StreamWorkerConfig::default(),
        )
    }

    #[test]
    fn test_into_runner_processes_names() {
        let names: Vec<&str> = worker()
            .into_runner_processes()
            .into_iter()
            .map(|(name, _)| name)
            .collect();

        assert_eq!(names, vec!["mqtt_subscriber", "connection_supervisor"]);
    }

    #[tokio::test]
    async fn test_processes_stop_when_cancelled() {
        let ctx = CancellationToken::new();
        ctx.cancel();

        for (name, process) in worker().into_runner_processes() {
            let result = process(ctx.clone()).await;
            assert!(result.is_ok(), "{} failed: {:?}", name, result);
        }
    }
}
