mod config;

use anyhow::Context;
use common::domain::{ConnectionFactory, DatabaseTarget, SharedConnection};
use common::postgres::PostgresConnectionFactory;
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use config::ServiceConfig;
use sif_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use stream_worker::{ManagedConnection, PostgresErrorLogRepository, StreamWorker};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    // Initialize configuration and tracing
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize telemetry (tracing + OpenTelemetry for traces and logs)
    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        channel = %config.channel,
        broker_url = %config.broker_url(),
        otel_enabled = config.otel_enabled,
        "Starting sif-stream service"
    );
    debug!("Configuration: {:?}", config);

    let factory: Arc<dyn ConnectionFactory> =
        Arc::new(PostgresConnectionFactory::new(config.connect_timeout()));

    // Both connections must come up before anything is consumed
    let (telemetry, errors) = match open_connections(&config, factory.as_ref()).await {
        Ok(connections) => connections,
        Err(e) => {
            error!("Failed to open storage connections: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let error_log = match initialize_error_log(&config, errors.handle.clone()).await {
        Ok(repository) => repository,
        Err(e) => {
            error!("Failed to initialize error log: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let telemetry_handle = telemetry.handle.clone();
    let errors_handle = errors.handle.clone();

    let stream_worker = StreamWorker::new(
        telemetry,
        errors,
        Arc::new(error_log),
        factory,
        config.stream_worker_config(),
    );

    // Build runner with all processes
    let mut runner = Runner::new();
    for (name, process) in stream_worker.into_runner_processes() {
        runner = runner.with_named_process(name, process);
    }

    runner = runner
        .with_closer(move || {
            Box::pin(async move {
                info!("Running cleanup tasks...");
                telemetry_handle.close().await;
                errors_handle.close().await;

                // Shutdown telemetry and flush pending traces and logs
                shutdown_telemetry(telemetry_providers);

                info!("Cleanup complete");
                Ok(())
            })
        })
        .with_closer_timeout(Duration::from_secs(10));

    // Run the service
    runner.run().await;
}

async fn open_connections(
    config: &ServiceConfig,
    factory: &dyn ConnectionFactory,
) -> anyhow::Result<(ManagedConnection, ManagedConnection)> {
    let postgres = config.postgres_config();

    let telemetry = open_connection(
        factory,
        "telemetry",
        postgres.target(&config.ts_database),
    )
    .await?;
    let errors = open_connection(
        factory,
        "errors",
        postgres.target(&config.ts_database_errors),
    )
    .await?;

    Ok((telemetry, errors))
}

async fn open_connection(
    factory: &dyn ConnectionFactory,
    name: &'static str,
    target: DatabaseTarget,
) -> anyhow::Result<ManagedConnection> {
    let connection = factory
        .create(&target)
        .await
        .with_context(|| format!("connecting {} database {}", name, target))?;

    info!(connection = name, target = %target, "storage connection established");

    Ok(ManagedConnection {
        handle: SharedConnection::new(name, connection),
        target,
    })
}

async fn initialize_error_log(
    config: &ServiceConfig,
    connection: SharedConnection,
) -> anyhow::Result<PostgresErrorLogRepository> {
    let repository = PostgresErrorLogRepository::new(connection, &config.error_log_table)
        .context("invalid error log table name")?;

    if config.ensure_error_log_table {
        repository
            .ensure_table()
            .await
            .context("creating error log table")?;
    }

    Ok(repository)
}
