use common::domain::{ConnectionError, ConnectionFactory, DatabaseTarget, SharedConnection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Seconds between health probes (default: 60)
    pub probe_interval_secs: u64,

    /// Upper bound on one reconnect attempt (default: 10)
    pub connect_timeout_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 60,
            connect_timeout_secs: 10,
        }
    }
}

impl SupervisorConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

struct Supervised {
    handle: SharedConnection,
    target: DatabaseTarget,
    state: ConnectionState,
}

/// Periodically probes each managed connection and replaces any that has closed.
///
/// Per connection: `Connected` moves to `Reconnecting` when a probe finds the session
/// closed. A successful reconnect swaps the new session into the shared handle and returns
/// to `Connected`; a failed or timed-out one stays `Reconnecting` until the next probe.
/// Supervision never gives up while the process runs.
pub struct ConnectionSupervisor {
    factory: Arc<dyn ConnectionFactory>,
    config: SupervisorConfig,
    connections: Mutex<Vec<Supervised>>,
}

impl ConnectionSupervisor {
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: SupervisorConfig) -> Self {
        Self {
            factory,
            config,
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Add a connection to supervise; `target` is what reconnects are made against
    pub fn supervise(mut self, handle: SharedConnection, target: DatabaseTarget) -> Self {
        self.connections.get_mut().push(Supervised {
            handle,
            target,
            state: ConnectionState::Connected,
        });
        self
    }

    pub async fn states(&self) -> Vec<(String, ConnectionState)> {
        self.connections
            .lock()
            .await
            .iter()
            .map(|supervised| (supervised.handle.name().to_string(), supervised.state))
            .collect()
    }

    /// Run one health probe over every supervised connection
    pub async fn probe(&self) {
        let mut connections = self.connections.lock().await;
        for supervised in connections.iter_mut() {
            self.probe_connection(supervised).await;
        }
    }

    async fn probe_connection(&self, supervised: &mut Supervised) {
        let name = supervised.handle.name().to_string();

        if !supervised.handle.current().await.is_closed() {
            debug!(connection = %name, "connection healthy");
            supervised.state = ConnectionState::Connected;
            return;
        }

        if supervised.state == ConnectionState::Connected {
            warn!(connection = %name, "connection closed, reconnecting");
            supervised.state = ConnectionState::Reconnecting;
        }

        let timeout = self.config.connect_timeout();
        let attempt = tokio::time::timeout(timeout, self.factory.create(&supervised.target)).await;

        let result = match attempt {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout {
                target: supervised.target.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        };

        match result {
            Ok(connection) => {
                let previous = supervised.handle.replace(connection).await;
                previous.close();
                supervised.state = ConnectionState::Connected;
                info!(connection = %name, database_target = %supervised.target, "reconnected");
            }
            Err(e) => {
                error!(
                    connection = %name,
                    error = %e,
                    retry_in_secs = self.config.probe_interval_secs,
                    "reconnect failed"
                );
            }
        }
    }

    /// Probe on a fixed period until cancelled. The first probe fires one period after start.
    pub async fn run(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        let period = self.config.probe_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let connections = self.connections.lock().await.len();
        info!(
            probe_interval_secs = self.config.probe_interval_secs,
            connections,
            "starting connection supervisor"
        );

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    debug!("connection supervisor cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    self.probe().await;
                }
            }
        }

        info!("connection supervisor stopped");
        Ok(())
    }
}
