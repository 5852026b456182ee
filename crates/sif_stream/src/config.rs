use common::postgres::PostgresConfig;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stream_worker::{MqttSubscriberConfig, StreamWorkerConfig, SupervisorConfig};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Deployment environment; `development` points the broker at localhost
    #[serde(default = "default_environment")]
    pub environment: String,

    // MQTT configuration
    /// Broker URL carrying the ingest stream
    #[serde(default = "default_ingest_stream_url")]
    pub ingest_stream_url: String,

    /// Ingest channel, subscribed as `ingest/stream/{channel}`
    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    /// Delay between broker reconnect attempts in seconds
    #[serde(default = "default_mqtt_retry_delay_secs")]
    pub mqtt_retry_delay_secs: u64,

    /// Broker reconnect attempts before giving up, 0 for unlimited
    #[serde(default)]
    pub mqtt_max_retry_attempts: u32,

    // Time-series storage configuration
    #[serde(default = "default_ts_host")]
    pub ts_host: String,

    #[serde(default = "default_ts_port")]
    pub ts_port: u16,

    #[serde(default = "default_ts_user")]
    pub ts_user: String,

    #[serde(default = "default_ts_password")]
    pub ts_password: String,

    /// Database holding the per-tenant telemetry tables
    #[serde(default = "default_ts_database")]
    pub ts_database: String,

    /// Database holding the error log
    #[serde(default = "default_ts_database_errors")]
    pub ts_database_errors: String,

    #[serde(default = "default_error_log_table")]
    pub error_log_table: String,

    /// Create the error log table at startup when it is missing
    #[serde(default = "default_ensure_error_log_table")]
    pub ensure_error_log_table: bool,

    // Supervisor configuration
    /// Seconds between connection health probes
    #[serde(default = "default_health_probe_interval_secs")]
    pub health_probe_interval_secs: u64,

    /// Bound on each connection attempt in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    // OpenTelemetry configuration
    /// OpenTelemetry OTLP endpoint (gRPC)
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Enable OpenTelemetry export
    #[serde(default)]
    pub otel_enabled: bool,

    /// Service name for OpenTelemetry resource
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

// MQTT defaults
fn default_ingest_stream_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_channel() -> String {
    "default".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    30
}

fn default_mqtt_retry_delay_secs() -> u64 {
    5
}

// Storage defaults
fn default_ts_host() -> String {
    "localhost".to_string()
}

fn default_ts_port() -> u16 {
    5432
}

fn default_ts_user() -> String {
    "postgres".to_string()
}

fn default_ts_password() -> String {
    "postgres".to_string()
}

fn default_ts_database() -> String {
    "tsdb".to_string()
}

fn default_ts_database_errors() -> String {
    "tsdb_errors".to_string()
}

fn default_error_log_table() -> String {
    "error_log".to_string()
}

fn default_ensure_error_log_table() -> bool {
    true
}

// Supervisor defaults
fn default_health_probe_interval_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

// OpenTelemetry defaults
fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "sif-stream".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("SIF"))
            .build()?
            .try_deserialize()
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Broker URL to connect to, with the host forced to localhost in development
    pub fn broker_url(&self) -> String {
        if !self.is_development() {
            return self.ingest_stream_url.clone();
        }

        let (scheme, address) = match self.ingest_stream_url.split_once("://") {
            Some((scheme, address)) => (format!("{}://", scheme), address),
            None => (String::new(), self.ingest_stream_url.as_str()),
        };

        match address.split_once(':') {
            Some((_, port)) => format!("{}localhost:{}", scheme, port),
            None => format!("{}localhost", scheme),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.ts_host.clone(),
            port: self.ts_port,
            username: self.ts_user.clone(),
            password: self.ts_password.clone(),
        }
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn stream_worker_config(&self) -> StreamWorkerConfig {
        StreamWorkerConfig {
            mqtt: MqttSubscriberConfig {
                broker_url: self.broker_url(),
                channel: self.channel.clone(),
                keep_alive_secs: self.mqtt_keep_alive_secs,
                retry_delay_secs: self.mqtt_retry_delay_secs,
                max_retry_attempts: self.mqtt_max_retry_attempts,
            },
            supervisor: SupervisorConfig {
                probe_interval_secs: self.health_probe_interval_secs,
                connect_timeout_secs: self.connect_timeout_secs,
            },
        }
    }
}
