use crate::domain::{IngestOutcome, IngestService};
use crate::mqtt::{channel_topic, parse_topic};
use common::domain::{DomainError, DomainResult};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSubscriberConfig {
    /// Broker address: `mqtt://host:port`, `tcp://host:port` or `host[:port]`
    pub broker_url: String,

    /// Ingest channel; the subscription topic is `ingest/stream/{channel}`
    pub channel: String,

    /// Keep-alive interval (default: 30 seconds)
    pub keep_alive_secs: u64,

    /// Delay before reconnecting to the broker (default: 5 seconds)
    pub retry_delay_secs: u64,

    /// Maximum consecutive reconnect attempts, 0 for unlimited (default: 0)
    pub max_retry_attempts: u32,
}

impl Default for MqttSubscriberConfig {
    fn default() -> Self {
        Self {
            broker_url: "mqtt://localhost:1883".to_string(),
            channel: "default".to_string(),
            keep_alive_secs: 30,
            retry_delay_secs: 5,
            max_retry_attempts: 0,
        }
    }
}

impl MqttSubscriberConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Run the MQTT subscriber that hosts the ingest loop
///
/// Subscribes to `ingest/stream/{channel}` and hands every delivered payload to the
/// ingest service, one at a time. Broker failures are retried with a fixed delay; the
/// subscriber only returns an error when the configured retry budget is spent.
#[instrument(name = "mqtt_subscriber", skip_all, fields(channel = %config.channel))]
pub async fn run_mqtt_subscriber(
    config: MqttSubscriberConfig,
    service: Arc<IngestService>,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    let topic = channel_topic(&config.channel)?;

    info!(
        broker_url = %config.broker_url,
        topic = %topic,
        "starting MQTT subscriber"
    );

    let mut retry_count: u32 = 0;

    loop {
        if ctx.is_cancelled() {
            debug!("MQTT subscriber cancelled before connection");
            break;
        }

        match run_mqtt_connection(&config, &topic, &ctx, &service).await {
            Ok(()) => {
                debug!("MQTT subscriber stopped cleanly");
                break;
            }
            Err(e) => {
                error!(error = %e, "MQTT connection error");

                retry_count += 1;
                if config.max_retry_attempts > 0 && retry_count >= config.max_retry_attempts {
                    error!(
                        max_retries = config.max_retry_attempts,
                        "max retry attempts reached, stopping MQTT subscriber"
                    );
                    return Err(anyhow::anyhow!(
                        "MQTT subscriber gave up after {} attempts: {}",
                        retry_count,
                        e
                    ));
                }

                warn!(
                    attempt = retry_count,
                    max_attempts = config.max_retry_attempts,
                    "retrying MQTT connection"
                );

                tokio::select! {
                    _ = ctx.cancelled() => break,
                    _ = tokio::time::sleep(config.retry_delay()) => {}
                }
            }
        }
    }

    info!("MQTT subscriber stopped");
    Ok(())
}

/// Run a single MQTT connection session
#[instrument(name = "mqtt_connection", skip_all, fields(broker_url = %config.broker_url))]
async fn run_mqtt_connection(
    config: &MqttSubscriberConfig,
    topic: &str,
    ctx: &CancellationToken,
    service: &IngestService,
) -> DomainResult<()> {
    let (host, port) = parse_broker_url(&config.broker_url)?;

    let client_id = format!("StreamProcessor.{}", chrono::Utc::now().timestamp());
    let mut mqtt_options = MqttOptions::new(&client_id, host, port);
    mqtt_options.set_keep_alive(config.keep_alive());
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    client
        .subscribe(topic, QoS::AtLeastOnce)
        .await
        .map_err(|e| DomainError::Transport(format!("failed to subscribe: {}", e)))?;

    info!(client_id = %client_id, topic = %topic, "subscribed to MQTT topic");

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                debug!("shutdown signal received");
                let _ = client.disconnect().await;
                return Ok(());
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        handle_mqtt_message(&publish.topic, &publish.payload, service).await;
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        debug!("subscription acknowledged");
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to MQTT broker");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(DomainError::Transport(format!(
                            "MQTT event loop error: {}",
                            e
                        )));
                    }
                }
            }
        }
    }
}

/// Handle one delivered message
///
/// Each message gets its own root span so its trace is independent of the subscriber's.
pub(crate) async fn handle_mqtt_message(
    topic: &str,
    payload: &[u8],
    service: &IngestService,
) -> Option<IngestOutcome> {
    let span = info_span!(
        parent: Span::none(),
        "ingest_message",
        topic = %topic,
        payload_size = payload.len(),
        channel = tracing::field::Empty,
    );

    async {
        match parse_topic(topic) {
            Ok(parsed) => {
                Span::current().record("channel", parsed.channel.as_str());
            }
            Err(e) => {
                warn!(error = %e, "unexpected MQTT topic, skipping message");
                return None;
            }
        }

        let outcome = service.ingest(payload).await;
        debug!(outcome = ?outcome, "message handled");
        Some(outcome)
    }
    .instrument(span)
    .await
}

/// Parse broker URL in format mqtt://host:port or tcp://host:port or host:port
fn parse_broker_url(url: &str) -> DomainResult<(&str, u16)> {
    let url = url.trim_start_matches("mqtt://");
    let url = url.trim_start_matches("tcp://");

    let parts: Vec<&str> = url.split(':').collect();
    match parts.as_slice() {
        [host] if !host.is_empty() => Ok((*host, 1883)),
        [host, port] if !host.is_empty() => {
            let port = port.parse::<u16>().map_err(|_| {
                DomainError::InvalidTransportConfig(format!("Invalid port in broker URL: {}", port))
            })?;
            Ok((*host, port))
        }
        _ => Err(DomainError::InvalidTransportConfig(format!(
            "Invalid broker URL format: {}",
            url
        ))),
    }
}
