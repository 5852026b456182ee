use crate::domain::{build, classify, decode, recover_attribution, DecodeError};
use common::domain::{ClassifiedError, ErrorCategory, ErrorLogRepository, TelemetryWriter};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Written to the tenant's table.
    Stored { rows: u64 },
    /// Dropped; the category was logged against the tenant or to the operational log.
    Rejected { category: ErrorCategory },
}

/// Domain service that turns one raw message into a stored set of rows or a logged error.
///
/// Flow:
/// 1. Decode the bytes into an event
/// 2. Build the insert for the event's tenant
/// 3. Write it through the telemetry writer
/// 4. On any failure, classify and route to the error store or the operational log
///
/// Nothing here returns an error to the caller: every failure ends the message's journey
/// and the next message is processed normally.
pub struct IngestService {
    writer: Arc<dyn TelemetryWriter>,
    error_log: Arc<dyn ErrorLogRepository>,
}

impl IngestService {
    pub fn new(writer: Arc<dyn TelemetryWriter>, error_log: Arc<dyn ErrorLogRepository>) -> Self {
        Self { writer, error_log }
    }

    #[instrument(skip(self, raw), fields(payload_size = raw.len()))]
    pub async fn ingest(&self, raw: &[u8]) -> IngestOutcome {
        let event = match decode(raw) {
            Ok(event) => event,
            Err(e) => return self.reject_undecodable(raw, e).await,
        };

        debug!(
            tenant_id = %event.tenant_id,
            device = %event.device,
            metrics = event.payload.len(),
            "decoded event"
        );

        let command = match build(&event.tenant_id, &event) {
            Ok(command) => command,
            Err(e) => {
                let category = e.category();
                warn!(
                    tenant_id = %event.tenant_id,
                    device = %event.device,
                    category = %category,
                    error = %e,
                    "event failed validation, dropping"
                );
                self.record(&event.tenant_id, &event.device, category).await;
                return IngestOutcome::Rejected { category };
            }
        };

        match self.writer.write(&command).await {
            Ok(rows) => {
                debug!(tenant_id = %event.tenant_id, rows, "event stored");
                IngestOutcome::Stored { rows }
            }
            Err(failure) => {
                let classified = classify(&failure);
                let category = classified.category;

                if category.is_tenant_attributable() {
                    warn!(
                        tenant_id = %event.tenant_id,
                        device = %event.device,
                        category = %category,
                        diagnostic = %classified.diagnostic,
                        "storage rejected event, dropping"
                    );
                    self.record(&event.tenant_id, &event.device, category).await;
                } else {
                    error!(
                        tenant_id = %event.tenant_id,
                        device = %event.device,
                        category = %category,
                        diagnostic = %classified.diagnostic,
                        "telemetry store unavailable, event dropped"
                    );
                }

                IngestOutcome::Rejected { category }
            }
        }
    }

    async fn reject_undecodable(&self, raw: &[u8], err: DecodeError) -> IngestOutcome {
        let category = ErrorCategory::DecodeFailure;

        match recover_attribution(raw) {
            Some(attribution) => {
                warn!(
                    tenant_id = %attribution.tenant_id,
                    device = %attribution.device,
                    error = %err,
                    "failed to decode message, dropping"
                );
                self.record(&attribution.tenant_id, &attribution.device, category)
                    .await;
            }
            None => {
                error!(error = %err, "failed to decode unattributable message, dropping");
            }
        }

        IngestOutcome::Rejected { category }
    }

    async fn record(&self, tenant_id: &str, device: &str, category: ErrorCategory) {
        let entry = ClassifiedError::new(tenant_id, device, category);
        if let Err(e) = self.error_log.record(&entry).await {
            error!(
                tenant_id = %tenant_id,
                device = %device,
                category = %category,
                error = %e,
                "failed to record error"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{DomainError, StoreFailure};
    use common::{MockErrorLogRepository, MockTelemetryWriter};

    const SCENARIO_A: &[u8] = br#"{"app_id":"acme","device":"sensor-7","data":{"time":1000,"metadata":{"region":"us"},"payload":{"cpu":0.5}}}"#;

    fn service(writer: MockTelemetryWriter, error_log: MockErrorLogRepository) -> IngestService {
        IngestService::new(Arc::new(writer), Arc::new(error_log))
    }

    fn expect_recorded(
        error_log: &mut MockErrorLogRepository,
        tenant: &'static str,
        device: &'static str,
        category: ErrorCategory,
    ) {
        error_log
            .expect_record()
            .withf(move |entry: &ClassifiedError| {
                entry.tenant_id == tenant && entry.device == device && entry.category == category
            })
            .times(1)
            .returning(|_| Ok(()));
    }

    #[tokio::test]
    async fn test_valid_event_is_stored() {
        let mut writer = MockTelemetryWriter::new();
        writer
            .expect_write()
            .withf(|command| {
                command.table.as_str() == "\"acme\""
                    && command.column_names() == vec!["time", "metric", "value", "\"region\""]
            })
            .times(1)
            .returning(|_| Ok(1));
        let mut error_log = MockErrorLogRepository::new();
        error_log.expect_record().never();

        let outcome = service(writer, error_log).ingest(SCENARIO_A).await;

        assert_eq!(outcome, IngestOutcome::Stored { rows: 1 });
    }

    #[tokio::test]
    async fn test_empty_payload_is_logged_without_write() {
        let mut writer = MockTelemetryWriter::new();
        writer.expect_write().never();
        let mut error_log = MockErrorLogRepository::new();
        expect_recorded(&mut error_log, "acme", "sensor-7", ErrorCategory::EmptyPayload);

        let raw = br#"{"app_id":"acme","device":"sensor-7","data":{"time":1000,"payload":{}}}"#;
        let outcome = service(writer, error_log).ingest(raw).await;

        assert_eq!(
            outcome,
            IngestOutcome::Rejected {
                category: ErrorCategory::EmptyPayload
            }
        );
    }

    #[tokio::test]
    async fn test_illegal_tenant_is_logged_without_write() {
        let mut writer = MockTelemetryWriter::new();
        writer.expect_write().never();
        let mut error_log = MockErrorLogRepository::new();
        expect_recorded(&mut error_log, "ac\tme", "", ErrorCategory::InvalidTenant);

        let raw = br#"{"app_id":"ac\tme","data":{"time":1000,"payload":{"cpu":1}}}"#;
        let outcome = service(writer, error_log).ingest(raw).await;

        assert_eq!(
            outcome,
            IngestOutcome::Rejected {
                category: ErrorCategory::InvalidTenant
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_table_is_logged_once_against_tenant() {
        let mut writer = MockTelemetryWriter::new();
        writer.expect_write().times(1).returning(|_| {
            Err(StoreFailure::database(
                "42P01",
                "relation \"acme\" does not exist",
            ))
        });
        let mut error_log = MockErrorLogRepository::new();
        expect_recorded(&mut error_log, "acme", "sensor-7", ErrorCategory::InvalidTenant);

        let outcome = service(writer, error_log).ingest(SCENARIO_A).await;

        assert_eq!(
            outcome,
            IngestOutcome::Rejected {
                category: ErrorCategory::InvalidTenant
            }
        );
    }

    #[tokio::test]
    async fn test_string_in_numeric_column_is_logged() {
        let mut writer = MockTelemetryWriter::new();
        writer.expect_write().times(1).returning(|_| {
            Err(StoreFailure::database(
                "22P02",
                "invalid input syntax for type double precision: \"true\"",
            ))
        });
        let mut error_log = MockErrorLogRepository::new();
        expect_recorded(
            &mut error_log,
            "acme",
            "sensor-7",
            ErrorCategory::UnexpectedTypeForNumber,
        );

        let outcome = service(writer, error_log).ingest(SCENARIO_A).await;

        assert_eq!(
            outcome,
            IngestOutcome::Rejected {
                category: ErrorCategory::UnexpectedTypeForNumber
            }
        );
    }

    #[tokio::test]
    async fn test_store_faults_are_not_attributed_to_tenant() {
        for failure in [
            StoreFailure::connectivity("connection closed"),
            StoreFailure::driver("unexpected message from server"),
        ] {
            let mut writer = MockTelemetryWriter::new();
            writer
                .expect_write()
                .times(1)
                .returning(move |_| Err(failure.clone()));
            let mut error_log = MockErrorLogRepository::new();
            error_log.expect_record().never();

            let outcome = service(writer, error_log).ingest(SCENARIO_A).await;

            assert!(matches!(
                outcome,
                IngestOutcome::Rejected {
                    category: ErrorCategory::Connectivity | ErrorCategory::InfrastructureFault
                }
            ));
        }
    }

    #[tokio::test]
    async fn test_decode_failure_with_tenant_is_recorded() {
        let mut writer = MockTelemetryWriter::new();
        writer.expect_write().never();
        let mut error_log = MockErrorLogRepository::new();
        expect_recorded(&mut error_log, "acme", "sensor-7", ErrorCategory::DecodeFailure);

        let raw = br#"{"app_id":"acme","device":"sensor-7","data":{"time":"noon","payload":{}}}"#;
        let outcome = service(writer, error_log).ingest(raw).await;

        assert_eq!(
            outcome,
            IngestOutcome::Rejected {
                category: ErrorCategory::DecodeFailure
            }
        );
    }

    #[tokio::test]
    async fn test_unattributable_message_is_only_logged() {
        let mut writer = MockTelemetryWriter::new();
        writer.expect_write().never();
        let mut error_log = MockErrorLogRepository::new();
        error_log.expect_record().never();

        let outcome = service(writer, error_log).ingest(b"\xff\x00garbage").await;

        assert_eq!(
            outcome,
            IngestOutcome::Rejected {
                category: ErrorCategory::DecodeFailure
            }
        );
    }

    #[tokio::test]
    async fn test_error_log_failure_does_not_escalate() {
        let mut writer = MockTelemetryWriter::new();
        writer.expect_write().times(1).returning(|_| {
            Err(StoreFailure::database(
                "42703",
                "column \"region\" of relation \"acme\" does not exist",
            ))
        });
        let mut error_log = MockErrorLogRepository::new();
        error_log.expect_record().times(1).returning(|_| {
            Err(DomainError::Storage(StoreFailure::connectivity(
                "connection closed",
            )))
        });

        let outcome = service(writer, error_log).ingest(SCENARIO_A).await;

        assert_eq!(
            outcome,
            IngestOutcome::Rejected {
                category: ErrorCategory::InvalidMetadataKey
            }
        );
    }

    #[tokio::test]
    async fn test_next_message_is_processed_after_a_rejection() {
        let mut writer = MockTelemetryWriter::new();
        writer.expect_write().times(1).returning(|_| Ok(1));
        let mut error_log = MockErrorLogRepository::new();
        error_log.expect_record().never();
        let service = service(writer, error_log);

        let first = service.ingest(b"not json").await;
        let second = service.ingest(SCENARIO_A).await;

        assert!(matches!(first, IngestOutcome::Rejected { .. }));
        assert_eq!(second, IngestOutcome::Stored { rows: 1 });
    }
}
