use common::domain::{Column, ErrorCategory, InsertCommand, IrEvent, SqlParam};
use common::postgres::{quote_identifier, IdentifierError};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Rejections detected before any storage call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("event payload is empty")]
    EmptyPayload,

    #[error("invalid tenant id: {0}")]
    InvalidTenant(IdentifierError),

    #[error("invalid metadata key: {0}")]
    InvalidMetadataKey(IdentifierError),
}

impl ValidationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ValidationError::EmptyPayload => ErrorCategory::EmptyPayload,
            ValidationError::InvalidTenant(_) => ErrorCategory::InvalidTenant,
            ValidationError::InvalidMetadataKey(_) => ErrorCategory::InvalidMetadataKey,
        }
    }
}

/// Metadata column layout derived from one event.
///
/// Starts with the event's metadata keys in order, followed by every string-valued metric
/// that is not already a metadata key, in payload order. The base `value` column is
/// numeric, so string metrics travel in a column of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    metadata_keys: Vec<String>,
    promotions: HashMap<String, usize>,
}

impl ColumnLayout {
    pub fn derive(event: &IrEvent) -> Self {
        let mut metadata_keys: Vec<String> = event.metadata.keys().cloned().collect();
        let mut positions: HashMap<&str, usize> = event
            .metadata
            .keys()
            .enumerate()
            .map(|(i, key)| (key.as_str(), i))
            .collect();
        let mut promotions = HashMap::new();

        for (metric, value) in &event.payload {
            if !value.is_string() {
                continue;
            }
            let index = *positions.entry(metric.as_str()).or_insert_with(|| {
                metadata_keys.push(metric.clone());
                metadata_keys.len() - 1
            });
            promotions.insert(metric.clone(), index);
        }

        Self {
            metadata_keys,
            promotions,
        }
    }

    pub fn metadata_keys(&self) -> &[String] {
        &self.metadata_keys
    }

    /// Metadata slot a string-valued metric is written to
    pub fn promoted_index(&self, metric: &str) -> Option<usize> {
        self.promotions.get(metric).copied()
    }

    /// Number of columns in the insert header
    pub fn width(&self) -> usize {
        3 + self.metadata_keys.len()
    }
}

/// Translate one event into a single multi-row insert against the tenant's table.
///
/// One row per payload entry, in payload order. Non-string metrics go to `value` with the
/// shared metadata. A string metric puts `0` in `value` and its text in its promoted
/// metadata slot for that row only; promoted slots are `NULL` in every other row.
pub fn build(tenant_id: &str, event: &IrEvent) -> Result<InsertCommand, ValidationError> {
    if event.payload.is_empty() {
        return Err(ValidationError::EmptyPayload);
    }

    let table = quote_identifier(tenant_id).map_err(ValidationError::InvalidTenant)?;
    let layout = ColumnLayout::derive(event);

    let mut columns = vec![Column::Time, Column::Metric, Column::Value];
    for key in layout.metadata_keys() {
        let identifier = quote_identifier(key).map_err(ValidationError::InvalidMetadataKey)?;
        columns.push(Column::Metadata(identifier));
    }

    let shared_metadata: Vec<SqlParam> = layout
        .metadata_keys()
        .iter()
        .map(|key| event.metadata.get(key).map_or(SqlParam::Null, SqlParam::from))
        .collect();
    let timestamp = SqlParam::Number(event.timestamp.clone());

    let rows = event
        .payload
        .iter()
        .map(|(metric, value)| {
            let mut row = Vec::with_capacity(layout.width());
            row.push(timestamp.clone());
            row.push(SqlParam::Text(metric.clone()));

            match (value, layout.promoted_index(metric)) {
                (Value::String(text), Some(index)) => {
                    row.push(SqlParam::from(0_i64));
                    let mut metadata = shared_metadata.clone();
                    metadata[index] = SqlParam::Text(text.clone());
                    row.extend(metadata);
                }
                _ => {
                    row.push(SqlParam::from(value));
                    row.extend(shared_metadata.iter().cloned());
                }
            }

            row
        })
        .collect();

    Ok(InsertCommand {
        table,
        columns,
        rows,
    })
}
