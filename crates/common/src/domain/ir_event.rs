use serde_json::{Map, Number, Value};

/// Decoded telemetry event (intermediate representation).
///
/// Every payload entry shares the same `timestamp` and `metadata`. Both maps keep the
/// order in which keys appeared on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct IrEvent {
    pub tenant_id: String,
    /// Device the event came from, empty when the message did not name one.
    pub device: String,
    /// Unix time in seconds, integer or fractional.
    pub timestamp: Number,
    pub metadata: Map<String, Value>,
    pub payload: Map<String, Value>,
}

impl IrEvent {
    pub fn new(tenant_id: impl Into<String>, timestamp: impl Into<Number>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            device: String::new(),
            timestamp: timestamp.into(),
            metadata: Map::new(),
            payload: Map::new(),
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_metric(mut self, metric: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(metric.into(), value.into());
        self
    }
}
