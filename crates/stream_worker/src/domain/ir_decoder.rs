use common::domain::IrEvent;
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),

    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Tenant and device recovered from a message that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub tenant_id: String,
    pub device: String,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(alias = "tenant_id")]
    app_id: Option<String>,
    #[serde(default)]
    device: Option<String>,
    data: Option<WireData>,
}

#[derive(Debug, Deserialize)]
struct WireData {
    time: Option<Number>,
    #[serde(default)]
    metadata: Map<String, Value>,
    payload: Option<Map<String, Value>>,
}

/// Decode one raw transport payload into an [`IrEvent`].
///
/// Wire shape:
///
/// ```json
/// {"app_id": "acme", "device": "sensor-7",
///  "data": {"time": 1000, "metadata": {"region": "us"}, "payload": {"cpu": 0.5}}}
/// ```
///
/// `tenant_id` is accepted in place of `app_id`; `device` and `metadata` are optional.
/// Metadata and payload values are not type-checked here, an object value is left for the
/// storage layer to reject. An empty payload decodes fine and is rejected when the insert
/// is built.
pub fn decode(raw: &[u8]) -> Result<IrEvent, DecodeError> {
    let text = std::str::from_utf8(raw)?;
    let message: WireMessage = serde_json::from_str(text)?;

    let tenant_id = message
        .app_id
        .filter(|id| !id.is_empty())
        .ok_or(DecodeError::MissingField("app_id"))?;
    let data = message.data.ok_or(DecodeError::MissingField("data"))?;
    let timestamp = data.time.ok_or(DecodeError::MissingField("data.time"))?;
    let payload = data.payload.ok_or(DecodeError::MissingField("data.payload"))?;

    Ok(IrEvent {
        tenant_id,
        device: message.device.unwrap_or_default(),
        timestamp,
        metadata: data.metadata,
        payload,
    })
}

/// Best-effort recovery of the tenant behind an undecodable message.
///
/// Returns `None` unless the bytes are a JSON object with a non-empty string `app_id`
/// (or `tenant_id`). A non-string `device` is treated as absent.
pub fn recover_attribution(raw: &[u8]) -> Option<Attribution> {
    let value: Value = serde_json::from_slice(raw).ok()?;
    let object = value.as_object()?;

    let tenant_id = object
        .get("app_id")
        .or_else(|| object.get("tenant_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())?;
    let device = object.get("device").and_then(Value::as_str).unwrap_or_default();

    Some(Attribution {
        tenant_id: tenant_id.to_string(),
        device: device.to_string(),
    })
}
