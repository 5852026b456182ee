use common::domain::{DomainError, DomainResult};

/// Every ingest channel lives under this prefix
pub const TOPIC_PREFIX: &str = "ingest/stream";

/// Parsed MQTT topic naming an ingest channel
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTopic {
    pub channel: String,
}

/// Build the subscription topic for a channel: `ingest/stream/{channel}`
///
/// The channel must be a single, non-empty topic level without wildcards.
pub fn channel_topic(channel: &str) -> DomainResult<String> {
    let channel = channel.trim();

    if channel.is_empty() {
        return Err(DomainError::InvalidTransportConfig(
            "Channel cannot be empty".to_string(),
        ));
    }

    if channel.contains(['/', '+', '#']) {
        return Err(DomainError::InvalidTransportConfig(format!(
            "Invalid channel '{}': must be a single topic level without wildcards",
            channel
        )));
    }

    Ok(format!("{}/{}", TOPIC_PREFIX, channel))
}

/// Parse an MQTT topic in the format `ingest/stream/{channel}`
///
/// # Examples
/// ```
/// use stream_worker::mqtt::parse_topic;
///
/// let parsed = parse_topic("ingest/stream/default").unwrap();
/// assert_eq!(parsed.channel, "default");
/// ```
pub fn parse_topic(topic: &str) -> DomainResult<ParsedTopic> {
    let channel = topic
        .strip_prefix(TOPIC_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| {
            DomainError::InvalidTransportConfig(format!(
                "Invalid topic format '{}': expected '{}/{{channel}}'",
                topic, TOPIC_PREFIX
            ))
        })?;

    if channel.is_empty() || channel.contains('/') {
        return Err(DomainError::InvalidTransportConfig(format!(
            "Invalid channel in topic '{}'",
            topic
        )));
    }

    Ok(ParsedTopic {
        channel: channel.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_topic() {
        assert_eq!(channel_topic("default").unwrap(), "ingest/stream/default");
        assert_eq!(channel_topic(" fleet-a ").unwrap(), "ingest/stream/fleet-a");
    }

    #[test]
    fn test_channel_topic_rejects_empty() {
        assert!(channel_topic("").is_err());
        assert!(channel_topic("   ").is_err());
    }

    #[test]
    fn test_channel_topic_rejects_wildcards_and_levels() {
        assert!(channel_topic("a/b").is_err());
        assert!(channel_topic("+").is_err());
        assert!(channel_topic("#").is_err());
    }

    #[test]
    fn test_parse_valid_topic() {
        let parsed = parse_topic("ingest/stream/fleet-a").unwrap();
        assert_eq!(parsed.channel, "fleet-a");
    }

    #[test]
    fn test_parse_topic_wrong_prefix() {
        assert!(parse_topic("ingest/batch/fleet-a").is_err());
        assert!(parse_topic("ingest/streams/fleet-a").is_err());
        assert!(parse_topic("").is_err());
    }

    #[test]
    fn test_parse_topic_empty_or_nested_channel() {
        assert!(parse_topic("ingest/stream/").is_err());
        assert!(parse_topic("ingest/stream/a/b").is_err());
    }
}
