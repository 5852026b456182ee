pub(crate) mod subscriber;
mod topic;

pub use subscriber::{run_mqtt_subscriber, MqttSubscriberConfig};
pub use topic::{channel_topic, parse_topic, ParsedTopic, TOPIC_PREFIX};
