use crate::domain::CommandTarget;

/// Subscription pattern for inbound bin telemetry
pub const TELEMETRY_TOPIC: &str = "cleanroute/bins/+/telemetry";

const TOPIC_PREFIX: &str = "cleanroute/bins";

/// Bin id carried in the third segment of a topic such as `cleanroute/bins/B001/telemetry`
///
/// Returns `None` when the topic is too short or the segment is empty.
///
/// # Examples
/// ```
/// use common::mqtt::topic_bin_id;
///
/// assert_eq!(topic_bin_id("cleanroute/bins/B001/telemetry"), Some("B001"));
/// assert_eq!(topic_bin_id("cleanroute/bins"), None);
/// ```
pub fn topic_bin_id(topic: &str) -> Option<&str> {
    topic
        .split('/')
        .nth(2)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
}

/// Topic a command for `target` is published on
pub fn command_topic(target: &CommandTarget) -> String {
    format!("{}/{}/command", TOPIC_PREFIX, target.as_str())
}
