//! MQTT topic name and topic filter validation.

use crate::error::{Error, Result};

/// Maximum encoded length of a topic, in bytes.
pub const MAX_TOPIC_LEN: usize = 65_535;

/// Validate a topic filter used in a subscription.
///
/// Wildcards are allowed: `+` must occupy a whole level and `#` must be the
/// whole last level.
///
/// # Example
/// ```
/// use serialrelay_common::topic::validate_topic_filter;
///
/// assert!(validate_topic_filter("home/+/relay").is_ok());
/// assert!(validate_topic_filter("home/#").is_ok());
/// assert!(validate_topic_filter("home/re#").is_err());
/// ```
pub fn validate_topic_filter(filter: &str) -> Result<()> {
    check_common(filter)?;

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;

    for (index, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || index != last) {
            return Err(Error::Topic(format!(
                "'#' must be the entire last level in '{}'",
                filter
            )));
        }
        if level.contains('+') && *level != "+" {
            return Err(Error::Topic(format!(
                "'+' must occupy an entire level in '{}'",
                filter
            )));
        }
    }

    Ok(())
}

/// Validate a topic name used for publishing (no wildcards).
///
/// # Example
/// ```
/// use serialrelay_common::topic::validate_topic_name;
///
/// assert!(validate_topic_name("serialrelay/status").is_ok());
/// assert!(validate_topic_name("serialrelay/+").is_err());
/// ```
pub fn validate_topic_name(name: &str) -> Result<()> {
    check_common(name)?;

    if name.contains(['+', '#']) {
        return Err(Error::Topic(format!(
            "wildcards are not allowed in topic name '{}'",
            name
        )));
    }

    Ok(())
}

fn check_common(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(Error::Topic("topic must not be empty".to_string()));
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(Error::Topic(format!(
            "topic is {} bytes, maximum is {}",
            topic.len(),
            MAX_TOPIC_LEN
        )));
    }
    if topic.contains('\0') {
        return Err(Error::Topic("topic must not contain NUL".to_string()));
    }
    Ok(())
}
