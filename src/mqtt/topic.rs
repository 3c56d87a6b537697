//! Topic filter validation and matching
//!
//! Filters follow MQTT 3.1.1 wildcard rules: `+` matches exactly one level,
//! `#` matches any number of trailing levels and must be the last level.

use super::error::ConfigError;

const MAX_TOPIC_LEN: usize = 65_535;

/// Checks that `filter` is a well formed subscription filter
pub fn validate_filter(filter: &str) -> Result<(), ConfigError> {
    if filter.is_empty() {
        return Err(ConfigError::EmptyTopic);
    }

    let invalid = |reason: &str| ConfigError::InvalidTopic {
        topic: filter.to_string(),
        reason: reason.to_string(),
    };

    if filter.len() > MAX_TOPIC_LEN {
        return Err(invalid("longer than 65535 bytes"));
    }
    if filter.contains('\0') {
        return Err(invalid("contains a NUL character"));
    }

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    for (idx, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || idx != last) {
            return Err(invalid("'#' must be the whole last level"));
        }
        if level.contains('+') && *level != "+" {
            return Err(invalid("'+' must occupy a whole level"));
        }
    }
    Ok(())
}

/// Returns true if the topic `name` of a received message matches `filter`
pub fn matches(filter: &str, name: &str) -> bool {
    // Wildcards at the first level never match system topics
    if name.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut name_levels = name.split('/');
    loop {
        match (filter_levels.next(), name_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(n)) if f == n => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
