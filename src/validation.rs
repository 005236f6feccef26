//! Checks applied to configuration values before anything connects.

use crate::error::{AppError, AppResult};

/// Maximum length for resource names (streams, topics, consumer groups).
///
/// This matches Iggy's internal limit for identifier length.
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum number of partitions per topic.
pub const MAX_PARTITIONS: u32 = 1000;

/// Minimum number of partitions per topic.
pub const MIN_PARTITIONS: u32 = 1;

/// Validate a resource name (stream, topic or consumer group).
///
/// Rules:
/// - Must be between 1 and 255 characters
/// - Must start and end with an alphanumeric character
/// - Can contain alphanumeric characters, dots, underscores, and hyphens
/// - Cannot contain consecutive dots, underscores, or hyphens
pub fn validate_resource_name(name: &str, resource_type: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::ConfigError(format!(
            "{resource_type} name cannot be empty"
        )));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(AppError::ConfigError(format!(
            "{resource_type} name cannot exceed {MAX_NAME_LENGTH} characters"
        )));
    }

    let chars: Vec<char> = name.chars().collect();

    if !chars.first().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::ConfigError(format!(
            "{resource_type} name must start with an alphanumeric character"
        )));
    }

    if !chars.last().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::ConfigError(format!(
            "{resource_type} name must end with an alphanumeric character"
        )));
    }

    let mut prev_special = false;
    for (i, &c) in chars.iter().enumerate() {
        let is_special = c == '.' || c == '_' || c == '-';

        if !c.is_ascii_alphanumeric() && !is_special {
            return Err(AppError::ConfigError(format!(
                "{resource_type} name contains invalid character '{c}' at position {i}. \
                 Only alphanumeric characters, dots, underscores, and hyphens are allowed"
            )));
        }

        if is_special && prev_special {
            return Err(AppError::ConfigError(format!(
                "{resource_type} name cannot contain consecutive special characters at position {i}"
            )));
        }

        prev_special = is_special;
    }

    Ok(())
}

/// Validate partition count for a topic.
pub fn validate_partition_count(partitions: u32, resource_type: &str) -> AppResult<()> {
    if partitions < MIN_PARTITIONS {
        return Err(AppError::ConfigError(format!(
            "{resource_type} must have at least {MIN_PARTITIONS} partition"
        )));
    }

    if partitions > MAX_PARTITIONS {
        return Err(AppError::ConfigError(format!(
            "{resource_type} cannot have more than {MAX_PARTITIONS} partitions"
        )));
    }

    Ok(())
}

/// Validate a broker address of the form `host:port`.
///
/// The host is not resolved here; only the shape and the port are checked.
pub fn validate_broker_address(address: &str) -> AppResult<()> {
    let Some((host, port)) = address.rsplit_once(':') else {
        return Err(AppError::ConfigError(format!(
            "broker address '{address}' must be host:port"
        )));
    };

    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(AppError::ConfigError(format!(
            "broker address '{address}' has an invalid host"
        )));
    }

    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(AppError::ConfigError(format!(
            "broker address '{address}' has an invalid port"
        ))),
        Ok(_) => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_resource_name("orders", "Stream").is_ok());
        assert!(validate_resource_name("orders-new", "Topic").is_ok());
        assert!(validate_resource_name("consumer-group-id", "Consumer group").is_ok());
        assert!(validate_resource_name("orders_v2.1", "Topic").is_ok());
        assert!(validate_resource_name("a", "Stream").is_ok());
    }

    #[test]
    fn test_empty_name() {
        let result = validate_resource_name("", "Stream");
        assert!(matches!(result, Err(AppError::ConfigError(_))));
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_name_too_long() {
        let result = validate_resource_name(&"a".repeat(256), "Stream");
        assert!(result.unwrap_err().to_string().contains("cannot exceed"));
    }

    #[test]
    fn test_invalid_edges() {
        assert!(
            validate_resource_name("-orders", "Topic")
                .unwrap_err()
                .to_string()
                .contains("must start with an alphanumeric")
        );
        assert!(
            validate_resource_name("orders-", "Topic")
                .unwrap_err()
                .to_string()
                .contains("must end with an alphanumeric")
        );
    }

    #[test]
    fn test_invalid_characters() {
        let result = validate_resource_name("orders@new", "Topic");
        assert!(result.unwrap_err().to_string().contains("invalid character"));
    }

    #[test]
    fn test_consecutive_special_characters() {
        let result = validate_resource_name("orders--new", "Topic");
        assert!(result.unwrap_err().to_string().contains("consecutive special"));
    }

    #[test]
    fn test_partition_count_bounds() {
        assert!(validate_partition_count(1, "Topic").is_ok());
        assert!(validate_partition_count(1000, "Topic").is_ok());
        assert!(
            validate_partition_count(0, "Topic")
                .unwrap_err()
                .to_string()
                .contains("at least 1")
        );
        assert!(
            validate_partition_count(1001, "Topic")
                .unwrap_err()
                .to_string()
                .contains("more than 1000")
        );
    }

    #[test]
    fn test_valid_broker_addresses() {
        assert!(validate_broker_address("localhost:8090").is_ok());
        assert!(validate_broker_address("10.0.0.5:8090").is_ok());
        assert!(validate_broker_address("iggy.internal.example.com:9000").is_ok());
    }

    #[test]
    fn test_invalid_broker_addresses() {
        for address in ["localhost", ":8090", "host:", "host:0", "host:99999", "my host:8090"] {
            assert!(
                matches!(
                    validate_broker_address(address),
                    Err(AppError::ConfigError(_))
                ),
                "{address} should be rejected"
            );
        }
    }
}
