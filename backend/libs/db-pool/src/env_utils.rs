//! Environment variable parsing helpers

use std::str::FromStr;

/// Parse an environment variable, falling back to `default` when it is
/// missing or does not parse
pub fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    parse_env_optional(key).unwrap_or(default)
}

/// Parse an environment variable, `None` if missing or invalid
pub fn parse_env_optional<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Parse a mandatory environment variable
pub fn parse_env_required<T: FromStr>(key: &str) -> Result<T, String> {
    std::env::var(key)
        .map_err(|_| format!("environment variable {} not set", key))?
        .parse()
        .map_err(|_| format!("failed to parse environment variable {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_parse_env_with_default() {
        let result: u32 = parse_env_with_default("RECSYS_TEST_MISSING_XYZ", 42);
        assert_eq!(result, 42);

        std::env::set_var("RECSYS_TEST_PORT", "6432");
        let result: u16 = parse_env_with_default("RECSYS_TEST_PORT", 5432);
        assert_eq!(result, 6432);

        std::env::set_var("RECSYS_TEST_PORT", "not-a-port");
        let result: u16 = parse_env_with_default("RECSYS_TEST_PORT", 5432);
        assert_eq!(result, 5432);
        std::env::remove_var("RECSYS_TEST_PORT");
    }

    #[test]
    #[serial_test::serial]
    fn test_parse_env_required() {
        let result = parse_env_required::<String>("RECSYS_TEST_MISSING_XYZ");
        assert_eq!(
            result,
            Err("environment variable RECSYS_TEST_MISSING_XYZ not set".to_string())
        );

        std::env::set_var("RECSYS_TEST_REQ", "456");
        assert_eq!(parse_env_required::<u32>("RECSYS_TEST_REQ"), Ok(456));
        std::env::remove_var("RECSYS_TEST_REQ");
    }
}
