use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // HTTP server config
    pub http_host: String,
    pub http_port: u16,
    pub service_name: String,

    // Model location
    pub model_path: String,
    pub is_lms: bool,
    pub lms_model_path: String,

    // Feature tables (PostgreSQL)
    pub post_features_table: String,
    pub user_features_table: String,
    pub feed_table: String,
    pub like_action: String,
    pub like_batch_size: usize,

    // Response shaping
    pub include_post_text: bool,
    pub default_limit: usize,
    pub max_limit: usize,

    // Observability
    pub log_format: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .set_default("http_host", "0.0.0.0")?
            .set_default("http_port", 8000)?
            .set_default("service_name", "recsys-service")?
            .set_default("model_path", "model.json")?
            .set_default("is_lms", false)?
            .set_default("lms_model_path", "/workdir/user_input/model")?
            .set_default("post_features_table", "public.posts_info_features")?
            .set_default("user_features_table", "public.user_data")?
            .set_default("feed_table", "public.feed_data")?
            .set_default("like_action", "like")?
            .set_default("like_batch_size", 200_000)?
            .set_default("include_post_text", true)?
            .set_default("default_limit", 10)?
            .set_default("max_limit", 1000)?
            .set_default("log_format", "text")?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.http_port == 0 {
            return Err(anyhow!("HTTP port must be greater than 0"));
        }

        if self.resolved_model_path().as_os_str().is_empty() {
            return Err(anyhow!("Model path is required"));
        }

        for table in [
            &self.post_features_table,
            &self.user_features_table,
            &self.feed_table,
        ] {
            if !is_table_identifier(table) {
                return Err(anyhow!(
                    "Invalid table name '{}': expected [schema.]table with letters, digits and underscores",
                    table
                ));
            }
        }

        if self.like_action.is_empty() {
            return Err(anyhow!("Like action must not be empty"));
        }

        if self.like_batch_size == 0 {
            return Err(anyhow!("Like batch size must be greater than 0"));
        }

        if self.max_limit == 0 {
            return Err(anyhow!("Max limit must be greater than 0"));
        }

        if self.default_limit > self.max_limit {
            return Err(anyhow!(
                "Default limit {} exceeds max limit {}",
                self.default_limit,
                self.max_limit
            ));
        }

        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(anyhow!(
                "Log format must be 'text' or 'json', got '{}'",
                self.log_format
            ));
        }

        Ok(())
    }

    /// Model file to load; the hosted evaluation environment (`IS_LMS=1`)
    /// mounts the model at a fixed location.
    pub fn resolved_model_path(&self) -> PathBuf {
        if self.is_lms {
            PathBuf::from(&self.lms_model_path)
        } else {
            PathBuf::from(&self.model_path)
        }
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }
}

/// `table` or `schema.table`, each part an SQL identifier that needs no quoting
fn is_table_identifier(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.is_empty() || parts.len() > 2 {
        return false;
    }

    parts.iter().all(|part| {
        let mut chars = part.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            http_host: "0.0.0.0".to_string(),
            http_port: 8000,
            service_name: "recsys-service".to_string(),
            model_path: "model.json".to_string(),
            is_lms: false,
            lms_model_path: "/workdir/user_input/model".to_string(),
            post_features_table: "public.posts_info_features".to_string(),
            user_features_table: "public.user_data".to_string(),
            feed_table: "public.feed_data".to_string(),
            like_action: "like".to_string(),
            like_batch_size: 200_000,
            include_post_text: true,
            default_limit: 10,
            max_limit: 1000,
            log_format: "text".to_string(),
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_invalid_table_names() {
        let mut config = test_config();
        config.post_features_table = "posts; DROP TABLE users".to_string();
        assert!(config.validate().is_err());

        config.post_features_table = "a.b.c".to_string();
        assert!(config.validate().is_err());

        config.post_features_table = "1posts".to_string();
        assert!(config.validate().is_err());

        config.post_features_table = "posts_info_features".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_limits() {
        let mut config = test_config();
        config.default_limit = 2000;
        assert!(config.validate().is_err());

        config.default_limit = 10;
        config.max_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = test_config();
        config.log_format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lms_flag_overrides_model_path() {
        let mut config = test_config();
        assert_eq!(config.resolved_model_path(), PathBuf::from("model.json"));

        config.is_lms = true;
        assert_eq!(
            config.resolved_model_path(),
            PathBuf::from("/workdir/user_input/model")
        );
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_reads_overrides() {
        std::env::set_var("HTTP_PORT", "8123");
        std::env::set_var("IS_LMS", "true");
        std::env::set_var("INCLUDE_POST_TEXT", "false");

        let config = Config::from_env().unwrap();
        assert_eq!(config.http_port, 8123);
        assert!(config.is_lms);
        assert!(!config.include_post_text);
        assert_eq!(config.default_limit, 10);

        std::env::remove_var("HTTP_PORT");
        std::env::remove_var("IS_LMS");
        std::env::remove_var("INCLUDE_POST_TEXT");
    }
}
