use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP fetch and retry settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Total attempts per URL, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Fixed delay between attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: ByteSize,
}

impl DownloadConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            user_agent: default_user_agent(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_user_agent() -> String {
    format!("imagefetch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_image_bytes() -> ByteSize {
    ByteSize(50 * 1024 * 1024) // 50 MB
}

/// Where and how downloaded images are named
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
    #[serde(default = "default_start_index")]
    pub start_index: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            filename_prefix: default_filename_prefix(),
            start_index: default_start_index(),
        }
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_filename_prefix() -> String {
    "image_".to_string()
}

fn default_start_index() -> u64 {
    1
}

/// Log filter used when `RUST_LOG` is unset
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.download.max_retries, 3);
        assert_eq!(config.download.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.download.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.download.max_image_bytes.as_u64(), 50 * 1024 * 1024);
        assert!(config.download.user_agent.starts_with("imagefetch/"));
        assert_eq!(config.output.directory, PathBuf::from("downloads"));
        assert_eq!(config.output.filename_prefix, "image_");
        assert_eq!(config.output.start_index, 1);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: Config = toml::from_str(
            r#"
[download]
retry_delay_ms = 250

[output]
directory = "out/pics"
            "#,
        )
        .unwrap();

        assert_eq!(config.download.retry_delay(), Duration::from_millis(250));
        assert_eq!(config.download.max_retries, 3);
        assert_eq!(config.output.directory, PathBuf::from("out/pics"));
        assert_eq!(config.output.filename_prefix, "image_");
    }
}
