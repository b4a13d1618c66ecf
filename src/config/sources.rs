use super::models::Config;
use config::{ConfigError, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "IMAGEFETCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/imagefetch.toml";
const ENV_PREFIX: &str = "IMAGEFETCH";
const ENV_SEPARATOR: &str = "__";

/// Path of the config file: `IMAGEFETCH_CONFIG` or the default location
pub fn default_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration with priority (lowest to highest):
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Variables from a `.env` file
/// 4. Process environment
pub fn load(config_path: Option<&Path>) -> Result<Config, ConfigError> {
    // A missing .env is the normal case
    let _ = dotenvy::dotenv();

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_path);

    load_from_sources(path)
}

/// Load configuration from a specific file plus environment overrides
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::debug!(path = %config_path.display(), "Loading configuration file");
        builder = builder.add_source(File::from(config_path).format(FileFormat::Toml));
    } else {
        tracing::debug!(
            path = %config_path.display(),
            "Configuration file not found, using defaults and environment"
        );
    }

    // IMAGEFETCH__DOWNLOAD__MAX_RETRIES -> download.max_retries
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.download.max_retries, 3);
        assert_eq!(config.output.filename_prefix, "image_");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("imagefetch.toml");

        let toml_content = r#"
[download]
max_retries = 5
request_timeout_ms = 3000
max_image_bytes = "8MB"

[output]
directory = "/tmp/pictures"
filename_prefix = "pic_"
start_index = 10

[logging]
filter = "imagefetch=debug"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.download.max_retries, 5);
        assert_eq!(config.download.request_timeout_ms, 3000);
        assert_eq!(config.download.max_image_bytes.as_u64(), 8 * 1024 * 1024);
        assert_eq!(config.download.retry_delay_ms, 2000);
        assert_eq!(config.output.directory, PathBuf::from("/tmp/pictures"));
        assert_eq!(config.output.filename_prefix, "pic_");
        assert_eq!(config.output.start_index, 10);
        assert_eq!(config.logging.filter, "imagefetch=debug");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.toml");
        fs::write(&config_path, "[download\nmax_retries = ").unwrap();

        assert!(load_from_sources(config_path).is_err());
    }

    // Environment overrides are not exercised here: mutating the process
    // environment is unsafe with parallel tests.
}
