//! Recognized configuration keys (spec §6) and their effects.

use serde::Deserialize;

/// Configuration for a coordination log backend instance.
///
/// Loaded from an optional TOML file layered with `ONYX_`-prefixed
/// environment overrides (see [`Config::load`]); this is the same
/// file-plus-env layering the `config` crate's callers elsewhere in the
/// pack (`kmb-config`) build on top of.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Non-empty string forming the tenancy prefix `P = /onyx/<tenancy-id>`.
    /// Accepts the spec's literal key name (`tenancy-id`) as well as the
    /// `ONYX_TENANCY_ID` environment spelling.
    #[serde(alias = "tenancy-id")]
    pub tenancy_id: String,
    /// Connect string for the coordination service.
    pub address: String,
    /// If true, the caller should start an embedded in-process testing
    /// server before connecting (see `onyx-log-testkit`).
    #[serde(default, alias = "server?")]
    pub server: bool,
    /// Listening port for the embedded testing server, when `server` is set.
    #[serde(default, alias = "server-port")]
    pub server_port: Option<u16>,
    /// Session timeout advertised to the coordination service.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
}

fn default_session_timeout_ms() -> u64 {
    30_000
}

impl Config {
    /// Loads configuration from an optional TOML file at `path` (if it
    /// exists), layering `ONYX_`-prefixed environment variables on top
    /// (e.g. `ONYX_TENANCY_ID`, `ONYX_SERVER_PORT`). Environment always
    /// wins over the file.
    ///
    /// Deliberately no `.separator(...)` on the environment source: this
    /// crate's fields are flat (`tenancy_id`, `server_port`, ...), and a
    /// separator tells `config` to split the *entire* post-prefix key into a
    /// nested path, so `ONYX_TENANCY_ID` would become the nested key
    /// `tenancy.id` instead of the flat `tenancy_id` it needs to match.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut builder = config::Config::builder();
        if path.exists() {
            builder = builder.add_source(
                config::File::from(path.to_path_buf()).format(config::FileFormat::Toml),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix("ONYX").try_parsing(true),
        );
        let raw = builder.build().map_err(ConfigError::Load)?;
        let config: Config = raw.try_deserialize().map_err(ConfigError::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Derives the tenancy root path `P` from `tenancy_id` (spec §3).
    pub fn tenancy_root(&self) -> Result<crate::namespace::Paths, ConfigError> {
        self.validate()?;
        Ok(crate::namespace::Paths::new(&self.tenancy_id))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tenancy_id.trim().is_empty() {
            return Err(ConfigError::EmptyTenancyId);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("tenancy-id must be a non-empty string")]
    EmptyTenancyId,
    #[error("failed to load configuration: {0}")]
    Load(#[source] config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_from_toml_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
            tenancy-id = "t1"
            address = "127.0.0.1:2181"
            "#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.tenancy_id, "t1");
        assert_eq!(config.address, "127.0.0.1:2181");
        assert!(!config.server);
        assert_eq!(config.session_timeout_ms, 30_000);
    }

    #[test]
    fn rejects_empty_tenancy_id() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, r#"tenancy-id = "" "#).unwrap();
        writeln!(file, r#"address = "127.0.0.1:2181""#).unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyTenancyId));
    }

    #[test]
    fn missing_file_and_no_environment_is_an_error() {
        let _guard = ENV_GUARD.lock().unwrap();
        let config = Config::load("/nonexistent/onyx.toml");
        assert!(config.is_err());
    }

    // `std::env::set_var`/`remove_var` mutate process-global state, so the
    // two tests below share a mutex to avoid tripping over each other (or
    // `missing_file_and_no_environment_is_an_error` above) when the test
    // binary runs with multiple threads.
    static ENV_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn environment_alone_populates_required_fields() {
        let _guard = ENV_GUARD.lock().unwrap();
        std::env::set_var("ONYX_TENANCY_ID", "env-only");
        std::env::set_var("ONYX_ADDRESS", "10.0.0.1:2181");

        let config = Config::load("/nonexistent/onyx.toml");

        std::env::remove_var("ONYX_TENANCY_ID");
        std::env::remove_var("ONYX_ADDRESS");

        let config = config.unwrap();
        assert_eq!(config.tenancy_id, "env-only");
        assert_eq!(config.address, "10.0.0.1:2181");
        assert_eq!(config.session_timeout_ms, 30_000);
    }

    #[test]
    fn environment_overrides_take_precedence_over_file() {
        let _guard = ENV_GUARD.lock().unwrap();
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, r#"tenancy-id = "from-file""#).unwrap();
        writeln!(file, r#"address = "127.0.0.1:2181""#).unwrap();

        std::env::set_var("ONYX_TENANCY_ID", "from-env");
        std::env::set_var("ONYX_SERVER_PORT", "4181");
        std::env::set_var("ONYX_SESSION_TIMEOUT_MS", "5000");

        let config = Config::load(file.path());

        std::env::remove_var("ONYX_TENANCY_ID");
        std::env::remove_var("ONYX_SERVER_PORT");
        std::env::remove_var("ONYX_SESSION_TIMEOUT_MS");

        let config = config.unwrap();
        assert_eq!(config.tenancy_id, "from-env");
        assert_eq!(config.address, "127.0.0.1:2181");
        assert_eq!(config.server_port, Some(4181));
        assert_eq!(config.session_timeout_ms, 5000);
    }
}
