use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Outbound supplier notification service.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Signature line of rendered order messages.
    pub sender_name: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub gateway_base_url: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://treadline.db".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://formspree.io/f".to_string(),
            timeout_secs: 15,
            sender_name: "Tire Management System".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1".to_string(), port: 8080, graceful_shutdown_secs: 15 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    /// Resolves defaults, then the TOML file, then `TREADLINE_*` variables,
    /// then programmatic overrides, and validates the result.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => read_patch(&path)?.merge_into(&mut config),
            None if options.require_file => {
                let expected =
                    options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        config.apply_env_overrides()?;
        options.overrides.merge_into(&mut config);
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let database = &mut self.database;
        set_from_env(&mut database.url, &["TREADLINE_DATABASE_URL"])?;
        set_from_env(&mut database.max_connections, &["TREADLINE_DATABASE_MAX_CONNECTIONS"])?;
        set_from_env(&mut database.timeout_secs, &["TREADLINE_DATABASE_TIMEOUT_SECS"])?;

        let gateway = &mut self.gateway;
        set_from_env(&mut gateway.base_url, &["TREADLINE_GATEWAY_BASE_URL"])?;
        set_from_env(&mut gateway.timeout_secs, &["TREADLINE_GATEWAY_TIMEOUT_SECS"])?;
        set_from_env(&mut gateway.sender_name, &["TREADLINE_GATEWAY_SENDER_NAME"])?;

        let server = &mut self.server;
        set_from_env(&mut server.bind_address, &["TREADLINE_SERVER_BIND_ADDRESS"])?;
        set_from_env(&mut server.port, &["TREADLINE_SERVER_PORT"])?;
        set_from_env(
            &mut server.graceful_shutdown_secs,
            &["TREADLINE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        )?;

        let logging = &mut self.logging;
        set_from_env(&mut logging.level, &["TREADLINE_LOGGING_LEVEL", "TREADLINE_LOG_LEVEL"])?;
        if let Some((_, value)) = first_env(&["TREADLINE_LOGGING_FORMAT", "TREADLINE_LOG_FORMAT"]) {
            logging.format = value.parse()?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let database = &self.database;
        let url = database.url.trim();
        require(
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:",
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
        )?;
        require(database.max_connections > 0, "database.max_connections must be greater than zero")?;
        require(
            (1..=300).contains(&database.timeout_secs),
            "database.timeout_secs must be in range 1..=300",
        )?;

        let gateway = &self.gateway;
        let base_url = gateway.base_url.trim();
        require(
            base_url.starts_with("http://") || base_url.starts_with("https://"),
            "gateway.base_url must start with http:// or https://",
        )?;
        require(
            (1..=120).contains(&gateway.timeout_secs),
            "gateway.timeout_secs must be in range 1..=120",
        )?;
        require(!gateway.sender_name.trim().is_empty(), "gateway.sender_name must not be empty")?;

        require(self.server.port > 0, "server.port must be greater than zero")?;
        require(
            self.server.graceful_shutdown_secs > 0,
            "server.graceful_shutdown_secs must be greater than zero",
        )?;

        require(
            LOG_LEVELS.contains(&self.logging.level.trim().to_ascii_lowercase().as_str()),
            "logging.level must be one of trace|debug|info|warn|error",
        )
    }
}

const DEFAULT_CONFIG_FILES: [&str; 2] = ["treadline.toml", "config/treadline.toml"];
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn require(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.to_string()))
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    match explicit_path {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists()),
    }
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    toml::from_str(&expand_env_references(&raw)?)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${NAME}` with the value of environment variable `NAME`.
fn expand_env_references(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let name = &after_open[..end];
        let value = env::var(name)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: name.to_string() })?;
        output.push_str(&value);
        rest = &after_open[end + 1..];
    }
    output.push_str(rest);

    Ok(output)
}

/// First non-blank variable among `keys`, with the key it came from.
fn first_env(keys: &[&'static str]) -> Option<(&'static str, String)> {
    keys.iter().find_map(|key| {
        env::var(key).ok().filter(|value| !value.trim().is_empty()).map(|value| (*key, value))
    })
}

fn set_from_env<T: FromStr>(target: &mut T, keys: &[&'static str]) -> Result<(), ConfigError> {
    if let Some((key, value)) = first_env(keys) {
        *target = value
            .parse()
            .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value })?;
    }
    Ok(())
}

fn replace<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    gateway: Option<GatewayPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

impl ConfigPatch {
    fn merge_into(self, config: &mut AppConfig) {
        if let Some(database) = self.database {
            replace(&mut config.database.url, database.url);
            replace(&mut config.database.max_connections, database.max_connections);
            replace(&mut config.database.timeout_secs, database.timeout_secs);
        }
        if let Some(gateway) = self.gateway {
            replace(&mut config.gateway.base_url, gateway.base_url);
            replace(&mut config.gateway.timeout_secs, gateway.timeout_secs);
            replace(&mut config.gateway.sender_name, gateway.sender_name);
        }
        if let Some(server) = self.server {
            replace(&mut config.server.bind_address, server.bind_address);
            replace(&mut config.server.port, server.port);
            replace(&mut config.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }
        if let Some(logging) = self.logging {
            replace(&mut config.logging.level, logging.level);
            replace(&mut config.logging.format, logging.format);
        }
    }
}

impl ConfigOverrides {
    fn merge_into(self, config: &mut AppConfig) {
        replace(&mut config.database.url, self.database_url);
        replace(&mut config.logging.level, self.log_level);
        replace(&mut config.gateway.base_url, self.gateway_base_url);
        replace(&mut config.server.port, self.server_port);
    }
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    sender_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    /// Runs `body` with `vars` set, serialised against other env-mutating tests.
    fn with_vars<T>(vars: &[(&str, &str)], body: impl FnOnce() -> T) -> T {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let _guard =
            ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        for (key, value) in vars {
            env::set_var(key, value);
        }
        let result = body();
        for (key, _) in vars {
            env::remove_var(key);
        }
        result
    }

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("treadline.toml");
        fs::write(&path, contents).expect("write config file");
        path
    }

    fn load_from(path: PathBuf) -> Result<AppConfig, ConfigError> {
        AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
    }

    #[test]
    fn defaults_are_valid_without_a_file() {
        let config = with_vars(&[], || AppConfig::load(LoadOptions::default())).expect("defaults");

        assert_eq!(config.database.url, "sqlite://treadline.db");
        assert_eq!(config.gateway.base_url, "https://formspree.io/f");
        assert_eq!(config.gateway.timeout_secs, 15);
        assert_eq!(config.gateway.sender_name, "Tire Management System");
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn file_values_expand_environment_references() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_config(
            &dir,
            "[gateway]\nbase_url = \"${FLEET_TEST_GATEWAY}/f\"\nsender_name = \"Fleet Desk\"\n",
        );

        let config = with_vars(&[("FLEET_TEST_GATEWAY", "http://127.0.0.1:9911")], || {
            load_from(path)
        })
        .expect("config loads");

        assert_eq!(config.gateway.base_url, "http://127.0.0.1:9911/f");
        assert_eq!(config.gateway.sender_name, "Fleet Desk");
    }

    #[test]
    fn unset_reference_names_the_variable() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_config(&dir, "[database]\nurl = \"${TREADLINE_TEST_UNSET_VAR}\"\n");

        let error = with_vars(&[], || load_from(path)).expect_err("unset variable");
        assert!(matches!(
            error,
            ConfigError::MissingEnvInterpolation { ref var } if var == "TREADLINE_TEST_UNSET_VAR"
        ));
    }

    #[test]
    fn unterminated_reference_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_config(&dir, "[database]\nurl = \"${OPEN\"\n");

        let error = with_vars(&[], || load_from(path)).expect_err("unterminated");
        assert!(matches!(error, ConfigError::UnterminatedInterpolation));
    }

    #[test]
    fn short_logging_aliases_are_read() {
        let config = with_vars(
            &[("TREADLINE_LOG_LEVEL", "warn"), ("TREADLINE_LOG_FORMAT", "pretty")],
            || AppConfig::load(LoadOptions::default()),
        )
        .expect("config loads");

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn overrides_beat_env_which_beats_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_config(
            &dir,
            r#"
[database]
url = "sqlite://from-file.db"

[gateway]
timeout_secs = 5

[server]
port = 9000

[logging]
level = "warn"
"#,
        );

        let config = with_vars(
            &[
                ("TREADLINE_DATABASE_URL", "sqlite://from-env.db"),
                ("TREADLINE_GATEWAY_TIMEOUT_SECS", "30"),
            ],
            || {
                AppConfig::load(LoadOptions {
                    config_path: Some(path),
                    overrides: ConfigOverrides {
                        database_url: Some("sqlite://from-override.db".to_string()),
                        log_level: Some("debug".to_string()),
                        ..ConfigOverrides::default()
                    },
                    ..LoadOptions::default()
                })
            },
        )
        .expect("config loads");

        assert_eq!(config.database.url, "sqlite://from-override.db");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.gateway.timeout_secs, 30);
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn unparsable_env_value_names_the_variable() {
        let error = with_vars(&[("TREADLINE_SERVER_PORT", "eighty")], || {
            AppConfig::load(LoadOptions::default())
        })
        .expect_err("bad port");

        assert!(matches!(
            error,
            ConfigError::InvalidEnvOverride { ref key, ref value }
                if key == "TREADLINE_SERVER_PORT" && value == "eighty"
        ));
    }

    #[test]
    fn out_of_range_gateway_timeout_fails_validation() {
        let error = with_vars(&[("TREADLINE_GATEWAY_TIMEOUT_SECS", "600")], || {
            AppConfig::load(LoadOptions::default())
        })
        .expect_err("timeout too large");

        assert!(matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("gateway.timeout_secs")
        ));
    }

    #[test]
    fn non_sqlite_database_url_fails_validation() {
        let error = with_vars(&[("TREADLINE_DATABASE_URL", "postgres://localhost/fleet")], || {
            AppConfig::load(LoadOptions::default())
        })
        .expect_err("postgres url");

        assert!(matches!(error, ConfigError::Validation(ref message) if message.contains("sqlite")));
    }

    #[test]
    fn required_file_must_exist() {
        let dir = TempDir::new().expect("temp dir");
        let missing = dir.path().join("absent.toml");

        let error = with_vars(&[], || {
            AppConfig::load(LoadOptions {
                config_path: Some(missing.clone()),
                require_file: true,
                ..LoadOptions::default()
            })
        })
        .expect_err("missing file");

        assert!(matches!(error, ConfigError::MissingConfigFile(ref path) if *path == missing));
    }
}
