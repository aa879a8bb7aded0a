use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;
use treadline_core::config::{AppConfig, LoadOptions, LogFormat};

use crate::commands::{CommandResult, EXIT_CONFIG};

struct ConfigField {
    key_path: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
    ];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key_path, field.value));
    }

    CommandResult::success("config", lines.join("\n"))
}

fn field(key_path: &'static str, env_keys: &'static [&'static str], value: String) -> ConfigField {
    ConfigField { key_path, env_keys, value }
}

fn effective_fields(config: &AppConfig) -> Vec<ConfigField> {
    vec![
        field("database.url", &["TREADLINE_DATABASE_URL"], config.database.url.clone()),
        field(
            "database.max_connections",
            &["TREADLINE_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            &["TREADLINE_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        field("gateway.base_url", &["TREADLINE_GATEWAY_BASE_URL"], config.gateway.base_url.clone()),
        field(
            "gateway.timeout_secs",
            &["TREADLINE_GATEWAY_TIMEOUT_SECS"],
            config.gateway.timeout_secs.to_string(),
        ),
        field(
            "gateway.sender_name",
            &["TREADLINE_GATEWAY_SENDER_NAME"],
            config.gateway.sender_name.clone(),
        ),
        field(
            "server.bind_address",
            &["TREADLINE_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        field("server.port", &["TREADLINE_SERVER_PORT"], config.server.port.to_string()),
        field(
            "server.graceful_shutdown_secs",
            &["TREADLINE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs.to_string(),
        ),
        field(
            "logging.level",
            &["TREADLINE_LOGGING_LEVEL", "TREADLINE_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        field(
            "logging.format",
            &["TREADLINE_LOGGING_FORMAT", "TREADLINE_LOG_FORMAT"],
            log_format_name(config.logging.format).to_string(),
        ),
    ]
}

fn log_format_name(format: LogFormat) -> &'static str {
    match format {
        LogFormat::Compact => "compact",
        LogFormat::Pretty => "pretty",
        LogFormat::Json => "json",
    }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("treadline.toml"), PathBuf::from("config/treadline.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
