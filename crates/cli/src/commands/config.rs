use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use actiongate_core::config::{AppConfig, LoadOptions};
use actiongate_core::WindowAlgorithm;
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl Field {
    fn new(key: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let algorithm = match config.rate_limit.algorithm {
        WindowAlgorithm::Fixed => "fixed",
        WindowAlgorithm::Sliding => "sliding",
    };

    vec![
        Field::new("database.url", "ACTIONGATE_DATABASE_URL", config.database.url.clone()),
        Field::new(
            "database.max_connections",
            "ACTIONGATE_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        Field::new(
            "database.timeout_secs",
            "ACTIONGATE_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        Field::new("ai.provider", "ACTIONGATE_AI_PROVIDER", config.ai.provider.as_str()),
        Field::new("ai.model", "ACTIONGATE_AI_MODEL", config.ai.model.clone()),
        Field::new(
            "ai.base_url",
            "ACTIONGATE_AI_BASE_URL",
            config.ai.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new(
            "ai.api_key",
            "ACTIONGATE_AI_API_KEY",
            redact_key(config.ai.api_key.as_ref().map(|key| key.expose_secret())),
        ),
        Field::new("ai.timeout_secs", "ACTIONGATE_AI_TIMEOUT_SECS", config.ai.timeout_secs.to_string()),
        Field::new(
            "dispatch.max_transient_retries",
            "ACTIONGATE_DISPATCH_MAX_TRANSIENT_RETRIES",
            config.dispatch.max_transient_retries.to_string(),
        ),
        Field::new(
            "dispatch.retry_base_delay_ms",
            "ACTIONGATE_DISPATCH_RETRY_BASE_DELAY_MS",
            config.dispatch.retry_base_delay_ms.to_string(),
        ),
        Field::new(
            "approvals.gate_timeout_secs",
            "ACTIONGATE_APPROVALS_GATE_TIMEOUT_SECS",
            config.approvals.gate_timeout_secs.to_string(),
        ),
        Field::new(
            "approvals.sweep_interval_secs",
            "ACTIONGATE_APPROVALS_SWEEP_INTERVAL_SECS",
            config.approvals.sweep_interval_secs.to_string(),
        ),
        Field::new("rate_limit.algorithm", "ACTIONGATE_RATE_LIMIT_ALGORITHM", algorithm),
        Field::new(
            "conversation.max_turns",
            "ACTIONGATE_CONVERSATION_MAX_TURNS",
            config.conversation.max_turns.to_string(),
        ),
        Field::new("logging.level", "ACTIONGATE_LOGGING_LEVEL", config.logging.level.clone()),
        Field::new(
            "logging.format",
            "ACTIONGATE_LOGGING_FORMAT",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("actiongate.toml"), PathBuf::from("config/actiongate.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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

fn redact_key(key: Option<&str>) -> String {
    match key.map(str::trim) {
        None => "<unset>".to_string(),
        Some("") => "<empty>".to_string(),
        Some(key) => match key.split_once('-') {
            Some((prefix, _)) => format!("{prefix}-***"),
            None => "<redacted>".to_string(),
        },
    }
}
