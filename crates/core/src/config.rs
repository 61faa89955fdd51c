use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use crate::dispatcher::DispatcherConfig;
use crate::rate_limit::{QuietHoursPredicate, WindowAlgorithm};

/// Hard ceiling on transient retries regardless of configuration.
pub const MAX_TRANSIENT_RETRIES_CAP: u32 = 5;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub ai: AiConfig,
    pub dispatch: DispatchConfig,
    pub approvals: ApprovalConfig,
    pub rate_limit: RateLimitConfig,
    pub conversation: ConversationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AiConfig {
    pub provider: AiProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchConfig {
    pub max_transient_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_backoff_multiplier: u32,
    pub retry_jitter_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalConfig {
    pub gate_timeout_secs: i64,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub algorithm: WindowAlgorithm,
    pub quiet_hours_utc_offset: i32,
    pub quiet_hours_start: u32,
    pub quiet_hours_end: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationConfig {
    pub max_turns: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
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
    pub ai_provider: Option<AiProvider>,
    pub ai_model: Option<String>,
    pub rate_limit_algorithm: Option<WindowAlgorithm>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://actiongate.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            ai: AiConfig {
                provider: AiProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            dispatch: DispatchConfig {
                max_transient_retries: 2,
                retry_base_delay_ms: 200,
                retry_backoff_multiplier: 2,
                retry_jitter_ms: 50,
            },
            approvals: ApprovalConfig { gate_timeout_secs: 86_400, sweep_interval_secs: 300 },
            rate_limit: RateLimitConfig {
                algorithm: WindowAlgorithm::Fixed,
                quiet_hours_utc_offset: -6,
                quiet_hours_start: 9,
                quiet_hours_end: 20,
            },
            conversation: ConversationConfig { max_turns: 40 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for AiProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported ai provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl AiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

impl std::str::FromStr for LogFormat {
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
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("actiongate.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_transient_retries: self.dispatch.max_transient_retries,
            retry_base_delay_ms: self.dispatch.retry_base_delay_ms,
            retry_backoff_multiplier: self.dispatch.retry_backoff_multiplier,
            retry_jitter_ms: self.dispatch.retry_jitter_ms,
            gate_timeout_secs: self.approvals.gate_timeout_secs,
        }
    }

    pub fn quiet_hours(&self) -> QuietHoursPredicate {
        QuietHoursPredicate::new(
            self.rate_limit.quiet_hours_utc_offset,
            self.rate_limit.quiet_hours_start,
            self.rate_limit.quiet_hours_end,
        )
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(ai) = patch.ai {
            if let Some(provider) = ai.provider {
                self.ai.provider = provider;
            }
            if let Some(api_key) = ai.api_key {
                self.ai.api_key = Some(api_key.into());
            }
            if let Some(base_url) = ai.base_url {
                self.ai.base_url = Some(base_url);
            }
            if let Some(model) = ai.model {
                self.ai.model = model;
            }
            if let Some(timeout_secs) = ai.timeout_secs {
                self.ai.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = ai.max_retries {
                self.ai.max_retries = max_retries;
            }
        }

        if let Some(dispatch) = patch.dispatch {
            if let Some(max_transient_retries) = dispatch.max_transient_retries {
                self.dispatch.max_transient_retries = max_transient_retries;
            }
            if let Some(retry_base_delay_ms) = dispatch.retry_base_delay_ms {
                self.dispatch.retry_base_delay_ms = retry_base_delay_ms;
            }
            if let Some(retry_backoff_multiplier) = dispatch.retry_backoff_multiplier {
                self.dispatch.retry_backoff_multiplier = retry_backoff_multiplier;
            }
            if let Some(retry_jitter_ms) = dispatch.retry_jitter_ms {
                self.dispatch.retry_jitter_ms = retry_jitter_ms;
            }
        }

        if let Some(approvals) = patch.approvals {
            if let Some(gate_timeout_secs) = approvals.gate_timeout_secs {
                self.approvals.gate_timeout_secs = gate_timeout_secs;
            }
            if let Some(sweep_interval_secs) = approvals.sweep_interval_secs {
                self.approvals.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(rate_limit) = patch.rate_limit {
            if let Some(algorithm) = rate_limit.algorithm {
                self.rate_limit.algorithm = parse_algorithm("rate_limit.algorithm", &algorithm)?;
            }
            if let Some(offset) = rate_limit.quiet_hours_utc_offset {
                self.rate_limit.quiet_hours_utc_offset = offset;
            }
            if let Some(start) = rate_limit.quiet_hours_start {
                self.rate_limit.quiet_hours_start = start;
            }
            if let Some(end) = rate_limit.quiet_hours_end {
                self.rate_limit.quiet_hours_end = end;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(max_turns) = conversation.max_turns {
                self.conversation.max_turns = max_turns;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ACTIONGATE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ACTIONGATE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_num("ACTIONGATE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ACTIONGATE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_num("ACTIONGATE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ACTIONGATE_AI_PROVIDER") {
            self.ai.provider = value.parse()?;
        }
        if let Some(value) = read_env("ACTIONGATE_AI_API_KEY") {
            self.ai.api_key = Some(value.into());
        }
        if let Some(value) = read_env("ACTIONGATE_AI_BASE_URL") {
            self.ai.base_url = Some(value);
        }
        if let Some(value) = read_env("ACTIONGATE_AI_MODEL") {
            self.ai.model = value;
        }
        if let Some(value) = read_env("ACTIONGATE_AI_TIMEOUT_SECS") {
            self.ai.timeout_secs = parse_num("ACTIONGATE_AI_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ACTIONGATE_DISPATCH_MAX_TRANSIENT_RETRIES") {
            self.dispatch.max_transient_retries =
                parse_num("ACTIONGATE_DISPATCH_MAX_TRANSIENT_RETRIES", &value)?;
        }
        if let Some(value) = read_env("ACTIONGATE_DISPATCH_RETRY_BASE_DELAY_MS") {
            self.dispatch.retry_base_delay_ms =
                parse_num("ACTIONGATE_DISPATCH_RETRY_BASE_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("ACTIONGATE_APPROVALS_GATE_TIMEOUT_SECS") {
            self.approvals.gate_timeout_secs =
                parse_num("ACTIONGATE_APPROVALS_GATE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("ACTIONGATE_APPROVALS_SWEEP_INTERVAL_SECS") {
            self.approvals.sweep_interval_secs =
                parse_num("ACTIONGATE_APPROVALS_SWEEP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("ACTIONGATE_RATE_LIMIT_ALGORITHM") {
            self.rate_limit.algorithm = parse_algorithm("ACTIONGATE_RATE_LIMIT_ALGORITHM", &value)?;
        }

        if let Some(value) = read_env("ACTIONGATE_CONVERSATION_MAX_TURNS") {
            self.conversation.max_turns = parse_num("ACTIONGATE_CONVERSATION_MAX_TURNS", &value)?;
        }

        let log_level =
            read_env("ACTIONGATE_LOGGING_LEVEL").or_else(|| read_env("ACTIONGATE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ACTIONGATE_LOGGING_FORMAT").or_else(|| read_env("ACTIONGATE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(ai_provider) = overrides.ai_provider {
            self.ai.provider = ai_provider;
        }
        if let Some(ai_model) = overrides.ai_model {
            self.ai.model = ai_model;
        }
        if let Some(algorithm) = overrides.rate_limit_algorithm {
            self.rate_limit.algorithm = algorithm;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_ai(&self.ai)?;
        validate_dispatch(&self.dispatch)?;
        validate_approvals(&self.approvals)?;
        validate_rate_limit(&self.rate_limit)?;
        validate_conversation(&self.conversation)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("actiongate.toml"), PathBuf::from("config/actiongate.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_ai(ai: &AiConfig) -> Result<(), ConfigError> {
    if ai.timeout_secs == 0 || ai.timeout_secs > 300 {
        return Err(ConfigError::Validation("ai.timeout_secs must be in range 1..=300".to_string()));
    }

    match ai.provider {
        AiProvider::OpenAi | AiProvider::Anthropic => {
            let missing = ai
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "ai.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        AiProvider::Ollama => {
            let missing = ai.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "ai.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_dispatch(dispatch: &DispatchConfig) -> Result<(), ConfigError> {
    if dispatch.max_transient_retries > MAX_TRANSIENT_RETRIES_CAP {
        return Err(ConfigError::Validation(format!(
            "dispatch.max_transient_retries must be at most {MAX_TRANSIENT_RETRIES_CAP}"
        )));
    }
    if dispatch.retry_backoff_multiplier == 0 {
        return Err(ConfigError::Validation(
            "dispatch.retry_backoff_multiplier must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_approvals(approvals: &ApprovalConfig) -> Result<(), ConfigError> {
    if approvals.gate_timeout_secs <= 0 {
        return Err(ConfigError::Validation(
            "approvals.gate_timeout_secs must be greater than zero".to_string(),
        ));
    }
    if approvals.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "approvals.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_rate_limit(rate_limit: &RateLimitConfig) -> Result<(), ConfigError> {
    if !(-12..=14).contains(&rate_limit.quiet_hours_utc_offset) {
        return Err(ConfigError::Validation(
            "rate_limit.quiet_hours_utc_offset must be in range -12..=14".to_string(),
        ));
    }
    if rate_limit.quiet_hours_start >= rate_limit.quiet_hours_end
        || rate_limit.quiet_hours_end > 24
    {
        return Err(ConfigError::Validation(
            "rate_limit quiet hours must satisfy start < end <= 24".to_string(),
        ));
    }
    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.max_turns == 0 {
        return Err(ConfigError::Validation(
            "conversation.max_turns must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_algorithm(key: &str, value: &str) -> Result<WindowAlgorithm, ConfigError> {
    WindowAlgorithm::parse(value).ok_or_else(|| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    ai: Option<AiPatch>,
    dispatch: Option<DispatchPatch>,
    approvals: Option<ApprovalsPatch>,
    rate_limit: Option<RateLimitPatch>,
    conversation: Option<ConversationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AiPatch {
    provider: Option<AiProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DispatchPatch {
    max_transient_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_backoff_multiplier: Option<u32>,
    retry_jitter_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalsPatch {
    gate_timeout_secs: Option<i64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitPatch {
    algorithm: Option<String>,
    quiet_hours_utc_offset: Option<i32>,
    quiet_hours_start: Option<u32>,
    quiet_hours_end: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    max_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
