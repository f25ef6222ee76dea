use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["linedesk.toml", "config/linedesk.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub app: AppSettings,
    pub server: ServerConfig,
    pub line: LineConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct AppSettings {
    pub env: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LineConfig {
    pub channel_secret: Option<SecretString>,
    pub channel_access_token: Option<SecretString>,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub history_turns: usize,
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
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub line_channel_secret: Option<String>,
    pub line_channel_access_token: Option<String>,
    pub line_api_base_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
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
    #[error("could not load env file `{path}`: {message}")]
    EnvFile { path: PathBuf, message: String },
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSettings { env: "development".to_string() },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            line: LineConfig {
                channel_secret: None,
                channel_access_token: None,
                api_base_url: "https://api.line.me".to_string(),
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
                history_turns: 10,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(app) = patch.app {
            if let Some(env) = app.env {
                self.app.env = env;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(line) = patch.line {
            if let Some(channel_secret) = line.channel_secret {
                self.line.channel_secret = Some(secret_value(channel_secret));
            }
            if let Some(channel_access_token) = line.channel_access_token {
                self.line.channel_access_token = Some(secret_value(channel_access_token));
            }
            if let Some(api_base_url) = line.api_base_url {
                self.line.api_base_url = api_base_url;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(history_turns) = llm.history_turns {
                self.llm.history_turns = history_turns;
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
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LINEDESK_APP_ENV").or_else(|| read_env("APP_ENV")) {
            self.app.env = value;
        }

        if let Some(value) = read_env("LINEDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LINEDESK_SERVER_PORT") {
            self.server.port = parse_u16("LINEDESK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("LINEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("LINEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let channel_secret =
            read_env("LINEDESK_LINE_CHANNEL_SECRET").or_else(|| read_env("CHANNEL_SECRET"));
        if let Some(value) = channel_secret {
            self.line.channel_secret = Some(secret_value(value));
        }
        let channel_access_token = read_env("LINEDESK_LINE_CHANNEL_ACCESS_TOKEN")
            .or_else(|| read_env("CHANNEL_ACCESS_TOKEN"));
        if let Some(value) = channel_access_token {
            self.line.channel_access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("LINEDESK_LINE_API_BASE_URL") {
            self.line.api_base_url = value;
        }

        let llm_api_key = read_env("LINEDESK_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = llm_api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LINEDESK_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("LINEDESK_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("LINEDESK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("LINEDESK_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LINEDESK_LLM_HISTORY_TURNS") {
            self.llm.history_turns = parse_usize("LINEDESK_LLM_HISTORY_TURNS", &value)?;
        }

        let log_level = read_env("LINEDESK_LOGGING_LEVEL")
            .or_else(|| read_env("LINEDESK_LOG_LEVEL"))
            .or_else(|| read_env("LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LINEDESK_LOGGING_FORMAT").or_else(|| read_env("LINEDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(channel_secret) = overrides.line_channel_secret {
            self.line.channel_secret = Some(secret_value(channel_secret));
        }
        if let Some(channel_access_token) = overrides.line_channel_access_token {
            self.line.channel_access_token = Some(secret_value(channel_access_token));
        }
        if let Some(api_base_url) = overrides.line_api_base_url {
            self.line.api_base_url = api_base_url;
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(api_key));
        }
        if let Some(base_url) = overrides.llm_base_url {
            self.llm.base_url = base_url;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_line(&self.line)?;
        validate_llm(&self.llm)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// The webhook gateway cannot run without both LINE credentials; the CLI can.
    pub fn require_line_credentials(&self) -> Result<(), ConfigError> {
        if is_blank(self.line.channel_secret.as_ref()) {
            return Err(ConfigError::Validation(
                "line.channel_secret is required. Get it from https://developers.line.biz/console > Your Channel > Basic settings".to_string(),
            ));
        }
        if is_blank(self.line.channel_access_token.as_ref()) {
            return Err(ConfigError::Validation(
                "line.channel_access_token is required. Get it from https://developers.line.biz/console > Your Channel > Messaging API".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_blank(secret: Option<&SecretString>) -> bool {
    secret.map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true)
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

pub const DOTENV_FILE: &str = ".env";

/// Loads `KEY=value` lines from `path` into the process environment.
///
/// Variables already present in the environment are left untouched, so a
/// `.env` file sits below real env vars. Returns `false` when the file does
/// not exist.
pub fn load_dotenv(path: &Path) -> Result<bool, ConfigError> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(error) if error.not_found() => Ok(false),
        Err(error) => {
            Err(ConfigError::EnvFile { path: path.to_path_buf(), message: error.to_string() })
        }
    }
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

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_line(line: &LineConfig) -> Result<(), ConfigError> {
    validate_http_url("line.api_base_url", &line.api_base_url)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    validate_http_url("llm.base_url", &llm.base_url)?;

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.history_turns > 100 {
        return Err(ConfigError::Validation(
            "llm.history_turns must be in range 0..=100".to_string(),
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

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    app: Option<AppPatch>,
    server: Option<ServerPatch>,
    line: Option<LinePatch>,
    llm: Option<LlmPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AppPatch {
    env: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LinePatch {
    channel_secret: Option<String>,
    channel_access_token: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    history_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

/// Every environment variable the loader reads, aliases included.
pub const ENV_KEYS: [&str; 21] = [
    "LINEDESK_APP_ENV",
    "APP_ENV",
    "LINEDESK_SERVER_BIND_ADDRESS",
    "LINEDESK_SERVER_PORT",
    "LINEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS",
    "LINEDESK_LINE_CHANNEL_SECRET",
    "CHANNEL_SECRET",
    "LINEDESK_LINE_CHANNEL_ACCESS_TOKEN",
    "CHANNEL_ACCESS_TOKEN",
    "LINEDESK_LINE_API_BASE_URL",
    "LINEDESK_LLM_API_KEY",
    "OPENAI_API_KEY",
    "LINEDESK_LLM_BASE_URL",
    "LINEDESK_LLM_MODEL",
    "LINEDESK_LLM_TIMEOUT_SECS",
    "LINEDESK_LLM_HISTORY_TURNS",
    "LINEDESK_LOGGING_LEVEL",
    "LINEDESK_LOG_LEVEL",
    "LOG_LEVEL",
    "LINEDESK_LOGGING_FORMAT",
    "LINEDESK_LOG_FORMAT",
];
