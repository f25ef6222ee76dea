use std::env;
use std::fs;
use std::path::Path;

use linedesk_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let sources = Sources {
        doc: load_config_file_doc(config_file_path.as_deref()),
        path: config_file_path.as_deref(),
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut push = |key: &str, value: &str, env_keys: &[&str]| {
        lines.push(render_line(key, value, sources.field_source(key, env_keys)));
    };

    push("app.env", &config.app.env, &["LINEDESK_APP_ENV", "APP_ENV"]);
    push("server.bind_address", &config.server.bind_address, &["LINEDESK_SERVER_BIND_ADDRESS"]);
    push("server.port", &config.server.port.to_string(), &["LINEDESK_SERVER_PORT"]);
    push(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        &["LINEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
    );

    push(
        "line.channel_secret",
        &redact_secret(config.line.channel_secret.as_ref()),
        &["LINEDESK_LINE_CHANNEL_SECRET", "CHANNEL_SECRET"],
    );
    push(
        "line.channel_access_token",
        &redact_secret(config.line.channel_access_token.as_ref()),
        &["LINEDESK_LINE_CHANNEL_ACCESS_TOKEN", "CHANNEL_ACCESS_TOKEN"],
    );
    push("line.api_base_url", &config.line.api_base_url, &["LINEDESK_LINE_API_BASE_URL"]);

    push(
        "llm.api_key",
        &redact_secret(config.llm.api_key.as_ref()),
        &["LINEDESK_LLM_API_KEY", "OPENAI_API_KEY"],
    );
    push("llm.base_url", &config.llm.base_url, &["LINEDESK_LLM_BASE_URL"]);
    push("llm.model", &config.llm.model, &["LINEDESK_LLM_MODEL"]);
    push("llm.timeout_secs", &config.llm.timeout_secs.to_string(), &["LINEDESK_LLM_TIMEOUT_SECS"]);
    push(
        "llm.history_turns",
        &config.llm.history_turns.to_string(),
        &["LINEDESK_LLM_HISTORY_TURNS"],
    );

    push(
        "logging.level",
        &config.logging.level,
        &["LINEDESK_LOGGING_LEVEL", "LINEDESK_LOG_LEVEL", "LOG_LEVEL"],
    );
    push(
        "logging.format",
        &format!("{:?}", config.logging.format),
        &["LINEDESK_LOGGING_FORMAT", "LINEDESK_LOG_FORMAT"],
    );

    lines.join("\n")
}

struct Sources<'a> {
    doc: Option<Value>,
    path: Option<&'a Path>,
}

impl Sources<'_> {
    fn field_source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let tail: String = trimmed.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    if trimmed.chars().count() > 12 {
        return format!("<redacted>…{tail}");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{contains_path, redact_secret};

    #[test]
    fn secrets_are_never_printed_in_full() {
        let long: SecretString = "abcdefghijklmnopqrstuvwxyz".to_string().into();
        let short: SecretString = "hunter2".to_string().into();
        let blank: SecretString = "  ".to_string().into();

        assert_eq!(redact_secret(Some(&long)), "<redacted>…wxyz");
        assert_eq!(redact_secret(Some(&short)), "<redacted>");
        assert_eq!(redact_secret(Some(&blank)), "<empty>");
        assert_eq!(redact_secret(None), "<unset>");
    }

    #[test]
    fn dotted_paths_resolve_nested_tables() {
        let doc: toml::Value = "[llm]\nmodel = \"gpt-4o-mini\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.base_url"));
        assert!(!contains_path(&doc, "server.port"));
    }
}
