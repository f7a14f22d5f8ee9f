use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use trusty_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: Option<&str>| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", Some("TRUSTY_DATABASE_URL")),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", None),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", None),
    ));

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        source("llm.provider", Some("TRUSTY_LLM_PROVIDER")),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        source("llm.model", Some("TRUSTY_LLM_MODEL")),
    ));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        source("llm.base_url", None),
    ));
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line("llm.api_key", llm_api_key, source("llm.api_key", Some("TRUSTY_LLM_API_KEY"))));

    lines.push(render_line(
        "auth.jwt_secret",
        "<redacted>",
        source("auth.jwt_secret", Some("TRUSTY_JWT_SECRET")),
    ));
    lines.push(render_line(
        "auth.token_ttl_secs",
        &config.auth.token_ttl_secs.to_string(),
        source("auth.token_ttl_secs", None),
    ));

    lines.push(render_line(
        "wallet.base_url",
        &config.wallet.base_url,
        source("wallet.base_url", None),
    ));
    lines.push(render_line(
        "wallet.api_key",
        "<redacted>",
        source("wallet.api_key", Some("TRUSTY_WALLET_API_KEY")),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", Some("TRUSTY_BIND_ADDRESS")),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", Some("TRUSTY_PORT")),
    ));
    lines.push(render_line(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        source("server.health_check_port", None),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", Some("TRUSTY_LOG_LEVEL")),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", Some("TRUSTY_LOG_FORMAT")),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let path = PathBuf::from("trusty.toml");
    path.exists().then_some(path)
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
