use std::env;
use std::fs;
use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub auth: AuthConfig,
    pub wallet: WalletConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,
    pub token_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WalletConfig {
    pub base_url: String,
    pub api_key: SecretString,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
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
    pub log_format: Option<LogFormat>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub wallet_api_key: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
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
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://trusty.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: "gpt-4".to_string(),
                timeout_secs: 30,
            },
            auth: AuthConfig {
                jwt_secret: String::from("insecure-dev-secret").into(),
                token_ttl_secs: 3_600,
            },
            wallet: WalletConfig {
                base_url: "https://api.bridge.example/v1".to_string(),
                api_key: String::from("demo_key").into(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8_000,
                health_check_port: 8_080,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
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

/// TOML shape of the config file. Every field is optional; anything absent
/// keeps the built-in default.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    database: FileDatabase,
    #[serde(default)]
    llm: FileLlm,
    #[serde(default)]
    auth: FileAuth,
    #[serde(default)]
    wallet: FileWallet,
    #[serde(default)]
    server: FileServer,
    #[serde(default)]
    logging: FileLogging,
}

#[derive(Debug, Default, Deserialize)]
struct FileDatabase {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileLlm {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileAuth {
    jwt_secret: Option<String>,
    token_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileWallet {
    base_url: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileServer {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct FileLogging {
    level: Option<String>,
    format: Option<LogFormat>,
}

const DEFAULT_CONFIG_PATH: &str = "trusty.toml";

impl AppConfig {
    /// Precedence, lowest to highest: built-in defaults, config file,
    /// `TRUSTY_*` environment variables, explicit overrides.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        match fs::read_to_string(&path) {
            Ok(raw) => {
                let file: FileConfig = toml::from_str(&raw)
                    .map_err(|source| ConfigError::ParseFile { path: path.clone(), source })?;
                config.apply_file(file);
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                if options.require_file {
                    return Err(ConfigError::MissingConfigFile(path));
                }
            }
            Err(source) => return Err(ConfigError::ReadFile { path, source }),
        }

        config.apply_env()?;
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(url) = file.database.url {
            self.database.url = url;
        }
        if let Some(max) = file.database.max_connections {
            self.database.max_connections = max;
        }
        if let Some(timeout) = file.database.timeout_secs {
            self.database.timeout_secs = timeout;
        }
        if let Some(provider) = file.llm.provider {
            self.llm.provider = provider;
        }
        if let Some(key) = file.llm.api_key {
            self.llm.api_key = Some(key.into());
        }
        if let Some(base_url) = file.llm.base_url {
            self.llm.base_url = Some(base_url);
        }
        if let Some(model) = file.llm.model {
            self.llm.model = model;
        }
        if let Some(timeout) = file.llm.timeout_secs {
            self.llm.timeout_secs = timeout;
        }
        if let Some(secret) = file.auth.jwt_secret {
            self.auth.jwt_secret = secret.into();
        }
        if let Some(ttl) = file.auth.token_ttl_secs {
            self.auth.token_ttl_secs = ttl;
        }
        if let Some(base_url) = file.wallet.base_url {
            self.wallet.base_url = base_url;
        }
        if let Some(key) = file.wallet.api_key {
            self.wallet.api_key = key.into();
        }
        if let Some(bind) = file.server.bind_address {
            self.server.bind_address = bind;
        }
        if let Some(port) = file.server.port {
            self.server.port = port;
        }
        if let Some(port) = file.server.health_check_port {
            self.server.health_check_port = port;
        }
        if let Some(level) = file.logging.level {
            self.logging.level = level;
        }
        if let Some(format) = file.logging.format {
            self.logging.format = format;
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(url) = read_env("TRUSTY_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(level) = read_env("TRUSTY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = read_env("TRUSTY_LOG_FORMAT") {
            self.logging.format = format.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "TRUSTY_LOG_FORMAT".to_string(),
                value: format,
            })?;
        }
        if let Some(provider) = read_env("TRUSTY_LLM_PROVIDER") {
            self.llm.provider =
                provider.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "TRUSTY_LLM_PROVIDER".to_string(),
                    value: provider,
                })?;
        }
        if let Some(model) = read_env("TRUSTY_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = read_env("TRUSTY_LLM_API_KEY") {
            self.llm.api_key = Some(key.into());
        }
        if let Some(secret) = read_env("TRUSTY_JWT_SECRET") {
            self.auth.jwt_secret = secret.into();
        }
        if let Some(key) = read_env("TRUSTY_WALLET_API_KEY") {
            self.wallet.api_key = key.into();
        }
        if let Some(bind) = read_env("TRUSTY_BIND_ADDRESS") {
            self.server.bind_address = bind;
        }
        if let Some(port) = read_env("TRUSTY_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "TRUSTY_PORT".to_string(),
                value: port,
            })?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.database_url {
            self.database.url = url;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
        if let Some(provider) = overrides.llm_provider {
            self.llm.provider = provider;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(key) = overrides.llm_api_key {
            self.llm.api_key = Some(key.into());
        }
        if let Some(secret) = overrides.jwt_secret {
            self.auth.jwt_secret = secret.into();
        }
        if let Some(key) = overrides.wallet_api_key {
            self.wallet.api_key = key.into();
        }
        if let Some(bind) = overrides.bind_address {
            self.server.bind_address = bind;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        use secrecy::ExposeSecret;

        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.auth.jwt_secret.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation("auth.jwt_secret must not be empty".to_string()));
        }
        if self.auth.token_ttl_secs < 60 {
            return Err(ConfigError::Validation(
                "auth.token_ttl_secs must be at least 60".to_string(),
            ));
        }
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.bind_address must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
