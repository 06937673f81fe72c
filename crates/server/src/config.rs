//! Layered application configuration.
//!
//! Precedence, highest first:
//!
//! 1. `CONFIG_<SECTION>__<FIELD>` environment variables
//! 2. the YAML file at `CONFIG_PATH` (default `config.yaml`)
//! 3. built-in defaults
//!
//! The flat variables of older deployments (`SECURE_1PSID`, `API_KEY`,
//! `PORT`, ...) are applied on top of the result.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use gemproxy_core::pool::PoolConfig;
use gemproxy_webapi::{redact, Credential, WebClientConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

const ENV_PREFIX: &str = "CONFIG_";
const ENV_NESTED_DELIMITER: &str = "__";
const ENV_CLIENT_ID: &str = "env_client";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    /// Characters per streamed chunk.
    pub stream_chunk_chars: usize,
    /// Pause between streamed chunks.
    pub stream_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_key: None,
            request_timeout_secs: 120,
            stream_chunk_chars: 8,
            stream_delay_ms: 10,
        }
    }
}

/// Cookies for one Google account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub id: String,
    pub secure_1psid: String,
    #[serde(default)]
    pub secure_1psidts: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub clients: Vec<ClientCredentials>,
    pub proxy: Option<String>,
    /// Request timeout in seconds.
    pub timeout: u64,
    pub auto_refresh: bool,
    /// Cookie refresh interval in seconds.
    pub refresh_interval: u64,
    pub verbose: bool,
    pub max_chars_per_request: usize,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            clients: Vec::new(),
            proxy: None,
            timeout: 30,
            auto_refresh: true,
            refresh_interval: 540,
            verbose: false,
            max_chars_per_request: 900_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub max_size: usize,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub health_check_interval_secs: u64,
    pub max_retries: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 3,
            idle_timeout_secs: 900,
            max_lifetime_secs: 1800,
            health_check_interval_secs: 60,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub path: String,
    /// Conversations kept before the oldest are pruned.
    pub max_entries: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "./data/gemproxy.db".to_string(),
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    #[serde(alias = "debug")]
    Debug,
    #[default]
    #[serde(alias = "info")]
    Info,
    #[serde(alias = "warning", alias = "WARN", alias = "warn")]
    Warning,
    #[serde(alias = "error")]
    Error,
    #[serde(alias = "critical")]
    Critical,
}

impl LogLevel {
    /// Equivalent `tracing` filter directive.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Emit JSON lines instead of human readable output.
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_origins: Vec<String>,
    pub allow_credentials: bool,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        let any = vec!["*".to_string()];
        Self {
            enabled: true,
            allow_origins: any.clone(),
            allow_credentials: true,
            allow_methods: any.clone(),
            allow_headers: any,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub pool: PoolSettings,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
}

/// A loaded configuration and the problems found while reading it.
///
/// Warnings are returned rather than logged because logging is configured
/// from the result.
#[derive(Debug)]
pub struct Loaded {
    pub config: Config,
    pub warnings: Vec<String>,
}

/// Loads the configuration from the process environment and `CONFIG_PATH`.
pub fn load() -> Result<Loaded, ConfigError> {
    let env: HashMap<String, String> = std::env::vars().collect();
    let path = env
        .get("CONFIG_PATH")
        .cloned()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let yaml = match std::fs::read_to_string(&path) {
        Ok(contents) => Some(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(ConfigError::Read {
                path,
                reason: e.to_string(),
            })
        }
    };

    load_from(yaml.as_deref(), &env)
}

/// Builds the configuration from YAML text and environment variables.
pub fn load_from(yaml: Option<&str>, env: &HashMap<String, String>) -> Result<Loaded, ConfigError> {
    let mut root =
        serde_json::to_value(Config::default()).map_err(|e| ConfigError::Parse(e.to_string()))?;

    if let Some(yaml) = yaml.filter(|y| !y.trim().is_empty()) {
        let overlay: Value =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        // A file holding only comments parses to null.
        if !overlay.is_null() {
            merge(&mut root, overlay);
        }
    }

    let mut keys: Vec<&String> = env
        .keys()
        .filter(|k| k.starts_with(ENV_PREFIX) && k.as_str() != "CONFIG_PATH")
        .collect();
    keys.sort();

    for key in keys {
        let path: Vec<String> = key[ENV_PREFIX.len()..]
            .to_lowercase()
            .split(ENV_NESTED_DELIMITER)
            .map(str::to_string)
            .collect();
        let raw = &env[key];
        let value = coerce_env_value(lookup(&root, &path), raw);
        set_path(&mut root, &path, value);
    }

    let mut config: Config =
        serde_json::from_value(root).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let warnings = apply_legacy_env(&mut config, env);

    Ok(Loaded { config, warnings })
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn lookup<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root, |v, key| v.get(key))
}

fn set_path(root: &mut Value, path: &[String], value: Value) {
    let mut current = root;
    for key in path {
        if !current.is_object() {
            *current = Value::Object(Default::default());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map.entry(key.clone()).or_insert(Value::Null);
    }
    *current = value;
}

/// Interprets an env value as JSON, falling back to a plain string.
///
/// Fields that hold strings keep the raw text so `CONFIG_SERVER__API_KEY=123`
/// stays `"123"`.
fn coerce_env_value(existing: Option<&Value>, raw: &str) -> Value {
    let parsed = serde_json::from_str::<Value>(raw).ok();
    match (existing, parsed) {
        (Some(Value::String(_)), _) => Value::String(raw.to_string()),
        (Some(Value::Null), Some(Value::Number(_) | Value::Bool(_))) => {
            Value::String(raw.to_string())
        }
        (_, Some(value)) => value,
        (_, None) => Value::String(raw.to_string()),
    }
}

fn non_empty<'a>(env: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    env.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn apply_legacy_env(config: &mut Config, env: &HashMap<String, String>) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(psid) = non_empty(env, "SECURE_1PSID") {
        if config.gemini.clients.is_empty() {
            config.gemini.clients.push(ClientCredentials {
                id: ENV_CLIENT_ID.to_string(),
                secure_1psid: psid.to_string(),
                secure_1psidts: non_empty(env, "SECURE_1PSIDTS").map(str::to_string),
            });
        }
    }

    if let Some(key) = non_empty(env, "API_KEY") {
        config.server.api_key = Some(key.to_string());
    }
    if let Some(proxy) = non_empty(env, "GEMINI_PROXY") {
        config.gemini.proxy = Some(proxy.to_string());
    }
    if let Some(host) = non_empty(env, "HOST") {
        config.server.host = host.to_string();
    }

    if let Some(raw) = non_empty(env, "PORT") {
        match raw.parse::<u32>() {
            Ok(port @ 1..=65535) => config.server.port = port as u16,
            Ok(port) => warnings.push(format!(
                "PORT value out of range: {port}, using {}",
                config.server.port
            )),
            Err(_) => warnings.push(format!(
                "Invalid PORT value: {raw}, using {}",
                config.server.port
            )),
        }
    }

    if let Some(path) = non_empty(env, "STORAGE_PATH") {
        config.storage.path = path.to_string();
    }
    if let Some(raw) = non_empty(env, "STORAGE_MAX_ENTRIES") {
        match raw.parse::<usize>() {
            Ok(n) if n > 0 => config.storage.max_entries = n,
            _ => warnings.push(format!(
                "STORAGE_MAX_ENTRIES must be a positive integer, got {raw}"
            )),
        }
    }
    if let Some(raw) = non_empty(env, "MAX_CHARS_PER_REQUEST") {
        match raw.parse::<usize>() {
            Ok(n) if n > 0 => config.gemini.max_chars_per_request = n,
            _ => warnings.push(format!(
                "MAX_CHARS_PER_REQUEST must be a positive integer, got {raw}"
            )),
        }
    }
    if let Some(raw) = non_empty(env, "LOG_LEVEL") {
        match raw.parse::<LogLevel>() {
            Ok(level) => config.logging.level = level,
            Err(e) => warnings.push(format!("Ignoring LOG_LEVEL: {e}")),
        }
    }

    warnings
}

impl Config {
    /// Checks values the type system cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.server.port == 0 {
            return invalid("server.port must be between 1 and 65535");
        }
        if self.server.request_timeout_secs == 0 {
            return invalid("server.request_timeout_secs must be greater than zero");
        }
        if self.server.stream_chunk_chars == 0 {
            return invalid("server.stream_chunk_chars must be greater than zero");
        }
        if self.gemini.timeout == 0 {
            return invalid("gemini.timeout must be greater than zero");
        }
        if self.gemini.refresh_interval == 0 {
            return invalid("gemini.refresh_interval must be greater than zero");
        }
        if self.gemini.max_chars_per_request == 0 {
            return invalid("gemini.max_chars_per_request must be greater than zero");
        }
        if self.storage.max_entries == 0 {
            return invalid("storage.max_entries must be greater than zero");
        }
        self.pool_config()?;

        Ok(())
    }

    pub fn pool_config(&self) -> Result<PoolConfig, ConfigError> {
        PoolConfig::new(
            self.pool.max_size,
            Duration::from_secs(self.pool.idle_timeout_secs),
            Duration::from_secs(self.pool.max_lifetime_secs),
            Duration::from_secs(self.pool.health_check_interval_secs),
            self.pool.max_retries,
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn web_client_config(&self) -> WebClientConfig {
        WebClientConfig {
            proxy: self.gemini.proxy.clone(),
            timeout: Duration::from_secs(self.gemini.timeout),
            auto_refresh: self.gemini.auto_refresh,
            refresh_interval: Duration::from_secs(self.gemini.refresh_interval),
            verbose: self.gemini.verbose,
        }
    }

    pub fn credentials(&self) -> Vec<Credential> {
        self.gemini
            .clients
            .iter()
            .map(|c| Credential {
                id: c.id.clone(),
                secure_1psid: c.secure_1psid.clone(),
                secure_1psidts: c.secure_1psidts.clone(),
            })
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn stream_delay(&self) -> Duration {
        Duration::from_millis(self.server.stream_delay_ms)
    }

    /// Local `/health` URL of a server started with this config.
    ///
    /// Wildcard bind addresses are reached through loopback.
    pub fn health_url(&self) -> String {
        let host = match self.server.host.as_str() {
            "" | "0.0.0.0" => "127.0.0.1".to_string(),
            "::" => "[::1]".to_string(),
            host if host.contains(':') => format!("[{host}]"),
            host => host.to_string(),
        };
        format!("http://{host}:{}/health", self.server.port)
    }

    /// A copy with secrets shortened, safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.server.api_key = copy.server.api_key.as_deref().map(redact);
        for client in &mut copy.gemini.clients {
            client.secure_1psid = redact(&client.secure_1psid);
            client.secure_1psidts = client.secure_1psidts.as_deref().map(redact);
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let loaded = load_from(None, &HashMap::new()).unwrap();
        let config = loaded.config;

        assert_eq!(config, Config::default());
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.gemini.max_chars_per_request, 900_000);
        assert_eq!(config.pool.max_size, 3);
        assert_eq!(config.storage.max_entries, 10_000);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.cors.enabled);
        assert_eq!(config.cors.allow_origins, vec!["*"]);
        assert!(loaded.warnings.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let yaml = r#"
server:
  port: 9000
  api_key: sk-test
gemini:
  clients:
    - id: main
      secure_1psid: psid
      secure_1psidts: psidts
  proxy: http://proxy:3128
logging:
  level: DEBUG
"#;
        let config = load_from(Some(yaml), &HashMap::new()).unwrap().config;

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.gemini.clients.len(), 1);
        assert_eq!(config.gemini.clients[0].id, "main");
        assert_eq!(config.gemini.proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(config.gemini.timeout, 30);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_config_env_overrides_yaml() {
        let yaml = "server:\n  port: 9000\n";
        let env = env(&[
            ("CONFIG_SERVER__PORT", "9100"),
            ("CONFIG_GEMINI__AUTO_REFRESH", "false"),
            ("CONFIG_CORS__ALLOW_ORIGINS", r#"["https://a.example"]"#),
        ]);

        let config = load_from(Some(yaml), &env).unwrap().config;

        assert_eq!(config.server.port, 9100);
        assert!(!config.gemini.auto_refresh);
        assert_eq!(config.cors.allow_origins, vec!["https://a.example"]);
    }

    #[test]
    fn test_config_env_keeps_strings() {
        let env = env(&[
            ("CONFIG_SERVER__API_KEY", "12345"),
            ("CONFIG_SERVER__HOST", "127.0.0.1"),
        ]);

        let config = load_from(None, &env).unwrap().config;

        assert_eq!(config.server.api_key.as_deref(), Some("12345"));
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_config_env_clients_as_json() {
        let env = env(&[(
            "CONFIG_GEMINI__CLIENTS",
            r#"[{"id":"a","secure_1psid":"x"},{"id":"b","secure_1psid":"y","secure_1psidts":"z"}]"#,
        )]);

        let config = load_from(None, &env).unwrap().config;

        assert_eq!(config.gemini.clients.len(), 2);
        assert_eq!(config.gemini.clients[1].secure_1psidts.as_deref(), Some("z"));
    }

    #[test]
    fn test_health_url_follows_port() {
        let config = load_from(None, &env(&[("PORT", "9123")])).unwrap().config;
        assert_eq!(config.health_url(), "http://127.0.0.1:9123/health");

        let config = load_from(None, &env(&[("CONFIG_SERVER__HOST", "::")]))
            .unwrap()
            .config;
        assert_eq!(config.health_url(), "http://[::1]:8000/health");

        let config = load_from(None, &env(&[("HOST", "10.0.0.5")])).unwrap().config;
        assert_eq!(config.health_url(), "http://10.0.0.5:8000/health");
    }

    #[test]
    fn test_legacy_env() {
        let env = env(&[
            ("SECURE_1PSID", "g.a000psid"),
            ("SECURE_1PSIDTS", "sidts"),
            ("API_KEY", "sk-legacy"),
            ("GEMINI_PROXY", "socks5://127.0.0.1:1080"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("STORAGE_PATH", "/tmp/x.db"),
            ("MAX_CHARS_PER_REQUEST", "1000"),
            ("LOG_LEVEL", "warning"),
        ]);

        let loaded = load_from(None, &env).unwrap();
        let config = loaded.config;

        assert!(loaded.warnings.is_empty());
        assert_eq!(config.gemini.clients[0].id, "env_client");
        assert_eq!(config.gemini.clients[0].secure_1psidts.as_deref(), Some("sidts"));
        assert_eq!(config.server.api_key.as_deref(), Some("sk-legacy"));
        assert_eq!(config.gemini.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.path, "/tmp/x.db");
        assert_eq!(config.gemini.max_chars_per_request, 1000);
        assert_eq!(config.logging.level, LogLevel::Warning);
    }

    #[test]
    fn test_env_client_only_when_no_clients_configured() {
        let yaml = "gemini:\n  clients:\n    - id: yaml\n      secure_1psid: p\n";
        let env = env(&[("SECURE_1PSID", "env")]);

        let config = load_from(Some(yaml), &env).unwrap().config;

        assert_eq!(config.gemini.clients.len(), 1);
        assert_eq!(config.gemini.clients[0].id, "yaml");
    }

    #[test]
    fn test_invalid_legacy_values_warn() {
        let env = env(&[
            ("PORT", "70000"),
            ("MAX_CHARS_PER_REQUEST", "-1"),
            ("LOG_LEVEL", "LOUD"),
        ]);

        let loaded = load_from(None, &env).unwrap();

        assert_eq!(loaded.config.server.port, 8000);
        assert_eq!(loaded.config.gemini.max_chars_per_request, 900_000);
        assert_eq!(loaded.warnings.len(), 3);
        assert!(loaded.warnings[0].contains("out of range"));
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        let result = load_from(Some("server: [unclosed"), &HashMap::new());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_empty_yaml_is_fine() {
        let config = load_from(Some(""), &HashMap::new()).unwrap().config;
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pool.max_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gemini.timeout = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gemini.max_chars_per_request = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_filters() {
        assert_eq!(LogLevel::Warning.as_filter(), "warn");
        assert_eq!(LogLevel::Critical.as_filter(), "error");
        assert_eq!("critical".parse::<LogLevel>(), Ok(LogLevel::Critical));
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = Config::default();
        config.server.api_key = Some("sk-abcdefghijklmnop".to_string());
        config.gemini.clients.push(ClientCredentials {
            id: "main".to_string(),
            secure_1psid: "g.a000abcdefghijklmnop".to_string(),
            secure_1psidts: None,
        });

        let redacted = config.redacted();

        assert_eq!(redacted.server.api_key.as_deref(), Some("sk-abcdefg..."));
        assert_eq!(redacted.gemini.clients[0].secure_1psid, "g.a000abcd...");
        assert_eq!(redacted.gemini.clients[0].id, "main");
    }
}
