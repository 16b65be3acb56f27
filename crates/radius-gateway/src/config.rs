use crate::filters::FilterKind;
use crate::modules::ModuleKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),
    #[error("Unknown module: {0}")]
    UnknownModule(String),
    #[error("Module {module}: {reason}")]
    Module { module: String, reason: String },
}

impl ConfigError {
    pub fn module(module: &str, reason: impl Into<String>) -> Self {
        ConfigError::Module {
            module: module.to_string(),
            reason: reason.into(),
        }
    }
}

/// Duplicate request window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_dedup_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_dedup_max_entries")]
    pub max_entries: usize,
}

fn default_dedup_ttl() -> u64 {
    30
}

fn default_dedup_max_entries() -> usize {
    10_000
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            ttl_secs: default_dedup_ttl(),
            max_entries: default_dedup_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStorageConfig {
    /// Only `in_memory` is supported
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// Lifetime of a session record after its last write
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

fn default_storage_backend() -> String {
    "in_memory".to_string()
}

impl Default for SessionStorageConfig {
    fn default() -> Self {
        SessionStorageConfig {
            backend: default_storage_backend(),
            ttl_secs: Some(86_400),
        }
    }
}

impl SessionStorageConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// A named slice of traffic and the percentage of sessions it receives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanaryConfig {
    pub name: String,
    pub weight: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadBalanceConfig {
    #[serde(default)]
    pub canaries: Vec<CanaryConfig>,
}

/// One entry of a listener's module chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    /// Free-form options decoded by the module at init
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl ModuleConfig {
    pub fn new(name: impl Into<String>, config: Value) -> Self {
        let config = match config {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        ModuleConfig {
            name: name.into(),
            config,
        }
    }

    /// Decode the option map into a module's typed options
    pub fn options<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        serde_json::from_value(Value::Object(self.config.clone()))
            .map_err(|e| ConfigError::module(&self.name, e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub name: String,
    /// ip:port to bind
    pub address: String,
    /// Shared secret for this listener's clients, defaults to the global secret
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

impl ListenerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.address.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "Listener {} has invalid address: {}",
                self.name, self.address
            ))
        })
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Default shared secret
    #[serde(default = "default_secret")]
    pub secret: String,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub session_storage: SessionStorageConfig,

    #[serde(default)]
    pub load_balance: LoadBalanceConfig,

    /// Filters run in order before every listener's module chain
    #[serde(default)]
    pub filters: Vec<String>,

    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,
}

fn default_secret() -> String {
    "testing123".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            secret: default_secret(),
            log_level: None,
            dedup: DedupConfig::default(),
            session_storage: SessionStorageConfig::default(),
            load_balance: LoadBalanceConfig::default(),
            filters: Vec::new(),
            listeners: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: GatewayConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn listener(&self, name: &str) -> Option<&ListenerConfig> {
        self.listeners.iter().find(|l| l.name == name)
    }

    pub fn secret_for(&self, listener: &ListenerConfig) -> Vec<u8> {
        listener
            .secret
            .as_deref()
            .unwrap_or(&self.secret)
            .as_bytes()
            .to_vec()
    }

    /// Structural checks and name resolution; module options are checked
    /// when each module is built
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::Invalid("Secret cannot be empty".to_string()));
        }

        if self.session_storage.backend != "in_memory" {
            return Err(ConfigError::Invalid(format!(
                "Unsupported session storage backend: {}",
                self.session_storage.backend
            )));
        }

        if self.dedup.max_entries == 0 || self.dedup.ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "Dedup window needs a non-zero ttl and capacity".to_string(),
            ));
        }

        for filter in &self.filters {
            FilterKind::from_name(filter)
                .ok_or_else(|| ConfigError::UnknownFilter(filter.clone()))?;
        }

        if self.listeners.is_empty() {
            return Err(ConfigError::Invalid("No listeners configured".to_string()));
        }

        let mut names = HashSet::new();
        for listener in &self.listeners {
            if !names.insert(listener.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate listener name: {}",
                    listener.name
                )));
            }
            listener.socket_addr()?;
            if listener.secret.as_deref() == Some("") {
                return Err(ConfigError::Invalid(format!(
                    "Listener {} has empty secret",
                    listener.name
                )));
            }
            for module in &listener.modules {
                ModuleKind::from_name(&module.name)
                    .ok_or_else(|| ConfigError::UnknownModule(module.name.clone()))?;
            }
        }

        Ok(())
    }

    /// Create an example configuration
    pub fn example() -> Self {
        GatewayConfig {
            secret: "testing123".to_string(),
            log_level: Some("info".to_string()),
            dedup: DedupConfig::default(),
            session_storage: SessionStorageConfig::default(),
            load_balance: LoadBalanceConfig {
                canaries: vec![CanaryConfig {
                    name: "canary".to_string(),
                    weight: 5,
                }],
            },
            filters: vec!["lb_canary".to_string()],
            listeners: vec![
                ListenerConfig {
                    name: "auth".to_string(),
                    address: "0.0.0.0:1812".to_string(),
                    secret: None,
                    modules: vec![
                        ModuleConfig::new("analytics", Value::Null),
                        ModuleConfig::new(
                            "proxy",
                            serde_json::json!({ "Target": "127.0.0.1:11812", "TimeoutMs": 3000 }),
                        ),
                    ],
                },
                ListenerConfig {
                    name: "acct".to_string(),
                    address: "0.0.0.0:1813".to_string(),
                    secret: None,
                    modules: vec![
                        ModuleConfig::new("analytics", Value::Null),
                        ModuleConfig::new("coa_dynamic", serde_json::json!({})),
                        ModuleConfig::new(
                            "proxy",
                            serde_json::json!({ "Target": "127.0.0.1:11813", "TimeoutMs": 3000 }),
                        ),
                    ],
                },
                ListenerConfig {
                    name: "coa".to_string(),
                    address: "0.0.0.0:3799".to_string(),
                    secret: None,
                    modules: vec![ModuleConfig::new(
                        "coa_dynamic",
                        serde_json::json!({ "Port": 3799, "TimeoutMs": 2000 }),
                    )],
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_example_config_is_valid() {
        assert!(GatewayConfig::example().validate().is_ok());
    }

    #[test]
    fn test_defaults_applied() {
        let config: GatewayConfig = serde_json::from_str(
            r#"{ "listeners": [ { "name": "auth", "address": "127.0.0.1:1812" } ] }"#,
        )
        .unwrap();
        assert_eq!(config.secret, "testing123");
        assert_eq!(config.dedup.ttl_secs, 30);
        assert_eq!(config.session_storage.backend, "in_memory");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_filter_rejected() {
        let mut config = GatewayConfig::example();
        config.filters.push("geo".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::UnknownFilter(name)) if name == "geo"));
    }

    #[test]
    fn test_unknown_module_rejected() {
        let mut config = GatewayConfig::example();
        config.listeners[0]
            .modules
            .push(ModuleConfig::new("ldap", Value::Null));
        assert!(matches!(config.validate(), Err(ConfigError::UnknownModule(name)) if name == "ldap"));
    }

    #[test]
    fn test_bad_listener_address() {
        let mut config = GatewayConfig::example();
        config.listeners[1].address = "localhost".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_listener_names() {
        let mut config = GatewayConfig::example();
        config.listeners[1].name = "auth".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_module_options_decoding() {
        #[derive(Deserialize)]
        #[serde(rename_all = "PascalCase")]
        struct Options {
            target: String,
            timeout_ms: Option<u64>,
        }

        let module = ModuleConfig::new(
            "proxy",
            serde_json::json!({ "Target": "10.0.0.1:1812", "TimeoutMs": 500 }),
        );
        let options: Options = module.options().unwrap();
        assert_eq!(options.target, "10.0.0.1:1812");
        assert_eq!(options.timeout_ms, Some(500));

        let missing = ModuleConfig::new("proxy", Value::Null);
        assert!(matches!(
            missing.options::<Options>(),
            Err(ConfigError::Module { .. })
        ));
    }

    #[test]
    fn test_from_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&GatewayConfig::example()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.listeners.len(), 3);
        assert_eq!(loaded.load_balance.canaries[0].weight, 5);
        assert_eq!(loaded.listener("coa").unwrap().modules[0].name, "coa_dynamic");
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = GatewayConfig::from_file(dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
