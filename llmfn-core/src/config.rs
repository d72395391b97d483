//! Runtime configuration: client definitions, primary client and default
//! versions, loaded from JSON and the environment.

use crate::client::{ClientConfig, ClientRegistry};
use crate::error::Error;
use crate::runtime::RegistryConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Path of a JSON config file read by [`RuntimeConfig::from_env`]
pub const CONFIG_PATH_ENV: &str = "LLMFN_CONFIG";
/// Primary client override read by [`RuntimeConfig::from_env`]
pub const PRIMARY_CLIENT_ENV: &str = "LLMFN_PRIMARY_CLIENT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub clients: Vec<ClientConfig>,
    pub primary_client: Option<String>,
    pub default_versions: HashMap<String, String>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.clients.push(client);
        self
    }

    pub fn with_primary_client(mut self, name: impl Into<String>) -> Self {
        self.primary_client = Some(name.into());
        self
    }

    pub fn with_default_version(mut self, function: impl Into<String>, version: impl Into<String>) -> Self {
        self.default_versions.insert(function.into(), version.into());
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    /// Load from `LLMFN_CONFIG` (if set), then apply `LLMFN_PRIMARY_CLIENT`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            Some(path) => {
                tracing::debug!("loading runtime config from {}", path);
                Self::from_path(path)?
            }
            None => Self::default(),
        };
        if let Some(primary) = lookup(PRIMARY_CLIENT_ENV).filter(|p| !p.is_empty()) {
            config.primary_client = Some(primary);
        }
        Ok(config)
    }

    /// Register the configured clients and primary client.
    pub fn apply(&self, clients: &ClientRegistry) -> Result<()> {
        for client in &self.clients {
            clients.add_client(client.clone());
        }
        if let Some(primary) = &self.primary_client {
            if !clients.contains(primary) {
                return Err(Error::client_not_found(primary.as_str()));
            }
            clients.set_primary(primary.as_str());
        }
        Ok(())
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            default_versions: self.default_versions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "clients": [
            {"name": "A", "provider": "mock", "model": "model-a"},
            {"name": "B", "provider": "mock", "model": "model-b", "params": {"temperature": 0.1}}
        ],
        "primary_client": "B",
        "default_versions": {"Classify": "v2"}
    }"#;

    #[test]
    fn test_from_json_str() {
        let config = RuntimeConfig::from_json_str(CONFIG).unwrap();
        assert_eq!(config.clients.len(), 2);
        assert_eq!(config.clients[1].params["temperature"], 0.1);
        assert_eq!(config.primary_client.as_deref(), Some("B"));
        assert_eq!(
            config.registry_config().default_versions["Classify"],
            "v2"
        );
    }

    #[test]
    fn test_missing_sections_default() {
        let config = RuntimeConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert!(RuntimeConfig::from_json_str("{\"clients\": 3}").is_err());
    }

    #[test]
    fn test_apply_registers_clients() {
        let clients = ClientRegistry::new();
        RuntimeConfig::from_json_str(CONFIG)
            .unwrap()
            .apply(&clients)
            .unwrap();
        assert!(clients.contains("A"));
        assert_eq!(clients.primary().as_deref(), Some("B"));

        let err = RuntimeConfig::new()
            .with_primary_client("Ghost")
            .apply(&ClientRegistry::new())
            .unwrap_err();
        assert!(matches!(err, Error::Registry(_)));
    }

    #[test]
    fn test_env_lookup() {
        let path = std::env::temp_dir().join(format!("llmfn-config-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, CONFIG).unwrap();
        let path_str = path.to_string_lossy().to_string();

        let config = RuntimeConfig::from_lookup(|key| match key {
            CONFIG_PATH_ENV => Some(path_str.clone()),
            PRIMARY_CLIENT_ENV => Some("A".to_string()),
            _ => None,
        })
        .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.clients.len(), 2);
        assert_eq!(config.primary_client.as_deref(), Some("A"));

        let empty = RuntimeConfig::from_lookup(|_| None).unwrap();
        assert_eq!(empty, RuntimeConfig::default());

        let missing = RuntimeConfig::from_lookup(|key| {
            (key == CONFIG_PATH_ENV).then(|| "/nonexistent/llmfn.json".to_string())
        });
        assert!(matches!(missing, Err(Error::Configuration(_))));
    }
}
