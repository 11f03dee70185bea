use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub networks: HashMap<String, NetworkConfig>,
    pub default_network: String,
    pub security: SecurityConfig,
    pub registry: RegistryConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Display name shown in tool output.
    pub name: String,
    pub chain_id: u64,
    pub http_rpc: String,
    /// WebSocket endpoint used for event subscriptions. Networks without one
    /// cannot be subscribed to.
    pub ws_rpc: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub allow_write_operations: bool,
    pub require_confirmation: bool,
}

/// Where the shared on-chain contract registry lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub address: String,
    /// Key into `networks` naming the chain the registry is deployed on.
    pub chain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub transport: String,
}

fn network(name: &str, chain_id: u64, http: &str, ws: Option<&str>) -> NetworkConfig {
    NetworkConfig {
        name: name.to_string(),
        chain_id,
        http_rpc: http.to_string(),
        ws_rpc: ws.map(str::to_string),
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut networks = HashMap::new();

        networks.insert(
            "ethereum_testnet".to_string(),
            network(
                "Sepolia",
                11155111,
                "https://ethereum-sepolia-rpc.publicnode.com",
                Some("wss://ethereum-sepolia-rpc.publicnode.com"),
            ),
        );
        networks.insert(
            "ethereum_mainnet".to_string(),
            network(
                "Ethereum",
                1,
                "https://ethereum-rpc.publicnode.com",
                Some("wss://ethereum-rpc.publicnode.com"),
            ),
        );
        networks.insert(
            "astar_mainnet".to_string(),
            network("Astar", 592, "https://evm.astar.network", None),
        );
        networks.insert(
            "binance_testnet".to_string(),
            network(
                "BSC Testnet",
                97,
                "https://bsc-testnet-rpc.publicnode.com",
                Some("wss://bsc-testnet-rpc.publicnode.com"),
            ),
        );
        networks.insert(
            "binance_mainnet".to_string(),
            network(
                "BSC",
                56,
                "https://bsc-rpc.publicnode.com",
                Some("wss://bsc-rpc.publicnode.com"),
            ),
        );
        networks.insert(
            "arbitrum_testnet".to_string(),
            network(
                "Arbitrum Sepolia",
                421614,
                "https://arbitrum-sepolia-rpc.publicnode.com",
                Some("wss://arbitrum-sepolia-rpc.publicnode.com"),
            ),
        );
        networks.insert(
            "arbitrum_mainnet".to_string(),
            network(
                "Arbitrum One",
                42161,
                "https://arbitrum-one-rpc.publicnode.com",
                Some("wss://arbitrum-one-rpc.publicnode.com"),
            ),
        );
        networks.insert(
            "base_testnet".to_string(),
            network(
                "Base Sepolia",
                84532,
                "https://base-sepolia-rpc.publicnode.com",
                Some("wss://base-sepolia-rpc.publicnode.com"),
            ),
        );
        networks.insert(
            "base_mainnet".to_string(),
            network(
                "Base",
                8453,
                "https://base-rpc.publicnode.com",
                Some("wss://base-rpc.publicnode.com"),
            ),
        );

        Self {
            networks,
            default_network: "ethereum_testnet".to_string(),
            security: SecurityConfig {
                allow_write_operations: false,
                require_confirmation: true,
            },
            registry: RegistryConfig {
                address: "0xa03fcbbe72ed1a1de989399de0a5f16c7d2e0c65".to_string(),
                chain: "ethereum_testnet".to_string(),
            },
            server: ServerConfig {
                transport: "stdio".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars();
        config
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_vars(&mut self) {
        if let Ok(address) = std::env::var("ABIDECK_REGISTRY_ADDRESS") {
            tracing::info!("Registry address overridden from environment");
            self.registry.address = address;
        }

        if std::env::var("WALLET_PRIVATE_KEY").is_ok() {
            tracing::debug!("WALLET_PRIVATE_KEY found, wallet tools will be available");
        }
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<std::path::PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("abideck").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# Abideck Server Configuration File
# This file configures networks, the contract registry, and security settings

# Default network used when a tool call names none
default_network = "ethereum_testnet"

# Network configurations; the key is the chain name used in tool calls
[networks.ethereum_testnet]
name = "Sepolia"
chain_id = 11155111
http_rpc = "https://ethereum-sepolia-rpc.publicnode.com"
ws_rpc = "wss://ethereum-sepolia-rpc.publicnode.com"

[networks.ethereum_mainnet]
name = "Ethereum"
chain_id = 1
http_rpc = "https://ethereum-rpc.publicnode.com"
ws_rpc = "wss://ethereum-rpc.publicnode.com"

[networks.base_testnet]
name = "Base Sepolia"
chain_id = 84532
http_rpc = "https://base-sepolia-rpc.publicnode.com"
ws_rpc = "wss://base-sepolia-rpc.publicnode.com"

# On-chain contract registry
[registry]
address = "0xa03fcbbe72ed1a1de989399de0a5f16c7d2e0c65"
chain = "ethereum_testnet"

# Security settings
[security]
allow_write_operations = false
require_confirmation = true

# Server configuration
[server]
transport = "stdio"

# Environment variables that can be used:
# WALLET_PRIVATE_KEY - hex private key enabling write and signing tools
# ABIDECK_REGISTRY_ADDRESS - override the registry contract address
"#;
        sample_config.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_networks() {
        let config = Config::default();
        assert_eq!(config.default_network, "ethereum_testnet");
        assert_eq!(config.networks["ethereum_testnet"].chain_id, 11155111);
        assert_eq!(config.networks["base_testnet"].chain_id, 84532);
        assert_eq!(config.networks.len(), 9);

        // Astar has no public websocket endpoint configured
        assert!(config.networks["astar_mainnet"].ws_rpc.is_none());
    }

    #[test]
    fn test_sample_config_parses() {
        let config: Config = toml::from_str(&Config::generate_sample()).unwrap();
        assert_eq!(config.registry.chain, "ethereum_testnet");
        assert!(!config.security.allow_write_operations);
    }
}
