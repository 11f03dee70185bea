use crate::config::{Config, NetworkConfig};
use alloy::{
    providers::{Provider, ProviderBuilder, RootProvider},
    transports::http::{Client, Http},
};
use anyhow::{anyhow, Result};
use std::collections::HashMap;

/// Holds one HTTP provider per configured network, keyed by chain key.
///
/// WebSocket connections are not pooled here; event subscriptions open them
/// on demand from the configured `ws_rpc` endpoint.
#[derive(Debug)]
pub struct ProviderManager {
    providers: HashMap<String, RootProvider<Http<Client>>>,
    config: Config,
}

impl ProviderManager {
    pub fn new(config: Config) -> Result<Self> {
        let mut providers = HashMap::new();

        for (chain_key, network_config) in &config.networks {
            let provider = Self::create_provider(network_config)?;
            providers.insert(chain_key.clone(), provider);
        }

        Ok(Self { providers, config })
    }

    fn create_provider(network_config: &NetworkConfig) -> Result<RootProvider<Http<Client>>> {
        let provider = ProviderBuilder::new().on_http(network_config.http_rpc.parse()?);

        Ok(provider)
    }

    pub fn get_provider(&self, chain: Option<&str>) -> Result<&RootProvider<Http<Client>>> {
        let chain_key = chain.unwrap_or(&self.config.default_network);
        self.providers
            .get(chain_key)
            .ok_or_else(|| anyhow!("Chain '{}' not found", chain_key))
    }

    pub fn get_network_config(&self, chain: Option<&str>) -> Result<&NetworkConfig> {
        let chain_key = chain.unwrap_or(&self.config.default_network);
        self.config
            .networks
            .get(chain_key)
            .ok_or_else(|| anyhow!("Chain '{}' not configured", chain_key))
    }

    /// WebSocket endpoint for a chain, used by event subscriptions.
    pub fn get_ws_url(&self, chain: Option<&str>) -> Result<String> {
        let chain_key = chain.unwrap_or(&self.config.default_network);
        self.get_network_config(chain)?
            .ws_rpc
            .clone()
            .ok_or_else(|| {
                anyhow!(
                    "Chain '{}' has no WebSocket endpoint configured, event subscriptions are unavailable",
                    chain_key
                )
            })
    }

    pub fn get_available_chains(&self) -> Vec<String> {
        self.config.networks.keys().cloned().collect()
    }

    /// Chain id a chain key maps to, from configuration (no RPC round trip).
    pub fn configured_chain_id(&self, chain: Option<&str>) -> Result<u64> {
        Ok(self.get_network_config(chain)?.chain_id)
    }

    pub async fn check_connection(&self, chain: Option<&str>) -> Result<bool> {
        let provider = self
            .get_provider(chain)
            .map_err(|e| anyhow!("Failed to get provider for connection check: {}", e))?;

        match provider.get_block_number().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::debug!(
                    "Connection check failed for chain {}: {}",
                    chain.unwrap_or("default"),
                    e
                );
                Ok(false)
            }
        }
    }

    pub async fn get_chain_id(&self, chain: Option<&str>) -> Result<u64> {
        let provider = self.get_provider(chain)?;
        let chain_id = provider.get_chain_id().await?;
        Ok(chain_id)
    }
}
