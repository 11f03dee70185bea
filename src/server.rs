use anyhow::Result;
use rmcp::{
    model::{ServerCapabilities, ServerInfo},
    tool,
    transport::stdio,
    ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    config::Config,
    error::AppError,
    ethereum::{
        codec::{self, ResolvedParam},
        contract_surface,
        events::SubscriptionManager,
        gateway::ContractGateway,
        provider::ProviderManager,
        utils, ContractRecord,
    },
    registry::{
        local::{LocalRegistry, NewContract},
        onchain::OnchainRegistry,
    },
    wallet::{recover_signer, LocalWallet, WalletProvider},
};

#[derive(Clone)]
pub struct AbideckServer {
    gateway: Arc<ContractGateway>,
    subscriptions: Arc<tokio::sync::Mutex<SubscriptionManager>>,
    registry: Arc<LocalRegistry>,
    onchain: Arc<OnchainRegistry>,
    wallet: Option<Arc<LocalWallet>>,
    config: Arc<Config>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct SaveContractRequest {
    name: String,
    address: String,
    /// Contract ABI, either as structured JSON or as a JSON string
    abi: Value,
    chain: String,
    is_public: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ContractIdRequest {
    contract_id: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct CallFunctionRequest {
    contract_id: String,
    function_name: String,
    /// Parameter values keyed by parameter name, all as entered text
    inputs: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct EstimateGasRequest {
    contract_id: String,
    function_name: String,
    inputs: HashMap<String, String>,
    from: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct SubscribeEventRequest {
    contract_id: String,
    event_name: String,
    /// Optional filter values for indexed parameters, keyed by name.
    /// Empty strings are treated as no filter.
    filters: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct SubscriptionIdRequest {
    subscription_id: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct SignMessageRequest {
    message: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct VerifySignatureRequest {
    message: String,
    signature: String,
    /// When given, the result reports whether the recovered signer matches
    expected_address: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct RegisterOnchainRequest {
    contract_id: String,
    is_public: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct RegisteredContractRequest {
    /// bytes32 record identifier as 0x-prefixed hex
    identifier: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct CreatorContractsRequest {
    /// Defaults to the server wallet's address when omitted
    creator: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct PublicContractsRequest {
    /// 1-based page number, defaults to the first page
    page: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct CheckNetworkRequest {
    /// Defaults to the configured default network
    chain: Option<String>,
}

impl AbideckServer {
    pub fn new(config: Config) -> Result<Self> {
        let provider_manager = ProviderManager::new(config.clone())?;
        let gateway = Arc::new(ContractGateway::new(provider_manager));
        let registry = Arc::new(LocalRegistry::new(LocalRegistry::default_path()?));
        let onchain = Arc::new(OnchainRegistry::new(
            config.registry.address.clone(),
            config.registry.chain.clone(),
        )?);

        let wallet = match std::env::var("WALLET_PRIVATE_KEY") {
            Ok(key) => Some(Arc::new(LocalWallet::from_private_key(&key, &config)?)),
            Err(_) => {
                info!("No WALLET_PRIVATE_KEY set, write and signing tools are unavailable");
                None
            }
        };

        Ok(Self {
            gateway,
            subscriptions: Arc::new(tokio::sync::Mutex::new(SubscriptionManager::new())),
            registry,
            onchain,
            wallet,
            config: Arc::new(config),
        })
    }

    pub async fn run(&self) -> Result<()> {
        info!("Starting Abideck Server");

        let service = self.clone().serve(stdio()).await?;

        info!("Abideck Server started successfully");
        let _ = service.waiting().await;

        // Release any event subscriptions still running
        self.subscriptions.lock().await.unsubscribe_all();
        Ok(())
    }

    /// Load a saved record and parse its ABI.
    async fn load_contract(
        &self,
        contract_id: &str,
    ) -> Result<(ContractRecord, alloy::json_abi::JsonAbi)> {
        let record = self.registry.get(contract_id).await?;
        let abi = record.parsed_abi()?;
        Ok((record, abi))
    }

    fn wallet(&self) -> Result<&Arc<LocalWallet>, AppError> {
        self.wallet.as_ref().ok_or(AppError::WalletNotConnected)
    }

    fn writes_enabled(&self) -> bool {
        self.config.security.allow_write_operations
    }
}

/// Render a gateway failure, distinguishing contract reverts from transport
/// and input errors.
fn render_error(e: &AppError) -> String {
    if e.is_revert() {
        format!("Execution failed: {}", e)
    } else {
        format!("Error: {}", e)
    }
}

/// Validate and encode user-entered parameter text in declaration order.
fn encode_inputs(
    resolved: &[ResolvedParam],
    values: &HashMap<String, String>,
) -> Result<Vec<Value>, AppError> {
    codec::validate_required_inputs(resolved, values)?;

    resolved
        .iter()
        .map(|param| {
            let raw = values
                .get(&param.name)
                .ok_or_else(|| AppError::MissingParameter(param.name.clone()))?;
            codec::encode_parameter(raw, param)
        })
        .collect()
}

#[tool(tool_box)]
impl AbideckServer {
    #[tool(description = "List all contracts saved in the local registry")]
    async fn list_saved_contracts(&self) -> String {
        match self.registry.list().await {
            Ok(records) => serde_json::to_string_pretty(&records)
                .unwrap_or_else(|_| "Failed to serialize contracts".to_string()),
            Err(e) => {
                error!("Failed to list contracts: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    #[tool(description = "Save a contract (name, address, ABI, chain) to the local registry")]
    async fn save_contract(&self, #[tool(aggr)] request: SaveContractRequest) -> String {
        if let Err(e) = utils::validate_address(&request.address) {
            return format!("Error: {}", e);
        }

        let available = self.gateway.providers().get_available_chains();
        if let Err(e) = utils::validate_chain(&request.chain, &available) {
            return format!("Error: {}", e);
        }

        // Accept the ABI either structured or as pasted JSON text
        let abi_value = match &request.abi {
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(parsed) => parsed,
                Err(e) => return format!("Error: ABI is not valid JSON: {}", e),
            },
            other => other.clone(),
        };

        if let Err(e) = serde_json::from_value::<alloy::json_abi::JsonAbi>(abi_value.clone()) {
            return format!("Error: ABI is not a valid contract ABI: {}", e);
        }

        let draft = NewContract {
            name: request.name,
            address: request.address,
            abi: abi_value,
            chain: request.chain,
            is_public: request.is_public,
        };

        match self.registry.save(draft).await {
            Ok(record) => serde_json::to_string_pretty(&record)
                .unwrap_or_else(|_| "Failed to serialize contract".to_string()),
            Err(e) => {
                error!("Failed to save contract: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    #[tool(description = "Delete a saved contract from the local registry")]
    async fn delete_contract(&self, #[tool(aggr)] request: ContractIdRequest) -> String {
        match self.registry.delete(&request.contract_id).await {
            Ok(true) => format!("Deleted contract {}", request.contract_id),
            Ok(false) => format!("Error: No saved contract with id '{}'", request.contract_id),
            Err(e) => {
                error!("Failed to delete contract: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    #[tool(
        description = "List a saved contract's read functions, write functions, and events, with input hints"
    )]
    async fn list_contract_surface(&self, #[tool(aggr)] request: ContractIdRequest) -> String {
        match self.load_contract(&request.contract_id).await {
            Ok((_, abi)) => {
                let surface = contract_surface(&abi);
                serde_json::to_string_pretty(&surface)
                    .unwrap_or_else(|_| "Failed to serialize contract surface".to_string())
            }
            Err(e) => {
                error!("Failed to load contract: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    #[tool(description = "Call a read-only function of a saved contract")]
    async fn call_function(&self, #[tool(aggr)] request: CallFunctionRequest) -> String {
        let (record, abi) = match self.load_contract(&request.contract_id).await {
            Ok(loaded) => loaded,
            Err(e) => return format!("Error: {}", e),
        };

        let function = match crate::ethereum::gateway::find_function(&abi, &request.function_name) {
            Ok(function) => function,
            Err(e) => return format!("Error: {}", e),
        };

        let resolved = codec::resolve_inputs(&function.inputs);
        let args = match encode_inputs(&resolved, &request.inputs) {
            Ok(args) => args,
            Err(e) => return format!("Error: {}", e),
        };

        match self
            .gateway
            .call(
                &record.chain,
                &record.address,
                &abi,
                &request.function_name,
                &args,
            )
            .await
        {
            Ok(result) => serde_json::to_string_pretty(&codec::serialize_result(&result))
                .unwrap_or_else(|_| "Failed to serialize result".to_string()),
            Err(e) => {
                error!("Failed to call function: {}", e);
                render_error(&e)
            }
        }
    }

    #[tool(description = "Send a state-changing transaction to a saved contract function")]
    async fn send_function(&self, #[tool(aggr)] request: CallFunctionRequest) -> String {
        if !self.writes_enabled() {
            return "Error: Write operations are disabled. Use --allow-writes to enable transaction sending.".to_string();
        }
        let wallet = match self.wallet() {
            Ok(wallet) => wallet,
            Err(e) => return format!("Error: {}", e),
        };

        let (record, abi) = match self.load_contract(&request.contract_id).await {
            Ok(loaded) => loaded,
            Err(e) => return format!("Error: {}", e),
        };

        let function = match crate::ethereum::gateway::find_function(&abi, &request.function_name) {
            Ok(function) => function,
            Err(e) => return format!("Error: {}", e),
        };

        let resolved = codec::resolve_inputs(&function.inputs);
        let args = match encode_inputs(&resolved, &request.inputs) {
            Ok(args) => args,
            Err(e) => return format!("Error: {}", e),
        };

        match self
            .gateway
            .send(
                &record.chain,
                &record.address,
                &abi,
                &request.function_name,
                &args,
                wallet,
            )
            .await
        {
            Ok(summary) => serde_json::to_string_pretty(&summary)
                .unwrap_or_else(|_| "Failed to serialize transaction summary".to_string()),
            Err(e) => {
                error!("Failed to send transaction: {}", e);
                render_error(&e)
            }
        }
    }

    #[tool(description = "Estimate gas for a saved contract function call")]
    async fn estimate_gas(&self, #[tool(aggr)] request: EstimateGasRequest) -> String {
        let (record, abi) = match self.load_contract(&request.contract_id).await {
            Ok(loaded) => loaded,
            Err(e) => return format!("Error: {}", e),
        };

        let from = match &request.from {
            Some(from) => match utils::validate_address(from) {
                Ok(address) => Some(address),
                Err(e) => return format!("Error: {}", e),
            },
            None => self.wallet.as_ref().map(|w| w.address()),
        };

        let function = match crate::ethereum::gateway::find_function(&abi, &request.function_name) {
            Ok(function) => function,
            Err(e) => return format!("Error: {}", e),
        };

        let resolved = codec::resolve_inputs(&function.inputs);
        let args = match encode_inputs(&resolved, &request.inputs) {
            Ok(args) => args,
            Err(e) => return format!("Error: {}", e),
        };

        match self
            .gateway
            .estimate_gas(
                &record.chain,
                &record.address,
                &abi,
                &request.function_name,
                &args,
                from,
            )
            .await
        {
            Ok(gas_estimate) => format!("Estimated gas: {} units", gas_estimate),
            Err(e) => {
                error!("Failed to estimate gas: {}", e);
                render_error(&e)
            }
        }
    }

    #[tool(
        description = "Subscribe to an event of a saved contract, optionally filtering on indexed parameters"
    )]
    async fn subscribe_event(&self, #[tool(aggr)] request: SubscribeEventRequest) -> String {
        let (record, abi) = match self.load_contract(&request.contract_id).await {
            Ok(loaded) => loaded,
            Err(e) => return format!("Error: {}", e),
        };

        let event = match crate::ethereum::events::find_event(&abi, &request.event_name) {
            Ok(event) => event,
            Err(e) => return format!("Error: {}", e),
        };

        // Encode only the filters the user actually filled in
        let resolved = codec::resolve_event_inputs(&event.inputs);
        let mut encoded_filters = HashMap::new();
        if let Some(filters) = &request.filters {
            for param in &resolved {
                let Some(raw) = filters.get(&param.name) else {
                    continue;
                };
                if raw.trim().is_empty() {
                    continue;
                }
                match codec::encode_parameter(raw, param) {
                    Ok(value) => {
                        encoded_filters.insert(param.name.clone(), value);
                    }
                    Err(e) => return format!("Error: {}", e),
                }
            }
        }

        let mut subscriptions = self.subscriptions.lock().await;
        match subscriptions
            .subscribe(
                self.gateway.providers(),
                &record.chain,
                &record.address,
                &abi,
                &request.event_name,
                &encoded_filters,
            )
            .await
        {
            Ok(id) => json!({
                "subscription_id": id,
                "event": request.event_name,
                "contract": record.address,
            })
            .to_string(),
            Err(e) => {
                error!("Failed to subscribe: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    #[tool(description = "Fetch the buffered events of a subscription (most recent 200)")]
    async fn poll_events(&self, #[tool(aggr)] request: SubscriptionIdRequest) -> String {
        let subscriptions = self.subscriptions.lock().await;
        match subscriptions.get(&request.subscription_id) {
            Some(sub) => {
                let result = json!({
                    "subscription_id": request.subscription_id,
                    "active": sub.is_active(),
                    "events": sub.events(),
                });
                serde_json::to_string_pretty(&result)
                    .unwrap_or_else(|_| "Failed to serialize events".to_string())
            }
            None => format!(
                "Error: No subscription with id '{}'",
                request.subscription_id
            ),
        }
    }

    #[tool(description = "List active event subscriptions")]
    async fn list_subscriptions(&self) -> String {
        let subscriptions = self.subscriptions.lock().await;
        let listed: Vec<Value> = subscriptions
            .list()
            .into_iter()
            .map(|(id, event, active)| {
                json!({"subscription_id": id, "event": event, "active": active})
            })
            .collect();
        serde_json::to_string_pretty(&listed)
            .unwrap_or_else(|_| "Failed to serialize subscriptions".to_string())
    }

    #[tool(description = "Cancel an event subscription")]
    async fn unsubscribe_event(&self, #[tool(aggr)] request: SubscriptionIdRequest) -> String {
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.unsubscribe(&request.subscription_id) {
            format!("Unsubscribed {}", request.subscription_id)
        } else {
            format!(
                "Error: No subscription with id '{}'",
                request.subscription_id
            )
        }
    }

    #[tool(description = "Sign a message with the server wallet (EIP-191 personal message)")]
    async fn sign_message(&self, #[tool(aggr)] request: SignMessageRequest) -> String {
        let wallet = match self.wallet() {
            Ok(wallet) => wallet,
            Err(e) => return format!("Error: {}", e),
        };

        match wallet
            .sign_personal_message(&request.message, wallet.address())
            .await
        {
            Ok(signature) => json!({
                "address": format!("0x{:x}", wallet.address()),
                "signature": signature,
            })
            .to_string(),
            Err(e) => {
                error!("Failed to sign message: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    #[tool(description = "Recover the signer of an EIP-191 personal-message signature")]
    async fn verify_signature(&self, #[tool(aggr)] request: VerifySignatureRequest) -> String {
        let recovered = match recover_signer(&request.message, &request.signature) {
            Ok(address) => address,
            Err(e) => return format!("Error: {}", e),
        };

        let recovered_hex = format!("0x{:x}", recovered);
        let valid = request
            .expected_address
            .as_ref()
            .map(|expected| expected.trim().eq_ignore_ascii_case(&recovered_hex));

        let mut result = json!({ "recovered": recovered_hex });
        if let Some(valid) = valid {
            result["valid"] = Value::Bool(valid);
        }
        serde_json::to_string_pretty(&result)
            .unwrap_or_else(|_| "Failed to serialize result".to_string())
    }

    #[tool(description = "Publish a saved contract to the on-chain registry")]
    async fn register_onchain(&self, #[tool(aggr)] request: RegisterOnchainRequest) -> String {
        if !self.writes_enabled() {
            return "Error: Write operations are disabled. Use --allow-writes to enable registration.".to_string();
        }
        let wallet = match self.wallet() {
            Ok(wallet) => wallet,
            Err(e) => return format!("Error: {}", e),
        };

        let record = match self.registry.get(&request.contract_id).await {
            Ok(record) => record,
            Err(e) => return format!("Error: {}", e),
        };

        let abi_text = match serde_json::to_string(&record.abi) {
            Ok(text) => text,
            Err(e) => return format!("Error: Failed to serialize ABI: {}", e),
        };

        let is_public = request
            .is_public
            .or(record.is_public)
            .unwrap_or(false);

        match self
            .onchain
            .register(
                &self.gateway,
                wallet,
                &record.address,
                &record.name,
                &abi_text,
                &record.chain,
                is_public,
            )
            .await
        {
            Ok(summary) => serde_json::to_string_pretty(&summary)
                .unwrap_or_else(|_| "Failed to serialize transaction summary".to_string()),
            Err(e) => {
                error!("Failed to register contract: {}", e);
                render_error(&e)
            }
        }
    }

    #[tool(description = "Fetch one record from the on-chain registry by identifier")]
    async fn get_registered_contract(
        &self,
        #[tool(aggr)] request: RegisteredContractRequest,
    ) -> String {
        match self
            .onchain
            .get_smart_contract(&self.gateway, &request.identifier)
            .await
        {
            Ok(record) => serde_json::to_string_pretty(&record)
                .unwrap_or_else(|_| "Failed to serialize record".to_string()),
            Err(e) => {
                error!("Failed to fetch registered contract: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    #[tool(description = "List on-chain registry records published by a creator address")]
    async fn list_creator_contracts(
        &self,
        #[tool(aggr)] request: CreatorContractsRequest,
    ) -> String {
        let creator = match &request.creator {
            Some(creator) => creator.clone(),
            None => match self.wallet() {
                Ok(wallet) => format!("0x{:x}", wallet.address()),
                Err(e) => return format!("Error: {}", e),
            },
        };

        if let Err(e) = utils::validate_address(&creator) {
            return format!("Error: {}", e);
        }

        match self
            .onchain
            .get_contracts_by_creator(&self.gateway, &creator)
            .await
        {
            Ok(records) => serde_json::to_string_pretty(&records)
                .unwrap_or_else(|_| "Failed to serialize records".to_string()),
            Err(e) => {
                error!("Failed to list creator contracts: {}", e);
                format!("Error: {}", e)
            }
        }
    }

    #[tool(description = "Check connectivity and chain id of a configured network")]
    async fn check_network(&self, #[tool(aggr)] request: CheckNetworkRequest) -> String {
        let providers = self.gateway.providers();
        let chain = request.chain.as_deref();

        let configured_chain_id = match providers.configured_chain_id(chain) {
            Ok(id) => id,
            Err(e) => return format!("Error: {}", e),
        };

        let connected = providers.check_connection(chain).await.unwrap_or(false);
        let reported_chain_id = if connected {
            providers.get_chain_id(chain).await.ok()
        } else {
            None
        };

        let result = json!({
            "chain": chain.unwrap_or(&self.config.default_network),
            "configured_chain_id": configured_chain_id,
            "connected": connected,
            "reported_chain_id": reported_chain_id,
        });
        serde_json::to_string_pretty(&result)
            .unwrap_or_else(|_| "Failed to serialize network status".to_string())
    }

    #[tool(description = "List one page of public records from the on-chain registry")]
    async fn list_public_contracts(
        &self,
        #[tool(aggr)] request: PublicContractsRequest,
    ) -> String {
        let page = request.page.unwrap_or(1);

        match self.onchain.get_public_contracts(&self.gateway, page).await {
            Ok(records) => serde_json::to_string_pretty(&records)
                .unwrap_or_else(|_| "Failed to serialize records".to_string()),
            Err(e) => {
                error!("Failed to list public contracts: {}", e);
                format!("Error: {}", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_marks_reverts() {
        let revert = AppError::gateway(
            "Transaction failed: Contract execution reverted. This usually means the function's requirements were not met or an assertion failed.",
        );
        assert!(render_error(&revert).starts_with("Execution failed:"));

        let transport = AppError::gateway("Network error: Cannot connect to RPC endpoint.");
        assert!(render_error(&transport).starts_with("Error:"));

        let input = AppError::WalletNotConnected;
        assert!(render_error(&input).starts_with("Error:"));
    }

    #[test]
    fn test_encode_inputs_orders_and_encodes() {
        let resolved = vec![
            ResolvedParam::new("to", "address"),
            ResolvedParam::new("amount", "uint256"),
        ];
        let mut values = HashMap::new();
        values.insert(
            "to".to_string(),
            "0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e".to_string(),
        );
        values.insert("amount".to_string(), "  0042 ".to_string());

        let args = encode_inputs(&resolved, &values).unwrap();
        assert_eq!(args[0], json!("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e"));
        assert_eq!(args[1], json!("42"));
    }
}

#[tool(tool_box)]
impl ServerHandler for AbideckServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Server for registering and interacting with Ethereum smart contracts using Alloy. Supports a local contract registry, read calls, transactions, gas estimation, event subscriptions, message signing, and a shared on-chain contract registry.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
