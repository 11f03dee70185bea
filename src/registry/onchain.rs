use alloy::json_abi::JsonAbi;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::ethereum::codec::{self, ResolvedParam};
use crate::ethereum::{gateway::ContractGateway, ContractRecord, TransactionSummary};
use crate::wallet::LocalWallet;

/// ABI of the public registry contract the dashboard publishes records to.
/// Record tuples are `(identifier, name, address, abi, chain, creator,
/// isPublic)`.
const REGISTRY_ABI: &str = r#"[
    {
        "type": "function",
        "name": "registerSmartContract",
        "stateMutability": "nonpayable",
        "inputs": [
            {"name": "_address", "type": "address"},
            {"name": "_name", "type": "string"},
            {"name": "_abi", "type": "string"},
            {"name": "_chain", "type": "string"},
            {"name": "_isPublic", "type": "bool"}
        ],
        "outputs": []
    },
    {
        "type": "function",
        "name": "getSmartContract",
        "stateMutability": "view",
        "inputs": [{"name": "identifier", "type": "bytes32"}],
        "outputs": [
            {
                "name": "",
                "type": "tuple",
                "components": [
                    {"name": "identifier", "type": "bytes32"},
                    {"name": "contract_name", "type": "string"},
                    {"name": "contract_address", "type": "address"},
                    {"name": "contract_abi", "type": "string"},
                    {"name": "contract_chain", "type": "string"},
                    {"name": "creator", "type": "address"},
                    {"name": "isPublic", "type": "bool"}
                ]
            }
        ]
    },
    {
        "type": "function",
        "name": "getSmartContractsByCreator",
        "stateMutability": "view",
        "inputs": [{"name": "creator", "type": "address"}],
        "outputs": [
            {
                "name": "",
                "type": "tuple[]",
                "components": [
                    {"name": "identifier", "type": "bytes32"},
                    {"name": "contract_name", "type": "string"},
                    {"name": "contract_address", "type": "address"},
                    {"name": "contract_abi", "type": "string"},
                    {"name": "contract_chain", "type": "string"},
                    {"name": "creator", "type": "address"},
                    {"name": "isPublic", "type": "bool"}
                ]
            }
        ]
    },
    {
        "type": "function",
        "name": "getPublicSmartContracts",
        "stateMutability": "view",
        "inputs": [{"name": "page", "type": "uint256"}],
        "outputs": [
            {
                "name": "",
                "type": "tuple[]",
                "components": [
                    {"name": "identifier", "type": "bytes32"},
                    {"name": "contract_name", "type": "string"},
                    {"name": "contract_address", "type": "address"},
                    {"name": "contract_abi", "type": "string"},
                    {"name": "contract_chain", "type": "string"},
                    {"name": "creator", "type": "address"},
                    {"name": "isPublic", "type": "bool"}
                ]
            }
        ]
    }
]"#;

/// Client for the on-chain registry contract, built over the call gateway.
#[derive(Debug)]
pub struct OnchainRegistry {
    address: String,
    chain: String,
    abi: JsonAbi,
}

impl OnchainRegistry {
    pub fn new(address: String, chain: String) -> Result<Self, AppError> {
        let abi: JsonAbi = serde_json::from_str(REGISTRY_ABI)
            .map_err(|e| AppError::gateway(format!("Invalid registry ABI: {}", e)))?;
        Ok(Self {
            address,
            chain,
            abi,
        })
    }

    /// Publish a contract record to the registry.
    pub async fn register(
        &self,
        gateway: &ContractGateway,
        wallet: &LocalWallet,
        contract_address: &str,
        name: &str,
        abi_json: &str,
        chain: &str,
        is_public: bool,
    ) -> Result<TransactionSummary, AppError> {
        let args = vec![
            json!(contract_address),
            json!(name),
            json!(abi_json),
            json!(chain),
            json!(is_public),
        ];

        gateway
            .send(
                &self.chain,
                &self.address,
                &self.abi,
                "registerSmartContract",
                &args,
                wallet,
            )
            .await
    }

    /// Fetch one record by its bytes32 identifier. The stored ABI text is
    /// parsed into structured JSON here.
    pub async fn get_smart_contract(
        &self,
        gateway: &ContractGateway,
        identifier: &str,
    ) -> Result<ContractRecord, AppError> {
        let result = gateway
            .call(
                &self.chain,
                &self.address,
                &self.abi,
                "getSmartContract",
                &[encode_identifier(identifier)?],
            )
            .await?;

        record_from_tuple(&result, true)
    }

    /// Records published by one creator. ABI stays as JSON text, matching
    /// the listing tier.
    pub async fn get_contracts_by_creator(
        &self,
        gateway: &ContractGateway,
        creator: &str,
    ) -> Result<Vec<ContractRecord>, AppError> {
        let result = gateway
            .call(
                &self.chain,
                &self.address,
                &self.abi,
                "getSmartContractsByCreator",
                &[json!(creator)],
            )
            .await?;

        records_from_list(&result)
    }

    /// One page of publicly visible records.
    pub async fn get_public_contracts(
        &self,
        gateway: &ContractGateway,
        page: u64,
    ) -> Result<Vec<ContractRecord>, AppError> {
        let result = gateway
            .call(
                &self.chain,
                &self.address,
                &self.abi,
                "getPublicSmartContracts",
                &[json!(page.to_string())],
            )
            .await?;

        records_from_list(&result)
    }
}

/// Identifiers follow the bytes32 input rules: 0x hex must decode to exactly
/// 32 bytes, anything else is treated as text and zero-padded.
fn encode_identifier(identifier: &str) -> Result<Value, AppError> {
    codec::encode_parameter(identifier, &ResolvedParam::new("identifier", "bytes32"))
}

fn records_from_list(result: &Value) -> Result<Vec<ContractRecord>, AppError> {
    let items = result
        .as_array()
        .ok_or_else(|| AppError::gateway("Registry returned a non-list result".to_string()))?;

    items
        .iter()
        .map(|item| record_from_tuple(item, false))
        .collect()
}

/// Map a decoded registry tuple onto a contract record.
fn record_from_tuple(value: &Value, parse_abi: bool) -> Result<ContractRecord, AppError> {
    let fields = value
        .as_array()
        .filter(|f| f.len() == 7)
        .ok_or_else(|| AppError::gateway("Malformed registry record".to_string()))?;

    let text = |index: usize| -> Result<String, AppError> {
        fields[index]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::gateway("Malformed registry record field".to_string()))
    };

    let abi_text = text(3)?;
    let abi = if parse_abi {
        serde_json::from_str(&abi_text)
            .map_err(|e| AppError::gateway(format!("Registry record holds invalid ABI: {}", e)))?
    } else {
        Value::String(abi_text)
    };

    Ok(ContractRecord {
        id: text(0)?,
        name: text(1)?,
        address: text(2)?,
        abi,
        chain: text(4)?,
        creator: Some(text(5)?),
        is_public: fields[6].as_bool(),
        created_at: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_abi_parses() {
        let registry = OnchainRegistry::new(
            "0xa03fcbbe72ed1a1de989399de0a5f16c7d2e0c65".to_string(),
            "ethereum_testnet".to_string(),
        )
        .unwrap();

        let names: Vec<&str> = registry.abi.functions().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"registerSmartContract"));
        assert!(names.contains(&"getSmartContract"));
        assert!(names.contains(&"getSmartContractsByCreator"));
        assert!(names.contains(&"getPublicSmartContracts"));
    }

    #[test]
    fn test_record_from_tuple() {
        let tuple = json!([
            "0x0101010101010101010101010101010101010101010101010101010101010101",
            "My Token",
            "0x742d35cc6435c9c1c72c5e7b18bab7e1db7a5d6e",
            "[]",
            "ethereum_testnet",
            "0x0000000000000000000000000000000000000001",
            true
        ]);

        let record = record_from_tuple(&tuple, true).unwrap();
        assert_eq!(record.name, "My Token");
        assert_eq!(record.chain, "ethereum_testnet");
        assert_eq!(record.abi, json!([]));
        assert_eq!(record.is_public, Some(true));
        assert!(record.creator.is_some());

        // Listing tier keeps the ABI as text
        let record = record_from_tuple(&tuple, false).unwrap();
        assert_eq!(record.abi, json!("[]"));
    }

    #[test]
    fn test_identifier_must_be_a_full_bytes32() {
        let full = format!("0x{}", "ab".repeat(32));
        assert_eq!(encode_identifier(&full).unwrap(), json!(full));

        // Short hex is a length error, never silently padded
        let short = format!("0x{}", "ab".repeat(16));
        assert!(matches!(
            encode_identifier(&short),
            Err(AppError::InvalidBytes32Length)
        ));

        assert!(matches!(
            encode_identifier("0xzz"),
            Err(AppError::InvalidParameterFormat(_))
        ));
    }

    #[test]
    fn test_record_from_tuple_rejects_short_tuples() {
        assert!(record_from_tuple(&json!(["only", "three", "fields"]), false).is_err());
        assert!(record_from_tuple(&json!("not a tuple"), false).is_err());
    }
}
