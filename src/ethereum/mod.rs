pub mod codec;
pub mod events;
pub mod gateway;
pub mod provider;
pub mod utils;

use alloy::json_abi::JsonAbi;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ethereum::codec::placeholder_hint;

/// A user-saved contract record.
///
/// Locally the id is a generated UUID; records fetched from the on-chain
/// registry carry the registry's bytes32 identifier instead. The ABI is kept
/// as structured JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: String,
    pub name: String,
    pub address: String,
    pub abi: Value,
    pub chain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
}

impl ContractRecord {
    /// Parse the record's ABI into alloy's structured form.
    pub fn parsed_abi(&self) -> Result<JsonAbi> {
        serde_json::from_value(self.abi.clone())
            .map_err(|e| anyhow!("Failed to parse stored ABI: {}", e))
    }
}

/// One parameter of a function or event, with the hint shown next to its
/// input field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub hint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,
}

/// A callable entry from a contract's ABI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub state_mutability: String,
    pub inputs: Vec<ParameterInfo>,
    pub outputs: Vec<ParameterInfo>,
}

/// An event entry from a contract's ABI. Inputs carry the indexed flag used
/// for subscription filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventInfo {
    pub name: String,
    pub inputs: Vec<ParameterInfo>,
}

/// The browsable surface of a contract: read functions, write functions, and
/// events, split the way the interaction screen lists them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSurface {
    pub read_functions: Vec<FunctionInfo>,
    pub write_functions: Vec<FunctionInfo>,
    pub events: Vec<EventInfo>,
}

/// Summary of a submitted write transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub gas_used: u64,
    pub block_number: u64,
    pub status: bool,
}

/// Split an ABI into its interaction surface.
///
/// A function is a read iff its state mutability is view or pure; everything
/// else (nonpayable, payable) is a write.
pub fn contract_surface(abi: &JsonAbi) -> ContractSurface {
    let mut read_functions = Vec::new();
    let mut write_functions = Vec::new();

    for function in abi.functions() {
        let info = FunctionInfo {
            name: function.name.clone(),
            state_mutability: format!("{:?}", function.state_mutability).to_lowercase(),
            inputs: function
                .inputs
                .iter()
                .map(|p| ParameterInfo {
                    name: p.name.clone(),
                    ty: p.ty.clone(),
                    hint: placeholder_hint(&p.ty),
                    indexed: None,
                })
                .collect(),
            outputs: function
                .outputs
                .iter()
                .map(|p| ParameterInfo {
                    name: p.name.clone(),
                    ty: p.ty.clone(),
                    hint: placeholder_hint(&p.ty),
                    indexed: None,
                })
                .collect(),
        };

        if is_read_only(function) {
            read_functions.push(info);
        } else {
            write_functions.push(info);
        }
    }

    let events = abi
        .events()
        .map(|event| EventInfo {
            name: event.name.clone(),
            inputs: event
                .inputs
                .iter()
                .map(|p| ParameterInfo {
                    name: p.name.clone(),
                    ty: p.ty.clone(),
                    hint: placeholder_hint(&p.ty),
                    indexed: Some(p.indexed),
                })
                .collect(),
        })
        .collect();

    ContractSurface {
        read_functions,
        write_functions,
        events,
    }
}

/// Read classification rule: view or pure state mutability.
pub fn is_read_only(function: &alloy::json_abi::Function) -> bool {
    use alloy::json_abi::StateMutability;
    matches!(
        function.state_mutability,
        StateMutability::View | StateMutability::Pure
    )
}
