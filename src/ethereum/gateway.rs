use alloy::{
    dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt, Word},
    json_abi::{Function, JsonAbi},
    primitives::{Address, Bytes, I256, U256},
    providers::Provider,
    rpc::types::TransactionRequest,
};
use serde_json::Value;
use std::str::FromStr;

use crate::error::AppError;
use crate::ethereum::{codec, provider::ProviderManager, utils, TransactionSummary};
use crate::wallet::LocalWallet;

/// Executes read and write operations against a deployed contract given an
/// address/ABI pair. Parameter values arrive pre-encoded by the codec as
/// JSON; this gateway lowers them to `DynSolValue` by the declared ABI type
/// and handles the RPC boundary.
#[derive(Debug)]
pub struct ContractGateway {
    provider_manager: ProviderManager,
}

impl ContractGateway {
    pub fn new(provider_manager: ProviderManager) -> Self {
        Self { provider_manager }
    }

    pub fn providers(&self) -> &ProviderManager {
        &self.provider_manager
    }

    /// Execute a read (`eth_call`) against a view or pure function and
    /// return the decoded, display-safe result.
    pub async fn call(
        &self,
        chain: &str,
        contract_address: &str,
        abi: &JsonAbi,
        function_name: &str,
        args: &[Value],
    ) -> Result<Value, AppError> {
        let address = utils::validate_address(contract_address)
            .map_err(|_| AppError::InvalidAddressFormat)?;

        let function = find_function(abi, function_name)?;
        let calldata = encode_call_args(function, args)?;

        let provider = self
            .provider_manager
            .get_provider(Some(chain))
            .map_err(|e| AppError::gateway(e.to_string()))?;

        let call_request = TransactionRequest::default()
            .to(address)
            .input(calldata.into());

        let result_bytes = provider
            .call(&call_request)
            .await
            .map_err(|e| AppError::gateway(utils::interpret_rpc_error(&e.to_string())))?;

        decode_function_result(function, &result_bytes)
    }

    /// Submit a write transaction signed by the injected wallet.
    ///
    /// The wallet must be on the contract's target chain; a switch is
    /// attempted first (mirroring the network-switch flow), and a wallet
    /// stuck on another chain fails with `ChainMismatch`.
    pub async fn send(
        &self,
        chain: &str,
        contract_address: &str,
        abi: &JsonAbi,
        function_name: &str,
        args: &[Value],
        wallet: &LocalWallet,
    ) -> Result<TransactionSummary, AppError> {
        use alloy::{
            network::{EthereumWallet, ReceiptResponse},
            providers::ProviderBuilder,
        };

        let address = utils::validate_address(contract_address)
            .map_err(|_| AppError::InvalidAddressFormat)?;

        let function = find_function(abi, function_name)?;
        let calldata = encode_call_args(function, args)?;

        let target_chain_id = self
            .provider_manager
            .configured_chain_id(Some(chain))
            .map_err(|e| AppError::gateway(e.to_string()))?;
        wallet.ensure_chain(target_chain_id).await?;

        let network_config = self
            .provider_manager
            .get_network_config(Some(chain))
            .map_err(|e| AppError::gateway(e.to_string()))?;

        let url = network_config.http_rpc.parse().map_err(|e| {
            AppError::gateway(format!(
                "Invalid RPC URL '{}': {}",
                network_config.http_rpc, e
            ))
        })?;

        let signer = wallet.signer();
        let from_address = signer.address();
        tracing::info!("Sending transaction from address: {:?}", from_address);

        let eth_wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(eth_wallet)
            .on_http(url);

        let tx_request = provider
            .transaction_request()
            .to(address)
            .input(calldata.into());

        tracing::info!("Sending transaction to contract: {:?}", address);

        let pending_tx = provider
            .send_transaction(tx_request)
            .await
            .map_err(|e| AppError::gateway(utils::interpret_rpc_error(&e.to_string())))?;

        let tx_hash = *pending_tx.tx_hash();
        tracing::info!("Transaction sent with hash: {:?}", tx_hash);

        let receipt = pending_tx.get_receipt().await.map_err(|e| {
            AppError::gateway(format!(
                "Transaction was sent but confirmation failed: {}. Transaction hash: 0x{:x}",
                e, tx_hash
            ))
        })?;

        Ok(TransactionSummary {
            hash: format!("0x{:x}", tx_hash),
            from: format!("0x{:x}", from_address),
            to: format!("0x{:x}", address),
            gas_used: receipt.gas_used() as u64,
            block_number: receipt.block_number.unwrap_or_default(),
            status: receipt.status(),
        })
    }

    /// Estimate gas for a function call without executing it.
    pub async fn estimate_gas(
        &self,
        chain: &str,
        contract_address: &str,
        abi: &JsonAbi,
        function_name: &str,
        args: &[Value],
        from: Option<Address>,
    ) -> Result<u64, AppError> {
        let address = utils::validate_address(contract_address)
            .map_err(|_| AppError::InvalidAddressFormat)?;

        let function = find_function(abi, function_name)?;
        let calldata = encode_call_args(function, args)?;

        let provider = self
            .provider_manager
            .get_provider(Some(chain))
            .map_err(|e| AppError::gateway(e.to_string()))?;

        let mut tx_request = TransactionRequest::default()
            .to(address)
            .input(calldata.into());
        if let Some(from) = from {
            tx_request = tx_request.from(from);
        }

        provider
            .estimate_gas(&tx_request)
            .await
            .map_err(|e| AppError::gateway(utils::interpret_rpc_error(&e.to_string())))
    }
}

/// Find a function by name, listing alternatives when absent.
pub fn find_function<'a>(abi: &'a JsonAbi, function_name: &str) -> Result<&'a Function, AppError> {
    utils::validate_function_name(function_name)
        .map_err(|e| AppError::gateway(e.to_string()))?;

    abi.functions()
        .find(|f| f.name == function_name)
        .ok_or_else(|| {
            let available: Vec<String> = abi.functions().map(|f| f.name.clone()).collect();
            if available.is_empty() {
                AppError::gateway(format!(
                    "Function '{}' not found. The contract ABI contains no functions.",
                    function_name
                ))
            } else {
                AppError::gateway(format!(
                    "Function '{}' not found in contract ABI. Available functions: {}",
                    function_name,
                    available.join(", ")
                ))
            }
        })
}

/// Lower codec-encoded argument values and ABI-encode the calldata.
pub fn encode_call_args(function: &Function, args: &[Value]) -> Result<Bytes, AppError> {
    if args.len() != function.inputs.len() {
        let expected: Vec<String> = function
            .inputs
            .iter()
            .map(|input| format!("{} {}", input.ty, input.name))
            .collect();
        return Err(AppError::gateway(format!(
            "Parameter count mismatch for function '{}': expected {} parameters, got {}. Expected parameters: [{}]",
            function.name,
            function.inputs.len(),
            args.len(),
            expected.join(", ")
        )));
    }

    let mut dyn_values = Vec::with_capacity(args.len());
    for (arg, input) in args.iter().zip(&function.inputs) {
        dyn_values.push(json_to_dyn_sol_value(arg, &input.ty)?);
    }

    let encoded = function
        .abi_encode_input(&dyn_values)
        .map_err(|e| AppError::gateway(format!("Failed to encode function inputs: {}", e)))?;

    Ok(encoded.into())
}

/// Decode a call result and flatten it to display-safe JSON.
pub fn decode_function_result(
    function: &Function,
    result_bytes: &Bytes,
) -> Result<Value, AppError> {
    if result_bytes.is_empty() {
        return Ok(Value::Null);
    }

    let decoded = function
        .abi_decode_output(result_bytes, false)
        .map_err(|e| AppError::gateway(format!("Failed to decode output: {}", e)))?;

    codec::decoded_outputs_to_json(&decoded)
}

/// Lower a JSON argument to `DynSolValue` by its declared Solidity type.
///
/// Codec output conventions apply: integers arrive as decimal strings, bytes
/// as 0x hex, booleans as real booleans. Array elements are whatever the
/// user's JSON literal held, so numbers are accepted for integer elements.
pub fn json_to_dyn_sol_value(value: &Value, sol_type: &str) -> Result<DynSolValue, AppError> {
    let invalid = || AppError::InvalidParameterFormat(sol_type.to_string());

    match sol_type {
        "address" => {
            let addr_str = value.as_str().ok_or_else(invalid)?;
            let address =
                Address::from_str(addr_str.trim()).map_err(|_| AppError::InvalidAddressFormat)?;
            Ok(DynSolValue::Address(address))
        }
        "bool" => {
            let b = value.as_bool().ok_or_else(invalid)?;
            Ok(DynSolValue::Bool(b))
        }
        "string" => {
            let s = value.as_str().ok_or_else(invalid)?;
            Ok(DynSolValue::String(s.to_string()))
        }
        ty if ty.starts_with("uint") => {
            let num = match value {
                Value::Number(n) => n.as_u64().map(U256::from).ok_or_else(invalid)?,
                Value::String(s) => {
                    let s = s.trim();
                    if let Some(hex_part) = s.strip_prefix("0x") {
                        U256::from_str_radix(hex_part, 16).map_err(|_| invalid())?
                    } else {
                        U256::from_str_radix(s, 10).map_err(|_| invalid())?
                    }
                }
                _ => return Err(invalid()),
            };
            Ok(DynSolValue::Uint(num, 256))
        }
        ty if ty.starts_with("int") => {
            let num = match value {
                Value::Number(n) => {
                    let i = n.as_i64().ok_or_else(invalid)?;
                    I256::try_from(i).map_err(|_| invalid())?
                }
                Value::String(s) => I256::from_dec_str(s.trim()).map_err(|_| invalid())?,
                _ => return Err(invalid()),
            };
            Ok(DynSolValue::Int(num, 256))
        }
        ty if ty.starts_with("bytes") && ty != "bytes" => {
            // Fixed bytes (e.g. bytes32)
            let hex_str = value.as_str().ok_or_else(invalid)?;
            let bytes =
                hex::decode(hex_str.trim_start_matches("0x")).map_err(|_| invalid())?;

            let mut word_bytes = [0u8; 32];
            let len = bytes.len().min(32);
            word_bytes[..len].copy_from_slice(&bytes[..len]);
            let word = Word::from(word_bytes);

            Ok(DynSolValue::FixedBytes(word, len))
        }
        "bytes" => {
            let hex_str = value.as_str().ok_or_else(invalid)?;
            let bytes =
                hex::decode(hex_str.trim_start_matches("0x")).map_err(|_| invalid())?;
            Ok(DynSolValue::Bytes(bytes))
        }
        ty if ty.ends_with("[]") => {
            let array = value.as_array().ok_or_else(invalid)?;
            let element_type = &ty[..ty.len() - 2];
            let mut dyn_array = Vec::with_capacity(array.len());
            for element in array {
                dyn_array.push(json_to_dyn_sol_value(element, element_type)?);
            }
            Ok(DynSolValue::Array(dyn_array))
        }
        _ => Err(AppError::gateway(format!(
            "Unsupported Solidity type: {}",
            sol_type
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn erc20_abi() -> JsonAbi {
        serde_json::from_str(
            r#"[
                {
                    "type": "function",
                    "name": "balanceOf",
                    "stateMutability": "view",
                    "inputs": [{"name": "owner", "type": "address"}],
                    "outputs": [{"name": "", "type": "uint256"}]
                },
                {
                    "type": "function",
                    "name": "transfer",
                    "stateMutability": "nonpayable",
                    "inputs": [
                        {"name": "to", "type": "address"},
                        {"name": "amount", "type": "uint256"}
                    ],
                    "outputs": [{"name": "", "type": "bool"}]
                }
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_find_function() {
        let abi = erc20_abi();
        assert!(find_function(&abi, "balanceOf").is_ok());

        let err = find_function(&abi, "mint").unwrap_err();
        assert!(err.to_string().contains("balanceOf"));
    }

    #[test]
    fn test_encode_call_args_selector_and_length() {
        let abi = erc20_abi();
        let function = find_function(&abi, "transfer").unwrap();

        let calldata = encode_call_args(
            function,
            &[
                json!("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e"),
                json!("1000000000000000000"),
            ],
        )
        .unwrap();

        // 4-byte selector + two 32-byte words
        assert_eq!(calldata.len(), 4 + 64);
        // transfer(address,uint256) selector
        assert_eq!(&calldata[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_encode_call_args_count_mismatch() {
        let abi = erc20_abi();
        let function = find_function(&abi, "transfer").unwrap();

        let err = encode_call_args(function, &[json!("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e")])
            .unwrap_err();
        assert!(err.to_string().contains("Parameter count mismatch"));
    }

    #[test]
    fn test_decode_uint_result() {
        let abi = erc20_abi();
        let function = find_function(&abi, "balanceOf").unwrap();

        // Raw 32-byte big-endian encoding of 10^18
        let raw = U256::from(10).pow(U256::from(18)).to_be_bytes::<32>();
        let decoded = decode_function_result(function, &Bytes::from(raw.to_vec())).unwrap();
        assert_eq!(decoded, json!("1000000000000000000"));
    }

    #[test]
    fn test_json_lowering_accepts_array_literals() {
        let lowered = json_to_dyn_sol_value(&json!([1, 2, 3]), "uint256[]").unwrap();
        match lowered {
            DynSolValue::Array(items) => assert_eq!(items.len(), 3),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_json_lowering_rejects_bad_values() {
        assert!(json_to_dyn_sol_value(&json!(42), "address").is_err());
        assert!(json_to_dyn_sol_value(&json!("abc"), "uint256").is_err());
        assert!(json_to_dyn_sol_value(&json!("1"), "bool").is_err());
    }
}
