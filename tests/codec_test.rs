use std::collections::HashMap;

use abideck::error::AppError;
use abideck::ethereum::codec::{
    self, encode_parameter, serialize_result, validate_required_inputs, ResolvedParam,
};
use abideck::ethereum::gateway::{decode_function_result, encode_call_args, find_function};
use alloy::json_abi::JsonAbi;
use alloy::primitives::{Bytes, U256};
use serde_json::json;

const ERC20_ABI: &str = r#"[
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
    },
    {
        "type": "event",
        "name": "Transfer",
        "inputs": [
            {"name": "from", "type": "address", "indexed": true},
            {"name": "to", "type": "address", "indexed": true},
            {"name": "value", "type": "uint256", "indexed": false}
        ],
        "anonymous": false
    }
]"#;

fn abi() -> JsonAbi {
    serde_json::from_str(ERC20_ABI).unwrap()
}

#[test]
fn balance_of_flows_from_form_text_to_decoded_result() {
    let abi = abi();
    let function = find_function(&abi, "balanceOf").unwrap();
    let resolved = codec::resolve_inputs(&function.inputs);

    // Mixed-case address entered in the form, kept verbatim
    let mut values = HashMap::new();
    values.insert(
        "owner".to_string(),
        "0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e".to_string(),
    );
    validate_required_inputs(&resolved, &values).unwrap();

    let args: Vec<_> = resolved
        .iter()
        .map(|p| encode_parameter(&values[&p.name], p).unwrap())
        .collect();
    assert_eq!(args[0], json!("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e"));

    let calldata = encode_call_args(function, &args).unwrap();
    assert_eq!(calldata.len(), 4 + 32);

    // A node returning 10^18 decodes into a decimal string
    let raw = U256::from(10).pow(U256::from(18)).to_be_bytes::<32>();
    let result = decode_function_result(function, &Bytes::from(raw.to_vec())).unwrap();
    assert_eq!(result, json!("1000000000000000000"));
}

#[test]
fn transfer_rejects_bad_address_before_any_call() {
    let abi = abi();
    let function = find_function(&abi, "transfer").unwrap();
    let resolved = codec::resolve_inputs(&function.inputs);

    let mut values = HashMap::new();
    values.insert("to".to_string(), "not-an-address".to_string());
    values.insert("amount".to_string(), "1".to_string());

    match validate_required_inputs(&resolved, &values) {
        Err(AppError::InvalidAddressFormat) => {}
        other => panic!("expected InvalidAddressFormat, got {:?}", other),
    }
}

#[test]
fn missing_parameters_are_reported_first_in_declaration_order() {
    let abi = abi();
    let function = find_function(&abi, "transfer").unwrap();
    let resolved = codec::resolve_inputs(&function.inputs);

    // Both missing; the first declared input wins
    match validate_required_inputs(&resolved, &HashMap::new()) {
        Err(AppError::MissingParameter(name)) => assert_eq!(name, "to"),
        other => panic!("expected MissingParameter, got {:?}", other),
    }

    // Present but empty counts as missing too
    let mut values = HashMap::new();
    values.insert("to".to_string(), "0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e".to_string());
    values.insert("amount".to_string(), "".to_string());
    match validate_required_inputs(&resolved, &values) {
        Err(AppError::MissingParameter(name)) => assert_eq!(name, "amount"),
        other => panic!("expected MissingParameter, got {:?}", other),
    }
}

#[test]
fn event_filter_values_encode_by_declared_type() {
    let abi = abi();
    let event = abi.events().find(|e| e.name == "Transfer").unwrap();
    let resolved = codec::resolve_event_inputs(&event.inputs);

    let from = resolved.iter().find(|p| p.name == "from").unwrap();
    let encoded = encode_parameter("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e", from).unwrap();
    assert_eq!(encoded, json!("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e"));

    // Non-numeric text for the uint256 value slot fails with the type tag
    let value = resolved.iter().find(|p| p.name == "value").unwrap();
    match encode_parameter("abc", value) {
        Err(AppError::InvalidParameterFormat(ty)) => assert_eq!(ty, "uint256"),
        other => panic!("expected InvalidParameterFormat, got {:?}", other),
    }
}

#[test]
fn bytes32_text_pads_and_hex_must_be_exact() {
    let p = ResolvedParam::new("id", "bytes32");

    let encoded = encode_parameter("hello", &p).unwrap();
    let hex_str = encoded.as_str().unwrap();
    assert!(hex_str.starts_with("0x68656c6c6f"));
    assert_eq!(hex_str.len(), 2 + 64);

    // 31 bytes of hex is not a bytes32
    let short = format!("0x{}", "ab".repeat(31));
    assert!(matches!(
        encode_parameter(&short, &p),
        Err(AppError::InvalidBytes32Length)
    ));

    // 33 bytes of text cannot be packed
    let long = "a".repeat(33);
    assert!(matches!(
        encode_parameter(&long, &p),
        Err(AppError::Bytes32Overflow)
    ));
}

#[test]
fn serialized_results_are_display_safe_and_idempotent() {
    let raw = json!({
        "big": 9_007_199_254_740_993u64,
        "small": 42,
        "nested": [{"huge": 18_446_744_073_709_551_615u64}, "text", true]
    });

    let once = serialize_result(&raw);
    assert_eq!(once["big"], json!("9007199254740993"));
    assert_eq!(once["small"], json!(42));
    assert_eq!(once["nested"][0]["huge"], json!("18446744073709551615"));

    let twice = serialize_result(&once);
    assert_eq!(once, twice);
}
