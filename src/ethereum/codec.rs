use alloy::{
    dyn_abi::DynSolValue,
    primitives::{I256, U256},
};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::AppError;
use crate::ethereum::utils;

/// Largest integer that survives a round trip through an f64-backed JSON
/// number without precision loss (2^53 - 1).
const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// Canonical classification of an ABI type tag.
///
/// Resolved once per parameter when an ABI is loaded; the encoding rules
/// below dispatch on this enum instead of re-inspecting the type string on
/// every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// Any array type (`uint256[]`, `string[]`, ...)
    Array,
    /// `uint*` or `int*`
    Integer { signed: bool },
    /// `bool`
    Bool,
    /// `address`
    Address,
    /// Fixed-width `bytes32`
    Bytes32,
    /// Any other `bytes*` width, including dynamic `bytes`
    Bytes,
    /// `string`, `tuple`, or anything unrecognized - passed through verbatim
    Other,
}

impl ParamKind {
    /// Classify an ABI type tag. First match wins, array suffix checked
    /// before everything else so `uint256[]` resolves as an array.
    pub fn resolve(ty: &str) -> Self {
        if ty.ends_with("[]") {
            ParamKind::Array
        } else if ty.starts_with("uint") {
            ParamKind::Integer { signed: false }
        } else if ty.starts_with("int") {
            ParamKind::Integer { signed: true }
        } else if ty == "bool" {
            ParamKind::Bool
        } else if ty == "address" {
            ParamKind::Address
        } else if ty == "bytes32" {
            ParamKind::Bytes32
        } else if ty.starts_with("bytes") {
            ParamKind::Bytes
        } else {
            ParamKind::Other
        }
    }
}

/// An ABI parameter with its kind resolved ahead of time.
#[derive(Debug, Clone)]
pub struct ResolvedParam {
    pub name: String,
    pub ty: String,
    pub kind: ParamKind,
}

impl ResolvedParam {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        let ty = ty.into();
        let kind = ParamKind::resolve(&ty);
        Self {
            name: name.into(),
            ty,
            kind,
        }
    }
}

/// Resolve a function's input list from `alloy` ABI parameters.
pub fn resolve_inputs(params: &[alloy::json_abi::Param]) -> Vec<ResolvedParam> {
    params
        .iter()
        .map(|p| ResolvedParam::new(&p.name, &p.ty))
        .collect()
}

/// Resolve an event's input list, keeping declaration order.
pub fn resolve_event_inputs(params: &[alloy::json_abi::EventParam]) -> Vec<ResolvedParam> {
    params
        .iter()
        .map(|p| ResolvedParam::new(&p.name, &p.ty))
        .collect()
}

/// Short human hint describing the expected textual format for a type tag.
pub fn placeholder_hint(ty: &str) -> String {
    match ParamKind::resolve(ty) {
        ParamKind::Array => "Enter JSON array [...]".to_string(),
        ParamKind::Integer { .. } => "Enter number".to_string(),
        ParamKind::Bool => "Enter true or false".to_string(),
        ParamKind::Address => "Enter 0x...".to_string(),
        ParamKind::Bytes32 => "Enter text or hex (0x...)".to_string(),
        ParamKind::Bytes => "Enter hex (0x...) or text".to_string(),
        ParamKind::Other => format!("Enter {}", ty),
    }
}

/// Convert one raw user string into the JSON value the call gateway expects.
///
/// Dispatches on the pre-resolved kind; every parse failure maps to the
/// uniform `InvalidParameterFormat(type)` unless a more specific bytes32 or
/// address kind applies.
pub fn encode_parameter(raw: &str, param: &ResolvedParam) -> Result<Value, AppError> {
    let invalid = || AppError::InvalidParameterFormat(param.ty.clone());

    match &param.kind {
        ParamKind::Array => {
            // The raw value must itself be a JSON array literal; elements are
            // passed through untouched, with no per-element coercion.
            let parsed: Value = serde_json::from_str(raw).map_err(|_| invalid())?;
            if parsed.is_array() {
                Ok(parsed)
            } else {
                Err(invalid())
            }
        }
        ParamKind::Integer { signed } => {
            let trimmed = raw.trim();
            let canonical = if *signed {
                I256::from_dec_str(trimmed).map_err(|_| invalid())?.to_string()
            } else {
                U256::from_str_radix(trimmed, 10)
                    .map_err(|_| invalid())?
                    .to_string()
            };
            Ok(Value::String(canonical))
        }
        // Intentionally non-strict: only an exact case-insensitive match to
        // "true" yields true, everything else (including "false") is false.
        ParamKind::Bool => Ok(Value::Bool(raw.trim().eq_ignore_ascii_case("true"))),
        ParamKind::Address => {
            utils::validate_address(raw).map_err(|_| AppError::InvalidAddressFormat)?;
            // Returned unchanged - no case normalization.
            Ok(Value::String(raw.to_string()))
        }
        ParamKind::Bytes32 => {
            if let Some(hex_part) = raw.strip_prefix("0x") {
                let decoded = hex::decode(hex_part).map_err(|_| invalid())?;
                if decoded.len() != 32 {
                    return Err(AppError::InvalidBytes32Length);
                }
                Ok(Value::String(raw.to_string()))
            } else {
                let text = raw.as_bytes();
                if text.len() > 32 {
                    return Err(AppError::Bytes32Overflow);
                }
                let mut padded = [0u8; 32];
                padded[..text.len()].copy_from_slice(text);
                Ok(Value::String(format!("0x{}", hex::encode(padded))))
            }
        }
        ParamKind::Bytes => {
            if raw.starts_with("0x") {
                Ok(Value::String(raw.to_string()))
            } else {
                Ok(Value::String(format!("0x{}", hex::encode(raw.as_bytes()))))
            }
        }
        ParamKind::Other => Ok(Value::String(raw.to_string())),
    }
}

/// Check every declared input against the form values, in order.
///
/// Reports the first missing or empty parameter as `MissingParameter`, then
/// trial-encodes each present value and propagates the first encoding
/// failure. Short-circuits; it never accumulates violations.
pub fn validate_required_inputs(
    inputs: &[ResolvedParam],
    values: &HashMap<String, String>,
) -> Result<(), AppError> {
    for input in inputs {
        let value = values.get(&input.name).map(String::as_str).unwrap_or("");
        if value.is_empty() {
            return Err(AppError::MissingParameter(input.name.clone()));
        }
        // Encoded result is discarded here; the real encoding happens again
        // at call time.
        encode_parameter(value, input)?;
    }
    Ok(())
}

/// Recursively normalize an arbitrary JSON tree into display-safe form.
///
/// Integers beyond the safe f64 range become decimal strings; arrays and
/// objects recurse preserving order and keys; everything else passes through.
/// Idempotent by construction.
pub fn serialize_result(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                if u > MAX_SAFE_INTEGER {
                    return Value::String(u.to_string());
                }
            } else if let Some(i) = n.as_i64() {
                if i.unsigned_abs() > MAX_SAFE_INTEGER {
                    return Value::String(i.to_string());
                }
            }
            value.clone()
        }
        Value::Array(items) => Value::Array(items.iter().map(serialize_result).collect()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), serialize_result(item));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Render a decoded Solidity value as display-safe JSON.
///
/// Integers are always rendered as decimal strings to avoid precision loss;
/// addresses and byte strings as 0x-prefixed hex; arrays and tuples recurse
/// positionally.
pub fn decoded_to_json(value: &DynSolValue) -> Result<Value, AppError> {
    match value {
        DynSolValue::Address(addr) => Ok(Value::String(format!("0x{:x}", addr))),
        DynSolValue::Uint(num, _) => Ok(Value::String(num.to_string())),
        DynSolValue::Int(num, _) => Ok(Value::String(num.to_string())),
        DynSolValue::Bool(b) => Ok(Value::Bool(*b)),
        DynSolValue::String(s) => Ok(Value::String(s.clone())),
        DynSolValue::Bytes(bytes) => Ok(Value::String(format!("0x{}", hex::encode(bytes)))),
        DynSolValue::FixedBytes(bytes, _) => {
            Ok(Value::String(format!("0x{}", hex::encode(bytes))))
        }
        DynSolValue::Array(arr) | DynSolValue::FixedArray(arr) => {
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                out.push(decoded_to_json(item)?);
            }
            Ok(Value::Array(out))
        }
        DynSolValue::Tuple(tuple) => {
            let mut out = Vec::with_capacity(tuple.len());
            for item in tuple {
                out.push(decoded_to_json(item)?);
            }
            Ok(Value::Array(out))
        }
        _ => Err(AppError::gateway(format!(
            "Unsupported decoded value: {:?}",
            value
        ))),
    }
}

/// Flatten a function's decoded return values: a single output is returned
/// bare, multiple outputs become a positional array.
pub fn decoded_outputs_to_json(values: &[DynSolValue]) -> Result<Value, AppError> {
    if values.len() == 1 {
        decoded_to_json(&values[0])
    } else {
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            out.push(decoded_to_json(value)?);
        }
        Ok(Value::Array(out))
    }
}
