use alloy::primitives::Address;
use anyhow::{anyhow, Result};
use std::str::FromStr;

/// Validates an Ethereum address string and parses it.
///
/// The caller decides what to do with the parsed form; the codec keeps the
/// original string untouched on success.
pub fn validate_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(anyhow!("Address cannot be empty"));
    }

    if !address.starts_with("0x") && !address.starts_with("0X") {
        return Err(anyhow!(
            "Invalid address format: '{}'. Ethereum addresses must start with '0x'",
            address
        ));
    }

    if address.len() != 42 {
        return Err(anyhow!(
            "Invalid address length: '{}'. Ethereum addresses must be exactly 42 characters (0x + 40 hex characters)",
            address
        ));
    }

    let hex_part = &address[2..];
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!(
            "Invalid address format: '{}'. Contains non-hexadecimal characters",
            address
        ));
    }

    Address::from_str(address)
        .map_err(|e| anyhow!("Invalid Ethereum address: '{}'. Error: {}", address, e))
}

/// Validates a chain key against the configured networks.
pub fn validate_chain(chain: &str, available_chains: &[String]) -> Result<()> {
    if chain.is_empty() {
        return Err(anyhow!("Chain key cannot be empty"));
    }

    if !available_chains.contains(&chain.to_string()) {
        return Err(anyhow!(
            "Unknown chain: '{}'. Available chains: {}",
            chain,
            available_chains.join(", ")
        ));
    }

    Ok(())
}

/// Validates a function or event name as a Solidity identifier.
pub fn validate_function_name(function_name: &str) -> Result<()> {
    if function_name.is_empty() {
        return Err(anyhow!("Function name cannot be empty"));
    }

    if !function_name.chars().next().unwrap().is_ascii_alphabetic()
        && !function_name.starts_with('_')
    {
        return Err(anyhow!(
            "Invalid function name: '{}'. Function names must start with a letter or underscore",
            function_name
        ));
    }

    if !function_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(anyhow!(
            "Invalid function name: '{}'. Function names can only contain letters, numbers, and underscores",
            function_name
        ));
    }

    Ok(())
}

/// Creates user-friendly error messages for common RPC errors.
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("execution reverted") {
        "Transaction failed: Contract execution reverted. This usually means the function's requirements were not met or an assertion failed.".to_string()
    } else if error.contains("insufficient funds") {
        "Transaction failed: Insufficient funds to cover gas costs. Make sure your account has enough ETH for gas fees.".to_string()
    } else if error.contains("gas required exceeds allowance") {
        "Transaction failed: Gas limit too low. Try increasing the gas limit for this transaction."
            .to_string()
    } else if error.contains("nonce too low") {
        "Transaction failed: Nonce too low. This usually means another transaction was already mined with this nonce.".to_string()
    } else if error.contains("connection refused") || error.contains("network unreachable") {
        "Network error: Cannot connect to RPC endpoint. Check your internet connection and RPC URL configuration.".to_string()
    } else if error.contains("timeout") {
        "Network error: Request timed out. The RPC endpoint may be overloaded or unreachable."
            .to_string()
    } else if error.contains("rate limit") {
        "Rate limit error: Too many requests to the RPC endpoint. Try again in a few moments or use a different endpoint.".to_string()
    } else if error.contains("method not found") {
        "RPC error: The requested method is not supported by this RPC endpoint. Try using a different endpoint.".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}

/// True when an RPC error message indicates a contract revert.
pub fn is_revert_error(error: &str) -> bool {
    error.contains("execution reverted") || error.contains("revert")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_address() {
        assert!(validate_address("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_ok());
        assert!(validate_address("0x0000000000000000000000000000000000000000").is_ok());

        assert!(validate_address("").is_err());
        assert!(validate_address("not_an_address").is_err());
        assert!(validate_address("0x123").is_err()); // Too short
        assert!(validate_address("742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_err()); // Missing 0x
        assert!(validate_address("0xgg2d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_err());
        // Invalid hex
    }

    #[test]
    fn test_validate_chain() {
        let chains = vec!["ethereum_testnet".to_string(), "base_mainnet".to_string()];

        assert!(validate_chain("ethereum_testnet", &chains).is_ok());
        assert!(validate_chain("base_mainnet", &chains).is_ok());
        assert!(validate_chain("invalid", &chains).is_err());
        assert!(validate_chain("", &chains).is_err());
    }

    #[test]
    fn test_validate_function_name() {
        assert!(validate_function_name("transfer").is_ok());
        assert!(validate_function_name("_internal").is_ok());
        assert!(validate_function_name("getBalance123").is_ok());

        assert!(validate_function_name("").is_err());
        assert!(validate_function_name("123invalid").is_err());
        assert!(validate_function_name("invalid-name").is_err());
    }

    #[test]
    fn test_revert_detection() {
        assert!(is_revert_error("server returned: execution reverted"));
        assert!(!is_revert_error("connection refused"));
    }
}
