use thiserror::Error;

/// Domain error taxonomy surfaced to tool callers.
///
/// Parameter-level errors are raised before any network call is attempted;
/// gateway and wallet errors wrap failures from the RPC boundary. None of
/// these are fatal to the server - every one is rendered as a readable
/// message and the caller can correct input and retry.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Parameter '{0}' is required")]
    MissingParameter(String),

    #[error("Invalid parameter format for type {0}")]
    InvalidParameterFormat(String),

    #[error("Invalid address format")]
    InvalidAddressFormat,

    #[error("Invalid bytes32 value: hex input must decode to exactly 32 bytes")]
    InvalidBytes32Length,

    #[error("Invalid bytes32 value: text exceeds 32 bytes when UTF-8 encoded")]
    Bytes32Overflow,

    #[error("{message}")]
    GatewayCallFailed { message: String, reverted: bool },

    #[error("No wallet is configured. Set WALLET_PRIVATE_KEY to enable signing operations")]
    WalletNotConnected,

    #[error("Wallet is on chain {actual} but the contract targets chain {expected}")]
    ChainMismatch { expected: u64, actual: u64 },
}

impl AppError {
    /// Wrap an RPC-boundary error, flagging contract reverts so callers can
    /// report them as execution failures rather than generic errors.
    pub fn gateway(message: impl Into<String>) -> Self {
        let message = message.into();
        let reverted = message.contains("execution reverted") || message.contains("revert");
        AppError::GatewayCallFailed { message, reverted }
    }

    /// True when this error was caused by a contract reverting execution.
    pub fn is_revert(&self) -> bool {
        matches!(self, AppError::GatewayCallFailed { reverted: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_flags_reverts() {
        let err = AppError::gateway("server returned an error: execution reverted");
        assert!(err.is_revert());

        let err = AppError::gateway("connection refused");
        assert!(!err.is_revert());
    }
}
