use alloy::{
    primitives::{Address, Signature},
    signers::{local::PrivateKeySigner, Signer},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use crate::config::Config;
use crate::error::AppError;

/// Wallet capability consumed by the call surfaces.
///
/// Always injected explicitly; nothing in this crate reads an ambient wallet
/// handle.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Accounts this wallet can sign for.
    async fn request_accounts(&self) -> Result<Vec<Address>, AppError>;

    /// Chain the wallet is currently pointed at.
    async fn chain_id(&self) -> Result<u64, AppError>;

    /// Point the wallet at another configured chain.
    async fn switch_chain(&self, chain_id: u64) -> Result<(), AppError>;

    /// EIP-191 personal-message signature, 0x-prefixed hex.
    async fn sign_personal_message(
        &self,
        message: &str,
        address: Address,
    ) -> Result<String, AppError>;
}

/// Recover the address that produced an EIP-191 personal-message signature.
///
/// Pure computation; no wallet or provider involved.
pub fn recover_signer(message: &str, signature: &str) -> Result<Address, AppError> {
    let raw = hex::decode(signature.trim().trim_start_matches("0x"))
        .map_err(|_| AppError::InvalidParameterFormat("signature".to_string()))?;
    let signature = Signature::try_from(raw.as_slice())
        .map_err(|_| AppError::InvalidParameterFormat("signature".to_string()))?;

    signature
        .recover_address_from_msg(message)
        .map_err(|e| AppError::gateway(format!("Failed to recover signer: {}", e)))
}

/// Wallet backed by a local private-key signer.
///
/// Tracks which configured chain it is pointed at; switching is only allowed
/// between chains present in the configuration.
#[derive(Debug)]
pub struct LocalWallet {
    signer: PrivateKeySigner,
    known_chains: HashMap<u64, String>,
    current_chain: Mutex<u64>,
}

impl LocalWallet {
    /// Build a wallet from a 0x-optional hex private key.
    pub fn from_private_key(private_key: &str, config: &Config) -> Result<Self, AppError> {
        let private_key = private_key.trim();
        let private_key = private_key.strip_prefix("0x").unwrap_or(private_key);

        let signer = PrivateKeySigner::from_str(private_key)
            .map_err(|_| AppError::gateway("Invalid private key".to_string()))?;

        let known_chains: HashMap<u64, String> = config
            .networks
            .iter()
            .map(|(key, net)| (net.chain_id, key.clone()))
            .collect();

        let current = config
            .networks
            .get(&config.default_network)
            .map(|net| net.chain_id)
            .unwrap_or(1);

        tracing::info!("Wallet loaded for address {:?}", signer.address());

        Ok(Self {
            signer,
            known_chains,
            current_chain: Mutex::new(current),
        })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Clone of the underlying signer for transaction submission.
    pub fn signer(&self) -> PrivateKeySigner {
        self.signer.clone()
    }

    fn current(&self) -> u64 {
        self.current_chain.lock().map(|c| *c).unwrap_or(1)
    }

    /// Make sure the wallet is on the target chain, switching if possible.
    pub async fn ensure_chain(&self, target_chain_id: u64) -> Result<(), AppError> {
        if self.current() == target_chain_id {
            return Ok(());
        }
        self.switch_chain(target_chain_id).await
    }
}

#[async_trait]
impl WalletProvider for LocalWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, AppError> {
        Ok(vec![self.signer.address()])
    }

    async fn chain_id(&self) -> Result<u64, AppError> {
        Ok(self.current())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), AppError> {
        if !self.known_chains.contains_key(&chain_id) {
            return Err(AppError::ChainMismatch {
                expected: chain_id,
                actual: self.current(),
            });
        }

        if let Ok(mut current) = self.current_chain.lock() {
            *current = chain_id;
        }
        tracing::info!("Wallet switched to chain {}", chain_id);
        Ok(())
    }

    async fn sign_personal_message(
        &self,
        message: &str,
        address: Address,
    ) -> Result<String, AppError> {
        if address != self.signer.address() {
            // The requested account is not held by this wallet.
            return Err(AppError::WalletNotConnected);
        }

        let signature = self
            .signer
            .sign_message(message.as_bytes())
            .await
            .map_err(|e| AppError::gateway(format!("Failed to sign message: {}", e)))?;

        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    // Well-known Anvil development key, safe to embed in tests.
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn wallet() -> LocalWallet {
        LocalWallet::from_private_key(TEST_KEY, &Config::default()).unwrap()
    }

    #[tokio::test]
    async fn test_accounts_and_chain() {
        let wallet = wallet();
        let accounts = wallet.request_accounts().await.unwrap();
        assert_eq!(accounts, vec![wallet.address()]);
        // Default config points at Sepolia
        assert_eq!(wallet.chain_id().await.unwrap(), 11155111);
    }

    #[tokio::test]
    async fn test_switch_chain() {
        let wallet = wallet();
        wallet.switch_chain(1).await.unwrap();
        assert_eq!(wallet.chain_id().await.unwrap(), 1);

        match wallet.switch_chain(424242).await {
            Err(AppError::ChainMismatch { expected, actual }) => {
                assert_eq!(expected, 424242);
                assert_eq!(actual, 1);
            }
            other => panic!("expected ChainMismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sign_and_recover_round_trip() {
        let wallet = wallet();
        let message = "hello abideck";

        let signature = wallet
            .sign_personal_message(message, wallet.address())
            .await
            .unwrap();
        assert!(signature.starts_with("0x"));
        // 65 signature bytes as hex
        assert_eq!(signature.len(), 2 + 130);

        let recovered = recover_signer(message, &signature).unwrap();
        assert_eq!(recovered, wallet.address());
    }

    #[tokio::test]
    async fn test_sign_rejects_foreign_account() {
        let wallet = wallet();
        let other = Address::ZERO;

        assert!(matches!(
            wallet.sign_personal_message("msg", other).await,
            Err(AppError::WalletNotConnected)
        ));
    }

    #[test]
    fn test_recover_rejects_malformed_signature() {
        assert!(recover_signer("msg", "0x1234").is_err());
        assert!(recover_signer("msg", "not-hex").is_err());
    }
}
