use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use crate::ethereum::ContractRecord;

/// A contract record as entered by the user, before an id and creation
/// timestamp are assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContract {
    pub name: String,
    pub address: String,
    pub abi: Value,
    pub chain: String,
    pub is_public: Option<bool>,
}

/// JSON-file persistence of user-saved contract records.
///
/// The whole record list lives in one file under the platform data
/// directory; every mutation rewrites it. Fine for the tens of records a
/// single user keeps.
#[derive(Debug)]
pub struct LocalRegistry {
    path: PathBuf,
}

impl LocalRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> Result<PathBuf> {
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow!("Could not determine data directory"))?;
        Ok(data_dir.join("abideck").join("contracts.json"))
    }

    /// All saved records, newest last.
    pub async fn list(&self) -> Result<Vec<ContractRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| anyhow!("Failed to read registry file {:?}: {}", self.path, e))?;

        let records: Vec<ContractRecord> = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse registry file {:?}: {}", self.path, e))?;

        Ok(records)
    }

    /// Persist a new record, assigning a generated id and creation
    /// timestamp. Returns the stored record.
    pub async fn save(&self, draft: NewContract) -> Result<ContractRecord> {
        let record = ContractRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: draft.name,
            address: draft.address,
            abi: draft.abi,
            chain: draft.chain,
            is_public: draft.is_public,
            created_at: Some(chrono::Utc::now().timestamp_millis()),
            creator: None,
        };

        let mut records = self.list().await?;
        records.push(record.clone());
        self.write(&records).await?;

        debug!("Saved contract record {}", record.id);
        Ok(record)
    }

    /// Delete a record by id. Returns false when no record matched.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut records = self.list().await?;
        let before = records.len();
        records.retain(|r| r.id != id);

        if records.len() == before {
            return Ok(false);
        }

        self.write(&records).await?;
        debug!("Deleted contract record {}", id);
        Ok(true)
    }

    /// Look up a single record by id.
    pub async fn get(&self, id: &str) -> Result<ContractRecord> {
        self.list()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow!("No saved contract with id '{}'", id))
    }

    async fn write(&self, records: &[ContractRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| anyhow!("Failed to create registry directory {:?}: {}", parent, e))?;
            }
        }

        let content = serde_json::to_string_pretty(records)
            .map_err(|e| anyhow!("Failed to serialize registry: {}", e))?;

        fs::write(&self.path, content)
            .await
            .map_err(|e| anyhow!("Failed to write registry file {:?}: {}", self.path, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn draft(name: &str) -> NewContract {
        NewContract {
            name: name.to_string(),
            address: "0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e".to_string(),
            abi: json!([]),
            chain: "ethereum_testnet".to_string(),
            is_public: None,
        }
    }

    #[tokio::test]
    async fn test_list_empty_when_file_missing() {
        let dir = tempdir().unwrap();
        let registry = LocalRegistry::new(dir.path().join("contracts.json"));

        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_timestamp() {
        let dir = tempdir().unwrap();
        let registry = LocalRegistry::new(dir.path().join("contracts.json"));

        let saved = registry.save(draft("Token")).await.unwrap();
        assert!(!saved.id.is_empty());
        assert!(saved.created_at.is_some());

        let listed = registry.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, saved.id);
        assert_eq!(listed[0].name, "Token");
    }

    #[tokio::test]
    async fn test_save_generates_unique_ids() {
        let dir = tempdir().unwrap();
        let registry = LocalRegistry::new(dir.path().join("contracts.json"));

        let first = registry.save(draft("A")).await.unwrap();
        let second = registry.save(draft("B")).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempdir().unwrap();
        let registry = LocalRegistry::new(dir.path().join("contracts.json"));

        let saved = registry.save(draft("Token")).await.unwrap();
        assert!(registry.delete(&saved.id).await.unwrap());
        assert!(registry.list().await.unwrap().is_empty());

        // Unknown id reports false rather than failing
        assert!(!registry.delete("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_get() {
        let dir = tempdir().unwrap();
        let registry = LocalRegistry::new(dir.path().join("contracts.json"));

        let saved = registry.save(draft("Token")).await.unwrap();
        let fetched = registry.get(&saved.id).await.unwrap();
        assert_eq!(fetched.name, "Token");

        assert!(registry.get("missing").await.is_err());
    }
}
