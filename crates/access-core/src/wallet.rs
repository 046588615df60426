//! ============================================================================
//! Account Connection - Who is asking
//! ============================================================================
//! A connector yields the caller's account. `ConnectMode` says whether the
//! connector may prompt the user (interactive) or must answer from already
//! granted accounts (silent).
//! ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::store::{EvmRpcStore, StoreError};
use crate::types::{AccessError, Account};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectMode {
    /// No permission prompt; use accounts already exposed
    Silent,
    /// May ask the user to grant access
    Interactive,
}

impl ConnectMode {
    /// JSON-RPC method backing this mode
    pub fn rpc_method(&self) -> &'static str {
        match self {
            ConnectMode::Silent => "eth_accounts",
            ConnectMode::Interactive => "eth_requestAccounts",
        }
    }
}

#[async_trait]
pub trait AccountConnector: Send + Sync {
    /// First available account, or `None` when nothing is connected
    async fn connect(&self, mode: ConnectMode) -> Result<Option<Account>, AccessError>;
}

/// Connector that always returns a fixed account
#[derive(Debug, Clone)]
pub struct StaticAccount(pub Account);

#[async_trait]
impl AccountConnector for StaticAccount {
    async fn connect(&self, _mode: ConnectMode) -> Result<Option<Account>, AccessError> {
        Ok(Some(self.0.clone()))
    }
}

#[async_trait]
impl AccountConnector for EvmRpcStore {
    async fn connect(&self, mode: ConnectMode) -> Result<Option<Account>, AccessError> {
        let value = self
            .request(mode.rpc_method(), json!([]), None)
            .await
            .map_err(|e| match e {
                StoreError::Unavailable(msg) | StoreError::Rejected(msg) => {
                    AccessError::StoreUnavailable(msg)
                }
                StoreError::NotMinted(id) => AccessError::InvalidTokenId(id),
            })?;
        Ok(first_account(&value))
    }
}

/// First well-formed address of an accounts array
fn first_account(value: &Value) -> Option<Account> {
    let accounts = value.as_array()?;
    let first = accounts.first()?.as_str()?;
    match Account::parse_address(first) {
        Ok(account) => {
            debug!("Connected account {}", account);
            Some(account)
        }
        Err(_) => {
            warn!("Node returned malformed account '{}'", first);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_methods() {
        assert_eq!(ConnectMode::Silent.rpc_method(), "eth_accounts");
        assert_eq!(ConnectMode::Interactive.rpc_method(), "eth_requestAccounts");
    }

    #[test]
    fn test_first_account() {
        let addr = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
        assert_eq!(
            first_account(&json!([addr, "0x70997970c51812dc3a010c7d01b50e0d17dc79c8"])),
            Some(Account::new(addr))
        );
        assert_eq!(first_account(&json!([])), None);
        assert_eq!(first_account(&json!(["bogus"])), None);
        assert_eq!(first_account(&Value::Null), None);
    }

    #[tokio::test]
    async fn test_static_account_ignores_mode() {
        let account = Account::new("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
        let connector = StaticAccount(account.clone());
        assert_eq!(connector.connect(ConnectMode::Silent).await.unwrap(), Some(account.clone()));
        assert_eq!(connector.connect(ConnectMode::Interactive).await.unwrap(), Some(account));
    }
}
