//! ============================================================================
//! Token Store - Boundary with the authoritative subscription contract
//! ============================================================================
//! The store owns token ownership, validity and delegation state. This layer
//! only reads it and submits delegation assignments; it never locks it.
//!
//! - `EvmRpcStore`: JSON-RPC client for an ERC-721 + ERC-4907 contract
//! - `InMemoryStore`: in-process store for tests and offline runs
//! ============================================================================

pub mod abi;
mod memory;
mod rpc;

pub use memory::InMemoryStore;
pub use rpc::EvmRpcStore;

use async_trait::async_trait;

use crate::types::{Account, TokenId};

/// Failure of a single store call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Transport, timeout, or node-side failure
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The token has not been minted
    #[error("token #{0} not minted")]
    NotMinted(TokenId),

    /// The store refused a write
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Handle for a submitted, not yet confirmed, assignment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubmissionId(pub String);

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusion status of a submitted assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
    Pending,
    Committed,
    Reverted(String),
}

/// Request/response surface of the subscription contract.
///
/// Every call is independent; callers must tolerate read skew between calls.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Number of tokens ever issued (IDs are `0..total`)
    async fn total_issued(&self) -> Result<u64, StoreError>;

    async fn owner_of(&self, token_id: TokenId) -> Result<Account, StoreError>;

    async fn is_valid(&self, token_id: TokenId) -> Result<bool, StoreError>;

    /// Current delegate, `None` for the zero address
    async fn delegate_of(&self, token_id: TokenId) -> Result<Option<Account>, StoreError>;

    /// Delegate expiry in epoch seconds
    async fn delegate_expires(&self, token_id: TokenId) -> Result<i64, StoreError>;

    /// Submit `(token, delegate, expires_at)` from `caller`.
    /// Success here only means the request was accepted for inclusion.
    async fn submit_assignment(
        &self,
        caller: &Account,
        token_id: TokenId,
        delegate: &Account,
        expires_at: i64,
    ) -> Result<SubmissionId, StoreError>;

    async fn assignment_status(&self, id: &SubmissionId) -> Result<SubmissionStatus, StoreError>;
}

/// Revert data prefix of `ERC721NonexistentToken(uint256)`
const NONEXISTENT_TOKEN_DATA: &str = "0x7e273289";

/// Classify a node error message.
/// Revert reasons mentioning a missing token mean "not minted", whether as
/// text or as the encoded custom error; other reverts are refusals;
/// everything else is treated as transport trouble.
pub fn classify_error(token_id: Option<TokenId>, message: &str) -> StoreError {
    let lower = message.to_lowercase();

    if let Some(id) = token_id {
        if lower.contains(NONEXISTENT_TOKEN_DATA)
            || lower.contains("invalid token id")
            || lower.contains("nonexistenttoken")
            || lower.contains("nonexistent token")
            || lower.contains("owner query for nonexistent")
            || lower.contains("not minted")
        {
            return StoreError::NotMinted(id);
        }
    }

    if lower.contains("execution reverted")
        || lower.contains("revert")
        || lower.contains("not owner")
        || lower.contains("caller is not")
    {
        return StoreError::Rejected(message.to_string());
    }

    StoreError::Unavailable(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_minted() {
        let msgs = [
            "execution reverted: ERC721: invalid token ID",
            "execution reverted: ERC721NonexistentToken(7)",
            "ERC721: owner query for nonexistent token",
            "execution reverted (3): 0x7e2732890000000000000000000000000000000000000000000000000000000000000007",
        ];
        for msg in msgs {
            assert_eq!(
                classify_error(Some(7), msg),
                StoreError::NotMinted(7),
                "Expected NotMinted for: {}",
                msg
            );
        }
    }

    #[test]
    fn test_classify_rejected() {
        assert!(matches!(
            classify_error(Some(1), "execution reverted: ERC4907: transfer caller is not owner nor approved"),
            StoreError::Rejected(_)
        ));
        // Missing-token wording without a token context is a plain refusal
        assert!(matches!(
            classify_error(None, "execution reverted: ERC721: invalid token ID"),
            StoreError::Rejected(_)
        ));
    }

    #[test]
    fn test_nonexistent_token_data_matches_selector() {
        assert_eq!(
            NONEXISTENT_TOKEN_DATA,
            format!("0x{}", hex::encode(abi::selector(abi::ERR_NONEXISTENT_TOKEN)))
        );
    }

    #[test]
    fn test_classify_unavailable() {
        let msgs = ["connection refused", "timeout waiting for response", "HTTP 502"];
        for msg in msgs {
            assert!(matches!(
                classify_error(Some(0), msg),
                StoreError::Unavailable(_)
            ));
        }
    }
}
