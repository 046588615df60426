//! ============================================================================
//! Token State Reader - Timed, typed reads from the token store
//! ============================================================================
//! Every field is its own remote call with its own timeout. Nothing is
//! cached, and no consistency across calls is assumed.
//! ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::DEFAULT_RPC_TIMEOUT_SECS;
use crate::store::{StoreError, TokenStore};
use crate::types::{AccessError, Account, TokenId, TokenState};

/// Reads token fields and the issued count from a `TokenStore`
#[derive(Clone)]
pub struct TokenStateReader {
    store: Arc<dyn TokenStore>,
    timeout: Duration,
}

impl TokenStateReader {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self::with_timeout(store, Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS))
    }

    pub fn with_timeout(store: Arc<dyn TokenStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) async fn timed<T, F>(&self, what: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "{} timed out after {:?}",
                what, self.timeout
            ))),
        }
    }

    pub async fn read_total_issued(&self) -> Result<u64, AccessError> {
        let total = self
            .timed("total issued", self.store.total_issued())
            .await
            .map_err(read_error)?;
        debug!("Total issued: {}", total);
        Ok(total)
    }

    pub async fn owner_of(&self, token_id: TokenId) -> Result<Account, AccessError> {
        self.timed("ownerOf", self.store.owner_of(token_id))
            .await
            .map_err(read_error)
    }

    pub async fn is_valid(&self, token_id: TokenId) -> Result<bool, AccessError> {
        self.timed("isValid", self.store.is_valid(token_id))
            .await
            .map_err(read_error)
    }

    pub async fn delegate_of(&self, token_id: TokenId) -> Result<Option<Account>, AccessError> {
        self.timed("userOf", self.store.delegate_of(token_id))
            .await
            .map_err(read_error)
    }

    pub async fn delegate_expires(&self, token_id: TokenId) -> Result<i64, AccessError> {
        self.timed("userExpires", self.store.delegate_expires(token_id))
            .await
            .map_err(read_error)
    }

    /// Read all four fields of a token
    pub async fn read_token(&self, token_id: TokenId) -> Result<TokenState, AccessError> {
        let owner = self.owner_of(token_id).await?;
        let is_valid = self.is_valid(token_id).await?;
        let delegate = self.delegate_of(token_id).await?;
        let delegate_expires_at = self.delegate_expires(token_id).await?;

        Ok(TokenState {
            id: token_id,
            owner,
            is_valid,
            delegate,
            delegate_expires_at,
        })
    }
}

/// Reads never see a legitimate refusal, so a revert is store trouble
fn read_error(e: StoreError) -> AccessError {
    match e {
        StoreError::NotMinted(id) => AccessError::InvalidTokenId(id),
        StoreError::Unavailable(msg) => AccessError::StoreUnavailable(msg),
        StoreError::Rejected(msg) => AccessError::StoreUnavailable(format!("read reverted: {}", msg)),
    }
}
