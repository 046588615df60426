//! ============================================================================
//! Delegation Eligibility - Which of an owner's tokens can be rented out
//! ============================================================================
//! A token is free when its owner matches and it has no active delegate.
//! Results are a fresh snapshot per call; never cache them.
//! ============================================================================

use futures_util::stream::{self, StreamExt};
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::reader::TokenStateReader;
use crate::types::{AccessError, Account, TokenId};

/// True when `account` owns the token and no delegate is active at `now`
pub fn free_for_delegation(
    account: &Account,
    owner: &Account,
    delegate: Option<&Account>,
    delegate_expires_at: i64,
    now: i64,
) -> bool {
    owner == account && (delegate.is_none() || delegate_expires_at <= now)
}

/// Lists tokens an owner may delegate
pub struct DelegationFilter {
    reader: TokenStateReader,
    clock: Arc<dyn Clock>,
    concurrency: usize,
}

impl DelegationFilter {
    pub fn new(reader: TokenStateReader, clock: Arc<dyn Clock>) -> Self {
        Self {
            reader,
            clock,
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn reader(&self) -> &TokenStateReader {
        &self.reader
    }

    /// Read the issued count and list free tokens as of the clock's `now`
    pub async fn rentable_tokens(&self, account: &Account) -> Result<Vec<TokenId>, AccessError> {
        let total = self.reader.read_total_issued().await?;
        let now = self.clock.now();
        Ok(self.eligible_for_delegation(account, total, now).await)
    }

    /// Ascending IDs in `0..total_issued` owned by `account` with no active
    /// delegate at `now`. Unreadable tokens are left out.
    pub async fn eligible_for_delegation(
        &self,
        account: &Account,
        total_issued: u64,
        now: i64,
    ) -> Vec<TokenId> {
        let mut checks = pin!(stream::iter(0..total_issued)
            .map(move |id| async move { (id, self.check(account, id, now).await) })
            .buffered(self.concurrency));

        let mut eligible = Vec::new();
        while let Some((id, outcome)) = checks.next().await {
            match outcome {
                Ok(true) => eligible.push(id),
                Ok(false) => {}
                Err(AccessError::InvalidTokenId(_)) => {
                    debug!("Token #{} not minted, skipping", id);
                }
                Err(e) => {
                    warn!("Skipping token #{} during eligibility scan: {}", id, e);
                }
            }
        }

        debug!(
            "{} of {} tokens free for delegation by {}",
            eligible.len(),
            total_issued,
            account
        );
        eligible
    }

    async fn check(&self, account: &Account, id: TokenId, now: i64) -> Result<bool, AccessError> {
        let owner = self.reader.owner_of(id).await?;
        if owner != *account {
            return Ok(false);
        }

        let delegate = self.reader.delegate_of(id).await?;
        let expires_at = match delegate {
            Some(_) => self.reader.delegate_expires(id).await?,
            None => 0,
        };
        Ok(free_for_delegation(
            account,
            &owner,
            delegate.as_ref(),
            expires_at,
            now,
        ))
    }
}
