//! ============================================================================
//! Access Resolver - Ownership / rental authorization scan
//! ============================================================================
//! Walks token IDs in ascending order and stops at the first token that
//! authorizes the account. `now` is sampled once per resolution.
//! ============================================================================

use futures_util::stream::{self, StreamExt};
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::reader::TokenStateReader;
use crate::types::{AccessDecision, AccessError, AccessReason, Account, TokenId};

/// Resolves whether an account holds access through any issued token
pub struct AccessResolver {
    reader: TokenStateReader,
    clock: Arc<dyn Clock>,
    concurrency: usize,
}

impl AccessResolver {
    /// Sequential resolver
    pub fn new(reader: TokenStateReader, clock: Arc<dyn Clock>) -> Self {
        Self {
            reader,
            clock,
            concurrency: 1,
        }
    }

    /// Read up to `concurrency` tokens at once; results are still
    /// consumed in ascending ID order
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Read the issued count, then resolve over the whole range.
    /// Only a failed count read is surfaced.
    pub async fn check_access(&self, account: &Account) -> Result<AccessDecision, AccessError> {
        let total = self.reader.read_total_issued().await?;
        Ok(self.resolve_access(account, total).await)
    }

    /// Resolve over `0..total_issued`. Unreadable tokens are skipped.
    pub async fn resolve_access(&self, account: &Account, total_issued: u64) -> AccessDecision {
        let now = self.clock.now();
        debug!(
            "Resolving access for {} over {} tokens at {}",
            account, total_issued, now
        );

        let mut scans = pin!(stream::iter(0..total_issued)
            .map(move |id| async move { (id, self.evaluate(account, id, now).await) })
            .buffered(self.concurrency));

        let mut scanned = 0u64;
        let mut skipped = 0u64;

        while let Some((id, outcome)) = scans.next().await {
            scanned += 1;
            match outcome {
                Ok(Some(reason)) => {
                    info!(
                        "Access granted to {} via token #{} ({})",
                        account,
                        id,
                        reason.display_name()
                    );
                    let mut decision = AccessDecision::authorized(id, reason, now);
                    decision.tokens_scanned = scanned;
                    decision.tokens_skipped = skipped;
                    return decision;
                }
                Ok(None) => {}
                Err(AccessError::InvalidTokenId(_)) => {
                    skipped += 1;
                    debug!("Token #{} not minted, skipping", id);
                }
                Err(e) => {
                    skipped += 1;
                    warn!("Skipping token #{} during access scan: {}", id, e);
                }
            }
        }

        info!(
            "Access denied to {} ({} tokens scanned, {} skipped)",
            account, scanned, skipped
        );
        let mut decision = AccessDecision::unauthorized(now);
        decision.tokens_scanned = scanned;
        decision.tokens_skipped = skipped;
        decision
    }

    /// Owner check first, delegate check second; fields are read lazily
    async fn evaluate(
        &self,
        account: &Account,
        id: TokenId,
        now: i64,
    ) -> Result<Option<AccessReason>, AccessError> {
        let owner = self.reader.owner_of(id).await?;
        if owner == *account && self.reader.is_valid(id).await? {
            return Ok(Some(AccessReason::OwnerValid));
        }

        if let Some(delegate) = self.reader.delegate_of(id).await? {
            if delegate == *account && self.reader.delegate_expires(id).await? > now {
                return Ok(Some(AccessReason::ActiveDelegate));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::InMemoryStore;

    const NOW: i64 = 1_700_000_000;

    fn alice() -> Account {
        Account::new("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")
    }

    fn bob() -> Account {
        Account::new("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")
    }

    fn carol() -> Account {
        Account::new("0xcccccccccccccccccccccccccccccccccccccccc")
    }

    fn setup() -> (Arc<InMemoryStore>, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(NOW));
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        (store, clock)
    }

    fn resolver(store: &Arc<InMemoryStore>, clock: &Arc<FixedClock>) -> AccessResolver {
        AccessResolver::new(TokenStateReader::new(store.clone()), clock.clone())
    }

    #[tokio::test]
    async fn test_delegate_wins_over_invalid_ownership() {
        let (store, clock) = setup();
        store.mint(alice(), false);
        store.mint(bob(), true);
        let t2 = store.mint(carol(), false);
        store.set_delegate(t2, Some(alice()), NOW + 10);

        let decision = resolver(&store, &clock).check_access(&alice()).await.unwrap();
        assert!(decision.authorized);
        assert_eq!(decision.token_id, Some(2));
        assert_eq!(decision.reason, Some(AccessReason::ActiveDelegate));
        assert_eq!(decision.checked_at, NOW);
    }

    #[tokio::test]
    async fn test_lowest_token_wins() {
        let (store, clock) = setup();
        store.mint(bob(), true);
        let t1 = store.mint(carol(), true);
        store.set_delegate(t1, Some(alice()), NOW + 100);
        store.mint(alice(), true);

        let decision = resolver(&store, &clock).check_access(&alice()).await.unwrap();
        assert_eq!(decision.token_id, Some(1));
        assert_eq!(decision.reason, Some(AccessReason::ActiveDelegate));
        assert_eq!(decision.tokens_scanned, 2);
    }

    #[tokio::test]
    async fn test_short_circuits_on_owner() {
        let (store, clock) = setup();
        for _ in 0..5 {
            store.mint(alice(), true);
        }
        let decision = resolver(&store, &clock).check_access(&alice()).await.unwrap();
        assert_eq!(decision.token_id, Some(0));
        assert_eq!(decision.reason, Some(AccessReason::OwnerValid));
        // total + ownerOf + isValid
        assert_eq!(store.read_count(), 3);
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let (store, clock) = setup();
        let t = store.mint(bob(), true);
        store.set_delegate(t, Some(alice()), NOW);
        let r = resolver(&store, &clock);
        assert!(!r.check_access(&alice()).await.unwrap().authorized);

        store.set_delegate(t, Some(alice()), NOW + 1);
        assert!(r.check_access(&alice()).await.unwrap().authorized);
    }

    #[tokio::test]
    async fn test_case_insensitive_owner() {
        let (store, clock) = setup();
        store.mint(Account::new("0xABCDABCDABCDABCDABCDABCDABCDABCDABCDABCD"), true);
        let decision = resolver(&store, &clock)
            .check_access(&Account::new("0xabcdabcdabcdabcdabcdabcdabcdabcdabcdabcd"))
            .await
            .unwrap();
        assert!(decision.authorized);
        assert_eq!(decision.reason, Some(AccessReason::OwnerValid));
    }

    #[tokio::test]
    async fn test_unreadable_token_is_skipped() {
        let (store, clock) = setup();
        for _ in 0..10 {
            store.mint(bob(), true);
        }
        store.fail_reads(5);
        let r = resolver(&store, &clock);

        let decision = r.check_access(&alice()).await.unwrap();
        assert!(!decision.authorized);
        assert_eq!(decision.tokens_scanned, 10);
        assert_eq!(decision.tokens_skipped, 1);

        store.set_delegate(8, Some(alice()), NOW + 60);
        let decision = r.check_access(&alice()).await.unwrap();
        assert_eq!(decision.token_id, Some(8));
        assert_eq!(decision.tokens_skipped, 1);
    }

    #[tokio::test]
    async fn test_unreadable_authorizing_token_denies() {
        let (store, clock) = setup();
        store.mint(alice(), true);
        store.fail_reads(0);
        let decision = resolver(&store, &clock).check_access(&alice()).await.unwrap();
        assert!(!decision.authorized);
    }

    #[tokio::test]
    async fn test_range_beyond_issued_is_skipped() {
        let (store, clock) = setup();
        store.mint(bob(), true);
        let decision = resolver(&store, &clock).resolve_access(&alice(), 3).await;
        assert!(!decision.authorized);
        assert_eq!(decision.tokens_skipped, 2);
    }

    #[tokio::test]
    async fn test_count_failure_is_surfaced() {
        let (store, clock) = setup();
        store.mint(alice(), true);
        store.set_unavailable(true);
        let err = resolver(&store, &clock).check_access(&alice()).await.unwrap_err();
        assert!(matches!(err, AccessError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_range() {
        let (store, clock) = setup();
        let decision = resolver(&store, &clock).check_access(&alice()).await.unwrap();
        assert!(!decision.authorized);
        assert_eq!(decision.tokens_scanned, 0);
    }

    #[tokio::test]
    async fn test_concurrent_scan_keeps_order() {
        let (store, clock) = setup();
        for i in 0..20 {
            let id = store.mint(bob(), false);
            if i == 7 || i == 13 {
                store.set_delegate(id, Some(alice()), NOW + 5);
            }
        }
        store.set_valid(15, true);
        store.fail_reads(3);

        let r = resolver(&store, &clock).with_concurrency(8);
        let decision = r.check_access(&alice()).await.unwrap();
        assert_eq!(decision.token_id, Some(7));
        assert_eq!(decision.reason, Some(AccessReason::ActiveDelegate));
    }
}
