//! ============================================================================
//! Rental Manager - Validated delegation of an owned token
//! ============================================================================
//! Checks the renter address, the duration and the token's eligibility
//! locally, submits one `setUser` assignment, and waits for it to commit.
//! Nothing is retried; a failed call leaves resubmission to the caller.
//! ============================================================================

use tracing::{info, warn};

use super::confirm::{await_confirmation, ConfirmConfig};
use crate::access::DelegationFilter;
use crate::store::StoreError;
use crate::types::{AccessError, Account, AssignmentReceipt, TokenId};

/// Rents out tokens owned by one account
pub struct RentalManager {
    filter: DelegationFilter,
    owner: Account,
    confirm: ConfirmConfig,
}

impl RentalManager {
    pub fn new(filter: DelegationFilter, owner: Account) -> Self {
        Self::with_confirm_config(filter, owner, ConfirmConfig::default())
    }

    pub fn with_confirm_config(filter: DelegationFilter, owner: Account, confirm: ConfirmConfig) -> Self {
        Self {
            filter,
            owner,
            confirm,
        }
    }

    pub fn owner(&self) -> &Account {
        &self.owner
    }

    /// Tokens the owner can rent out right now
    pub async fn rentable_tokens(&self) -> Result<Vec<TokenId>, AccessError> {
        self.filter.rentable_tokens(&self.owner).await
    }

    /// Delegate `token_id` to `delegate` for `duration_secs` from now.
    ///
    /// Returns only once the store reports the assignment committed.
    pub async fn assign_delegate(
        &self,
        token_id: TokenId,
        delegate: &str,
        duration_secs: u64,
    ) -> Result<AssignmentReceipt, AccessError> {
        let delegate = Account::parse_address(delegate)?;
        if duration_secs == 0 {
            return Err(AccessError::InvalidDuration(duration_secs));
        }

        let reader = self.filter.reader();
        let total = reader.read_total_issued().await?;
        let now = self.filter.clock().now();

        let eligible = self
            .filter
            .eligible_for_delegation(&self.owner, total, now)
            .await;
        if !eligible.contains(&token_id) {
            warn!(
                "Token #{} not eligible for delegation by {} (eligible: {:?})",
                token_id, self.owner, eligible
            );
            return Err(AccessError::TokenNotEligible(token_id));
        }

        let expires_at = i64::try_from(duration_secs)
            .ok()
            .and_then(|d| now.checked_add(d))
            .ok_or(AccessError::InvalidDuration(duration_secs))?;

        info!(
            "Renting token #{} to {} until {} ({}s)",
            token_id, delegate, expires_at, duration_secs
        );

        let submission = reader
            .timed(
                "setUser",
                reader
                    .store()
                    .submit_assignment(&self.owner, token_id, &delegate, expires_at),
            )
            .await
            .map_err(submit_error)?;

        await_confirmation(reader, &submission, &self.confirm).await?;

        info!("Token #{} rented to {} until {}", token_id, delegate, expires_at);

        Ok(AssignmentReceipt {
            token_id,
            delegate,
            expires_at,
            submission_id: submission.0,
        })
    }
}

fn submit_error(e: StoreError) -> AccessError {
    match e {
        StoreError::Rejected(reason) => AccessError::AssignmentRejected(reason),
        StoreError::NotMinted(id) => {
            AccessError::AssignmentRejected(format!("token #{} does not exist", id))
        }
        StoreError::Unavailable(msg) => AccessError::StoreUnavailable(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::reader::TokenStateReader;
    use crate::store::InMemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000;
    const CAROL: &str = "0xCcCcCcCcCcCcCcCcCcCcCcCcCcCcCcCcCcCcCcCc";

    fn alice() -> Account {
        Account::new("0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")
    }

    fn bob() -> Account {
        Account::new("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: Arc<FixedClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(FixedClock::new(NOW));
            let store = Arc::new(InMemoryStore::new(clock.clone()).with_confirm_after_polls(1));
            Self { store, clock }
        }

        fn manager(&self, owner: Account) -> RentalManager {
            let filter = DelegationFilter::new(
                TokenStateReader::new(self.store.clone()),
                self.clock.clone(),
            );
            RentalManager::with_confirm_config(
                filter,
                owner,
                ConfirmConfig {
                    max_polls: 5,
                    poll_interval: Duration::from_millis(100),
                },
            )
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rent_then_not_eligible_until_expiry() {
        let fx = Fixture::new();
        fx.store.mint(alice(), true);
        let manager = fx.manager(alice());

        assert_eq!(manager.rentable_tokens().await.unwrap(), vec![0]);

        let receipt = manager.assign_delegate(0, CAROL, 3600).await.unwrap();
        assert_eq!(receipt.token_id, 0);
        assert_eq!(receipt.delegate, Account::new(CAROL));
        assert_eq!(receipt.expires_at, NOW + 3600);

        let token = fx.store.snapshot(0).unwrap();
        assert_eq!(token.delegate, Some(Account::new(CAROL)));
        assert_eq!(token.delegate_expires_at, NOW + 3600);

        assert!(manager.rentable_tokens().await.unwrap().is_empty());
        fx.clock.advance(3599);
        assert!(manager.rentable_tokens().await.unwrap().is_empty());
        fx.clock.advance(1);
        assert_eq!(manager.rentable_tokens().await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_active_delegate_not_eligible_without_submission() {
        let fx = Fixture::new();
        let id = fx.store.mint(alice(), true);
        fx.store.set_delegate(id, Some(bob()), NOW + 1);

        let err = fx.manager(alice()).assign_delegate(id, CAROL, 60).await.unwrap_err();
        assert_eq!(err, AccessError::TokenNotEligible(id));
        assert_eq!(fx.store.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_foreign_token_not_eligible() {
        let fx = Fixture::new();
        let id = fx.store.mint(bob(), true);
        let err = fx.manager(alice()).assign_delegate(id, CAROL, 60).await.unwrap_err();
        assert_eq!(err, AccessError::TokenNotEligible(id));

        let err = fx.manager(alice()).assign_delegate(42, CAROL, 60).await.unwrap_err();
        assert_eq!(err, AccessError::TokenNotEligible(42));
        assert_eq!(fx.store.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_address_checked_first() {
        let fx = Fixture::new();
        fx.store.mint(alice(), true);
        let manager = fx.manager(alice());

        for bad in ["carol", "0x1234", "", "0xZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZ"] {
            let err = manager.assign_delegate(0, bad, 60).await.unwrap_err();
            assert_eq!(err, AccessError::InvalidDelegateAddress(bad.to_string()));
        }
        assert_eq!(fx.store.read_count(), 0);
        assert_eq!(fx.store.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_duration() {
        let fx = Fixture::new();
        fx.store.mint(alice(), true);
        let err = fx.manager(alice()).assign_delegate(0, CAROL, 0).await.unwrap_err();
        assert_eq!(err, AccessError::InvalidDuration(0));
        assert_eq!(fx.store.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_overflowing_duration() {
        let fx = Fixture::new();
        fx.store.mint(alice(), true);
        let err = fx
            .manager(alice())
            .assign_delegate(0, CAROL, u64::MAX)
            .await
            .unwrap_err();
        assert_eq!(err, AccessError::InvalidDuration(u64::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_rejection_surfaces() {
        let fx = Fixture::new();
        fx.store.mint(alice(), true);
        fx.store.reject_next_submission("ERC4907: transfer caller is not owner nor approved");

        let err = fx.manager(alice()).assign_delegate(0, CAROL, 60).await.unwrap_err();
        assert!(matches!(err, AccessError::AssignmentRejected(_)));
        assert_eq!(fx.store.snapshot(0).unwrap().delegate, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_is_failure() {
        let clock = Arc::new(FixedClock::new(NOW));
        let store = Arc::new(InMemoryStore::new(clock.clone()).with_confirm_after_polls(100));
        store.mint(alice(), true);
        let filter = DelegationFilter::new(TokenStateReader::new(store.clone()), clock);
        let manager = RentalManager::with_confirm_config(
            filter,
            alice(),
            ConfirmConfig {
                max_polls: 3,
                poll_interval: Duration::from_millis(100),
            },
        );

        let err = manager.assign_delegate(0, CAROL, 60).await.unwrap_err();
        assert!(matches!(err, AccessError::StoreUnavailable(_)));
        assert_eq!(store.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_store_down_before_submission() {
        let fx = Fixture::new();
        fx.store.mint(alice(), true);
        fx.store.set_unavailable(true);
        let err = fx.manager(alice()).assign_delegate(0, CAROL, 60).await.unwrap_err();
        assert!(matches!(err, AccessError::StoreUnavailable(_)));
        assert_eq!(fx.store.submission_count(), 0);
    }
}
