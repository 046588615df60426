//! ============================================================================
//! Core Types for Subpass
//! ============================================================================
//! Accounts, token state, access decisions and rental receipts.
//! Decisions and receipts are serialized to JSON for the CLI.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Token identifier, valid in `[0, total_issued)`
pub type TokenId = u64;

/// Length of a hex account address without the `0x` prefix
pub const ADDRESS_HEX_LEN: usize = 40;

/// The all-zero address the contract reports for "no delegate"
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Account identifier.
///
/// Identifiers are hex and may come back from the node in checksummed
/// (mixed) case, so equality and hashing ignore ASCII case. The original
/// spelling is kept for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account(String);

impl Account {
    /// Wrap an opaque identifier without format checks
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a `0x` + 40 hex digit address
    pub fn parse_address(s: &str) -> Result<Self, AccessError> {
        let trimmed = s.trim();
        if is_address(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(AccessError::InvalidDelegateAddress(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form, used for hashing and wire encoding
    pub fn to_lowercase(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// True for the zero address sentinel
    pub fn is_zero(&self) -> bool {
        self.0.eq_ignore_ascii_case(ZERO_ADDRESS)
    }
}

/// Check the fixed `0x` prefix and 40 hex digits
pub fn is_address(s: &str) -> bool {
    match s.strip_prefix("0x") {
        Some(hex) => hex.len() == ADDRESS_HEX_LEN && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Account {}

impl Hash for Account {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
        // Same terminator `str` hashing writes
        state.write_u8(0xff);
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of one token as read from the store.
/// Never cached: each read is a fresh set of remote calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    pub id: TokenId,
    pub owner: Account,
    /// Store's own "subscription not expired" flag
    pub is_valid: bool,
    /// Current delegate, `None` for the zero address
    pub delegate: Option<Account>,
    /// Delegate expiry (epoch seconds)
    pub delegate_expires_at: i64,
}

impl TokenState {
    /// A delegate is active only while `expires_at > now`
    pub fn has_active_delegate(&self, now: i64) -> bool {
        self.delegate.is_some() && self.delegate_expires_at > now
    }

    /// Owner with a valid subscription, or active delegate
    pub fn authorizes(&self, account: &Account, now: i64) -> Option<AccessReason> {
        if self.owner == *account && self.is_valid {
            return Some(AccessReason::OwnerValid);
        }
        match &self.delegate {
            Some(d) if d == account && self.delegate_expires_at > now => {
                Some(AccessReason::ActiveDelegate)
            }
            _ => None,
        }
    }
}

/// Why access was granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessReason {
    OwnerValid,
    ActiveDelegate,
}

impl AccessReason {
    pub fn display_name(&self) -> &'static str {
        match self {
            AccessReason::OwnerValid => "owner-valid",
            AccessReason::ActiveDelegate => "active-delegate",
        }
    }
}

/// Outcome of one access resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub authorized: bool,
    /// Lowest token ID granting access
    pub token_id: Option<TokenId>,
    pub reason: Option<AccessReason>,
    /// The `now` held fixed for the whole scan
    pub checked_at: i64,
    pub tokens_scanned: u64,
    /// Tokens that could not be read and were treated as non-authorizing
    pub tokens_skipped: u64,
}

impl AccessDecision {
    pub fn authorized(token_id: TokenId, reason: AccessReason, checked_at: i64) -> Self {
        Self {
            authorized: true,
            token_id: Some(token_id),
            reason: Some(reason),
            checked_at,
            tokens_scanned: 0,
            tokens_skipped: 0,
        }
    }

    pub fn unauthorized(checked_at: i64) -> Self {
        Self {
            authorized: false,
            token_id: None,
            reason: None,
            checked_at,
            tokens_scanned: 0,
            tokens_skipped: 0,
        }
    }
}

/// Confirmed delegation, returned only after the store commits it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentReceipt {
    pub token_id: TokenId,
    pub delegate: Account,
    pub expires_at: i64,
    /// Store-side handle of the submission (transaction hash for RPC)
    pub submission_id: String,
}

/// Errors surfaced by reads, resolution and rental assignment
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("Token store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid token ID: {0}")]
    InvalidTokenId(TokenId),

    #[error("Invalid delegate address: {0}")]
    InvalidDelegateAddress(String),

    #[error("Token #{0} is not eligible for delegation")]
    TokenNotEligible(TokenId),

    #[error("Rental duration must be positive, got {0}s")]
    InvalidDuration(u64),

    #[error("Assignment rejected: {0}")]
    AssignmentRejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const ALICE_UPPER: &str = "0xABCDEF0123456789ABCDEF0123456789ABCDEF01";
    const ALICE_LOWER: &str = "0xabcdef0123456789abcdef0123456789abcdef01";

    #[test]
    fn test_account_case_insensitive() {
        let a = Account::new(ALICE_UPPER);
        let b = Account::new(ALICE_LOWER);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_account_hash_separates_pairs() {
        use std::collections::hash_map::DefaultHasher;

        fn hash_of(pair: (Account, Account)) -> u64 {
            let mut h = DefaultHasher::new();
            pair.hash(&mut h);
            h.finish()
        }

        let joined_left = hash_of((Account::new("0xab"), Account::new("c")));
        let joined_right = hash_of((Account::new("0xa"), Account::new("bc")));
        assert_ne!(joined_left, joined_right);
        assert_eq!(
            joined_left,
            hash_of((Account::new("0xAB"), Account::new("C")))
        );
    }

    #[test]
    fn test_account_keeps_spelling() {
        let a = Account::new(ALICE_UPPER);
        assert_eq!(a.to_string(), ALICE_UPPER);
        assert_eq!(a.to_lowercase(), ALICE_LOWER);
    }

    #[test]
    fn test_parse_address() {
        assert!(Account::parse_address(ALICE_LOWER).is_ok());
        assert!(Account::parse_address(ALICE_UPPER).is_ok());

        let bad = [
            "",
            "0x",
            "abcdef0123456789abcdef0123456789abcdef01",
            "0xabcdef0123456789abcdef0123456789abcdef0",
            "0xabcdef0123456789abcdef0123456789abcdef012",
            "0xabcdef0123456789abcdef0123456789abcdefzz",
            "0Xabcdef0123456789abcdef0123456789abcdef01",
        ];
        for s in bad {
            assert_eq!(
                Account::parse_address(s),
                Err(AccessError::InvalidDelegateAddress(s.to_string())),
                "Expected rejection for: {:?}",
                s
            );
        }
    }

    #[test]
    fn test_zero_address() {
        assert!(Account::new(ZERO_ADDRESS).is_zero());
        assert!(!Account::new(ALICE_LOWER).is_zero());
    }

    fn token(owner: &str, valid: bool, delegate: Option<&str>, expires: i64) -> TokenState {
        TokenState {
            id: 0,
            owner: Account::new(owner),
            is_valid: valid,
            delegate: delegate.map(Account::new),
            delegate_expires_at: expires,
        }
    }

    #[test]
    fn test_expiry_boundary_is_strict() {
        let now = 1_000;
        let t = token(ZERO_ADDRESS, false, Some(ALICE_LOWER), now);
        assert!(!t.has_active_delegate(now));
        assert_eq!(t.authorizes(&Account::new(ALICE_LOWER), now), None);

        let t = token(ZERO_ADDRESS, false, Some(ALICE_LOWER), now + 1);
        assert!(t.has_active_delegate(now));
        assert_eq!(
            t.authorizes(&Account::new(ALICE_UPPER), now),
            Some(AccessReason::ActiveDelegate)
        );
    }

    #[test]
    fn test_owner_and_delegate_independent() {
        let now = 1_000;
        let alice = Account::new(ALICE_LOWER);
        let bob = "0x00000000000000000000000000000000000000b0";

        // Expired owner subscription does not affect an active delegate
        let t = token(bob, false, Some(ALICE_UPPER), now + 10);
        assert_eq!(t.authorizes(&alice, now), Some(AccessReason::ActiveDelegate));
        assert_eq!(t.authorizes(&Account::new(bob), now), None);

        // Valid owner is authorized even with an active renter
        assert_eq!(
            token(bob, true, Some(ALICE_LOWER), now + 10).authorizes(&Account::new(bob), now),
            Some(AccessReason::OwnerValid)
        );
    }

    #[test]
    fn test_reason_serializes_kebab_case() {
        let json = serde_json::to_string(&AccessReason::OwnerValid).unwrap();
        assert_eq!(json, "\"owner-valid\"");
        assert_eq!(AccessReason::ActiveDelegate.display_name(), "active-delegate");
    }
}
