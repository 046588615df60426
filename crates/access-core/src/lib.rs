//! ============================================================================
//! ACCESS-CORE: Subscription NFT access resolution & rentals
//! ============================================================================
//! Decides whether an account may use a gated resource, based on tokens of a
//! subscription contract (ERC-721 + ERC-4907 rentals):
//! - Token State Reader: timed per-field reads from the contract
//! - Access Resolver: ascending scan, owner-valid or active-delegate
//! - Delegation Filter: an owner's tokens with no active renter
//! - Rental Manager: validated, confirmed `setUser` assignments
//! ============================================================================

pub mod access;
pub mod clock;
pub mod config;
pub mod reader;
pub mod rental;
pub mod session;
pub mod store;
pub mod types;
pub mod wallet;

// Re-export main types for convenience
pub use access::{AccessResolver, DelegationFilter};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::AccessConfig;
pub use reader::TokenStateReader;
pub use rental::RentalManager;
pub use session::AccessSession;
pub use store::{EvmRpcStore, InMemoryStore, TokenStore};
pub use types::*;
pub use wallet::{AccountConnector, ConnectMode, StaticAccount};
