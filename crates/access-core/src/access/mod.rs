//! ============================================================================
//! Access Module - Subscription-token gated access
//! ============================================================================
//! An account may enter when it owns a token whose subscription is valid,
//! or is the unexpired renter (ERC-4907 user) of any token.
//!
//! ## Usage
//! ```rust,ignore
//! use access_core::access::AccessResolver;
//!
//! let resolver = AccessResolver::new(reader, Arc::new(SystemClock));
//! let decision = resolver.check_access(&account).await?;
//! ```
//! ============================================================================

mod eligibility;
mod resolver;

pub use eligibility::{free_for_delegation, DelegationFilter};
pub use resolver::AccessResolver;
