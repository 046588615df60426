//! ============================================================================
//! Rental Module - Delegating owned subscription tokens
//! ============================================================================
//! - `RentalManager`: validate, submit and confirm a delegation
//! - `await_confirmation`: receipt polling shared by submitters
//! ============================================================================

mod confirm;
mod manager;

pub use confirm::{await_confirmation, ConfirmConfig};
pub use manager::RentalManager;

/// Rental lengths offered to owners, in hours
pub const RENTAL_HOUR_PRESETS: [u64; 4] = [5, 10, 24, 48];

/// Hours to seconds, saturating
pub fn hours_to_secs(hours: u64) -> u64 {
    hours.saturating_mul(3600)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hours_to_secs() {
        assert_eq!(hours_to_secs(5), 18_000);
        assert_eq!(hours_to_secs(48), 172_800);
        assert_eq!(hours_to_secs(u64::MAX), u64::MAX);
    }
}
