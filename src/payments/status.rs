//! Provider status vocabularies
//!
//! Each provider reports outcomes in its own words. A [`StatusTable`] folds that
//! vocabulary into [`PaymentStatus`]: lookups are case-insensitive and anything
//! not listed is still in flight.

use crate::payments::types::PaymentStatus;

const BASE_SUCCESS: &[&str] = &["success", "completed"];
const BASE_FAILED: &[&str] = &["failed", "rejected", "declined", "cancelled", "error"];

#[derive(Debug, Clone, Copy)]
pub struct StatusTable {
    success: &'static [&'static str],
    failed: &'static [&'static str],
}

impl StatusTable {
    /// Shared vocabulary extended with provider-specific terms
    pub const fn with_extras(
        success: &'static [&'static str],
        failed: &'static [&'static str],
    ) -> Self {
        Self { success, failed }
    }

    pub fn map(&self, raw: &str) -> PaymentStatus {
        let needle = raw.trim().to_lowercase();
        let hit = |words: &[&str]| words.iter().any(|w| *w == needle);

        if hit(BASE_SUCCESS) || hit(self.success) {
            PaymentStatus::Success
        } else if hit(BASE_FAILED) || hit(self.failed) {
            PaymentStatus::Failed
        } else {
            PaymentStatus::Pending
        }
    }
}

pub const BASE: StatusTable = StatusTable::with_extras(&[], &[]);

/// Airtel Money transaction codes: TS succeeded, TF failed, TIP/TA still open
pub const AIRTEL: StatusTable = StatusTable::with_extras(&["ts"], &["tf", "expired"]);

/// DPO verify results: 000 paid, 901 declined, 904 cancelled
pub const DPO: StatusTable =
    StatusTable::with_extras(&["paid", "approved", "000"], &["901", "904", "not paid"]);

pub const PESAPAL: StatusTable = StatusTable::with_extras(&[], &["reversed", "invalid"]);

pub const MPESA: StatusTable = StatusTable::with_extras(&[], &[]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_mapping_is_case_insensitive() {
        assert_eq!(BASE.map("COMPLETED"), PaymentStatus::Success);
        assert_eq!(BASE.map("completed"), PaymentStatus::Success);
        assert_eq!(BASE.map("Success"), PaymentStatus::Success);
        assert_eq!(BASE.map("Declined"), PaymentStatus::Failed);
        assert_eq!(BASE.map("cancelled"), PaymentStatus::Failed);
        assert_eq!(BASE.map("ERROR"), PaymentStatus::Failed);
        assert_eq!(BASE.map("Rejected"), PaymentStatus::Failed);
    }

    #[test]
    fn test_unrecognized_is_pending() {
        assert_eq!(BASE.map("awaiting_otp"), PaymentStatus::Pending);
        assert_eq!(BASE.map(""), PaymentStatus::Pending);
        assert_eq!(BASE.map("pending"), PaymentStatus::Pending);
    }

    #[test]
    fn test_every_provider_keeps_base_vocabulary() {
        for table in [AIRTEL, DPO, PESAPAL, MPESA] {
            assert_eq!(table.map("Completed"), PaymentStatus::Success);
            assert_eq!(table.map("declined"), PaymentStatus::Failed);
            assert_eq!(table.map("awaiting_otp"), PaymentStatus::Pending);
        }
    }

    #[test]
    fn test_provider_extras() {
        assert_eq!(AIRTEL.map("TS"), PaymentStatus::Success);
        assert_eq!(AIRTEL.map("TF"), PaymentStatus::Failed);
        assert_eq!(AIRTEL.map("TIP"), PaymentStatus::Pending);

        assert_eq!(DPO.map("000"), PaymentStatus::Success);
        assert_eq!(DPO.map("Paid"), PaymentStatus::Success);
        assert_eq!(DPO.map("904"), PaymentStatus::Failed);
        assert_eq!(DPO.map("900"), PaymentStatus::Pending);

        assert_eq!(PESAPAL.map("Reversed"), PaymentStatus::Failed);
        assert_eq!(PESAPAL.map("INVALID"), PaymentStatus::Failed);

        // extras do not leak between providers
        assert_eq!(BASE.map("TS"), PaymentStatus::Pending);
        assert_eq!(PESAPAL.map("paid"), PaymentStatus::Pending);
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        assert_eq!(BASE.map("  Success \n"), PaymentStatus::Success);
    }
}
