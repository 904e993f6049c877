//! Monetary amounts as fixed-point integers.
//!
//! Every amount in storage and in ledger arithmetic is an [`i64`] count of
//! minor currency units (cents).  The single conversion to major units
//! happens at the response / notification boundary via [`to_major`].

/// Minor units per major currency unit.
pub const MINOR_PER_MAJOR: i64 = 100;

/// Convert a minor-unit amount to major units for display.
pub fn to_major(amount: i64) -> f64 {
    amount as f64 / MINOR_PER_MAJOR as f64
}
