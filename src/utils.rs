//! Decimal helpers shared by the engine and the reporters

use rust_decimal::Decimal;
use serde::Serializer;

/// Round a derived figure to cents / hundredths
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp(2)
}

/// `part / whole` as a percentage with one decimal, `None` for an empty whole
pub fn share_pct(part: usize, whole: usize) -> Option<Decimal> {
    if whole == 0 {
        return None;
    }
    Some((Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(whole)).round_dp(1))
}

/// Zero means "level not set": render as `null`, otherwise as a JSON number
pub fn serialize_nonzero<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_zero() {
        serializer.serialize_none()
    } else {
        rust_decimal::serde::float::serialize(value, serializer)
    }
}
