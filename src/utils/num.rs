//! Numeric utilities: safe and centralized integer conversions.
//!
//! Prefer saturating conversions when clamping is safer than panicking or truncating, such as
//! converting a time span to u64 for metrics and logging.

#[inline]
#[must_use]
pub fn usize_to_u64(v: usize) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

#[inline]
#[must_use]
pub fn u128_to_u64_saturating(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}
