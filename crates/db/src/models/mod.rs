pub mod clip;
pub mod detection;
pub mod session;

/// Counters are stored as `BIGINT`; clamp on the way in.
pub(crate) fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Counters never go negative; clamp on the way out.
pub(crate) fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
