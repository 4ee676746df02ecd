//! Snowflake id decoding and the upscale eligibility window.
//!
//! Backend message ids are 64-bit snowflakes whose high bits (above bit 22)
//! hold milliseconds since the platform epoch. The creation time decoded
//! from a message id gates whether derived operations may still be
//! requested against it.

use chrono::Duration;
use rand::Rng;

use crate::error::CoreError;
use crate::types::Timestamp;

/// Platform epoch (2015-01-01T00:00:00Z) in Unix milliseconds.
pub const EPOCH_MS: i64 = 1_420_070_400_000;

/// Number of low bits that carry worker/process/sequence data.
const TIMESTAMP_SHIFT: u32 = 22;

/// Mask for the non-timestamp low bits.
const LOW_BITS_MASK: u64 = (1 << TIMESTAMP_SHIFT) - 1;

/// How long after creation a message still accepts component interactions.
pub const UPSCALE_WINDOW_SECS: i64 = 15 * 60;

/// Parse a decimal snowflake string.
pub fn parse(id: &str) -> Result<u64, CoreError> {
    id.trim()
        .parse::<u64>()
        .map_err(|_| CoreError::Validation(format!("'{id}' is not a valid snowflake id")))
}

/// Decode the creation timestamp embedded in a snowflake id.
pub fn decode_timestamp(id: &str) -> Result<Timestamp, CoreError> {
    let raw = parse(id)?;
    let millis = (raw >> TIMESTAMP_SHIFT) as i64 + EPOCH_MS;
    chrono::DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| CoreError::Validation(format!("Snowflake '{id}' decodes out of range")))
}

/// Build the smallest snowflake id created at `ts`.
pub fn from_timestamp(ts: Timestamp) -> String {
    let millis = (ts.timestamp_millis() - EPOCH_MS).max(0) as u64;
    (millis << TIMESTAMP_SHIFT).to_string()
}

/// Mint a fresh interaction nonce for the current instant.
pub fn nonce(now: Timestamp) -> String {
    let millis = (now.timestamp_millis() - EPOCH_MS).max(0) as u64;
    let low: u64 = rand::rng().random_range(0..=LOW_BITS_MASK);
    ((millis << TIMESTAMP_SHIFT) | low).to_string()
}

/// Age of the message identified by `id` relative to `now`.
pub fn message_age(id: &str, now: Timestamp) -> Result<Duration, CoreError> {
    Ok(now - decode_timestamp(id)?)
}

/// Reject ids whose message is older than the upscale window.
///
/// Performs no I/O; callers must invoke it before any network call.
pub fn check_upscale_eligibility(id: &str, now: Timestamp) -> Result<(), CoreError> {
    let age = message_age(id, now)?;
    if age > Duration::seconds(UPSCALE_WINDOW_SECS) {
        return Err(CoreError::EligibilityExpired {
            age_secs: age.num_seconds(),
        });
    }
    Ok(())
}

/// Whether snowflake `candidate` was created strictly after `reference`.
///
/// Unparseable ids are never considered newer.
pub fn is_newer(candidate: &str, reference: &str) -> bool {
    match (parse(candidate), parse(reference)) {
        (Ok(c), Ok(r)) => c > r,
        _ => false,
    }
}
