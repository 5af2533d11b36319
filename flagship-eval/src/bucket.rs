//! Percentage Rollout Bucketing
//!
//! Maps a context onto a stable point in `[0, 1)` for a given flag. The digest
//! algorithm decides which users land in which bucket for every existing
//! flag, so it must never change.

use crate::context::EvaluationContext;
use sha1::{Digest, Sha1};

/// Number of leading hex digits of the digest used as the bucket value.
const BUCKET_HEX_DIGITS: usize = 15;

/// Largest value representable in [`BUCKET_HEX_DIGITS`] hex digits.
const BUCKET_SCALE: f64 = 0xFFF_FFFF_FFFF_FFFF_u64 as f64;

/// Fixed-width digest of `input`.
pub fn digest(input: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(input);

    let mut out = [0u8; 20];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Compute the rollout bucket for `context` on flag `flag_key`.
///
/// The hashed input is `"{flag_key}.{salt}.{id}"` where `id` is the context
/// key, or `"{key}.{secondary}"` when a secondary key is set.
///
/// # Examples
///
/// ```
/// use flagship_eval::{bucket, EvaluationContext};
///
/// let context = EvaluationContext::new("anyUser");
/// let first = bucket(&context, "engine.enable", "ZW5naW5lLmVuYWJsZQ==");
/// let second = bucket(&context, "engine.enable", "ZW5naW5lLmVuYWJsZQ==");
///
/// assert!((0.0..1.0).contains(&first));
/// assert_eq!(first, second);
/// ```
pub fn bucket(context: &EvaluationContext, flag_key: &str, salt: &str) -> f64 {
    let input = format!("{}.{}.{}", flag_key, salt, context.bucketing_id());
    let encoded = hex::encode(digest(input.as_bytes()));

    // Hex output only contains [0-9a-f], so the parse cannot fail.
    let value = u64::from_str_radix(&encoded[..BUCKET_HEX_DIGITS], 16).unwrap_or_default();
    let point = value as f64 / BUCKET_SCALE;

    // The u64 -> f64 conversion rounds; keep the all-F digest inside [0, 1).
    point.min(1.0 - f64::EPSILON)
}
