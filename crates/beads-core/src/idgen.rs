//! SHA256 + base36 ID generation.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

/// How many nonces to try at one length before growing the hash.
const NONCES_PER_LENGTH: i32 = 10;

/// Encodes `data` as a base36 string of exactly `length` characters.
///
/// Short values are left-padded with zeros; long values keep their least
/// significant digits.
pub fn encode_base36(data: &[u8], length: usize) -> String {
    let digits = BigUint::from_bytes_be(data).to_str_radix(36);
    if digits.len() >= length {
        digits[digits.len() - length..].to_owned()
    } else {
        format!("{}{}", "0".repeat(length - digits.len()), digits)
    }
}

/// Creates a hash-based ID for an issue.
///
/// The `length` parameter is expected to be 3-8; other values fall back to
/// a 3-byte width.
pub fn generate_hash_id(
    prefix: &str,
    title: &str,
    description: &str,
    creator: &str,
    timestamp: DateTime<Utc>,
    length: usize,
    nonce: i32,
) -> String {
    let content = format!(
        "{}|{}|{}|{}|{}",
        title,
        description,
        creator,
        timestamp.timestamp_nanos_opt().unwrap_or(0),
        nonce
    );

    let hash = Sha256::digest(content.as_bytes());

    let num_bytes = match length {
        3 => 2,
        4 => 3,
        5 | 6 => 4,
        7 | 8 => 5,
        _ => 3,
    };

    format!("{}-{}", prefix, encode_base36(&hash[..num_bytes], length))
}

/// P(collision) ~ 1 - e^(-n^2 / 2N) for `n` items over `36^length` values.
fn collision_probability(num_issues: usize, id_length: usize) -> f64 {
    let total: f64 = 36.0_f64.powi(id_length as i32);
    let exponent = -(num_issues as f64).powi(2) / (2.0 * total);
    1.0 - exponent.exp()
}

/// Determines the shortest ID length keeping collisions under the threshold.
pub fn compute_adaptive_length(
    num_issues: usize,
    min_length: usize,
    max_length: usize,
    max_collision_prob: f64,
) -> usize {
    (min_length..=max_length)
        .find(|&len| collision_probability(num_issues, len) <= max_collision_prob)
        .unwrap_or(max_length)
}

/// Default adaptive ID configuration constants.
pub mod adaptive_defaults {
    /// Default collision probability threshold (25%).
    pub const MAX_COLLISION_PROB: f64 = 0.25;
    pub const MIN_LENGTH: usize = 3;
    pub const MAX_LENGTH: usize = 8;
}

/// Generates unique IDs against a set of IDs already taken.
///
/// Each candidate is tried with nonces `0..10`; if all collide the hash grows
/// by one character, up to [`adaptive_defaults::MAX_LENGTH`].
#[derive(Debug, Clone)]
pub struct IdGenerator {
    prefix: String,
    length: usize,
    taken: HashSet<String>,
}

impl IdGenerator {
    /// `existing` is the number of items already stored, used to size the hash.
    pub fn new(prefix: impl Into<String>, existing: usize) -> Self {
        Self {
            prefix: prefix.into(),
            length: compute_adaptive_length(
                existing,
                adaptive_defaults::MIN_LENGTH,
                adaptive_defaults::MAX_LENGTH,
                adaptive_defaults::MAX_COLLISION_PROB,
            ),
            taken: HashSet::new(),
        }
    }

    /// Marks IDs that must not be produced.
    pub fn reserve<I: IntoIterator<Item = String>>(&mut self, ids: I) {
        self.taken.extend(ids);
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns a fresh ID, or `None` if every candidate up to the maximum
    /// length collided.
    pub fn next_id(
        &mut self,
        title: &str,
        description: &str,
        creator: &str,
        timestamp: DateTime<Utc>,
    ) -> Option<String> {
        for length in self.length..=adaptive_defaults::MAX_LENGTH {
            for nonce in 0..NONCES_PER_LENGTH {
                let id = generate_hash_id(
                    &self.prefix,
                    title,
                    description,
                    creator,
                    timestamp,
                    length,
                    nonce,
                );
                if self.taken.insert(id.clone()) {
                    return Some(id);
                }
            }
        }
        None
    }
}
