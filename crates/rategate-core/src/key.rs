//! Request tuple and cache key derivation

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One (period, hotel, room) pricing request tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuery {
    pub period: String,
    pub hotel: String,
    pub room: String,
}

/// Prefix of fresh cache entry keys
pub const FRESH_KEY_PREFIX: &str = "pricing:";

/// Derive the cache key for a request tuple
///
/// The tuple is encoded as a JSON object with sorted keys, hashed with
/// SHA-256 and hex-encoded. The encoding is canonical, so equal tuples always
/// map to the same key regardless of which process derives it.
pub fn cache_key(query: &RateQuery) -> String {
    // serde_json object keys are ordered, which makes the encoding canonical
    let canonical = serde_json::json!({
        "hotel": query.hotel,
        "period": query.period,
        "room": query.room,
    });
    let digest = Sha256::digest(canonical.to_string().as_bytes());
    format!("{}{}", FRESH_KEY_PREFIX, hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(period: &str, hotel: &str, room: &str) -> RateQuery {
        RateQuery {
            period: period.to_string(),
            hotel: hotel.to_string(),
            room: room.to_string(),
        }
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = cache_key(&query("Summer", "FloatingPointResort", "SingletonRoom"));
        let b = cache_key(&query("Summer", "FloatingPointResort", "SingletonRoom"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_key_distinguishes_tuples() {
        let a = cache_key(&query("Summer", "FloatingPointResort", "SingletonRoom"));
        let b = cache_key(&query("Winter", "FloatingPointResort", "SingletonRoom"));
        let c = cache_key(&query("Summer", "FloatingPointResort", "DoubleRoom"));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_cache_key_shape() {
        let key = cache_key(&query("Summer", "FloatingPointResort", "SingletonRoom"));
        assert!(key.starts_with(FRESH_KEY_PREFIX));
        // SHA-256 digest, hex encoded
        assert_eq!(key.len(), FRESH_KEY_PREFIX.len() + 64);
    }
}
