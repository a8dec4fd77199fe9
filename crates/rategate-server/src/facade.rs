//! Pricing facade over the coalescing cache

use std::sync::Arc;

use serde_json::Value;

use rategate::{CoalescingCache, KvStore, RateError, RateQuery, Result, cache_key};

use crate::upstream::OracleClient;

/// Long-lived service object handed to every request handler
///
/// Owns the cache and the upstream client; one instance serves the whole
/// process.
pub struct PricingFacade<S> {
    cache: CoalescingCache<S>,
    oracle: Arc<OracleClient>,
}

impl<S: KvStore> PricingFacade<S> {
    pub fn new(cache: CoalescingCache<S>, oracle: OracleClient) -> Self {
        Self {
            cache,
            oracle: Arc::new(oracle),
        }
    }

    /// Resolve the rate for one request tuple, rendered as a decimal string
    pub async fn rate_for(&self, query: &RateQuery) -> Result<String> {
        let key = cache_key(query);
        let oracle = self.oracle.clone();
        let tuple = query.clone();
        let body = self
            .cache
            .fetch(&key, move || async move { oracle.fetch_rates(&tuple).await })
            .await?;
        extract_rate(&body, query)
    }
}

/// Pull the rate for `query` out of an upstream response body
///
/// Prefers the entry matching the exact tuple and falls back to the first
/// one. Fresh, follower-delivered and stale payloads all pass through here,
/// so the response shape never depends on which path produced the body.
pub fn extract_rate(body: &Value, query: &RateQuery) -> Result<String> {
    let rates = body
        .get("rates")
        .and_then(Value::as_array)
        .ok_or_else(|| RateError::Internal("upstream body missing rates".into()))?;

    let matched = rates
        .iter()
        .find(|rate| {
            rate.get("period").and_then(Value::as_str) == Some(query.period.as_str())
                && rate.get("hotel").and_then(Value::as_str) == Some(query.hotel.as_str())
                && rate.get("room").and_then(Value::as_str) == Some(query.room.as_str())
        })
        .or_else(|| rates.first())
        .ok_or_else(|| RateError::Internal("upstream body has no rates".into()))?;

    match matched.get("rate") {
        Some(Value::Number(rate)) => Ok(rate.to_string()),
        Some(Value::String(rate)) => Ok(rate.clone()),
        _ => Err(RateError::Internal("rate missing from upstream entry".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(period: &str, hotel: &str, room: &str) -> RateQuery {
        RateQuery {
            period: period.to_string(),
            hotel: hotel.to_string(),
            room: room.to_string(),
        }
    }

    #[test]
    fn test_extracts_matching_tuple() {
        let body = json!({
            "rates": [
                {"period": "Winter", "hotel": "H", "room": "R", "rate": 10000},
                {"period": "Summer", "hotel": "H", "room": "R", "rate": 25000}
            ]
        });
        let rate = extract_rate(&body, &query("Summer", "H", "R")).unwrap();
        assert_eq!(rate, "25000");
    }

    #[test]
    fn test_falls_back_to_first_entry() {
        let body = json!({
            "rates": [
                {"period": "Winter", "hotel": "H", "room": "R", "rate": 10000}
            ]
        });
        let rate = extract_rate(&body, &query("Summer", "Other", "R")).unwrap();
        assert_eq!(rate, "10000");
    }

    #[test]
    fn test_missing_rates_is_an_error() {
        let body = json!({"unexpected": true});
        let result = extract_rate(&body, &query("Summer", "H", "R"));
        assert!(matches!(result, Err(RateError::Internal(_))));
    }

    #[test]
    fn test_empty_rates_is_an_error() {
        let body = json!({"rates": []});
        let result = extract_rate(&body, &query("Summer", "H", "R"));
        assert!(matches!(result, Err(RateError::Internal(_))));
    }

    #[test]
    fn test_rate_may_already_be_a_string() {
        let body = json!({
            "rates": [
                {"period": "Summer", "hotel": "H", "room": "R", "rate": "25000"}
            ]
        });
        let rate = extract_rate(&body, &query("Summer", "H", "R")).unwrap();
        assert_eq!(rate, "25000");
    }
}
