//! Route table and request handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};

use rategate::{RateQuery, RedisStore};

use crate::error::AppError;
use crate::facade::PricingFacade;

pub type SharedFacade = Arc<PricingFacade<RedisStore>>;

/// Raw query parameters, validated into a `RateQuery`
#[derive(Debug, Deserialize)]
pub struct RateParams {
    period: Option<String>,
    hotel: Option<String>,
    room: Option<String>,
}

impl RateParams {
    fn validate(self) -> Result<RateQuery, AppError> {
        let require = |name: &'static str, value: Option<String>| {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::Validation(format!("missing parameter: {name}")))
        };
        Ok(RateQuery {
            period: require("period", self.period)?,
            hotel: require("hotel", self.hotel)?,
            room: require("room", self.room)?,
        })
    }
}

pub fn router(facade: SharedFacade) -> Router {
    Router::new()
        .route("/rate", get(rate))
        .route("/healthz", get(healthz))
        .with_state(facade)
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn rate(
    State(facade): State<SharedFacade>,
    Query(params): Query<RateParams>,
) -> Result<Json<Value>, AppError> {
    let query = params.validate()?;
    let rate = facade.rate_for(&query).await?;
    Ok(Json(json!({ "rate": rate })))
}
