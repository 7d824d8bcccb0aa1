//! Ride price quotes.
//!
//! Prices come from an external quote source: either an HTTP pricing
//! service or the `calculate_ride_price` database function. Callers use
//! [`price_or_fallback`], which never fails.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[async_trait]
pub trait PriceQuoter: Send + Sync {
    async fn quote(&self, pickup: &str, dropoff: &str) -> AppResult<f64>;
}

#[derive(Debug, Serialize)]
struct QuoteRequest<'a> {
    pickup_location: &'a str,
    dropoff_location: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuoteResponse {
    Bare(f64),
    Wrapped { price: f64 },
}

impl QuoteResponse {
    fn price(&self) -> f64 {
        match self {
            QuoteResponse::Bare(price) | QuoteResponse::Wrapped { price } => *price,
        }
    }
}

fn validate_price(price: f64) -> AppResult<f64> {
    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(AppError::Internal(format!("Pricing returned invalid price {}", price)))
    }
}

/// Quotes prices from a remote pricing endpoint.
pub struct HttpPriceQuoter {
    client: reqwest::Client,
    url: String,
}

impl HttpPriceQuoter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl PriceQuoter for HttpPriceQuoter {
    async fn quote(&self, pickup: &str, dropoff: &str) -> AppResult<f64> {
        let response = self
            .client
            .post(&self.url)
            .json(&QuoteRequest {
                pickup_location: pickup,
                dropoff_location: dropoff,
            })
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Pricing request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "Pricing service returned {}",
                response.status()
            )));
        }

        let body: QuoteResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Invalid pricing response: {}", e)))?;

        validate_price(body.price())
    }
}

/// Quotes prices through the `calculate_ride_price` database function.
pub struct SqlFunctionPriceQuoter {
    db: DatabaseConnection,
}

impl SqlFunctionPriceQuoter {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PriceQuoter for SqlFunctionPriceQuoter {
    async fn quote(&self, pickup: &str, dropoff: &str) -> AppResult<f64> {
        let statement = Statement::from_sql_and_values(
            self.db.get_database_backend(),
            "SELECT calculate_ride_price($1, $2) AS price",
            [pickup.into(), dropoff.into()],
        );

        let row = self
            .db
            .query_one(statement)
            .await?
            .ok_or_else(|| AppError::Internal("calculate_ride_price returned no row".to_string()))?;
        let price: f64 = row.try_get("", "price")?;

        validate_price(price)
    }
}

/// Quote a ride, falling back to `fallback` when the quote source fails.
pub async fn price_or_fallback(
    quoter: &dyn PriceQuoter,
    pickup: &str,
    dropoff: &str,
    fallback: f64,
) -> f64 {
    match quoter.quote(pickup, dropoff).await {
        Ok(price) => price,
        Err(e) => {
            tracing::warn!(error = %e, fallback, "Price quote failed, using fallback price");
            fallback
        }
    }
}
