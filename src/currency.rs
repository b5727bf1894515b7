// Currency converter backed by the public Frankfurter rates API
// Conversion never fails the caller: any problem degrades to the unconverted amount

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::vendor::ApiError;

pub const TARGET_CURRENCY: &str = "USD";

#[async_trait]
pub trait RateApi: Send + Sync + 'static {
    // Latest conversion of `amount` from one currency into another, raw payload
    async fn latest(&self, amount: f64, from: &str, to: &str) -> Result<Value, ApiError>;
}

pub struct FrankfurterClient {
    http: Client,
    base_url: String,
}

impl FrankfurterClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl RateApi for FrankfurterClient {
    async fn latest(&self, amount: f64, from: &str, to: &str) -> Result<Value, ApiError> {
        let amount = amount.to_string();
        let response = self
            .http
            .get(format!("{}/latest", self.base_url))
            .query(&[("amount", amount.as_str()), ("from", from), ("to", to)])
            .send()
            .await?;

        debug!(status = response.status().as_u16(), "rates endpoint responded");
        Ok(response.json::<Value>().await?)
    }
}

pub fn extract_rate(body: &Value, to: &str) -> Option<f64> {
    body.get("rates")?.get(to)?.as_f64()
}

pub async fn convert_currency(api: &dyn RateApi, amount: f64, from: &str, to: &str) -> f64 {
    let from = from.trim().to_uppercase();
    let to = to.trim().to_uppercase();
    if from == to {
        return amount;
    }

    match api.latest(amount, &from, &to).await {
        Ok(body) => match extract_rate(&body, &to) {
            Some(converted) => converted,
            None => {
                warn!(%from, %to, "rates response lacked the requested currency");
                amount
            }
        },
        Err(err) => {
            warn!(%from, %to, error = %err, "currency conversion failed");
            amount
        }
    }
}
