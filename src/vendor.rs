// Travel vendor API client
// One parameterized client for the OAuth, location, flight-offer and hotel-offer endpoints.
// Every call hands back the upstream status and JSON body untouched so the proxies can pass them through.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::VendorConfig;

// Transport-level failures talking to an upstream API
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response body: {0}")]
    InvalidBody(String),

    #[error("Client error: {0}")]
    ClientError(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::InvalidBody(err.to_string())
        } else if err.is_builder() {
            ApiError::ClientError(err.to_string())
        } else {
            ApiError::NetworkError(err.to_string())
        }
    }
}

// Raw upstream answer: HTTP status plus decoded JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct VendorResponse {
    pub status: u16,
    pub body: Value,
}

impl VendorResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlightQuery {
    pub origin: String,
    pub destination: String,
    pub departure_date: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotelQuery {
    pub city_code: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

#[async_trait]
pub trait TravelApi: Send + Sync + 'static {
    // Client-credentials token request
    async fn request_token(&self) -> Result<VendorResponse, ApiError>;

    // City-type location search by free-text keyword
    async fn search_locations(&self, keyword: &str, token: &str)
        -> Result<VendorResponse, ApiError>;

    // Flight offers for one adult, connections allowed, at most 3 results
    async fn search_flights(
        &self,
        query: &FlightQuery,
        token: &str,
    ) -> Result<VendorResponse, ApiError>;

    // Best-rate hotel offers for one room, sorted by price
    async fn search_hotels(&self, query: &HotelQuery, token: &str)
        -> Result<VendorResponse, ApiError>;
}

pub fn build_http_client(timeout: Option<Duration>) -> Result<Client, ApiError> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| ApiError::ClientError(e.to_string()))
}

pub struct AmadeusClient {
    http: Client,
    config: VendorConfig,
}

impl AmadeusClient {
    pub fn new(http: Client, config: VendorConfig) -> Self {
        Self { http, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        token: &str,
    ) -> Result<VendorResponse, ApiError> {
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.json::<Value>().await?;
        debug!(path, status, "vendor responded");
        Ok(VendorResponse::new(status, body))
    }
}

#[async_trait]
impl TravelApi for AmadeusClient {
    async fn request_token(&self) -> Result<VendorResponse, ApiError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(self.url("/v1/security/oauth2/token"))
            .form(&form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.json::<Value>().await?;
        debug!(status, "token endpoint responded");
        Ok(VendorResponse::new(status, body))
    }

    async fn search_locations(
        &self,
        keyword: &str,
        token: &str,
    ) -> Result<VendorResponse, ApiError> {
        self.get_json(
            "/v1/reference-data/locations",
            &[("keyword", keyword), ("subType", "CITY")],
            token,
        )
        .await
    }

    async fn search_flights(
        &self,
        query: &FlightQuery,
        token: &str,
    ) -> Result<VendorResponse, ApiError> {
        self.get_json(
            "/v2/shopping/flight-offers",
            &[
                ("originLocationCode", query.origin.as_str()),
                ("destinationLocationCode", query.destination.as_str()),
                ("departureDate", query.departure_date.as_str()),
                ("adults", "1"),
                ("nonStop", "false"),
                ("max", "3"),
            ],
            token,
        )
        .await
    }

    async fn search_hotels(
        &self,
        query: &HotelQuery,
        token: &str,
    ) -> Result<VendorResponse, ApiError> {
        let check_in = query.check_in.format("%Y-%m-%d").to_string();
        let check_out = query.check_out.format("%Y-%m-%d").to_string();
        self.get_json(
            "/v2/shopping/hotel-offers",
            &[
                ("cityCode", query.city_code.as_str()),
                ("checkInDate", check_in.as_str()),
                ("checkOutDate", check_out.as_str()),
                ("roomQuantity", "1"),
                ("adults", "1"),
                ("paymentPolicy", "NONE"),
                ("includeClosed", "false"),
                ("bestRateOnly", "true"),
                ("view", "FULL"),
                ("sort", "PRICE"),
            ],
            token,
        )
        .await
    }
}
