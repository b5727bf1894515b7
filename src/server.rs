// HTTP surface: same-origin proxies for the vendor API plus the planning endpoint
// Vendor statuses and bodies are passed through unchanged; only our own failures get JSON error bodies.

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::currency::{FrankfurterClient, RateApi};
use crate::flights::search_flights;
use crate::hotels::{checkout_date, fallback_hotels, search_hotels, HotelOutcome};
use crate::planner::{lenient_string, PlanError, TripForm, TripPlanner, VALIDATION_MESSAGE};
use crate::token::{TokenCache, TokenError};
use crate::vendor::{build_http_client, AmadeusClient, ApiError, FlightQuery, TravelApi};

pub const HOTEL_SOURCE_HEADER: &str = "x-hotel-source";
pub const FALLBACK_REASON_HEADER: &str = "x-fallback-reason";
const DEFAULT_FALLBACK_REASON: &str = "upstream unavailable";

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn TravelApi>,
    pub tokens: Arc<TokenCache>,
    pub planner: Arc<TripPlanner>,
}

impl AppState {
    pub fn new(api: Arc<dyn TravelApi>, rates: Arc<dyn RateApi>) -> Self {
        let tokens = Arc::new(TokenCache::new(api.clone()));
        let planner = Arc::new(TripPlanner::new(api.clone(), rates, tokens.clone()));
        Self {
            api,
            tokens,
            planner,
        }
    }

    // One pooled client shared by the vendor and the rates API
    pub fn from_config(config: &AppConfig) -> Result<Self, ApiError> {
        let http = build_http_client(config.timeout())?;
        let api = Arc::new(AmadeusClient::new(http.clone(), config.vendor.clone()));
        let rates = Arc::new(FrankfurterClient::new(http, config.rates_base_url.clone()));
        Ok(Self::new(api, rates))
    }
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Method Not Allowed. Use POST.")]
    MethodNotAllowed,

    #[error("{0}")]
    BadRequest(String),

    #[error("{message}: {details}")]
    Upstream {
        message: &'static str,
        details: String,
    },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ProxyError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!({ "error": "Method Not Allowed. Use POST." }),
            ),
            ProxyError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ProxyError::Upstream { message, details } => {
                error!(%details, "{}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": message, "details": details }),
                )
            }
            ProxyError::Token(TokenError::Rejected { status, body }) => {
                warn!(status, "vendor rejected token request");
                (status_or_bad_gateway(status), json!({ "error": body }))
            }
            ProxyError::Token(err) => {
                error!(error = %err, "token request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Failed to fetch token", "details": err.to_string() }),
                )
            }
            ProxyError::Plan(PlanError::Validation(err)) => {
                warn!(error = %err, "plan request failed validation");
                (
                    StatusCode::BAD_REQUEST,
                    json!({ "error": VALIDATION_MESSAGE }),
                )
            }
            ProxyError::Plan(err @ PlanError::CityNotFound(_)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": err.to_string() }),
            ),
            ProxyError::Plan(err) => {
                (StatusCode::BAD_GATEWAY, json!({ "error": err.to_string() }))
            }
        };

        (status, Json(body)).into_response()
    }
}

fn status_or_bad_gateway(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY)
}

fn passthrough(status: u16, body: Value) -> Response {
    (status_or_bad_gateway(status), Json(body)).into_response()
}

fn parse_body<'a, T: Deserialize<'a>>(body: &'a Bytes) -> Result<T, ProxyError> {
    serde_json::from_slice(body)
        .map_err(|_| ProxyError::BadRequest("Invalid JSON in request body.".to_string()))
}

fn required_field(value: Option<String>, field: &str) -> Result<String, ProxyError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProxyError::BadRequest(format!("Missing required field: {}", field)))
}

// A caller-supplied token wins; otherwise the server's cached token is used
async fn bearer(state: &AppState, supplied: Option<String>) -> Result<String, ProxyError> {
    match supplied.filter(|t| !t.trim().is_empty()) {
        Some(token) => Ok(token),
        None => Ok(state.tokens.get().await?),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CityLookupRequest {
    city_name: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlightSearchRequest {
    origin: Option<String>,
    destination: Option<String>,
    date: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HotelSearchRequest {
    city_code: Option<String>,
    check_in_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    nights: String,
    access_token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/.netlify/functions/amadeusToken", get(token_proxy))
        .route(
            "/.netlify/functions/cityLookup",
            post(city_lookup).fallback(method_not_allowed),
        )
        .route("/api/flightSearch", post(flight_search))
        .route("/api/hotelSearch", post(hotel_search))
        .route("/api/plan", post(plan))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn method_not_allowed() -> ProxyError {
    ProxyError::MethodNotAllowed
}

async fn token_proxy(State(state): State<AppState>) -> Result<Json<Value>, ProxyError> {
    let token = state.tokens.get().await?;
    Ok(Json(json!({ "access_token": token })))
}

async fn city_lookup(State(state): State<AppState>, body: Bytes) -> Result<Response, ProxyError> {
    let request: CityLookupRequest = parse_body(&body)?;
    let city_name = required_field(request.city_name, "cityName")?;
    let token = bearer(&state, request.access_token).await?;

    let response = state
        .api
        .search_locations(&city_name, &token)
        .await
        .map_err(|err| ProxyError::Upstream {
            message: "Failed to fetch city code",
            details: err.to_string(),
        })?;

    info!(city = %city_name, status = response.status, "city lookup proxied");
    Ok(passthrough(response.status, response.body))
}

async fn flight_search(State(state): State<AppState>, body: Bytes) -> Result<Response, ProxyError> {
    let request: FlightSearchRequest = parse_body(&body)?;
    let query = FlightQuery {
        origin: required_field(request.origin, "origin")?,
        destination: required_field(request.destination, "destination")?,
        departure_date: required_field(request.date, "date")?,
    };
    let token = bearer(&state, request.access_token).await?;

    let response = search_flights(state.api.as_ref(), &query, &token)
        .await
        .map_err(|err| ProxyError::Upstream {
            message: "Failed to fetch flight offers",
            details: err.to_string(),
        })?;

    Ok(passthrough(response.status, response.body))
}

async fn hotel_search(State(state): State<AppState>, body: Bytes) -> Result<Response, ProxyError> {
    let request: HotelSearchRequest = parse_body(&body)?;
    let city_code = required_field(request.city_code, "cityCode")?;
    let check_in_raw = required_field(request.check_in_date, "checkInDate")?;
    let check_in = NaiveDate::parse_from_str(&check_in_raw, "%Y-%m-%d")
        .map_err(|_| ProxyError::BadRequest(format!("Invalid checkInDate: {}", check_in_raw)))?;
    let nights = request
        .nights
        .trim()
        .parse::<u32>()
        .map_err(|_| ProxyError::BadRequest(format!("Invalid nights: {}", request.nights)))?;
    checkout_date(check_in, nights).map_err(|err| ProxyError::BadRequest(err.to_string()))?;

    // Without a usable token the live call is skipped and sample data is served
    let outcome = match bearer(&state, request.access_token).await {
        Ok(token) => search_hotels(state.api.as_ref(), &city_code, check_in, nights, &token)
            .await
            .map_err(|err| ProxyError::BadRequest(err.to_string()))?,
        Err(err) => {
            warn!(city = %city_code, error = %err, "no vendor token, serving fallback hotel data");
            HotelOutcome::Fallback {
                data: fallback_hotels(&city_code),
                reason: err.to_string(),
            }
        }
    };

    let mut response = passthrough(outcome.status(), outcome.body().clone());
    let headers = response.headers_mut();
    headers.insert(
        HOTEL_SOURCE_HEADER,
        HeaderValue::from_static(outcome.source().as_str()),
    );
    if let HotelOutcome::Fallback { reason, .. } = &outcome {
        headers.insert(FALLBACK_REASON_HEADER, fallback_reason_header(reason));
    }
    Ok(response)
}

// Header values only carry visible ASCII; anything else becomes a space
fn fallback_reason_header(reason: &str) -> HeaderValue {
    let cleaned: String = reason
        .chars()
        .map(|c| if c.is_ascii_graphic() { c } else { ' ' })
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        return HeaderValue::from_static(DEFAULT_FALLBACK_REASON);
    }
    HeaderValue::from_str(&cleaned).unwrap_or(HeaderValue::from_static(DEFAULT_FALLBACK_REASON))
}

async fn plan(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ProxyError> {
    let form: TripForm = parse_body(&body)?;
    let itinerary = state.planner.plan(&form).await?;
    Ok(Json(json!({ "html": itinerary.to_html(), "itinerary": itinerary })))
}
