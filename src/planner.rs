// Trip planning orchestrator
// Validates a submitted form, resolves both cities, then gathers budget, flights and hotels into an itinerary.
// City resolution is fatal on failure; the three lookups after it each degrade to an explanatory string.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::city::resolve_city_code;
use crate::currency::{convert_currency, RateApi, TARGET_CURRENCY};
use crate::flights::{flight_summary, FLIGHT_TOKEN_ERROR_MESSAGE};
use crate::hotels::{hotel_summary, HotelSource, HOTEL_TOKEN_ERROR_MESSAGE};
use crate::render::{escape_html, format_grouped};
use crate::token::{TokenCache, TokenError};
use crate::vendor::{FlightQuery, TravelApi};

pub const VALIDATION_MESSAGE: &str = "Please fill in all fields correctly.";

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid number for {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Budget must be greater than zero")]
    NonPositiveBudget,

    #[error("Nights must be at least 1")]
    TooFewNights,

    #[error("Invalid start date: {0}")]
    InvalidDate(String),
}

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("{}", VALIDATION_MESSAGE)]
    Validation(#[from] ValidationError),

    #[error("Could not find a city code for \"{0}\".")]
    CityNotFound(String),

    #[error("Unable to reach the travel service: {0}")]
    Token(#[from] TokenError),
}

// Form fields exactly as submitted; numbers may arrive as strings or JSON numbers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripForm {
    #[serde(default, deserialize_with = "lenient_string")]
    pub source: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub destination: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub budget: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub currency: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub start_date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub nights: String,
}

pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripRequest {
    pub source_city: String,
    pub destination_city: String,
    pub budget: f64,
    pub currency: String,
    pub start_date: NaiveDate,
    pub nights: u32,
}

fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(value.to_string())
}

impl TripForm {
    pub fn validate(&self) -> Result<TripRequest, ValidationError> {
        let source_city = required(&self.source, "source")?;
        let destination_city = required(&self.destination, "destination")?;
        let budget_raw = required(&self.budget, "budget")?;
        let currency = required(&self.currency, "currency")?.to_uppercase();
        let start_raw = required(&self.start_date, "startDate")?;
        let nights_raw = required(&self.nights, "nights")?;

        let budget = budget_raw
            .parse::<f64>()
            .ok()
            .filter(|b| b.is_finite())
            .ok_or(ValidationError::InvalidNumber {
                field: "budget",
                value: budget_raw.clone(),
            })?;
        if budget <= 0.0 {
            return Err(ValidationError::NonPositiveBudget);
        }

        let nights = nights_raw
            .parse::<i64>()
            .map_err(|_| ValidationError::InvalidNumber {
                field: "nights",
                value: nights_raw.clone(),
            })?;
        if nights < 1 {
            return Err(ValidationError::TooFewNights);
        }
        let nights = u32::try_from(nights).map_err(|_| ValidationError::InvalidNumber {
            field: "nights",
            value: nights_raw,
        })?;

        let start_date = NaiveDate::parse_from_str(&start_raw, "%Y-%m-%d")
            .map_err(|_| ValidationError::InvalidDate(start_raw))?;

        Ok(TripRequest {
            source_city,
            destination_city,
            budget,
            currency,
            start_date,
            nights,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    Idle,
    Loading,
    Rendered,
    Failed,
}

// Lifecycle of one form submission
#[derive(Debug, Clone)]
pub struct Submission {
    state: PlanState,
    history: Vec<PlanState>,
}

impl Default for Submission {
    fn default() -> Self {
        Self::new()
    }
}

impl Submission {
    pub fn new() -> Self {
        Self {
            state: PlanState::Idle,
            history: vec![PlanState::Idle],
        }
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    pub fn history(&self) -> &[PlanState] {
        &self.history
    }

    fn transition(&mut self, next: PlanState) {
        debug!(from = ?self.state, to = ?next, "submission state change");
        self.state = next;
        self.history.push(next);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Itinerary {
    pub source: String,
    pub destination: String,
    pub source_code: String,
    pub destination_code: String,
    pub budget: f64,
    pub currency: String,
    pub converted_budget: f64,
    pub travel_options: String,
    pub hotel_suggestions: String,
    pub hotel_source: Option<HotelSource>,
}

impl Itinerary {
    // travel_options and hotel_suggestions are already escaped markup
    pub fn to_html(&self) -> String {
        format!(
            "<h3>Travel Plan from {} to {}</h3>\n\
             <p><strong>Your Budget:</strong> {} {}</p>\n\
             <p><strong>Converted Budget in {}:</strong> ${:.2}</p>\n\
             <p><strong>Travel Options:</strong><br>{}</p>\n\
             <p><strong>Hotel Suggestions:</strong><br>{}</p>\n",
            escape_html(&self.source),
            escape_html(&self.destination),
            format_grouped(self.budget),
            escape_html(&self.currency),
            TARGET_CURRENCY,
            self.converted_budget,
            self.travel_options,
            self.hotel_suggestions,
        )
    }
}

pub struct TripPlanner {
    api: Arc<dyn TravelApi>,
    rates: Arc<dyn RateApi>,
    tokens: Arc<TokenCache>,
}

impl TripPlanner {
    pub fn new(api: Arc<dyn TravelApi>, rates: Arc<dyn RateApi>, tokens: Arc<TokenCache>) -> Self {
        Self { api, rates, tokens }
    }

    pub async fn plan(&self, form: &TripForm) -> Result<Itinerary, PlanError> {
        let mut submission = Submission::new();
        self.submit(&mut submission, form).await
    }

    // Validation failures never leave Idle; a failed run goes back to Idle
    pub async fn submit(
        &self,
        submission: &mut Submission,
        form: &TripForm,
    ) -> Result<Itinerary, PlanError> {
        let request = form.validate()?;

        submission.transition(PlanState::Loading);
        match self.execute(&request).await {
            Ok(itinerary) => {
                submission.transition(PlanState::Rendered);
                info!(
                    source = %itinerary.source_code,
                    destination = %itinerary.destination_code,
                    "itinerary rendered"
                );
                Ok(itinerary)
            }
            Err(err) => {
                warn!(error = %err, "trip planning failed");
                submission.transition(PlanState::Failed);
                submission.transition(PlanState::Idle);
                Err(err)
            }
        }
    }

    async fn execute(&self, request: &TripRequest) -> Result<Itinerary, PlanError> {
        let token = self.tokens.get().await?;

        let source_code = self
            .resolve(&request.source_city, &token)
            .await
            .ok_or_else(|| PlanError::CityNotFound(request.source_city.clone()))?;
        let destination_code = self
            .resolve(&request.destination_city, &token)
            .await
            .ok_or_else(|| PlanError::CityNotFound(request.destination_city.clone()))?;

        let flight_query = FlightQuery {
            origin: source_code.clone(),
            destination: destination_code.clone(),
            departure_date: request.start_date.format("%Y-%m-%d").to_string(),
        };

        let (converted_budget, travel_options, (hotel_suggestions, hotel_source)) = tokio::join!(
            convert_currency(
                self.rates.as_ref(),
                request.budget,
                &request.currency,
                TARGET_CURRENCY
            ),
            self.flights(&flight_query),
            self.hotels(&destination_code, request.start_date, request.nights),
        );

        Ok(Itinerary {
            source: request.source_city.clone(),
            destination: request.destination_city.clone(),
            source_code,
            destination_code,
            budget: request.budget,
            currency: request.currency.clone(),
            converted_budget,
            travel_options,
            hotel_suggestions,
            hotel_source,
        })
    }

    async fn resolve(&self, city: &str, token: &str) -> Option<String> {
        resolve_city_code(self.api.as_ref(), city, token).await
    }

    async fn flights(&self, query: &FlightQuery) -> String {
        match self.tokens.get().await {
            Ok(token) => flight_summary(self.api.as_ref(), query, &token).await,
            Err(_) => FLIGHT_TOKEN_ERROR_MESSAGE.to_string(),
        }
    }

    async fn hotels(
        &self,
        city_code: &str,
        check_in: NaiveDate,
        nights: u32,
    ) -> (String, Option<HotelSource>) {
        match self.tokens.get().await {
            Ok(token) => hotel_summary(self.api.as_ref(), city_code, check_in, nights, &token).await,
            Err(_) => (HOTEL_TOKEN_ERROR_MESSAGE.to_string(), None),
        }
    }
}
