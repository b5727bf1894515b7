// Hotel search with a static fallback dataset
// A failing live call is replaced by canned offers keyed by city code, tagged so callers can tell them apart

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::render::escape_html;
use crate::vendor::{HotelQuery, TravelApi, VendorResponse};

pub const MAX_HOTEL_OPTIONS: usize = 3;
pub const NO_HOTELS_MESSAGE: &str = "No hotel offers found for the selected dates.";
pub const HOTEL_ERROR_MESSAGE: &str = "Unable to fetch hotel suggestions at the moment.";
pub const HOTEL_TOKEN_ERROR_MESSAGE: &str = "Error retrieving hotel data.";
pub const FALLBACK_NOTE: &str = "(Live rates unavailable; showing sample hotels.)";

#[derive(Error, Debug, PartialEq)]
pub enum HotelError {
    #[error("Check-out date out of range: {check_in} + {nights} nights")]
    DateOutOfRange { check_in: NaiveDate, nights: u32 },
}

// Calendar arithmetic: month and year boundaries roll over normally
pub fn checkout_date(check_in: NaiveDate, nights: u32) -> Result<NaiveDate, HotelError> {
    check_in
        .checked_add_days(Days::new(u64::from(nights)))
        .ok_or(HotelError::DateOutOfRange { check_in, nights })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HotelSource {
    Live,
    Fallback,
}

impl HotelSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HotelSource::Live => "live",
            HotelSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HotelOutcome {
    Live(VendorResponse),
    Fallback { data: Value, reason: String },
}

impl HotelOutcome {
    pub fn body(&self) -> &Value {
        match self {
            HotelOutcome::Live(response) => &response.body,
            HotelOutcome::Fallback { data, .. } => data,
        }
    }

    // Fallback data is always reported as 200
    pub fn status(&self) -> u16 {
        match self {
            HotelOutcome::Live(response) => response.status,
            HotelOutcome::Fallback { .. } => 200,
        }
    }

    pub fn source(&self) -> HotelSource {
        match self {
            HotelOutcome::Live(_) => HotelSource::Live,
            HotelOutcome::Fallback { .. } => HotelSource::Fallback,
        }
    }
}

fn fallback_entry(name: &str, city_code: &str, total: &str, currency: &str) -> Value {
    json!({
        "type": "hotel-offers",
        "available": true,
        "hotel": {"name": name, "cityCode": city_code},
        "offers": [{"price": {"total": total, "currency": currency}}]
    })
}

// Canned substitute offers, chosen solely by city code
pub fn fallback_hotels(city_code: &str) -> Value {
    let code = city_code.trim().to_uppercase();
    let data = match code.as_str() {
        "PAR" => vec![
            fallback_entry("Hotel Lutetia Paris", "PAR", "1450.00", "EUR"),
            fallback_entry("Le Marais Boutique Hotel", "PAR", "620.00", "EUR"),
            fallback_entry("Ibis Paris Gare de Lyon", "PAR", "310.00", "EUR"),
        ],
        "NYC" => vec![
            fallback_entry("The Plaza New York", "NYC", "1890.00", "USD"),
            fallback_entry("Midtown Business Suites", "NYC", "780.00", "USD"),
            fallback_entry("Pod Times Square", "NYC", "340.00", "USD"),
        ],
        _ => vec![
            fallback_entry(&format!("{} Premium Hotel", code), &code, "900.00", "USD"),
            fallback_entry(&format!("{} Business Inn", code), &code, "450.00", "USD"),
            fallback_entry(&format!("{} Budget Stay", code), &code, "180.00", "USD"),
        ],
    };
    json!({ "data": data })
}

pub async fn search_hotels(
    api: &dyn TravelApi,
    city_code: &str,
    check_in: NaiveDate,
    nights: u32,
    token: &str,
) -> Result<HotelOutcome, HotelError> {
    let query = HotelQuery {
        city_code: city_code.to_string(),
        check_in,
        check_out: checkout_date(check_in, nights)?,
    };

    let reason = match api.search_hotels(&query, token).await {
        Ok(response) if response.is_success() => {
            debug!(city = city_code, status = response.status, "live hotel offers");
            return Ok(HotelOutcome::Live(response));
        }
        Ok(response) => format!("vendor responded with status {}", response.status),
        Err(err) => err.to_string(),
    };

    info!(city = city_code, %reason, "serving fallback hotel data");
    Ok(HotelOutcome::Fallback {
        data: fallback_hotels(city_code),
        reason,
    })
}

#[derive(Debug, Deserialize)]
pub struct HotelOffersPayload {
    #[serde(default)]
    pub data: Vec<VendorHotelOffer>,
}

#[derive(Debug, Deserialize)]
pub struct VendorHotelOffer {
    pub hotel: VendorHotel,
    pub offers: Vec<VendorOffer>,
}

#[derive(Debug, Deserialize)]
pub struct VendorHotel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct VendorOffer {
    pub price: VendorPrice,
}

#[derive(Debug, Deserialize)]
pub struct VendorPrice {
    pub total: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotelOption {
    pub name: String,
    pub total: String,
    pub currency: String,
}

pub fn parse_hotel_options(body: &Value) -> Option<Vec<HotelOption>> {
    let payload: HotelOffersPayload = serde_json::from_value(body.clone()).ok()?;

    payload
        .data
        .into_iter()
        .take(MAX_HOTEL_OPTIONS)
        .map(|entry| {
            let offer = entry.offers.into_iter().next()?;
            Some(HotelOption {
                name: entry.hotel.name,
                total: offer.price.total,
                currency: offer.price.currency,
            })
        })
        .collect()
}

pub fn render_hotel_options(options: &[HotelOption]) -> String {
    if options.is_empty() {
        return NO_HOTELS_MESSAGE.to_string();
    }

    options
        .iter()
        .map(|h| {
            format!(
                "{} - {} {}",
                escape_html(&h.name),
                escape_html(&h.total),
                escape_html(&h.currency)
            )
        })
        .collect::<Vec<_>>()
        .join("<br>")
}

// Display string for the itinerary plus where the data came from
pub async fn hotel_summary(
    api: &dyn TravelApi,
    city_code: &str,
    check_in: NaiveDate,
    nights: u32,
    token: &str,
) -> (String, Option<HotelSource>) {
    let outcome = match search_hotels(api, city_code, check_in, nights, token).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(error = %err, "hotel search skipped");
            return (HOTEL_ERROR_MESSAGE.to_string(), None);
        }
    };

    let Some(options) = parse_hotel_options(outcome.body()) else {
        warn!("hotel offers payload was malformed");
        return (HOTEL_ERROR_MESSAGE.to_string(), None);
    };

    let rendered = render_hotel_options(&options);
    match outcome.source() {
        HotelSource::Live => (rendered, Some(HotelSource::Live)),
        HotelSource::Fallback => (
            format!("{}<br>{}", rendered, FALLBACK_NOTE),
            Some(HotelSource::Fallback),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendor::mock_server::{MockReply, MockVendor};
    use test_case::test_case;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn live_payload() -> Value {
        json!({"data": [
            {"hotel": {"name": "Hotel A"}, "offers": [{"price": {"total": "300.00", "currency": "EUR"}}]},
            {"hotel": {"name": "Hotel B"}, "offers": [{"price": {"total": "410.50", "currency": "EUR"}}]},
            {"hotel": {"name": "Hotel C"}, "offers": [{"price": {"total": "520.00", "currency": "EUR"}}]},
            {"hotel": {"name": "Hotel D"}, "offers": [{"price": {"total": "990.00", "currency": "EUR"}}]}
        ]})
    }

    #[test_case("2024-01-30", 3, "2024-02-02"; "month boundary")]
    #[test_case("2023-12-30", 5, "2024-01-04"; "year boundary")]
    #[test_case("2024-02-28", 1, "2024-02-29"; "leap day")]
    #[test_case("2023-02-28", 1, "2023-03-01"; "non leap year")]
    #[test_case("2025-06-01", 0, "2025-06-01"; "zero nights")]
    #[test_case("2025-06-01", 30, "2025-07-01"; "thirty nights")]
    fn test_checkout_date(check_in: &str, nights: u32, expected: &str) {
        assert_eq!(checkout_date(date(check_in), nights).unwrap(), date(expected));
    }

    #[test]
    fn test_checkout_date_overflow() {
        let err = checkout_date(NaiveDate::MAX, 1).unwrap_err();
        assert_eq!(
            err,
            HotelError::DateOutOfRange {
                check_in: NaiveDate::MAX,
                nights: 1
            }
        );
    }

    #[test_case("PAR", "Hotel Lutetia Paris"; "paris")]
    #[test_case("par", "Hotel Lutetia Paris"; "paris lowercase")]
    #[test_case("NYC", "The Plaza New York"; "new york")]
    #[test_case("ROM", "ROM Premium Hotel"; "generic")]
    fn test_fallback_selected_by_city_code(code: &str, first_name: &str) {
        let data = fallback_hotels(code);
        let options = parse_hotel_options(&data).unwrap();
        assert_eq!(options.len(), 3);
        assert_eq!(options[0].name, first_name);
    }

    #[test]
    fn test_generic_fallback_has_three_tiers() {
        let options = parse_hotel_options(&fallback_hotels("BER")).unwrap();
        let names: Vec<&str> = options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["BER Premium Hotel", "BER Business Inn", "BER Budget Stay"]
        );
    }

    #[tokio::test]
    async fn test_live_results_pass_through() {
        let vendor = MockVendor::new();
        vendor.set_hotels(MockReply::ok(live_payload()));

        let outcome = search_hotels(&vendor, "PAR", date("2024-01-30"), 3, "tok")
            .await
            .unwrap();
        assert_eq!(outcome.source(), HotelSource::Live);
        assert_eq!(outcome.status(), 200);
        assert_eq!(outcome.body(), &live_payload());

        let query = vendor.last_hotel_query.lock().clone().unwrap();
        assert_eq!(query.city_code, "PAR");
        assert_eq!(query.check_out, date("2024-02-02"));
    }

    #[test_case(MockReply::status(500, json!({"errors": []})); "upstream 500")]
    #[test_case(MockReply::status(401, json!({"errors": []})); "expired token")]
    #[test_case(MockReply::Fail("connection reset".to_string()); "transport failure")]
    #[tokio::test]
    async fn test_failing_upstream_serves_fallback(reply: MockReply) {
        let vendor = MockVendor::new();
        vendor.set_hotels(reply);

        let outcome = search_hotels(&vendor, "NYC", date("2025-06-01"), 2, "tok")
            .await
            .unwrap();
        assert_eq!(outcome.status(), 200);
        assert_eq!(outcome.source(), HotelSource::Fallback);
        assert_eq!(outcome.body(), &fallback_hotels("NYC"));
        match outcome {
            HotelOutcome::Fallback { reason, .. } => assert!(!reason.is_empty()),
            other => panic!("Expected fallback, got {:?}", other),
        }
    }

    #[test]
    fn test_render_limits_to_three() {
        let options = parse_hotel_options(&live_payload()).unwrap();
        assert_eq!(
            render_hotel_options(&options),
            "Hotel A - 300.00 EUR<br>Hotel B - 410.50 EUR<br>Hotel C - 520.00 EUR"
        );
        assert_eq!(render_hotel_options(&[]), NO_HOTELS_MESSAGE);
    }

    #[test]
    fn test_render_escapes_vendor_text() {
        let options = vec![HotelOption {
            name: "Bed & <Breakfast>".to_string(),
            total: "99.00".to_string(),
            currency: "GBP".to_string(),
        }];
        assert_eq!(
            render_hotel_options(&options),
            "Bed &amp; &lt;Breakfast&gt; - 99.00 GBP"
        );
    }

    #[tokio::test]
    async fn test_summary_marks_fallback() {
        let vendor = MockVendor::new();
        vendor.set_hotels(MockReply::status(503, json!({})));

        let (summary, source) = hotel_summary(&vendor, "PAR", date("2025-06-01"), 2, "tok").await;
        assert_eq!(source, Some(HotelSource::Fallback));
        assert!(summary.starts_with("Hotel Lutetia Paris - 1450.00 EUR"));
        assert!(summary.ends_with(FALLBACK_NOTE));
    }

    #[tokio::test]
    async fn test_summary_malformed_live_payload() {
        let vendor = MockVendor::new();
        vendor.set_hotels(MockReply::ok(json!({"data": [{"hotel": {"name": "X"}, "offers": []}]})));

        let (summary, source) = hotel_summary(&vendor, "PAR", date("2025-06-01"), 2, "tok").await;
        assert_eq!(summary, HOTEL_ERROR_MESSAGE);
        assert_eq!(source, None);
    }
}
