// Flight search: vendor passthrough plus the display formatting used in itineraries

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::render::escape_html;
use crate::vendor::{ApiError, FlightQuery, TravelApi, VendorResponse};

pub const MAX_FLIGHT_OPTIONS: usize = 3;
pub const NO_FLIGHTS_MESSAGE: &str = "No travel options found for the selected route and date.";
pub const FLIGHT_ERROR_MESSAGE: &str = "Error fetching travel options.";
pub const FLIGHT_TOKEN_ERROR_MESSAGE: &str = "Error retrieving travel data.";

// Vendor flight-offer payload, only the fields we display
#[derive(Debug, Deserialize)]
pub struct FlightOffersPayload {
    #[serde(default)]
    pub data: Vec<VendorFlightOffer>,
}

#[derive(Debug, Deserialize)]
pub struct VendorFlightOffer {
    pub itineraries: Vec<VendorItinerary>,
}

#[derive(Debug, Deserialize)]
pub struct VendorItinerary {
    pub duration: String,
    pub segments: Vec<VendorSegment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorSegment {
    pub departure: VendorEndpoint,
    pub arrival: VendorEndpoint,
    pub carrier_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorEndpoint {
    pub iata_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlightSegment {
    pub origin: String,
    pub destination: String,
    pub carrier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlightOption {
    pub segments: Vec<FlightSegment>,
    pub duration: String,
}

impl FlightOption {
    pub fn segment_chain(&self) -> String {
        self.segments
            .iter()
            .map(|s| {
                format!(
                    "{} → {} ({})",
                    escape_html(&s.origin),
                    escape_html(&s.destination),
                    escape_html(&s.carrier)
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// "PT7H35M" -> "7h35m"
pub fn format_duration(iso: &str) -> String {
    iso.replacen("PT", "", 1).to_lowercase()
}

// None when the payload does not have the offer shape; vendor order is kept
pub fn parse_flight_offers(body: &Value) -> Option<Vec<FlightOption>> {
    let payload: FlightOffersPayload = serde_json::from_value(body.clone()).ok()?;

    payload
        .data
        .into_iter()
        .take(MAX_FLIGHT_OPTIONS)
        .map(|offer| {
            let itinerary = offer.itineraries.into_iter().next()?;
            Some(FlightOption {
                duration: format_duration(&itinerary.duration),
                segments: itinerary
                    .segments
                    .into_iter()
                    .map(|seg| FlightSegment {
                        origin: seg.departure.iata_code,
                        destination: seg.arrival.iata_code,
                        carrier: seg.carrier_code,
                    })
                    .collect(),
            })
        })
        .collect()
}

pub fn render_flight_options(options: &[FlightOption]) -> String {
    if options.is_empty() {
        return NO_FLIGHTS_MESSAGE.to_string();
    }

    options
        .iter()
        .enumerate()
        .map(|(i, option)| {
            format!(
                "Option {}: {}, Duration: {}",
                i + 1,
                option.segment_chain(),
                escape_html(&option.duration)
            )
        })
        .collect::<Vec<_>>()
        .join("<br><br>")
}

// Proxy operation: the vendor's status and body are returned as-is
pub async fn search_flights(
    api: &dyn TravelApi,
    query: &FlightQuery,
    token: &str,
) -> Result<VendorResponse, ApiError> {
    let response = api.search_flights(query, token).await?;
    debug!(
        origin = %query.origin,
        destination = %query.destination,
        status = response.status,
        "flight search completed"
    );
    Ok(response)
}

// Display string for the itinerary; every failure degrades to an explanatory message
pub async fn flight_summary(api: &dyn TravelApi, query: &FlightQuery, token: &str) -> String {
    let response = match search_flights(api, query, token).await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "flight search failed");
            return FLIGHT_ERROR_MESSAGE.to_string();
        }
    };

    if !response.is_success() {
        warn!(status = response.status, "flight search rejected");
        return FLIGHT_ERROR_MESSAGE.to_string();
    }

    match parse_flight_offers(&response.body) {
        Some(options) => render_flight_options(&options),
        None => {
            warn!("flight offers payload was malformed");
            FLIGHT_ERROR_MESSAGE.to_string()
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::offer;
    use super::*;
    use crate::vendor::mock_server::{MockReply, MockVendor};
    use serde_json::json;
    use test_case::test_case;

    fn query() -> FlightQuery {
        FlightQuery {
            origin: "LON".to_string(),
            destination: "PAR".to_string(),
            departure_date: "2025-06-01".to_string(),
        }
    }

    #[test_case("PT7H35M", "7h35m"; "hours and minutes")]
    #[test_case("PT55M", "55m"; "minutes only")]
    #[test_case("P1DT2H", "p1dt2h"; "day component keeps prefix")]
    #[test_case("", ""; "empty")]
    fn test_format_duration(iso: &str, expected: &str) {
        assert_eq!(format_duration(iso), expected);
    }

    #[test]
    fn test_empty_list_renders_explicit_message() {
        assert_eq!(render_flight_options(&[]), NO_FLIGHTS_MESSAGE);

        let parsed = parse_flight_offers(&json!({"data": []})).unwrap();
        assert_eq!(render_flight_options(&parsed), NO_FLIGHTS_MESSAGE);

        let missing = parse_flight_offers(&json!({"meta": {"count": 0}})).unwrap();
        assert_eq!(render_flight_options(&missing), NO_FLIGHTS_MESSAGE);
    }

    #[test]
    fn test_renders_segment_chain_and_duration() {
        let body = json!({"data": [
            offer("PT1H20M", &[("LHR", "CDG", "AF")]),
            offer("PT5H10M", &[("LGW", "AMS", "KL"), ("AMS", "ORY", "KL")]),
        ]});

        let options = parse_flight_offers(&body).unwrap();
        assert_eq!(
            render_flight_options(&options),
            "Option 1: LHR → CDG (AF), Duration: 1h20m<br><br>\
             Option 2: LGW → AMS (KL), AMS → ORY (KL), Duration: 5h10m"
        );
    }

    #[test]
    fn test_at_most_three_options_in_vendor_order() {
        let body = json!({"data": [
            offer("PT9H", &[("LHR", "JFK", "BA")]),
            offer("PT1H", &[("LHR", "CDG", "AF")]),
            offer("PT3H", &[("LHR", "MAD", "IB")]),
            offer("PT2H", &[("LHR", "DUB", "EI")]),
        ]});

        let options = parse_flight_offers(&body).unwrap();
        assert_eq!(options.len(), MAX_FLIGHT_OPTIONS);
        let carriers: Vec<&str> = options
            .iter()
            .map(|o| o.segments[0].carrier.as_str())
            .collect();
        assert_eq!(carriers, vec!["BA", "AF", "IB"]);
    }

    #[test]
    fn test_malformed_offer_is_none() {
        let body = json!({"data": [{"itineraries": []}]});
        assert!(parse_flight_offers(&body).is_none());

        let body = json!({"data": [{"price": {"total": "10"}}]});
        assert!(parse_flight_offers(&body).is_none());
    }

    #[tokio::test]
    async fn test_search_passes_query_and_status_through() {
        let vendor = MockVendor::new();
        let payload = json!({"errors": [{"status": 400, "title": "INVALID DATE"}]});
        vendor.set_flights(MockReply::status(400, payload.clone()));

        let response = search_flights(&vendor, &query(), "tok").await.unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(response.body, payload);
        assert_eq!(vendor.last_flight_query.lock().clone(), Some(query()));
    }

    #[tokio::test]
    async fn test_summary_degrades_on_failure() {
        let vendor = MockVendor::new();

        vendor.set_flights(MockReply::Fail("reset by peer".to_string()));
        assert_eq!(flight_summary(&vendor, &query(), "tok").await, FLIGHT_ERROR_MESSAGE);

        vendor.set_flights(MockReply::status(500, json!({"errors": []})));
        assert_eq!(flight_summary(&vendor, &query(), "tok").await, FLIGHT_ERROR_MESSAGE);

        vendor.set_flights(MockReply::ok(json!({"data": []})));
        assert_eq!(flight_summary(&vendor, &query(), "tok").await, NO_FLIGHTS_MESSAGE);
    }

    #[tokio::test]
    async fn test_summary_formats_live_offers() {
        let vendor = MockVendor::new();
        vendor.set_flights(MockReply::ok(
            json!({"data": [offer("PT7H35M", &[("JFK", "CDG", "AF")])]}),
        ));

        assert_eq!(
            flight_summary(&vendor, &query(), "tok").await,
            "Option 1: JFK → CDG (AF), Duration: 7h35m"
        );
    }
}
