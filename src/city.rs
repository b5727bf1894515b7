// City resolver: free-text city name to IATA city code

use serde_json::Value;
use tracing::{debug, warn};

use crate::vendor::TravelApi;

// First iataCode in a location-search payload, if any
pub fn first_iata_code(body: &Value) -> Option<String> {
    body.get("data")?
        .as_array()?
        .first()?
        .get("iataCode")?
        .as_str()
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}

// Any failure resolves to None; callers cannot tell "not found" from "lookup failed"
pub async fn resolve_city_code(api: &dyn TravelApi, city_name: &str, token: &str) -> Option<String> {
    let city_name = city_name.trim();
    if city_name.is_empty() {
        return None;
    }

    match api.search_locations(city_name, token).await {
        Ok(response) if response.is_success() => {
            let code = first_iata_code(&response.body);
            debug!(city = city_name, code = ?code, "resolved city");
            code
        }
        Ok(response) => {
            warn!(city = city_name, status = response.status, "location search rejected");
            None
        }
        Err(err) => {
            warn!(city = city_name, error = %err, "location search failed");
            None
        }
    }
}
