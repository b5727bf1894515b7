// Trip planner library: vendor proxies, token cache and the itinerary orchestrator

// Leaf components, one per downstream concern
pub mod city;
pub mod config;
pub mod currency;
pub mod flights;
pub mod hotels;
pub mod render;
pub mod token;
pub mod vendor;

// Orchestration and HTTP surface
pub mod planner;
pub mod server;

// Re-export key types for convenience
pub use config::{AppConfig, ConfigError, VendorConfig};
pub use currency::{convert_currency, FrankfurterClient, RateApi};
pub use hotels::{HotelError, HotelOutcome, HotelSource};
pub use planner::{
    Itinerary, PlanError, PlanState, Submission, TripForm, TripPlanner, TripRequest,
    ValidationError,
};
pub use server::{router, AppState, ProxyError};
pub use token::{AccessToken, TokenCache, TokenError, TokenStatsReport};
pub use vendor::{AmadeusClient, ApiError, FlightQuery, HotelQuery, TravelApi, VendorResponse};
