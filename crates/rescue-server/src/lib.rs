pub mod config;
pub mod error;
pub mod geocoding;
pub mod handlers;
pub mod observability;
pub mod seed;
pub mod server;
pub mod websocket;

pub use config::{AppConfig, GeocodingConfig, NotificationSettings, ServerConfig};
pub use error::ApiError;
pub use geocoding::{GeocodeCandidate, Geocoder, GeocodingError, LocationIqGeocoder};
pub use observability::{init_tracing, shutdown_tracing};
pub use server::{AppState, RescueServer, ServerBuilder, ServerError, build_app};
