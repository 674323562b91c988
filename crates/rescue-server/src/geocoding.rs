//! Address lookup for cases reported without coordinates.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rescue_core::Coordinate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::GeocodingConfig;

#[derive(Debug, Error)]
pub enum GeocodingError {
    #[error("No location found for '{0}'")]
    NoMatch(String),
    #[error("Geocoding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Geocoding service returned {status}")]
    Status { status: u16 },
    #[error("Unexpected geocoding response: {0}")]
    Decode(String),
}

/// One match returned by a forward lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeCandidate {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: String,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Candidates for a free-text address, best match first.
    async fn search(&self, query: &str) -> Result<Vec<GeocodeCandidate>, GeocodingError>;

    /// Human-readable address of a coordinate.
    async fn reverse(&self, coordinate: Coordinate) -> Result<String, GeocodingError>;
}

// LocationIQ sends coordinates as strings.
#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
    display_name: String,
}

impl TryFrom<Place> for GeocodeCandidate {
    type Error = GeocodingError;

    fn try_from(place: Place) -> Result<Self, Self::Error> {
        let parse = |field: &str, value: &str| {
            value
                .parse::<f64>()
                .map_err(|_| GeocodingError::Decode(format!("{field} '{value}' is not a number")))
        };
        Ok(Self {
            latitude: parse("lat", &place.lat)?,
            longitude: parse("lon", &place.lon)?,
            display_name: place.display_name,
        })
    }
}

/// [`Geocoder`] backed by the LocationIQ HTTP API.
pub struct LocationIqGeocoder {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl LocationIqGeocoder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GeocodingError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Builds a geocoder when the config enables one.
    pub fn from_config(cfg: &GeocodingConfig) -> Result<Option<Self>, GeocodingError> {
        if !cfg.enabled {
            return Ok(None);
        }
        let api_key = cfg.api_key.clone().unwrap_or_default();
        Self::new(
            cfg.base_url.clone(),
            api_key,
            Duration::from_millis(cfg.timeout_ms),
        )
        .map(Some)
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, GeocodingError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("format", "json")])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Geocoding request rejected");
            return Err(GeocodingError::Status {
                status: status.as_u16(),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| GeocodingError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Geocoder for LocationIqGeocoder {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeCandidate>, GeocodingError> {
        let places: Vec<Place> = self
            .get("search.php", &[("q", query.to_string())])
            .await?;
        debug!(query = query, matches = places.len(), "Address searched");
        places.into_iter().map(GeocodeCandidate::try_from).collect()
    }

    async fn reverse(&self, coordinate: Coordinate) -> Result<String, GeocodingError> {
        let place: Place = self
            .get(
                "reverse.php",
                &[
                    ("lat", coordinate.latitude.to_string()),
                    ("lon", coordinate.longitude.to_string()),
                ],
            )
            .await?;
        Ok(place.display_name)
    }
}

/// First candidate for `query`, or `NoMatch`.
pub async fn locate(
    geocoder: &dyn Geocoder,
    query: &str,
) -> Result<GeocodeCandidate, GeocodingError> {
    geocoder
        .search(query)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| GeocodingError::NoMatch(query.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_parses_string_coordinates() {
        let place = Place {
            lat: "6.5244".into(),
            lon: "3.3792".into(),
            display_name: "Lagos".into(),
        };
        let candidate = GeocodeCandidate::try_from(place).unwrap();
        assert_eq!(candidate.latitude, 6.5244);
        assert_eq!(candidate.longitude, 3.3792);
    }

    #[test]
    fn test_place_rejects_garbage() {
        let place = Place {
            lat: "north".into(),
            lon: "3.3".into(),
            display_name: "?".into(),
        };
        assert!(matches!(
            GeocodeCandidate::try_from(place),
            Err(GeocodingError::Decode(_))
        ));
    }

    #[test]
    fn test_disabled_config_builds_nothing() {
        assert!(
            LocationIqGeocoder::from_config(&GeocodingConfig::default())
                .unwrap()
                .is_none()
        );
    }
}
