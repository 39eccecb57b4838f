//! Routing adapter for the OpenRouteService directions API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use encombrants_core::model::GeoPoint;
use encombrants_core::ports::{Directions, PortError, RoutingKey, RoutingPort};

/// Public OpenRouteService endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openrouteservice.org";
/// Travel profile used when none is configured.
pub const DEFAULT_PROFILE: &str = "driving-car";

/// Endpoint and travel profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrsConfig {
    /// Service root, without the `/v2` suffix.
    pub base_url: String,
    /// Travel profile such as `driving-car` or `driving-hgv`.
    pub profile: String,
}

impl Default for OrsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            profile: DEFAULT_PROFILE.to_owned(),
        }
    }
}

/// Body of `POST /v2/directions/{profile}/geojson`
#[derive(Debug, Serialize)]
struct DirectionsBody {
    /// `[lng, lat]` pairs.
    coordinates: Vec<[f64; 2]>,
    instructions: bool,
}

/// GeoJSON answer, reduced to what is read here.
#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Properties {
    summary: Summary,
}

/// Zero-length legs come back without distance or duration.
#[derive(Debug, Deserialize)]
struct Summary {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
}

/// [`RoutingPort`] backed by OpenRouteService.
pub struct OrsRouting {
    client: Client,
    config: OrsConfig,
}

impl OrsRouting {
    /// Create a new routing port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, config: OrsConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v2/directions/{}/geojson",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile
        )
    }
}

#[async_trait]
impl RoutingPort for OrsRouting {
    async fn directions(
        &self,
        key: &RoutingKey,
        waypoints: &[GeoPoint],
    ) -> Result<Directions, PortError> {
        let body = DirectionsBody {
            coordinates: waypoints.iter().map(|point| [point.lng, point.lat]).collect(),
            instructions: false,
        };
        debug!(profile = %self.config.profile, waypoints = waypoints.len(), "directions request");
        let req = self
            .client
            .post(self.endpoint())
            .header("Authorization", key.expose())
            .json(&body);
        let geometry = fetch_json::<Value>(req).await?;

        let collection: FeatureCollection = serde_json::from_value(geometry.clone())?;
        let summary = collection
            .features
            .into_iter()
            .next()
            .map(|feature| feature.properties.summary)
            .ok_or_else(|| PortError::MissingResult("route feature".to_owned()))?;

        Ok(Directions {
            distance_m: summary.distance,
            duration_s: summary.duration,
            geometry,
        })
    }
}

// Small helper to fetch and decode JSON, keeping the body of failed responses.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, PortError> {
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(PortError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
