//! Best-effort geolocation enrichment
//!
//! Resolves an approximate (latitude, longitude, locality) for labeling
//! events: manual coordinates are reverse-geocoded via Nominatim, and
//! IP-based lookup tries ipapi.co first with ip-api.com as fallback.
//!
//! Strictly advisory: every failure path degrades to "unresolved" with a
//! WARN log. No caller may treat a resolver outcome as an error.

use labelit_common::Config;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

const IPAPI_URL: &str = "https://ipapi.co/json/";
const IP_API_URL: &str = "http://ip-api.com/json/";
const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/reverse";
const USER_AGENT: &str = concat!("LabelIt/", env!("CARGO_PKG_VERSION"));

/// A resolved location attached to an image or label
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub country: Option<String>,
    /// "manual" or "ip"
    pub method: String,
}

/// ipapi.co response (primary IP provider)
#[derive(Debug, Deserialize)]
struct IpapiResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
    city: Option<String>,
    country_name: Option<String>,
}

/// ip-api.com response (fallback IP provider)
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    lat: Option<f64>,
    lon: Option<f64>,
    city: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    suburb: Option<String>,
    country: Option<String>,
}

impl NominatimAddress {
    /// Most specific populated-place name available
    fn locality(&self) -> Option<String> {
        self.city
            .clone()
            .or_else(|| self.town.clone())
            .or_else(|| self.village.clone())
            .or_else(|| self.hamlet.clone())
            .or_else(|| self.suburb.clone())
    }
}

/// Geolocation resolver; `client` is `None` when disabled by config
#[derive(Debug, Clone)]
pub struct GeoResolver {
    client: Option<reqwest::Client>,
}

impl GeoResolver {
    pub fn new(config: &Config) -> Self {
        let client = if config.geolocation_enabled {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(config.geolocation_timeout_secs))
                .user_agent(USER_AGENT)
                .build()
                .map_err(|e| warn!("Geolocation client unavailable: {}", e))
                .ok()
        } else {
            None
        };
        Self { client }
    }

    /// Resolve a location for a request
    ///
    /// With manual coordinates the result is those coordinates plus
    /// best-effort reverse-geocoded locality; without them, IP lookup.
    /// Returns `None` when nothing could be resolved.
    pub async fn resolve(&self, manual: Option<(f64, f64)>) -> Option<ResolvedLocation> {
        match manual {
            Some((latitude, longitude)) => {
                let (city, country) = match &self.client {
                    Some(client) => self
                        .reverse_geocode(client, latitude, longitude)
                        .await
                        .unwrap_or((None, None)),
                    None => (None, None),
                };
                Some(ResolvedLocation {
                    latitude,
                    longitude,
                    city,
                    country,
                    method: "manual".to_string(),
                })
            }
            None => {
                let client = self.client.as_ref()?;
                self.resolve_ip(client).await
            }
        }
    }

    /// IP-based lookup: primary provider, then fallback
    async fn resolve_ip(&self, client: &reqwest::Client) -> Option<ResolvedLocation> {
        match self.query_ipapi(client).await {
            Some(location) => Some(location),
            None => {
                warn!("Primary IP location provider failed, trying fallback");
                self.query_ip_api(client).await
            }
        }
    }

    async fn query_ipapi(&self, client: &reqwest::Client) -> Option<ResolvedLocation> {
        let response = client
            .get(IPAPI_URL)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| warn!("ipapi.co request failed: {}", e))
            .ok()?;
        let data: IpapiResponse = response
            .json()
            .await
            .map_err(|e| warn!("ipapi.co response unparseable: {}", e))
            .ok()?;
        Some(ResolvedLocation {
            latitude: data.latitude?,
            longitude: data.longitude?,
            city: data.city,
            country: data.country_name,
            method: "ip".to_string(),
        })
    }

    async fn query_ip_api(&self, client: &reqwest::Client) -> Option<ResolvedLocation> {
        let response = client
            .get(IP_API_URL)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| warn!("ip-api.com request failed: {}", e))
            .ok()?;
        let data: IpApiResponse = response
            .json()
            .await
            .map_err(|e| warn!("ip-api.com response unparseable: {}", e))
            .ok()?;
        Some(ResolvedLocation {
            latitude: data.lat?,
            longitude: data.lon?,
            city: data.city,
            country: data.country,
            method: "ip".to_string(),
        })
    }

    /// Locality lookup for manual coordinates
    async fn reverse_geocode(
        &self,
        client: &reqwest::Client,
        latitude: f64,
        longitude: f64,
    ) -> Option<(Option<String>, Option<String>)> {
        let response = client
            .get(NOMINATIM_URL)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("format", "json".to_string()),
                ("addressdetails", "1".to_string()),
                ("zoom", "10".to_string()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| warn!("Reverse geocoding failed: {}", e))
            .ok()?;
        let data: NominatimResponse = response
            .json()
            .await
            .map_err(|e| warn!("Nominatim response unparseable: {}", e))
            .ok()?;
        let address = data.address?;
        Some((address.locality(), address.country))
    }
}
