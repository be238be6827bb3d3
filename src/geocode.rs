use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::geo::GeoPoint;
use crate::store::{Store, StoreError};

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";

static PLZ_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}$").expect("plz regex"));

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("geocoding failed with status {0}")]
    Status(reqwest::StatusCode),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

/// Resolves a free-text place via Nominatim, caching results in the store
/// keyed by the raw query. A bare five-digit query is treated as a German
/// postal code. An empty result list is `None`, not an error.
pub async fn geocode_place(
    store: &Store,
    query: &str,
    user_agent: &str,
) -> Result<Option<GeoPoint>, GeocodeError> {
    if let Some(point) = store.read()?.geo_cache.get(query).cloned() {
        return Ok(Some(point));
    }

    let trimmed = query.trim();
    let q = if PLZ_RE.is_match(trimmed) {
        format!("{trimmed}, Germany")
    } else {
        query.to_string()
    };

    let client = reqwest::Client::new();
    let response = client
        .get(NOMINATIM_URL)
        .query(&[("q", q.as_str()), ("format", "jsonv2"), ("limit", "1")])
        .header(reqwest::header::USER_AGENT, user_agent)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(GeocodeError::Status(response.status()));
    }

    let places: Vec<NominatimPlace> = response.json().await?;
    let Some(first) = places.into_iter().next() else {
        return Ok(None);
    };
    let (Ok(lat), Ok(lon)) = (first.lat.parse::<f64>(), first.lon.parse::<f64>()) else {
        return Ok(None);
    };

    let point = GeoPoint {
        lat,
        lon,
        label: first.display_name,
    };
    store.update(|data| {
        data.geo_cache.insert(query.to_string(), point.clone());
    })?;

    Ok(Some(point))
}
