use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::geo::haversine_distance_km;
use crate::geocode;
use crate::models::{EventRecord, UNKNOWN};
use crate::scraping;
use crate::AppState;

/// Maps any handler error to a 500 with `{ "error": ... }`.
pub struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scan: Option<String>,
}

// Releases the in-flight flag on drop, so a scan future abandoned by a
// disconnecting client cannot leave the guard taken.
struct ScanGuard<'a>(&'a AtomicBool);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs one scrape-and-persist cycle. Overlapping invocations are
/// rejected via the shared in-flight flag, never queued.
pub async fn run_scan(state: &AppState) -> anyhow::Result<ScanOutcome> {
    if state
        .scan_in_progress
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(ScanOutcome {
            skipped: true,
            reason: Some("scan_already_running".to_string()),
            count: None,
            last_scan: None,
        });
    }

    let _guard = ScanGuard(&state.scan_in_progress);
    perform_scan(state).await
}

async fn perform_scan(state: &AppState) -> anyhow::Result<ScanOutcome> {
    let scan_url = state.config.scan_url.clone();
    let user_agent = state.config.user_agent.clone();
    let matches =
        tokio::task::spawn_blocking(move || scraping::scrape_matches(&scan_url, &user_agent))
            .await
            .map_err(|err| anyhow!("scrape task panicked: {err}"))??;

    let last_scan = Utc::now().to_rfc3339();
    let stamp = last_scan.clone();
    let count = state.store.update(move |data| {
        data.matches = matches;
        data.last_scan = Some(stamp);
        data.matches.len()
    })?;

    info!("scan complete: {count} matches stored");
    Ok(ScanOutcome {
        skipped: false,
        reason: None,
        count: Some(count),
        last_scan: Some(last_scan),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub scan_url: String,
    pub scan_interval_minutes: u64,
    pub last_scan: Option<String>,
    pub count: usize,
    pub scan_in_progress: bool,
}

pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let data = state.store.read()?;
    Ok(Json(StatusResponse {
        scan_url: state.config.scan_url.clone(),
        scan_interval_minutes: state.config.scan_interval_minutes,
        last_scan: data.last_scan,
        count: data.matches.len(),
        scan_in_progress: state.scan_in_progress.load(Ordering::SeqCst),
    }))
}

pub async fn post_scan(State(state): State<AppState>) -> Result<Json<ScanOutcome>, ApiError> {
    Ok(Json(run_scan(&state).await?))
}

#[derive(Debug, Deserialize, Default)]
pub struct MatchesQuery {
    pub level: Option<String>,
    pub sort: Option<String>,
    pub origin: Option<String>,
    #[serde(rename = "originPlz")]
    pub origin_plz: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedMatch {
    #[serde(flatten)]
    pub record: EventRecord,
    pub distance_km: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginInfo {
    pub query: String,
    pub resolved: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchesResponse {
    pub last_scan: Option<String>,
    pub total: usize,
    pub origin: Option<OriginInfo>,
    pub sort: String,
    pub matches: Vec<AnnotatedMatch>,
}

/// Comma-separated level filter; values may carry the `level ` prefix or
/// be bare digits. `None` means no filtering.
pub fn parse_levels(param: Option<&str>) -> Option<HashSet<String>> {
    let param = param?;
    let levels: HashSet<String> = param
        .split(',')
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .map(|value| {
            if value.starts_with("level") {
                value
            } else {
                format!("level {value}")
            }
        })
        .collect();
    if levels.is_empty() {
        None
    } else {
        Some(levels)
    }
}

pub async fn get_matches(
    State(state): State<AppState>,
    Query(query): Query<MatchesQuery>,
) -> Result<Json<MatchesResponse>, ApiError> {
    // A postal-code origin takes precedence over the free-text one.
    let origin_plz = query.origin_plz.as_deref().unwrap_or("").trim().to_string();
    let origin_query = if origin_plz.is_empty() {
        query.origin.as_deref().unwrap_or("").trim().to_string()
    } else {
        origin_plz
    };
    let levels = parse_levels(query.level.as_deref());

    let data = state.store.read()?;
    let mut matches = data.matches;
    if let Some(levels) = &levels {
        matches.retain(|record| levels.contains(&record.level.to_lowercase()));
    }

    let (origin, mut annotated) = annotate_with_distance(&state, matches, &origin_query).await?;

    let sort = if query.sort.as_deref() == Some("distance") {
        "distance"
    } else {
        "date"
    };
    sort_matches(&mut annotated, sort);

    Ok(Json(MatchesResponse {
        last_scan: data.last_scan,
        total: annotated.len(),
        origin,
        sort: sort.to_string(),
        matches: annotated,
    }))
}

async fn annotate_with_distance(
    state: &AppState,
    matches: Vec<EventRecord>,
    origin: &str,
) -> anyhow::Result<(Option<OriginInfo>, Vec<AnnotatedMatch>)> {
    if origin.is_empty() {
        let plain = matches
            .into_iter()
            .map(|record| AnnotatedMatch {
                record,
                distance_km: None,
            })
            .collect();
        return Ok((None, plain));
    }

    let origin_point = geocode::geocode_place(&state.store, origin, &state.config.user_agent)
        .await?
        .ok_or_else(|| anyhow!("could not resolve origin: {origin}"))?;

    let mut annotated = Vec::with_capacity(matches.len());
    for record in matches {
        if record.location == UNKNOWN {
            annotated.push(AnnotatedMatch {
                record,
                distance_km: None,
            });
            continue;
        }

        let place =
            geocode::geocode_place(&state.store, &record.location, &state.config.user_agent)
                .await?;
        let distance_km = place.map(|place| {
            let distance = haversine_distance_km(&origin_point, &place);
            (distance * 10.0).round() / 10.0
        });
        annotated.push(AnnotatedMatch {
            record,
            distance_km,
        });
    }

    let origin = OriginInfo {
        query: origin.to_string(),
        resolved: origin_point.label.clone(),
        lat: origin_point.lat,
        lon: origin_point.lon,
    };
    Ok((Some(origin), annotated))
}

/// Date ascending by default; by distance with unresolved distances last
/// and ties broken by date ascending.
pub fn sort_matches(matches: &mut [AnnotatedMatch], sort: &str) {
    if sort == "distance" {
        matches.sort_by(|a, b| {
            let av = a.distance_km.unwrap_or(f64::INFINITY);
            let bv = b.distance_km.unwrap_or(f64::INFINITY);
            av.partial_cmp(&bv)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record.date_iso.cmp(&b.record.date_iso))
        });
    } else {
        matches.sort_by(|a, b| a.record.date_iso.cmp(&b.record.date_iso));
    }
}
