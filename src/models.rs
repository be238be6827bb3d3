use serde::{Deserialize, Serialize};

/// Sentinel for a missing level or location.
pub const UNKNOWN: &str = "Unbekannt";
/// Sentinel for a missing event title.
pub const UNTITLED: &str = "Ohne Titel";

/// One scraped match listing. Every field is always present; missing data
/// becomes a sentinel value, never an absent field.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// `dateIso:name:location`, stable across re-scrapes. Dedup key, not
    /// globally unique across unrelated sources.
    pub id: String,
    /// Extraction path: `"table"` or the card selector that matched.
    pub source: String,
    /// Raw discipline/category code, may be empty.
    pub discipline: String,
    /// Always a valid `YYYY-MM-DD`; rows without one are never emitted.
    pub date_iso: String,
    /// Original human-readable date text, for display.
    pub date_label: String,
    pub name: String,
    /// `"Level 1"`..`"Level 5"` or `"Unbekannt"`.
    pub level: String,
    pub location: String,
    /// Raw capacity/status text, display only.
    pub auslastung: String,
    pub url: Option<String>,
    /// RFC 3339, stamped once when the scrape result is finalized.
    pub scraped_at: String,
}
