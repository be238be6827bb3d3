pub mod base;
pub mod cards;
pub mod tables;

use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use scraper::Html;

use crate::models::EventRecord;

/// Runs both extractors over the document, collapses duplicates by id
/// (table results first, first-seen-wins), and stamps every survivor with
/// `now`. Pure over its inputs.
pub fn extract_matches(html: &str, base_url: &str, now: DateTime<Utc>) -> Vec<EventRecord> {
    let document = Html::parse_document(html);
    let mut candidates = tables::extract(&document, base_url);
    candidates.extend(cards::extract(&document, base_url));
    dedup_first_seen(candidates, now)
}

fn dedup_first_seen(candidates: Vec<EventRecord>, now: DateTime<Utc>) -> Vec<EventRecord> {
    let stamp = now.to_rfc3339();
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for mut record in candidates {
        if seen.insert(record.id.clone()) {
            record.scraped_at = stamp.clone();
            records.push(record);
        }
    }

    records
}

/// Fetches the calendar page and extracts all match records.
pub fn scrape_matches(scan_url: &str, user_agent: &str) -> Result<Vec<EventRecord>> {
    let html = base::fetch_html(scan_url, user_agent)?;
    Ok(extract_matches(&html, scan_url, Utc::now()))
}
