use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::base;
use crate::models::EventRecord;

// Container shapes that typically wrap a single event block. Each selector
// is scanned independently; duplicates across selectors are left for the
// downstream dedup step.
const CARD_SELECTOR_NAMES: [&str; 5] = ["article", ".event", ".match", ".calendar-item", ".card"];

static CARD_SELECTORS: Lazy<Vec<(&'static str, Selector)>> = Lazy::new(|| {
    CARD_SELECTOR_NAMES
        .into_iter()
        .map(|name| (name, Selector::parse(name).expect("card selector")))
        .collect()
});
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4, .title").expect("title selector"));
static LOCATION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".location, .ort, .venue").expect("location selector"));
static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));
static LOCATION_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:Ort|Location)\s*:?\s*([^|\n]+)").expect("location label"));

/// Extracts one record per card-like container that carries a parseable
/// date anywhere in its text.
pub fn extract(document: &Html, base_url: &str) -> Vec<EventRecord> {
    let mut records = Vec::new();

    for (selector_name, selector) in CARD_SELECTORS.iter() {
        for container in document.select(selector) {
            let whole_text = base::inner_text(container);
            let Some(date_iso) = base::parse_german_date(&whole_text) else {
                continue;
            };

            let title = base::first_text(&container, &TITLE_SELECTOR)
                .unwrap_or_else(|| whole_text.split('|').next().unwrap_or("").to_string());
            let level = base::infer_level(&[&whole_text, &title]);
            let location_text = base::first_text(&container, &LOCATION_SELECTOR).or_else(|| {
                LOCATION_LABEL_RE
                    .captures(&whole_text)
                    .and_then(|caps| caps.get(1))
                    .map(|m| base::collapse_whitespace(m.as_str()))
            });

            let href = base::first_attr(&container, &ANCHOR_SELECTOR, "href");
            let url = base::absolute_url(base_url, href);

            let name = base::normalize_name(&[&title]);
            let location = base::normalize_location(&[location_text.as_deref().unwrap_or("")]);
            let date_label =
                base::first_date_token(&whole_text).unwrap_or_else(|| date_iso.clone());

            records.push(EventRecord {
                id: base::record_id(&date_iso, &name, &location),
                source: selector_name.to_string(),
                discipline: String::new(),
                date_iso,
                date_label,
                name,
                level,
                location,
                auslastung: String::new(),
                url,
                scraped_at: String::new(),
            });
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_all(html: &str, base_url: &str) -> Vec<EventRecord> {
        extract(&Html::parse_document(html), base_url)
    }

    #[test]
    fn reads_structured_card_children() {
        let html = r#"
        <article>
            <h3>Winterpokal Level 2</h3>
            <span class="ort">Dresden</span>
            <p>Anmeldung bis 15.1.24 offen</p>
            <a href="/event?match=11">Details</a>
        </article>
        "#;
        let records = extract_all(html, "https://example.test/");
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.source, "article");
        assert_eq!(record.name, "Winterpokal Level 2");
        assert_eq!(record.level, "Level 2");
        assert_eq!(record.location, "Dresden");
        assert_eq!(record.date_iso, "2024-01-15");
        assert_eq!(record.date_label, "15.1.24");
        assert_eq!(record.url.as_deref(), Some("https://example.test/event?match=11"));
        assert_eq!(record.discipline, "");
        assert_eq!(record.auslastung, "");
    }

    #[test]
    fn falls_back_to_text_heuristics() {
        let html = r#"<div class="event">Herbstpokal | 3.10.24 | Ort: Musterstadt</div>"#;
        let records = extract_all(html, "https://example.test/");
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.source, ".event");
        assert_eq!(record.name, "Herbstpokal");
        assert_eq!(record.location, "Musterstadt");
        assert_eq!(record.date_iso, "2024-10-03");
        assert_eq!(record.level, "Level 3");
        assert!(record.url.is_none());
    }

    #[test]
    fn containers_without_date_are_skipped() {
        let html = r#"<article><h2>Vereinsabend</h2><span class="ort">Kiel</span></article>"#;
        assert!(extract_all(html, "https://example.test/").is_empty());
    }

    #[test]
    fn same_event_under_two_selectors_yields_two_candidates() {
        let html = r#"
        <article class="card">
            <h2>Doppelt</h2>
            <span class="ort">Bonn</span>
            <p>Am 2.3.24</p>
        </article>
        "#;
        let records = extract_all(html, "https://example.test/");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source, "article");
        assert_eq!(records[1].source, ".card");
        assert_eq!(records[0].id, records[1].id);
    }
}
