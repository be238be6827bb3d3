use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use scraper::{ElementRef, Selector};

use crate::models::{UNKNOWN, UNTITLED};

static GERMAN_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{4}|\d{2})").expect("valid date regex"));
// Checked against uppercased text, most specific first.
static LEVEL_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bLEVEL\s*([1-5])\b").expect("valid level tag regex"));
static LEVEL_ABBREV_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bL\s*([1-5])\b").expect("valid level abbrev regex"));
static LEVEL_DIGIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([1-5])\b").expect("valid level digit regex"));

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts the first `D.M.YY[YY]` substring as `YYYY-MM-DD`. Two-digit
/// years are read as `20YY`. Any later dates in the text are ignored, and
/// candidates that are not real calendar dates yield `None`.
pub fn parse_german_date(text: &str) -> Option<String> {
    let caps = GERMAN_DATE_RE.captures(text)?;
    let day: u32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year_str = caps.get(3)?.as_str();
    let year: i32 = if year_str.len() == 2 {
        2000 + year_str.parse::<i32>().ok()?
    } else {
        year_str.parse().ok()?
    };
    NaiveDate::from_ymd_opt(year, month, day)?;
    Some(format!("{year:04}-{month:02}-{day:02}"))
}

/// The raw `D.M.YY[YY]` token, kept for display labels.
pub fn first_date_token(text: &str) -> Option<String> {
    GERMAN_DATE_RE
        .find(text)
        .map(|m| m.as_str().to_string())
}

/// Joins the parts, uppercases, and tries `LEVEL n`, then `L n`, then a
/// bare digit 1-5 anywhere. First match wins; the bare-digit fallback is a
/// deliberately weak heuristic and may fire on unrelated digits.
pub fn infer_level(parts: &[&str]) -> String {
    let combined = parts.join(" ").to_uppercase();
    for pattern in [&*LEVEL_TAG_RE, &*LEVEL_ABBREV_RE, &*LEVEL_DIGIT_RE] {
        if let Some(caps) = pattern.captures(&combined) {
            if let Some(digit) = caps.get(1) {
                return format!("Level {}", digit.as_str());
            }
        }
    }
    UNKNOWN.to_string()
}

fn join_non_empty(parts: &[&str], separator: &str) -> String {
    let kept: Vec<&str> = parts
        .iter()
        .filter(|part| !part.trim().is_empty())
        .copied()
        .collect();
    collapse_whitespace(&kept.join(separator))
}

pub fn normalize_location(parts: &[&str]) -> String {
    let combined = join_non_empty(parts, " | ");
    if combined.is_empty() {
        UNKNOWN.to_string()
    } else {
        combined
    }
}

pub fn normalize_name(parts: &[&str]) -> String {
    let combined = join_non_empty(parts, " - ");
    if combined.is_empty() {
        UNTITLED.to_string()
    } else {
        combined
    }
}

/// Dedup identity over the normalized triple.
pub fn record_id(date_iso: &str, name: &str, location: &str) -> String {
    format!("{date_iso}:{name}:{location}")
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(|node| {
            let cleaned = inner_text(node);
            if cleaned.is_empty() {
                None
            } else {
                Some(cleaned)
            }
        })
        .flatten()
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// Resolves `href` against `base`. A href that does not resolve is kept
/// verbatim rather than discarded.
pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href);
    }
    match reqwest::Url::parse(base).and_then(|b| b.join(&href)) {
        Ok(url) => Some(url.to_string()),
        Err(_) => Some(href),
    }
}

pub fn fetch_html(url: &str, user_agent: &str) -> Result<String> {
    let client = Client::builder()
        .timeout(Duration::from_secs(20))
        .user_agent(user_agent)
        .build()
        .context("building http client")?;

    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
        .send()
        .with_context(|| format!("request failed for {url}"))?;
    let response = response
        .error_for_status()
        .with_context(|| format!("non-success status for {url}"))?;
    response
        .text()
        .with_context(|| format!("unable to read response body for {url}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_runs_of_whitespace() {
        assert_eq!(collapse_whitespace("  a \t b\n c  "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn parses_german_date_inside_text() {
        assert_eq!(
            parse_german_date("Das Match ist am 5.7.24 in Musterstadt").as_deref(),
            Some("2024-07-05")
        );
        assert_eq!(parse_german_date("1.2.2024").as_deref(), Some("2024-02-01"));
        assert_eq!(parse_german_date("kein Datum hier"), None);
    }

    #[test]
    fn only_first_date_is_used() {
        assert_eq!(
            parse_german_date("1.2.24 bis 3.4.24").as_deref(),
            Some("2024-02-01")
        );
    }

    #[test]
    fn rejects_impossible_calendar_dates() {
        assert_eq!(parse_german_date("99.99.24"), None);
        assert_eq!(parse_german_date("31.2.24"), None);
    }

    #[test]
    fn finds_raw_date_token() {
        assert_eq!(
            first_date_token("irgendwann am 12.10.24 vielleicht").as_deref(),
            Some("12.10.24")
        );
        assert_eq!(first_date_token("nichts"), None);
    }

    #[test]
    fn level_inference_prefers_explicit_tags() {
        assert_eq!(infer_level(&["LEVEL 3 Match"]), "Level 3");
        assert_eq!(infer_level(&["Level 2 club 5"]), "Level 2");
        assert_eq!(infer_level(&["Kreismeisterschaft L 4"]), "Level 4");
    }

    #[test]
    fn level_inference_bare_digit_fallback_fires() {
        assert_eq!(infer_level(&["irrelevant text 4 more text"]), "Level 4");
    }

    #[test]
    fn level_inference_unknown_without_match() {
        assert_eq!(infer_level(&["keine Angabe"]), "Unbekannt");
        assert_eq!(infer_level(&["Stufe 7"]), "Unbekannt");
    }

    #[test]
    fn normalizers_fall_back_to_sentinels() {
        assert_eq!(normalize_name(&[""]), "Ohne Titel");
        assert_eq!(normalize_name(&["Cup", "Finale"]), "Cup - Finale");
        assert_eq!(normalize_location(&["", ""]), "Unbekannt");
        assert_eq!(normalize_location(&["Halle 3", "Berlin"]), "Halle 3 | Berlin");
    }

    #[test]
    fn empty_parts_are_dropped_before_joining() {
        assert_eq!(normalize_name(&["Cup", ""]), "Cup");
        assert_eq!(normalize_name(&["", "Finale"]), "Finale");
        assert_eq!(normalize_location(&["Halle 3", " ", "Berlin"]), "Halle 3 | Berlin");
        assert_eq!(normalize_location(&[" ", "\t"]), "Unbekannt");
    }

    #[test]
    fn resolves_relative_hrefs_against_base() {
        assert_eq!(
            absolute_url(
                "https://example.test/calendar",
                Some("/event?match=42".to_string())
            )
            .as_deref(),
            Some("https://example.test/event?match=42")
        );
    }

    #[test]
    fn keeps_absolute_and_unresolvable_hrefs() {
        assert_eq!(
            absolute_url("https://example.test/", Some("https://other.test/x".to_string()))
                .as_deref(),
            Some("https://other.test/x")
        );
        assert_eq!(
            absolute_url("not a base url", Some("event.html".to_string())).as_deref(),
            Some("event.html")
        );
    }

    #[test]
    fn record_id_joins_triple() {
        assert_eq!(
            record_id("2024-07-05", "Cup A", "Berlin"),
            "2024-07-05:Cup A:Berlin"
        );
    }
}
