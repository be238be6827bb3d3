use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::base;
use crate::models::EventRecord;

static TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("table selector"));
static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("row selector"));
static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("th, td").expect("cell selector"));
static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));

// A row qualifies as a header when its joined cell text mentions any of
// the known column names. Tables without such a row are unrelated to the
// event calendar and are skipped silently.
static HEADER_HINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)disziplin|veranstalt|datum|auslastung|ort").expect("header hint"));
static DISCIPLINE_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)disziplin|discipline").expect("discipline header"));
static LEVEL_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)lv\.?|lv\b|level").expect("level header"));
static NAME_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)veranstaltung|veranstal|veranstalt").expect("name header"));
static LOCATION_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ort|location|venue").expect("location header"));
static DATE_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)datum|date").expect("date header"));
static CAPACITY_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)auslastung|capacity|fill").expect("capacity header"));

// First-cell prefixes marking the fixed ipscmatch column order
// Disziplin | Lv. | Reg. | Veranstaltung | Ort | Datum | Status | Auslastung,
// used when the header row is malformed or missing the discipline column.
static DISCIPLINE_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(HG|PCC|MR|SG|RF|KK|\.22LR|Long Range|RF and PCC|HG, PCC|SG, RF)")
        .expect("discipline code")
});

#[derive(Debug, Default)]
struct ColumnMap {
    discipline: Option<usize>,
    level: Option<usize>,
    name: Option<usize>,
    location: Option<usize>,
    date: Option<usize>,
    capacity: Option<usize>,
}

impl ColumnMap {
    fn from_header(cells: &[String]) -> Self {
        let find = |re: &Regex| cells.iter().position(|cell| re.is_match(cell));
        Self {
            discipline: find(&DISCIPLINE_HEADER_RE),
            level: find(&LEVEL_HEADER_RE),
            name: find(&NAME_HEADER_RE),
            location: find(&LOCATION_HEADER_RE),
            date: find(&DATE_HEADER_RE),
            capacity: find(&CAPACITY_HEADER_RE),
        }
    }
}

/// Extracts one record per data row of every table that carries a
/// recognizable header row.
pub fn extract(document: &Html, base_url: &str) -> Vec<EventRecord> {
    let mut records = Vec::new();

    for table in document.select(&TABLE_SELECTOR) {
        // Descendant select: rows of nested tables land here too and are
        // read with the outer column map. The source's calendar tables
        // are flat.
        let rows: Vec<ElementRef> = table.select(&ROW_SELECTOR).collect();

        let header_pos = rows.iter().position(|row| {
            let joined = row
                .select(&CELL_SELECTOR)
                .map(|cell| base::inner_text(cell).to_lowercase())
                .collect::<Vec<_>>()
                .join(" ");
            HEADER_HINT_RE.is_match(&joined)
        });
        let Some(header_pos) = header_pos else {
            continue;
        };

        let header_cells: Vec<String> = rows[header_pos]
            .select(&CELL_SELECTOR)
            .map(|cell| base::inner_text(cell).to_lowercase())
            .collect();
        if header_cells.is_empty() {
            continue;
        }
        let columns = ColumnMap::from_header(&header_cells);

        for row in &rows[header_pos + 1..] {
            if let Some(record) = extract_row(*row, &columns, base_url) {
                records.push(record);
            }
        }
    }

    records
}

fn extract_row(row: ElementRef<'_>, columns: &ColumnMap, base_url: &str) -> Option<EventRecord> {
    let cell_refs: Vec<ElementRef> = row.select(&CELL_SELECTOR).collect();
    let cells: Vec<String> = cell_refs.iter().map(|cell| base::inner_text(*cell)).collect();
    if cells.len() < 2 {
        return None;
    }

    let mut discipline = columns
        .discipline
        .and_then(|i| cells.get(i))
        .cloned()
        .unwrap_or_default();
    let mut level = match columns.level {
        Some(i) => base::infer_level(&[cell_at(&cells, i)]),
        None => base::infer_level(&[&cells.join(" ")]),
    };
    let mut name = match columns.name {
        Some(i) => base::normalize_name(&[cell_at(&cells, i)]),
        None => base::normalize_name(&[cell_at(&cells, 1)]),
    };
    let mut location = match columns.location {
        Some(i) => base::normalize_location(&[cell_at(&cells, i)]),
        None => base::normalize_location(&[&cells[2..].join(" ")]),
    };
    let mut date_label = match columns.date {
        Some(i) => cell_at(&cells, i).to_string(),
        None => cells
            .iter()
            .find(|cell| base::first_date_token(cell).is_some())
            .cloned()
            .unwrap_or_default(),
    };
    let mut date_iso = base::parse_german_date(&date_label)
        .or_else(|| base::parse_german_date(&cells.join(" ")));
    let mut auslastung = columns
        .capacity
        .and_then(|i| cells.get(i))
        .cloned()
        .unwrap_or_default();

    // Positional override for the known fixed layout.
    if discipline.is_empty() && DISCIPLINE_CODE_RE.is_match(&cells[0]) {
        discipline = cells[0].clone();
        level = base::infer_level(&[cell_at(&cells, 1)]);
        name = base::normalize_name(&[first_non_empty(&cells, &[3, 2])]);
        location = base::normalize_location(&[first_non_empty(&cells, &[4, 3])]);
        let positional_label = first_non_empty(&cells, &[5]);
        if !positional_label.is_empty() {
            date_label = positional_label.to_string();
        }
        date_iso = base::parse_german_date(&date_label).or(date_iso);
        let positional_capacity = first_non_empty(&cells, &[7, 6]);
        if !positional_capacity.is_empty() {
            auslastung = positional_capacity.to_string();
        }
    }

    // The single hard filter: no parseable date, no record.
    let date_iso = date_iso?;

    let url = base::absolute_url(base_url, find_row_link(row, &cell_refs, columns));

    Some(EventRecord {
        id: base::record_id(&date_iso, &name, &location),
        source: "table".to_string(),
        discipline,
        date_iso,
        date_label,
        name,
        level,
        location,
        auslastung,
        url,
        scraped_at: String::new(),
    })
}

// Anchor in the event-name cell, then any anchor whose href carries the
// match-identifier marker, then the first anchor in the row.
fn find_row_link(
    row: ElementRef<'_>,
    cell_refs: &[ElementRef<'_>],
    columns: &ColumnMap,
) -> Option<String> {
    if let Some(cell) = columns.name.and_then(|i| cell_refs.get(i)) {
        if let Some(href) = base::first_attr(cell, &ANCHOR_SELECTOR, "href") {
            return Some(href);
        }
    }

    if let Some(href) = row
        .select(&ANCHOR_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.contains("match="))
    {
        return Some(href.to_string());
    }

    row.select(&ANCHOR_SELECTOR)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

fn cell_at(cells: &[String], index: usize) -> &str {
    cells.get(index).map(String::as_str).unwrap_or("")
}

fn first_non_empty<'a>(cells: &'a [String], indexes: &[usize]) -> &'a str {
    indexes
        .iter()
        .filter_map(|&i| cells.get(i))
        .find(|cell| !cell.is_empty())
        .map(String::as_str)
        .unwrap_or("")
}
