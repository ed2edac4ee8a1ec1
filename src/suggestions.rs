//! Starter questions derived from the headers of the loaded sheets.

use crate::dataset::Dataset;

const MAX_SUGGESTIONS: usize = 4;

const TIME_KEYWORDS: &[&str] = &["date", "time", "year", "month", "fecha", "año", "mes"];
const REVENUE_KEYWORDS: &[&str] = &[
    "sales", "price", "cost", "total", "amount", "revenue", "venta", "precio", "costo",
];
const CATEGORY_KEYWORDS: &[&str] = &[
    "category", "type", "status", "group", "categoria", "tipo", "estado", "grupo",
];

const GENERIC_SUGGESTIONS: [&str; 3] = [
    "Generate a visual report of the data",
    "Identify the 3 most important findings",
    "Summarize the structure of the loaded files",
];

fn any_header_matches(headers: &[String], keywords: &[&str]) -> bool {
    headers
        .iter()
        .any(|h| keywords.iter().any(|k| h.contains(k)))
}

/// Up to four suggestions for the active sheets, or three generic ones when no header
/// hints at a time, revenue or category dimension. Empty when nothing is loaded.
pub fn suggest(datasets: &[Dataset]) -> Vec<String> {
    if datasets.is_empty() {
        return Vec::new();
    }

    let mut suggestions: Vec<String> = Vec::new();
    let mut push = |s: String| {
        if !suggestions.contains(&s) {
            suggestions.push(s);
        }
    };

    for sheet in datasets.iter().flat_map(|d| d.active_sheets()) {
        let headers: Vec<String> = sheet.headers.iter().map(|h| h.to_lowercase()).collect();

        if any_header_matches(&headers, TIME_KEYWORDS) {
            push(format!("Analyze the trend over time in {}", sheet.name));
        }
        if any_header_matches(&headers, REVENUE_KEYWORDS) {
            push(format!("Revenue report for {}", sheet.name));
        }
        if any_header_matches(&headers, CATEGORY_KEYWORDS) {
            push(format!("Breakdown by category in {}", sheet.name));
        }
    }

    if suggestions.is_empty() {
        return GENERIC_SUGGESTIONS.iter().map(|s| s.to_string()).collect();
    }
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}
