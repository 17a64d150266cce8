//! Legacy Safari `History.plist` extractor.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::types::Value;
use tracing::debug;

use crate::config::Browser;
use crate::domain;
use crate::extract::{ExtractError, Extraction, RecordStream};
use crate::timestamp;

const URLS_COLUMNS: [&str; 6] = [
    "id",
    "last_visit_date",
    "redirect_urls",
    "title",
    "url",
    "visit_count",
];
const VISITS_COLUMNS: [&str; 2] = ["url_id", "visit_date"];

/// Parse the property list into the two canonical streams. One canonical id
/// is assigned per unique URL value in file order; repeat sightings only add
/// a visit row.
pub fn extract(path: &Path, cutoff: f64) -> Result<Extraction, ExtractError> {
    let root = plist::Value::from_file(path)
        .map_err(|e| ExtractError::Format(format!("{}: {e}", path.display())))?;
    let entries = root
        .as_dictionary()
        .and_then(|d| d.get("WebHistoryDates"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| ExtractError::Format("missing WebHistoryDates list".to_string()))?;

    let mut url_rows = Vec::new();
    let mut visit_rows = Vec::new();
    let mut seen: HashMap<String, i64> = HashMap::new();
    let mut next_id: i64 = 1;

    for entry in entries {
        let Some(dict) = entry.as_dictionary() else {
            return Err(ExtractError::Format(
                "history entry is not a dictionary".to_string(),
            ));
        };
        // The URL sits under the empty-string key in this format.
        let Some(url) = dict.get("").and_then(|v| v.as_string()) else {
            continue;
        };
        let Some(raw_date) = visited_date(dict) else {
            continue;
        };
        let date = timestamp::to_unix(Some(Browser::Safari), raw_date);
        if !domain::is_navigable(url) || date < cutoff {
            continue;
        }

        if let Some(url_id) = seen.get(url) {
            visit_rows.push(vec![Value::Integer(*url_id), Value::Integer(date as i64)]);
            continue;
        }

        let url_id = next_id;
        next_id += 1;
        seen.insert(url.to_string(), url_id);

        let title = dict
            .get("title")
            .and_then(|v| v.as_string())
            .map(|s| Value::Text(s.to_string()))
            .unwrap_or(Value::Null);
        let visit_count = dict
            .get("visitCount")
            .and_then(|v| v.as_signed_integer())
            .unwrap_or(1);
        let redirect_urls = dict
            .get("redirectURLs")
            .and_then(|v| v.as_array())
            .map(|urls| {
                urls.iter()
                    .filter_map(|u| u.as_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .map(Value::Text)
            .unwrap_or(Value::Null);

        url_rows.push(vec![
            Value::Integer(url_id),
            Value::Integer(date as i64),
            redirect_urls,
            title,
            Value::Text(url.to_string()),
            Value::Integer(visit_count),
        ]);
        visit_rows.push(vec![Value::Integer(url_id), Value::Integer(date as i64)]);
    }

    debug!(
        "plist source yielded {} url rows, {} visit rows",
        url_rows.len(),
        visit_rows.len()
    );

    Ok(Extraction {
        urls: RecordStream {
            columns: URLS_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: url_rows,
        },
        visits: RecordStream {
            columns: VISITS_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: visit_rows,
        },
    })
}

/// `lastVisitedDate` is stored as a stringified float in this format; accept
/// a real number too.
fn visited_date(dict: &plist::Dictionary) -> Option<f64> {
    let value = dict.get("lastVisitedDate")?;
    if let Some(s) = value.as_string() {
        return s.trim().parse().ok();
    }
    value.as_real()
}
