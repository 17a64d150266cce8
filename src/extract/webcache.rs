//! WebCache (`WebCacheV*.dat`) extractor for the IE/Edge family.
//!
//! The artifact is an ESE database that the host's cache service keeps
//! locked, so the file is staged through the snapshot module first. History
//! records live in numbered `Container_<id>` tables; the `Containers`
//! catalog says which of those hold history.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

use libesedb::{EseDb, Value as EseValue};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use tracing::debug;

use crate::config::{Browser, EseSpec};
use crate::extract::{ExtractError, Extraction, RecordStream};
use crate::snapshot;
use crate::timestamp;

const URLS_COLUMNS: [&str; 4] = ["visit_count", "redirect_urls", "id", "url"];
const VISITS_COLUMNS: [&str; 3] = ["visit_date", "id", "url_id"];

/// Cache entries embed the URL behind a `<prefix>@` token; only the
/// `http...` tail is history proper.
static URL_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(http[\w:_\-/.]+)").expect("url token pattern"));

/// One raw history record as read from a container table.
#[derive(Debug, Clone)]
struct RawEntry {
    container_id: i64,
    url: String,
    accessed_filetime: i64,
    access_count: i64,
    redirect_urls: Option<String>,
}

pub fn extract(
    path: &Path,
    staging_dir: &Path,
    fallback_names: &[String],
    spec: &EseSpec,
    cutoff: f64,
) -> Result<Extraction, ExtractError> {
    let staged = snapshot::stage_locked_artifact(path, staging_dir, fallback_names)?;
    let db = EseDb::open(staged.to_string_lossy().as_ref()).map_err(map_ese_err)?;

    let containers = db.table_by_name("Containers").map_err(|e| {
        ExtractError::Format(format!("missing Containers catalog table: {e}"))
    })?;

    let mut entries = Vec::new();
    for record in containers.iter_records().map_err(map_ese_err)? {
        let Ok(record) = record else { continue };
        let name = record
            .value(spec.containers_name_column)
            .ok()
            .and_then(text_value);
        if name.as_deref().map(str::trim) != Some("History") {
            continue;
        }
        let Some(container_id) = record
            .value(spec.containers_id_column)
            .ok()
            .and_then(int_value)
        else {
            continue;
        };

        let table_name = format!("Container_{container_id}");
        let history = db.table_by_name(&table_name).map_err(|e| {
            ExtractError::Format(format!("missing history container {table_name}: {e}"))
        })?;
        for record in history.iter_records().map_err(map_ese_err)? {
            let Ok(record) = record else { continue };
            let Some(url) = record.value(spec.url_column).ok().and_then(text_value) else {
                continue;
            };
            let Some(accessed) = record
                .value(spec.accessed_time_column)
                .ok()
                .and_then(int_value)
            else {
                continue;
            };
            let access_count = record
                .value(spec.access_count_column)
                .ok()
                .and_then(int_value)
                .unwrap_or(0);
            let redirect_urls = record
                .value(spec.redirect_urls_column)
                .ok()
                .and_then(text_value);
            entries.push(RawEntry {
                container_id,
                url,
                accessed_filetime: accessed,
                access_count,
                redirect_urls,
            });
        }
    }

    debug!("webcache source yielded {} raw history records", entries.len());
    Ok(fold_entries(entries, cutoff))
}

/// Collapse raw records into canonical streams. Duplicate URLs merge into
/// one row; a repeat sighting adds its access count only when the increment
/// is positive (zero and negative deltas are ignored as reset markers) and
/// contributes no extra visit row. Visit keys combine the container id with
/// the per-run sequence number to stay unique across containers.
fn fold_entries(entries: Vec<RawEntry>, cutoff: f64) -> Extraction {
    struct UrlAccum {
        id: i64,
        access_count: i64,
        redirect_urls: Option<String>,
    }

    let mut order: Vec<String> = Vec::new();
    let mut urls: HashMap<String, UrlAccum> = HashMap::new();
    let mut visit_rows = Vec::new();
    let mut next_id: i64 = 1;

    for entry in entries {
        let Some(caps) = URL_TOKEN_RE.captures(&entry.url) else {
            continue;
        };
        let url = caps[1].to_string();
        let date = timestamp::to_unix(Some(Browser::Ie11), entry.accessed_filetime as f64);
        if date < cutoff {
            continue;
        }

        if let Some(accum) = urls.get_mut(&url) {
            if entry.access_count > 0 {
                accum.access_count += entry.access_count;
            }
            continue;
        }

        let url_id = next_id;
        next_id += 1;
        let visit_id = format!("{}{}", entry.container_id, url_id)
            .parse::<i64>()
            .unwrap_or(url_id);
        visit_rows.push(vec![
            Value::Integer(date as i64),
            Value::Integer(visit_id),
            Value::Integer(url_id),
        ]);
        order.push(url.clone());
        urls.insert(
            url,
            UrlAccum {
                id: url_id,
                access_count: entry.access_count,
                redirect_urls: entry.redirect_urls,
            },
        );
    }

    let url_rows = order
        .into_iter()
        .filter_map(|url| {
            let accum = urls.remove(&url)?;
            Some(vec![
                Value::Integer(accum.access_count),
                accum
                    .redirect_urls
                    .map(Value::Text)
                    .unwrap_or(Value::Null),
                Value::Integer(accum.id),
                Value::Text(url),
            ])
        })
        .collect();

    Extraction {
        urls: RecordStream {
            columns: URLS_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: url_rows,
        },
        visits: RecordStream {
            columns: VISITS_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: visit_rows,
        },
    }
}

fn map_ese_err(e: std::io::Error) -> ExtractError {
    match e.kind() {
        ErrorKind::PermissionDenied => ExtractError::Permission(e.to_string()),
        _ => ExtractError::Format(format!("unreadable ESE database: {e}")),
    }
}

fn text_value(value: EseValue) -> Option<String> {
    match value {
        EseValue::Text(s) | EseValue::LargeText(s) => Some(s),
        _ => None,
    }
}

fn int_value(value: EseValue) -> Option<i64> {
    match value {
        EseValue::I16(v) => Some(v as i64),
        EseValue::I32(v) => Some(v as i64),
        EseValue::I64(v) => Some(v),
        EseValue::U8(v) => Some(v as i64),
        EseValue::U16(v) => Some(v as i64),
        EseValue::U32(v) => Some(v as i64),
        EseValue::Currency(v) => Some(v),
        _ => None,
    }
}
