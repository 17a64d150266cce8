//! Relational-schema extractor covering the Chrome, Firefox and Safari
//! (`History.db`) families through one BrowserSpec-driven strategy.

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::config::RelationalSpec;
use crate::extract::{ExtractError, Extraction, RecordStream};

/// Read both record streams from a browser's own database. The SELECT list
/// comes straight from the spec's column map; its timestamp expressions
/// already yield Unix seconds, so the cutoff is applied inside the source
/// query and oversized histories never reach memory.
pub fn extract(
    path: &Path,
    spec: &RelationalSpec,
    cutoff: f64,
) -> Result<Extraction, ExtractError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| ExtractError::Permission(format!("{}: {e}", path.display())))?;

    let urls_query = format!(
        "SELECT {} FROM {}, {} WHERE {} AND ({}) >= ?1 AND {} NOT LIKE 'file:%'",
        select_list(&spec.urls_columns),
        spec.urls_table,
        spec.visits_table,
        spec.join,
        spec.time_expr,
        spec.url_expr,
    );
    let visits_query = format!(
        "SELECT {} FROM {}, {} WHERE {} AND ({}) >= ?1 AND {} NOT LIKE 'file:%'",
        select_list(&spec.visits_columns),
        spec.visits_table,
        spec.urls_table,
        spec.join,
        spec.time_expr,
        spec.url_expr,
    );

    let urls = run_query(&conn, &urls_query, &spec.urls_columns, cutoff)?;
    let visits = run_query(&conn, &visits_query, &spec.visits_columns, cutoff)?;
    debug!(
        "relational source yielded {} url rows, {} visit rows",
        urls.rows.len(),
        visits.rows.len()
    );

    Ok(Extraction { urls, visits })
}

fn select_list(columns: &[crate::config::ColumnMap]) -> String {
    columns
        .iter()
        .map(|c| c.source.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn run_query(
    conn: &Connection,
    query: &str,
    columns: &[crate::config::ColumnMap],
    cutoff: f64,
) -> Result<RecordStream, ExtractError> {
    let mut stmt = conn
        .prepare(query)
        .map_err(|e| ExtractError::Format(format!("source schema mismatch: {e}")))?;
    let column_count = columns.len();
    let mapped = stmt
        .query_map([cutoff], |row| {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(row.get::<_, Value>(i)?);
            }
            Ok(values)
        })
        .map_err(|e| ExtractError::Format(format!("source query failed: {e}")))?;

    let mut rows = Vec::new();
    for row in mapped {
        rows.push(row.map_err(|e| ExtractError::Format(format!("source row unreadable: {e}")))?);
    }

    Ok(RecordStream {
        columns: columns.iter().map(|c| c.canonical.clone()).collect(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Browser, load_specs};
    use crate::timestamp;
    use chrono::Utc;
    use tempfile::tempdir;

    fn chrome_native(unix_secs: i64) -> i64 {
        (unix_secs + 11_644_473_600) * 1_000_000
    }

    fn build_chrome_fixture(path: &std::path::Path, visit_unix: &[(i64, &str)]) {
        let conn = Connection::open(path).expect("conn");
        conn.execute_batch(
            "CREATE TABLE urls (id INTEGER PRIMARY KEY, url TEXT, title TEXT,
                 visit_count INTEGER, typed_count INTEGER, last_visit_time INTEGER,
                 hidden INTEGER DEFAULT 0);
             CREATE TABLE visits (id INTEGER PRIMARY KEY, url INTEGER,
                 visit_time INTEGER, from_visit INTEGER, transition INTEGER);",
        )
        .expect("schema");
        for (i, (unix, url)) in visit_unix.iter().enumerate() {
            let id = i as i64 + 1;
            conn.execute(
                "INSERT INTO urls (id, url, title, visit_count, typed_count, last_visit_time)
                 VALUES (?1, ?2, ?3, 1, 0, ?4)",
                (id, url, "title", chrome_native(*unix)),
            )
            .expect("url row");
            conn.execute(
                "INSERT INTO visits (id, url, visit_time, from_visit, transition)
                 VALUES (?1, ?1, ?2, 0, 1)",
                (id, chrome_native(*unix)),
            )
            .expect("visit row");
        }
    }

    #[test]
    fn cutoff_drops_old_visits() {
        let dir = tempdir().expect("tempdir");
        let db = dir.path().join("History");
        let now = Utc::now().timestamp();
        build_chrome_fixture(
            &db,
            &[
                (now - 10 * 86_400, "https://fresh.example.com/"),
                (now - 90 * 86_400, "https://stale.example.com/"),
            ],
        );

        let specs = load_specs(None).expect("specs");
        let spec = specs
            .specs
            .for_browser(Browser::Chrome)
            .expect("chrome")
            .relational
            .clone()
            .expect("relational");
        let extraction =
            extract(&db, &spec, timestamp::default_cutoff(60)).expect("extract");

        assert_eq!(extraction.visits.rows.len(), 1);
        assert_eq!(extraction.urls.rows.len(), 1);
        let url = &extraction.urls.rows[0][1];
        assert_eq!(url, &Value::Text("https://fresh.example.com/".to_string()));
    }

    #[test]
    fn file_scheme_urls_are_excluded() {
        let dir = tempdir().expect("tempdir");
        let db = dir.path().join("History");
        let now = Utc::now().timestamp();
        build_chrome_fixture(
            &db,
            &[
                (now - 5 * 86_400, "https://example.com/"),
                (now - 5 * 86_400, "file:///home/user/notes.html"),
            ],
        );

        let specs = load_specs(None).expect("specs");
        let spec = specs
            .specs
            .for_browser(Browser::Chrome)
            .expect("chrome")
            .relational
            .clone()
            .expect("relational");
        let extraction =
            extract(&db, &spec, timestamp::default_cutoff(60)).expect("extract");

        assert_eq!(extraction.urls.rows.len(), 1);
        assert_eq!(
            extraction.urls.rows[0][1],
            Value::Text("https://example.com/".to_string())
        );
        assert_eq!(extraction.visits.rows.len(), 1);
    }

    #[test]
    fn converted_visit_dates_are_unix_seconds() {
        let dir = tempdir().expect("tempdir");
        let db = dir.path().join("History");
        let visit_unix = Utc::now().timestamp() - 86_400;
        build_chrome_fixture(&db, &[(visit_unix, "https://example.com/")]);

        let specs = load_specs(None).expect("specs");
        let spec = specs
            .specs
            .for_browser(Browser::Chrome)
            .expect("chrome")
            .relational
            .clone()
            .expect("relational");
        let extraction =
            extract(&db, &spec, timestamp::default_cutoff(60)).expect("extract");

        let date_idx = extraction
            .visits
            .columns
            .iter()
            .position(|c| c == "visit_date")
            .expect("visit_date column");
        match &extraction.visits.rows[0][date_idx] {
            Value::Integer(v) => assert_eq!(*v, visit_unix),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn unexpected_schema_is_a_format_failure() {
        let dir = tempdir().expect("tempdir");
        let db = dir.path().join("History");
        let conn = Connection::open(&db).expect("conn");
        conn.execute_batch("CREATE TABLE nothing (id INTEGER);")
            .expect("schema");
        drop(conn);

        let specs = load_specs(None).expect("specs");
        let spec = specs
            .specs
            .for_browser(Browser::Chrome)
            .expect("chrome")
            .relational
            .clone()
            .expect("relational");
        let err = extract(&db, &spec, 0.0).expect_err("should fail");
        assert!(matches!(err, ExtractError::Format(_)));
    }
}
