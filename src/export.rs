//! Semicolon-delimited export of the full canonical join.

use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::session::Session;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export write error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

const HEADER: [&str; 14] = [
    "url_id",
    "visits_id",
    "url",
    "title",
    "rev_host",
    "visit_count",
    "typed",
    "last_visit_date",
    "redirect_urls",
    "referrer",
    "visit_date",
    "visit_type",
    "browser",
    "operation system",
];

/// Write every url × visit row to `output`, augmented with the active
/// browser and host OS. Returns the number of data rows written.
pub fn export(session: &Session, output: &Path) -> Result<usize, ExportError> {
    let conn = session.store.conn();
    let mut stmt = conn
        .prepare(
            "SELECT url_id, visits.id, url, title, rev_host, visit_count, typed,
                    last_visit_date, redirect_urls, referrer, visit_date, visit_type
             FROM visits, urls WHERE visits.url_id = urls.id",
        )
        .map_err(StoreError::from)?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(output)?;
    writer.write_record(HEADER)?;

    let mut rows = 0;
    let mapped = stmt
        .query_map([], |row| {
            let mut fields = Vec::with_capacity(HEADER.len());
            for i in 0..12 {
                fields.push(field_text(row, i)?);
            }
            Ok(fields)
        })
        .map_err(StoreError::from)?;
    for row in mapped {
        let mut fields = row.map_err(StoreError::from)?;
        fields.push(session.browser.label().to_string());
        fields.push(session.os_desc.clone());
        writer.write_record(&fields)?;
        rows += 1;
    }
    writer.flush()?;
    info!("exported {rows} rows to {}", output.display());
    Ok(rows)
}

fn field_text(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<String> {
    use rusqlite::types::ValueRef;
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => String::new(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => v.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).to_string(),
        ValueRef::Blob(_) => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Browser, load_specs};
    use crate::store::Store;
    use tempfile::tempdir;

    fn test_session() -> Session {
        let specs = load_specs(None).expect("specs");
        Session {
            browser: Browser::Firefox,
            spec: specs
                .specs
                .for_browser(Browser::Firefox)
                .expect("spec")
                .clone(),
            store: Store::in_memory().expect("store"),
            os_desc: "test os".to_string(),
        }
    }

    #[test]
    fn writes_joined_rows_with_header() {
        let session = test_session();
        session
            .store
            .conn()
            .execute_batch(
                "INSERT INTO urls (id, url, title, visit_count) VALUES
                     (1, 'https://example.com/', 'Example', 2);
                 INSERT INTO visits (id, url_id, visit_date) VALUES
                     (1, 1, 1600000000), (2, 1, 1600000100);",
            )
            .expect("fixture");

        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("export.csv");
        let rows = export(&session, &path).expect("export");
        assert_eq!(rows, 2);

        let contents = std::fs::read_to_string(&path).expect("read");
        let mut lines = contents.lines();
        let header = lines.next().expect("header");
        assert!(header.starts_with("url_id;visits_id;url;"));
        let first = lines.next().expect("row");
        assert!(first.contains("https://example.com/"));
        assert!(first.contains("firefox"));
        assert!(first.ends_with("test os"));
    }

    #[test]
    fn empty_store_exports_zero_rows() {
        let session = test_session();
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("export.csv");
        assert_eq!(export(&session, &path).expect("export"), 0);
    }
}
