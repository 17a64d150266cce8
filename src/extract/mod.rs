pub mod plist;
pub mod sqlite;
pub mod webcache;

use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use thiserror::Error;
use tracing::info;

use crate::config::{Browser, BrowserSpec};
use crate::snapshot;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("history artifact not found")]
    NotFound,
    #[error("file not readable: {0}")]
    Permission(String),
    #[error("unexpected source format: {0}")]
    Format(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One normalized record stream, aligned to canonical column names. Row
/// values are positionally matched to `columns`.
#[derive(Debug, Clone)]
pub struct RecordStream {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// The two streams every extractor produces.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub urls: RecordStream,
    pub visits: RecordStream,
}

/// Run the extractor for one browser family. All extractors filter by the
/// cutoff themselves and never return partially-populated data: any failure
/// discards the whole extraction.
pub fn extract(
    browser: Browser,
    spec: &BrowserSpec,
    path: &Path,
    staging_dir: &Path,
    cutoff: f64,
) -> Result<Extraction, ExtractError> {
    info!(
        "extracting {} history from {}",
        browser.label(),
        path.display()
    );
    match browser {
        Browser::Chrome => {
            let relational = relational_spec(spec)?;
            let staged = stage_copy(path, staging_dir)?;
            sqlite::extract(&staged, relational, cutoff)
        }
        Browser::Firefox => {
            let relational = relational_spec(spec)?;
            sqlite::extract(path, relational, cutoff)
        }
        Browser::Safari => {
            // Two historical layouts; branch on the artifact file name.
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if file_name == "History.plist" {
                plist::extract(path, cutoff)
            } else {
                let relational = relational_spec(spec)?;
                let staged = stage_copy(path, staging_dir)?;
                sqlite::extract(&staged, relational, cutoff)
            }
        }
        Browser::Ie11 => {
            let ese = spec
                .ese
                .as_ref()
                .ok_or_else(|| ExtractError::Format("missing ese column map".to_string()))?;
            webcache::extract(path, staging_dir, &spec.file_names, ese, cutoff)
        }
    }
}

fn relational_spec(spec: &BrowserSpec) -> Result<&crate::config::RelationalSpec, ExtractError> {
    spec.relational
        .as_ref()
        .ok_or_else(|| ExtractError::Format("missing relational column map".to_string()))
}

/// Copy a possibly-locked artifact into the staging directory before opening
/// it, so the live browser's own file is never held open. A source already
/// inside the staging directory (a user-supplied copy) is used as-is.
fn stage_copy(path: &Path, staging_dir: &Path) -> Result<PathBuf, ExtractError> {
    if path.parent() == Some(staging_dir) {
        return Ok(path.to_path_buf());
    }
    snapshot::ensure_staging_dir(staging_dir)?;
    let file_name = path.file_name().ok_or(ExtractError::NotFound)?;
    let staged = staging_dir.join(file_name);
    std::fs::copy(path, &staged)
        .map_err(|e| ExtractError::Permission(format!("{}: {e}", path.display())))?;
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stage_copy_places_artifact_in_staging_dir() {
        let source_dir = tempdir().expect("tempdir");
        let staging_dir = tempdir().expect("tempdir");
        let source = source_dir.path().join("History");
        std::fs::write(&source, b"payload").expect("write");

        let staged = stage_copy(&source, staging_dir.path()).expect("stage");
        assert_eq!(staged, staging_dir.path().join("History"));
        assert_eq!(std::fs::read(staged).expect("read"), b"payload");
    }

    #[test]
    fn stage_copy_keeps_already_staged_artifact() {
        let staging_dir = tempdir().expect("tempdir");
        let source = staging_dir.path().join("History");
        std::fs::write(&source, b"payload").expect("write");

        let staged = stage_copy(&source, staging_dir.path()).expect("stage");
        assert_eq!(staged, source);
    }

    #[test]
    fn stage_copy_reports_unreadable_source() {
        let staging_dir = tempdir().expect("tempdir");
        let missing = staging_dir.path().join("elsewhere").join("History");
        let err = stage_copy(&missing, staging_dir.path()).expect_err("should fail");
        assert!(matches!(err, ExtractError::Permission(_)));
    }
}
