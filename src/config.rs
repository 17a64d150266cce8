use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Closed set of supported browser families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    Chrome,
    Firefox,
    Safari,
    Ie11,
}

impl Browser {
    pub fn label(&self) -> &'static str {
        match self {
            Browser::Chrome => "chrome",
            Browser::Firefox => "firefox",
            Browser::Safari => "safari",
            Browser::Ie11 => "ie11",
        }
    }

    pub fn from_label(label: &str) -> Option<Browser> {
        match label {
            "chrome" => Some(Browser::Chrome),
            "firefox" => Some(Browser::Firefox),
            "safari" => Some(Browser::Safari),
            "ie11" => Some(Browser::Ie11),
            _ => None,
        }
    }
}

impl std::fmt::Display for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid spec file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("no spec entry for browser {0}")]
    Missing(String),
}

/// One source -> canonical column mapping entry.
#[derive(Debug, Deserialize, Clone)]
pub struct ColumnMap {
    pub source: String,
    pub canonical: String,
}

/// Schema map for the relational browser families. `time_expr` converts the
/// source's native timestamp to Unix seconds so the cutoff comparison happens
/// in the source's own query.
#[derive(Debug, Deserialize, Clone)]
pub struct RelationalSpec {
    pub urls_table: String,
    pub visits_table: String,
    pub join: String,
    pub time_expr: String,
    pub url_expr: String,
    pub urls_columns: Vec<ColumnMap>,
    pub visits_columns: Vec<ColumnMap>,
}

/// Column ordinals inside the WebCache ESE database.
#[derive(Debug, Deserialize, Clone)]
pub struct EseSpec {
    pub containers_id_column: i32,
    pub containers_name_column: i32,
    pub entry_id_column: i32,
    pub access_count_column: i32,
    pub accessed_time_column: i32,
    pub url_column: i32,
    pub redirect_urls_column: i32,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PathTemplates {
    #[serde(default)]
    pub windows: Vec<String>,
    #[serde(default)]
    pub macos: Vec<String>,
    #[serde(default)]
    pub linux: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserSpec {
    pub file_names: Vec<String>,
    #[serde(default)]
    pub profile_pattern: Option<String>,
    #[serde(default)]
    pub paths: PathTemplates,
    #[serde(default)]
    pub relational: Option<RelationalSpec>,
    #[serde(default)]
    pub ese: Option<EseSpec>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpecFile {
    pub browsers: HashMap<String, BrowserSpec>,
}

impl SpecFile {
    pub fn for_browser(&self, browser: Browser) -> Result<&BrowserSpec, SpecError> {
        self.browsers
            .get(browser.label())
            .ok_or_else(|| SpecError::Missing(browser.label().to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct LoadedSpecs {
    pub specs: SpecFile,
    pub specs_hash: String,
}

/// Load the browser spec file, falling back to the embedded default set.
pub fn load_specs(path: Option<&Path>) -> Result<LoadedSpecs, SpecError> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        include_bytes!("../config/browsers.yml").to_vec()
    };

    let specs: SpecFile = serde_yaml::from_slice(&bytes)?;
    let specs_hash = hash_bytes(&bytes);

    Ok(LoadedSpecs { specs, specs_hash })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
