//! Import orchestration and the per-run session context.
//!
//! A [`Session`] carries everything the aggregation, anonymization and
//! export calls need: the active browser, its spec, the open canonical
//! store and a host OS description. It is built once per import (or
//! reopened from the persisted state of an earlier one) and passed
//! explicitly; there is no process-global state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Browser, BrowserSpec, SpecError, SpecFile};
use crate::extract::{self, ExtractError};
use crate::locate;
use crate::store::{Store, StoreError};
use crate::timestamp;

const STORE_FILE: &str = "browsing_history.db";
const SESSION_FILE: &str = "session.json";
const STAGING_DIR: &str = "staging";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no previous import found in {0}")]
    NoSession(String),
}

/// Filesystem layout under the state directory.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    pub fn new(root: impl Into<PathBuf>) -> StateDir {
        StateDir { root: root.into() }
    }

    pub fn store_path(&self) -> PathBuf {
        self.root.join(STORE_FILE)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    fn session_file(&self) -> PathBuf {
        self.root.join(SESSION_FILE)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSession {
    browser_name: String,
}

pub struct Session {
    pub browser: Browser,
    pub spec: BrowserSpec,
    pub store: Store,
    pub os_desc: String,
}

impl Session {
    /// Earliest/latest visit as human-readable dates.
    pub fn date_range(&self) -> Result<Option<(String, String)>, StoreError> {
        Ok(self.store.date_range()?.map(|(min, max)| {
            (
                timestamp::format_timestamp(min),
                timestamp::format_timestamp(max),
            )
        }))
    }
}

/// Outcome of a successful import, for the caller's summary output.
pub struct ImportSummary {
    pub date_range: Option<(String, String)>,
    pub num_domains: usize,
}

/// Run one full import: resolve the artifact, extract, recreate the store,
/// load, and persist the browser choice for later invocations.
pub fn import(
    state: &StateDir,
    specs: &SpecFile,
    browser: Browser,
    input: Option<&Path>,
    cutoff: f64,
) -> Result<(Session, ImportSummary), SessionError> {
    let spec = specs.for_browser(browser)?.clone();

    let path = match input {
        Some(p) => p.to_path_buf(),
        None => locate::locate_on_host(browser, &spec).ok_or(ExtractError::NotFound)?,
    };

    let extraction = extract::extract(browser, &spec, &path, &state.staging_dir(), cutoff)?;

    let mut store = Store::create(&state.store_path())?;
    store.load(&extraction)?;

    persist_browser(state, browser);

    let session = Session {
        browser,
        spec,
        store,
        os_desc: locate::os_description(),
    };
    let summary = ImportSummary {
        date_range: session.date_range()?,
        num_domains: crate::aggregate::visits(
            &session,
            &crate::aggregate::VisitFilter::All,
            None,
            false,
        )?
        .len(),
    };
    info!(
        "import finished: {} domains, range {:?}",
        summary.num_domains, summary.date_range
    );
    Ok((session, summary))
}

/// Reopen the session left by an earlier import, if both the persisted
/// browser choice and the store file are still present.
pub fn reopen(state: &StateDir, specs: &SpecFile) -> Result<Session, SessionError> {
    let store_path = state.store_path();
    if !store_path.is_file() {
        return Err(SessionError::NoSession(state.root.display().to_string()));
    }
    let browser = load_browser(state)
        .ok_or_else(|| SessionError::NoSession(state.root.display().to_string()))?;
    let spec = specs.for_browser(browser)?.clone();
    let store = Store::open(&store_path)?;
    Ok(Session {
        browser,
        spec,
        store,
        os_desc: locate::os_description(),
    })
}

fn persist_browser(state: &StateDir, browser: Browser) {
    let persisted = PersistedSession {
        browser_name: browser.label().to_string(),
    };
    let result = std::fs::create_dir_all(&state.root).and_then(|_| {
        let json = serde_json::to_string(&persisted).unwrap_or_default();
        std::fs::write(state.session_file(), json)
    });
    if let Err(e) = result {
        warn!("could not persist session state: {e}");
    }
}

fn load_browser(state: &StateDir) -> Option<Browser> {
    let bytes = std::fs::read(state.session_file()).ok()?;
    let persisted: PersistedSession = serde_json::from_slice(&bytes).ok()?;
    Browser::from_label(&persisted.browser_name)
}
