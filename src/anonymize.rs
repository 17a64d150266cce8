//! Irreversible anonymizing mutations against the canonical store.
//!
//! Every mutation hashes the row's domain with a fresh random salt, so the
//! same domain anonymized twice yields unrelated tokens and nothing maps
//! back to the original value.

use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::aggregate::{self, DomainSort};
use crate::domain;
use crate::session::Session;
use crate::store::StoreError;

/// Placeholder written over blanked columns.
const BLANKED: &str = "***";

/// What to anonymize. The selection implies the mutation policy: a domain
/// key rewrites whole rows, a keyword key rewrites the matched query term,
/// an explicit id list keeps the domain but hides the path.
#[derive(Debug, Clone)]
pub enum Selection {
    Domain(String),
    Keyword(String),
    Urls(Vec<i64>),
}

/// Apply one anonymizing mutation. Returns the number of rows rewritten.
///
/// Row updates commit individually; a failing row is logged and skipped so
/// the rest of the selection still goes through.
pub fn anonymize(session: &Session, selection: &Selection) -> Result<usize, StoreError> {
    let ids = resolve_ids(session, selection)?;
    let conn = session.store.conn();

    let mut mutated = 0;
    for id in ids {
        let url: Option<String> = conn
            .query_row("SELECT url FROM urls WHERE id = ?1", [id], |row| row.get(0))
            .ok();
        let Some(url) = url else { continue };
        // Rows already anonymized (or otherwise non-navigable) are skipped.
        let Some(host) = domain::host_of(&url) else {
            continue;
        };

        let token = format!("anonymized-{}-{id}", hash_domain(host));
        let result = match selection {
            Selection::Domain(_) => conn.execute(
                "UPDATE urls SET url = ?1, title = ?2, rev_host = ?2, redirect_urls = ?2
                 WHERE id = ?3",
                (&token, BLANKED, id),
            ),
            Selection::Keyword(_) => {
                let rewritten = domain::SEARCH_TERM_RE
                    .replace_all(&url, token.as_str())
                    .to_string();
                conn.execute(
                    "UPDATE urls SET url = ?1, title = ?2 WHERE id = ?3",
                    (&rewritten, BLANKED, id),
                )
            }
            Selection::Urls(_) => {
                let stub = format!("{}/{BLANKED}", domain::stem_url(&url));
                conn.execute(
                    "UPDATE urls SET url = ?1, title = ?2, redirect_urls = ?2 WHERE id = ?3",
                    (&stub, BLANKED, id),
                )
            }
        };
        match result {
            Ok(_) => mutated += 1,
            Err(e) => warn!("anonymization of url id {id} failed: {e}"),
        }
    }
    info!("anonymized {mutated} rows");
    Ok(mutated)
}

/// Salted one-way hash of a domain: `sha256(salt || domain)-salt`, salt
/// drawn fresh from the OS on every call.
fn hash_domain(domain: &str) -> String {
    let mut salt_bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt_bytes);
    let salt = hex::encode(salt_bytes);
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(domain.as_bytes());
    format!("{}-{salt}", hex::encode(hasher.finalize()))
}

fn resolve_ids(session: &Session, selection: &Selection) -> Result<Vec<i64>, StoreError> {
    match selection {
        Selection::Domain(key) => Ok(aggregate::select_domains(session, DomainSort::Domain, None)?
            .into_iter()
            .find(|g| g.domain == *key)
            .map(|g| g.ids)
            .unwrap_or_default()),
        Selection::Keyword(key) => Ok(aggregate::search_terms(session, DomainSort::Domain, None)?
            .into_iter()
            .find(|g| g.term == *key)
            .map(|g| g.ids)
            .unwrap_or_default()),
        Selection::Urls(ids) => Ok(ids.clone()),
    }
}
