//! Aggregation queries over the canonical store: per-domain visit totals,
//! domain selection for the anonymizer, flat entry listings and search-term
//! extraction. All functions read through an explicit [`Session`] and never
//! mutate the store.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use percent_encoding::percent_decode_str;

use crate::domain;
use crate::session::Session;
use crate::store::StoreError;
use crate::timestamp;

/// Optional day or day-range restriction on visit aggregation.
#[derive(Debug, Clone, Copy)]
pub enum VisitFilter {
    All,
    Day(NaiveDate),
    Range(NaiveDate, NaiveDate),
}

impl VisitFilter {
    fn bounds(&self) -> Option<(i64, i64)> {
        match self {
            VisitFilter::All => None,
            VisitFilter::Day(day) => Some(timestamp::day_bounds(*day)),
            VisitFilter::Range(from, to) => Some(timestamp::range_bounds(*from, *to)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainSort {
    Domain,
    Frequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySort {
    Date,
    Domain,
    Frequency,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomainCount {
    pub domain: String,
    pub count: i64,
    /// Percentage share of all counted visits, rounded to two decimals.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DomainGroup {
    pub domain: String,
    pub ids: Vec<i64>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub url_id: i64,
    pub date: String,
    pub url: String,
    pub visit_count: i64,
    pub visit_date: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermGroup {
    pub term: String,
    pub ids: Vec<i64>,
    pub count: i64,
    pub domains: Vec<String>,
}

/// Visit totals grouped by stemmed domain.
///
/// Each URL id contributes its stored `visit_count` exactly once, no matter
/// how many visit rows reference it. `n` keeps the top (descending) or
/// bottom (`ascending`) slice after a stable sort by count.
pub fn visits(
    session: &Session,
    filter: &VisitFilter,
    n: Option<usize>,
    ascending: bool,
) -> Result<Vec<DomainCount>, StoreError> {
    let conn = session.store.conn();
    let mut rows: Vec<(String, i64, i64)> = Vec::new();
    let collect = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, i64, i64)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    };
    if let Some((start, end)) = filter.bounds() {
        let mut stmt = conn.prepare(
            "SELECT url, visit_count, urls.id FROM urls, visits
             WHERE urls.id = visits.url_id AND visit_date >= ?1 AND visit_date < ?2",
        )?;
        for row in stmt.query_map([start, end], collect)? {
            rows.push(row?);
        }
    } else {
        let mut stmt = conn.prepare(
            "SELECT url, visit_count, urls.id FROM urls, visits WHERE urls.id = visits.url_id",
        )?;
        for row in stmt.query_map([], collect)? {
            rows.push(row?);
        }
    }

    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, i64> = HashMap::new();
    let mut counted_ids: HashSet<i64> = HashSet::new();
    for (url, visit_count, url_id) in rows {
        let stemmed = domain::stem_url(&url);
        let slot = totals.entry(stemmed.clone()).or_insert_with(|| {
            order.push(stemmed);
            0
        });
        if counted_ids.insert(url_id) {
            *slot += visit_count;
        }
    }

    let mut counts: Vec<(String, i64)> = order
        .into_iter()
        .map(|d| {
            let count = totals.get(&d).copied().unwrap_or(0);
            (d, count)
        })
        .collect();
    counts.sort_by_key(|(_, count)| *count);

    let total: i64 = counts.iter().map(|(_, c)| *c).sum();
    let keep = n.unwrap_or(counts.len()).min(counts.len());
    let selected: Vec<(String, i64)> = if ascending {
        counts.into_iter().take(keep).collect()
    } else {
        let mut top: Vec<(String, i64)> = counts.split_off(counts.len() - keep);
        top.sort_by(|a, b| b.1.cmp(&a.1));
        top
    };

    Ok(selected
        .into_iter()
        .map(|(domain, count)| DomainCount {
            domain,
            count,
            share: if total > 0 {
                (count as f64 / total as f64 * 10_000.0).round() / 100.0
            } else {
                0.0
            },
        })
        .collect())
}

/// Canonical URLs grouped by stemmed domain, with the contributing URL ids
/// the anonymizer needs.
pub fn select_domains(
    session: &Session,
    sort: DomainSort,
    query: Option<&str>,
) -> Result<Vec<DomainGroup>, StoreError> {
    let conn = session.store.conn();
    let mut rows: Vec<(i64, String, i64)> = Vec::new();
    let collect = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(i64, String, i64)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    };
    if let Some(q) = query {
        let mut stmt =
            conn.prepare("SELECT id, url, visit_count FROM urls WHERE url LIKE '%' || ?1 || '%'")?;
        for row in stmt.query_map([q], collect)? {
            rows.push(row?);
        }
    } else {
        let mut stmt = conn.prepare("SELECT id, url, visit_count FROM urls")?;
        for row in stmt.query_map([], collect)? {
            rows.push(row?);
        }
    }

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, DomainGroup> = HashMap::new();
    for (id, url, visit_count) in rows {
        let stemmed = domain::stem_url(&url);
        let group = groups.entry(stemmed.clone()).or_insert_with(|| {
            order.push(stemmed.clone());
            DomainGroup {
                domain: stemmed,
                ids: Vec::new(),
                count: 0,
            }
        });
        group.ids.push(id);
        group.count += visit_count;
    }

    let mut out: Vec<DomainGroup> = order
        .into_iter()
        .filter_map(|d| groups.remove(&d))
        .collect();
    match sort {
        DomainSort::Domain => out.sort_by(|a, b| a.domain.cmp(&b.domain)),
        DomainSort::Frequency => out.sort_by(|a, b| b.count.cmp(&a.count)),
    }
    Ok(out)
}

/// Flat per-visit listing with human-readable dates.
pub fn entries(
    session: &Session,
    sort: EntrySort,
    query: Option<&str>,
) -> Result<Vec<Entry>, StoreError> {
    let conn = session.store.conn();
    let mut rows: Vec<(i64, i64, String, i64)> = Vec::new();
    let collect = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(i64, i64, String, i64)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    };
    if let Some(q) = query {
        let mut stmt = conn.prepare(
            "SELECT urls.id, visit_date, url, visit_count FROM visits, urls
             WHERE visits.url_id = urls.id AND url LIKE '%' || ?1 || '%'",
        )?;
        for row in stmt.query_map([q], collect)? {
            rows.push(row?);
        }
    } else {
        let mut stmt = conn.prepare(
            "SELECT urls.id, visit_date, url, visit_count FROM visits, urls
             WHERE visits.url_id = urls.id",
        )?;
        for row in stmt.query_map([], collect)? {
            rows.push(row?);
        }
    }

    let mut out: Vec<Entry> = rows
        .into_iter()
        .map(|(url_id, visit_date, url, visit_count)| Entry {
            url_id,
            date: timestamp::format_timestamp(visit_date),
            url,
            visit_count,
            visit_date,
        })
        .collect();
    match sort {
        EntrySort::Domain => out.sort_by(|a, b| a.url.cmp(&b.url)),
        EntrySort::Frequency => out.sort_by(|a, b| b.visit_count.cmp(&a.visit_count)),
        EntrySort::Date => out.sort_by(|a, b| b.visit_date.cmp(&a.visit_date)),
    }
    Ok(out)
}

/// Search terms recovered from stored URLs, aggregated per decoded term.
pub fn search_terms(
    session: &Session,
    sort: DomainSort,
    query: Option<&str>,
) -> Result<Vec<TermGroup>, StoreError> {
    let conn = session.store.conn();
    let mut rows: Vec<(i64, String)> = Vec::new();
    let collect = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(i64, String)> {
        Ok((row.get(0)?, row.get(1)?))
    };
    if let Some(q) = query {
        let mut stmt = conn.prepare("SELECT id, url FROM urls WHERE url LIKE '%' || ?1 || '%'")?;
        for row in stmt.query_map([q], collect)? {
            rows.push(row?);
        }
    } else {
        let mut stmt = conn.prepare("SELECT id, url FROM urls")?;
        for row in stmt.query_map([], collect)? {
            rows.push(row?);
        }
    }

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, TermGroup> = HashMap::new();
    for (id, url) in rows {
        let stemmed = domain::stem_url(&url);
        for caps in domain::SEARCH_TERM_RE.captures_iter(&url) {
            let term = decode_term(&caps[1]);
            let group = groups.entry(term.clone()).or_insert_with(|| {
                order.push(term.clone());
                TermGroup {
                    term,
                    ids: Vec::new(),
                    count: 0,
                    domains: Vec::new(),
                }
            });
            group.ids.push(id);
            group.count += 1;
            if !group.domains.contains(&stemmed) {
                group.domains.push(stemmed.clone());
            }
        }
    }

    let mut out: Vec<TermGroup> = order
        .into_iter()
        .filter_map(|t| groups.remove(&t))
        .collect();
    match sort {
        DomainSort::Domain => out.sort_by(|a, b| a.term.cmp(&b.term)),
        DomainSort::Frequency => out.sort_by(|a, b| b.count.cmp(&a.count)),
    }
    Ok(out)
}

/// Percent-decode a matched term, treating `+` as space.
fn decode_term(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Browser, load_specs};
    use crate::session::Session;
    use crate::store::Store;

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

    fn insert_url(session: &Session, id: i64, url: &str, visit_count: i64) {
        session
            .store
            .conn()
            .execute(
                "INSERT INTO urls (id, url, title, visit_count) VALUES (?1, ?2, 'title', ?3)",
                (id, url, visit_count),
            )
            .expect("insert url");
    }

    fn insert_visit(session: &Session, id: i64, url_id: i64, visit_date: i64) {
        session
            .store
            .conn()
            .execute(
                "INSERT INTO visits (id, url_id, visit_date) VALUES (?1, ?2, ?3)",
                (id, url_id, visit_date),
            )
            .expect("insert visit");
    }

    #[test]
    fn visit_counts_are_not_doubled_by_many_visit_rows() {
        let session = test_session();
        insert_url(&session, 1, "https://example.com/a", 7);
        for i in 0..5 {
            insert_visit(&session, i + 1, 1, 1_600_000_000 + i);
        }

        let counts = visits(&session, &VisitFilter::All, None, false).expect("visits");
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].domain, "example.com");
        assert_eq!(counts[0].count, 7);
        assert_eq!(counts[0].share, 100.0);
    }

    #[test]
    fn distinct_urls_of_same_domain_accumulate() {
        let session = test_session();
        insert_url(&session, 1, "https://example.com/a", 2);
        insert_url(&session, 2, "https://www.example.com/b", 3);
        insert_url(&session, 3, "https://other.example.org/", 5);
        insert_visit(&session, 1, 1, 1_600_000_000);
        insert_visit(&session, 2, 2, 1_600_000_100);
        insert_visit(&session, 3, 3, 1_600_000_200);

        let counts = visits(&session, &VisitFilter::All, None, false).expect("visits");
        assert_eq!(counts[0].domain, "example.com");
        assert_eq!(counts[0].count, 5);
        assert_eq!(counts[1].domain, "other.example.org");
        assert_eq!(counts[1].count, 5);
    }

    #[test]
    fn top_and_bottom_selection() {
        let session = test_session();
        for (id, (url, count)) in [
            ("https://a.example.com/", 1),
            ("https://b.example.com/", 5),
            ("https://c.example.com/", 3),
        ]
        .iter()
        .enumerate()
        {
            insert_url(&session, id as i64 + 1, url, *count as i64);
            insert_visit(&session, id as i64 + 1, id as i64 + 1, 1_600_000_000);
        }

        let top = visits(&session, &VisitFilter::All, Some(2), false).expect("top");
        assert_eq!(top[0].domain, "b.example.com");
        assert_eq!(top[1].domain, "c.example.com");

        let bottom = visits(&session, &VisitFilter::All, Some(2), true).expect("bottom");
        assert_eq!(bottom[0].domain, "a.example.com");
        assert_eq!(bottom[1].domain, "c.example.com");
    }

    #[test]
    fn date_filter_limits_aggregation() {
        let session = test_session();
        insert_url(&session, 1, "https://in.example.com/", 1);
        insert_url(&session, 2, "https://out.example.com/", 1);
        // 2020-06-15 12:00 UTC and ten days later.
        insert_visit(&session, 1, 1, 1_592_222_400);
        insert_visit(&session, 2, 2, 1_592_222_400 + 10 * 86_400);

        let day = NaiveDate::from_ymd_opt(2020, 6, 15).expect("date");
        let counts = visits(&session, &VisitFilter::Day(day), None, false).expect("visits");
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].domain, "in.example.com");
    }

    #[test]
    fn select_domains_groups_ids() {
        let session = test_session();
        insert_url(&session, 1, "https://example.com/a", 2);
        insert_url(&session, 2, "https://example.com/b", 3);
        insert_url(&session, 3, "https://other.example.org/", 1);

        let groups = select_domains(&session, DomainSort::Domain, None).expect("groups");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].domain, "example.com");
        assert_eq!(groups[0].ids, vec![1, 2]);
        assert_eq!(groups[0].count, 5);

        let filtered =
            select_domains(&session, DomainSort::Domain, Some("other")).expect("filtered");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].domain, "other.example.org");
    }

    #[test]
    fn entries_sort_by_date_descending_by_default() {
        let session = test_session();
        insert_url(&session, 1, "https://example.com/a", 1);
        insert_url(&session, 2, "https://example.com/b", 9);
        insert_visit(&session, 1, 1, 1_600_000_000);
        insert_visit(&session, 2, 2, 1_600_100_000);

        let listing = entries(&session, EntrySort::Date, None).expect("entries");
        assert_eq!(listing[0].url, "https://example.com/b");
        let by_frequency = entries(&session, EntrySort::Frequency, None).expect("entries");
        assert_eq!(by_frequency[0].visit_count, 9);
    }

    #[test]
    fn search_terms_decode_and_group() {
        let session = test_session();
        insert_url(&session, 1, "https://search.example.com/?q=hello+world", 1);
        insert_url(&session, 2, "https://other.example.com/find?q=hello%20world", 1);
        insert_url(&session, 3, "https://example.com/plain", 1);

        let terms = search_terms(&session, DomainSort::Domain, None).expect("terms");
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].term, "hello world");
        assert_eq!(terms[0].count, 2);
        assert_eq!(terms[0].ids, vec![1, 2]);
        assert_eq!(
            terms[0].domains,
            vec!["search.example.com".to_string(), "other.example.com".to_string()]
        );
    }
}
