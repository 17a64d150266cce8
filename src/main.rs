use anyhow::{Result, bail};

use trailscrub::cli::{
    self, AnonymizeKindArg, BrowserArg, Command, DomainSortArg, EntrySortArg, TermSortArg,
};
use trailscrub::config::{self, Browser, SpecFile};
use trailscrub::extract::ExtractError;
use trailscrub::session::{self, Session, SessionError, StateDir};
use trailscrub::{aggregate, anonymize, export, logging, timestamp};

fn main() -> Result<()> {
    logging::init_logging();

    let opts = cli::parse();
    let loaded = config::load_specs(opts.specs.as_deref())?;
    let state = StateDir::new(&opts.state_dir);

    match opts.command {
        Command::Import {
            browser,
            input,
            days,
            min_date,
        } => {
            let browser = map_browser(browser);
            let cutoff = match min_date {
                Some(d) => timestamp::day_bounds(d).0 as f64,
                None => timestamp::default_cutoff(days),
            };
            match session::import(&state, &loaded.specs, browser, input.as_deref(), cutoff) {
                Ok((_, summary)) => {
                    match summary.date_range {
                        Some((from, to)) => println!(
                            "Imported {browser} history: {} domains, visits from {from} to {to}",
                            summary.num_domains
                        ),
                        None => println!("Imported {browser} history: no visits in range"),
                    }
                    Ok(())
                }
                Err(SessionError::Extract(ExtractError::NotFound)) => {
                    println!(
                        "The {browser} history was not found. Pass --input with the artifact path."
                    );
                    std::process::exit(1);
                }
                Err(SessionError::Extract(ExtractError::Permission(detail))) => {
                    println!("The history file could not be read: {detail}");
                    std::process::exit(1);
                }
                Err(e) => Err(e.into()),
            }
        }

        Command::Visits {
            date,
            from,
            to,
            top,
            bottom,
            all,
        } => {
            let session = open_session(&state, &loaded.specs)?;
            let filter = match (date, from, to) {
                (Some(day), _, _) => aggregate::VisitFilter::Day(day),
                (None, Some(from), Some(to)) => aggregate::VisitFilter::Range(from, to),
                _ => aggregate::VisitFilter::All,
            };
            let n = if all { None } else { Some(top) };
            let counts = aggregate::visits(&session, &filter, n, bottom)?;
            let total: i64 = counts.iter().map(|c| c.count).sum();
            println!("{} domains (n={total})", counts.len());
            for entry in counts {
                println!("{:>8}  {:>6.2}%  {}", entry.count, entry.share, entry.domain);
            }
            Ok(())
        }

        Command::Domains { sort, query } => {
            let session = open_session(&state, &loaded.specs)?;
            let groups =
                aggregate::select_domains(&session, map_domain_sort(sort), query.as_deref())?;
            for group in groups {
                let ids = group
                    .ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                println!("{:>8}  {}  [{ids}]", group.count, group.domain);
            }
            Ok(())
        }

        Command::Entries { sort, query } => {
            let session = open_session(&state, &loaded.specs)?;
            let sort = match sort {
                EntrySortArg::Date => aggregate::EntrySort::Date,
                EntrySortArg::Domains => aggregate::EntrySort::Domain,
                EntrySortArg::Frequency => aggregate::EntrySort::Frequency,
            };
            for entry in aggregate::entries(&session, sort, query.as_deref())? {
                println!(
                    "{:>6}  {}  {:>5}  {}",
                    entry.url_id, entry.date, entry.visit_count, entry.url
                );
            }
            Ok(())
        }

        Command::SearchTerms { sort, query } => {
            let session = open_session(&state, &loaded.specs)?;
            let sort = match sort {
                TermSortArg::Keywords => aggregate::DomainSort::Domain,
                TermSortArg::Frequency => aggregate::DomainSort::Frequency,
            };
            for term in aggregate::search_terms(&session, sort, query.as_deref())? {
                println!(
                    "{:>5}  {}  ({})",
                    term.count,
                    term.term,
                    term.domains.join(", ")
                );
            }
            Ok(())
        }

        Command::Anonymize { kind, key, ids } => {
            let session = open_session(&state, &loaded.specs)?;
            let selection = match kind {
                AnonymizeKindArg::Domains => match key {
                    Some(key) => anonymize::Selection::Domain(key),
                    None => bail!("--key is required for --kind domains"),
                },
                AnonymizeKindArg::Keywords => match key {
                    Some(key) => anonymize::Selection::Keyword(key),
                    None => bail!("--key is required for --kind keywords"),
                },
                AnonymizeKindArg::Urls => match ids {
                    Some(ids) if !ids.is_empty() => anonymize::Selection::Urls(ids),
                    _ => bail!("--ids is required for --kind urls"),
                },
            };
            let mutated = anonymize::anonymize(&session, &selection)?;
            println!("Anonymized {mutated} rows");
            Ok(())
        }

        Command::Export { output } => {
            let session = open_session(&state, &loaded.specs)?;
            let output = output.unwrap_or_else(|| opts.state_dir.join("export.csv"));
            let rows = export::export(&session, &output)?;
            if rows == 0 {
                println!("Nothing to export; import a browsing history first");
            } else {
                println!("Exported {rows} rows to {}", output.display());
            }
            Ok(())
        }
    }
}

fn open_session(state: &StateDir, specs: &SpecFile) -> Result<Session> {
    match session::reopen(state, specs) {
        Ok(session) => Ok(session),
        Err(SessionError::NoSession(dir)) => {
            println!("No imported history found in {dir}; run `trailscrub import` first");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn map_browser(arg: BrowserArg) -> Browser {
    match arg {
        BrowserArg::Chrome => Browser::Chrome,
        BrowserArg::Firefox => Browser::Firefox,
        BrowserArg::Safari => Browser::Safari,
        BrowserArg::Ie11 => Browser::Ie11,
    }
}

fn map_domain_sort(arg: DomainSortArg) -> aggregate::DomainSort {
    match arg {
        DomainSortArg::Domains => aggregate::DomainSort::Domain,
        DomainSortArg::Frequency => aggregate::DomainSort::Frequency,
    }
}
