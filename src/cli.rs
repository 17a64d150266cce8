use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum BrowserArg {
    Chrome,
    Firefox,
    Safari,
    Ie11,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum DomainSortArg {
    Domains,
    Frequency,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum EntrySortArg {
    Date,
    Domains,
    Frequency,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum TermSortArg {
    Keywords,
    Frequency,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum AnonymizeKindArg {
    Domains,
    Keywords,
    Urls,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Directory holding the canonical store, staging area and session state
    #[arg(long, default_value = "./state")]
    pub state_dir: PathBuf,

    /// Optional path to a browser spec file (YAML)
    #[arg(long)]
    pub specs: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import a browsing-history snapshot into a fresh canonical store
    Import {
        /// Browser family to import from
        #[arg(long, value_enum)]
        browser: BrowserArg,

        /// Artifact path, if the locator should be skipped
        #[arg(long)]
        input: Option<PathBuf>,

        /// Import cutoff, in days before now
        #[arg(long, default_value_t = 60)]
        days: i64,

        /// Absolute cutoff date (overrides --days)
        #[arg(long)]
        min_date: Option<NaiveDate>,
    },

    /// Per-domain visit totals
    Visits {
        /// Restrict to a single day
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Range start (requires --to)
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,

        /// Range end, exclusive
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,

        /// How many domains to show
        #[arg(long, default_value_t = 25)]
        top: usize,

        /// Show the least-visited domains instead of the most-visited
        #[arg(long)]
        bottom: bool,

        /// Show every domain
        #[arg(long)]
        all: bool,
    },

    /// Canonical URLs grouped by stemmed domain
    Domains {
        #[arg(long, value_enum, default_value_t = DomainSortArg::Domains)]
        sort: DomainSortArg,

        /// Substring filter over the raw URL
        #[arg(long)]
        query: Option<String>,
    },

    /// Flat per-visit listing
    Entries {
        #[arg(long, value_enum, default_value_t = EntrySortArg::Date)]
        sort: EntrySortArg,

        /// Substring filter over the raw URL
        #[arg(long)]
        query: Option<String>,
    },

    /// Search terms recovered from stored URLs
    SearchTerms {
        #[arg(long, value_enum, default_value_t = TermSortArg::Keywords)]
        sort: TermSortArg,

        /// Substring filter over the raw URL
        #[arg(long)]
        query: Option<String>,
    },

    /// Irreversibly anonymize selected rows
    Anonymize {
        #[arg(long, value_enum)]
        kind: AnonymizeKindArg,

        /// Domain or search-term key (kinds: domains, keywords)
        #[arg(long)]
        key: Option<String>,

        /// Explicit URL ids (kind: urls)
        #[arg(long, value_delimiter = ',')]
        ids: Option<Vec<i64>>,
    },

    /// Export the canonical join as semicolon-separated values
    Export {
        /// Output file (defaults to <state-dir>/export.csv)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
