pub mod aggregate;
pub mod anonymize;
pub mod cli;
pub mod config;
pub mod domain;
pub mod export;
pub mod extract;
pub mod locate;
pub mod logging;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod timestamp;
