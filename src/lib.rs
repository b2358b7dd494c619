//! Watches a used-car search on Encar, classifies newly listed cars by their
//! inspection record and keeps a durable record of what it has seen.

pub mod cli;
pub mod config;
pub mod discord;
pub mod error;
pub mod filter;
pub mod finder;
pub mod models;
pub mod query;
pub mod scrapers;
pub mod store;
pub mod traits;

pub use config::Config;
pub use error::QueryError;
pub use finder::{CarFinder, CycleReport, MonitorPhase};
pub use store::StateStore;
