//! Listing source implementations

pub mod encar;

pub use encar::EncarScraper;
