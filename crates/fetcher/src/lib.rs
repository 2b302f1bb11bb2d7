//! NBKR gold price scraping and import into the price table.

pub mod importer;
pub mod nbkr;
pub mod parser;
