//! AdLedger Scraper - ranked result extraction from search surfaces.
//!
//! Each surface scraper fetches raw content through a [`PageFetcher`] and
//! runs it through a cascade of parse strategies:
//!
//! 1. Structured JSON (bare, `<pre>`-wrapped, or embedded in a page script)
//! 2. DOM selectors, primary class names first, broad fallbacks second
//! 3. Heuristic text patterns
//!
//! The first strategy yielding items wins. When all of them miss, the
//! scraper returns an empty list and snapshots the raw content for offline
//! inspection. Scrapers never return errors.
//!
//! [`PageFetcher`]: adledger_browser::PageFetcher

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod ad;
pub mod cascade;
mod embedded;
pub mod error;
pub mod item;
#[allow(missing_docs)]
pub mod place;
pub mod query;
#[allow(missing_docs)]
pub mod report;
pub mod snapshot;
mod text;
#[allow(missing_docs)]
pub mod view;

// Re-export commonly used types
pub use ad::AdScraper;
pub use cascade::{run_cascade, Strategy};
pub use error::ParseMiss;
pub use item::{ParsedItem, RankedItem, RankingSource};
pub use place::PlaceScraper;
pub use query::build_surface_url;
pub use report::{ReportRow, ReportScraper};
pub use snapshot::SnapshotWriter;
pub use view::ViewScraper;
