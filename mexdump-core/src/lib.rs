//! mexdump core: batch acquisition of historical bars, quotes and trades.
//!
//! - Bucketed bars from the paginated query API, paced by a shared request budget
//! - Daily quote/trade dumps from the archive source, retried with a fixed pause
//! - Date-partitioned CSV storage with first-touch overwrite, safe to re-run

pub mod config;
pub mod data;

pub use config::FetchConfig;
