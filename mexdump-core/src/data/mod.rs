//! Acquisition pipeline: transport, pacing, fetchers and partitioned storage.

pub mod archive;
pub mod bars;
pub mod catalog;
pub mod download;
pub mod http;
pub mod layout;
pub mod pacing;
pub mod provider;
pub mod schema;

pub use archive::{ArchiveFetcher, ChannelOutcome, DayStats};
pub use bars::{BarFetcher, BarStats};
pub use catalog::{prepare_destination, validate_dates, InstrumentCatalog};
pub use download::{
    run_download, validate_channels, ChannelStatus, FetchRequest, RunReport, CHANNEL_ORDER,
};
pub use http::HttpTransport;
pub use layout::{partition_path, CsvRow, PartitionStore, RunState, Touch};
pub use pacing::{Clock, ManualClock, RequestBudget, SystemClock};
pub use provider::{DataError, HttpResponse, Transport};
pub use schema::{
    normalize_timestamp, BarRecord, BarResolution, Channel, DateRange, BAR_HEADER, QUOTE_HEADER,
    TRADE_HEADER,
};
