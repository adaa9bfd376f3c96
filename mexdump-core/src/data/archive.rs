//! Bulk-dump archive fetcher for quotes and trades.
//!
//! The archive publishes one gzip-compressed CSV per (record kind, day)
//! containing every symbol. Each file is downloaded with a fixed-pause retry,
//! stream-decompressed, filtered to the requested symbols and routed into
//! per-symbol daily partitions.

use super::layout::{CsvRow, PartitionStore, RunState};
use super::pacing::Clock;
use super::provider::{DataError, HttpResponse, Transport};
use super::schema::{normalize_timestamp, Channel, DateRange};
use crate::config::FetchConfig;
use chrono::{Duration, NaiveDate};
use flate2::read::MultiGzDecoder;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use tracing::{info, warn};

/// How a channel's fetch loop finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// Every day in the range was downloaded and stored.
    Completed,
    /// The archive for `day` is not published yet; later days were skipped.
    NotYetAvailable { day: NaiveDate },
}

/// Rows and files written for one archive day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayStats {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub files: usize,
}

enum Download {
    Ready(HttpResponse),
    NotYetAvailable,
}

/// Fetcher for the quote/trade archive.
pub struct ArchiveFetcher<'a> {
    transport: &'a dyn Transport,
    clock: &'a dyn Clock,
    store: &'a PartitionStore,
    config: &'a FetchConfig,
}

impl<'a> ArchiveFetcher<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        clock: &'a dyn Clock,
        store: &'a PartitionStore,
        config: &'a FetchConfig,
    ) -> Self {
        Self {
            transport,
            clock,
            store,
            config,
        }
    }

    /// Archive URL for one record kind and day: `{endpoint}/{kind}/{YYYYMMDD}.csv.gz`.
    pub fn archive_url(&self, kind: &str, day: NaiveDate) -> String {
        format!(
            "{}/{kind}/{}.csv.gz",
            self.config.archive_endpoint.trim_end_matches('/'),
            day.format("%Y%m%d")
        )
    }

    /// Download and store every day in `range` for a quote or trade channel.
    ///
    /// Stops at the first day whose retries are exhausted: with a
    /// `NotYetAvailable` outcome if that day is today or yesterday and the
    /// archive kept answering 404, with an error otherwise.
    pub fn fetch_range(
        &self,
        channel: Channel,
        symbols: &BTreeSet<String>,
        range: DateRange,
        state: &mut RunState,
    ) -> Result<ChannelOutcome, DataError> {
        let kind = channel.archive_kind().ok_or_else(|| {
            DataError::ValidationError(format!("channel '{channel}' is not served by the archive"))
        })?;

        info!(%channel, start = %range.start, end = %range.end, "start processing archive");
        for day in range.days() {
            let url = self.archive_url(kind, day);
            let resp = match self.download(&url, day)? {
                Download::Ready(resp) => resp,
                Download::NotYetAvailable => {
                    info!(%channel, %day, "archive not (yet) published");
                    return Ok(ChannelOutcome::NotYetAvailable { day });
                }
            };

            let stats = self.store_day(channel, day, resp.body, symbols, state)?;
            info!(
                %channel,
                %day,
                rows = stats.rows_kept,
                files = stats.files,
                "processed archive day"
            );
        }

        Ok(ChannelOutcome::Completed)
    }

    /// GET `url` until it succeeds or `archive_max_attempts` is reached.
    fn download(&self, url: &str, day: NaiveDate) -> Result<Download, DataError> {
        let max_attempts = self.config.archive_max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let (status, reason) = match self.transport.get(url) {
                Ok(resp) if resp.is_success() => return Ok(Download::Ready(resp)),
                Ok(resp) => (Some(resp.status), format!("HTTP {}", resp.status)),
                Err(e) => (None, e.to_string()),
            };

            if attempt >= max_attempts {
                if status == Some(404) && self.is_publishing_lag(day) {
                    return Ok(Download::NotYetAvailable);
                }
                return Err(DataError::ProviderExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last: reason,
                });
            }

            warn!(url, attempt, %reason, "archive download failed, retrying");
            self.clock.sleep(self.config.archive_retry_delay());
        }
    }

    /// The provider publishes with a delay of up to a day.
    fn is_publishing_lag(&self, day: NaiveDate) -> bool {
        let today = self.clock.today();
        day == today || day == today - Duration::days(1)
    }

    /// Decompress one archive body and write its rows for `symbols`.
    ///
    /// A symbol with no rows in this archive gets no file for the day.
    pub fn store_day(
        &self,
        channel: Channel,
        day: NaiveDate,
        body: impl Read,
        symbols: &BTreeSet<String>,
        state: &mut RunState,
    ) -> Result<DayStats, DataError> {
        let decoder = MultiGzDecoder::new(BufReader::new(body));
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(decoder);

        let header = channel.header();
        let mut writers: HashMap<String, csv::Writer<File>> = HashMap::new();
        let mut stats = DayStats::default();
        let mut record = csv::StringRecord::new();

        while rdr
            .read_record(&mut record)
            .map_err(|e| DataError::ResponseFormatChanged(format!("archive {day}: {e}")))?
        {
            stats.rows_read += 1;
            let Some(symbol) = record.get(1) else {
                continue;
            };
            if !symbols.contains(symbol) {
                continue;
            }

            if !writers.contains_key(symbol) {
                let path = self.store.location_for(symbol, channel, None, day)?;
                let touch = state.touch(&path);
                writers.insert(symbol.to_string(), self.store.open(&path, header, touch)?);
            }
            let Some(wtr) = writers.get_mut(symbol) else {
                continue;
            };

            normalize_row(&record)
                .write_to(wtr)
                .map_err(|e| DataError::storage(&format!("write {symbol} {day}"), e))?;
            stats.rows_kept += 1;
        }

        stats.files = writers.len();
        for (symbol, mut wtr) in writers {
            wtr.flush()
                .map_err(|e| DataError::storage(&format!("flush {symbol} {day}"), e))?;
        }
        Ok(stats)
    }
}

/// Copy of `record` with its timestamp separator normalized.
fn normalize_row(record: &csv::StringRecord) -> csv::StringRecord {
    record
        .iter()
        .enumerate()
        .map(|(i, field)| {
            if i == 0 {
                normalize_timestamp(field)
            } else {
                field.to_string()
            }
        })
        .collect()
}
