//! Bucketed bar fetcher.
//!
//! Walks a cursor across the requested range for each (symbol, resolution)
//! pair, one page of at most `page_size` buckets per request. Requests are
//! charged to the run's shared [`RequestBudget`](super::pacing::RequestBudget);
//! HTTP 429 is retried indefinitely after a cooldown.

use super::layout::{PartitionStore, RunState};
use super::pacing::Clock;
use super::provider::{DataError, Transport};
use super::schema::{BarRecord, BarResolution, Channel, DateRange, BAR_HEADER};
use crate::config::FetchConfig;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

const TOO_MANY_REQUESTS: u16 = 429;

/// Totals for one (symbol, resolution) walk, or summed over several.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarStats {
    pub requests: usize,
    pub empty_pages: usize,
    pub rows_written: usize,
    pub rows_discarded: usize,
}

impl BarStats {
    fn absorb(&mut self, other: &BarStats) {
        self.requests += other.requests;
        self.empty_pages += other.empty_pages;
        self.rows_written += other.rows_written;
        self.rows_discarded += other.rows_discarded;
    }
}

/// Fetcher for the bucketed bar query API.
pub struct BarFetcher<'a> {
    transport: &'a dyn Transport,
    clock: &'a dyn Clock,
    store: &'a PartitionStore,
    config: &'a FetchConfig,
}

impl<'a> BarFetcher<'a> {
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

    /// Query URL for one page starting at `cursor` and ending (exclusive) at `until`.
    pub fn page_url(
        &self,
        symbol: &str,
        resolution: BarResolution,
        cursor: NaiveDateTime,
        until: NaiveDateTime,
    ) -> String {
        format!(
            "{}?binSize={resolution}&partial=false&symbol={symbol}&count={}\
             &start=0&reverse=false&startTime={}&endTime={}",
            self.config.bars_endpoint,
            self.config.page_size,
            cursor.format("%Y-%m-%dT%H:%M:%S"),
            until.format("%Y-%m-%dT%H:%M:%S"),
        )
    }

    /// Fetch every requested (symbol, resolution) pair, one after another.
    pub fn fetch_range(
        &self,
        symbols: &BTreeSet<String>,
        resolutions: &BTreeSet<BarResolution>,
        range: DateRange,
        state: &mut RunState,
    ) -> Result<BarStats, DataError> {
        let mut total = BarStats::default();
        for symbol in symbols {
            for &resolution in resolutions {
                let stats = self.fetch_series(symbol, resolution, range, state)?;
                info!(
                    symbol = symbol.as_str(),
                    %resolution,
                    rows = stats.rows_written,
                    requests = stats.requests,
                    "finished bar series"
                );
                total.absorb(&stats);
            }
        }
        Ok(total)
    }

    /// Walk one (symbol, resolution) pair from `range.start` to `range.end + 1 day`.
    pub fn fetch_series(
        &self,
        symbol: &str,
        resolution: BarResolution,
        range: DateRange,
        state: &mut RunState,
    ) -> Result<BarStats, DataError> {
        let until = (range.end + Duration::days(1)).and_time(NaiveTime::MIN);
        let stride = resolution.stride(self.config.page_size);
        let mut cursor = range.start.and_time(NaiveTime::MIN);
        let mut stats = BarStats::default();

        while cursor < until {
            let url = self.page_url(symbol, resolution, cursor, until);
            let (rows, requests) = self.fetch_page(&url, state)?;
            stats.requests += requests;

            if rows.is_empty() {
                info!(symbol, %resolution, day = %cursor.date(), "no data for page");
                stats.empty_pages += 1;
                cursor += Duration::days(1);
                let pause = self.config.empty_page_pause();
                if !pause.is_zero() {
                    self.clock.sleep(pause);
                }
                continue;
            }

            let (written, discarded) = self.store_page(symbol, resolution, range.end, rows, state)?;
            stats.rows_written += written;
            stats.rows_discarded += discarded;
            info!(symbol, %resolution, day = %cursor.date(), rows = written, "processed bar page");

            cursor += stride;
        }

        Ok(stats)
    }

    /// Issue one page request, retrying through 429s.
    ///
    /// Returns the decoded rows and the number of requests it took.
    fn fetch_page(
        &self,
        url: &str,
        state: &mut RunState,
    ) -> Result<(Vec<BarRecord>, usize), DataError> {
        let mut requests = 0;
        loop {
            state.budget.acquire(self.clock);
            requests += 1;
            debug!(url, "requesting bar page");
            let resp = self.transport.get(url)?;

            if resp.status == TOO_MANY_REQUESTS {
                let cooldown = self.config.rate_limit_cooldown();
                warn!(
                    url,
                    cooldown_secs = cooldown.as_secs(),
                    "rate limited by provider, retrying"
                );
                self.clock.sleep(cooldown);
                if cooldown >= state.budget.window() {
                    state.budget.reset();
                }
                continue;
            }

            if !resp.is_success() {
                return Err(DataError::HttpStatus {
                    status: resp.status,
                    url: url.to_string(),
                });
            }

            let body = resp.into_bytes()?;
            let rows: Vec<BarRecord> = serde_json::from_slice(&body).map_err(|e| {
                DataError::ResponseFormatChanged(format!("bar page from {url}: {e}"))
            })?;
            return Ok((rows, requests));
        }
    }

    /// Write one page of bars into daily files, dropping rows past `end`.
    ///
    /// Consecutive rows of the same day are written in one batch. A day's file
    /// is recreated only on its first touch in the run, so a day split across
    /// two pages keeps the rows of both.
    ///
    /// Returns `(written, discarded)`.
    pub fn store_page(
        &self,
        symbol: &str,
        resolution: BarResolution,
        end: NaiveDate,
        rows: Vec<BarRecord>,
        state: &mut RunState,
    ) -> Result<(usize, usize), DataError> {
        let mut written = 0;
        let mut discarded = 0;
        let mut current: Option<NaiveDate> = None;
        let mut batch: Vec<BarRecord> = Vec::new();

        for row in rows {
            let day = row.date().ok_or_else(|| {
                DataError::ResponseFormatChanged(format!("bad bar timestamp '{}'", row.timestamp))
            })?;
            if day > end {
                discarded += 1;
                continue;
            }
            if let Some(prev) = current.filter(|prev| *prev != day) {
                written += self.flush_day(symbol, resolution, prev, &mut batch, state)?;
            }
            current = Some(day);
            batch.push(row);
        }

        if let Some(day) = current {
            written += self.flush_day(symbol, resolution, day, &mut batch, state)?;
        }
        Ok((written, discarded))
    }

    fn flush_day(
        &self,
        symbol: &str,
        resolution: BarResolution,
        day: NaiveDate,
        batch: &mut Vec<BarRecord>,
        state: &mut RunState,
    ) -> Result<usize, DataError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let path = self
            .store
            .location_for(symbol, Channel::Bars, Some(resolution), day)?;
        let touch = state.touch(&path);
        self.store.write_records(&path, &BAR_HEADER, batch, touch)?;
        let n = batch.len();
        batch.clear();
        Ok(n)
    }
}
