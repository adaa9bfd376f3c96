//! Download orchestrator: sequences the fetchers per channel and collects a report.
//!
//! Channels run one after another (trades, quotes, bars) on the calling
//! thread. A channel that fails is reported and the next one still runs.

use super::archive::{ArchiveFetcher, ChannelOutcome};
use super::bars::BarFetcher;
use super::layout::{PartitionStore, RunState};
use super::pacing::Clock;
use super::provider::{DataError, Transport};
use super::schema::{BarResolution, Channel, DateRange};
use crate::config::FetchConfig;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info};

/// Order in which requested channels are processed.
pub const CHANNEL_ORDER: [Channel; 3] = [Channel::Trades, Channel::Quotes, Channel::Bars];

/// A validated download request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub symbols: BTreeSet<String>,
    pub channels: BTreeSet<Channel>,
    pub resolutions: BTreeSet<BarResolution>,
    pub range: DateRange,
    pub root: PathBuf,
}

impl FetchRequest {
    /// Collapse duplicates and check that resolutions are given iff bars are requested.
    pub fn new(
        symbols: impl IntoIterator<Item = String>,
        channels: impl IntoIterator<Item = Channel>,
        resolutions: impl IntoIterator<Item = BarResolution>,
        range: DateRange,
        root: impl Into<PathBuf>,
    ) -> Result<Self, DataError> {
        let symbols: BTreeSet<String> = symbols.into_iter().collect();
        let channels: BTreeSet<Channel> = channels.into_iter().collect();
        let resolutions: BTreeSet<BarResolution> = resolutions.into_iter().collect();

        if symbols.is_empty() {
            return Err(DataError::ValidationError("at least one symbol is required".into()));
        }
        validate_channels(&channels, &resolutions)?;

        Ok(Self {
            symbols,
            channels,
            resolutions,
            range,
            root: root.into(),
        })
    }
}

/// Require at least one channel, and time frames exactly when bars are requested.
///
/// Needs neither network nor filesystem, so callers can run it before anything else.
pub fn validate_channels(
    channels: &BTreeSet<Channel>,
    resolutions: &BTreeSet<BarResolution>,
) -> Result<(), DataError> {
    if channels.is_empty() {
        return Err(DataError::ValidationError("at least one channel is required".into()));
    }
    let wants_bars = channels.contains(&Channel::Bars);
    if wants_bars && resolutions.is_empty() {
        return Err(DataError::ValidationError(
            "channel 'bars' requires at least one time frame (1m, 5m, 1h, 1d)".into(),
        ));
    }
    if !wants_bars && !resolutions.is_empty() {
        return Err(DataError::ValidationError(
            "time frames provided but channel 'bars' is not enabled".into(),
        ));
    }
    Ok(())
}

/// Final status of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Success,
    NotYetAvailable { day: NaiveDate },
    Failed(String),
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Success => f.write_str("Success - all data downloaded and stored."),
            ChannelStatus::NotYetAvailable { day } => {
                write!(f, "Failed to download: {day} - data not (yet) available.")
            }
            ChannelStatus::Failed(reason) => write!(f, "Failed: {reason}"),
        }
    }
}

/// Per-channel statuses, in processing order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub entries: Vec<(Channel, ChannelStatus)>,
}

impl RunReport {
    pub fn status(&self, channel: Channel) -> Option<&ChannelStatus> {
        self.entries
            .iter()
            .find(|(ch, _)| *ch == channel)
            .map(|(_, status)| status)
    }

    /// True unless some channel failed. A channel that stopped at an
    /// unpublished day still counts as succeeded.
    pub fn all_succeeded(&self) -> bool {
        !self
            .entries
            .iter()
            .any(|(_, status)| matches!(status, ChannelStatus::Failed(_)))
    }
}

/// Run every requested channel and report how each one ended.
pub fn run_download(
    request: &FetchRequest,
    transport: &dyn Transport,
    clock: &dyn Clock,
    config: &FetchConfig,
) -> RunReport {
    let store = PartitionStore::new(&request.root);
    let mut state = RunState::new(config.request_budget());
    let mut report = RunReport::default();

    for channel in CHANNEL_ORDER {
        if !request.channels.contains(&channel) {
            continue;
        }
        info!(%channel, "start processing");

        let result = match channel {
            Channel::Bars => BarFetcher::new(transport, clock, &store, config)
                .fetch_range(&request.symbols, &request.resolutions, request.range, &mut state)
                .map(|_| ChannelOutcome::Completed),
            Channel::Quotes | Channel::Trades => {
                ArchiveFetcher::new(transport, clock, &store, config).fetch_range(
                    channel,
                    &request.symbols,
                    request.range,
                    &mut state,
                )
            }
        };

        let status = match result {
            Ok(ChannelOutcome::Completed) => ChannelStatus::Success,
            Ok(ChannelOutcome::NotYetAvailable { day }) => ChannelStatus::NotYetAvailable { day },
            Err(e) => {
                error!(%channel, error = %e, "channel aborted");
                ChannelStatus::Failed(e.to_string())
            }
        };
        report.entries.push((channel, status));
    }

    report
}
