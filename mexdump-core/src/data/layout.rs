//! Date-partitioned CSV storage.
//!
//! Layout:
//! - `{root}/{SYMBOL}/{channel}/{year}/{month}/YYYY-MM-DD.csv` (quotes, trades)
//! - `{root}/{SYMBOL}/bars/{resolution}/{year}/{month}/YYYY-MM-DD.csv` (bars)
//!
//! One file holds exactly one calendar day for one symbol and channel.
//! The first time a file is touched during a run it is deleted and recreated
//! with a fresh header; every later touch in the same run appends.

use super::pacing::RequestBudget;
use super::provider::DataError;
use super::schema::{BarRecord, BarResolution, Channel};
use chrono::{Datelike, NaiveDate};
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Whether a write is the first touch of its file in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touch {
    /// Replace whatever is on disk and write the header.
    Fresh,
    /// Append rows under the header written earlier in this run.
    Append,
}

/// Process-local state threaded through every fetch in a run.
#[derive(Debug)]
pub struct RunState {
    touched: HashSet<PathBuf>,
    pub budget: RequestBudget,
}

impl RunState {
    pub fn new(budget: RequestBudget) -> Self {
        Self {
            touched: HashSet::new(),
            budget,
        }
    }

    /// Record a touch of `path`, returning whether it is the first one.
    pub fn touch(&mut self, path: &Path) -> Touch {
        if self.touched.insert(path.to_path_buf()) {
            Touch::Fresh
        } else {
            Touch::Append
        }
    }

    pub fn touched_count(&self) -> usize {
        self.touched.len()
    }
}

/// A row that can be written to a partition file.
pub trait CsvRow {
    fn write_to(&self, wtr: &mut csv::Writer<File>) -> Result<(), csv::Error>;
}

impl CsvRow for csv::StringRecord {
    fn write_to(&self, wtr: &mut csv::Writer<File>) -> Result<(), csv::Error> {
        wtr.write_record(self)
    }
}

impl CsvRow for BarRecord {
    fn write_to(&self, wtr: &mut csv::Writer<File>) -> Result<(), csv::Error> {
        wtr.write_record([
            self.timestamp.clone(),
            self.symbol.clone(),
            cell(&self.open),
            cell(&self.high),
            cell(&self.low),
            cell(&self.close),
            cell(&self.trades),
            cell(&self.volume),
            cell(&self.vwap),
            cell(&self.last_size),
            cell(&self.turnover),
            cell(&self.home_notional),
            cell(&self.foreign_notional),
        ])
    }
}

/// Empty for a null value, the value's own text otherwise.
fn cell<T: fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

/// Path of the partition file for one (symbol, channel, resolution, day).
///
/// `resolution` is only meaningful for bars and is ignored otherwise.
pub fn partition_path(
    root: &Path,
    symbol: &str,
    channel: Channel,
    resolution: Option<BarResolution>,
    date: NaiveDate,
) -> PathBuf {
    let mut path = root.join(symbol).join(channel.as_str());
    if let (Channel::Bars, Some(res)) = (channel, resolution) {
        path.push(res.as_str());
    }
    path.push(date.year().to_string());
    path.push(date.month().to_string());
    path.push(format!("{}.csv", date.format("%Y-%m-%d")));
    path
}

/// Storage layout manager rooted at the destination directory.
#[derive(Debug, Clone)]
pub struct PartitionStore {
    root: PathBuf,
}

impl PartitionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Partition path for the given day, with its parent directories created.
    pub fn location_for(
        &self,
        symbol: &str,
        channel: Channel,
        resolution: Option<BarResolution>,
        date: NaiveDate,
    ) -> Result<PathBuf, DataError> {
        let path = partition_path(&self.root, symbol, channel, resolution, date);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| DataError::storage(&format!("create {}", dir.display()), e))?;
        }
        Ok(path)
    }

    /// Open a partition file for writing.
    ///
    /// `Touch::Fresh` removes any existing file and writes `header` as the
    /// first line; `Touch::Append` opens for append and writes no header.
    pub fn open(
        &self,
        path: &Path,
        header: &[&str],
        touch: Touch,
    ) -> Result<csv::Writer<File>, DataError> {
        let file = match touch {
            Touch::Fresh => {
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(DataError::storage(&format!("remove {}", path.display()), e))
                    }
                }
                File::create(path)
            }
            Touch::Append => OpenOptions::new().create(true).append(true).open(path),
        }
        .map_err(|e| DataError::storage(&format!("open {}", path.display()), e))?;

        // archive rows are copied as-is, ragged ones included
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);
        if touch == Touch::Fresh {
            wtr.write_record(header)
                .map_err(|e| DataError::storage(&format!("write {}", path.display()), e))?;
        }
        Ok(wtr)
    }

    /// Write `rows` to `path` under the first-touch rule and flush.
    pub fn write_records<R: CsvRow>(
        &self,
        path: &Path,
        header: &[&str],
        rows: &[R],
        touch: Touch,
    ) -> Result<(), DataError> {
        let mut wtr = self.open(path, header, touch)?;
        for row in rows {
            row.write_to(&mut wtr)
                .map_err(|e| DataError::storage(&format!("write {}", path.display()), e))?;
        }
        wtr.flush()
            .map_err(|e| DataError::storage(&format!("flush {}", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::{BAR_HEADER, TRADE_HEADER};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(fields: &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(fields.to_vec())
    }

    #[test]
    fn archive_partition_layout() {
        let path = partition_path(
            Path::new("/data/BITMEX"),
            "XBTUSD",
            Channel::Trades,
            None,
            day(2021, 3, 9),
        );
        assert_eq!(
            path,
            PathBuf::from("/data/BITMEX/XBTUSD/trades/2021/3/2021-03-09.csv")
        );
    }

    #[test]
    fn bar_partition_layout_includes_resolution() {
        let path = partition_path(
            Path::new("/data/BITMEX"),
            "ETHUSD",
            Channel::Bars,
            Some(BarResolution::OneHour),
            day(2020, 12, 1),
        );
        assert_eq!(
            path,
            PathBuf::from("/data/BITMEX/ETHUSD/bars/1h/2020/12/2020-12-01.csv")
        );
    }

    #[test]
    fn location_for_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let path = store
            .location_for("XBTUSD", Channel::Quotes, None, day(2021, 3, 9))
            .unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(!path.exists());
    }

    #[test]
    fn run_state_touch_is_fresh_once() {
        let mut state = RunState::new(RequestBudget::default());
        let p = Path::new("/tmp/a.csv");
        assert_eq!(state.touch(p), Touch::Fresh);
        assert_eq!(state.touch(p), Touch::Append);
        assert_eq!(state.touch(Path::new("/tmp/b.csv")), Touch::Fresh);
        assert_eq!(state.touched_count(), 2);
    }

    #[test]
    fn fresh_touch_replaces_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let path = store
            .location_for("XBTUSD", Channel::Trades, None, day(2021, 3, 9))
            .unwrap();
        fs::write(&path, "stale,content\nfrom,before\n").unwrap();

        let first = [row(&["2021-03-09T00:00:01.000", "XBTUSD", "Buy", "10"])];
        store
            .write_records(&path, &TRADE_HEADER, &first, Touch::Fresh)
            .unwrap();
        let second = [row(&["2021-03-09T00:00:02.000", "XBTUSD", "Sell", "5"])];
        store
            .write_records(&path, &TRADE_HEADER, &second, Touch::Append)
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], TRADE_HEADER.join(","));
        assert_eq!(lines[1], "2021-03-09T00:00:01.000,XBTUSD,Buy,10");
        assert_eq!(lines[2], "2021-03-09T00:00:02.000,XBTUSD,Sell,5");
    }

    #[test]
    fn bar_row_numbers_are_written_as_received() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let path = store
            .location_for("XBTUSD", Channel::Bars, Some(BarResolution::OneMinute), day(2021, 3, 9))
            .unwrap();
        let bar: BarRecord = serde_json::from_str(
            r#"{"timestamp":"2021-03-09T23:59:00.000Z","symbol":"XBTUSD",
            "open":54000,"high":54010,"low":53990,"close":54001,"trades":12,
            "volume":150000,"vwap":54002.1,"lastSize":100,"turnover":277777000,
            "homeNotional":2.77,"foreignNotional":150000}"#,
        )
        .unwrap();

        store
            .write_records(&path, &BAR_HEADER, &[bar], Touch::Fresh)
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.lines().nth(1),
            Some(
                "2021-03-09T23:59:00.000Z,XBTUSD,54000,54010,53990,54001,12,150000,\
                 54002.1,100,277777000,2.77,150000"
            )
        );
    }

    #[test]
    fn null_bar_fields_are_left_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path());
        let path = store
            .location_for("XBTUSD", Channel::Bars, Some(BarResolution::OneDay), day(2021, 3, 10))
            .unwrap();
        let bar: BarRecord = serde_json::from_str(
            r#"{"timestamp":"2021-03-10T00:00:00.000Z","symbol":"XBTUSD",
            "open":null,"high":null,"low":null,"close":null,"trades":0,"volume":0,
            "vwap":null,"lastSize":null,"turnover":0,"homeNotional":0,"foreignNotional":0}"#,
        )
        .unwrap();

        store
            .write_records(&path, &BAR_HEADER, &[bar], Touch::Fresh)
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.lines().nth(1),
            Some("2021-03-10T00:00:00.000Z,XBTUSD,,,,,0,0,,,0,0,0")
        );
    }

    #[test]
    fn storage_failure_when_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("root");
        fs::write(&blocker, "not a directory").unwrap();
        let store = PartitionStore::new(&blocker);

        let err = store
            .location_for("XBTUSD", Channel::Trades, None, day(2021, 3, 9))
            .unwrap_err();
        assert!(matches!(err, DataError::StorageFailure(_)));
    }
}
