//! Shared test doubles: a scripted transport, a fake bar API and archive fixtures.

#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use flate2::write::GzEncoder;
use flate2::Compression;
use mexdump_core::data::{DataError, HttpResponse, ManualClock, Transport};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Handler = Box<dyn Fn(&str, usize) -> Result<HttpResponse, DataError>>;

/// One request seen by the transport, stamped with simulated time.
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub at: Duration,
}

/// Transport answering from a closure of (url, call index).
pub struct ScriptedTransport {
    clock: Arc<ManualClock>,
    handler: Handler,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new(
        clock: Arc<ManualClock>,
        handler: impl Fn(&str, usize) -> Result<HttpResponse, DataError> + 'static,
    ) -> Self {
        Self {
            clock,
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, DataError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                url: url.to_string(),
                at: self.clock.elapsed(),
            });
            calls.len() - 1
        };
        (self.handler)(url, index)
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn manual_clock(today: NaiveDate) -> Arc<ManualClock> {
    Arc::new(ManualClock::new(today))
}

pub fn status(code: u16) -> Result<HttpResponse, DataError> {
    Ok(HttpResponse::new(code, Cursor::new(Vec::new())))
}

pub fn body(code: u16, bytes: Vec<u8>) -> Result<HttpResponse, DataError> {
    Ok(HttpResponse::new(code, Cursor::new(bytes)))
}

/// Value of a query parameter in `url`.
pub fn query_param<'a>(url: &'a str, key: &str) -> Option<&'a str> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

pub fn bar_json(timestamp: &str, symbol: &str, close: f64) -> serde_json::Value {
    serde_json::json!({
        "timestamp": timestamp,
        "symbol": symbol,
        "open": close - 1.0,
        "high": close + 2.0,
        "low": close - 2.0,
        "close": close,
        "trades": 7,
        "volume": 1200,
        "vwap": close,
        "lastSize": 10,
        "turnover": 22000000,
        "homeNotional": 0.22,
        "foreignNotional": 1200.0
    })
}

pub fn json_page(rows: &[serde_json::Value]) -> Result<HttpResponse, DataError> {
    body(200, serde_json::to_vec(rows).unwrap())
}

/// Fake bucketed-bar API: one bar per bucket from `max(startTime, listed)`
/// up to `endTime` (exclusive), at most `count` per page.
pub fn fake_bar_page(url: &str, listed: NaiveDateTime) -> Result<HttpResponse, DataError> {
    let parse = |key: &str| {
        NaiveDateTime::parse_from_str(query_param(url, key).unwrap(), "%Y-%m-%dT%H:%M:%S").unwrap()
    };
    let end = parse("endTime");
    let count: usize = query_param(url, "count").unwrap().parse().unwrap();
    let symbol = query_param(url, "symbol").unwrap();
    let bucket = match query_param(url, "binSize").unwrap() {
        "1m" => ChronoDuration::minutes(1),
        "5m" => ChronoDuration::minutes(5),
        "1h" => ChronoDuration::hours(1),
        _ => ChronoDuration::days(1),
    };

    let mut rows = Vec::new();
    let mut ts = parse("startTime").max(listed);
    while ts < end && rows.len() < count {
        let stamp = format!("{}.000Z", ts.format("%Y-%m-%dT%H:%M:%S"));
        let close = 100.0 + (ts.and_utc().timestamp() / 60 % 1000) as f64;
        rows.push(bar_json(&stamp, symbol, close));
        ts += bucket;
    }
    json_page(&rows)
}

/// Gzip a CSV document made of `lines`.
pub fn gzip_lines(lines: &[&str]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    for line in lines {
        enc.write_all(line.as_bytes()).unwrap();
        enc.write_all(b"\n").unwrap();
    }
    enc.finish().unwrap()
}

/// Every file under `root`, keyed by path relative to it.
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, String> {
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, out);
        } else {
            let rel = path.strip_prefix(root).unwrap().to_path_buf();
            out.insert(rel, std::fs::read_to_string(&path).unwrap());
        }
    }
}
