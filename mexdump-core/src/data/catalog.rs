//! Request validation: date range, instrument catalog, destination directory.
//!
//! Everything here runs once before any fetching starts; a failure is a
//! `ValidationError` (or `UnknownSymbols`) surfaced directly to the operator.

use super::provider::{DataError, Transport};
use super::schema::DateRange;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Check `start`/`end` against the provider's history, clamping a future end to `today`.
pub fn validate_dates(
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
    earliest: NaiveDate,
) -> Result<DateRange, DataError> {
    if start < earliest {
        return Err(DataError::ValidationError(format!(
            "start date can't be earlier than {earliest}"
        )));
    }
    if end < start {
        return Err(DataError::ValidationError(
            "end date can't be earlier than start date".into(),
        ));
    }
    Ok(DateRange::new(start, end.min(today)))
}

#[derive(Debug, Deserialize)]
struct Instrument {
    symbol: String,
}

/// Set of symbols the provider lists (current and expired instruments).
#[derive(Debug, Clone, Default)]
pub struct InstrumentCatalog {
    symbols: HashSet<String>,
}

impl InstrumentCatalog {
    pub fn from_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    /// Download the instrument list from `url`.
    pub fn fetch(transport: &dyn Transport, url: &str) -> Result<Self, DataError> {
        let resp = transport.get(url)?;
        if !resp.is_success() {
            return Err(DataError::HttpStatus {
                status: resp.status,
                url: url.to_string(),
            });
        }
        let body = resp.into_bytes()?;
        let instruments: Vec<Instrument> = serde_json::from_slice(&body).map_err(|e| {
            DataError::ResponseFormatChanged(format!("instrument list from {url}: {e}"))
        })?;
        Ok(Self::from_symbols(instruments.into_iter().map(|i| i.symbol)))
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Error listing every requested symbol the catalog does not know.
    pub fn validate_symbols(&self, requested: &BTreeSet<String>) -> Result<(), DataError> {
        let unknown: Vec<String> = requested
            .iter()
            .filter(|s| !self.contains(s))
            .cloned()
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(DataError::UnknownSymbols(unknown))
        }
    }
}

/// Resolve and create the destination root: `{save_to or cwd}/{base_dir}`.
///
/// An explicit `save_to` must already exist.
pub fn prepare_destination(save_to: Option<&Path>, base_dir: &str) -> Result<PathBuf, DataError> {
    let parent = match save_to {
        Some(path) => {
            if !path.is_dir() {
                return Err(DataError::ValidationError(format!(
                    "the path you provided does not exist: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => std::env::current_dir().map_err(|e| {
            DataError::ValidationError(format!("cannot resolve working directory: {e}"))
        })?,
    };

    let root = parent.join(base_dir);
    fs::create_dir_all(&root).map_err(|e| {
        if e.kind() == ErrorKind::PermissionDenied {
            DataError::ValidationError(format!(
                "you don't have permissions to write on {}",
                parent.display()
            ))
        } else {
            DataError::ValidationError(format!("cannot create {}: {e}", root.display()))
        }
    })?;
    Ok(root)
}
