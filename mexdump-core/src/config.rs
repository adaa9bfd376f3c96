//! Provider endpoints and pacing constants.
//!
//! Every field has a default matching the provider's published limits, so an
//! empty TOML document is a valid configuration.

use crate::data::pacing::RequestBudget;
use crate::data::provider::DataError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    /// Bucketed-trade query API (bars).
    pub bars_endpoint: String,

    /// Archive base URL; files live at `{archive_endpoint}/{kind}/{YYYYMMDD}.csv.gz`.
    pub archive_endpoint: String,

    /// Instrument catalog used to validate symbols.
    pub instrument_endpoint: String,

    /// Maximum rows per bar request.
    pub page_size: u32,

    /// Requests allowed per budget window.
    pub budget_requests: u32,
    pub budget_window_secs: u64,

    /// Pause after an HTTP 429 before retrying the same page.
    pub rate_limit_cooldown_secs: u64,

    /// Pause after a bar page comes back empty.
    pub empty_page_pause_secs: u64,

    /// Download attempts per archive file, and the pause between them.
    pub archive_max_attempts: u32,
    pub archive_retry_delay_secs: u64,

    /// Earliest date the provider has data for.
    pub earliest_date: NaiveDate,

    /// Directory created under the destination path to hold all symbols.
    pub base_dir: String,

    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            bars_endpoint: "https://www.bitmex.com/api/v1/trade/bucketed".into(),
            archive_endpoint: "https://s3-eu-west-1.amazonaws.com/public.bitmex.com/data".into(),
            instrument_endpoint: "https://www.bitmex.com/api/v1/instrument?count=500&reverse=false"
                .into(),
            page_size: 500,
            budget_requests: 30,
            budget_window_secs: 60,
            rate_limit_cooldown_secs: 60,
            empty_page_pause_secs: 1,
            archive_max_attempts: 10,
            archive_retry_delay_secs: 10,
            earliest_date: NaiveDate::from_ymd_opt(2014, 11, 22).unwrap_or_default(),
            base_dir: "BITMEX".into(),
            http_timeout_secs: 60,
            user_agent: concat!("mexdump/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl FetchConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DataError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        let config: Self =
            toml::from_str(content).map_err(|e| DataError::Config(format!("parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), DataError> {
        if self.page_size == 0 {
            return Err(DataError::Config("page_size must be at least 1".into()));
        }
        if self.archive_max_attempts == 0 {
            return Err(DataError::Config(
                "archive_max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn request_budget(&self) -> RequestBudget {
        RequestBudget::new(
            self.budget_requests,
            Duration::from_secs(self.budget_window_secs),
        )
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn empty_page_pause(&self) -> Duration {
        Duration::from_secs(self.empty_page_pause_secs)
    }

    pub fn archive_retry_delay(&self) -> Duration {
        Duration::from_secs(self.archive_retry_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = FetchConfig::from_toml("").unwrap();
        assert_eq!(config, FetchConfig::default());
        assert_eq!(config.page_size, 500);
        assert_eq!(config.archive_max_attempts, 10);
        assert_eq!(
            config.earliest_date,
            NaiveDate::from_ymd_opt(2014, 11, 22).unwrap()
        );
    }

    #[test]
    fn overrides_are_applied() {
        let config = FetchConfig::from_toml(
            r#"
            archive_retry_delay_secs = 2
            base_dir = "MEX"
            earliest_date = "2016-01-01"
            "#,
        )
        .unwrap();
        assert_eq!(config.archive_retry_delay(), Duration::from_secs(2));
        assert_eq!(config.base_dir, "MEX");
        assert_eq!(config.budget_requests, 30);
    }

    #[test]
    fn rejects_zero_page_size() {
        let err = FetchConfig::from_toml("page_size = 0").unwrap_err();
        assert!(matches!(err, DataError::Config(_)));
    }
}
