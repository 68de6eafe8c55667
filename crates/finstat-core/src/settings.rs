//! Run configuration.

use std::time::Duration;

use time::Date;

use crate::domain::PeriodRange;
use crate::enricher::DEFAULT_PRICE_WORKERS;
use crate::orchestrator::{OrchestratorConfig, DEFAULT_MAX_WORKERS, DEFAULT_PER_SYMBOL_BUDGET};
use crate::retry::RetryConfig;
use crate::throttling::RateQuota;
use crate::ValidationError;

pub const DEFAULT_BASE_URL: &str = "https://www.setsmart.com/api/listed-company-api";
pub const DEFAULT_LOOKBACK_YEARS: u16 = 5;

pub const API_KEY_ENV: &str = "FINSTAT_API_KEY";
pub const LEGACY_API_KEY_ENV: &str = "SETSMART_API_KEY";
pub const BASE_URL_ENV: &str = "FINSTAT_BASE_URL";

/// Everything a fetch run needs besides the symbol list.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub base_url: String,
    pub api_key: String,
    pub lookback_years: u16,
    pub max_workers: usize,
    pub price_workers: usize,
    pub rate_quota: RateQuota,
    pub per_symbol_budget: Duration,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            base_url: String::from(DEFAULT_BASE_URL),
            api_key: String::new(),
            lookback_years: DEFAULT_LOOKBACK_YEARS,
            max_workers: DEFAULT_MAX_WORKERS,
            price_workers: DEFAULT_PRICE_WORKERS,
            rate_quota: RateQuota::default(),
            per_symbol_budget: DEFAULT_PER_SYMBOL_BUDGET,
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

impl FetchSettings {
    /// Defaults overlaid with `FINSTAT_API_KEY` (or `SETSMART_API_KEY`) and
    /// `FINSTAT_BASE_URL` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut settings = Self::default();

        if let Some(api_key) = non_blank(API_KEY_ENV).or_else(|| non_blank(LEGACY_API_KEY_ENV)) {
            settings.api_key = api_key.trim().to_owned();
        }
        if let Some(base_url) = non_blank(BASE_URL_ENV) {
            settings.base_url = base_url.trim().to_owned();
        }
        settings
    }

    /// Checked before any network call.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_key.trim().is_empty() {
            return Err(ValidationError::MissingApiKey);
        }
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(ValidationError::InvalidBaseUrl {
                value: self.base_url.clone(),
            });
        }

        let zero = [
            ("lookback_years", self.lookback_years == 0),
            ("max_workers", self.max_workers == 0),
            ("price_workers", self.price_workers == 0),
            ("rate_burst", self.rate_quota.burst == 0),
            ("rate_refill_interval", self.rate_quota.refill_interval.is_zero()),
            ("per_symbol_budget", self.per_symbol_budget.is_zero()),
            ("request_timeout", self.request_timeout.is_zero()),
        ];
        match zero.into_iter().find(|(_, is_zero)| *is_zero) {
            Some((field, _)) => Err(ValidationError::ZeroSetting { field }),
            None => Ok(()),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_workers: self.max_workers,
            price_workers: self.price_workers,
            per_symbol_budget: self.per_symbol_budget,
        }
    }

    /// Statement window ending at the quarter containing `as_of`.
    pub fn period_range(&self, as_of: Date) -> PeriodRange {
        PeriodRange::trailing_years(as_of, self.lookback_years)
    }
}
