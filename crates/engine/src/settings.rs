use std::path::PathBuf;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::{EngineError, retry::RetryPolicy};

/// Hard cap on category menu size, cancel button included.
pub const MAX_CATEGORY_MENU: usize = 13;

/// Longest allowed pending TTL: one day.
pub const MAX_PENDING_TTL_SECS: u64 = 86_400;

/// Engine tuning. Every field has a default so partial config files work.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// How long a pending disambiguation stays valid; 1..=86400.
    pub pending_ttl_secs: u64,
    /// Category menu size including the cancel button; clamped to 2..=13.
    pub category_menu_limit: usize,
    /// Minimum similarity for a fuzzy category match (exclusive).
    pub fuzzy_threshold: f64,
    pub remark_max_chars: usize,
    /// IANA time zone for record dates and reply timestamps.
    pub timezone: String,
    /// JSON lookup tables replacing the embedded copy.
    pub lookup_tables: Option<PathBuf>,
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pending_ttl_secs: 600,
            category_menu_limit: MAX_CATEGORY_MENU,
            fuzzy_threshold: 0.65,
            remark_max_chars: 30,
            timezone: "Asia/Taipei".to_string(),
            lookup_tables: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineSettings {
    pub fn time_zone(&self) -> Result<Tz, EngineError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| EngineError::Config(format!("unknown time zone '{}'", self.timezone)))
    }

    pub fn menu_limit(&self) -> usize {
        self.category_menu_limit.clamp(2, MAX_CATEGORY_MENU)
    }

    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..1.0).contains(&self.fuzzy_threshold) {
            return Err(EngineError::Config(format!(
                "fuzzy_threshold must be in [0, 1), got {}",
                self.fuzzy_threshold
            )));
        }
        if !(1..=MAX_PENDING_TTL_SECS).contains(&self.pending_ttl_secs) {
            return Err(EngineError::Config(format!(
                "pending_ttl_secs must be in 1..={MAX_PENDING_TTL_SECS}, got {}",
                self.pending_ttl_secs
            )));
        }
        self.time_zone().map(|_| ())
    }
}
