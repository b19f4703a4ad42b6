//! Runtime knobs read from a key-value property store.
//!
//! Property names are stable and shared with report configuration files:
//!
//! | property                   | default      |
//! |----------------------------|--------------|
//! | `crossjoin.cell.max`       | 50,000,000   |
//! | `join.table.maxrows`       | unlimited    |
//! | `distinct.table.maxrows`   | unlimited    |
//! | `table.limit.warn.always`  | false        |
//! | `table.wait.interval.ms`   | 200          |
//!
//! Each property can also be set through the environment as
//! `TABLELENS_` + the upper-cased name with dots replaced by underscores.

use crate::error::{LensError, Result};
use crate::warning::WarningLog;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

pub const CROSSJOIN_CELL_MAX: &str = "crossjoin.cell.max";
pub const JOIN_MAX_ROWS: &str = "join.table.maxrows";
pub const DISTINCT_MAX_ROWS: &str = "distinct.table.maxrows";
pub const ALWAYS_WARN: &str = "table.limit.warn.always";
pub const WAIT_INTERVAL_MS: &str = "table.wait.interval.ms";

const ENV_PREFIX: &str = "TABLELENS_";
const MIN_WAIT_MS: u64 = 50;
const MAX_WAIT_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    /// Upper bound on `left rows * right rows * columns` for a cross join.
    pub max_crossjoin_cells: u64,
    /// Body row cap for join outputs; `None` means unlimited.
    pub max_join_rows: Option<usize>,
    /// Body row cap for distinct outputs; `None` means unlimited.
    pub max_distinct_rows: Option<usize>,
    /// Repeat truncation warnings every time instead of once per message.
    pub always_warn: bool,
    /// Safety-net wake interval for blocked `more_rows` callers.
    pub wait_interval_ms: u64,
}

impl Default for LensConfig {
    fn default() -> Self {
        LensConfig {
            max_crossjoin_cells: 50_000_000,
            max_join_rows: None,
            max_distinct_rows: None,
            always_warn: false,
            wait_interval_ms: 200,
        }
    }
}

impl LensConfig {
    /// Build a config from string properties. Unknown keys are ignored.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let mut config = LensConfig::default();
        for (key, value) in props {
            config.set_property(key, value)?;
        }
        Ok(config)
    }

    /// Parse a JSON object of config fields, e.g. `{"max_join_rows": 1000}`.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LensError::InvalidProperty {
            key: "<json>".to_string(),
            value: e.to_string(),
        })
    }

    /// Overlay any `TABLELENS_*` environment variables onto this config.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        for key in [
            CROSSJOIN_CELL_MAX,
            JOIN_MAX_ROWS,
            DISTINCT_MAX_ROWS,
            ALWAYS_WARN,
            WAIT_INTERVAL_MS,
        ] {
            if let Ok(value) = std::env::var(env_name(key)) {
                self.set_property(key, &value)?;
            }
        }
        Ok(self)
    }

    /// Set one property by its stable name.
    pub fn set_property(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = || LensError::InvalidProperty {
            key: key.to_string(),
            value: value.to_string(),
        };
        let value = value.trim();
        match key {
            CROSSJOIN_CELL_MAX => {
                self.max_crossjoin_cells = value.parse().map_err(|_| invalid())?;
            }
            JOIN_MAX_ROWS => self.max_join_rows = parse_limit(value).ok_or_else(invalid)?,
            DISTINCT_MAX_ROWS => self.max_distinct_rows = parse_limit(value).ok_or_else(invalid)?,
            ALWAYS_WARN => self.always_warn = value.parse().map_err(|_| invalid())?,
            WAIT_INTERVAL_MS => self.wait_interval_ms = value.parse().map_err(|_| invalid())?,
            other => log::debug!("ignoring unknown table property {other}"),
        }
        Ok(())
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms.clamp(MIN_WAIT_MS, MAX_WAIT_MS))
    }
}

/// Empty, zero or negative limits mean "unlimited".
fn parse_limit(value: &str) -> Option<Option<usize>> {
    if value.is_empty() {
        return Some(None);
    }
    let n: i64 = value.parse().ok()?;
    Some(usize::try_from(n).ok().filter(|&n| n > 0))
}

fn env_name(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.replace('.', "_").to_uppercase())
}

/// Configuration plus the warning sink every lens in a report shares.
#[derive(Debug, Default)]
pub struct LensEnv {
    config: LensConfig,
    warnings: WarningLog,
}

impl LensEnv {
    pub fn new(config: LensConfig) -> Arc<Self> {
        let warnings = WarningLog::new(config.always_warn);
        Arc::new(LensEnv { config, warnings })
    }

    /// Process-wide environment built from defaults and `TABLELENS_*` variables.
    pub fn shared() -> Arc<LensEnv> {
        static SHARED: OnceLock<Arc<LensEnv>> = OnceLock::new();
        SHARED
            .get_or_init(|| {
                let config = LensConfig::default().with_env_overrides().unwrap_or_else(|e| {
                    log::warn!("ignoring table environment overrides: {e}");
                    LensConfig::default()
                });
                LensEnv::new(config)
            })
            .clone()
    }

    pub fn config(&self) -> &LensConfig {
        &self.config
    }

    pub fn warnings(&self) -> &WarningLog {
        &self.warnings
    }
}
