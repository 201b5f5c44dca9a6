//! Tunables for bindings and undo history.
//!
//! All sections default sensibly, so an empty TOML document is a valid config:
//!
//! ```toml
//! [binding]
//! presence_debounce_ms = 10
//! default_cursor_color = "#ffa500"
//!
//! [history]
//! capture_timeout_ms = 500
//! max_steps = 100
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::CrdtError;
use crate::presence::DEFAULT_CURSOR_COLOR;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BindingConfig {
    /// Quiet period before peer presence changes are repainted.
    pub presence_debounce_ms: u64,
    /// Delay before a burst of local cursor activity counts as settled.
    pub cursor_settle_ms: u64,
    /// Color for peers that do not advertise one.
    pub default_cursor_color: SmolStr,
    /// Prefix of the transaction origin each binding tags its writes with.
    pub origin_prefix: SmolStr,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            presence_debounce_ms: 10,
            cursor_settle_ms: 0,
            default_cursor_color: DEFAULT_CURSOR_COLOR.into(),
            origin_prefix: "weaver-editor".into(),
        }
    }
}

impl BindingConfig {
    pub fn presence_debounce(&self) -> Duration {
        Duration::from_millis(self.presence_debounce_ms)
    }

    pub fn cursor_settle(&self) -> Duration {
        Duration::from_millis(self.cursor_settle_ms)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Tracked changes closer together than this merge into one undo step.
    pub capture_timeout_ms: u64,
    /// Oldest steps are dropped beyond this many.
    pub max_steps: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capture_timeout_ms: 500,
            max_steps: 100,
        }
    }
}

impl HistoryConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct CollabConfig {
    pub binding: BindingConfig,
    pub history: HistoryConfig,
}

impl CollabConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, CrdtError> {
        Ok(toml::from_str(source)?)
    }
}
