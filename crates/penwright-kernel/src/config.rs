//! Engine configuration.
//!
//! All tunables live in one [`EngineConfig`], loaded from a RON file:
//!
//! ```ron
//! (
//!     preservation: (
//!         max_replacement_ratio: 0.1,
//!         min_content_threshold: 100,
//!         max_batch_delete_percent: 50.0,
//!     ),
//!     resolver: (max_search_distance: 50),
//!     autosave: (debounce_ms: 1500, saved_display_ms: 2000),
//! )
//! ```
//!
//! Every field has a default, so a partial file (or none at all) is fine.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Top-level engine configuration. Read-only once the engine is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub preservation: ContentPreservationConfig,
    pub resolver: ResolverConfig,
    pub autosave: AutosaveConfig,
}

impl EngineConfig {
    /// Parse a RON document.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }
}

/// Load the engine config from a RON file.
pub fn load_engine_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config = EngineConfig::from_ron(&text)?;
    tracing::debug!(path = %path.display(), "loaded engine config");
    Ok(config)
}

// ============================================================================
// Content preservation
// ============================================================================

/// Thresholds for the content preservation guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentPreservationConfig {
    /// Modifications whose new/affected ratio falls below this are blocked.
    pub max_replacement_ratio: f64,
    /// Targets smaller than this (in characters) are never ratio-protected.
    pub min_content_threshold: usize,
    /// Deleting more than this percentage of all blocks is blocked.
    pub max_batch_delete_percent: f64,
    /// Extra protection for table, image and file blocks.
    pub protect_special_blocks: bool,
    pub warnings: WarningThresholds,
}

impl Default for ContentPreservationConfig {
    fn default() -> Self {
        Self {
            max_replacement_ratio: 0.1,
            min_content_threshold: 100,
            max_batch_delete_percent: 50.0,
            protect_special_blocks: true,
            warnings: WarningThresholds::default(),
        }
    }
}

/// Secondary thresholds: crossing one allows the edit but warns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarningThresholds {
    pub modify_percent: f64,
    pub modify_chars: usize,
    pub delete_percent: f64,
    pub delete_chars: usize,
    pub insert_chars: usize,
}

impl Default for WarningThresholds {
    fn default() -> Self {
        Self {
            modify_percent: 25.0,
            modify_chars: 500,
            delete_percent: 15.0,
            delete_chars: 300,
            insert_chars: 5000,
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Line target resolver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Largest offset honored by relative positioning.
    pub max_search_distance: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_search_distance: 50,
        }
    }
}

// ============================================================================
// Autosave
// ============================================================================

/// Autosave timings, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    pub debounce_ms: u64,
    /// How long `saved` is shown before reverting to `idle`.
    pub saved_display_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1500,
            saved_display_ms: 2000,
        }
    }
}

impl AutosaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn saved_display(&self) -> Duration {
        Duration::from_millis(self.saved_display_ms)
    }
}
