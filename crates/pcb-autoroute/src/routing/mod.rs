pub mod astar;
pub mod autorouter;
pub mod grid;

pub use autorouter::{route, RoutedNet, RoutingResult};
pub use grid::{GridPoint, RoutingGrid};

use crate::error::LoadError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a routing pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// Board units (mm) per grid cell.
    pub resolution: f64,
    /// Free cells added around the board's bounding box.
    pub margin_cells: i32,
    /// Stop visiting further nets once this much time has passed.
    pub time_budget_ms: Option<u64>,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            resolution: 0.1,
            margin_cells: 2,
            time_budget_ms: None,
        }
    }
}

impl RoutingSettings {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(LoadError::InvalidSettings(format!(
                "resolution must be a positive number, got {}",
                self.resolution
            )));
        }
        if self.margin_cells < 0 {
            return Err(LoadError::InvalidSettings(format!(
                "margin_cells must not be negative, got {}",
                self.margin_cells
            )));
        }
        Ok(())
    }
}
