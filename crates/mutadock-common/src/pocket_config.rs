//! Named binding-pocket definitions.
//!
//! A pocket file maps pocket identifiers to grid boxes, e.g.
//!
//! ```yaml
//! pockets:
//!   GyrA_pocket:
//!     center_x: 8.5
//!     center_y: 12.3
//!     center_z: 15.7
//!     size_x: 22.0
//!     size_y: 22.0
//!     size_z: 22.0
//! ```
//!
//! YAML, JSON and TOML are accepted, chosen by file extension.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::entities::GridBox;
use crate::error::{MutadockError, Result};

/// Pocket definitions loaded once per invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PocketConfig {
    #[serde(default)]
    pub pockets: BTreeMap<String, GridBox>,
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PocketConfig {
    /// Load from a file, picking the parser from the extension.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let config = match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml(path)?,
            "json" => Self::from_json(path)?,
            "toml" => Self::from_toml(path)?,
            other => {
                return Err(MutadockError::Validation(format!(
                    "unsupported pocket config extension '{}' for {} (expected yaml, json or toml)",
                    other,
                    path.display()
                )))
            }
        };

        info!("Loaded {} pocket definitions from {}", config.pockets.len(), path.display());
        Ok(config.clamped())
    }

    /// Load from YAML file
    pub fn from_yaml(path: &Path) -> Result<Self> {
        let content = read(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Load from JSON file
    pub fn from_json(path: &Path) -> Result<Self> {
        let content = read(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load from TOML file
    pub fn from_toml(path: &Path) -> Result<Self> {
        let content = read(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Enforce the edge limits on every configured box.
    fn clamped(mut self) -> Self {
        for (name, grid) in self.pockets.iter_mut() {
            if !grid.is_within_limits() {
                warn!(pocket = %name, size = ?grid.size(), "Pocket box clamped to edge limits");
                *grid = GridBox::new(grid.center(), grid.size());
            }
        }
        self
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        MutadockError::Config(format!("cannot read pocket config {}: {}", path.display(), e))
    })
}

// ── Lookup ────────────────────────────────────────────────────────────────────

impl PocketConfig {
    /// Look up a pocket; unknown names fail with the list of known ones.
    pub fn get(&self, name: &str) -> Result<GridBox> {
        let grid = self.pockets.get(name).copied().ok_or_else(|| {
            MutadockError::Config(format!(
                "pocket '{}' not found. Available: [{}]",
                name,
                self.names().join(", ")
            ))
        })?;
        grid.validate()?;
        Ok(grid)
    }

    pub fn names(&self) -> Vec<&str> {
        self.pockets.keys().map(String::as_str).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
