//! Configuration loading for mutadock.
//! Reads mutadock.toml from the current directory or the path in MUTADOCK_CONFIG.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use mutadock_molecules::settings::{
    EngineSettings, GridSettings, PipelineSettings, PreparationSettings, RelaxSettings, ScoringSettings,
};

const DEFAULT_CONFIG_FILE: &str = "mutadock.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engines: EngineSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub preparation: PreparationSettings,
    #[serde(default)]
    pub relax: RelaxSettings,
    #[serde(default)]
    pub grid: GridSettings,
}

impl Config {
    /// Load `path`, else `mutadock.toml`. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if !path.exists() {
            tracing::warn!(
                "Config file not found: {}. Using built-in defaults.",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;
        tracing::debug!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !self.grid.buffer.is_finite() || self.grid.buffer < 0.0 {
            anyhow::bail!("grid.buffer must be a finite value >= 0, got {}", self.grid.buffer);
        }
        if !self.relax.stiffness.is_finite() || self.relax.stiffness < 0.0 {
            anyhow::bail!("relax.stiffness must be a finite value >= 0, got {}", self.relax.stiffness);
        }
        if self.scoring.scorers.iter().filter(|s| s.primary).count() > 1 {
            anyhow::bail!("at most one scorer may be marked primary");
        }
        Ok(())
    }

    pub fn pipeline(&self) -> PipelineSettings {
        PipelineSettings {
            engines: self.engines.clone(),
            scoring: self.scoring.clone(),
            preparation: self.preparation.clone(),
            relax: self.relax.clone(),
            grid: self.grid.clone(),
        }
    }
}

mod tests;
