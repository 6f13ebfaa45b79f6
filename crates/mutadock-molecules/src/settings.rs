//! Engine, scorer and stage settings.
//! Every field carries a serde default so a partial (or absent) config file works.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::scoring::{ConsensusMethod, ScorerKind};

// ── Pose search ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_vina")]
    pub vina: PathBuf,
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    #[serde(default = "default_num_modes")]
    pub num_modes: u32,
    #[serde(default = "default_exhaustiveness")]
    pub exhaustiveness: u32,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_dock_timeout")]
    pub dock_timeout_secs: u64,
}

fn default_vina()           -> PathBuf { PathBuf::from("vina") }
fn default_cpu()            -> u32     { 4 }
fn default_num_modes()      -> u32     { 9 }
fn default_exhaustiveness() -> u32     { 8 }
fn default_probe_timeout()  -> u64     { 5 }
fn default_dock_timeout()   -> u64     { 300 }

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            vina: default_vina(),
            cpu: default_cpu(),
            num_modes: default_num_modes(),
            exhaustiveness: default_exhaustiveness(),
            probe_timeout_secs: default_probe_timeout(),
            dock_timeout_secs: default_dock_timeout(),
        }
    }
}

impl EngineSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn dock_timeout(&self) -> Duration {
        Duration::from_secs(self.dock_timeout_secs)
    }
}

// ── Scoring ───────────────────────────────────────────────────────────────────

/// One scoring backend. Order in the list is evaluation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerSpec {
    pub name: String,
    pub kind: ScorerKind,
    pub executable: PathBuf,
    #[serde(default = "default_score_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub primary: bool,
}

fn default_score_timeout() -> u64 { 120 }

impl ScorerSpec {
    pub fn new(kind: ScorerKind, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: kind.default_name().to_string(),
            kind,
            executable: executable.into(),
            timeout_secs: kind.default_timeout_secs(),
            primary: kind == ScorerKind::Vina,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringSettings {
    #[serde(default = "default_scorers")]
    pub scorers: Vec<ScorerSpec>,
    #[serde(default)]
    pub method: ConsensusMethod,
}

fn default_scorers() -> Vec<ScorerSpec> {
    vec![
        ScorerSpec::new(ScorerKind::Vina, "vina"),
        ScorerSpec::new(ScorerKind::Gnina, "gnina"),
        ScorerSpec::new(ScorerKind::RfScore, "rf-score"),
    ]
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            scorers: default_scorers(),
            method: ConsensusMethod::default(),
        }
    }
}

// ── Preparation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Meeko,
    Obabel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparationSettings {
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderKind>,
    #[serde(default = "default_meeko_receptor")]
    pub meeko_receptor: PathBuf,
    #[serde(default = "default_meeko_ligand")]
    pub meeko_ligand: PathBuf,
    #[serde(default = "default_obabel")]
    pub obabel: PathBuf,
    #[serde(default = "default_ph")]
    pub ph: f64,
    #[serde(default = "default_prep_timeout")]
    pub timeout_secs: u64,
}

fn default_providers()      -> Vec<ProviderKind> { vec![ProviderKind::Meeko, ProviderKind::Obabel] }
fn default_meeko_receptor() -> PathBuf { PathBuf::from("mk_prepare_receptor.py") }
fn default_meeko_ligand()   -> PathBuf { PathBuf::from("mk_prepare_ligand.py") }
fn default_obabel()         -> PathBuf { PathBuf::from("obabel") }
fn default_ph()             -> f64     { 7.4 }
fn default_prep_timeout()   -> u64     { 120 }

impl Default for PreparationSettings {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            meeko_receptor: default_meeko_receptor(),
            meeko_ligand: default_meeko_ligand(),
            obabel: default_obabel(),
            ph: default_ph(),
            timeout_secs: default_prep_timeout(),
        }
    }
}

impl PreparationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Relaxation ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaxSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// kJ/mol/nm²
    #[serde(default = "default_stiffness")]
    pub stiffness: f64,
    /// kJ/mol
    #[serde(default = "default_energy_warning")]
    pub energy_warning_threshold: f64,
}

fn default_max_iterations() -> usize { 1000 }
fn default_stiffness()      -> f64   { 500.0 }
fn default_energy_warning() -> f64   { 10.0 }

impl Default for RelaxSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            stiffness: default_stiffness(),
            energy_warning_threshold: default_energy_warning(),
        }
    }
}

// ── Grid ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSettings {
    #[serde(default = "default_buffer")]
    pub buffer: f64,
    /// Pocket definition file (yaml, json or toml).
    #[serde(default)]
    pub pockets: Option<PathBuf>,
}

fn default_buffer() -> f64 { crate::grid::DEFAULT_BUFFER }

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            buffer: default_buffer(),
            pockets: None,
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Everything a [`crate::pipeline::DockingOrchestrator`] is built from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSettings {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts_match_engine_contract() {
        let engines = EngineSettings::default();
        assert_eq!(engines.probe_timeout(), Duration::from_secs(5));
        assert_eq!(engines.dock_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_default_scorers_primary_first() {
        let scoring = ScoringSettings::default();
        let names: Vec<_> = scoring.scorers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["vina", "gnina", "rf_score"]);
        assert!(scoring.scorers[0].primary);
        assert!(scoring.scorers[1..].iter().all(|s| !s.primary));
        assert_eq!(scoring.scorers[0].timeout_secs, 60);
    }

    #[test]
    fn test_partial_scorer_entry_fills_defaults() {
        let spec: ScorerSpec =
            serde_json::from_str(r#"{"name": "cnn", "kind": "gnina", "executable": "/opt/gnina"}"#).unwrap();
        assert_eq!(spec.timeout_secs, 120);
        assert!(!spec.primary);
    }
}
