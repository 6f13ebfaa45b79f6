//! Molecular docking using AutoDock Vina.

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use mutadock_common::{GridBox, MutadockError, Result};

use crate::process::{Availability, ExternalTool};
use crate::settings::EngineSettings;

/// Affinity range (kcal/mol) of placeholder results produced without a pose-search engine.
pub const SIMULATED_AFFINITY_RANGE: Range<f64> = -9.0..-5.0;

/// Configuration for a docking run.
#[derive(Debug, Clone)]
pub struct DockingConfig {
    pub receptor: PathBuf,
    pub ligand: PathBuf,
    pub grid: GridBox,
    pub out: PathBuf,
    pub cpu: u32,
    pub num_modes: u32,
    pub exhaustiveness: u32,
}

impl DockingConfig {
    /// Settings-driven config writing poses to `<ligand stem>_docked.pdbqt`.
    pub fn new(receptor: &Path, ligand: &Path, grid: GridBox, engines: &EngineSettings) -> Self {
        let stem = ligand
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ligand".to_string());
        Self {
            receptor: receptor.to_path_buf(),
            ligand: ligand.to_path_buf(),
            grid,
            out: ligand.with_file_name(format!("{}_docked.pdbqt", stem)),
            cpu: engines.cpu,
            num_modes: engines.num_modes,
            exhaustiveness: engines.exhaustiveness,
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--receptor".to_string(),
            self.receptor.display().to_string(),
            "--ligand".to_string(),
            self.ligand.display().to_string(),
            "--out".to_string(),
            self.out.display().to_string(),
            "--cpu".to_string(),
            self.cpu.to_string(),
            "--num_modes".to_string(),
            self.num_modes.to_string(),
            "--exhaustiveness".to_string(),
            self.exhaustiveness.to_string(),
        ];
        args.extend(self.grid.to_vina_args());
        args
    }
}

/// One row of the Vina results table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BindingMode {
    pub mode: u32,
    pub affinity: f64,
    pub rmsd_lb: f64,
    pub rmsd_ub: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingResult {
    /// Best-mode affinity, kcal/mol.
    pub binding_affinity: f64,
    pub rmsd_lb: f64,
    pub rmsd_ub: f64,
    pub modes: Vec<BindingMode>,
    pub poses: Option<PathBuf>,
    /// Placeholder value; no engine ran.
    pub simulated: bool,
}

impl DockingResult {
    /// Placeholder drawn uniformly from [`SIMULATED_AFFINITY_RANGE`].
    pub fn simulated<R: Rng>(rng: &mut R) -> Self {
        let affinity = rng.gen_range(SIMULATED_AFFINITY_RANGE);
        Self {
            binding_affinity: affinity,
            rmsd_lb: 0.0,
            rmsd_ub: 0.0,
            modes: Vec::new(),
            poses: None,
            simulated: true,
        }
    }
}

/// Wrapper for AutoDock Vina execution.
pub struct VinaRunner {
    tool: ExternalTool,
    availability: Availability,
    timeout: Duration,
}

impl VinaRunner {
    /// Probe the executable once; the result is kept for the runner's lifetime.
    pub async fn probe(settings: &EngineSettings) -> Self {
        let tool = ExternalTool::new(&settings.vina);
        let availability = tool.probe(settings.probe_timeout()).await;
        match &availability {
            Availability::Available => info!("Vina found: {}", settings.vina.display()),
            Availability::Unavailable(reason) => {
                warn!("Vina not available at '{}': {}", settings.vina.display(), reason)
            }
        }
        Self {
            tool,
            availability,
            timeout: settings.dock_timeout(),
        }
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    /// Run AutoDock Vina with the given configuration.
    pub async fn run(&self, config: &DockingConfig) -> Result<DockingResult> {
        if let Availability::Unavailable(reason) = &self.availability {
            return Err(MutadockError::Docking(format!("vina not available: {}", reason)));
        }
        info!("Running AutoDock Vina on {}", config.ligand.display());

        let output = self
            .tool
            .run(config.args(), self.timeout)
            .await
            .map_err(|e| MutadockError::Docking(e.to_string()))?;

        if !output.success {
            return Err(MutadockError::Docking(format!(
                "AutoDock Vina failed: {}",
                output.failure_summary()
            )));
        }

        let text = format!("{}\n{}", output.stdout, output.stderr);
        let result = parse_output(&text)?;
        info!("Docking completed. Binding Affinity: {} kcal/mol", result.binding_affinity);
        debug!("AutoDock Vina completed successfully. Output in {}", config.out.display());

        Ok(DockingResult {
            poses: Some(config.out.clone()),
            ..result
        })
    }
}

const TABLE_ROW: &str = r"(?m)^\s*(\d+)\s+([-+]?\d*\.?\d+)\s+(\d*\.?\d+)\s+(\d*\.?\d+)\s*$";
const LEGACY_AFFINITY: &str = r"([-+]?\d*\.?\d+)\s*\(?kcal/mol";

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| MutadockError::Docking(format!("bad output pattern: {}", e)))
}

/// Every row of the binding-mode table, in printed order.
pub fn parse_modes(output: &str) -> Result<Vec<BindingMode>> {
    Ok(compile(TABLE_ROW)?
        .captures_iter(output)
        .filter_map(|c| {
            Some(BindingMode {
                mode: c[1].parse().ok()?,
                affinity: c[2].parse().ok()?,
                rmsd_lb: c[3].parse().ok()?,
                rmsd_ub: c[4].parse().ok()?,
            })
        })
        .collect())
}

/// Best mode from the results table, else the first `<value> kcal/mol`.
pub fn parse_output(output: &str) -> Result<DockingResult> {
    let modes = parse_modes(output)?;
    let best = modes
        .iter()
        .copied()
        .min_by(|a, b| a.affinity.total_cmp(&b.affinity));

    if let Some(best) = best {
        return Ok(DockingResult {
            binding_affinity: best.affinity,
            rmsd_lb: best.rmsd_lb,
            rmsd_ub: best.rmsd_ub,
            modes,
            poses: None,
            simulated: false,
        });
    }

    compile(LEGACY_AFFINITY)?
        .captures(output)
        .and_then(|c| c[1].parse::<f64>().ok())
        .map(|affinity| DockingResult {
            binding_affinity: affinity,
            rmsd_lb: 0.0,
            rmsd_ub: 0.0,
            modes: Vec::new(),
            poses: None,
            simulated: false,
        })
        .ok_or_else(|| MutadockError::Docking("could not parse binding affinity from Vina output".to_string()))
}
