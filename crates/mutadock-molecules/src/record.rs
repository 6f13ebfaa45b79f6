//! Persisted per-job result record.
//!
//! One JSON document per docking job. Consensus fields are only present when
//! consensus scoring was requested; `consensus_mode` is always written so a
//! reader can tell the two shapes apart without probing for keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use mutadock_common::{GridBox, MutadockError, Result};

use crate::pipeline::DockingJob;
use crate::relax::RelaxReport;
use crate::scoring::ConsensusMethod;

/// Mutation field value for unmutated receptors.
pub const WILD_TYPE: &str = "WT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub timestamp: DateTime<Utc>,
    pub job_id: Uuid,
    pub receptor: PathBuf,
    pub ligand: PathBuf,
    pub binding_affinity_kcal_mol: f64,
    pub rmsd_lb: f64,
    pub rmsd_ub: f64,
    /// Canonical mutation identifier, or `"WT"`.
    pub mutation: String,
    pub relaxed: bool,
    pub simulated: bool,
    pub grid_box: GridBox,
    pub consensus_mode: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual_scores: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_affinity_kcal_mol: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_uncertainty_kcal_mol: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_method: Option<ConsensusMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_all_available: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restraint_stiffness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relaxation: Option<RelaxReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poses: Option<PathBuf>,
}

impl ResultRecord {
    pub fn from_job(job: &DockingJob) -> Self {
        let consensus = job.consensus.as_ref();
        Self {
            timestamp: job.finished_at,
            job_id: job.id,
            receptor: job.receptor.clone(),
            ligand: job.ligand.clone(),
            binding_affinity_kcal_mol: job.docking.binding_affinity,
            rmsd_lb: job.docking.rmsd_lb,
            rmsd_ub: job.docking.rmsd_ub,
            mutation: job
                .mutation
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| WILD_TYPE.to_string()),
            relaxed: job.relaxation.as_ref().is_some_and(|r| r.was_relaxed()),
            simulated: job.docking.simulated,
            grid_box: job.grid,
            consensus_mode: consensus.is_some(),
            individual_scores: consensus.map(|c| c.individual_scores.clone()),
            consensus_affinity_kcal_mol: consensus.map(|c| c.consensus_affinity),
            consensus_uncertainty_kcal_mol: consensus.map(|c| c.uncertainty),
            consensus_method: consensus.map(|c| c.consensus_method),
            consensus_all_available: consensus.map(|c| c.all_available),
            restraint_stiffness: job.restraint.map(|r| r.stiffness()),
            relaxation: job
                .relaxation
                .as_ref()
                .and_then(|r| r.report())
                .cloned(),
            poses: job.docking.poses.clone(),
        }
    }

    pub fn is_wild_type(&self) -> bool {
        self.mutation == WILD_TYPE
    }

    /// Consensus affinity when present, else the pose-search affinity.
    pub fn headline_affinity(&self) -> f64 {
        self.consensus_affinity_kcal_mol
            .unwrap_or(self.binding_affinity_kcal_mol)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()? + "\n")?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            MutadockError::Validation(format!("cannot read result record {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Human-readable summary.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let simulated = if self.simulated { " (simulated)" } else { "" };
        let _ = writeln!(out, "Mutation: {}", self.mutation);

        match (self.consensus_affinity_kcal_mol, self.consensus_uncertainty_kcal_mol) {
            (Some(consensus), Some(uncertainty)) => {
                let _ = writeln!(
                    out,
                    "Vina Binding Affinity: {:.2} kcal/mol{}",
                    self.binding_affinity_kcal_mol, simulated
                );
                let _ = writeln!(
                    out,
                    "Consensus Binding Affinity: {:.2} ± {:.2} kcal/mol",
                    consensus, uncertainty
                );
                if let Some(scores) = &self.individual_scores {
                    let listed: Vec<String> = scores
                        .iter()
                        .map(|(name, score)| format!("{}={:.2}", name, score))
                        .collect();
                    let _ = writeln!(out, "Individual Scores: {}", listed.join(", "));
                }
            }
            _ => {
                let _ = writeln!(
                    out,
                    "Binding Affinity: {:.2} kcal/mol{}",
                    self.binding_affinity_kcal_mol, simulated
                );
            }
        }

        let _ = writeln!(out, "RMSD LB: {}", self.rmsd_lb);
        let _ = write!(out, "RMSD UB: {}", self.rmsd_ub);
        if let Some(report) = &self.relaxation {
            let _ = write!(
                out,
                "\nRelaxation: {:.1} -> {:.1} kJ/mol, backbone RMSD {:.3} Å",
                report.initial_energy, report.final_energy, report.backbone_rmsd
            );
        }
        out
    }
}
