//! Orchestrator for a single docking job.
//!
//! `[MUTATE] → [RELAX] → PREPARE → DOCK → [CONSENSUS] → PERSIST`, with each
//! bracketed stage skipped when the request does not ask for it. External
//! engines are awaited one at a time.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use mutadock_common::{GridBox, MutadockError, Result, Vec3};

use crate::docking::{DockingConfig, DockingResult, VinaRunner};
use crate::grid::compute_box;
use crate::mutation::{MutationEngine, MutationSpec};
use crate::prep::{extract_single_ligand, MoleculeRole, PreparationChain};
use crate::record::ResultRecord;
use crate::relax::{ForceField, RelaxOutcome, RestraintSpec, StructureRelaxer};
use crate::scoring::{ConsensusMethod, ConsensusResult, ConsensusScorer};
use crate::settings::PipelineSettings;
use crate::structure::read_coordinates;

const RECEPTOR_EXTENSIONS: &[&str] = &["pdb", "ent", "pdbqt"];
const LIGAND_EXTENSIONS: &[&str] = &["pdb", "pdbqt", "mol2", "sdf"];

// ── Request ───────────────────────────────────────────────────────────────────

/// Where the search volume comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridSource {
    /// Box centred here, sized from the ligand's extent.
    Center(Vec3),
    /// Predefined box, e.g. a named pocket.
    Fixed(GridBox),
}

#[derive(Debug, Clone)]
pub struct DockingRequest {
    pub receptor: PathBuf,
    pub ligand: PathBuf,
    pub grid: GridSource,
    pub mutation: Option<MutationSpec>,
    pub restraint: Option<RestraintSpec>,
    pub consensus: Option<ConsensusMethod>,
    /// Overrides the configured grid buffer.
    pub buffer: Option<f64>,
    /// Residue name of the ligand inside a complex file; only its first instance is docked.
    pub ligand_code: Option<String>,
    /// Where to persist the result record.
    pub output: Option<PathBuf>,
}

impl DockingRequest {
    pub fn new(receptor: impl Into<PathBuf>, ligand: impl Into<PathBuf>, grid: GridSource) -> Self {
        Self {
            receptor: receptor.into(),
            ligand: ligand.into(),
            grid,
            mutation: None,
            restraint: None,
            consensus: None,
            buffer: None,
            ligand_code: None,
            output: None,
        }
    }
}

// ── Job ───────────────────────────────────────────────────────────────────────

/// A finished job. Never modified after the orchestrator returns it.
#[derive(Debug, Clone)]
pub struct DockingJob {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Prepared receptor that was docked against.
    pub receptor: PathBuf,
    /// Prepared ligand.
    pub ligand: PathBuf,
    pub mutation: Option<MutationSpec>,
    pub restraint: Option<RestraintSpec>,
    pub relaxation: Option<RelaxOutcome>,
    pub grid: GridBox,
    pub docking: DockingResult,
    pub consensus: Option<ConsensusResult>,
    pub record_path: Option<PathBuf>,
}

impl DockingJob {
    pub fn record(&self) -> ResultRecord {
        ResultRecord::from_job(self)
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct DockingOrchestrator {
    settings: PipelineSettings,
    forcefield: ForceField,
    mutations: MutationEngine,
    relaxer: StructureRelaxer,
    preparation: PreparationChain,
    vina: VinaRunner,
    consensus: OnceCell<ConsensusScorer>,
}

impl DockingOrchestrator {
    /// Probes the pose-search engine now; scoring backends on first consensus request.
    pub async fn new(settings: PipelineSettings) -> Self {
        let vina = VinaRunner::probe(&settings.engines).await;
        Self {
            forcefield: ForceField::standard(),
            mutations: MutationEngine::new(),
            relaxer: StructureRelaxer::new(&settings.relax),
            preparation: PreparationChain::from_settings(&settings.preparation),
            vina,
            consensus: OnceCell::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn run(&self, request: &DockingRequest) -> Result<DockingJob> {
        let id = Uuid::new_v4();
        let span = info_span!("dock", job_id = %id);
        self.run_job(id, request).instrument(span).await
    }

    async fn run_job(&self, id: Uuid, request: &DockingRequest) -> Result<DockingJob> {
        let started_at = Utc::now();
        info!("=== Docking job started ===");

        validate_input(&request.receptor, "receptor", RECEPTOR_EXTENSIONS)?;
        validate_input(&request.ligand, "ligand", LIGAND_EXTENSIONS)?;
        if let GridSource::Center(center) = request.grid {
            if center.iter().any(|c| !c.is_finite()) {
                return Err(MutadockError::Validation(format!(
                    "grid center must be finite, got {:?}",
                    center
                )));
            }
        }
        let buffer = request.buffer.unwrap_or(self.settings.grid.buffer);
        if !buffer.is_finite() || buffer < 0.0 {
            return Err(MutadockError::Validation(format!(
                "grid buffer must be a finite value >= 0, got {}",
                buffer
            )));
        }

        let mut receptor = request.receptor.clone();

        if let Some(spec) = &request.mutation {
            info!("Applying mutation {}", spec);
            receptor = self.mutations.apply(&receptor, spec)?.path;
        }

        let relaxation = request.restraint.map(|restraint| {
            info!("Relaxing {} (stiffness {})", receptor.display(), restraint.stiffness());
            let outcome = self.relaxer.minimize(
                &self.forcefield,
                &receptor,
                &restraint,
                self.settings.relax.max_iterations,
            );
            if let RelaxOutcome::Skipped { reason, .. } = &outcome {
                warn!("Relaxation skipped, docking unrelaxed structure: {}", reason);
            }
            outcome
        });
        if let Some(outcome) = &relaxation {
            receptor = outcome.path().to_path_buf();
        }

        let ligand = match &request.ligand_code {
            Some(code) => extract_single_ligand(&request.ligand, code)?,
            None => request.ligand.clone(),
        };

        let grid = match request.grid {
            GridSource::Fixed(grid) => {
                grid.validate()?;
                grid
            }
            GridSource::Center(center) => {
                let atoms = ligand_atoms(&ligand);
                compute_box(center, atoms.as_deref(), buffer)
            }
        };
        info!(
            "Grid box center {:?}, size {:?}",
            grid.center(),
            grid.size()
        );

        let receptor = self.preparation.prepare(&receptor, MoleculeRole::Receptor).await?;
        let ligand = self.preparation.prepare(&ligand, MoleculeRole::Ligand).await?;

        let docking = if self.vina.availability().is_available() {
            let config = DockingConfig::new(&receptor, &ligand, grid, &self.settings.engines);
            self.vina.run(&config).await?
        } else {
            warn!(
                "Pose search unavailable ({}); producing a SIMULATED placeholder result",
                self.vina.availability()
            );
            DockingResult::simulated(&mut rand::thread_rng())
        };

        let consensus = match request.consensus {
            Some(method) => {
                let scorer = self.consensus_scorer().await?;
                Some(scorer.score(&receptor, &ligand, &grid, method).await?)
            }
            None => None,
        };

        let mut job = DockingJob {
            id,
            started_at,
            finished_at: Utc::now(),
            receptor,
            ligand,
            mutation: request.mutation,
            restraint: request.restraint,
            relaxation,
            grid,
            docking,
            consensus,
            record_path: None,
        };

        if let Some(output) = &request.output {
            job.record().write(output)?;
            info!("Result record written to {}", output.display());
            job.record_path = Some(output.clone());
        }

        info!("=== Docking job completed ===");
        Ok(job)
    }

    /// Optionally mutate `structure`, then optionally convert it to PDBQT.
    pub async fn prepare_structure(
        &self,
        structure: &Path,
        mutation: Option<&MutationSpec>,
        to_pdbqt: bool,
    ) -> Result<PathBuf> {
        validate_input(structure, "structure", RECEPTOR_EXTENSIONS)?;
        let mut path = structure.to_path_buf();
        if let Some(spec) = mutation {
            info!("Applying mutation {}", spec);
            path = self.mutations.apply(&path, spec)?.path;
        }
        if to_pdbqt {
            path = self.preparation.prepare(&path, MoleculeRole::Receptor).await?;
        }
        Ok(path)
    }

    /// Probed once per orchestrator; later requests reuse the same adapters.
    async fn consensus_scorer(&self) -> Result<&ConsensusScorer> {
        self.consensus
            .get_or_try_init(|| {
                ConsensusScorer::probe(
                    &self.settings.scoring.scorers,
                    self.settings.engines.probe_timeout(),
                )
            })
            .await
    }
}

fn validate_input(path: &Path, what: &str, extensions: &[&str]) -> Result<()> {
    if !path.is_file() {
        return Err(MutadockError::Validation(format!(
            "{} file not found: {}",
            what,
            path.display()
        )));
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if !extensions.contains(&ext.as_str()) {
        return Err(MutadockError::Validation(format!(
            "{} {} has unsupported extension '{}' (expected one of: {})",
            what,
            path.display(),
            ext,
            extensions.join(", ")
        )));
    }
    Ok(())
}

/// Ligand coordinates for box sizing; `None` falls back to the default cube.
fn ligand_atoms(ligand: &Path) -> Option<Vec<Vec3>> {
    match read_coordinates(ligand) {
        Ok(atoms) if !atoms.is_empty() => Some(atoms),
        Ok(_) => {
            warn!("No atom records in {}; using default grid box", ligand.display());
            None
        }
        Err(e) => {
            warn!("Cannot read ligand coordinates from {}: {}; using default grid box", ligand.display(), e);
            None
        }
    }
}
