//! Restrained energy minimisation of (mutated) receptor structures.
//!
//! Every run descends the same stiffness ladder and then picks the rung that
//! is cheapest under the requested restraint, so drift never grows with k.
//!
//! Relaxation never fails outward: every failure is reported as
//! [`RelaxOutcome::Skipped`] carrying the original path, so the pipeline can
//! always proceed to docking with the unrelaxed structure.

mod forcefield;
mod ladder;
mod minimize;

pub use forcefield::ForceField;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use mutadock_common::{MutadockError, Result, Vec3};

use crate::settings::RelaxSettings;
use crate::structure::{RecordKind, Structure};

/// Backbone atoms anchored by the restraint.
pub const RESTRAINED_ATOMS: [&str; 3] = ["N", "CA", "C"];

// ── Restraint ─────────────────────────────────────────────────────────────────

/// Harmonic backbone restraint. Stiffness is in kJ/mol/nm²; 0 means unrestrained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRestraint")]
pub struct RestraintSpec {
    stiffness: f64,
}

#[derive(Deserialize)]
struct RawRestraint {
    stiffness: f64,
}

impl TryFrom<RawRestraint> for RestraintSpec {
    type Error = MutadockError;

    fn try_from(raw: RawRestraint) -> Result<Self> {
        Self::new(raw.stiffness)
    }
}

impl RestraintSpec {
    pub fn new(stiffness: f64) -> Result<Self> {
        if !stiffness.is_finite() || stiffness < 0.0 {
            return Err(MutadockError::Validation(format!(
                "restraint stiffness must be a finite value >= 0, got {}",
                stiffness
            )));
        }
        Ok(Self { stiffness })
    }

    pub fn unrestrained() -> Self {
        Self { stiffness: 0.0 }
    }

    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    pub fn atom_names(&self) -> &'static [&'static str] {
        &RESTRAINED_ATOMS
    }

    /// kJ/mol/nm² to kJ/mol/Å².
    fn per_square_angstrom(&self) -> f64 {
        self.stiffness / 100.0
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// How far a relaxation got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaxStage {
    NotStarted,
    SystemBuilt,
    RestraintsApplied,
    Minimized,
    Written,
}

impl fmt::Display for RelaxStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not started",
            Self::SystemBuilt => "system built",
            Self::RestraintsApplied => "restraints applied",
            Self::Minimized => "minimized",
            Self::Written => "written",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaxReport {
    /// kJ/mol
    pub initial_energy: f64,
    /// kJ/mol
    pub final_energy: f64,
    pub energy_change: f64,
    pub iterations: usize,
    pub restrained_atoms: usize,
    pub stiffness: f64,
    /// Å over N, CA and C, without superposition.
    pub backbone_rmsd: f64,
    pub converged: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelaxOutcome {
    Relaxed {
        path: PathBuf,
        report: RelaxReport,
    },
    /// Relaxation did not complete; `original` is the input, untouched.
    Skipped {
        stage: RelaxStage,
        reason: String,
        original: PathBuf,
    },
}

impl RelaxOutcome {
    /// The structure to carry forward: relaxed output or the original.
    pub fn path(&self) -> &Path {
        match self {
            Self::Relaxed { path, .. } => path,
            Self::Skipped { original, .. } => original,
        }
    }

    pub fn was_relaxed(&self) -> bool {
        matches!(self, Self::Relaxed { .. })
    }

    pub fn report(&self) -> Option<&RelaxReport> {
        match self {
            Self::Relaxed { report, .. } => Some(report),
            Self::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum RelaxationFailure {
    #[error("unsupported input {0}: no sibling .pdb next to the .pdbqt")]
    NoPdbSource(PathBuf),

    #[error("cannot load structure: {0}")]
    Load(String),

    #[error("structure has no atoms")]
    EmptyStructure,

    #[error("energy became non-finite at iteration {iteration}")]
    NumericalInstability { iteration: usize },

    #[error("cannot write relaxed structure: {0}")]
    Write(String),
}

// ── Relaxer ───────────────────────────────────────────────────────────────────

/// Drives minimisation against a shared [`ForceField`].
#[derive(Debug, Clone)]
pub struct StructureRelaxer {
    energy_warning_threshold: f64,
}

impl StructureRelaxer {
    pub fn new(settings: &RelaxSettings) -> Self {
        Self {
            energy_warning_threshold: settings.energy_warning_threshold,
        }
    }

    /// Minimise `structure`, writing `<stem>_minimized.pdb` beside it.
    #[instrument(skip(self, forcefield))]
    pub fn minimize(
        &self,
        forcefield: &ForceField,
        structure: &Path,
        restraint: &RestraintSpec,
        max_iterations: usize,
    ) -> RelaxOutcome {
        let mut stage = RelaxStage::NotStarted;
        match self.run(forcefield, structure, restraint, max_iterations, &mut stage) {
            Ok((path, report)) => RelaxOutcome::Relaxed { path, report },
            Err(failure) => {
                warn!(
                    "Relaxation failed at stage '{}': {}. Returning original structure.",
                    stage, failure
                );
                RelaxOutcome::Skipped {
                    stage,
                    reason: failure.to_string(),
                    original: structure.to_path_buf(),
                }
            }
        }
    }

    fn run(
        &self,
        forcefield: &ForceField,
        structure: &Path,
        restraint: &RestraintSpec,
        max_iterations: usize,
        stage: &mut RelaxStage,
    ) -> std::result::Result<(PathBuf, RelaxReport), RelaxationFailure> {
        let source = pdb_source(structure)?;
        info!("Loading structure for minimization: {}", source.display());
        let mut parsed = Structure::read(&source).map_err(|e| RelaxationFailure::Load(e.to_string()))?;

        let atoms: Vec<_> = parsed.atoms().collect();
        let mut system = forcefield.build_system(&atoms)?;
        let backbone: Vec<usize> = atoms
            .iter()
            .enumerate()
            .filter(|(_, a)| a.kind == RecordKind::Atom && RESTRAINED_ATOMS.contains(&a.name.as_str()))
            .map(|(i, _)| i)
            .collect();
        debug!(
            "System built: {} atoms, {} bonds, {} H constraints",
            system.len(),
            system.bonds.len(),
            system.constraints.len()
        );
        *stage = RelaxStage::SystemBuilt;

        let restrained_atoms = if restraint.stiffness() > 0.0 {
            info!(
                "Applied backbone restraints (k={} kJ/mol/nm²) to {} atoms",
                restraint.stiffness(),
                backbone.len()
            );
            *stage = RelaxStage::RestraintsApplied;
            backbone.len()
        } else {
            info!("No backbone restraints (full flexibility)");
            0
        };

        let k = restraint.per_square_angstrom();
        let path = ladder::descend(&mut system, &backbone, max_iterations, forcefield.force_tolerance)?;
        let chosen = path.select(k);
        *stage = RelaxStage::Minimized;

        let initial_energy = path.reference().energy;
        let final_energy = chosen.energy + k * chosen.displacement;
        let energy_change = final_energy - initial_energy;
        info!(
            "Minimization: {:.2} -> {:.2} kJ/mol ({} iterations over {} rungs)",
            initial_energy,
            final_energy,
            path.iterations,
            path.rungs.len() - 1
        );
        if energy_change.abs() < self.energy_warning_threshold {
            warn!(
                "Minimal energy change ({:.2} kJ/mol). Structure may already be near a local minimum.",
                energy_change
            );
        }

        let backbone_rmsd = if backbone.is_empty() {
            0.0
        } else {
            (chosen.displacement / backbone.len() as f64).sqrt()
        };

        parsed
            .set_positions(&chosen.positions)
            .map_err(|e| RelaxationFailure::Write(e.to_string()))?;
        let output = minimized_path(&source);
        parsed
            .write(&output)
            .map_err(|e| RelaxationFailure::Write(e.to_string()))?;
        *stage = RelaxStage::Written;
        info!("Minimized structure saved to: {}", output.display());

        Ok((
            output,
            RelaxReport {
                initial_energy,
                final_energy,
                energy_change,
                iterations: path.iterations,
                restrained_atoms,
                stiffness: restraint.stiffness(),
                backbone_rmsd,
                converged: chosen.converged,
            },
        ))
    }
}

/// `.pdb` files are used as is; `.pdbqt` inputs need a sibling `.pdb`.
fn pdb_source(structure: &Path) -> std::result::Result<PathBuf, RelaxationFailure> {
    let is_pdbqt = structure
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("pdbqt"));
    if !is_pdbqt {
        return Ok(structure.to_path_buf());
    }
    let sibling = structure.with_extension("pdb");
    if sibling.exists() {
        Ok(sibling)
    } else {
        Err(RelaxationFailure::NoPdbSource(structure.to_path_buf()))
    }
}

fn minimized_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "structure".to_string());
    source.with_file_name(format!("{}_minimized.pdb", stem))
}

fn rmsd(a: &[Vec3], b: &[Vec3], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    let sum: f64 = indices
        .iter()
        .map(|&i| {
            let d = forcefield::sub(&a[i], &b[i]);
            forcefield::dot(&d, &d)
        })
        .sum();
    (sum / indices.len() as f64).sqrt()
}

/// Backbone RMSD between two files with matching atom order.
pub fn backbone_rmsd(original: &Path, relaxed: &Path) -> Result<f64> {
    let a = Structure::read(original)?;
    let b = Structure::read(relaxed)?;
    let pick = |s: &Structure| -> Vec<Vec3> {
        s.atoms()
            .filter(|a| a.kind == RecordKind::Atom && RESTRAINED_ATOMS.contains(&a.name.as_str()))
            .map(|a| a.position)
            .collect()
    };
    let (pa, pb) = (pick(&a), pick(&b));
    if pa.len() != pb.len() {
        return Err(MutadockError::Validation(format!(
            "backbone atom counts differ: {} vs {}",
            pa.len(),
            pb.len()
        )));
    }
    let all: Vec<usize> = (0..pa.len()).collect();
    Ok(rmsd(&pa, &pb, &all))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mutadock_test_utils::{write_fixture, CLASH_PDB, TRIPEPTIDE_PDB};

    fn relaxer() -> StructureRelaxer {
        StructureRelaxer::new(&RelaxSettings::default())
    }

    #[test]
    fn test_restraint_validation() {
        assert!(RestraintSpec::new(0.0).is_ok());
        assert!(RestraintSpec::new(500.0).is_ok());
        assert!(RestraintSpec::new(-1.0).is_err());
        assert!(RestraintSpec::new(f64::NAN).is_err());
        assert_eq!(RestraintSpec::unrestrained().atom_names(), &["N", "CA", "C"]);
    }

    #[test]
    fn test_deserialized_restraint_is_validated() {
        let ok: RestraintSpec = serde_json::from_str(r#"{"stiffness": 250.0}"#).unwrap();
        assert_eq!(ok.stiffness(), 250.0);

        let err = serde_json::from_str::<RestraintSpec>(r#"{"stiffness": -5.0}"#).unwrap_err();
        assert!(err.to_string().contains("stiffness"), "{err}");
    }

    #[test]
    fn test_relaxes_clash_and_writes_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let pdb = write_fixture(dir.path(), "complex.pdb", CLASH_PDB);
        let ff = ForceField::standard();

        let outcome = relaxer().minimize(&ff, &pdb, &RestraintSpec::new(500.0).unwrap(), 2000);
        let RelaxOutcome::Relaxed { path, report } = &outcome else {
            panic!("expected relaxation, got {outcome:?}");
        };
        assert_eq!(path, &dir.path().join("complex_minimized.pdb"));
        assert!(report.final_energy < report.initial_energy);
        assert_eq!(report.restrained_atoms, 12);
        assert_eq!(std::fs::read_to_string(&pdb).unwrap(), CLASH_PDB);

        let rmsd = backbone_rmsd(&pdb, path).unwrap();
        assert!((rmsd - report.backbone_rmsd).abs() < 1e-2, "file rmsd {rmsd} vs report {}", report.backbone_rmsd);
    }

    #[test]
    fn test_stiffer_restraint_never_increases_drift() {
        let dir = tempfile::tempdir().unwrap();
        let pdb = write_fixture(dir.path(), "complex.pdb", CLASH_PDB);
        let ff = ForceField::standard();

        let mut stiffnesses = vec![
            0.0, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1_000.0, 2_000.0, 5_000.0,
            10_000.0, 20_000.0, 50_000.0, 100_000.0,
        ];
        stiffnesses.extend((0..=60).map(|i| 10f64.powf(i as f64 / 10.0 - 1.0)));
        stiffnesses.sort_by(f64::total_cmp);

        let mut previous = f64::INFINITY;
        for stiffness in stiffnesses {
            let outcome = relaxer().minimize(&ff, &pdb, &RestraintSpec::new(stiffness).unwrap(), 1000);
            let report = outcome.report().cloned().unwrap();
            assert!(
                report.backbone_rmsd <= previous,
                "stiffness {stiffness}: rmsd {} > {}",
                report.backbone_rmsd,
                previous
            );
            previous = report.backbone_rmsd;
        }
        assert!(previous < 0.05, "stiffest restraint still drifted {previous} Å");
    }

    #[test]
    fn test_free_relaxation_moves_the_clash() {
        let dir = tempfile::tempdir().unwrap();
        let pdb = write_fixture(dir.path(), "complex.pdb", CLASH_PDB);
        let outcome = relaxer().minimize(&ForceField::standard(), &pdb, &RestraintSpec::unrestrained(), 1000);
        let report = outcome.report().unwrap();
        assert!(report.backbone_rmsd > 0.0);
        assert!(report.final_energy < report.initial_energy);
        assert_eq!(report.restrained_atoms, 0);
    }

    #[test]
    fn test_unrestrained_reports_zero_restrained_atoms() {
        let dir = tempfile::tempdir().unwrap();
        let pdb = write_fixture(dir.path(), "rec.pdb", TRIPEPTIDE_PDB);
        let outcome = relaxer().minimize(&ForceField::standard(), &pdb, &RestraintSpec::unrestrained(), 100);
        let report = outcome.report().unwrap();
        assert_eq!(report.restrained_atoms, 0);
        assert!(report.converged);
        assert_eq!(report.backbone_rmsd, 0.0);
    }

    #[test]
    fn test_missing_file_falls_back_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.pdb");
        let outcome = relaxer().minimize(&ForceField::standard(), &missing, &RestraintSpec::unrestrained(), 10);
        assert!(!outcome.was_relaxed());
        assert_eq!(outcome.path(), missing.as_path());
        assert!(matches!(outcome, RelaxOutcome::Skipped { stage: RelaxStage::NotStarted, .. }));
    }

    #[test]
    fn test_pdbqt_without_sibling_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let pdbqt = write_fixture(dir.path(), "rec.pdbqt", TRIPEPTIDE_PDB);
        let outcome = relaxer().minimize(&ForceField::standard(), &pdbqt, &RestraintSpec::unrestrained(), 10);
        assert_eq!(outcome.path(), pdbqt.as_path());
        let RelaxOutcome::Skipped { reason, .. } = outcome else {
            panic!("expected skip");
        };
        assert!(reason.contains("sibling"));
    }

    #[test]
    fn test_pdbqt_uses_sibling_pdb() {
        let dir = tempfile::tempdir().unwrap();
        let pdbqt = write_fixture(dir.path(), "rec.pdbqt", "REMARK prepared\n");
        write_fixture(dir.path(), "rec.pdb", TRIPEPTIDE_PDB);
        let outcome = relaxer().minimize(&ForceField::standard(), &pdbqt, &RestraintSpec::unrestrained(), 10);
        assert_eq!(outcome.path(), dir.path().join("rec_minimized.pdb").as_path());
    }
}
