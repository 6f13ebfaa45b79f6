//! End-to-end docking jobs against fake engine executables.
//!
//! ```bash
//! cargo test --package mutadock-molecules --test test_docking_e2e
//! ```
#![cfg(unix)]

use pretty_assertions::assert_eq;
use std::path::PathBuf;

use mutadock_common::MutadockError;
use mutadock_molecules::scoring::ScorerKind;
use mutadock_molecules::settings::{ProviderKind, ScorerSpec};
use mutadock_molecules::{
    ConsensusMethod, DockingOrchestrator, DockingRequest, GridSource, MutationSpec, PipelineSettings,
    RelaxOutcome, RestraintSpec, ResultRecord,
};
use mutadock_test_utils::{
    fake_gnina, fake_obabel, fake_vina, missing_tool, Sandbox, FAKE_VINA_BEST_MODE, LIGAND_PDB,
    TRIPEPTIDE_PDB,
};

const LIGAND_CENTER: [f64; 3] = [4.7, 2.05, -3.0];

fn settings(sb: &Sandbox, with_vina: bool) -> PipelineSettings {
    let mut settings = PipelineSettings::default();
    let vina = if with_vina {
        fake_vina(sb.path())
    } else {
        missing_tool(sb.path(), "vina")
    };
    settings.engines.vina = vina.clone();
    settings.scoring.scorers = vec![
        ScorerSpec::new(ScorerKind::Vina, vina),
        ScorerSpec::new(ScorerKind::Gnina, fake_gnina(sb.path())),
    ];
    settings.preparation.providers = vec![ProviderKind::Obabel];
    settings.preparation.obabel = fake_obabel(sb.path());
    settings
}

#[tokio::test]
async fn test_mutant_relaxed_consensus_job() {
    let sb = Sandbox::new();
    let receptor = sb.file("receptor.pdb", TRIPEPTIDE_PDB);
    let ligand = sb.file("ligand.pdb", LIGAND_PDB);
    let output: PathBuf = sb.path().join("results/job.json");

    let orchestrator = DockingOrchestrator::new(settings(&sb, true)).await;
    let mut request = DockingRequest::new(&receptor, &ligand, GridSource::Center(LIGAND_CENTER));
    request.mutation = Some("A:87:D:G".parse::<MutationSpec>().unwrap());
    request.restraint = Some(RestraintSpec::new(500.0).unwrap());
    request.consensus = Some(ConsensusMethod::Mean);
    request.output = Some(output.clone());

    let job = orchestrator.run(&request).await.unwrap();

    assert!(matches!(job.relaxation, Some(RelaxOutcome::Relaxed { .. })));
    assert_eq!(job.docking.binding_affinity, FAKE_VINA_BEST_MODE);
    assert_eq!(job.record_path.as_deref(), Some(output.as_path()));

    // Input untouched; the mutant chain of files lives beside it.
    assert_eq!(std::fs::read_to_string(&receptor).unwrap(), TRIPEPTIDE_PDB);
    assert!(sb.path().join("receptor_mutant.pdb").exists());
    assert!(sb.path().join("receptor_mutant_minimized.pdb").exists());
    assert_eq!(job.receptor, sb.path().join("receptor_mutant_minimized.pdbqt"));

    let record = ResultRecord::read(&output).unwrap();
    assert_eq!(record.mutation, "A:87:D:G");
    assert!(record.consensus_mode);
    assert!(record.relaxed);
    assert!(!record.simulated);
    assert_eq!(record.consensus_method, Some(ConsensusMethod::Mean));
    assert_eq!(record.consensus_all_available, Some(true));
    assert_eq!(record.restraint_stiffness, Some(500.0));

    let consensus = record.consensus_affinity_kcal_mol.unwrap();
    let uncertainty = record.consensus_uncertainty_kcal_mol.unwrap();
    assert!((consensus + 8.7).abs() < 1e-9, "consensus {}", consensus);
    assert!((uncertainty - 0.566).abs() < 1e-3, "uncertainty {}", uncertainty);

    let scores = record.individual_scores.unwrap();
    assert_eq!(scores.len(), 2);
    assert_eq!(scores["vina"], -9.1);
    assert_eq!(scores["gnina"], -8.3);

    // Ligand extent 2.8 x 2.3 x 0 plus 6 Å buffer, clamped up to 10.
    assert!(record.grid_box.size().iter().all(|&s| s == 10.0));
}

#[tokio::test]
async fn test_plain_docking_without_engine_is_flagged_simulated() {
    let sb = Sandbox::new();
    let receptor = sb.file("receptor.pdb", TRIPEPTIDE_PDB);
    let ligand = sb.file("ligand.pdb", LIGAND_PDB);
    let output = sb.path().join("wt.json");

    let orchestrator = DockingOrchestrator::new(settings(&sb, false)).await;
    let mut request = DockingRequest::new(&receptor, &ligand, GridSource::Center(LIGAND_CENTER));
    request.output = Some(output.clone());

    let job = orchestrator.run(&request).await.unwrap();
    assert!(job.relaxation.is_none());
    assert!(job.consensus.is_none());

    let record = ResultRecord::read(&output).unwrap();
    assert!(record.simulated);
    assert!(!record.consensus_mode);
    assert!(!record.relaxed);
    assert_eq!(record.mutation, "WT");
    assert!((-9.0..-5.0).contains(&record.binding_affinity_kcal_mol));

    let raw = std::fs::read_to_string(&output).unwrap();
    assert!(!raw.contains("individual_scores"));
}

#[tokio::test]
async fn test_identity_mismatch_is_fatal_and_writes_nothing() {
    let sb = Sandbox::new();
    let receptor = sb.file("receptor.pdb", TRIPEPTIDE_PDB);
    let ligand = sb.file("ligand.pdb", LIGAND_PDB);
    let output = sb.path().join("never.json");

    let orchestrator = DockingOrchestrator::new(settings(&sb, true)).await;
    let mut request = DockingRequest::new(&receptor, &ligand, GridSource::Center(LIGAND_CENTER));
    request.mutation = Some("A:87:K:G".parse().unwrap());
    request.output = Some(output.clone());

    let err = orchestrator.run(&request).await.unwrap_err();
    assert!(matches!(err, MutadockError::Mutation(_)));
    assert!(err.to_string().contains("Residue mismatch"));
    assert!(!output.exists());
    assert!(!sb.path().join("receptor_mutant.pdb").exists());
}

#[tokio::test]
async fn test_consensus_without_any_scorer_is_fatal() {
    let sb = Sandbox::new();
    let receptor = sb.file("receptor.pdb", TRIPEPTIDE_PDB);
    let ligand = sb.file("ligand.pdb", LIGAND_PDB);

    let mut settings = settings(&sb, true);
    settings.scoring.scorers = vec![
        ScorerSpec::new(ScorerKind::Gnina, missing_tool(sb.path(), "gnina")),
        ScorerSpec::new(ScorerKind::RfScore, missing_tool(sb.path(), "rf-score")),
    ];
    let orchestrator = DockingOrchestrator::new(settings).await;

    let mut request = DockingRequest::new(&receptor, &ligand, GridSource::Center(LIGAND_CENTER));
    request.consensus = Some(ConsensusMethod::Weighted);

    let err = orchestrator.run(&request).await.unwrap_err();
    assert!(matches!(err, MutadockError::Consensus(_)));
}

#[tokio::test]
async fn test_prepare_structure_mutates_then_converts() {
    let sb = Sandbox::new();
    let receptor = sb.file("receptor.pdb", TRIPEPTIDE_PDB);
    let orchestrator = DockingOrchestrator::new(settings(&sb, false)).await;

    let spec: MutationSpec = "87:G".parse().unwrap();
    let mutant = orchestrator
        .prepare_structure(&receptor, Some(&spec), false)
        .await
        .unwrap();
    assert_eq!(mutant, sb.path().join("receptor_mutant.pdb"));

    let pdbqt = orchestrator
        .prepare_structure(&receptor, Some(&spec), true)
        .await
        .unwrap();
    assert_eq!(pdbqt, sb.path().join("receptor_mutant.pdbqt"));
    assert!(std::fs::read_to_string(pdbqt).unwrap().contains("GLY A  87"));
}
