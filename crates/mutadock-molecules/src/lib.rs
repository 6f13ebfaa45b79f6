//! mutadock-molecules: mutation-aware docking and consensus scoring.
//!
//! A job runs as a linear pipeline:
//! 1. Mutating a receptor residue, with identity verification
//! 2. Relaxing the mutant under a tunable backbone restraint
//! 3. Deriving the grid box from ligand geometry
//! 4. Preparing PDBQT inputs (Meeko, then OpenBabel)
//! 5. Pose search (AutoDock Vina)
//! 6. Consensus scoring across the available backends
//! 7. Persisting a result record

pub mod structure;
pub mod residues;
pub mod mutation;
pub mod relax;
pub mod grid;
pub mod process;
pub mod settings;
pub mod prep;
pub mod docking;
pub mod scoring;
pub mod record;
pub mod selectivity;
pub mod pipeline;

pub use docking::{DockingConfig, DockingResult, VinaRunner};
pub use grid::compute_box;
pub use mutation::{MutationEngine, MutationSpec};
pub use pipeline::{DockingJob, DockingOrchestrator, DockingRequest, GridSource};
pub use record::ResultRecord;
pub use relax::{ForceField, RelaxOutcome, RestraintSpec, StructureRelaxer};
pub use scoring::{ConsensusMethod, ConsensusResult, ConsensusScorer, ScoringAdapter};
pub use selectivity::{SelectivityClass, SelectivityComparison};
pub use settings::PipelineSettings;
