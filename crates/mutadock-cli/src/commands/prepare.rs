use std::path::PathBuf;

use clap::{Args, ValueEnum};

use mutadock_molecules::{DockingOrchestrator, MutationSpec};

use crate::config::Config;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum PrepareOutput {
    /// Convert to PDBQT
    #[default]
    Pdbqt,
    /// Stop after mutation
    Mutant,
}

#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Structure to prepare (.pdb)
    #[arg(long)]
    pub structure: PathBuf,
    /// Mutation identifier, e.g. A:87:D:G
    #[arg(long)]
    pub mutation: Option<MutationSpec>,
    #[arg(long, value_enum, default_value_t = PrepareOutput::Pdbqt)]
    pub output_format: PrepareOutput,
}

pub async fn run(args: &PrepareArgs, config: &Config) -> anyhow::Result<()> {
    let orchestrator = DockingOrchestrator::new(config.pipeline()).await;
    let path = orchestrator
        .prepare_structure(
            &args.structure,
            args.mutation.as_ref(),
            args.output_format == PrepareOutput::Pdbqt,
        )
        .await?;
    println!("Prepared file: {}", path.display());
    Ok(())
}
