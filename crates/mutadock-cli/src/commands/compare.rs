use std::path::PathBuf;

use clap::Args;

use mutadock_molecules::{ResultRecord, SelectivityComparison};

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Result record of the wild-type run
    #[arg(long)]
    pub wild_type: PathBuf,
    /// Result record of the mutant run
    #[arg(long)]
    pub mutant: PathBuf,
}

pub fn run(args: &CompareArgs) -> anyhow::Result<()> {
    let wild_type = ResultRecord::read(&args.wild_type)?;
    let mutant = ResultRecord::read(&args.mutant)?;
    if !wild_type.is_wild_type() {
        tracing::warn!(
            "{} carries mutation {}; comparing anyway",
            args.wild_type.display(),
            wild_type.mutation
        );
    }

    let comparison = SelectivityComparison::compare(&wild_type, &mutant);
    tracing::info!(
        "ΔΔG = {:.2} kcal/mol ({})",
        comparison.delta_delta_g_kcal_mol,
        comparison.classification
    );
    println!("{}", serde_json::to_string_pretty(&comparison)?);
    Ok(())
}
