use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, ValueEnum};
use tracing::info;

use mutadock_common::PocketConfig;
use mutadock_molecules::{
    ConsensusMethod, DockingOrchestrator, DockingRequest, GridSource, MutationSpec, RestraintSpec,
};

use crate::config::Config;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

#[derive(Args, Debug)]
pub struct DockArgs {
    /// Receptor structure (.pdb or .pdbqt)
    #[arg(long)]
    pub receptor: PathBuf,
    /// Ligand structure (.pdb, .pdbqt, .mol2 or .sdf)
    #[arg(long)]
    pub ligand: PathBuf,
    /// Grid box center
    #[arg(
        long,
        num_args = 3,
        value_names = ["X", "Y", "Z"],
        allow_negative_numbers = true,
        required_unless_present = "pocket",
        conflicts_with = "pocket"
    )]
    pub center: Option<Vec<f64>>,
    /// Named pocket from the pocket configuration file
    #[arg(long)]
    pub pocket: Option<String>,
    /// Mutation identifier, e.g. A:87:D:G
    #[arg(long)]
    pub mutation: Option<MutationSpec>,
    /// Relax the receptor before docking
    #[arg(long)]
    pub relax: bool,
    /// Backbone restraint in kJ/mol/nm² (implies --relax; 0 = unrestrained)
    #[arg(long, allow_negative_numbers = true)]
    pub stiffness: Option<f64>,
    /// Combine every available scoring backend
    #[arg(long)]
    pub consensus: bool,
    /// Consensus aggregation (implies --consensus)
    #[arg(long, value_name = "mean|median|weighted")]
    pub consensus_method: Option<ConsensusMethod>,
    /// Padding added to the ligand extent, Å
    #[arg(long, allow_negative_numbers = true)]
    pub buffer: Option<f64>,
    /// Dock only the first instance of this residue from the ligand file
    #[arg(long)]
    pub ligand_code: Option<String>,
    /// Write the result record here
    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

impl DockArgs {
    fn request(&self, config: &Config) -> anyhow::Result<DockingRequest> {
        let grid = match (&self.center, &self.pocket) {
            (Some(center), _) => match center.as_slice() {
                [x, y, z] => GridSource::Center([*x, *y, *z]),
                _ => anyhow::bail!("--center takes exactly three values"),
            },
            (None, Some(name)) => {
                let path = config
                    .grid
                    .pockets
                    .as_ref()
                    .context("--pocket needs grid.pockets set in the configuration")?;
                GridSource::Fixed(PocketConfig::load(path)?.get(name)?)
            }
            (None, None) => anyhow::bail!("either --center or --pocket is required"),
        };

        let restraint = match (self.relax, self.stiffness) {
            (_, Some(k)) => Some(RestraintSpec::new(k)?),
            (true, None) => Some(RestraintSpec::new(config.relax.stiffness)?),
            (false, None) => None,
        };

        let consensus = match (self.consensus, self.consensus_method) {
            (_, Some(method)) => Some(method),
            (true, None) => Some(config.scoring.method),
            (false, None) => None,
        };

        Ok(DockingRequest {
            receptor: self.receptor.clone(),
            ligand: self.ligand.clone(),
            grid,
            mutation: self.mutation,
            restraint,
            consensus,
            buffer: self.buffer,
            ligand_code: self.ligand_code.clone(),
            output: self.output.clone(),
        })
    }
}

pub async fn run(args: &DockArgs, config: &Config) -> anyhow::Result<()> {
    let request = args.request(config)?;
    let orchestrator = DockingOrchestrator::new(config.pipeline()).await;
    let job = orchestrator.run(&request).await?;
    let record = job.record();

    match args.format {
        OutputFormat::Json => println!("{}", record.to_json()?),
        OutputFormat::Text => println!("{}", record.render_text()),
    }
    if record.simulated {
        info!("Result is SIMULATED: no pose-search engine was available");
    }
    Ok(())
}
