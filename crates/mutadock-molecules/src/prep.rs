//! Structure preparation: PDB to PDBQT through an ordered chain of providers.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use mutadock_common::{MutadockError, Result};

use crate::process::ExternalTool;
use crate::settings::{PreparationSettings, ProviderKind};
use crate::structure::Structure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoleculeRole {
    Receptor,
    Ligand,
}

impl fmt::Display for MoleculeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Receptor => f.write_str("receptor"),
            Self::Ligand => f.write_str("ligand"),
        }
    }
}

/// One way of turning a PDB file into a PDBQT file.
#[async_trait]
pub trait PreparationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn attempt(&self, input: &Path, output: &Path, role: MoleculeRole) -> Result<()>;
}

async fn run_tool(tool: &ExternalTool, provider: &str, args: Vec<String>, timeout: Duration) -> Result<()> {
    let output = tool
        .run(args, timeout)
        .await
        .map_err(|e| MutadockError::Preparation(format!("{}: {}", provider, e)))?;
    if !output.success {
        return Err(MutadockError::Preparation(format!(
            "{} conversion failed: {}",
            provider,
            output.failure_summary()
        )));
    }
    Ok(())
}

// ── Meeko ─────────────────────────────────────────────────────────────────────

pub struct MeekoProvider {
    receptor: ExternalTool,
    ligand: ExternalTool,
    timeout: Duration,
}

impl MeekoProvider {
    pub fn new(receptor_script: &Path, ligand_script: &Path, timeout: Duration) -> Self {
        Self {
            receptor: ExternalTool::new(receptor_script),
            ligand: ExternalTool::new(ligand_script),
            timeout,
        }
    }
}

#[async_trait]
impl PreparationProvider for MeekoProvider {
    fn name(&self) -> &str {
        "meeko"
    }

    async fn attempt(&self, input: &Path, output: &Path, role: MoleculeRole) -> Result<()> {
        let input = input.display().to_string();
        match role {
            MoleculeRole::Receptor => {
                // Meeko appends .pdbqt to the basename it is given.
                let basename = output.with_extension("").display().to_string();
                let args = vec!["--read_pdb".to_string(), input, "-o".to_string(), basename, "-p".to_string()];
                run_tool(&self.receptor, self.name(), args, self.timeout).await
            }
            MoleculeRole::Ligand => {
                let args = vec!["-i".to_string(), input, "-o".to_string(), output.display().to_string()];
                run_tool(&self.ligand, self.name(), args, self.timeout).await
            }
        }
    }
}

// ── OpenBabel ─────────────────────────────────────────────────────────────────

pub struct OpenBabelProvider {
    tool: ExternalTool,
    ph: f64,
    timeout: Duration,
}

impl OpenBabelProvider {
    pub fn new(executable: &Path, ph: f64, timeout: Duration) -> Self {
        Self {
            tool: ExternalTool::new(executable),
            ph,
            timeout,
        }
    }

    fn args(&self, input: &Path, output: &Path, role: MoleculeRole) -> Vec<String> {
        let mut args = vec![
            input.display().to_string(),
            "-O".to_string(),
            output.display().to_string(),
        ];
        if role == MoleculeRole::Receptor {
            args.push("-xr".to_string());
        }
        args.extend([
            "-h".to_string(),
            format!("-p{}", self.ph),
            "--partialcharge".to_string(),
            "gasteiger".to_string(),
        ]);
        args
    }
}

#[async_trait]
impl PreparationProvider for OpenBabelProvider {
    fn name(&self) -> &str {
        "obabel"
    }

    async fn attempt(&self, input: &Path, output: &Path, role: MoleculeRole) -> Result<()> {
        debug!("Using OpenBabel for conversion (pH={})", self.ph);
        run_tool(&self.tool, self.name(), self.args(input, output, role), self.timeout).await
    }
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// Providers tried in order; the first valid output wins.
pub struct PreparationChain {
    providers: Vec<Box<dyn PreparationProvider>>,
}

impl PreparationChain {
    pub fn new(providers: Vec<Box<dyn PreparationProvider>>) -> Self {
        Self { providers }
    }

    pub fn from_settings(settings: &PreparationSettings) -> Self {
        let providers = settings
            .providers
            .iter()
            .map(|kind| -> Box<dyn PreparationProvider> {
                match kind {
                    ProviderKind::Meeko => Box::new(MeekoProvider::new(
                        &settings.meeko_receptor,
                        &settings.meeko_ligand,
                        settings.timeout(),
                    )),
                    ProviderKind::Obabel => {
                        Box::new(OpenBabelProvider::new(&settings.obabel, settings.ph, settings.timeout()))
                    }
                }
            })
            .collect();
        Self::new(providers)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Convert `input` to `<stem>.pdbqt` beside it. PDBQT input is returned as is.
    pub async fn prepare(&self, input: &Path, role: MoleculeRole) -> Result<PathBuf> {
        if !input.is_file() {
            return Err(MutadockError::Validation(format!(
                "{} file not found: {}",
                role,
                input.display()
            )));
        }
        if has_extension(input, "pdbqt") {
            debug!("{} already in PDBQT format: {}", role, input.display());
            return Ok(input.to_path_buf());
        }

        let output = input.with_extension("pdbqt");
        info!("Converting {} {} to PDBQT", role, input.display());

        let mut failures = Vec::new();
        for provider in &self.providers {
            remove_stale(&output)?;
            let outcome = match provider.attempt(input, &output, role).await {
                Ok(()) => validate_pdbqt(&output).map(|_| ()),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    info!("{} conversion successful: {}", provider.name(), output.display());
                    return Ok(output);
                }
                Err(e) => {
                    warn!("{} failed for {}: {}", provider.name(), input.display(), e);
                    failures.push(format!("{}: {}", provider.name(), e));
                }
            }
        }

        Err(MutadockError::Preparation(format!(
            "could not prepare {} {} ({})",
            role,
            input.display(),
            if failures.is_empty() {
                "no providers configured".to_string()
            } else {
                failures.join("; ")
            }
        )))
    }
}

/// A provider that exits cleanly without writing must not inherit a previous run's file.
fn remove_stale(output: &Path) -> Result<()> {
    match std::fs::remove_file(output) {
        Ok(()) => {
            debug!("Removed stale {}", output.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MutadockError::Preparation(format!(
            "cannot remove stale {}: {}",
            output.display(),
            e
        ))),
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

// ── Validation ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdbqtSummary {
    pub atoms: usize,
    pub has_charges: bool,
}

/// Non-empty with at least one coordinate record. Missing charge columns only warn.
pub fn validate_pdbqt(path: &Path) -> Result<PdbqtSummary> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        MutadockError::Preparation(format!("cannot read {}: {}", path.display(), e))
    })?;
    if text.trim().is_empty() {
        return Err(MutadockError::Preparation(format!("{} is empty", path.display())));
    }

    let records: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with("ATOM") || l.starts_with("HETATM"))
        .collect();
    if records.is_empty() {
        return Err(MutadockError::Preparation(format!(
            "{} has no ATOM/HETATM records",
            path.display()
        )));
    }

    let has_charges = records.iter().any(|l| {
        l.get(70..76)
            .map(|c| c.trim().parse::<f64>().is_ok())
            .unwrap_or(false)
    });
    if !has_charges {
        warn!("{} has no partial charge columns", path.display());
    }

    Ok(PdbqtSummary {
        atoms: records.len(),
        has_charges,
    })
}

// ── Ligand extraction ─────────────────────────────────────────────────────────

/// Keep only the first residue instance named `code`, writing `<stem>_ligand_extracted.pdb`.
pub fn extract_single_ligand(pdb: &Path, code: &str) -> Result<PathBuf> {
    let code = code.trim().to_ascii_uppercase();
    let mut structure = Structure::read(pdb)?;

    let (chain_id, res_seq, i_code) = structure
        .atoms()
        .find(|a| a.res_name == code)
        .map(|a| (a.chain_id, a.res_seq, a.i_code))
        .ok_or_else(|| {
            MutadockError::Preparation(format!("ligand {} not found in {}", code, pdb.display()))
        })?;

    info!(
        "Extracting {} from chain {}, residue {}",
        code, chain_id, res_seq
    );
    structure.retain_atoms(|a| {
        a.res_name == code && a.chain_id == chain_id && a.res_seq == res_seq && a.i_code == i_code
    });

    let stem = pdb
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ligand".to_string());
    let output = pdb.with_file_name(format!("{}_ligand_extracted.pdb", stem));
    structure.write(&output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mutadock_test_utils::{
        failing_tool, fake_obabel, missing_tool, write_fixture, Sandbox, COMPLEX_PDB, LIGAND_PDB,
        TRIPEPTIDE_PDB,
    };

    const PDBQT: &str = "\
ATOM      1  N   GLY A  86      -1.458   0.000   0.000  1.00  0.00    -0.350 N
ATOM      2  CA  GLY A  86       0.000   0.000   0.000  1.00  0.00     0.100 C
";

    #[test]
    fn test_validate_pdbqt() {
        let sb = Sandbox::new();
        let ok = validate_pdbqt(&sb.file("ok.pdbqt", PDBQT)).unwrap();
        assert_eq!(ok, PdbqtSummary { atoms: 2, has_charges: true });

        let uncharged = validate_pdbqt(&sb.file("plain.pdbqt", TRIPEPTIDE_PDB)).unwrap();
        assert!(!uncharged.has_charges);

        assert!(validate_pdbqt(&sb.file("empty.pdbqt", "\n")).is_err());
        assert!(validate_pdbqt(&sb.file("remarks.pdbqt", "REMARK nothing\n")).is_err());
    }

    #[test]
    fn test_obabel_args() {
        let ob = OpenBabelProvider::new(Path::new("obabel"), 7.4, Duration::from_secs(1));
        let rec = ob.args(Path::new("in.pdb"), Path::new("out.pdbqt"), MoleculeRole::Receptor);
        assert_eq!(
            rec,
            vec!["in.pdb", "-O", "out.pdbqt", "-xr", "-h", "-p7.4", "--partialcharge", "gasteiger"]
        );
        let lig = ob.args(Path::new("in.pdb"), Path::new("out.pdbqt"), MoleculeRole::Ligand);
        assert!(!lig.contains(&"-xr".to_string()));
    }

    #[tokio::test]
    async fn test_pdbqt_input_is_not_converted() {
        let sb = Sandbox::new();
        let input = sb.file("rec.pdbqt", PDBQT);
        let chain = PreparationChain::new(Vec::new());
        assert_eq!(chain.prepare(&input, MoleculeRole::Receptor).await.unwrap(), input);
    }

    #[tokio::test]
    async fn test_missing_input_is_validation_error() {
        let chain = PreparationChain::new(Vec::new());
        let err = chain
            .prepare(Path::new("/nonexistent/rec.pdb"), MoleculeRole::Receptor)
            .await
            .unwrap_err();
        assert!(matches!(err, MutadockError::Validation(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_falls_back_to_next_provider() {
        let sb = Sandbox::new();
        let input = sb.file("lig.pdb", LIGAND_PDB);
        let meeko = missing_tool(sb.path(), "mk_prepare_ligand.py");
        let chain = PreparationChain::new(vec![
            Box::new(MeekoProvider::new(&meeko, &meeko, Duration::from_secs(5))),
            Box::new(OpenBabelProvider::new(&fake_obabel(sb.path()), 7.4, Duration::from_secs(5))),
        ]);
        assert_eq!(chain.provider_names(), vec!["meeko", "obabel"]);

        let out = chain.prepare(&input, MoleculeRole::Ligand).await.unwrap();
        assert_eq!(out, sb.path().join("lig.pdbqt"));
        assert_eq!(std::fs::read_to_string(out).unwrap(), LIGAND_PDB);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_all_providers_failing_is_preparation_error() {
        let sb = Sandbox::new();
        let input = sb.file("rec.pdb", TRIPEPTIDE_PDB);
        let broken = failing_tool(sb.path(), "obabel");
        let chain = PreparationChain::new(vec![Box::new(OpenBabelProvider::new(
            &broken,
            7.4,
            Duration::from_secs(5),
        ))]);
        let err = chain.prepare(&input, MoleculeRole::Receptor).await.unwrap_err();
        assert!(matches!(err, MutadockError::Preparation(_)));
        assert!(err.to_string().contains("engine exploded"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_leftover_output_is_not_reused() {
        let sb = Sandbox::new();
        let input = sb.file("rec.pdb", TRIPEPTIDE_PDB);
        let leftover = sb.file("rec.pdbqt", PDBQT);
        let silent = sb.executable("obabel", "#!/bin/sh\nexit 0\n");
        let chain = PreparationChain::new(vec![Box::new(OpenBabelProvider::new(
            &silent,
            7.4,
            Duration::from_secs(5),
        ))]);

        let err = chain.prepare(&input, MoleculeRole::Receptor).await.unwrap_err();
        assert!(matches!(err, MutadockError::Preparation(_)));
        assert!(!leftover.exists());
    }

    #[test]
    fn test_extract_first_ligand_instance() {
        let sb = Sandbox::new();
        let complex = write_fixture(sb.path(), "cplx.pdb", COMPLEX_PDB);
        let out = extract_single_ligand(&complex, "lig").unwrap();
        assert_eq!(out, sb.path().join("cplx_ligand_extracted.pdb"));

        let ligand = Structure::read(&out).unwrap();
        assert_eq!(ligand.atom_count(), 2);
        assert!(ligand.atoms().all(|a| a.chain_id == 'A' && a.res_seq == 301));
    }

    #[test]
    fn test_extract_missing_code() {
        let sb = Sandbox::new();
        let complex = sb.file("cplx.pdb", COMPLEX_PDB);
        assert!(matches!(
            extract_single_ligand(&complex, "XK2"),
            Err(MutadockError::Preparation(_))
        ));
    }
}
