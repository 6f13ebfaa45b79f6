//! In-silico point mutation with residue identity verification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use mutadock_common::{MutadockError, Result};

use crate::residues::{AminoAcid, BACKBONE_ATOMS};
use crate::structure::Structure;

/// Chain used when an identifier omits it.
pub const DEFAULT_CHAIN: char = 'A';

// ── Mutation identifier ───────────────────────────────────────────────────────

/// A single residue substitution, e.g. `A:87:D:G`.
///
/// Accepted forms: `RESIDUE:NEW` (chain A), `CHAIN:RESIDUE:NEW`,
/// `CHAIN:RESIDUE:OLD:NEW`. Codes may be one- or three-letter; the chain id
/// is kept exactly as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MutationSpec {
    pub chain_id: char,
    pub residue_number: i32,
    pub expected_from: Option<AminoAcid>,
    pub target: AminoAcid,
}

impl MutationSpec {
    pub fn new(chain_id: char, residue_number: i32, target: AminoAcid) -> Self {
        Self {
            chain_id,
            residue_number,
            expected_from: None,
            target,
        }
    }

    pub fn expecting(mut self, from: AminoAcid) -> Self {
        self.expected_from = Some(from);
        self
    }
}

impl FromStr for MutationSpec {
    type Err = MutadockError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = |why: &str| {
            MutadockError::Validation(format!(
                "malformed mutation '{}': {} (expected RES:NEW, CHAIN:RES:NEW or CHAIN:RES:OLD:NEW)",
                s, why
            ))
        };

        let parts: Vec<&str> = s.trim().split(':').map(str::trim).collect();
        let (chain, number, from, to) = match parts.as_slice() {
            [number, to] => (None, *number, None, *to),
            [chain, number, to] => (Some(*chain), *number, None, *to),
            [chain, number, from, to] => (Some(*chain), *number, Some(*from), *to),
            _ => return Err(malformed("wrong number of fields")),
        };

        let chain_id = match chain {
            None => DEFAULT_CHAIN,
            Some(c) => {
                let mut chars = c.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) if ch.is_ascii_alphanumeric() => ch,
                    _ => return Err(malformed("chain must be a single alphanumeric character")),
                }
            }
        };

        let residue_number = number
            .parse::<i32>()
            .map_err(|_| malformed("residue number is not an integer"))?;

        let expected_from = from
            .map(|code| AminoAcid::from_code(code).ok_or_else(|| malformed("unknown original residue")))
            .transpose()?;
        let target = AminoAcid::from_code(to).ok_or_else(|| malformed("unknown target residue"))?;

        Ok(Self {
            chain_id,
            residue_number,
            expected_from,
            target,
        })
    }
}

impl fmt::Display for MutationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expected_from {
            Some(from) => write!(
                f,
                "{}:{}:{}:{}",
                self.chain_id,
                self.residue_number,
                from.one_letter(),
                self.target.one_letter()
            ),
            None => write!(
                f,
                "{}:{}:{}",
                self.chain_id,
                self.residue_number,
                self.target.one_letter()
            ),
        }
    }
}

impl From<MutationSpec> for String {
    fn from(spec: MutationSpec) -> Self {
        spec.to_string()
    }
}

impl TryFrom<String> for MutationSpec {
    type Error = MutadockError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// What a mutation run produced.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub path: PathBuf,
    pub original_residue: String,
    pub pruned_atoms: usize,
}

/// Applies residue substitutions to structure files.
#[derive(Debug, Clone, Default)]
pub struct MutationEngine;

impl MutationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Fail unless `chain:residue` currently holds `expected` (one- or three-letter code).
    pub fn assert_residue_identity(
        &self,
        structure: &Path,
        chain_id: char,
        residue_number: i32,
        expected: &str,
    ) -> Result<()> {
        let expected = AminoAcid::from_str(expected)?;
        let parsed = Structure::read(structure)?;
        let found = locate(&parsed, structure, chain_id, residue_number)?;

        if found != expected.three_letter() {
            return Err(MutadockError::Mutation(format!(
                "Residue mismatch at {}:{}. Expected {}, found {}.",
                chain_id, residue_number, expected, found
            )));
        }
        debug!("Residue {}:{} is {} as expected", chain_id, residue_number, found);
        Ok(())
    }

    /// Relabel `chain:residue` as `target` and write `<stem>_mutant.<ext>` beside the input.
    pub fn mutate(
        &self,
        structure: &Path,
        chain_id: char,
        residue_number: i32,
        target: &str,
    ) -> Result<PathBuf> {
        let target = AminoAcid::from_str(target)?;
        Ok(self.mutate_to(structure, chain_id, residue_number, target)?.path)
    }

    /// Verify the expected residue, if one was given, then mutate.
    pub fn apply(&self, structure: &Path, spec: &MutationSpec) -> Result<MutationOutcome> {
        if let Some(expected) = spec.expected_from {
            self.assert_residue_identity(
                structure,
                spec.chain_id,
                spec.residue_number,
                expected.three_letter(),
            )?;
        }
        self.mutate_to(structure, spec.chain_id, spec.residue_number, spec.target)
    }

    fn mutate_to(
        &self,
        structure: &Path,
        chain_id: char,
        residue_number: i32,
        target: AminoAcid,
    ) -> Result<MutationOutcome> {
        let mut parsed = Structure::read(structure)?;
        let original_residue = locate(&parsed, structure, chain_id, residue_number)?.to_string();

        info!(
            "Mutating {}: chain {}, residue {} {} -> {}",
            structure.display(),
            chain_id,
            residue_number,
            original_residue,
            target
        );

        parsed.rename_residue(chain_id, residue_number, target.three_letter());

        let side_chain = target.side_chain_heavy_atoms();
        let pruned_atoms = parsed.prune_residue(chain_id, residue_number, |atom| {
            BACKBONE_ATOMS.contains(&atom.name.as_str())
                || (!atom.is_hydrogen() && side_chain.contains(&atom.name.as_str()))
        });
        if pruned_atoms > 0 {
            debug!("Removed {} side-chain atoms absent from {}", pruned_atoms, target);
        }

        let path = mutant_path(structure);
        parsed.write(&path)?;
        info!("Mutated structure saved to: {}", path.display());

        Ok(MutationOutcome {
            path,
            original_residue,
            pruned_atoms,
        })
    }
}

fn locate<'a>(
    structure: &'a Structure,
    path: &Path,
    chain_id: char,
    residue_number: i32,
) -> Result<&'a str> {
    if !structure.has_chain(chain_id) {
        return Err(MutadockError::Mutation(format!(
            "chain '{}' not found in {}",
            chain_id,
            path.display()
        )));
    }
    structure.residue_name(chain_id, residue_number).ok_or_else(|| {
        MutadockError::Mutation(format!(
            "residue {}:{} not found in {}",
            chain_id,
            residue_number,
            path.display()
        ))
    })
}

/// `dir/name.pdb` -> `dir/name_mutant.pdb`
fn mutant_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "structure".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pdb".to_string());
    input.with_file_name(format!("{}_mutant.{}", stem, ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mutadock_test_utils::{write_fixture, TRIPEPTIDE_PDB};

    #[test]
    fn test_parse_all_forms() {
        let full: MutationSpec = "A:87:D:G".parse().unwrap();
        assert_eq!(full.chain_id, 'A');
        assert_eq!(full.residue_number, 87);
        assert_eq!(full.expected_from, Some(AminoAcid::Asp));
        assert_eq!(full.target, AminoAcid::Gly);
        assert_eq!(full.to_string(), "A:87:D:G");

        let chained: MutationSpec = "B:12:ASP".parse().unwrap();
        assert_eq!(chained.chain_id, 'B');
        assert_eq!(chained.expected_from, None);
        assert_eq!(chained.to_string(), "B:12:D");

        let bare: MutationSpec = "87:g".parse().unwrap();
        assert_eq!(bare.chain_id, DEFAULT_CHAIN);
        assert_eq!(bare.to_string(), "A:87:G");
    }

    #[test]
    fn test_three_letter_codes_display_canonically() {
        let spec: MutationSpec = "A:87:asp:gly".parse().unwrap();
        assert_eq!(spec.to_string(), "A:87:D:G");
    }

    #[test]
    fn test_chain_id_is_case_sensitive() {
        let lower: MutationSpec = "b:87:G".parse().unwrap();
        assert_eq!(lower.chain_id, 'b');
        assert_eq!(lower.to_string(), "b:87:G");

        let dir = tempfile::tempdir().unwrap();
        let pdb = write_fixture(dir.path(), "rec.pdb", &TRIPEPTIDE_PDB.replace(" A  8", " b  8"));
        let engine = MutationEngine::new();
        assert!(matches!(
            engine.apply(&pdb, &"B:87:G".parse().unwrap()),
            Err(MutadockError::Mutation(_))
        ));
        let outcome = engine.apply(&pdb, &lower).unwrap();
        assert_eq!(Structure::read(&outcome.path).unwrap().residue_name('b', 87), Some("GLY"));
    }

    #[test]
    fn test_malformed_identifiers_rejected() {
        for bad in ["", "A", "A:87:D:G:X", "AB:87:G", "A:eighty:G", "A:87:X", "A:87:Z:G"] {
            let err = bad.parse::<MutationSpec>().unwrap_err();
            assert!(matches!(err, MutadockError::Validation(_)), "{bad} -> {err}");
        }
    }

    #[test]
    fn test_serde_as_identifier_string() {
        let spec: MutationSpec = "A:87:D:G".parse().unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(json, "\"A:87:D:G\"");
        let back: MutationSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_identity_check_passes_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pdb = write_fixture(dir.path(), "rec.pdb", TRIPEPTIDE_PDB);
        let engine = MutationEngine::new();

        engine.assert_residue_identity(&pdb, 'A', 87, "D").unwrap();
        engine.assert_residue_identity(&pdb, 'A', 87, "ASP").unwrap();

        let err = engine.assert_residue_identity(&pdb, 'A', 87, "K").unwrap_err();
        assert!(matches!(err, MutadockError::Mutation(_)));
        assert!(err.to_string().contains("Residue mismatch"));
        assert!(err.to_string().contains("Expected LYS, found ASP"));
    }

    #[test]
    fn test_missing_chain_or_residue() {
        let dir = tempfile::tempdir().unwrap();
        let pdb = write_fixture(dir.path(), "rec.pdb", TRIPEPTIDE_PDB);
        let engine = MutationEngine::new();

        assert!(matches!(engine.mutate(&pdb, 'Z', 87, "G"), Err(MutadockError::Mutation(_))));
        assert!(matches!(engine.mutate(&pdb, 'A', 999, "G"), Err(MutadockError::Mutation(_))));
    }

    #[test]
    fn test_mutate_writes_new_file_and_prunes_side_chain() {
        let dir = tempfile::tempdir().unwrap();
        let pdb = write_fixture(dir.path(), "rec.pdb", TRIPEPTIDE_PDB);
        let before = std::fs::read_to_string(&pdb).unwrap();

        let spec: MutationSpec = "A:87:D:G".parse().unwrap();
        let outcome = MutationEngine::new().apply(&pdb, &spec).unwrap();

        assert_eq!(outcome.path, dir.path().join("rec_mutant.pdb"));
        assert_eq!(outcome.original_residue, "ASP");
        assert_eq!(outcome.pruned_atoms, 4, "CB, CG, OD1, OD2 removed");
        assert_eq!(std::fs::read_to_string(&pdb).unwrap(), before, "input untouched");

        let mutant = Structure::read(&outcome.path).unwrap();
        assert_eq!(mutant.residue_name('A', 87), Some("GLY"));
        let names: Vec<_> = mutant
            .atoms()
            .filter(|a| a.res_seq == 87)
            .map(|a| a.name.clone())
            .collect();
        assert_eq!(names, vec!["N", "CA", "C", "O"]);
    }

    #[test]
    fn test_mismatch_aborts_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let pdb = write_fixture(dir.path(), "rec.pdb", TRIPEPTIDE_PDB);
        let spec: MutationSpec = "A:87:E:G".parse().unwrap();

        assert!(MutationEngine::new().apply(&pdb, &spec).is_err());
        assert!(!dir.path().join("rec_mutant.pdb").exists());
    }
}
