//! Shared fixtures for mutadock tests: small structures and stand-in engine
//! executables that print the output formats the real engines produce.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

// ── Structures ────────────────────────────────────────────────────────────────

/// GLY-ASP-ALA on chain A, residues 86..88, heavy atoms only.
pub const TRIPEPTIDE_PDB: &str = "\
HEADER    TRIPEPTIDE FIXTURE
ATOM      1  N   GLY A  86      -1.458   0.000   0.000  1.00  0.00           N
ATOM      2  CA  GLY A  86       0.000   0.000   0.000  1.00  0.00           C
ATOM      3  C   GLY A  86       0.551   0.711  -1.231  1.00  0.00           C
ATOM      4  O   GLY A  86       1.477   1.516  -1.126  1.00  0.00           O
ATOM      5  N   ASP A  87      -0.022   0.407  -2.391  1.00  0.00           N
ATOM      6  CA  ASP A  87       0.410   1.015  -3.643  1.00  0.00           C
ATOM      7  C   ASP A  87       0.253   2.532  -3.602  1.00  0.00           C
ATOM      8  O   ASP A  87       1.154   3.264  -4.012  1.00  0.00           O
ATOM      9  CB  ASP A  87      -0.379   0.438  -4.820  1.00  0.00           C
ATOM     10  CG  ASP A  87      -0.207  -1.064  -4.970  1.00  0.00           C
ATOM     11  OD1 ASP A  87       0.529  -1.665  -4.158  1.00  0.00           O
ATOM     12  OD2 ASP A  87      -0.808  -1.643  -5.901  1.00  0.00           O
ATOM     13  N   ALA A  88      -0.892   2.990  -3.106  1.00  0.00           N
ATOM     14  CA  ALA A  88      -1.168   4.418  -3.011  1.00  0.00           C
ATOM     15  C   ALA A  88      -0.140   5.122  -2.131  1.00  0.00           C
ATOM     16  O   ALA A  88       0.363   6.187  -2.488  1.00  0.00           O
ATOM     17  CB  ALA A  88      -2.577   4.656  -2.464  1.00  0.00           C
TER
END
";

/// The tripeptide plus a lone ALA on chain B whose CB sits 2.0 Å from A:87 CA.
pub const CLASH_PDB: &str = "\
HEADER    CLASH FIXTURE
ATOM      1  N   GLY A  86      -1.458   0.000   0.000  1.00  0.00           N
ATOM      2  CA  GLY A  86       0.000   0.000   0.000  1.00  0.00           C
ATOM      3  C   GLY A  86       0.551   0.711  -1.231  1.00  0.00           C
ATOM      4  O   GLY A  86       1.477   1.516  -1.126  1.00  0.00           O
ATOM      5  N   ASP A  87      -0.022   0.407  -2.391  1.00  0.00           N
ATOM      6  CA  ASP A  87       0.410   1.015  -3.643  1.00  0.00           C
ATOM      7  C   ASP A  87       0.253   2.532  -3.602  1.00  0.00           C
ATOM      8  O   ASP A  87       1.154   3.264  -4.012  1.00  0.00           O
ATOM      9  CB  ASP A  87      -0.379   0.438  -4.820  1.00  0.00           C
ATOM     10  CG  ASP A  87      -0.207  -1.064  -4.970  1.00  0.00           C
ATOM     11  OD1 ASP A  87       0.529  -1.665  -4.158  1.00  0.00           O
ATOM     12  OD2 ASP A  87      -0.808  -1.643  -5.901  1.00  0.00           O
ATOM     13  N   ALA A  88      -0.892   2.990  -3.106  1.00  0.00           N
ATOM     14  CA  ALA A  88      -1.168   4.418  -3.011  1.00  0.00           C
ATOM     15  C   ALA A  88      -0.140   5.122  -2.131  1.00  0.00           C
ATOM     16  O   ALA A  88       0.363   6.187  -2.488  1.00  0.00           O
ATOM     17  CB  ALA A  88      -2.577   4.656  -2.464  1.00  0.00           C
TER
ATOM     18  N   ALA B   1       4.095  -0.651  -4.285  1.00  0.00           N
ATOM     19  CA  ALA B   1       3.819   0.777  -4.190  1.00  0.00           C
ATOM     20  C   ALA B   1       4.847   1.481  -3.310  1.00  0.00           C
ATOM     21  O   ALA B   1       5.350   2.546  -3.667  1.00  0.00           O
ATOM     22  CB  ALA B   1       2.410   1.015  -3.643  1.00  0.00           C
TER
END
";

/// Five-atom ligand, residue LIG.
pub const LIGAND_PDB: &str = "\
HETATM    1  C1  LIG L   1       4.000   2.000  -3.000  1.00  0.00           C
HETATM    2  C2  LIG L   1       5.500   2.000  -3.000  1.00  0.00           C
HETATM    3  O1  LIG L   1       6.100   3.100  -3.000  1.00  0.00           O
HETATM    4  O2  LIG L   1       6.100   0.900  -3.000  1.00  0.00           O
HETATM    5  N1  LIG L   1       3.300   3.200  -3.000  1.00  0.00           N
END
";

/// Tripeptide with two copies of LIG and a water, for ligand extraction.
pub const COMPLEX_PDB: &str = "\
ATOM      1  N   GLY A  86      -1.458   0.000   0.000  1.00  0.00           N
ATOM      2  CA  GLY A  86       0.000   0.000   0.000  1.00  0.00           C
HETATM    3  C1  LIG A 301       4.000   2.000  -3.000  1.00  0.00           C
HETATM    4  C2  LIG A 301       5.500   2.000  -3.000  1.00  0.00           C
HETATM    5  C1  LIG B 301      14.000   2.000  -3.000  1.00  0.00           C
HETATM    6  C2  LIG B 301      15.500   2.000  -3.000  1.00  0.00           C
HETATM    7  O   HOH A 401       8.500  12.300  15.700  1.00  0.00           O
END
";

// ── Files ─────────────────────────────────────────────────────────────────────

/// Write `contents` to `dir/name` and return the path.
pub fn write_fixture(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap_or_else(|e| panic!("write {}: {}", path.display(), e));
    path
}

/// Write an executable script to `dir/name`.
pub fn write_executable(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = write_fixture(dir, name, script);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .unwrap_or_else(|e| panic!("chmod {}: {}", path.display(), e));
    }
    path
}

/// Temporary directory holding fixtures for one test.
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {}", e)),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str, contents: &str) -> PathBuf {
        write_fixture(self.path(), name, contents)
    }

    pub fn executable(&self, name: &str, script: &str) -> PathBuf {
        write_executable(self.path(), name, script)
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

// ── Fake engines ──────────────────────────────────────────────────────────────

/// Affinity printed by [`fake_vina`] in `--score_only` mode.
pub const FAKE_VINA_SCORE: f64 = -9.1;
/// Best-mode affinity of the table printed by [`fake_vina`] when docking.
pub const FAKE_VINA_BEST_MODE: f64 = -9.4;
/// CNN affinity printed by [`fake_gnina`].
pub const FAKE_GNINA_SCORE: f64 = -8.3;

const FAKE_VINA: &str = r#"#!/bin/sh
out=""
score_only=0
prev=""
for arg in "$@"; do
  case "$arg" in
    --help) echo "AutoDock Vina v1.2.5 (test double)"; exit 0 ;;
    --score_only) score_only=1 ;;
  esac
  if [ "$prev" = "--out" ]; then out="$arg"; fi
  prev="$arg"
done
if [ "$score_only" = 1 ]; then
  echo "Intramolecular energy: -0.512"
  echo "Estimated Free Energy of Binding   : -9.100 (kcal/mol)"
  exit 0
fi
echo "Performing docking (random seed: 42) ..."
echo "mode |   affinity | dist from best mode"
echo "     | (kcal/mol) | rmsd l.b.| rmsd u.b."
echo "-----+------------+----------+----------"
echo "   1       -9.4          0          0"
echo "   2       -8.9      1.732      2.411"
echo "   3       -8.1      2.050      4.876"
if [ -n "$out" ]; then
  echo "MODEL 1" > "$out"
  echo "ENDMDL" >> "$out"
fi
"#;

const FAKE_GNINA: &str = r#"#!/bin/sh
case "$1" in
  --help) echo "gnina (test double)"; exit 0 ;;
esac
echo "Affinity: -7.10 (kcal/mol)"
echo "CNNscore: 0.812"
echo "CNNaffinity: -8.300"
"#;

const FAKE_RF_SCORE: &str = r#"#!/bin/sh
case "$1" in
  --help) echo "rf-score (test double)"; exit 0 ;;
esac
echo "-7.650"
"#;

/// `obabel IN -O OUT ...`: copies the input unchanged.
const FAKE_OBABEL: &str = r#"#!/bin/sh
case "$1" in
  --help|-H) echo "Open Babel (test double)"; exit 0 ;;
esac
cp "$1" "$3"
echo "1 molecule converted" >&2
"#;

const FAILING_TOOL: &str = "#!/bin/sh\necho 'fatal: engine exploded' >&2\nexit 2\n";

pub fn fake_vina(dir: &Path) -> PathBuf {
    write_executable(dir, "vina", FAKE_VINA)
}

pub fn fake_gnina(dir: &Path) -> PathBuf {
    write_executable(dir, "gnina", FAKE_GNINA)
}

pub fn fake_rf_score(dir: &Path) -> PathBuf {
    write_executable(dir, "rf-score", FAKE_RF_SCORE)
}

pub fn fake_obabel(dir: &Path) -> PathBuf {
    write_executable(dir, "obabel", FAKE_OBABEL)
}

/// An executable that always exits non-zero with a stderr message.
pub fn failing_tool(dir: &Path, name: &str) -> PathBuf {
    write_executable(dir, name, FAILING_TOOL)
}

/// A path inside `dir` that does not exist.
pub fn missing_tool(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("missing-{}", name))
}
