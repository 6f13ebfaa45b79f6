//! Fixed-column ATOM/HETATM record handling for PDB and PDBQT files, plus
//! coordinate reading for MOL2 and SDF ligands.
//!
//! Only the columns the pipeline touches are interpreted (names, residue
//! identity, coordinates, element). Every other line, and every column that
//! is not rewritten, is written back byte for byte. Only the first model of a
//! multi-model file is interpreted; later models are carried through verbatim.

use std::path::Path;

use mutadock_common::{MutadockError, Result, Vec3};

/// ATOM or HETATM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Atom,
    Hetatm,
}

/// One parsed coordinate record.
#[derive(Debug, Clone)]
pub struct AtomRecord {
    pub kind: RecordKind,
    pub name: String,
    pub res_name: String,
    pub chain_id: char,
    pub res_seq: i32,
    pub i_code: char,
    pub position: Vec3,
    pub element: String,
    raw: String,
}

impl AtomRecord {
    fn parse(line: &str, line_no: usize) -> Result<Self> {
        if !line.is_ascii() {
            return Err(invalid(line_no, "non-ASCII coordinate record"));
        }
        if line.len() < 54 {
            return Err(invalid(line_no, "coordinate record shorter than 54 columns"));
        }

        let kind = if line.starts_with("HETATM") {
            RecordKind::Hetatm
        } else {
            RecordKind::Atom
        };
        let name = line[12..16].trim().to_string();
        let res_name = line[17..20].trim().to_ascii_uppercase();
        let chain_id = line[21..22].chars().next().unwrap_or(' ');
        let res_seq = line[22..26]
            .trim()
            .parse::<i32>()
            .map_err(|_| invalid(line_no, "unreadable residue number"))?;
        let i_code = line[26..27].chars().next().unwrap_or(' ');

        let mut position = [0.0; 3];
        for (axis, range) in [(0, 30..38), (1, 38..46), (2, 46..54)] {
            let value = line[range]
                .trim()
                .parse::<f64>()
                .map_err(|_| invalid(line_no, "unreadable coordinate"))?;
            if !value.is_finite() {
                return Err(invalid(line_no, "non-finite coordinate"));
            }
            position[axis] = value;
        }

        let element = element_of(line, &name);

        Ok(Self {
            kind,
            name,
            res_name,
            chain_id,
            res_seq,
            i_code,
            position,
            element,
            raw: line.to_string(),
        })
    }

    pub fn is_hydrogen(&self) -> bool {
        self.element == "H"
    }

    /// Render the record, patching residue name and coordinates into the original line.
    pub fn to_line(&self) -> String {
        let mut line = self.raw.clone();
        if line.len() < 54 {
            line.push_str(&" ".repeat(54 - line.len()));
        }
        line.replace_range(17..20, &format!("{:>3}", truncate(&self.res_name, 3)));
        line.replace_range(
            30..54,
            &format!(
                "{:>8.3}{:>8.3}{:>8.3}",
                self.position[0], self.position[1], self.position[2]
            ),
        );
        line
    }
}

fn invalid(line_no: usize, what: &str) -> MutadockError {
    MutadockError::Validation(format!("line {}: {}", line_no + 1, what))
}

fn truncate(s: &str, n: usize) -> &str {
    if s.len() > n {
        &s[..n]
    } else {
        s
    }
}

/// Element from the PDB element column, the PDBQT AutoDock type, or the atom name.
fn element_of(line: &str, name: &str) -> String {
    // PDBQT: partial charge in 70..76, AutoDock type from column 77.
    if line.len() >= 78 && line[70..76].trim().parse::<f64>().is_ok() {
        let ad_type = line[77..].trim();
        let element = match ad_type {
            "A" => "C",
            "OA" | "OS" => "O",
            "NA" | "NS" => "N",
            "HD" | "HS" => "H",
            "SA" => "S",
            other => other,
        };
        if !element.is_empty() {
            return element.to_ascii_uppercase();
        }
    }
    if line.len() >= 78 {
        let column = line[76..78].trim();
        if !column.is_empty() && column.chars().all(|c| c.is_ascii_alphabetic()) {
            return column.to_ascii_uppercase();
        }
    }
    name.chars()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase().to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
enum Line {
    Atom(AtomRecord),
    Other(String),
}

/// A structure file held as an ordered list of lines.
#[derive(Debug, Clone, Default)]
pub struct Structure {
    lines: Vec<Line>,
}

impl Structure {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            MutadockError::Validation(format!("cannot read structure {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
            .map_err(|e| MutadockError::Validation(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = Vec::new();
        let mut first_model_done = false;

        for (line_no, line) in text.lines().enumerate() {
            let is_coord = line.starts_with("ATOM  ") || line.starts_with("HETATM");
            if is_coord && !first_model_done {
                lines.push(Line::Atom(AtomRecord::parse(line, line_no)?));
            } else {
                if line.starts_with("ENDMDL") {
                    first_model_done = true;
                }
                lines.push(Line::Other(line.to_string()));
            }
        }

        Ok(Self { lines })
    }

    pub fn atoms(&self) -> impl Iterator<Item = &AtomRecord> {
        self.lines.iter().filter_map(|l| match l {
            Line::Atom(a) => Some(a),
            Line::Other(_) => None,
        })
    }

    fn atoms_mut(&mut self) -> impl Iterator<Item = &mut AtomRecord> {
        self.lines.iter_mut().filter_map(|l| match l {
            Line::Atom(a) => Some(a),
            Line::Other(_) => None,
        })
    }

    pub fn atom_count(&self) -> usize {
        self.atoms().count()
    }

    /// Residue name of the standard residue `chain:res_seq` (no insertion code).
    pub fn residue_name(&self, chain_id: char, res_seq: i32) -> Option<&str> {
        self.atoms()
            .find(|a| is_target(a, chain_id, res_seq))
            .map(|a| a.res_name.as_str())
    }

    pub fn has_chain(&self, chain_id: char) -> bool {
        self.atoms().any(|a| a.chain_id == chain_id)
    }

    /// Relabel every atom of `chain:res_seq`, returning how many were touched.
    pub fn rename_residue(&mut self, chain_id: char, res_seq: i32, new_name: &str) -> usize {
        let mut touched = 0;
        for atom in self.atoms_mut().filter(|a| is_target(a, chain_id, res_seq)) {
            atom.res_name = new_name.to_string();
            touched += 1;
        }
        touched
    }

    /// Drop atoms of `chain:res_seq` rejected by `keep`, returning how many were removed.
    pub fn prune_residue<F>(&mut self, chain_id: char, res_seq: i32, mut keep: F) -> usize
    where
        F: FnMut(&AtomRecord) -> bool,
    {
        let before = self.lines.len();
        self.lines.retain(|line| match line {
            Line::Atom(a) if is_target(a, chain_id, res_seq) => keep(a),
            _ => true,
        });
        before - self.lines.len()
    }

    /// Keep only the coordinate records accepted by `keep`; other lines stay.
    pub fn retain_atoms<F>(&mut self, mut keep: F)
    where
        F: FnMut(&AtomRecord) -> bool,
    {
        self.lines.retain(|line| match line {
            Line::Atom(a) => keep(a),
            Line::Other(_) => true,
        });
    }

    pub fn positions(&self) -> Vec<Vec3> {
        self.atoms().map(|a| a.position).collect()
    }

    /// Overwrite coordinates in record order.
    pub fn set_positions(&mut self, positions: &[Vec3]) -> Result<()> {
        let count = self.atom_count();
        if positions.len() != count {
            return Err(MutadockError::Validation(format!(
                "position count {} does not match atom count {}",
                positions.len(),
                count
            )));
        }
        if let Some(bad) = positions.iter().flatten().find(|c| !fits_coordinate_field(**c)) {
            return Err(MutadockError::Validation(format!(
                "coordinate {} does not fit the 8-column PDB field",
                bad
            )));
        }
        for (atom, pos) in self.atoms_mut().zip(positions) {
            atom.position = *pos;
        }
        Ok(())
    }

    pub fn to_pdb_string(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Atom(a) => out.push_str(&a.to_line()),
                Line::Other(s) => out.push_str(s),
            }
            out.push('\n');
        }
        out
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_pdb_string())?;
        Ok(())
    }
}

/// `%8.3f` overflows below -999.9995 and at 10000.
fn fits_coordinate_field(value: f64) -> bool {
    value.is_finite() && format!("{:.3}", value).len() <= 8
}

fn is_target(atom: &AtomRecord, chain_id: char, res_seq: i32) -> bool {
    atom.kind == RecordKind::Atom
        && atom.chain_id == chain_id
        && atom.res_seq == res_seq
        && atom.i_code == ' '
}

/// Coordinates of every atom in a PDB, PDBQT, MOL2 or SDF file.
/// Only the first molecule of a multi-molecule MOL2 or SDF file is read.
pub fn read_coordinates<P: AsRef<Path>>(path: P) -> Result<Vec<Vec3>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let parse: fn(&str) -> Result<Vec<Vec3>> = match extension.as_str() {
        "mol2" => mol2_coordinates,
        "sdf" | "mol" => sdf_coordinates,
        _ => return Ok(Structure::read(path)?.positions()),
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        MutadockError::Validation(format!("cannot read structure {}: {}", path.display(), e))
    })?;
    parse(&text).map_err(|e| MutadockError::Validation(format!("{}: {}", path.display(), e)))
}

fn xyz<'a>(line_no: usize, fields: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let mut out = [0.0; 3];
    let mut fields = fields;
    for slot in out.iter_mut() {
        *slot = fields
            .next()
            .and_then(|f| f.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .ok_or_else(|| invalid(line_no, "bad coordinate"))?;
    }
    Ok(out)
}

/// `@<TRIPOS>ATOM` rows: `id name x y z type ...`.
fn mol2_coordinates(text: &str) -> Result<Vec<Vec3>> {
    let mut atoms = Vec::new();
    let mut in_atoms = false;
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.starts_with("@<TRIPOS>") {
            if in_atoms {
                break;
            }
            in_atoms = line == "@<TRIPOS>ATOM";
            continue;
        }
        if in_atoms && !line.is_empty() && !line.starts_with('#') {
            atoms.push(xyz(line_no, line.split_whitespace().skip(2))?);
        }
    }
    Ok(atoms)
}

/// V2000 atom block after the counts line, or the V3000 `BEGIN ATOM` block.
fn sdf_coordinates(text: &str) -> Result<Vec<Vec3>> {
    let lines: Vec<&str> = text.lines().collect();
    let counts = *lines
        .get(3)
        .ok_or_else(|| MutadockError::Validation("missing counts line".to_string()))?;

    if counts.contains("V3000") {
        let mut atoms = Vec::new();
        let mut in_atoms = false;
        for (line_no, line) in lines.iter().enumerate().skip(4) {
            let Some(body) = line.strip_prefix("M  V30 ") else {
                if line.starts_with("M  END") {
                    break;
                }
                continue;
            };
            match body.trim() {
                "BEGIN ATOM" => in_atoms = true,
                "END ATOM" => break,
                row if in_atoms => atoms.push(xyz(line_no, row.split_whitespace().skip(2))?),
                _ => {}
            }
        }
        return Ok(atoms);
    }

    let count = counts
        .get(..3)
        .unwrap_or(counts)
        .trim()
        .parse::<usize>()
        .map_err(|_| invalid(3, "bad atom count"))?;
    (4..4 + count)
        .map(|line_no| {
            let line = lines.get(line_no).ok_or_else(|| invalid(line_no, "atom block is short"))?;
            xyz(line_no, line.split_whitespace())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDB: &str = "\
HEADER    TEST
ATOM      1  N   ASP A  87      -1.200   0.500   0.000  1.00  0.00           N
ATOM      2  CA  ASP A  87       0.000   0.000   0.000  1.00  0.00           C
ATOM      3  CB  ASP A  87       0.500  -1.400   0.100  1.00  0.00           C
HETATM    4  O   HOH A 200       8.500  12.300  15.700  1.00  0.00           O
END
";

    #[test]
    fn test_parse_and_lookup() {
        let s = Structure::parse(PDB).unwrap();
        assert_eq!(s.atom_count(), 4);
        assert_eq!(s.residue_name('A', 87), Some("ASP"));
        assert_eq!(s.residue_name('A', 200), None, "HETATM is not a standard residue");
        assert_eq!(s.residue_name('B', 87), None);
    }

    #[test]
    fn test_roundtrip_preserves_other_lines() {
        let s = Structure::parse(PDB).unwrap();
        assert_eq!(s.to_pdb_string(), PDB);
    }

    #[test]
    fn test_rename_patches_columns_only() {
        let mut s = Structure::parse(PDB).unwrap();
        assert_eq!(s.rename_residue('A', 87, "GLY"), 3);
        let out = s.to_pdb_string();
        assert!(out.contains("ATOM      2  CA  GLY A  87       0.000   0.000   0.000  1.00  0.00           C"));
        assert!(out.contains("HOH A 200"));
    }

    #[test]
    fn test_non_finite_coordinate_rejected() {
        let bad = "ATOM      1  N   ASP A  87          NaN   0.500   0.000  1.00  0.00           N\n";
        assert!(matches!(Structure::parse(bad), Err(MutadockError::Validation(_))));
    }

    #[test]
    fn test_pdbqt_element_from_autodock_type() {
        let line = "ATOM      1  OD1 ASP A  87       0.000   0.000   0.000  1.00  0.00    -0.648 OA";
        let s = Structure::parse(line).unwrap();
        assert_eq!(s.atoms().next().unwrap().element, "O");
    }

    #[test]
    fn test_only_first_model_is_interpreted() {
        let text = "MODEL        1\nATOM      1  CA  GLY A   1       0.000   0.000   0.000  1.00  0.00           C\nENDMDL\nMODEL        2\nATOM      1  CA  GLY A   1       1.000   0.000   0.000  1.00  0.00           C\nENDMDL\n";
        let s = Structure::parse(text).unwrap();
        assert_eq!(s.atom_count(), 1);
        assert_eq!(s.to_pdb_string(), text);
    }

    #[test]
    fn test_positions_outside_pdb_columns_rejected() {
        let mut s = Structure::parse(PDB).unwrap();
        let mut positions = s.positions();
        positions[0] = [-999.999, 9999.999, 0.0];
        s.set_positions(&positions).unwrap();
        assert!(s.to_pdb_string().contains("-999.9999999.999"));

        for bad in [-1000.0, -999.9996, 10_000.0, f64::NAN] {
            positions[0] = [bad, 0.0, 0.0];
            assert!(matches!(s.set_positions(&positions), Err(MutadockError::Validation(_))), "{bad}");
        }
        assert!(s.to_pdb_string().contains("-999.9999999.999"), "rejected positions are not applied");
    }

    #[test]
    fn test_mol2_and_sdf_coordinates() {
        let dir = tempfile::tempdir().unwrap();

        let mol2 = dir.path().join("lig.mol2");
        std::fs::write(
            &mol2,
            "@<TRIPOS>MOLECULE\nlig\n 2 1 0 0 0\nSMALL\nNO_CHARGES\n\n\
             @<TRIPOS>ATOM\n\
                   1 C1         10.0000   -2.5000    3.2500 C.3     1  LIG1        0.0000\n\
                   2 O1         11.2000   -2.5000    3.2500 O.3     1  LIG1        0.0000\n\
             @<TRIPOS>BOND\n     1     1     2    1\n",
        )
        .unwrap();
        assert_eq!(read_coordinates(&mol2).unwrap(), vec![[10.0, -2.5, 3.25], [11.2, -2.5, 3.25]]);

        let sdf = dir.path().join("lig.sdf");
        std::fs::write(
            &sdf,
            "lig\n  test\n\n  3  2  0  0  0  0  0  0  0  0999 V2000\n\
             \x20   1.0000    2.0000    3.0000 C   0  0  0  0  0  0  0  0  0  0  0  0\n\
             \x20  -1.5000    0.0000   12.0000 N   0  0  0  0  0  0  0  0  0  0  0  0\n\
             \x20   0.0000  -10.2500    0.5000 O   0  0  0  0  0  0  0  0  0  0  0  0\n\
             \x20 1  2  1  0\n  1  3  1  0\nM  END\n$$$$\n",
        )
        .unwrap();
        assert_eq!(
            read_coordinates(&sdf).unwrap(),
            vec![[1.0, 2.0, 3.0], [-1.5, 0.0, 12.0], [0.0, -10.25, 0.5]]
        );

        let v3000 = dir.path().join("big.sdf");
        std::fs::write(
            &v3000,
            "lig\n\n\n  0  0  0     0  0            999 V3000\nM  V30 BEGIN CTAB\nM  V30 COUNTS 1 0 0 0 0\n\
             M  V30 BEGIN ATOM\nM  V30 1 C 4.5 -6.0 7.25 0\nM  V30 END ATOM\nM  V30 END CTAB\nM  END\n",
        )
        .unwrap();
        assert_eq!(read_coordinates(&v3000).unwrap(), vec![[4.5, -6.0, 7.25]]);

        let short = dir.path().join("short.sdf");
        std::fs::write(&short, "lig\n\n\n  3  0  0  0  0  0  0  0  0  0999 V2000\n    1.0 2.0 3.0 C\n").unwrap();
        assert!(matches!(read_coordinates(&short), Err(MutadockError::Validation(_))));
    }
}
