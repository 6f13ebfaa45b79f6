//! Amino-acid code table and side-chain templates.

use std::fmt;
use std::str::FromStr;

use mutadock_common::MutadockError;

/// The twenty standard amino acids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AminoAcid {
    Ala,
    Arg,
    Asn,
    Asp,
    Cys,
    Gln,
    Glu,
    Gly,
    His,
    Ile,
    Leu,
    Lys,
    Met,
    Phe,
    Pro,
    Ser,
    Thr,
    Trp,
    Tyr,
    Val,
}

use AminoAcid::*;

/// (variant, one-letter, three-letter)
const TABLE: [(AminoAcid, char, &str); 20] = [
    (Ala, 'A', "ALA"),
    (Arg, 'R', "ARG"),
    (Asn, 'N', "ASN"),
    (Asp, 'D', "ASP"),
    (Cys, 'C', "CYS"),
    (Gln, 'Q', "GLN"),
    (Glu, 'E', "GLU"),
    (Gly, 'G', "GLY"),
    (His, 'H', "HIS"),
    (Ile, 'I', "ILE"),
    (Leu, 'L', "LEU"),
    (Lys, 'K', "LYS"),
    (Met, 'M', "MET"),
    (Phe, 'F', "PHE"),
    (Pro, 'P', "PRO"),
    (Ser, 'S', "SER"),
    (Thr, 'T', "THR"),
    (Trp, 'W', "TRP"),
    (Tyr, 'Y', "TYR"),
    (Val, 'V', "VAL"),
];

/// Backbone atom names kept whatever the residue identity.
pub const BACKBONE_ATOMS: &[&str] = &[
    "N", "CA", "C", "O", "OXT", "H", "H1", "H2", "H3", "HA", "HA2", "HA3",
];

impl AminoAcid {
    /// Accepts one-letter or three-letter codes, case-insensitive.
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_uppercase();
        match code.len() {
            1 => {
                let c = code.chars().next()?;
                TABLE.iter().find(|(_, one, _)| *one == c).map(|(aa, _, _)| *aa)
            }
            3 => TABLE.iter().find(|(_, _, three)| *three == code).map(|(aa, _, _)| *aa),
            _ => None,
        }
    }

    pub fn one_letter(self) -> char {
        self.entry().1
    }

    pub fn three_letter(self) -> &'static str {
        self.entry().2
    }

    // TABLE is laid out in declaration order.
    fn entry(self) -> &'static (AminoAcid, char, &'static str) {
        &TABLE[self as usize]
    }

    /// Heavy side-chain atoms of the residue.
    pub fn side_chain_heavy_atoms(self) -> &'static [&'static str] {
        match self {
            Ala => &["CB"],
            Arg => &["CB", "CG", "CD", "NE", "CZ", "NH1", "NH2"],
            Asn => &["CB", "CG", "OD1", "ND2"],
            Asp => &["CB", "CG", "OD1", "OD2"],
            Cys => &["CB", "SG"],
            Gln => &["CB", "CG", "CD", "OE1", "NE2"],
            Glu => &["CB", "CG", "CD", "OE1", "OE2"],
            Gly => &[],
            His => &["CB", "CG", "ND1", "CD2", "CE1", "NE2"],
            Ile => &["CB", "CG1", "CG2", "CD1"],
            Leu => &["CB", "CG", "CD1", "CD2"],
            Lys => &["CB", "CG", "CD", "CE", "NZ"],
            Met => &["CB", "CG", "SD", "CE"],
            Phe => &["CB", "CG", "CD1", "CD2", "CE1", "CE2", "CZ"],
            Pro => &["CB", "CG", "CD"],
            Ser => &["CB", "OG"],
            Thr => &["CB", "OG1", "CG2"],
            Trp => &["CB", "CG", "CD1", "CD2", "NE1", "CE2", "CE3", "CZ2", "CZ3", "CH2"],
            Tyr => &["CB", "CG", "CD1", "CD2", "CE1", "CE2", "CZ", "OH"],
            Val => &["CB", "CG1", "CG2"],
        }
    }
}

impl fmt::Display for AminoAcid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.three_letter())
    }
}

impl FromStr for AminoAcid {
    type Err = MutadockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| {
            MutadockError::Validation(format!("unknown amino-acid code '{}'", s.trim()))
        })
    }
}
