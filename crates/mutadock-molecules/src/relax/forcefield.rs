//! Force-field context and the per-structure system it builds.
//!
//! Units: Å, kJ/mol. Bonded terms hold the perceived input geometry, so the
//! only thing that drives atoms away from their start is steric overlap.

use std::collections::{HashMap, HashSet};

use mutadock_common::Vec3;

use super::RelaxationFailure;
use crate::structure::AtomRecord;

/// Element parameters and term constants, built once and shared by reference.
#[derive(Debug, Clone)]
pub struct ForceField {
    /// Added to the sum of covalent radii when perceiving bonds.
    pub bond_tolerance: f64,
    /// kJ/mol/Å²
    pub bond_k: f64,
    /// 1-3 (Urey-Bradley) spring, kJ/mol/Å²
    pub urey_bradley_k: f64,
    /// kJ/mol/Å²
    pub repulsion_k: f64,
    /// Contact distance is this fraction of the summed vdW radii.
    pub contact_scale: f64,
    /// Uniform implicit-solvent screening of the repulsion term.
    pub solvent_screening: f64,
    /// Converged when no atom feels more than this, kJ/mol/Å.
    pub force_tolerance: f64,
    /// Maximum SG-SG distance treated as a disulfide.
    pub disulfide_cutoff: f64,
}

impl ForceField {
    pub fn standard() -> Self {
        Self {
            bond_tolerance: 0.45,
            bond_k: 1000.0,
            urey_bradley_k: 200.0,
            repulsion_k: 500.0,
            contact_scale: 0.75,
            solvent_screening: 0.9,
            // 1 kJ/mol/nm
            force_tolerance: 0.1,
            disulfide_cutoff: 2.5,
        }
    }

    pub fn covalent_radius(element: &str) -> f64 {
        match element {
            "H" => 0.31,
            "C" => 0.76,
            "N" => 0.71,
            "O" => 0.66,
            "S" => 1.05,
            "P" => 1.07,
            _ => 1.2,
        }
    }

    pub fn vdw_radius(element: &str) -> f64 {
        match element {
            "H" => 1.1,
            "C" => 1.7,
            "N" => 1.55,
            "O" => 1.52,
            "S" => 1.8,
            "P" => 1.8,
            _ => 1.7,
        }
    }

    /// Perceive topology and parameterise a system for `atoms`.
    pub(crate) fn build_system(&self, atoms: &[&AtomRecord]) -> Result<System, RelaxationFailure> {
        if atoms.is_empty() {
            return Err(RelaxationFailure::EmptyStructure);
        }

        let positions: Vec<Vec3> = atoms.iter().map(|a| a.position).collect();
        let elements: Vec<&str> = atoms.iter().map(|a| a.element.as_str()).collect();
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); atoms.len()];

        // Residues in file order.
        let mut residues: Vec<Vec<usize>> = Vec::new();
        let mut last_key = None;
        for (idx, atom) in atoms.iter().enumerate() {
            let key = (atom.chain_id, atom.res_seq, atom.i_code, atom.res_name.as_str());
            if last_key != Some(key) {
                residues.push(Vec::new());
                last_key = Some(key);
            }
            if let Some(current) = residues.last_mut() {
                current.push(idx);
            }
        }

        // Heavy-heavy bonds inside each residue; every hydrogen to its nearest heavy atom.
        for residue in &residues {
            for (n, &i) in residue.iter().enumerate() {
                for &j in &residue[n + 1..] {
                    if elements[i] == "H" || elements[j] == "H" {
                        continue;
                    }
                    if distance(&positions[i], &positions[j]) < self.bond_cutoff(elements[i], elements[j]) {
                        link(&mut adjacency, i, j);
                    }
                }
            }
            for &h in residue.iter().filter(|&&i| elements[i] == "H") {
                let nearest = residue
                    .iter()
                    .copied()
                    .filter(|&j| elements[j] != "H")
                    .map(|j| (j, distance(&positions[h], &positions[j])))
                    .filter(|&(j, d)| d < self.bond_cutoff("H", elements[j]))
                    .min_by(|a, b| a.1.total_cmp(&b.1));
                if let Some((heavy, _)) = nearest {
                    link(&mut adjacency, h, heavy);
                }
            }
        }

        // Peptide links between consecutive residues of a chain.
        for pair in residues.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if atoms[prev[0]].chain_id != atoms[next[0]].chain_id {
                continue;
            }
            let c = prev.iter().copied().find(|&i| atoms[i].name == "C");
            let n = next.iter().copied().find(|&i| atoms[i].name == "N");
            if let (Some(c), Some(n)) = (c, n) {
                if distance(&positions[c], &positions[n]) < self.bond_cutoff("C", "N") {
                    link(&mut adjacency, c, n);
                }
            }
        }

        // Disulfides.
        let sulfurs: Vec<usize> = (0..atoms.len()).filter(|&i| atoms[i].name == "SG").collect();
        for (n, &i) in sulfurs.iter().enumerate() {
            for &j in &sulfurs[n + 1..] {
                if distance(&positions[i], &positions[j]) < self.disulfide_cutoff {
                    link(&mut adjacency, i, j);
                }
            }
        }

        let mut bonds = Vec::new();
        let mut constraints = Vec::new();
        for (i, neighbours) in adjacency.iter().enumerate() {
            for &j in neighbours.iter().filter(|&&j| j > i) {
                let r0 = distance(&positions[i], &positions[j]);
                match (elements[i] == "H", elements[j] == "H") {
                    (false, true) => constraints.push(HydrogenConstraint { heavy: i, hydrogen: j, length: r0 }),
                    (true, false) => constraints.push(HydrogenConstraint { heavy: j, hydrogen: i, length: r0 }),
                    _ => bonds.push(Spring { i, j, r0 }),
                }
            }
        }

        let mut urey_bradley = Vec::new();
        let mut seen = HashSet::new();
        for neighbours in &adjacency {
            for (n, &a) in neighbours.iter().enumerate() {
                for &c in &neighbours[n + 1..] {
                    let key = ordered(a, c);
                    if !adjacency[a].contains(&c) && seen.insert(key) {
                        urey_bradley.push(Spring {
                            i: key.0,
                            j: key.1,
                            r0: distance(&positions[a], &positions[c]),
                        });
                    }
                }
            }
        }

        let excluded = exclusions(&adjacency);
        let radii = elements.iter().map(|e| Self::vdw_radius(e)).collect();

        Ok(System {
            reference: positions,
            bonds,
            urey_bradley,
            constraints,
            excluded,
            radii,
            restraints: Vec::new(),
            restraint_k: 0.0,
            bond_k: self.bond_k,
            urey_bradley_k: self.urey_bradley_k,
            repulsion_k: self.repulsion_k * self.solvent_screening,
            contact_scale: self.contact_scale,
        })
    }

    fn bond_cutoff(&self, a: &str, b: &str) -> f64 {
        Self::covalent_radius(a) + Self::covalent_radius(b) + self.bond_tolerance
    }
}

impl Default for ForceField {
    fn default() -> Self {
        Self::standard()
    }
}

// ── System ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub(crate) struct Spring {
    pub i: usize,
    pub j: usize,
    pub r0: f64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct HydrogenConstraint {
    pub heavy: usize,
    pub hydrogen: usize,
    pub length: f64,
}

/// Parameterised structure ready for minimisation.
#[derive(Debug, Clone)]
pub(crate) struct System {
    pub reference: Vec<Vec3>,
    pub bonds: Vec<Spring>,
    pub urey_bradley: Vec<Spring>,
    pub constraints: Vec<HydrogenConstraint>,
    pub excluded: HashSet<(usize, usize)>,
    pub radii: Vec<f64>,
    /// (atom, anchor)
    pub restraints: Vec<(usize, Vec3)>,
    /// kJ/mol/Å²
    pub restraint_k: f64,
    bond_k: f64,
    urey_bradley_k: f64,
    repulsion_k: f64,
    contact_scale: f64,
}

impl System {
    pub fn len(&self) -> usize {
        self.reference.len()
    }

    /// Largest contact distance of any pair.
    pub fn max_contact(&self) -> f64 {
        let r = self.radii.iter().copied().fold(0.0, f64::max);
        2.0 * r * self.contact_scale
    }

    /// Anchor `atoms` at their reference positions with spring constant `k`.
    pub fn add_restraints(&mut self, atoms: &[usize], k: f64) {
        self.restraint_k = k;
        self.restraints = atoms.iter().map(|&i| (i, self.reference[i])).collect();
    }

    /// Change the restraint spring constant, keeping the anchors.
    pub fn set_restraint_k(&mut self, k: f64) {
        self.restraint_k = k;
    }

    /// Σ |x - anchor|² over restrained atoms, Å².
    pub fn restraint_displacement(&self, positions: &[Vec3]) -> f64 {
        self.restraints
            .iter()
            .map(|&(i, anchor)| {
                let d = sub(&positions[i], &anchor);
                dot(&d, &d)
            })
            .sum()
    }

    pub fn is_excluded(&self, i: usize, j: usize) -> bool {
        self.excluded.contains(&ordered(i, j))
    }

    /// Potential energy; accumulates forces (negative gradient) into `forces`.
    pub fn evaluate(&self, positions: &[Vec3], pairs: &[(usize, usize)], forces: &mut [Vec3]) -> f64 {
        for f in forces.iter_mut() {
            *f = [0.0; 3];
        }
        let mut energy = 0.0;

        for spring in &self.bonds {
            energy += stretch(positions, forces, spring.i, spring.j, spring.r0, self.bond_k, false);
        }
        for spring in &self.urey_bradley {
            energy += stretch(positions, forces, spring.i, spring.j, spring.r0, self.urey_bradley_k, false);
        }
        for &(i, j) in pairs {
            let contact = self.contact_scale * (self.radii[i] + self.radii[j]);
            energy += stretch(positions, forces, i, j, contact, self.repulsion_k, true);
        }
        for &(i, anchor) in &self.restraints {
            let d = sub(&positions[i], &anchor);
            energy += self.restraint_k * dot(&d, &d);
            for axis in 0..3 {
                forces[i][axis] -= 2.0 * self.restraint_k * d[axis];
            }
        }

        energy
    }

    /// Reset every X-H distance to its reference length by moving the hydrogen.
    pub fn apply_constraints(&self, positions: &mut [Vec3]) {
        for c in &self.constraints {
            let d = sub(&positions[c.hydrogen], &positions[c.heavy]);
            let r = dot(&d, &d).sqrt();
            if r > 1e-9 {
                let scale = c.length / r;
                for axis in 0..3 {
                    positions[c.hydrogen][axis] = positions[c.heavy][axis] + d[axis] * scale;
                }
            }
        }
    }
}

/// `k (r - r0)²`, or only the compressed side when `repulsive_only`.
fn stretch(positions: &[Vec3], forces: &mut [Vec3], i: usize, j: usize, r0: f64, k: f64, repulsive_only: bool) -> f64 {
    let d = sub(&positions[i], &positions[j]);
    let r = dot(&d, &d).sqrt();
    let dr = r - r0;
    if (repulsive_only && dr >= 0.0) || r < 1e-12 {
        return 0.0;
    }
    // dE/dr = 2k dr; force on i = -dE/dr * d/r
    let scale = -2.0 * k * dr / r;
    for axis in 0..3 {
        forces[i][axis] += scale * d[axis];
        forces[j][axis] -= scale * d[axis];
    }
    k * dr * dr
}

fn link(adjacency: &mut [Vec<usize>], i: usize, j: usize) {
    if !adjacency[i].contains(&j) {
        adjacency[i].push(j);
        adjacency[j].push(i);
    }
}

/// Pairs within three bonds of each other.
fn exclusions(adjacency: &[Vec<usize>]) -> HashSet<(usize, usize)> {
    let mut excluded = HashSet::new();
    for start in 0..adjacency.len() {
        let mut depth: HashMap<usize, usize> = HashMap::from([(start, 0)]);
        let mut frontier = vec![start];
        for level in 1..=3 {
            let mut next = Vec::new();
            for &a in &frontier {
                for &b in &adjacency[a] {
                    if !depth.contains_key(&b) {
                        depth.insert(b, level);
                        next.push(b);
                    }
                }
            }
            frontier = next;
        }
        for &other in depth.keys().filter(|&&o| o > start) {
            excluded.insert((start, other));
        }
    }
    excluded
}

fn ordered(i: usize, j: usize) -> (usize, usize) {
    if i < j {
        (i, j)
    } else {
        (j, i)
    }
}

pub(crate) fn sub(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn dot(a: &Vec3, b: &Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn distance(a: &Vec3, b: &Vec3) -> f64 {
    let d = sub(a, b);
    dot(&d, &d).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::Structure;
    use mutadock_test_utils::TRIPEPTIDE_PDB;

    fn system() -> System {
        let structure = Structure::parse(TRIPEPTIDE_PDB).unwrap();
        let atoms: Vec<_> = structure.atoms().collect();
        ForceField::standard().build_system(&atoms).unwrap()
    }

    #[test]
    fn test_perceives_tripeptide_topology() {
        let sys = system();
        // GLY 3 + peptide 1 + ASP 7 + peptide 1 + ALA 4
        assert_eq!(sys.bonds.len(), 16);
        assert!(sys.constraints.is_empty());
        // C(86)-N(87) peptide bond present
        assert!(sys.bonds.iter().any(|b| (b.i, b.j) == (2, 4)));
        // N(86) and N(87) are 1-4 partners, N(86) and CA(87) are not
        assert!(sys.is_excluded(0, 4));
        assert!(!sys.is_excluded(0, 5));
    }

    #[test]
    fn test_reference_geometry_is_stationary() {
        let sys = system();
        let pairs: Vec<_> = (0..sys.len())
            .flat_map(|i| (i + 1..sys.len()).map(move |j| (i, j)))
            .filter(|&(i, j)| !sys.is_excluded(i, j))
            .collect();
        let mut forces = vec![[0.0; 3]; sys.len()];
        let energy = sys.evaluate(&sys.reference, &pairs, &mut forces);
        assert!(energy.abs() < 1e-9, "energy {energy}");
        assert!(forces.iter().flatten().all(|f| f.abs() < 1e-9));
    }

    #[test]
    fn test_empty_structure_rejected() {
        assert!(matches!(
            ForceField::standard().build_system(&[]),
            Err(RelaxationFailure::EmptyStructure)
        ));
    }

    #[test]
    fn test_hydrogen_constraint_restores_length() {
        let text = "\
ATOM      1  N   GLY A   1       0.000   0.000   0.000  1.00  0.00           N
ATOM      2  H   GLY A   1       1.010   0.000   0.000  1.00  0.00           H
";
        let structure = Structure::parse(text).unwrap();
        let atoms: Vec<_> = structure.atoms().collect();
        let sys = ForceField::standard().build_system(&atoms).unwrap();
        assert_eq!(sys.constraints.len(), 1);

        let mut moved = vec![[0.0, 0.0, 0.0], [1.5, 0.0, 0.0]];
        sys.apply_constraints(&mut moved);
        assert!((moved[1][0] - 1.01).abs() < 1e-12);
    }
}
