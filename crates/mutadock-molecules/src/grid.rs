//! Search-volume derivation from ligand geometry.

use mutadock_common::{GridBox, Vec3};

/// Edge of the cube used when no ligand coordinates are available.
pub const DEFAULT_EDGE: f64 = 20.0;

/// Padding added to the ligand extent along each axis.
pub const DEFAULT_BUFFER: f64 = 6.0;

/// Derive the box around `center`.
///
/// Without ligand atoms the default cube is returned. Otherwise every edge is
/// the ligand's axis-aligned extent plus `buffer`, clamped to
/// `[GridBox::MIN_EDGE, GridBox::MAX_EDGE]`.
pub fn compute_box(center: Vec3, ligand_atoms: Option<&[Vec3]>, buffer: f64) -> GridBox {
    let atoms = match ligand_atoms {
        Some(atoms) if !atoms.is_empty() => atoms,
        _ => return GridBox::new(center, [DEFAULT_EDGE; 3]),
    };

    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for atom in atoms {
        for axis in 0..3 {
            lo[axis] = lo[axis].min(atom[axis]);
            hi[axis] = hi[axis].max(atom[axis]);
        }
    }

    let size = [0, 1, 2].map(|axis| hi[axis] - lo[axis] + buffer);
    GridBox::new(center, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_cube_without_ligand() {
        let b = compute_box([1.0, 2.0, 3.0], None, DEFAULT_BUFFER);
        assert_eq!(b.size(), [20.0, 20.0, 20.0]);
        assert_eq!(b.center(), [1.0, 2.0, 3.0]);

        let empty: Vec<Vec3> = Vec::new();
        assert_eq!(compute_box([0.0; 3], Some(&empty), 6.0).size(), [20.0; 3]);
    }

    #[test]
    fn test_extent_plus_buffer() {
        let atoms = vec![[0.0, 0.0, 0.0], [12.0, 4.0, 20.0], [3.0, -2.0, 5.0]];
        let b = compute_box([5.0, 5.0, 5.0], Some(&atoms), 6.0);
        // x: 12 + 6, y: 6 + 6, z: 20 + 6
        assert_eq!(b.size(), [18.0, 12.0, 26.0]);
    }

    #[test]
    fn test_tiny_and_huge_ligands_clamped() {
        let tiny = vec![[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]];
        assert_eq!(compute_box([0.0; 3], Some(&tiny), 1.0).size(), [10.0; 3]);

        let huge = vec![[0.0, 0.0, 0.0], [150.0, 80.0, 2.0]];
        assert_eq!(compute_box([0.0; 3], Some(&huge), 6.0).size(), [60.0, 60.0, 10.0]);
    }

    proptest! {
        #[test]
        fn prop_edges_always_within_limits(
            ex in 0.1f64..200.0,
            ey in 0.1f64..200.0,
            ez in 0.1f64..200.0,
            origin in prop::array::uniform3(-100.0f64..100.0),
            buffer in 0.0f64..20.0,
        ) {
            let far = [origin[0] + ex, origin[1] + ey, origin[2] + ez];
            let atoms = vec![origin, far];
            let b = compute_box(origin, Some(&atoms), buffer);
            for edge in b.size() {
                prop_assert!((GridBox::MIN_EDGE..=GridBox::MAX_EDGE).contains(&edge));
            }
        }
    }
}
