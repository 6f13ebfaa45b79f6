//! Stiffness continuation shared by every restraint strength.
//!
//! A relaxation walks one fixed ladder of backbone restraints, from stiff to
//! free, and keeps the minimum reached on every rung. The structure returned
//! for a requested stiffness `k` is the rung minimising `E + k·D`, where `E` is
//! the unrestrained energy and `D` the summed squared backbone displacement.
//! The rungs never depend on `k`, so a stiffer request can only land on a rung
//! with equal or smaller `D`.

use mutadock_common::Vec3;
use tracing::debug;

use super::forcefield::System;
use super::minimize;
use super::RelaxationFailure;

/// Stiffest rung, kJ/mol/Å².
pub(crate) const LADDER_TOP: f64 = 1e4;
/// Softest restrained rung, kJ/mol/Å². An unrestrained rung follows it.
pub(crate) const LADDER_FLOOR: f64 = 0.01;

/// Restraint constants visited in order: halving from the top, then zero.
pub(crate) fn rungs() -> Vec<f64> {
    let mut out = Vec::new();
    let mut k = LADDER_TOP;
    while k >= LADDER_FLOOR {
        out.push(k);
        k /= 2.0;
    }
    out.push(0.0);
    out
}

#[derive(Debug, Clone)]
pub(crate) struct Rung {
    pub positions: Vec<Vec3>,
    /// Unrestrained energy, kJ/mol.
    pub energy: f64,
    /// Σ |x - x0|² over restrained atoms, Å².
    pub displacement: f64,
    pub converged: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct Continuation {
    /// The starting structure first, then one entry per rung reached.
    pub rungs: Vec<Rung>,
    pub iterations: usize,
    /// (lowest k, rung index), k rising and displacement falling.
    envelope: Vec<(f64, usize)>,
}

impl Continuation {
    pub fn reference(&self) -> &Rung {
        &self.rungs[0]
    }

    /// The rung minimising `energy + k · displacement`, k in kJ/mol/Å².
    pub fn select(&self, k: f64) -> &Rung {
        let index = self
            .envelope
            .iter()
            .take_while(|(from, _)| *from <= k)
            .last()
            .map(|(_, i)| *i)
            .unwrap_or(0);
        &self.rungs[index]
    }
}

/// Minimise down the whole ladder, sharing `max_iterations` between rungs.
/// Restraints are anchored on `restrained` at the system's reference coordinates.
pub(crate) fn descend(
    system: &mut System,
    restrained: &[usize],
    max_iterations: usize,
    force_tolerance: f64,
) -> Result<Continuation, RelaxationFailure> {
    system.add_restraints(restrained, 0.0);
    let mut positions = system.reference.clone();
    let mut states: Vec<(Vec<Vec3>, Option<bool>)> = vec![(positions.clone(), None)];
    let mut iterations = 0;

    for k in rungs() {
        if iterations >= max_iterations {
            break;
        }
        system.set_restraint_k(k);
        let result = minimize::lbfgs(system, &mut positions, max_iterations - iterations, force_tolerance)?;
        iterations += result.iterations;
        debug!(
            "Rung k={} kJ/mol/Å²: {:.3} -> {:.3} kJ/mol in {} iterations",
            k, result.initial_energy, result.final_energy, result.iterations
        );
        states.push((positions.clone(), Some(result.converged)));
    }

    system.set_restraint_k(0.0);
    let mut rungs = Vec::with_capacity(states.len());
    for (positions, converged) in states {
        let (energy, f_max) = minimize::single_point(system, &positions)?;
        rungs.push(Rung {
            energy,
            displacement: system.restraint_displacement(&positions),
            converged: converged.unwrap_or(f_max < force_tolerance),
            positions,
        });
    }

    let envelope = envelope(&rungs);
    Ok(Continuation {
        rungs,
        iterations,
        envelope,
    })
}

/// Lower envelope of the lines `energy + k · displacement` over k ≥ 0.
fn envelope(rungs: &[Rung]) -> Vec<(f64, usize)> {
    let Some(mut current) = (0..rungs.len()).min_by(|&a, &b| {
        rungs[a]
            .energy
            .total_cmp(&rungs[b].energy)
            .then(rungs[a].displacement.total_cmp(&rungs[b].displacement))
    }) else {
        return Vec::new();
    };

    let mut out = vec![(0.0, current)];
    loop {
        let from = out.last().map(|(k, _)| *k).unwrap_or(0.0);
        let mut next: Option<(f64, usize)> = None;
        for (j, rung) in rungs.iter().enumerate() {
            let gap = rungs[current].displacement - rung.displacement;
            if gap <= 0.0 {
                continue;
            }
            let k = ((rung.energy - rungs[current].energy) / gap).max(from);
            let better = match next {
                None => true,
                Some((best_k, best)) => {
                    k < best_k || (k == best_k && rung.displacement < rungs[best].displacement)
                }
            };
            if better {
                next = Some((k, j));
            }
        }
        match next {
            Some(step) => {
                current = step.1;
                out.push(step);
            }
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rung(energy: f64, displacement: f64) -> Rung {
        Rung {
            positions: Vec::new(),
            energy,
            displacement,
            converged: true,
        }
    }

    fn continuation(rungs: Vec<Rung>) -> Continuation {
        let envelope = envelope(&rungs);
        Continuation {
            rungs,
            iterations: 0,
            envelope,
        }
    }

    #[test]
    fn test_rungs_halve_down_to_floor_then_free() {
        let rungs = rungs();
        assert_eq!(rungs.first(), Some(&LADDER_TOP));
        assert_eq!(rungs.last(), Some(&0.0));
        assert!(rungs.windows(2).all(|w| w[1] < w[0]));
        assert!(rungs[rungs.len() - 2] >= LADDER_FLOOR);
    }

    #[test]
    fn test_selection_is_the_cheapest_rung() {
        // reference, a stiff rung, a free rung, and one that is never optimal
        let c = continuation(vec![rung(100.0, 0.0), rung(10.0, 1.0), rung(1.0, 4.0), rung(50.0, 2.0)]);
        for k in [0.0, 0.5, 2.9, 3.1, 50.0, 89.0, 91.0, 1e6] {
            let chosen = c.select(k);
            let best = c
                .rungs
                .iter()
                .map(|r| r.energy + k * r.displacement)
                .fold(f64::INFINITY, f64::min);
            assert_eq!(chosen.energy + k * chosen.displacement, best, "k = {k}");
        }
        assert_eq!(c.select(0.0).displacement, 4.0);
        assert_eq!(c.select(1e6).displacement, 0.0);
    }

    #[test]
    fn test_selected_displacement_never_grows_with_k() {
        let c = continuation(vec![
            rung(136.0, 0.0),
            rung(40.0, 0.02),
            rung(12.5, 0.05),
            rung(12.6, 0.06),
            rung(3.0, 0.11),
            rung(0.4, 0.13),
            rung(0.4, 0.12),
        ]);
        let mut previous = f64::INFINITY;
        for step in 0..=400 {
            let k = 10f64.powf(step as f64 / 40.0 - 3.0);
            let d = c.select(k).displacement;
            assert!(d <= previous, "k = {k}: {d} > {previous}");
            previous = d;
        }
        // equal energy: the smaller displacement wins at k = 0
        assert_eq!(c.select(0.0).displacement, 0.12);
    }
}
