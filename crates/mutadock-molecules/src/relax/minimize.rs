//! Limited-memory BFGS minimisation over a cell-list neighbour list.

use std::collections::{HashMap, VecDeque};

use mutadock_common::Vec3;

use super::forcefield::{distance, System};
use super::RelaxationFailure;

/// Extra margin on the neighbour cutoff; the list is rebuilt once any atom
/// has moved more than half of it.
const SKIN: f64 = 1.0;
/// Correction pairs kept by L-BFGS.
const HISTORY: usize = 8;
/// Largest single-atom displacement of one step, Å.
const MAX_DISPLACEMENT: f64 = 0.2;
/// Displacement of the first (gradient) step, Å.
const FIRST_STEP: f64 = 0.01;
const ARMIJO: f64 = 1e-4;
const MIN_STEP: f64 = 1e-10;

/// Non-excluded pairs closer than `cutoff`, found with a uniform cell grid.
pub(crate) struct NeighbourList {
    pub pairs: Vec<(usize, usize)>,
    anchor: Vec<Vec3>,
}

impl NeighbourList {
    pub fn build(system: &System, positions: &[Vec3], cutoff: f64) -> Self {
        let cell = cutoff.max(1.0);
        let key = |p: &Vec3| {
            (
                (p[0] / cell).floor() as i64,
                (p[1] / cell).floor() as i64,
                (p[2] / cell).floor() as i64,
            )
        };

        let mut cells: HashMap<(i64, i64, i64), Vec<usize>> = HashMap::new();
        for (i, p) in positions.iter().enumerate() {
            cells.entry(key(p)).or_default().push(i);
        }

        let mut pairs = Vec::new();
        for (i, p) in positions.iter().enumerate() {
            let (cx, cy, cz) = key(p);
            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        let Some(members) = cells.get(&(cx + dx, cy + dy, cz + dz)) else {
                            continue;
                        };
                        for &j in members.iter().filter(|&&j| j > i) {
                            if !system.is_excluded(i, j) && distance(p, &positions[j]) < cutoff {
                                pairs.push((i, j));
                            }
                        }
                    }
                }
            }
        }

        Self {
            pairs,
            anchor: positions.to_vec(),
        }
    }

    pub fn is_stale(&self, positions: &[Vec3]) -> bool {
        self.anchor
            .iter()
            .zip(positions)
            .any(|(a, p)| distance(a, p) > SKIN / 2.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Minimized {
    pub initial_energy: f64,
    pub final_energy: f64,
    pub iterations: usize,
    pub converged: bool,
}

fn dot_all(a: &[Vec3], b: &[Vec3]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(u, v)| u[0] * v[0] + u[1] * v[1] + u[2] * v[2])
        .sum()
}

fn largest(v: &[Vec3]) -> f64 {
    v.iter()
        .map(|f| (f[0] * f[0] + f[1] * f[1] + f[2] * f[2]).sqrt())
        .fold(0.0, f64::max)
}

fn difference(a: &[Vec3], b: &[Vec3]) -> Vec<Vec3> {
    a.iter()
        .zip(b)
        .map(|(u, v)| [u[0] - v[0], u[1] - v[1], u[2] - v[2]])
        .collect()
}

/// Walk downhill from `positions` until no atom feels more than
/// `force_tolerance` or `max_iterations` steps have been taken.
///
/// Directions come from the L-BFGS two-loop recursion over the last
/// [`HISTORY`] steps; the step length is found by Armijo backtracking.
/// `forces` holds the negative gradient throughout.
pub(crate) fn lbfgs(
    system: &System,
    positions: &mut Vec<Vec3>,
    max_iterations: usize,
    force_tolerance: f64,
) -> Result<Minimized, RelaxationFailure> {
    let cutoff = system.max_contact() + SKIN;
    let n = system.len();

    system.apply_constraints(positions);
    let mut neighbours = NeighbourList::build(system, positions, cutoff);
    let mut forces = vec![[0.0; 3]; n];
    let mut energy = system.evaluate(positions, &neighbours.pairs, &mut forces);
    check_finite(energy, 0)?;
    let initial_energy = energy;

    // (s, y, 1 / s·y) with y the change in gradient, i.e. minus the change in force.
    let mut history: VecDeque<(Vec<Vec3>, Vec<Vec3>, f64)> = VecDeque::with_capacity(HISTORY);
    let mut trial = positions.clone();
    let mut trial_forces = vec![[0.0; 3]; n];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        let f_max = largest(&forces);
        if f_max < force_tolerance {
            converged = true;
            break;
        }
        iterations += 1;

        // Two-loop recursion on the gradient (-forces).
        let mut q: Vec<Vec3> = forces.iter().map(|f| [-f[0], -f[1], -f[2]]).collect();
        let mut alphas = Vec::with_capacity(history.len());
        for (s, y, rho) in history.iter().rev() {
            let alpha = rho * dot_all(s, &q);
            for (qi, yi) in q.iter_mut().zip(y) {
                for axis in 0..3 {
                    qi[axis] -= alpha * yi[axis];
                }
            }
            alphas.push(alpha);
        }
        let gamma = match history.back() {
            Some((s, y, _)) => dot_all(s, y) / dot_all(y, y),
            None => FIRST_STEP / f_max,
        };
        for qi in q.iter_mut() {
            for axis in 0..3 {
                qi[axis] *= gamma;
            }
        }
        for ((s, y, rho), alpha) in history.iter().zip(alphas.iter().rev()) {
            let beta = rho * dot_all(y, &q);
            for (qi, si) in q.iter_mut().zip(s) {
                for axis in 0..3 {
                    qi[axis] += si[axis] * (alpha - beta);
                }
            }
        }
        let mut direction: Vec<Vec3> = q.iter().map(|v| [-v[0], -v[1], -v[2]]).collect();
        let mut slope = -dot_all(&forces, &direction);
        if slope >= 0.0 {
            history.clear();
            let scale = FIRST_STEP / f_max;
            direction = forces.iter().map(|f| [f[0] * scale, f[1] * scale, f[2] * scale]).collect();
            slope = -dot_all(&forces, &direction);
        }
        let reach = largest(&direction);
        if reach > MAX_DISPLACEMENT {
            let scale = MAX_DISPLACEMENT / reach;
            for d in direction.iter_mut() {
                for axis in 0..3 {
                    d[axis] *= scale;
                }
            }
            slope *= scale;
        }

        let mut t = 1.0;
        let mut accepted = None;
        while t > MIN_STEP {
            for ((x, p), d) in trial.iter_mut().zip(positions.iter()).zip(&direction) {
                for axis in 0..3 {
                    x[axis] = p[axis] + t * d[axis];
                }
            }
            system.apply_constraints(&mut trial);
            if neighbours.is_stale(&trial) {
                neighbours = NeighbourList::build(system, &trial, cutoff);
            }
            let trial_energy = system.evaluate(&trial, &neighbours.pairs, &mut trial_forces);
            check_finite(trial_energy, iterations)?;
            if trial_energy <= energy + ARMIJO * t * slope {
                accepted = Some(trial_energy);
                break;
            }
            t *= 0.5;
        }

        let Some(trial_energy) = accepted else {
            if history.is_empty() {
                break;
            }
            // Stale curvature; retry from the plain gradient.
            history.clear();
            continue;
        };

        let s = difference(&trial, positions);
        let y = difference(&forces, &trial_forces);
        let sy = dot_all(&s, &y);
        if sy > 1e-12 {
            if history.len() == HISTORY {
                history.pop_front();
            }
            history.push_back((s, y, 1.0 / sy));
        }
        std::mem::swap(positions, &mut trial);
        std::mem::swap(&mut forces, &mut trial_forces);
        energy = trial_energy;
    }

    Ok(Minimized {
        initial_energy,
        final_energy: energy,
        iterations,
        converged,
    })
}

/// Energy and largest atomic force at `positions`, on a fresh neighbour list.
pub(crate) fn single_point(system: &System, positions: &[Vec3]) -> Result<(f64, f64), RelaxationFailure> {
    let neighbours = NeighbourList::build(system, positions, system.max_contact() + SKIN);
    let mut forces = vec![[0.0; 3]; system.len()];
    let energy = system.evaluate(positions, &neighbours.pairs, &mut forces);
    check_finite(energy, 0)?;
    Ok((energy, largest(&forces)))
}

fn check_finite(energy: f64, iteration: usize) -> Result<(), RelaxationFailure> {
    if energy.is_finite() {
        Ok(())
    } else {
        Err(RelaxationFailure::NumericalInstability { iteration })
    }
}
