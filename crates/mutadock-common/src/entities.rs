//! Core value types shared between the configuration layer and the pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{MutadockError, Result};

/// Cartesian coordinate in Ångström.
pub type Vec3 = [f64; 3];

// ---------------------------------------------------------------------------
// Grid box
// ---------------------------------------------------------------------------

/// Search volume handed to the pose-search engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridBox {
    pub center_x: f64,
    pub center_y: f64,
    pub center_z: f64,
    pub size_x: f64,
    pub size_y: f64,
    pub size_z: f64,
}

impl GridBox {
    /// Smallest edge length ever handed to the search engine.
    pub const MIN_EDGE: f64 = 10.0;
    /// Largest edge length ever handed to the search engine.
    pub const MAX_EDGE: f64 = 60.0;

    /// Build a box, clamping every edge to `[MIN_EDGE, MAX_EDGE]`.
    pub fn new(center: Vec3, size: Vec3) -> Self {
        Self {
            center_x: center[0],
            center_y: center[1],
            center_z: center[2],
            size_x: Self::clamp_edge(size[0]),
            size_y: Self::clamp_edge(size[1]),
            size_z: Self::clamp_edge(size[2]),
        }
    }

    /// Clamp a single edge length. NaN collapses to the lower bound.
    pub fn clamp_edge(edge: f64) -> f64 {
        if edge.is_nan() {
            return Self::MIN_EDGE;
        }
        edge.clamp(Self::MIN_EDGE, Self::MAX_EDGE)
    }

    pub fn center(&self) -> Vec3 {
        [self.center_x, self.center_y, self.center_z]
    }

    pub fn size(&self) -> Vec3 {
        [self.size_x, self.size_y, self.size_z]
    }

    /// Reject boxes with non-finite components.
    pub fn validate(&self) -> Result<()> {
        let all = [
            self.center_x,
            self.center_y,
            self.center_z,
            self.size_x,
            self.size_y,
            self.size_z,
        ];
        if all.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(MutadockError::Validation(format!(
                "grid box has non-finite component: {:?}",
                all
            )))
        }
    }

    /// True when every edge is inside the clamp interval.
    pub fn is_within_limits(&self) -> bool {
        self.size()
            .iter()
            .all(|e| (Self::MIN_EDGE..=Self::MAX_EDGE).contains(e))
    }

    /// Command-line arguments understood by Vina-family engines.
    pub fn to_vina_args(&self) -> Vec<String> {
        vec![
            "--center_x".to_string(),
            format!("{:.3}", self.center_x),
            "--center_y".to_string(),
            format!("{:.3}", self.center_y),
            "--center_z".to_string(),
            format!("{:.3}", self.center_z),
            "--size_x".to_string(),
            format!("{:.3}", self.size_x),
            "--size_y".to_string(),
            format!("{:.3}", self.size_y),
            "--size_z".to_string(),
            format!("{:.3}", self.size_z),
        ]
    }
}
