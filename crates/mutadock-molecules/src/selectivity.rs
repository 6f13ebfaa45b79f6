//! Wild-type versus mutant comparison (ΔΔG).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::record::ResultRecord;

const RESISTANT_THRESHOLD: f64 = 2.0;
const PARTIAL_RESISTANCE_THRESHOLD: f64 = 0.5;
const HYPERSENSITIVE_THRESHOLD: f64 = -0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectivityClass {
    Resistant,
    PartialResistance,
    Neutral,
    Hypersensitive,
}

impl SelectivityClass {
    /// Classify ΔΔG in kcal/mol; positive means the mutant binds worse.
    pub fn from_delta(ddg: f64) -> Self {
        if ddg > RESISTANT_THRESHOLD {
            Self::Resistant
        } else if ddg > PARTIAL_RESISTANCE_THRESHOLD {
            Self::PartialResistance
        } else if ddg < HYPERSENSITIVE_THRESHOLD {
            Self::Hypersensitive
        } else {
            Self::Neutral
        }
    }
}

impl fmt::Display for SelectivityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Resistant => "resistant",
            Self::PartialResistance => "partial resistance",
            Self::Neutral => "neutral",
            Self::Hypersensitive => "hypersensitive",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectivityComparison {
    pub mutation: String,
    pub wild_type_affinity_kcal_mol: f64,
    pub mutant_affinity_kcal_mol: f64,
    pub delta_delta_g_kcal_mol: f64,
    pub classification: SelectivityClass,
    /// Both affinities are consensus values.
    pub used_consensus: bool,
    /// At least one side is a simulated placeholder.
    pub simulated: bool,
}

impl SelectivityComparison {
    pub fn compare(wild_type: &ResultRecord, mutant: &ResultRecord) -> Self {
        let (wt, mt, used_consensus) = match (
            wild_type.consensus_affinity_kcal_mol,
            mutant.consensus_affinity_kcal_mol,
        ) {
            (Some(wt), Some(mt)) => (wt, mt, true),
            _ => (
                wild_type.binding_affinity_kcal_mol,
                mutant.binding_affinity_kcal_mol,
                false,
            ),
        };
        let ddg = mt - wt;
        Self {
            mutation: mutant.mutation.clone(),
            wild_type_affinity_kcal_mol: wt,
            mutant_affinity_kcal_mol: mt,
            delta_delta_g_kcal_mol: ddg,
            classification: SelectivityClass::from_delta(ddg),
            used_consensus,
            simulated: wild_type.simulated || mutant.simulated,
        }
    }
}
