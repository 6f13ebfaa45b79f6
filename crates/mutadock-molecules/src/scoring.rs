//! Scoring backends and their consensus.
//!
//! Each backend is a [`ScoringAdapter`] whose [`Availability`] is probed once
//! at construction. [`ConsensusScorer`] walks the adapters in order, keeps the
//! affinities that came back, and folds them into one value plus a spread.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument, warn};

use mutadock_common::{GridBox, MutadockError, Result};

use crate::process::{Availability, ExternalTool};
use crate::settings::ScorerSpec;

// ── Backend kinds ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    /// Physics-based, needs the grid box.
    Vina,
    /// CNN affinity.
    Gnina,
    RfScore,
}

impl ScorerKind {
    pub fn default_name(self) -> &'static str {
        match self {
            Self::Vina => "vina",
            Self::Gnina => "gnina",
            Self::RfScore => "rf_score",
        }
    }

    pub fn default_timeout_secs(self) -> u64 {
        match self {
            Self::Vina => 60,
            Self::Gnina | Self::RfScore => 120,
        }
    }

    fn args(self, receptor: &Path, ligand: &Path, grid: &GridBox) -> Vec<String> {
        let receptor = receptor.display().to_string();
        let ligand = ligand.display().to_string();
        match self {
            Self::Vina => {
                let mut args = vec!["--receptor".to_string(), receptor, "--ligand".to_string(), ligand];
                args.extend(grid.to_vina_args());
                args.push("--score_only".to_string());
                args
            }
            Self::Gnina => vec![
                "-r".to_string(),
                receptor,
                "-l".to_string(),
                ligand,
                "--score_only".to_string(),
            ],
            Self::RfScore => vec![receptor, ligand],
        }
    }

    fn pattern(self) -> &'static str {
        match self {
            Self::Vina => r"([-+]?\d+\.\d+)\s*\(?kcal/mol",
            Self::Gnina => r"CNNaffinity\s*:\s*([-+]?\d+\.\d+)",
            Self::RfScore => r"([-+]?\d+\.\d+)",
        }
    }
}

// ── Adapter seam ──────────────────────────────────────────────────────────────

/// One scoring backend.
#[async_trait]
pub trait ScoringAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Probe result from construction time.
    fn availability(&self) -> &Availability;

    /// The physics-based scorer that anchors weighted consensus.
    fn is_primary(&self) -> bool {
        false
    }

    /// Affinity in kcal/mol-equivalent units; more negative binds tighter.
    async fn score(&self, receptor: &Path, ligand: &Path, grid: &GridBox) -> Result<f64>;
}

/// Scorer backed by an external executable.
pub struct CommandScorer {
    name: String,
    kind: ScorerKind,
    tool: ExternalTool,
    timeout: Duration,
    primary: bool,
    availability: Availability,
    pattern: Regex,
}

impl CommandScorer {
    /// Build the adapter and probe its executable once.
    pub async fn probe(spec: &ScorerSpec, probe_timeout: Duration) -> Result<Self> {
        let tool = ExternalTool::new(&spec.executable);
        let availability = tool.probe(probe_timeout).await;
        match &availability {
            Availability::Available => info!("Scorer {} available", spec.name),
            Availability::Unavailable(reason) => warn!("Scorer {} not available: {}", spec.name, reason),
        }
        Self::with_availability(spec, availability)
    }

    pub fn with_availability(spec: &ScorerSpec, availability: Availability) -> Result<Self> {
        let pattern = Regex::new(spec.kind.pattern())
            .map_err(|e| MutadockError::Config(format!("scorer {} pattern: {}", spec.name, e)))?;
        Ok(Self {
            name: spec.name.clone(),
            kind: spec.kind,
            tool: ExternalTool::new(&spec.executable),
            timeout: spec.timeout(),
            primary: spec.primary,
            availability,
            pattern,
        })
    }

    fn parse(&self, output: &str) -> Result<f64> {
        self.pattern
            .captures(output)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .ok_or_else(|| MutadockError::scoring(&self.name, "could not parse affinity from output"))
    }
}

#[async_trait]
impl ScoringAdapter for CommandScorer {
    fn name(&self) -> &str {
        &self.name
    }

    fn availability(&self) -> &Availability {
        &self.availability
    }

    fn is_primary(&self) -> bool {
        self.primary
    }

    async fn score(&self, receptor: &Path, ligand: &Path, grid: &GridBox) -> Result<f64> {
        if let Availability::Unavailable(reason) = &self.availability {
            return Err(MutadockError::scoring(&self.name, format!("not available: {}", reason)));
        }

        let output = self
            .tool
            .run(self.kind.args(receptor, ligand, grid), self.timeout)
            .await
            .map_err(|e| MutadockError::scoring(&self.name, e.to_string()))?;

        if !output.success {
            return Err(MutadockError::scoring(
                &self.name,
                format!("scoring failed: {}", output.failure_summary()),
            ));
        }

        self.parse(&format!("{}\n{}", output.stdout, output.stderr))
    }
}

// ── Aggregation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusMethod {
    #[default]
    Mean,
    Median,
    /// First (primary) score weighs 0.5, the rest share the other 0.5.
    Weighted,
}

impl ConsensusMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Weighted => "weighted",
        }
    }

    /// Fold `scores` (evaluation order, primary first). Empty input yields NaN.
    pub fn aggregate(self, scores: &[f64]) -> f64 {
        match scores.len() {
            0 => f64::NAN,
            1 => scores[0],
            n => match self {
                Self::Mean => scores.iter().sum::<f64>() / n as f64,
                Self::Median => {
                    let mut sorted = scores.to_vec();
                    sorted.sort_by(f64::total_cmp);
                    if n % 2 == 1 {
                        sorted[n / 2]
                    } else {
                        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
                    }
                }
                Self::Weighted => {
                    let rest = 0.5 / (n - 1) as f64;
                    scores
                        .iter()
                        .enumerate()
                        .map(|(i, s)| s * if i == 0 { 0.5 } else { rest })
                        .sum()
                }
            },
        }
    }
}

impl fmt::Display for ConsensusMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsensusMethod {
    type Err = MutadockError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "weighted" => Ok(Self::Weighted),
            other => Err(MutadockError::Validation(format!(
                "unknown consensus method '{}' (expected mean, median or weighted)",
                other
            ))),
        }
    }
}

/// Sample standard deviation (n - 1); 0 for fewer than two values.
pub fn sample_std(scores: &[f64]) -> f64 {
    let n = scores.len();
    if n < 2 {
        return 0.0;
    }
    let mean = scores.iter().sum::<f64>() / n as f64;
    let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

// ── Results ───────────────────────────────────────────────────────────────────

/// Outcome of one adapter within a consensus run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub scorer_name: String,
    pub affinity: Option<f64>,
    pub available: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub individual_scores: BTreeMap<String, f64>,
    pub consensus_affinity: f64,
    pub consensus_method: ConsensusMethod,
    pub uncertainty: f64,
    /// No available adapter failed. Backends that are not installed do not count.
    pub all_available: bool,
    #[serde(skip)]
    pub results: Vec<ScoringResult>,
}

// ── Consensus ─────────────────────────────────────────────────────────────────

/// Adapters in evaluation order, primary first.
pub struct ConsensusScorer {
    adapters: Vec<Box<dyn ScoringAdapter>>,
}

impl ConsensusScorer {
    /// Construct and probe every configured backend, sequentially.
    pub async fn probe(specs: &[ScorerSpec], probe_timeout: Duration) -> Result<Self> {
        let mut adapters: Vec<Box<dyn ScoringAdapter>> = Vec::with_capacity(specs.len());
        for spec in specs {
            adapters.push(Box::new(CommandScorer::probe(spec, probe_timeout).await?));
        }
        let scorer = Self::from_adapters(adapters);
        info!(
            "Consensus scorer initialized with: {}",
            scorer.available_names().join(", ")
        );
        Ok(scorer)
    }

    /// Keeps the given order except that the primary adapter moves to the front.
    pub fn from_adapters(mut adapters: Vec<Box<dyn ScoringAdapter>>) -> Self {
        adapters.sort_by_key(|a| !a.is_primary());
        Self { adapters }
    }

    pub fn adapters(&self) -> &[Box<dyn ScoringAdapter>] {
        &self.adapters
    }

    pub fn available_names(&self) -> Vec<&str> {
        self.adapters
            .iter()
            .filter(|a| a.availability().is_available())
            .map(|a| a.name())
            .collect()
    }

    #[instrument(skip(self, grid))]
    pub async fn score(
        &self,
        receptor: &Path,
        ligand: &Path,
        grid: &GridBox,
        method: ConsensusMethod,
    ) -> Result<ConsensusResult> {
        info!("Running consensus scoring (method={})", method);

        let mut results = Vec::with_capacity(self.adapters.len());
        let mut ordered = Vec::with_capacity(self.adapters.len());

        for adapter in &self.adapters {
            let name = adapter.name().to_string();
            if !adapter.availability().is_available() {
                warn!("Scorer {} not available, skipping", name);
                results.push(ScoringResult {
                    scorer_name: name,
                    affinity: None,
                    available: false,
                    error: Some(adapter.availability().to_string()),
                });
                continue;
            }

            match adapter.score(receptor, ligand, grid).await {
                Ok(affinity) if affinity.is_finite() => {
                    info!("{}: {:.2} kcal/mol", name, affinity);
                    ordered.push((name.clone(), affinity));
                    results.push(ScoringResult {
                        scorer_name: name,
                        affinity: Some(affinity),
                        available: true,
                        error: None,
                    });
                }
                Ok(affinity) => {
                    warn!("Scorer {} returned non-finite affinity {}", name, affinity);
                    results.push(failed(name, format!("non-finite affinity {}", affinity)));
                }
                Err(e) => {
                    warn!("Scorer {} failed: {}", name, e);
                    results.push(failed(name, e.to_string()));
                }
            }
        }

        if ordered.is_empty() {
            return Err(MutadockError::Consensus(format!(
                "no scorers produced valid results ({} configured)",
                self.adapters.len()
            )));
        }

        let scores: Vec<f64> = ordered.iter().map(|(_, s)| *s).collect();
        let consensus_affinity = method.aggregate(&scores);
        let uncertainty = sample_std(&scores);
        let all_available = results.iter().filter(|r| r.available).all(|r| r.error.is_none());

        info!("Consensus: {:.2} ± {:.2} kcal/mol", consensus_affinity, uncertainty);

        Ok(ConsensusResult {
            individual_scores: ordered.into_iter().collect(),
            consensus_affinity,
            consensus_method: method,
            uncertainty,
            all_available,
            results,
        })
    }
}

fn failed(scorer_name: String, error: String) -> ScoringResult {
    ScoringResult {
        scorer_name,
        affinity: None,
        available: true,
        error: Some(error),
    }
}
