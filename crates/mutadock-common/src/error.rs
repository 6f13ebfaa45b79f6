use thiserror::Error;

/// Error taxonomy shared by every pipeline stage.
///
/// Stage-local failures (a single scorer, structure relaxation) are absorbed
/// where they happen; only the variants below ever reach a caller.
#[derive(Debug, Error)]
pub enum MutadockError {
    /// Bad file path, wrong file extension, malformed identifier, non-finite coordinate.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Residue absent from the structure or identity mismatch.
    #[error("Mutation error: {0}")]
    Mutation(String),

    /// Every format-conversion provider failed.
    #[error("Preparation error: {0}")]
    Preparation(String),

    /// A single scoring backend failed. Excluded from consensus, never fatal on its own.
    #[error("Scoring error ({scorer}): {message}")]
    Scoring { scorer: String, message: String },

    /// No scoring backend produced a value.
    #[error("Consensus error: {0}")]
    Consensus(String),

    /// Pose-search backend missing, timed out, or produced unparsable output.
    #[error("Docking error: {0}")]
    Docking(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl MutadockError {
    pub fn scoring(scorer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Scoring {
            scorer: scorer.into(),
            message: message.into(),
        }
    }

    /// True for failures that invalidate the whole job.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Scoring { .. })
    }
}

pub type Result<T> = std::result::Result<T, MutadockError>;
