use thiserror::Error;

pub use recalc_addin_protocol::{HostError, HostResult};

/// The main error type for Recalc simulator operations
#[derive(Debug, Error)]
pub enum RecalcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Scenario error: {0}")]
    Scenario(String),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Result type alias for Recalc simulator operations
pub type RecalcResult<T> = Result<T, RecalcError>;
