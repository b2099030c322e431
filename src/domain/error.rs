//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for minecast.
#[derive(Debug, thiserror::Error)]
pub enum MinecastError {
    #[error("alignment error: {reason}")]
    Alignment { reason: String },

    #[error("conflicting values for {series} on {date}: {reason}")]
    Conflict {
        series: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("series not found: {name}")]
    NotFound { name: String },

    #[error("incomplete pool data on {date}: {blocks} blocks, need at least {minimum}")]
    IncompleteData {
        date: NaiveDate,
        blocks: u64,
        minimum: u64,
    },

    #[error("insufficient history for {target}: have {rows} usable rows, need {minimum}")]
    InsufficientHistory {
        target: String,
        rows: usize,
        minimum: usize,
    },

    #[error("invalid scenario {scenario}: {reason}")]
    InvalidScenario { scenario: String, reason: String },

    #[error("invalid series {name}: {reason}")]
    InvalidSeries { name: String, reason: String },

    #[error("invalid feature spec: {reason}")]
    InvalidFeatureSpec { reason: String },

    #[error("forecast engine is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MinecastError {
    pub(crate) fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        MinecastError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&MinecastError> for std::process::ExitCode {
    fn from(err: &MinecastError) -> Self {
        let code: u8 = match err {
            MinecastError::Io(_) => 1,
            MinecastError::ConfigParse { .. }
            | MinecastError::ConfigMissing { .. }
            | MinecastError::ConfigInvalid { .. }
            | MinecastError::InvalidFeatureSpec { .. }
            | MinecastError::InvalidScenario { .. } => 2,
            MinecastError::Data { .. } | MinecastError::InvalidSeries { .. } => 3,
            MinecastError::Alignment { .. }
            | MinecastError::Conflict { .. }
            | MinecastError::NotFound { .. }
            | MinecastError::IncompleteData { .. } => 4,
            MinecastError::InsufficientHistory { .. } | MinecastError::InvalidState { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
