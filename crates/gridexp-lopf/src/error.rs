use crate::status::{SolvePhase, SolveStatus, TerminationCondition};
use gridexp_core::GridError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building, solving or iterating a LOPF model.
#[derive(Error, Debug)]
pub enum LopfError {
    #[error("unknown formulation '{0}' (expected 'angles' or 'kirchhoff')")]
    UnknownFormulation(String),

    /// The engine is missing, unavailable or crashed.
    #[error("solver backend '{engine}' failed: {message}")]
    Backend { engine: String, message: String },

    #[error(
        "{phase} solve returned status '{status}' with termination condition '{termination}'; \
         network state saved to {}",
        backup.display()
    )]
    UnacceptedStatus {
        phase: SolvePhase,
        status: SolveStatus,
        termination: TerminationCondition,
        backup: PathBuf,
    },

    #[error(
        "{phase} solve returned status '{status}' with termination condition '{termination}'; \
         writing the backup to {} also failed: {reason}",
        backup.display()
    )]
    BackupFailed {
        phase: SolvePhase,
        status: SolveStatus,
        termination: TerminationCondition,
        backup: PathBuf,
        reason: String,
    },

    #[error("expansion aborted in round {iteration}: {source}; last checkpoint: {checkpoint}")]
    Aborted {
        iteration: usize,
        checkpoint: String,
        #[source]
        source: Box<LopfError>,
    },

    #[error("constraint group {group} is not part of the {formulation} formulation")]
    UnsupportedGroup { group: String, formulation: String },

    #[error("no variable {0} in the model")]
    UnknownVariable(String),

    #[error("session has no model; build it first")]
    NotBuilt,

    #[error("session has no solver; prepare it first")]
    NotPrepared,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Network(#[from] GridError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LopfError {
    pub fn backend(engine: impl Into<String>, message: impl Into<String>) -> Self {
        LopfError::Backend {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Status-driven failures already carry their backup location.
    pub fn is_status_failure(&self) -> bool {
        matches!(
            self,
            LopfError::UnacceptedStatus { .. } | LopfError::BackupFailed { .. }
        )
    }
}
