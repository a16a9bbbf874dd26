//! Solve outcomes and the policy deciding which ones the loop accepts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of outcomes a solve can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    Ok,
    /// Feasible, but the engine flags numerical caution
    Warning,
    Infeasible,
    Unbounded,
    Error,
}

impl SolveStatus {
    /// Whether variable values accompany this status.
    pub fn has_solution(self) -> bool {
        matches!(self, SolveStatus::Ok | SolveStatus::Warning)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SolveStatus::Ok => "ok",
            SolveStatus::Warning => "warning",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Unbounded => "unbounded",
            SolveStatus::Error => "error",
        }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-specific detail accompanying a [`SolveStatus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCondition {
    Optimal,
    /// Solution returned but its worst relative constraint violation exceeds tolerance
    NumericalCaution { max_violation: f64 },
    Infeasible,
    Unbounded,
    SolverFailure(String),
}

impl fmt::Display for TerminationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationCondition::Optimal => write!(f, "optimal"),
            TerminationCondition::NumericalCaution { max_violation } => {
                write!(f, "numerical caution (max violation {:.3e})", max_violation)
            }
            TerminationCondition::Infeasible => write!(f, "infeasible"),
            TerminationCondition::Unbounded => write!(f, "unbounded"),
            TerminationCondition::SolverFailure(msg) => write!(f, "solver failure: {}", msg),
        }
    }
}

/// Which part of the expansion loop a solve belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolvePhase {
    Refinement,
    Finalize,
}

impl fmt::Display for SolvePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolvePhase::Refinement => write!(f, "refinement"),
            SolvePhase::Finalize => write!(f, "finalize"),
        }
    }
}

/// Per-phase tolerance for [`SolveStatus::Warning`].
///
/// `Ok` is always accepted; infeasible, unbounded and error never are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarningPolicy {
    pub allow_warning_refinement: bool,
    pub allow_warning_finalize: bool,
}

impl Default for WarningPolicy {
    fn default() -> Self {
        Self {
            allow_warning_refinement: true,
            allow_warning_finalize: false,
        }
    }
}

impl WarningPolicy {
    pub fn accepts(&self, phase: SolvePhase, status: SolveStatus) -> bool {
        match status {
            SolveStatus::Ok => true,
            SolveStatus::Warning => match phase {
                SolvePhase::Refinement => self.allow_warning_refinement,
                SolvePhase::Finalize => self.allow_warning_finalize,
            },
            SolveStatus::Infeasible | SolveStatus::Unbounded | SolveStatus::Error => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_tolerates_warning_only_while_refining() {
        let policy = WarningPolicy::default();
        assert!(policy.accepts(SolvePhase::Refinement, SolveStatus::Warning));
        assert!(!policy.accepts(SolvePhase::Finalize, SolveStatus::Warning));
        assert!(policy.accepts(SolvePhase::Finalize, SolveStatus::Ok));
    }

    #[test]
    fn test_failures_never_accepted() {
        let permissive = WarningPolicy {
            allow_warning_refinement: true,
            allow_warning_finalize: true,
        };
        for status in [SolveStatus::Infeasible, SolveStatus::Unbounded, SolveStatus::Error] {
            assert!(!permissive.accepts(SolvePhase::Refinement, status));
            assert!(!permissive.accepts(SolvePhase::Finalize, status));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(SolveStatus::Infeasible.to_string(), "infeasible");
        assert_eq!(SolvePhase::Finalize.to_string(), "finalize");
        assert!(TerminationCondition::NumericalCaution { max_violation: 0.02 }
            .to_string()
            .contains("2.000e-2"));
    }
}
