//! LP engines that solve an [`LpModel`].
//!
//! An engine only maps a model to values and a status; it never touches the
//! network. Numeric engines go through `good_lp`, which keeps the translation
//! from [`LpModel`] rows to solver constraints in one place.

#[cfg(feature = "solver-clarabel")]
mod clarabel;
#[cfg(feature = "solver-highs")]
mod highs;
mod registry;
pub mod scripted;

#[cfg(feature = "solver-clarabel")]
pub use clarabel::ClarabelEngine;
#[cfg(feature = "solver-highs")]
pub use highs::HighsEngine;
pub use registry::EngineRegistry;
pub use scripted::ScriptedEngine;

use crate::error::LopfError;
use crate::model::{LinearConstraint, LpModel, Sense};
use crate::status::{SolveStatus, TerminationCondition};
use good_lp::{
    constraint, variable, Constraint, Expression, ProblemVariables, ResolutionError, Solution,
    Solver, SolverModel, Variable,
};
use serde::{Deserialize, Serialize};

/// Options forwarded to the engine on every solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Wall-clock limit per solve, honored by engines that support it
    pub time_limit_seconds: Option<f64>,
    pub threads: Option<u32>,
    pub verbose: bool,
    /// Largest relative constraint violation still reported as `ok`
    pub feasibility_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            time_limit_seconds: None,
            threads: None,
            verbose: false,
            feasibility_tolerance: 1e-4,
        }
    }
}

/// Raw result of one engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub status: SolveStatus,
    pub termination: TerminationCondition,
    /// One value per model variable; empty when `status` carries no solution
    pub values: Vec<f64>,
    pub objective: Option<f64>,
}

impl EngineOutput {
    pub fn failed(status: SolveStatus, termination: TerminationCondition) -> Self {
        Self {
            status,
            termination,
            values: Vec::new(),
            objective: None,
        }
    }
}

/// A linear-program solver.
pub trait LpEngine: Send + Sync {
    /// Unique identifier (e.g., "clarabel", "highs")
    fn id(&self) -> &str;

    /// Check if this engine can run in the current build and environment
    fn is_available(&self) -> bool;

    /// Solve the model. `Err` is reserved for engine crashes; an infeasible
    /// or unbounded model is an `Ok` output with the matching status.
    fn solve(&self, model: &LpModel, options: &SolverOptions) -> Result<EngineOutput, LopfError>;
}

/// Declare the model's variables and objective with `good_lp` and add every
/// constraint group.
pub(crate) fn assemble<S: Solver>(model: &LpModel, solver: S) -> (S::Model, Vec<Variable>) {
    let mut vars = ProblemVariables::new();
    let mut handles = Vec::with_capacity(model.num_variables());
    let mut objective = Expression::from(0.0);

    for spec in model.variables() {
        let mut definition = variable();
        if spec.lower.is_finite() {
            definition = definition.min(spec.lower);
        }
        if spec.upper.is_finite() {
            definition = definition.max(spec.upper);
        }
        let handle = vars.add(definition);
        if spec.cost != 0.0 {
            objective += spec.cost * handle;
        }
        handles.push(handle);
    }

    let mut problem = vars.minimise(objective).using(solver);
    for (_, rows) in model.groups() {
        for row in rows {
            problem = problem.with(to_constraint(row, &handles));
        }
    }
    (problem, handles)
}

fn to_constraint(row: &LinearConstraint, handles: &[Variable]) -> Constraint {
    let mut lhs = Expression::from(0.0);
    for &(i, coefficient) in &row.terms {
        lhs += coefficient * handles[i];
    }
    let rhs = row.rhs;
    match row.sense {
        Sense::Le => constraint!(lhs <= rhs),
        Sense::Ge => constraint!(lhs >= rhs),
        Sense::Eq => constraint!(lhs == rhs),
    }
}

/// Turn a `good_lp` resolution into an [`EngineOutput`].
///
/// Values of fixed variables are reported exactly; a solution whose worst
/// relative violation exceeds the tolerance is downgraded to a warning.
pub(crate) fn collect<Sol: Solution>(
    model: &LpModel,
    handles: &[Variable],
    result: Result<Sol, ResolutionError>,
    options: &SolverOptions,
) -> EngineOutput {
    let solution = match result {
        Ok(solution) => solution,
        Err(ResolutionError::Infeasible) => {
            return EngineOutput::failed(SolveStatus::Infeasible, TerminationCondition::Infeasible)
        }
        Err(ResolutionError::Unbounded) => {
            return EngineOutput::failed(SolveStatus::Unbounded, TerminationCondition::Unbounded)
        }
        Err(other) => {
            return EngineOutput::failed(
                SolveStatus::Error,
                TerminationCondition::SolverFailure(other.to_string()),
            )
        }
    };

    let mut values: Vec<f64> = handles.iter().map(|h| solution.value(*h)).collect();
    model.pin_fixed(&mut values);

    let violation = model.max_violation(&values);
    let (status, termination) = if violation > options.feasibility_tolerance {
        (
            SolveStatus::Warning,
            TerminationCondition::NumericalCaution {
                max_violation: violation,
            },
        )
    } else {
        (SolveStatus::Ok, TerminationCondition::Optimal)
    };
    let objective = Some(model.objective_value(&values));
    EngineOutput {
        status,
        termination,
        values,
        objective,
    }
}
