//! Clarabel engine for LP problems.

use super::{assemble, collect, EngineOutput, LpEngine, SolverOptions};
use crate::error::LopfError;
use crate::model::LpModel;
use good_lp::solvers::clarabel::clarabel;
use good_lp::SolverModel;
use tracing::debug;

/// Clarabel is a pure-Rust interior-point solver that's always available.
///
/// Interior-point iterates stop inside the feasible region, so a solution is
/// checked against the model rows and reported as a warning when the residual
/// exceeds the configured tolerance. Time limits and thread counts are not
/// exposed through `good_lp` for Clarabel and are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClarabelEngine;

impl LpEngine for ClarabelEngine {
    fn id(&self) -> &str {
        "clarabel"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn solve(&self, model: &LpModel, options: &SolverOptions) -> Result<EngineOutput, LopfError> {
        if options.time_limit_seconds.is_some() || options.threads.is_some() {
            debug!("clarabel ignores time_limit_seconds and threads");
        }
        let (problem, handles) = assemble(model, clarabel);
        let output = collect(model, &handles, problem.solve(), options);
        debug!(
            status = %output.status,
            termination = %output.termination,
            variables = model.num_variables(),
            "clarabel solve finished"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formulation::Formulation;
    use crate::model::{ConstraintGroup, LinearConstraint, Sense, VarKey};
    use crate::status::SolveStatus;

    #[test]
    fn test_clarabel_engine_id() {
        assert_eq!(ClarabelEngine.id(), "clarabel");
        assert!(ClarabelEngine.is_available());
    }

    #[test]
    fn test_solves_small_lp() {
        // min 2x + 3y  s.t.  x + y >= 10, x <= 4
        let mut model = LpModel::new(Formulation::Kirchhoff);
        let x = model.add_variable(VarKey::GeneratorP("x".into(), 0), 0.0, 4.0, 2.0);
        let y = model.add_variable(VarKey::GeneratorP("y".into(), 0), 0.0, f64::INFINITY, 3.0);
        model.set_group(
            ConstraintGroup::PowerBalance,
            vec![LinearConstraint::new(vec![(x, 1.0), (y, 1.0)], Sense::Ge, 10.0)],
        );

        let out = ClarabelEngine.solve(&model, &SolverOptions::default()).unwrap();
        assert_eq!(out.status, SolveStatus::Ok);
        assert!((out.values[x] - 4.0).abs() < 1e-4);
        assert!((out.values[y] - 6.0).abs() < 1e-4);
        assert!((out.objective.unwrap() - 26.0).abs() < 1e-3);
    }

    #[test]
    fn test_infeasible_maps_to_status() {
        let mut model = LpModel::new(Formulation::Kirchhoff);
        let x = model.add_variable(VarKey::GeneratorP("x".into(), 0), 0.0, 1.0, 1.0);
        model.set_group(
            ConstraintGroup::PowerBalance,
            vec![LinearConstraint::new(vec![(x, 1.0)], Sense::Eq, 5.0)],
        );
        let out = ClarabelEngine.solve(&model, &SolverOptions::default()).unwrap();
        assert_eq!(out.status, SolveStatus::Infeasible);
        assert!(out.values.is_empty());
    }

    #[test]
    fn test_fixed_variable_reports_exact_value() {
        let mut model = LpModel::new(Formulation::Kirchhoff);
        let x = model.add_variable(VarKey::LineSNom("l".into()), 0.0, 100.0, 1.0);
        let y = model.add_variable(VarKey::GeneratorP("g".into(), 0), 0.0, 100.0, 1.0);
        model.set_group(
            ConstraintGroup::PowerBalance,
            vec![LinearConstraint::new(vec![(y, 1.0)], Sense::Ge, 3.0)],
        );
        model.fix(&VarKey::LineSNom("l".into()), 0.0).unwrap();

        let out = ClarabelEngine.solve(&model, &SolverOptions::default()).unwrap();
        assert!(out.status.has_solution());
        assert_eq!(out.values[x], 0.0);
    }
}
