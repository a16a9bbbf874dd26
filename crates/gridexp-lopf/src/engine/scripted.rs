//! Deterministic engine replaying a fixed sequence of outcomes.
//!
//! Each call to [`LpEngine::solve`] consumes the next [`ScriptStep`]; once the
//! script is exhausted the last step repeats. Capacity variables named in the
//! step take the scripted value, every other variable takes zero, and all
//! values are clamped to the variable bounds of the model received. A fixed
//! variable therefore reports its fixed value, whatever the script says.

use super::{EngineOutput, LpEngine, SolverOptions};
use crate::error::LopfError;
use crate::model::{LpModel, VarKey};
use crate::status::{SolveStatus, TerminationCondition};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    pub status: SolveStatus,
    pub line_capacities: BTreeMap<String, f64>,
    pub link_capacities: BTreeMap<String, f64>,
}

impl ScriptStep {
    pub fn ok() -> Self {
        Self::with_status(SolveStatus::Ok)
    }

    pub fn with_status(status: SolveStatus) -> Self {
        Self {
            status,
            line_capacities: BTreeMap::new(),
            link_capacities: BTreeMap::new(),
        }
    }

    pub fn line(mut self, name: impl Into<String>, s_nom: f64) -> Self {
        self.line_capacities.insert(name.into(), s_nom);
        self
    }

    pub fn link(mut self, name: impl Into<String>, p_nom: f64) -> Self {
        self.link_capacities.insert(name.into(), p_nom);
        self
    }

    fn termination(&self) -> TerminationCondition {
        match self.status {
            SolveStatus::Ok => TerminationCondition::Optimal,
            SolveStatus::Warning => TerminationCondition::NumericalCaution { max_violation: 0.0 },
            SolveStatus::Infeasible => TerminationCondition::Infeasible,
            SolveStatus::Unbounded => TerminationCondition::Unbounded,
            SolveStatus::Error => TerminationCondition::SolverFailure("scripted failure".into()),
        }
    }
}

#[derive(Debug)]
pub struct ScriptedEngine {
    id: String,
    steps: Vec<ScriptStep>,
    cursor: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            id: "scripted".to_string(),
            steps,
            cursor: AtomicUsize::new(0),
        }
    }

    /// One successful step per capacity for a single line.
    pub fn line_capacities(line: &str, capacities: &[f64]) -> Self {
        Self::new(
            capacities
                .iter()
                .map(|&c| ScriptStep::ok().line(line, c))
                .collect(),
        )
    }

    pub fn then(mut self, step: ScriptStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn then_status(self, status: SolveStatus) -> Self {
        self.then(ScriptStep::with_status(status))
    }

    /// Number of solves served so far.
    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

impl LpEngine for ScriptedEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_available(&self) -> bool {
        !self.steps.is_empty()
    }

    fn solve(&self, model: &LpModel, _options: &SolverOptions) -> Result<EngineOutput, LopfError> {
        let call = self.cursor.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .get(call)
            .or_else(|| self.steps.last())
            .ok_or_else(|| LopfError::backend(self.id.clone(), "script is empty"))?;

        if !step.status.has_solution() {
            return Ok(EngineOutput::failed(step.status, step.termination()));
        }

        let values: Vec<f64> = model
            .variables()
            .iter()
            .map(|spec| {
                let target = match &spec.key {
                    VarKey::LineSNom(name) => step.line_capacities.get(name).copied(),
                    VarKey::LinkPNom(name) => step.link_capacities.get(name).copied(),
                    _ => None,
                }
                .unwrap_or(0.0);
                if target < spec.lower {
                    spec.lower
                } else if target > spec.upper {
                    spec.upper
                } else {
                    target
                }
            })
            .collect();
        let objective = Some(model.objective_value(&values));
        Ok(EngineOutput {
            status: step.status,
            termination: step.termination(),
            values,
            objective,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formulation::Formulation;

    fn model() -> LpModel {
        let mut model = LpModel::new(Formulation::Kirchhoff);
        model.add_variable(VarKey::LineSNom("l".into()), 0.0, 150.0, 1.0);
        model.add_variable(VarKey::LineFlow("l".into(), 0), -5.0, 5.0, 0.0);
        model
    }

    #[test]
    fn test_sequence_then_repeat_last() {
        let engine = ScriptedEngine::line_capacities("l", &[120.0, 119.0]);
        let options = SolverOptions::default();
        let m = model();
        let seen: Vec<f64> = (0..3)
            .map(|_| engine.solve(&m, &options).unwrap().values[0])
            .collect();
        assert_eq!(seen, vec![120.0, 119.0, 119.0]);
        assert_eq!(engine.calls(), 3);
    }

    #[test]
    fn test_values_clamped_to_bounds() {
        let engine = ScriptedEngine::line_capacities("l", &[400.0]);
        let mut m = model();
        let out = engine.solve(&m, &SolverOptions::default()).unwrap();
        assert_eq!(out.values, vec![150.0, 0.0]);

        m.fix(&VarKey::LineSNom("l".into()), 0.0).unwrap();
        let out = engine.solve(&m, &SolverOptions::default()).unwrap();
        assert_eq!(out.values[0], 0.0);
    }

    #[test]
    fn test_failure_step_has_no_values() {
        let engine = ScriptedEngine::new(vec![]).then_status(SolveStatus::Infeasible);
        let out = engine.solve(&model(), &SolverOptions::default()).unwrap();
        assert_eq!(out.status, SolveStatus::Infeasible);
        assert_eq!(out.termination, TerminationCondition::Infeasible);
        assert!(out.values.is_empty());
    }

    #[test]
    fn test_empty_script_is_backend_error() {
        let engine = ScriptedEngine::new(vec![]);
        assert!(!engine.is_available());
        assert!(matches!(
            engine.solve(&model(), &SolverOptions::default()),
            Err(LopfError::Backend { .. })
        ));
    }
}
