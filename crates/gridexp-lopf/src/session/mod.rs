//! Solver sessions: one engagement with an LP engine over a sequence of solves.
//!
//! A session owns the built [`LpModel`] and the resolved engine. Two
//! strategies implement [`SolverSession`]:
//!
//! - [`RebuildSession`] rebuilds the full model whenever asked to build and
//!   re-applies every recorded fix afterwards.
//! - [`PersistentSession`] builds once and exposes the optional
//!   [`IncrementalUpdate`] capability, so only impedance-dependent constraint
//!   groups are replaced between expansion rounds.
//!
//! Both hand identical models to the engine for the same network state, so
//! observable results do not depend on the strategy.

mod persistent;
mod rebuild;

pub use persistent::PersistentSession;
pub use rebuild::RebuildSession;

use crate::engine::{EngineRegistry, LpEngine, SolverOptions};
use crate::error::LopfError;
use crate::formulation::{build_model, write_back, ExtraConstraints, Formulation};
use crate::model::{ConstraintGroup, LpModel, VarKey};
use crate::status::{SolveStatus, TerminationCondition};
use gridexp_core::Network;
use std::sync::Arc;
use tracing::debug;

/// Status of one session solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub status: SolveStatus,
    pub termination: TerminationCondition,
    pub objective: Option<f64>,
}

/// Change applied to a live model by [`IncrementalUpdate::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum ModelDelta {
    /// Replace a group with rows rebuilt from the current network
    RebuildGroup(ConstraintGroup),
    RemoveGroup(ConstraintGroup),
    Fix(VarKey, f64),
}

impl ModelDelta {
    /// Deltas refreshing every impedance-dependent group of `formulation`.
    pub fn impedance_refresh(formulation: Formulation) -> Vec<ModelDelta> {
        formulation
            .impedance_groups()
            .iter()
            .map(|g| ModelDelta::RebuildGroup(*g))
            .collect()
    }
}

/// Optional capability of sessions that can modify a built model in place.
pub trait IncrementalUpdate {
    /// Apply `deltas` in order. Applying the same deltas twice leaves the
    /// model as after the first application.
    fn update(&mut self, network: &Network, deltas: &[ModelDelta]) -> Result<(), LopfError>;
}

pub trait SolverSession {
    /// Build the model for `network`; fails on an unknown formulation id.
    fn build(&mut self, network: &Network, formulation: &str) -> Result<(), LopfError>;

    /// Resolve the engine and store its options.
    fn prepare(&mut self, solver_name: &str, options: &SolverOptions) -> Result<(), LopfError>;

    /// Solve and, when the status carries a solution, write values into the
    /// network's result columns.
    fn solve(&mut self, network: &mut Network) -> Result<SolveReport, LopfError>;

    /// Pin a variable for all subsequent solves of this session.
    fn fix(&mut self, var: &VarKey, value: f64) -> Result<(), LopfError>;

    fn is_built(&self) -> bool;

    fn is_prepared(&self) -> bool;

    fn model(&self) -> Option<&LpModel>;

    fn incremental(&mut self) -> Option<&mut dyn IncrementalUpdate> {
        None
    }
}

/// State shared by both session strategies.
struct SessionCore {
    registry: Arc<EngineRegistry>,
    extra: ExtraConstraints,
    model: Option<LpModel>,
    engine: Option<Arc<dyn LpEngine>>,
    options: SolverOptions,
}

impl SessionCore {
    fn new(registry: Arc<EngineRegistry>, extra: ExtraConstraints) -> Self {
        Self {
            registry,
            extra,
            model: None,
            engine: None,
            options: SolverOptions::default(),
        }
    }

    fn build(&mut self, network: &Network, formulation: &str) -> Result<&mut LpModel, LopfError> {
        let formulation: Formulation = formulation.parse()?;
        let model = build_model(network, formulation, &self.extra)?;
        Ok(self.model.insert(model))
    }

    fn prepare(&mut self, solver_name: &str, options: &SolverOptions) -> Result<(), LopfError> {
        self.engine = Some(self.registry.resolve(solver_name)?);
        self.options = options.clone();
        Ok(())
    }

    fn model_mut(&mut self) -> Result<&mut LpModel, LopfError> {
        self.model.as_mut().ok_or(LopfError::NotBuilt)
    }

    fn solve(&mut self, network: &mut Network) -> Result<SolveReport, LopfError> {
        let model = self.model.as_ref().ok_or(LopfError::NotBuilt)?;
        let engine = self.engine.as_ref().ok_or(LopfError::NotPrepared)?;

        let mut output = engine.solve(model, &self.options)?;
        debug!(
            engine = engine.id(),
            status = %output.status,
            termination = %output.termination,
            "solve returned"
        );

        if output.status.has_solution() {
            if output.values.len() != model.num_variables() {
                return Err(LopfError::backend(
                    engine.id(),
                    format!(
                        "returned {} values for {} variables",
                        output.values.len(),
                        model.num_variables()
                    ),
                ));
            }
            model.pin_fixed(&mut output.values);
            write_back(network, model, &output.values, output.objective)?;
        }
        Ok(SolveReport {
            status: output.status,
            termination: output.termination,
            objective: output.objective,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_are_object_safe() {
        fn _accepts(_s: &mut dyn SolverSession) {}
        fn _accepts_update(_u: &mut dyn IncrementalUpdate) {}
    }

    #[test]
    fn test_impedance_refresh_deltas() {
        assert_eq!(
            ModelDelta::impedance_refresh(Formulation::Kirchhoff),
            vec![ModelDelta::RebuildGroup(ConstraintGroup::CycleConstraints)]
        );
        assert_eq!(
            ModelDelta::impedance_refresh(Formulation::Angles),
            vec![ModelDelta::RebuildGroup(ConstraintGroup::PassiveBranchFlows)]
        );
    }
}
