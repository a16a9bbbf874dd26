use super::{IncrementalUpdate, ModelDelta, SessionCore, SolveReport, SolverSession};
use crate::engine::{EngineRegistry, SolverOptions};
use crate::error::LopfError;
use crate::formulation::{build_group, ExtraConstraints};
use crate::model::{LpModel, VarKey};
use gridexp_core::Network;
use std::sync::Arc;
use tracing::debug;

/// Session that keeps its model alive across solves and supports
/// [`IncrementalUpdate`].
pub struct PersistentSession {
    core: SessionCore,
    builds: usize,
    updates: usize,
}

impl PersistentSession {
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self::with_constraints(registry, ExtraConstraints::default())
    }

    pub fn with_constraints(registry: Arc<EngineRegistry>, extra: ExtraConstraints) -> Self {
        Self {
            core: SessionCore::new(registry, extra),
            builds: 0,
            updates: 0,
        }
    }

    /// Full builds performed so far.
    pub fn builds(&self) -> usize {
        self.builds
    }
}

impl SolverSession for PersistentSession {
    fn build(&mut self, network: &Network, formulation: &str) -> Result<(), LopfError> {
        self.core.build(network, formulation)?;
        self.builds += 1;
        Ok(())
    }

    fn prepare(&mut self, solver_name: &str, options: &SolverOptions) -> Result<(), LopfError> {
        self.core.prepare(solver_name, options)
    }

    fn solve(&mut self, network: &mut Network) -> Result<SolveReport, LopfError> {
        self.core.solve(network)
    }

    fn fix(&mut self, var: &VarKey, value: f64) -> Result<(), LopfError> {
        self.core.model_mut()?.fix(var, value)
    }

    fn is_built(&self) -> bool {
        self.core.model.is_some()
    }

    fn is_prepared(&self) -> bool {
        self.core.engine.is_some()
    }

    fn model(&self) -> Option<&LpModel> {
        self.core.model.as_ref()
    }

    fn incremental(&mut self) -> Option<&mut dyn IncrementalUpdate> {
        Some(self)
    }
}

impl IncrementalUpdate for PersistentSession {
    fn update(&mut self, network: &Network, deltas: &[ModelDelta]) -> Result<(), LopfError> {
        let extra = self.core.extra.clone();
        let model = self.core.model_mut()?;
        for delta in deltas {
            match delta {
                ModelDelta::RebuildGroup(group) => {
                    let formulation = model.formulation();
                    if !formulation.has_group(*group) {
                        return Err(LopfError::UnsupportedGroup {
                            group: format!("{:?}", group),
                            formulation: formulation.to_string(),
                        });
                    }
                    let rows = build_group(network, model, *group, &extra)?;
                    debug!(group = ?group, rows = rows.len(), "rebuilt constraint group");
                    model.set_group(*group, rows);
                }
                ModelDelta::RemoveGroup(group) => {
                    model.remove_group(*group);
                }
                ModelDelta::Fix(var, value) => model.fix(var, *value)?,
            }
        }
        self.updates += 1;
        Ok(())
    }
}

impl Drop for PersistentSession {
    fn drop(&mut self) {
        debug!(
            builds = self.builds,
            updates = self.updates,
            "released persistent solver session"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ScriptedEngine;
    use crate::model::ConstraintGroup;
    use gridexp_core::{Bus, Line, Snapshot};

    fn triangle() -> Network {
        let mut n = Network::new("triangle");
        for b in ["a", "b", "c"] {
            n.buses.push(Bus::new(b, 220.0));
        }
        n.lines.push(
            Line::new("ab", "a", "b")
                .with_impedance(0.0, 10.0)
                .with_s_nom(100.0)
                .extendable(1.0),
        );
        n.lines.push(Line::new("bc", "b", "c").with_impedance(0.0, 10.0).with_s_nom(100.0));
        n.lines.push(Line::new("ca", "c", "a").with_impedance(0.0, 20.0).with_s_nom(100.0));
        n.set_snapshots(Snapshot::hourly_from_ymd(2013, 1, 1, 2));
        n
    }

    fn session() -> PersistentSession {
        let mut registry = EngineRegistry::new();
        registry.register(Arc::new(ScriptedEngine::line_capacities("ab", &[50.0])));
        PersistentSession::new(Arc::new(registry))
    }

    #[test]
    fn test_update_requires_model() {
        let n = triangle();
        let mut s = session();
        let deltas = [ModelDelta::RebuildGroup(ConstraintGroup::CycleConstraints)];
        assert!(matches!(s.update(&n, &deltas), Err(LopfError::NotBuilt)));
        assert!(matches!(
            s.fix(&VarKey::LineSNom("ab".into()), 0.0),
            Err(LopfError::NotBuilt)
        ));
    }

    #[test]
    fn test_rebuilt_group_matches_fresh_build() {
        let mut n = triangle();
        let mut s = session();
        s.build(&n, "kirchhoff").unwrap();

        n.lines[0].x = 5.0;
        let deltas = ModelDelta::impedance_refresh(s.model().unwrap().formulation());
        s.update(&n, &deltas).unwrap();
        // idempotent
        s.update(&n, &deltas).unwrap();

        let mut fresh = session();
        fresh.build(&n, "kirchhoff").unwrap();
        assert_eq!(s.model(), fresh.model());
        assert_eq!(s.builds(), 1);
    }

    #[test]
    fn test_remove_and_readd_group_leaves_others() {
        let n = triangle();
        let mut s = session();
        s.build(&n, "kirchhoff").unwrap();
        let before = s.model().unwrap().clone();

        s.update(&n, &[ModelDelta::RemoveGroup(ConstraintGroup::CycleConstraints)])
            .unwrap();
        let without = s.model().unwrap();
        assert!(without.group(ConstraintGroup::CycleConstraints).is_none());
        for (group, rows) in without.groups() {
            assert_eq!(before.group(group).unwrap(), rows);
        }

        s.update(&n, &[ModelDelta::RebuildGroup(ConstraintGroup::CycleConstraints)])
            .unwrap();
        assert_eq!(s.model().unwrap(), &before);
    }

    #[test]
    fn test_foreign_group_rejected() {
        let n = triangle();
        let mut s = session();
        s.build(&n, "kirchhoff").unwrap();
        let err = s
            .update(&n, &[ModelDelta::RebuildGroup(ConstraintGroup::PassiveBranchFlows)])
            .unwrap_err();
        assert!(matches!(err, LopfError::UnsupportedGroup { .. }));
    }

    #[test]
    fn test_fix_delta_pins_solution() {
        let mut n = triangle();
        let mut s = session();
        s.build(&n, "kirchhoff").unwrap();
        s.prepare("scripted", &SolverOptions::default()).unwrap();
        s.update(&n, &[ModelDelta::Fix(VarKey::LineSNom("ab".into()), 0.0)])
            .unwrap();
        s.solve(&mut n).unwrap();
        assert_eq!(n.lines[0].s_nom_opt, 0.0);
        assert!(s.incremental().is_some());
    }
}
