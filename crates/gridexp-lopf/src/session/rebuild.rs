use super::{SessionCore, SolveReport, SolverSession};
use crate::engine::{EngineRegistry, SolverOptions};
use crate::error::LopfError;
use crate::formulation::ExtraConstraints;
use crate::model::{LpModel, VarKey};
use gridexp_core::Network;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Session without incremental updates: every `build` starts from scratch.
///
/// Fixes are remembered across rebuilds so a pinned variable stays pinned for
/// every later solve.
pub struct RebuildSession {
    core: SessionCore,
    fixes: BTreeMap<VarKey, f64>,
}

impl RebuildSession {
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self::with_constraints(registry, ExtraConstraints::default())
    }

    pub fn with_constraints(registry: Arc<EngineRegistry>, extra: ExtraConstraints) -> Self {
        Self {
            core: SessionCore::new(registry, extra),
            fixes: BTreeMap::new(),
        }
    }
}

impl SolverSession for RebuildSession {
    fn build(&mut self, network: &Network, formulation: &str) -> Result<(), LopfError> {
        let model = self.core.build(network, formulation)?;
        for (var, value) in &self.fixes {
            model.fix(var, *value)?;
        }
        Ok(())
    }

    fn prepare(&mut self, solver_name: &str, options: &SolverOptions) -> Result<(), LopfError> {
        self.core.prepare(solver_name, options)
    }

    fn solve(&mut self, network: &mut Network) -> Result<SolveReport, LopfError> {
        self.core.solve(network)
    }

    fn fix(&mut self, var: &VarKey, value: f64) -> Result<(), LopfError> {
        if let Some(model) = self.core.model.as_mut() {
            model.fix(var, value)?;
        }
        self.fixes.insert(var.clone(), value);
        Ok(())
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ScriptedEngine;
    use gridexp_core::{Bus, Line, Snapshot};

    fn network() -> Network {
        let mut n = Network::new("pair");
        n.buses.push(Bus::new("a", 220.0));
        n.buses.push(Bus::new("b", 220.0));
        n.lines.push(
            Line::new("ab", "a", "b")
                .with_impedance(0.01, 0.1)
                .with_s_nom(100.0)
                .extendable(1.0),
        );
        n.set_snapshots(Snapshot::hourly_from_ymd(2013, 1, 1, 1));
        n
    }

    fn registry() -> Arc<EngineRegistry> {
        let mut registry = EngineRegistry::new();
        registry.register(Arc::new(ScriptedEngine::line_capacities("ab", &[80.0])));
        Arc::new(registry)
    }

    #[test]
    fn test_solve_requires_build_and_prepare() {
        let mut n = network();
        let mut session = RebuildSession::new(registry());
        assert!(matches!(session.solve(&mut n), Err(LopfError::NotBuilt)));
        session.build(&n, "kirchhoff").unwrap();
        assert!(matches!(session.solve(&mut n), Err(LopfError::NotPrepared)));
        session.prepare("scripted", &SolverOptions::default()).unwrap();
        session.solve(&mut n).unwrap();
        assert_eq!(n.lines[0].s_nom_opt, 80.0);
        assert!(session.incremental().is_none());
    }

    #[test]
    fn test_fix_survives_rebuild() {
        let mut n = network();
        let mut session = RebuildSession::new(registry());
        session.build(&n, "kirchhoff").unwrap();
        session.prepare("scripted", &SolverOptions::default()).unwrap();
        session.fix(&VarKey::LineSNom("ab".into()), 0.0).unwrap();

        session.build(&n, "kirchhoff").unwrap();
        session.solve(&mut n).unwrap();
        assert_eq!(n.lines[0].s_nom_opt, 0.0);
    }

    #[test]
    fn test_unknown_formulation() {
        let n = network();
        let mut session = RebuildSession::new(registry());
        assert!(matches!(
            session.build(&n, "ptdf"),
            Err(LopfError::UnknownFormulation(_))
        ));
        assert!(!session.is_built());
    }
}
