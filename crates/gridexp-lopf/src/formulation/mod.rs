//! Linear OPF formulations over a [`Network`].
//!
//! Both formulations share variables, bus balances and component limits; they
//! differ only in how passive line flows are tied to network physics:
//!
//! | Formulation | Physics group | Rows per snapshot |
//! |-------------|---------------|-------------------|
//! | `angles` | [`ConstraintGroup::PassiveBranchFlows`] | one per line |
//! | `kirchhoff` | [`ConstraintGroup::CycleConstraints`] | one per fundamental cycle |
//!
//! The physics group is the only one whose coefficients depend on line
//! impedance, so it is the only group a persistent session rebuilds between
//! expansion rounds.

mod dispatch;
mod passive;

use crate::error::LopfError;
use crate::model::{ConstraintGroup, LinearConstraint, LpModel, VarKey};
use gridexp_core::Network;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub use dispatch::declare_variables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Formulation {
    Angles,
    Kirchhoff,
}

impl Formulation {
    pub fn id(&self) -> &'static str {
        match self {
            Formulation::Angles => "angles",
            Formulation::Kirchhoff => "kirchhoff",
        }
    }

    /// Groups whose coefficients depend on line impedance.
    pub fn impedance_groups(&self) -> &'static [ConstraintGroup] {
        match self {
            Formulation::Angles => &[ConstraintGroup::PassiveBranchFlows],
            Formulation::Kirchhoff => &[ConstraintGroup::CycleConstraints],
        }
    }

    /// Every group this formulation builds, in build order.
    pub fn groups(&self) -> Vec<ConstraintGroup> {
        let mut groups = vec![
            ConstraintGroup::PowerBalance,
            ConstraintGroup::GeneratorLimits,
            ConstraintGroup::StorageLimits,
            ConstraintGroup::StorageConsistency,
            ConstraintGroup::LinkLimits,
            ConstraintGroup::LineLimits,
        ];
        groups.extend_from_slice(self.impedance_groups());
        groups.push(ConstraintGroup::CarrierMinCapacity);
        groups
    }

    pub fn has_group(&self, group: ConstraintGroup) -> bool {
        self.groups().contains(&group)
    }
}

impl FromStr for Formulation {
    type Err = LopfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "angles" => Ok(Formulation::Angles),
            "kirchhoff" => Ok(Formulation::Kirchhoff),
            _ => Err(LopfError::UnknownFormulation(s.to_string())),
        }
    }
}

impl fmt::Display for Formulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Constraints added on top of the physical model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraConstraints {
    /// Minimum total extendable generator capacity (MW) per carrier
    pub min_capacities: BTreeMap<String, f64>,
}

/// Build the complete model for `network`.
pub fn build_model(
    network: &Network,
    formulation: Formulation,
    extra: &ExtraConstraints,
) -> Result<LpModel, LopfError> {
    let mut model = LpModel::new(formulation);
    declare_variables(network, &mut model)?;
    for group in formulation.groups() {
        let rows = build_group(network, &model, group, extra)?;
        model.set_group(group, rows);
    }
    debug!(
        formulation = %formulation,
        variables = model.num_variables(),
        constraints = model.num_constraints(),
        "built LOPF model"
    );
    Ok(model)
}

/// Build the rows of one group against an already declared model.
pub fn build_group(
    network: &Network,
    model: &LpModel,
    group: ConstraintGroup,
    extra: &ExtraConstraints,
) -> Result<Vec<LinearConstraint>, LopfError> {
    match group {
        ConstraintGroup::PowerBalance => dispatch::power_balance(network, model),
        ConstraintGroup::GeneratorLimits => dispatch::generator_limits(network, model),
        ConstraintGroup::StorageLimits => dispatch::storage_limits(network, model),
        ConstraintGroup::StorageConsistency => dispatch::storage_consistency(network, model),
        ConstraintGroup::LinkLimits => dispatch::link_limits(network, model),
        ConstraintGroup::LineLimits => dispatch::line_limits(network, model),
        ConstraintGroup::PassiveBranchFlows => passive::branch_flows(network, model),
        ConstraintGroup::CycleConstraints => passive::cycle_constraints(network, model),
        ConstraintGroup::CarrierMinCapacity => dispatch::carrier_min_capacity(network, model, extra),
    }
}

/// Write solved values into the network's result columns.
///
/// Fixed-rating components report their input rating as the optimum.
pub fn write_back(
    network: &mut Network,
    model: &LpModel,
    values: &[f64],
    objective: Option<f64>,
) -> Result<(), LopfError> {
    let n_t = network.snapshots.len();
    let value = |key: VarKey| -> Option<f64> { model.var(&key).and_then(|i| values.get(i).copied()) };
    let series = |make: fn(String, usize) -> VarKey, name: &str| -> Vec<f64> {
        (0..n_t)
            .map(|t| value(make(name.to_string(), t)).unwrap_or(0.0))
            .collect()
    };

    let mut ratings = Vec::with_capacity(network.lines.len());
    for line in &network.lines {
        ratings.push(network.line_rating(line)?);
    }
    for (line, rating) in network.lines.iter_mut().zip(ratings) {
        line.s_nom_opt = if line.s_nom_extendable {
            value(VarKey::LineSNom(line.name.clone())).unwrap_or(rating)
        } else {
            rating
        };
        line.p0 = series(VarKey::LineFlow, &line.name);
    }

    for link in &mut network.links {
        link.p_nom_opt = if link.p_nom_extendable {
            value(VarKey::LinkPNom(link.name.clone())).unwrap_or(link.p_nom)
        } else {
            link.p_nom
        };
        link.p0 = series(VarKey::LinkFlow, &link.name);
    }

    for gen in &mut network.generators {
        gen.p_nom_opt = if gen.p_nom_extendable {
            value(VarKey::GeneratorPNom(gen.name.clone())).unwrap_or(gen.p_nom)
        } else {
            gen.p_nom
        };
        gen.p = series(VarKey::GeneratorP, &gen.name);
    }

    for su in &mut network.storage_units {
        su.p_nom_opt = if su.p_nom_extendable {
            value(VarKey::StoragePNom(su.name.clone())).unwrap_or(su.p_nom)
        } else {
            su.p_nom
        };
        let dispatch = series(VarKey::StorageDispatch, &su.name);
        let store = series(VarKey::StorageStore, &su.name);
        su.p = dispatch.iter().zip(&store).map(|(d, s)| d - s).collect();
        su.state_of_charge = series(VarKey::StorageSoc, &su.name);
        su.spill = series(VarKey::StorageSpill, &su.name);
    }

    network.objective = objective;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridexp_core::{Bus, Generator, Line, Load, Snapshot};

    fn triangle() -> Network {
        let mut n = Network::new("triangle");
        for b in ["a", "b", "c"] {
            n.buses.push(Bus::new(b, 220.0));
        }
        n.lines.push(Line::new("ab", "a", "b").with_impedance(0.0, 10.0).with_s_nom(100.0));
        n.lines.push(Line::new("bc", "b", "c").with_impedance(0.0, 10.0).with_s_nom(100.0));
        n.lines.push(
            Line::new("ac", "a", "c")
                .with_impedance(0.0, 20.0)
                .with_s_nom(50.0)
                .extendable(10.0),
        );
        n.generators
            .push(Generator::new("g", "a", "gas").with_p_nom(500.0).with_marginal_cost(20.0));
        n.loads.push(Load::new("d", "c", vec![80.0, 120.0]));
        n.set_snapshots(Snapshot::hourly_from_ymd(2013, 1, 1, 2));
        n
    }

    #[test]
    fn test_parse_formulation() {
        assert_eq!("kirchhoff".parse::<Formulation>().unwrap(), Formulation::Kirchhoff);
        assert_eq!("Angles".parse::<Formulation>().unwrap(), Formulation::Angles);
        assert!(matches!(
            "ptdf".parse::<Formulation>(),
            Err(LopfError::UnknownFormulation(id)) if id == "ptdf"
        ));
    }

    #[test]
    fn test_impedance_groups_are_part_of_formulation() {
        for f in [Formulation::Angles, Formulation::Kirchhoff] {
            for g in f.impedance_groups() {
                assert!(f.has_group(*g));
            }
        }
        assert!(!Formulation::Kirchhoff.has_group(ConstraintGroup::PassiveBranchFlows));
    }

    #[test]
    fn test_model_shape() {
        let n = triangle();
        let kvl = build_model(&n, Formulation::Kirchhoff, &ExtraConstraints::default()).unwrap();
        let angles = build_model(&n, Formulation::Angles, &ExtraConstraints::default()).unwrap();

        // one cycle, two snapshots
        assert_eq!(kvl.group(ConstraintGroup::CycleConstraints).unwrap().len(), 2);
        assert_eq!(angles.group(ConstraintGroup::PassiveBranchFlows).unwrap().len(), 6);
        assert!(kvl.var(&VarKey::BusAngle("a".into(), 0)).is_none());
        assert!(angles.var(&VarKey::BusAngle("a".into(), 0)).is_some());
        assert!(kvl.var(&VarKey::LineSNom("ac".into())).is_some());
        assert!(kvl.var(&VarKey::LineSNom("ab".into())).is_none());
        // 3 buses x 2 snapshots
        assert_eq!(kvl.group(ConstraintGroup::PowerBalance).unwrap().len(), 6);
    }

    #[test]
    fn test_rebuilding_a_group_reproduces_it() {
        let n = triangle();
        let extra = ExtraConstraints::default();
        let model = build_model(&n, Formulation::Kirchhoff, &extra).unwrap();
        let rows = build_group(&n, &model, ConstraintGroup::CycleConstraints, &extra).unwrap();
        assert_eq!(model.group(ConstraintGroup::CycleConstraints).unwrap(), rows.as_slice());
    }

    #[test]
    fn test_write_back_fills_result_columns() {
        let mut n = triangle();
        let model = build_model(&n, Formulation::Kirchhoff, &ExtraConstraints::default()).unwrap();
        let mut values = vec![0.0; model.num_variables()];
        let snom = model.var(&VarKey::LineSNom("ac".into())).unwrap();
        values[snom] = 75.0;
        let flow = model.var(&VarKey::LineFlow("ab".into(), 1)).unwrap();
        values[flow] = 42.0;

        write_back(&mut n, &model, &values, Some(12.0)).unwrap();
        assert_eq!(n.lines[2].s_nom_opt, 75.0);
        assert_eq!(n.lines[0].s_nom_opt, 100.0);
        assert_eq!(n.lines[0].p0, vec![0.0, 42.0]);
        assert_eq!(n.generators[0].p_nom_opt, 500.0);
        assert_eq!(n.objective, Some(12.0));
    }
}
