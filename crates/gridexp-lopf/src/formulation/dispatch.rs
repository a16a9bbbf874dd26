//! Variables, nodal balances and component limits shared by both formulations.

use crate::error::LopfError;
use crate::formulation::{ExtraConstraints, Formulation};
use crate::model::{LinearConstraint, LpModel, Sense, VarKey};
use gridexp_core::{sub_networks, GridError, Network};
use std::collections::HashMap;
use tracing::warn;

const INF: f64 = f64::INFINITY;

fn upper(bound: Option<f64>) -> f64 {
    bound.unwrap_or(INF)
}

/// Declare every decision variable of the model.
///
/// Fixed-capacity components get their limits as variable bounds; extendable
/// ones get free dispatch variables tied to the capacity variable by rows in
/// the limit groups.
pub fn declare_variables(network: &Network, model: &mut LpModel) -> Result<(), LopfError> {
    let n_t = network.snapshots.len();
    let weight = |t: usize| network.snapshots[t].weighting;

    for gen in &network.generators {
        if gen.p_nom_extendable {
            model.add_variable(
                VarKey::GeneratorPNom(gen.name.clone()),
                gen.p_nom_min,
                upper(gen.p_nom_max),
                gen.capital_cost,
            );
        }
        for t in 0..n_t {
            let (lo, hi) = if gen.p_nom_extendable {
                (-INF, INF)
            } else {
                (gen.p_min_pu * gen.p_nom, gen.p_max_pu_at(t) * gen.p_nom)
            };
            model.add_variable(
                VarKey::GeneratorP(gen.name.clone(), t),
                lo,
                hi,
                weight(t) * gen.marginal_cost,
            );
        }
    }

    for su in &network.storage_units {
        if su.p_nom_extendable {
            model.add_variable(
                VarKey::StoragePNom(su.name.clone()),
                su.p_nom_min,
                upper(su.p_nom_max),
                su.capital_cost,
            );
        }
        let (power, energy) = if su.p_nom_extendable {
            (INF, INF)
        } else {
            (su.p_nom, su.max_hours * su.p_nom)
        };
        for t in 0..n_t {
            model.add_variable(
                VarKey::StorageDispatch(su.name.clone(), t),
                0.0,
                power,
                weight(t) * su.marginal_cost,
            );
            model.add_variable(VarKey::StorageStore(su.name.clone(), t), 0.0, power, 0.0);
            model.add_variable(VarKey::StorageSoc(su.name.clone(), t), 0.0, energy, 0.0);
            model.add_variable(
                VarKey::StorageSpill(su.name.clone(), t),
                0.0,
                su.inflow_at(t).max(0.0),
                0.0,
            );
        }
    }

    for line in &network.lines {
        let rating = network.line_rating(line)?;
        if line.s_nom_extendable {
            model.add_variable(
                VarKey::LineSNom(line.name.clone()),
                line.s_nom_min,
                upper(line.s_nom_max),
                line.capital_cost,
            );
        }
        let (lo, hi) = if line.s_nom_extendable {
            (-INF, INF)
        } else {
            (-rating, rating)
        };
        for t in 0..n_t {
            model.add_variable(VarKey::LineFlow(line.name.clone(), t), lo, hi, 0.0);
        }
    }

    for link in &network.links {
        if link.p_nom_extendable {
            model.add_variable(
                VarKey::LinkPNom(link.name.clone()),
                link.p_nom_min,
                upper(link.p_nom_max),
                link.capital_cost,
            );
        }
        let (lo, hi) = if link.p_nom_extendable {
            (-INF, INF)
        } else {
            (link.p_min_pu * link.p_nom, link.p_nom)
        };
        for t in 0..n_t {
            model.add_variable(
                VarKey::LinkFlow(link.name.clone(), t),
                lo,
                hi,
                weight(t) * link.marginal_cost,
            );
        }
    }

    if model.formulation() == Formulation::Angles {
        for sub in sub_networks(network) {
            for (k, &bus) in sub.buses.iter().enumerate() {
                let name = &network.buses[bus].name;
                // First bus of each island is the angle reference
                let (lo, hi) = if k == 0 { (0.0, 0.0) } else { (-INF, INF) };
                for t in 0..n_t {
                    model.add_variable(VarKey::BusAngle(name.clone(), t), lo, hi, 0.0);
                }
            }
        }
    }
    Ok(())
}

struct BusLookup<'a> {
    index: HashMap<&'a str, usize>,
}

impl<'a> BusLookup<'a> {
    fn new(network: &'a Network) -> Self {
        Self {
            index: network
                .buses
                .iter()
                .enumerate()
                .map(|(i, b)| (b.name.as_str(), i))
                .collect(),
        }
    }

    fn get(&self, owner: &str, bus: &str) -> Result<usize, LopfError> {
        self.index.get(bus).copied().ok_or_else(|| {
            GridError::Validation(format!("{} references unknown bus '{}'", owner, bus)).into()
        })
    }
}

/// Nodal energy balance: injections minus withdrawals equal demand, per bus and snapshot.
pub fn power_balance(network: &Network, model: &LpModel) -> Result<Vec<LinearConstraint>, LopfError> {
    let n_t = network.snapshots.len();
    let buses = BusLookup::new(network);
    let n_rows = network.buses.len() * n_t;
    let mut terms: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n_rows];
    let mut rhs = vec![0.0; n_rows];
    let row = |bus: usize, t: usize| bus * n_t + t;

    for gen in &network.generators {
        let b = buses.get(&gen.name, &gen.bus)?;
        for t in 0..n_t {
            let p = model.require_var(&VarKey::GeneratorP(gen.name.clone(), t))?;
            terms[row(b, t)].push((p, 1.0));
        }
    }
    for su in &network.storage_units {
        let b = buses.get(&su.name, &su.bus)?;
        for t in 0..n_t {
            let dispatch = model.require_var(&VarKey::StorageDispatch(su.name.clone(), t))?;
            let store = model.require_var(&VarKey::StorageStore(su.name.clone(), t))?;
            terms[row(b, t)].push((dispatch, 1.0));
            terms[row(b, t)].push((store, -1.0));
        }
    }
    for load in &network.loads {
        let b = buses.get(&load.name, &load.bus)?;
        for t in 0..n_t {
            rhs[row(b, t)] += load.p_at(t);
        }
    }
    for line in &network.lines {
        let b0 = buses.get(&line.name, &line.bus0)?;
        let b1 = buses.get(&line.name, &line.bus1)?;
        for t in 0..n_t {
            let f = model.require_var(&VarKey::LineFlow(line.name.clone(), t))?;
            terms[row(b0, t)].push((f, -1.0));
            terms[row(b1, t)].push((f, 1.0));
        }
    }
    for link in &network.links {
        let b0 = buses.get(&link.name, &link.bus0)?;
        let b1 = buses.get(&link.name, &link.bus1)?;
        for t in 0..n_t {
            let f = model.require_var(&VarKey::LinkFlow(link.name.clone(), t))?;
            terms[row(b0, t)].push((f, -1.0));
            terms[row(b1, t)].push((f, link.efficiency));
        }
    }

    Ok(terms
        .into_iter()
        .zip(rhs)
        .filter(|(terms, rhs)| !terms.is_empty() || *rhs != 0.0)
        .map(|(terms, rhs)| LinearConstraint::new(terms, Sense::Eq, rhs))
        .collect())
}

pub fn generator_limits(network: &Network, model: &LpModel) -> Result<Vec<LinearConstraint>, LopfError> {
    let mut rows = Vec::new();
    for gen in network.generators.iter().filter(|g| g.p_nom_extendable) {
        let p_nom = model.require_var(&VarKey::GeneratorPNom(gen.name.clone()))?;
        for t in 0..network.snapshots.len() {
            let p = model.require_var(&VarKey::GeneratorP(gen.name.clone(), t))?;
            rows.push(LinearConstraint::new(
                vec![(p, 1.0), (p_nom, -gen.p_max_pu_at(t))],
                Sense::Le,
                0.0,
            ));
            rows.push(LinearConstraint::new(
                vec![(p, 1.0), (p_nom, -gen.p_min_pu)],
                Sense::Ge,
                0.0,
            ));
        }
    }
    Ok(rows)
}

pub fn storage_limits(network: &Network, model: &LpModel) -> Result<Vec<LinearConstraint>, LopfError> {
    let mut rows = Vec::new();
    for su in network.storage_units.iter().filter(|s| s.p_nom_extendable) {
        let p_nom = model.require_var(&VarKey::StoragePNom(su.name.clone()))?;
        for t in 0..network.snapshots.len() {
            let dispatch = model.require_var(&VarKey::StorageDispatch(su.name.clone(), t))?;
            let store = model.require_var(&VarKey::StorageStore(su.name.clone(), t))?;
            let soc = model.require_var(&VarKey::StorageSoc(su.name.clone(), t))?;
            rows.push(LinearConstraint::new(vec![(dispatch, 1.0), (p_nom, -1.0)], Sense::Le, 0.0));
            rows.push(LinearConstraint::new(vec![(store, 1.0), (p_nom, -1.0)], Sense::Le, 0.0));
            rows.push(LinearConstraint::new(
                vec![(soc, 1.0), (p_nom, -su.max_hours)],
                Sense::Le,
                0.0,
            ));
        }
    }
    Ok(rows)
}

/// State-of-charge bookkeeping between consecutive snapshots.
///
/// `soc[t] = keep·soc[t-1] + w·(η_store·store − dispatch/η_dispatch + inflow − spill)`
/// with `keep = (1 − standing_loss)^w`; the first snapshot starts from the
/// initial state, or from the last one when cyclic.
pub fn storage_consistency(
    network: &Network,
    model: &LpModel,
) -> Result<Vec<LinearConstraint>, LopfError> {
    let n_t = network.snapshots.len();
    let mut rows = Vec::new();
    for su in &network.storage_units {
        if su.efficiency_dispatch <= 0.0 {
            return Err(GridError::Validation(format!(
                "storage unit {} has non-positive dispatch efficiency",
                su.name
            ))
            .into());
        }
        for t in 0..n_t {
            let w = network.snapshots[t].weighting;
            let keep = (1.0 - su.standing_loss).powf(w);
            let soc = |t: usize| model.require_var(&VarKey::StorageSoc(su.name.clone(), t));

            let mut terms = vec![(soc(t)?, 1.0)];
            let mut rhs = w * su.inflow_at(t);
            if t > 0 {
                terms.push((soc(t - 1)?, -keep));
            } else if su.cyclic_state_of_charge {
                terms.push((soc(n_t - 1)?, -keep));
            } else {
                rhs += keep * su.state_of_charge_initial;
            }
            terms.push((
                model.require_var(&VarKey::StorageStore(su.name.clone(), t))?,
                -w * su.efficiency_store,
            ));
            terms.push((
                model.require_var(&VarKey::StorageDispatch(su.name.clone(), t))?,
                w / su.efficiency_dispatch,
            ));
            terms.push((model.require_var(&VarKey::StorageSpill(su.name.clone(), t))?, w));
            rows.push(LinearConstraint::new(terms, Sense::Eq, rhs));
        }
    }
    Ok(rows)
}

pub fn link_limits(network: &Network, model: &LpModel) -> Result<Vec<LinearConstraint>, LopfError> {
    let mut rows = Vec::new();
    for link in network.links.iter().filter(|l| l.p_nom_extendable) {
        let p_nom = model.require_var(&VarKey::LinkPNom(link.name.clone()))?;
        for t in 0..network.snapshots.len() {
            let f = model.require_var(&VarKey::LinkFlow(link.name.clone(), t))?;
            rows.push(LinearConstraint::new(vec![(f, 1.0), (p_nom, -1.0)], Sense::Le, 0.0));
            rows.push(LinearConstraint::new(
                vec![(f, 1.0), (p_nom, -link.p_min_pu)],
                Sense::Ge,
                0.0,
            ));
        }
    }
    Ok(rows)
}

/// `|flow| ≤ s_nom` for extendable lines; fixed lines carry the limit as bounds.
pub fn line_limits(network: &Network, model: &LpModel) -> Result<Vec<LinearConstraint>, LopfError> {
    let mut rows = Vec::new();
    for line in network.lines.iter().filter(|l| l.s_nom_extendable) {
        let s_nom = model.require_var(&VarKey::LineSNom(line.name.clone()))?;
        for t in 0..network.snapshots.len() {
            let f = model.require_var(&VarKey::LineFlow(line.name.clone(), t))?;
            rows.push(LinearConstraint::new(vec![(f, 1.0), (s_nom, -1.0)], Sense::Le, 0.0));
            rows.push(LinearConstraint::new(vec![(f, 1.0), (s_nom, 1.0)], Sense::Ge, 0.0));
        }
    }
    Ok(rows)
}

pub fn carrier_min_capacity(
    network: &Network,
    model: &LpModel,
    extra: &ExtraConstraints,
) -> Result<Vec<LinearConstraint>, LopfError> {
    let mut rows = Vec::new();
    for (carrier, &minimum) in &extra.min_capacities {
        let mut terms = Vec::new();
        for gen in network
            .generators
            .iter()
            .filter(|g| g.p_nom_extendable && &g.carrier == carrier)
        {
            terms.push((model.require_var(&VarKey::GeneratorPNom(gen.name.clone()))?, 1.0));
        }
        if terms.is_empty() {
            warn!(carrier = %carrier, minimum, "no extendable generators for minimum capacity; skipped");
            continue;
        }
        rows.push(LinearConstraint::new(terms, Sense::Ge, minimum));
    }
    Ok(rows)
}
