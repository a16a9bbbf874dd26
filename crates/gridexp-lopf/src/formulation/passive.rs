//! Passive branch physics, the impedance-dependent part of the model.

use crate::error::LopfError;
use crate::model::{LinearConstraint, LpModel, Sense, VarKey};
use gridexp_core::{cycle_basis, GridError, Network};

/// Angle formulation: `f = v_nom² / x · (θ0 − θ1)` for every line and snapshot.
pub fn branch_flows(network: &Network, model: &LpModel) -> Result<Vec<LinearConstraint>, LopfError> {
    let n_t = network.snapshots.len();
    let mut rows = Vec::with_capacity(network.lines.len() * n_t);
    for line in &network.lines {
        if line.x == 0.0 {
            return Err(GridError::Validation(format!(
                "line {} has zero reactance; its flow is undefined in the angle formulation",
                line.name
            ))
            .into());
        }
        let v_nom = network.bus_v_nom(&line.bus0).value();
        let susceptance = v_nom * v_nom / line.x;
        for t in 0..n_t {
            let f = model.require_var(&VarKey::LineFlow(line.name.clone(), t))?;
            let theta0 = model.require_var(&VarKey::BusAngle(line.bus0.clone(), t))?;
            let theta1 = model.require_var(&VarKey::BusAngle(line.bus1.clone(), t))?;
            rows.push(LinearConstraint::new(
                vec![(f, 1.0), (theta0, -susceptance), (theta1, susceptance)],
                Sense::Eq,
                0.0,
            ));
        }
    }
    Ok(rows)
}

/// Kirchhoff formulation: `Σ dir · x_eff · f = 0` around each fundamental cycle.
///
/// `x_eff = x / v_nom²` puts lines at different voltage levels on a common
/// base. Each cycle row is scaled so its largest coefficient is one.
pub fn cycle_constraints(
    network: &Network,
    model: &LpModel,
) -> Result<Vec<LinearConstraint>, LopfError> {
    let n_t = network.snapshots.len();
    let mut rows = Vec::new();
    for cycle in cycle_basis(network) {
        let coefficients: Vec<(usize, f64)> = cycle
            .branches
            .iter()
            .map(|&(l, direction)| {
                let line = &network.lines[l];
                let v_nom = network.bus_v_nom(&line.bus0).value();
                (l, direction * line.x / (v_nom * v_nom))
            })
            .collect();
        let scale = coefficients.iter().map(|(_, c)| c.abs()).fold(0.0, f64::max);
        if scale == 0.0 {
            continue;
        }
        for t in 0..n_t {
            let mut terms = Vec::with_capacity(coefficients.len());
            for &(l, c) in &coefficients {
                let f = model.require_var(&VarKey::LineFlow(network.lines[l].name.clone(), t))?;
                terms.push((f, c / scale));
            }
            rows.push(LinearConstraint::new(terms, Sense::Eq, 0.0));
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formulation::{declare_variables, Formulation};
    use gridexp_core::{Bus, Line, Snapshot};

    fn ring(x: [f64; 3]) -> Network {
        let mut n = Network::new("ring");
        for b in ["a", "b", "c"] {
            n.buses.push(Bus::new(b, 380.0));
        }
        n.lines.push(Line::new("ab", "a", "b").with_impedance(0.0, x[0]).with_s_nom(100.0));
        n.lines.push(Line::new("bc", "b", "c").with_impedance(0.0, x[1]).with_s_nom(100.0));
        n.lines.push(Line::new("ca", "c", "a").with_impedance(0.0, x[2]).with_s_nom(100.0));
        n.set_snapshots(Snapshot::hourly_from_ymd(2013, 1, 1, 1));
        n
    }

    fn declared(n: &Network, f: Formulation) -> LpModel {
        let mut model = LpModel::new(f);
        declare_variables(n, &mut model).unwrap();
        model
    }

    #[test]
    fn test_cycle_row_is_normalized() {
        let n = ring([10.0, 20.0, 40.0]);
        let model = declared(&n, Formulation::Kirchhoff);
        let rows = cycle_constraints(&n, &model).unwrap();
        assert_eq!(rows.len(), 1);
        let max = rows[0].terms.iter().map(|(_, c)| c.abs()).fold(0.0, f64::max);
        assert!((max - 1.0).abs() < 1e-12);
        let mut mags: Vec<f64> = rows[0].terms.iter().map(|(_, c)| c.abs()).collect();
        mags.sort_by(|a, b| a.total_cmp(b));
        assert!((mags[0] - 0.25).abs() < 1e-12);
        assert!((mags[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_cycle_row_accepts_physical_flows() {
        // Angles 0, -0.1, -0.3 produce flows that satisfy KVL
        let x = [10.0, 20.0, 40.0];
        let n = ring(x);
        let model = declared(&n, Formulation::Kirchhoff);
        let rows = cycle_constraints(&n, &model).unwrap();
        let theta = [0.0, -0.1, -0.3];
        let ends = [(0, 1), (1, 2), (2, 0)];
        let mut values = vec![0.0; model.num_variables()];
        for (l, (a, b)) in ends.iter().enumerate() {
            let i = model.var(&VarKey::LineFlow(n.lines[l].name.clone(), 0)).unwrap();
            values[i] = 380.0 * 380.0 / x[l] * (theta[*a] - theta[*b]);
        }
        assert!(rows[0].lhs(&values).abs() < 1e-9);
    }

    #[test]
    fn test_angle_rows_reference_both_ends() {
        let n = ring([10.0, 20.0, 40.0]);
        let model = declared(&n, Formulation::Angles);
        let rows = branch_flows(&n, &model).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].terms[1].1, -380.0 * 380.0 / 10.0);
    }

    #[test]
    fn test_zero_reactance_rejected_for_angles() {
        let n = ring([0.0, 20.0, 40.0]);
        let model = declared(&n, Formulation::Angles);
        assert!(branch_flows(&n, &model).is_err());
    }
}
