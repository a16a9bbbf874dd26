//! Line parameter updates driven by solved capacities.
//!
//! Impedance of an untyped line scales inversely with capacity; a typed line
//! instead changes its circuit count and re-derives impedance and rating from
//! its template. All scaling is relative to the parameters captured when the
//! loop started, so repeated updates never compound rounding.

use crate::error::LopfError;
use gridexp_core::Network;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct LineBaseline {
    pub r: f64,
    pub x: f64,
    pub num_parallel: f64,
    /// Rating at capture time; the derived rating for typed lines
    pub s_nom: f64,
    pub typed: bool,
    pub extendable: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchBaseline {
    lines: BTreeMap<String, LineBaseline>,
}

impl BranchBaseline {
    pub fn capture(network: &Network) -> Result<Self, LopfError> {
        let mut lines = BTreeMap::new();
        for line in &network.lines {
            lines.insert(
                line.name.clone(),
                LineBaseline {
                    r: line.r,
                    x: line.x,
                    num_parallel: line.num_parallel,
                    s_nom: network.line_rating(line)?,
                    typed: line.is_typed(),
                    extendable: line.s_nom_extendable,
                },
            );
        }
        Ok(Self { lines })
    }

    pub fn get(&self, line: &str) -> Option<&LineBaseline> {
        self.lines.get(line)
    }

    /// Captured ratings in the network's current line order.
    pub fn nominal_capacities(&self, network: &Network) -> Vec<f64> {
        network
            .lines
            .iter()
            .map(|l| self.lines.get(&l.name).map_or(l.s_nom, |b| b.s_nom))
            .collect()
    }

    /// Rescale extendable lines to their solved capacity, then recompute
    /// dependent values. Returns the number of lines updated.
    ///
    /// Lines solved to zero, and lines captured with zero rating, keep their
    /// current parameters.
    pub fn rescale(&self, network: &mut Network) -> Result<usize, LopfError> {
        let mut updated = 0;
        for line in network.lines.iter_mut().filter(|l| l.s_nom_extendable) {
            let Some(base) = self.lines.get(&line.name) else {
                continue;
            };
            if line.s_nom_opt <= 0.0 || base.s_nom <= 0.0 {
                continue;
            }
            if base.typed {
                line.num_parallel = base.num_parallel * line.s_nom_opt / base.s_nom;
                debug!(line = %line.name, num_parallel = line.num_parallel, "updated circuit count");
            } else {
                let ratio = base.s_nom / line.s_nom_opt;
                line.r = base.r * ratio;
                line.x = base.x * ratio;
            }
            updated += 1;
        }
        network.calculate_dependent_values()?;
        Ok(updated)
    }
}
