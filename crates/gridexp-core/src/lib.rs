//! # gridexp-core: Network Model for Capacity Expansion
//!
//! Provides the network data model consumed and mutated by the iterative
//! linear optimal power flow (LOPF) expansion loop in `gridexp-lopf`.
//!
//! ## Design Philosophy
//!
//! The model is column-oriented in spirit: every component kind lives in its
//! own `Vec`, components reference buses by name, and solved values are
//! written back into result fields on the same structs (`s_nom_opt`,
//! `p_nom_opt`, dispatch series). A network is therefore a complete,
//! serializable snapshot of both inputs and results, which is what the
//! checkpoint and backup artifacts rely on.
//!
//! - **Buses** carry nominal voltage.
//! - **Lines** are passive AC branches; they may reference a [`LineType`]
//!   template, in which case impedance and rating are derived quantities.
//! - **Links** are controllable DC branches (HVDC, converters).
//! - **Generators**, **storage units** and **loads** attach to buses.
//! - **Snapshots** carry a timestamp and a weighting in hours.
//!
//! ## Quick Start
//!
//! ```rust
//! use gridexp_core::*;
//!
//! let mut network = Network::new("two-bus");
//! network.buses.push(Bus::new("north", 380.0));
//! network.buses.push(Bus::new("south", 380.0));
//! network.lines.push(
//!     Line::new("north-south", "north", "south")
//!         .with_impedance(0.01, 0.1)
//!         .with_s_nom(100.0)
//!         .extendable(250.0),
//! );
//! network.set_snapshots(Snapshot::hourly_from_ymd(2013, 1, 1, 3));
//! network.validate_references().unwrap();
//! assert_eq!(network.extendable_line_count(), 1);
//! ```
//!
//! ## Modules
//!
//! - [`graph_utils`] - Sub-networks and cycle basis over the line graph
//! - [`io`] - JSON (de)serialization of full network state
//! - [`units`] - Unit wrappers used by the typed-line rating invariant

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub mod error;
pub mod graph_utils;
pub mod io;
pub mod units;

pub use error::{GridError, GridResult};
pub use graph_utils::{cycle_basis, sub_networks, Cycle, SubNetwork};
pub use units::{three_phase_rating, Kiloamperes, Kilovolts, MegavoltAmperes};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Bus {
    pub name: String,
    /// Nominal line-to-line voltage
    pub v_nom: Kilovolts,
    pub carrier: String,
    /// Geographic coordinates (informational)
    pub x: f64,
    pub y: f64,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            name: String::new(),
            v_nom: Kilovolts(1.0),
            carrier: "AC".to_string(),
            x: 0.0,
            y: 0.0,
        }
    }
}

impl Bus {
    pub fn new(name: impl Into<String>, v_nom_kv: f64) -> Self {
        Self {
            name: name.into(),
            v_nom: Kilovolts(v_nom_kv),
            ..Self::default()
        }
    }
}

/// Per-circuit electrical template for typed lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineType {
    pub name: String,
    /// Nominal current of one circuit
    pub i_nom: Kiloamperes,
    /// Series resistance per km of one circuit (Ohm/km)
    pub r_per_length: f64,
    /// Series reactance per km of one circuit (Ohm/km)
    pub x_per_length: f64,
}

impl LineType {
    pub fn new(name: impl Into<String>, i_nom_ka: f64, r_per_length: f64, x_per_length: f64) -> Self {
        Self {
            name: name.into(),
            i_nom: Kiloamperes(i_nom_ka),
            r_per_length,
            x_per_length,
        }
    }

    /// Rating of `num_parallel` circuits at the given voltage.
    pub fn rating(&self, v_nom: Kilovolts, num_parallel: f64) -> MegavoltAmperes {
        three_phase_rating(self.i_nom, v_nom) * num_parallel
    }
}

/// Passive AC branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Line {
    pub name: String,
    pub bus0: String,
    pub bus1: String,
    /// Name of a [`LineType`]; `None` for untyped lines
    pub line_type: Option<String>,
    /// Length in km
    pub length: f64,
    /// Nominal apparent power rating (MVA)
    pub s_nom: f64,
    pub s_nom_extendable: bool,
    pub s_nom_min: f64,
    /// Upper bound on the extendable rating; `None` is unbounded
    pub s_nom_max: Option<f64>,
    /// Series resistance (Ohm)
    pub r: f64,
    /// Series reactance (Ohm)
    pub x: f64,
    pub num_parallel: f64,
    /// Annualized investment cost per MVA
    pub capital_cost: f64,
    /// Solved rating
    pub s_nom_opt: f64,
    /// Solved active power flow bus0 -> bus1 per snapshot
    pub p0: Vec<f64>,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus0: String::new(),
            bus1: String::new(),
            line_type: None,
            length: 0.0,
            s_nom: 0.0,
            s_nom_extendable: false,
            s_nom_min: 0.0,
            s_nom_max: None,
            r: 0.0,
            x: 0.0,
            num_parallel: 1.0,
            capital_cost: 0.0,
            s_nom_opt: 0.0,
            p0: Vec::new(),
        }
    }
}

impl Line {
    pub fn new(name: impl Into<String>, bus0: impl Into<String>, bus1: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bus0: bus0.into(),
            bus1: bus1.into(),
            ..Self::default()
        }
    }

    pub fn with_impedance(mut self, r: f64, x: f64) -> Self {
        self.r = r;
        self.x = x;
        self
    }

    pub fn with_s_nom(mut self, s_nom: f64) -> Self {
        self.s_nom = s_nom;
        self.s_nom_opt = s_nom;
        self
    }

    pub fn with_length(mut self, length_km: f64) -> Self {
        self.length = length_km;
        self
    }

    /// Reference a line type; impedance and rating follow from the template.
    pub fn with_type(mut self, line_type: impl Into<String>, num_parallel: f64) -> Self {
        self.line_type = Some(line_type.into());
        self.num_parallel = num_parallel;
        self
    }

    /// Make the rating a decision variable with the given annualized cost.
    pub fn extendable(mut self, capital_cost: f64) -> Self {
        self.s_nom_extendable = true;
        self.capital_cost = capital_cost;
        self
    }

    pub fn with_s_nom_max(mut self, s_nom_max: f64) -> Self {
        self.s_nom_max = Some(s_nom_max);
        self
    }

    #[inline]
    pub fn is_typed(&self) -> bool {
        self.line_type.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Controllable branch (HVDC link, converter).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Link {
    pub name: String,
    pub bus0: String,
    pub bus1: String,
    pub length: f64,
    /// Nominal active power rating (MW)
    pub p_nom: f64,
    pub p_nom_extendable: bool,
    pub p_nom_min: f64,
    pub p_nom_max: Option<f64>,
    /// Minimum dispatch per unit of `p_nom`; -1 makes the link bidirectional
    pub p_min_pu: f64,
    pub efficiency: f64,
    pub capital_cost: f64,
    pub marginal_cost: f64,
    /// Share of the route that is submarine cable
    pub underwater_fraction: f64,
    pub p_nom_opt: f64,
    /// Solved withdrawal at bus0 per snapshot
    pub p0: Vec<f64>,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus0: String::new(),
            bus1: String::new(),
            length: 0.0,
            p_nom: 0.0,
            p_nom_extendable: false,
            p_nom_min: 0.0,
            p_nom_max: None,
            p_min_pu: -1.0,
            efficiency: 1.0,
            capital_cost: 0.0,
            marginal_cost: 0.0,
            underwater_fraction: 0.0,
            p_nom_opt: 0.0,
            p0: Vec::new(),
        }
    }
}

impl Link {
    pub fn new(name: impl Into<String>, bus0: impl Into<String>, bus1: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bus0: bus0.into(),
            bus1: bus1.into(),
            ..Self::default()
        }
    }

    pub fn with_p_nom(mut self, p_nom: f64) -> Self {
        self.p_nom = p_nom;
        self.p_nom_opt = p_nom;
        self
    }

    pub fn extendable(mut self, capital_cost: f64) -> Self {
        self.p_nom_extendable = true;
        self.capital_cost = capital_cost;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Generator {
    pub name: String,
    pub bus: String,
    pub carrier: String,
    pub p_nom: f64,
    pub p_nom_extendable: bool,
    pub p_nom_min: f64,
    pub p_nom_max: Option<f64>,
    pub p_min_pu: f64,
    /// Static availability per unit of `p_nom`
    pub p_max_pu: f64,
    /// Availability series; overrides `p_max_pu` when present
    pub p_max_pu_t: Option<Vec<f64>>,
    /// Cost per MWh
    pub marginal_cost: f64,
    pub capital_cost: f64,
    pub p_nom_opt: f64,
    /// Solved dispatch per snapshot
    pub p: Vec<f64>,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus: String::new(),
            carrier: String::new(),
            p_nom: 0.0,
            p_nom_extendable: false,
            p_nom_min: 0.0,
            p_nom_max: None,
            p_min_pu: 0.0,
            p_max_pu: 1.0,
            p_max_pu_t: None,
            marginal_cost: 0.0,
            capital_cost: 0.0,
            p_nom_opt: 0.0,
            p: Vec::new(),
        }
    }
}

impl Generator {
    pub fn new(name: impl Into<String>, bus: impl Into<String>, carrier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            carrier: carrier.into(),
            ..Self::default()
        }
    }

    pub fn with_p_nom(mut self, p_nom: f64) -> Self {
        self.p_nom = p_nom;
        self.p_nom_opt = p_nom;
        self
    }

    pub fn with_marginal_cost(mut self, marginal_cost: f64) -> Self {
        self.marginal_cost = marginal_cost;
        self
    }

    pub fn extendable(mut self, capital_cost: f64) -> Self {
        self.p_nom_extendable = true;
        self.capital_cost = capital_cost;
        self
    }

    pub fn with_availability(mut self, p_max_pu_t: Vec<f64>) -> Self {
        self.p_max_pu_t = Some(p_max_pu_t);
        self
    }

    /// Availability per unit of `p_nom` at snapshot `t`.
    pub fn p_max_pu_at(&self, t: usize) -> f64 {
        self.p_max_pu_t
            .as_ref()
            .and_then(|series| series.get(t).copied())
            .unwrap_or(self.p_max_pu)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageUnit {
    pub name: String,
    pub bus: String,
    pub carrier: String,
    pub p_nom: f64,
    pub p_nom_extendable: bool,
    pub p_nom_min: f64,
    pub p_nom_max: Option<f64>,
    /// Energy capacity in hours at full power
    pub max_hours: f64,
    pub efficiency_store: f64,
    pub efficiency_dispatch: f64,
    /// Fraction of state of charge lost per hour
    pub standing_loss: f64,
    pub cyclic_state_of_charge: bool,
    pub state_of_charge_initial: f64,
    /// Natural inflow (MW) per snapshot, e.g. hydro reservoirs
    pub inflow: Option<Vec<f64>>,
    pub marginal_cost: f64,
    pub capital_cost: f64,
    pub p_nom_opt: f64,
    /// Solved net dispatch (discharge minus charge) per snapshot
    pub p: Vec<f64>,
    pub state_of_charge: Vec<f64>,
    pub spill: Vec<f64>,
}

impl Default for StorageUnit {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus: String::new(),
            carrier: String::new(),
            p_nom: 0.0,
            p_nom_extendable: false,
            p_nom_min: 0.0,
            p_nom_max: None,
            max_hours: 1.0,
            efficiency_store: 1.0,
            efficiency_dispatch: 1.0,
            standing_loss: 0.0,
            cyclic_state_of_charge: false,
            state_of_charge_initial: 0.0,
            inflow: None,
            marginal_cost: 0.0,
            capital_cost: 0.0,
            p_nom_opt: 0.0,
            p: Vec::new(),
            state_of_charge: Vec::new(),
            spill: Vec::new(),
        }
    }
}

impl StorageUnit {
    pub fn new(name: impl Into<String>, bus: impl Into<String>, carrier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            carrier: carrier.into(),
            ..Self::default()
        }
    }

    pub fn inflow_at(&self, t: usize) -> f64 {
        self.inflow
            .as_ref()
            .and_then(|series| series.get(t).copied())
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Load {
    pub name: String,
    pub bus: String,
    /// Demand (MW) per snapshot
    pub p_set: Vec<f64>,
}

impl Load {
    pub fn new(name: impl Into<String>, bus: impl Into<String>, p_set: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            bus: bus.into(),
            p_set,
        }
    }

    pub fn p_at(&self, t: usize) -> f64 {
        self.p_set.get(t).copied().unwrap_or(0.0)
    }
}

/// A modelled point in time and the number of hours it represents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: NaiveDateTime,
    pub weighting: f64,
}

impl Snapshot {
    /// `count` consecutive hourly snapshots with weighting 1.
    pub fn hourly(start: NaiveDateTime, count: usize) -> Vec<Snapshot> {
        (0..count)
            .map(|h| Snapshot {
                timestamp: start + Duration::hours(h as i64),
                weighting: 1.0,
            })
            .collect()
    }

    /// Hourly snapshots starting at midnight of the given date.
    ///
    /// Falls back to the Unix epoch for an invalid date.
    pub fn hourly_from_ymd(year: i32, month: u32, day: u32, count: usize) -> Vec<Snapshot> {
        let start = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        Self::hourly(start, count)
    }
}

/// Counts reported by [`Network::stats`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NetworkStats {
    pub num_buses: usize,
    pub num_lines: usize,
    pub num_extendable_lines: usize,
    pub num_links: usize,
    pub num_extendable_links: usize,
    pub num_generators: usize,
    pub num_storage_units: usize,
    pub num_snapshots: usize,
    /// Weighted demand over all snapshots (MWh)
    pub total_energy_demand: f64,
}

/// The complete network: inputs plus solved result columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub name: String,
    pub buses: Vec<Bus>,
    pub line_types: Vec<LineType>,
    pub lines: Vec<Line>,
    pub links: Vec<Link>,
    pub generators: Vec<Generator>,
    pub storage_units: Vec<StorageUnit>,
    pub loads: Vec<Load>,
    pub snapshots: Vec<Snapshot>,
    /// Objective value of the last accepted solve
    pub objective: Option<f64>,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn set_snapshots(&mut self, snapshots: Vec<Snapshot>) {
        self.snapshots = snapshots;
    }

    pub fn bus_index(&self, name: &str) -> Option<usize> {
        self.buses.iter().position(|b| b.name == name)
    }

    pub fn bus(&self, name: &str) -> Option<&Bus> {
        self.buses.iter().find(|b| b.name == name)
    }

    pub fn line_type(&self, name: &str) -> Option<&LineType> {
        self.line_types.iter().find(|t| t.name == name)
    }

    pub fn line(&self, name: &str) -> Option<&Line> {
        self.lines.iter().find(|l| l.name == name)
    }

    pub fn line_mut(&mut self, name: &str) -> Option<&mut Line> {
        self.lines.iter_mut().find(|l| l.name == name)
    }

    pub fn link(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.name == name)
    }

    /// Nominal voltage at a bus, 1 kV when the bus is unknown.
    pub fn bus_v_nom(&self, name: &str) -> Kilovolts {
        self.bus(name).map(|b| b.v_nom).unwrap_or(Kilovolts(1.0))
    }

    pub fn extendable_line_count(&self) -> usize {
        self.lines.iter().filter(|l| l.s_nom_extendable).count()
    }

    pub fn has_extendable_lines(&self) -> bool {
        self.lines.iter().any(|l| l.s_nom_extendable)
    }

    /// Rating implied by the line's parameters.
    ///
    /// Typed lines: `√3 · i_nom(type) · v_nom(bus0) · num_parallel`.
    /// Untyped lines: `s_nom` as given.
    pub fn line_rating(&self, line: &Line) -> GridResult<f64> {
        match line.line_type.as_deref().filter(|t| !t.is_empty()) {
            Some(type_name) => {
                let template = self.line_type(type_name).ok_or_else(|| {
                    GridError::Network(format!(
                        "line {} references unknown line type '{}'",
                        line.name, type_name
                    ))
                })?;
                Ok(template
                    .rating(self.bus_v_nom(&line.bus0), line.num_parallel)
                    .value())
            }
            None => Ok(line.s_nom),
        }
    }

    /// Recompute values derived from line types and circuit counts.
    ///
    /// For typed lines `r`, `x` follow from the per-length template divided by
    /// `num_parallel`, and `s_nom` from the rating invariant. A line with zero
    /// circuits keeps its last finite impedance.
    pub fn calculate_dependent_values(&mut self) -> GridResult<()> {
        for i in 0..self.lines.len() {
            let line = &self.lines[i];
            let Some(type_name) = line.line_type.as_deref().filter(|t| !t.is_empty()) else {
                continue;
            };
            let template = self.line_type(type_name).cloned().ok_or_else(|| {
                GridError::Network(format!(
                    "line {} references unknown line type '{}'",
                    line.name, type_name
                ))
            })?;
            let v_nom = self.bus_v_nom(&line.bus0);

            let line = &mut self.lines[i];
            line.s_nom = template.rating(v_nom, line.num_parallel).value();
            if line.num_parallel > 0.0 {
                line.r = template.r_per_length * line.length / line.num_parallel;
                line.x = template.x_per_length * line.length / line.num_parallel;
            }
        }
        Ok(())
    }

    /// Remove lines by name. Returns the number removed.
    pub fn remove_lines(&mut self, names: &[String]) -> usize {
        let before = self.lines.len();
        self.lines.retain(|l| !names.contains(&l.name));
        before - self.lines.len()
    }

    /// Remove links by name. Returns the number removed.
    pub fn remove_links(&mut self, names: &[String]) -> usize {
        let before = self.links.len();
        self.links.retain(|l| !names.contains(&l.name));
        before - self.links.len()
    }

    /// Keep only the first `count` snapshots, trimming every series with them.
    pub fn truncate_snapshots(&mut self, count: usize) {
        self.snapshots.truncate(count);
        for load in &mut self.loads {
            load.p_set.truncate(count);
        }
        for gen in &mut self.generators {
            if let Some(series) = gen.p_max_pu_t.as_mut() {
                series.truncate(count);
            }
            gen.p.truncate(count);
        }
        for su in &mut self.storage_units {
            if let Some(series) = su.inflow.as_mut() {
                series.truncate(count);
            }
            su.p.truncate(count);
            su.state_of_charge.truncate(count);
            su.spill.truncate(count);
        }
        for line in &mut self.lines {
            line.p0.truncate(count);
        }
        for link in &mut self.links {
            link.p0.truncate(count);
        }
    }

    /// Check that every component references an existing bus or line type and
    /// that input series match the snapshot count.
    pub fn validate_references(&self) -> GridResult<()> {
        let n_t = self.snapshots.len();
        let check_bus = |owner: &str, bus: &str| -> GridResult<()> {
            if self.bus(bus).is_none() {
                return Err(GridError::Validation(format!(
                    "{} references unknown bus '{}'",
                    owner, bus
                )));
            }
            Ok(())
        };
        let check_len = |owner: &str, len: usize| -> GridResult<()> {
            if len != n_t {
                return Err(GridError::Validation(format!(
                    "{} has {} values but the network has {} snapshots",
                    owner, len, n_t
                )));
            }
            Ok(())
        };

        for line in &self.lines {
            check_bus(&format!("line {}", line.name), &line.bus0)?;
            check_bus(&format!("line {}", line.name), &line.bus1)?;
            if let Some(t) = line.line_type.as_deref().filter(|t| !t.is_empty()) {
                if self.line_type(t).is_none() {
                    return Err(GridError::Validation(format!(
                        "line {} references unknown line type '{}'",
                        line.name, t
                    )));
                }
            }
        }
        for link in &self.links {
            check_bus(&format!("link {}", link.name), &link.bus0)?;
            check_bus(&format!("link {}", link.name), &link.bus1)?;
        }
        for gen in &self.generators {
            check_bus(&format!("generator {}", gen.name), &gen.bus)?;
            if let Some(series) = &gen.p_max_pu_t {
                check_len(&format!("generator {} p_max_pu", gen.name), series.len())?;
            }
        }
        for su in &self.storage_units {
            check_bus(&format!("storage unit {}", su.name), &su.bus)?;
            if let Some(series) = &su.inflow {
                check_len(&format!("storage unit {} inflow", su.name), series.len())?;
            }
        }
        for load in &self.loads {
            check_bus(&format!("load {}", load.name), &load.bus)?;
            check_len(&format!("load {} p_set", load.name), load.p_set.len())?;
        }
        Ok(())
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            num_buses: self.buses.len(),
            num_lines: self.lines.len(),
            num_extendable_lines: self.extendable_line_count(),
            num_links: self.links.len(),
            num_extendable_links: self.links.iter().filter(|l| l.p_nom_extendable).count(),
            num_generators: self.generators.len(),
            num_storage_units: self.storage_units.len(),
            num_snapshots: self.snapshots.len(),
            total_energy_demand: self
                .snapshots
                .iter()
                .enumerate()
                .map(|(t, s)| s.weighting * self.loads.iter().map(|l| l.p_at(t)).sum::<f64>())
                .sum(),
        }
    }
}
