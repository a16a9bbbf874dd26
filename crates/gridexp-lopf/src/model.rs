//! Engine-independent linear program.
//!
//! The formulation layer writes variables and constraints here; engines
//! translate the model into their own representation on every solve. Keeping
//! constraints grouped by [`ConstraintGroup`] is what makes incremental
//! updates possible: a group can be replaced or dropped without touching any
//! other row.

use crate::error::LopfError;
use crate::formulation::Formulation;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identity of a decision variable, by component name and snapshot index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarKey {
    LineSNom(String),
    LinkPNom(String),
    GeneratorPNom(String),
    StoragePNom(String),
    GeneratorP(String, usize),
    StorageDispatch(String, usize),
    StorageStore(String, usize),
    StorageSoc(String, usize),
    StorageSpill(String, usize),
    LineFlow(String, usize),
    LinkFlow(String, usize),
    BusAngle(String, usize),
}

impl fmt::Display for VarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarKey::LineSNom(n) => write!(f, "Line-s_nom[{}]", n),
            VarKey::LinkPNom(n) => write!(f, "Link-p_nom[{}]", n),
            VarKey::GeneratorPNom(n) => write!(f, "Generator-p_nom[{}]", n),
            VarKey::StoragePNom(n) => write!(f, "StorageUnit-p_nom[{}]", n),
            VarKey::GeneratorP(n, t) => write!(f, "Generator-p[{},{}]", n, t),
            VarKey::StorageDispatch(n, t) => write!(f, "StorageUnit-p_dispatch[{},{}]", n, t),
            VarKey::StorageStore(n, t) => write!(f, "StorageUnit-p_store[{},{}]", n, t),
            VarKey::StorageSoc(n, t) => write!(f, "StorageUnit-state_of_charge[{},{}]", n, t),
            VarKey::StorageSpill(n, t) => write!(f, "StorageUnit-spill[{},{}]", n, t),
            VarKey::LineFlow(n, t) => write!(f, "Line-s[{},{}]", n, t),
            VarKey::LinkFlow(n, t) => write!(f, "Link-p[{},{}]", n, t),
            VarKey::BusAngle(n, t) => write!(f, "Bus-v_ang[{},{}]", n, t),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableSpec {
    pub key: VarKey,
    pub lower: f64,
    pub upper: f64,
    /// Objective coefficient
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

/// `Σ coef · x[var] (sense) rhs`, with variables referenced by model index.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub terms: Vec<(usize, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn new(terms: Vec<(usize, f64)>, sense: Sense, rhs: f64) -> Self {
        Self { terms, sense, rhs }
    }

    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(i, a)| a * values.get(i).copied().unwrap_or(0.0))
            .sum()
    }

    /// Violation scaled by the magnitude of the row.
    pub fn relative_violation(&self, values: &[f64]) -> f64 {
        let lhs = self.lhs(values);
        let raw = match self.sense {
            Sense::Le => (lhs - self.rhs).max(0.0),
            Sense::Ge => (self.rhs - lhs).max(0.0),
            Sense::Eq => (lhs - self.rhs).abs(),
        };
        let scale = self
            .terms
            .iter()
            .map(|&(i, a)| (a * values.get(i).copied().unwrap_or(0.0)).abs())
            .fold(self.rhs.abs().max(1.0), f64::max);
        raw / scale
    }
}

/// Independently replaceable blocks of constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintGroup {
    PowerBalance,
    GeneratorLimits,
    StorageLimits,
    StorageConsistency,
    LinkLimits,
    LineLimits,
    /// Angle formulation: line flow equals susceptance times angle difference
    PassiveBranchFlows,
    /// Kirchhoff formulation: reactance-weighted flows sum to zero around each cycle
    CycleConstraints,
    CarrierMinCapacity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LpModel {
    formulation: Formulation,
    variables: Vec<VariableSpec>,
    index: HashMap<VarKey, usize>,
    groups: BTreeMap<ConstraintGroup, Vec<LinearConstraint>>,
}

impl LpModel {
    pub fn new(formulation: Formulation) -> Self {
        Self {
            formulation,
            variables: Vec::new(),
            index: HashMap::new(),
            groups: BTreeMap::new(),
        }
    }

    pub fn formulation(&self) -> Formulation {
        self.formulation
    }

    /// Declare a variable, returning its index. Redeclaring a key returns the
    /// existing index and leaves its bounds alone.
    pub fn add_variable(&mut self, key: VarKey, lower: f64, upper: f64, cost: f64) -> usize {
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.variables.len();
        self.index.insert(key.clone(), i);
        self.variables.push(VariableSpec {
            key,
            lower,
            upper,
            cost,
        });
        i
    }

    pub fn var(&self, key: &VarKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn require_var(&self, key: &VarKey) -> Result<usize, LopfError> {
        self.var(key)
            .ok_or_else(|| LopfError::UnknownVariable(key.to_string()))
    }

    pub fn variables(&self) -> &[VariableSpec] {
        &self.variables
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Pin a variable by collapsing both bounds onto `value`.
    pub fn fix(&mut self, key: &VarKey, value: f64) -> Result<(), LopfError> {
        let i = self.require_var(key)?;
        let spec = &mut self.variables[i];
        spec.lower = value;
        spec.upper = value;
        Ok(())
    }

    pub fn is_fixed(&self, i: usize) -> bool {
        self.variables
            .get(i)
            .is_some_and(|v| v.lower == v.upper)
    }

    /// Overwrite the values of fixed variables with their exact fixed value.
    pub fn pin_fixed(&self, values: &mut [f64]) {
        for (spec, value) in self.variables.iter().zip(values.iter_mut()) {
            if spec.lower == spec.upper {
                *value = spec.lower;
            }
        }
    }

    pub fn set_group(&mut self, group: ConstraintGroup, constraints: Vec<LinearConstraint>) {
        self.groups.insert(group, constraints);
    }

    pub fn remove_group(&mut self, group: ConstraintGroup) -> Option<Vec<LinearConstraint>> {
        self.groups.remove(&group)
    }

    pub fn group(&self, group: ConstraintGroup) -> Option<&[LinearConstraint]> {
        self.groups.get(&group).map(|c| c.as_slice())
    }

    pub fn groups(&self) -> impl Iterator<Item = (ConstraintGroup, &[LinearConstraint])> {
        self.groups.iter().map(|(g, c)| (*g, c.as_slice()))
    }

    pub fn num_constraints(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.variables
            .iter()
            .zip(values)
            .map(|(v, x)| v.cost * x)
            .sum()
    }

    /// Worst relative violation over all rows and variable bounds.
    pub fn max_violation(&self, values: &[f64]) -> f64 {
        let rows = self
            .groups
            .values()
            .flatten()
            .map(|c| c.relative_violation(values))
            .fold(0.0, f64::max);
        let bounds = self
            .variables
            .iter()
            .zip(values)
            .map(|(v, &x)| {
                let below = if v.lower.is_finite() { v.lower - x } else { 0.0 };
                let above = if v.upper.is_finite() { x - v.upper } else { 0.0 };
                below.max(above).max(0.0) / x.abs().max(1.0)
            })
            .fold(0.0, f64::max);
        rows.max(bounds)
    }
}
