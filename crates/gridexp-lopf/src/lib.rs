//! # gridexp-lopf: Iterative Transmission Capacity Expansion
//!
//! Solves a linear optimal power flow with extendable branch capacities,
//! repeatedly, updating line impedances to the solved capacities between
//! rounds until the capacities settle.
//!
//! ## Layers
//!
//! - [`formulation`] turns a [`Network`](gridexp_core::Network) into an
//!   [`LpModel`] made of named constraint groups, in either the `angles` or
//!   the `kirchhoff` formulation of passive branch flows.
//! - [`engine`] hands an [`LpModel`] to an LP backend through `good_lp`.
//! - [`session`] owns the model across solves, either rebuilding it each
//!   round or updating only the impedance-dependent groups in place.
//! - [`expansion`] drives the fixed-point loop, checkpoints, finalization,
//!   pruning and the result artifact.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gridexp_lopf::{solve_network, ArtifactPaths, EngineRegistry, LopfConfig};
//! use std::sync::Arc;
//!
//! let mut network = gridexp_core::Network::from_json_file("elec.json".as_ref())?;
//! let config = LopfConfig::from_file("lopf.toml".as_ref())?;
//! let report = solve_network(
//!     &mut network,
//!     &config,
//!     Arc::new(EngineRegistry::with_defaults()),
//!     ArtifactPaths::for_result("elec_solved.json"),
//! )?;
//! println!("{} rounds, converged: {}", report.iterations, report.converged);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod applier;
pub mod config;
pub mod engine;
pub mod error;
pub mod expansion;
pub mod formulation;
pub mod model;
pub mod prepare;
pub mod session;
pub mod status;

pub use applier::{pin_zero_capacity, prune, zero_out, PruneReport};
pub use config::{IterationConfig, LopfConfig, SessionConfig, SolverConfig};
pub use engine::{EngineOutput, EngineRegistry, LpEngine, SolverOptions};
pub use error::LopfError;
pub use expansion::{
    solve_network, ArtifactPaths, BranchBaseline, ExpansionIterator, ExpansionReport,
};
pub use formulation::{ExtraConstraints, Formulation};
pub use model::{ConstraintGroup, LpModel, VarKey};
pub use prepare::{prepare_network, PrepareOptions};
pub use session::{
    IncrementalUpdate, ModelDelta, PersistentSession, RebuildSession, SolveReport, SolverSession,
};
pub use status::{SolvePhase, SolveStatus, TerminationCondition, WarningPolicy};
