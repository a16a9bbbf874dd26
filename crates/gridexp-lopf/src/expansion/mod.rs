//! The iterative capacity-expansion loop.
//!
//! Line impedance depends on line capacity, but a linear program cannot have
//! coefficients that depend on its own solution. The loop therefore alternates
//! between solving with fixed impedances and rescaling impedances to the
//! solved capacities until capacities stop moving:
//!
//! ```text
//! solve ─► deviation ─┬─ converged / limit ─► finalize ─► result
//!   ▲                 │
//!   └── update params ◄┘ continue
//! ```
//!
//! Finalize zeroes negligible expansions, pins them at zero, solves once more,
//! prunes the zero-capacity extendable branches and writes the result. Any
//! solve status refused by the [`WarningPolicy`](crate::status::WarningPolicy)
//! writes a backup first and then fails.

mod fixed_point;
mod params;

pub use fixed_point::{relative_rms_deviation, FixedPoint, Verdict};
pub use params::{BranchBaseline, LineBaseline};

use crate::applier::{checkpoint, pin_zero_capacity, prune, zero_out};
use crate::config::LopfConfig;
use crate::engine::EngineRegistry;
use crate::error::LopfError;
use crate::formulation::Formulation;
use crate::session::{ModelDelta, PersistentSession, RebuildSession, SolveReport, SolverSession};
use crate::status::{SolvePhase, SolveStatus, TerminationCondition};
use gridexp_core::io::labeled_path;
use gridexp_core::{GridError, Network};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where the loop writes network state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Final result, written only on success
    pub result: PathBuf,
    /// Overwritten after every refinement round
    pub checkpoint: PathBuf,
    /// Written when a solve status is not accepted
    pub backup: PathBuf,
}

impl ArtifactPaths {
    /// `x/elec.json` → checkpoint `x/elec_checkpoint.json`, backup
    /// `x/elec_suboptimal.json`.
    pub fn for_result(result: impl Into<PathBuf>) -> Self {
        let result = result.into();
        Self {
            checkpoint: labeled_path(&result, "checkpoint"),
            backup: labeled_path(&result, "suboptimal"),
            result,
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpansionReport {
    /// Refinement rounds solved
    pub iterations: usize,
    pub converged: bool,
    pub deviations: Vec<f64>,
    /// Status of the final solve
    pub status: SolveStatus,
    pub termination: TerminationCondition,
    pub removed_lines: Vec<String>,
    pub removed_links: Vec<String>,
    pub objective: Option<f64>,
    pub result_path: PathBuf,
    pub checkpoint_path: Option<PathBuf>,
}

pub struct ExpansionIterator {
    config: LopfConfig,
    formulation: Formulation,
    paths: ArtifactPaths,
}

impl ExpansionIterator {
    pub fn new(config: LopfConfig, paths: ArtifactPaths) -> Result<Self, LopfError> {
        config.validate()?;
        let formulation = config.formulation()?;
        Ok(Self {
            config,
            formulation,
            paths,
        })
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Run the loop to completion, mutating `network` in place.
    ///
    /// Engine failures are reported with the last checkpoint written; status
    /// failures with the backup location.
    pub fn run(
        &self,
        network: &mut Network,
        session: &mut dyn SolverSession,
    ) -> Result<ExpansionReport, LopfError> {
        if network.lines.is_empty() && network.links.is_empty() {
            return Err(GridError::Validation("network has no lines or links".into()).into());
        }
        let mut state = FixedPoint::new(Vec::new());
        let mut last_checkpoint = None;
        self.execute(network, session, &mut state, &mut last_checkpoint)
            .map_err(|err| self.abort(err, state.iteration, last_checkpoint.as_ref()))
    }

    fn execute(
        &self,
        network: &mut Network,
        session: &mut dyn SolverSession,
        state: &mut FixedPoint,
        last_checkpoint: &mut Option<PathBuf>,
    ) -> Result<ExpansionReport, LopfError> {
        let settings = &self.config.iteration;
        let baseline = if network.has_extendable_lines() {
            let baseline = BranchBaseline::capture(network)?;
            state.previous_capacities = baseline.nominal_capacities(network);
            Some(baseline)
        } else {
            info!("no extendable lines; solving once before finalizing");
            state.converged = true;
            None
        };

        let report = self.solve_round(network, session, SolvePhase::Refinement)?;
        state.record(&report);

        if let Some(baseline) = &baseline {
            loop {
                let solved = line_capacities(network);
                let deviation = relative_rms_deviation(&solved, &state.previous_capacities);
                info!(iteration = state.iteration, deviation, "mean square difference after round");

                match state.assess(deviation, settings) {
                    Verdict::Converged => {
                        info!(iterations = state.iteration, "line capacities converged");
                        break;
                    }
                    Verdict::IterationLimit => {
                        warn!(
                            iterations = state.iteration,
                            deviation,
                            threshold = settings.msq_threshold,
                            "iteration limit reached without convergence; finalizing best result"
                        );
                        break;
                    }
                    Verdict::Continue => {}
                }

                zero_out(network, settings.refinement_zero_threshold);
                let compared = line_capacities(network);
                self.update_parameters(network, session, baseline)?;
                if settings.checkpoint {
                    self.write_checkpoint(network, last_checkpoint);
                }
                state.advance(compared);

                let report = self.solve_round(network, session, SolvePhase::Refinement)?;
                state.record(&report);
            }
        }

        self.finalize(network, session, state, baseline.as_ref(), last_checkpoint)
    }

    fn finalize(
        &self,
        network: &mut Network,
        session: &mut dyn SolverSession,
        state: &mut FixedPoint,
        baseline: Option<&BranchBaseline>,
        last_checkpoint: &Option<PathBuf>,
    ) -> Result<ExpansionReport, LopfError> {
        let zeroed = zero_out(network, self.config.iteration.zero_capacity_threshold);
        if let Some(baseline) = baseline {
            self.update_parameters(network, session, baseline)?;
        }
        self.ensure_model(network, session)?;
        let pinned = pin_zero_capacity(network, session)?;
        info!(zeroed, pinned, "final solve with zero-capacity branches fixed");

        let report = self.solve_checked(network, session, SolvePhase::Finalize)?;
        state.record(&report);

        let removed = prune(network);
        match baseline {
            Some(baseline) => {
                baseline.rescale(network)?;
            }
            None => network.calculate_dependent_values()?,
        }

        checkpoint(network, &self.paths.result)?;
        info!(path = %self.paths.result.display(), "wrote expansion result");

        Ok(ExpansionReport {
            iterations: state.iteration,
            converged: state.converged,
            deviations: state.deviations.clone(),
            status: report.status,
            termination: report.termination,
            removed_lines: removed.lines,
            removed_links: removed.links,
            objective: report.objective,
            result_path: self.paths.result.clone(),
            checkpoint_path: last_checkpoint.clone(),
        })
    }

    /// Rescale line parameters and refresh impedance rows of a live model.
    fn update_parameters(
        &self,
        network: &mut Network,
        session: &mut dyn SolverSession,
        baseline: &BranchBaseline,
    ) -> Result<(), LopfError> {
        let updated = baseline.rescale(network)?;
        debug!(lines = updated, "updated line parameters");
        if session.is_built() {
            if let Some(incremental) = session.incremental() {
                incremental.update(network, &ModelDelta::impedance_refresh(self.formulation))?;
            }
        }
        Ok(())
    }

    /// Build (and prepare) unless a live incremental model can be reused.
    fn ensure_model(
        &self,
        network: &Network,
        session: &mut dyn SolverSession,
    ) -> Result<(), LopfError> {
        let reusable = session.is_built() && session.incremental().is_some();
        if !reusable {
            session.build(network, self.formulation.id())?;
        }
        if !reusable || !session.is_prepared() {
            session.prepare(&self.config.solver.name, &self.config.solver.options)?;
        }
        Ok(())
    }

    fn solve_round(
        &self,
        network: &mut Network,
        session: &mut dyn SolverSession,
        phase: SolvePhase,
    ) -> Result<SolveReport, LopfError> {
        self.ensure_model(network, session)?;
        self.solve_checked(network, session, phase)
    }

    fn solve_checked(
        &self,
        network: &mut Network,
        session: &mut dyn SolverSession,
        phase: SolvePhase,
    ) -> Result<SolveReport, LopfError> {
        let report = session.solve(network)?;
        debug!(
            phase = %phase,
            status = %report.status,
            termination = %report.termination,
            "solve finished"
        );
        if self.config.status.accepts(phase, report.status) {
            if report.status == SolveStatus::Warning {
                warn!(phase = %phase, termination = %report.termination, "tolerating warning status");
            }
            return Ok(report);
        }
        Err(self.write_backup(network, phase, report))
    }

    fn write_backup(&self, network: &Network, phase: SolvePhase, report: SolveReport) -> LopfError {
        let backup = self.paths.backup.clone();
        match checkpoint(network, &backup) {
            Ok(()) => {
                error!(
                    phase = %phase,
                    status = %report.status,
                    termination = %report.termination,
                    backup = %backup.display(),
                    "solve status not accepted; network backup written"
                );
                LopfError::UnacceptedStatus {
                    phase,
                    status: report.status,
                    termination: report.termination,
                    backup,
                }
            }
            Err(err) => {
                error!(
                    phase = %phase,
                    status = %report.status,
                    backup = %backup.display(),
                    error = %err,
                    "solve status not accepted and backup failed"
                );
                LopfError::BackupFailed {
                    phase,
                    status: report.status,
                    termination: report.termination,
                    backup,
                    reason: err.to_string(),
                }
            }
        }
    }

    fn write_checkpoint(&self, network: &Network, last_checkpoint: &mut Option<PathBuf>) {
        match checkpoint(network, &self.paths.checkpoint) {
            Ok(()) => {
                debug!(path = %self.paths.checkpoint.display(), "wrote checkpoint");
                *last_checkpoint = Some(self.paths.checkpoint.clone());
            }
            Err(err) => warn!(
                path = %self.paths.checkpoint.display(),
                error = %err,
                "checkpoint failed; continuing"
            ),
        }
    }

    fn abort(&self, err: LopfError, iteration: usize, last_checkpoint: Option<&PathBuf>) -> LopfError {
        if err.is_status_failure() {
            return err;
        }
        let checkpoint = last_checkpoint
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none written".to_string());
        error!(iteration, checkpoint = %checkpoint, error = %err, "expansion aborted");
        LopfError::Aborted {
            iteration,
            checkpoint,
            source: Box::new(err),
        }
    }
}

fn line_capacities(network: &Network) -> Vec<f64> {
    network.lines.iter().map(|l| l.s_nom_opt).collect()
}

/// Run the expansion loop with a session chosen by `config.session`.
///
/// The session is dropped, releasing any solver state, before this returns.
pub fn solve_network(
    network: &mut Network,
    config: &LopfConfig,
    registry: Arc<EngineRegistry>,
    paths: ArtifactPaths,
) -> Result<ExpansionReport, LopfError> {
    let iterator = ExpansionIterator::new(config.clone(), paths)?;
    let mut session: Box<dyn SolverSession> = if config.session.persistent {
        Box::new(PersistentSession::with_constraints(
            registry,
            config.constraints.clone(),
        ))
    } else {
        Box::new(RebuildSession::with_constraints(
            registry,
            config.constraints.clone(),
        ))
    };

    let stats = network.stats();
    info!(
        formulation = %config.formulation,
        solver = %config.solver.name,
        persistent = config.session.persistent,
        lines = stats.num_lines,
        extendable_lines = stats.num_extendable_lines,
        links = stats.num_links,
        snapshots = stats.num_snapshots,
        "starting capacity expansion"
    );
    iterator.run(network, session.as_mut())
}
