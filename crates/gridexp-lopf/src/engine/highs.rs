//! HiGHS engine (native library, `solver-highs` feature).

use super::{assemble, collect, EngineOutput, LpEngine, SolverOptions};
use crate::error::LopfError;
use crate::model::LpModel;
use good_lp::solvers::highs::highs;
use good_lp::SolverModel;
use tracing::debug;

/// HiGHS simplex/IPM engine. Honors time limit, thread count and verbosity.
#[derive(Debug, Default, Clone, Copy)]
pub struct HighsEngine;

impl LpEngine for HighsEngine {
    fn id(&self) -> &str {
        "highs"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn solve(&self, model: &LpModel, options: &SolverOptions) -> Result<EngineOutput, LopfError> {
        let (mut problem, handles) = assemble(model, highs);
        problem = problem.set_verbose(options.verbose);
        if let Some(seconds) = options.time_limit_seconds {
            problem = problem.set_time_limit(seconds);
        }
        if let Some(threads) = options.threads {
            problem = problem.set_threads(threads);
        }
        let output = collect(model, &handles, problem.solve(), options);
        debug!(
            status = %output.status,
            termination = %output.termination,
            "highs solve finished"
        );
        Ok(output)
    }
}
