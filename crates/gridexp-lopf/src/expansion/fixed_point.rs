//! Fixed-point state of the capacity/impedance iteration.

use crate::config::IterationConfig;
use crate::session::SolveReport;
use crate::status::{SolveStatus, TerminationCondition};

/// Outcome of the convergence check after a refinement round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Converged,
    /// Deviation still above threshold but no rounds left
    IterationLimit,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixedPoint {
    /// Number of the round currently being evaluated, starting at 1
    pub iteration: usize,
    /// Line capacities the current round is compared against
    pub previous_capacities: Vec<f64>,
    pub status: Option<SolveStatus>,
    pub termination: Option<TerminationCondition>,
    /// Deviation of every evaluated round, in order
    pub deviations: Vec<f64>,
    pub converged: bool,
}

impl FixedPoint {
    pub fn new(seed: Vec<f64>) -> Self {
        Self {
            iteration: 1,
            previous_capacities: seed,
            status: None,
            termination: None,
            deviations: Vec::new(),
            converged: false,
        }
    }

    pub fn record(&mut self, report: &SolveReport) {
        self.status = Some(report.status);
        self.termination = Some(report.termination.clone());
    }

    /// Store the deviation of the current round and decide what comes next.
    pub fn assess(&mut self, deviation: f64, config: &IterationConfig) -> Verdict {
        self.deviations.push(deviation);
        if deviation <= config.msq_threshold && self.iteration >= config.min_iterations {
            self.converged = true;
            Verdict::Converged
        } else if self.iteration >= config.max_iterations {
            Verdict::IterationLimit
        } else {
            Verdict::Continue
        }
    }

    /// Move to the next round, comparing against `solved` from now on.
    pub fn advance(&mut self, solved: Vec<f64>) {
        self.iteration += 1;
        self.previous_capacities = solved;
    }
}

/// `sqrt(mean((new − previous)²)) / mean(previous)`.
///
/// Zero when both vectors agree (including when both are empty or all zero);
/// infinite when only `previous` averages to zero.
pub fn relative_rms_deviation(new: &[f64], previous: &[f64]) -> f64 {
    let n = new.len().min(previous.len());
    if n == 0 {
        return 0.0;
    }
    let mean_square = new
        .iter()
        .zip(previous)
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        / n as f64;
    if mean_square == 0.0 {
        return 0.0;
    }
    let mean_previous = previous[..n].iter().sum::<f64>() / n as f64;
    if mean_previous == 0.0 {
        return f64::INFINITY;
    }
    mean_square.sqrt() / mean_previous
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IterationConfig {
        IterationConfig {
            msq_threshold: 0.01,
            min_iterations: 2,
            max_iterations: 999,
            ..IterationConfig::default()
        }
    }

    fn stop_round(deviations: &[f64], config: &IterationConfig) -> (usize, Verdict) {
        let mut state = FixedPoint::new(Vec::new());
        for &d in deviations {
            match state.assess(d, config) {
                Verdict::Continue => state.advance(Vec::new()),
                verdict => return (state.iteration, verdict),
            }
        }
        (state.iteration, Verdict::Continue)
    }

    #[test]
    fn test_stops_at_iteration_three() {
        let (round, verdict) = stop_round(&[0.5, 0.2, 0.008], &config());
        assert_eq!(round, 3);
        assert_eq!(verdict, Verdict::Converged);
    }

    #[test]
    fn test_min_iterations_hold_off_early_convergence() {
        let (round, verdict) = stop_round(&[0.001, 0.001], &config());
        assert_eq!(round, 2);
        assert_eq!(verdict, Verdict::Converged);
    }

    #[test]
    fn test_iteration_limit() {
        let mut cfg = config();
        cfg.max_iterations = 3;
        let (round, verdict) = stop_round(&[0.5, 0.4, 0.3, 0.2], &cfg);
        assert_eq!(round, 3);
        assert_eq!(verdict, Verdict::IterationLimit);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let (round, verdict) = stop_round(&[0.5, 0.01], &config());
        assert_eq!((round, verdict), (2, Verdict::Converged));
    }

    #[test]
    fn test_relative_rms_deviation() {
        assert_eq!(relative_rms_deviation(&[120.0], &[100.0]), 0.2);
        let d = relative_rms_deviation(&[119.0], &[120.0]);
        assert!((d - 1.0 / 120.0).abs() < 1e-15);
        // sqrt((4 + 0) / 2) / 50
        let d = relative_rms_deviation(&[52.0, 50.0], &[50.0, 50.0]);
        assert!((d - 2f64.sqrt() / 50.0).abs() < 1e-15);
        assert_eq!(relative_rms_deviation(&[0.0], &[0.0]), 0.0);
        assert_eq!(relative_rms_deviation(&[1.0], &[0.0]), f64::INFINITY);
        assert_eq!(relative_rms_deviation(&[], &[]), 0.0);
    }
}
