//! Configuration of the expansion loop.
//!
//! Every section defaults independently, so a TOML file only needs the keys it
//! changes:
//!
//! ```toml
//! formulation = "angles"
//!
//! [solver]
//! name = "highs"
//! time_limit_seconds = 3600
//!
//! [iteration]
//! max_iterations = 6
//!
//! [constraints.min_capacities]
//! solar = 1500.0
//! ```

use crate::engine::SolverOptions;
use crate::error::LopfError;
use crate::formulation::{ExtraConstraints, Formulation};
use crate::prepare::PrepareOptions;
use crate::status::WarningPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LopfConfig {
    /// `"kirchhoff"` or `"angles"`
    pub formulation: String,
    pub solver: SolverConfig,
    pub session: SessionConfig,
    pub iteration: IterationConfig,
    pub status: WarningPolicy,
    pub constraints: ExtraConstraints,
    pub prepare: PrepareOptions,
}

impl Default for LopfConfig {
    fn default() -> Self {
        Self {
            formulation: "kirchhoff".to_string(),
            solver: SolverConfig::default(),
            session: SessionConfig::default(),
            iteration: IterationConfig::default(),
            status: WarningPolicy::default(),
            constraints: ExtraConstraints::default(),
            prepare: PrepareOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub name: String,
    #[serde(flatten)]
    pub options: SolverOptions,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            name: "clarabel".to_string(),
            options: SolverOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Keep one model across rounds and rebuild only impedance-dependent rows
    pub persistent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationConfig {
    /// Relative RMS change of line capacities below which the loop converges
    pub msq_threshold: f64,
    pub min_iterations: usize,
    pub max_iterations: usize,
    /// Capacities below this are zeroed between refinement rounds (MW)
    pub refinement_zero_threshold: f64,
    /// Capacities below this are zeroed and pinned before the final solve (MW)
    pub zero_capacity_threshold: f64,
    /// Write a checkpoint after every refinement round
    pub checkpoint: bool,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            msq_threshold: 0.01,
            min_iterations: 2,
            max_iterations: 999,
            refinement_zero_threshold: 10.0,
            zero_capacity_threshold: 500.0,
            checkpoint: true,
        }
    }
}

impl LopfConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, LopfError> {
        let config: LopfConfig =
            toml::from_str(source).map_err(|e| LopfError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, LopfError> {
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
            .map_err(|e| LopfError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn formulation(&self) -> Result<Formulation, LopfError> {
        self.formulation.parse()
    }

    pub fn validate(&self) -> Result<(), LopfError> {
        self.formulation()?;

        let it = &self.iteration;
        for (name, value) in [
            ("iteration.msq_threshold", it.msq_threshold),
            ("iteration.refinement_zero_threshold", it.refinement_zero_threshold),
            ("iteration.zero_capacity_threshold", it.zero_capacity_threshold),
            ("prepare.load_shedding_cost", self.prepare.load_shedding_cost),
        ] {
            non_negative(name, value)?;
        }
        if it.max_iterations == 0 {
            return Err(LopfError::Config("iteration.max_iterations must be at least 1".into()));
        }
        if it.min_iterations > it.max_iterations {
            return Err(LopfError::Config(format!(
                "iteration.min_iterations ({}) exceeds iteration.max_iterations ({})",
                it.min_iterations, it.max_iterations
            )));
        }

        if self.solver.name.trim().is_empty() {
            return Err(LopfError::Config("solver.name must not be empty".into()));
        }
        let options = &self.solver.options;
        if !(options.feasibility_tolerance.is_finite() && options.feasibility_tolerance > 0.0) {
            return Err(LopfError::Config(
                "solver.feasibility_tolerance must be positive".into(),
            ));
        }
        if let Some(limit) = options.time_limit_seconds {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(LopfError::Config(
                    "solver.time_limit_seconds must be positive".into(),
                ));
            }
        }

        for (carrier, minimum) in &self.constraints.min_capacities {
            non_negative(&format!("constraints.min_capacities.{}", carrier), *minimum)?;
        }
        if self.prepare.nhours == Some(0) {
            return Err(LopfError::Config("prepare.nhours must be at least 1".into()));
        }
        if self.prepare.segments == Some(0) {
            return Err(LopfError::Config("prepare.segments must be at least 1".into()));
        }
        if self.prepare.no_shedding_last_snapshot && !self.prepare.load_shedding {
            return Err(LopfError::Config(
                "prepare.no_shedding_last_snapshot requires prepare.load_shedding".into(),
            ));
        }
        if let Some(clip) = self.prepare.clip_p_max_pu {
            non_negative("prepare.clip_p_max_pu", clip)?;
        }
        Ok(())
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), LopfError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(LopfError::Config(format!(
            "{} must be a finite non-negative number, got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LopfConfig::default();
        assert_eq!(config.formulation, "kirchhoff");
        assert_eq!(config.solver.name, "clarabel");
        assert_eq!(config.iteration.msq_threshold, 0.01);
        assert_eq!(config.iteration.min_iterations, 2);
        assert_eq!(config.iteration.max_iterations, 999);
        assert_eq!(config.iteration.zero_capacity_threshold, 500.0);
        assert!(!config.session.persistent);
        assert!(config.status.allow_warning_refinement);
        assert!(!config.status.allow_warning_finalize);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml() {
        let config = LopfConfig::from_toml_str(
            r#"
            formulation = "angles"

            [solver]
            name = "highs"
            threads = 4

            [iteration]
            max_iterations = 6

            [status]
            allow_warning_finalize = true

            [constraints.min_capacities]
            solar = 1500.0
            "#,
        )
        .unwrap();
        assert_eq!(config.formulation().unwrap(), Formulation::Angles);
        assert_eq!(config.solver.name, "highs");
        assert_eq!(config.solver.options.threads, Some(4));
        assert_eq!(config.solver.options.feasibility_tolerance, 1e-4);
        assert_eq!(config.iteration.max_iterations, 6);
        assert_eq!(config.iteration.min_iterations, 2);
        assert!(config.status.allow_warning_finalize);
        assert!(config.status.allow_warning_refinement);
        assert_eq!(config.constraints.min_capacities["solar"], 1500.0);
    }

    #[test]
    fn test_rejects_unknown_formulation() {
        let err = LopfConfig::from_toml_str("formulation = \"ptdf\"").unwrap_err();
        assert!(matches!(err, LopfError::UnknownFormulation(_)));
    }

    #[test]
    fn test_rejects_inverted_iteration_bounds() {
        let mut config = LopfConfig::default();
        config.iteration.min_iterations = 10;
        config.iteration.max_iterations = 5;
        assert!(matches!(config.validate(), Err(LopfError::Config(_))));

        config.iteration.min_iterations = 0;
        config.iteration.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_threshold() {
        let mut config = LopfConfig::default();
        config.iteration.msq_threshold = -0.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("msq_threshold"));

        config.iteration.msq_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_time_reduction() {
        let config = LopfConfig::from_toml_str("[prepare]\nnhours = 24\nsegments = 6").unwrap();
        assert_eq!(config.prepare.nhours, Some(24));
        assert_eq!(config.prepare.segments, Some(6));

        let err = LopfConfig::from_toml_str("[prepare]\nsegments = 0").unwrap_err();
        assert!(err.to_string().contains("prepare.segments"));

        let err = LopfConfig::from_toml_str("[prepare]\nno_shedding_last_snapshot = true")
            .unwrap_err();
        assert!(err.to_string().contains("load_shedding"));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        assert!(matches!(
            LopfConfig::from_toml_str("[iteration\nmax = 1"),
            Err(LopfError::Config(_))
        ));
    }
}
