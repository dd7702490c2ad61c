//! Discrete-time distributed Smith dynamics with saturation.
//!
//! Every coordinate axis is an independent population game played by all robots over the
//! same communication graph. Robots nudge their opinions toward an external reference while
//! each edge's influence is capped by a per-population saturation bound `gamma`.

use serde::{Deserialize, Serialize};
use std::fmt;
use swarmsim_core::DMatrix;
use thiserror::Error;

mod controller;

pub use controller::ConsensusController;

/// Adjacency of the complete graph on `num_robots` robots: ones everywhere except the
/// diagonal.
#[must_use]
pub fn complete_graph(num_robots: usize) -> DMatrix<f64> {
    DMatrix::from_fn(num_robots, num_robots, |i, j| if i == j { 0.0 } else { 1.0 })
}

/// Errors raised while configuring or stepping the controller.
#[derive(Debug, Error, PartialEq)]
pub enum ConsensusError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// More per-population values were supplied than there are populations.
    #[error("{provided} {name} values supplied for {populations} populations")]
    TooManyParameters {
        name: &'static str,
        provided: usize,
        populations: usize,
    },
    /// An empty parameter list cannot be broadcast.
    #[error("at least one {name} value is required")]
    MissingParameter { name: &'static str },
    /// An input did not have the expected dimensions.
    #[error("{what} must have shape {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },
}

/// Non-fatal configuration adjustments made while resolving a [`ConsensusConfig`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConfigWarning {
    /// Fewer values than populations were given; the first one was applied to all.
    Broadcast {
        parameter: &'static str,
        provided: usize,
        populations: usize,
        value: f64,
    },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast {
                parameter,
                provided,
                populations,
                value,
            } => write!(
                f,
                "using {parameter}={value} for all {populations} populations ({provided} supplied)"
            ),
        }
    }
}

/// Controller configuration. Per-population lists are resolved once, at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Number of robots (at least two).
    pub num_robots: usize,
    /// Number of independent populations, e.g. one per coordinate axis.
    pub num_populations: usize,
    /// Step size per population.
    pub epsilon: Vec<f64>,
    /// Saturation bound per population.
    pub gamma: Vec<f64>,
    /// Zero the leader slot of the step-size matrix so the leader's state never drifts.
    #[serde(default)]
    pub freeze_leader: bool,
}

impl ConsensusConfig {
    #[must_use]
    pub fn new(
        num_robots: usize,
        num_populations: usize,
        epsilon: Vec<f64>,
        gamma: Vec<f64>,
    ) -> Self {
        Self {
            num_robots,
            num_populations,
            epsilon,
            gamma,
            freeze_leader: false,
        }
    }

    /// Step size just inside the stability margin: `(1 - delta) / (2 * gamma)`.
    ///
    /// Callers are responsible for keeping `epsilon` below `1 / (2 * gamma)`; the
    /// controller does not check it.
    #[must_use]
    pub fn stable_epsilon(gamma: f64, delta: f64) -> f64 {
        (1.0 - delta) / (2.0 * gamma)
    }

    /// Per-population `(epsilon, gamma)` after broadcasting, plus any warnings raised.
    pub(crate) fn resolve(&self) -> Result<ResolvedParameters, ConsensusError> {
        if self.num_robots < 2 {
            return Err(ConsensusError::InvalidConfig("num_robots must be at least 2"));
        }
        if self.num_populations == 0 {
            return Err(ConsensusError::InvalidConfig(
                "num_populations must be non-zero",
            ));
        }

        let mut warnings = Vec::new();
        let epsilon = broadcast("epsilon", &self.epsilon, self.num_populations, &mut warnings)?;
        let gamma = broadcast("gamma", &self.gamma, self.num_populations, &mut warnings)?;

        if epsilon.iter().any(|e| !e.is_finite() || *e < 0.0) {
            return Err(ConsensusError::InvalidConfig(
                "epsilon must be finite and non-negative",
            ));
        }
        if gamma.iter().any(|g| !g.is_finite() || *g <= 0.0) {
            return Err(ConsensusError::InvalidConfig(
                "gamma must be finite and positive",
            ));
        }

        Ok(ResolvedParameters {
            epsilon,
            gamma,
            warnings,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedParameters {
    pub epsilon: Vec<f64>,
    pub gamma: Vec<f64>,
    pub warnings: Vec<ConfigWarning>,
}

fn broadcast(
    name: &'static str,
    values: &[f64],
    populations: usize,
    warnings: &mut Vec<ConfigWarning>,
) -> Result<Vec<f64>, ConsensusError> {
    if values.len() > populations {
        return Err(ConsensusError::TooManyParameters {
            name,
            provided: values.len(),
            populations,
        });
    }
    let Some(&first) = values.first() else {
        return Err(ConsensusError::MissingParameter { name });
    };
    if values.len() == populations {
        return Ok(values.to_vec());
    }
    warnings.push(ConfigWarning::Broadcast {
        parameter: name,
        provided: values.len(),
        populations,
        value: first,
    });
    Ok(vec![first; populations])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_lists_resolve_without_warnings() {
        let config = ConsensusConfig::new(3, 2, vec![0.1, 0.2], vec![10.0, 20.0]);
        let resolved = config.resolve().expect("resolve");
        assert_eq!(resolved.epsilon, vec![0.1, 0.2]);
        assert_eq!(resolved.gamma, vec![10.0, 20.0]);
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn short_lists_broadcast_first_value() {
        let config = ConsensusConfig::new(4, 3, vec![0.05], vec![7.0, 8.0]);
        let resolved = config.resolve().expect("resolve");
        assert_eq!(resolved.epsilon, vec![0.05; 3]);
        assert_eq!(resolved.gamma, vec![7.0; 3]);
        assert_eq!(resolved.warnings.len(), 2);
        assert!(resolved.warnings[0].to_string().contains("epsilon=0.05"));
    }

    #[test]
    fn long_or_empty_lists_are_rejected() {
        let too_many = ConsensusConfig::new(4, 1, vec![0.1, 0.2], vec![1.0]);
        assert_eq!(
            too_many.resolve(),
            Err(ConsensusError::TooManyParameters {
                name: "epsilon",
                provided: 2,
                populations: 1,
            })
        );
        let empty = ConsensusConfig::new(4, 1, vec![0.1], Vec::new());
        assert_eq!(
            empty.resolve(),
            Err(ConsensusError::MissingParameter { name: "gamma" })
        );
    }

    #[test]
    fn degenerate_sizes_and_bounds_are_rejected() {
        for config in [
            ConsensusConfig::new(1, 1, vec![0.1], vec![1.0]),
            ConsensusConfig::new(3, 0, vec![0.1], vec![1.0]),
            ConsensusConfig::new(3, 1, vec![0.1], vec![0.0]),
            ConsensusConfig::new(3, 1, vec![f64::NAN], vec![1.0]),
        ] {
            assert!(matches!(
                config.resolve(),
                Err(ConsensusError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn complete_graph_has_no_self_loops() {
        let graph = complete_graph(4);
        assert_eq!(graph.shape(), (4, 4));
        assert_eq!(graph.trace(), 0.0);
        assert_eq!(graph.sum(), 12.0);
        assert_eq!(graph, graph.transpose());
    }

    #[test]
    fn stable_epsilon_sits_inside_margin() {
        let epsilon = ConsensusConfig::stable_epsilon(351.0, 1e-3);
        assert!(epsilon < 1.0 / (2.0 * 351.0));
        assert!((epsilon - 0.999 / 702.0).abs() < 1e-15);
    }
}
