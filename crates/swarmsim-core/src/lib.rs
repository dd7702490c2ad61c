//! Core types for the swarm formation simulator: poses, configuration, and the
//! kinematic/collision engine.

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod angles;
pub mod pose;
pub mod swarm;

pub use angles::{demap_angle, demap_angles, map_angle, map_angles, wrap_unsigned};
pub use nalgebra::{DMatrix, DVector};
pub use pose::{POSE_ROWS, Pose, PoseColumns};
pub use swarm::{CollisionReport, ControlCommands, Swarm, SwarmSnapshot};

/// Errors raised by the swarm engine.
#[derive(Debug, Error, PartialEq)]
pub enum SwarmError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A pose array did not have shape `(3, N)`.
    #[error("{what} must have shape ({expected_rows}, {expected_cols}), got ({rows}, {cols})")]
    ShapeMismatch {
        what: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },
}

/// Static configuration for a swarm. Fixed once the swarm is constructed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SwarmConfig {
    /// Number of agents in the swarm.
    pub num_agents: usize,
    /// Agent footprint diameter [cm].
    pub diameter: f64,
    /// Linear speed cap [cm/s].
    pub max_linear_speed: f64,
    /// Angular speed cap [rad/s].
    pub max_angular_speed: f64,
    /// Arena extent along x [cm].
    pub arena_width: f64,
    /// Arena extent along y [cm].
    pub arena_height: f64,
    /// Proportional gain on distance to target.
    pub kp_v: f64,
    /// Proportional gain on heading error.
    pub kp_w: f64,
    /// Agents closer than this to their target stop moving.
    pub distance_margin: f64,
    /// Outer tick duration [s].
    pub dt_sys: f64,
    /// Euler sub-steps per tick.
    pub n_runs: u32,
    /// Optional RNG seed for the construction-time random reset.
    pub rng_seed: Option<u64>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            num_agents: 5,
            diameter: 12.0,
            max_linear_speed: 15.0,
            max_angular_speed: 7.0,
            arena_width: 351.0,
            arena_height: 241.0,
            kp_v: 2.0,
            kp_w: 2.0,
            distance_margin: 0.5,
            dt_sys: 0.1,
            n_runs: 10,
            rng_seed: None,
        }
    }
}

impl SwarmConfig {
    /// Default configuration sized for `num_agents`.
    #[must_use]
    pub fn with_agents(num_agents: usize) -> Self {
        Self {
            num_agents,
            ..Self::default()
        }
    }

    /// Checks every parameter; the swarm refuses to build from an invalid config.
    pub fn validate(&self) -> Result<(), SwarmError> {
        if self.num_agents == 0 {
            return Err(SwarmError::InvalidConfig("num_agents must be non-zero"));
        }
        if self.diameter.is_nan() || self.diameter <= 0.0 {
            return Err(SwarmError::InvalidConfig("diameter must be positive"));
        }
        if self.arena_width <= self.diameter || self.arena_height <= self.diameter {
            return Err(SwarmError::InvalidConfig(
                "arena must be larger than one agent diameter",
            ));
        }
        if self.max_linear_speed < 0.0 || self.max_angular_speed < 0.0 {
            return Err(SwarmError::InvalidConfig(
                "speed limits must be non-negative",
            ));
        }
        if self.kp_v < 0.0 || self.kp_w < 0.0 || self.distance_margin < 0.0 {
            return Err(SwarmError::InvalidConfig(
                "controller gains and distance margin must be non-negative",
            ));
        }
        if self.dt_sys.is_nan() || self.dt_sys <= 0.0 {
            return Err(SwarmError::InvalidConfig("dt_sys must be positive"));
        }
        if self.n_runs == 0 {
            return Err(SwarmError::InvalidConfig("n_runs must be non-zero"));
        }
        Ok(())
    }

    /// Inner Euler step size.
    #[must_use]
    pub fn dt_sim(&self) -> f64 {
        self.dt_sys / f64::from(self.n_runs)
    }

    /// Lowest admissible coordinate for an agent center on either axis.
    #[must_use]
    pub fn lower_limit(&self) -> f64 {
        0.5 * self.diameter
    }

    /// Highest admissible x for an agent center.
    #[must_use]
    pub fn limit_x(&self) -> f64 {
        self.arena_width - 0.5 * self.diameter
    }

    /// Highest admissible y for an agent center.
    #[must_use]
    pub fn limit_y(&self) -> f64 {
        self.arena_height - 0.5 * self.diameter
    }

    /// Returns the configured RNG, seeded from entropy if no seed is set.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SwarmConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.dt_sim() - 0.01).abs() < 1e-12);
        assert_eq!(config.lower_limit(), 6.0);
        assert_eq!(config.limit_x(), 345.0);
        assert_eq!(config.limit_y(), 235.0);
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        let cases = [
            SwarmConfig::with_agents(0),
            SwarmConfig {
                diameter: 0.0,
                ..SwarmConfig::default()
            },
            SwarmConfig {
                arena_width: 10.0,
                ..SwarmConfig::default()
            },
            SwarmConfig {
                n_runs: 0,
                ..SwarmConfig::default()
            },
            SwarmConfig {
                dt_sys: f64::NAN,
                ..SwarmConfig::default()
            },
            SwarmConfig {
                kp_v: -1.0,
                ..SwarmConfig::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(SwarmError::InvalidConfig(_))),
                "expected rejection for {config:?}"
            );
        }
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        use rand::Rng;
        let config = SwarmConfig {
            rng_seed: Some(11),
            ..SwarmConfig::default()
        };
        let a: f64 = config.seeded_rng().random();
        let b: f64 = config.seeded_rng().random();
        assert_eq!(a, b);
    }
}
