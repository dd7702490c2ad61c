//! Unicycle kinematics with proportional low-level control and single-pass overlap resolution.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tracing::{debug, trace};

use crate::{
    DMatrix, PoseColumns, SwarmConfig, SwarmError, demap_angles, map_angles, wrap_unsigned,
};

/// Owned copy of the swarm state handed back to callers after `reset`/`step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmSnapshot {
    pub positions: PoseColumns,
    pub targets: PoseColumns,
}

/// Pairwise geometry between agent centers.
///
/// Entry `(i, j)` of `distances`/`angles` describes the vector from agent `i` to agent `j`.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionReport {
    /// True when any pair overlaps.
    pub collisions: bool,
    /// `max(0, diameter - distance)`, zero on the diagonal.
    pub overlaps: DMatrix<f64>,
    pub distances: DMatrix<f64>,
    /// Bearing from `i` towards `j`, in `(-π, π]`.
    pub angles: DMatrix<f64>,
}

/// Per-agent linear and angular velocity commands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlCommands {
    pub v: Vec<f64>,
    pub w: Vec<f64>,
}

impl ControlCommands {
    /// Clamps every command into `[-max_v, max_v]` and `[-max_w, max_w]`.
    pub fn saturate(&mut self, max_v: f64, max_w: f64) {
        for v in &mut self.v {
            *v = v.clamp(-max_v, max_v);
        }
        for w in &mut self.w {
            *w = w.clamp(-max_w, max_w);
        }
    }
}

/// Fleet of disk-shaped unicycle agents confined to a rectangular arena.
#[derive(Debug, Clone)]
pub struct Swarm {
    config: SwarmConfig,
    positions: PoseColumns,
    targets: PoseColumns,
}

impl Swarm {
    /// Swarm of `num_agents` agents with the default configuration.
    pub fn new(num_agents: usize) -> Result<Self, SwarmError> {
        Self::with_config(SwarmConfig::with_agents(num_agents))
    }

    /// Builds a swarm and places agents and targets at random using the config's RNG.
    pub fn with_config(config: SwarmConfig) -> Result<Self, SwarmError> {
        config.validate()?;
        let mut rng = config.seeded_rng();
        let len = config.num_agents;
        let mut swarm = Self {
            config,
            positions: PoseColumns::zeros(len),
            targets: PoseColumns::zeros(len),
        };
        swarm.reset(&mut rng, None, None)?;
        Ok(swarm)
    }

    #[must_use]
    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    #[must_use]
    pub fn num_agents(&self) -> usize {
        self.config.num_agents
    }

    /// Current agent poses.
    #[must_use]
    pub fn positions(&self) -> &PoseColumns {
        &self.positions
    }

    /// Current reference poses.
    #[must_use]
    pub fn targets(&self) -> &PoseColumns {
        &self.targets
    }

    /// Owned copy of positions and targets.
    #[must_use]
    pub fn snapshot(&self) -> SwarmSnapshot {
        SwarmSnapshot {
            positions: self.positions.clone(),
            targets: self.targets.clone(),
        }
    }

    /// Re-initialises poses and targets, then resolves overlaps once.
    ///
    /// Missing arrays are drawn uniformly inside the arena bounds (heading in `[0, 2π)`).
    /// Supplied arrays are validated before anything is mutated, then adopted as given:
    /// poses outside the arena stay there until overlap resolution or the next `step`
    /// clips them.
    pub fn reset<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        initial_positions: Option<&PoseColumns>,
        initial_landmarks: Option<&PoseColumns>,
    ) -> Result<SwarmSnapshot, SwarmError> {
        let positions = initial_positions
            .map(|p| self.checked_columns("initial positions", p))
            .transpose()?;
        let landmarks = initial_landmarks
            .map(|l| self.checked_columns("initial landmarks", l))
            .transpose()?;

        self.positions = match positions {
            Some(positions) => positions,
            None => self.random_poses(rng),
        };
        self.targets = match landmarks {
            Some(landmarks) => landmarks,
            None => self.random_poses(rng),
        };
        self.resolve_collisions();
        debug!(agents = self.num_agents(), "swarm reset");
        Ok(self.snapshot())
    }

    /// Replaces agent poses; `rows` must have shape `(3, N)`.
    pub fn set_poses<P: AsRef<[f64]>>(&mut self, rows: &[P]) -> Result<(), SwarmError> {
        self.positions = PoseColumns::from_rows("poses", rows, self.num_agents())?;
        Ok(())
    }

    /// Replaces target poses; `rows` must have shape `(3, N)`.
    pub fn set_landmarks<P: AsRef<[f64]>>(&mut self, rows: &[P]) -> Result<(), SwarmError> {
        self.targets = PoseColumns::from_rows("landmarks", rows, self.num_agents())?;
        Ok(())
    }

    /// Pairwise distances, bearings, and overlaps between all agents.
    #[must_use]
    pub fn check_collisions(&self) -> CollisionReport {
        let n = self.num_agents();
        let diameter = self.config.diameter;
        let (xs, ys) = (&self.positions.x, &self.positions.y);

        let distances = DMatrix::from_fn(n, n, |i, j| (xs[j] - xs[i]).hypot(ys[j] - ys[i]));
        let angles = DMatrix::from_fn(n, n, |i, j| (ys[j] - ys[i]).atan2(xs[j] - xs[i]));
        let overlaps = DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                0.0
            } else {
                (diameter - distances[(i, j)]).max(0.0)
            }
        });
        let collisions = overlaps.iter().any(|&overlap| overlap > 0.0);

        CollisionReport {
            collisions,
            overlaps,
            distances,
            angles,
        }
    }

    /// Pushes overlapping agents apart in a single pass and clips them back into the arena.
    ///
    /// Each agent moves by half of every overlap it is part of, directly away from the
    /// other agent. A pair is separated exactly; three or more mutually overlapping
    /// agents may keep some residual overlap after one pass.
    ///
    /// Returns whether any overlap was found.
    pub fn resolve_collisions(&mut self) -> bool {
        let report = self.check_collisions();
        if !report.collisions {
            return false;
        }

        let n = self.num_agents();
        let lower = self.config.lower_limit();
        let (limit_x, limit_y) = (self.config.limit_x(), self.config.limit_y());
        for i in 0..n {
            let mut dx = 0.0;
            let mut dy = 0.0;
            let (overlaps, angles) = (report.overlaps.row(i), report.angles.row(i));
            for (&overlap, &angle) in overlaps.iter().zip(angles.iter()) {
                if overlap == 0.0 {
                    continue;
                }
                dx += 0.5 * overlap * angle.cos();
                dy += 0.5 * overlap * angle.sin();
            }
            self.positions.x[i] = (self.positions.x[i] - dx).clamp(lower, limit_x);
            self.positions.y[i] = (self.positions.y[i] - dy).clamp(lower, limit_y);
        }
        trace!("resolved overlaps");
        true
    }

    /// Proportional go-to-target commands; agents within the distance margin get zero.
    #[must_use]
    pub fn compute_low_level_control(&self) -> ControlCommands {
        let (distances, mut bearings): (Vec<f64>, Vec<f64>) = self
            .positions
            .iter()
            .zip(self.targets.iter())
            .map(|(pose, target)| {
                let (dx, dy) = (target.x - pose.x, target.y - pose.y);
                (dx.hypot(dy), dy.atan2(dx))
            })
            .unzip();
        demap_angles(&mut bearings);
        let mut heading_errors: Vec<f64> = bearings
            .iter()
            .zip(&self.positions.heading)
            .map(|(bearing, heading)| bearing - heading)
            .collect();
        map_angles(&mut heading_errors);

        let margin = self.config.distance_margin;
        let (v, w) = distances
            .iter()
            .zip(heading_errors)
            .map(|(&distance, error)| {
                if distance < margin {
                    (0.0, 0.0)
                } else {
                    (self.config.kp_v * distance, self.config.kp_w * error)
                }
            })
            .unzip();
        ControlCommands { v, w }
    }

    /// Integrates the unicycle model over one tick with `n_runs` Euler sub-steps.
    ///
    /// After every sub-step positions are clipped, headings wrapped to `[0, 2π)`, and
    /// overlaps resolved.
    pub fn dynamics(&mut self, commands: &ControlCommands) -> Result<(), SwarmError> {
        let n = self.num_agents();
        if commands.v.len() != n || commands.w.len() != n {
            return Err(SwarmError::ShapeMismatch {
                what: "control commands",
                expected_rows: 2,
                expected_cols: n,
                rows: 2,
                cols: commands.v.len().min(commands.w.len()),
            });
        }

        let dt = self.config.dt_sim();
        let lower = self.config.lower_limit();
        let (limit_x, limit_y) = (self.config.limit_x(), self.config.limit_y());
        for _ in 0..self.config.n_runs {
            for i in 0..n {
                let heading = self.positions.heading[i];
                let v = commands.v[i];
                self.positions.x[i] =
                    (self.positions.x[i] + dt * v * heading.cos()).clamp(lower, limit_x);
                self.positions.y[i] =
                    (self.positions.y[i] + dt * v * heading.sin()).clamp(lower, limit_y);
                self.positions.heading[i] = wrap_unsigned(heading + dt * commands.w[i]);
            }
            self.resolve_collisions();
        }
        Ok(())
    }

    /// Adopts `references` as targets and advances the swarm by one tick.
    pub fn step<P: AsRef<[f64]>>(&mut self, references: &[P]) -> Result<SwarmSnapshot, SwarmError> {
        self.set_landmarks(references)?;
        let mut commands = self.compute_low_level_control();
        commands.saturate(self.config.max_linear_speed, self.config.max_angular_speed);
        self.dynamics(&commands)?;
        Ok(self.snapshot())
    }

    fn checked_columns(
        &self,
        what: &'static str,
        columns: &PoseColumns,
    ) -> Result<PoseColumns, SwarmError> {
        PoseColumns::from_rows(what, &columns.rows(), self.num_agents())
    }

    fn random_poses<R: Rng + ?Sized>(&self, rng: &mut R) -> PoseColumns {
        let n = self.num_agents();
        let lower = self.config.lower_limit();
        let span_x = self.config.limit_x() - lower;
        let span_y = self.config.limit_y() - lower;
        let x = (0..n).map(|_| rng.random::<f64>() * span_x + lower).collect();
        let y = (0..n).map(|_| rng.random::<f64>() * span_y + lower).collect();
        let heading = (0..n).map(|_| rng.random::<f64>() * TAU).collect();
        PoseColumns { x, y, heading }
    }
}
