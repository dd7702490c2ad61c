//! Orchestration loop tying the consensus controller to the swarm engine.

use serde::{Deserialize, Serialize};
use swarmsim_consensus::ConsensusError;
use swarmsim_core::{Pose, SwarmConfig, SwarmError};
use swarmsim_formation::{Formation, FormationError};
use thiserror::Error;

mod simulation;

pub use simulation::{RunSummary, Simulation, TickReport};

/// Errors surfaced by the orchestration layer.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Swarm(#[from] SwarmError),
    #[error(transparent)]
    Consensus(#[from] ConsensusError),
    #[error(transparent)]
    Formation(#[from] FormationError),
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("({0}, {1}) is not a link between two distinct agents")]
    InvalidEdge(usize, usize),
}

/// Scenario description for a formation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Physical swarm parameters; `swarm.rng_seed` also seeds random targets.
    pub swarm: SwarmConfig,
    /// Tick budget for [`Simulation::run`].
    pub simulation_steps: u64,
    pub formation: Formation,
    pub leader_target_x: f64,
    pub leader_target_y: f64,
    /// Scale applied to the formation's x offsets.
    pub offset_scale_x: f64,
    /// Scale applied to the formation's y offsets.
    pub offset_scale_y: f64,
    /// Robot-level 0/1 communication graph; the complete graph when absent.
    pub adjacency: Option<Vec<Vec<f64>>>,
    /// Starting poses, leader first. Empty means random placement.
    pub initial_positions: Vec<Pose>,
    /// `delta` in `epsilon = (1 - delta) / (2 * gamma)`.
    pub stability_margin: f64,
    /// Keep the leader's consensus state fixed.
    pub freeze_leader: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            swarm: SwarmConfig::default(),
            simulation_steps: 350,
            formation: Formation::VerticalLine,
            leader_target_x: 175.0,
            leader_target_y: 120.0,
            offset_scale_x: 10.0,
            offset_scale_y: 10.0,
            adjacency: None,
            initial_positions: [60.0, 120.0, 180.0, 240.0, 300.0]
                .into_iter()
                .map(|x| Pose::new(x, 130.0, 0.0))
                .collect(),
            stability_margin: 1e-3,
            freeze_leader: false,
        }
    }
}
