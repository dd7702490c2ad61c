use rand::rngs::SmallRng;
use serde::Serialize;
use swarmsim_consensus::{ConsensusConfig, ConsensusController, complete_graph};
use swarmsim_core::{DMatrix, PoseColumns, Swarm, SwarmSnapshot};
use swarmsim_formation::{FormationGenerator, FormationTargets};
use tracing::{debug, info};

use crate::{SimulationConfig, SimulationError};

/// Populations driven by the controller: x and y.
const POPULATIONS: usize = 2;

/// Outcome of a single orchestration tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub snapshot: SwarmSnapshot,
    /// Every pose is bit-identical to the previous tick.
    pub settled: bool,
}

/// Outcome of [`Simulation::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub settled: bool,
    pub snapshot: SwarmSnapshot,
    /// Distance between the leader and its formation target.
    pub leader_error: f64,
}

/// Drives the consensus controller and the swarm in lockstep toward a formation.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    swarm: Swarm,
    controller: ConsensusController,
    adjacency: DMatrix<f64>,
    targets: FormationTargets,
    rng: SmallRng,
    tick: u64,
    last_positions: PoseColumns,
}

impl Simulation {
    /// Builds every component from `config` and performs an initial reset.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        if config.simulation_steps == 0 {
            return Err(SimulationError::InvalidConfig(
                "simulation_steps must be non-zero",
            ));
        }
        let swarm = Swarm::with_config(config.swarm.clone())?;
        let n = swarm.num_agents();

        let gamma = vec![config.swarm.arena_width, config.swarm.arena_height];
        let epsilon = gamma
            .iter()
            .map(|g| ConsensusConfig::stable_epsilon(*g, config.stability_margin))
            .collect();
        let mut consensus = ConsensusConfig::new(n, POPULATIONS, epsilon, gamma);
        consensus.freeze_leader = config.freeze_leader;
        let mut controller = ConsensusController::new(consensus)?;

        let adjacency = match &config.adjacency {
            Some(rows) => adjacency_from_rows(rows)?,
            None => complete_graph(n),
        };
        controller.set_adjacency(Some(&adjacency))?;

        let mut generator =
            FormationGenerator::with_leader_target(n, config.leader_target_x, config.leader_target_y)?;
        generator.dx = config.offset_scale_x;
        generator.dy = config.offset_scale_y;
        let targets = generator.targets(config.formation);

        let rng = config.swarm.seeded_rng();
        let last_positions = swarm.positions().clone();
        let mut simulation = Self {
            config,
            swarm,
            controller,
            adjacency,
            targets,
            rng,
            tick: 0,
            last_positions,
        };
        simulation.reset()?;
        Ok(simulation)
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub fn swarm(&self) -> &Swarm {
        &self.swarm
    }

    #[must_use]
    pub fn controller(&self) -> &ConsensusController {
        &self.controller
    }

    /// Robot-level communication graph currently in force.
    #[must_use]
    pub fn adjacency(&self) -> &DMatrix<f64> {
        &self.adjacency
    }

    #[must_use]
    pub fn formation_targets(&self) -> &FormationTargets {
        &self.targets
    }

    /// Ticks elapsed since the last reset.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Puts agents back at their initial poses and seeds the controller state from them.
    ///
    /// The leader's consensus slot starts at `num_agents * gamma`, a mass reservoir the
    /// followers draw from.
    pub fn reset(&mut self) -> Result<SwarmSnapshot, SimulationError> {
        let initial = (!self.config.initial_positions.is_empty())
            .then(|| PoseColumns::from_poses(&self.config.initial_positions));
        let snapshot = self.swarm.reset(&mut self.rng, initial.as_ref(), None)?;

        let n = self.swarm.num_agents();
        let gamma = self.controller.gamma().to_vec();
        let mut x0 = Vec::with_capacity(n * POPULATIONS);
        for (population, row) in [&snapshot.positions.x, &snapshot.positions.y]
            .into_iter()
            .enumerate()
        {
            x0.extend_from_slice(row);
            x0[population * n] = n as f64 * gamma[population];
        }
        self.controller.reset_to(&x0)?;

        self.tick = 0;
        self.last_positions = snapshot.positions.clone();
        info!(
            agents = n,
            formation = %self.config.formation,
            "simulation reset"
        );
        Ok(snapshot)
    }

    /// One orchestration tick: consensus step, reference shaping, swarm step.
    pub fn tick_once(&mut self) -> Result<TickReport, SimulationError> {
        let n = self.swarm.num_agents();
        let leader = self
            .swarm
            .positions()
            .get(0)
            .ok_or(SimulationError::InvalidConfig("swarm has no leader"))?;

        let offsets = &self.targets.follower_offsets;
        let signals = [
            std::iter::once(-leader.x)
                .chain(offsets.iter().map(|o| o.x))
                .collect::<Vec<_>>(),
            std::iter::once(-leader.y)
                .chain(offsets.iter().map(|o| o.y))
                .collect::<Vec<_>>(),
        ];
        let consensus = self.controller.step(&signals)?;

        let (xs, ys) = consensus.split_at(n);
        let mut references = [xs.to_vec(), ys.to_vec(), vec![0.0; n]];
        references[0][0] = self.targets.leader.x;
        references[1][0] = self.targets.leader.y;

        let snapshot = self.swarm.step(&references)?;
        self.tick += 1;
        let settled = snapshot.positions == self.last_positions;
        self.last_positions = snapshot.positions.clone();
        Ok(TickReport {
            tick: self.tick,
            snapshot,
            settled,
        })
    }

    /// Ticks until the swarm stops moving or the step budget runs out.
    ///
    /// The tick counter restarts at zero afterwards, so a later `run` gets a full budget
    /// from wherever the swarm stopped.
    pub fn run(&mut self) -> Result<RunSummary, SimulationError> {
        let budget = self.config.simulation_steps;
        let mut report = self.tick_once()?;
        while !report.settled && self.tick < budget {
            report = self.tick_once()?;
        }

        let leader_error = report
            .snapshot
            .positions
            .get(0)
            .map_or(f64::INFINITY, |leader| leader.distance_to(&self.targets.leader));
        if report.settled {
            info!(ticks = self.tick, leader_error, "swarm settled");
        } else {
            info!(ticks = self.tick, leader_error, "tick budget exhausted");
        }
        let ticks = self.tick;
        self.tick = 0;
        Ok(RunSummary {
            ticks,
            settled: report.settled,
            snapshot: report.snapshot,
            leader_error,
        })
    }

    /// Flips the link between agents `i` and `j` in both directions and pushes the new
    /// graph to the controller.
    pub fn toggle_edge(&mut self, i: usize, j: usize) -> Result<bool, SimulationError> {
        let n = self.swarm.num_agents();
        if i == j || i >= n || j >= n {
            return Err(SimulationError::InvalidEdge(i, j));
        }
        let mut adjacency = self.adjacency.clone();
        for (a, b) in [(i, j), (j, i)] {
            adjacency[(a, b)] = 1.0 - adjacency[(a, b)];
        }
        self.controller.set_adjacency(Some(&adjacency))?;
        let linked = adjacency[(i, j)] > 0.0;
        self.adjacency = adjacency;
        debug!(i, j, linked, "link toggled");
        Ok(linked)
    }
}

/// Square matrix from configured rows; ragged rows are rejected.
fn adjacency_from_rows(rows: &[Vec<f64>]) -> Result<DMatrix<f64>, SimulationError> {
    let cols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|row| row.len() != cols) {
        return Err(SimulationError::InvalidConfig(
            "adjacency rows must all have the same length",
        ));
    }
    Ok(DMatrix::from_fn(rows.len(), cols, |i, j| rows[i][j]))
}
