//! Named leader/follower formations.
//!
//! A formation is a leader target pose plus one offset per follower, expressed relative to
//! the leader. Only five-agent formations (one leader, four followers) are tabulated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use swarmsim_core::Pose;
use thiserror::Error;

/// Number of agents the formation tables describe.
pub const FORMATION_AGENTS: usize = 5;

/// Errors raised when looking up formations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormationError {
    #[error("unknown formation `{0}`")]
    UnknownFormation(String),
    #[error("formations are tabulated for five agents, got {0}")]
    UnsupportedAgentCount(usize),
}

/// Formations with tabulated follower offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Formation {
    #[default]
    VerticalLine,
    Triangle,
    Pentagon,
}

impl Formation {
    /// Every known formation.
    pub const ALL: [Formation; 3] = [Self::VerticalLine, Self::Triangle, Self::Pentagon];

    /// Name accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::VerticalLine => "vertical_line",
            Self::Triangle => "triangle",
            Self::Pentagon => "pentagon",
        }
    }

    /// Unscaled follower offsets as `(dx, dy)` pairs.
    const fn unit_offsets(self) -> [(f64, f64); FORMATION_AGENTS - 1] {
        match self {
            Self::VerticalLine => [(0.0, 2.0), (0.0, -2.0), (0.0, 4.0), (0.0, -4.0)],
            Self::Triangle => [(2.0, 2.0), (-2.0, 2.0), (4.0, 4.0), (-4.0, 4.0)],
            Self::Pentagon => [(4.0, 2.0), (-4.0, 2.0), (2.0, 5.0), (-2.0, 5.0)],
        }
    }
}

impl fmt::Display for Formation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Formation {
    type Err = FormationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|formation| formation.name() == s)
            .ok_or_else(|| FormationError::UnknownFormation(s.to_owned()))
    }
}

/// Leader target and follower offsets for one formation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationTargets {
    pub leader: Pose,
    /// Offsets relative to the leader, one per follower (heading offsets are zero).
    pub follower_offsets: Vec<Pose>,
}

impl FormationTargets {
    /// Absolute target pose of every agent, leader first.
    #[must_use]
    pub fn absolute_targets(&self) -> Vec<Pose> {
        std::iter::once(self.leader)
            .chain(self.follower_offsets.iter().map(|offset| {
                Pose::new(
                    self.leader.x + offset.x,
                    self.leader.y + offset.y,
                    self.leader.heading + offset.heading,
                )
            }))
            .collect()
    }
}

/// Produces formation targets around a configurable leader position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormationGenerator {
    num_agents: usize,
    pub leader_target_x: f64,
    pub leader_target_y: f64,
    /// Scale applied to x offsets.
    pub dx: f64,
    /// Scale applied to y offsets.
    pub dy: f64,
}

impl FormationGenerator {
    /// Generator with the default leader target (175, 120) and offset scale 10.
    pub fn new(num_agents: usize) -> Result<Self, FormationError> {
        Self::with_leader_target(num_agents, 175.0, 120.0)
    }

    pub fn with_leader_target(
        num_agents: usize,
        leader_target_x: f64,
        leader_target_y: f64,
    ) -> Result<Self, FormationError> {
        if num_agents != FORMATION_AGENTS {
            return Err(FormationError::UnsupportedAgentCount(num_agents));
        }
        Ok(Self {
            num_agents,
            leader_target_x,
            leader_target_y,
            dx: 10.0,
            dy: 10.0,
        })
    }

    #[must_use]
    pub fn num_agents(&self) -> usize {
        self.num_agents
    }

    pub fn set_leader_target(&mut self, x: f64, y: f64) {
        self.leader_target_x = x;
        self.leader_target_y = y;
    }

    /// Leader pose and scaled follower offsets for `formation`.
    #[must_use]
    pub fn targets(&self, formation: Formation) -> FormationTargets {
        FormationTargets {
            leader: Pose::new(self.leader_target_x, self.leader_target_y, 0.0),
            follower_offsets: formation
                .unit_offsets()
                .iter()
                .map(|&(x, y)| Pose::new(self.dx * x, self.dy * y, 0.0))
                .collect(),
        }
    }

    /// Looks a formation up by name.
    pub fn targets_by_name(&self, name: &str) -> Result<FormationTargets, FormationError> {
        Ok(self.targets(name.parse()?))
    }
}
