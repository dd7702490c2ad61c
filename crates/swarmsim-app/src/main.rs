use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use swarmsim_app::{Simulation, SimulationConfig};
use swarmsim_formation::Formation;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "swarmsim",
    version,
    about = "Drive a simulated swarm into formation with distributed Smith dynamics"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a formation scenario headlessly and print the final summary as JSON.
    Run {
        /// JSON scenario file; omitted fields take their defaults.
        #[arg(short, long, env = "SWARMSIM_CONFIG")]
        config: Option<PathBuf>,
        /// Target formation (vertical_line, triangle, pentagon).
        #[arg(long)]
        formation: Option<Formation>,
        /// Tick budget.
        #[arg(long)]
        steps: Option<u64>,
        /// Seed for random placement of anything not given explicitly.
        #[arg(long)]
        seed: Option<u64>,
        /// Toggle a communication link before running, as `I,J` (0-based, repeatable).
        #[arg(long = "toggle-edge", value_parser = parse_edge)]
        toggle_edges: Vec<(usize, usize)>,
    },
    /// List the available formations.
    Formations,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            formation,
            steps,
            seed,
            toggle_edges,
        } => run_command(config, formation, steps, seed, &toggle_edges)?,
        Command::Formations => {
            for formation in Formation::ALL {
                println!("{formation}");
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_command(
    config_path: Option<PathBuf>,
    formation: Option<Formation>,
    steps: Option<u64>,
    seed: Option<u64>,
    toggle_edges: &[(usize, usize)],
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => load_config(&path)?,
        None => SimulationConfig::default(),
    };
    if let Some(formation) = formation {
        config.formation = formation;
    }
    if let Some(steps) = steps {
        config.simulation_steps = steps;
    }
    if seed.is_some() {
        config.swarm.rng_seed = seed;
    }

    let mut simulation = Simulation::new(config).context("failed to build simulation")?;
    for &(i, j) in toggle_edges {
        let linked = simulation
            .toggle_edge(i, j)
            .with_context(|| format!("failed to toggle link {i},{j}"))?;
        info!(i, j, linked, "communication link toggled");
    }

    let summary = simulation.run().context("simulation failed")?;
    if !summary.settled {
        warn!(
            ticks = summary.ticks,
            "swarm still moving when the tick budget ran out"
        );
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn load_config(path: &Path) -> Result<SimulationConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
}

fn parse_edge(raw: &str) -> Result<(usize, usize)> {
    let Some((i, j)) = raw.split_once(',') else {
        bail!("expected `I,J`, got `{raw}`");
    };
    Ok((i.trim().parse()?, j.trim().parse()?))
}
