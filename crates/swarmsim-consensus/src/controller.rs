use rand::Rng;
use swarmsim_core::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::{ConfigWarning, ConsensusConfig, ConsensusError, complete_graph};

/// Distributed Smith-dynamics controller over `num_robots × num_populations` scalar states.
///
/// State is laid out population-major: slot `p * num_robots + r` holds robot `r`'s opinion in
/// population `p`. Robot 0 is the leader of every population; its fitness ignores its own
/// opinion.
#[derive(Debug, Clone)]
pub struct ConsensusController {
    num_robots: usize,
    num_populations: usize,
    epsilon: Vec<f64>,
    gamma: Vec<f64>,
    /// Diagonal of the step-size matrix, one entry per state slot.
    step_sizes: Vec<f64>,
    adjacency: DMatrix<f64>,
    expanded_adjacency: DMatrix<f64>,
    x: Vec<f64>,
    fitness: Vec<f64>,
    laplacian: DMatrix<f64>,
    warnings: Vec<ConfigWarning>,
}

impl ConsensusController {
    /// Builds a controller on the complete graph with an all-zero state.
    pub fn new(config: ConsensusConfig) -> Result<Self, ConsensusError> {
        let resolved = config.resolve()?;
        for warning in &resolved.warnings {
            warn!(%warning, "broadcasting consensus parameter");
        }

        let nr = config.num_robots;
        let np = config.num_populations;
        let n = nr * np;
        let step_sizes = (0..n)
            .map(|slot| {
                if config.freeze_leader && slot % nr == 0 {
                    0.0
                } else {
                    resolved.epsilon[slot / nr]
                }
            })
            .collect();

        let mut controller = Self {
            num_robots: nr,
            num_populations: np,
            epsilon: resolved.epsilon,
            gamma: resolved.gamma,
            step_sizes,
            adjacency: DMatrix::zeros(nr, nr),
            expanded_adjacency: DMatrix::zeros(n, n),
            x: vec![0.0; n],
            fitness: vec![0.0; n],
            laplacian: DMatrix::zeros(n, n),
            warnings: resolved.warnings,
        };
        controller.set_adjacency(None)?;
        Ok(controller)
    }

    #[must_use]
    pub fn num_robots(&self) -> usize {
        self.num_robots
    }

    #[must_use]
    pub fn num_populations(&self) -> usize {
        self.num_populations
    }

    /// Length of the state vector.
    #[must_use]
    pub fn len(&self) -> usize {
        self.num_robots * self.num_populations
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolved step size per population.
    #[must_use]
    pub fn epsilon(&self) -> &[f64] {
        &self.epsilon
    }

    /// Resolved saturation bound per population.
    #[must_use]
    pub fn gamma(&self) -> &[f64] {
        &self.gamma
    }

    /// Warnings raised while resolving the configuration.
    #[must_use]
    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    /// Robot-level adjacency currently in use (zero diagonal).
    #[must_use]
    pub fn adjacency(&self) -> &DMatrix<f64> {
        &self.adjacency
    }

    /// Adjacency repeated across populations.
    #[must_use]
    pub fn expanded_adjacency(&self) -> &DMatrix<f64> {
        &self.expanded_adjacency
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &[f64] {
        &self.x
    }

    /// Owned copy of the current state.
    #[must_use]
    pub fn observe(&self) -> Vec<f64> {
        self.x.clone()
    }

    /// Fitness vector from the most recent step.
    #[must_use]
    pub fn fitness(&self) -> &[f64] {
        &self.fitness
    }

    /// Laplacian built during the most recent step.
    #[must_use]
    pub fn laplacian(&self) -> &DMatrix<f64> {
        &self.laplacian
    }

    /// Sets the state to `x0`, which must hold `num_robots * num_populations` values.
    pub fn reset_to(&mut self, x0: &[f64]) -> Result<Vec<f64>, ConsensusError> {
        if x0.len() != self.len() {
            return Err(ConsensusError::ShapeMismatch {
                what: "x0",
                expected: format!("({},)", self.len()),
                actual: format!("({},)", x0.len()),
            });
        }
        self.x = x0.to_vec();
        Ok(self.observe())
    }

    /// Re-initialises the state from `x0`, or uniformly at random in `[0, 1)` scaled per
    /// population when `x0` is `None`.
    pub fn reset<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        x0: Option<&[f64]>,
        scales: Option<&[f64]>,
    ) -> Result<Vec<f64>, ConsensusError> {
        if let Some(x0) = x0 {
            return self.reset_to(x0);
        }
        if let Some(scales) = scales {
            if scales.len() != self.num_populations {
                return Err(ConsensusError::ShapeMismatch {
                    what: "scales",
                    expected: format!("({},)", self.num_populations),
                    actual: format!("({},)", scales.len()),
                });
            }
        }
        let nr = self.num_robots;
        self.x = (0..self.len())
            .map(|slot| {
                let scale = scales.map_or(1.0, |s| s[slot / nr]);
                rng.random::<f64>() * scale
            })
            .collect();
        Ok(self.observe())
    }

    /// Installs a robot-level 0/1 adjacency matrix, or the complete graph when `None`.
    ///
    /// Self-loops are dropped, remaining weights clipped into `[0, 1]`, and the result is
    /// expanded as `I_populations ⊗ adjacency`.
    pub fn set_adjacency(
        &mut self,
        adjacency: Option<&DMatrix<f64>>,
    ) -> Result<(), ConsensusError> {
        let nr = self.num_robots;
        let cleaned = match adjacency {
            None => complete_graph(nr),
            Some(matrix) => {
                if matrix.shape() != (nr, nr) {
                    return Err(ConsensusError::ShapeMismatch {
                        what: "adjacency",
                        expected: format!("({nr}, {nr})"),
                        actual: format!("{:?}", matrix.shape()),
                    });
                }
                DMatrix::from_fn(nr, nr, |i, j| {
                    if i == j {
                        0.0
                    } else {
                        matrix[(i, j)].clamp(0.0, 1.0)
                    }
                })
            }
        };
        let np = self.num_populations;
        self.expanded_adjacency = DMatrix::<f64>::identity(np, np).kronecker(&cleaned);
        self.adjacency = cleaned;
        debug!(
            edges = self.adjacency.iter().filter(|&&a| a > 0.0).count() / 2,
            "adjacency updated"
        );
        Ok(())
    }

    /// Advances the dynamics one tick.
    ///
    /// `external_signals` has one row per population and one column per robot.
    pub fn step<S: AsRef<[f64]>>(
        &mut self,
        external_signals: &[S],
    ) -> Result<Vec<f64>, ConsensusError> {
        let signals = self.flatten_signals(external_signals)?;
        self.fitness = self.compute_fitness(&signals);
        self.laplacian = self.compute_laplacian();

        let correction = &self.laplacian * DVector::from_column_slice(&self.fitness);
        let updates = self.step_sizes.iter().zip(correction.iter());
        for (x, (step, delta)) in self.x.iter_mut().zip(updates) {
            *x += step * delta;
        }
        Ok(self.observe())
    }

    fn flatten_signals<S: AsRef<[f64]>>(
        &self,
        external_signals: &[S],
    ) -> Result<Vec<f64>, ConsensusError> {
        let shape_error = |cols: usize| ConsensusError::ShapeMismatch {
            what: "external signals",
            expected: format!("({}, {})", self.num_populations, self.num_robots),
            actual: format!("({}, {cols})", external_signals.len()),
        };
        if external_signals.len() != self.num_populations {
            let cols = external_signals.first().map_or(0, |row| row.as_ref().len());
            return Err(shape_error(cols));
        }
        let mut flat = Vec::with_capacity(self.len());
        for row in external_signals {
            let row = row.as_ref();
            if row.len() != self.num_robots {
                return Err(shape_error(row.len()));
            }
            flat.extend_from_slice(row);
        }
        Ok(flat)
    }

    fn is_leader_slot(&self, slot: usize) -> bool {
        slot % self.num_robots == 0
    }

    /// Remaining distance to the reference: `signal - x`, except the leader sees `signal`.
    fn compute_fitness(&self, signals: &[f64]) -> Vec<f64> {
        signals
            .iter()
            .zip(&self.x)
            .enumerate()
            .map(|(slot, (signal, x))| {
                if self.is_leader_slot(slot) {
                    *signal
                } else {
                    signal - x
                }
            })
            .collect()
    }

    /// `diag(M·1) - M` with `M` the saturated, state-modulated adjacency.
    fn compute_laplacian(&self) -> DMatrix<f64> {
        let n = self.len();
        let nr = self.num_robots;
        let f = &self.fitness;
        let x = &self.x;

        let modulated = DMatrix::from_fn(n, n, |i, j| {
            let weight = self.expanded_adjacency[(i, j)];
            if weight == 0.0 {
                return 0.0;
            }
            let gamma = self.gamma[i / nr];
            // positive when i is fitter than j: mass flows from j to i
            let delta = f[i] - f[j];
            let phi = if delta.abs() > gamma {
                gamma / delta.abs()
            } else {
                1.0
            };
            let mass = if delta > 0.0 {
                x[j]
            } else if delta < 0.0 {
                x[i]
            } else {
                0.0
            };
            mass.clamp(-gamma, gamma) * weight * phi
        });

        // column_sum adds the columns together, giving one entry per row
        let degrees = modulated.column_sum();
        DMatrix::from_diagonal(&degrees) - modulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::SmallRng};

    fn controller(nr: usize, np: usize) -> ConsensusController {
        ConsensusController::new(ConsensusConfig::new(nr, np, vec![0.01], vec![5.0]))
            .expect("controller")
    }

    #[test]
    fn default_adjacency_is_complete_and_block_expanded() {
        let c = controller(3, 2);
        assert_eq!(c.adjacency().column_sum(), DVector::from_element(3, 2.0));
        let expanded = c.expanded_adjacency();
        assert_eq!(expanded.shape(), (6, 6));
        assert_eq!(expanded[(0, 1)], 1.0);
        assert_eq!(expanded[(3, 4)], 1.0);
        assert_eq!(expanded[(0, 4)], 0.0);
        for i in 0..6 {
            assert_eq!(expanded[(i, i)], 0.0);
        }
    }

    #[test]
    fn set_adjacency_strips_self_loops() {
        let mut c = controller(3, 1);
        let with_loops =
            DMatrix::from_row_slice(3, 3, &[1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0, 1.0, 2.0]);
        c.set_adjacency(Some(&with_loops)).expect("adjacency");
        for i in 0..3 {
            assert_eq!(c.adjacency()[(i, i)], 0.0);
        }
        assert_eq!(c.adjacency()[(0, 1)], 1.0);
        assert_eq!(c.adjacency()[(0, 2)], 0.0);
        assert_eq!(c.adjacency()[(2, 1)], 1.0);
    }

    #[test]
    fn set_adjacency_rejects_wrong_size() {
        let mut c = controller(3, 1);
        let before = c.adjacency().clone();
        let err = c
            .set_adjacency(Some(&complete_graph(4)))
            .expect_err("4x4 on 3 robots");
        assert!(matches!(err, ConsensusError::ShapeMismatch { what: "adjacency", .. }));
        assert_eq!(c.adjacency(), &before);
    }

    #[test]
    fn fitness_pins_leader_slot() {
        let mut c = controller(3, 2);
        c.reset_to(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).expect("reset");
        c.step(&[[10.0, 10.0, 10.0], [0.0, 1.0, 2.0]]).expect("step");
        assert_eq!(c.fitness(), &[10.0, 8.0, 7.0, 0.0, -4.0, -4.0]);
    }

    #[test]
    fn laplacian_rows_sum_to_zero() {
        let mut c = controller(4, 2);
        let mut rng = SmallRng::seed_from_u64(17);
        c.reset(&mut rng, None, Some(&[20.0, 30.0])).expect("reset");
        c.step(&[[3.0, -1.0, 40.0, 2.0], [-8.0, 0.5, 12.0, 100.0]])
            .expect("step");
        for (row, sum) in c.laplacian().column_sum().iter().enumerate() {
            assert!(sum.abs() < 1e-9, "row {row} sums to {sum}");
        }
    }

    #[test]
    fn populations_do_not_interact() {
        let mut c = controller(3, 2);
        c.reset_to(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).expect("reset");
        let mut single = controller(3, 1);
        single.reset_to(&[1.0, 2.0, 3.0]).expect("reset");

        let both = c
            .step(&[[1.0, 0.0, 4.0], [2.0, 2.0, 2.0]])
            .expect("step");
        let first = single.step(&[[1.0, 0.0, 4.0]]).expect("step");
        assert_eq!(&both[..3], first.as_slice());

        let cross: f64 = (0..3)
            .flat_map(|i| (3..6).map(move |j| (i, j)))
            .map(|(i, j)| c.laplacian()[(i, j)].abs())
            .sum();
        assert_eq!(cross, 0.0);
    }

    #[test]
    fn saturation_caps_edge_weights() {
        let mut c = controller(2, 1);
        c.reset_to(&[100.0, 100.0]).expect("reset");
        c.step(&[[0.0, 1000.0]]).expect("step");
        // f = [0, 900]: |delta| exceeds gamma, so phi = 5/900 and the mass 100 clips to 5
        let expected = 5.0 * 5.0 / 900.0;
        let l = c.laplacian();
        assert!((l[(0, 1)] + expected).abs() < 1e-12);
        assert!((l[(1, 0)] + expected).abs() < 1e-12);
        assert!((l[(0, 0)] - expected).abs() < 1e-12);
        // leader loses mass toward the fitter follower
        assert!((c.state()[0] - (100.0 - 0.01 * 25.0)).abs() < 1e-12);
        assert!((c.state()[1] - (100.0 + 0.01 * 25.0)).abs() < 1e-12);
    }

    #[test]
    fn freeze_leader_keeps_leader_state() {
        let mut config = ConsensusConfig::new(3, 1, vec![0.05], vec![50.0]);
        config.freeze_leader = true;
        let mut c = ConsensusController::new(config).expect("controller");
        c.reset_to(&[5.0, 1.0, 2.0]).expect("reset");
        for _ in 0..10 {
            c.step(&[[-5.0, 3.0, 3.0]]).expect("step");
        }
        assert_eq!(c.state()[0], 5.0);
    }

    #[test]
    fn step_rejects_bad_signal_shapes() {
        let mut c = controller(3, 2);
        c.reset_to(&[1.0; 6]).expect("reset");
        assert!(c.step(&[[1.0, 2.0, 3.0]]).is_err());
        assert!(c.step(&[vec![1.0, 2.0, 3.0], vec![1.0]]).is_err());
        assert_eq!(c.state(), &[1.0; 6]);
    }

    #[test]
    fn reset_validates_lengths() {
        let mut c = controller(3, 2);
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(c.reset(&mut rng, Some(&[1.0; 5]), None).is_err());
        assert!(c.reset(&mut rng, None, Some(&[1.0])).is_err());
        let x = c.reset(&mut rng, None, Some(&[10.0, 0.5])).expect("reset");
        assert!(x[..3].iter().all(|v| (0.0..10.0).contains(v)));
        assert!(x[3..].iter().all(|v| (0.0..0.5).contains(v)));
    }
}
