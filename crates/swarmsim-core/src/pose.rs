//! Planar poses stored column-wise (one vector per coordinate).

use serde::{Deserialize, Serialize};

use crate::SwarmError;

/// Number of rows in a pose array: x, y, heading.
pub const POSE_ROWS: usize = 3;

/// Single planar pose.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Pose {
    #[must_use]
    pub const fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    /// Euclidean distance between the planar components of two poses.
    #[must_use]
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Poses for `N` agents laid out as three columns (`x`, `y`, `heading`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PoseColumns {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub heading: Vec<f64>,
}

impl PoseColumns {
    /// All-zero poses for `len` agents.
    #[must_use]
    pub fn zeros(len: usize) -> Self {
        Self {
            x: vec![0.0; len],
            y: vec![0.0; len],
            heading: vec![0.0; len],
        }
    }

    /// Validates a `(3, len)` row array and copies it into columns.
    pub fn from_rows<R: AsRef<[f64]>>(
        what: &'static str,
        rows: &[R],
        len: usize,
    ) -> Result<Self, SwarmError> {
        let shape_error = |cols: usize| SwarmError::ShapeMismatch {
            what,
            expected_rows: POSE_ROWS,
            expected_cols: len,
            rows: rows.len(),
            cols,
        };
        let [x, y, heading] = rows else {
            let cols = rows.first().map_or(0, |row| row.as_ref().len());
            return Err(shape_error(cols));
        };
        for row in [x, y, heading] {
            if row.as_ref().len() != len {
                return Err(shape_error(row.as_ref().len()));
            }
        }
        Ok(Self {
            x: x.as_ref().to_vec(),
            y: y.as_ref().to_vec(),
            heading: heading.as_ref().to_vec(),
        })
    }

    /// Builds columns from a list of poses.
    #[must_use]
    pub fn from_poses(poses: &[Pose]) -> Self {
        Self {
            x: poses.iter().map(|p| p.x).collect(),
            y: poses.iter().map(|p| p.y).collect(),
            heading: poses.iter().map(|p| p.heading).collect(),
        }
    }

    /// Number of agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Borrow the three rows in `(x, y, heading)` order.
    #[must_use]
    pub fn rows(&self) -> [&[f64]; POSE_ROWS] {
        [&self.x, &self.y, &self.heading]
    }

    /// Pose of agent `idx`.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<Pose> {
        Some(Pose::new(
            *self.x.get(idx)?,
            *self.y.get(idx)?,
            *self.heading.get(idx)?,
        ))
    }

    /// Iterate over per-agent poses.
    pub fn iter(&self) -> impl Iterator<Item = Pose> + '_ {
        self.x
            .iter()
            .zip(&self.y)
            .zip(&self.heading)
            .map(|((&x, &y), &heading)| Pose::new(x, y, heading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_accepts_three_by_n() {
        let rows = [vec![1.0, 2.0], vec![3.0, 4.0], vec![0.0, 0.5]];
        let columns = PoseColumns::from_rows("poses", &rows, 2).expect("columns");
        assert_eq!(columns.get(1), Some(Pose::new(2.0, 4.0, 0.5)));
        assert_eq!(columns.rows()[1], &[3.0, 4.0]);
    }

    #[test]
    fn from_rows_reports_actual_shape() {
        let rows = [vec![1.0, 2.0], vec![3.0, 4.0]];
        let err = PoseColumns::from_rows("poses", &rows, 2).expect_err("two rows");
        assert!(matches!(
            err,
            SwarmError::ShapeMismatch {
                rows: 2,
                cols: 2,
                ..
            }
        ));

        let rows = [vec![1.0], vec![3.0, 4.0], vec![0.0, 0.5]];
        let err = PoseColumns::from_rows("poses", &rows, 2).expect_err("ragged");
        assert!(matches!(
            err,
            SwarmError::ShapeMismatch {
                rows: 3,
                cols: 1,
                ..
            }
        ));
    }

    #[test]
    fn poses_round_trip_through_columns() {
        let poses = [Pose::new(1.0, 2.0, 0.0), Pose::new(3.0, 4.0, 1.0)];
        let columns = PoseColumns::from_poses(&poses);
        assert_eq!(columns.iter().collect::<Vec<_>>(), poses.to_vec());
        assert!((poses[0].distance_to(&poses[1]) - 8.0_f64.sqrt()).abs() < 1e-12);
    }
}
