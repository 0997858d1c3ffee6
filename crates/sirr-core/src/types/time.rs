use serde::{Deserialize, Serialize};

use crate::SimulationError;

/// An ordered, strictly increasing, non-empty sequence of time points.
///
/// The first point is the initial time of every integration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct TimeGrid {
    points: Vec<f64>,
}

impl TimeGrid {
    pub fn new(points: Vec<f64>) -> Result<Self, SimulationError> {
        if points.is_empty() {
            return Err(SimulationError::invalid_input("time grid is empty"));
        }
        if let Some(t) = points.iter().find(|t| !t.is_finite()) {
            return Err(SimulationError::invalid_input(format!(
                "time grid contains a non-finite point ({})",
                t
            )));
        }
        if let Some(i) = points.windows(2).position(|w| w[1] <= w[0]) {
            return Err(SimulationError::invalid_input(format!(
                "time grid must be strictly increasing (t[{}] = {} is followed by t[{}] = {})",
                i,
                points[i],
                i + 1,
                points[i + 1]
            )));
        }
        Ok(Self { points })
    }

    /// `n` evenly spaced points from `start` to `end` inclusive
    pub fn linspace(start: f64, end: f64, n: usize) -> Result<Self, SimulationError> {
        if n == 0 {
            return Err(SimulationError::invalid_input(
                "time grid needs at least one point",
            ));
        }
        if n == 1 {
            return Self::new(vec![start]);
        }
        let step = (end - start) / (n - 1) as f64;
        let mut points: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
        points[n - 1] = end;
        Self::new(points)
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> f64 {
        self.points[0]
    }

    pub fn end(&self) -> f64 {
        self.points[self.points.len() - 1]
    }
}

impl TryFrom<Vec<f64>> for TimeGrid {
    type Error = SimulationError;

    fn try_from(points: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<TimeGrid> for Vec<f64> {
    fn from(grid: TimeGrid) -> Self {
        grid.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linspace_hits_both_ends() {
        let grid = TimeGrid::linspace(0.0, 50.0, 365).unwrap();
        assert_eq!(grid.len(), 365);
        assert_eq!(grid.start(), 0.0);
        assert_eq!(grid.end(), 50.0);
        assert!((grid.points()[1] - 50.0 / 364.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_point_grid() {
        let grid = TimeGrid::linspace(3.0, 10.0, 1).unwrap();
        assert_eq!(grid.points(), &[3.0]);
        assert_eq!(grid.start(), grid.end());
        assert_eq!(grid.len(), 1);
        assert!(!grid.is_empty());
    }

    #[test]
    fn test_rejects_malformed_grids() {
        assert!(TimeGrid::new(vec![]).is_err());
        assert!(TimeGrid::new(vec![0.0, 1.0, 1.0]).is_err());
        assert!(TimeGrid::new(vec![0.0, 2.0, 1.0]).is_err());
        assert!(TimeGrid::new(vec![0.0, f64::NAN]).is_err());
        assert!(TimeGrid::linspace(0.0, 1.0, 0).is_err());
        assert!(TimeGrid::linspace(5.0, 1.0, 3).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let grid: TimeGrid = serde_json::from_str("[0.0, 0.5, 1.0]").unwrap();
        assert_eq!(grid.len(), 3);
        assert!(serde_json::from_str::<TimeGrid>("[1.0, 0.0]").is_err());
    }
}
