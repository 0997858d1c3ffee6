use crate::{
    Compartments, Observable, ParameterId, RateParameters, SimulationError, TimeGrid, Trajectory,
};

/// A model that can be re-parameterised and simulated on a time grid.
///
/// Calibration only talks to models through this trait, so it works for the
/// ODE engine and for any other implementation that produces trajectories of
/// the four compartments.
pub trait SimulationEngine: Clone {
    /// Fixed initial conditions used by every simulation
    fn initial_state(&self) -> Compartments;

    /// Current rate parameters
    fn parameters(&self) -> RateParameters;

    /// Update a single rate parameter
    fn set_parameter(
        &mut self,
        parameter_id: ParameterId,
        value: f64,
    ) -> Result<(), SimulationError>;

    /// Integrate from the initial state, reporting one state per grid point
    fn simulate(&self, grid: &TimeGrid) -> Result<Trajectory, SimulationError>;

    /// Integrate and reduce every state to the observed scalar
    fn project(
        &self,
        grid: &TimeGrid,
        observable: &Observable,
    ) -> Result<Vec<f64>, SimulationError> {
        Ok(self.simulate(grid)?.project(observable))
    }
}
