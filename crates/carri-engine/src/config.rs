/// Simulation run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Maximum number of steps to run (0 = unlimited).
    pub max_steps: usize,
    /// Load the next iteration batch after this many steps (0 = only when
    /// no actor has a legal action).
    pub steps_per_iteration: usize,
    /// Stop once no actor acts and no iteration batch is left.
    pub stop_when_idle: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            steps_per_iteration: 0,
            stop_when_idle: true,
        }
    }
}
