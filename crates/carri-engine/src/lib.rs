//! Action grounding and simulation for CARRI domains.

pub mod action;
pub mod config;
pub mod simulator;

pub use action::{Action, ActionError, ActionTemplate, Actor, Params, Schedule};
pub use config::SimulationConfig;
pub use simulator::{
    Applied, FirstLegal, Outcome, Policy, Rejected, RunSummary, SimulationError, Simulator,
    Transition,
};
