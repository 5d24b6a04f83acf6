//! stomp_planner - planning sessions for stochastic trajectory optimization
//!
//! This crate resolves the start and goal of a motion planning request,
//! repairs seed trajectories, runs a stochastic optimizer under a
//! cancellation watchdog and turns its output into a timed, validated
//! joint trajectory.

// Core modules
pub mod common;
pub mod config;
pub mod utils;

// Planning modules
pub mod kinematics;
pub mod seed;
pub mod planner;
pub mod arm_navigation;

#[cfg(test)]
pub(crate) mod testing;

// Re-export common types for convenience
pub use common::{JointConfiguration, TrajectoryMatrix, CartesianWaypoint, PlanningRequest, TimedTrajectory};
pub use common::{RobotModel, CollisionModel, Optimizer, IkSolver, TimeParameterizer};
pub use common::{ErrorCategory, PlanningError, PlanningResult};
pub use config::{load_group_configs, InitializationMethod, PlannerConfig, StompConfig};
pub use planner::{PlannerCollaborators, PlanningOutcome, StompPlanner};
