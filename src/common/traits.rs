//! Interfaces of the collaborators a planning session depends on

use std::time::Duration;

use crate::common::error::PlanningResult;
use crate::common::types::*;
use crate::config::StompConfig;

/// Kinematic model lookup for planning groups
pub trait RobotModel: Send + Sync {
    /// Get the named planning group, if the robot has one
    fn joint_group(&self, name: &str) -> Option<JointModelGroup>;
}

/// Collision and bounds checking against the planning scene
pub trait CollisionModel: Send + Sync {
    /// Check the full path, including the motion between waypoints
    fn is_path_valid(&self, trajectory: &TimedTrajectory, group: &str, verbose: bool) -> bool;
}

/// Stochastic trajectory optimizer.
///
/// All methods take `&self` so that `cancel` can be called from a watchdog
/// while `solve` is still running on another thread.
pub trait Optimizer: Send + Sync {
    fn set_config(&self, config: &StompConfig) -> PlanningResult<()>;

    /// Hand the (already resolved) request to the cost functions
    fn set_motion_plan_request(
        &self,
        _request: &PlanningRequest,
        _config: &StompConfig,
    ) -> PlanningResult<()> {
        Ok(())
    }

    /// Optimize starting from a seed trajectory
    fn solve_seeded(&self, seed: &TrajectoryMatrix) -> PlanningResult<TrajectoryMatrix>;

    /// Optimize between two configurations using the configured initialization
    fn solve(
        &self,
        start: &JointConfiguration,
        goal: &JointConfiguration,
    ) -> PlanningResult<TrajectoryMatrix>;

    /// Request a cooperative stop; false if the request could not be delivered
    fn cancel(&self) -> bool;

    fn clear(&self);
}

/// Numeric inverse kinematics for a single pose
pub trait IkSolver: Send + Sync {
    /// Look up the chain between two named links
    fn chain(&self, base_link: &str, tip_link: &str) -> PlanningResult<KinematicChain>;

    /// Solve for `target`, starting the search at `hint`
    fn solve(
        &self,
        chain: &KinematicChain,
        target: &CartesianWaypoint,
        hint: &JointConfiguration,
        timeout: Duration,
    ) -> Option<JointConfiguration>;
}

/// Assigns timestamps, velocities and accelerations to a geometric path
pub trait TimeParameterizer: Send + Sync {
    /// Mutates the trajectory timing in place; false on failure
    fn compute_timestamps(
        &self,
        trajectory: &mut TimedTrajectory,
        group: &JointModelGroup,
        velocity_scale: f64,
    ) -> bool;
}
