//! Error types for stomp_planner

use std::time::Duration;

use thiserror::Error;

/// Coarse classification of a planning failure.
///
/// Lets callers tell "retry with a different goal" apart from
/// "infrastructure failure" without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed configuration or planning group; nothing was attempted
    Configuration,
    /// Start, goal or seed could not be resolved; the optimizer never ran
    Resolution,
    /// The optimizer failed or was cancelled
    Optimization,
    /// Time parameterization or path validation failed
    Postprocessing,
}

/// Main error type for planning sessions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanningError {
    /// Invalid planner or optimizer parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Planning group exists but has nothing to move
    #[error("Planning group '{group}' has no active joints")]
    NoActiveJoints { group: String },
    /// Planning group is not known to the robot model
    #[error("Planning group '{group}' was not found")]
    UnknownGroup { group: String },

    #[error("Start state is invalid: {0}")]
    InvalidStartState(String),
    #[error("Start joint pose is out of bounds")]
    StartOutOfBounds,
    #[error("Unable to retrieve a joint goal from the request")]
    NoJointGoalFound,
    #[error("Failed to solve IK for the start waypoint")]
    StartIkFailed,
    #[error("Failed to solve IK for the goal waypoint")]
    GoalIkFailed,
    #[error("IK failed for waypoint {index}")]
    IkFailed { index: usize },
    #[error("Ambiguous seed type: {0}")]
    AmbiguousSeedType(String),

    #[error("Seed trajectory is malformed: {0}")]
    InvalidSeed(String),
    #[error("Found {steps} points in seed trajectory, at least 3 are required")]
    InsufficientSeedLength { steps: usize },
    #[error("Start state is {distance:.4} away from the seed start (max {threshold})")]
    SeedStartMismatch { distance: f64, threshold: f64 },
    #[error("Requested goal is {distance:.4} away from the seed goal (max {threshold})")]
    SeedGoalMismatch { distance: f64, threshold: f64 },
    #[error("No goal constraint in the request is satisfiable")]
    NoSatisfiableGoal,
    #[error("Seed smoothing failed: {0}")]
    SmoothingFailed(String),

    #[error("Optimization failed: {0}")]
    OptimizationFailed(String),
    #[error("Optimization was cancelled after {elapsed:?}")]
    Cancelled { elapsed: Duration },
    #[error("Planning session has already been used")]
    SessionReused,

    #[error("Failed to generate timing data: {0}")]
    TimeParameterizationFailed(String),
    #[error("Trajectory is in collision")]
    PathInCollision,

    #[error("Visualization error: {0}")]
    Visualization(String),
}

impl PlanningError {
    pub fn category(&self) -> ErrorCategory {
        use PlanningError::*;
        match self {
            InvalidConfig(_) | NoActiveJoints { .. } | UnknownGroup { .. } | Visualization(_) => {
                ErrorCategory::Configuration
            }
            InvalidStartState(_)
            | StartOutOfBounds
            | NoJointGoalFound
            | StartIkFailed
            | GoalIkFailed
            | IkFailed { .. }
            | AmbiguousSeedType(_)
            | InvalidSeed(_)
            | InsufficientSeedLength { .. }
            | SeedStartMismatch { .. }
            | SeedGoalMismatch { .. }
            | NoSatisfiableGoal
            | SmoothingFailed(_) => ErrorCategory::Resolution,
            OptimizationFailed(_) | Cancelled { .. } | SessionReused => ErrorCategory::Optimization,
            TimeParameterizationFailed(_) | PathInCollision => ErrorCategory::Postprocessing,
        }
    }
}

/// Result type alias for planning operations
pub type PlanningResult<T> = Result<T, PlanningError>;
