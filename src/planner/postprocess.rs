//! Turns optimizer output into an executable trajectory

use std::fmt;

use tracing::{debug, error};

use crate::common::{
    CollisionModel, JointModelGroup, PlanningError, PlanningRequest, TimeParameterizer,
    TimedTrajectory, TrajectoryMatrix, TrajectoryPoint,
};

/// A failed postprocessing step.
///
/// Collision failures keep the timed trajectory for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct PostprocessFailure {
    pub error: PlanningError,
    pub trajectory: Option<TimedTrajectory>,
}

impl fmt::Display for PostprocessFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl From<PlanningError> for PostprocessFailure {
    fn from(error: PlanningError) -> Self {
        PostprocessFailure { error, trajectory: None }
    }
}

pub struct ResultPostprocessor<'a> {
    group: &'a JointModelGroup,
    parameterizer: &'a dyn TimeParameterizer,
    collision: Option<&'a dyn CollisionModel>,
}

impl<'a> ResultPostprocessor<'a> {
    pub fn new(
        group: &'a JointModelGroup,
        parameterizer: &'a dyn TimeParameterizer,
        collision: Option<&'a dyn CollisionModel>,
    ) -> Self {
        ResultPostprocessor { group, parameterizer, collision }
    }

    /// One waypoint per matrix column, untimed and at rest
    pub fn to_timed_trajectory(&self, parameters: &TrajectoryMatrix) -> TimedTrajectory {
        TimedTrajectory {
            joint_names: self.group.joint_names(),
            points: parameters
                .column_iter()
                .map(|column| TrajectoryPoint::at_rest(column.iter().copied().collect()))
                .collect(),
        }
    }

    pub fn postprocess(
        &self,
        parameters: &TrajectoryMatrix,
        request: &PlanningRequest,
    ) -> Result<TimedTrajectory, PostprocessFailure> {
        if parameters.nrows() != self.group.dof() || parameters.ncols() == 0 {
            return Err(PlanningError::TimeParameterizationFailed(format!(
                "optimizer returned a {}x{} matrix for {} joints",
                parameters.nrows(),
                parameters.ncols(),
                self.group.dof()
            ))
            .into());
        }

        let mut trajectory = self.to_timed_trajectory(parameters);
        if !self.parameterizer.compute_timestamps(
            &mut trajectory,
            self.group,
            request.max_velocity_scaling_factor,
        ) {
            error!(group = %self.group.name, "failed to generate timing data");
            return Err(PlanningError::TimeParameterizationFailed("parameterizer rejected the path".into()).into());
        }
        if !trajectory.has_increasing_timestamps() {
            error!(group = %self.group.name, "generated timestamps are not strictly increasing");
            return Err(PlanningError::TimeParameterizationFailed("timestamps are not strictly increasing".into()).into());
        }
        debug!(points = trajectory.len(), duration = trajectory.duration(), "timed trajectory");

        if let Some(collision) = self.collision {
            if !collision.is_path_valid(&trajectory, &self.group.name, true) {
                error!(group = %self.group.name, "generated path is not valid");
                return Err(PostprocessFailure {
                    error: PlanningError::PathInCollision,
                    trajectory: Some(trajectory),
                });
            }
        }
        Ok(trajectory)
    }
}
