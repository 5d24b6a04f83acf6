//! Validation and repair of seed trajectories
//!
//! A seed is only usable if its endpoints are close to the requested start
//! and goal. Close endpoints are snapped onto the exact values and the
//! interior is smoothed so the snap does not leave a kink.

use tracing::error;

use crate::common::{
    l1_distance, JointConfiguration, JointModelGroup, PlanningError, PlanningResult,
    TrajectoryMatrix,
};
use crate::kinematics::IkChainResolver;
use crate::planner::goal::{GoalContext, GoalDescription};
use crate::seed::smoothing::apply_polynomial_smoothing;

/// Smoothing pass settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    pub degree: usize,
    pub tolerance: f64,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self { degree: 5, tolerance: 1e-5 }
    }
}

pub struct SeedRepairer<'a> {
    group: &'a JointModelGroup,
    ik: &'a IkChainResolver<'a>,
    max_deviation: f64,
    smoothing: SmoothingParams,
}

impl<'a> SeedRepairer<'a> {
    pub fn new(
        group: &'a JointModelGroup,
        ik: &'a IkChainResolver<'a>,
        max_deviation: f64,
        smoothing: SmoothingParams,
    ) -> Self {
        SeedRepairer { group, ik, max_deviation, smoothing }
    }

    /// Snap the seed onto `start` and the first satisfiable goal, then smooth.
    ///
    /// The input seed is not modified.
    pub fn repair(
        &self,
        seed: &TrajectoryMatrix,
        start: &JointConfiguration,
        goals: &[GoalDescription],
    ) -> PlanningResult<TrajectoryMatrix> {
        let steps = seed.ncols();
        if steps <= 2 {
            error!(steps, "found less than 3 points in seed trajectory");
            return Err(PlanningError::InsufficientSeedLength { steps });
        }
        if seed.nrows() != self.group.dof() || start.len() != self.group.dof() {
            return Err(PlanningError::InvalidSeed(format!(
                "seed has {} rows, group '{}' has {} joints",
                seed.nrows(),
                self.group.name,
                self.group.dof()
            )));
        }

        let mut parameters = seed.clone();

        let seed_start = parameters.column(0).into_owned();
        let distance = l1_distance(&seed_start, start);
        if distance > self.max_deviation {
            error!(distance, threshold = self.max_deviation, "start state is in discrepancy with the seed trajectory");
            return Err(PlanningError::SeedStartMismatch { distance, threshold: self.max_deviation });
        }
        parameters.set_column(0, start);

        let seed_goal = parameters.column(steps - 1).into_owned();
        let goal = self.find_goal(goals, start, &seed_goal)?;
        let distance = l1_distance(&seed_goal, &goal);
        if distance > self.max_deviation {
            error!(distance, threshold = self.max_deviation, "goal in seed is too far away from the requested goal");
            return Err(PlanningError::SeedGoalMismatch { distance, threshold: self.max_deviation });
        }
        parameters.set_column(steps - 1, &goal);

        apply_polynomial_smoothing(
            self.group,
            &mut parameters,
            self.smoothing.degree,
            self.smoothing.tolerance,
        )?;
        Ok(parameters)
    }

    fn find_goal(
        &self,
        goals: &[GoalDescription],
        start: &JointConfiguration,
        seed_goal: &JointConfiguration,
    ) -> PlanningResult<JointConfiguration> {
        let ctx = GoalContext {
            group: self.group,
            ik: self.ik,
            base: start,
            hint: seed_goal,
        };
        GoalDescription::select(goals, &ctx).ok_or_else(|| {
            error!("no requested goal is satisfiable");
            PlanningError::NoSatisfiableGoal
        })
    }
}
