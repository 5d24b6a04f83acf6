//! Warm-started IK over a sequence of Cartesian waypoints
//!
//! Each waypoint is solved with the previous solution as the starting
//! guess, which keeps consecutive configurations on the same IK branch.

use std::time::Duration;

use tracing::{debug, warn};

use crate::common::{
    CartesianWaypoint, IkSolver, JointConfiguration, JointModelGroup, KinematicChain,
    PlanningError, PlanningResult,
};

/// Result of solving a waypoint chain.
///
/// Always holds one configuration per waypoint; failed waypoints carry the
/// last good configuration (or the neutral hint) as a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainResolution {
    pub configurations: Vec<JointConfiguration>,
    pub failed_waypoints: Vec<usize>,
}

impl ChainResolution {
    pub fn failure_count(&self) -> usize {
        self.failed_waypoints.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_waypoints.is_empty()
    }
}

pub struct IkChainResolver<'a> {
    solver: &'a dyn IkSolver,
    chain: KinematicChain,
    neutral: JointConfiguration,
    timeout: Duration,
}

impl<'a> IkChainResolver<'a> {
    pub fn new(
        solver: &'a dyn IkSolver,
        chain: KinematicChain,
        group: &JointModelGroup,
        timeout: Duration,
    ) -> Self {
        IkChainResolver {
            solver,
            chain,
            neutral: group.neutral_configuration(),
            timeout,
        }
    }

    pub fn chain(&self) -> &KinematicChain {
        &self.chain
    }

    /// Mid-range configuration used when there is no better guess
    pub fn neutral_hint(&self) -> &JointConfiguration {
        &self.neutral
    }

    /// Solve a single waypoint. Any failure is reported.
    pub fn resolve_one(
        &self,
        waypoint: &CartesianWaypoint,
        hint: &JointConfiguration,
    ) -> PlanningResult<JointConfiguration> {
        self.try_solve(waypoint, hint)
            .ok_or(PlanningError::IkFailed { index: 0 })
    }

    /// Solve every waypoint in order, never aborting on a failed one.
    pub fn resolve_chain(&self, waypoints: &[CartesianWaypoint]) -> ChainResolution {
        let mut configurations = Vec::with_capacity(waypoints.len());
        let mut failed_waypoints = Vec::new();
        let mut hint = self.neutral.clone();

        for (index, waypoint) in waypoints.iter().enumerate() {
            match self.try_solve(waypoint, &hint) {
                Some(solution) => {
                    hint = solution.clone();
                    configurations.push(solution);
                }
                None => {
                    warn!(
                        index,
                        target = ?waypoint.translation.vector.as_slice(),
                        "failed to solve IK for waypoint, reusing previous configuration"
                    );
                    failed_waypoints.push(index);
                    configurations.push(hint.clone());
                }
            }
        }

        if !failed_waypoints.is_empty() {
            warn!(
                failures = failed_waypoints.len(),
                total = waypoints.len(),
                "waypoint chain resolved with IK failures"
            );
        }

        ChainResolution { configurations, failed_waypoints }
    }

    fn try_solve(
        &self,
        waypoint: &CartesianWaypoint,
        hint: &JointConfiguration,
    ) -> Option<JointConfiguration> {
        let solution = self.solver.solve(&self.chain, waypoint, hint, self.timeout)?;
        if solution.len() != self.chain.dof() || solution.iter().any(|q| !q.is_finite()) {
            debug!(
                expected = self.chain.dof(),
                got = solution.len(),
                "discarding malformed IK solution"
            );
            return None;
        }
        Some(solution)
    }
}
