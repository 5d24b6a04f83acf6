//! Seed trajectories and their constraint encoding
//!
//! A seed travels between planning calls as an ordered list of constraint
//! sets, one set of joint constraints per time step. Cartesian seeds are
//! converted to joint space through the IK chain resolver.

use tracing::{debug, info};

use crate::common::{
    Constraints, JointConstraint, JointModelGroup, PlanningError, PlanningRequest, PlanningResult,
    TrajectoryMatrix,
};
use crate::kinematics::IkChainResolver;
use crate::planner::goal::SeedKind;

/// Seed matrix plus the joint ordering of its rows
#[derive(Debug, Clone, PartialEq)]
pub struct SeedTrajectory {
    pub joint_names: Vec<String>,
    pub parameters: TrajectoryMatrix,
}

impl SeedTrajectory {
    pub fn new(joint_names: Vec<String>, parameters: TrajectoryMatrix) -> Self {
        Self { joint_names, parameters }
    }

    pub fn num_timesteps(&self) -> usize {
        self.parameters.ncols()
    }

    /// Build a seed from joint constraint sets, one per time step.
    ///
    /// Every set must list exactly the group's joints, in group order.
    pub fn decode(constraints: &[Constraints], group: &JointModelGroup) -> PlanningResult<Self> {
        let names = group.joint_names();
        let dof = names.len();

        for (i, c) in constraints.iter().enumerate() {
            if c.joint.len() != dof {
                return Err(PlanningError::InvalidSeed(format!(
                    "index {} does not have {} constraints (has {} instead)",
                    i,
                    dof,
                    c.joint.len()
                )));
            }
            if let Some((j, jc)) = c
                .joint
                .iter()
                .enumerate()
                .find(|(j, jc)| jc.joint_name != names[*j])
            {
                return Err(PlanningError::InvalidSeed(format!(
                    "index {}, joint {}: name '{}' does not match expected name '{}'",
                    i, j, jc.joint_name, names[j]
                )));
            }
        }

        let parameters =
            TrajectoryMatrix::from_fn(dof, constraints.len(), |j, t| constraints[t].joint[j].position);
        Ok(Self::new(names, parameters))
    }

    /// Build a dense seed by solving IK along the Cartesian waypoints.
    ///
    /// Tolerates failed waypoints; their count is returned with the seed.
    pub fn from_cartesian(
        constraints: &Constraints,
        resolver: &IkChainResolver<'_>,
    ) -> PlanningResult<(Self, usize)> {
        if constraints.position.len() != constraints.orientation.len() || constraints.position.is_empty() {
            return Err(PlanningError::InvalidSeed(format!(
                "expected matching position/orientation constraints, got {}/{}",
                constraints.position.len(),
                constraints.orientation.len()
            )));
        }

        let resolution = resolver.resolve_chain(&constraints.cartesian_waypoints());
        let dof = resolver.chain().dof();
        let parameters = TrajectoryMatrix::from_fn(dof, resolution.configurations.len(), |j, t| {
            resolution.configurations[t][j]
        });

        info!(
            failures = resolution.failure_count(),
            total = resolution.configurations.len(),
            "seed trajectory converted from Cartesian waypoints"
        );
        Ok((Self::new(resolver.chain().joint_names.clone(), parameters), resolution.failure_count()))
    }

    /// Encode as one joint constraint set per time step
    pub fn encode(&self) -> PlanningResult<Vec<Constraints>> {
        if self.parameters.nrows() != self.joint_names.len() {
            return Err(PlanningError::InvalidSeed(format!(
                "seed has {} rows but {} joint names",
                self.parameters.nrows(),
                self.joint_names.len()
            )));
        }

        Ok(self
            .parameters
            .column_iter()
            .map(|column| Constraints {
                joint: self
                    .joint_names
                    .iter()
                    .zip(column.iter())
                    .map(|(name, &q)| JointConstraint::new(name, q))
                    .collect(),
                ..Default::default()
            })
            .collect())
    }
}

/// Pull the seed out of a request, if it carries one.
///
/// Returns the seed with the number of waypoints whose IK failed; joint
/// seeds never have failures.
pub fn extract_seed(
    request: &PlanningRequest,
    kind: SeedKind,
    group: &JointModelGroup,
    resolver: &IkChainResolver<'_>,
) -> PlanningResult<Option<(SeedTrajectory, usize)>> {
    match kind {
        SeedKind::Unseeded => {
            debug!("found no seed trajectory");
            Ok(None)
        }
        SeedKind::Joint => {
            let seed = SeedTrajectory::decode(&request.trajectory_constraints, group)?;
            Ok(Some((seed, 0)))
        }
        SeedKind::Cartesian => match request.trajectory_constraints.first() {
            Some(constraints) => SeedTrajectory::from_cartesian(constraints, resolver).map(Some),
            None => Err(PlanningError::InvalidSeed("no Cartesian constraint set".into())),
        },
    }
}
