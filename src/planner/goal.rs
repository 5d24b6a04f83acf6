//! Start and goal resolution
//!
//! Turns the abstract start/goal descriptions of a request into joint
//! configurations. Requests seeded with Cartesian waypoints take their start
//! and goal from the first and last waypoint; everything else is read from
//! the start state and the goal constraints.

use std::borrow::Cow;

use tracing::{debug, error, info};

use crate::common::{
    CartesianWaypoint, Constraints, JointConfiguration, JointConstraint, JointModelGroup,
    PlanningError, PlanningRequest, PlanningResult, RobotState,
};
use crate::kinematics::IkChainResolver;

/// What kind of seed a request's trajectory constraints describe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedKind {
    /// No trajectory constraints at all
    Unseeded,
    /// One joint constraint set per time step
    Joint,
    /// A single set of position/orientation pairs
    Cartesian,
}

impl SeedKind {
    /// Classify the trajectory constraints of a request.
    ///
    /// Every constraint set is inspected; shapes that fit neither a joint
    /// nor a Cartesian seed are rejected instead of guessed.
    pub fn classify(request: &PlanningRequest) -> PlanningResult<SeedKind> {
        let sets = &request.trajectory_constraints;
        if sets.is_empty() {
            return Ok(SeedKind::Unseeded);
        }

        let is_joint_only =
            |c: &Constraints| c.has_joint() && c.position.is_empty() && c.orientation.is_empty();
        if sets.iter().all(is_joint_only) {
            return Ok(SeedKind::Joint);
        }

        if let Some(i) = sets
            .iter()
            .position(|c| c.has_joint() && (!c.position.is_empty() || !c.orientation.is_empty()))
        {
            return Err(PlanningError::AmbiguousSeedType(format!(
                "constraint set {} mixes joint and Cartesian constraints",
                i
            )));
        }

        match sets.as_slice() {
            [only] if only.has_cartesian() && only.position.len() == only.orientation.len() => {
                Ok(SeedKind::Cartesian)
            }
            [only] if only.has_cartesian() => Err(PlanningError::AmbiguousSeedType(format!(
                "{} position constraints but {} orientation constraints",
                only.position.len(),
                only.orientation.len()
            ))),
            [_] => Err(PlanningError::AmbiguousSeedType(
                "constraint set has neither joint constraints nor position/orientation pairs".into(),
            )),
            _ => Err(PlanningError::AmbiguousSeedType(format!(
                "{} constraint sets do not form a joint seed, Cartesian seeds take exactly one",
                sets.len()
            ))),
        }
    }
}

/// Everything a goal candidate needs to turn itself into a configuration
pub struct GoalContext<'a> {
    pub group: &'a JointModelGroup,
    pub ik: &'a IkChainResolver<'a>,
    /// Values for joints a goal leaves unspecified, normally the start
    pub base: &'a JointConfiguration,
    /// Warm start for Cartesian goals
    pub hint: &'a JointConfiguration,
}

/// One goal candidate of a request
#[derive(Debug, Clone, PartialEq)]
pub enum GoalDescription {
    Joint(Vec<JointConstraint>),
    Cartesian(CartesianWaypoint),
}

impl GoalDescription {
    /// Goal candidates in the order they are tried.
    ///
    /// A constraint set with joint constraints is a joint goal, one with a
    /// position/orientation pair a Cartesian goal (first pair); anything
    /// else is skipped.
    pub fn candidates(goal_constraints: &[Constraints]) -> Vec<GoalDescription> {
        goal_constraints
            .iter()
            .filter_map(|c| {
                if c.has_joint() {
                    Some(GoalDescription::Joint(c.joint.clone()))
                } else {
                    c.cartesian_waypoints().first().map(|w| GoalDescription::Cartesian(*w))
                }
            })
            .collect()
    }

    pub fn try_solve(&self, ctx: &GoalContext<'_>) -> PlanningResult<JointConfiguration> {
        let goal = match self {
            GoalDescription::Joint(constraints) => {
                let mut goal = ctx.base.clone();
                for jc in constraints {
                    match ctx.group.joint_index(&jc.joint_name) {
                        Some(i) => goal[i] = jc.position,
                        None => debug!(joint = %jc.joint_name, "ignoring goal joint outside the group"),
                    }
                }
                goal
            }
            GoalDescription::Cartesian(pose) => ctx
                .ik
                .resolve_one(pose, ctx.hint)
                .map_err(|_| PlanningError::GoalIkFailed)?,
        };

        if !ctx.group.satisfies_bounds(&goal) {
            return Err(PlanningError::NoSatisfiableGoal);
        }
        Ok(goal)
    }

    /// The first candidate that resolves, in order
    pub fn select(candidates: &[GoalDescription], ctx: &GoalContext<'_>) -> Option<JointConfiguration> {
        candidates.iter().enumerate().find_map(|(i, candidate)| match candidate.try_solve(ctx) {
            Ok(goal) => {
                debug!(candidate = i, "found goal");
                Some(goal)
            }
            Err(e) => {
                debug!(candidate = i, error = %e, "skipping goal candidate");
                None
            }
        })
    }
}

/// Start and goal of a request, resolved to joint space.
///
/// Carries the request as later stages should see it: for Cartesian seeds
/// that is a copy whose start state and goal are the resolved
/// configurations; otherwise the caller's request, untouched.
#[derive(Debug, Clone)]
pub struct ResolvedProblem<'r> {
    pub start: JointConfiguration,
    pub goal: JointConfiguration,
    pub kind: SeedKind,
    request: Cow<'r, PlanningRequest>,
    goal_constraint: Vec<JointConstraint>,
}

impl<'r> ResolvedProblem<'r> {
    pub fn effective_request(&self) -> &PlanningRequest {
        &self.request
    }

    /// The resolved goal as the only candidate, so a repaired seed ends
    /// exactly at [`ResolvedProblem::goal`]
    pub fn goal_candidates(&self) -> Vec<GoalDescription> {
        vec![GoalDescription::Joint(self.goal_constraint.clone())]
    }
}

pub struct GoalResolver<'a> {
    group: &'a JointModelGroup,
    ik: &'a IkChainResolver<'a>,
}

impl<'a> GoalResolver<'a> {
    pub fn new(group: &'a JointModelGroup, ik: &'a IkChainResolver<'a>) -> Self {
        GoalResolver { group, ik }
    }

    pub fn resolve<'r>(&self, request: &'r PlanningRequest) -> PlanningResult<ResolvedProblem<'r>> {
        let kind = SeedKind::classify(request)?;
        match kind {
            SeedKind::Cartesian => self.resolve_cartesian(request),
            SeedKind::Joint | SeedKind::Unseeded => {
                let start = self.extract_start(&request.start_state)?;
                let goal = self.find_joint_goal(request, &start)?;
                Ok(self.problem(start, goal, kind, Cow::Borrowed(request)))
            }
        }
    }

    /// Joint values of the group, in group order, from a robot state
    pub fn extract_start(&self, state: &RobotState) -> PlanningResult<JointConfiguration> {
        let mut start = JointConfiguration::zeros(self.group.dof());
        for (i, limits) in self.group.joints.iter().enumerate() {
            start[i] = state.position(&limits.name).ok_or_else(|| {
                PlanningError::InvalidStartState(format!("joint '{}' is missing", limits.name))
            })?;
        }

        if !self.group.satisfies_bounds(&start) {
            error!(group = %self.group.name, "start joint pose is out of bounds");
            return Err(PlanningError::StartOutOfBounds);
        }
        Ok(start)
    }

    fn find_joint_goal(
        &self,
        request: &PlanningRequest,
        start: &JointConfiguration,
    ) -> PlanningResult<JointConfiguration> {
        if request.goal_constraints.is_empty() {
            error!(group = %self.group.name, "a goal constraint was not provided");
            return Err(PlanningError::NoJointGoalFound);
        }

        // partial joint goals keep the start values of the joints they omit
        let ctx = GoalContext { group: self.group, ik: self.ik, base: start, hint: start };
        GoalDescription::select(&GoalDescription::candidates(&request.goal_constraints), &ctx).ok_or_else(|| {
            error!(group = %self.group.name, "unable to retrieve the goal from the request");
            PlanningError::NoJointGoalFound
        })
    }

    fn problem<'r>(
        &self,
        start: JointConfiguration,
        goal: JointConfiguration,
        kind: SeedKind,
        request: Cow<'r, PlanningRequest>,
    ) -> ResolvedProblem<'r> {
        let goal_constraint = Constraints::from_joint_configuration(self.group, &goal).joint;
        ResolvedProblem { start, goal, kind, request, goal_constraint }
    }

    fn resolve_cartesian<'r>(&self, request: &'r PlanningRequest) -> PlanningResult<ResolvedProblem<'r>> {
        info!(group = %self.group.name, "using Cartesian seed for start and goal");
        let waypoints = request.trajectory_constraints[0].cartesian_waypoints();
        let (first, last) = match (waypoints.first(), waypoints.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(PlanningError::AmbiguousSeedType("no Cartesian waypoints".into())),
        };

        let neutral = self.ik.neutral_hint();
        let start = self.ik.resolve_one(first, neutral).map_err(|_| {
            error!("failed to get the start configuration");
            PlanningError::StartIkFailed
        })?;
        let goal = self.ik.resolve_one(last, neutral).map_err(|_| {
            error!("failed to get the goal configuration");
            PlanningError::GoalIkFailed
        })?;
        debug!(start = ?start.as_slice(), goal = ?goal.as_slice(), "resolved Cartesian endpoints");

        let mut effective = request.clone();
        effective.start_state = RobotState::from_configuration(self.group, &start);
        effective.goal_constraints = vec![Constraints::from_joint_configuration(self.group, &goal)];

        Ok(self.problem(start, goal, SeedKind::Cartesian, Cow::Owned(effective)))
    }
}
