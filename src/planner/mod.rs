//! STOMP planning sessions
//!
//! [`StompPlanner`] is the entry point: it resolves the request, repairs a
//! seed if one is given, runs the optimizer under a watchdog and turns the
//! result into a timed, validated trajectory.

pub mod goal;
pub mod postprocess;
pub mod session;
pub mod time_parameterization;

pub use goal::{GoalContext, GoalDescription, GoalResolver, ResolvedProblem, SeedKind};
pub use postprocess::{PostprocessFailure, ResultPostprocessor};
pub use session::{CancellablePlanningSession, OptimizerInput, SessionState};
pub use time_parameterization::IterativeParabolicTimeParameterization;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::common::{
    CollisionModel, ErrorCategory, IkSolver, JointModelGroup, KinematicChain, Optimizer,
    PlanningError, PlanningRequest, PlanningResult, RobotModel, TimeParameterizer, TimedTrajectory,
    TrajectoryMatrix,
};
use crate::config::{PlannerConfig, StompConfig};
use crate::kinematics::IkChainResolver;
use crate::seed::{extract_seed, SeedRepairer, SmoothingParams};

/// External components a planner works with
#[derive(Clone)]
pub struct PlannerCollaborators {
    pub optimizer: Arc<dyn Optimizer>,
    pub ik_solver: Arc<dyn IkSolver>,
    /// Path validation is skipped without a collision model
    pub collision: Option<Arc<dyn CollisionModel>>,
    pub parameterizer: Arc<dyn TimeParameterizer>,
}

impl PlannerCollaborators {
    pub fn new(optimizer: Arc<dyn Optimizer>, ik_solver: Arc<dyn IkSolver>) -> Self {
        PlannerCollaborators {
            optimizer,
            ik_solver,
            collision: None,
            parameterizer: Arc::new(IterativeParabolicTimeParameterization::default()),
        }
    }

    pub fn with_collision(mut self, collision: Arc<dyn CollisionModel>) -> Self {
        self.collision = Some(collision);
        self
    }

    pub fn with_parameterizer(mut self, parameterizer: Arc<dyn TimeParameterizer>) -> Self {
        self.parameterizer = parameterizer;
        self
    }
}

/// Everything a planning call produced, successful or not
#[derive(Debug, Clone, Default)]
pub struct PlanningOutcome {
    pub trajectory: Option<TimedTrajectory>,
    /// Raw optimizer output, DOF x time-steps
    pub parameters: Option<TrajectoryMatrix>,
    pub error: Option<PlanningError>,
    pub planning_time: Duration,
    pub description: String,
    /// Waypoints of a Cartesian seed whose IK failed
    pub seed_ik_failures: usize,
}

impl PlanningOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.trajectory.is_some()
    }

    pub fn error_category(&self) -> Option<ErrorCategory> {
        self.error.as_ref().map(|e| e.category())
    }
}

/// Where an in-flight `solve` is, as seen by `terminate`
#[derive(Default)]
enum ActivePlan {
    #[default]
    Idle,
    /// Resolving and repairing; a terminate request is honoured before the optimizer starts
    Preparing { terminate: bool },
    Running(Arc<CancellablePlanningSession>),
}

pub struct StompPlanner {
    config: PlannerConfig,
    stomp_config: StompConfig,
    group: JointModelGroup,
    chain: KinematicChain,
    collaborators: PlannerCollaborators,
    active: Mutex<ActivePlan>,
}

impl StompPlanner {
    /// Validate the configuration and look up the IK chain of the group.
    pub fn new(
        config: PlannerConfig,
        robot: &dyn RobotModel,
        collaborators: PlannerCollaborators,
    ) -> PlanningResult<Self> {
        let group = robot.joint_group(&config.group_name).ok_or_else(|| {
            error!(group = %config.group_name, "planning group not found in the robot model");
            PlanningError::UnknownGroup { group: config.group_name.clone() }
        })?;
        let stomp_config = config.validate(&group)?;

        let (base_link, tip_link) = config.ik_links(&group);
        let chain = collaborators.ik_solver.chain(base_link, tip_link)?;
        if chain.dof() != group.dof() {
            return Err(PlanningError::InvalidConfig(format!(
                "IK chain {} -> {} has {} joints, group '{}' has {}",
                base_link,
                tip_link,
                chain.dof(),
                group.name,
                group.dof()
            )));
        }

        info!(group = %group.name, dof = group.dof(), "STOMP planner configured");
        Ok(StompPlanner {
            config,
            stomp_config,
            group,
            chain,
            collaborators,
            active: Mutex::new(ActivePlan::default()),
        })
    }

    pub fn group(&self) -> &JointModelGroup {
        &self.group
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Quick check run before any planning work
    pub fn can_service_request(&self, request: &PlanningRequest) -> bool {
        if request.group_name != self.group.name {
            error!(group = %request.group_name, "STOMP is not configured for this planning group");
            return false;
        }
        match request.goal_constraints.as_slice() {
            [goal] if goal.has_joint() => true,
            [_] => {
                error!("STOMP only supports joint space goals");
                false
            }
            _ => {
                error!(goals = request.goal_constraints.len(), "expecting exactly one goal region");
                false
            }
        }
    }

    /// Plan for `request`. Blocks until the outcome is known.
    pub fn solve(&self, request: &PlanningRequest) -> PlanningOutcome {
        let started = Instant::now();
        let mut outcome = PlanningOutcome::default();

        *self.lock_active() = ActivePlan::Preparing { terminate: false };
        let result = self.plan(request, started, &mut outcome);
        *self.lock_active() = ActivePlan::Idle;

        match result {
            Ok(()) => {
                outcome.description = format!(
                    "found a valid path with {} waypoints",
                    outcome.trajectory.as_ref().map(|t| t.len()).unwrap_or(0)
                );
            }
            Err(e) => {
                error!(group = %self.group.name, category = ?e.category(), error = %e, "planning failed");
                outcome.description = e.to_string();
                outcome.error = Some(e);
            }
        }

        outcome.planning_time = started.elapsed();
        info!(
            group = %self.group.name,
            success = outcome.is_success(),
            elapsed = ?outcome.planning_time,
            "STOMP planning finished"
        );
        outcome
    }

    /// Request cancellation of the planning call in flight, if any.
    ///
    /// Callable from any thread. True when nothing is running. A request
    /// made before the optimizer starts stops the call at its next stage.
    pub fn terminate(&self) -> bool {
        let session = {
            let mut active = self.lock_active();
            match &mut *active {
                ActivePlan::Idle => return true,
                ActivePlan::Preparing { terminate } => {
                    info!(group = %self.group.name, "terminate requested before the optimizer started");
                    *terminate = true;
                    return true;
                }
                ActivePlan::Running(session) => session.clone(),
            }
        };
        session.cancel()
    }

    pub fn clear(&self) {
        self.collaborators.optimizer.clear();
    }

    fn plan(
        &self,
        request: &PlanningRequest,
        started: Instant,
        outcome: &mut PlanningOutcome,
    ) -> PlanningResult<()> {
        if request.group_name != self.group.name {
            return Err(PlanningError::UnknownGroup { group: request.group_name.clone() });
        }
        let poll_interval = self.config.timeout_interval();
        if request.allowed_planning_time < poll_interval {
            warn!(
                allowed = ?request.allowed_planning_time,
                interval = ?poll_interval,
                "allowed planning time is shorter than the watchdog interval"
            );
        }

        let resolver = IkChainResolver::new(
            self.collaborators.ik_solver.as_ref(),
            self.chain.clone(),
            &self.group,
            self.config.ik_timeout(),
        );
        let problem = GoalResolver::new(&self.group, &resolver).resolve(request)?;
        self.check_terminated(started)?;
        let effective = problem.effective_request();

        let mut stomp_config = self.stomp_config.clone();
        let input = match extract_seed(effective, problem.kind, &self.group, &resolver)? {
            Some((seed, ik_failures)) => {
                outcome.seed_ik_failures = ik_failures;
                let smoothing = SmoothingParams {
                    degree: self.config.smoothing_degree,
                    tolerance: self.config.smoothing_tolerance,
                };
                let repairer =
                    SeedRepairer::new(&self.group, &resolver, self.config.max_start_deviation, smoothing);
                let parameters =
                    repairer.repair(&seed.parameters, &problem.start, &problem.goal_candidates())?;

                stomp_config.num_timesteps = parameters.ncols();
                info!(group = %self.group.name, timesteps = parameters.ncols(), "seeding trajectory from the request");
                OptimizerInput::Seed(parameters)
            }
            None => OptimizerInput::Endpoints {
                start: problem.start.clone(),
                goal: problem.goal.clone(),
            },
        };

        self.check_terminated(started)?;
        let optimizer = &self.collaborators.optimizer;
        optimizer.set_config(&stomp_config)?;
        optimizer.set_motion_plan_request(effective, &stomp_config)?;

        // resolution and seed repair count against the budget
        let remaining = request.allowed_planning_time.saturating_sub(started.elapsed());
        debug!(?remaining, "starting optimizer");

        let session = Arc::new(CancellablePlanningSession::new(optimizer.clone(), poll_interval));
        {
            let mut active = self.lock_active();
            if matches!(*active, ActivePlan::Preparing { terminate: true }) {
                return Err(PlanningError::Cancelled { elapsed: started.elapsed() });
            }
            *active = ActivePlan::Running(session.clone());
        }
        let result = session.run(&input, remaining);
        *self.lock_active() = ActivePlan::Preparing { terminate: false };
        let parameters = result?;
        debug!(timesteps = parameters.ncols(), "optimizer finished");
        outcome.parameters = Some(parameters.clone());

        let postprocessor = ResultPostprocessor::new(
            &self.group,
            self.collaborators.parameterizer.as_ref(),
            self.collaborators.collision.as_deref(),
        );
        match postprocessor.postprocess(&parameters, effective) {
            Ok(trajectory) => {
                outcome.trajectory = Some(trajectory);
                Ok(())
            }
            Err(failure) => {
                outcome.trajectory = failure.trajectory;
                Err(failure.error)
            }
        }
    }

    fn check_terminated(&self, started: Instant) -> PlanningResult<()> {
        match *self.lock_active() {
            ActivePlan::Preparing { terminate: true } => Err(PlanningError::Cancelled { elapsed: started.elapsed() }),
            _ => Ok(()),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, ActivePlan> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Constraints, RobotState};
    use crate::seed::SeedTrajectory;
    use crate::testing::*;
    use std::thread;

    fn planner_with(
        optimizer: Arc<dyn Optimizer>,
        ik: MockIk,
        collision: Option<Arc<dyn CollisionModel>>,
    ) -> StompPlanner {
        let mut collaborators = PlannerCollaborators::new(optimizer, Arc::new(ik));
        if let Some(collision) = collision {
            collaborators = collaborators.with_collision(collision);
        }
        StompPlanner::new(PlannerConfig::new("arm"), &SingleGroupRobot(test_group()), collaborators).unwrap()
    }

    fn joint_request(start: &[f64], goal: &[f64]) -> PlanningRequest {
        PlanningRequest::new("arm", start_state(start)).with_goal(joint_goal(goal))
    }

    #[test]
    fn test_construction_errors() {
        let collaborators =
            PlannerCollaborators::new(Arc::new(LinearOptimizer::default()), Arc::new(MockIk::default()));
        let result = StompPlanner::new(
            PlannerConfig::new("gripper"),
            &SingleGroupRobot(test_group()),
            collaborators.clone(),
        );
        assert!(matches!(result, Err(PlanningError::UnknownGroup { .. })));

        let mut config = PlannerConfig::new("arm");
        config.optimization.num_rollouts = 0;
        let result = StompPlanner::new(config, &SingleGroupRobot(test_group()), collaborators);
        assert!(matches!(result, Err(PlanningError::InvalidConfig(_))));
    }

    #[test]
    fn test_can_service_request() {
        let planner = planner_with(Arc::new(LinearOptimizer::default()), MockIk::default(), None);
        assert!(planner.can_service_request(&joint_request(&[0.0; 3], &[1.0; 3])));

        let mut other_group = joint_request(&[0.0; 3], &[1.0; 3]);
        other_group.group_name = "gripper".into();
        assert!(!planner.can_service_request(&other_group));

        let two_goals = joint_request(&[0.0; 3], &[1.0; 3]).with_goal(joint_goal(&[0.5; 3]));
        assert!(!planner.can_service_request(&two_goals));

        let cartesian = PlanningRequest::new("arm", start_state(&[0.0; 3]))
            .with_goal(Constraints::from_waypoints("tool0", &[waypoint(0.1, 0.2, 0.3)]));
        assert!(!planner.can_service_request(&cartesian));
    }

    #[test]
    fn test_unseeded_joint_request() {
        let optimizer = Arc::new(LinearOptimizer::default());
        let planner = planner_with(
            optimizer.clone(),
            MockIk::default(),
            Some(Arc::new(RegionCollision { min: 1.5, max: 1.8 })),
        );
        let request = joint_request(&[0.0, 0.0, 0.0], &[1.0, 0.5, -0.5]);

        let outcome = planner.solve(&request);
        assert!(outcome.is_success(), "{}", outcome.description);
        let trajectory = outcome.trajectory.unwrap();
        assert_eq!(trajectory.len(), 40);
        assert_eq!(outcome.parameters.unwrap().ncols(), 40);
        assert!(trajectory.has_increasing_timestamps());
        assert_eq!(trajectory.points[39].positions, vec![1.0, 0.5, -0.5]);

        assert_eq!(optimizer.solve_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(optimizer.last_request.lock().unwrap().as_ref(), Some(&request));
    }

    #[test]
    fn test_unset_velocity_scaling_runs_at_full_speed() {
        let planner = planner_with(Arc::new(LinearOptimizer::default()), MockIk::default(), None);
        let mut request = joint_request(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        request.max_velocity_scaling_factor = 0.0;

        let outcome = planner.solve(&request);
        assert!(outcome.is_success(), "{}", outcome.description);
        assert!(outcome.trajectory.map(|t| t.duration() > 0.0).unwrap_or(false));
    }

    #[test]
    fn test_seed_start_mismatch_skips_optimizer() {
        let optimizer = Arc::new(LinearOptimizer::default());
        let planner = planner_with(optimizer.clone(), MockIk::default(), None);
        let seed = SeedTrajectory::new(
            test_group().joint_names(),
            linear_matrix(&config(&[0.6, 0.0, 0.0]), &config(&[1.0, 1.0, 1.0]), 5),
        );
        let request = joint_request(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0]).with_seed(seed.encode().unwrap());

        let outcome = planner.solve(&request);
        assert!(matches!(outcome.error, Some(PlanningError::SeedStartMismatch { .. })));
        assert_eq!(outcome.error_category(), Some(ErrorCategory::Resolution));
        assert!(outcome.trajectory.is_none());
        assert!(outcome.parameters.is_none());
        assert_eq!(optimizer.invocations(), 0);
    }

    #[test]
    fn test_joint_seed_sets_timesteps() {
        let optimizer = Arc::new(LinearOptimizer::default());
        let planner = planner_with(optimizer.clone(), MockIk::default(), None);
        let seed = SeedTrajectory::new(
            test_group().joint_names(),
            linear_matrix(&config(&[0.1, 0.0, 0.0]), &config(&[1.0, 1.0, 1.0]), 12),
        );
        let request = joint_request(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0]).with_seed(seed.encode().unwrap());

        let outcome = planner.solve(&request);
        assert!(outcome.is_success(), "{}", outcome.description);
        assert_eq!(outcome.parameters.as_ref().map(|p| p.ncols()), Some(12));
        assert_eq!(optimizer.seeded_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        let first = &outcome.trajectory.unwrap().points[0];
        assert!(first.positions.iter().all(|q| q.abs() < 1e-9));
    }

    #[test]
    fn test_repaired_seed_ends_at_resolved_goal() {
        let optimizer = Arc::new(LinearOptimizer::default());
        let planner = planner_with(optimizer.clone(), MockIk::default(), None);
        let partial = Constraints {
            joint: vec![crate::common::JointConstraint::new("j1", 1.0)],
            ..Default::default()
        };
        let seed = SeedTrajectory::new(
            test_group().joint_names(),
            linear_matrix(&config(&[0.0, 0.0, 0.0]), &config(&[1.0, 0.1, 0.0]), 8),
        );
        let request = PlanningRequest::new("arm", start_state(&[0.0, 0.0, 0.0]))
            .with_goal(partial)
            .with_goal(joint_goal(&[1.0, 1.0, 1.0]))
            .with_seed(seed.encode().unwrap());

        let outcome = planner.solve(&request);
        assert!(outcome.is_success(), "{}", outcome.description);
        let parameters = outcome.parameters.unwrap();
        assert_eq!(parameters.column(7).into_owned(), config(&[1.0, 0.0, 0.0]));
        assert_eq!(outcome.trajectory.unwrap().points[7].positions, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cartesian_seed_with_unsolvable_middle() {
        let optimizer = Arc::new(LinearOptimizer::default());
        let planner = planner_with(optimizer.clone(), MockIk::with_unsolvable(&[0.5]), None);
        let waypoints = [waypoint(0.1, 0.2, 0.3), waypoint(0.5, 0.2, 0.3), waypoint(0.9, 0.2, 0.3)];
        let request = PlanningRequest::new("arm", RobotState::default())
            .with_seed(vec![Constraints::from_waypoints("tool0", &waypoints)]);

        let outcome = planner.solve(&request);
        assert!(outcome.is_success(), "{}", outcome.description);
        assert_eq!(outcome.seed_ik_failures, 1);
        assert_eq!(optimizer.seeded_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        let parameters = outcome.parameters.unwrap();
        assert_eq!(parameters.ncols(), 3);
        assert!((parameters.column(0).into_owned() - config(&[0.1, 0.2, 0.3])).abs().max() < 1e-9);
        assert!((parameters.column(2).into_owned() - config(&[0.9, 0.2, 0.3])).abs().max() < 1e-9);

        // cost functions see the resolved start and joint goal
        let seen = optimizer.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(seen.start_state.position("j1"), Some(0.1));
        assert_eq!(seen.goal_constraints, vec![joint_goal(&[0.9, 0.2, 0.3])]);
    }

    #[test]
    fn test_ambiguous_seed_is_rejected() {
        let optimizer = Arc::new(LinearOptimizer::default());
        let planner = planner_with(optimizer.clone(), MockIk::default(), None);
        let request = joint_request(&[0.0; 3], &[1.0; 3]).with_seed(vec![Constraints::default()]);

        let outcome = planner.solve(&request);
        assert!(matches!(outcome.error, Some(PlanningError::AmbiguousSeedType(_))));
        assert_eq!(optimizer.invocations(), 0);
    }

    #[test]
    fn test_watchdog_cancels_slow_optimizer() {
        let planner = planner_with(Arc::new(BlockingOptimizer::default()), MockIk::default(), None);
        let request = joint_request(&[0.0; 3], &[1.0; 3]).with_allowed_planning_time(Duration::from_millis(100));

        let outcome = planner.solve(&request);
        assert!(matches!(outcome.error, Some(PlanningError::Cancelled { .. })));
        assert_eq!(outcome.error_category(), Some(ErrorCategory::Optimization));
        assert!(outcome.parameters.is_none());
        assert!(outcome.planning_time < Duration::from_secs(2));
    }

    #[test]
    fn test_budget_includes_seed_resolution() {
        // ten waypoints at 40 ms each use up most of the budget before optimizing
        let planner = planner_with(
            Arc::new(BlockingOptimizer::default()),
            MockIk::with_delay(Duration::from_millis(40)),
            None,
        );
        let waypoints: Vec<_> = (0..10).map(|i| waypoint(0.1 * i as f64, 0.2, 0.3)).collect();
        let request = PlanningRequest::new("arm", RobotState::default())
            .with_seed(vec![Constraints::from_waypoints("tool0", &waypoints)])
            .with_allowed_planning_time(Duration::from_millis(500));

        let outcome = planner.solve(&request);
        assert!(matches!(outcome.error, Some(PlanningError::Cancelled { .. })));
        assert!(
            outcome.planning_time < Duration::from_millis(500 + 50 + 150),
            "{:?}",
            outcome.planning_time
        );
    }

    #[test]
    fn test_terminate_from_another_thread() {
        let planner = Arc::new(planner_with(Arc::new(BlockingOptimizer::default()), MockIk::default(), None));
        assert!(planner.terminate());

        let worker = {
            let planner = planner.clone();
            thread::spawn(move || {
                let request = joint_request(&[0.0; 3], &[1.0; 3]).with_allowed_planning_time(Duration::from_secs(10));
                planner.solve(&request)
            })
        };
        thread::sleep(Duration::from_millis(200));
        assert!(planner.terminate());

        let outcome = worker.join().unwrap();
        assert!(matches!(outcome.error, Some(PlanningError::Cancelled { .. })));
        assert!(outcome.planning_time < Duration::from_secs(5));
    }

    #[test]
    fn test_terminate_during_seed_resolution() {
        let optimizer = Arc::new(LinearOptimizer::default());
        let planner = Arc::new(planner_with(
            optimizer.clone(),
            MockIk::with_delay(Duration::from_millis(40)),
            None,
        ));
        let worker = {
            let planner = planner.clone();
            thread::spawn(move || {
                let waypoints: Vec<_> = (0..10).map(|i| waypoint(0.1 * i as f64, 0.2, 0.3)).collect();
                let request = PlanningRequest::new("arm", RobotState::default())
                    .with_seed(vec![Constraints::from_waypoints("tool0", &waypoints)]);
                planner.solve(&request)
            })
        };
        thread::sleep(Duration::from_millis(150));
        assert!(planner.terminate());

        let outcome = worker.join().unwrap();
        assert!(matches!(outcome.error, Some(PlanningError::Cancelled { .. })));
        assert_eq!(optimizer.invocations(), 0);
        // the request does not outlive its call
        assert!(planner.terminate());
    }

    #[test]
    fn test_collision_failure_keeps_trajectory() {
        let planner = planner_with(
            Arc::new(LinearOptimizer::default()),
            MockIk::default(),
            Some(Arc::new(RegionCollision { min: 0.4, max: 0.6 })),
        );
        let outcome = planner.solve(&joint_request(&[0.0; 3], &[1.0, 0.0, 0.0]));
        assert_eq!(outcome.error, Some(PlanningError::PathInCollision));
        assert_eq!(outcome.error_category(), Some(ErrorCategory::Postprocessing));
        assert!(outcome.parameters.is_some());
        assert_eq!(outcome.trajectory.map(|t| t.len()), Some(40));
        assert!(!outcome.description.is_empty());
    }
}
