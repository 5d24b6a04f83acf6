//! Mock collaborators shared by the unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use nalgebra::Isometry3;

use crate::common::*;
use crate::config::StompConfig;

/// Three joints in [-2, 2] rad
pub fn test_group() -> JointModelGroup {
    let joints = ["j1", "j2", "j3"]
        .iter()
        .map(|name| JointLimits::new(name, -2.0, 2.0).with_dynamics(1.0, 2.0))
        .collect();
    JointModelGroup::new("arm", joints, "base_link", "tool0")
}

pub struct SingleGroupRobot(pub JointModelGroup);

impl RobotModel for SingleGroupRobot {
    fn joint_group(&self, name: &str) -> Option<JointModelGroup> {
        (self.0.name == name).then(|| self.0.clone())
    }
}

pub fn config(values: &[f64]) -> JointConfiguration {
    JointConfiguration::from_row_slice(values)
}

pub fn waypoint(x: f64, y: f64, z: f64) -> CartesianWaypoint {
    Isometry3::translation(x, y, z)
}

pub fn start_state(values: &[f64]) -> RobotState {
    RobotState::from_configuration(&test_group(), &config(values))
}

pub fn joint_goal(values: &[f64]) -> Constraints {
    Constraints::from_joint_configuration(&test_group(), &config(values))
}

/// Straight line from `start` to `goal` with `steps` columns
pub fn linear_matrix(start: &JointConfiguration, goal: &JointConfiguration, steps: usize) -> TrajectoryMatrix {
    TrajectoryMatrix::from_fn(start.len(), steps, |j, t| {
        let s = t as f64 / (steps - 1) as f64;
        start[j] + s * (goal[j] - start[j])
    })
}

/// IK whose solution is the target translation itself.
///
/// Targets whose x-coordinate is listed as unsolvable fail.
#[derive(Default)]
pub struct MockIk {
    unsolvable_x: Vec<f64>,
    delay: Duration,
    hints: Mutex<Vec<JointConfiguration>>,
}

impl MockIk {
    pub fn with_unsolvable(xs: &[f64]) -> Self {
        Self { unsolvable_x: xs.to_vec(), ..Default::default() }
    }

    /// Sleeps for `delay` on every solve
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Default::default() }
    }

    pub fn hints(&self) -> Vec<JointConfiguration> {
        self.hints.lock().unwrap().clone()
    }
}

impl IkSolver for MockIk {
    fn chain(&self, base_link: &str, tip_link: &str) -> PlanningResult<KinematicChain> {
        Ok(KinematicChain {
            base_link: base_link.to_string(),
            tip_link: tip_link.to_string(),
            joint_names: test_group().joint_names(),
        })
    }

    fn solve(
        &self,
        _chain: &KinematicChain,
        target: &CartesianWaypoint,
        hint: &JointConfiguration,
        _timeout: Duration,
    ) -> Option<JointConfiguration> {
        self.hints.lock().unwrap().push(hint.clone());
        thread::sleep(self.delay);
        let t = target.translation.vector;
        if self.unsolvable_x.iter().any(|x| (x - t.x).abs() < 1e-9) {
            return None;
        }
        Some(config(&[t.x, t.y, t.z]))
    }
}

/// Interpolates linearly between start and goal, returns seeds unchanged
#[derive(Default)]
pub struct LinearOptimizer {
    timesteps: AtomicUsize,
    pub solve_calls: AtomicUsize,
    pub seeded_calls: AtomicUsize,
    pub last_request: Mutex<Option<PlanningRequest>>,
}

impl Optimizer for LinearOptimizer {
    fn set_config(&self, config: &StompConfig) -> PlanningResult<()> {
        self.timesteps.store(config.num_timesteps, Ordering::SeqCst);
        Ok(())
    }

    fn set_motion_plan_request(&self, request: &PlanningRequest, _config: &StompConfig) -> PlanningResult<()> {
        *self.last_request.lock().unwrap() = Some(request.clone());
        Ok(())
    }

    fn solve_seeded(&self, seed: &TrajectoryMatrix) -> PlanningResult<TrajectoryMatrix> {
        self.seeded_calls.fetch_add(1, Ordering::SeqCst);
        Ok(seed.clone())
    }

    fn solve(&self, start: &JointConfiguration, goal: &JointConfiguration) -> PlanningResult<TrajectoryMatrix> {
        self.solve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(linear_matrix(start, goal, self.timesteps.load(Ordering::SeqCst)))
    }

    fn cancel(&self) -> bool {
        true
    }

    fn clear(&self) {}
}

impl LinearOptimizer {
    pub fn invocations(&self) -> usize {
        self.solve_calls.load(Ordering::SeqCst) + self.seeded_calls.load(Ordering::SeqCst)
    }
}

/// Runs until cancelled, then optionally hands back a best-effort result
#[derive(Default)]
pub struct BlockingOptimizer {
    cancelled: AtomicBool,
    pub cancelled_at: Mutex<Option<Instant>>,
    pub best_effort: bool,
}

impl BlockingOptimizer {
    pub fn best_effort() -> Self {
        Self { best_effort: true, ..Default::default() }
    }

    fn wait_for_cancel(&self, start: &JointConfiguration, goal: &JointConfiguration) -> PlanningResult<TrajectoryMatrix> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !self.cancelled.load(Ordering::SeqCst) {
            if Instant::now() > deadline {
                return Err(PlanningError::OptimizationFailed("never cancelled".into()));
            }
            thread::sleep(Duration::from_millis(1));
        }
        if self.best_effort {
            Ok(linear_matrix(start, goal, 5))
        } else {
            Err(PlanningError::OptimizationFailed("interrupted".into()))
        }
    }
}

impl Optimizer for BlockingOptimizer {
    fn set_config(&self, _config: &StompConfig) -> PlanningResult<()> {
        Ok(())
    }

    fn solve_seeded(&self, seed: &TrajectoryMatrix) -> PlanningResult<TrajectoryMatrix> {
        let last = seed.ncols() - 1;
        self.wait_for_cancel(&seed.column(0).into_owned(), &seed.column(last).into_owned())
    }

    fn solve(&self, start: &JointConfiguration, goal: &JointConfiguration) -> PlanningResult<TrajectoryMatrix> {
        self.wait_for_cancel(start, goal)
    }

    fn cancel(&self) -> bool {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancelled_at.lock().unwrap().get_or_insert_with(Instant::now);
        true
    }

    fn clear(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Ignores cancellation and always takes `duration` to answer
pub struct StubbornOptimizer {
    pub duration: Duration,
}

impl Optimizer for StubbornOptimizer {
    fn set_config(&self, _config: &StompConfig) -> PlanningResult<()> {
        Ok(())
    }

    fn solve_seeded(&self, seed: &TrajectoryMatrix) -> PlanningResult<TrajectoryMatrix> {
        thread::sleep(self.duration);
        Ok(seed.clone())
    }

    fn solve(&self, start: &JointConfiguration, goal: &JointConfiguration) -> PlanningResult<TrajectoryMatrix> {
        thread::sleep(self.duration);
        Ok(linear_matrix(start, goal, 5))
    }

    fn cancel(&self) -> bool {
        false
    }

    fn clear(&self) {}
}

/// Rejects paths where the first joint enters `[min, max]`
pub struct RegionCollision {
    pub min: f64,
    pub max: f64,
}

impl CollisionModel for RegionCollision {
    fn is_path_valid(&self, trajectory: &TimedTrajectory, _group: &str, _verbose: bool) -> bool {
        trajectory
            .points
            .iter()
            .all(|p| p.positions[0] < self.min || p.positions[0] > self.max)
    }
}
