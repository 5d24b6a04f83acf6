// Plans a two-link planar arm motion around an obstacle.
//
// A small rollout optimizer stands in for a full STOMP implementation:
// Gaussian noise is added to the interior of the trajectory and rollouts are
// blended by their exponentiated cost.
//
// Run with RUST_LOG=debug for the per-step planner output.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand_distr::{Distribution, Normal};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stomp_planner::arm_navigation::{CircleObstacle, PlanarArm};
use stomp_planner::common::{Constraints, JointConfiguration, RobotState};
use stomp_planner::seed::SeedTrajectory;
use stomp_planner::utils::{colors, LineStyle, TrajectoryVisualizer};
use stomp_planner::{
    Optimizer, PlannerCollaborators, PlannerConfig, PlanningError, PlanningRequest, PlanningResult,
    StompConfig, StompPlanner, TimedTrajectory, TrajectoryMatrix,
};

const DEMO_CONFIG: &str = r#"
group_name = "arm"
timeout_interval = 0.05

[optimization]
num_timesteps = 30
num_iterations = 300
num_iterations_after_valid = 5
num_rollouts = 20
control_cost_weight = 0.5
initialization_method = "cubic_polynomial"
"#;

const COLLISION_COST: f64 = 100.0;

struct RolloutOptimizer {
    arm: Arc<PlanarArm>,
    config: Mutex<StompConfig>,
    cancelled: AtomicBool,
    noise_stddev: f64,
}

impl RolloutOptimizer {
    fn new(arm: Arc<PlanarArm>, noise_stddev: f64) -> Self {
        RolloutOptimizer {
            arm,
            config: Mutex::new(StompConfig::default()),
            cancelled: AtomicBool::new(false),
            noise_stddev,
        }
    }

    fn config(&self) -> StompConfig {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn collision_steps(&self, parameters: &TrajectoryMatrix) -> usize {
        let group = self.arm.group();
        parameters
            .column_iter()
            .filter(|q| {
                let q = q.clone_owned();
                !group.satisfies_bounds(&q) || self.arm.in_collision(q.as_slice())
            })
            .count()
    }

    fn cost(&self, parameters: &TrajectoryMatrix, control_cost_weight: f64) -> f64 {
        let n = parameters.ncols();
        let control: f64 = (1..n.saturating_sub(1))
            .map(|t| {
                (parameters.column(t + 1) - 2.0 * parameters.column(t) + parameters.column(t - 1)).norm_squared()
            })
            .sum();
        COLLISION_COST * self.collision_steps(parameters) as f64 + control_cost_weight * control
    }

    fn optimize(&self, mut parameters: TrajectoryMatrix) -> PlanningResult<TrajectoryMatrix> {
        let config = self.config();
        let normal = Normal::new(0.0, self.noise_stddev)
            .map_err(|e| PlanningError::OptimizationFailed(e.to_string()))?;
        let mut rng = rand::thread_rng();
        let (dof, steps) = parameters.shape();
        let mut valid_iterations = 0;

        for iteration in 0..config.num_iterations {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(PlanningError::OptimizationFailed(format!(
                    "interrupted at iteration {}",
                    iteration
                )));
            }

            let rollouts: Vec<(TrajectoryMatrix, f64)> = (0..config.num_rollouts)
                .map(|_| {
                    // endpoints stay fixed
                    let noise = TrajectoryMatrix::from_fn(dof, steps, |_, t| {
                        if t == 0 || t == steps - 1 {
                            0.0
                        } else {
                            normal.sample(&mut rng)
                        }
                    });
                    let cost = self.cost(&(&parameters + &noise), config.control_cost_weight);
                    (noise, cost)
                })
                .collect();

            let (min, max) = rollouts
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, c)| (lo.min(*c), hi.max(*c)));
            let spread = (max - min).max(1e-10);
            let weights: Vec<f64> = rollouts
                .iter()
                .map(|(_, c)| (-config.exponentiated_cost_sensitivity * (c - min) / spread).exp())
                .collect();
            let total: f64 = weights.iter().sum();

            let update = rollouts
                .iter()
                .zip(&weights)
                .fold(TrajectoryMatrix::zeros(dof, steps), |acc, ((noise, _), w)| acc + noise * (w / total));
            let candidate = &parameters + update;
            if self.cost(&candidate, config.control_cost_weight)
                <= self.cost(&parameters, config.control_cost_weight)
            {
                parameters = candidate;
            }

            if self.collision_steps(&parameters) == 0 {
                valid_iterations += 1;
                if valid_iterations > config.num_iterations_after_valid {
                    info!(iteration, "found a collision-free trajectory");
                    return Ok(parameters);
                }
            }
        }

        if self.collision_steps(&parameters) == 0 {
            Ok(parameters)
        } else {
            Err(PlanningError::OptimizationFailed(format!(
                "no collision-free trajectory after {} iterations",
                config.num_iterations
            )))
        }
    }
}

impl Optimizer for RolloutOptimizer {
    fn set_config(&self, config: &StompConfig) -> PlanningResult<()> {
        *self.config.lock().unwrap_or_else(|e| e.into_inner()) = config.clone();
        Ok(())
    }

    fn solve_seeded(&self, seed: &TrajectoryMatrix) -> PlanningResult<TrajectoryMatrix> {
        self.optimize(seed.clone())
    }

    fn solve(&self, start: &JointConfiguration, goal: &JointConfiguration) -> PlanningResult<TrajectoryMatrix> {
        let config = self.config();
        let initial = config
            .initialization_method
            .initial_trajectory(start, goal, config.num_timesteps);
        self.optimize(initial)
    }

    fn cancel(&self) -> bool {
        self.cancelled.store(true, Ordering::SeqCst);
        true
    }

    fn clear(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

fn plot(arm: &PlanarArm, trajectory: &TimedTrajectory) -> PlanningResult<()> {
    std::fs::create_dir_all("img/stomp").map_err(|e| PlanningError::Visualization(e.to_string()))?;

    let mut joints = TrajectoryVisualizer::new("STOMP - joint trajectory");
    joints.plot_joint_positions(trajectory);
    joints.save_png("img/stomp/joint_trajectory.png", 800, 600)?;

    let tool: Vec<_> = trajectory
        .points
        .iter()
        .map(|p| arm.forward_kinematics(&p.positions)[2])
        .collect();
    let x: Vec<f64> = tool.iter().map(|p| p.x).collect();
    let y: Vec<f64> = tool.iter().map(|p| p.y).collect();

    let mut workspace = TrajectoryVisualizer::new("STOMP - tool path");
    workspace
        .set_labels("X [m]", "Y [m]")
        .set_aspect_ratio(Some(1.0))
        .plot_obstacles(&arm.obstacles)
        .plot_line(&x, &y, &LineStyle::new(colors::PATH, "Tool path"));
    if let (Some(first), Some(last)) = (tool.first(), tool.last()) {
        workspace
            .plot_point(first.x, first.y, colors::START, "Start")
            .plot_point(last.x, last.y, colors::GOAL, "Goal");
    }
    workspace.save_png("img/stomp/tool_path.png", 800, 800)?;
    info!("plots saved in img/stomp");
    Ok(())
}

fn run() -> PlanningResult<()> {
    let arm = Arc::new(PlanarArm::new("arm", 1.0, 1.0).with_obstacle(CircleObstacle::new(0.0, 1.5, 0.3)));
    let group = arm.group();
    let config = PlannerConfig::from_toml_str(DEMO_CONFIG)?;

    let optimizer = Arc::new(RolloutOptimizer::new(arm.clone(), 0.15));
    let collaborators = PlannerCollaborators::new(optimizer, arm.clone()).with_collision(arm.clone());
    let planner = StompPlanner::new(config, arm.as_ref(), collaborators)?;

    let start = JointConfiguration::from_row_slice(&[-0.3, 0.3]);
    let goal = JointConfiguration::from_row_slice(&[2.8, -0.3]);
    let request = PlanningRequest::new("arm", RobotState::from_configuration(&group, &start))
        .with_goal(Constraints::from_joint_configuration(&group, &goal))
        .with_allowed_planning_time(Duration::from_secs(5));

    let outcome = planner.solve(&request);
    let trajectory = match (outcome.trajectory, outcome.error) {
        (Some(trajectory), None) => trajectory,
        (_, Some(e)) => return Err(e),
        (None, None) => return Err(PlanningError::OptimizationFailed("no trajectory".into())),
    };
    info!(
        waypoints = trajectory.len(),
        duration = trajectory.duration(),
        elapsed = ?outcome.planning_time,
        "unseeded plan"
    );

    // replan from the previous result, as a caller reusing its last plan would
    let seed = SeedTrajectory::new(group.joint_names(), trajectory.positions_matrix()).encode()?;
    planner.clear();
    let replanned = planner.solve(&request.clone().with_seed(seed));
    match &replanned.error {
        None => info!(elapsed = ?replanned.planning_time, "seeded replan succeeded"),
        Some(e) => error!(error = %e, "seeded replan failed"),
    }

    plot(&arm, &trajectory)
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run() {
        error!(category = ?e.category(), error = %e, "STOMP demo failed");
        std::process::exit(1);
    }
}
