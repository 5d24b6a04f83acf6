//! Common types used throughout stomp_planner

use std::time::Duration;

use nalgebra::{DMatrix, DVector, Isometry3, Translation3, UnitQuaternion, Vector3};

/// One value per active joint of the planning group
pub type JointConfiguration = DVector<f64>;

/// DOF x time-steps matrix, column `t` is the configuration at step `t`
pub type TrajectoryMatrix = DMatrix<f64>;

/// End-effector pose target
pub type CartesianWaypoint = Isometry3<f64>;

/// Sum of absolute joint differences
pub fn l1_distance(a: &JointConfiguration, b: &JointConfiguration) -> f64 {
    (a - b).lp_norm(1)
}

/// Position and dynamic limits of a single joint
#[derive(Debug, Clone, PartialEq)]
pub struct JointLimits {
    pub name: String,
    pub min_position: f64,
    pub max_position: f64,
    pub max_velocity: f64,
    pub max_acceleration: f64,
}

impl JointLimits {
    pub fn new(name: &str, min_position: f64, max_position: f64) -> Self {
        Self {
            name: name.to_string(),
            min_position,
            max_position,
            max_velocity: 1.0,
            max_acceleration: 1.0,
        }
    }

    pub fn with_dynamics(mut self, max_velocity: f64, max_acceleration: f64) -> Self {
        self.max_velocity = max_velocity;
        self.max_acceleration = max_acceleration;
        self
    }

    pub fn contains(&self, position: f64, margin: f64) -> bool {
        position >= self.min_position - margin && position <= self.max_position + margin
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.min_position + self.max_position)
    }
}

/// Active joints of a planning group, in planning order
#[derive(Debug, Clone, PartialEq)]
pub struct JointModelGroup {
    pub name: String,
    pub joints: Vec<JointLimits>,
    /// Link the kinematic chain starts from
    pub base_link: String,
    /// Last link of the chain (tool frame)
    pub tip_link: String,
}

impl JointModelGroup {
    pub fn new(name: &str, joints: Vec<JointLimits>, base_link: &str, tip_link: &str) -> Self {
        Self {
            name: name.to_string(),
            joints,
            base_link: base_link.to_string(),
            tip_link: tip_link.to_string(),
        }
    }

    pub fn dof(&self) -> usize {
        self.joints.len()
    }

    pub fn joint_names(&self) -> Vec<String> {
        self.joints.iter().map(|j| j.name.clone()).collect()
    }

    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    pub fn satisfies_bounds(&self, config: &JointConfiguration) -> bool {
        self.satisfies_bounds_with_margin(config, 0.0)
    }

    pub fn satisfies_bounds_with_margin(&self, config: &JointConfiguration, margin: f64) -> bool {
        config.len() == self.dof()
            && self
                .joints
                .iter()
                .zip(config.iter())
                .all(|(limits, &q)| limits.contains(q, margin))
    }

    /// Configuration halfway between all joint limits, used as a neutral IK hint
    pub fn neutral_configuration(&self) -> JointConfiguration {
        JointConfiguration::from_iterator(self.dof(), self.joints.iter().map(|j| j.midpoint()))
    }
}

/// Chain of joints between two named links, as understood by an IK solver
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicChain {
    pub base_link: String,
    pub tip_link: String,
    pub joint_names: Vec<String>,
}

impl KinematicChain {
    pub fn dof(&self) -> usize {
        self.joint_names.len()
    }
}

/// Named joint positions of the robot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RobotState {
    pub joint_names: Vec<String>,
    pub positions: Vec<f64>,
}

impl RobotState {
    pub fn new(joint_names: Vec<String>, positions: Vec<f64>) -> Self {
        Self { joint_names, positions }
    }

    pub fn from_configuration(group: &JointModelGroup, config: &JointConfiguration) -> Self {
        Self {
            joint_names: group.joint_names(),
            positions: config.iter().copied().collect(),
        }
    }

    pub fn position(&self, joint_name: &str) -> Option<f64> {
        self.joint_names
            .iter()
            .position(|n| n == joint_name)
            .and_then(|i| self.positions.get(i).copied())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JointConstraint {
    pub joint_name: String,
    pub position: f64,
}

impl JointConstraint {
    pub fn new(joint_name: &str, position: f64) -> Self {
        Self { joint_name: joint_name.to_string(), position }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionConstraint {
    pub link_name: String,
    pub target: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrientationConstraint {
    pub link_name: String,
    pub orientation: UnitQuaternion<f64>,
}

/// A set of constraints; used for goals and for seed waypoints
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Constraints {
    pub joint: Vec<JointConstraint>,
    pub position: Vec<PositionConstraint>,
    pub orientation: Vec<OrientationConstraint>,
}

impl Constraints {
    pub fn from_joint_configuration(group: &JointModelGroup, config: &JointConfiguration) -> Self {
        let joint = group
            .joints
            .iter()
            .zip(config.iter())
            .map(|(limits, &q)| JointConstraint::new(&limits.name, q))
            .collect();
        Self { joint, ..Default::default() }
    }

    /// Constraints made of position/orientation pairs, one pair per waypoint
    pub fn from_waypoints(link_name: &str, waypoints: &[CartesianWaypoint]) -> Self {
        let position = waypoints
            .iter()
            .map(|w| PositionConstraint {
                link_name: link_name.to_string(),
                target: w.translation.vector,
            })
            .collect();
        let orientation = waypoints
            .iter()
            .map(|w| OrientationConstraint {
                link_name: link_name.to_string(),
                orientation: w.rotation,
            })
            .collect();
        Self { joint: Vec::new(), position, orientation }
    }

    pub fn has_joint(&self) -> bool {
        !self.joint.is_empty()
    }

    pub fn has_cartesian(&self) -> bool {
        !self.position.is_empty() && !self.orientation.is_empty()
    }

    /// Pairs position and orientation constraints index-wise
    pub fn cartesian_waypoints(&self) -> Vec<CartesianWaypoint> {
        self.position
            .iter()
            .zip(self.orientation.iter())
            .map(|(p, o)| Isometry3::from_parts(Translation3::from(p.target), o.orientation))
            .collect()
    }
}

/// One motion planning problem as handed over by the front end
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningRequest {
    pub group_name: String,
    pub start_state: RobotState,
    /// Alternative goal regions, tried in order
    pub goal_constraints: Vec<Constraints>,
    /// Optional seed: joint waypoints or Cartesian waypoints
    pub trajectory_constraints: Vec<Constraints>,
    pub allowed_planning_time: Duration,
    pub max_velocity_scaling_factor: f64,
}

impl PlanningRequest {
    pub fn new(group_name: &str, start_state: RobotState) -> Self {
        Self {
            group_name: group_name.to_string(),
            start_state,
            goal_constraints: Vec::new(),
            trajectory_constraints: Vec::new(),
            allowed_planning_time: Duration::from_secs(5),
            max_velocity_scaling_factor: 1.0,
        }
    }

    pub fn with_goal(mut self, goal: Constraints) -> Self {
        self.goal_constraints.push(goal);
        self
    }

    pub fn with_seed(mut self, seed: Vec<Constraints>) -> Self {
        self.trajectory_constraints = seed;
        self
    }

    pub fn with_allowed_planning_time(mut self, allowed: Duration) -> Self {
        self.allowed_planning_time = allowed;
        self
    }
}

/// Waypoint of a time-parameterized trajectory
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPoint {
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub accelerations: Vec<f64>,
    /// Seconds since the first waypoint
    pub time_from_start: f64,
}

impl TrajectoryPoint {
    pub fn at_rest(positions: Vec<f64>) -> Self {
        let zeros = vec![0.0; positions.len()];
        Self {
            velocities: zeros.clone(),
            accelerations: zeros,
            positions,
            time_from_start: 0.0,
        }
    }
}

/// Joint trajectory with timing information
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimedTrajectory {
    pub joint_names: Vec<String>,
    pub points: Vec<TrajectoryPoint>,
}

impl TimedTrajectory {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.points.last().map(|p| p.time_from_start).unwrap_or(0.0)
    }

    pub fn has_increasing_timestamps(&self) -> bool {
        self.points
            .windows(2)
            .all(|w| w[1].time_from_start > w[0].time_from_start)
    }

    /// Positions as a DOF x steps matrix
    pub fn positions_matrix(&self) -> TrajectoryMatrix {
        let dof = self.joint_names.len();
        TrajectoryMatrix::from_fn(dof, self.points.len(), |j, t| self.points[t].positions[j])
    }
}
