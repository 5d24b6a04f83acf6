//
// Two-link planar arm used as a reference robot
//
// Serves as robot model, analytic IK solver and collision checker for the
// planner demo and tests.
//

use std::cmp::Ordering;
use std::f64::consts::PI;
use std::time::Duration;

use nalgebra::{Isometry3, Point2, Vector3};
use tracing::debug;

use crate::common::{
    CartesianWaypoint, CollisionModel, IkSolver, JointConfiguration, JointLimits, JointModelGroup,
    KinematicChain, PlanningError, PlanningResult, RobotModel, TimedTrajectory,
};

pub const BASE_LINK: &str = "base_link";
pub const TIP_LINK: &str = "tool0";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleObstacle {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl CircleObstacle {
    pub fn new(x: f64, y: f64, radius: f64) -> Self {
        Self { x, y, radius }
    }
}

pub struct PlanarArm {
    pub group_name: String,
    pub link_lengths: [f64; 2],
    pub joint_limits: [JointLimits; 2],
    pub obstacles: Vec<CircleObstacle>,
    /// Interpolation steps between two waypoints when checking a path
    pub collision_substeps: usize,
}

impl PlanarArm {
    pub fn new(group_name: &str, l1: f64, l2: f64) -> Self {
        PlanarArm {
            group_name: group_name.to_string(),
            link_lengths: [l1, l2],
            joint_limits: [
                JointLimits::new("shoulder", -PI, PI).with_dynamics(1.0, 2.0),
                JointLimits::new("elbow", -PI, PI).with_dynamics(1.5, 3.0),
            ],
            obstacles: Vec::new(),
            collision_substeps: 10,
        }
    }

    pub fn with_obstacle(mut self, obstacle: CircleObstacle) -> Self {
        self.obstacles.push(obstacle);
        self
    }

    pub fn group(&self) -> JointModelGroup {
        JointModelGroup::new(&self.group_name, self.joint_limits.to_vec(), BASE_LINK, TIP_LINK)
    }

    /// Shoulder, elbow and tool positions
    pub fn forward_kinematics(&self, q: &[f64]) -> [Point2<f64>; 3] {
        let [l1, l2] = self.link_lengths;
        let shoulder = Point2::origin();
        let elbow = Point2::new(l1 * q[0].cos(), l1 * q[0].sin());
        let tool = Point2::new(
            elbow.x + l2 * (q[0] + q[1]).cos(),
            elbow.y + l2 * (q[0] + q[1]).sin(),
        );
        [shoulder, elbow, tool]
    }

    /// Tool pose in the plane z = 0, yaw = q1 + q2
    pub fn tool_pose(&self, q: &[f64]) -> CartesianWaypoint {
        let tool = self.forward_kinematics(q)[2];
        Isometry3::new(Vector3::new(tool.x, tool.y, 0.0), Vector3::z() * (q[0] + q[1]))
    }

    /// Law of cosines; picks the elbow branch closest to `hint`.
    ///
    /// Only the planar position of the target is used.
    pub fn inverse_kinematics(&self, x: f64, y: f64, hint: &[f64]) -> Option<[f64; 2]> {
        let [l1, l2] = self.link_lengths;
        let cos_q2 = (x.powi(2) + y.powi(2) - l1.powi(2) - l2.powi(2)) / (2.0 * l1 * l2);
        if !(-1.0 - 1e-9..=1.0 + 1e-9).contains(&cos_q2) {
            return None;
        }
        let q2 = cos_q2.clamp(-1.0, 1.0).acos();

        [q2, -q2]
            .iter()
            .map(|&q2| {
                let q1 = y.atan2(x) - (l2 * q2.sin()).atan2(l1 + l2 * q2.cos());
                [normalize_angle(q1), q2]
            })
            .filter(|q| self.joint_limits.iter().zip(q.iter()).all(|(l, &v)| l.contains(v, 0.0)))
            .min_by(|a, b| {
                branch_distance(a, hint)
                    .partial_cmp(&branch_distance(b, hint))
                    .unwrap_or(Ordering::Equal)
            })
    }

    pub fn in_collision(&self, q: &[f64]) -> bool {
        let [shoulder, elbow, tool] = self.forward_kinematics(q);
        self.obstacles.iter().any(|o| {
            let center = Point2::new(o.x, o.y);
            segment_distance(&center, &shoulder, &elbow) <= o.radius
                || segment_distance(&center, &elbow, &tool) <= o.radius
        })
    }
}

impl RobotModel for PlanarArm {
    fn joint_group(&self, name: &str) -> Option<JointModelGroup> {
        (name == self.group_name).then(|| self.group())
    }
}

impl IkSolver for PlanarArm {
    fn chain(&self, base_link: &str, tip_link: &str) -> PlanningResult<KinematicChain> {
        if base_link != BASE_LINK || tip_link != TIP_LINK {
            return Err(PlanningError::InvalidConfig(format!(
                "no kinematic chain from '{}' to '{}'",
                base_link, tip_link
            )));
        }
        Ok(KinematicChain {
            base_link: base_link.to_string(),
            tip_link: tip_link.to_string(),
            joint_names: self.joint_limits.iter().map(|j| j.name.clone()).collect(),
        })
    }

    fn solve(
        &self,
        _chain: &KinematicChain,
        target: &CartesianWaypoint,
        hint: &JointConfiguration,
        _timeout: Duration,
    ) -> Option<JointConfiguration> {
        let t = target.translation.vector;
        self.inverse_kinematics(t.x, t.y, hint.as_slice())
            .map(|q| JointConfiguration::from_row_slice(&q))
    }
}

impl CollisionModel for PlanarArm {
    fn is_path_valid(&self, trajectory: &TimedTrajectory, group: &str, verbose: bool) -> bool {
        if group != self.group_name {
            return false;
        }
        let arm = self.group();
        let points = &trajectory.points;
        if points.iter().any(|p| p.positions.len() != arm.dof()) {
            return false;
        }

        let steps = self.collision_substeps.max(1);
        for i in 0..points.len() {
            let from = &points[i].positions;
            let to = &points.get(i + 1).unwrap_or(&points[i]).positions;
            for s in 0..steps {
                let ratio = s as f64 / steps as f64;
                let q: Vec<f64> = from.iter().zip(to).map(|(a, b)| a + ratio * (b - a)).collect();
                if !arm.satisfies_bounds(&JointConfiguration::from_vec(q.clone())) {
                    if verbose {
                        debug!(waypoint = i, "path leaves the joint limits");
                    }
                    return false;
                }
                if self.in_collision(&q) {
                    if verbose {
                        debug!(waypoint = i, substep = s, "path in collision");
                    }
                    return false;
                }
            }
        }
        true
    }
}

fn normalize_angle(mut angle: f64) -> f64 {
    while angle > PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

fn branch_distance(q: &[f64; 2], hint: &[f64]) -> f64 {
    q.iter()
        .zip(hint)
        .map(|(a, b)| normalize_angle(a - b).abs())
        .sum()
}

fn segment_distance(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let ab = b - a;
    let length_sq = ab.norm_squared();
    if length_sq < 1e-12 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / length_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}
