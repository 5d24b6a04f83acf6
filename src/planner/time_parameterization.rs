//! Iterative parabolic time parameterization
//!
//! Segment durations start at the shortest time the velocity limits allow
//! and are stretched around every waypoint that violates an acceleration
//! limit until none does. Velocities and accelerations are finite
//! differences over the final durations; the path starts and ends at rest.

use itertools::Itertools;
use tracing::{debug, warn};

use crate::common::{JointModelGroup, TimeParameterizer, TimedTrajectory, TrajectoryPoint};

pub struct IterativeParabolicTimeParameterization {
    pub max_iterations: usize,
    /// Lower bound on every segment duration [s]
    pub min_segment_duration: f64,
}

impl Default for IterativeParabolicTimeParameterization {
    fn default() -> Self {
        Self { max_iterations: 100, min_segment_duration: 1e-3 }
    }
}

impl TimeParameterizer for IterativeParabolicTimeParameterization {
    fn compute_timestamps(
        &self,
        trajectory: &mut TimedTrajectory,
        group: &JointModelGroup,
        velocity_scale: f64,
    ) -> bool {
        match self.parameterize(trajectory, group, velocity_scale) {
            Ok(()) => true,
            Err(reason) => {
                warn!(%reason, "time parameterization failed");
                false
            }
        }
    }
}

impl IterativeParabolicTimeParameterization {
    fn parameterize(
        &self,
        trajectory: &mut TimedTrajectory,
        group: &JointModelGroup,
        velocity_scale: f64,
    ) -> Result<(), String> {
        if trajectory.is_empty() {
            return Err("trajectory has no waypoints".to_string());
        }
        let scale = velocity_scaling(velocity_scale);
        if let Some(joint) = group
            .joints
            .iter()
            .find(|j| !(j.max_velocity > 0.0) || !(j.max_acceleration > 0.0))
        {
            return Err(format!("joint '{}' has no usable velocity or acceleration limit", joint.name));
        }
        if trajectory.points.iter().any(|p| p.positions.len() != group.dof()) {
            return Err(format!("waypoints do not match the {} joints of '{}'", group.dof(), group.name));
        }

        let mut durations: Vec<f64> = trajectory
            .points
            .iter()
            .tuple_windows()
            .map(|(a, b)| {
                group
                    .joints
                    .iter()
                    .zip(a.positions.iter().zip(&b.positions))
                    .map(|(limits, (p, q))| (q - p).abs() / (limits.max_velocity * scale))
                    .fold(self.min_segment_duration, f64::max)
            })
            .collect();

        let mut converged = false;
        for _ in 0..self.max_iterations {
            let (_, accelerations) = finite_differences(&trajectory.points, &durations);
            let mut stretched = false;
            for (i, acceleration) in accelerations.iter().enumerate() {
                let ratio = acceleration
                    .iter()
                    .zip(&group.joints)
                    .map(|(a, limits)| a.abs() / limits.max_acceleration)
                    .fold(0.0, f64::max);
                if ratio > 1.0 + 1e-9 {
                    // both neighbouring segments scale, acceleration drops with the square
                    let factor = ratio.sqrt() * (1.0 + 1e-6);
                    if i > 0 {
                        durations[i - 1] *= factor;
                    }
                    if i < durations.len() {
                        durations[i] *= factor;
                    }
                    stretched = true;
                }
            }
            if !stretched {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(format!(
                "acceleration limits still violated after {} iterations",
                self.max_iterations
            ));
        }

        let (velocities, accelerations) = finite_differences(&trajectory.points, &durations);
        let mut time = 0.0;
        for (i, ((point, v), a)) in trajectory
            .points
            .iter_mut()
            .zip(velocities)
            .zip(accelerations)
            .enumerate()
        {
            if i > 0 {
                time += durations[i - 1];
            }
            point.time_from_start = time;
            point.velocities = v;
            point.accelerations = a;
        }
        Ok(())
    }
}

/// Per-waypoint velocities and accelerations for the given segment durations
fn finite_differences(points: &[TrajectoryPoint], durations: &[f64]) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let slopes: Vec<Vec<f64>> = points
        .iter()
        .tuple_windows()
        .zip(durations)
        .map(|((a, b), dt)| a.positions.iter().zip(&b.positions).map(|(p, q)| (q - p) / dt).collect())
        .collect();

    let dof = points.first().map(|p| p.positions.len()).unwrap_or(0);
    let mut velocities = Vec::with_capacity(points.len());
    let mut accelerations = Vec::with_capacity(points.len());
    for i in 0..points.len() {
        let before = i.checked_sub(1).map(|k| (&slopes[k], durations[k]));
        let after = slopes.get(i).map(|s| (s, durations[i]));
        let (v, a): (Vec<f64>, Vec<f64>) = match (before, after) {
            (Some((s0, d0)), Some((s1, d1))) => (0..dof)
                .map(|j| (0.5 * (s0[j] + s1[j]), (s1[j] - s0[j]) / (0.5 * (d0 + d1))))
                .unzip(),
            // start and end at rest
            (None, Some((s1, d1))) => (0..dof).map(|j| (0.0, 2.0 * s1[j] / d1)).unzip(),
            (Some((s0, d0)), None) => (0..dof).map(|j| (0.0, -2.0 * s0[j] / d0)).unzip(),
            (None, None) => (vec![0.0; dof], vec![0.0; dof]),
        };
        velocities.push(v);
        accelerations.push(a);
    }
    (velocities, accelerations)
}

/// Zero means unset and runs at full speed; anything outside (0, 1]
/// also falls back to full speed.
fn velocity_scaling(requested: f64) -> f64 {
    if requested == 0.0 {
        debug!("no velocity scaling factor set, using 1.0");
        1.0
    } else if requested > 0.0 && requested <= 1.0 {
        requested
    } else {
        warn!(requested, "invalid velocity scaling factor, using 1.0");
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::JointLimits;
    use crate::testing::test_group;

    fn trajectory(positions: &[[f64; 3]]) -> TimedTrajectory {
        TimedTrajectory {
            joint_names: test_group().joint_names(),
            points: positions.iter().map(|p| TrajectoryPoint::at_rest(p.to_vec())).collect(),
        }
    }

    fn max_abs_acceleration(trajectory: &TimedTrajectory) -> f64 {
        trajectory
            .points
            .iter()
            .flat_map(|p| p.accelerations.iter())
            .fold(0.0, |m: f64, a| m.max(a.abs()))
    }

    #[test]
    fn test_single_segment_velocity_limited() {
        // limits: 1 rad/s, 2 rad/s^2
        let group = test_group();
        let mut traj = trajectory(&[[0.0, 0.0, 0.0], [1.0, 0.5, 0.0]]);
        assert!(IterativeParabolicTimeParameterization::default().compute_timestamps(&mut traj, &group, 1.0));
        assert!((traj.duration() - 1.0).abs() < 1e-9);
        assert_eq!(traj.points[0].velocities, vec![0.0; 3]);
        assert_eq!(traj.points[1].velocities, vec![0.0; 3]);
    }

    #[test]
    fn test_velocity_scaling() {
        let group = test_group();
        let iptp = IterativeParabolicTimeParameterization::default();

        let mut half = trajectory(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        assert!(iptp.compute_timestamps(&mut half, &group, 0.5));
        assert!((half.duration() - 2.0).abs() < 1e-9);

        // unset and out-of-range factors run at full speed
        for scale in [0.0, 3.0, -1.0, f64::NAN] {
            let mut full = trajectory(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
            assert!(iptp.compute_timestamps(&mut full, &group, scale), "scale {}", scale);
            assert!((full.duration() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_acceleration_limits_hold() {
        let joints = ["j1", "j2", "j3"]
            .iter()
            .map(|n| JointLimits::new(n, -2.0, 2.0).with_dynamics(10.0, 1.0))
            .collect();
        let group = JointModelGroup::new("arm", joints, "base_link", "tool0");
        let mut traj = trajectory(&[
            [0.0, 0.0, 0.0],
            [0.2, 0.1, 0.0],
            [0.6, 0.1, -0.3],
            [1.0, 0.4, -0.3],
            [1.0, 0.8, 0.0],
        ]);

        assert!(IterativeParabolicTimeParameterization::default().compute_timestamps(&mut traj, &group, 1.0));
        assert!(traj.has_increasing_timestamps());
        assert!(max_abs_acceleration(&traj) <= 1.0 + 1e-6);
        for point in &traj.points {
            assert!(point.velocities.iter().all(|v| v.abs() <= 10.0 + 1e-9));
        }
    }

    #[test]
    fn test_repeated_waypoints_still_advance() {
        let group = test_group();
        let mut traj = trajectory(&[[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]]);
        assert!(IterativeParabolicTimeParameterization::default().compute_timestamps(&mut traj, &group, 1.0));
        assert!(traj.has_increasing_timestamps());
    }

    #[test]
    fn test_rejects_bad_input() {
        let group = test_group();
        let iptp = IterativeParabolicTimeParameterization::default();

        let mut empty = TimedTrajectory::default();
        assert!(!iptp.compute_timestamps(&mut empty, &group, 1.0));

        let mut stopped = group.clone();
        stopped.joints[1].max_velocity = 0.0;
        let mut traj = trajectory(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        assert!(!iptp.compute_timestamps(&mut traj, &stopped, 1.0));

        let mut short = TimedTrajectory {
            joint_names: vec!["j1".into()],
            points: vec![TrajectoryPoint::at_rest(vec![0.0]), TrajectoryPoint::at_rest(vec![1.0])],
        };
        assert!(!iptp.compute_timestamps(&mut short, &group, 1.0));
    }
}
