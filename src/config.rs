//! Planner and optimizer configuration
//!
//! Defaults live here and nowhere else; a configuration is validated once
//! against its planning group when the planner is constructed.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::{JointConfiguration, JointModelGroup, PlanningError, PlanningResult, TrajectoryMatrix};

/// How the optimizer builds its initial trajectory when no seed is given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitializationMethod {
    LinearInterpolation,
    CubicPolynomial,
    MinimumControlCost,
}

impl Default for InitializationMethod {
    fn default() -> Self {
        InitializationMethod::LinearInterpolation
    }
}

impl InitializationMethod {
    /// Progress along the straight line at normalized time `tau` in [0, 1]
    fn progress(&self, tau: f64) -> f64 {
        match self {
            InitializationMethod::LinearInterpolation => tau,
            // zero velocity at both ends
            InitializationMethod::CubicPolynomial => tau * tau * (3.0 - 2.0 * tau),
            // minimum jerk: zero velocity and acceleration at both ends
            InitializationMethod::MinimumControlCost => {
                tau.powi(3) * (10.0 - 15.0 * tau + 6.0 * tau * tau)
            }
        }
    }

    /// Initial DOF x `steps` trajectory from `start` to `goal`
    pub fn initial_trajectory(
        &self,
        start: &JointConfiguration,
        goal: &JointConfiguration,
        steps: usize,
    ) -> TrajectoryMatrix {
        let last = steps.saturating_sub(1).max(1) as f64;
        TrajectoryMatrix::from_fn(start.len(), steps, |j, t| {
            start[j] + self.progress(t as f64 / last) * (goal[j] - start[j])
        })
    }
}

/// Parameters of the stochastic optimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StompConfig {
    pub num_timesteps: usize,
    pub num_iterations: usize,
    /// Extra iterations after the first collision-free solution
    pub num_iterations_after_valid: usize,
    pub num_rollouts: usize,
    pub max_rollouts: usize,
    /// Time between two trajectory steps [s]
    pub delta_t: f64,
    pub control_cost_weight: f64,
    pub exponentiated_cost_sensitivity: f64,
    pub initialization_method: InitializationMethod,
    /// Filled from the planning group, never read from file
    #[serde(skip)]
    pub num_dimensions: usize,
}

impl Default for StompConfig {
    fn default() -> Self {
        Self {
            num_timesteps: 40,
            num_iterations: 50,
            num_iterations_after_valid: 0,
            num_rollouts: 10,
            max_rollouts: 100,
            delta_t: 1.0,
            control_cost_weight: 0.0,
            exponentiated_cost_sensitivity: 10.0,
            initialization_method: InitializationMethod::LinearInterpolation,
            num_dimensions: 0,
        }
    }
}

/// Configuration of one planner instance (one planning group)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub group_name: String,
    pub optimization: StompConfig,
    /// Watchdog poll interval [s]
    pub timeout_interval: f64,
    /// Max L1 distance between seed endpoints and requested start/goal
    pub max_start_deviation: f64,
    pub smoothing_degree: usize,
    pub smoothing_tolerance: f64,
    /// Per-waypoint IK timeout [s]
    pub ik_timeout: f64,
    /// Defaults to the group's base link
    pub ik_base_link: Option<String>,
    /// Defaults to the group's tip link
    pub ik_tip_link: Option<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            group_name: String::new(),
            optimization: StompConfig::default(),
            timeout_interval: 0.05,
            max_start_deviation: 0.5,
            smoothing_degree: 5,
            smoothing_tolerance: 1e-5,
            ik_timeout: 0.01,
            ik_base_link: None,
            ik_tip_link: None,
        }
    }
}

impl PlannerConfig {
    pub fn new(group_name: &str) -> Self {
        Self { group_name: group_name.to_string(), ..Default::default() }
    }

    pub fn from_toml_str(content: &str) -> PlanningResult<Self> {
        toml::from_str(content).map_err(|e| PlanningError::InvalidConfig(e.to_string()))
    }

    pub fn timeout_interval(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_interval)
    }

    pub fn ik_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.ik_timeout)
    }

    pub fn ik_links<'a>(&'a self, group: &'a JointModelGroup) -> (&'a str, &'a str) {
        (
            self.ik_base_link.as_deref().unwrap_or(&group.base_link),
            self.ik_tip_link.as_deref().unwrap_or(&group.tip_link),
        )
    }

    /// Check the configuration against its group and return the optimizer
    /// configuration with `num_dimensions` filled in.
    pub fn validate(&self, group: &JointModelGroup) -> PlanningResult<StompConfig> {
        if group.name != self.group_name {
            return Err(PlanningError::UnknownGroup { group: self.group_name.clone() });
        }
        if group.dof() == 0 {
            return Err(PlanningError::NoActiveJoints { group: group.name.clone() });
        }

        let opt = &self.optimization;
        let invalid = |msg: String| Err(PlanningError::InvalidConfig(msg));
        if opt.num_timesteps < 3 {
            return invalid(format!("num_timesteps must be at least 3, got {}", opt.num_timesteps));
        }
        if opt.num_rollouts == 0 || opt.num_rollouts > opt.max_rollouts {
            return invalid(format!(
                "num_rollouts must be in 1..={}, got {}",
                opt.max_rollouts, opt.num_rollouts
            ));
        }
        if self.smoothing_degree == 0 {
            return invalid("smoothing_degree must be at least 1".to_string());
        }
        if !(opt.delta_t > 0.0) {
            return invalid(format!("delta_t must be positive, got {}", opt.delta_t));
        }
        if !(self.timeout_interval > 0.0) || !(self.ik_timeout > 0.0) {
            return invalid("timeout_interval and ik_timeout must be positive".to_string());
        }
        if !(self.max_start_deviation >= 0.0) || !(self.smoothing_tolerance >= 0.0) {
            return invalid("max_start_deviation and smoothing_tolerance must not be negative".to_string());
        }

        let mut validated = opt.clone();
        validated.num_dimensions = group.dof();
        Ok(validated)
    }
}

#[derive(Debug, Deserialize)]
struct GroupConfigFile {
    stomp: HashMap<String, PlannerConfig>,
}

/// Parse a file holding one `[stomp.<entry>]` table per planning group.
///
/// The result is keyed by each entry's `group_name`.
pub fn load_group_configs(content: &str) -> PlanningResult<HashMap<String, PlannerConfig>> {
    let file: GroupConfigFile =
        toml::from_str(content).map_err(|e| PlanningError::InvalidConfig(e.to_string()))?;

    let mut configs = HashMap::new();
    for (entry, config) in file.stomp {
        if config.group_name.is_empty() {
            return Err(PlanningError::InvalidConfig(format!(
                "entry '{}' does not name a group_name",
                entry
            )));
        }
        configs.insert(config.group_name.clone(), config);
    }
    Ok(configs)
}
