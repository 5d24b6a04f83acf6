//! Visualization utilities for planned trajectories
//!
//! Thin wrapper around gnuplot: joint positions over time and the tool path
//! of a planar arm next to its obstacles.

use std::f64::consts::PI;

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};

use crate::arm_navigation::CircleObstacle;
use crate::common::{PlanningError, PlanningResult, TimedTrajectory};

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const RED: &str = "#FF0000";
    pub const GREEN: &str = "#00FF00";
    pub const BLUE: &str = "#0000FF";
    pub const ORANGE: &str = "#FFA500";
    pub const PURPLE: &str = "#800080";

    pub const OBSTACLE: &str = BLACK;
    pub const START: &str = GREEN;
    pub const GOAL: &str = BLUE;
    pub const PATH: &str = RED;

    /// Cycled through for one line per joint
    pub const JOINTS: [&str; 4] = [BLUE, RED, ORANGE, PURPLE];
}

/// Style for line rendering
#[derive(Debug, Clone)]
pub struct LineStyle {
    pub color: String,
    pub line_width: f64,
    pub caption: String,
}

impl LineStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            line_width: 2.0,
            caption: caption.to_string(),
        }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }
}

impl Default for LineStyle {
    fn default() -> Self {
        Self::new(colors::PATH, "Path")
    }
}

pub struct TrajectoryVisualizer {
    figure: Figure,
    title: String,
    x_label: String,
    y_label: String,
    aspect_ratio: Option<f64>,
}

impl TrajectoryVisualizer {
    pub fn new(title: &str) -> Self {
        Self {
            figure: Figure::new(),
            title: title.to_string(),
            x_label: "Time [s]".to_string(),
            y_label: "Position [rad]".to_string(),
            aspect_ratio: None,
        }
    }

    pub fn set_labels(&mut self, x_label: &str, y_label: &str) -> &mut Self {
        self.x_label = x_label.to_string();
        self.y_label = y_label.to_string();
        self
    }

    pub fn set_aspect_ratio(&mut self, ratio: Option<f64>) -> &mut Self {
        self.aspect_ratio = ratio;
        self
    }

    /// One line per joint, position against time from start
    pub fn plot_joint_positions(&mut self, trajectory: &TimedTrajectory) -> &mut Self {
        let time: Vec<f64> = trajectory.points.iter().map(|p| p.time_from_start).collect();
        for (j, name) in trajectory.joint_names.iter().enumerate() {
            let positions: Vec<f64> = trajectory.points.iter().map(|p| p.positions[j]).collect();
            let style = LineStyle::new(colors::JOINTS[j % colors::JOINTS.len()], name);
            self.plot_line(&time, &positions, &style);
        }
        self
    }

    pub fn plot_line(&mut self, x: &[f64], y: &[f64], style: &LineStyle) -> &mut Self {
        self.figure.axes2d().lines(
            x,
            y,
            &[Caption(&style.caption), Color(&style.color), LineWidth(style.line_width)],
        );
        self
    }

    pub fn plot_point(&mut self, x: f64, y: f64, color: &str, caption: &str) -> &mut Self {
        self.figure.axes2d().points(
            &[x],
            &[y],
            &[Caption(caption), Color(color), PointSymbol('O'), PointSize(1.5)],
        );
        self
    }

    /// Obstacle outlines
    pub fn plot_obstacles(&mut self, obstacles: &[CircleObstacle]) -> &mut Self {
        for obstacle in obstacles {
            let (x, y) = circle_outline(obstacle, 36);
            self.figure
                .axes2d()
                .lines(&x, &y, &[Color(colors::OBSTACLE), LineWidth(1.5)]);
        }
        self
    }

    pub fn save_png(&mut self, path: &str, width: u32, height: u32) -> PlanningResult<()> {
        self.apply_settings();
        self.figure
            .save_to_png(path, width, height)
            .map_err(|e| PlanningError::Visualization(e.to_string()))
    }

    fn apply_settings(&mut self) {
        let axes = self.figure.axes2d();
        axes.set_title(&self.title, &[]);
        axes.set_x_label(&self.x_label, &[]);
        axes.set_y_label(&self.y_label, &[]);
        if let Some(ratio) = self.aspect_ratio {
            axes.set_aspect_ratio(AutoOption::Fix(ratio));
        }
    }
}

fn circle_outline(obstacle: &CircleObstacle, segments: usize) -> (Vec<f64>, Vec<f64>) {
    (0..=segments)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / segments as f64;
            (
                obstacle.x + obstacle.radius * angle.cos(),
                obstacle.y + obstacle.radius * angle.sin(),
            )
        })
        .unzip()
}
