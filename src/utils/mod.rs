//! Utility modules for stomp_planner

pub mod visualization;

pub use visualization::{colors, LineStyle, TrajectoryVisualizer};
