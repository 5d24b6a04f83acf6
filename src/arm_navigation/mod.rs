//! Reference robots for planning

pub mod planar_arm;

pub use planar_arm::{CircleObstacle, PlanarArm, BASE_LINK, TIP_LINK};
