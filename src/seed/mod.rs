// Seed trajectory handling: extraction, encoding, repair and smoothing

pub mod trajectory;
pub mod smoothing;
pub mod repair;

pub use trajectory::{extract_seed, SeedTrajectory};
pub use smoothing::apply_polynomial_smoothing;
pub use repair::{SeedRepairer, SmoothingParams};
