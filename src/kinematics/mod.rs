// Inverse kinematics helpers

pub mod ik_chain;

pub use ik_chain::{ChainResolution, IkChainResolver};
