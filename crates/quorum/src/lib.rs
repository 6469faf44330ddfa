//! Quorum planning for parallel dispatch.
//!
//! This crate decides, for one parallel call:
//! - Which nodes may be asked (exclusions, rotation, shuffling)
//! - How many requests run at once (the nominal quorum)
//! - Whether the quorum is unreachable before anything is sent

pub mod options;
pub mod planner;

pub use options::ParallelOptions;
pub use planner::{get_list, NodeQueue, QuorumPlan};
