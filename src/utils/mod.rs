//! Utility functions and types

mod parallel;
mod timer;

pub use parallel::{parallel_map, parallel_map_with_config, ParallelConfig};
pub use timer::Timer;
