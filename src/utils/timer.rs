//! Stage timing

use std::time::{Duration, Instant};
use tracing::debug;

/// Timer with named checkpoints, used to report per-stage durations
#[derive(Debug)]
pub struct Timer {
    name: String,
    start: Instant,
    last: Duration,
    stages: Vec<(String, Duration)>,
}

impl Timer {
    /// Create and start a new timer
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            last: Duration::ZERO,
            stages: Vec::new(),
        }
    }

    /// Close the current stage and record its duration
    pub fn checkpoint(&mut self, stage: impl Into<String>) {
        let now = self.start.elapsed();
        let stage = stage.into();
        let delta = now - self.last;
        debug!(timer = %self.name, stage = %stage, elapsed_ms = delta.as_millis() as u64, "Stage finished");
        self.stages.push((stage, delta));
        self.last = now;
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Recorded stages with their own durations, in completion order
    pub fn stages(&self) -> &[(String, Duration)] {
        &self.stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoints_are_ordered() {
        let mut timer = Timer::start("run");
        timer.checkpoint("validate");
        timer.checkpoint("split");

        let names: Vec<&str> = timer.stages().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["validate", "split"]);
        let total: Duration = timer.stages().iter().map(|(_, d)| *d).sum();
        assert!(total <= timer.elapsed());
    }
}
