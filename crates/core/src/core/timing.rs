//! Per-stage timing of a render tick.

pub use core::time::Duration;

// `std::time::Instant::now()` panics on `wasm32-unknown-unknown`; `web-time`
// is backed by `performance.now()` there.
#[cfg(target_arch = "wasm32")]
pub use web_time::Instant;

#[cfg(not(target_arch = "wasm32"))]
pub use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    stages: Vec<(&'static str, Duration)>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f`, recording how long it took under `stage`.
    pub fn time<T>(&mut self, stage: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.stages.push((stage, start.elapsed()));
        out
    }

    pub fn stages(&self) -> &[(&'static str, Duration)] {
        &self.stages
    }

    pub fn get(&self, stage: &str) -> Option<Duration> {
        self.stages
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, d)| *d)
            .reduce(|a, b| a + b)
    }

    pub fn total(&self) -> Duration {
        self.stages.iter().map(|(_, d)| *d).sum()
    }

    pub fn report(&self) {
        for (stage, d) in &self.stages {
            tracing::trace!(stage, micros = d.as_micros() as u64, "render stage");
        }
        tracing::debug!(total_micros = self.total().as_micros() as u64, "render tick");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_each_stage_in_order() {
        let mut t = StageTimings::new();
        let v = t.time("a", || 3);
        t.time("b", || ());
        t.time("a", || ());
        assert_eq!(v, 3);
        let names: Vec<_> = t.stages().iter().map(|(s, _)| *s).collect();
        assert_eq!(names, vec!["a", "b", "a"]);
        assert!(t.get("a").is_some());
        assert!(t.get("missing").is_none());
        assert!(t.total() >= t.get("b").unwrap());
    }
}
