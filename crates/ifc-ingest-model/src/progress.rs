// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Progress reporting and cooperative yield points

use std::sync::Arc;

/// Progress callback type: receives (phase_name, percent_complete)
pub type ProgressCallback = Box<dyn Fn(&str, f32) + Send>;

/// Hook invoked at yield points with the number of items processed so far
pub type YieldHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Phase names reported through [`ProgressCallback`]
pub mod phase {
    pub const ENTITIES: &str = "entities";
    pub const RELATIONSHIPS: &str = "relationships";
    pub const PROPERTIES: &str = "properties";
    pub const QUANTITIES: &str = "quantities";
    pub const SPATIAL_HIERARCHY: &str = "spatial-hierarchy";
    pub const COMPOSE_INDEX: &str = "compose-index";
    pub const COMPOSE_MERGE: &str = "compose-merge";
    pub const COMPOSE_INHERIT: &str = "compose-inherit";
}

/// Thin wrapper around an optional progress callback
pub struct ProgressReporter<'a> {
    callback: Option<&'a (dyn Fn(&str, f32) + Send)>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(callback: Option<&'a (dyn Fn(&str, f32) + Send)>) -> Self {
        Self { callback }
    }

    /// Reporter that drops every update
    pub fn silent() -> Self {
        Self { callback: None }
    }

    pub fn report(&self, phase: &str, percent: f32) {
        if let Some(callback) = self.callback {
            callback(phase, percent.clamp(0.0, 100.0));
        }
    }

    pub fn start(&self, phase: &str) {
        log::trace!("phase {} started", phase);
        self.report(phase, 0.0);
    }

    pub fn finish(&self, phase: &str) {
        self.report(phase, 100.0);
    }

    /// Report `done / total` for a phase, skipping when total is zero
    pub fn fraction(&self, phase: &str, done: usize, total: usize) {
        if total > 0 {
            self.report(phase, done as f32 * 100.0 / total as f32);
        }
    }
}

/// Advisory yield point for long loops
///
/// Call [`YieldPoint::tick`] once per processed item; every `interval`
/// items the hook runs, giving the host a chance to service progress
/// reporting, hand off to another task, or simply do nothing.
pub struct YieldPoint {
    interval: usize,
    processed: usize,
    hook: Option<YieldHook>,
}

impl YieldPoint {
    pub fn new(interval: usize, hook: Option<YieldHook>) -> Self {
        Self {
            interval,
            processed: 0,
            hook,
        }
    }

    /// Yield point that never calls out
    pub fn disabled() -> Self {
        Self::new(0, None)
    }

    /// Count one item; returns true when this tick crossed a batch boundary
    pub fn tick(&mut self) -> bool {
        self.processed += 1;
        if self.interval == 0 || self.processed % self.interval != 0 {
            return false;
        }
        if let Some(hook) = &self.hook {
            hook(self.processed);
        }
        true
    }

    pub fn processed(&self) -> usize {
        self.processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_yield_point_fires_at_batch_boundaries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut point = YieldPoint::new(
            5,
            Some(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        let boundaries = (0..12).filter(|_| point.tick()).count();
        assert_eq!(boundaries, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(point.processed(), 12);
    }

    #[test]
    fn test_disabled_yield_point() {
        let mut point = YieldPoint::disabled();
        assert!(!(0..100).any(|_| point.tick()));
    }

    #[test]
    fn test_reporter_clamps_and_brackets_phase() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Box::new(move |phase, pct| {
            sink.lock().unwrap().push((phase.to_string(), pct));
        });

        let reporter = ProgressReporter::new(Some(callback.as_ref()));
        reporter.start(phase::ENTITIES);
        reporter.fraction(phase::ENTITIES, 1, 4);
        reporter.report(phase::ENTITIES, 140.0);
        reporter.finish(phase::ENTITIES);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], ("entities".to_string(), 0.0));
        assert_eq!(seen[1].1, 25.0);
        assert_eq!(seen[2].1, 100.0);
        assert_eq!(seen.last().unwrap().1, 100.0);
    }
}
