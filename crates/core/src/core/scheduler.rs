//! Render scheduling: at most one redraw per tick, and only for new snapshots.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mailbox::Mailbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub renders: u64,
    /// Ticks that found nothing newer than the last render.
    pub skipped: u64,
    /// Snapshots overwritten before any tick could render them.
    pub coalesced: u64,
    /// Snapshots that failed to decode or render.
    pub dropped: u64,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Scheduler is stopped.
    Idle,
    /// No snapshot newer than the last rendered one.
    Unchanged,
    Rendered { version: u64 },
    Dropped { version: u64 },
}

#[derive(Debug, Default)]
pub struct RenderScheduler {
    state: SchedulerState,
    last_version: u64,
    stats: SchedulerStats,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        if self.state == SchedulerState::Idle {
            tracing::debug!("render scheduler started");
        }
        self.state = SchedulerState::Running;
    }

    pub fn stop(&mut self) {
        if self.state == SchedulerState::Running {
            tracing::debug!(renders = self.stats.renders, "render scheduler stopped");
        }
        self.state = SchedulerState::Idle;
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    pub fn last_version(&self) -> u64 {
        self.last_version
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Forget the last rendered version so the current snapshot is drawn again.
    ///
    /// Used after a model swap or resize, when the same activations must be
    /// redrawn against new geometry.
    pub fn invalidate(&mut self) {
        self.last_version = 0;
    }

    /// Run one tick: render the newest snapshot if it is newer than the last one.
    ///
    /// A failing `render` drops that snapshot and does not stop the scheduler.
    pub fn tick<F>(&mut self, mailbox: &Mailbox, render: F) -> TickOutcome
    where
        F: FnOnce(u64, &str) -> Result<()>,
    {
        if self.state == SchedulerState::Idle {
            return TickOutcome::Idle;
        }
        self.stats.ticks += 1;

        let Some((version, payload)) = mailbox.take_newer(self.last_version) else {
            self.stats.skipped += 1;
            return TickOutcome::Unchanged;
        };
        if self.last_version > 0 {
            self.stats.coalesced += version - self.last_version - 1;
        }
        self.last_version = version;

        match render(version, &payload) {
            Ok(()) => {
                self.stats.renders += 1;
                TickOutcome::Rendered { version }
            }
            Err(e) => {
                self.stats.dropped += 1;
                tracing::warn!(version, error = %e, "dropping activation snapshot");
                TickOutcome::Dropped { version }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VizError;

    #[test]
    fn idle_scheduler_never_renders() {
        let m = Mailbox::new();
        m.publish("x".into());
        let mut s = RenderScheduler::new();
        let out = s.tick(&m, |_, _| panic!("must not render"));
        assert_eq!(out, TickOutcome::Idle);
        assert_eq!(s.stats().ticks, 0);
    }

    #[test]
    fn renders_each_version_once() {
        let m = Mailbox::new();
        let mut s = RenderScheduler::new();
        s.start();
        assert_eq!(s.tick(&m, |_, _| Ok(())), TickOutcome::Unchanged);

        m.publish("a".into());
        let mut seen = Vec::new();
        assert_eq!(
            s.tick(&m, |v, p| {
                seen.push((v, p.to_string()));
                Ok(())
            }),
            TickOutcome::Rendered { version: 1 }
        );
        assert_eq!(s.tick(&m, |_, _| panic!("already rendered")), TickOutcome::Unchanged);
        assert_eq!(seen, vec![(1, "a".to_string())]);
    }

    #[test]
    fn intermediate_snapshots_are_skipped() {
        let m = Mailbox::new();
        let mut s = RenderScheduler::new();
        s.start();
        m.publish("1".into());
        s.tick(&m, |_, _| Ok(()));
        for i in 2..=5 {
            m.publish(i.to_string());
        }
        let mut got = String::new();
        s.tick(&m, |_, p| {
            got = p.to_string();
            Ok(())
        });
        assert_eq!(got, "5");
        assert_eq!(s.stats().coalesced, 3);
        assert_eq!(s.stats().renders, 2);
    }

    #[test]
    fn failed_render_is_dropped_and_loop_continues() {
        let m = Mailbox::new();
        let mut s = RenderScheduler::new();
        s.start();
        m.publish("bad".into());
        let out = s.tick(&m, |_, _| Err(VizError::UnknownTopic("x".into())));
        assert_eq!(out, TickOutcome::Dropped { version: 1 });
        assert!(s.is_running());

        m.publish("good".into());
        assert_eq!(s.tick(&m, |_, _| Ok(())), TickOutcome::Rendered { version: 2 });
        assert_eq!(s.stats().dropped, 1);
    }

    #[test]
    fn stop_then_start_resumes_with_latest() {
        let m = Mailbox::new();
        let mut s = RenderScheduler::new();
        s.start();
        s.stop();
        m.publish("a".into());
        m.publish("b".into());
        assert_eq!(s.tick(&m, |_, _| Ok(())), TickOutcome::Idle);
        s.start();
        assert_eq!(s.tick(&m, |_, _| Ok(())), TickOutcome::Rendered { version: 2 });

        s.invalidate();
        assert_eq!(s.tick(&m, |_, _| Ok(())), TickOutcome::Rendered { version: 2 });
    }
}
