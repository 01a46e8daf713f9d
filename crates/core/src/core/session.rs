//! The visualizer session: every piece of client state in one place.
//!
//! The message path ([`VisualizerSession::handle_message`]) only routes and
//! records; activation payloads go straight into the [`Mailbox`]. All drawing
//! happens in [`VisualizerSession::tick`], driven by the host's refresh signal.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{RetryPolicy, VisualizerConfig};
use crate::decode::decode;
use crate::error::{Result, VizError};
use crate::mailbox::Mailbox;
use crate::model::PreparedModel;
use crate::render::{render_frame, RenderStats};
use crate::scheduler::{RenderScheduler, SchedulerStats, TickOutcome};
use crate::structure::NetworkStructure;
use crate::surface::Surface;
use crate::timing::StageTimings;
use crate::wire::{parse_inbound, ActivationSnapshot, Inbound, Player};

/// Network structures by level.
///
/// A shared structure, when set, serves every level without its own entry.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    by_level: BTreeMap<u32, Arc<NetworkStructure>>,
    shared: Option<Arc<NetworkStructure>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog where every level uses `structure`.
    pub fn shared(structure: NetworkStructure) -> Self {
        Self {
            by_level: BTreeMap::new(),
            shared: Some(Arc::new(structure)),
        }
    }

    pub fn insert(&mut self, level: u32, structure: NetworkStructure) {
        self.by_level.insert(level, Arc::new(structure));
    }

    pub fn set_shared(&mut self, structure: NetworkStructure) {
        self.shared = Some(Arc::new(structure));
    }

    pub fn get(&self, level: u32) -> Result<Arc<NetworkStructure>> {
        self.by_level
            .get(&level)
            .or(self.shared.as_ref())
            .cloned()
            .ok_or(VizError::UnknownLevel(level))
    }

    pub fn levels(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_level.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_level.is_empty() && self.shared.is_none()
    }
}

/// Whether the drawing surface has a known size yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Setup {
    Pending,
    Ready { width: f64, height: f64 },
}

/// Something the host (or the expression collaborator) may want to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    LevelChanged { level: u32 },
    ScoreChanged { player: Player, score: u32 },
}

/// A level change that arrived before the surface was ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingInit {
    level: u32,
    attempts: u32,
    wait: u32,
    backoff: u32,
}

impl PendingInit {
    fn new(level: u32, policy: &RetryPolicy) -> Self {
        Self {
            level,
            attempts: 0,
            wait: policy.initial_backoff_ticks,
            backoff: policy.initial_backoff_ticks.max(1),
        }
    }
}

/// Snapshot of session state for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Level of the model currently drawn. A rejected or parked level change
    /// leaves it untouched; see `pending_level` for a parked one.
    pub level: Option<u32>,
    pub running: bool,
    pub setup: Setup,
    pub pending_level: Option<u32>,
    pub mailbox_version: u64,
    pub scheduler: SchedulerStats,
    pub human_score: Option<u32>,
    pub agent_score: Option<u32>,
}

#[derive(Debug)]
pub struct VisualizerSession {
    config: VisualizerConfig,
    catalog: ModelCatalog,
    model: Option<PreparedModel>,
    scheduler: RenderScheduler,
    mailbox: Arc<Mailbox>,
    setup: Setup,
    pending: Option<PendingInit>,
    human_score: Option<u32>,
    agent_score: Option<u32>,
    last_timings: StageTimings,
    last_render: Option<RenderStats>,
}

impl VisualizerSession {
    pub fn new(config: VisualizerConfig, catalog: ModelCatalog) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            catalog,
            model: None,
            scheduler: RenderScheduler::new(),
            mailbox: Arc::new(Mailbox::new()),
            setup: Setup::Pending,
            pending: None,
            human_score: None,
            agent_score: None,
            last_timings: StageTimings::new(),
            last_render: None,
        })
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    pub fn catalog_mut(&mut self) -> &mut ModelCatalog {
        &mut self.catalog
    }

    /// Shared handle for writers on other threads.
    pub fn mailbox(&self) -> Arc<Mailbox> {
        Arc::clone(&self.mailbox)
    }

    pub fn model(&self) -> Option<&PreparedModel> {
        self.model.as_ref()
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    pub fn last_timings(&self) -> &StageTimings {
        &self.last_timings
    }

    pub fn last_render(&self) -> Option<RenderStats> {
        self.last_render
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            level: self.model.as_ref().map(|m| m.level),
            running: self.scheduler.is_running(),
            setup: self.setup,
            pending_level: self.pending.map(|p| p.level),
            mailbox_version: self.mailbox.version(),
            scheduler: self.scheduler.stats(),
            human_score: self.human_score,
            agent_score: self.agent_score,
        }
    }

    /// Route one inbound message.
    ///
    /// Activation payloads are stored without parsing. A level change may
    /// fail with the error of the resulting model initialization.
    pub fn handle_message(&mut self, topic: &str, payload: &str) -> Result<Option<SessionEvent>> {
        match parse_inbound(topic, payload)? {
            Inbound::Activation(raw) => {
                self.mailbox.publish(raw);
                Ok(None)
            }
            Inbound::Level(msg) => {
                self.on_level_change(msg.level)?;
                Ok(Some(SessionEvent::LevelChanged { level: msg.level }))
            }
            Inbound::Score { player, score } => {
                let slot = match player {
                    Player::Human => &mut self.human_score,
                    Player::Agent => &mut self.agent_score,
                };
                if *slot == Some(score) {
                    return Ok(None);
                }
                *slot = Some(score);
                Ok(Some(SessionEvent::ScoreChanged {
                    player,
                    score,
                }))
            }
        }
    }

    /// (Re)initialize for `level`, or park the request until setup completes.
    pub fn on_level_change(&mut self, level: u32) -> Result<()> {
        match self.setup {
            Setup::Ready { .. } => {
                self.pending = None;
                self.initialize(level)
            }
            Setup::Pending => {
                tracing::debug!(level, "surface not ready, parking level change");
                self.pending = Some(PendingInit::new(level, &self.config.init_retry));
                Ok(())
            }
        }
    }

    /// The surface now has a size. Drains a parked level change immediately.
    pub fn mark_ready(&mut self, width: f64, height: f64) -> Result<()> {
        self.setup = Setup::Ready { width, height };
        match self.pending.take() {
            Some(p) => self.initialize(p.level),
            None => Ok(()),
        }
    }

    /// New surface size: rebuild the current model's layouts for it.
    pub fn resize(&mut self, width: f64, height: f64) -> Result<()> {
        if self.setup == (Setup::Ready { width, height }) {
            return Ok(());
        }
        self.setup = Setup::Ready { width, height };
        if let Some(p) = self.pending.take() {
            return self.initialize(p.level);
        }
        match self.model.as_ref().map(|m| m.level) {
            Some(level) => self.initialize(level),
            None => Ok(()),
        }
    }

    pub fn start(&mut self) {
        self.scheduler.start();
    }

    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    fn initialize(&mut self, level: u32) -> Result<()> {
        let Setup::Ready { width, height } = self.setup else {
            return Err(VizError::PrematureInit { level, attempts: 0 });
        };
        let structure = self.catalog.get(level).inspect_err(|e| {
            tracing::warn!(level, error = %e, "no network structure for level");
        })?;
        let prepared = PreparedModel::prepare(level, structure, &self.config, (width, height))
            .inspect_err(|e| {
                tracing::warn!(level, error = %e, "rejected network structure, keeping previous model");
            })?;

        self.model = Some(prepared);
        self.scheduler.invalidate();
        self.scheduler.start();
        tracing::info!(level, width, height, "visualizer model swapped in");
        Ok(())
    }

    /// Advance a parked level change by one tick.
    ///
    /// Every transition to `Setup::Ready` drains `pending` itself, so a
    /// request still parked here only counts down towards `PrematureInit`.
    fn service_pending(&mut self) -> Result<()> {
        let Some(mut p) = self.pending else {
            return Ok(());
        };
        if p.wait > 0 {
            p.wait -= 1;
            self.pending = Some(p);
            return Ok(());
        }

        p.attempts += 1;
        if p.attempts >= self.config.init_retry.max_attempts {
            self.pending = None;
            tracing::warn!(level = p.level, attempts = p.attempts, "giving up on level change, surface never became ready");
            return Err(VizError::PrematureInit {
                level: p.level,
                attempts: p.attempts,
            });
        }
        p.backoff = p.backoff.saturating_mul(2);
        p.wait = p.backoff;
        tracing::debug!(level = p.level, attempts = p.attempts, next_in = p.wait, "surface still not ready");
        self.pending = Some(p);
        Ok(())
    }

    /// One refresh tick: service parked init, then draw the newest snapshot if
    /// it has not been drawn yet.
    pub fn tick<S: Surface + ?Sized>(&mut self, surface: &mut S) -> Result<TickOutcome> {
        self.service_pending()?;

        let Self {
            config,
            model,
            scheduler,
            mailbox,
            last_timings,
            last_render,
            ..
        } = self;
        let Some(model) = model.as_ref() else {
            return Ok(TickOutcome::Idle);
        };

        Ok(scheduler.tick(mailbox.as_ref(), |_, payload| {
            let mut timings = StageTimings::new();
            let snapshot = timings.time("parse", || {
                ActivationSnapshot::from_payload(payload, (config.frame_width, config.frame_height))
            })?;
            let decoded = timings.time("decode", || decode(&snapshot, &model.masks, config.firing_threshold))?;
            let stats = render_frame(surface, config, model, &snapshot, &decoded, &mut timings);
            timings.report();
            *last_timings = timings;
            *last_render = Some(stats);
            Ok(())
        }))
    }
}
