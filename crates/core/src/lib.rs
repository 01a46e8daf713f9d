//! # netviz
//!
//! Live visualization of a small feed-forward network playing a game.
//!
//! The crate turns a stream of activation snapshots into redraws of a 2D
//! surface: the game frame the agent saw, the network's most significant
//! weights as edges, and which neurons fired. It does not talk to any message
//! bus or windowing system itself; hosts feed it topic messages and a
//! [`Surface`](surface::Surface) to draw on.
//!
//! ## Quick Start
//!
//! ```
//! use netviz::prelude::*;
//!
//! let cfg = VisualizerConfig {
//!     frame_width: 4,
//!     frame_height: 2,
//!     ..VisualizerConfig::default()
//! };
//! let structure = NetworkStructure::synthetic(&[8, 6, 3], 42).unwrap();
//! let mut session = VisualizerSession::new(cfg, ModelCatalog::shared(structure)).unwrap();
//!
//! session.mark_ready(640.0, 400.0).unwrap();
//! session.handle_message(topics::LEVEL, r#"{"level": 1}"#).unwrap();
//! session
//!     .handle_message(
//!         topics::ACTIVATION,
//!         "[[0, 1, 0, 1, 1, 0, 1, 0], [0.2, 0.0, 0.7, 0.1, 0.0, 0.4], [0.1, 0.8, 0.1]]",
//!     )
//!     .unwrap();
//!
//! let mut surface = RecordingSurface::new(640.0, 400.0);
//! let outcome = session.tick(&mut surface).unwrap();
//! assert_eq!(outcome, TickOutcome::Rendered { version: 1 });
//! ```
//!
//! ## Feature Flags
//!
//! - `parallel`: compute per-layer significance masks on the rayon pool
//!
//! ## Modules
//!
//! - [`significance`]: which weights are worth drawing
//! - [`layout`]: where neurons sit on the canvas
//! - [`decode`]: firing sets and active edges of one snapshot
//! - [`render`]: one full redraw onto a [`Surface`](surface::Surface)
//! - [`scheduler`] and [`mailbox`]: at most one redraw per refresh, newest snapshot only
//! - [`session`]: the state a client holds, model (re)initialization included

#[path = "core/error.rs"]
pub mod error;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/structure.rs"]
pub mod structure;

#[path = "core/significance.rs"]
pub mod significance;

#[path = "core/layout.rs"]
pub mod layout;

#[path = "core/wire.rs"]
pub mod wire;

#[path = "core/decode.rs"]
pub mod decode;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/surface.rs"]
pub mod surface;

#[path = "core/timing.rs"]
pub mod timing;

#[path = "core/model.rs"]
pub mod model;

#[path = "core/render.rs"]
pub mod render;

#[path = "core/mailbox.rs"]
pub mod mailbox;

#[path = "core/scheduler.rs"]
pub mod scheduler;

#[path = "core/session.rs"]
pub mod session;

#[path = "core/storage.rs"]
pub mod storage;

#[path = "core/raster.rs"]
pub mod raster;

/// Prelude module for convenient imports.
///
/// ```
/// use netviz::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{LayerConfig, RetryPolicy, VisualizerConfig};
    pub use crate::decode::{decode, ActiveEdges, DecodedFrame, FiringSet};
    pub use crate::error::{Result, VizError};
    pub use crate::layout::{layout_layer, pixel_grid, NeuronLayout, Point, Rect};
    pub use crate::mailbox::Mailbox;
    pub use crate::model::PreparedModel;
    pub use crate::raster::Raster;
    pub use crate::render::{render_frame, RenderStats};
    pub use crate::scheduler::{RenderScheduler, SchedulerState, SchedulerStats, TickOutcome};
    pub use crate::session::{ModelCatalog, SessionEvent, SessionStatus, Setup, VisualizerSession};
    pub use crate::significance::{compute_mask, compute_masks, SignificanceMask};
    pub use crate::structure::{Layer, NetworkStructure, WeightMatrix};
    pub use crate::surface::{RecordingSurface, Surface};
    pub use crate::wire::{topics, ActivationSnapshot, GameFrame, Player};
}
