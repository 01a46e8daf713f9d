//! Daemon-side state: one visualizer session drawing into a software raster.

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use netviz::config::VisualizerConfig;
use netviz::mailbox::Mailbox;
use netviz::raster::Raster;
use netviz::render::RenderStats;
use netviz::scheduler::TickOutcome;
use netviz::session::{ModelCatalog, SessionEvent, SessionStatus, VisualizerSession};
use netviz::storage;
use netviz::structure::NetworkStructure;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::paths::AppPaths;

/// Viewport the daemon pretends to have; the canvas is derived from it.
const DEFAULT_VIEWPORT: (f64, f64) = (1800.0, 2000.0);

/// Hidden width of the synthetic fallback network.
const FALLBACK_HIDDEN: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub session: SessionStatus,
    pub target_fps: u32,
    pub frames_rendered: u64,
    pub canvas: (usize, usize),
    pub model_source: String,
    pub last_render: Option<RenderStats>,
    pub last_tick_micros: u64,
}

pub struct DaemonState {
    pub paths: AppPaths,
    pub session: VisualizerSession,
    pub raster: Raster,
    pub target_fps: u32,
    pub frames_rendered: u64,
    model_source: String,
}

impl DaemonState {
    pub fn new(paths: AppPaths) -> netviz::error::Result<Self> {
        let config = load_config(&paths.config_file());
        let (catalog, model_source) = load_catalog(&paths.models_dir(), &config)?;

        let (w, h) = config.canvas_size(DEFAULT_VIEWPORT.0, DEFAULT_VIEWPORT.1);
        let raster = Raster::try_new(w.round() as usize, h.round() as usize)?;
        let mut session = VisualizerSession::new(config, catalog)?;
        session.mark_ready(raster.width() as f64, raster.height() as f64)?;

        Ok(Self {
            paths,
            session,
            raster,
            target_fps: 30,
            frames_rendered: 0,
            model_source,
        })
    }

    pub fn mailbox(&self) -> Arc<Mailbox> {
        self.session.mailbox()
    }

    pub fn tick(&mut self) {
        match self.session.tick(&mut self.raster) {
            Ok(TickOutcome::Rendered { .. }) => self.frames_rendered += 1,
            Ok(_) => {}
            Err(e) => warn!("tick failed: {}", e),
        }
    }

    pub fn set_framerate(&mut self, fps: u32) -> Result<(), String> {
        if !(1..=240).contains(&fps) {
            return Err("fps must be between 1 and 240".to_string());
        }
        self.target_fps = fps;
        Ok(())
    }

    pub fn resize(&mut self, width: usize, height: usize) -> netviz::error::Result<()> {
        self.raster = Raster::try_new(width, height)?;
        self.session.resize(width as f64, height as f64)
    }

    pub fn publish(&mut self, topic: &str, payload: &str) -> netviz::error::Result<Option<SessionEvent>> {
        self.session.handle_message(topic, payload)
    }

    pub fn save_frame(&self, path: Option<&Path>) -> std::io::Result<PathBuf> {
        let path = path.map_or_else(|| self.paths.frame_file(), Path::to_path_buf);
        let mut w = BufWriter::new(File::create(&path)?);
        self.raster.write_ppm(&mut w)?;
        w.flush()?;
        Ok(path)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            session: self.session.status(),
            target_fps: self.target_fps,
            frames_rendered: self.frames_rendered,
            canvas: (self.raster.width(), self.raster.height()),
            model_source: self.model_source.clone(),
            last_render: self.session.last_render(),
            last_tick_micros: self.session.last_timings().total().as_micros() as u64,
        }
    }
}

fn load_config(path: &Path) -> VisualizerConfig {
    if !path.exists() {
        info!("No config at {}, using defaults", path.display());
        return VisualizerConfig::default();
    }
    match VisualizerConfig::load(path) {
        Ok(cfg) => {
            info!("Loaded config from {}", path.display());
            cfg
        }
        Err(e) => {
            warn!("Ignoring config {}: {}", path.display(), e);
            VisualizerConfig::default()
        }
    }
}

/// Level of a model file named `level_<n>.<ext>`.
fn level_of(stem: &str) -> Option<u32> {
    stem.strip_prefix("level_")?.parse().ok()
}

/// Model files in `dir`: `default.*` serves every level, `level_<n>.*` one level.
///
/// Falls back to a synthetic network when the directory has no usable model.
fn load_catalog(dir: &Path, config: &VisualizerConfig) -> netviz::error::Result<(ModelCatalog, String)> {
    let mut catalog = ModelCatalog::new();
    let mut loaded = Vec::new();

    let mut entries: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(|e| e.ok().map(|e| e.path())).collect(),
        Err(e) => {
            warn!("Cannot read models dir {}: {}", dir.display(), e);
            Vec::new()
        }
    };
    entries.sort();

    for path in entries.into_iter().filter(|p| p.is_file()) {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let slot = if stem == "default" {
            None
        } else if let Some(level) = level_of(stem) {
            Some(level)
        } else {
            continue;
        };
        match storage::load_structure_file(&path) {
            Ok(structure) => {
                info!(
                    "Loaded model {} ({:?} neurons)",
                    path.display(),
                    structure.neuron_counts()
                );
                match slot {
                    Some(level) => catalog.insert(level, structure),
                    None => catalog.set_shared(structure),
                }
                loaded.push(path.display().to_string());
            }
            Err(e) => warn!("Skipping model {}: {}", path.display(), e),
        }
    }

    if catalog.is_empty() {
        let sizes = [
            config.frame_width * config.frame_height,
            FALLBACK_HIDDEN,
            config.output_labels.len().max(1),
        ];
        info!("No model files found, using a synthetic {:?} network", sizes);
        catalog.set_shared(NetworkStructure::synthetic(&sizes, 0x5EED)?);
        return Ok((catalog, "synthetic".to_string()));
    }
    Ok((catalog, loaded.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_paths(tag: &str) -> AppPaths {
        let root = std::env::temp_dir().join(format!("netvizd-{}-{}", tag, std::process::id()));
        AppPaths::at(root.join("data"), root.join("config")).unwrap()
    }

    #[test]
    fn parses_level_file_names() {
        assert_eq!(level_of("level_3"), Some(3));
        assert_eq!(level_of("level_x"), None);
        assert_eq!(level_of("default"), None);
    }

    #[test]
    fn starts_with_synthetic_model_and_renders() {
        let paths = temp_paths("synthetic");
        let mut state = DaemonState::new(paths.clone()).unwrap();
        assert_eq!(state.snapshot().model_source, "synthetic");

        state.publish("game/level", r#"{"level": 1}"#).unwrap();
        let cfg = state.session.config().clone();
        let snapshot = netviz::wire::ActivationSnapshot {
            frame: netviz::wire::GameFrame::blank(cfg.frame_width, cfg.frame_height),
            hidden: vec![0.5; FALLBACK_HIDDEN],
            output: vec![0.2, 0.3, 0.5],
        };
        state
            .publish("ai/activation", &snapshot.to_payload().unwrap())
            .unwrap();
        state.tick();
        state.tick();
        assert_eq!(state.frames_rendered, 1);

        let out = state.save_frame(None).unwrap();
        assert!(out.exists());
        std::fs::remove_dir_all(paths.data_dir().parent().unwrap()).ok();
    }

    #[test]
    fn resize_rejects_unusable_sizes_and_keeps_canvas() {
        let paths = temp_paths("resize");
        let mut state = DaemonState::new(paths.clone()).unwrap();
        let before = state.snapshot().canvas;

        for (w, h) in [(0, 100), (1 << 40, 1 << 40), (netviz::raster::MAX_SIDE + 1, 10)] {
            assert!(matches!(
                state.resize(w, h),
                Err(netviz::error::VizError::RenderSurfaceUnavailable(_))
            ));
        }
        assert_eq!(state.snapshot().canvas, before);

        state.resize(320, 200).unwrap();
        assert_eq!(state.snapshot().canvas, (320, 200));
        state.tick();
        std::fs::remove_dir_all(paths.data_dir().parent().unwrap()).ok();
    }

    #[test]
    fn per_level_model_files_are_picked_up() {
        let paths = temp_paths("levels");
        let cfg = VisualizerConfig::default();
        let s = NetworkStructure::synthetic(&[cfg.frame_width * cfg.frame_height, 16, 3], 1).unwrap();
        storage::save_structure_file(&paths.models_dir().join("level_2.nvz"), &s).unwrap();
        std::fs::write(paths.models_dir().join("notes.txt"), "ignored").unwrap();

        let (catalog, source) = load_catalog(&paths.models_dir(), &cfg).unwrap();
        assert!(source.contains("level_2.nvz"));
        assert_eq!(catalog.levels().collect::<Vec<_>>(), vec![2]);
        assert!(catalog.get(1).is_err());
        std::fs::remove_dir_all(paths.data_dir().parent().unwrap()).ok();
    }
}
