//! The `Visualizer` class exported to JavaScript.
//!
//! The page owns the message-bus client and forwards every message to
//! [`Visualizer::on_message`]. Drawing happens on a timer started by
//! [`Visualizer::start`], one session tick per interval.

use std::cell::RefCell;
use std::rc::Rc;

use netviz::config::VisualizerConfig;
use netviz::error::VizError;
use netviz::scheduler::TickOutcome;
use netviz::session::{ModelCatalog, VisualizerSession};
use netviz::structure::NetworkStructure;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

mod canvas;

use canvas::CanvasSurface;

/// Interval between refresh ticks (about 60 Hz).
const TICK_MS: i32 = 16;

fn js_err(e: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&e.to_string()).into()
}

fn log(msg: &str) {
    web_sys::console::log_1(&JsValue::from_str(msg));
}

fn warn(msg: &str) {
    web_sys::console::warn_1(&JsValue::from_str(msg));
}

struct Inner {
    session: VisualizerSession,
    surface: Option<CanvasSurface>,
}

impl Inner {
    fn tick(&mut self) -> Result<TickOutcome, JsValue> {
        let Some(surface) = self.surface.as_mut() else {
            return Ok(TickOutcome::Idle);
        };
        self.session.tick(surface).map_err(js_err)
    }
}

#[wasm_bindgen]
pub struct Visualizer {
    inner: Rc<RefCell<Inner>>,
    interval_id: Option<i32>,
    tick_cb: Option<Closure<dyn FnMut()>>,
}

#[wasm_bindgen]
impl Visualizer {
    /// `config_json` may be omitted or partial; missing fields take defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<Visualizer, JsValue> {
        let config = match config_json.as_deref() {
            Some(json) if !json.trim().is_empty() => VisualizerConfig::from_json_str(json).map_err(js_err)?,
            _ => VisualizerConfig::default(),
        };
        let session = VisualizerSession::new(config, ModelCatalog::new()).map_err(js_err)?;
        Ok(Visualizer {
            inner: Rc::new(RefCell::new(Inner {
                session,
                surface: None,
            })),
            interval_id: None,
            tick_cb: None,
        })
    }

    /// Register a Keras-style weight list, for one level or (without `level`) for all.
    pub fn load_model(&mut self, level: Option<u32>, weights_json: &str) -> Result<(), JsValue> {
        let structure = NetworkStructure::from_json_str(weights_json).map_err(js_err)?;
        log(&format!("netviz: model loaded, neurons {:?}", structure.neuron_counts()));
        let mut inner = self.inner.borrow_mut();
        let catalog = inner.session.catalog_mut();
        match level {
            Some(level) => catalog.insert(level, structure),
            None => catalog.set_shared(structure),
        }
        Ok(())
    }

    /// Bind to the canvas with this element id and size it from the viewport.
    ///
    /// Fails when the element is missing or has no 2D context.
    pub fn attach_canvas(&mut self, id: &str, viewport_width: f64, viewport_height: f64) -> Result<(), JsValue> {
        let surface = CanvasSurface::attach(id).map_err(js_err)?;
        let mut inner = self.inner.borrow_mut();
        let (w, h) = inner.session.config().canvas_size(viewport_width, viewport_height);
        surface.set_size(w, h);
        inner.surface = Some(surface);
        inner.session.mark_ready(w.floor(), h.floor()).map_err(js_err)
    }

    /// Call from the page's `resize` handler.
    pub fn resize(&mut self, viewport_width: f64, viewport_height: f64) -> Result<(), JsValue> {
        let mut inner = self.inner.borrow_mut();
        let (w, h) = inner.session.config().canvas_size(viewport_width, viewport_height);
        let Some(surface) = inner.surface.as_ref() else {
            return Ok(());
        };
        surface.set_size(w, h);
        inner.session.resize(w.floor(), h.floor()).map_err(js_err)
    }

    /// Route one bus message. Returns a JSON event string, or `null` when
    /// nothing observable changed. Malformed payloads are logged and dropped.
    pub fn on_message(&mut self, topic: &str, payload: &str) -> Result<JsValue, JsValue> {
        let result = self.inner.borrow_mut().session.handle_message(topic, payload);
        let event = match result {
            Ok(event) => event,
            Err(e @ VizError::MalformedPayload { .. }) => {
                warn(&format!("netviz: dropped message: {}", e));
                return Ok(JsValue::NULL);
            }
            Err(e) => return Err(js_err(e)),
        };
        match event {
            Some(ev) => Ok(JsValue::from_str(&serde_json::to_string(&ev).map_err(js_err)?)),
            None => Ok(JsValue::NULL),
        }
    }

    /// Start ticking on a timer.
    pub fn start(&mut self) -> Result<(), JsValue> {
        self.inner.borrow_mut().session.start();
        if self.interval_id.is_some() {
            return Ok(());
        }
        let window = web_sys::window().ok_or_else(|| js_err("no window"))?;

        let inner = Rc::clone(&self.inner);
        let cb = Closure::wrap(Box::new(move || {
            let Ok(mut inner) = inner.try_borrow_mut() else {
                return;
            };
            if let Err(e) = inner.tick() {
                warn(&format!("netviz: tick failed: {:?}", e));
            }
        }) as Box<dyn FnMut()>);

        let id = window.set_interval_with_callback_and_timeout_and_arguments_0(
            cb.as_ref().unchecked_ref(),
            TICK_MS,
        )?;
        self.interval_id = Some(id);
        self.tick_cb = Some(cb);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(id) = self.interval_id.take() {
            if let Some(w) = web_sys::window() {
                w.clear_interval_with_handle(id);
            }
        }
        self.tick_cb = None;
        self.inner.borrow_mut().session.stop();
    }

    /// Run exactly one tick; returns what it did.
    pub fn step(&mut self) -> Result<String, JsValue> {
        let outcome = self.inner.borrow_mut().tick()?;
        Ok(format!("{:?}", outcome))
    }

    /// Session status as JSON.
    pub fn status(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.inner.borrow().session.status()).map_err(js_err)
    }
}

impl Drop for Visualizer {
    fn drop(&mut self) {
        if let Some(id) = self.interval_id.take() {
            if let Some(w) = web_sys::window() {
                w.clear_interval_with_handle(id);
            }
        }
    }
}
