//! Visualizer configuration.
//!
//! Every field has a default so a partial JSON file (or none at all) is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VizError};

/// Per weight layer: how much of its incoming weights to draw and where its neurons sit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Fraction of incoming weights drawn, in `[0, 1]`.
    pub retain_fraction: f32,
    /// Vertical position of the neuron band as a fraction of canvas height.
    pub y_fraction: f64,
}

/// Bounded retry for level changes that arrive before setup completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Ticks before the first retry; doubles after each failed attempt.
    pub initial_backoff_ticks: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_backoff_ticks: 1,
        }
    }
}

fn default_frame_width() -> usize {
    96
}

fn default_frame_height() -> usize {
    80
}

fn default_image_upscale() -> u32 {
    4
}

fn default_min_padding() -> f64 {
    4.0
}

fn default_layers() -> Vec<LayerConfig> {
    vec![
        LayerConfig {
            retain_fraction: 0.02,
            y_fraction: 0.30,
        },
        LayerConfig {
            retain_fraction: 0.30,
            y_fraction: 0.13,
        },
    ]
}

fn default_output_labels() -> Vec<String> {
    vec!["LEFT".to_string(), "RIGHT".to_string(), "NONE".to_string()]
}

fn default_label_offset() -> f64 {
    40.0
}

fn default_title_font() -> String {
    "bold 18px sans-serif".to_string()
}

fn default_label_font() -> String {
    "12px ui-sans-serif, system-ui, sans-serif".to_string()
}

fn default_viewport_width_fraction() -> f64 {
    4.0 / 6.0
}

fn default_viewport_height_fraction() -> f64 {
    1.0 / 2.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizerConfig {
    /// Width of a flattened game frame, in pixels.
    #[serde(default = "default_frame_width")]
    pub frame_width: usize,
    #[serde(default = "default_frame_height")]
    pub frame_height: usize,
    /// Integer nearest-neighbour scale for the game image.
    #[serde(default = "default_image_upscale")]
    pub image_upscale: u32,
    #[serde(default = "default_min_padding")]
    pub min_padding: f64,
    /// One entry per weight layer, first hidden layer first.
    #[serde(default = "default_layers")]
    pub layers: Vec<LayerConfig>,
    #[serde(default = "default_output_labels")]
    pub output_labels: Vec<String>,
    /// Activations strictly above this value count as firing.
    #[serde(default)]
    pub firing_threshold: f32,
    /// Distance of confidence labels above output neurons.
    #[serde(default = "default_label_offset")]
    pub label_offset: f64,
    #[serde(default = "default_title_font")]
    pub title_font: String,
    #[serde(default = "default_label_font")]
    pub label_font: String,
    #[serde(default = "default_viewport_width_fraction")]
    pub viewport_width_fraction: f64,
    #[serde(default = "default_viewport_height_fraction")]
    pub viewport_height_fraction: f64,
    /// Draw the strongest hidden neuron's input weights beside the game frame.
    #[serde(default)]
    pub weight_overlay: bool,
    #[serde(default)]
    pub init_retry: RetryPolicy,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            image_upscale: default_image_upscale(),
            min_padding: default_min_padding(),
            layers: default_layers(),
            output_labels: default_output_labels(),
            firing_threshold: 0.0,
            label_offset: default_label_offset(),
            title_font: default_title_font(),
            label_font: default_label_font(),
            viewport_width_fraction: default_viewport_width_fraction(),
            viewport_height_fraction: default_viewport_height_fraction(),
            weight_overlay: false,
            init_retry: RetryPolicy::default(),
        }
    }
}

impl VisualizerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.image_upscale == 0 {
            return Err(VizError::Config("image_upscale must be at least 1".to_string()));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(VizError::Config("frame dimensions must be non-zero".to_string()));
        }
        if self.layers.is_empty() {
            return Err(VizError::Config("at least one layer must be configured".to_string()));
        }
        for (i, l) in self.layers.iter().enumerate() {
            if !(0.0..=1.0).contains(&l.retain_fraction) {
                return Err(VizError::Config(format!(
                    "layers[{}].retain_fraction {} is outside [0, 1]",
                    i, l.retain_fraction
                )));
            }
            if !(0.0..=1.0).contains(&l.y_fraction) {
                return Err(VizError::Config(format!(
                    "layers[{}].y_fraction {} is outside [0, 1]",
                    i, l.y_fraction
                )));
            }
        }
        if !self.min_padding.is_finite() || self.min_padding < 0.0 {
            return Err(VizError::Config("min_padding must be a non-negative number".to_string()));
        }
        for (name, v) in [
            ("viewport_width_fraction", self.viewport_width_fraction),
            ("viewport_height_fraction", self.viewport_height_fraction),
        ] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(VizError::Config(format!("{} must be in (0, 1]", name)));
            }
        }
        if self.init_retry.max_attempts == 0 {
            return Err(VizError::Config("init_retry.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Canvas size for a viewport of `width × height`.
    pub fn canvas_size(&self, viewport_width: f64, viewport_height: f64) -> (f64, f64) {
        (
            viewport_width * self.viewport_width_fraction,
            viewport_height * self.viewport_height_fraction,
        )
    }

    /// Display size of the upscaled game image.
    pub fn image_size(&self) -> (f64, f64) {
        let s = self.image_upscale as f64;
        (self.frame_width as f64 * s, self.frame_height as f64 * s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = VisualizerConfig::from_json_str(r#"{"image_upscale": 2, "firing_threshold": 0.25}"#).unwrap();
        assert_eq!(cfg.image_upscale, 2);
        assert_eq!(cfg.firing_threshold, 0.25);
        assert_eq!(cfg.layers, default_layers());
        assert_eq!(cfg.output_labels.len(), 3);
    }

    #[test]
    fn rejects_out_of_range_fractions() {
        let err = VisualizerConfig::from_json_str(
            r#"{"layers": [{"retain_fraction": 1.5, "y_fraction": 0.3}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, VizError::Config(_)));

        let cfg = VisualizerConfig {
            image_upscale: 0,
            ..VisualizerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_geometry() {
        let cfg = VisualizerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.image_size(), (384.0, 320.0));
        let (w, h) = cfg.canvas_size(1800.0, 1000.0);
        assert!((w - 1200.0).abs() < 1e-9 && (h - 400.0).abs() < 1e-9);
    }
}
