//! Everything derived from a network structure for one canvas size.
//!
//! A [`PreparedModel`] is built completely before it replaces the previous one,
//! so the renderer never sees a half-updated model.

use std::sync::Arc;

use crate::config::VisualizerConfig;
use crate::error::{Result, VizError};
use crate::layout::{layout_layer, pixel_grid, NeuronLayout, Rect};
use crate::significance::{compute_masks, SignificanceMask};
use crate::structure::NetworkStructure;

/// Weight layers carried by an activation snapshot (hidden, output).
pub const SNAPSHOT_WEIGHT_LAYERS: usize = 2;

/// Gap between the game image and the weight-map overlay.
const OVERLAY_GAP: f64 = 8.0;

#[derive(Debug, Clone)]
pub struct PreparedModel {
    pub level: u32,
    pub structure: Arc<NetworkStructure>,
    /// One per weight layer.
    pub masks: Vec<SignificanceMask>,
    /// One per layer, the game image's pixel grid first.
    pub layouts: Vec<NeuronLayout>,
    /// Largest `|w|` per weight layer, for opacity scaling.
    pub weight_scale: Vec<f32>,
    /// Biases rescaled to `[0, 1]` per weight layer.
    pub bias_levels: Vec<Vec<f32>>,
    pub canvas: (f64, f64),
    pub image_rect: Rect,
    pub overlay_rect: Rect,
}

impl PreparedModel {
    pub fn prepare(
        level: u32,
        structure: Arc<NetworkStructure>,
        cfg: &VisualizerConfig,
        canvas: (f64, f64),
    ) -> Result<Self> {
        let layers = structure.layers();
        if layers.len() != SNAPSHOT_WEIGHT_LAYERS {
            return Err(VizError::mismatch(
                "weight layer count",
                SNAPSHOT_WEIGHT_LAYERS,
                layers.len(),
            ));
        }
        if cfg.layers.len() < layers.len() {
            return Err(VizError::mismatch(
                "configured layers",
                layers.len(),
                cfg.layers.len(),
            ));
        }
        let pixels = cfg.frame_width * cfg.frame_height;
        if structure.input_count() != pixels {
            return Err(VizError::mismatch(
                "input layer (frame pixels)",
                pixels,
                structure.input_count(),
            ));
        }

        let (canvas_w, canvas_h) = canvas;
        let (img_w, img_h) = cfg.image_size();
        let image_rect = Rect::new((canvas_w - img_w) / 2.0, canvas_h - img_h, img_w, img_h);
        let overlay_rect = Rect::new(image_rect.x + img_w + OVERLAY_GAP, image_rect.y, img_w, img_h);

        let matrices: Vec<_> = layers.iter().map(|l| &l.weights).collect();
        let fractions: Vec<f32> = cfg
            .layers
            .iter()
            .take(layers.len())
            .map(|l| l.retain_fraction)
            .collect();
        let masks = compute_masks(&matrices, &fractions);

        let mut layouts = Vec::with_capacity(layers.len() + 1);
        layouts.push(pixel_grid(cfg.frame_width, cfg.frame_height, image_rect));
        for (layer, lc) in layers.iter().zip(&cfg.layers) {
            layouts.push(layout_layer(
                layer.neurons(),
                (0.0, canvas_w),
                lc.y_fraction * canvas_h,
                canvas_h,
                cfg.min_padding,
            ));
        }

        let weight_scale = matrices.iter().map(|w| w.max_abs()).collect();
        let bias_levels = layers.iter().map(|l| rescale01(&l.biases)).collect();

        tracing::info!(
            level,
            neurons = ?structure.neuron_counts(),
            significant = ?masks.iter().map(SignificanceMask::len).collect::<Vec<_>>(),
            "model prepared"
        );

        Ok(Self {
            level,
            structure,
            masks,
            layouts,
            weight_scale,
            bias_levels,
            canvas,
            image_rect,
            overlay_rect,
        })
    }
}

/// Min-max rescale to `[0, 1]`; a constant vector maps to all ones.
pub fn rescale01(values: &[f32]) -> Vec<f32> {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = hi - lo;
    values
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                0.0
            } else if span > 0.0 {
                (v - lo) / span
            } else {
                1.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cfg() -> VisualizerConfig {
        VisualizerConfig {
            frame_width: 4,
            frame_height: 2,
            image_upscale: 2,
            ..VisualizerConfig::default()
        }
    }

    #[test]
    fn prepares_layouts_and_masks_for_every_layer() {
        let cfg = small_cfg();
        let s = Arc::new(NetworkStructure::synthetic(&[8, 5, 3], 1).unwrap());
        let m = PreparedModel::prepare(1, s, &cfg, (200.0, 100.0)).unwrap();

        assert_eq!(m.layouts.iter().map(NeuronLayout::len).collect::<Vec<_>>(), vec![8, 5, 3]);
        assert_eq!(m.masks.len(), 2);
        // 2% of 40 rounds to 1, 30% of 15 rounds to 5.
        assert_eq!(m.masks[0].len(), 1);
        assert_eq!(m.masks[1].len(), 5);
        assert_eq!(m.image_rect, Rect::new(96.0, 96.0, 8.0, 4.0));
        assert_eq!(m.layouts[1].positions[0].y, 30.0);
        assert_eq!(m.layouts[2].positions[0].y, 13.0);
    }

    #[test]
    fn rejects_input_width_that_disagrees_with_frame() {
        let cfg = small_cfg();
        let s = Arc::new(NetworkStructure::synthetic(&[9, 5, 3], 1).unwrap());
        let err = PreparedModel::prepare(1, s, &cfg, (200.0, 100.0)).unwrap_err();
        assert!(matches!(err, VizError::DimensionMismatch { expected: 8, actual: 9, .. }));
    }

    #[test]
    fn rejects_unsupported_depth() {
        let cfg = small_cfg();
        let s = Arc::new(NetworkStructure::synthetic(&[8, 5, 4, 3], 1).unwrap());
        assert!(PreparedModel::prepare(1, s, &cfg, (200.0, 100.0)).is_err());
    }

    #[test]
    fn rescale_handles_constant_and_nan() {
        assert_eq!(rescale01(&[1.0, 3.0, 2.0]), vec![0.0, 1.0, 0.5]);
        assert_eq!(rescale01(&[2.0, 2.0]), vec![1.0, 1.0]);
        assert_eq!(rescale01(&[f32::NAN, 0.0, 1.0]), vec![0.0, 0.0, 1.0]);
    }
}
