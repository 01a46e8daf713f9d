//! Frame renderer: composes one full redraw of the visualizer.
//!
//! Draw order is fixed: clear, game image, edges, neuron markers, labels.
//! Edges go under the markers and the image goes first so every overlay
//! stays visible.

use serde::{Deserialize, Serialize};

use crate::config::VisualizerConfig;
use crate::decode::DecodedFrame;
use crate::layout::{Point, Rect};
use crate::model::PreparedModel;
use crate::structure::WeightMatrix;
use crate::surface::{FillStyle, Rgba, RgbaImage, StrokeStyle, Surface, TextAlign, TextStyle};
use crate::timing::StageTimings;
use crate::wire::{ActivationSnapshot, GameFrame};

const POSITIVE: Rgba = Rgba::new(122, 162, 255, 1.0);
const NEGATIVE: Rgba = Rgba::new(251, 113, 133, 1.0);
const FIRING: Rgba = Rgba::new(251, 191, 36, 1.0);
const RESTING: Rgba = Rgba::new(148, 163, 184, 1.0);
const TEXT: Rgba = Rgba::new(255, 255, 255, 0.92);

/// Markers never shrink below this radius so dense layers stay visible.
const MIN_MARKER_RADIUS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderStats {
    pub edges: usize,
    pub active_edges: usize,
    pub neurons: usize,
    pub labels: usize,
}

/// Nearest-neighbour upscale; gray is replicated to RGB at full opacity.
pub fn upscale_frame(frame: &GameFrame, factor: u32) -> RgbaImage {
    let f = factor.max(1) as usize;
    let mut img = RgbaImage::new(frame.width * f, frame.height * f);
    for y in 0..img.height {
        for x in 0..img.width {
            let g = gray_u8(frame.get(x / f, y / f));
            img.put(x, y, [g, g, g, 255]);
        }
    }
    img
}

#[inline]
fn gray_u8(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Index of the largest finite activation.
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

/// Incoming weights of `neuron` as a translucent `width × height` image.
///
/// Gray is `127 + 127·w/max|w|`; alpha fades out the weakest weights.
pub fn weight_map_image(weights: &WeightMatrix, neuron: usize, width: usize, height: usize) -> RgbaImage {
    let mut img = RgbaImage::new(width, height);
    if neuron >= weights.cols() || weights.rows() != width * height {
        return img;
    }
    let max = weights
        .column(neuron)
        .filter(|w| w.is_finite())
        .fold(0.0f32, |m, w| m.max(w.abs()));
    let scale = if max > 0.0 { 127.0 / max } else { 0.0 };
    for (i, w) in weights.column(neuron).enumerate() {
        let w = if w.is_finite() { w } else { 0.0 };
        let g = (127.0 + w * scale).round().clamp(0.0, 255.0) as u8;
        let a = g.saturating_sub(64);
        img.put(i % width, i / width, [g, g, g, a]);
    }
    img
}

fn edge_style(weight: f32, scale: f32, active: bool) -> StrokeStyle {
    let mag = if scale > 0.0 {
        (weight.abs() / scale).clamp(0.0, 1.0) as f64
    } else {
        0.0
    };
    let base = if weight >= 0.0 { POSITIVE } else { NEGATIVE };
    if active {
        StrokeStyle {
            color: base.with_alpha((0.55 + 0.45 * mag) as f32),
            width: 1.0 + 1.5 * mag,
        }
    } else {
        StrokeStyle {
            color: base.with_alpha((0.04 + 0.16 * mag) as f32),
            width: 0.5,
        }
    }
}

fn marker_style(bias_level: f32, firing: bool) -> FillStyle {
    if firing {
        FillStyle { color: FIRING }
    } else {
        FillStyle {
            color: RESTING.with_alpha(0.25 + 0.5 * bias_level.clamp(0.0, 1.0)),
        }
    }
}

/// Redraw the whole surface for one decoded snapshot.
pub fn render_frame<S: Surface + ?Sized>(
    surface: &mut S,
    cfg: &VisualizerConfig,
    model: &PreparedModel,
    snapshot: &ActivationSnapshot,
    decoded: &DecodedFrame,
    timings: &mut StageTimings,
) -> RenderStats {
    let mut stats = RenderStats::default();
    let (w, h) = surface.size();
    surface.clear(Rect::new(0.0, 0.0, w, h));

    timings.time("image", || draw_game_image(surface, cfg, model, snapshot));

    timings.time("edges", || {
        let layers = model.structure.layers();
        for (k, mask) in model.masks.iter().enumerate() {
            let (Some(from), Some(to)) = (model.layouts.get(k), model.layouts.get(k + 1)) else {
                continue;
            };
            let weights = &layers[k].weights;
            let scale = model.weight_scale[k];
            let active = decoded.active.get(k);
            let is_active = |i: usize, j: usize| active.is_some_and(|a| a.contains(i, j));

            // Active edges are drawn in a second pass so they sit on top.
            for pass_active in [false, true] {
                for (i, j) in mask.iter() {
                    if is_active(i, j) != pass_active {
                        continue;
                    }
                    let (Some(&p), Some(&q)) = (from.positions.get(i), to.positions.get(j)) else {
                        continue;
                    };
                    surface.draw_line(p, q, &edge_style(weights.get(i, j), scale, pass_active));
                    stats.edges += 1;
                    stats.active_edges += usize::from(pass_active);
                }
            }
        }
    });

    timings.time("layers", || {
        for (k, layout) in model.layouts.iter().enumerate().skip(1) {
            let radius = (layout.neuron_size / 2.0).max(MIN_MARKER_RADIUS);
            let firing = decoded.firing.get(k);
            let bias = &model.bias_levels[k - 1];
            for (i, &p) in layout.positions.iter().enumerate() {
                let on = firing.is_some_and(|f| f.contains(i));
                let level = bias.get(i).copied().unwrap_or(0.5);
                surface.fill_circle(p, radius, &marker_style(level, on));
                stats.neurons += 1;
            }
        }
    });

    timings.time("labels", || {
        stats.labels = draw_output_labels(surface, cfg, model, &snapshot.output);
    });

    stats
}

fn draw_game_image<S: Surface + ?Sized>(
    surface: &mut S,
    cfg: &VisualizerConfig,
    model: &PreparedModel,
    snapshot: &ActivationSnapshot,
) {
    let frame = &snapshot.frame;
    let image = upscale_frame(frame, cfg.image_upscale);
    let dest = Rect::new(
        model.image_rect.x,
        model.image_rect.y,
        image.width as f64,
        image.height as f64,
    );
    surface.draw_image(&image, dest);

    if cfg.weight_overlay {
        if let Some(top) = argmax(&snapshot.hidden) {
            let first = &model.structure.layers()[0].weights;
            let map = weight_map_image(first, top, frame.width, frame.height);
            let map = upscale_rgba(&map, cfg.image_upscale);
            let dest = Rect::new(
                model.overlay_rect.x,
                model.overlay_rect.y,
                map.width as f64,
                map.height as f64,
            );
            surface.draw_image(&map, dest);
        }
    }
}

fn upscale_rgba(src: &RgbaImage, factor: u32) -> RgbaImage {
    let f = factor.max(1) as usize;
    let mut img = RgbaImage::new(src.width * f, src.height * f);
    for y in 0..img.height {
        for x in 0..img.width {
            img.put(x, y, src.pixel(x / f, y / f));
        }
    }
    img
}

/// Confidence percentages above each output neuron, action names below.
fn draw_output_labels<S: Surface + ?Sized>(
    surface: &mut S,
    cfg: &VisualizerConfig,
    model: &PreparedModel,
    output: &[f32],
) -> usize {
    let Some(layout) = model.layouts.last() else {
        return 0;
    };
    let title = TextStyle {
        font: cfg.title_font.clone(),
        color: TEXT,
        align: TextAlign::Center,
    };
    let small = TextStyle {
        font: cfg.label_font.clone(),
        color: TEXT.with_alpha(0.7),
        align: TextAlign::Center,
    };
    let radius = (layout.neuron_size / 2.0).max(MIN_MARKER_RADIUS);

    let mut drawn = 0;
    for (i, &p) in layout.positions.iter().enumerate() {
        if let Some(&a) = output.get(i) {
            let text = format!("{:.2}%", a * 100.0);
            surface.draw_text(&text, Point::new(p.x, p.y - cfg.label_offset), &title);
            drawn += 1;
        }
        if let Some(name) = cfg.output_labels.get(i) {
            surface.draw_text(name, Point::new(p.x, p.y + radius + 14.0), &small);
            drawn += 1;
        }
    }
    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::structure::{Layer, NetworkStructure};
    use crate::surface::{DrawOp, RecordingSurface};
    use std::sync::Arc;

    fn cfg() -> VisualizerConfig {
        let mut cfg = VisualizerConfig {
            frame_width: 2,
            frame_height: 1,
            image_upscale: 3,
            ..VisualizerConfig::default()
        };
        cfg.layers[0].retain_fraction = 1.0;
        cfg.layers[1].retain_fraction = 1.0;
        cfg
    }

    fn model(cfg: &VisualizerConfig) -> PreparedModel {
        let l0 = Layer::new(WeightMatrix::new(2, 2, vec![0.5, -0.5, 1.0, 0.25]).unwrap(), vec![0.0, 1.0]).unwrap();
        let l1 = Layer::new(
            WeightMatrix::new(2, 3, vec![1.0, 0.1, 0.2, -0.3, 0.4, 0.5]).unwrap(),
            vec![0.0, 0.5, 1.0],
        )
        .unwrap();
        let s = Arc::new(NetworkStructure::new(vec![l0, l1]).unwrap());
        PreparedModel::prepare(1, s, cfg, (300.0, 200.0)).unwrap()
    }

    fn snapshot() -> ActivationSnapshot {
        ActivationSnapshot {
            frame: GameFrame::new(2, 1, vec![1.0, 0.0]).unwrap(),
            hidden: vec![0.9, 0.0],
            output: vec![0.3, 0.2, 0.5],
        }
    }

    #[test]
    fn upscale_replicates_gray_nearest_neighbour() {
        let frame = GameFrame::new(2, 1, vec![0.0, 1.0]).unwrap();
        let img = upscale_frame(&frame, 2);
        assert_eq!((img.width, img.height), (4, 2));
        assert_eq!(img.pixel(1, 1), [0, 0, 0, 255]);
        assert_eq!(img.pixel(2, 0), [255, 255, 255, 255]);
        assert_eq!(img.pixel(3, 1), [255, 255, 255, 255]);
    }

    #[test]
    fn draws_in_fixed_order() {
        let cfg = cfg();
        let m = model(&cfg);
        let snap = snapshot();
        let decoded = decode(&snap, &m.masks, cfg.firing_threshold).unwrap();
        let mut surface = RecordingSurface::new(300.0, 200.0);
        let stats = render_frame(&mut surface, &cfg, &m, &snap, &decoded, &mut StageTimings::new());

        let kind = |op: &DrawOp| match op {
            DrawOp::Clear(_) => 0,
            DrawOp::Image { .. } => 1,
            DrawOp::Line { .. } => 2,
            DrawOp::Circle { .. } => 3,
            DrawOp::Text { .. } => 4,
        };
        let kinds: Vec<_> = surface.ops.iter().map(kind).collect();
        assert!(kinds.windows(2).all(|w| w[0] <= w[1]), "{:?}", kinds);
        assert_eq!(kinds[0], 0);
        assert_eq!(kinds[1], 1);

        assert_eq!(stats.edges, 4 + 6);
        assert_eq!(stats.neurons, 5);
        assert_eq!(surface.lines().count(), 10);
        assert_eq!(surface.circles().count(), 5);
    }

    #[test]
    fn active_edges_are_emphasized() {
        let cfg = cfg();
        let m = model(&cfg);
        let snap = snapshot();
        let decoded = decode(&snap, &m.masks, cfg.firing_threshold).unwrap();
        let mut surface = RecordingSurface::new(300.0, 200.0);
        let stats = render_frame(&mut surface, &cfg, &m, &snap, &decoded, &mut StageTimings::new());

        // Pixel 0 and hidden 0 fire; hidden 0 reaches every output.
        assert_eq!(stats.active_edges, 1 + 3);
        let widths: Vec<f64> = surface
            .ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Line { style, .. } => Some(style.width),
                _ => None,
            })
            .collect();
        assert_eq!(widths.iter().filter(|&&w| w > 0.5).count(), 4);
    }

    #[test]
    fn labels_sit_above_output_neurons() {
        let cfg = cfg();
        let m = model(&cfg);
        let snap = snapshot();
        let decoded = decode(&snap, &m.masks, cfg.firing_threshold).unwrap();
        let mut surface = RecordingSurface::new(300.0, 200.0);
        render_frame(&mut surface, &cfg, &m, &snap, &decoded, &mut StageTimings::new());

        let texts = surface.texts();
        assert!(texts.contains(&"30.00%"));
        assert!(texts.contains(&"50.00%"));
        assert!(texts.contains(&"LEFT"));

        let out0 = m.layouts[2].positions[0];
        let at = surface
            .ops
            .iter()
            .find_map(|op| match op {
                DrawOp::Text { text, at } if text == "30.00%" => Some(*at),
                _ => None,
            })
            .unwrap();
        assert_eq!(at, Point::new(out0.x, out0.y - cfg.label_offset));
    }

    #[test]
    fn weight_map_centres_on_mid_gray() {
        let w = WeightMatrix::new(2, 1, vec![1.0, -1.0]).unwrap();
        let img = weight_map_image(&w, 0, 2, 1);
        assert_eq!(img.pixel(0, 0), [254, 254, 254, 190]);
        assert_eq!(img.pixel(1, 0), [0, 0, 0, 0]);
        assert_eq!(argmax(&[0.1, f32::NAN, 0.7, 0.2]), Some(2));
    }

    #[test]
    fn overlay_adds_a_second_image() {
        let mut cfg = cfg();
        cfg.weight_overlay = true;
        let m = model(&cfg);
        let snap = snapshot();
        let decoded = decode(&snap, &m.masks, cfg.firing_threshold).unwrap();
        let mut surface = RecordingSurface::new(300.0, 200.0);
        render_frame(&mut surface, &cfg, &m, &snap, &decoded, &mut StageTimings::new());
        let images = surface
            .ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Image { .. }))
            .count();
        assert_eq!(images, 2);
    }
}
