//! Neuron placement on the drawing surface.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    #[inline]
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }
}

/// Positions for one layer plus the marker size shared by its neurons.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NeuronLayout {
    pub positions: Vec<Point>,
    pub neuron_size: f64,
}

impl NeuronLayout {
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Marker size for `count` neurons sharing `band_height` with `min_padding` between them.
///
/// Shrinks toward zero instead of failing when the layer is too dense.
pub fn neuron_size(band_height: f64, count: usize, min_padding: f64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let n = count as f64;
    ((band_height - n * min_padding) / n).max(0.0)
}

/// Evenly spaced cell centres along `x_range` at height `y`.
pub fn layout_layer(
    count: usize,
    x_range: (f64, f64),
    y: f64,
    band_height: f64,
    min_padding: f64,
) -> NeuronLayout {
    let (x0, x1) = x_range;
    let step = if count == 0 {
        0.0
    } else {
        (x1 - x0) / count as f64
    };
    let positions = (0..count)
        .map(|i| Point::new(x0 + step * (i as f64 + 0.5), y))
        .collect();
    NeuronLayout {
        positions,
        neuron_size: neuron_size(band_height, count, min_padding),
    }
}

/// Pixel centres of a `width × height` frame drawn into `dest`, row-major.
///
/// This is the input layer: edges from the frame start at the pixel they read.
pub fn pixel_grid(width: usize, height: usize, dest: Rect) -> NeuronLayout {
    let step_x = if width == 0 { 0.0 } else { dest.w / width as f64 };
    let step_y = if height == 0 { 0.0 } else { dest.h / height as f64 };
    let mut positions = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            positions.push(Point::new(
                dest.x + step_x * (x as f64 + 0.5),
                dest.y + step_y * (y as f64 + 0.5),
            ));
        }
    }
    NeuronLayout {
        positions,
        neuron_size: step_x.min(step_y),
    }
}
