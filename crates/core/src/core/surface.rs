//! The drawing capability the renderer needs, independent of any backend.
//!
//! The browser client implements it on a `CanvasRenderingContext2d`, the
//! daemon on a software [`Raster`](crate::raster::Raster).

use crate::layout::{Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Opacity in `[0, 1]`.
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    /// CSS `rgba(...)` form.
    pub fn to_css(self) -> String {
        format!("rgba({}, {}, {}, {:.3})", self.r, self.g, self.b, self.a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: Rgba,
    pub width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillStyle {
    pub color: Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

impl TextAlign {
    pub fn as_css(self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font: String,
    pub color: Rgba,
    pub align: TextAlign,
}

/// Owned RGBA8 pixel buffer, row-major.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RgbaImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl RgbaImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * 4],
        }
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        let i = (y * self.width + x) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    #[inline]
    pub fn put(&mut self, x: usize, y: usize, px: [u8; 4]) {
        let i = (y * self.width + x) * 4;
        self.data[i..i + 4].copy_from_slice(&px);
    }
}

pub trait Surface {
    /// Drawable size in pixels.
    fn size(&self) -> (f64, f64);

    /// Reset `rect` to fully transparent.
    fn clear(&mut self, rect: Rect);

    /// Draw `image` stretched to `dest`.
    fn draw_image(&mut self, image: &RgbaImage, dest: Rect);

    fn draw_line(&mut self, from: Point, to: Point, style: &StrokeStyle);

    fn fill_circle(&mut self, center: Point, radius: f64, style: &FillStyle);

    fn draw_text(&mut self, text: &str, at: Point, style: &TextStyle);
}

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear(Rect),
    Image { width: usize, height: usize, dest: Rect },
    Line { from: Point, to: Point, style: StrokeStyle },
    Circle { center: Point, radius: f64, style: FillStyle },
    Text { text: String, at: Point },
}

/// Surface that records every call instead of drawing.
///
/// Used for tests and for measuring the draw load of a frame.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    pub width: f64,
    pub height: f64,
    pub ops: Vec<DrawOp>,
}

impl RecordingSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &DrawOp> {
        self.ops.iter().filter(|op| matches!(op, DrawOp::Line { .. }))
    }

    pub fn circles(&self) -> impl Iterator<Item = &DrawOp> {
        self.ops.iter().filter(|op| matches!(op, DrawOp::Circle { .. }))
    }

    pub fn texts(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn take(&mut self) -> Vec<DrawOp> {
        std::mem::take(&mut self.ops)
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn clear(&mut self, rect: Rect) {
        self.ops.push(DrawOp::Clear(rect));
    }

    fn draw_image(&mut self, image: &RgbaImage, dest: Rect) {
        self.ops.push(DrawOp::Image {
            width: image.width,
            height: image.height,
            dest,
        });
    }

    fn draw_line(&mut self, from: Point, to: Point, style: &StrokeStyle) {
        self.ops.push(DrawOp::Line {
            from,
            to,
            style: *style,
        });
    }

    fn fill_circle(&mut self, center: Point, radius: f64, style: &FillStyle) {
        self.ops.push(DrawOp::Circle {
            center,
            radius,
            style: *style,
        });
    }

    fn draw_text(&mut self, text: &str, at: Point, _style: &TextStyle) {
        self.ops.push(DrawOp::Text {
            text: text.to_string(),
            at,
        });
    }
}
