//! Software RGBA raster implementing [`Surface`], used by the headless daemon.
//!
//! Lines are one-pixel Bresenham (wider strokes are drawn as parallel
//! offsets), circles are filled by scanning their bounding box, and images
//! are blitted nearest-neighbour. Text is not rasterized.

use std::io::{self, Write};

use crate::error::{Result, VizError};
use crate::layout::{Point, Rect};
use crate::surface::{FillStyle, Rgba, RgbaImage, StrokeStyle, Surface, TextStyle};

/// Largest accepted side of a raster, in pixels.
pub const MAX_SIDE: usize = 16_384;

#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    image: RgbaImage,
    /// Fill colour used by `clear`.
    background: [u8; 4],
}

impl Raster {
    /// Check that a `width` x `height` raster can be allocated.
    pub fn check_size(width: usize, height: usize) -> Result<()> {
        let area = width.checked_mul(height).and_then(|a| a.checked_mul(4));
        if width == 0 || height == 0 || width > MAX_SIDE || height > MAX_SIDE || area.is_none() {
            return Err(VizError::RenderSurfaceUnavailable(format!(
                "canvas {}x{} outside 1..={} per side",
                width, height, MAX_SIDE
            )));
        }
        Ok(())
    }

    /// Sized raster cleared to opaque black, or an error for unusable sizes.
    pub fn try_new(width: usize, height: usize) -> Result<Self> {
        Self::check_size(width, height)?;
        Ok(Self::new(width, height))
    }

    pub fn new(width: usize, height: usize) -> Self {
        Self::with_background(width, height, [0, 0, 0, 255])
    }

    pub fn with_background(width: usize, height: usize, background: [u8; 4]) -> Self {
        let mut image = RgbaImage::new(width, height);
        for px in image.data.chunks_exact_mut(4) {
            px.copy_from_slice(&background);
        }
        Self { image, background }
    }

    pub fn width(&self) -> usize {
        self.image.width
    }

    pub fn height(&self) -> usize {
        self.image.height
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        self.image.pixel(x, y)
    }

    /// Binary PPM (P6); alpha is dropped.
    pub fn write_ppm<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write!(w, "P6\n{} {}\n255\n", self.image.width, self.image.height)?;
        let rgb: Vec<u8> = self
            .image
            .data
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        w.write_all(&rgb)
    }

    #[inline]
    fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.image.width && (y as usize) < self.image.height
    }

    fn blend(&mut self, x: i64, y: i64, c: Rgba) {
        if !self.in_bounds(x, y) || c.a <= 0.0 {
            return;
        }
        let (x, y) = (x as usize, y as usize);
        let old = self.image.pixel(x, y);
        let a = c.a.clamp(0.0, 1.0);
        let mix = |o: u8, n: u8| (o as f32 * (1.0 - a) + n as f32 * a).round() as u8;
        let out_a = (old[3] as f32 + (255.0 - old[3] as f32) * a).round() as u8;
        self.image
            .put(x, y, [mix(old[0], c.r), mix(old[1], c.g), mix(old[2], c.b), out_a]);
    }

    fn blend_px(&mut self, x: i64, y: i64, px: [u8; 4]) {
        let c = Rgba::new(px[0], px[1], px[2], px[3] as f32 / 255.0);
        self.blend(x, y, c);
    }

    fn bresenham(&mut self, x1: i64, y1: i64, x2: i64, y2: i64, c: Rgba) {
        let dx = (x2 - x1).abs();
        let dy = (y2 - y1).abs();
        let sx = if x1 < x2 { 1 } else { -1 };
        let sy = if y1 < y2 { 1 } else { -1 };
        let mut err = dx - dy;
        let (mut x, mut y) = (x1, y1);
        loop {
            self.blend(x, y, c);
            if x == x2 && y == y2 {
                break;
            }
            let e2 = 2 * err;
            if e2 > -dy {
                err -= dy;
                x += sx;
            }
            if e2 < dx {
                err += dx;
                y += sy;
            }
        }
    }
}

#[inline]
fn px(v: f64) -> i64 {
    v.round() as i64
}

impl Surface for Raster {
    fn size(&self) -> (f64, f64) {
        (self.image.width as f64, self.image.height as f64)
    }

    fn clear(&mut self, rect: Rect) {
        let x0 = px(rect.x).max(0);
        let y0 = px(rect.y).max(0);
        let x1 = px(rect.x + rect.w).min(self.image.width as i64);
        let y1 = px(rect.y + rect.h).min(self.image.height as i64);
        for y in y0..y1 {
            for x in x0..x1 {
                self.image.put(x as usize, y as usize, self.background);
            }
        }
    }

    fn draw_image(&mut self, image: &RgbaImage, dest: Rect) {
        if image.width == 0 || image.height == 0 || dest.w <= 0.0 || dest.h <= 0.0 {
            return;
        }
        let (x0, y0) = (px(dest.x), px(dest.y));
        let (w, h) = (px(dest.w), px(dest.h));
        for dy in 0..h {
            let sy = ((dy as f64 + 0.5) * image.height as f64 / dest.h) as usize;
            for dx in 0..w {
                let sx = ((dx as f64 + 0.5) * image.width as f64 / dest.w) as usize;
                let src = image.pixel(sx.min(image.width - 1), sy.min(image.height - 1));
                self.blend_px(x0 + dx, y0 + dy, src);
            }
        }
    }

    fn draw_line(&mut self, from: Point, to: Point, style: &StrokeStyle) {
        let (x1, y1, x2, y2) = (px(from.x), px(from.y), px(to.x), px(to.y));
        let strokes = style.width.round().max(1.0) as i64;
        // Offset extra strokes across the dominant axis.
        let steep = (y2 - y1).abs() > (x2 - x1).abs();
        for k in 0..strokes {
            let off = k - strokes / 2;
            if steep {
                self.bresenham(x1 + off, y1, x2 + off, y2, style.color);
            } else {
                self.bresenham(x1, y1 + off, x2, y2 + off, style.color);
            }
        }
    }

    fn fill_circle(&mut self, center: Point, radius: f64, style: &FillStyle) {
        if radius <= 0.0 {
            return;
        }
        let r2 = radius * radius;
        let (x0, x1) = ((center.x - radius).floor() as i64, (center.x + radius).ceil() as i64);
        let (y0, y1) = ((center.y - radius).floor() as i64, (center.y + radius).ceil() as i64);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let (dx, dy) = (x as f64 + 0.5 - center.x, y as f64 + 0.5 - center.y);
                if dx * dx + dy * dy <= r2 {
                    self.blend(x, y, style.color);
                }
            }
        }
    }

    fn draw_text(&mut self, _text: &str, _at: Point, _style: &TextStyle) {}
}
