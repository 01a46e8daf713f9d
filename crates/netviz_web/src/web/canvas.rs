use std::f64::consts::TAU;

use netviz::error::VizError;
use netviz::layout::{Point, Rect};
use netviz::surface::{FillStyle, RgbaImage, StrokeStyle, Surface, TextStyle};
use wasm_bindgen::prelude::*;
use wasm_bindgen::{Clamped, JsCast};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, ImageData};

/// [`Surface`] over a page's `<canvas>` element.
pub(super) struct CanvasSurface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
}

impl CanvasSurface {
    pub(super) fn attach(id: &str) -> Result<Self, VizError> {
        let unavailable = |why: &str| VizError::RenderSurfaceUnavailable(format!("#{}: {}", id, why));
        let canvas = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| unavailable("no document"))?
            .get_element_by_id(id)
            .ok_or_else(|| unavailable("no such element"))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| unavailable("element is not a canvas"))?;
        let ctx = canvas
            .get_context("2d")
            .map_err(|_| unavailable("get_context threw"))?
            .ok_or_else(|| unavailable("missing 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| unavailable("context is not 2d"))?;
        Ok(Self { canvas, ctx })
    }

    pub(super) fn set_size(&self, width: f64, height: f64) {
        self.canvas.set_width(width.max(1.0) as u32);
        self.canvas.set_height(height.max(1.0) as u32);
    }
}

impl Surface for CanvasSurface {
    fn size(&self) -> (f64, f64) {
        (self.canvas.width() as f64, self.canvas.height() as f64)
    }

    fn clear(&mut self, rect: Rect) {
        self.ctx.clear_rect(rect.x, rect.y, rect.w, rect.h);
    }

    // `put_image_data` does not scale or composite: images arrive already at
    // their display size and never overlap.
    fn draw_image(&mut self, image: &RgbaImage, dest: Rect) {
        let data = ImageData::new_with_u8_clamped_array_and_sh(
            Clamped(image.data.as_slice()),
            image.width as u32,
            image.height as u32,
        );
        if let Ok(data) = data {
            let _ = self.ctx.put_image_data(&data, dest.x.round(), dest.y.round());
        }
    }

    #[allow(deprecated)]
    fn draw_line(&mut self, from: Point, to: Point, style: &StrokeStyle) {
        self.ctx
            .set_stroke_style(&JsValue::from_str(&style.color.to_css()));
        self.ctx.set_line_width(style.width);
        self.ctx.begin_path();
        self.ctx.move_to(from.x, from.y);
        self.ctx.line_to(to.x, to.y);
        self.ctx.stroke();
    }

    #[allow(deprecated)]
    fn fill_circle(&mut self, center: Point, radius: f64, style: &FillStyle) {
        self.ctx.set_fill_style(&JsValue::from_str(&style.color.to_css()));
        self.ctx.begin_path();
        if self.ctx.arc(center.x, center.y, radius, 0.0, TAU).is_ok() {
            self.ctx.fill();
        }
    }

    #[allow(deprecated)]
    fn draw_text(&mut self, text: &str, at: Point, style: &TextStyle) {
        self.ctx.set_font(&style.font);
        self.ctx.set_text_align(style.align.as_css());
        self.ctx.set_fill_style(&JsValue::from_str(&style.color.to_css()));
        let _ = self.ctx.fill_text(text, at.x, at.y);
    }
}
