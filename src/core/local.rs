//! Single-process core: one process, one tile covering the whole display.
//!
//! Useful for headless rendering, the viewer and tests. There is nothing to
//! exchange, so a frame is one local render followed by one buffer readback
//! (dense or compressed) from the registered render layer.

use super::{
    ColorFormat, Compositor, CoreEnv, DepthFormat, Diagnostics, DrawCallback, ErrorCode, Image,
    Phase, RenderLayerHandle, RenderRequest, Timing, Viewport,
};
use glam::DMat4;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalCompositorConfig {
    pub width: u32,
    pub height: u32,
    /// Largest tile; defaults to the display size
    pub tile_max: Option<(u32, u32)>,
    pub color_format: ColorFormat,
    pub depth_format: DepthFormat,
    /// Read the layer's buffer through the compressed (active-pixel) path
    pub compressed_readback: bool,
}

impl Default for LocalCompositorConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            tile_max: None,
            color_format: ColorFormat::RgbaUbyte,
            depth_format: DepthFormat::Float,
            compressed_readback: false,
        }
    }
}

pub struct LocalCompositor {
    config: LocalCompositorConfig,
    timing: Timing,
    diagnostics: Diagnostics,
    draw_callback: Option<DrawCallback>,
    layer: Option<RenderLayerHandle>,
    frames: u64,
}

impl LocalCompositor {
    pub fn new(config: LocalCompositorConfig) -> Self {
        debug!(
            "LocalCompositor: {}x{} color={:?} depth={:?} compressed={}",
            config.width, config.height, config.color_format, config.depth_format, config.compressed_readback
        );
        Self {
            config,
            timing: Timing::new(),
            diagnostics: Diagnostics::new(),
            draw_callback: None,
            layer: None,
            frames: 0,
        }
    }

    pub fn config(&self) -> &LocalCompositorConfig {
        &self.config
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
    }

    pub fn set_compressed_readback(&mut self, compressed: bool) {
        self.config.compressed_readback = compressed;
    }

    /// Timing of the last frame
    pub fn last_timing(&self) -> &Timing {
        &self.timing
    }

    pub fn diagnostics_ref(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames
    }

    fn report_timing(&mut self, result: Result<(), super::TimingError>) {
        if let Err(e) = result {
            self.diagnostics.raise_error(ErrorCode::SanityCheckFail, e.to_string());
        }
    }
}

impl Compositor for LocalCompositor {
    fn render_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn tile_max_size(&self) -> (u32, u32) {
        self.config.tile_max.unwrap_or((self.config.width, self.config.height))
    }

    fn color_format(&self) -> ColorFormat {
        self.config.color_format
    }

    fn depth_format(&self) -> DepthFormat {
        self.config.depth_format
    }

    fn diagnostics(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    fn timing(&mut self) -> &mut Timing {
        &mut self.timing
    }

    fn draw_callback(&self) -> Option<DrawCallback> {
        self.draw_callback.clone()
    }

    fn set_draw_callback(&mut self, callback: Option<DrawCallback>) {
        self.draw_callback = callback;
    }

    fn render_layer(&self) -> Option<RenderLayerHandle> {
        self.layer.clone()
    }

    fn set_render_layer(&mut self, layer: Option<RenderLayerHandle>) {
        self.layer = layer;
    }

    fn draw_frame(&mut self, projection: &DMat4, modelview: &DMat4, background: [f32; 4]) -> Option<Image> {
        let start = Instant::now();
        self.timing.reset();

        let Some(callback) = self.draw_callback.clone() else {
            self.diagnostics
                .raise_error(ErrorCode::InvalidOperation, "Drawing function not set.");
            return None;
        };

        let LocalCompositorConfig {
            width,
            height,
            color_format,
            depth_format,
            compressed_readback,
            ..
        } = self.config;
        let viewport = Viewport::full(width, height);
        let mut image = Image::new(width, height, color_format, depth_format);

        let request = RenderRequest {
            projection,
            modelview,
            background,
            viewport,
        };
        trace!("LocalCompositor: render {:?}", viewport);
        let begun = self.timing.begin(Phase::Render);
        self.report_timing(begun);
        callback(&request, &mut image);
        let ended = self.timing.end(Phase::Render);
        self.report_timing(ended);

        if let Some(layer) = self.layer.clone() {
            let mut layer = layer.borrow_mut();
            if layer.holds_buffer() {
                let mut env = CoreEnv {
                    timing: &mut self.timing,
                    diagnostics: &mut self.diagnostics,
                    color_format,
                    depth_format,
                    background,
                };
                if compressed_readback {
                    if let Some(sparse) =
                        layer.compressed_rendered_buffer_image(&mut env, viewport, viewport, width, height)
                    {
                        env.begin(Phase::BufferWrite);
                        sparse.decompress_into(&mut image, background);
                        env.end(Phase::BufferWrite);
                    }
                } else {
                    layer.rendered_buffer_image(&mut env, &mut image, viewport, viewport);
                }
            }
        }

        let t = &mut self.timing;
        t.total_draw = start.elapsed().as_secs_f64();
        t.composite = t.total_draw - t.render - t.buffer_read - t.buffer_write;
        self.frames += 1;
        Some(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_frame_without_callback_is_error() {
        let mut core = LocalCompositor::new(LocalCompositorConfig::default());
        let image = core.draw_frame(&DMat4::IDENTITY, &DMat4::IDENTITY, [0.0; 4]);
        assert!(image.is_none());
        assert_eq!(
            core.diagnostics_ref().last_error().map(|d| d.code),
            Some(ErrorCode::InvalidOperation)
        );
    }

    #[test]
    fn test_plain_callback_fills_result() {
        let mut core = LocalCompositor::new(LocalCompositorConfig {
            width: 4,
            height: 2,
            ..Default::default()
        });
        core.set_draw_callback(Some(Rc::new(|req: &RenderRequest<'_>, image: &mut Image| {
            assert_eq!(req.viewport, Viewport::new(0, 0, 4, 2));
            image.fill([0.0, 1.0, 0.0, 1.0], 0.3);
        })));

        let image = core
            .draw_frame(&DMat4::IDENTITY, &DMat4::IDENTITY, [0.0; 4])
            .expect("image");
        assert_eq!(image.color_at(7), Some([0.0, 1.0, 0.0, 1.0]));
        assert_eq!(image.depth_at(7), Some(0.3));
        assert_eq!(core.frames_drawn(), 1);
        assert!(core.last_timing().total_draw >= core.last_timing().render);
    }
}
