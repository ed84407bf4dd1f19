//! Interface to the compositing core.
//!
//! The core owns scheduling, image exchange and blending. Render layers plug
//! into it at two points:
//!
//! - the draw callback slot, invoked once per local render
//! - the registered [`RenderLayer`], whose buffer hooks the core calls once a
//!   region has been rendered
//!
//! [`LocalCompositor`] is a single-process core owning the whole display as
//! one tile; it performs no exchange between processes.

pub mod diagnostics;
pub mod image;
pub mod local;
pub mod sparse;
pub mod timing;

pub use diagnostics::{Diagnostic, Diagnostics, ErrorCode, Severity};
pub use image::{ColorFormat, DepthFormat, Image, Viewport};
pub use local::{LocalCompositor, LocalCompositorConfig};
pub use sparse::SparseImage;
pub use timing::{Phase, Timing, TimingError};

use glam::DMat4;
use std::cell::RefCell;
use std::rc::Rc;

/// Arguments of one local render
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub projection: &'a DMat4,
    pub modelview: &'a DMat4,
    /// Clear color the core needs for correct compositing
    pub background: [f32; 4],
    /// Region that needs drawing
    pub viewport: Viewport,
}

/// Core draw callback. The image is where a non-GPU layer writes its pixels;
/// layers holding their own buffer leave it alone.
pub type DrawCallback = Rc<dyn Fn(&RenderRequest<'_>, &mut Image)>;

pub type RenderLayerHandle = Rc<RefCell<dyn RenderLayer>>;

/// Core services available to render layer hooks
pub struct CoreEnv<'a> {
    pub timing: &'a mut Timing,
    pub diagnostics: &'a mut Diagnostics,
    pub color_format: ColorFormat,
    pub depth_format: DepthFormat,
    /// Background of the frame being composited
    pub background: [f32; 4],
}

impl CoreEnv<'_> {
    pub fn begin(&mut self, phase: Phase) {
        if let Err(e) = self.timing.begin(phase) {
            self.diagnostics.raise_error(ErrorCode::SanityCheckFail, e.to_string());
        }
    }

    pub fn end(&mut self, phase: Phase) {
        if let Err(e) = self.timing.end(phase) {
            self.diagnostics.raise_error(ErrorCode::SanityCheckFail, e.to_string());
        }
    }
}

/// Hooks a render layer registers with the core
pub trait RenderLayer {
    /// Identifier used in diagnostics
    fn id(&self) -> &'static str;

    /// Whether rendered pixels stay in the layer until the core asks for them
    fn holds_buffer(&self) -> bool {
        true
    }

    /// Copy `rendered` (a region of the render target) into `target_viewport`
    /// of `target`, clearing the rest of `target` to background
    fn rendered_buffer_image(
        &mut self,
        env: &mut CoreEnv<'_>,
        target: &mut Image,
        rendered: Viewport,
        target_viewport: Viewport,
    );

    /// Active-pixel encoding of `rendered` placed at `target_viewport` in a
    /// `tile_width` x `tile_height` tile. The image stays valid until the next
    /// call on this layer.
    fn compressed_rendered_buffer_image(
        &mut self,
        env: &mut CoreEnv<'_>,
        rendered: Viewport,
        target_viewport: Viewport,
        tile_width: u32,
        tile_height: u32,
    ) -> Option<&SparseImage>;

    /// Release everything the layer allocated
    fn destroy(&mut self);
}

/// What a render layer needs from the compositing core
pub trait Compositor {
    /// Requested size of one local render, before GPU limits
    fn render_size(&self) -> (u32, u32);

    /// Largest tile any compressed readback will ask for
    fn tile_max_size(&self) -> (u32, u32);

    fn color_format(&self) -> ColorFormat;

    fn depth_format(&self) -> DepthFormat;

    fn diagnostics(&mut self) -> &mut Diagnostics;

    fn timing(&mut self) -> &mut Timing;

    fn draw_callback(&self) -> Option<DrawCallback>;

    fn set_draw_callback(&mut self, callback: Option<DrawCallback>);

    fn render_layer(&self) -> Option<RenderLayerHandle>;

    fn set_render_layer(&mut self, layer: Option<RenderLayerHandle>);

    /// Render and composite one frame, invoking the draw callback for each
    /// local render. Returns the composited image this process holds.
    fn draw_frame(&mut self, projection: &DMat4, modelview: &DMat4, background: [f32; 4]) -> Option<Image>;

    /// Unregister the active render layer and run its destructor
    fn destroy_render_layer(&mut self) {
        if let Some(layer) = self.render_layer() {
            self.set_render_layer(None);
            let mut layer = layer.borrow_mut();
            self.diagnostics()
                .raise_debug(format!("Destroying render layer {}", layer.id()));
            layer.destroy();
        }
    }
}

/// Address of the object behind a layer handle, for identity checks
pub fn layer_addr(layer: &RenderLayerHandle) -> *const () {
    Rc::as_ptr(layer) as *const ()
}
