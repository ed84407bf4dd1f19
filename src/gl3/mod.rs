//! OpenGL 3 render layer.
//!
//! Lets the compositing core use GPU-rendered color and depth. The
//! application draws into layer-owned render targets; the core reads them
//! back (dense or active-pixel compressed) when it needs the pixels.
//!
//! **Why** a separate layer: the core only knows about CPU images. The layer
//! keeps the render targets sized to the frame, swaps its own callback into
//! the core for the duration of a frame, and answers the core's buffer
//! requests from the GPU.
//!
//! Usage:
//! ```rust,ignore
//! let mut layer = Gl3Layer::new(gpu.clone(), Gl3Config::default());
//! layer.initialize(&mut core)?;
//! layer.set_draw_callback(move |request, targets| {
//!     // bind targets.framebuffer is already done; draw request.viewport
//! });
//! let image = layer.draw_frame(&mut core, &projection, &modelview);
//! ```

pub mod compress;
mod draw;
pub mod error;
mod readback;
pub mod soft_device;
mod state;
mod targets;

pub use compress::{
    ActivePixelDevice, CompressRequest, CompressStats, CompressionBackend, CpuCompression, DeviceBuffer,
    DeviceError, GpuCompression, RegisteredTexture, TargetSlot,
};
pub use draw::correct_render_times;
pub use error::Gl3Error;
pub use readback::destination_range;
pub use soft_device::{DeviceEvent, EventLog, SoftActivePixel};
pub use targets::physical_render_size;

use crate::config::{CompressionKind, Gl3Config};
use crate::core::{Compositor, ErrorCode, Image, RenderLayer, RenderLayerHandle, RenderRequest, layer_addr};
use crate::gpu::{FramebufferId, Gpu, TextureId};
use draw::{InstalledCallback, render_adapter};
use glam::DMat4;
use log::{debug, info, trace, warn};
use state::LayerContext;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

/// Identifier reported to the core's diagnostics
pub const LAYER_ID: &str = "OGL3";

/// Render targets handed to the application's draw callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargets {
    /// Bound when the callback runs, with both targets attached
    pub framebuffer: FramebufferId,
    pub color_texture: TextureId,
    pub depth_texture: TextureId,
}

/// Application draw callback: render `request.viewport` with the given
/// matrices into the bound framebuffer
pub type Gl3DrawCallback = Box<dyn FnMut(&RenderRequest<'_>, RenderTargets)>;

pub struct Gl3Layer<G: Gpu + 'static> {
    ctx: Rc<RefCell<LayerContext<G>>>,
}

impl<G: Gpu + 'static> Gl3Layer<G> {
    /// Layer with CPU compression. A config asking for GPU compression needs
    /// a device; see [`Gl3Layer::with_device`].
    pub fn new(gpu: Arc<G>, config: Gl3Config) -> Self {
        if config.compression == CompressionKind::Gpu {
            warn!("GPU compression requested without an active-pixel device, using CPU compression");
        }
        Self::with_backend(gpu, config, Box::new(CpuCompression))
    }

    /// Layer compressing on `device` when the config asks for GPU compression
    pub fn with_device(gpu: Arc<G>, config: Gl3Config, device: Box<dyn ActivePixelDevice>) -> Self {
        let backend: Box<dyn CompressionBackend> = match config.compression {
            CompressionKind::Gpu => {
                info!("GPU compression through {}", device.name());
                Box::new(GpuCompression::new(device))
            }
            CompressionKind::Cpu => Box::new(CpuCompression),
        };
        Self::with_backend(gpu, config, backend)
    }

    pub fn with_backend(gpu: Arc<G>, config: Gl3Config, backend: Box<dyn CompressionBackend>) -> Self {
        Self {
            ctx: Rc::new(RefCell::new(LayerContext::new(gpu, config, backend))),
        }
    }

    fn handle(&self) -> RenderLayerHandle {
        self.ctx.clone()
    }

    fn is_registered(&self, core: &dyn Compositor) -> bool {
        core.render_layer()
            .is_some_and(|active| layer_addr(&active) == layer_addr(&self.handle()))
    }

    /// Register with `core` and allocate persistent GPU objects.
    ///
    /// A second call on an initialized layer warns and changes nothing. Fails
    /// if another render layer is active or the depth-copy shader does not
    /// build; in both cases the layer stays uninitialized.
    pub fn initialize(&mut self, core: &mut dyn Compositor) -> Result<(), Gl3Error> {
        if let Some(active) = core.render_layer() {
            if layer_addr(&active) == layer_addr(&self.handle()) {
                core.diagnostics()
                    .raise_warning(ErrorCode::InvalidOperation, "OpenGL 3 layer already initialized.");
                return Ok(());
            }
            let err = Gl3Error::LayerConflict {
                active: active.borrow().id(),
            };
            core.diagnostics().raise_error(err.code(), err.to_string());
            return Err(err);
        }

        let mut ctx = self.ctx.borrow_mut();
        ctx.release_all();
        if let Err(err) = ctx.allocate_persistent() {
            ctx.release_all();
            core.diagnostics().raise_error(err.code(), err.to_string());
            return Err(err);
        }
        ctx.initialized = true;
        debug!(
            "{}: initialized, framebuffer {:?}, compression {:?}",
            LAYER_ID,
            ctx.framebuffer,
            ctx.backend.kind()
        );
        drop(ctx);

        core.set_render_layer(Some(self.handle()));
        Ok(())
    }

    /// True while this layer is the core's active render layer
    pub fn is_initialized(&self, core: &dyn Compositor) -> bool {
        self.ctx.borrow().initialized && self.is_registered(core)
    }

    pub fn set_draw_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&RenderRequest<'_>, RenderTargets) + 'static,
    {
        self.ctx.borrow_mut().draw_callback = Some(Box::new(callback));
    }

    pub fn clear_draw_callback(&mut self) {
        self.ctx.borrow_mut().draw_callback = None;
    }

    /// Render and composite one frame.
    ///
    /// Returns `None` after raising an error through the core's diagnostics
    /// if the layer is not initialized, no draw callback is set or the
    /// render targets cannot be allocated.
    pub fn draw_frame(&mut self, core: &mut dyn Compositor, projection: &DMat4, modelview: &DMat4) -> Option<Image> {
        match self.draw_frame_impl(core, projection, modelview) {
            Ok(image) => image,
            Err(e) => {
                core.diagnostics().raise_error(e.code(), e.to_string());
                None
            }
        }
    }

    fn draw_frame_impl(
        &mut self,
        core: &mut dyn Compositor,
        projection: &DMat4,
        modelview: &DMat4,
    ) -> Result<Option<Image>, Gl3Error> {
        let start = Instant::now();
        if !self.is_initialized(core) {
            return Err(Gl3Error::NotInitialized);
        }

        let gpu = {
            let mut ctx = self.ctx.borrow_mut();
            if ctx.draw_callback.is_none() {
                return Err(Gl3Error::DrawCallbackNotSet);
            }
            ctx.physical = physical_render_size(core.render_size(), ctx.gpu.max_texture_size());
            ctx.tile_max = core.tile_max_size();
            ctx.gpu.clone()
        };
        let background = gpu.clear_color();

        let prepared = {
            let mut ctx = self.ctx.borrow_mut();
            ctx.ensure_framebuffer().and_then(|framebuffer| {
                if ctx.backend.needs_depth_copy() {
                    ctx.ensure_compression_framebuffer()?;
                }
                Ok(framebuffer)
            })
        };
        let framebuffer = match prepared {
            Ok(framebuffer) => framebuffer,
            Err(e) => {
                gpu.bind_framebuffer(None);
                return Err(e);
            }
        };
        gpu.bind_framebuffer(Some(framebuffer));
        gpu.draw_to_color0();

        trace!("{}: compositing frame", LAYER_ID);
        let image = {
            let mut installed = InstalledCallback::install(core, render_adapter(self.ctx.clone()));
            installed.core().draw_frame(projection, modelview, background)
        };

        gpu.set_clear_color(background);
        gpu.bind_framebuffer(None);
        correct_render_times(core.timing(), start.elapsed().as_secs_f64());
        Ok(image)
    }

    /// Unregister from `core` and release every GPU object
    pub fn destroy(&mut self, core: &mut dyn Compositor) {
        if self.is_registered(core) {
            core.destroy_render_layer();
        } else {
            let mut ctx = self.ctx.borrow_mut();
            ctx.release_all();
            ctx.initialized = false;
        }
    }

    /// Delete the render targets; the next frame reallocates them
    pub fn release_targets(&mut self) {
        self.ctx.borrow_mut().release_targets();
    }

    pub fn config(&self) -> Gl3Config {
        self.ctx.borrow().config
    }

    pub fn compression(&self) -> CompressionKind {
        self.ctx.borrow().backend.kind()
    }

    pub fn color_texture(&self) -> Option<TextureId> {
        self.ctx.borrow().color
    }

    pub fn depth_texture(&self) -> Option<TextureId> {
        self.ctx.borrow().depth
    }

    /// `R32F` copy of the depth target (GPU compression only)
    pub fn depth_copy_texture(&self) -> Option<TextureId> {
        self.ctx.borrow().depth_copy
    }

    pub fn framebuffer(&self) -> Option<FramebufferId> {
        self.ctx.borrow().framebuffer
    }

    pub fn compression_framebuffer(&self) -> Option<FramebufferId> {
        self.ctx.borrow().compression_framebuffer
    }

    pub fn render_targets(&self) -> Option<RenderTargets> {
        self.ctx.borrow().render_targets()
    }

    /// Render target size of the last frame
    pub fn physical_size(&self) -> (u32, u32) {
        self.ctx.borrow().physical
    }

    /// Tile size in pixels the compressed readback buffer currently holds
    pub fn compressed_capacity_pixels(&self) -> usize {
        self.ctx.borrow().sparse_capacity_pixels()
    }
}

impl<G: Gpu + 'static> std::fmt::Debug for Gl3Layer<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ctx = self.ctx.borrow();
        f.debug_struct("Gl3Layer")
            .field("initialized", &ctx.initialized)
            .field("physical", &ctx.physical)
            .field("framebuffer", &ctx.framebuffer)
            .field("color", &ctx.color)
            .field("depth", &ctx.depth)
            .field("compression", &ctx.backend.kind())
            .finish()
    }
}
