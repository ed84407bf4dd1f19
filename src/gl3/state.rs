//! Per-layer state shared by the layer handle, the installed render callback
//! and the core's render layer registry.

use super::compress::{CompressionBackend, TargetSlot};
use super::{Gl3DrawCallback, LAYER_ID, RenderTargets};
use crate::config::Gl3Config;
use crate::core::{CoreEnv, Image, RenderLayer, SparseImage, Viewport};
use crate::gpu::{FramebufferId, Gpu, ProgramId, QuadId, TextureId};
use log::debug;
use std::sync::Arc;

pub(super) struct LayerContext<G: Gpu> {
    pub(super) gpu: Arc<G>,
    pub(super) config: Gl3Config,
    pub(super) backend: Box<dyn CompressionBackend>,
    pub(super) initialized: bool,
    pub(super) draw_callback: Option<Gl3DrawCallback>,
    /// Render target size for the current frame
    pub(super) physical: (u32, u32),
    pub(super) tile_max: (u32, u32),
    pub(super) framebuffer: Option<FramebufferId>,
    pub(super) color: Option<TextureId>,
    pub(super) depth: Option<TextureId>,
    pub(super) compression_framebuffer: Option<FramebufferId>,
    pub(super) depth_copy: Option<TextureId>,
    /// Slots holding a texture not yet attached to its framebuffer
    pub(super) unattached: Vec<TargetSlot>,
    pub(super) program: Option<ProgramId>,
    pub(super) quad: Option<QuadId>,
    /// Compressed readback output, grown on demand
    pub(super) sparse: Option<SparseImage>,
    /// Largest tile (in pixels) `sparse` was allocated for
    pub(super) sparse_pixels: usize,
    /// Dense staging image of the CPU compression path
    pub(super) scratch: Option<Image>,
}

impl<G: Gpu> LayerContext<G> {
    pub(super) fn new(gpu: Arc<G>, config: Gl3Config, backend: Box<dyn CompressionBackend>) -> Self {
        Self {
            gpu,
            config,
            backend,
            initialized: false,
            draw_callback: None,
            physical: (0, 0),
            tile_max: (0, 0),
            framebuffer: None,
            color: None,
            depth: None,
            compression_framebuffer: None,
            depth_copy: None,
            unattached: Vec::new(),
            program: None,
            quad: None,
            sparse: None,
            sparse_pixels: 0,
            scratch: None,
        }
    }

    pub(super) fn slot_mut(&mut self, slot: TargetSlot) -> &mut Option<TextureId> {
        match slot {
            TargetSlot::Color => &mut self.color,
            TargetSlot::Depth => &mut self.depth,
            TargetSlot::DepthCopy => &mut self.depth_copy,
        }
    }

    pub(super) fn needs_attach(&self, slot: TargetSlot) -> bool {
        self.unattached.contains(&slot)
    }

    pub(super) fn mark_unattached(&mut self, slot: TargetSlot) {
        if !self.needs_attach(slot) {
            self.unattached.push(slot);
        }
    }

    pub(super) fn mark_attached(&mut self, slot: TargetSlot) {
        self.unattached.retain(|s| *s != slot);
    }

    pub(super) fn render_targets(&self) -> Option<RenderTargets> {
        Some(RenderTargets {
            framebuffer: self.framebuffer?,
            color_texture: self.color?,
            depth_texture: self.depth?,
        })
    }

    /// Delete the render target textures; the next frame reallocates them
    pub(super) fn release_targets(&mut self) {
        for slot in [TargetSlot::Color, TargetSlot::Depth, TargetSlot::DepthCopy] {
            if let Some(texture) = self.slot_mut(slot).take() {
                self.backend.release_target(slot);
                self.gpu.delete_texture(texture);
            }
        }
    }

    /// Release every GPU object and host buffer. Safe to call repeatedly.
    pub(super) fn release_all(&mut self) {
        self.release_targets();
        if let Some(fb) = self.framebuffer.take() {
            self.gpu.delete_framebuffer(fb);
        }
        if let Some(fb) = self.compression_framebuffer.take() {
            self.gpu.delete_framebuffer(fb);
        }
        if let Some(program) = self.program.take() {
            self.gpu.delete_program(program);
        }
        if let Some(quad) = self.quad.take() {
            self.gpu.delete_quad(quad);
        }
        if let Some(sparse) = self.sparse.take() {
            self.backend.free_host(sparse.into_buffer());
        }
        self.unattached.clear();
        self.sparse_pixels = 0;
        self.scratch = None;
        self.backend.release();
    }
}

impl<G: Gpu> RenderLayer for LayerContext<G> {
    fn id(&self) -> &'static str {
        LAYER_ID
    }

    fn rendered_buffer_image(
        &mut self,
        env: &mut CoreEnv<'_>,
        target: &mut Image,
        rendered: Viewport,
        target_viewport: Viewport,
    ) {
        if let Err(e) = self.read_rendered_buffer(env, target, rendered, target_viewport) {
            env.diagnostics.raise_error(e.code(), e.to_string());
        }
    }

    fn compressed_rendered_buffer_image(
        &mut self,
        env: &mut CoreEnv<'_>,
        rendered: Viewport,
        target_viewport: Viewport,
        tile_width: u32,
        tile_height: u32,
    ) -> Option<&SparseImage> {
        match self.read_compressed_buffer(env, rendered, target_viewport, tile_width, tile_height) {
            Ok(()) => self.sparse.as_ref(),
            Err(e) => {
                env.diagnostics.raise_error(e.code(), e.to_string());
                None
            }
        }
    }

    fn destroy(&mut self) {
        debug!("{}: destroy", LAYER_ID);
        self.release_all();
        self.initialized = false;
    }
}

impl<G: Gpu> Drop for LayerContext<G> {
    fn drop(&mut self) {
        self.release_all();
    }
}
