//! Render target cache.
//!
//! Targets always match the physical render size. A size mismatch (or a
//! texture deleted elsewhere) replaces the texture instead of resizing it in
//! place, and only a replacement marks the target dirty so attachments are
//! rebound.

use super::compress::TargetSlot;
use super::error::Gl3Error;
use super::state::LayerContext;
use crate::gpu::{Attachment, FramebufferId, Gpu, TextureFormat, TextureId, shaders};
use log::{debug, trace};

/// Requested render size limited to what a texture can hold
pub fn physical_render_size(requested: (u32, u32), max_texture_size: u32) -> (u32, u32) {
    (requested.0.min(max_texture_size), requested.1.min(max_texture_size))
}

impl<G: Gpu> LayerContext<G> {
    /// Current texture for `slot`, reallocated if its size is stale.
    /// Returns the texture and whether it was allocated by this call.
    ///
    /// A new texture enters the slot only once the backend has registered it,
    /// and stays unattached until a framebuffer picks it up.
    fn ensure_target(&mut self, slot: TargetSlot, format: TextureFormat) -> Result<(TextureId, bool), Gl3Error> {
        let (width, height) = self.physical;
        if let Some(texture) = *self.slot_mut(slot) {
            if self.gpu.texture_size(texture) == Some((width, height)) {
                return Ok((texture, false));
            }
            debug!("{:?} target {} is stale, replacing with {}x{}", slot, texture, width, height);
            self.backend.release_target(slot);
            self.gpu.delete_texture(texture);
            *self.slot_mut(slot) = None;
        }

        let texture = self.gpu.create_texture(format, width, height)?;
        if let Err(e) = self.backend.register_target(slot, texture, self.tile_max) {
            self.backend.release_target(slot);
            self.gpu.delete_texture(texture);
            return Err(e);
        }
        *self.slot_mut(slot) = Some(texture);
        self.mark_unattached(slot);
        debug!("{:?} target {} allocated ({:?} {}x{})", slot, texture, format, width, height);
        Ok((texture, true))
    }

    pub(super) fn ensure_color_target(&mut self) -> Result<(TextureId, bool), Gl3Error> {
        self.ensure_target(TargetSlot::Color, self.config.color_target.texture_format())
    }

    pub(super) fn ensure_depth_target(&mut self) -> Result<(TextureId, bool), Gl3Error> {
        self.ensure_target(TargetSlot::Depth, self.config.depth_target.texture_format())
    }

    /// Float color copy of the depth target, readable by the compression device
    pub(super) fn ensure_depth_copy_target(&mut self) -> Result<(TextureId, bool), Gl3Error> {
        self.ensure_target(TargetSlot::DepthCopy, TextureFormat::R32F)
    }

    fn depth_attachment(&self) -> Attachment {
        match self.config.depth_target.texture_format() {
            TextureFormat::Depth24Stencil8 => Attachment::DepthStencil,
            _ => Attachment::Depth,
        }
    }

    /// Attach `texture` to the bound framebuffer if its slot is pending
    fn attach_pending(&mut self, slot: TargetSlot, attachment: Attachment, texture: TextureId) {
        if self.needs_attach(slot) {
            self.gpu.attach_texture(attachment, texture);
            self.mark_attached(slot);
        }
    }

    /// Leaves the framebuffer bound if its attachments changed
    pub(super) fn ensure_framebuffer(&mut self) -> Result<FramebufferId, Gl3Error> {
        let framebuffer = match self.framebuffer {
            Some(fb) => fb,
            None => {
                let fb = self.gpu.create_framebuffer()?;
                self.framebuffer = Some(fb);
                self.mark_unattached(TargetSlot::Color);
                self.mark_unattached(TargetSlot::Depth);
                fb
            }
        };
        let (color, _) = self.ensure_color_target()?;
        let (depth, _) = self.ensure_depth_target()?;
        if self.needs_attach(TargetSlot::Color) || self.needs_attach(TargetSlot::Depth) {
            self.gpu.bind_framebuffer(Some(framebuffer));
            self.attach_pending(TargetSlot::Color, Attachment::Color0, color);
            let depth_attachment = self.depth_attachment();
            self.attach_pending(TargetSlot::Depth, depth_attachment, depth);
            trace!("framebuffer {} attachments updated", framebuffer);
        }
        Ok(framebuffer)
    }

    pub(super) fn ensure_compression_framebuffer(&mut self) -> Result<FramebufferId, Gl3Error> {
        let framebuffer = match self.compression_framebuffer {
            Some(fb) => fb,
            None => {
                let fb = self.gpu.create_framebuffer()?;
                self.compression_framebuffer = Some(fb);
                self.mark_unattached(TargetSlot::DepthCopy);
                fb
            }
        };
        let (depth_copy, _) = self.ensure_depth_copy_target()?;
        if self.needs_attach(TargetSlot::DepthCopy) {
            self.gpu.bind_framebuffer(Some(framebuffer));
            self.attach_pending(TargetSlot::DepthCopy, Attachment::Color0, depth_copy);
            self.gpu.draw_to_color0();
        }
        Ok(framebuffer)
    }

    /// Persistent objects created once per initialisation: the primary
    /// framebuffer, plus the depth-copy pass when the backend needs it
    pub(super) fn allocate_persistent(&mut self) -> Result<(), Gl3Error> {
        self.framebuffer = Some(self.gpu.create_framebuffer()?);
        if self.backend.needs_depth_copy() {
            self.compression_framebuffer = Some(self.gpu.create_framebuffer()?);
            self.program = Some(
                self.gpu
                    .create_program(shaders::DEPTH_COPY_VERTEX, shaders::DEPTH_COPY_FRAGMENT)?,
            );
            self.quad = Some(self.gpu.create_quad(&shaders::UNIT_QUAD)?);
        }
        Ok(())
    }
}
