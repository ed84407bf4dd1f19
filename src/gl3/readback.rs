//! Buffer extraction hooks called by the core once a region is rendered.
//!
//! The rendered viewport is what was drawn into the render targets; the
//! target viewport is where those pixels land in the core's image. Dense
//! readback writes the rendered rectangle at `target.x + width * target.y`
//! with the pack row length set to the image width, so rows keep the image
//! stride.

use super::error::Gl3Error;
use super::state::LayerContext;
use crate::core::sparse::compress_image_region;
use crate::core::{ColorFormat, CoreEnv, DepthFormat, Image, Phase, SparseImage, Viewport};
use crate::gpu::{Gpu, ReadFormat, packed_len};
use log::{debug, trace};
use std::ops::Range;

/// Byte range of `image_width`-strided storage that receives `rendered`
/// when it is placed at `target`
pub fn destination_range(
    rendered: Viewport,
    target: Viewport,
    image_width: usize,
    format: ReadFormat,
) -> Range<usize> {
    let start = target.pixel_offset(image_width) * format.bytes_per_pixel();
    start..start + packed_len(rendered, image_width as u32, format)
}

fn color_read_format(format: ColorFormat) -> Result<Option<ReadFormat>, Gl3Error> {
    match format {
        ColorFormat::RgbaUbyte => Ok(Some(ReadFormat::RgbaU8)),
        ColorFormat::RgbaFloat => Ok(Some(ReadFormat::RgbaF32)),
        ColorFormat::RgbFloat => Ok(Some(ReadFormat::RgbF32)),
        ColorFormat::None => Ok(None),
        ColorFormat::Unknown(code) => Err(Gl3Error::InvalidColorFormat(code)),
    }
}

fn depth_read_format(format: DepthFormat) -> Result<Option<ReadFormat>, Gl3Error> {
    match format {
        DepthFormat::Float => Ok(Some(ReadFormat::DepthF32)),
        DepthFormat::None => Ok(None),
        DepthFormat::Unknown(code) => Err(Gl3Error::InvalidDepthFormat(code)),
    }
}

fn check_viewports(image: &Image, rendered: Viewport, target: Viewport, physical: (u32, u32)) -> Result<(), Gl3Error> {
    let out_of_bounds = |viewport, width, height| Gl3Error::ViewportOutOfBounds { viewport, width, height };
    if !target.fits_within(image.width(), image.height()) {
        return Err(out_of_bounds(target, image.width(), image.height()));
    }
    let (pw, ph) = (physical.0 as usize, physical.1 as usize);
    if !rendered.fits_within(pw, ph) || rendered.width != target.width || rendered.height != target.height {
        return Err(out_of_bounds(rendered, pw, ph));
    }
    Ok(())
}

impl<G: Gpu> LayerContext<G> {
    /// Dense readback of `rendered` into `target` at `target_viewport`
    pub(super) fn read_rendered_buffer(
        &mut self,
        env: &mut CoreEnv<'_>,
        target: &mut Image,
        rendered: Viewport,
        target_viewport: Viewport,
    ) -> Result<(), Gl3Error> {
        env.begin(Phase::BufferRead);
        let result = self.read_pixels_into(target, rendered, target_viewport);
        if result.is_ok() {
            target.clear_around_region(target_viewport, env.background);
        }
        env.end(Phase::BufferRead);
        result
    }

    fn read_pixels_into(&self, target: &mut Image, rendered: Viewport, target_viewport: Viewport) -> Result<(), Gl3Error> {
        let framebuffer = self.framebuffer.ok_or(Gl3Error::NotInitialized)?;
        let color_format = color_read_format(target.color_format())?;
        let depth_format = depth_read_format(target.depth_format())?;
        check_viewports(target, rendered, target_viewport, self.physical)?;

        let width = target.width();
        trace!("read {:?} -> {:?} of {}x{}", rendered, target_viewport, width, target.height());
        self.gpu.bind_framebuffer(Some(framebuffer));
        self.gpu.set_pack_row_length(width as u32);

        if let (Some(format), Some(bytes)) = (color_format, target.color_bytes_mut()) {
            let range = destination_range(rendered, target_viewport, width, format);
            if let Some(dst) = bytes.get_mut(range) {
                self.gpu.read_pixels(rendered, format, dst);
            }
        }
        if let (Some(format), Some(bytes)) = (depth_format, target.depth_bytes_mut()) {
            let range = destination_range(rendered, target_viewport, width, format);
            if let Some(dst) = bytes.get_mut(range) {
                self.gpu.read_pixels(rendered, format, dst);
            }
        }

        self.gpu.set_pack_row_length(0);
        self.gpu.bind_framebuffer(None);
        Ok(())
    }

    /// Make `sparse` ready for a `tile_width` x `tile_height` tile, growing
    /// the host buffer through the backend if the tile is the largest yet
    fn prepare_sparse(
        &mut self,
        color: ColorFormat,
        depth: DepthFormat,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<(), Gl3Error> {
        let pixels = tile_width as usize * tile_height as usize;
        let bytes = SparseImage::buffer_size(color, depth, tile_width, tile_height);
        let fits = self
            .sparse
            .as_ref()
            .is_some_and(|s| pixels <= self.sparse_pixels && bytes <= s.capacity());

        match self.sparse.as_mut() {
            Some(sparse) if fits => sparse.reassign(color, depth, tile_width, tile_height),
            _ => {
                if let Some(old) = self.sparse.take() {
                    self.backend.free_host(old.into_buffer());
                }
                let buffer = self.backend.allocate_host(bytes)?;
                self.sparse_pixels = self.sparse_pixels.max(pixels);
                debug!("sparse buffer grown to {} pixels ({} bytes)", self.sparse_pixels, bytes);
                self.sparse = Some(SparseImage::assign_buffer(buffer, color, depth, tile_width, tile_height));
            }
        }
        Ok(())
    }

    /// Compressed readback of `rendered`, placed at `target_viewport` of a tile
    pub(super) fn read_compressed_buffer(
        &mut self,
        env: &mut CoreEnv<'_>,
        rendered: Viewport,
        target_viewport: Viewport,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<(), Gl3Error> {
        let (color, depth) = (env.color_format, env.depth_format);
        self.prepare_sparse(color, depth, tile_width, tile_height)?;

        if self.backend.accelerates(color, depth) && self.depth_copy.is_some() {
            let Some(sparse) = self.sparse.as_mut() else {
                return Ok(());
            };
            let stats = self
                .backend
                .compress(rendered, target_viewport, tile_width, tile_height, sparse.payload_mut())?;
            sparse.set_compressed_payload_size(stats.payload_bytes);
            env.timing.add(Phase::Compress, stats.compute_seconds);
            env.timing.add(Phase::BufferRead, stats.transfer_seconds);
            trace!("device compressed {} payload bytes", stats.payload_bytes);
            return Ok(());
        }

        let mut scratch = match self.scratch.take() {
            Some(image)
                if image.width() == tile_width as usize
                    && image.height() == tile_height as usize
                    && image.color_format() == color
                    && image.depth_format() == depth =>
            {
                image
            }
            _ => Image::new(tile_width, tile_height, color, depth),
        };
        let read = self.read_rendered_buffer(env, &mut scratch, rendered, target_viewport);
        if read.is_ok() {
            if let Some(sparse) = self.sparse.as_mut() {
                env.begin(Phase::Compress);
                compress_image_region(&scratch, target_viewport, sparse);
                env.end(Phase::Compress);
            }
        }
        self.scratch = Some(scratch);
        read
    }

    /// Pixel count the sparse buffer is currently sized for
    pub(super) fn sparse_capacity_pixels(&self) -> usize {
        if self.sparse.is_some() { self.sparse_pixels } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_offsets() {
        let rendered = Viewport::new(2, 3, 5, 5);
        let range = destination_range(rendered, Viewport::new(10, 20, 5, 5), 100, ReadFormat::RgbaU8);
        assert_eq!(range.start, 2010 * 4);
        assert_eq!(range.len(), (4 * 100 + 5) * 4);

        let zero = destination_range(rendered, Viewport::new(0, 0, 5, 5), 100, ReadFormat::DepthF32);
        assert_eq!(zero.start, 0);

        let narrow = destination_range(Viewport::new(0, 0, 2, 2), Viewport::new(3, 7, 2, 2), 64, ReadFormat::RgbF32);
        assert_eq!(narrow.start, (3 + 64 * 7) * 12);
        assert_eq!(narrow.len(), (64 + 2) * 12);
    }

    #[test]
    fn test_unknown_formats_are_sanity_failures() {
        assert!(matches!(
            color_read_format(ColorFormat::Unknown(0xC0FF)),
            Err(Gl3Error::InvalidColorFormat(0xC0FF))
        ));
        assert!(matches!(depth_read_format(DepthFormat::None), Ok(None)));
        assert!(matches!(color_read_format(ColorFormat::None), Ok(None)));
    }
}
