//! Compression backends for the compressed buffer readback.
//!
//! [`CpuCompression`] never touches GPU memory: the layer reads the render
//! targets back densely and the core's codec encodes the tile on the CPU.
//! [`GpuCompression`] hands the color target and the float copy of the depth
//! target to an [`ActivePixelDevice`], which encodes straight into the host
//! buffer without a dense roundtrip.
//!
//! The layer asks [`CompressionBackend::accelerates`] per readback and falls
//! back to the CPU path when the answer is no.

use crate::core::{ColorFormat, DepthFormat, Viewport};
use crate::config::CompressionKind;
use crate::gl3::error::Gl3Error;
use crate::gpu::TextureId;
use log::debug;

/// Error reported by an active-pixel device
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DeviceError(pub String);

/// Device-side registration of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisteredTexture(pub u64);

/// Device working memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceBuffer(pub u64);

/// One compression call
#[derive(Debug, Clone, Copy)]
pub struct CompressRequest {
    pub color: RegisteredTexture,
    pub depth: RegisteredTexture,
    pub working: DeviceBuffer,
    /// Region of the render targets that was drawn
    pub rendered: Viewport,
    /// Where that region lands in the tile
    pub target: Viewport,
    pub tile_width: u32,
    pub tile_height: u32,
}

/// Result of one compression call
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompressStats {
    pub payload_bytes: usize,
    pub compute_seconds: f64,
    pub transfer_seconds: f64,
}

/// GPU active-pixel encoder interface.
///
/// Encodes RGBA8 color plus float depth into the sparse payload layout of
/// [`crate::core::SparseImage`].
pub trait ActivePixelDevice {
    fn name(&self) -> &str;

    fn register_texture(&mut self, texture: TextureId) -> Result<RegisteredTexture, DeviceError>;

    fn unregister_texture(&mut self, handle: RegisteredTexture);

    fn allocate_device(&mut self, bytes: usize) -> Result<DeviceBuffer, DeviceError>;

    fn free_device(&mut self, buffer: DeviceBuffer);

    /// Host memory the device can write into directly
    fn allocate_host(&mut self, bytes: usize) -> Result<Vec<u8>, DeviceError>;

    fn free_host(&mut self, buffer: Vec<u8>);

    /// Encode `request` into `out` (the payload area of a sparse image)
    fn compress(&mut self, request: &CompressRequest, out: &mut [u8]) -> Result<CompressStats, DeviceError>;
}

/// Render target a backend may need to track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSlot {
    Color,
    Depth,
    /// `R32F` copy of the depth target
    DepthCopy,
}

/// Strategy used by the compressed buffer readback
pub trait CompressionBackend {
    fn kind(&self) -> CompressionKind;

    /// Whether compressed readback of this image format pair runs on the device
    fn accelerates(&self, color: ColorFormat, depth: DepthFormat) -> bool;

    /// Whether the layer must keep a float color copy of the depth target
    fn needs_depth_copy(&self) -> bool;

    /// Called before the texture in `slot` is deleted or replaced
    fn release_target(&mut self, slot: TargetSlot);

    /// Called after a new texture was allocated for `slot`
    fn register_target(&mut self, slot: TargetSlot, texture: TextureId, tile_max: (u32, u32)) -> Result<(), Gl3Error>;

    fn allocate_host(&mut self, bytes: usize) -> Result<Vec<u8>, Gl3Error>;

    /// Return a buffer obtained from [`CompressionBackend::allocate_host`]
    fn free_host(&mut self, buffer: Vec<u8>);

    fn compress(
        &mut self,
        rendered: Viewport,
        target: Viewport,
        tile_width: u32,
        tile_height: u32,
        out: &mut [u8],
    ) -> Result<CompressStats, Gl3Error>;

    /// Drop every registration and device allocation
    fn release(&mut self);
}

/// Dense readback plus the core's CPU encoder
#[derive(Debug, Default)]
pub struct CpuCompression;

impl CompressionBackend for CpuCompression {
    fn kind(&self) -> CompressionKind {
        CompressionKind::Cpu
    }

    fn accelerates(&self, _color: ColorFormat, _depth: DepthFormat) -> bool {
        false
    }

    fn needs_depth_copy(&self) -> bool {
        false
    }

    fn release_target(&mut self, _slot: TargetSlot) {}

    fn register_target(&mut self, _slot: TargetSlot, _texture: TextureId, _tile_max: (u32, u32)) -> Result<(), Gl3Error> {
        Ok(())
    }

    fn allocate_host(&mut self, bytes: usize) -> Result<Vec<u8>, Gl3Error> {
        Ok(vec![0; bytes])
    }

    fn free_host(&mut self, buffer: Vec<u8>) {
        drop(buffer);
    }

    fn compress(
        &mut self,
        _rendered: Viewport,
        _target: Viewport,
        _tile_width: u32,
        _tile_height: u32,
        _out: &mut [u8],
    ) -> Result<CompressStats, Gl3Error> {
        Err(DeviceError("CPU backend has no device encoder".into()).into())
    }

    fn release(&mut self) {}
}

/// Working memory per tile pixel: RGBA8 color and float depth
const WORKING_BYTES_PER_PIXEL: usize = 8;

/// Device-side compression over the color and depth-copy targets
pub struct GpuCompression {
    device: Box<dyn ActivePixelDevice>,
    color: Option<RegisteredTexture>,
    depth: Option<RegisteredTexture>,
    working: Option<DeviceBuffer>,
}

impl GpuCompression {
    pub fn new(device: Box<dyn ActivePixelDevice>) -> Self {
        Self {
            device,
            color: None,
            depth: None,
            working: None,
        }
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    fn unregister_color(&mut self) {
        if let Some(handle) = self.color.take() {
            self.device.unregister_texture(handle);
        }
    }

    fn unregister_depth(&mut self) {
        if let Some(handle) = self.depth.take() {
            self.device.unregister_texture(handle);
        }
        if let Some(buffer) = self.working.take() {
            self.device.free_device(buffer);
        }
    }
}

impl std::fmt::Debug for GpuCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuCompression")
            .field("device", &self.device.name())
            .field("color", &self.color)
            .field("depth", &self.depth)
            .field("working", &self.working)
            .finish()
    }
}

impl CompressionBackend for GpuCompression {
    fn kind(&self) -> CompressionKind {
        CompressionKind::Gpu
    }

    fn accelerates(&self, color: ColorFormat, depth: DepthFormat) -> bool {
        color == ColorFormat::RgbaUbyte && depth == DepthFormat::Float
    }

    fn needs_depth_copy(&self) -> bool {
        true
    }

    fn release_target(&mut self, slot: TargetSlot) {
        match slot {
            TargetSlot::Color => self.unregister_color(),
            TargetSlot::DepthCopy => self.unregister_depth(),
            TargetSlot::Depth => {}
        }
    }

    fn register_target(&mut self, slot: TargetSlot, texture: TextureId, tile_max: (u32, u32)) -> Result<(), Gl3Error> {
        match slot {
            TargetSlot::Color => {
                self.unregister_color();
                self.color = Some(self.device.register_texture(texture)?);
            }
            TargetSlot::DepthCopy => {
                self.unregister_depth();
                self.depth = Some(self.device.register_texture(texture)?);
                let bytes = tile_max.0 as usize * tile_max.1 as usize * WORKING_BYTES_PER_PIXEL;
                self.working = Some(self.device.allocate_device(bytes)?);
                debug!(
                    "{}: registered depth copy {}, working buffer {} bytes",
                    self.device.name(),
                    texture,
                    bytes
                );
            }
            TargetSlot::Depth => {}
        }
        Ok(())
    }

    fn allocate_host(&mut self, bytes: usize) -> Result<Vec<u8>, Gl3Error> {
        Ok(self.device.allocate_host(bytes)?)
    }

    fn free_host(&mut self, buffer: Vec<u8>) {
        self.device.free_host(buffer);
    }

    fn compress(
        &mut self,
        rendered: Viewport,
        target: Viewport,
        tile_width: u32,
        tile_height: u32,
        out: &mut [u8],
    ) -> Result<CompressStats, Gl3Error> {
        let (Some(color), Some(depth), Some(working)) = (self.color, self.depth, self.working) else {
            return Err(DeviceError("render targets not registered".into()).into());
        };
        let request = CompressRequest {
            color,
            depth,
            working,
            rendered,
            target,
            tile_width,
            tile_height,
        };
        Ok(self.device.compress(&request, out)?)
    }

    fn release(&mut self) {
        self.unregister_color();
        self.unregister_depth();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_backend_never_accelerates() {
        let mut cpu = CpuCompression;
        assert!(!cpu.accelerates(ColorFormat::RgbaUbyte, DepthFormat::Float));
        assert!(!cpu.needs_depth_copy());
        assert_eq!(cpu.allocate_host(12).unwrap().len(), 12);
        assert!(cpu.compress(Viewport::default(), Viewport::default(), 1, 1, &mut []).is_err());
    }
}
