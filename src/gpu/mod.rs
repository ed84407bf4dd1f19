//! GPU device seam used by the render layer.
//!
//! The layer never talks to OpenGL directly. Every texture, framebuffer,
//! readback and shader pass goes through [`Gpu`], which has two backends:
//!
//! - [`GlowGpu`]: real OpenGL 3.3 through `glow` (the context must be current
//!   on the calling thread)
//! - [`SoftGpu`]: in-memory device with real texel storage, used for headless
//!   runs and tests
//!
//! Handles are plain non-zero integers so they can be handed to user draw
//! callbacks and compared across frames. A handle value of zero never occurs.

pub mod glow_gpu;
pub mod shaders;
pub mod soft;

pub use glow_gpu::GlowGpu;
pub use soft::{SoftGpu, SoftStats};

use crate::core::Viewport;
use std::num::NonZeroU32;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub NonZeroU32);

        impl $name {
            /// Raw GL object name
            pub fn get(self) -> u32 {
                self.0.get()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

gpu_handle!(
    /// 2D texture object
    TextureId
);
gpu_handle!(
    /// Framebuffer object
    FramebufferId
);
gpu_handle!(
    /// Linked shader program
    ProgramId
);
gpu_handle!(
    /// Vertex array + vertex buffer pair holding static geometry
    QuadId
);

/// Storage format of a render target texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    RgbaF32,
    RgbF32,
    /// Single float channel, destination of the depth-copy pass
    R32F,
    Depth24,
    Depth24Stencil8,
    DepthF32,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            TextureFormat::Depth24 | TextureFormat::Depth24Stencil8 | TextureFormat::DepthF32
        )
    }
}

/// Framebuffer attachment point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Color0,
    Depth,
    DepthStencil,
}

/// Client-side layout requested from a pixel readback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFormat {
    RgbaU8,
    RgbaF32,
    RgbF32,
    DepthF32,
}

impl ReadFormat {
    /// Bytes written per pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ReadFormat::RgbaU8 => 4,
            ReadFormat::RgbaF32 => 16,
            ReadFormat::RgbF32 => 12,
            ReadFormat::DepthF32 => 4,
        }
    }
}

/// GPU device errors
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("failed to create {what}: {reason}")]
    Create { what: &'static str, reason: String },
    #[error("{stage} shader compilation failed:\n{log}")]
    Shader { stage: &'static str, log: String },
    #[error("shader program linking failed:\n{log}")]
    Link { log: String },
}

/// Minimal set of GPU operations the render layer needs.
///
/// Methods take `&self`: devices are shared (`Arc`) between the layer and the
/// application's draw callback, and all calls happen on the context thread.
pub trait Gpu {
    /// Largest width/height a 2D texture may have
    fn max_texture_size(&self) -> u32;

    /// Allocate an uninitialised texture with nearest filtering and no mipmaps
    fn create_texture(
        &self,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<TextureId, GpuError>;

    /// Actual level-0 dimensions, `None` if the handle is no longer a texture
    fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)>;

    fn delete_texture(&self, texture: TextureId);

    fn create_framebuffer(&self) -> Result<FramebufferId, GpuError>;

    fn delete_framebuffer(&self, framebuffer: FramebufferId);

    /// Bind for both drawing and reading; `None` restores the default framebuffer
    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>);

    /// Attach a texture to the currently bound framebuffer
    fn attach_texture(&self, attachment: Attachment, texture: TextureId);

    /// Route fragment output to the single color attachment
    fn draw_to_color0(&self);

    fn clear_color(&self) -> [f32; 4];

    fn set_clear_color(&self, color: [f32; 4]);

    /// `PACK_ROW_LENGTH`; 0 means rows are tightly packed
    fn set_pack_row_length(&self, pixels: u32);

    /// Read a rectangle of the bound framebuffer into `dst`.
    ///
    /// Row `r` lands at `r * row_length * bpp` bytes into `dst`, where
    /// `row_length` is the pack row length (or the rectangle width if 0).
    /// The caller guarantees `dst` covers the whole packed rectangle.
    fn read_pixels(&self, rect: Viewport, format: ReadFormat, dst: &mut [u8]);

    fn create_program(&self, vertex_src: &str, fragment_src: &str) -> Result<ProgramId, GpuError>;

    fn delete_program(&self, program: ProgramId);

    /// Upload static 2D positions (x, y pairs) drawn as a triangle strip
    fn create_quad(&self, positions: &[f32]) -> Result<QuadId, GpuError>;

    fn delete_quad(&self, quad: QuadId);

    /// Draw `quad` with `program`, sampling `input` on texture unit 0, into
    /// the bound framebuffer over a `width` x `height` viewport
    fn draw_quad(&self, program: ProgramId, quad: QuadId, input: TextureId, width: u32, height: u32);
}

/// Bytes needed to receive `rect` with the given row length
pub fn packed_len(rect: Viewport, row_length: u32, format: ReadFormat) -> usize {
    if rect.width <= 0 || rect.height <= 0 {
        return 0;
    }
    let row_length = if row_length == 0 { rect.width as usize } else { row_length as usize };
    ((rect.height as usize - 1) * row_length + rect.width as usize) * format.bytes_per_pixel()
}
