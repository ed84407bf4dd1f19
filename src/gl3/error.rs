use crate::core::{ErrorCode, Viewport};
use crate::gl3::compress::DeviceError;
use crate::gpu::GpuError;

#[derive(Debug, thiserror::Error)]
pub enum Gl3Error {
    #[error("OpenGL 3 layer not initialized.")]
    NotInitialized,
    #[error("Drawing function not set.")]
    DrawCallbackNotSet,
    #[error("Render layer {active} is already active; only one render layer may be active.")]
    LayerConflict { active: &'static str },
    #[error("Encountered invalid color format 0x{0:X}.")]
    InvalidColorFormat(u32),
    #[error("Encountered invalid depth format 0x{0:X}.")]
    InvalidDepthFormat(u32),
    #[error("Viewport {viewport:?} does not fit a {width}x{height} image.")]
    ViewportOutOfBounds {
        viewport: Viewport,
        width: usize,
        height: usize,
    },
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error("compression backend: {0}")]
    Backend(#[from] DeviceError),
}

impl Gl3Error {
    /// Diagnostics category this error is raised under
    pub fn code(&self) -> ErrorCode {
        match self {
            Gl3Error::NotInitialized | Gl3Error::DrawCallbackNotSet | Gl3Error::LayerConflict { .. } => {
                ErrorCode::InvalidOperation
            }
            Gl3Error::InvalidColorFormat(_) | Gl3Error::InvalidDepthFormat(_) => ErrorCode::SanityCheckFail,
            Gl3Error::ViewportOutOfBounds { .. } => ErrorCode::InvalidValue,
            Gl3Error::Gpu(GpuError::Create { .. }) => ErrorCode::OutOfMemory,
            Gl3Error::Gpu(_) | Gl3Error::Backend(_) => ErrorCode::InvalidOperation,
        }
    }
}
