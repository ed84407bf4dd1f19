//! sortlast-gl3 - OpenGL 3 render layer for a sort-last image compositor
//!
//! Re-exports all modules for use by binary targets.

// GPU device seam (glow + software device)
pub mod gpu;

// Interface to the compositing core, plus a single-process core
pub mod core;

// The render layer
pub mod gl3;

// App modules
pub mod cli;
pub mod config;
pub mod scene;

pub use config::{ColorTargetFormat, CompressionKind, DepthTargetFormat, Gl3Config};
pub use core::{Compositor, Diagnostics, Image, LocalCompositor, LocalCompositorConfig, Timing, Viewport};
pub use gl3::{Gl3Error, Gl3Layer, RenderTargets};
pub use gpu::{Gpu, GlowGpu, SoftGpu};
