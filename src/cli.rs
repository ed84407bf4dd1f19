use crate::config::{ColorTargetFormat, CompressionKind, DepthTargetFormat};
use clap::Parser;
use std::path::PathBuf;

// Build version with backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Layer:  ", crate::gl3::LAYER_ID, " (OpenGL 3.3 core via glow)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Render a demo frame through the OpenGL 3 compositing layer
#[derive(Parser, Debug, Clone)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Render width in pixels
    #[arg(long = "width", value_name = "PX", default_value_t = 512)]
    pub width: u32,

    /// Render height in pixels
    #[arg(long = "height", value_name = "PX", default_value_t = 512)]
    pub height: u32,

    /// Color render target format (overrides --config)
    #[arg(long = "color-format", value_enum)]
    pub color_format: Option<ColorTargetFormat>,

    /// Depth render target format (overrides --config)
    #[arg(long = "depth-format", value_enum)]
    pub depth_format: Option<DepthTargetFormat>,

    /// Compression backend (overrides --config)
    #[arg(long = "compression", value_enum)]
    pub compression: Option<CompressionKind>,

    /// Read the layer's buffer through the compressed path
    #[arg(long = "compressed")]
    pub compressed: bool,

    /// Layer configuration JSON
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output PNG for headless rendering
    #[arg(short = 'o', long = "output", value_name = "FILE", default_value = "frame.png")]
    pub output: PathBuf,

    /// Open a window and render through the real OpenGL context
    #[arg(long = "viewer")]
    pub viewer: bool,

    /// Enable logging to file (default: sortlast-gl3.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}
