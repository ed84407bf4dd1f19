use sortlast_gl3::cli::Args;
use sortlast_gl3::config::{ColorTargetFormat, CompressionKind, Gl3Config};
use sortlast_gl3::core::{ColorFormat, Compositor, DepthFormat, LocalCompositor, LocalCompositorConfig};
use sortlast_gl3::gl3::{Gl3Layer, SoftActivePixel};
use sortlast_gl3::gpu::{Gpu, SoftGpu};
use sortlast_gl3::scene;

use anyhow::{Context, anyhow};
use clap::Parser;
use glam::{DMat4, DVec3};
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;

mod viewer;

/// Clear color of the demo frame; the core composites over it
pub const BACKGROUND: [f32; 4] = [0.08, 0.08, 0.1, 1.0];

fn init_logging(args: &Args) -> anyhow::Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| PathBuf::from("sortlast-gl3.log"));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("egui", log::LevelFilter::Info)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("egui", log::LevelFilter::Info)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// Config file (or defaults) with command-line overrides applied
fn layer_config(args: &Args) -> anyhow::Result<Gl3Config> {
    let mut config = match &args.config {
        Some(path) => Gl3Config::load(path)?,
        None => Gl3Config::default(),
    };
    if let Some(color) = args.color_format {
        config.color_target = color;
    }
    if let Some(depth) = args.depth_format {
        config.depth_target = depth;
    }
    if let Some(compression) = args.compression {
        config.compression = compression;
    }
    config.compressed_readback |= args.compressed;
    Ok(config)
}

/// Core image format matching the color render target
pub fn core_color_format(target: ColorTargetFormat) -> ColorFormat {
    match target {
        ColorTargetFormat::Rgba8 => ColorFormat::RgbaUbyte,
        ColorTargetFormat::RgbaF32 => ColorFormat::RgbaFloat,
        ColorTargetFormat::RgbF32 => ColorFormat::RgbFloat,
    }
}

pub fn core_config(args: &Args, config: &Gl3Config) -> LocalCompositorConfig {
    LocalCompositorConfig {
        width: args.width,
        height: args.height,
        tile_max: None,
        color_format: core_color_format(config.color_target),
        depth_format: DepthFormat::Float,
        compressed_readback: config.compressed_readback,
    }
}

/// Modelview of the demo scene at time `t` seconds
pub fn demo_modelview(t: f64) -> DMat4 {
    DMat4::from_translation(DVec3::new(0.15 * t.sin(), 0.1 * (0.7 * t).cos(), 0.0))
}

fn render_headless(args: &Args, config: Gl3Config) -> anyhow::Result<()> {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = LocalCompositor::new(core_config(args, &config));
    let mut layer = match config.compression {
        CompressionKind::Gpu => {
            Gl3Layer::with_device(gpu.clone(), config, Box::new(SoftActivePixel::new(gpu.clone())))
        }
        CompressionKind::Cpu => Gl3Layer::new(gpu.clone(), config),
    };
    layer
        .initialize(&mut core)
        .context("initialize OpenGL 3 layer")?;

    let painter = gpu.clone();
    layer.set_draw_callback(move |request, _targets| {
        painter.clear(true, true);
        for quad in scene::layout(request.projection, request.modelview, request.viewport) {
            painter.fill_rect(quad.rect, quad.color, quad.depth);
        }
    });

    gpu.set_clear_color(BACKGROUND);
    let image = layer
        .draw_frame(&mut core, &DMat4::IDENTITY, &demo_modelview(0.0))
        .ok_or_else(|| {
            let reason = core
                .diagnostics_ref()
                .last_error()
                .map(|d| d.message.clone())
                .unwrap_or_else(|| "no image".into());
            anyhow!("draw frame failed: {}", reason)
        })?;

    let t = core.timing();
    info!(
        "Frame {}x{}: render {:.3} ms, read {:.3} ms, compress {:.3} ms, composite {:.3} ms, total {:.3} ms",
        image.width(),
        image.height(),
        t.render * 1e3,
        t.buffer_read * 1e3,
        t.compress * 1e3,
        t.composite * 1e3,
        t.total_draw * 1e3
    );
    debug!("GPU stats: {:?}", gpu.stats());

    let png = image::RgbaImage::from_raw(image.width() as u32, image.height() as u32, image.to_rgba8_top_down())
        .ok_or_else(|| anyhow!("image buffer does not match {}x{}", image.width(), image.height()))?;
    png.save(&args.output)
        .with_context(|| format!("write {}", args.output.display()))?;
    println!("Wrote {}", args.output.display());

    layer.destroy(&mut core);
    debug!("Textures still alive after destroy: {}", gpu.live_textures());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    debug!("Command-line args: {:?}", args);

    let config = layer_config(&args)?;
    info!("Layer config: {:?}", config);

    if args.viewer {
        viewer::run(&args, config)
    } else {
        render_headless(&args, config)
    }
}
