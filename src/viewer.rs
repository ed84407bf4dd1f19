//! Interactive viewer: drives the layer through eframe's OpenGL context.

use crate::{BACKGROUND, core_config, demo_modelview};
use sortlast_gl3::cli::Args;
use sortlast_gl3::config::Gl3Config;
use sortlast_gl3::core::{Compositor, LocalCompositor, Timing};
use sortlast_gl3::gl3::Gl3Layer;
use sortlast_gl3::gpu::{GlowGpu, Gpu};
use sortlast_gl3::scene;

use anyhow::anyhow;
use eframe::glow::{self, HasContext};
use eframe::egui;
use glam::DMat4;
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;

struct ViewerApp {
    gpu: Arc<GlowGpu>,
    layer: Gl3Layer<GlowGpu>,
    core: LocalCompositor,
    texture: Option<egui::TextureHandle>,
    timing: Timing,
    start: Instant,
    error: Option<String>,
}

impl ViewerApp {
    fn new(gl: Arc<glow::Context>, args: &Args, config: Gl3Config) -> anyhow::Result<Self> {
        let gpu = Arc::new(GlowGpu::new(gl));
        let mut core = LocalCompositor::new(core_config(args, &config));
        let mut layer = Gl3Layer::new(gpu.clone(), config);
        layer
            .initialize(&mut core)
            .map_err(|e| anyhow!("initialize OpenGL 3 layer: {}", e))?;

        let gl = gpu.context().clone();
        layer.set_draw_callback(move |request, _targets| {
            let vp = request.viewport;
            let [r, g, b, a] = request.background;
            unsafe {
                gl.viewport(vp.x, vp.y, vp.width, vp.height);
                gl.disable(glow::SCISSOR_TEST);
                gl.depth_mask(true);
                gl.clear_depth_f32(1.0);
                gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);

                // painter's order: each quad is a scissored clear of color and depth
                gl.enable(glow::SCISSOR_TEST);
                for quad in scene::layout(request.projection, request.modelview, vp) {
                    let [qr, qg, qb, qa] = quad.color;
                    gl.scissor(quad.rect.x, quad.rect.y, quad.rect.width, quad.rect.height);
                    gl.clear_color(qr, qg, qb, qa);
                    gl.clear_depth_f32(quad.depth);
                    gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
                }
                gl.disable(glow::SCISSOR_TEST);
                gl.clear_color(r, g, b, a);
                gl.clear_depth_f32(1.0);
            }
        });

        info!(
            "Viewer: max texture size {}, layer {:?}",
            gpu.max_texture_size(),
            layer
        );
        Ok(Self {
            gpu,
            layer,
            core,
            texture: None,
            timing: Timing::new(),
            start: Instant::now(),
            error: None,
        })
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.gpu.set_clear_color(BACKGROUND);
        let modelview = demo_modelview(self.start.elapsed().as_secs_f64());

        match self.layer.draw_frame(&mut self.core, &DMat4::IDENTITY, &modelview) {
            Some(image) => {
                let size = [image.width(), image.height()];
                let color = egui::ColorImage::from_rgba_unmultiplied(size, &image.to_rgba8_top_down());
                match &mut self.texture {
                    Some(texture) => texture.set(color, egui::TextureOptions::NEAREST),
                    None => {
                        self.texture = Some(ctx.load_texture("frame", color, egui::TextureOptions::NEAREST));
                    }
                }
                self.timing = self.core.timing().clone();
                self.error = None;
            }
            None => {
                let message = self
                    .core
                    .diagnostics_ref()
                    .last_error()
                    .map(|d| d.message.clone())
                    .unwrap_or_else(|| "frame failed".into());
                if self.error.as_deref() != Some(message.as_str()) {
                    warn!("Viewer: {}", message);
                }
                self.error = Some(message);
            }
        }

        egui::TopBottomPanel::bottom("timing").show(ctx, |ui| {
            let t = &self.timing;
            ui.label(format!(
                "render {:.2} ms | read {:.2} ms | compress {:.2} ms | composite {:.2} ms | total {:.2} ms",
                t.render * 1e3,
                t.buffer_read * 1e3,
                t.compress * 1e3,
                t.composite * 1e3,
                t.total_draw * 1e3
            ));
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                if let Some(error) = &self.error {
                    ui.colored_label(egui::Color32::RED, error);
                } else if let Some(texture) = &self.texture {
                    ui.image((texture.id(), texture.size_vec2()));
                }
            });

        ctx.request_repaint();
    }

    fn on_exit(&mut self, _gl: Option<&glow::Context>) {
        self.layer.destroy(&mut self.core);
    }
}

pub fn run(args: &Args, config: Gl3Config) -> anyhow::Result<()> {
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(format!("sortlast-gl3 v{}", env!("CARGO_PKG_VERSION")))
            .with_inner_size([args.width as f32, args.height as f32 + 32.0])
            .with_resizable(true),
        renderer: eframe::Renderer::Glow,
        ..Default::default()
    };

    let args = args.clone();
    eframe::run_native(
        "sortlast-gl3",
        native_options,
        Box::new(move |cc| {
            let gl = cc
                .gl
                .clone()
                .ok_or("the viewer needs eframe's glow renderer")?;
            Ok(Box::new(ViewerApp::new(gl, &args, config)?))
        }),
    )
    .map_err(|e| anyhow!("viewer: {}", e))
}
