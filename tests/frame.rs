//! End-to-end frames through the layer on the software device.

use sortlast_gl3::config::{ColorTargetFormat, CompressionKind, DepthTargetFormat, Gl3Config};
use sortlast_gl3::core::{
    ColorFormat, Compositor, DepthFormat, DrawCallback, ErrorCode, Image, LocalCompositor,
    LocalCompositorConfig, RenderRequest, Severity, Viewport,
};
use sortlast_gl3::gl3::{DeviceEvent, EventLog, Gl3Error, Gl3Layer, SoftActivePixel};
use sortlast_gl3::gpu::{
    Attachment, FramebufferId, Gpu, GpuError, ProgramId, QuadId, ReadFormat, SoftGpu, TextureFormat, TextureId,
};

use glam::DMat4;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

const BACKGROUND: [f32; 4] = [0.0, 0.0, 1.0, 1.0];
const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

fn core(width: u32, height: u32) -> LocalCompositor {
    LocalCompositor::new(LocalCompositorConfig {
        width,
        height,
        color_format: ColorFormat::RgbaUbyte,
        depth_format: DepthFormat::Float,
        ..Default::default()
    })
}

fn cpu_layer(gpu: &Arc<SoftGpu>) -> Gl3Layer<SoftGpu> {
    Gl3Layer::new(gpu.clone(), Gl3Config::default())
}

fn gpu_layer(gpu: &Arc<SoftGpu>) -> (Gl3Layer<SoftGpu>, EventLog) {
    let device = SoftActivePixel::new(gpu.clone());
    let log = device.event_log();
    let config = Gl3Config {
        compression: CompressionKind::Gpu,
        ..Default::default()
    };
    (Gl3Layer::with_device(gpu.clone(), config, Box::new(device)), log)
}

/// Clear to background, then one red square at depth 0.25
fn paint_square(layer: &mut Gl3Layer<SoftGpu>, gpu: &Arc<SoftGpu>, square: Viewport) {
    let painter = gpu.clone();
    layer.set_draw_callback(move |_request, _targets| {
        painter.clear(true, true);
        painter.fill_rect(square, RED, 0.25);
    });
}

fn frame(layer: &mut Gl3Layer<SoftGpu>, gpu: &SoftGpu, core: &mut LocalCompositor) -> Option<Image> {
    gpu.set_clear_color(BACKGROUND);
    layer.draw_frame(core, &DMat4::IDENTITY, &DMat4::IDENTITY)
}

fn assert_same_pixels(a: &Image, b: &Image) {
    assert_eq!((a.width(), a.height()), (b.width(), b.height()));
    for i in 0..a.num_pixels() {
        assert_eq!(a.color_at(i), b.color_at(i), "color of pixel {}", i);
        assert_eq!(a.depth_at(i), b.depth_at(i), "depth of pixel {}", i);
    }
}

#[test]
fn test_solid_frame_reads_every_pixel() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(6, 4);
    let mut layer = cpu_layer(&gpu);
    layer.initialize(&mut core).unwrap();

    let painter = gpu.clone();
    let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
    let record = seen.clone();
    layer.set_draw_callback(move |request: &RenderRequest<'_>, targets| {
        record.borrow_mut().push((request.viewport, request.background, targets));
        painter.fill_rect(request.viewport, RED, 0.5);
    });

    let image = frame(&mut layer, &gpu, &mut core).expect("image");
    assert_eq!((image.width(), image.height()), (6, 4));
    for i in 0..image.num_pixels() {
        assert_eq!(image.color_at(i), Some(RED));
        assert_eq!(image.depth_at(i), Some(0.5));
    }

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    let (viewport, background, targets) = seen[0];
    assert_eq!(viewport, Viewport::full(6, 4));
    assert_eq!(background, BACKGROUND);
    assert_eq!(Some(targets), layer.render_targets());
    assert_eq!(layer.physical_size(), (6, 4));
    assert_eq!(gpu.bound_framebuffer(), None);
    assert_eq!(gpu.pack_row_length(), 0);
}

#[test]
fn test_partial_frame_keeps_background() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(4, 4);
    let mut layer = cpu_layer(&gpu);
    layer.initialize(&mut core).unwrap();
    paint_square(&mut layer, &gpu, Viewport::new(0, 0, 2, 2));

    let image = frame(&mut layer, &gpu, &mut core).expect("image");
    assert_eq!(image.color_at(0), Some(RED));
    assert_eq!(image.depth_at(5), Some(0.25));
    assert_eq!(image.color_at(2), Some(BACKGROUND));
    assert_eq!(image.depth_at(15), Some(1.0));
    assert_eq!(gpu.clear_color(), BACKGROUND);
}

#[test]
fn test_frame_without_draw_callback_allocates_nothing() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(8, 8);
    let mut layer = cpu_layer(&gpu);
    layer.initialize(&mut core).unwrap();

    assert!(frame(&mut layer, &gpu, &mut core).is_none());
    let error = core.diagnostics_ref().last_error().expect("error raised");
    assert_eq!(error.code, ErrorCode::InvalidOperation);
    assert_eq!(gpu.stats().textures_created, 0);
    assert!(layer.color_texture().is_none());
    assert!(core.draw_callback().is_none());
}

#[test]
fn test_frame_before_initialize_fails() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(8, 8);
    let mut layer = cpu_layer(&gpu);
    paint_square(&mut layer, &gpu, Viewport::new(0, 0, 1, 1));

    assert!(frame(&mut layer, &gpu, &mut core).is_none());
    assert_eq!(
        core.diagnostics_ref().last_error().map(|d| d.message.clone()),
        Some(Gl3Error::NotInitialized.to_string())
    );
    assert_eq!(gpu.stats().textures_created, 0);

    // the callback belongs to the layer and survives initialisation
    layer.initialize(&mut core).unwrap();
    let image = frame(&mut layer, &gpu, &mut core).expect("image");
    assert_eq!(image.color_at(0), Some(RED));
    assert_eq!(image.color_at(1), Some(BACKGROUND));
}

#[test]
fn test_double_initialize_warns_and_keeps_objects() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(8, 8);
    let mut layer = cpu_layer(&gpu);
    layer.initialize(&mut core).unwrap();
    let framebuffer = layer.framebuffer();

    layer.initialize(&mut core).unwrap();
    let warning = core.diagnostics_ref().last_warning().expect("warning raised");
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.message, "OpenGL 3 layer already initialized.");
    assert_eq!(layer.framebuffer(), framebuffer);
    assert_eq!(gpu.stats().framebuffers_created, 1);
    assert!(layer.is_initialized(&core));
}

#[test]
fn test_second_layer_conflicts() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(8, 8);
    let mut first = cpu_layer(&gpu);
    let mut second = cpu_layer(&gpu);
    first.initialize(&mut core).unwrap();

    let err = second.initialize(&mut core).unwrap_err();
    assert!(matches!(err, Gl3Error::LayerConflict { active: "OGL3" }));
    assert!(first.is_initialized(&core));
    assert!(!second.is_initialized(&core));
    assert!(second.framebuffer().is_none());
}

#[test]
fn test_cpu_compressed_readback_matches_dense() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(8, 8);
    let mut layer = cpu_layer(&gpu);
    layer.initialize(&mut core).unwrap();
    paint_square(&mut layer, &gpu, Viewport::new(2, 3, 3, 4));

    let dense = frame(&mut layer, &gpu, &mut core).expect("dense");
    core.set_compressed_readback(true);
    let decompressed = frame(&mut layer, &gpu, &mut core).expect("compressed");

    assert_same_pixels(&dense, &decompressed);
    assert_eq!(layer.compressed_capacity_pixels(), 64);
    assert!(core.timing().compress >= 0.0);
}

#[test]
fn test_gpu_compressed_readback_matches_dense() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(8, 8);
    let (mut layer, log) = gpu_layer(&gpu);
    layer.initialize(&mut core).unwrap();
    paint_square(&mut layer, &gpu, Viewport::new(1, 1, 4, 2));

    let dense = frame(&mut layer, &gpu, &mut core).expect("dense");
    core.set_compressed_readback(true);
    let decompressed = frame(&mut layer, &gpu, &mut core).expect("compressed");

    assert_same_pixels(&dense, &decompressed);
    assert!(layer.depth_copy_texture().is_some());
    assert_eq!(gpu.stats().quad_draws, 2);
    assert!(log.events().contains(&DeviceEvent::Compress { active_pixels: 8 }));
}

#[test]
fn test_gpu_resize_unregisters_before_registering() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(8, 8);
    core.set_compressed_readback(true);
    let (mut layer, log) = gpu_layer(&gpu);
    layer.initialize(&mut core).unwrap();
    paint_square(&mut layer, &gpu, Viewport::new(0, 0, 4, 4));

    frame(&mut layer, &gpu, &mut core).expect("first frame");
    assert_eq!(log.live_registrations().len(), 2);

    log.clear();
    core.set_size(16, 12);
    frame(&mut layer, &gpu, &mut core).expect("resized frame");

    let events = log.events();
    let registers: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, DeviceEvent::Register { .. }))
        .map(|(i, _)| i)
        .collect();
    let unregisters: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, DeviceEvent::Unregister { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(registers.len(), 2);
    assert_eq!(unregisters.len(), 2);
    for (unregister, register) in unregisters.iter().zip(&registers) {
        assert!(unregister < register, "{:?}", events);
    }
    assert!(
        events
            .iter()
            .any(|e| matches!(e, DeviceEvent::AllocateDevice { bytes, .. } if *bytes == 16 * 12 * 8))
    );
    assert_eq!(log.live_registrations().len(), 2);
    assert_eq!(layer.physical_size(), (16, 12));
}

#[test]
fn test_compressed_capacity_only_grows() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(4, 4);
    core.set_compressed_readback(true);
    let mut layer = cpu_layer(&gpu);
    layer.initialize(&mut core).unwrap();
    paint_square(&mut layer, &gpu, Viewport::new(0, 0, 1, 1));

    let mut capacities = Vec::new();
    for (w, h) in [(4, 4), (2, 2), (8, 8), (3, 3)] {
        core.set_size(w, h);
        let image = frame(&mut layer, &gpu, &mut core).expect("frame");
        assert_eq!((image.width(), image.height()), (w as usize, h as usize));
        assert_eq!(image.color_at(0), Some(RED));
        capacities.push(layer.compressed_capacity_pixels());
    }
    assert_eq!(capacities, vec![16, 16, 64, 64]);
}

#[test]
fn test_targets_follow_render_size() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(8, 8);
    let mut layer = cpu_layer(&gpu);
    layer.initialize(&mut core).unwrap();
    paint_square(&mut layer, &gpu, Viewport::new(0, 0, 2, 2));

    frame(&mut layer, &gpu, &mut core).expect("frame");
    let color = layer.color_texture();
    frame(&mut layer, &gpu, &mut core).expect("same size");
    assert_eq!(layer.color_texture(), color);
    assert_eq!(gpu.stats().textures_created, 2);

    core.set_size(10, 6);
    frame(&mut layer, &gpu, &mut core).expect("resized");
    assert_ne!(layer.color_texture(), color);
    assert_eq!(gpu.stats().textures_created, 4);
    assert_eq!(gpu.live_textures(), 2);
    let color = layer.color_texture().unwrap();
    assert_eq!(gpu.texture_size(color), Some((10, 6)));
}

#[test]
fn test_render_size_clamped_to_texture_limit() {
    let gpu = Arc::new(SoftGpu::with_max_texture_size(16));
    let mut core = core(16, 16);
    let mut layer = cpu_layer(&gpu);
    layer.initialize(&mut core).unwrap();
    paint_square(&mut layer, &gpu, Viewport::new(0, 0, 1, 1));

    frame(&mut layer, &gpu, &mut core).expect("frame");
    core.set_size(40, 12);
    // the core's region is now wider than the targets; readback refuses it
    assert!(frame(&mut layer, &gpu, &mut core).is_some());
    assert_eq!(layer.physical_size(), (16, 12));
    assert_eq!(
        core.diagnostics_ref().last_error().map(|d| d.code),
        Some(ErrorCode::InvalidValue)
    );
}

#[test]
fn test_shader_failure_leaves_layer_uninitialized() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(8, 8);
    let (mut layer, _log) = gpu_layer(&gpu);
    gpu.fail_shader_compilation("0:1: syntax error");

    let err = layer.initialize(&mut core).unwrap_err();
    assert!(matches!(err, Gl3Error::Gpu(_)));
    assert!(!layer.is_initialized(&core));
    assert!(core.render_layer().is_none());
    assert_eq!(gpu.live_framebuffers(), 0);
    assert_eq!(gpu.live_programs(), 0);
    assert_eq!(gpu.live_quads(), 0);
    assert!(core.diagnostics_ref().last_error().is_some());
}

#[test]
fn test_destroy_releases_everything() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(8, 8);
    core.set_compressed_readback(true);
    let (mut layer, log) = gpu_layer(&gpu);
    layer.initialize(&mut core).unwrap();
    paint_square(&mut layer, &gpu, Viewport::new(0, 0, 3, 3));
    frame(&mut layer, &gpu, &mut core).expect("frame");
    assert_eq!(gpu.live_textures(), 3);

    layer.destroy(&mut core);
    assert!(core.render_layer().is_none());
    assert_eq!(gpu.live_textures(), 0);
    assert_eq!(gpu.live_framebuffers(), 0);
    assert_eq!(gpu.live_programs(), 0);
    assert!(log.live_registrations().is_empty());
    assert!(log.events().iter().any(|e| matches!(e, DeviceEvent::FreeHost { .. })));
    assert!(!layer.is_initialized(&core));

    // reinitialising after destroy works
    layer.initialize(&mut core).unwrap();
    assert!(frame(&mut layer, &gpu, &mut core).is_some());
}

#[test]
fn test_core_callback_restored_after_frame() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(4, 4);
    let mut layer = cpu_layer(&gpu);
    layer.initialize(&mut core).unwrap();
    paint_square(&mut layer, &gpu, Viewport::new(0, 0, 1, 1));

    let previous: DrawCallback = Rc::new(|_: &RenderRequest<'_>, _: &mut Image| {});
    core.set_draw_callback(Some(previous.clone()));
    frame(&mut layer, &gpu, &mut core).expect("frame");

    let restored = core.draw_callback().expect("callback restored");
    assert!(Rc::ptr_eq(&restored, &previous));
}

#[test]
fn test_frame_times_add_up() {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = core(16, 16);
    let mut layer = cpu_layer(&gpu);
    layer.initialize(&mut core).unwrap();
    paint_square(&mut layer, &gpu, Viewport::new(0, 0, 8, 8));
    frame(&mut layer, &gpu, &mut core).expect("frame");

    let t = core.timing().clone();
    let sum = t.render + t.buffer_read + t.buffer_write + t.composite;
    assert!((sum - t.total_draw).abs() < 1e-9);
    assert!(t.total_draw >= t.render);
}

/// `SoftGpu` whose `create_texture` fails once, on the given call
struct FailingOnce {
    inner: Arc<SoftGpu>,
    fail_on: u32,
    calls: Cell<u32>,
}

impl FailingOnce {
    fn new(inner: Arc<SoftGpu>, fail_on: u32) -> Self {
        Self {
            inner,
            fail_on,
            calls: Cell::new(0),
        }
    }
}

impl Gpu for FailingOnce {
    fn max_texture_size(&self) -> u32 {
        self.inner.max_texture_size()
    }

    fn create_texture(&self, format: TextureFormat, width: u32, height: u32) -> Result<TextureId, GpuError> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if call == self.fail_on {
            return Err(GpuError::Create {
                what: "texture",
                reason: "out of memory".into(),
            });
        }
        self.inner.create_texture(format, width, height)
    }

    fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.inner.texture_size(texture)
    }

    fn delete_texture(&self, texture: TextureId) {
        self.inner.delete_texture(texture)
    }

    fn create_framebuffer(&self) -> Result<FramebufferId, GpuError> {
        self.inner.create_framebuffer()
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        self.inner.delete_framebuffer(framebuffer)
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>) {
        self.inner.bind_framebuffer(framebuffer)
    }

    fn attach_texture(&self, attachment: Attachment, texture: TextureId) {
        self.inner.attach_texture(attachment, texture)
    }

    fn draw_to_color0(&self) {
        self.inner.draw_to_color0()
    }

    fn clear_color(&self) -> [f32; 4] {
        self.inner.clear_color()
    }

    fn set_clear_color(&self, color: [f32; 4]) {
        self.inner.set_clear_color(color)
    }

    fn set_pack_row_length(&self, pixels: u32) {
        self.inner.set_pack_row_length(pixels)
    }

    fn read_pixels(&self, rect: Viewport, format: ReadFormat, dst: &mut [u8]) {
        self.inner.read_pixels(rect, format, dst)
    }

    fn create_program(&self, vertex_src: &str, fragment_src: &str) -> Result<ProgramId, GpuError> {
        self.inner.create_program(vertex_src, fragment_src)
    }

    fn delete_program(&self, program: ProgramId) {
        self.inner.delete_program(program)
    }

    fn create_quad(&self, positions: &[f32]) -> Result<QuadId, GpuError> {
        self.inner.create_quad(positions)
    }

    fn delete_quad(&self, quad: QuadId) {
        self.inner.delete_quad(quad)
    }

    fn draw_quad(&self, program: ProgramId, quad: QuadId, input: TextureId, width: u32, height: u32) {
        self.inner.draw_quad(program, quad, input, width, height)
    }
}

#[test]
fn test_failed_target_allocation_recovers_next_frame() {
    let soft = Arc::new(SoftGpu::new());
    // color is the first texture, depth the second
    let gpu = Arc::new(FailingOnce::new(soft.clone(), 2));
    let mut core = core(4, 4);
    let mut layer = Gl3Layer::new(gpu.clone(), Gl3Config::default());
    layer.initialize(&mut core).unwrap();
    let painter = soft.clone();
    layer.set_draw_callback(move |_request, _targets| {
        painter.clear(true, true);
        painter.fill_rect(Viewport::new(0, 0, 2, 2), RED, 0.25);
    });

    soft.set_clear_color(BACKGROUND);
    assert!(layer.draw_frame(&mut core, &DMat4::IDENTITY, &DMat4::IDENTITY).is_none());
    assert_eq!(
        core.diagnostics_ref().last_error().map(|d| d.code),
        Some(ErrorCode::OutOfMemory)
    );
    assert_eq!(soft.bound_framebuffer(), None);

    let image = layer
        .draw_frame(&mut core, &DMat4::IDENTITY, &DMat4::IDENTITY)
        .expect("second frame");
    let framebuffer = layer.framebuffer().expect("framebuffer");
    assert_eq!(
        soft.attachments(framebuffer),
        Some((layer.color_texture(), layer.depth_texture()))
    );
    assert_eq!(image.color_at(0), Some(RED));
    assert_eq!(image.depth_at(0), Some(0.25));
    assert_eq!(image.color_at(3), Some(BACKGROUND));
    assert_eq!(soft.live_textures(), 2);
}

const SAMPLE: [f32; 4] = [0.25, 0.5, 0.75, 1.0];

fn format_frame(
    color_target: ColorTargetFormat,
    depth_target: DepthTargetFormat,
    color_format: ColorFormat,
    depth_format: DepthFormat,
    compressed: bool,
) -> (Arc<SoftGpu>, Gl3Layer<SoftGpu>, LocalCompositor, Option<Image>) {
    let gpu = Arc::new(SoftGpu::new());
    let mut core = LocalCompositor::new(LocalCompositorConfig {
        width: 4,
        height: 3,
        color_format,
        depth_format,
        compressed_readback: compressed,
        ..Default::default()
    });
    let config = Gl3Config {
        color_target,
        depth_target,
        ..Default::default()
    };
    let mut layer = Gl3Layer::new(gpu.clone(), config);
    layer.initialize(&mut core).unwrap();
    let painter = gpu.clone();
    layer.set_draw_callback(move |_request, _targets| {
        painter.clear(true, true);
        painter.fill_rect(Viewport::new(1, 1, 2, 1), SAMPLE, 0.25);
    });
    let image = frame(&mut layer, &gpu, &mut core);
    (gpu, layer, core, image)
}

#[test]
fn test_float_color_targets_read_back() {
    let cases = [
        (ColorTargetFormat::RgbaF32, DepthTargetFormat::DepthF32, ColorFormat::RgbaFloat, false),
        (ColorTargetFormat::RgbaF32, DepthTargetFormat::Depth24, ColorFormat::RgbaFloat, true),
        (ColorTargetFormat::RgbF32, DepthTargetFormat::Depth24Stencil8, ColorFormat::RgbFloat, false),
        (ColorTargetFormat::RgbF32, DepthTargetFormat::DepthF32, ColorFormat::RgbFloat, true),
    ];
    for (color_target, depth_target, color_format, compressed) in cases {
        let case = format!("{:?}/{:?} compressed={}", color_target, depth_target, compressed);
        let (gpu, layer, core, image) =
            format_frame(color_target, depth_target, color_format, DepthFormat::Float, compressed);
        let image = image.expect(&case);

        assert_eq!(image.color_format(), color_format, "{}", case);
        // pixels 5 and 6 form the painted row
        for i in [5, 6] {
            assert_eq!(image.color_at(i), Some(SAMPLE), "{} pixel {}", case, i);
            assert_eq!(image.depth_at(i), Some(0.25), "{} pixel {}", case, i);
        }
        for i in [0, 4, 7, 11] {
            assert_eq!(image.color_at(i), Some(BACKGROUND), "{} pixel {}", case, i);
            assert_eq!(image.depth_at(i), Some(1.0), "{} pixel {}", case, i);
        }

        let color = layer.color_texture().expect("color target");
        let depth = layer.depth_texture().expect("depth target");
        assert_eq!(gpu.texture_format(color), Some(color_target.texture_format()), "{}", case);
        assert_eq!(gpu.texture_format(depth), Some(depth_target.texture_format()), "{}", case);
        assert!(core.diagnostics_ref().last_error().is_none(), "{}", case);
    }
}

#[test]
fn test_depth24_targets_attach_as_depth() {
    for depth_target in [DepthTargetFormat::Depth24, DepthTargetFormat::Depth24Stencil8] {
        let (gpu, layer, _core, image) = format_frame(
            ColorTargetFormat::Rgba8,
            depth_target,
            ColorFormat::RgbaUbyte,
            DepthFormat::Float,
            false,
        );
        let image = image.expect("image");
        assert_eq!(image.depth_at(5), Some(0.25), "{:?}", depth_target);
        assert_eq!(image.depth_at(0), Some(1.0), "{:?}", depth_target);

        let framebuffer = layer.framebuffer().expect("framebuffer");
        let attached = gpu.attachments(framebuffer).and_then(|(_, depth)| depth);
        assert_eq!(attached, layer.depth_texture(), "{:?}", depth_target);
    }
}

#[test]
fn test_unknown_formats_fail_sanity_check() {
    let unknown = [
        (ColorFormat::Unknown(0xC0FF), DepthFormat::Float),
        (ColorFormat::RgbaUbyte, DepthFormat::Unknown(0xD0FF)),
    ];
    for (color_format, depth_format) in unknown {
        let (gpu, _layer, core, image) = format_frame(
            ColorTargetFormat::Rgba8,
            DepthTargetFormat::DepthF32,
            color_format,
            depth_format,
            false,
        );
        assert!(image.is_some());
        let error = core.diagnostics_ref().last_error().expect("error raised");
        assert_eq!(error.code, ErrorCode::SanityCheckFail, "{:?}/{:?}", color_format, depth_format);
        assert_eq!(gpu.stats().readbacks, 0);
        assert_eq!(gpu.pack_row_length(), 0);
    }
}

mod capacity {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn compressed_capacity_is_running_max(sizes in proptest::collection::vec((1u32..12, 1u32..12), 1..6)) {
            let gpu = Arc::new(SoftGpu::new());
            let mut core = core(1, 1);
            core.set_compressed_readback(true);
            let mut layer = cpu_layer(&gpu);
            layer.initialize(&mut core).unwrap();
            paint_square(&mut layer, &gpu, Viewport::new(0, 0, 1, 1));

            let mut max = 0;
            for (w, h) in sizes {
                core.set_size(w, h);
                prop_assert!(frame(&mut layer, &gpu, &mut core).is_some());
                max = max.max(w as usize * h as usize);
                prop_assert_eq!(layer.compressed_capacity_pixels(), max);
            }
        }
    }
}
