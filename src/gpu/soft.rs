//! In-memory GPU device.
//!
//! Behaves like a minimal GL 3 context: textures own texel storage,
//! framebuffers reference attachments, readback honours `PACK_ROW_LENGTH` and
//! converts to the requested client format. Every program drawn with
//! [`Gpu::draw_quad`] acts as the depth-copy pass: the first channel of the
//! sampled texture is written to the first channel of the color attachment.
//!
//! Texels are stored as `[f32; 4]`. Depth textures keep the depth in the
//! first channel. `Rgba8` textures quantise on write.

use super::{
    Attachment, FramebufferId, Gpu, GpuError, ProgramId, QuadId, ReadFormat, TextureFormat,
    TextureId,
};
use crate::core::Viewport;
use log::trace;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::sync::{Mutex, MutexGuard};

/// Default `GL_MAX_TEXTURE_SIZE` reported by [`SoftGpu::new`]
pub const DEFAULT_MAX_TEXTURE_SIZE: u32 = 16384;

/// Allocation/draw counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftStats {
    pub textures_created: usize,
    pub textures_deleted: usize,
    pub framebuffers_created: usize,
    pub attachments: usize,
    pub quad_draws: usize,
    pub readbacks: usize,
}

#[derive(Debug, Clone)]
struct SoftTexture {
    format: TextureFormat,
    width: u32,
    height: u32,
    texels: Vec<[f32; 4]>,
}

impl SoftTexture {
    fn write(&mut self, index: usize, value: [f32; 4]) {
        self.texels[index] = match self.format {
            TextureFormat::Rgba8 => value.map(quantize),
            _ => value,
        };
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SoftFramebuffer {
    color: Option<TextureId>,
    depth: Option<TextureId>,
}

#[derive(Debug)]
struct SoftState {
    next_name: u32,
    max_texture_size: u32,
    textures: HashMap<TextureId, SoftTexture>,
    framebuffers: HashMap<FramebufferId, SoftFramebuffer>,
    programs: HashSet<ProgramId>,
    quads: HashSet<QuadId>,
    bound: Option<FramebufferId>,
    clear_color: [f32; 4],
    clear_depth: f32,
    pack_row_length: u32,
    shader_failure: Option<String>,
    stats: SoftStats,
}

impl SoftState {
    fn name(&mut self) -> NonZeroU32 {
        self.next_name += 1;
        NonZeroU32::new(self.next_name).unwrap_or(NonZeroU32::MIN)
    }

    fn bound_attachment(&self, depth: bool) -> Option<TextureId> {
        let fb = self.framebuffers.get(&self.bound?)?;
        if depth { fb.depth } else { fb.color }
    }
}

/// Software implementation of [`Gpu`]
#[derive(Debug)]
pub struct SoftGpu {
    state: Mutex<SoftState>,
}

impl Default for SoftGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftGpu {
    pub fn new() -> Self {
        Self::with_max_texture_size(DEFAULT_MAX_TEXTURE_SIZE)
    }

    pub fn with_max_texture_size(max_texture_size: u32) -> Self {
        Self {
            state: Mutex::new(SoftState {
                next_name: 0,
                max_texture_size,
                textures: HashMap::new(),
                framebuffers: HashMap::new(),
                programs: HashSet::new(),
                quads: HashSet::new(),
                bound: None,
                clear_color: [0.0; 4],
                clear_depth: 1.0,
                pack_row_length: 0,
                shader_failure: None,
                stats: SoftStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SoftState> {
        // A panic inside a draw callback must not wedge every later GPU call.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `create_program` fail with `log` as the compiler output
    pub fn fail_shader_compilation(&self, log: impl Into<String>) {
        self.lock().shader_failure = Some(log.into());
    }

    pub fn stats(&self) -> SoftStats {
        self.lock().stats
    }

    pub fn set_clear_depth(&self, depth: f32) {
        self.lock().clear_depth = depth;
    }

    /// Currently bound framebuffer
    pub fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.lock().bound
    }

    pub fn pack_row_length(&self) -> u32 {
        self.lock().pack_row_length
    }

    /// Number of live (created and not deleted) textures
    pub fn live_textures(&self) -> usize {
        self.lock().textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.lock().framebuffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.lock().programs.len()
    }

    pub fn live_quads(&self) -> usize {
        self.lock().quads.len()
    }

    /// Attachments of a framebuffer as (color, depth)
    pub fn attachments(&self, framebuffer: FramebufferId) -> Option<(Option<TextureId>, Option<TextureId>)> {
        self.lock().framebuffers.get(&framebuffer).map(|fb| (fb.color, fb.depth))
    }

    pub fn texture_format(&self, texture: TextureId) -> Option<TextureFormat> {
        self.lock().textures.get(&texture).map(|t| t.format)
    }

    /// Copy of a texture's texels, row-major from the bottom row
    pub fn texels(&self, texture: TextureId) -> Option<Vec<[f32; 4]>> {
        self.lock().textures.get(&texture).map(|t| t.texels.clone())
    }

    /// `glClear` of the bound framebuffer with the current clear values
    pub fn clear(&self, color: bool, depth: bool) {
        let mut state = self.lock();
        let clear_color = state.clear_color;
        let clear_depth = state.clear_depth;
        let targets = [
            (color, state.bound_attachment(false), clear_color),
            (depth, state.bound_attachment(true), [clear_depth, 0.0, 0.0, 0.0]),
        ];
        for (enabled, target, value) in targets {
            let Some(id) = target.filter(|_| enabled) else { continue };
            if let Some(tex) = state.textures.get_mut(&id) {
                for i in 0..tex.texels.len() {
                    tex.write(i, value);
                }
            }
        }
    }

    /// Rasterise a solid rectangle with a constant depth into the bound
    /// framebuffer, clipped to the attachments
    pub fn fill_rect(&self, rect: Viewport, color: [f32; 4], depth: f32) {
        let mut state = self.lock();
        let targets = [
            (state.bound_attachment(false), color),
            (state.bound_attachment(true), [depth, 0.0, 0.0, 0.0]),
        ];
        for (target, value) in targets {
            let Some(tex) = target.and_then(|id| state.textures.get_mut(&id)) else {
                continue;
            };
            let (w, h) = (tex.width as i32, tex.height as i32);
            for y in rect.y.max(0)..(rect.y + rect.height).min(h) {
                for x in rect.x.max(0)..(rect.x + rect.width).min(w) {
                    tex.write((y * w + x) as usize, value);
                }
            }
        }
    }
}

fn quantize(v: f32) -> f32 {
    (v.clamp(0.0, 1.0) * 255.0).round() / 255.0
}

impl Gpu for SoftGpu {
    fn max_texture_size(&self) -> u32 {
        self.lock().max_texture_size
    }

    fn create_texture(
        &self,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<TextureId, GpuError> {
        let mut state = self.lock();
        if width > state.max_texture_size || height > state.max_texture_size {
            return Err(GpuError::Create {
                what: "texture",
                reason: format!(
                    "{}x{} exceeds GL_MAX_TEXTURE_SIZE {}",
                    width, height, state.max_texture_size
                ),
            });
        }
        let id = TextureId(state.name());
        state.textures.insert(
            id,
            SoftTexture {
                format,
                width,
                height,
                texels: vec![[0.0; 4]; width as usize * height as usize],
            },
        );
        state.stats.textures_created += 1;
        trace!("SoftGpu: texture {} {:?} {}x{}", id, format, width, height);
        Ok(id)
    }

    fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.lock().textures.get(&texture).map(|t| (t.width, t.height))
    }

    fn delete_texture(&self, texture: TextureId) {
        let mut state = self.lock();
        if state.textures.remove(&texture).is_some() {
            state.stats.textures_deleted += 1;
        }
        for fb in state.framebuffers.values_mut() {
            if fb.color == Some(texture) {
                fb.color = None;
            }
            if fb.depth == Some(texture) {
                fb.depth = None;
            }
        }
    }

    fn create_framebuffer(&self) -> Result<FramebufferId, GpuError> {
        let mut state = self.lock();
        let id = FramebufferId(state.name());
        state.framebuffers.insert(id, SoftFramebuffer::default());
        state.stats.framebuffers_created += 1;
        Ok(id)
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        let mut state = self.lock();
        state.framebuffers.remove(&framebuffer);
        if state.bound == Some(framebuffer) {
            state.bound = None;
        }
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>) {
        self.lock().bound = framebuffer;
    }

    fn attach_texture(&self, attachment: Attachment, texture: TextureId) {
        let mut state = self.lock();
        let Some(bound) = state.bound else { return };
        if let Some(fb) = state.framebuffers.get_mut(&bound) {
            match attachment {
                Attachment::Color0 => fb.color = Some(texture),
                Attachment::Depth | Attachment::DepthStencil => fb.depth = Some(texture),
            }
            state.stats.attachments += 1;
        }
    }

    fn draw_to_color0(&self) {}

    fn clear_color(&self) -> [f32; 4] {
        self.lock().clear_color
    }

    fn set_clear_color(&self, color: [f32; 4]) {
        self.lock().clear_color = color;
    }

    fn set_pack_row_length(&self, pixels: u32) {
        self.lock().pack_row_length = pixels;
    }

    fn read_pixels(&self, rect: Viewport, format: ReadFormat, dst: &mut [u8]) {
        let mut state = self.lock();
        state.stats.readbacks += 1;
        let source = state.bound_attachment(format == ReadFormat::DepthF32);
        let Some(tex) = source.and_then(|id| state.textures.get(&id)) else {
            return;
        };
        let bpp = format.bytes_per_pixel();
        let row_length = match state.pack_row_length {
            0 => rect.width.max(0) as usize,
            n => n as usize,
        };
        for row in 0..rect.height.max(0) {
            for col in 0..rect.width.max(0) {
                let (sx, sy) = (rect.x + col, rect.y + row);
                if sx < 0 || sy < 0 || sx >= tex.width as i32 || sy >= tex.height as i32 {
                    continue;
                }
                let texel = tex.texels[(sy as u32 * tex.width + sx as u32) as usize];
                let at = (row as usize * row_length + col as usize) * bpp;
                let out = &mut dst[at..at + bpp];
                match format {
                    ReadFormat::RgbaU8 => {
                        for (o, v) in out.iter_mut().zip(texel) {
                            *o = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
                        }
                    }
                    ReadFormat::RgbaF32 => out.copy_from_slice(bytemuck::cast_slice(&texel)),
                    ReadFormat::RgbF32 => out.copy_from_slice(bytemuck::cast_slice(&texel[..3])),
                    ReadFormat::DepthF32 => out.copy_from_slice(&texel[0].to_ne_bytes()),
                }
            }
        }
    }

    fn create_program(&self, _vertex_src: &str, _fragment_src: &str) -> Result<ProgramId, GpuError> {
        let mut state = self.lock();
        if let Some(log) = state.shader_failure.take() {
            return Err(GpuError::Shader { stage: "fragment", log });
        }
        let id = ProgramId(state.name());
        state.programs.insert(id);
        Ok(id)
    }

    fn delete_program(&self, program: ProgramId) {
        self.lock().programs.remove(&program);
    }

    fn create_quad(&self, _positions: &[f32]) -> Result<QuadId, GpuError> {
        let mut state = self.lock();
        let id = QuadId(state.name());
        state.quads.insert(id);
        Ok(id)
    }

    fn delete_quad(&self, quad: QuadId) {
        self.lock().quads.remove(&quad);
    }

    fn draw_quad(&self, program: ProgramId, quad: QuadId, input: TextureId, width: u32, height: u32) {
        let mut state = self.lock();
        if !state.programs.contains(&program) || !state.quads.contains(&quad) {
            return;
        }
        state.stats.quad_draws += 1;
        let Some(src) = state.textures.get(&input).cloned() else { return };
        let Some(dst) = state
            .bound_attachment(false)
            .and_then(|id| state.textures.get_mut(&id))
        else {
            return;
        };
        let w = width.min(src.width).min(dst.width);
        let h = height.min(src.height).min(dst.height);
        for y in 0..h {
            for x in 0..w {
                let value = src.texels[(y * src.width + x) as usize][0];
                dst.write((y * dst.width + x) as usize, [value, 0.0, 0.0, 1.0]);
            }
        }
    }
}
