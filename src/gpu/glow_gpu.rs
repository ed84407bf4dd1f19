//! OpenGL backend of the GPU seam.

use super::{
    Attachment, FramebufferId, Gpu, GpuError, ProgramId, QuadId, ReadFormat, TextureFormat,
    TextureId, shaders,
};
use crate::core::Viewport;
use eframe::glow::{self, HasContext};
use log::{error, trace};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// `Gpu` over a shared `glow` context.
///
/// Whether a handle is still a texture is asked of the driver, so a texture
/// deleted through raw GL in a draw callback is replaced on the next frame.
/// `glow` has no `glGetTexLevelParameteriv`; dimensions are the ones recorded
/// at allocation.
pub struct GlowGpu {
    gl: Arc<glow::Context>,
    texture_sizes: Mutex<HashMap<TextureId, (u32, u32)>>,
    quads: Mutex<HashMap<QuadId, (glow::VertexArray, glow::Buffer)>>,
}

impl GlowGpu {
    pub fn new(gl: Arc<glow::Context>) -> Self {
        trace!("GlowGpu::new()");
        Self {
            gl,
            texture_sizes: Mutex::new(HashMap::new()),
            quads: Mutex::new(HashMap::new()),
        }
    }

    /// Underlying context, for draw callbacks issuing their own GL calls
    pub fn context(&self) -> &Arc<glow::Context> {
        &self.gl
    }

    fn compile_stage(&self, stage: u32, name: &'static str, src: &str) -> Result<glow::Shader, GpuError> {
        let gl = &self.gl;
        unsafe {
            let shader = gl.create_shader(stage).map_err(|reason| GpuError::Create {
                what: "shader",
                reason,
            })?;
            gl.shader_source(shader, src);
            gl.compile_shader(shader);
            if !gl.get_shader_compile_status(shader) {
                let log = gl.get_shader_info_log(shader);
                gl.delete_shader(shader);
                return Err(GpuError::Shader { stage: name, log });
            }
            Ok(shader)
        }
    }
}

fn texture_layout(format: TextureFormat) -> (u32, u32, u32) {
    match format {
        TextureFormat::Rgba8 => (glow::RGBA8, glow::RGBA, glow::UNSIGNED_BYTE),
        TextureFormat::RgbaF32 => (glow::RGBA32F, glow::RGBA, glow::FLOAT),
        TextureFormat::RgbF32 => (glow::RGB32F, glow::RGB, glow::FLOAT),
        TextureFormat::R32F => (glow::R32F, glow::RED, glow::FLOAT),
        TextureFormat::Depth24 => (glow::DEPTH_COMPONENT24, glow::DEPTH_COMPONENT, glow::UNSIGNED_INT),
        TextureFormat::Depth24Stencil8 => {
            (glow::DEPTH24_STENCIL8, glow::DEPTH_STENCIL, glow::UNSIGNED_INT_24_8)
        }
        TextureFormat::DepthF32 => (glow::DEPTH_COMPONENT32F, glow::DEPTH_COMPONENT, glow::FLOAT),
    }
}

fn read_layout(format: ReadFormat) -> (u32, u32) {
    match format {
        ReadFormat::RgbaU8 => (glow::RGBA, glow::UNSIGNED_BYTE),
        ReadFormat::RgbaF32 => (glow::RGBA, glow::FLOAT),
        ReadFormat::RgbF32 => (glow::RGB, glow::FLOAT),
        ReadFormat::DepthF32 => (glow::DEPTH_COMPONENT, glow::FLOAT),
    }
}

fn native_texture(id: TextureId) -> glow::Texture {
    glow::NativeTexture(id.0)
}

fn native_framebuffer(id: FramebufferId) -> glow::Framebuffer {
    glow::NativeFramebuffer(id.0)
}

fn native_program(id: ProgramId) -> glow::Program {
    glow::NativeProgram(id.0)
}

impl Gpu for GlowGpu {
    fn max_texture_size(&self) -> u32 {
        unsafe { self.gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE).max(0) as u32 }
    }

    fn create_texture(
        &self,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<TextureId, GpuError> {
        let gl = &self.gl;
        let (internal, layout, ty) = texture_layout(format);
        unsafe {
            let texture = gl.create_texture().map_err(|reason| GpuError::Create {
                what: "texture",
                reason,
            })?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
            if format.is_depth() {
                gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_COMPARE_FUNC, glow::LEQUAL as i32);
                gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_COMPARE_MODE, glow::NONE as i32);
            }
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                internal as i32,
                width as i32,
                height as i32,
                0,
                layout,
                ty,
                glow::PixelUnpackData::Slice(None),
            );
            gl.bind_texture(glow::TEXTURE_2D, None);

            let id = TextureId(texture.0);
            if let Ok(mut sizes) = self.texture_sizes.lock() {
                sizes.insert(id, (width, height));
            }
            Ok(id)
        }
    }

    fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        if !unsafe { self.gl.is_texture(native_texture(texture)) } {
            return None;
        }
        self.texture_sizes.lock().ok()?.get(&texture).copied()
    }

    fn delete_texture(&self, texture: TextureId) {
        if let Ok(mut sizes) = self.texture_sizes.lock() {
            sizes.remove(&texture);
        }
        unsafe { self.gl.delete_texture(native_texture(texture)) }
    }

    fn create_framebuffer(&self) -> Result<FramebufferId, GpuError> {
        let fbo = unsafe { self.gl.create_framebuffer() }.map_err(|reason| GpuError::Create {
            what: "framebuffer",
            reason,
        })?;
        Ok(FramebufferId(fbo.0))
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        unsafe { self.gl.delete_framebuffer(native_framebuffer(framebuffer)) }
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>) {
        unsafe {
            self.gl
                .bind_framebuffer(glow::FRAMEBUFFER, framebuffer.map(native_framebuffer))
        }
    }

    fn attach_texture(&self, attachment: Attachment, texture: TextureId) {
        let point = match attachment {
            Attachment::Color0 => glow::COLOR_ATTACHMENT0,
            Attachment::Depth => glow::DEPTH_ATTACHMENT,
            Attachment::DepthStencil => glow::DEPTH_STENCIL_ATTACHMENT,
        };
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                point,
                glow::TEXTURE_2D,
                Some(native_texture(texture)),
                0,
            );
        }
    }

    fn draw_to_color0(&self) {
        unsafe { self.gl.draw_buffers(&[glow::COLOR_ATTACHMENT0]) }
    }

    fn clear_color(&self) -> [f32; 4] {
        let mut color = [0.0f32; 4];
        unsafe { self.gl.get_parameter_f32_slice(glow::COLOR_CLEAR_VALUE, &mut color) };
        color
    }

    fn set_clear_color(&self, color: [f32; 4]) {
        unsafe { self.gl.clear_color(color[0], color[1], color[2], color[3]) }
    }

    fn set_pack_row_length(&self, pixels: u32) {
        unsafe { self.gl.pixel_store_i32(glow::PACK_ROW_LENGTH, pixels as i32) }
    }

    fn read_pixels(&self, rect: Viewport, format: ReadFormat, dst: &mut [u8]) {
        let (layout, ty) = read_layout(format);
        unsafe {
            self.gl.read_pixels(
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                layout,
                ty,
                glow::PixelPackData::Slice(Some(dst)),
            );
        }
    }

    fn create_program(&self, vertex_src: &str, fragment_src: &str) -> Result<ProgramId, GpuError> {
        let gl = &self.gl;
        let vertex = self.compile_stage(glow::VERTEX_SHADER, "vertex", vertex_src)?;
        let fragment = match self.compile_stage(glow::FRAGMENT_SHADER, "fragment", fragment_src) {
            Ok(shader) => shader,
            Err(e) => {
                unsafe { gl.delete_shader(vertex) };
                return Err(e);
            }
        };

        unsafe {
            let program = match gl.create_program() {
                Ok(p) => p,
                Err(reason) => {
                    gl.delete_shader(vertex);
                    gl.delete_shader(fragment);
                    return Err(GpuError::Create { what: "program", reason });
                }
            };
            gl.attach_shader(program, vertex);
            gl.attach_shader(program, fragment);
            gl.link_program(program);

            let linked = gl.get_program_link_status(program);
            gl.detach_shader(program, vertex);
            gl.detach_shader(program, fragment);
            gl.delete_shader(vertex);
            gl.delete_shader(fragment);

            if !linked {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                error!("Depth-copy program failed to link");
                return Err(GpuError::Link { log });
            }

            gl.use_program(Some(program));
            if let Some(loc) = gl.get_uniform_location(program, shaders::DEPTH_SAMPLER_UNIFORM) {
                gl.uniform_1_i32(Some(&loc), 0);
            }
            gl.use_program(None);

            Ok(ProgramId(program.0))
        }
    }

    fn delete_program(&self, program: ProgramId) {
        unsafe { self.gl.delete_program(native_program(program)) }
    }

    fn create_quad(&self, positions: &[f32]) -> Result<QuadId, GpuError> {
        let gl = &self.gl;
        unsafe {
            let vao = gl.create_vertex_array().map_err(|reason| GpuError::Create {
                what: "vertex array",
                reason,
            })?;
            let vbo = match gl.create_buffer() {
                Ok(b) => b,
                Err(reason) => {
                    gl.delete_vertex_array(vao);
                    return Err(GpuError::Create { what: "vertex buffer", reason });
                }
            };
            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(positions),
                glow::STATIC_DRAW,
            );
            let stride = 2 * std::mem::size_of::<f32>() as i32;
            gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, stride, 0);
            gl.enable_vertex_attrib_array(0);
            gl.bind_vertex_array(None);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);

            let id = QuadId(vao.0);
            if let Ok(mut quads) = self.quads.lock() {
                quads.insert(id, (vao, vbo));
            }
            Ok(id)
        }
    }

    fn delete_quad(&self, quad: QuadId) {
        let entry = self.quads.lock().ok().and_then(|mut q| q.remove(&quad));
        if let Some((vao, vbo)) = entry {
            unsafe {
                self.gl.delete_vertex_array(vao);
                self.gl.delete_buffer(vbo);
            }
        }
    }

    fn draw_quad(&self, program: ProgramId, quad: QuadId, input: TextureId, width: u32, height: u32) {
        let Some((vao, _)) = self.quads.lock().ok().and_then(|q| q.get(&quad).copied()) else {
            error!("draw_quad: unknown quad {}", quad);
            return;
        };
        let gl = &self.gl;
        unsafe {
            let mut saved = [0i32; 4];
            gl.get_parameter_i32_slice(glow::VIEWPORT, &mut saved);
            gl.viewport(0, 0, width as i32, height as i32);
            gl.use_program(Some(native_program(program)));
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(native_texture(input)));
            gl.bind_vertex_array(Some(vao));
            gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
            gl.bind_vertex_array(None);
            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.use_program(None);
            gl.viewport(saved[0], saved[1], saved[2], saved[3]);
        }
    }
}

impl std::fmt::Debug for GlowGpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let textures = self.texture_sizes.lock().map(|t| t.len()).unwrap_or(0);
        f.debug_struct("GlowGpu").field("textures", &textures).finish()
    }
}
