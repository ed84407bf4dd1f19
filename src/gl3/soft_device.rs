//! Active-pixel device over [`SoftGpu`] textures.
//!
//! Encodes on the CPU from the software device's texel storage and records
//! every registration and allocation in an [`EventLog`], so callers can check
//! the order in which the layer drives a device.

use super::compress::{
    ActivePixelDevice, CompressRequest, CompressStats, DeviceBuffer, DeviceError, RegisteredTexture,
};
use crate::core::sparse::ActivePixelEncoder;
use crate::gpu::{Gpu, SoftGpu, TextureId};
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Register { handle: RegisteredTexture, texture: TextureId },
    Unregister { handle: RegisteredTexture },
    AllocateDevice { buffer: DeviceBuffer, bytes: usize },
    FreeDevice { buffer: DeviceBuffer },
    AllocateHost { bytes: usize },
    FreeHost { bytes: usize },
    Compress { active_pixels: usize },
}

/// Shared, append-only record of device calls
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<DeviceEvent>>>);

impl EventLog {
    fn lock(&self) -> MutexGuard<'_, Vec<DeviceEvent>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, event: DeviceEvent) {
        trace!("SoftActivePixel: {:?}", event);
        self.lock().push(event);
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Registrations currently live, in registration order
    pub fn live_registrations(&self) -> Vec<RegisteredTexture> {
        let mut live = Vec::new();
        for event in self.lock().iter() {
            match event {
                DeviceEvent::Register { handle, .. } => live.push(*handle),
                DeviceEvent::Unregister { handle } => live.retain(|h| h != handle),
                _ => {}
            }
        }
        live
    }
}

pub struct SoftActivePixel {
    gpu: Arc<SoftGpu>,
    next_handle: u64,
    textures: HashMap<RegisteredTexture, TextureId>,
    buffers: HashMap<DeviceBuffer, usize>,
    log: EventLog,
    fail_next: Option<String>,
}

impl SoftActivePixel {
    pub fn new(gpu: Arc<SoftGpu>) -> Self {
        Self {
            gpu,
            next_handle: 0,
            textures: HashMap::new(),
            buffers: HashMap::new(),
            log: EventLog::default(),
            fail_next: None,
        }
    }

    pub fn event_log(&self) -> EventLog {
        self.log.clone()
    }

    /// Make the next `compress` call fail
    pub fn fail_next_compress(&mut self, reason: impl Into<String>) {
        self.fail_next = Some(reason.into());
    }

    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn texture(&self, handle: RegisteredTexture) -> Result<(TextureId, Vec<[f32; 4]>, u32), DeviceError> {
        let texture = *self
            .textures
            .get(&handle)
            .ok_or_else(|| DeviceError(format!("texture handle {} is not registered", handle.0)))?;
        let texels = self
            .gpu
            .texels(texture)
            .ok_or_else(|| DeviceError(format!("registered texture {} no longer exists", texture)))?;
        let (width, _) = self.gpu.texture_size(texture).unwrap_or((0, 0));
        Ok((texture, texels, width))
    }
}

impl ActivePixelDevice for SoftActivePixel {
    fn name(&self) -> &str {
        "SoftActivePixel"
    }

    fn register_texture(&mut self, texture: TextureId) -> Result<RegisteredTexture, DeviceError> {
        if self.gpu.texture_size(texture).is_none() {
            return Err(DeviceError(format!("cannot register deleted texture {}", texture)));
        }
        let handle = RegisteredTexture(self.handle());
        self.textures.insert(handle, texture);
        self.log.push(DeviceEvent::Register { handle, texture });
        Ok(handle)
    }

    fn unregister_texture(&mut self, handle: RegisteredTexture) {
        if self.textures.remove(&handle).is_some() {
            self.log.push(DeviceEvent::Unregister { handle });
        }
    }

    fn allocate_device(&mut self, bytes: usize) -> Result<DeviceBuffer, DeviceError> {
        let buffer = DeviceBuffer(self.handle());
        self.buffers.insert(buffer, bytes);
        self.log.push(DeviceEvent::AllocateDevice { buffer, bytes });
        Ok(buffer)
    }

    fn free_device(&mut self, buffer: DeviceBuffer) {
        if self.buffers.remove(&buffer).is_some() {
            self.log.push(DeviceEvent::FreeDevice { buffer });
        }
    }

    fn allocate_host(&mut self, bytes: usize) -> Result<Vec<u8>, DeviceError> {
        self.log.push(DeviceEvent::AllocateHost { bytes });
        Ok(vec![0; bytes])
    }

    fn free_host(&mut self, buffer: Vec<u8>) {
        self.log.push(DeviceEvent::FreeHost { bytes: buffer.len() });
    }

    fn compress(&mut self, request: &CompressRequest, out: &mut [u8]) -> Result<CompressStats, DeviceError> {
        if let Some(reason) = self.fail_next.take() {
            return Err(DeviceError(reason));
        }
        let start = Instant::now();
        let working = self
            .buffers
            .get(&request.working)
            .copied()
            .ok_or_else(|| DeviceError("working buffer not allocated".into()))?;
        let tile_pixels = request.tile_width as usize * request.tile_height as usize;
        if working < tile_pixels * 8 {
            return Err(DeviceError(format!(
                "working buffer of {} bytes too small for a {}x{} tile",
                working, request.tile_width, request.tile_height
            )));
        }

        let (_, color, color_width) = self.texture(request.color)?;
        let (_, depth, depth_width) = self.texture(request.depth)?;
        let (rendered, target) = (request.rendered, request.target);

        let mut encoder = ActivePixelEncoder::new(out);
        let mut active_pixels = 0;
        for y in 0..request.tile_height as i32 {
            for x in 0..request.tile_width as i32 {
                let source = target.contains(x, y).then(|| (rendered.x + x - target.x, rendered.y + y - target.y));
                let pixel = source.and_then(|(sx, sy)| {
                    if sx < 0 || sy < 0 {
                        return None;
                    }
                    let c = color.get(sy as usize * color_width as usize + sx as usize)?;
                    let d = depth.get(sy as usize * depth_width as usize + sx as usize)?[0];
                    (d < 1.0).then_some((*c, d))
                });
                match pixel {
                    Some((rgba, d)) => {
                        let bytes = rgba.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8);
                        encoder.push_active(&bytes, Some(d));
                        active_pixels += 1;
                    }
                    None => encoder.push_inactive(1),
                }
            }
        }
        let payload_bytes = encoder.finish();
        self.log.push(DeviceEvent::Compress { active_pixels });

        Ok(CompressStats {
            payload_bytes,
            compute_seconds: start.elapsed().as_secs_f64(),
            transfer_seconds: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Viewport;
    use crate::gpu::{Attachment, TextureFormat};

    #[test]
    fn test_unregister_is_logged_once() {
        let gpu = Arc::new(SoftGpu::new());
        let texture = gpu.create_texture(TextureFormat::Rgba8, 2, 2).unwrap();
        let mut device = SoftActivePixel::new(gpu);
        let log = device.event_log();

        let handle = device.register_texture(texture).unwrap();
        assert_eq!(log.live_registrations(), vec![handle]);
        device.unregister_texture(handle);
        device.unregister_texture(handle);
        assert!(log.live_registrations().is_empty());
        assert_eq!(log.events().len(), 2);
    }

    #[test]
    fn test_compress_offsets_rendered_into_target() {
        let gpu = Arc::new(SoftGpu::new());
        let color = gpu.create_texture(TextureFormat::Rgba8, 4, 4).unwrap();
        let depth = gpu.create_texture(TextureFormat::R32F, 4, 4).unwrap();
        let fb = gpu.create_framebuffer().unwrap();
        gpu.bind_framebuffer(Some(fb));
        gpu.attach_texture(Attachment::Color0, color);
        gpu.fill_rect(Viewport::new(0, 0, 4, 4), [1.0, 0.0, 0.0, 1.0], 0.0);
        gpu.attach_texture(Attachment::Color0, depth);
        gpu.set_clear_color([1.0, 0.0, 0.0, 0.0]);
        gpu.clear(true, false);
        gpu.fill_rect(Viewport::new(0, 0, 1, 1), [0.5, 0.0, 0.0, 1.0], 0.0);

        let mut device = SoftActivePixel::new(gpu);
        let request = CompressRequest {
            color: device.register_texture(color).unwrap(),
            depth: device.register_texture(depth).unwrap(),
            working: device.allocate_device(4 * 4 * 8).unwrap(),
            rendered: Viewport::new(0, 0, 2, 2),
            target: Viewport::new(2, 2, 2, 2),
            tile_width: 4,
            tile_height: 4,
        };
        let mut out = vec![0u8; 256];
        let stats = device.compress(&request, &mut out).unwrap();

        // only source (0, 0) has depth < 1; it lands at tile (2, 2) = index 10
        let inactive = u32::from_ne_bytes([out[0], out[1], out[2], out[3]]);
        let active = u32::from_ne_bytes([out[4], out[5], out[6], out[7]]);
        assert_eq!((inactive, active), (10, 1));
        assert_eq!(&out[8..12], &[255, 0, 0, 255]);
        assert_eq!(f32::from_ne_bytes([out[12], out[13], out[14], out[15]]), 0.5);
        assert_eq!(stats.payload_bytes, 8 + 8 + 8);
    }
}
