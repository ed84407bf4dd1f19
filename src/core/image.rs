//! Dense images exchanged with the compositing core.
//!
//! Pixel (x, y) lives at index `x + width * y`, row 0 at the bottom, matching
//! OpenGL readback order.

use serde::{Deserialize, Serialize};

/// Axis-aligned integer rectangle: x, y, width, height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Whole-image rectangle
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    /// Row-major pixel index of the rectangle's origin in an image `image_width` wide
    pub fn pixel_offset(&self, image_width: usize) -> usize {
        self.x.max(0) as usize + image_width * self.y.max(0) as usize
    }

    /// True if the rectangle lies inside a `width` x `height` image
    pub fn fits_within(&self, width: usize, height: usize) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.width >= 0
            && self.height >= 0
            && (self.x + self.width) as usize <= width
            && (self.y + self.height) as usize <= height
    }
}

impl From<[i32; 4]> for Viewport {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// Color layout of an image. Codes are shared with the core's image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorFormat {
    None,
    RgbaUbyte,
    RgbaFloat,
    RgbFloat,
    /// A format this build does not know how to store
    Unknown(u32),
}

impl ColorFormat {
    pub fn code(self) -> u32 {
        match self {
            ColorFormat::None => 0xC000,
            ColorFormat::RgbaUbyte => 0xC001,
            ColorFormat::RgbaFloat => 0xC002,
            ColorFormat::RgbFloat => 0xC003,
            ColorFormat::Unknown(code) => code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            0xC000 => ColorFormat::None,
            0xC001 => ColorFormat::RgbaUbyte,
            0xC002 => ColorFormat::RgbaFloat,
            0xC003 => ColorFormat::RgbFloat,
            other => ColorFormat::Unknown(other),
        }
    }

    /// Bytes per pixel in image storage
    pub fn pixel_size(self) -> usize {
        match self {
            ColorFormat::RgbaUbyte => 4,
            ColorFormat::RgbaFloat => 16,
            ColorFormat::RgbFloat => 12,
            ColorFormat::None | ColorFormat::Unknown(_) => 0,
        }
    }
}

/// Depth layout of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthFormat {
    None,
    Float,
    Unknown(u32),
}

impl DepthFormat {
    pub fn code(self) -> u32 {
        match self {
            DepthFormat::None => 0xD000,
            DepthFormat::Float => 0xD001,
            DepthFormat::Unknown(code) => code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            0xD000 => DepthFormat::None,
            0xD001 => DepthFormat::Float,
            other => DepthFormat::Unknown(other),
        }
    }

    pub fn pixel_size(self) -> usize {
        match self {
            DepthFormat::Float => 4,
            DepthFormat::None | DepthFormat::Unknown(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ColorData {
    None,
    Ubyte(Vec<u8>),
    Float(Vec<f32>),
}

/// Dense color/depth image
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: usize,
    height: usize,
    color_format: ColorFormat,
    depth_format: DepthFormat,
    color: ColorData,
    depth: Option<Vec<f32>>,
}

impl Image {
    /// Color zeroed, depth at the far plane
    pub fn new(width: u32, height: u32, color_format: ColorFormat, depth_format: DepthFormat) -> Self {
        let (width, height) = (width as usize, height as usize);
        let n = width * height;
        let color = match color_format {
            ColorFormat::RgbaUbyte => ColorData::Ubyte(vec![0; n * 4]),
            ColorFormat::RgbaFloat => ColorData::Float(vec![0.0; n * 4]),
            ColorFormat::RgbFloat => ColorData::Float(vec![0.0; n * 3]),
            ColorFormat::None | ColorFormat::Unknown(_) => ColorData::None,
        };
        let depth = (depth_format == DepthFormat::Float).then(|| vec![1.0; n]);
        Self {
            width,
            height,
            color_format,
            depth_format,
            color,
            depth,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn num_pixels(&self) -> usize {
        self.width * self.height
    }

    pub fn color_format(&self) -> ColorFormat {
        self.color_format
    }

    pub fn depth_format(&self) -> DepthFormat {
        self.depth_format
    }

    /// RGBA8 color, one `u32` worth of bytes per pixel
    pub fn color_ubyte(&self) -> Option<&[u8]> {
        match &self.color {
            ColorData::Ubyte(c) => Some(c),
            _ => None,
        }
    }

    /// Float color, 4 or 3 components per pixel depending on the format
    pub fn color_float(&self) -> Option<&[f32]> {
        match &self.color {
            ColorData::Float(c) => Some(c),
            _ => None,
        }
    }

    pub fn depth(&self) -> Option<&[f32]> {
        self.depth.as_deref()
    }

    /// Raw color storage as bytes
    pub fn color_bytes(&self) -> Option<&[u8]> {
        match &self.color {
            ColorData::None => None,
            ColorData::Ubyte(c) => Some(c),
            ColorData::Float(c) => Some(bytemuck::cast_slice(c)),
        }
    }

    pub fn color_bytes_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.color {
            ColorData::None => None,
            ColorData::Ubyte(c) => Some(c),
            ColorData::Float(c) => Some(bytemuck::cast_slice_mut(c)),
        }
    }

    pub fn depth_bytes(&self) -> Option<&[u8]> {
        self.depth.as_deref().map(bytemuck::cast_slice)
    }

    pub fn depth_bytes_mut(&mut self) -> Option<&mut [u8]> {
        self.depth.as_deref_mut().map(bytemuck::cast_slice_mut)
    }

    /// Color of pixel `index` as normalised RGBA (RGB images report alpha 1)
    pub fn color_at(&self, index: usize) -> Option<[f32; 4]> {
        match (&self.color, self.color_format) {
            (ColorData::Ubyte(c), _) => {
                let p = c.get(index * 4..index * 4 + 4)?;
                Some([p[0], p[1], p[2], p[3]].map(|v| v as f32 / 255.0))
            }
            (ColorData::Float(c), ColorFormat::RgbFloat) => {
                let p = c.get(index * 3..index * 3 + 3)?;
                Some([p[0], p[1], p[2], 1.0])
            }
            (ColorData::Float(c), _) => {
                let p = c.get(index * 4..index * 4 + 4)?;
                Some([p[0], p[1], p[2], p[3]])
            }
            (ColorData::None, _) => None,
        }
    }

    pub fn depth_at(&self, index: usize) -> Option<f32> {
        self.depth.as_ref()?.get(index).copied()
    }

    /// Store normalised RGBA into pixel `index`
    pub fn set_color_at(&mut self, index: usize, rgba: [f32; 4]) {
        match &mut self.color {
            ColorData::Ubyte(c) => {
                if let Some(p) = c.get_mut(index * 4..index * 4 + 4) {
                    for (dst, v) in p.iter_mut().zip(rgba) {
                        *dst = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
                    }
                }
            }
            ColorData::Float(c) => {
                let n = if self.color_format == ColorFormat::RgbFloat { 3 } else { 4 };
                if let Some(p) = c.get_mut(index * n..index * n + n) {
                    p.copy_from_slice(&rgba[..n]);
                }
            }
            ColorData::None => {}
        }
    }

    pub fn set_depth_at(&mut self, index: usize, depth: f32) {
        if let Some(d) = self.depth.as_mut().and_then(|d| d.get_mut(index)) {
            *d = depth;
        }
    }

    /// Set every pixel
    pub fn fill(&mut self, rgba: [f32; 4], depth: f32) {
        for i in 0..self.num_pixels() {
            self.set_color_at(i, rgba);
            self.set_depth_at(i, depth);
        }
    }

    /// Reset pixels outside `region` to `background` color and far depth
    pub fn clear_around_region(&mut self, region: Viewport, background: [f32; 4]) {
        for y in 0..self.height {
            for x in 0..self.width {
                if region.contains(x as i32, y as i32) {
                    continue;
                }
                let i = x + self.width * y;
                self.set_color_at(i, background);
                self.set_depth_at(i, 1.0);
            }
        }
    }

    /// 8-bit RGBA copy, rows top-down, for encoding to common image files
    pub fn to_rgba8_top_down(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.num_pixels() * 4);
        for y in (0..self.height).rev() {
            for x in 0..self.width {
                let rgba = self.color_at(x + self.width * y).unwrap_or([0.0; 4]);
                out.extend(rgba.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_offset() {
        assert_eq!(Viewport::new(10, 20, 5, 5).pixel_offset(100), 2010);
        assert_eq!(Viewport::new(0, 0, 5, 5).pixel_offset(100), 0);
        assert_eq!(Viewport::new(3, 0, 1, 1).pixel_offset(64), 3);
        assert_eq!(Viewport::new(0, 7, 1, 1).pixel_offset(64), 448);
    }

    #[test]
    fn test_fits_within() {
        assert!(Viewport::new(0, 0, 8, 8).fits_within(8, 8));
        assert!(!Viewport::new(1, 0, 8, 8).fits_within(8, 8));
        assert!(!Viewport::new(-1, 0, 2, 2).fits_within(8, 8));
    }

    #[test]
    fn test_clear_around_region() {
        let mut image = Image::new(4, 4, ColorFormat::RgbaUbyte, DepthFormat::Float);
        image.fill([1.0, 1.0, 1.0, 1.0], 0.5);
        image.clear_around_region(Viewport::new(1, 1, 2, 2), [0.0, 0.0, 1.0, 0.0]);

        assert_eq!(image.color_at(0), Some([0.0, 0.0, 1.0, 0.0]));
        assert_eq!(image.depth_at(0), Some(1.0));
        // (1, 1) is inside
        assert_eq!(image.color_at(5), Some([1.0, 1.0, 1.0, 1.0]));
        assert_eq!(image.depth_at(5), Some(0.5));
        // (3, 2) is outside
        assert_eq!(image.depth_at(11), Some(1.0));
    }

    #[test]
    fn test_rgb_float_layout() {
        let mut image = Image::new(2, 1, ColorFormat::RgbFloat, DepthFormat::None);
        image.set_color_at(1, [0.25, 0.5, 0.75, 0.0]);
        assert_eq!(image.color_float(), Some(&[0.0, 0.0, 0.0, 0.25, 0.5, 0.75][..]));
        assert_eq!(image.color_at(1), Some([0.25, 0.5, 0.75, 1.0]));
        assert!(image.depth().is_none());
        assert_eq!(image.color_bytes().map(|b| b.len()), Some(24));
    }

    #[test]
    fn test_format_codes() {
        assert_eq!(ColorFormat::from_code(ColorFormat::RgbaFloat.code()), ColorFormat::RgbaFloat);
        assert_eq!(ColorFormat::from_code(0xC0FF), ColorFormat::Unknown(0xC0FF));
        assert_eq!(DepthFormat::from_code(0xD001), DepthFormat::Float);
    }
}
