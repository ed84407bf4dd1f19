//! Active-pixel (sparse) image encoding.
//!
//! A sparse image is a byte buffer with a fixed header of [`HEADER_WORDS`]
//! native-endian `u32` words followed by the payload. The payload is a list of
//! runs, each `[inactive: u32][active: u32]` followed by `active` packed
//! pixels (color bytes, then depth bytes). Runs cover the tile in row-major
//! order.
//!
//! GPU compression backends write the payload directly after the header and
//! then record its size with [`SparseImage::set_compressed_payload_size`].

use super::image::{ColorFormat, DepthFormat, Image, Viewport};

pub const MAGIC: u32 = 0x004D_5100;

pub const MAGIC_INDEX: usize = 0;
pub const COLOR_FORMAT_INDEX: usize = 1;
pub const DEPTH_FORMAT_INDEX: usize = 2;
pub const WIDTH_INDEX: usize = 3;
pub const HEIGHT_INDEX: usize = 4;
pub const MAX_NUM_PIXELS_INDEX: usize = 5;
/// Header word holding header bytes + payload bytes
pub const ACTUAL_BUFFER_SIZE_INDEX: usize = 6;
/// First word of the payload
pub const DATA_START_INDEX: usize = 7;

pub const HEADER_WORDS: usize = DATA_START_INDEX;
pub const HEADER_BYTES: usize = HEADER_WORDS * 4;
const RUN_HEADER_BYTES: usize = 8;

/// Packed size of one active pixel
pub fn active_pixel_size(color: ColorFormat, depth: DepthFormat) -> usize {
    color.pixel_size() + depth.pixel_size()
}

/// Whether a pixel carries geometry. Depth decides when present, otherwise alpha.
fn is_active(color: Option<[f32; 4]>, depth: Option<f32>, color_format: ColorFormat) -> bool {
    match (depth, color) {
        (Some(d), _) => d < 1.0,
        (None, Some(c)) if color_format != ColorFormat::RgbFloat => c[3] > 0.0,
        _ => true,
    }
}

/// Sparse image over a reusable byte buffer
#[derive(Debug, Clone, PartialEq)]
pub struct SparseImage {
    buffer: Vec<u8>,
}

impl SparseImage {
    /// Worst-case bytes for a `width` x `height` tile (alternating active and
    /// inactive pixels)
    pub fn buffer_size(color: ColorFormat, depth: DepthFormat, width: u32, height: u32) -> usize {
        let n = width as usize * height as usize;
        HEADER_BYTES + (n / 2 + 1) * RUN_HEADER_BYTES + n * active_pixel_size(color, depth)
    }

    /// Wrap `buffer` as an empty (all inactive) image. Grows the buffer if it
    /// is too small; never shrinks it.
    pub fn assign_buffer(
        buffer: Vec<u8>,
        color: ColorFormat,
        depth: DepthFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let mut image = Self { buffer };
        image.reassign(color, depth, width, height);
        image
    }

    /// Reinitialise the header for a new tile size, keeping the buffer
    pub fn reassign(&mut self, color: ColorFormat, depth: DepthFormat, width: u32, height: u32) {
        let needed = Self::buffer_size(color, depth, width, height);
        if self.buffer.len() < needed {
            self.buffer.resize(needed, 0);
        }
        self.set_word(MAGIC_INDEX, MAGIC);
        self.set_word(COLOR_FORMAT_INDEX, color.code());
        self.set_word(DEPTH_FORMAT_INDEX, depth.code());
        self.set_word(WIDTH_INDEX, width);
        self.set_word(HEIGHT_INDEX, height);
        self.set_word(MAX_NUM_PIXELS_INDEX, width * height);
        let n = width * height;
        let payload = {
            let out = self.payload_mut();
            out[0..4].copy_from_slice(&n.to_ne_bytes());
            out[4..8].copy_from_slice(&0u32.to_ne_bytes());
            RUN_HEADER_BYTES
        };
        self.set_compressed_payload_size(payload);
    }

    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }

    /// Allocated bytes (may exceed what the current tile needs)
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn word(&self, index: usize) -> u32 {
        let at = index * 4;
        u32::from_ne_bytes([
            self.buffer[at],
            self.buffer[at + 1],
            self.buffer[at + 2],
            self.buffer[at + 3],
        ])
    }

    fn set_word(&mut self, index: usize, value: u32) {
        let at = index * 4;
        self.buffer[at..at + 4].copy_from_slice(&value.to_ne_bytes());
    }

    pub fn magic(&self) -> u32 {
        self.word(MAGIC_INDEX)
    }

    pub fn width(&self) -> u32 {
        self.word(WIDTH_INDEX)
    }

    pub fn height(&self) -> u32 {
        self.word(HEIGHT_INDEX)
    }

    pub fn num_pixels(&self) -> usize {
        self.word(MAX_NUM_PIXELS_INDEX) as usize
    }

    pub fn color_format(&self) -> ColorFormat {
        ColorFormat::from_code(self.word(COLOR_FORMAT_INDEX))
    }

    pub fn depth_format(&self) -> DepthFormat {
        DepthFormat::from_code(self.word(DEPTH_FORMAT_INDEX))
    }

    /// Header plus payload bytes
    pub fn actual_size(&self) -> usize {
        self.word(ACTUAL_BUFFER_SIZE_INDEX) as usize
    }

    /// Record a payload written in place by an external encoder
    pub fn set_compressed_payload_size(&mut self, payload_bytes: usize) {
        self.set_word(ACTUAL_BUFFER_SIZE_INDEX, (HEADER_BYTES + payload_bytes) as u32);
    }

    /// Whole writable payload area
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[HEADER_BYTES..]
    }

    /// Encoded payload
    pub fn payload(&self) -> &[u8] {
        let end = self.actual_size().clamp(HEADER_BYTES, self.buffer.len());
        &self.buffer[HEADER_BYTES..end]
    }

    /// Number of active pixels in the payload
    pub fn active_pixels(&self) -> usize {
        let mut total = 0;
        self.for_each_run(|_, active, _| total += active);
        total
    }

    fn for_each_run(&self, mut f: impl FnMut(usize, usize, &[u8])) {
        let pixel_size = active_pixel_size(self.color_format(), self.depth_format());
        let payload = self.payload();
        let mut pos = 0;
        while pos + RUN_HEADER_BYTES <= payload.len() {
            let read = |at: usize| {
                u32::from_ne_bytes([payload[at], payload[at + 1], payload[at + 2], payload[at + 3]]) as usize
            };
            let inactive = read(pos);
            let active = read(pos + 4);
            pos += RUN_HEADER_BYTES;
            let end = (pos + active * pixel_size).min(payload.len());
            f(inactive, active, &payload[pos..end]);
            pos = end;
        }
    }

    /// Expand into a dense image of the same size; inactive pixels become
    /// `background` at far depth
    pub fn decompress_into(&self, image: &mut Image, background: [f32; 4]) {
        let color_format = self.color_format();
        let color_size = color_format.pixel_size();
        let depth_size = self.depth_format().pixel_size();
        let pixel_size = color_size + depth_size;
        let total = self.num_pixels().min(image.num_pixels());
        let mut index = 0;

        self.for_each_run(|inactive, active, pixels| {
            for _ in 0..inactive {
                if index < total {
                    image.set_color_at(index, background);
                    image.set_depth_at(index, 1.0);
                }
                index += 1;
            }
            for p in pixels.chunks_exact(pixel_size.max(1)).take(active) {
                if index < total {
                    if let Some(rgba) = decode_color(color_format, &p[..color_size]) {
                        image.set_color_at(index, rgba);
                    }
                    if depth_size == 4 {
                        image.set_depth_at(index, f32::from_ne_bytes([p[color_size], p[color_size + 1], p[color_size + 2], p[color_size + 3]]));
                    }
                }
                index += 1;
            }
        });
    }
}

fn decode_color(format: ColorFormat, bytes: &[u8]) -> Option<[f32; 4]> {
    let float = |i: usize| f32::from_ne_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]]);
    match format {
        ColorFormat::RgbaUbyte => Some([bytes[0], bytes[1], bytes[2], bytes[3]].map(|v| v as f32 / 255.0)),
        ColorFormat::RgbaFloat => Some([float(0), float(1), float(2), float(3)]),
        ColorFormat::RgbFloat => Some([float(0), float(1), float(2), 1.0]),
        ColorFormat::None | ColorFormat::Unknown(_) => None,
    }
}

/// Streaming run-length writer for the payload area
pub struct ActivePixelEncoder<'a> {
    out: &'a mut [u8],
    pos: usize,
    run_at: usize,
    inactive: u32,
    active: u32,
}

impl<'a> ActivePixelEncoder<'a> {
    /// `out` must be at least `SparseImage::buffer_size(..) - HEADER_BYTES` long
    pub fn new(out: &'a mut [u8]) -> Self {
        Self {
            out,
            pos: RUN_HEADER_BYTES,
            run_at: 0,
            inactive: 0,
            active: 0,
        }
    }

    fn close_run(&mut self) {
        let at = self.run_at;
        self.out[at..at + 4].copy_from_slice(&self.inactive.to_ne_bytes());
        self.out[at + 4..at + 8].copy_from_slice(&self.active.to_ne_bytes());
    }

    pub fn push_inactive(&mut self, count: u32) {
        if count == 0 {
            return;
        }
        if self.active > 0 {
            self.close_run();
            self.run_at = self.pos;
            self.pos += RUN_HEADER_BYTES;
            self.inactive = 0;
            self.active = 0;
        }
        self.inactive += count;
    }

    /// Append one active pixel given its color bytes and optional depth
    pub fn push_active(&mut self, color: &[u8], depth: Option<f32>) {
        let end = self.pos + color.len();
        self.out[self.pos..end].copy_from_slice(color);
        self.pos = end;
        if let Some(d) = depth {
            self.out[self.pos..self.pos + 4].copy_from_slice(&d.to_ne_bytes());
            self.pos += 4;
        }
        self.active += 1;
    }

    /// Close the last run and return the payload size in bytes
    pub fn finish(mut self) -> usize {
        self.close_run();
        self.pos
    }
}

/// Encode `region` of `image` into `out`, whose header already describes the
/// tile. Pixels of the tile outside `region` are inactive. `image` must be at
/// least as large as the tile.
pub fn compress_image_region(image: &Image, region: Viewport, out: &mut SparseImage) {
    let (tile_w, tile_h) = (out.width() as usize, out.height() as usize);
    let color_format = image.color_format();
    let stride = image.width();
    let color = image.color_bytes();
    let color_size = color_format.pixel_size();

    let payload = {
        let mut encoder = ActivePixelEncoder::new(out.payload_mut());
        for y in 0..tile_h {
            for x in 0..tile_w {
                let i = x + stride * y;
                let depth = image.depth_at(i);
                let inside = region.contains(x as i32, y as i32) && x < stride && y < image.height();
                if inside && is_active(image.color_at(i), depth, color_format) {
                    let bytes = color.map(|c| &c[i * color_size..(i + 1) * color_size]).unwrap_or(&[]);
                    encoder.push_active(bytes, depth);
                } else {
                    encoder.push_inactive(1);
                }
            }
        }
        encoder.finish()
    };
    out.set_compressed_payload_size(payload);
}
