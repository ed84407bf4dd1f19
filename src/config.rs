//! Render layer configuration.
//!
//! Selects the texture formats of the render targets and the compression
//! backend. Stored as JSON; missing fields take their defaults.

use crate::gpu::TextureFormat;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Color render target storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ColorTargetFormat {
    #[default]
    Rgba8,
    RgbaF32,
    RgbF32,
}

impl ColorTargetFormat {
    pub fn texture_format(self) -> TextureFormat {
        match self {
            ColorTargetFormat::Rgba8 => TextureFormat::Rgba8,
            ColorTargetFormat::RgbaF32 => TextureFormat::RgbaF32,
            ColorTargetFormat::RgbF32 => TextureFormat::RgbF32,
        }
    }
}

/// Depth render target storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DepthTargetFormat {
    Depth24,
    Depth24Stencil8,
    #[default]
    DepthF32,
}

impl DepthTargetFormat {
    pub fn texture_format(self) -> TextureFormat {
        match self {
            DepthTargetFormat::Depth24 => TextureFormat::Depth24,
            DepthTargetFormat::Depth24Stencil8 => TextureFormat::Depth24Stencil8,
            DepthTargetFormat::DepthF32 => TextureFormat::DepthF32,
        }
    }
}

/// Where active-pixel compression runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CompressionKind {
    /// Read back dense, compress on the CPU
    #[default]
    Cpu,
    /// Compress on the GPU from the render targets
    Gpu,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Gl3Config {
    pub color_target: ColorTargetFormat,
    pub depth_target: DepthTargetFormat,
    pub compression: CompressionKind,
    /// Ask the core for the compressed buffer instead of a dense readback
    pub compressed_readback: bool,
}

impl Gl3Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
