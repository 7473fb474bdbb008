//! Surface descriptors and texel formats

use half::f16;

/// Unique identifier for a backend-owned surface
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub(crate) fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Texel formats used by the pipeline's surfaces
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum SurfaceFormat {
    /// Scene colour + coverage, composited output
    Rgba8Unorm,
    /// Cascade radiance atlases
    Rgba16Float,
    Rgba32Float,
    /// Nearest-seed UV records
    Rg32Float,
    /// Scalar distance field
    R32Float,
}

impl SurfaceFormat {
    pub fn channels(self) -> usize {
        match self {
            SurfaceFormat::Rgba8Unorm | SurfaceFormat::Rgba16Float | SurfaceFormat::Rgba32Float => 4,
            SurfaceFormat::Rg32Float => 2,
            SurfaceFormat::R32Float => 1,
        }
    }

    pub fn bytes_per_texel(self) -> u32 {
        match self {
            SurfaceFormat::Rgba8Unorm | SurfaceFormat::R32Float => 4,
            SurfaceFormat::Rgba16Float | SurfaceFormat::Rg32Float => 8,
            SurfaceFormat::Rgba32Float => 16,
        }
    }

    pub fn wgpu_format(self) -> wgpu::TextureFormat {
        match self {
            SurfaceFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            SurfaceFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            SurfaceFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            SurfaceFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
            SurfaceFormat::R32Float => wgpu::TextureFormat::R32Float,
        }
    }

    /// Round a channel value the way a store into this format would.
    pub fn quantize(self, value: f32) -> f32 {
        match self {
            SurfaceFormat::Rgba8Unorm => (value.clamp(0.0, 1.0) * 255.0).round() / 255.0,
            SurfaceFormat::Rgba16Float => f16::from_f32(value).to_f32(),
            _ => value,
        }
    }

    /// Pack tightly laid out channel values into the format's byte layout.
    pub fn encode(self, values: &[f32]) -> Vec<u8> {
        match self {
            SurfaceFormat::Rgba8Unorm => values
                .iter()
                .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
                .collect(),
            SurfaceFormat::Rgba16Float => values
                .iter()
                .flat_map(|v| f16::from_f32(*v).to_le_bytes())
                .collect(),
            _ => bytemuck::cast_slice(values).to_vec(),
        }
    }

    /// Inverse of [`SurfaceFormat::encode`].
    pub fn decode(self, bytes: &[u8]) -> Vec<f32> {
        match self {
            SurfaceFormat::Rgba8Unorm => bytes.iter().map(|b| *b as f32 / 255.0).collect(),
            SurfaceFormat::Rgba16Float => bytes
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
            _ => bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        }
    }
}

/// How a surface is resampled when read at a different resolution
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

/// Everything needed to allocate a surface
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: SurfaceFormat,
    pub filter: FilterMode,
}

impl SurfaceDesc {
    pub fn new(label: impl Into<String>, width: u32, height: u32, format: SurfaceFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
            filter: FilterMode::Nearest,
        }
    }

    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
