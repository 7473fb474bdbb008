//! Texture pooling for surface reallocation
//!
//! Reconfiguring the pipeline destroys and recreates most surfaces. Released
//! textures are parked here so toggling back to a previous size does not hit
//! the allocator again.

use std::collections::HashMap;
use std::sync::Arc;

use crate::surface::{SurfaceDesc, SurfaceFormat};

/// Usage shared by every surface: sampled input, storage output, copy source/destination
pub const SURFACE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::STORAGE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// Key for texture pool lookup
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
pub struct SurfaceKey {
    pub width: u32,
    pub height: u32,
    pub format: SurfaceFormat,
}

impl SurfaceKey {
    pub fn from_desc(desc: &SurfaceDesc) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            format: desc.format,
        }
    }

    pub fn to_descriptor<'a>(&self, label: Option<&'a str>) -> wgpu::TextureDescriptor<'a> {
        wgpu::TextureDescriptor {
            label,
            size: wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format.wgpu_format(),
            usage: SURFACE_USAGE,
            view_formats: &[],
        }
    }
}

/// Pool for reusing textures
pub struct TexturePool {
    device: Arc<wgpu::Device>,
    available: HashMap<SurfaceKey, Vec<(wgpu::Texture, u64)>>,
}

impl TexturePool {
    /// Parked textures older than this many submissions are dropped
    pub const MAX_AGE: u64 = 120;

    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self {
            device,
            available: HashMap::new(),
        }
    }

    /// Acquire a texture from the pool (or create new one)
    pub fn acquire(&mut self, key: SurfaceKey, label: &str) -> wgpu::Texture {
        if let Some(texture) = self.available.get_mut(&key).and_then(|parked| parked.pop()) {
            log::trace!("Reusing pooled texture {:?} for '{}'", key, label);
            return texture.0;
        }

        log::debug!("Creating new texture {:?} for '{}'", key, label);
        self.device.create_texture(&key.to_descriptor(Some(label)))
    }

    /// Release a texture back to the pool
    pub fn release(&mut self, texture: wgpu::Texture, key: SurfaceKey, frame: u64) {
        self.available.entry(key).or_default().push((texture, frame));
    }

    /// Drop textures that have been parked for too long
    pub fn cleanup_old(&mut self, current_frame: u64) {
        self.available.retain(|_key, parked| {
            parked.retain(|(_, released)| current_frame.saturating_sub(*released) < Self::MAX_AGE);
            !parked.is_empty()
        });
    }

    pub fn parked(&self) -> usize {
        self.available.values().map(Vec::len).sum()
    }
}
