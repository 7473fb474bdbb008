//! Cascade geometry derived from the scene size and probe configuration

use glam::UVec2;
use penumbra_core::{Error, Result};

/// Accepted angular branching factors
pub const BASE_RAY_COUNTS: [u32; 3] = [4, 16, 64];
/// Accepted cascade-0 probe spacings, in pixels
pub const PROBE_SPACINGS: [u32; 5] = [1, 2, 4, 8, 16];

/// Cascades needed for rays of cascade `n - 1` to span the scene diagonal:
/// `ceil(ln(diagonal) / ln(base)) + 1`.
pub fn cascade_count(width: u32, height: u32, base_ray_count: u32) -> u32 {
    let diagonal = (width as f64).hypot(height as f64);
    (diagonal.ln() / (base_ray_count as f64).ln()).ceil().max(0.0) as u32 + 1
}

/// Geometry shared by every cascade of one configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeLayout {
    pub scene_size: UVec2,
    pub base_ray_count: u32,
    /// Pixels between cascade-0 probes
    pub probe_spacing: u32,
    /// Atlas size, identical for every cascade
    pub extent: UVec2,
    /// Natural cascade count for the scene diagonal
    pub count: u32,
}

impl CascadeLayout {
    pub fn new(width: u32, height: u32, base_ray_count: u32, probe_spacing: u32) -> Result<Self> {
        if !BASE_RAY_COUNTS.contains(&base_ray_count) {
            return Err(Error::Config(format!(
                "base ray count must be one of {:?}, got {}",
                BASE_RAY_COUNTS, base_ray_count
            )));
        }
        if !PROBE_SPACINGS.contains(&probe_spacing) {
            return Err(Error::Config(format!(
                "pixels between probes must be one of {:?}, got {}",
                PROBE_SPACINGS, probe_spacing
            )));
        }
        let extent = UVec2::new(width / probe_spacing, height / probe_spacing);
        if extent.x == 0 || extent.y == 0 {
            return Err(Error::Config(format!(
                "scene {}x{} is smaller than the probe spacing {}",
                width, height, probe_spacing
            )));
        }
        Ok(Self {
            scene_size: UVec2::new(width, height),
            base_ray_count,
            probe_spacing,
            extent,
            count: cascade_count(width, height, base_ray_count),
        })
    }

    /// `sqrt(base_ray_count)`: 2, 4 or 8.
    pub fn spacing_base(&self) -> u32 {
        match self.base_ray_count {
            4 => 2,
            16 => 4,
            _ => 8,
        }
    }

    pub fn level(&self, index: u32) -> CascadeLevel {
        let spacing = self.spacing_base().saturating_pow(index);
        CascadeLevel {
            index,
            ray_count: self.base_ray_count.saturating_pow(index + 1),
            spacing,
            probe_grid: self.extent / spacing,
        }
    }

    /// Radial interval of cascade `index` in pixels.
    pub fn interval(&self, index: u32, ray_interval: f32, overlap: f32) -> Interval {
        let base = self.base_ray_count as f32;
        let modifier = if self.base_ray_count < 16 {
            self.probe_spacing as f32
        } else {
            self.spacing_base() as f32
        };
        let scaled = modifier * ray_interval;
        let start = if index == 0 { 0.0 } else { base.powi(index as i32 - 1) };
        let length = (1.0 + 3.0 * overlap) * base.powi(index as i32) - (index * index) as f32;
        Interval {
            start: start * scaled,
            length: length * scaled,
        }
    }
}

/// Derived attributes of one cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeLevel {
    pub index: u32,
    /// Directions per probe: `base^(index + 1)`
    pub ray_count: u32,
    /// Probe grid cell size relative to cascade 0: `sqrt(base)^index`
    pub spacing: u32,
    /// Probes per atlas block: `floor(extent / spacing)`
    pub probe_grid: UVec2,
}

impl CascadeLevel {
    /// True when the atlas cannot hold a single probe per block.
    pub fn is_degenerate(&self) -> bool {
        self.probe_grid.x == 0 || self.probe_grid.y == 0
    }
}

/// Start offset and travel length of a cascade's rays, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: f32,
    pub length: f32,
}
