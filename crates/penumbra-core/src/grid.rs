//! Host-side pixel grids
//!
//! A [`Grid`] holds a surface's texels as tightly packed `f32` channels. It is
//! the storage of the CPU backend and the transfer type for uploads and
//! readbacks on the GPU backend.

use glam::{IVec2, Vec2, Vec4};

use crate::surface::{FilterMode, SurfaceFormat};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: u32,
    height: u32,
    format: SurfaceFormat,
    data: Vec<f32>,
}

impl Grid {
    /// Zero-filled grid.
    pub fn new(width: u32, height: u32, format: SurfaceFormat) -> Self {
        let len = width as usize * height as usize * format.channels();
        Self {
            width,
            height,
            format,
            data: vec![0.0; len],
        }
    }

    pub fn from_data(width: u32, height: u32, format: SurfaceFormat, data: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(Error::Binding(format!(
                "grid data has {} values, {}x{} {:?} needs {}",
                data.len(),
                width,
                height,
                format,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> IVec2 {
        IVec2::new(self.width as i32, self.height as i32)
    }

    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.channels()
    }

    /// Texel fetch. Out-of-range coordinates read as zero; channels the
    /// format lacks read as `g = b = 0, a = 1`.
    pub fn load(&self, x: i32, y: i32) -> Vec4 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return Vec4::ZERO;
        }
        let at = self.offset(x as u32, y as u32);
        let texel = &self.data[at..at + self.format.channels()];
        match texel {
            [r] => Vec4::new(*r, 0.0, 0.0, 1.0),
            [r, g] => Vec4::new(*r, *g, 0.0, 1.0),
            [r, g, b, a] => Vec4::new(*r, *g, *b, *a),
            _ => Vec4::ZERO,
        }
    }

    /// Store a texel, quantized to the grid's format. Extra channels are dropped.
    pub fn store(&mut self, x: u32, y: u32, value: Vec4) {
        if x >= self.width || y >= self.height {
            return;
        }
        let format = self.format;
        let at = self.offset(x, y);
        let channels = format.channels();
        let value = value.to_array();
        for (dst, src) in self.data[at..at + channels].iter_mut().zip(value) {
            *dst = format.quantize(src);
        }
    }

    pub fn fill(&mut self, value: Vec4) {
        for y in 0..self.height {
            for x in 0..self.width {
                self.store(x, y, value);
            }
        }
    }

    fn clamped(&self, p: IVec2) -> Vec4 {
        let p = p.clamp(IVec2::ZERO, self.size() - IVec2::ONE);
        self.load(p.x, p.y)
    }

    /// Nearest texel to a normalized position.
    pub fn sample_nearest(&self, uv: Vec2) -> Vec4 {
        let size = self.size().as_vec2();
        self.clamped((uv * size).floor().as_ivec2())
    }

    /// Bilinear sample between texel centres with clamp-to-edge addressing.
    pub fn sample_bilinear(&self, uv: Vec2) -> Vec4 {
        let p = uv * self.size().as_vec2() - 0.5;
        let base = p.floor();
        let f = p - base;
        let base = base.as_ivec2();
        let top = self
            .clamped(base)
            .lerp(self.clamped(base + IVec2::new(1, 0)), f.x);
        let bottom = self
            .clamped(base + IVec2::new(0, 1))
            .lerp(self.clamped(base + IVec2::ONE), f.x);
        top.lerp(bottom, f.y)
    }

    pub fn sample(&self, uv: Vec2, filter: FilterMode) -> Vec4 {
        match filter {
            FilterMode::Nearest => self.sample_nearest(uv),
            FilterMode::Linear => self.sample_bilinear(uv),
        }
    }

    /// Largest per-channel difference between two grids of the same shape.
    pub fn max_difference(&self, other: &Grid) -> Option<f32> {
        if self.width != other.width || self.height != other.height || self.format != other.format {
            return None;
        }
        Some(
            self.data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f32::max),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_channels_read_as_defaults() {
        let mut grid = Grid::new(2, 2, SurfaceFormat::R32Float);
        grid.store(1, 0, Vec4::new(0.25, 9.0, 9.0, 9.0));
        assert_eq!(grid.load(1, 0), Vec4::new(0.25, 0.0, 0.0, 1.0));
        assert_eq!(grid.load(2, 0), Vec4::ZERO);
        assert_eq!(grid.load(-1, 0), Vec4::ZERO);
    }

    #[test]
    fn bilinear_hits_texel_centres_exactly() {
        let mut grid = Grid::new(2, 1, SurfaceFormat::Rgba32Float);
        grid.store(0, 0, Vec4::splat(0.0));
        grid.store(1, 0, Vec4::splat(1.0));
        assert_eq!(grid.sample_bilinear(Vec2::new(0.25, 0.5)).x, 0.0);
        assert_eq!(grid.sample_bilinear(Vec2::new(0.75, 0.5)).x, 1.0);
        assert!((grid.sample_bilinear(Vec2::new(0.5, 0.5)).x - 0.5).abs() < 1e-6);
        // clamp-to-edge past the last centre
        assert_eq!(grid.sample_bilinear(Vec2::new(1.0, 0.5)).x, 1.0);
    }

    #[test]
    fn rejects_mismatched_data() {
        assert!(Grid::from_data(2, 2, SurfaceFormat::Rg32Float, vec![0.0; 4]).is_err());
        assert!(Grid::from_data(2, 2, SurfaceFormat::Rg32Float, vec![0.0; 8]).is_ok());
    }
}
