//! Distance field from jump-flood records
//!
//! One stateless pass: each cell stores the normalized Euclidean distance to
//! its nearest seed, clamped to `[0, 1]`. Cells without a seed read `1.0`.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use penumbra_core::{
    Bindings, ComputeBackend, FilterMode, Kernel, KernelInputs, Result, SurfaceDesc, SurfaceFormat, SurfaceId,
    Texel,
};

const DISTANCE_FIELD_WGSL: &str = include_str!("../shaders/distance_field.wgsl");

/// Upper clamp, in normalized units
pub const MAX_DISTANCE: f32 = 1.0;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DistanceParams {
    pub max_distance: f32,
    pub _pad0: f32,
    pub _pad1: f32,
    pub _pad2: f32,
}

pub struct DistanceFieldKernel {
    params: DistanceParams,
}

impl Default for DistanceFieldKernel {
    fn default() -> Self {
        Self {
            params: DistanceParams {
                max_distance: MAX_DISTANCE,
                _pad0: 0.0,
                _pad1: 0.0,
                _pad2: 0.0,
            },
        }
    }
}

impl Kernel for DistanceFieldKernel {
    fn label(&self) -> &'static str {
        "distance_field"
    }

    fn source(&self) -> &'static str {
        DISTANCE_FIELD_WGSL
    }

    fn inputs(&self) -> &'static [&'static str] {
        &["nearest"]
    }

    fn output_format(&self) -> SurfaceFormat {
        SurfaceFormat::R32Float
    }

    fn params(&self) -> &[u8] {
        bytemuck::bytes_of(&self.params)
    }

    fn eval(&self, texel: Texel, inputs: &KernelInputs<'_>) -> Vec4 {
        let nearest = inputs.get(0).load(texel.x as i32, texel.y as i32).truncate().truncate();
        let max = self.params.max_distance;
        let dist = if nearest.x >= 0.0 {
            texel.uv().distance(nearest).clamp(0.0, max)
        } else {
            max
        };
        Vec4::new(dist, 0.0, 0.0, 0.0)
    }
}

pub struct DistanceFieldPass {
    target: SurfaceId,
}

impl DistanceFieldPass {
    pub fn new<B: ComputeBackend>(backend: &mut B, width: u32, height: u32) -> Result<Self> {
        let target = backend.create_surface(
            &SurfaceDesc::new("distance_field", width, height, SurfaceFormat::R32Float)
                .with_filter(FilterMode::Nearest),
        )?;
        Ok(Self { target })
    }

    pub fn output(&self) -> SurfaceId {
        self.target
    }

    pub fn compute<B: ComputeBackend>(&mut self, backend: &mut B, nearest: SurfaceId) -> Result<SurfaceId> {
        backend.dispatch(
            &DistanceFieldKernel::default(),
            &Bindings::new().texture("nearest", nearest),
            self.target,
        )?;
        Ok(self.target)
    }

    pub fn release<B: ComputeBackend>(self, backend: &mut B) {
        backend.destroy_surface(self.target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penumbra_core::{CpuBackend, Grid};
    use penumbra_pass_jfa::{JumpFloodPass, SeedPass};

    fn distance_field(width: u32, height: u32, seeds: &[(u32, u32)]) -> Grid {
        let mut backend = CpuBackend::new();
        let scene = backend
            .create_surface(&SurfaceDesc::new("scene", width, height, SurfaceFormat::Rgba8Unorm))
            .unwrap();
        let mut grid = Grid::new(width, height, SurfaceFormat::Rgba8Unorm);
        for (x, y) in seeds {
            grid.store(*x, *y, Vec4::ONE);
        }
        backend.upload(scene, &grid).unwrap();

        let mut seed = SeedPass::new(&mut backend, width, height).unwrap();
        let mut jfa = JumpFloodPass::new(&mut backend, width, height).unwrap();
        let mut pass = DistanceFieldPass::new(&mut backend, width, height).unwrap();
        let seeds = seed.compute(&mut backend, scene).unwrap();
        let nearest = jfa.compute(&mut backend, seeds, None).unwrap();
        let out = pass.compute(&mut backend, nearest).unwrap();
        backend.readback(out).unwrap()
    }

    #[test]
    fn shader_validates() {
        let module = naga::front::wgsl::parse_str(DISTANCE_FIELD_WGSL).unwrap();
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
            .validate(&module)
            .unwrap();
    }

    #[test]
    fn no_seeds_is_uniformly_max() {
        let grid = distance_field(24, 17, &[]);
        assert!(grid.data().iter().all(|d| *d == 1.0));
    }

    #[test]
    fn seed_cell_is_zero_and_distance_grows() {
        let grid = distance_field(16, 16, &[(8, 8)]);
        assert_eq!(grid.load(8, 8).x, 0.0);
        assert!((grid.load(12, 8).x - 4.0 / 16.0).abs() < 1e-6);
        assert!((grid.load(8, 0).x - 8.0 / 16.0).abs() < 1e-6);
        assert!(grid.load(0, 0).x > grid.load(4, 4).x);
    }

    #[test]
    fn distances_clamp_at_one() {
        // opposite corner is 0.875 * sqrt(2) away
        let grid = distance_field(8, 8, &[(0, 0)]);
        assert_eq!(grid.load(7, 7).x, 1.0);
        assert!(grid.load(4, 4).x < 1.0);
        assert!(grid.data().iter().all(|d| (0.0..=1.0).contains(d)));
    }
}
