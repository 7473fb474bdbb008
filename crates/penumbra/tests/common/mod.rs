#![allow(dead_code)]

use penumbra::glam::{Vec2, Vec3, Vec4};
use penumbra::{ComputeBackend, CpuBackend, Grid, RadianceConfig, RadiancePipeline};

pub const SIZE: u32 = 64;
pub const WARM: Vec4 = Vec4::new(1.0, 0.6, 0.2, 1.0);

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn pipeline(config: RadianceConfig) -> RadiancePipeline<CpuBackend> {
    init();
    RadiancePipeline::new(CpuBackend::new(), SIZE, SIZE, config).unwrap()
}

/// Pipeline with a warm disc of radius 6 centred on the scene.
pub fn lit_pipeline(config: RadianceConfig) -> RadiancePipeline<CpuBackend> {
    let mut pipeline = pipeline(config);
    pipeline
        .scene_mut()
        .fill_circle(Vec2::splat(SIZE as f32 / 2.0), 6.0, WARM);
    pipeline
}

pub fn output<B: ComputeBackend>(pipeline: &mut RadiancePipeline<B>) -> Grid {
    let id = pipeline.output();
    pipeline.backend_mut().readback(id).unwrap()
}

pub fn rgb(grid: &Grid, x: i32, y: i32) -> Vec3 {
    grid.load(x, y).truncate()
}
