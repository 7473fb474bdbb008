//! Runs the same scene on both backends. Skips without a GPU adapter.

mod common;

use common::{output, SIZE, WARM};
use penumbra::glam::{Vec2, Vec4};
use penumbra::{CpuBackend, Error, GpuBackend, Grid, RadianceConfig, RadiancePipeline, Stage};

fn headless() -> Option<GpuBackend> {
    common::init();
    match GpuBackend::headless() {
        Ok(backend) => Some(backend),
        Err(Error::NoAdapter) => {
            eprintln!("no GPU adapter, skipping parity test");
            None
        }
        Err(err) => {
            eprintln!("GPU unavailable ({err}), skipping parity test");
            None
        }
    }
}

fn paint(scene: &mut penumbra::Scene) {
    scene.fill_circle(Vec2::new(20.0, 24.0), 5.0, WARM);
    scene.stroke(Vec2::new(36.0, 10.0), Vec2::new(50.0, 40.0), 2.0, Vec4::new(0.0, 0.0, 0.0, 1.0));
}

fn mean_difference(a: &Grid, b: &Grid) -> f32 {
    assert_eq!((a.width(), a.height(), a.format()), (b.width(), b.height(), b.format()));
    let total: f32 = a.data().iter().zip(b.data()).map(|(x, y)| (x - y).abs()).sum();
    total / a.data().len() as f32
}

fn run<B: penumbra::ComputeBackend>(backend: B, config: &RadianceConfig) -> Grid {
    let mut pipeline = RadiancePipeline::new(backend, SIZE, SIZE, config.clone()).unwrap();
    paint(pipeline.scene_mut());
    pipeline.compute().unwrap();
    output(&mut pipeline)
}

#[test]
fn distance_field_matches_reference() {
    let Some(gpu) = headless() else { return };
    let config = RadianceConfig::default().with_stage(Stage::DistanceField);
    let expected = run(CpuBackend::new(), &config);
    let actual = run(gpu, &config);
    let max = expected.max_difference(&actual).unwrap();
    assert!(max < 1e-5, "max difference {max}");
}

#[test]
fn composite_matches_reference() {
    let Some(gpu) = headless() else { return };
    let config = RadianceConfig::default().with_sun(0.9);
    let expected = run(CpuBackend::new(), &config);
    let actual = run(gpu, &config);
    // raymarch hit decisions may flip on boundary cells
    let mean = mean_difference(&expected, &actual);
    assert!(mean < 0.01, "mean difference {mean}");
}

#[test]
fn pass_timing_reports_every_kernel() {
    let Some(mut gpu) = headless() else { return };
    assert!(gpu.take_timings().unwrap().is_empty());
    if !gpu.set_timing(true) {
        eprintln!("no timestamp queries, skipping timing test");
        return;
    }

    let mut pipeline = RadiancePipeline::new(gpu, SIZE, SIZE, RadianceConfig::default()).unwrap();
    paint(pipeline.scene_mut());
    pipeline.compute().unwrap();
    let timings = pipeline.backend_mut().take_timings().unwrap();
    let labels: Vec<_> = timings.iter().map(|t| t.label).collect();
    assert_eq!(labels, ["jfa_seed", "jfa_step", "distance_field", "cascade", "composite"]);
    assert!(timings.iter().all(|t| t.dispatches > 0 && t.total_ms >= 0.0));

    // collecting resets the recorded passes
    assert!(pipeline.backend_mut().take_timings().unwrap().is_empty());
}
