mod common;

use std::f32::consts::TAU;

use common::{lit_pipeline, output, pipeline, rgb, SIZE, WARM};
use penumbra::glam::{Vec2, Vec3, Vec4};
use penumbra::{
    ComputeBackend, Error, Grid, Phase, RadianceConfig, RadiancePipeline, Stage, SurfaceFormat,
};
use penumbra_pass_cascades::sky;

#[test]
fn full_recompute_is_idempotent() {
    let mut pipeline = lit_pipeline(RadianceConfig::default());
    let report = pipeline.compute().unwrap();
    assert_eq!(report.phase, Phase::Full);
    assert_eq!(report.cascades, Some(0..=4));
    assert_eq!(report.jfa_passes, 7);
    let first = output(&mut pipeline);

    pipeline.compute().unwrap();
    assert_eq!(output(&mut pipeline), first);
    // painted cells are shown as painted
    assert_eq!(first.load(32, 32), WARM);
}

#[test]
fn partial_recomputes_match_full() {
    let mut pipeline = lit_pipeline(RadianceConfig::default().with_amortized(true));
    pipeline.compute().unwrap();
    let full = output(&mut pipeline);

    for _ in 0..2 {
        let report = pipeline.compute_partial().unwrap();
        assert_eq!(report.phase, Phase::Partial);
        // five cascades: halfway split recomputes 0..=2
        assert_eq!(report.cascades, Some(0..=2));
        assert_eq!(output(&mut pipeline), full);
    }
}

#[test]
fn custom_split_still_matches_full() {
    let mut pipeline = lit_pipeline(RadianceConfig::default().with_partial_split(0));
    pipeline.compute().unwrap();
    let full = output(&mut pipeline);
    let report = pipeline.compute_partial().unwrap();
    assert_eq!(report.cascades, Some(0..=0));
    assert_eq!(output(&mut pipeline), full);
}

#[test]
fn partial_after_scene_change_runs_full() {
    let mut pipeline = lit_pipeline(RadianceConfig::default());
    pipeline.compute().unwrap();
    pipeline
        .scene_mut()
        .fill_circle(Vec2::new(8.0, 8.0), 3.0, Vec4::ONE);
    assert_eq!(pipeline.compute_partial().unwrap().phase, Phase::Full);
}

#[test]
fn light_stops_at_the_configured_reach() {
    // one cascade, two pixel rays, no sky
    let config = RadianceConfig::default()
        .with_cascade_count(1)
        .with_ray_interval(2.0)
        .with_interval_overlap(0.0)
        .with_srgb(false);
    let mut pipeline = lit_pipeline(config);
    pipeline.compute().unwrap();
    let grid = output(&mut pipeline);

    // (37, 32) is the disc's rightmost cell
    assert_eq!(grid.load(37, 32), WARM);
    assert!(rgb(&grid, 38, 32).x > 0.1);
    for (x, y) in [(45, 32), (32, 45), (0, 0), (63, 63), (20, 20)] {
        assert_eq!(rgb(&grid, x, y), Vec3::ZERO, "cell ({x}, {y}) should be dark");
    }
}

#[test]
fn open_sky_single_cascade_averages_its_rays() {
    let config = RadianceConfig::default().with_sun(0.4).with_cascade_count(1);
    let mut pipeline = pipeline(config);
    pipeline.compute().unwrap();
    let grid = output(&mut pipeline);

    let mean = (0..4)
        .map(|k| sky((k as f32 + 0.5) * TAU / 4.0, 0.4))
        .fold(Vec3::ZERO, |acc, c| acc + c)
        / 4.0;
    let expected = mean.powf(1.0 / 2.2).min(Vec3::ONE);
    for (x, y) in [(0, 0), (31, 17), (63, 63)] {
        let texel = rgb(&grid, x, y);
        assert!((texel - expected).abs().max_element() < 0.01, "({x}, {y}): {texel} vs {expected}");
    }
}

#[test]
fn open_sky_full_chain_averages_the_coarsest_rays() {
    let config = RadianceConfig::default().with_sun(1.2);
    let mut pipeline = pipeline(config);
    let range = pipeline.cascade_range().unwrap();
    let rays = pipeline.layout().level(range.coarsest()).ray_count;
    pipeline.compute().unwrap();
    let grid = output(&mut pipeline);

    let mean = (0..rays)
        .map(|k| sky((k as f32 + 0.5) * TAU / rays as f32, 1.2))
        .fold(Vec3::ZERO, |acc, c| acc + c)
        / rays as f32;
    let expected = mean.powf(1.0 / 2.2).min(Vec3::ONE);
    for (x, y) in [(0, 0), (40, 9), (63, 63)] {
        let texel = rgb(&grid, x, y);
        assert!((texel - expected).abs().max_element() < 0.01, "({x}, {y}): {texel} vs {expected}");
    }
}

#[test]
fn preview_stages_show_intermediate_surfaces() {
    let mut pipeline = lit_pipeline(RadianceConfig::default().with_stage(Stage::DistanceField));
    let report = pipeline.compute().unwrap();
    assert_eq!(report.cascades, None);
    let distance = output(&mut pipeline);
    assert_eq!(distance.format(), SurfaceFormat::R32Float);
    assert_eq!(distance.load(32, 32).x, 0.0);
    assert!((distance.load(48, 32).x - 11.0 / SIZE as f32).abs() < 1e-6);

    let now = std::time::Instant::now();
    let seed_only = pipeline.config().clone().with_stage(Stage::Seed);
    pipeline.reconfigure(seed_only, now).unwrap();
    let report = pipeline.compute().unwrap();
    assert_eq!(report.jfa_passes, 0);
    let seeds = output(&mut pipeline);
    assert_eq!(seeds.load(0, 0).truncate().truncate(), Vec2::splat(-1.0));

    let no_flood = pipeline.config().clone().with_stage(Stage::Jfa).with_jfa_passes(0);
    pipeline.reconfigure(no_flood, now).unwrap();
    assert_eq!(pipeline.compute().unwrap().jfa_passes, 1);
    assert_eq!(output(&mut pipeline), seeds);
}

#[test]
fn hidden_surface_when_rendering_coarser_cascade() {
    let mut pipeline = lit_pipeline(RadianceConfig::default().with_finest_cascade(1));
    let report = pipeline.compute().unwrap();
    assert_eq!(report.cascades, Some(1..=4));
    let grid = output(&mut pipeline);
    assert_ne!(grid.load(32, 32), WARM);
}

#[test]
fn render_resamples_to_target() {
    let mut pipeline = lit_pipeline(RadianceConfig::default());
    pipeline.compute().unwrap();
    let mut frame = Grid::new(SIZE * 2, SIZE * 2, SurfaceFormat::Rgba8Unorm);
    pipeline.render(&mut frame).unwrap();
    assert_eq!(frame.load(64, 64), WARM);
    assert!(frame.data().chunks(4).all(|t| t[3] == 1.0));
}

#[test]
fn invalid_configuration_is_rejected() {
    common::init();
    let too_fine = RadianceConfig::default().with_finest_cascade(9);
    let err = RadiancePipeline::new(penumbra::CpuBackend::new(), SIZE, SIZE, too_fine);
    assert!(matches!(err, Err(Error::Config(_))));

    let mut pipeline = pipeline(RadianceConfig::default());
    let err = pipeline.reconfigure(RadianceConfig::default().with_base_ray_count(5), std::time::Instant::now());
    assert!(matches!(err, Err(Error::Config(_))));
    assert_eq!(pipeline.config(), &RadianceConfig::default());
}

#[test]
fn reconfigure_reallocates_only_on_key_change() {
    let mut pipeline = lit_pipeline(RadianceConfig::default());
    pipeline.compute().unwrap();
    let surfaces = pipeline.backend().surface_count();
    let before = pipeline.output();
    let now = std::time::Instant::now();

    pipeline.reconfigure(pipeline.config().clone().with_sun(0.0), now).unwrap();
    assert_eq!(pipeline.output(), before);

    pipeline.reconfigure(pipeline.config().clone().with_probe_spacing(2), now).unwrap();
    assert_ne!(pipeline.output(), before);
    assert_eq!(pipeline.backend().surface_count(), surfaces);
    assert_eq!(pipeline.layout().extent, penumbra::glam::UVec2::splat(SIZE / 2));

    pipeline.resize(96, 80, now).unwrap();
    assert_eq!(pipeline.size(), (96, 80));
    assert_eq!(pipeline.backend().surface_count(), surfaces);
    assert_eq!(pipeline.scene().grid().load(32, 32), WARM);
    pipeline.compute().unwrap();
    let id = pipeline.output();
    assert_eq!(pipeline.backend().surface_desc(id).map(|d| (d.width, d.height)), Some((96, 80)));
}
