//! Radiance cascades
//!
//! Probe grids at geometrically increasing angular resolution, computed from
//! the coarsest cascade down to the finest. Each cascade raymarches its own
//! radial interval and, on a miss, merges in the radiance the coarser cascade
//! gathered further out. All cascades share one atlas size and ping-pong
//! between two atlas surfaces.
//!
//! Progressive updates recompute only the finer part of the chain. A full
//! pass can retain one cascade in a hand-off surface so a later partial pass
//! can resume merging from it without recomputing the coarse levels.

mod kernel;
mod layout;

pub use kernel::{
    dim_sky, hash, sky, CascadeKernel, CascadeParams, DIM_SKY_COLOR, DIM_SUN_COLOR, FLAG_BILINEAR, FLAG_ENCODE,
    FLAG_MERGE, FLAG_NOISE, FLAG_SUN, MAX_STEPS, SKY_COLOR, SUN_COLOR,
};
pub use layout::{cascade_count, CascadeLayout, CascadeLevel, Interval, BASE_RAY_COUNTS, PROBE_SPACINGS};

use penumbra_core::{
    Bindings, ComputeBackend, DoubleBuffer, Error, FilterMode, Result, SurfaceDesc, SurfaceFormat, SurfaceId,
};

/// Per-dispatch cascade parameters that need no reallocation when changed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeSettings {
    /// Interval length multiplier
    pub ray_interval: f32,
    /// Fractional interval extension, `[-1, 2]`
    pub interval_overlap: f32,
    pub enable_sun: bool,
    /// Radians
    pub sun_angle: f32,
    pub add_noise: bool,
    pub bilinear_fix: bool,
    /// Decode scene colour and encode output with gamma 2.2
    pub srgb: bool,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            ray_interval: 1.0,
            interval_overlap: 0.1,
            enable_sun: false,
            sun_angle: 0.0,
            add_noise: false,
            bilinear_fix: true,
            srgb: true,
        }
    }
}

impl CascadeSettings {
    pub fn gamma(&self) -> f32 {
        if self.srgb {
            2.2
        } else {
            1.0
        }
    }
}

/// Full-resolution inputs every cascade reads
#[derive(Debug, Clone, Copy)]
pub struct CascadeInputs {
    pub scene: SurfaceId,
    pub distance: SurfaceId,
}

/// Levels to compute: `coarsest` down to `finest`, inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeRange {
    /// Cascades in the chain; the coarsest is `count - 1`
    pub count: u32,
    pub finest: u32,
}

impl CascadeRange {
    pub fn new(count: u32, finest: u32) -> Result<Self> {
        if count == 0 {
            return Err(Error::Config("cascade count must be at least 1".into()));
        }
        if finest >= count {
            return Err(Error::Config(format!(
                "finest cascade {} is outside a chain of {}",
                finest, count
            )));
        }
        Ok(Self { count, finest })
    }

    pub fn coarsest(&self) -> u32 {
        self.count - 1
    }

    /// Default partial split: `floor((coarsest - finest) / 2)` levels above the finest.
    pub fn halfway(&self) -> u32 {
        (self.coarsest() - self.finest) / 2
    }
}

pub struct CascadePass {
    layout: CascadeLayout,
    buffers: DoubleBuffer<SurfaceId>,
    handoff: SurfaceId,
    handoff_level: Option<u32>,
}

impl CascadePass {
    pub fn new<B: ComputeBackend>(backend: &mut B, layout: CascadeLayout) -> Result<Self> {
        let desc = |label: &str| {
            SurfaceDesc::new(label, layout.extent.x, layout.extent.y, SurfaceFormat::Rgba16Float)
                .with_filter(FilterMode::Linear)
        };
        let front = backend.create_surface(&desc("cascade_a"))?;
        let back = backend.create_surface(&desc("cascade_b"))?;
        let handoff = backend.create_surface(&desc("cascade_handoff"))?;
        log::info!(
            "Cascade pass: atlas {}x{}, base {} rays, {} natural cascades",
            layout.extent.x,
            layout.extent.y,
            layout.base_ray_count,
            layout.count
        );
        Ok(Self {
            layout,
            buffers: DoubleBuffer::new(front, back),
            handoff,
            handoff_level: None,
        })
    }

    pub fn layout(&self) -> &CascadeLayout {
        &self.layout
    }

    /// Most recently written cascade atlas.
    pub fn output(&self) -> SurfaceId {
        self.buffers.read()
    }

    /// Cascade held by the hand-off surface, if still valid.
    pub fn handoff_level(&self) -> Option<u32> {
        self.handoff_level
    }

    /// Forget the retained cascade, e.g. after a settings change.
    pub fn invalidate(&mut self) {
        self.handoff_level = None;
    }

    /// Whether a partial pass topped at `split` can merge from retained state.
    pub fn can_resume(&self, range: CascadeRange, split: u32) -> bool {
        split >= range.coarsest() || self.handoff_level == Some(split + 1)
    }

    /// Compute every level of `range`. When `retain` names a level, its
    /// result is copied to the hand-off surface.
    pub fn compute<B: ComputeBackend>(
        &mut self,
        backend: &mut B,
        inputs: CascadeInputs,
        settings: &CascadeSettings,
        range: CascadeRange,
        retain: Option<u32>,
    ) -> Result<SurfaceId> {
        self.handoff_level = None;
        let upper = self.buffers.read();
        self.run(backend, inputs, settings, range, range.coarsest(), upper, retain)
    }

    /// Recompute levels `split` down to `range.finest`, merging the top one
    /// with the retained hand-off cascade.
    pub fn compute_partial<B: ComputeBackend>(
        &mut self,
        backend: &mut B,
        inputs: CascadeInputs,
        settings: &CascadeSettings,
        range: CascadeRange,
        split: u32,
    ) -> Result<SurfaceId> {
        let top = split.clamp(range.finest, range.coarsest());
        if !self.can_resume(range, top) {
            return Err(Error::Binding(format!(
                "partial cascade pass from level {} needs level {} retained, have {:?}",
                top,
                top + 1,
                self.handoff_level
            )));
        }
        let upper = if top == range.coarsest() {
            self.buffers.read()
        } else {
            self.handoff
        };
        self.run(backend, inputs, settings, range, top, upper, None)
    }

    #[allow(clippy::too_many_arguments)]
    fn run<B: ComputeBackend>(
        &mut self,
        backend: &mut B,
        inputs: CascadeInputs,
        settings: &CascadeSettings,
        range: CascadeRange,
        top: u32,
        first_upper: SurfaceId,
        retain: Option<u32>,
    ) -> Result<SurfaceId> {
        log::debug!(
            "Cascades {}..={} of {} (finest {})",
            range.finest,
            top,
            range.count,
            range.finest
        );
        let mut upper = first_upper;
        for level in (range.finest..=top).rev() {
            let kernel = CascadeKernel::new(&self.layout, settings, level, range.count, range.finest);
            let bindings = Bindings::new()
                .texture("scene", inputs.scene)
                .texture("distance", inputs.distance)
                .texture("upper", upper);
            backend.dispatch(&kernel, &bindings, self.buffers.write())?;
            let (read, _) = self.buffers.swap();
            upper = read;

            if retain == Some(level) {
                backend.copy(read, self.handoff)?;
                self.handoff_level = Some(level);
                log::trace!("Retained cascade {} for partial passes", level);
            }
        }
        Ok(self.buffers.read())
    }

    pub fn release<B: ComputeBackend>(self, backend: &mut B) {
        for id in self.buffers.both() {
            backend.destroy_surface(id);
        }
        backend.destroy_surface(self.handoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penumbra_core::glam::{Vec2, Vec3, Vec4};
    use penumbra_core::{CpuBackend, Grid};
    use std::f32::consts::{PI, TAU};

    struct Fixture {
        backend: CpuBackend,
        inputs: CascadeInputs,
        pass: CascadePass,
    }

    /// Scene with an optional lit square, and a distance field that treats it
    /// as the only occupied region.
    fn fixture(size: u32, lit: Option<(u32, u32, u32)>) -> Fixture {
        let mut backend = CpuBackend::new();
        let scene = backend
            .create_surface(&SurfaceDesc::new("scene", size, size, SurfaceFormat::Rgba8Unorm))
            .unwrap();
        let distance = backend
            .create_surface(&SurfaceDesc::new("distance", size, size, SurfaceFormat::R32Float))
            .unwrap();

        let mut scene_grid = Grid::new(size, size, SurfaceFormat::Rgba8Unorm);
        let mut distance_grid = Grid::new(size, size, SurfaceFormat::R32Float);
        for y in 0..size {
            for x in 0..size {
                let d = match lit {
                    Some((x0, y0, side)) => {
                        let dx = (x0 as i32 - x as i32).max(x as i32 - (x0 + side - 1) as i32).max(0);
                        let dy = (y0 as i32 - y as i32).max(y as i32 - (y0 + side - 1) as i32).max(0);
                        if dx == 0 && dy == 0 {
                            scene_grid.store(x, y, Vec4::ONE);
                        }
                        ((dx * dx + dy * dy) as f32).sqrt() / size as f32
                    }
                    None => 1.0,
                };
                distance_grid.store(x, y, Vec4::splat(d.min(1.0)));
            }
        }
        backend.upload(scene, &scene_grid).unwrap();
        backend.upload(distance, &distance_grid).unwrap();

        let layout = CascadeLayout::new(size, size, 4, 1).unwrap();
        let pass = CascadePass::new(&mut backend, layout).unwrap();
        Fixture {
            backend,
            inputs: CascadeInputs { scene, distance },
            pass,
        }
    }

    fn full_chain(f: &mut Fixture, settings: &CascadeSettings) -> Grid {
        let range = CascadeRange::new(f.pass.layout().count, 0).unwrap();
        let out = f.pass.compute(&mut f.backend, f.inputs, settings, range, None).unwrap();
        f.backend.readback(out).unwrap()
    }

    #[test]
    fn shader_validates() {
        let module = naga::front::wgsl::parse_str(kernel::CASCADE_WGSL).unwrap();
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
            .validate(&module)
            .unwrap();
    }

    #[test]
    fn sky_peaks_towards_the_sun() {
        let toward = sky(PI / 3.0, PI / 3.0);
        let away = sky(PI / 3.0 + PI, PI / 3.0);
        assert!((toward - (SUN_COLOR * 0.7 + SKY_COLOR * 0.3)).abs().max_element() < 1e-5);
        assert!((away - SKY_COLOR * 0.3).abs().max_element() < 1e-5);
    }

    #[test]
    fn dim_sky_fades_over_the_radian_past_the_sun() {
        let sun = 2.0;
        assert!((dim_sky(sun, sun) - (DIM_SUN_COLOR + DIM_SKY_COLOR)).abs().max_element() < 1e-5);
        assert!((dim_sky(sun + 0.5, sun) - (DIM_SUN_COLOR * 0.5 + DIM_SKY_COLOR)).abs().max_element() < 1e-5);
        // just before the sun wraps around to almost a full turn away
        assert!((dim_sky(sun - 0.1, sun) - DIM_SKY_COLOR).abs().max_element() < 1e-5);
        assert!((dim_sky(sun + TAU + 1.5, sun) - DIM_SKY_COLOR).abs().max_element() < 1e-5);
    }

    #[test]
    fn hash_is_a_unit_fraction() {
        for i in 0..64 {
            let h = hash(Vec2::new(i as f32 * 0.37, i as f32 * -1.3));
            assert!((0.0..1.0).contains(&h));
        }
    }

    #[test]
    fn kernel_flags_follow_chain_position() {
        let layout = CascadeLayout::new(64, 64, 4, 1).unwrap();
        let settings = CascadeSettings {
            enable_sun: true,
            ..Default::default()
        };
        let coarsest = CascadeKernel::new(&layout, &settings, 4, 5, 0);
        assert_eq!(coarsest.params().flags & (FLAG_MERGE | FLAG_SUN | FLAG_ENCODE), FLAG_SUN);
        let finest = CascadeKernel::new(&layout, &settings, 0, 5, 0);
        assert_eq!(finest.params().flags & (FLAG_MERGE | FLAG_SUN | FLAG_ENCODE), FLAG_MERGE | FLAG_ENCODE);
        let single = CascadeKernel::new(&layout, &settings, 0, 1, 0);
        assert_eq!(single.params().flags & FLAG_MERGE, 0);
        assert_eq!(finest.params().upper_spacing, 2);
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(CascadeRange::new(0, 0).is_err());
        assert!(CascadeRange::new(3, 3).is_err());
        assert_eq!(CascadeRange::new(6, 0).unwrap().halfway(), 2);
        assert_eq!(CascadeRange::new(6, 3).unwrap().halfway(), 1);
    }

    #[test]
    fn open_sky_single_cascade_is_uniform_average() {
        let mut f = fixture(16, None);
        let settings = CascadeSettings {
            enable_sun: true,
            sun_angle: 0.4,
            ..Default::default()
        };
        let range = CascadeRange::new(1, 0).unwrap();
        let out = f.pass.compute(&mut f.backend, f.inputs, &settings, range, None).unwrap();
        let grid = f.backend.readback(out).unwrap();

        let mean = (0..4)
            .map(|k| sky((k as f32 + 0.5) * TAU / 4.0, 0.4))
            .fold(Vec3::ZERO, |acc, c| acc + c)
            / 4.0;
        let expected = mean.powf(1.0 / 2.2);
        for y in 0..16 {
            for x in 0..16 {
                let texel = grid.load(x, y).truncate();
                assert!((texel - expected).abs().max_element() < 5e-3, "probe ({x}, {y}): {texel}");
            }
        }
    }

    #[test]
    fn nearest_and_bilinear_merges_agree_on_uniform_upper_cascade() {
        // open sky varies by ray direction only, so every probe in a block matches
        let mut f = fixture(16, None);
        let sunny = CascadeSettings {
            enable_sun: true,
            sun_angle: 1.1,
            ..Default::default()
        };
        let range = CascadeRange::new(2, 0).unwrap();
        let bilinear = f.pass.compute(&mut f.backend, f.inputs, &sunny, range, None).unwrap();
        let bilinear = f.backend.readback(bilinear).unwrap();
        let nearest_settings = CascadeSettings {
            bilinear_fix: false,
            ..sunny
        };
        let nearest = f.pass.compute(&mut f.backend, f.inputs, &nearest_settings, range, None).unwrap();
        let nearest = f.backend.readback(nearest).unwrap();
        assert!(nearest.max_difference(&bilinear).unwrap() < 1e-3);
        assert!(nearest.data().iter().any(|v| *v > 0.0));
    }

    #[test]
    fn nearest_merge_differs_across_a_gradient() {
        let mut f = fixture(32, Some((12, 12, 6)));
        let bilinear = full_chain(&mut f, &CascadeSettings::default());
        let nearest = full_chain(
            &mut f,
            &CascadeSettings {
                bilinear_fix: false,
                ..Default::default()
            },
        );
        assert_ne!(nearest, bilinear);
        // rays from inside the square hit regardless of the merge
        assert_eq!(nearest.load(14, 14), bilinear.load(14, 14));
    }

    #[test]
    fn noise_is_deterministic_and_jitters_rays() {
        let mut f = fixture(32, Some((12, 12, 6)));
        let noisy = CascadeSettings {
            add_noise: true,
            ..Default::default()
        };
        let first = full_chain(&mut f, &noisy);
        let second = full_chain(&mut f, &noisy);
        assert_eq!(first, second);
        assert_ne!(first, full_chain(&mut f, &CascadeSettings::default()));
    }

    #[test]
    fn noisy_open_sky_uses_dim_sky() {
        let mut f = fixture(16, None);
        let settings = CascadeSettings {
            enable_sun: true,
            sun_angle: 0.4,
            add_noise: true,
            ..Default::default()
        };
        let range = CascadeRange::new(1, 0).unwrap();
        let out = f.pass.compute(&mut f.backend, f.inputs, &settings, range, None).unwrap();
        let grid = f.backend.readback(out).unwrap();

        let low = DIM_SKY_COLOR.powf(1.0 / 2.2) - 2e-3;
        let high = (DIM_SKY_COLOR + DIM_SUN_COLOR).powf(1.0 / 2.2) + 2e-3;
        for y in 0..16 {
            for x in 0..16 {
                let texel = grid.load(x, y).truncate();
                assert!(texel.cmpge(low).all() && texel.cmple(high).all(), "probe ({x}, {y}): {texel}");
            }
        }
    }

    #[test]
    fn partial_pass_reproduces_full_pass() {
        let mut f = fixture(32, Some((12, 12, 6)));
        let settings = CascadeSettings::default();
        let range = CascadeRange::new(f.pass.layout().count, 0).unwrap();
        let split = range.finest + range.halfway();

        let full = f
            .pass
            .compute(&mut f.backend, f.inputs, &settings, range, Some(split + 1))
            .unwrap();
        let full = f.backend.readback(full).unwrap();
        assert_eq!(f.pass.handoff_level(), Some(split + 1));
        assert!(f.pass.can_resume(range, split));

        let partial = f
            .pass
            .compute_partial(&mut f.backend, f.inputs, &settings, range, split)
            .unwrap();
        assert_eq!(f.backend.readback(partial).unwrap(), full);
        // probes inside the lit square hit on every ray
        assert!(full.load(14, 14).x > 0.99);
    }

    #[test]
    fn partial_pass_requires_retained_level() {
        let mut f = fixture(32, None);
        let settings = CascadeSettings::default();
        let range = CascadeRange::new(f.pass.layout().count, 0).unwrap();
        f.pass.compute(&mut f.backend, f.inputs, &settings, range, None).unwrap();
        let err = f.pass.compute_partial(&mut f.backend, f.inputs, &settings, range, 1);
        assert!(matches!(err, Err(Error::Binding(_))));
    }

    #[test]
    fn non_positive_interval_misses_everything() {
        let mut f = fixture(16, Some((6, 6, 4)));
        let settings = CascadeSettings {
            interval_overlap: -1.0,
            srgb: false,
            ..Default::default()
        };
        // overlap -1 makes cascade 0's length (1 - 3) * 1 - 0 < 0
        let range = CascadeRange::new(1, 0).unwrap();
        let out = f.pass.compute(&mut f.backend, f.inputs, &settings, range, None).unwrap();
        let grid = f.backend.readback(out).unwrap();
        assert!((0..16).all(|y| (0..16).all(|x| grid.load(x, y).truncate() == Vec3::ZERO)));
    }
}
