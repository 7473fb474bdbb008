use std::ops::RangeInclusive;
use std::time::Instant;

use glam::Vec2;
use penumbra_core::{ComputeBackend, Result, SurfaceDesc, SurfaceFormat, SurfaceId};
use penumbra_pass_cascades::{cascade_count, CascadeInputs, CascadeLayout, CascadePass, CascadeRange};
use penumbra_pass_composite::CompositePass;
use penumbra_pass_distance_field::DistanceFieldPass;
use penumbra_pass_jfa::{JumpFloodPass, SeedPass};

use crate::config::{AllocationKey, RadianceConfig, Stage};
use crate::scene::Scene;
use crate::scheduler::{FrameScheduler, Phase, SchedulerState};

/// What a tick or recompute did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub phase: Phase,
    pub stage: Stage,
    /// Cascade levels recomputed, `finest..=top`. `None` for preview stages.
    pub cascades: Option<RangeInclusive<u32>>,
    /// Jump-flood propagation passes dispatched
    pub jfa_passes: u32,
}

/// Every surface-owning stage for one allocation key
struct Stages {
    scene: SurfaceId,
    seed: SeedPass,
    jfa: JumpFloodPass,
    distance: DistanceFieldPass,
    cascades: CascadePass,
    composite: CompositePass,
}

impl Stages {
    fn new<B: ComputeBackend>(backend: &mut B, key: AllocationKey) -> Result<Self> {
        let AllocationKey { width, height, .. } = key;
        let layout = CascadeLayout::new(width, height, key.base_ray_count, key.probe_spacing)?;
        let scene = backend.create_surface(&SurfaceDesc::new("scene", width, height, SurfaceFormat::Rgba8Unorm))?;
        Ok(Self {
            scene,
            seed: SeedPass::new(backend, width, height)?,
            jfa: JumpFloodPass::new(backend, width, height)?,
            distance: DistanceFieldPass::new(backend, width, height)?,
            cascades: CascadePass::new(backend, layout)?,
            composite: CompositePass::new(backend, width, height)?,
        })
    }

    fn release<B: ComputeBackend>(self, backend: &mut B) {
        backend.destroy_surface(self.scene);
        self.seed.release(backend);
        self.jfa.release(backend);
        self.distance.release(backend);
        self.cascades.release(backend);
        self.composite.release(backend);
    }
}

/// Cascade levels a configuration computes for a scene size.
pub fn cascade_range(config: &RadianceConfig, width: u32, height: u32) -> Result<CascadeRange> {
    let natural = cascade_count(width, height, config.base_ray_count);
    let count = config.cascade_count_override.map_or(natural, |n| n.min(natural));
    CascadeRange::new(count, config.finest_cascade)
}

/// Radiance cascades global illumination for one painted scene
///
/// Owns the scene, every pass and the frame scheduler. Drive it with
/// [`RadiancePipeline::tick`] once per frame and display the result with
/// [`RadiancePipeline::render`].
pub struct RadiancePipeline<B: ComputeBackend> {
    backend: B,
    config: RadianceConfig,
    scene: Scene,
    key: AllocationKey,
    stages: Stages,
    scheduler: FrameScheduler,
    /// Scene generation held by the scene surface
    uploaded: Option<u64>,
    /// Scene generation the last full recompute seeded from
    computed: Option<u64>,
}

impl<B: ComputeBackend> RadiancePipeline<B> {
    pub fn new(mut backend: B, width: u32, height: u32, config: RadianceConfig) -> Result<Self> {
        config.validate()?;
        cascade_range(&config, width, height)?;
        let key = config.allocation_key(width, height);
        let stages = Stages::new(&mut backend, key)?;
        log::info!(
            "Radiance pipeline on {} backend: {}x{}, {} base rays, {} px between probes",
            backend.name(),
            width,
            height,
            config.base_ray_count,
            config.base_pixels_between_probes
        );
        Ok(Self {
            scheduler: FrameScheduler::new(config.idle_timeout, config.amortizes()),
            backend,
            config,
            scene: Scene::new(width, height),
            key,
            stages,
            uploaded: None,
            computed: None,
        })
    }

    pub fn config(&self) -> &RadianceConfig {
        &self.config
    }

    pub fn size(&self) -> (u32, u32) {
        (self.key.width, self.key.height)
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Mutations show up on the next tick, which also wakes the scheduler.
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn layout(&self) -> &CascadeLayout {
        self.stages.cascades.layout()
    }

    pub fn cascade_range(&self) -> Result<CascadeRange> {
        cascade_range(&self.config, self.key.width, self.key.height)
    }

    /// Surface shown for the configured stage.
    pub fn output(&self) -> SurfaceId {
        match self.config.stage {
            Stage::Seed => self.stages.seed.output(),
            Stage::Jfa => self.stages.jfa.output(),
            Stage::DistanceField => self.stages.distance.output(),
            Stage::Full => self.stages.composite.output(),
        }
    }

    /// Apply new settings. Surfaces are only reallocated when the
    /// allocation key changes; the next tick always runs full.
    pub fn reconfigure(&mut self, config: RadianceConfig, now: Instant) -> Result<()> {
        config.validate()?;
        cascade_range(&config, self.key.width, self.key.height)?;
        let key = config.allocation_key(self.key.width, self.key.height);
        if key != self.key {
            self.reallocate(key)?;
        } else {
            self.stages.cascades.invalidate();
        }
        self.scheduler
            .configuration_changed(now, config.idle_timeout, config.amortizes());
        self.config = config;
        Ok(())
    }

    /// Resize the scene, keeping the overlapping painted region.
    pub fn resize(&mut self, width: u32, height: u32, now: Instant) -> Result<()> {
        if (width, height) == self.size() {
            return Ok(());
        }
        cascade_range(&self.config, width, height)?;
        self.reallocate(self.config.allocation_key(width, height))?;
        self.scene = self.scene.resized(width, height);
        self.scheduler
            .configuration_changed(now, self.config.idle_timeout, self.config.amortizes());
        Ok(())
    }

    fn reallocate(&mut self, key: AllocationKey) -> Result<()> {
        log::info!(
            "Reallocating surfaces: {}x{}, {} base rays, {} px between probes",
            key.width,
            key.height,
            key.base_ray_count,
            key.probe_spacing
        );
        let stages = Stages::new(&mut self.backend, key)?;
        let old = std::mem::replace(&mut self.stages, stages);
        old.release(&mut self.backend);
        self.key = key;
        self.uploaded = None;
        self.computed = None;
        Ok(())
    }

    fn sync_scene(&mut self) -> Result<()> {
        let generation = self.scene.generation();
        if self.uploaded != Some(generation) {
            log::trace!("Uploading scene generation {}", generation);
            self.backend.upload(self.stages.scene, self.scene.grid())?;
            self.uploaded = Some(generation);
        }
        Ok(())
    }

    fn scene_changed(&self) -> bool {
        self.computed != Some(self.scene.generation())
    }

    /// Run every stage up to the configured one.
    pub fn compute(&mut self) -> Result<FrameReport> {
        let report = self.run_full()?;
        self.backend.submit();
        Ok(report)
    }

    /// Recompute the finer part of the cascade chain against the last
    /// distance field. Falls back to a full recompute when the scene changed
    /// or no full pass retained the hand-off cascade.
    pub fn compute_partial(&mut self) -> Result<FrameReport> {
        let report = self.run_partial()?;
        self.backend.submit();
        Ok(report)
    }

    /// Per-frame entry point. `None` when the scheduler is idle.
    pub fn tick(&mut self, now: Instant) -> Result<Option<FrameReport>> {
        if self.scene_changed() {
            self.scheduler.notify_interaction(now);
            self.scheduler.force_full();
        }
        let Some(phase) = self.scheduler.tick(now) else {
            return Ok(None);
        };
        let report = match phase {
            Phase::Full => self.run_full()?,
            Phase::Partial => self.run_partial()?,
        };
        self.backend.submit();
        Ok(Some(report))
    }

    pub fn is_idle(&self) -> bool {
        self.scheduler.state() == SchedulerState::Idle
    }

    /// Draw the output surface onto `target`.
    pub fn render(&mut self, target: &mut B::Target) -> Result<()> {
        let output = self.output();
        self.backend.present(output, target)
    }

    pub fn notify_interaction(&mut self, now: Instant) {
        self.scheduler.notify_interaction(now);
    }

    pub fn start_drawing(&mut self, position: Vec2, now: Instant) {
        self.scheduler.start_drawing(now);
        self.scene.start_drawing(position);
    }

    /// Extend the stroke and composite it over the previous irradiance at
    /// once. Returns whether anything was painted.
    pub fn move_to(&mut self, position: Vec2, now: Instant) -> Result<bool> {
        self.scheduler.move_to(now);
        let painted = self.scene.move_to(position);
        if painted {
            self.refresh()?;
        }
        Ok(painted)
    }

    /// End the stroke; see [`Scene::stop_drawing`].
    pub fn stop_drawing(&mut self, position: Vec2, commit: bool, now: Instant) -> Result<bool> {
        let was_drawing = self.scene.stop_drawing(position, commit);
        self.scheduler.stop_drawing(now);
        if was_drawing {
            self.refresh()?;
        }
        Ok(was_drawing)
    }

    fn refresh(&mut self) -> Result<()> {
        if self.config.stage != Stage::Full {
            return Ok(());
        }
        self.sync_scene()?;
        if self
            .stages
            .composite
            .refresh(&mut self.backend, self.stages.scene)?
            .is_some()
        {
            self.backend.submit();
        }
        Ok(())
    }

    fn run_full(&mut self) -> Result<FrameReport> {
        self.sync_scene()?;
        let stage = self.config.stage;
        let mut report = FrameReport {
            phase: Phase::Full,
            stage,
            cascades: None,
            jfa_passes: 0,
        };

        let backend = &mut self.backend;
        let stages = &mut self.stages;
        let seeds = stages.seed.compute(backend, stages.scene)?;
        self.computed = Some(self.scene.generation());
        if stage == Stage::Seed {
            return Ok(report);
        }

        let limit = self.config.jfa_pass_override;
        let nearest = stages.jfa.compute(backend, seeds, limit)?;
        report.jfa_passes = match limit {
            Some(0) => 1,
            Some(n) => n.min(stages.jfa.passes()),
            None => stages.jfa.passes(),
        };
        if stage == Stage::Jfa {
            return Ok(report);
        }

        let distance = stages.distance.compute(backend, nearest)?;
        if stage == Stage::DistanceField {
            return Ok(report);
        }

        let range = self.cascade_range()?;
        let split = self.split(range);
        let retain = (split < range.coarsest()).then_some(split + 1);
        let inputs = CascadeInputs {
            scene: self.stages.scene,
            distance,
        };
        let settings = self.config.cascade_settings();
        let irradiance = self
            .stages
            .cascades
            .compute(&mut self.backend, inputs, &settings, range, retain)?;
        self.stages.composite.compute(
            &mut self.backend,
            self.stages.scene,
            irradiance,
            self.config.show_surface(),
        )?;

        report.cascades = Some(range.finest..=range.coarsest());
        log::debug!("Full recompute: {:?}", report);
        Ok(report)
    }

    fn run_partial(&mut self) -> Result<FrameReport> {
        if self.config.stage != Stage::Full || self.scene_changed() {
            return self.run_full();
        }
        let range = self.cascade_range()?;
        let split = self.split(range);
        if !self.stages.cascades.can_resume(range, split) {
            log::warn!("Partial recompute without a retained cascade, running full");
            return self.run_full();
        }

        let inputs = CascadeInputs {
            scene: self.stages.scene,
            distance: self.stages.distance.output(),
        };
        let settings = self.config.cascade_settings();
        let irradiance = self
            .stages
            .cascades
            .compute_partial(&mut self.backend, inputs, &settings, range, split)?;
        self.stages.composite.compute(
            &mut self.backend,
            self.stages.scene,
            irradiance,
            self.config.show_surface(),
        )?;

        let report = FrameReport {
            phase: Phase::Partial,
            stage: Stage::Full,
            cascades: Some(range.finest..=split),
            jfa_passes: 0,
        };
        log::debug!("Partial recompute: {:?}", report);
        Ok(report)
    }

    /// Highest level a partial phase recomputes.
    fn split(&self, range: CascadeRange) -> u32 {
        let levels = self.config.partial_split.unwrap_or_else(|| range.halfway());
        (range.finest + levels).min(range.coarsest())
    }
}
