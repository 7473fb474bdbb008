//! Real-time 2D global illumination with radiance cascades
//!
//! A painted [`Scene`] is turned into a jump-flood distance field, traced by
//! a chain of radiance cascades and composited for display. The
//! [`RadiancePipeline`] runs on any [`ComputeBackend`]: [`GpuBackend`] for
//! interactive use, [`CpuBackend`] as a reference and fallback.
//!
//! ```no_run
//! use std::time::Instant;
//! use penumbra::{CpuBackend, Grid, RadianceConfig, RadiancePipeline};
//! use penumbra::glam::{Vec2, Vec4};
//!
//! let mut pipeline = RadiancePipeline::new(CpuBackend::new(), 128, 128, RadianceConfig::default())?;
//! pipeline.scene_mut().fill_circle(Vec2::new(64.0, 64.0), 8.0, Vec4::new(1.0, 0.8, 0.4, 1.0));
//! pipeline.tick(Instant::now())?;
//!
//! let mut frame = Grid::new(128, 128, penumbra::SurfaceFormat::Rgba8Unorm);
//! pipeline.render(&mut frame)?;
//! # Ok::<(), penumbra::Error>(())
//! ```

pub mod config;
pub mod pipeline;
pub mod scene;
pub mod scheduler;

pub use config::{AllocationKey, RadianceConfig, Stage};
pub use pipeline::{cascade_range, FrameReport, RadiancePipeline};
pub use scene::{Brush, Scene};
pub use scheduler::{FrameScheduler, Phase, SchedulerState};

pub use penumbra_core::{
    glam, wgpu, ComputeBackend, CpuBackend, Error, GpuBackend, Grid, Result, SurfaceFormat, SurfaceId,
};
pub use penumbra_pass_cascades::{CascadeLayout, CascadeRange, CascadeSettings};
