use std::time::Duration;

use penumbra_core::{Error, Result};
use penumbra_pass_cascades::{CascadeSettings, BASE_RAY_COUNTS, PROBE_SPACINGS};

/// Surface the pipeline displays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// Raw seed records
    Seed,
    /// Jump-flood nearest-seed records
    Jfa,
    DistanceField,
    /// Composited illumination
    #[default]
    Full,
}

/// Values that size surfaces. Changing any of them reallocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationKey {
    pub width: u32,
    pub height: u32,
    pub probe_spacing: u32,
    pub base_ray_count: u32,
}

/// Configuration for the radiance cascades pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct RadianceConfig {
    /// Rays per probe bucket: 4, 16 or 64
    pub base_ray_count: u32,
    /// Pixels between cascade-0 probes: 1, 2, 4, 8 or 16
    pub base_pixels_between_probes: u32,
    pub ray_interval: f32,
    /// Fractional extension of every interval, `[-1, 2]`
    pub interval_overlap: f32,
    /// Caps the natural cascade count
    pub cascade_count_override: Option<u32>,
    /// Finest cascade computed and displayed
    pub finest_cascade: u32,
    /// Truncates jump flooding for preview
    pub jfa_pass_override: Option<u32>,
    pub enable_sun: bool,
    /// Radians
    pub sun_angle: f32,
    pub add_noise: bool,
    pub bilinear_fix: bool,
    pub srgb: bool,
    /// Alternate full and partial recomputes when not painting
    pub amortized: bool,
    pub stage: Stage,
    /// Levels above the finest recomputed by a partial phase. `None` takes half the chain.
    pub partial_split: Option<u32>,
    pub idle_timeout: Duration,
}

impl Default for RadianceConfig {
    fn default() -> Self {
        Self {
            base_ray_count: 4,
            base_pixels_between_probes: 1,
            ray_interval: 1.0,
            interval_overlap: 0.1,
            cascade_count_override: None,
            finest_cascade: 0,
            jfa_pass_override: None,
            enable_sun: false,
            sun_angle: 0.0,
            add_noise: false,
            bilinear_fix: true,
            srgb: true,
            amortized: false,
            stage: Stage::Full,
            partial_split: None,
            idle_timeout: Duration::from_secs(1),
        }
    }
}

impl RadianceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_ray_count(mut self, count: u32) -> Self {
        self.base_ray_count = count;
        self
    }

    pub fn with_probe_spacing(mut self, pixels: u32) -> Self {
        self.base_pixels_between_probes = pixels;
        self
    }

    pub fn with_ray_interval(mut self, interval: f32) -> Self {
        self.ray_interval = interval;
        self
    }

    pub fn with_interval_overlap(mut self, overlap: f32) -> Self {
        self.interval_overlap = overlap;
        self
    }

    pub fn with_cascade_count(mut self, count: u32) -> Self {
        self.cascade_count_override = Some(count);
        self
    }

    pub fn with_finest_cascade(mut self, index: u32) -> Self {
        self.finest_cascade = index;
        self
    }

    pub fn with_jfa_passes(mut self, passes: u32) -> Self {
        self.jfa_pass_override = Some(passes);
        self
    }

    /// Enable the sky and a sun at `angle` radians.
    pub fn with_sun(mut self, angle: f32) -> Self {
        self.enable_sun = true;
        self.sun_angle = angle;
        self
    }

    pub fn with_noise(mut self, enabled: bool) -> Self {
        self.add_noise = enabled;
        self
    }

    pub fn with_bilinear_fix(mut self, enabled: bool) -> Self {
        self.bilinear_fix = enabled;
        self
    }

    pub fn with_srgb(mut self, enabled: bool) -> Self {
        self.srgb = enabled;
        self
    }

    pub fn with_amortized(mut self, enabled: bool) -> Self {
        self.amortized = enabled;
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_partial_split(mut self, levels: u32) -> Self {
        self.partial_split = Some(levels);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Check values that do not depend on the scene size.
    pub fn validate(&self) -> Result<()> {
        if !BASE_RAY_COUNTS.contains(&self.base_ray_count) {
            return Err(Error::Config(format!(
                "base ray count must be one of {:?}, got {}",
                BASE_RAY_COUNTS, self.base_ray_count
            )));
        }
        if !PROBE_SPACINGS.contains(&self.base_pixels_between_probes) {
            return Err(Error::Config(format!(
                "pixels between probes must be one of {:?}, got {}",
                PROBE_SPACINGS, self.base_pixels_between_probes
            )));
        }
        if !(self.ray_interval > 0.0) {
            return Err(Error::Config(format!("ray interval must be positive, got {}", self.ray_interval)));
        }
        if !(-1.0..=2.0).contains(&self.interval_overlap) {
            return Err(Error::Config(format!(
                "interval overlap must lie in [-1, 2], got {}",
                self.interval_overlap
            )));
        }
        if self.cascade_count_override == Some(0) {
            return Err(Error::Config("cascade count override must be at least 1".into()));
        }
        if !self.sun_angle.is_finite() {
            return Err(Error::Config("sun angle must be finite".into()));
        }
        Ok(())
    }

    pub fn cascade_settings(&self) -> CascadeSettings {
        CascadeSettings {
            ray_interval: self.ray_interval,
            interval_overlap: self.interval_overlap,
            enable_sun: self.enable_sun,
            sun_angle: self.sun_angle,
            add_noise: self.add_noise,
            bilinear_fix: self.bilinear_fix,
            srgb: self.srgb,
        }
    }

    pub fn allocation_key(&self, width: u32, height: u32) -> AllocationKey {
        AllocationKey {
            width,
            height,
            probe_spacing: self.base_pixels_between_probes,
            base_ray_count: self.base_ray_count,
        }
    }

    /// Painted surfaces cover the irradiance only at full resolution.
    pub fn show_surface(&self) -> bool {
        self.finest_cascade == 0
    }

    /// Amortization only applies to the composited stage.
    pub fn amortizes(&self) -> bool {
        self.amortized && self.stage == Stage::Full
    }
}
