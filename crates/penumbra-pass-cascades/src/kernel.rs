use std::f32::consts::TAU;

use bytemuck::{Pod, Zeroable};
use glam::{IVec2, UVec2, Vec2, Vec3, Vec4};
use penumbra_core::{Grid, Kernel, KernelInputs, SurfaceFormat, Texel};

use crate::layout::CascadeLayout;
use crate::CascadeSettings;

pub(crate) const CASCADE_WGSL: &str = include_str!("../shaders/cascade.wgsl");

/// Bounds the sphere-tracing loop
pub const MAX_STEPS: u32 = 4096;

pub const FLAG_MERGE: u32 = 1;
pub const FLAG_BILINEAR: u32 = 1 << 1;
pub const FLAG_NOISE: u32 = 1 << 2;
pub const FLAG_SUN: u32 = 1 << 3;
pub const FLAG_ENCODE: u32 = 1 << 4;

pub const SKY_COLOR: Vec3 = Vec3::new(0.8, 0.96, 1.4);
pub const SUN_COLOR: Vec3 = Vec3::new(2.85, 2.7, 2.4);
pub const DIM_SKY_COLOR: Vec3 = Vec3::new(0.02, 0.08, 0.2);
pub const DIM_SUN_COLOR: Vec3 = Vec3::new(0.95, 0.95, 0.9);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CascadeParams {
    pub cascade_index: u32,
    pub base_ray_count: u32,
    pub ray_count: u32,
    pub spacing: u32,
    pub spacing_base: u32,
    pub upper_spacing: u32,
    pub flags: u32,
    pub _pad0: u32,
    pub probe_spacing: f32,
    pub interval_start: f32,
    pub interval_length: f32,
    pub gamma: f32,
    pub sun_angle: f32,
    pub _pad1: f32,
    pub _pad2: f32,
    pub _pad3: f32,
}

/// Sky radiance seen along `angle`: ambient sky plus a cos^4 sun lobe.
pub fn sky(angle: f32, sun_angle: f32) -> Vec3 {
    let intensity = (angle - sun_angle).cos().max(0.0).powi(4);
    (SUN_COLOR * intensity).lerp(SKY_COLOR, 0.3)
}

/// Sky used with noisy ray jitter: dim ambient plus a sun that fades out
/// over the radian past `sun_angle`.
pub fn dim_sky(angle: f32, sun_angle: f32) -> Vec3 {
    let delta = angle - sun_angle;
    let to_sun = delta - TAU * (delta / TAU).floor();
    let t = (1.0 - to_sun).clamp(0.0, 1.0);
    let intensity = t * t * (3.0 - 2.0 * t);
    DIM_SUN_COLOR * intensity + DIM_SKY_COLOR
}

/// `fract(sin(dot(p, (12.9898, 78.233))) * 43758.5453)`
pub fn hash(p: Vec2) -> f32 {
    let x = p.dot(Vec2::new(12.9898, 78.233)).sin() * 43758.5453;
    x - x.floor()
}

/// Raymarch, merge and average the rays of one cascade
pub struct CascadeKernel {
    params: CascadeParams,
}

impl CascadeKernel {
    /// Kernel for cascade `index` of a chain of `count` cascades whose finest
    /// computed level is `finest`.
    pub fn new(layout: &CascadeLayout, settings: &CascadeSettings, index: u32, count: u32, finest: u32) -> Self {
        let level = layout.level(index);
        let interval = layout.interval(index, settings.ray_interval, settings.interval_overlap);

        let mut flags = 0;
        if index + 1 < count {
            flags |= FLAG_MERGE;
        }
        if settings.bilinear_fix {
            flags |= FLAG_BILINEAR;
        }
        if settings.add_noise {
            flags |= FLAG_NOISE;
        }
        if settings.enable_sun && index + 1 == count {
            flags |= FLAG_SUN;
        }
        if index == finest {
            flags |= FLAG_ENCODE;
        }

        Self {
            params: CascadeParams {
                cascade_index: index,
                base_ray_count: layout.base_ray_count,
                ray_count: level.ray_count,
                spacing: level.spacing,
                spacing_base: layout.spacing_base(),
                upper_spacing: level.spacing.saturating_mul(layout.spacing_base()),
                flags,
                _pad0: 0,
                probe_spacing: layout.probe_spacing as f32,
                interval_start: interval.start,
                interval_length: interval.length,
                gamma: settings.gamma(),
                sun_angle: settings.sun_angle,
                _pad1: 0.0,
                _pad2: 0.0,
                _pad3: 0.0,
            },
        }
    }

    pub fn params(&self) -> &CascadeParams {
        &self.params
    }

    fn has_flag(&self, flag: u32) -> bool {
        self.params.flags & flag != 0
    }

    fn raymarch(&self, scene: &Grid, distance: &Grid, origin: Vec2, dir: Vec2) -> Vec4 {
        let ray_length = self.params.interval_length;
        if ray_length <= 0.0 {
            return Vec4::ZERO;
        }
        let resolution = scene.size().as_vec2();
        let scale = resolution.min_element();
        let one_over_size = resolution.recip();
        let min_step = one_over_size.min_element() * 0.5;

        let mut uv = origin * one_over_size;
        let mut travelled = 0.0;
        for _ in 0..MAX_STEPS {
            if travelled >= ray_length {
                break;
            }
            if uv.cmplt(Vec2::ZERO).any() || uv.cmpgt(Vec2::ONE).any() {
                break;
            }
            let df = distance.sample_nearest(uv).x;
            if df <= min_step {
                let color = scene.sample_nearest(uv).truncate();
                return color.powf(self.params.gamma).extend(1.0);
            }
            travelled += df * scale;
            uv += dir * (df * scale * one_over_size);
        }
        Vec4::ZERO
    }

    fn merge(&self, upper: &Grid, index: u32, probe: UVec2, extent: UVec2) -> Vec4 {
        let p = &self.params;
        let upper_size = extent / p.upper_spacing;
        if upper_size.x == 0 || upper_size.y == 0 {
            return Vec4::ZERO;
        }
        let block = UVec2::new(index % p.upper_spacing, index / p.upper_spacing);
        let origin = (block * upper_size).as_ivec2();
        let limit = upper_size.as_ivec2() - IVec2::ONE;
        let fetch = |q: IVec2| {
            let q = origin + q.clamp(IVec2::ZERO, limit);
            upper.load(q.x, q.y).truncate()
        };

        let offset = (probe.as_vec2() + 0.5) / p.spacing_base as f32;
        let clamped = offset.clamp(Vec2::splat(0.5), upper_size.as_vec2() - 0.5);
        let rgb = if self.has_flag(FLAG_BILINEAR) {
            let q = clamped - 0.5;
            let cell = q.floor();
            let f = q - cell;
            let c = cell.as_ivec2();
            let top = fetch(c).lerp(fetch(c + IVec2::new(1, 0)), f.x);
            let bottom = fetch(c + IVec2::new(0, 1)).lerp(fetch(c + IVec2::ONE), f.x);
            top.lerp(bottom, f.y)
        } else {
            fetch(clamped.floor().as_ivec2())
        };
        rgb.extend(1.0)
    }
}

impl Kernel for CascadeKernel {
    fn label(&self) -> &'static str {
        "cascade"
    }

    fn source(&self) -> &'static str {
        CASCADE_WGSL
    }

    fn inputs(&self) -> &'static [&'static str] {
        &["scene", "distance", "upper"]
    }

    fn output_format(&self) -> SurfaceFormat {
        SurfaceFormat::Rgba16Float
    }

    fn params(&self) -> &[u8] {
        bytemuck::bytes_of(&self.params)
    }

    fn eval(&self, texel: Texel, inputs: &KernelInputs<'_>) -> Vec4 {
        let (scene, distance, upper) = (inputs.get(0), inputs.get(1), inputs.get(2));
        let p = &self.params;
        let extent = texel.dims();
        let coord = UVec2::new(texel.x, texel.y);

        let probe_grid = extent / p.spacing;
        if probe_grid.x == 0 || probe_grid.y == 0 {
            return Vec4::ZERO;
        }
        let block = coord / probe_grid;
        if block.x >= p.spacing || block.y >= p.spacing {
            return Vec4::ZERO;
        }
        let probe = coord % probe_grid;
        let probe_center = (probe.as_vec2() + 0.5) * p.probe_spacing * p.spacing as f32;
        let base_index = (block.x + p.spacing * block.y) * p.base_ray_count;
        let angle_step = TAU / p.ray_count as f32;
        let noise = if self.has_flag(FLAG_NOISE) {
            hash(texel.uv() * (p.cascade_index + 1) as f32)
        } else {
            0.0
        };

        let mut total = Vec3::ZERO;
        for k in 0..p.base_ray_count {
            let index = base_index + k;
            let angle = (index as f32 + 0.5 + noise) * angle_step;
            let dir = Vec2::new(angle.cos(), -angle.sin());
            let mut radiance = self.raymarch(scene, distance, probe_center + dir * p.interval_start, dir);
            if radiance.w == 0.0 && self.has_flag(FLAG_MERGE) {
                radiance += self.merge(upper, index, probe, extent);
            }
            let mut rgb = radiance.truncate();
            if self.has_flag(FLAG_SUN) {
                let ambient = if self.has_flag(FLAG_NOISE) {
                    dim_sky(angle, p.sun_angle)
                } else {
                    sky(angle, p.sun_angle)
                };
                rgb = rgb.max(ambient);
            }
            total += rgb;
        }
        total /= p.base_ray_count as f32;

        if self.has_flag(FLAG_ENCODE) {
            total = total.powf(1.0 / p.gamma);
        }
        total.extend(1.0)
    }
}
