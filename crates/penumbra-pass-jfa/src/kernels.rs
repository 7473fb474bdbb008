use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};
use penumbra_core::{Kernel, KernelInputs, SurfaceFormat, Texel};

/// Record stored in cells with no known seed
pub const SENTINEL: Vec2 = Vec2::new(-1.0, -1.0);

pub(crate) const SEED_WGSL: &str = include_str!("../shaders/seed.wgsl");
pub(crate) const JUMP_FLOOD_WGSL: &str = include_str!("../shaders/jump_flood.wgsl");

fn is_seed(record: Vec2) -> bool {
    record.x >= 0.0
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SeedParams {
    pub threshold: f32,
    pub _pad0: f32,
    pub _pad1: f32,
    pub _pad2: f32,
}

/// Marks cells whose coverage exceeds `threshold` as seeds
pub struct SeedKernel {
    params: SeedParams,
}

impl SeedKernel {
    pub fn new(threshold: f32) -> Self {
        Self {
            params: SeedParams {
                threshold,
                _pad0: 0.0,
                _pad1: 0.0,
                _pad2: 0.0,
            },
        }
    }
}

impl Kernel for SeedKernel {
    fn label(&self) -> &'static str {
        "jfa_seed"
    }

    fn source(&self) -> &'static str {
        SEED_WGSL
    }

    fn inputs(&self) -> &'static [&'static str] {
        &["scene"]
    }

    fn output_format(&self) -> SurfaceFormat {
        SurfaceFormat::Rg32Float
    }

    fn params(&self) -> &[u8] {
        bytemuck::bytes_of(&self.params)
    }

    fn eval(&self, texel: Texel, inputs: &KernelInputs<'_>) -> Vec4 {
        let alpha = inputs.get(0).load(texel.x as i32, texel.y as i32).w;
        let record = if alpha > self.params.threshold {
            texel.uv()
        } else {
            SENTINEL
        };
        record.extend(0.0).extend(0.0)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct JumpFloodParams {
    pub jump: i32,
    pub identity: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

/// One propagation step: keep the nearest of the cell's own record and the
/// eight records `jump` texels away.
pub struct JumpFloodKernel {
    params: JumpFloodParams,
}

impl JumpFloodKernel {
    pub fn new(jump: u32) -> Self {
        Self {
            params: JumpFloodParams {
                jump: jump as i32,
                identity: 0,
                _pad0: 0,
                _pad1: 0,
            },
        }
    }

    /// Copies records through unchanged.
    pub fn identity() -> Self {
        Self {
            params: JumpFloodParams {
                jump: 0,
                identity: 1,
                _pad0: 0,
                _pad1: 0,
            },
        }
    }

    pub fn jump(&self) -> u32 {
        self.params.jump as u32
    }
}

impl Kernel for JumpFloodKernel {
    fn label(&self) -> &'static str {
        "jfa_step"
    }

    fn source(&self) -> &'static str {
        JUMP_FLOOD_WGSL
    }

    fn inputs(&self) -> &'static [&'static str] {
        &["seeds"]
    }

    fn output_format(&self) -> SurfaceFormat {
        SurfaceFormat::Rg32Float
    }

    fn params(&self) -> &[u8] {
        bytemuck::bytes_of(&self.params)
    }

    fn eval(&self, texel: Texel, inputs: &KernelInputs<'_>) -> Vec4 {
        let seeds = inputs.get(0);
        let coord = texel.coord();
        let own = seeds.load(coord.x, coord.y).truncate().truncate();
        if self.params.identity != 0 {
            return own.extend(0.0).extend(0.0);
        }

        let uv = texel.uv();
        let mut nearest = SENTINEL;
        let mut nearest_dist = f32::INFINITY;
        if is_seed(own) {
            nearest = own;
            nearest_dist = own.distance_squared(uv);
        }

        for y in -1..=1 {
            for x in -1..=1 {
                if x == 0 && y == 0 {
                    continue;
                }
                let neighbour = coord + glam::IVec2::new(x, y) * self.params.jump;
                if neighbour.x < 0
                    || neighbour.y < 0
                    || neighbour.x >= texel.width as i32
                    || neighbour.y >= texel.height as i32
                {
                    continue;
                }
                let candidate = seeds.load(neighbour.x, neighbour.y).truncate().truncate();
                if !is_seed(candidate) {
                    continue;
                }
                let dist = candidate.distance_squared(uv);
                if dist < nearest_dist {
                    nearest = candidate;
                    nearest_dist = dist;
                }
            }
        }

        nearest.extend(0.0).extend(0.0)
    }
}
