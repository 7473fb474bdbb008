//! Compute kernel abstraction
//!
//! A kernel is a per-texel function over a full output surface. Each kernel
//! carries its WGSL source for the GPU backend and an equivalent Rust
//! [`Kernel::eval`] for the CPU backend.
//!
//! WGSL binding convention (group 0):
//! - binding 0: `var<uniform>` params, laid out as [`Kernel::params`]
//! - binding 1..=n: `texture_2d<f32>` inputs, in [`Kernel::inputs`] order
//! - binding n+1: `texture_storage_2d<format, write>` output
//!
//! Entry point `main`, `@workgroup_size(8, 8, 1)`.

use glam::{IVec2, UVec2, Vec2, Vec4};

use crate::grid::Grid;
use crate::surface::{SurfaceFormat, SurfaceId};
use crate::{Error, Result};

/// Workgroup edge length every kernel is written for.
pub const WORKGROUP_SIZE: u32 = 8;

pub trait Kernel {
    /// Stable name, also the pipeline cache key.
    fn label(&self) -> &'static str;

    fn source(&self) -> &'static str;

    /// Names of the texture inputs, in binding order.
    fn inputs(&self) -> &'static [&'static str];

    fn output_format(&self) -> SurfaceFormat;

    /// Uniform bytes for binding 0.
    fn params(&self) -> &[u8];

    /// Reference implementation for one output texel.
    fn eval(&self, texel: Texel, inputs: &KernelInputs<'_>) -> Vec4;
}

/// Output texel being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texel {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Texel {
    pub fn coord(&self) -> IVec2 {
        IVec2::new(self.x as i32, self.y as i32)
    }

    pub fn dims(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    /// Normalized texel centre.
    pub fn uv(&self) -> Vec2 {
        (Vec2::new(self.x as f32, self.y as f32) + 0.5) / self.dims().as_vec2()
    }
}

/// Input grids handed to [`Kernel::eval`], in [`Kernel::inputs`] order
pub struct KernelInputs<'a> {
    grids: Vec<&'a Grid>,
}

impl<'a> KernelInputs<'a> {
    pub fn new(grids: Vec<&'a Grid>) -> Self {
        Self { grids }
    }

    pub fn get(&self, slot: usize) -> &'a Grid {
        self.grids[slot]
    }
}

/// Named texture bindings for one dispatch
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    textures: Vec<(&'static str, SurfaceId)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture(mut self, name: &'static str, surface: SurfaceId) -> Self {
        self.textures.retain(|(n, _)| *n != name);
        self.textures.push((name, surface));
        self
    }

    pub fn get(&self, name: &str) -> Option<SurfaceId> {
        self.textures
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, id)| *id)
    }

    /// Surfaces in the kernel's binding order. Fails on a missing input or
    /// when `output` is also bound as an input.
    pub fn resolve(&self, kernel: &dyn Kernel, output: SurfaceId) -> Result<Vec<SurfaceId>> {
        kernel
            .inputs()
            .iter()
            .map(|name| {
                let id = self.get(name).ok_or_else(|| {
                    Error::Binding(format!("kernel `{}` has no binding for `{}`", kernel.label(), name))
                })?;
                if id == output {
                    return Err(Error::Binding(format!(
                        "kernel `{}` reads and writes the same surface through `{}`",
                        kernel.label(),
                        name
                    )));
                }
                Ok(id)
            })
            .collect()
    }
}

/// `ceil(extent / WORKGROUP_SIZE)` per axis.
pub fn workgroup_count(width: u32, height: u32) -> (u32, u32) {
    (width.div_ceil(WORKGROUP_SIZE), height.div_ceil(WORKGROUP_SIZE))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passthrough;

    impl Kernel for Passthrough {
        fn label(&self) -> &'static str {
            "copy"
        }
        fn source(&self) -> &'static str {
            ""
        }
        fn inputs(&self) -> &'static [&'static str] {
            &["source"]
        }
        fn output_format(&self) -> SurfaceFormat {
            SurfaceFormat::R32Float
        }
        fn params(&self) -> &[u8] {
            &[]
        }
        fn eval(&self, texel: Texel, inputs: &KernelInputs<'_>) -> Vec4 {
            inputs.get(0).load(texel.x as i32, texel.y as i32)
        }
    }

    #[test]
    fn resolve_rejects_aliasing_and_missing_inputs() {
        let a = SurfaceId::new();
        let b = SurfaceId::new();
        assert!(Bindings::new().resolve(&Passthrough, b).is_err());
        assert!(Bindings::new().texture("source", b).resolve(&Passthrough, b).is_err());
        assert_eq!(Bindings::new().texture("source", a).resolve(&Passthrough, b).unwrap(), vec![a]);
    }

    #[test]
    fn texel_uv_is_cell_centre() {
        let texel = Texel { x: 0, y: 3, width: 4, height: 4 };
        assert_eq!(texel.uv(), Vec2::new(0.125, 0.875));
        assert_eq!(workgroup_count(17, 8), (3, 1));
    }
}
