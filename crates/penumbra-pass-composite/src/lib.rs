//! Composite of painted surfaces over cascade irradiance
//!
//! Output is double-buffered: each composite writes the back surface and
//! swaps, so the displayed surface is never the one being written. The pass
//! remembers the irradiance it last used, which lets a fresh stroke be shown
//! right away by [`CompositePass::refresh`] before the cascades catch up.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use penumbra_core::{
    Bindings, ComputeBackend, DoubleBuffer, FilterMode, Kernel, KernelInputs, Result, SurfaceDesc, SurfaceFormat,
    SurfaceId, Texel,
};

const COMPOSITE_WGSL: &str = include_str!("../shaders/composite.wgsl");

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CompositeParams {
    pub show_surface: u32,
    pub _pad0: u32,
    pub _pad1: u32,
    pub _pad2: u32,
}

pub struct CompositeKernel {
    params: CompositeParams,
}

impl CompositeKernel {
    pub fn new(show_surface: bool) -> Self {
        Self {
            params: CompositeParams {
                show_surface: show_surface as u32,
                _pad0: 0,
                _pad1: 0,
                _pad2: 0,
            },
        }
    }
}

impl Kernel for CompositeKernel {
    fn label(&self) -> &'static str {
        "composite"
    }

    fn source(&self) -> &'static str {
        COMPOSITE_WGSL
    }

    fn inputs(&self) -> &'static [&'static str] {
        &["scene", "irradiance"]
    }

    fn output_format(&self) -> SurfaceFormat {
        SurfaceFormat::Rgba8Unorm
    }

    fn params(&self) -> &[u8] {
        bytemuck::bytes_of(&self.params)
    }

    fn eval(&self, texel: Texel, inputs: &KernelInputs<'_>) -> Vec4 {
        let surface = inputs.get(0).load(texel.x as i32, texel.y as i32);
        let rgb = if surface.w > 0.0 && self.params.show_surface != 0 {
            surface.truncate()
        } else {
            inputs.get(1).sample_bilinear(texel.uv()).truncate()
        };
        rgb.extend(1.0)
    }
}

pub struct CompositePass {
    outputs: DoubleBuffer<SurfaceId>,
    irradiance: Option<SurfaceId>,
    show_surface: bool,
}

impl CompositePass {
    pub fn new<B: ComputeBackend>(backend: &mut B, width: u32, height: u32) -> Result<Self> {
        let desc = |label: &str| {
            SurfaceDesc::new(label, width, height, SurfaceFormat::Rgba8Unorm).with_filter(FilterMode::Linear)
        };
        let front = backend.create_surface(&desc("composite_a"))?;
        let back = backend.create_surface(&desc("composite_b"))?;
        backend.clear(front)?;
        Ok(Self {
            outputs: DoubleBuffer::new(front, back),
            irradiance: None,
            show_surface: true,
        })
    }

    /// Surface to display.
    pub fn output(&self) -> SurfaceId {
        self.outputs.read()
    }

    pub fn compute<B: ComputeBackend>(
        &mut self,
        backend: &mut B,
        scene: SurfaceId,
        irradiance: SurfaceId,
        show_surface: bool,
    ) -> Result<SurfaceId> {
        let bindings = Bindings::new()
            .texture("scene", scene)
            .texture("irradiance", irradiance);
        backend.dispatch(&CompositeKernel::new(show_surface), &bindings, self.outputs.write())?;
        let (read, _) = self.outputs.swap();
        self.irradiance = Some(irradiance);
        self.show_surface = show_surface;
        Ok(read)
    }

    /// Re-composite `scene` against the last irradiance. `None` until a
    /// first composite has run.
    pub fn refresh<B: ComputeBackend>(&mut self, backend: &mut B, scene: SurfaceId) -> Result<Option<SurfaceId>> {
        match self.irradiance {
            Some(irradiance) => {
                log::trace!("Refreshing composite against retained irradiance");
                self.compute(backend, scene, irradiance, self.show_surface).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Drop the retained irradiance, e.g. when its surface is released.
    pub fn forget(&mut self) {
        self.irradiance = None;
    }

    pub fn release<B: ComputeBackend>(self, backend: &mut B) {
        for id in self.outputs.both() {
            backend.destroy_surface(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penumbra_core::{CpuBackend, Grid};

    fn surfaces(backend: &mut CpuBackend) -> (SurfaceId, SurfaceId) {
        let scene = backend
            .create_surface(&SurfaceDesc::new("scene", 8, 8, SurfaceFormat::Rgba8Unorm))
            .unwrap();
        let irradiance = backend
            .create_surface(&SurfaceDesc::new("irradiance", 4, 4, SurfaceFormat::Rgba16Float))
            .unwrap();
        let mut grid = Grid::new(4, 4, SurfaceFormat::Rgba16Float);
        grid.fill(Vec4::new(0.5, 0.25, 0.0, 1.0));
        backend.upload(irradiance, &grid).unwrap();

        let mut scene_grid = Grid::new(8, 8, SurfaceFormat::Rgba8Unorm);
        scene_grid.store(3, 3, Vec4::new(1.0, 0.0, 0.0, 1.0));
        backend.upload(scene, &scene_grid).unwrap();
        (scene, irradiance)
    }

    #[test]
    fn shader_validates() {
        let module = naga::front::wgsl::parse_str(COMPOSITE_WGSL).unwrap();
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
            .validate(&module)
            .unwrap();
    }

    #[test]
    fn surfaces_cover_irradiance_when_shown() {
        let mut backend = CpuBackend::new();
        let (scene, irradiance) = surfaces(&mut backend);
        let mut pass = CompositePass::new(&mut backend, 8, 8).unwrap();

        let out = pass.compute(&mut backend, scene, irradiance, true).unwrap();
        let grid = backend.readback(out).unwrap();
        assert_eq!(grid.load(3, 3), Vec4::new(1.0, 0.0, 0.0, 1.0));
        let lit = grid.load(0, 0);
        assert!((lit.x - 0.5).abs() < 1.0 / 255.0 && (lit.y - 0.25).abs() < 1.0 / 255.0);

        let hidden = pass.compute(&mut backend, scene, irradiance, false).unwrap();
        let grid = backend.readback(hidden).unwrap();
        assert!((grid.load(3, 3).x - 0.5).abs() < 1.0 / 255.0);
    }

    #[test]
    fn output_alternates_and_refresh_reuses_irradiance() {
        let mut backend = CpuBackend::new();
        let (scene, irradiance) = surfaces(&mut backend);
        let mut pass = CompositePass::new(&mut backend, 8, 8).unwrap();
        assert_eq!(pass.refresh(&mut backend, scene).unwrap(), None);

        let first = pass.compute(&mut backend, scene, irradiance, true).unwrap();
        let second = pass.refresh(&mut backend, scene).unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(pass.output(), second);
        assert_eq!(backend.readback(first).unwrap(), backend.readback(second).unwrap());

        pass.forget();
        assert_eq!(pass.refresh(&mut backend, scene).unwrap(), None);
    }
}
