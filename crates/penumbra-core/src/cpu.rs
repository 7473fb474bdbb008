//! Reference backend evaluating kernels on the host
//!
//! Slow but deterministic. Used by the test-suite and as a fallback when no
//! GPU adapter is available.

use std::collections::HashMap;

use glam::Vec4;

use crate::backend::ComputeBackend;
use crate::grid::Grid;
use crate::kernel::{Bindings, Kernel, KernelInputs, Texel};
use crate::surface::{SurfaceDesc, SurfaceId};
use crate::{Error, Result};

struct CpuSurface {
    desc: SurfaceDesc,
    grid: Grid,
}

#[derive(Default)]
pub struct CpuBackend {
    surfaces: HashMap<SurfaceId, CpuSurface>,
    dispatches: u64,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of kernel dispatches executed so far.
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    fn surface(&self, id: SurfaceId) -> Result<&CpuSurface> {
        self.surfaces
            .get(&id)
            .ok_or_else(|| Error::Binding(format!("unknown surface {:?}", id)))
    }

    fn surface_mut(&mut self, id: SurfaceId) -> Result<&mut CpuSurface> {
        self.surfaces
            .get_mut(&id)
            .ok_or_else(|| Error::Binding(format!("unknown surface {:?}", id)))
    }
}

impl ComputeBackend for CpuBackend {
    type Target = Grid;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::Allocation {
                label: desc.label.clone(),
                width: desc.width,
                height: desc.height,
                format: desc.format,
                message: "surfaces must have a non-zero extent".into(),
            });
        }
        let id = SurfaceId::new();
        log::debug!(
            "Created surface '{}' {}x{} {:?} with id {:?}",
            desc.label,
            desc.width,
            desc.height,
            desc.format,
            id
        );
        self.surfaces.insert(
            id,
            CpuSurface {
                desc: desc.clone(),
                grid: Grid::new(desc.width, desc.height, desc.format),
            },
        );
        Ok(id)
    }

    fn destroy_surface(&mut self, id: SurfaceId) {
        if let Some(surface) = self.surfaces.remove(&id) {
            log::debug!("Destroyed surface '{}' ({:?})", surface.desc.label, id);
        }
    }

    fn surface_desc(&self, id: SurfaceId) -> Option<&SurfaceDesc> {
        self.surfaces.get(&id).map(|s| &s.desc)
    }

    fn upload(&mut self, id: SurfaceId, grid: &Grid) -> Result<()> {
        let surface = self.surface_mut(id)?;
        let desc = &surface.desc;
        if grid.width() != desc.width || grid.height() != desc.height || grid.format() != desc.format {
            return Err(Error::Binding(format!(
                "upload of {}x{} {:?} into '{}' ({}x{} {:?})",
                grid.width(),
                grid.height(),
                grid.format(),
                desc.label,
                desc.width,
                desc.height,
                desc.format
            )));
        }
        let mut stored = Grid::new(grid.width(), grid.height(), grid.format());
        for y in 0..grid.height() {
            for x in 0..grid.width() {
                stored.store(x, y, grid.load(x as i32, y as i32));
            }
        }
        surface.grid = stored;
        Ok(())
    }

    fn readback(&mut self, id: SurfaceId) -> Result<Grid> {
        Ok(self.surface(id)?.grid.clone())
    }

    fn clear(&mut self, id: SurfaceId) -> Result<()> {
        let surface = self.surface_mut(id)?;
        surface.grid = Grid::new(surface.desc.width, surface.desc.height, surface.desc.format);
        Ok(())
    }

    fn copy(&mut self, src: SurfaceId, dst: SurfaceId) -> Result<()> {
        let source = self.surface(src)?;
        let grid = source.grid.clone();
        let src_desc = source.desc.clone();
        let target = self.surface_mut(dst)?;
        if src_desc.width != target.desc.width
            || src_desc.height != target.desc.height
            || src_desc.format != target.desc.format
        {
            return Err(Error::Binding(format!(
                "cannot copy '{}' into '{}': shapes differ",
                src_desc.label, target.desc.label
            )));
        }
        target.grid = grid;
        Ok(())
    }

    fn dispatch(&mut self, kernel: &dyn Kernel, bindings: &Bindings, output: SurfaceId) -> Result<()> {
        let inputs = bindings.resolve(kernel, output)?;
        let desc = self.surface(output)?.desc.clone();
        if desc.format != kernel.output_format() {
            return Err(Error::Binding(format!(
                "kernel `{}` writes {:?} but '{}' is {:?}",
                kernel.label(),
                kernel.output_format(),
                desc.label,
                desc.format
            )));
        }
        log::trace!("Dispatching `{}` over '{}' ({}x{})", kernel.label(), desc.label, desc.width, desc.height);

        let mut result = Grid::new(desc.width, desc.height, desc.format);
        {
            let grids = inputs
                .iter()
                .map(|id| self.surface(*id).map(|s| &s.grid))
                .collect::<Result<Vec<_>>>()?;
            let inputs = KernelInputs::new(grids);
            for y in 0..desc.height {
                for x in 0..desc.width {
                    let texel = Texel {
                        x,
                        y,
                        width: desc.width,
                        height: desc.height,
                    };
                    result.store(x, y, kernel.eval(texel, &inputs));
                }
            }
        }
        self.surface_mut(output)?.grid = result;
        self.dispatches += 1;
        Ok(())
    }

    fn submit(&mut self) {}

    fn present(&mut self, id: SurfaceId, target: &mut Grid) -> Result<()> {
        let source = self.surface(id)?;
        let (width, height) = (target.width(), target.height());
        for y in 0..height {
            for x in 0..width {
                let uv = Texel { x, y, width, height }.uv();
                let texel = source.grid.sample(uv, source.desc.filter);
                target.store(x, y, texel.truncate().extend(1.0));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{FilterMode, SurfaceFormat};

    fn backend() -> CpuBackend {
        let _ = env_logger::builder().is_test(true).try_init();
        CpuBackend::new()
    }

    struct Invert;

    impl Kernel for Invert {
        fn label(&self) -> &'static str {
            "invert"
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
            Vec4::splat(1.0 - inputs.get(0).load(texel.x as i32, texel.y as i32).x)
        }
    }

    #[test]
    fn dispatch_evaluates_every_texel() {
        let mut backend = backend();
        let desc = SurfaceDesc::new("scalar", 3, 2, SurfaceFormat::R32Float);
        let a = backend.create_surface(&desc).unwrap();
        let b = backend.create_surface(&desc).unwrap();
        backend
            .dispatch(&Invert, &Bindings::new().texture("source", a), b)
            .unwrap();
        let out = backend.readback(b).unwrap();
        assert!(out.data().iter().all(|v| *v == 1.0));
        assert_eq!(backend.dispatch_count(), 1);
    }

    #[test]
    fn dispatch_rejects_in_place_writes() {
        let mut backend = backend();
        let a = backend
            .create_surface(&SurfaceDesc::new("scalar", 2, 2, SurfaceFormat::R32Float))
            .unwrap();
        let err = backend.dispatch(&Invert, &Bindings::new().texture("source", a), a);
        assert!(matches!(err, Err(Error::Binding(_))));
    }

    #[test]
    fn present_resamples_with_surface_filter() {
        let mut backend = backend();
        let desc = SurfaceDesc::new("small", 2, 1, SurfaceFormat::Rgba32Float).with_filter(FilterMode::Linear);
        let id = backend.create_surface(&desc).unwrap();
        let mut grid = Grid::new(2, 1, SurfaceFormat::Rgba32Float);
        grid.store(1, 0, Vec4::new(1.0, 1.0, 1.0, 0.0));
        backend.upload(id, &grid).unwrap();

        let mut target = Grid::new(4, 1, SurfaceFormat::Rgba32Float);
        backend.present(id, &mut target).unwrap();
        let row: Vec<f32> = (0..4).map(|x| target.load(x, 0).x).collect();
        assert_eq!(row, vec![0.0, 0.25, 0.75, 1.0]);
        assert_eq!(target.load(2, 0).w, 1.0);
    }

    #[test]
    fn zero_sized_surfaces_are_rejected() {
        let mut backend = backend();
        let err = backend.create_surface(&SurfaceDesc::new("empty", 0, 4, SurfaceFormat::R32Float));
        assert!(matches!(err, Err(Error::Allocation { .. })));
    }
}
