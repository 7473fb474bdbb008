use crate::grid::Grid;
use crate::kernel::{Bindings, Kernel};
use crate::surface::{SurfaceDesc, SurfaceId};
use crate::Result;

/// Owner of surfaces and executor of kernels.
///
/// Dispatches are recorded in call order and execute in that order. A
/// dispatch never reads the surface it writes; [`Bindings::resolve`] rejects
/// such bindings before anything is recorded.
pub trait ComputeBackend {
    /// What [`ComputeBackend::present`] draws into.
    type Target: ?Sized;

    fn name(&self) -> &'static str;

    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId>;

    /// Release a surface. Unknown ids are ignored.
    fn destroy_surface(&mut self, id: SurfaceId);

    fn surface_desc(&self, id: SurfaceId) -> Option<&SurfaceDesc>;

    /// Replace a surface's contents. The grid must match its size and format.
    fn upload(&mut self, id: SurfaceId, grid: &Grid) -> Result<()>;

    /// Flush pending work and copy a surface back to the host.
    fn readback(&mut self, id: SurfaceId) -> Result<Grid>;

    /// Zero every texel.
    fn clear(&mut self, id: SurfaceId) -> Result<()>;

    /// Copy between surfaces of identical size and format.
    fn copy(&mut self, src: SurfaceId, dst: SurfaceId) -> Result<()>;

    /// Run `kernel` once per texel of `output`.
    fn dispatch(&mut self, kernel: &dyn Kernel, bindings: &Bindings, output: SurfaceId) -> Result<()>;

    /// Hand recorded work to the device.
    fn submit(&mut self);

    /// Resample a surface onto the display target using its filter mode.
    fn present(&mut self, id: SurfaceId, target: &mut Self::Target) -> Result<()>;
}
