//! Penumbra core: surfaces, kernels and compute backends
//!
//! Every stage of the radiance cascades pipeline is a [`Kernel`] dispatched
//! over a backend-owned surface. Two backends are provided:
//!
//! - [`GpuBackend`]: wgpu compute passes, the production path
//! - [`CpuBackend`]: per-texel host evaluation of the same kernels, used as
//!   the reference in tests and when no adapter is available

mod backend;
mod cpu;
mod error;
mod grid;
mod kernel;
mod ping_pong;
mod surface;

pub mod gpu;

pub use backend::ComputeBackend;
pub use cpu::CpuBackend;
pub use error::{Error, Result};
pub use gpu::GpuBackend;
pub use grid::Grid;
pub use kernel::{workgroup_count, Bindings, Kernel, KernelInputs, Texel, WORKGROUP_SIZE};
pub use ping_pong::DoubleBuffer;
pub use surface::{FilterMode, SurfaceDesc, SurfaceFormat, SurfaceId};

// Re-export the math and wgpu crates pass crates build on
pub use glam;
pub use wgpu;

/// Validate a WGSL source with naga, the way wgpu will before compiling it.
#[cfg(test)]
pub(crate) fn validate_wgsl(source: &str) -> std::result::Result<(), String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;
    naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
        .validate(&module)
        .map_err(|e| format!("{:?}", e))?;
    Ok(())
}
