//! Jump-flood nearest-seed transform
//!
//! Converts a coverage mask into a grid where every cell stores the
//! normalized position of its nearest seed in `O(log n)` passes. Cells with
//! no reachable seed keep [`SENTINEL`].
//!
//! [`SeedPass`] writes the initial records; [`JumpFloodPass`] propagates them
//! over its own ping-pong pair, reading the seed surface on its first pass.

mod kernels;

pub use kernels::{JumpFloodKernel, JumpFloodParams, SeedKernel, SeedParams, SENTINEL};

use penumbra_core::{Bindings, ComputeBackend, DoubleBuffer, Result, SurfaceDesc, SurfaceFormat, SurfaceId};

/// Number of propagation passes for a grid: `ceil(log2(max(w, h))) + 1`.
pub fn pass_count(width: u32, height: u32) -> u32 {
    let longest = width.max(height).max(1);
    (u32::BITS - (longest - 1).leading_zeros()) + 1
}

/// Jump offsets in execution order, largest first.
pub fn jump_schedule(width: u32, height: u32) -> impl Iterator<Item = u32> {
    let passes = pass_count(width, height);
    (0..passes).map(move |pass| 1u32 << (passes - pass - 1))
}

/// Seed records from scene coverage
pub struct SeedPass {
    threshold: f32,
    target: SurfaceId,
}

impl SeedPass {
    pub fn new<B: ComputeBackend>(backend: &mut B, width: u32, height: u32) -> Result<Self> {
        let target = backend.create_surface(&SurfaceDesc::new("jfa_seed", width, height, SurfaceFormat::Rg32Float))?;
        Ok(Self { threshold: 0.0, target })
    }

    /// Coverage a scene cell must exceed to count as a seed (default 0).
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn output(&self) -> SurfaceId {
        self.target
    }

    pub fn compute<B: ComputeBackend>(&mut self, backend: &mut B, scene: SurfaceId) -> Result<SurfaceId> {
        let kernel = SeedKernel::new(self.threshold);
        backend.dispatch(&kernel, &Bindings::new().texture("scene", scene), self.target)?;
        Ok(self.target)
    }

    pub fn release<B: ComputeBackend>(self, backend: &mut B) {
        backend.destroy_surface(self.target);
    }
}

/// Propagation passes over a ping-pong pair
pub struct JumpFloodPass {
    width: u32,
    height: u32,
    buffers: DoubleBuffer<SurfaceId>,
}

impl JumpFloodPass {
    pub fn new<B: ComputeBackend>(backend: &mut B, width: u32, height: u32) -> Result<Self> {
        let desc = |label: &str| SurfaceDesc::new(label, width, height, SurfaceFormat::Rg32Float);
        let front = backend.create_surface(&desc("jfa_a"))?;
        let back = backend.create_surface(&desc("jfa_b"))?;
        log::info!(
            "Jump flood pass: {}x{}, {} propagation passes",
            width,
            height,
            pass_count(width, height)
        );
        Ok(Self {
            width,
            height,
            buffers: DoubleBuffer::new(front, back),
        })
    }

    pub fn passes(&self) -> u32 {
        pass_count(self.width, self.height)
    }

    /// Latest propagated records.
    pub fn output(&self) -> SurfaceId {
        self.buffers.read()
    }

    /// Propagate `seeds` into the pass's own buffers.
    ///
    /// `limit` truncates the schedule to its first `n` passes for preview;
    /// `Some(0)` runs a single identity pass.
    pub fn compute<B: ComputeBackend>(
        &mut self,
        backend: &mut B,
        seeds: SurfaceId,
        limit: Option<u32>,
    ) -> Result<SurfaceId> {
        let kernels: Vec<JumpFloodKernel> = match limit {
            Some(0) => vec![JumpFloodKernel::identity()],
            Some(n) => jump_schedule(self.width, self.height)
                .take(n as usize)
                .map(JumpFloodKernel::new)
                .collect(),
            None => jump_schedule(self.width, self.height)
                .map(JumpFloodKernel::new)
                .collect(),
        };
        log::debug!("Jump flood: {} passes", kernels.len());

        let mut source = seeds;
        for kernel in &kernels {
            let bindings = Bindings::new().texture("seeds", source);
            backend.dispatch(kernel, &bindings, self.buffers.write())?;
            let (read, _) = self.buffers.swap();
            source = read;
        }
        Ok(source)
    }

    pub fn release<B: ComputeBackend>(self, backend: &mut B) {
        for id in self.buffers.both() {
            backend.destroy_surface(id);
        }
    }
}
