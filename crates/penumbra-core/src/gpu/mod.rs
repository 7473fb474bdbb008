//! wgpu compute backend

mod cache;
mod pool;
mod present;
mod readback;
mod timing;

pub use cache::{KernelCache, KernelPipeline};
pub use pool::{SurfaceKey, TexturePool, SURFACE_USAGE};
pub use present::PRESENT_WGSL;
pub use timing::{summarize, PassTimer, PassTiming};

use std::collections::HashMap;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::backend::ComputeBackend;
use crate::grid::Grid;
use crate::kernel::{workgroup_count, Bindings, Kernel};
use crate::surface::{SurfaceDesc, SurfaceId};
use crate::{Error, Result};
use present::Presenter;

struct GpuSurface {
    desc: SurfaceDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Executes kernels as compute passes on a wgpu device.
///
/// Dispatches are recorded into one command encoder and submitted on
/// [`ComputeBackend::submit`], before uploads and readbacks, and after
/// presenting.
pub struct GpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    kernels: KernelCache,
    pool: TexturePool,
    surfaces: HashMap<SurfaceId, GpuSurface>,
    encoder: Option<wgpu::CommandEncoder>,
    presenter: Option<Presenter>,
    present_format: wgpu::TextureFormat,
    timer: Option<PassTimer>,
    frame: u64,
}

impl GpuBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, present_format: wgpu::TextureFormat) -> Self {
        let kernels = KernelCache::new(device.clone());
        let pool = TexturePool::new(device.clone());
        Self {
            device,
            queue,
            kernels,
            pool,
            surfaces: HashMap::new(),
            encoder: None,
            presenter: None,
            present_format,
            timer: None,
            frame: 0,
        }
    }

    /// Backend on the default adapter without a window, presenting to `Rgba8Unorm`.
    pub fn headless() -> Result<Self> {
        pollster::block_on(Self::request_headless())
    }

    async fn request_headless() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(Error::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("Using adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Penumbra Device"),
                    required_features: adapter.features() & wgpu::Features::TIMESTAMP_QUERY,
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        Ok(Self::new(
            Arc::new(device),
            Arc::new(queue),
            wgpu::TextureFormat::Rgba8Unorm,
        ))
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn kernel_cache(&self) -> &KernelCache {
        &self.kernels
    }

    /// View of a surface, for callers that sample it in their own passes.
    pub fn texture_view(&self, id: SurfaceId) -> Option<&wgpu::TextureView> {
        self.surfaces.get(&id).map(|s| &s.view)
    }

    /// Change the display format; the present pipeline is rebuilt lazily.
    pub fn set_present_format(&mut self, format: wgpu::TextureFormat) {
        if self.present_format != format {
            log::info!("Present format changed: {:?} -> {:?}", self.present_format, format);
            self.present_format = format;
            self.presenter = None;
        }
    }

    /// Turn per-dispatch GPU timing on or off. Returns whether timing is
    /// active, which needs a device with `TIMESTAMP_QUERY`.
    pub fn set_timing(&mut self, enabled: bool) -> bool {
        if !enabled {
            self.timer = None;
        } else if self.timer.is_none() {
            self.timer = PassTimer::new(self.device.clone());
        }
        self.timer.is_some()
    }

    pub fn is_timing(&self) -> bool {
        self.timer.is_some()
    }

    /// Submit pending work and return GPU time per kernel since the last call.
    /// Empty when timing is off.
    pub fn take_timings(&mut self) -> Result<Vec<PassTiming>> {
        self.submit();
        match self.timer.as_mut() {
            Some(timer) => timer.collect(&self.queue),
            None => Ok(Vec::new()),
        }
    }

    fn surface(&self, id: SurfaceId) -> Result<&GpuSurface> {
        self.surfaces
            .get(&id)
            .ok_or_else(|| Error::Binding(format!("unknown surface {:?}", id)))
    }

    fn write_texels(&mut self, id: SurfaceId, bytes: &[u8]) -> Result<()> {
        // Uploads go through the queue, so recorded work must land first
        self.submit();
        let surface = self.surface(id)?;
        let desc = &surface.desc;
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &surface.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(desc.format.bytes_per_texel() * desc.width),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }
}

impl ComputeBackend for GpuBackend {
    type Target = wgpu::TextureView;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId> {
        let limit = self.device.limits().max_texture_dimension_2d;
        let allocation_error = |message: String| Error::Allocation {
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
            format: desc.format,
            message,
        };
        if desc.width == 0 || desc.height == 0 {
            return Err(allocation_error("surfaces must have a non-zero extent".into()));
        }
        if desc.width > limit || desc.height > limit {
            return Err(allocation_error(format!("exceeds max texture dimension {}", limit)));
        }

        let key = SurfaceKey::from_desc(desc);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.pool.acquire(key, &desc.label);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        if let Some(err) = validation.or(out_of_memory) {
            return Err(allocation_error(err.to_string()));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
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
            GpuSurface {
                desc: desc.clone(),
                texture,
                view,
            },
        );
        Ok(id)
    }

    fn destroy_surface(&mut self, id: SurfaceId) {
        if let Some(surface) = self.surfaces.remove(&id) {
            log::debug!("Destroyed surface '{}' ({:?})", surface.desc.label, id);
            let key = SurfaceKey::from_desc(&surface.desc);
            self.pool.release(surface.texture, key, self.frame);
        }
    }

    fn surface_desc(&self, id: SurfaceId) -> Option<&SurfaceDesc> {
        self.surfaces.get(&id).map(|s| &s.desc)
    }

    fn upload(&mut self, id: SurfaceId, grid: &Grid) -> Result<()> {
        let desc = &self.surface(id)?.desc;
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
        let bytes = grid.format().encode(grid.data());
        self.write_texels(id, &bytes)
    }

    fn readback(&mut self, id: SurfaceId) -> Result<Grid> {
        self.submit();
        let surface = self.surface(id)?;
        readback::read_texture(&self.device, &self.queue, &surface.texture, &surface.desc)
    }

    fn clear(&mut self, id: SurfaceId) -> Result<()> {
        let desc = &self.surface(id)?.desc;
        let zeros = vec![0u8; desc.texel_count() * desc.format.bytes_per_texel() as usize];
        self.write_texels(id, &zeros)
    }

    fn copy(&mut self, src: SurfaceId, dst: SurfaceId) -> Result<()> {
        let source = self.surfaces.get(&src);
        let target = self.surfaces.get(&dst);
        let (source, target) = match (source, target) {
            (Some(s), Some(t)) => (s, t),
            _ => return Err(Error::Binding(format!("cannot copy {:?} into {:?}: unknown surface", src, dst))),
        };
        if SurfaceKey::from_desc(&source.desc) != SurfaceKey::from_desc(&target.desc) {
            return Err(Error::Binding(format!(
                "cannot copy '{}' into '{}': shapes differ",
                source.desc.label, target.desc.label
            )));
        }

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Penumbra Encoder"),
            })
        });
        encoder.copy_texture_to_texture(
            source.texture.as_image_copy(),
            target.texture.as_image_copy(),
            wgpu::Extent3d {
                width: source.desc.width,
                height: source.desc.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn dispatch(&mut self, kernel: &dyn Kernel, bindings: &Bindings, output: SurfaceId) -> Result<()> {
        let inputs = bindings.resolve(kernel, output)?;
        let pipeline = self.kernels.get_or_create(kernel)?;

        let target = self.surface(output)?;
        if target.desc.format != kernel.output_format() {
            return Err(Error::Binding(format!(
                "kernel `{}` writes {:?} but '{}' is {:?}",
                kernel.label(),
                kernel.output_format(),
                target.desc.label,
                target.desc.format
            )));
        }
        let (groups_x, groups_y) = workgroup_count(target.desc.width, target.desc.height);
        log::trace!(
            "Dispatching `{}` over '{}' ({}x{} groups)",
            kernel.label(),
            target.desc.label,
            groups_x,
            groups_y
        );

        // Uniform buffers are bound whole, so pad to a 16-byte multiple
        let mut params = kernel.params().to_vec();
        params.resize(params.len().div_ceil(16).max(1) * 16, 0);
        let uniforms = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(kernel.label()),
            contents: &params,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = Vec::with_capacity(inputs.len() + 2);
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: uniforms.as_entire_binding(),
        });
        for (slot, id) in inputs.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32 + 1,
                resource: wgpu::BindingResource::TextureView(&self.surface(*id)?.view),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: inputs.len() as u32 + 1,
            resource: wgpu::BindingResource::TextureView(&target.view),
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.label()),
            layout: &pipeline.bind_group_layout,
            entries: &entries,
        });

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Penumbra Encoder"),
            })
        });
        let timestamp_writes = self.timer.as_mut().and_then(|timer| timer.begin(kernel.label()));
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.label()),
            timestamp_writes,
        });
        pass.set_pipeline(&pipeline.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(groups_x, groups_y, 1);
        Ok(())
    }

    fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
            self.frame += 1;
            self.pool.cleanup_old(self.frame);
        }
    }

    fn present(&mut self, id: SurfaceId, target: &mut wgpu::TextureView) -> Result<()> {
        if self.presenter.is_none() {
            self.presenter = Some(Presenter::new(&self.device, self.present_format)?);
        }
        let source = self.surface(id)?;
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Penumbra Present Encoder"),
        });
        if let Some(presenter) = &self.presenter {
            presenter.draw(&self.device, &mut encoder, &source.view, source.desc.filter, target);
        }
        // Pending dispatches first, then the blit
        if let Some(pending) = self.encoder.take() {
            self.queue.submit([pending.finish(), encoder.finish()]);
        } else {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.frame += 1;
        self.pool.cleanup_old(self.frame);
        Ok(())
    }
}
