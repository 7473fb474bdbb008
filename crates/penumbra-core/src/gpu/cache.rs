//! Compute pipeline cache keyed by kernel label

use crate::kernel::Kernel;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Compiled kernel and the bind group layout it was built against
pub struct KernelPipeline {
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub pipeline: wgpu::ComputePipeline,
}

/// Compiles each kernel once and hands out shared pipelines
pub struct KernelCache {
    device: Arc<wgpu::Device>,
    cache: HashMap<&'static str, Arc<KernelPipeline>>,
}

impl KernelCache {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self {
            device,
            cache: HashMap::new(),
        }
    }

    /// Get or compile the pipeline for a kernel
    pub fn get_or_create(&mut self, kernel: &dyn Kernel) -> Result<Arc<KernelPipeline>> {
        let label = kernel.label();

        if let Some(pipeline) = self.cache.get(label) {
            log::trace!("Using cached compute pipeline: {}", label);
            return Ok(pipeline.clone());
        }

        log::info!("Creating compute pipeline: {}", label);

        // Compilation and layout mismatches surface as validation errors
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader_module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(kernel.source().into()),
        });

        let bind_group_layout = create_bind_group_layout(&self.device, kernel);

        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{}_layout", label)),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("Kernel `{}` failed to compile: {}", label, err);
            return Err(Error::Shader {
                kernel: label.to_string(),
                message: err.to_string(),
            });
        }

        let pipeline = Arc::new(KernelPipeline {
            bind_group_layout,
            pipeline,
        });
        self.cache.insert(label, pipeline.clone());

        Ok(pipeline)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Clear the pipeline cache
    pub fn clear(&mut self) {
        log::info!("Clearing kernel cache ({} pipelines)", self.cache.len());
        self.cache.clear();
    }
}

/// Uniform at 0, sampled inputs at 1..=n, storage output at n+1
fn create_bind_group_layout(device: &wgpu::Device, kernel: &dyn Kernel) -> wgpu::BindGroupLayout {
    let inputs = kernel.inputs();
    let mut entries = Vec::with_capacity(inputs.len() + 2);

    entries.push(wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });

    for slot in 0..inputs.len() {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot as u32 + 1,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
    }

    entries.push(wgpu::BindGroupLayoutEntry {
        binding: inputs.len() as u32 + 1,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: kernel.output_format().wgpu_format(),
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    });

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{}_bind_group_layout", kernel.label())),
        entries: &entries,
    })
}
