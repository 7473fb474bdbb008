use std::sync::mpsc;

use crate::grid::Grid;
use crate::surface::SurfaceDesc;
use crate::{Error, Result};

/// Align number to WebGPU's copy row alignment (256 bytes).
fn align_bpr(value: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    value.div_ceil(align) * align
}

/// Copy a texture into a tight host grid, stripping row padding.
pub fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    desc: &SurfaceDesc,
) -> Result<Grid> {
    let (width, height) = (desc.width, desc.height);
    let tight_bpr = desc.format.bytes_per_texel() * width;
    let padded_bpr = align_bpr(tight_bpr);

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("penumbra-readback-staging"),
        size: padded_bpr as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("penumbra-readback-encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bpr),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    receiver
        .recv()
        .map_err(|_| Error::Readback("map_async callback channel dropped".into()))?
        .map_err(|err| Error::Readback(err.to_string()))?;

    let mut tight = Vec::with_capacity((tight_bpr * height) as usize);
    {
        let data = slice.get_mapped_range();
        for row in data.chunks_exact(padded_bpr as usize) {
            tight.extend_from_slice(&row[..tight_bpr as usize]);
        }
    }
    staging.unmap();

    Grid::from_data(width, height, desc.format, desc.format.decode(&tight))
}

#[cfg(test)]
mod tests {
    use super::align_bpr;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(align_bpr(4), 256);
        assert_eq!(align_bpr(256), 256);
        assert_eq!(align_bpr(260), 512);
    }
}
