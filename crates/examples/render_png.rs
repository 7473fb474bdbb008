//! Headless render of a small lit scene to a PNG
//!
//! Usage: render_png [output.png] [size]
//!
//! Uses the GPU when an adapter is available and the CPU reference backend
//! otherwise.

use glam::{Vec2, Vec4};
use penumbra::{
    ComputeBackend, CpuBackend, Error, GpuBackend, Grid, RadianceConfig, RadiancePipeline, Scene, SurfaceFormat,
};

fn paint(scene: &mut Scene) {
    let size = Vec2::new(scene.width() as f32, scene.height() as f32);
    let black = Vec4::new(0.0, 0.0, 0.0, 1.0);

    scene.fill_circle(size * Vec2::new(0.25, 0.3), size.x * 0.05, Vec4::new(1.0, 0.7, 0.3, 1.0));
    scene.fill_circle(size * Vec2::new(0.75, 0.7), size.x * 0.04, Vec4::new(0.3, 0.5, 1.0, 1.0));
    scene.stroke(size * Vec2::new(0.5, 0.1), size * Vec2::new(0.5, 0.6), size.x * 0.01, black);
    scene.stroke(size * Vec2::new(0.15, 0.8), size * Vec2::new(0.4, 0.8), size.x * 0.01, black);
}

fn render<B: ComputeBackend>(backend: B, size: u32, config: RadianceConfig) -> penumbra::Result<Grid> {
    let mut pipeline = RadiancePipeline::new(backend, size, size, config)?;
    paint(pipeline.scene_mut());
    let report = pipeline.compute()?;
    log::info!("Rendered {:?}", report);
    let output = pipeline.output();
    pipeline.backend_mut().readback(output)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "penumbra.png".to_string());
    let size: u32 = match args.next() {
        Some(value) => value.parse()?,
        None => 256,
    };
    let config = RadianceConfig::default().with_sun(0.8);

    let grid = match GpuBackend::headless() {
        Ok(gpu) => render(gpu, size, config)?,
        Err(Error::NoAdapter) => {
            log::warn!("No GPU adapter found, rendering on the CPU");
            render(CpuBackend::new(), size, config)?
        }
        Err(err) => return Err(err.into()),
    };

    let bytes = SurfaceFormat::Rgba8Unorm.encode(grid.data());
    let image = image::RgbaImage::from_raw(grid.width(), grid.height(), bytes)
        .ok_or("output size does not match pixel data")?;
    image.save(&path)?;
    log::info!("Wrote {}", path);
    Ok(())
}
