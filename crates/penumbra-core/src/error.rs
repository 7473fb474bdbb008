use thiserror::Error;

use crate::surface::SurfaceFormat;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Kernel `{kernel}` failed to compile: {message}")]
    Shader { kernel: String, message: String },

    #[error("Cannot allocate surface `{label}` ({width}x{height} {format:?}): {message}")]
    Allocation {
        label: String,
        width: u32,
        height: u32,
        format: SurfaceFormat,
        message: String,
    },

    #[error("Binding error: {0}")]
    Binding(String),

    #[error("No compatible GPU adapter found")]
    NoAdapter,

    #[error("GPU device error: {0}")]
    Device(String),

    #[error("Readback failed: {0}")]
    Readback(String),

    #[error("WGPU error: {0}")]
    Wgpu(String),
}

impl From<wgpu::Error> for Error {
    fn from(err: wgpu::Error) -> Self {
        Error::Wgpu(err.to_string())
    }
}

impl From<wgpu::RequestDeviceError> for Error {
    fn from(err: wgpu::RequestDeviceError) -> Self {
        Error::Device(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
