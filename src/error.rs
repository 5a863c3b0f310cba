//! Error type shared by the backends and pipelines.

use std::path::PathBuf;

/// Errors surfaced by GPU setup, shader loading and picking readbacks.
///
/// Most setup failures inside the pipeline are logged rather than returned; this type
/// covers the operations where a caller can meaningfully react.
#[derive(Debug)]
pub enum PipelineError {
    /// A shader source file could not be read.
    Io { path: PathBuf, source: std::io::Error },
    /// The window surface could not be created or acquired.
    Surface(String),
    /// No GPU adapter matched the surface.
    AdapterUnavailable,
    /// The logical device could not be created.
    DeviceRequest(String),
    /// A pixel readback failed to map.
    Readback(String),
    /// The requested pixel lies outside the target.
    PixelOutOfBounds { x: u32, y: u32, width: u32, height: u32 },
    /// No strategy is registered under this name.
    UnknownStrategy(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Io { path, source } => {
                write!(f, "failed to read '{}': {}", path.display(), source)
            }
            PipelineError::Surface(msg) => write!(f, "surface error: {}", msg),
            PipelineError::AdapterUnavailable => write!(f, "no suitable GPU adapter found"),
            PipelineError::DeviceRequest(msg) => write!(f, "device request failed: {}", msg),
            PipelineError::Readback(msg) => write!(f, "pixel readback failed: {}", msg),
            PipelineError::PixelOutOfBounds {
                x,
                y,
                width,
                height,
            } => write!(f, "pixel ({}, {}) outside {}x{} target", x, y, width, height),
            PipelineError::UnknownStrategy(name) => {
                write!(f, "unknown render strategy: '{}'", name)
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<wgpu::SurfaceError> for PipelineError {
    fn from(e: wgpu::SurfaceError) -> Self {
        PipelineError::Surface(e.to_string())
    }
}

impl From<wgpu::CreateSurfaceError> for PipelineError {
    fn from(e: wgpu::CreateSurfaceError) -> Self {
        PipelineError::Surface(e.to_string())
    }
}

impl From<wgpu::RequestDeviceError> for PipelineError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        PipelineError::DeviceRequest(e.to_string())
    }
}

impl From<wgpu::BufferAsyncError> for PipelineError {
    fn from(e: wgpu::BufferAsyncError) -> Self {
        PipelineError::Readback(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_keeps_source() {
        let err = PipelineError::Io {
            path: PathBuf::from("shaders/lighting.wgsl"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("lighting.wgsl"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn out_of_bounds_message() {
        let err = PipelineError::PixelOutOfBounds {
            x: 2000,
            y: 4,
            width: 1024,
            height: 1024,
        };
        assert_eq!(err.to_string(), "pixel (2000, 4) outside 1024x1024 target");
    }
}
