use std::path::PathBuf;

use thiserror::Error;

/// Geometry that cannot be drawn. Raised when a mesh is constructed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("vertex buffer is empty")]
    EmptyVertices,
    #[error("vertex buffer of {length} bytes is not a multiple of the {stride}-byte vertex stride")]
    VertexStride { length: usize, stride: usize },
    #[error("index buffer is empty")]
    EmptyIndices,
    #[error("index buffer of {length} bytes does not hold whole u32 indices")]
    IndexAlignment { length: usize },
    #[error("{count} indices do not form whole triangles")]
    PartialTriangle { count: usize },
    #[error("index {index} references vertex beyond the {vertex_count} supplied")]
    IndexOutOfRange { index: u32, vertex_count: u32 },
}

/// Texture loads that failed. The affected slot falls back to no texture.
#[derive(Debug, Error)]
pub enum TextureError {
    #[error("unable to decode texture {}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("texture {name} has zero area")]
    Empty { name: String },
    #[error("texture {name} holds {actual} bytes, {expected} expected for its size")]
    DataLength {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("texture {name} is {width}x{height}, the device allows at most {max} per side")]
    TooLarge {
        name: String,
        width: u32,
        height: u32,
        max: u32,
    },
    #[error("{layout} meshes carry no texture coordinates")]
    NoTexCoords { layout: &'static str },
    #[error("texture upload did not complete: {0}")]
    Device(#[from] wgpu::PollError),
    #[error("texture upload was abandoned before completion")]
    Abandoned,
}

/// Failures of the offscreen compositor.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render target must have a non-zero size, got {width}x{height}")]
    ZeroTarget { width: u32, height: u32 },
    #[error("render was abandoned before the GPU finished")]
    Abandoned,
    #[error("failed to map readback buffer: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
}
