//! # Geomkit Renderer
//!
//! Host-side geometry for GPU rendering.
//!
//! ## Features
//! - Typed vertex and index buffers with lazy device upload
//! - Meshes built from raw, nested or typed arrays
//! - Derived normals, tangents, wireframe edges and bounds
//! - Deep and shared cloning, mesh merging with index remapping
//! - Render context owning the device and its mesh cache

pub mod attributes;
pub mod buffer;
pub mod context;
pub mod device;
pub mod geometry;
pub mod ingest;
pub mod merge;
pub mod mesh;
pub mod wgpu_device;

pub use buffer::{BufferData, ElementType, SharedBuffer, TypedBuffer};
pub use context::RenderContext;
pub use device::{BufferHandle, BufferTarget, Device, DeviceId, MemoryDevice, UsageHint};
pub use ingest::{ConfigValue, RawInput};
pub use mesh::{Mesh, MeshMetadata};
pub use wgpu_device::WgpuDevice;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mesh and buffer errors
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Incompatible meshes: {0}")]
    IncompatibleMeshes(String),

    #[error("Malformed spacing in '{name}': {len} values over {vertex_count} vertices")]
    MalformedSpacing {
        name: String,
        len: usize,
        vertex_count: usize,
    },

    #[error("Vertex count mismatch in '{name}': expected {expected}, found {found}")]
    VertexCountMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Device error: {0}")]
    Device(String),
}

/// Result type for mesh operations
pub type MeshResult<T> = Result<T, MeshError>;

/// How raw input is turned into buffers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Rows flattened per step when ingesting nested arrays
    pub flatten_chunk: usize,
    /// Element type for plain numeric input without a canonical override
    pub default_element_type: ElementType,
    /// Usage hint given to newly created buffers
    pub default_usage: UsageHint,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            flatten_chunk: 10_000,
            default_element_type: ElementType::F32,
            default_usage: UsageHint::Static,
        }
    }
}
