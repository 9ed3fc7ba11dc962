//! Render context
//!
//! Owns the device meshes are created on and a cache of shared meshes that
//! lives as long as the context.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::device::Device;
use crate::ingest::{ConfigValue, RawInput};
use crate::mesh::Mesh;
use crate::{IngestConfig, MeshResult};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Cache key of the screen quad
pub const SCREEN_QUAD: &str = "screen_quad";

const QUAD_VERTICES: [f32; 18] = [
    0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0,
];
const QUAD_COORDS: [f32; 12] = [0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0];

/// Device plus the meshes cached for it
pub struct RenderContext {
    id: u64,
    device: Arc<dyn Device>,
    config: IngestConfig,
    meshes: Mutex<AHashMap<String, Arc<Mesh>>>,
}

impl RenderContext {
    /// Create a context on a device
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self::with_config(device, IngestConfig::default())
    }

    /// Create a context with explicit ingestion settings for its meshes
    pub fn with_config(device: Arc<dyn Device>, config: IngestConfig) -> Self {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("Render context {} created", id);
        Self {
            id,
            device,
            config,
            meshes: Mutex::new(AHashMap::new()),
        }
    }

    /// Unique id of this context
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Device of this context
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Settings given to new meshes
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Create an empty mesh bound to this context
    pub fn create_mesh(&self) -> Mesh {
        let mut mesh = Mesh::with_config(self.device.clone(), self.config.clone());
        mesh.set_context_id(self.id);
        mesh
    }

    /// Create a mesh from a configuration dictionary
    pub fn load_mesh<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> MeshResult<Mesh>
    where
        K: Into<String>,
        V: Into<ConfigValue>,
    {
        let mut mesh = self.create_mesh();
        mesh.configure(entries)?;
        Ok(mesh)
    }

    /// Unit quad over `[0, 1]²` with texture coordinates, uploaded once per context
    pub fn screen_quad(&self) -> MeshResult<Arc<Mesh>> {
        let mut meshes = self.meshes.lock();
        if let Some(mesh) = meshes.get(SCREEN_QUAD) {
            return Ok(mesh.clone());
        }

        let mut mesh = self.create_mesh();
        mesh.add_vertex_buffers([
            ("vertices", RawInput::from(QUAD_VERTICES.to_vec())),
            ("coords", RawInput::from(QUAD_COORDS.to_vec())),
        ])?;
        mesh.upload(None)?;

        let mesh = Arc::new(mesh);
        meshes.insert(SCREEN_QUAD.to_string(), mesh.clone());
        Ok(mesh)
    }

    /// Get a cached mesh
    pub fn cached(&self, name: &str) -> Option<Arc<Mesh>> {
        self.meshes.lock().get(name).cloned()
    }

    /// Cache a mesh under `name`, returning the one it replaces
    pub fn cache_mesh(&self, name: impl Into<String>, mesh: Arc<Mesh>) -> Option<Arc<Mesh>> {
        self.meshes.lock().insert(name.into(), mesh)
    }

    /// Number of cached meshes
    pub fn cached_count(&self) -> usize {
        self.meshes.lock().len()
    }

    /// Drop every cached mesh
    pub fn clear_cache(&self) {
        self.meshes.lock().clear();
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("cached", &self.cached_count())
            .finish_non_exhaustive()
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        let meshes = self.meshes.get_mut();
        log::debug!("Render context {} dropped with {} cached meshes", self.id, meshes.len());
        meshes.clear();
    }
}
