//! # Geomkit Assets
//!
//! Mesh loading for geomkit.
//!
//! ## Features
//! - Parser registry keyed by file extension
//! - JSON mesh format (named number arrays plus free-form properties)
//! - Import post-processing (scale, normals, tangents, bounds)
//! - JSON export of host-side mesh data

use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;
use geomkit_core::math::{Mat4, Vec3};
use geomkit_renderer::{ConfigValue, Mesh, MeshError, RenderContext};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Asset errors
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Parse failed: {0}")]
    ParseFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

/// Turns file contents into mesh buffers
pub trait MeshParser: Send + Sync {
    /// Lowercase extensions handled, without the dot
    fn extensions(&self) -> &[&str];

    /// Fill `mesh` from `bytes`
    fn parse(&self, bytes: &[u8], mesh: &mut Mesh) -> AssetResult<()>;
}

/// JSON object of stream name to number array.
///
/// Arrays may be flat or nested one level; keys that are not stream names
/// become mesh properties.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMeshParser;

impl MeshParser for JsonMeshParser {
    fn extensions(&self) -> &[&str] {
        &["json"]
    }

    fn parse(&self, bytes: &[u8], mesh: &mut Mesh) -> AssetResult<()> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| AssetError::ParseFailed(e.to_string()))?;
        let Value::Object(entries) = value else {
            return Err(AssetError::ParseFailed(String::from(
                "expected a JSON object at the top level",
            )));
        };
        mesh.configure(
            entries
                .into_iter()
                .map(|(name, value)| (name, ConfigValue::Property(value))),
        )?;
        Ok(())
    }
}

/// Export the host-side data and properties of a mesh as a JSON object
pub fn mesh_to_json(mesh: &Mesh) -> AssetResult<Value> {
    let mut out = Map::new();
    for (name, buffer) in mesh.vertex_buffers().chain(mesh.index_buffers()) {
        let buffer = buffer.read();
        let data = buffer.data().ok_or_else(|| {
            MeshError::MissingData(format!("buffer '{name}' has no host data to export"))
        })?;
        out.insert(
            name.to_string(),
            Value::Array(data.to_f64_vec().into_iter().map(Value::from).collect()),
        );
    }
    for (name, value) in mesh.properties() {
        out.entry(name.clone()).or_insert_with(|| value.clone());
    }
    Ok(Value::Object(out))
}

/// Registered parsers, keyed by extension
#[derive(Default)]
pub struct ParserRegistry {
    parsers: RwLock<AHashMap<String, Arc<dyn MeshParser>>>,
}

impl ParserRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in parsers
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(JsonMeshParser));
        registry
    }

    /// Register a parser for all of its extensions
    pub fn register(&self, parser: Arc<dyn MeshParser>) {
        let mut parsers = self.parsers.write();
        for ext in parser.extensions() {
            log::debug!("Registered mesh parser for .{}", ext);
            parsers.insert(ext.to_ascii_lowercase(), parser.clone());
        }
    }

    /// Get the parser for an extension
    pub fn get(&self, ext: &str) -> Option<Arc<dyn MeshParser>> {
        self.parsers.read().get(&ext.to_ascii_lowercase()).cloned()
    }

    /// Registered extensions, sorted
    pub fn extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.parsers.read().keys().cloned().collect();
        extensions.sort();
        extensions
    }
}

/// Processing applied to freshly parsed meshes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshImportSettings {
    /// Uniform scale applied to `vertices`
    pub scale: f32,
    /// Compute normals when the file has none
    pub generate_normals: bool,
    /// Compute tangents when the mesh supports them
    pub calculate_tangents: bool,
    /// Compute the bounding box
    pub compute_bounding: bool,
}

impl Default for MeshImportSettings {
    fn default() -> Self {
        Self {
            scale: 1.0,
            generate_normals: false,
            calculate_tangents: false,
            compute_bounding: true,
        }
    }
}

/// Loads meshes from files or bytes into a render context
pub struct MeshLoader {
    registry: ParserRegistry,
    context: Arc<RenderContext>,
    settings: MeshImportSettings,
}

impl MeshLoader {
    /// Create a loader with the built-in parsers
    pub fn new(context: Arc<RenderContext>) -> Self {
        Self::with_settings(context, MeshImportSettings::default())
    }

    /// Create a loader with explicit import settings
    pub fn with_settings(context: Arc<RenderContext>, settings: MeshImportSettings) -> Self {
        Self {
            registry: ParserRegistry::with_defaults(),
            context,
            settings,
        }
    }

    /// Parser registry, for adding formats
    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    /// Import settings
    pub fn settings(&self) -> &MeshImportSettings {
        &self.settings
    }

    /// Context meshes are created in
    pub fn context(&self) -> &Arc<RenderContext> {
        &self.context
    }

    /// Load a mesh file, picking the parser by extension
    pub fn load_file(&self, path: impl AsRef<Path>) -> AssetResult<Mesh> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                AssetError::UnsupportedFormat(format!("{} has no extension", path.display()))
            })?;
        if !path.exists() {
            return Err(AssetError::NotFound(path.display().to_string()));
        }

        let bytes = std::fs::read(path)?;
        log::info!("Loading mesh {} ({} bytes)", path.display(), bytes.len());
        self.load_bytes(ext, &bytes)
    }

    /// Parse a mesh from bytes in the format of `ext`
    pub fn load_bytes(&self, ext: &str, bytes: &[u8]) -> AssetResult<Mesh> {
        let parser = self
            .registry
            .get(ext)
            .ok_or_else(|| AssetError::UnsupportedFormat(ext.to_string()))?;

        let mut mesh = self.context.create_mesh();
        parser.parse(bytes, &mut mesh)?;
        self.post_process(&mut mesh)?;

        log::debug!(
            "Parsed .{} mesh with {} vertices",
            ext,
            mesh.num_vertices()
        );
        Ok(mesh)
    }

    fn post_process(&self, mesh: &mut Mesh) -> AssetResult<()> {
        let Some(vertices) = mesh.vertex_buffer("vertices") else {
            return Ok(());
        };

        if self.settings.scale != 1.0 {
            let scale = Mat4::from_scale(Vec3::splat(self.settings.scale));
            vertices.write().apply_transform(&scale)?;
        }
        if self.settings.generate_normals && !mesh.has_vertex_buffer("normals") {
            mesh.compute_normals(None)?;
        }
        if self.settings.calculate_tangents {
            mesh.compute_tangents()?;
        }
        if self.settings.compute_bounding {
            mesh.update_bounding()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geomkit_renderer::{BufferData, ElementType, MemoryDevice};
    use serde_json::json;

    const TRIANGLE: &str = r#"{
        "vertices": [[0, 0, 0], [1, 0, 0], [0, 1, 0]],
        "coords": [0, 0, 1, 0, 0, 1],
        "triangles": [0, 1, 2],
        "name": "triangle"
    }"#;

    fn loader(settings: MeshImportSettings) -> MeshLoader {
        let context = Arc::new(RenderContext::new(Arc::new(MemoryDevice::new())));
        MeshLoader::with_settings(context, settings)
    }

    #[test]
    fn test_load_json_bytes() {
        let loader = loader(MeshImportSettings::default());
        let mesh = loader.load_bytes("JSON", TRIANGLE.as_bytes()).unwrap();

        assert_eq!(mesh.num_vertices(), 3);
        assert_eq!(mesh.property("name"), Some(&json!("triangle")));
        assert_eq!(mesh.context_id(), Some(loader.context().id()));
        let triangles = mesh.index_buffer("triangles").unwrap();
        assert_eq!(triangles.read().element_type(), Some(ElementType::U16));
        assert!(mesh.bounding().is_some());
    }

    #[test]
    fn test_post_processing() {
        let loader = loader(MeshImportSettings {
            scale: 2.0,
            generate_normals: true,
            calculate_tangents: true,
            ..Default::default()
        });
        let mesh = loader.load_bytes("json", TRIANGLE.as_bytes()).unwrap();

        assert!(mesh.has_vertex_buffer("normals"));
        assert!(mesh.has_vertex_buffer("tangents"));
        assert_eq!(mesh.bounding().unwrap().max(), Vec3::new(2.0, 2.0, 0.0));
    }

    #[test]
    fn test_unsupported_format() {
        let loader = loader(MeshImportSettings::default());
        assert!(matches!(
            loader.load_bytes("obj", b"v 0 0 0"),
            Err(AssetError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            loader.load_file("mesh_without_extension"),
            Err(AssetError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_parse_failures() {
        let loader = loader(MeshImportSettings::default());
        assert!(matches!(loader.load_bytes("json", b"[1, 2, 3]"), Err(AssetError::ParseFailed(_))));
        assert!(matches!(loader.load_bytes("json", b"{ oops"), Err(AssetError::ParseFailed(_))));
        assert!(matches!(
            loader.load_bytes("json", br#"{ "vertices": [0, 0, 0, 1] }"#),
            Err(AssetError::Mesh(MeshError::MalformedSpacing { .. }))
        ));
    }

    #[test]
    fn test_load_file() {
        let loader = loader(MeshImportSettings::default());
        let missing = std::env::temp_dir().join("geomkit_missing_mesh.json");
        assert!(matches!(loader.load_file(&missing), Err(AssetError::NotFound(_))));

        let path = std::env::temp_dir().join(format!("geomkit_assets_{}.json", std::process::id()));
        std::fs::write(&path, TRIANGLE).unwrap();
        let mesh = loader.load_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(mesh.num_vertices(), 3);
    }

    #[test]
    fn test_export() {
        let loader = loader(MeshImportSettings::default());
        let mut mesh = loader.load_bytes("json", TRIANGLE.as_bytes()).unwrap();

        let exported = mesh_to_json(&mesh).unwrap();
        assert_eq!(exported["triangles"], json!([0.0, 1.0, 2.0]));
        assert_eq!(exported["vertices"].as_array().unwrap().len(), 9);
        assert_eq!(exported["name"], json!("triangle"));

        let reloaded = loader
            .load_bytes("json", exported.to_string().as_bytes())
            .unwrap();
        let vertices = reloaded.vertex_buffer("vertices").unwrap();
        assert_eq!(
            vertices.read().data(),
            Some(&BufferData::F32(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]))
        );

        mesh.free_data();
        assert!(matches!(mesh_to_json(&mesh), Err(AssetError::Mesh(MeshError::MissingData(_)))));
    }

    #[test]
    fn test_registry_extensions() {
        struct Stl;
        impl MeshParser for Stl {
            fn extensions(&self) -> &[&str] {
                &["stl"]
            }
            fn parse(&self, _bytes: &[u8], _mesh: &mut Mesh) -> AssetResult<()> {
                Err(AssetError::ParseFailed(String::from("binary stl")))
            }
        }

        let registry = ParserRegistry::with_defaults();
        registry.register(Arc::new(Stl));
        assert_eq!(registry.extensions(), vec!["json", "stl"]);
        assert!(registry.get("STL").is_some());
        assert!(registry.get("obj").is_none());
    }
}
