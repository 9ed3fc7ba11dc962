//! Mesh
//!
//! A mesh is a set of named vertex streams that agree on their vertex count,
//! plus named index streams into them.

use std::fmt;
use std::sync::Arc;

use geomkit_core::math::{BoundingBox, Vec3};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attributes::{self, AttributeInfo};
use crate::buffer::{BufferData, SharedBuffer, TypedBuffer};
use crate::device::{BufferTarget, Device, UsageHint};
use crate::ingest::{ConfigValue, RawInput};
use crate::{IngestConfig, MeshError, MeshResult};

/// Summary statistics of a mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshMetadata {
    /// Number of vertices
    pub vertices: usize,
    /// Number of triangles
    pub faces: usize,
    /// Whether triangles come from an index stream
    pub indexed: bool,
}

/// Geometry made of named vertex and index buffers
pub struct Mesh {
    device: Arc<dyn Device>,
    config: IngestConfig,
    context_id: Option<u64>,
    vertex_buffers: IndexMap<String, SharedBuffer>,
    index_buffers: IndexMap<String, SharedBuffer>,
    bounding: Option<BoundingBox>,
    metadata: Option<MeshMetadata>,
    properties: IndexMap<String, Value>,
}

impl Mesh {
    /// Create an empty mesh on a device
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self::with_config(device, IngestConfig::default())
    }

    /// Create an empty mesh with explicit ingestion settings
    pub fn with_config(device: Arc<dyn Device>, config: IngestConfig) -> Self {
        Self {
            device,
            config,
            context_id: None,
            vertex_buffers: IndexMap::new(),
            index_buffers: IndexMap::new(),
            bounding: None,
            metadata: None,
            properties: IndexMap::new(),
        }
    }

    /// Create a mesh from vertex and index streams
    pub fn from_buffers<K, L>(
        device: Arc<dyn Device>,
        vertex: impl IntoIterator<Item = (K, RawInput)>,
        index: impl IntoIterator<Item = (L, RawInput)>,
    ) -> MeshResult<Self>
    where
        K: Into<String>,
        L: Into<String>,
    {
        let mut mesh = Self::new(device);
        mesh.add_vertex_buffers(vertex)?;
        mesh.add_index_buffers(index)?;
        Ok(mesh)
    }

    /// Create a mesh from a configuration dictionary, see [`configure`](Self::configure)
    pub fn load<K, V>(
        device: Arc<dyn Device>,
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> MeshResult<Self>
    where
        K: Into<String>,
        V: Into<ConfigValue>,
    {
        let mut mesh = Self::new(device);
        mesh.configure(entries)?;
        Ok(mesh)
    }

    /// Device buffers are uploaded to
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Move the mesh to another device.
    ///
    /// The next upload allocates fresh handles on the new device; handles
    /// the buffers hold on the old device stay valid there.
    pub fn set_device(&mut self, device: Arc<dyn Device>) {
        self.device = device;
        self.context_id = None;
    }

    /// Ingestion settings
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Render context this mesh was created for
    pub fn context_id(&self) -> Option<u64> {
        self.context_id
    }

    pub(crate) fn set_context_id(&mut self, id: u64) {
        self.context_id = Some(id);
    }

    /// Same device, settings and derived data, no buffers
    pub(crate) fn empty_like(&self) -> Self {
        Self {
            device: self.device.clone(),
            config: self.config.clone(),
            context_id: self.context_id,
            vertex_buffers: IndexMap::new(),
            index_buffers: IndexMap::new(),
            bounding: self.bounding,
            metadata: self.metadata,
            properties: self.properties.clone(),
        }
    }

    /// Run `f`, restoring the buffer tables if it fails.
    ///
    /// Buffers are only ever inserted or replaced in the tables, never
    /// mutated, so restoring the tables undoes the whole attempt.
    fn transact<T>(&mut self, f: impl FnOnce(&mut Self) -> MeshResult<T>) -> MeshResult<T> {
        let vertex_buffers = self.vertex_buffers.clone();
        let index_buffers = self.index_buffers.clone();
        let result = f(self);
        if result.is_err() {
            self.vertex_buffers = vertex_buffers;
            self.index_buffers = index_buffers;
        }
        result
    }

    /// Add vertex and index streams.
    ///
    /// On error the mesh is left as it was.
    pub fn add_buffers<K, L>(
        &mut self,
        vertex: impl IntoIterator<Item = (K, RawInput)>,
        index: impl IntoIterator<Item = (L, RawInput)>,
    ) -> MeshResult<()>
    where
        K: Into<String>,
        L: Into<String>,
    {
        self.transact(|mesh| {
            mesh.add_vertex_buffers(vertex)?;
            mesh.add_index_buffers(index)
        })
    }

    /// Add vertex streams.
    ///
    /// `vertices` is ingested first so it can establish the vertex count for
    /// streams whose spacing is derived. On error the mesh is left as it was.
    pub fn add_vertex_buffers<K: Into<String>>(
        &mut self,
        entries: impl IntoIterator<Item = (K, RawInput)>,
    ) -> MeshResult<()> {
        let mut entries: Vec<(String, RawInput)> =
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        if let Some(pos) = entries.iter().position(|(name, _)| name == "vertices") {
            let vertices = entries.remove(pos);
            entries.insert(0, vertices);
        }

        self.transact(|mesh| {
            for (name, raw) in entries {
                let info = attributes::lookup(&name);
                let element_type = info
                    .and_then(|info| info.element_type)
                    .unwrap_or(mesh.config.default_element_type);
                let data = raw.into_data(element_type, mesh.config.flatten_chunk)?;
                mesh.create_vertex_buffer(&name, None, None, Some(data))?;
            }
            Ok(())
        })
    }

    /// Add index streams, sized 16 or 32 bits by the current vertex count.
    ///
    /// On error the mesh is left as it was.
    pub fn add_index_buffers<K: Into<String>>(
        &mut self,
        entries: impl IntoIterator<Item = (K, RawInput)>,
    ) -> MeshResult<()> {
        let element_type = attributes::index_element_type(self.vertex_count());
        let flatten_chunk = self.config.flatten_chunk;
        let mut resolved: Vec<(String, BufferData)> = Vec::new();
        for (name, raw) in entries {
            resolved.push((name.into(), raw.into_data(element_type, flatten_chunk)?));
        }

        for (name, data) in resolved {
            self.create_index_buffer(&name, data);
        }
        Ok(())
    }

    /// Configure the mesh from a dictionary.
    ///
    /// Index stream names become index buffers, canonical vertex stream names
    /// become vertex buffers and anything else is stored as a property.
    /// Properties are only set once every buffer was accepted.
    pub fn configure<K, V>(&mut self, entries: impl IntoIterator<Item = (K, V)>) -> MeshResult<()>
    where
        K: Into<String>,
        V: Into<ConfigValue>,
    {
        let mut vertex = Vec::new();
        let mut index = Vec::new();
        let mut properties = Vec::new();

        for (name, value) in entries {
            let name = name.into();
            let value = value.into();
            if matches!(value, ConfigValue::Property(Value::Null)) {
                continue;
            }

            if attributes::is_index_buffer(&name) {
                index.push((name, value.into_raw()?));
            } else if attributes::lookup(&name).is_some() {
                vertex.push((name, value.into_raw()?));
            } else {
                properties.push((name, value.into_property()));
            }
        }

        self.add_buffers(vertex, index)?;
        for (name, value) in properties {
            log::debug!("Mesh property '{}' set from configuration", name);
            self.properties.insert(name, value);
        }
        Ok(())
    }

    /// Create or replace a vertex buffer.
    ///
    /// Missing arguments fall back to the canonical table: the attribute tag
    /// to `a_<name>`, the spacing to the data length over the vertex count and
    /// the data to zeros sized by the vertex count.
    pub fn create_vertex_buffer(
        &mut self,
        name: &str,
        attribute: Option<&str>,
        spacing: Option<usize>,
        data: Option<BufferData>,
    ) -> MeshResult<SharedBuffer> {
        let info = attributes::lookup(name);
        let expected = self.expected_vertex_count(name);

        let data = match data {
            Some(data) => data,
            None => {
                let count = expected.filter(|&n| n > 0).ok_or_else(|| {
                    MeshError::InvalidState(format!(
                        "cannot create empty buffer '{name}' in a mesh without vertices"
                    ))
                })?;
                let spacing = spacing.or(info.map(|info| info.spacing)).unwrap_or(3);
                let element_type = info
                    .and_then(|info| info.element_type)
                    .unwrap_or(self.config.default_element_type);
                BufferData::zeroed(element_type, count * spacing)
            }
        };

        let spacing = match spacing {
            Some(spacing) => spacing,
            None => resolve_spacing(name, data.len(), expected, info)?,
        };
        check_vertex_layout(name, data.len(), spacing, expected)?;

        if name == "vertices" {
            let count = data.len() / spacing;
            if let Some(other) = self.vertex_buffers.iter().find(|(n, b)| {
                let b = b.read();
                n.as_str() != "vertices" && b.has_data() && b.element_count() != count
            }) {
                log::warn!(
                    "Replacing vertices with {} entries leaves '{}' with a different count",
                    count,
                    other.0
                );
            }
        }

        let attribute = attribute.map_or_else(|| attributes::attribute_for(name), str::to_string);
        log::debug!(
            "Vertex buffer '{}' ({}, spacing {}, {} values of {:?})",
            name,
            attribute,
            spacing,
            data.len(),
            data.element_type()
        );

        let buffer = TypedBuffer::vertex(name, data, spacing)
            .with_attribute(attribute)
            .with_usage(self.config.default_usage)
            .into_shared();
        self.vertex_buffers.insert(name.to_string(), buffer.clone());
        Ok(buffer)
    }

    /// Create or replace an index buffer
    pub fn create_index_buffer(&mut self, name: &str, data: BufferData) -> SharedBuffer {
        log::debug!(
            "Index buffer '{}' ({} indices of {:?})",
            name,
            data.len(),
            data.element_type()
        );
        let buffer = TypedBuffer::index(name, data)
            .with_usage(self.config.default_usage)
            .into_shared();
        self.index_buffers.insert(name.to_string(), buffer.clone());
        buffer
    }

    /// Attach an existing buffer under `name`, by its target kind
    pub fn add_buffer(&mut self, name: &str, buffer: SharedBuffer) {
        let target = {
            let mut b = buffer.write();
            if b.attribute().is_none() && b.target() == BufferTarget::Vertex {
                b.set_attribute(attributes::attribute_for(name));
            }
            b.target()
        };
        match target {
            BufferTarget::Vertex => self.vertex_buffers.insert(name.to_string(), buffer),
            BufferTarget::Index => self.index_buffers.insert(name.to_string(), buffer),
        };
    }

    /// Detach a vertex buffer
    pub fn remove_vertex_buffer(&mut self, name: &str) -> Option<SharedBuffer> {
        self.vertex_buffers.shift_remove(name)
    }

    /// Detach an index buffer
    pub fn remove_index_buffer(&mut self, name: &str) -> Option<SharedBuffer> {
        self.index_buffers.shift_remove(name)
    }

    /// Get a vertex buffer
    pub fn vertex_buffer(&self, name: &str) -> Option<SharedBuffer> {
        self.vertex_buffers.get(name).cloned()
    }

    /// Get an index buffer
    pub fn index_buffer(&self, name: &str) -> Option<SharedBuffer> {
        self.index_buffers.get(name).cloned()
    }

    /// All vertex buffers in insertion order
    pub fn vertex_buffers(&self) -> impl Iterator<Item = (&str, &SharedBuffer)> {
        self.vertex_buffers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All index buffers in insertion order
    pub fn index_buffers(&self) -> impl Iterator<Item = (&str, &SharedBuffer)> {
        self.index_buffers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Check if a vertex buffer exists
    pub fn has_vertex_buffer(&self, name: &str) -> bool {
        self.vertex_buffers.contains_key(name)
    }

    /// Check if an index buffer exists
    pub fn has_index_buffer(&self, name: &str) -> bool {
        self.index_buffers.contains_key(name)
    }

    /// Number of vertices in the `vertices` stream, or 0
    pub fn num_vertices(&self) -> usize {
        self.vertex_buffers.get("vertices").map_or(0, |b| {
            let b = b.read();
            if b.spacing() == 0 { 0 } else { b.len() / b.spacing() }
        })
    }

    /// Vertex count from `vertices`, or from any other stream holding data
    pub fn vertex_count(&self) -> usize {
        match self.num_vertices() {
            0 => self
                .vertex_buffers
                .values()
                .map(|b| b.read())
                .find(|b| b.has_data() && b.spacing() > 0)
                .map_or(0, |b| b.element_count()),
            n => n,
        }
    }

    /// Count a new stream called `name` must match, if any
    fn expected_vertex_count(&self, name: &str) -> Option<usize> {
        if name == "vertices" {
            return None;
        }
        if let Some(vertices) = self.vertex_buffers.get("vertices") {
            let vertices = vertices.read();
            if vertices.has_data() {
                return Some(vertices.element_count());
            }
        }
        self.vertex_buffers
            .iter()
            .filter(|(n, _)| n.as_str() != name)
            .map(|(_, b)| b.read())
            .find(|b| b.has_data() && b.spacing() > 0)
            .map(|b| b.element_count())
    }

    /// Upload every buffer to the device
    pub fn upload(&self, usage: Option<UsageHint>) -> MeshResult<()> {
        let device = self.device.as_ref();
        for buffer in self.vertex_buffers.values() {
            buffer.write().upload(device, usage)?;
        }
        for buffer in self.index_buffers.values() {
            buffer.write().upload(device, None)?;
        }
        log::debug!(
            "Uploaded mesh ({} vertex, {} index buffers)",
            self.vertex_buffers.len(),
            self.index_buffers.len()
        );
        Ok(())
    }

    /// Drop host-side data of every buffer, keeping the device resources
    pub fn free_data(&mut self) {
        for buffer in self.vertex_buffers.values().chain(self.index_buffers.values()) {
            buffer.write().free_data();
        }
    }

    /// Check if every buffer lives only on the device
    pub fn is_device_only(&self) -> bool {
        let mut buffers = self
            .vertex_buffers
            .values()
            .chain(self.index_buffers.values())
            .peekable();
        buffers.peek().is_some() && buffers.all(|b| {
            let b = b.read();
            !b.has_data() && b.handle().is_some()
        })
    }

    /// Compute and store summary statistics
    pub fn generate_metadata(&mut self) -> MeshResult<MeshMetadata> {
        let vertices = self.num_vertices();
        if vertices == 0 {
            return Err(MeshError::MissingData(String::from("mesh has no vertices")));
        }

        let triangles = self.index_buffers.get("triangles").map(|b| b.read().len());
        let metadata = MeshMetadata {
            vertices,
            faces: triangles.map_or(vertices / 3, |len| len / 3),
            indexed: triangles.is_some(),
        };
        self.metadata = Some(metadata);
        Ok(metadata)
    }

    /// Last generated statistics
    pub fn metadata(&self) -> Option<&MeshMetadata> {
        self.metadata.as_ref()
    }

    /// Bounding box of a flat `xyz` stream
    pub fn compute_bounding(vertices: &[f32]) -> Option<BoundingBox> {
        BoundingBox::from_vertices(vertices)
    }

    /// Recompute the bounding box from the `vertices` stream
    pub fn update_bounding(&mut self) -> MeshResult<BoundingBox> {
        let bounding = {
            let vertices = self
                .vertex_buffers
                .get("vertices")
                .ok_or_else(|| MeshError::MissingData(String::from("mesh has no vertices")))?
                .read();
            let data = vertices
                .data()
                .ok_or_else(|| MeshError::MissingData(String::from("vertex data has been freed")))?;
            Self::compute_bounding(&data.to_f32())
                .ok_or_else(|| MeshError::MissingData(String::from("vertex stream is empty")))?
        };
        self.bounding = Some(bounding);
        Ok(bounding)
    }

    /// Force a bounding box
    pub fn set_bounding(&mut self, center: Vec3, half_size: Vec3) {
        self.bounding = Some(BoundingBox::from_center_half_size(center, half_size));
    }

    /// Current bounding box
    pub fn bounding(&self) -> Option<&BoundingBox> {
        self.bounding.as_ref()
    }

    pub(crate) fn set_bounding_box(&mut self, bounding: Option<BoundingBox>) {
        self.bounding = bounding;
    }

    /// Properties set through [`configure`](Self::configure)
    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    /// Get a property
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Set a property
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }
}

impl fmt::Debug for Mesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mesh")
            .field("context_id", &self.context_id)
            .field("vertex_buffers", &self.vertex_buffers.keys().collect::<Vec<_>>())
            .field("index_buffers", &self.index_buffers.keys().collect::<Vec<_>>())
            .field("bounding", &self.bounding)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Spacing of a stream whose spacing was not given
fn resolve_spacing(
    name: &str,
    len: usize,
    vertex_count: Option<usize>,
    info: Option<&AttributeInfo>,
) -> MeshResult<usize> {
    if let Some(info) = info {
        if info.homogeneous && vertex_count.is_some_and(|n| n > 0 && len == n * 4) {
            return Ok(4);
        }
        return Ok(info.spacing);
    }

    match vertex_count {
        None | Some(0) => Err(MeshError::InvalidState(format!(
            "cannot size buffer '{name}' without a known vertex count"
        ))),
        Some(n) if len == 0 || len % n != 0 => Err(MeshError::MalformedSpacing {
            name: name.to_string(),
            len,
            vertex_count: n,
        }),
        Some(n) => Ok(len / n),
    }
}

/// Check `len` splits into whole elements matching the mesh's vertex count
fn check_vertex_layout(
    name: &str,
    len: usize,
    spacing: usize,
    expected: Option<usize>,
) -> MeshResult<()> {
    if spacing == 0 || len % spacing != 0 {
        return Err(MeshError::MalformedSpacing {
            name: name.to_string(),
            len,
            vertex_count: if spacing == 0 { 0 } else { len / spacing },
        });
    }
    match expected {
        Some(expected) if expected != len / spacing => Err(MeshError::VertexCountMismatch {
            name: name.to_string(),
            expected,
            found: len / spacing,
        }),
        _ => Ok(()),
    }
}
