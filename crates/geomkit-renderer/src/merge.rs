//! Cloning and merging meshes

use std::sync::Arc;

use smallvec::SmallVec;

use crate::buffer::{BufferData, ElementType, TypedBuffer};
use crate::device::Device;
use crate::mesh::Mesh;
use crate::{MeshError, MeshResult};

fn host_copy(buffer: &TypedBuffer) -> MeshResult<TypedBuffer> {
    let data = buffer.data().cloned().ok_or_else(|| {
        MeshError::MissingData(format!("buffer '{}' has no host data to copy", buffer.name()))
    })?;

    let mut copy = TypedBuffer::new(buffer.target(), data, buffer.spacing())
        .with_name(buffer.name())
        .with_usage(buffer.usage());
    if let Some(attribute) = buffer.attribute() {
        copy.set_attribute(attribute);
    }
    Ok(copy)
}

fn same_names<'a>(expected: &[&str], names: impl Iterator<Item = &'a str>) -> bool {
    let names: SmallVec<[&str; 8]> = names.collect();
    names.len() == expected.len() && expected.iter().all(|name| names.contains(name))
}

impl Mesh {
    /// Independent copy of the mesh.
    ///
    /// Every buffer gets new host storage and no device resource; fails if
    /// a buffer's host data has been freed.
    pub fn deep_clone(&self) -> MeshResult<Mesh> {
        self.deep_clone_on(self.device().clone())
    }

    /// Independent copy of the mesh bound to `device`
    pub fn deep_clone_on(&self, device: Arc<dyn Device>) -> MeshResult<Mesh> {
        let mut mesh = self.empty_like();
        if !Arc::ptr_eq(self.device(), &device) {
            mesh.set_device(device);
        }
        for (name, buffer) in self.vertex_buffers().chain(self.index_buffers()) {
            let copy = host_copy(&buffer.read())?;
            mesh.add_buffer(name, copy.into_shared());
        }
        Ok(mesh)
    }

    /// New mesh referencing the same buffers.
    ///
    /// Writes through either mesh are visible in both.
    pub fn clone_shared(&self) -> Mesh {
        self.clone_shared_on(self.device().clone())
    }

    /// New mesh on `device` referencing the same buffers.
    ///
    /// Uploading it gives every buffer a handle on `device` alongside the
    /// one it may already hold elsewhere.
    pub fn clone_shared_on(&self, device: Arc<dyn Device>) -> Mesh {
        let mut mesh = self.empty_like();
        if !Arc::ptr_eq(self.device(), &device) {
            mesh.set_device(device);
        }
        for (name, buffer) in self.vertex_buffers().chain(self.index_buffers()) {
            mesh.add_buffer(name, buffer.clone());
        }
        mesh
    }

    /// Concatenate meshes with identical buffer layouts.
    ///
    /// Vertex streams become `f32`; index streams are shifted by the vertex
    /// count of the meshes before them and keep the first mesh's index type,
    /// widened to `u32` when the merged vertex count no longer fits.
    pub fn merge_meshes(meshes: &[&Mesh]) -> MeshResult<Mesh> {
        let Some((first, rest)) = meshes.split_first() else {
            return Err(MeshError::IncompatibleMeshes(String::from("nothing to merge")));
        };

        let vertex_names: Vec<&str> = first.vertex_buffers().map(|(name, _)| name).collect();
        let index_names: Vec<&str> = first.index_buffers().map(|(name, _)| name).collect();
        for (i, mesh) in rest.iter().enumerate() {
            if !same_names(&vertex_names, mesh.vertex_buffers().map(|(name, _)| name))
                || !same_names(&index_names, mesh.index_buffers().map(|(name, _)| name))
            {
                return Err(MeshError::IncompatibleMeshes(format!(
                    "mesh {} does not have the buffers of mesh 0",
                    i + 1
                )));
            }
        }

        log::debug!("Merging {} meshes", meshes.len());

        // Vertex offsets, in vertices
        let mut offsets: SmallVec<[usize; 8]> = SmallVec::with_capacity(meshes.len());
        let mut total_vertices = 0;
        for mesh in meshes {
            offsets.push(total_vertices);
            total_vertices += mesh.vertex_count();
        }

        let mut merged = Mesh::with_config(first.device().clone(), first.config().clone());

        for &name in &vertex_names {
            let mut data = Vec::new();
            let mut layout = None;
            for mesh in meshes {
                let Some(buffer) = mesh.vertex_buffer(name) else {
                    continue;
                };
                let buffer = buffer.read();
                let spacing = buffer.spacing();
                match layout {
                    None => layout = Some((spacing, buffer.attribute().map(str::to_string))),
                    Some((expected, _)) if expected != spacing => {
                        return Err(MeshError::IncompatibleMeshes(format!(
                            "'{name}' has spacing {spacing}, expected {expected}"
                        )));
                    }
                    Some(_) => {}
                }
                let values = buffer.data().ok_or_else(|| {
                    MeshError::MissingData(format!("buffer '{name}' has no host data to merge"))
                })?;
                data.extend_from_slice(&values.to_f32());
            }

            let (spacing, attribute) = layout.unwrap_or((3, None));
            merged.create_vertex_buffer(
                name,
                attribute.as_deref(),
                Some(spacing),
                Some(BufferData::F32(data)),
            )?;
        }

        for &name in &index_names {
            let mut indices: Vec<u32> = Vec::new();
            let mut element_type = None;
            for (mesh, &offset) in meshes.iter().zip(&offsets) {
                let Some(buffer) = mesh.index_buffer(name) else {
                    continue;
                };
                let buffer = buffer.read();
                let values = buffer.data().ok_or_else(|| {
                    MeshError::MissingData(format!("buffer '{name}' has no host data to merge"))
                })?;
                element_type.get_or_insert(values.element_type());
                indices.extend(values.to_u32().iter().map(|&i| i + offset as u32));
            }

            let mut element_type = element_type.unwrap_or(ElementType::U16);
            if element_type
                .max_index()
                .is_some_and(|max| total_vertices as u64 > max + 1)
            {
                log::warn!(
                    "Widening '{}' from {:?} to U32 for {} merged vertices",
                    name,
                    element_type,
                    total_vertices
                );
                element_type = ElementType::U32;
            }
            merged.create_index_buffer(name, BufferData::from_indices(element_type, indices));
        }

        if let Some(bounding) = meshes
            .iter()
            .map(|mesh| mesh.bounding().copied())
            .reduce(|a, b| a.zip(b).map(|(a, b)| a.merge(&b)))
            .flatten()
        {
            merged.set_bounding_box(Some(bounding));
        }

        log::info!(
            "Merged {} meshes into {} vertices",
            meshes.len(),
            total_vertices
        );
        Ok(merged)
    }
}
