//! Derived attributes
//!
//! Normals, tangents and wireframe edges computed from the `vertices`,
//! `normals`, `coords` and `triangles` streams of a mesh.

use geomkit_core::indexer::Indexer;
use geomkit_core::math::{Vec2, Vec3};

use crate::attributes;
use crate::buffer::{BufferData, SharedBuffer, TypedBuffer};
use crate::device::UsageHint;
use crate::mesh::Mesh;
use crate::{MeshError, MeshResult};

/// UV determinants below this are treated as degenerate
pub const DEGENERATE_UV_EPSILON: f32 = 1e-9;

fn triangle_indices(triangle: &[u32], num_vertices: usize) -> MeshResult<[usize; 3]> {
    let mut out = [0usize; 3];
    for (slot, &index) in out.iter_mut().zip(triangle) {
        let index = index as usize;
        if index >= num_vertices {
            return Err(MeshError::InvalidState(format!(
                "index {index} out of range for {num_vertices} vertices"
            )));
        }
        *slot = index;
    }
    Ok(out)
}

fn point(values: &[f32], i: usize) -> Vec3 {
    Vec3::from_slice(&values[i * 3..i * 3 + 3])
}

fn face_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (b - a).cross(c - a).normalize_or_zero()
}

/// Per-vertex normals of a flat `xyz` stream.
///
/// With `triangles`, face normals are summed into every corner and the sums
/// renormalized; without, each consecutive triple gets its own face normal.
pub fn compute_normals(vertices: &[f32], triangles: Option<&[u32]>) -> MeshResult<Vec<f32>> {
    let num_vertices = vertices.len() / 3;
    log::debug!(
        "Computing normals for {} vertices (indexed: {})",
        num_vertices,
        triangles.is_some()
    );

    let mut normals = vec![Vec3::ZERO; num_vertices];
    match triangles {
        Some(triangles) => {
            for triangle in triangles.chunks_exact(3) {
                let [a, b, c] = triangle_indices(triangle, num_vertices)?;
                let n = face_normal(point(vertices, a), point(vertices, b), point(vertices, c));
                normals[a] += n;
                normals[b] += n;
                normals[c] += n;
            }
            for n in &mut normals {
                *n = n.normalize_or_zero();
            }
        }
        None => {
            for base in (0..num_vertices - num_vertices % 3).step_by(3) {
                let n = face_normal(
                    point(vertices, base),
                    point(vertices, base + 1),
                    point(vertices, base + 2),
                );
                for slot in &mut normals[base..base + 3] {
                    *slot += n;
                }
            }
        }
    }

    Ok(normals.iter().flat_map(|n| n.to_array()).collect())
}

/// Per-vertex `xyzw` tangents, `w` being the handedness sign
pub fn compute_tangents(
    vertices: &[f32],
    normals: &[f32],
    uvs: &[f32],
    triangles: &[u32],
) -> MeshResult<Vec<f32>> {
    let num_vertices = vertices.len() / 3;
    log::debug!("Computing tangents for {} vertices", num_vertices);

    for (name, len, spacing) in [("normals", normals.len(), 3), ("coords", uvs.len(), 2)] {
        if len / spacing != num_vertices {
            return Err(MeshError::VertexCountMismatch {
                name: name.to_string(),
                expected: num_vertices,
                found: len / spacing,
            });
        }
    }

    let uv = |i: usize| Vec2::from_slice(&uvs[i * 2..i * 2 + 2]);
    let mut tan1 = vec![Vec3::ZERO; num_vertices];
    let mut tan2 = vec![Vec3::ZERO; num_vertices];

    for triangle in triangles.chunks_exact(3) {
        let [i1, i2, i3] = triangle_indices(triangle, num_vertices)?;
        let v1 = point(vertices, i1);
        let e1 = point(vertices, i2) - v1;
        let e2 = point(vertices, i3) - v1;

        let w1 = uv(i1);
        let d1 = uv(i2) - w1;
        let d2 = uv(i3) - w1;

        let den = d1.x * d2.y - d2.x * d1.y;
        let r = if den.abs() < DEGENERATE_UV_EPSILON { 0.0 } else { 1.0 / den };
        let sdir = (e1 * d2.y - e2 * d1.y) * r;
        let tdir = (e2 * d1.x - e1 * d2.x) * r;

        for i in [i1, i2, i3] {
            tan1[i] += sdir;
            tan2[i] += tdir;
        }
    }

    let mut tangents = Vec::with_capacity(num_vertices * 4);
    for (i, (t, b)) in tan1.iter().zip(&tan2).enumerate() {
        let n = point(normals, i);
        // Gram-Schmidt against the normal
        let tangent = (*t - n * n.dot(*t)).normalize_or_zero();
        let w = if n.cross(*t).dot(*b) < 0.0 { -1.0 } else { 1.0 };
        tangents.extend_from_slice(&[tangent.x, tangent.y, tangent.z, w]);
    }
    Ok(tangents)
}

/// Line-list indices covering every triangle edge once
pub fn wireframe_indices(num_vertices: usize, triangles: Option<&[u32]>) -> MeshResult<Vec<u32>> {
    let Some(triangles) = triangles else {
        let mut lines = Vec::with_capacity(num_vertices * 2);
        for base in (0..(num_vertices - num_vertices % 3) as u32).step_by(3) {
            lines.extend_from_slice(&[base, base + 1, base + 1, base + 2, base + 2, base]);
        }
        return Ok(lines);
    };

    let mut edges = Indexer::with_capacity(triangles.len());
    for triangle in triangles.chunks_exact(3) {
        triangle_indices(triangle, num_vertices)?;
        for j in 0..3 {
            let (a, b) = (triangle[j], triangle[(j + 1) % 3]);
            edges.add((a.min(b), a.max(b)));
        }
    }
    Ok(edges.unique().iter().flat_map(|&(a, b)| [a, b]).collect())
}

fn host_data(buffer: &TypedBuffer) -> MeshResult<&BufferData> {
    buffer.data().ok_or_else(|| {
        MeshError::MissingData(format!("buffer '{}' has no host data", buffer.name()))
    })
}

fn require_vertices(mesh: &Mesh) -> MeshResult<SharedBuffer> {
    mesh.vertex_buffer("vertices")
        .ok_or_else(|| MeshError::MissingData(String::from("mesh has no vertices")))
}

impl Mesh {
    /// Compute smooth normals into the `normals` stream.
    ///
    /// An existing `normals` buffer keeps its identity: its data is replaced
    /// and re-uploaded with `usage`.
    pub fn compute_normals(&mut self, usage: Option<UsageHint>) -> MeshResult<SharedBuffer> {
        let vertices = require_vertices(self)?;
        let triangles = self.index_buffer("triangles");

        let normals = {
            let vertices = vertices.read();
            let vertex_data = host_data(&vertices)?.to_f32();
            let triangles = triangles.as_ref().map(|t| t.read());
            let index_data = match &triangles {
                Some(t) => Some(host_data(t)?.to_u32()),
                None => None,
            };
            compute_normals(&vertex_data, index_data.as_deref())?
        };

        log::debug!("Computed normals for {} vertices", normals.len() / 3);
        match self.vertex_buffer("normals") {
            Some(buffer) => {
                {
                    let mut b = buffer.write();
                    b.set_data(BufferData::F32(normals));
                    b.upload(self.device().as_ref(), usage)?;
                }
                Ok(buffer)
            }
            None => {
                self.create_vertex_buffer("normals", None, Some(3), Some(BufferData::F32(normals)))
            }
        }
    }

    /// Compute `xyzw` tangents into the `tangents` stream.
    ///
    /// Tangents are only defined for indexed meshes with normals and
    /// texture coordinates; without them this returns `Ok(None)`.
    pub fn compute_tangents(&mut self) -> MeshResult<Option<SharedBuffer>> {
        let (Some(vertices), Some(normals), Some(coords), Some(triangles)) = (
            self.vertex_buffer("vertices"),
            self.vertex_buffer("normals"),
            self.vertex_buffer("coords"),
            self.index_buffer("triangles"),
        ) else {
            log::debug!("Skipping tangents: mesh lacks vertices, normals, coords or triangles");
            return Ok(None);
        };

        let tangents = {
            let (vertices, normals, coords, triangles) =
                (vertices.read(), normals.read(), coords.read(), triangles.read());
            compute_tangents(
                &host_data(&vertices)?.to_f32(),
                &host_data(&normals)?.to_f32(),
                &host_data(&coords)?.to_f32(),
                &host_data(&triangles)?.to_u32(),
            )?
        };

        log::debug!("Computed tangents for {} vertices", tangents.len() / 4);
        self.create_vertex_buffer("tangents", None, Some(4), Some(BufferData::F32(tangents)))
            .map(Some)
    }

    /// Build the `wireframe` index stream
    pub fn compute_wireframe(&mut self) -> MeshResult<SharedBuffer> {
        let vertices = require_vertices(self)?;
        if !vertices.read().has_data() {
            return Err(MeshError::MissingData(String::from("vertex data has been freed")));
        }
        let num_vertices = self.num_vertices();

        let lines = match self.index_buffer("triangles") {
            Some(triangles) => {
                let triangles = triangles.read();
                let indices = host_data(&triangles)?.to_u32();
                wireframe_indices(num_vertices, Some(&indices[..]))?
            }
            None => wireframe_indices(num_vertices, None)?,
        };

        log::debug!("Computed wireframe with {} edges", lines.len() / 2);
        let element_type = attributes::index_element_type(num_vertices);
        Ok(self.create_index_buffer("wireframe", BufferData::from_indices(element_type, lines)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ElementType;
    use crate::device::MemoryDevice;
    use crate::ingest::RawInput;
    use std::sync::Arc;

    const EPSILON: f32 = 1e-5;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < EPSILON
    }

    const TRIANGLE: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

    fn textured_triangle(mirrored: bool) -> Mesh {
        let u = if mirrored { -1.0 } else { 1.0 };
        Mesh::from_buffers(
            Arc::new(MemoryDevice::new()),
            [
                ("vertices", RawInput::from(TRIANGLE.to_vec())),
                ("normals", RawInput::from(vec![0.0f32, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0])),
                ("coords", RawInput::from(vec![0.0f32, 0.0, u, 0.0, 0.0, 1.0])),
            ],
            [("triangles", RawInput::from(vec![0u32, 1, 2]))],
        )
        .unwrap()
    }

    #[test]
    fn test_unindexed_triangle_normal() {
        let normals = compute_normals(&TRIANGLE, None).unwrap();
        assert_eq!(normals, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_shared_vertex_normals() {
        let vertices = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0];
        let triangles = [0, 1, 2, 1, 3, 2];
        let normals = compute_normals(&vertices, Some(&triangles[..])).unwrap();

        let face_a = Vec3::Z;
        let face_b = Vec3::new(-1.0, -1.0, 1.0).normalize();
        for shared in [1, 2] {
            let n = Vec3::from_slice(&normals[shared * 3..shared * 3 + 3]);
            assert!((n.length() - 1.0).abs() < EPSILON);
            assert!(n.dot(face_a) > 0.0 && n.dot(face_b) > 0.0);
            assert!((n.dot(face_a) - n.dot(face_b)).abs() < EPSILON);
            assert!(approx(n, (face_a + face_b).normalize()));
        }
        assert!(approx(Vec3::from_slice(&normals[0..3]), face_a));
        assert!(approx(Vec3::from_slice(&normals[9..12]), face_b));
    }

    #[test]
    fn test_degenerate_face_normal_is_zero() {
        let vertices = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        let normals = compute_normals(&vertices, Some(&[0, 1, 2][..])).unwrap();
        assert!(normals.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_index_out_of_range() {
        let result = compute_normals(&TRIANGLE, Some(&[0, 1, 3][..]));
        assert!(matches!(result, Err(MeshError::InvalidState(_))));
        assert!(wireframe_indices(3, Some(&[0, 1, 7][..])).is_err());
    }

    #[test]
    fn test_wireframe_shared_edge() {
        let lines = wireframe_indices(4, Some(&[0, 1, 2, 2, 1, 3][..])).unwrap();
        assert_eq!(lines.len() / 2, 5);
        assert_eq!(lines, vec![0, 1, 1, 2, 0, 2, 1, 3, 2, 3]);
    }

    #[test]
    fn test_wireframe_unindexed() {
        let lines = wireframe_indices(6, None).unwrap();
        assert_eq!(lines, vec![0, 1, 1, 2, 2, 0, 3, 4, 4, 5, 5, 3]);
        assert!(wireframe_indices(2, None).unwrap().is_empty());
    }

    #[test]
    fn test_tangent_handedness() {
        let normals = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let uvs = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let tangents = compute_tangents(&TRIANGLE, &normals, &uvs, &[0, 1, 2]).unwrap();
        assert_eq!(tangents.len(), 12);
        for t in tangents.chunks_exact(4) {
            assert!(approx(Vec3::new(t[0], t[1], t[2]), Vec3::X));
            assert_eq!(t[3], 1.0);
        }

        let uvs = [0.0, 0.0, -1.0, 0.0, 0.0, 1.0];
        let mirrored = compute_tangents(&TRIANGLE, &normals, &uvs, &[0, 1, 2]).unwrap();
        for t in mirrored.chunks_exact(4) {
            assert!(approx(Vec3::new(t[0], t[1], t[2]), -Vec3::X));
            assert_eq!(t[3], -1.0);
        }
    }

    #[test]
    fn test_tangent_degenerate_uvs() {
        let normals = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let tangents = compute_tangents(&TRIANGLE, &normals, &[0.0; 6], &[0, 1, 2]).unwrap();
        for t in tangents.chunks_exact(4) {
            assert_eq!(&t[..3], &[0.0, 0.0, 0.0]);
            assert_eq!(t[3], 1.0);
        }
    }

    #[test]
    fn test_tangent_count_mismatch() {
        let result = compute_tangents(&TRIANGLE, &[0.0; 6], &[0.0; 6], &[0, 1, 2]);
        assert!(matches!(result, Err(MeshError::VertexCountMismatch { .. })));
    }

    #[test]
    fn test_mesh_compute_normals_reuses_buffer() {
        let device = Arc::new(MemoryDevice::new());
        let mut mesh = Mesh::from_buffers(
            device.clone(),
            [("vertices", RawInput::from(TRIANGLE.to_vec()))],
            Vec::<(&str, RawInput)>::new(),
        )
        .unwrap();

        let first = mesh.compute_normals(None).unwrap();
        assert_eq!(first.read().attribute(), Some("a_normal"));
        assert!(first.read().handle().is_none());

        let second = mesh.compute_normals(Some(UsageHint::Dynamic)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let handle = second.read().handle().unwrap();
        assert_eq!(device.buffer_usage(handle), Some(UsageHint::Dynamic));
        let expected = BufferData::F32(vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(second.read().data(), Some(&expected));
    }

    #[test]
    fn test_mesh_requires_vertices() {
        let mut mesh = Mesh::new(Arc::new(MemoryDevice::new()));
        assert!(matches!(mesh.compute_normals(None), Err(MeshError::MissingData(_))));
        assert!(matches!(mesh.compute_wireframe(), Err(MeshError::MissingData(_))));
        assert!(mesh.compute_tangents().unwrap().is_none());
    }

    #[test]
    fn test_mesh_tangents() {
        let mut mesh = textured_triangle(true);
        let tangents = mesh.compute_tangents().unwrap().unwrap();
        let tangents = tangents.read();
        assert_eq!(tangents.spacing(), 4);
        assert_eq!(tangents.element_count(), 3);
        assert_eq!(tangents.attribute(), Some("a_tangent"));
        assert!(tangents.handle().is_none());

        let mut plain = textured_triangle(false);
        plain.remove_vertex_buffer("coords");
        assert!(plain.compute_tangents().unwrap().is_none());
    }

    #[test]
    fn test_mesh_wireframe() {
        let mut mesh = textured_triangle(false);
        let wireframe = mesh.compute_wireframe().unwrap();
        let wireframe = wireframe.read();
        assert_eq!(wireframe.element_type(), Some(ElementType::U16));
        assert_eq!(wireframe.data(), Some(&BufferData::U16(vec![0, 1, 1, 2, 0, 2])));
        assert!(mesh.has_index_buffer("wireframe"));
    }
}
