//! Math utilities
//!
//! Re-exports from glam and the bounding volume used by meshes.

pub use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box stored as center and half size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Center of the box
    pub center: Vec3,
    /// Vector from the center to the positive corner
    pub half_size: Vec3,
}

impl BoundingBox {
    /// Create a box from center and half size
    pub fn from_center_half_size(center: Vec3, half_size: Vec3) -> Self {
        Self { center, half_size }
    }

    /// Create a box from min and max corners
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        let center = (min + max) * 0.5;
        Self {
            center,
            half_size: max - center,
        }
    }

    /// Compute the bounding box of a flat `xyz xyz ...` stream.
    ///
    /// The first vertex seeds both corners. Returns `None` when the stream
    /// holds less than one full vertex.
    pub fn from_vertices(vertices: &[f32]) -> Option<Self> {
        let mut points = vertices.chunks_exact(3);
        let first = Vec3::from_slice(points.next()?);

        let (min, max) = points.fold((first, first), |(min, max), p| {
            let p = Vec3::from_slice(p);
            (min.min(p), max.max(p))
        });

        Some(Self::from_min_max(min, max))
    }

    /// Get the minimum corner
    pub fn min(&self) -> Vec3 {
        self.center - self.half_size
    }

    /// Get the maximum corner
    pub fn max(&self) -> Vec3 {
        self.center + self.half_size
    }

    /// Get the full size of the box
    pub fn size(&self) -> Vec3 {
        self.half_size * 2.0
    }

    /// Check if a point is inside the box
    pub fn contains_point(&self, point: Vec3) -> bool {
        let d = (point - self.center).abs();
        d.x <= self.half_size.x && d.y <= self.half_size.y && d.z <= self.half_size.z
    }

    /// Merge with another box
    pub fn merge(&self, other: &BoundingBox) -> BoundingBox {
        Self::from_min_max(self.min().min(other.min()), self.max().max(other.max()))
    }

    /// Transform the box by a matrix, returning the box around the moved corners
    pub fn transform(&self, matrix: Mat4) -> BoundingBox {
        let (lo, hi) = (self.min(), self.max());
        let corners = [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ];

        let first = matrix.transform_point3(corners[0]);
        let (min, max) = corners[1..].iter().fold((first, first), |(min, max), c| {
            let p = matrix.transform_point3(*c);
            (min.min(p), max.max(p))
        });
        Self::from_min_max(min, max)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::from_center_half_size(Vec3::ZERO, Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_cube_bounding() {
        let mut vertices = Vec::new();
        for x in [0.0, 1.0] {
            for y in [0.0, 1.0] {
                for z in [0.0, 1.0] {
                    vertices.extend_from_slice(&[x, y, z]);
                }
            }
        }

        let bb = BoundingBox::from_vertices(&vertices).unwrap();
        assert_eq!(bb.center, Vec3::splat(0.5));
        assert_eq!(bb.half_size, Vec3::splat(0.5));
    }

    #[test]
    fn test_single_vertex_seeds_both_corners() {
        let bb = BoundingBox::from_vertices(&[2.0, -1.0, 3.0]).unwrap();
        assert_eq!(bb.center, Vec3::new(2.0, -1.0, 3.0));
        assert_eq!(bb.half_size, Vec3::ZERO);
    }

    #[test]
    fn test_empty_stream() {
        assert!(BoundingBox::from_vertices(&[]).is_none());
        assert!(BoundingBox::from_vertices(&[1.0, 2.0]).is_none());
    }

    #[test]
    fn test_negative_coordinates() {
        let bb = BoundingBox::from_vertices(&[-2.0, 0.0, 0.0, 2.0, 4.0, -6.0]).unwrap();
        assert_eq!(bb.min(), Vec3::new(-2.0, 0.0, -6.0));
        assert_eq!(bb.max(), Vec3::new(2.0, 4.0, 0.0));
        assert!(bb.contains_point(Vec3::new(0.0, 2.0, -3.0)));
        assert!(!bb.contains_point(Vec3::new(3.0, 2.0, -3.0)));
    }

    #[test]
    fn test_merge_and_transform() {
        let a = BoundingBox::from_min_max(Vec3::ZERO, Vec3::ONE);
        let b = BoundingBox::from_min_max(Vec3::splat(2.0), Vec3::splat(3.0));
        let merged = a.merge(&b);
        assert_eq!(merged.min(), Vec3::ZERO);
        assert_eq!(merged.max(), Vec3::splat(3.0));

        let moved = a.transform(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(moved.min(), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(moved.size(), Vec3::ONE);
    }
}
