//! Canonical attribute table
//!
//! Well-known vertex stream names with their fixed spacing, shader attribute
//! tag and element type.

use crate::buffer::ElementType;

/// Largest vertex count addressable with 16-bit indices
pub const MAX_U16_VERTICES: usize = 256 * 256;

/// Names that always denote index streams
pub const INDEX_BUFFER_NAMES: &[&str] = &["indices", "lines", "wireframe", "triangles"];

/// Fixed description of a well-known vertex stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeInfo {
    /// Stream name
    pub name: &'static str,
    /// Components per vertex
    pub spacing: usize,
    /// Shader attribute tag
    pub attribute: &'static str,
    /// Element type override; `None` uses the configured default
    pub element_type: Option<ElementType>,
    /// Also accepts a fourth (w) component per vertex
    pub homogeneous: bool,
}

const fn info(name: &'static str, spacing: usize, attribute: &'static str) -> AttributeInfo {
    AttributeInfo {
        name,
        spacing,
        attribute,
        element_type: None,
        homogeneous: false,
    }
}

/// Every well-known vertex stream
pub const COMMON_BUFFERS: &[AttributeInfo] = &[
    info("vertices", 3, "a_vertex"),
    info("vertices2D", 2, "a_vertex2D"),
    info("normals", 3, "a_normal"),
    info("coords", 2, "a_coord"),
    info("coords1", 2, "a_coord1"),
    info("coords2", 2, "a_coord2"),
    info("colors", 4, "a_color"),
    AttributeInfo {
        homogeneous: true,
        ..info("tangents", 3, "a_tangent")
    },
    AttributeInfo {
        element_type: Some(ElementType::U8),
        ..info("bone_indices", 4, "a_bone_indices")
    },
    info("weights", 4, "a_weights"),
    info("extra", 1, "a_extra"),
    info("extra2", 2, "a_extra2"),
    info("extra3", 3, "a_extra3"),
    info("extra4", 4, "a_extra4"),
];

/// Look up a well-known vertex stream
pub fn lookup(name: &str) -> Option<&'static AttributeInfo> {
    COMMON_BUFFERS.iter().find(|info| info.name == name)
}

/// Check if a name denotes an index stream
pub fn is_index_buffer(name: &str) -> bool {
    INDEX_BUFFER_NAMES.contains(&name)
}

/// Attribute tag of a stream: the canonical one, or `a_<name>`
pub fn attribute_for(name: &str) -> String {
    lookup(name).map_or_else(|| format!("a_{name}"), |info| info.attribute.to_string())
}

/// Index element type able to address `vertex_count` vertices
pub fn index_element_type(vertex_count: usize) -> ElementType {
    if vertex_count > MAX_U16_VERTICES {
        ElementType::U32
    } else {
        ElementType::U16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let vertices = lookup("vertices").unwrap();
        assert_eq!(vertices.spacing, 3);
        assert_eq!(vertices.attribute, "a_vertex");

        let bones = lookup("bone_indices").unwrap();
        assert_eq!(bones.element_type, Some(ElementType::U8));

        assert!(lookup("triangles").is_none());
        assert!(lookup("unknown").is_none());
    }

    #[test]
    fn test_attribute_for() {
        assert_eq!(attribute_for("coords1"), "a_coord1");
        assert_eq!(attribute_for("custom"), "a_custom");
    }

    #[test]
    fn test_index_names() {
        for name in ["indices", "lines", "wireframe", "triangles"] {
            assert!(is_index_buffer(name));
        }
        assert!(!is_index_buffer("vertices"));
    }

    #[test]
    fn test_index_type_boundary() {
        assert_eq!(index_element_type(65536), ElementType::U16);
        assert_eq!(index_element_type(65537), ElementType::U32);
        assert_eq!(index_element_type(0), ElementType::U16);
    }

    #[test]
    fn test_spacings_are_positive() {
        assert!(COMMON_BUFFERS.iter().all(|info| (1..=4).contains(&info.spacing)));
    }
}
