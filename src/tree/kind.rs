//! Field kinds and their size rules

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Field type of a node
///
/// Hex kinds are unsigned integers shown as raw bytes; they mark unknown
/// or not-yet-typed regions and collapse into byte blobs on export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeKind {
    Hex8,
    Hex16,
    Hex32,
    #[default]
    Hex64,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Bool,
    Pointer32,
    Pointer64,
    UTF8,
    UTF16,
    Vec2,
    Vec3,
    Vec4,
    Mat4x4,
    Struct,
    Array,
    Padding,
}

impl NodeKind {
    /// Every kind, in declaration order
    pub const ALL: [NodeKind; 26] = [
        NodeKind::Hex8,
        NodeKind::Hex16,
        NodeKind::Hex32,
        NodeKind::Hex64,
        NodeKind::Int8,
        NodeKind::Int16,
        NodeKind::Int32,
        NodeKind::Int64,
        NodeKind::UInt8,
        NodeKind::UInt16,
        NodeKind::UInt32,
        NodeKind::UInt64,
        NodeKind::Float,
        NodeKind::Double,
        NodeKind::Bool,
        NodeKind::Pointer32,
        NodeKind::Pointer64,
        NodeKind::UTF8,
        NodeKind::UTF16,
        NodeKind::Vec2,
        NodeKind::Vec3,
        NodeKind::Vec4,
        NodeKind::Mat4x4,
        NodeKind::Struct,
        NodeKind::Array,
        NodeKind::Padding,
    ];

    /// Fixed byte size of the kind.
    ///
    /// Returns 0 for kinds whose size depends on the node (strings, arrays,
    /// structs, padding); see [`Node::own_size`](super::Node::own_size) and
    /// [`NodeTree::byte_size`](super::NodeTree::byte_size).
    pub fn size(self) -> u32 {
        match self {
            NodeKind::Hex8 | NodeKind::Int8 | NodeKind::UInt8 | NodeKind::Bool => 1,
            NodeKind::Hex16 | NodeKind::Int16 | NodeKind::UInt16 => 2,
            NodeKind::Hex32
            | NodeKind::Int32
            | NodeKind::UInt32
            | NodeKind::Float
            | NodeKind::Pointer32 => 4,
            NodeKind::Hex64
            | NodeKind::Int64
            | NodeKind::UInt64
            | NodeKind::Double
            | NodeKind::Pointer64
            | NodeKind::Vec2 => 8,
            NodeKind::Vec3 => 12,
            NodeKind::Vec4 => 16,
            NodeKind::Mat4x4 => 64,
            NodeKind::UTF8
            | NodeKind::UTF16
            | NodeKind::Struct
            | NodeKind::Array
            | NodeKind::Padding => 0,
        }
    }

    pub fn is_hex(self) -> bool {
        matches!(
            self,
            NodeKind::Hex8 | NodeKind::Hex16 | NodeKind::Hex32 | NodeKind::Hex64
        )
    }

    /// Kinds that may own child nodes
    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Struct | NodeKind::Array)
    }

    pub fn is_pointer(self) -> bool {
        matches!(self, NodeKind::Pointer32 | NodeKind::Pointer64)
    }

    pub fn is_string(self) -> bool {
        matches!(self, NodeKind::UTF8 | NodeKind::UTF16)
    }

    /// Number of packed `f32` components for vector and matrix kinds
    pub fn float_components(self) -> Option<usize> {
        match self {
            NodeKind::Vec2 => Some(2),
            NodeKind::Vec3 => Some(3),
            NodeKind::Vec4 => Some(4),
            NodeKind::Mat4x4 => Some(16),
            _ => None,
        }
    }

    /// Hex kind of exactly `size` bytes
    pub fn hex_for_size(size: u32) -> Option<NodeKind> {
        match size {
            1 => Some(NodeKind::Hex8),
            2 => Some(NodeKind::Hex16),
            4 => Some(NodeKind::Hex32),
            8 => Some(NodeKind::Hex64),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Hex8 => "Hex8",
            NodeKind::Hex16 => "Hex16",
            NodeKind::Hex32 => "Hex32",
            NodeKind::Hex64 => "Hex64",
            NodeKind::Int8 => "Int8",
            NodeKind::Int16 => "Int16",
            NodeKind::Int32 => "Int32",
            NodeKind::Int64 => "Int64",
            NodeKind::UInt8 => "UInt8",
            NodeKind::UInt16 => "UInt16",
            NodeKind::UInt32 => "UInt32",
            NodeKind::UInt64 => "UInt64",
            NodeKind::Float => "Float",
            NodeKind::Double => "Double",
            NodeKind::Bool => "Bool",
            NodeKind::Pointer32 => "Pointer32",
            NodeKind::Pointer64 => "Pointer64",
            NodeKind::UTF8 => "UTF8",
            NodeKind::UTF16 => "UTF16",
            NodeKind::Vec2 => "Vec2",
            NodeKind::Vec3 => "Vec3",
            NodeKind::Vec4 => "Vec4",
            NodeKind::Mat4x4 => "Mat4x4",
            NodeKind::Struct => "Struct",
            NodeKind::Array => "Array",
            NodeKind::Padding => "Padding",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a kind name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown node kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for NodeKind {
    type Err = UnknownKind;

    /// Parse a kind name, case-insensitively
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        NodeKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownKind(trimmed.to_string()))
    }
}
