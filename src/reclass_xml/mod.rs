//! ReClass XML interchange format
//!
//! Reads and writes the `ReClass` XML schema used by ReClassEx-family
//! tools: a `<ReClass>` root holding one `<Class>` per root struct, each
//! with a flat list of `<Node>` members.
//!
//! ## Type codes
//!
//! | Code | Kind            | Code | Kind    |
//! |------|-----------------|------|---------|
//! | 1    | Struct instance | 14   | Double  |
//! | 4    | Hex32           | 15   | UInt32  |
//! | 5    | Hex64           | 16   | UInt16  |
//! | 6    | Hex16           | 17   | UInt8   |
//! | 7    | Hex8            | 18   | UTF8    |
//! | 8    | Pointer         | 19   | UTF16   |
//! | 9    | Int64           | 21   | Custom (raw bytes) |
//! | 10   | Int32           | 22-24| Vec2-Vec4 |
//! | 11   | Int16           | 25   | Mat4x4  |
//! | 12   | Int8            | 27   | Array   |
//! | 13   | Float           | 32   | UInt64  |
//!
//! Bool has no code of its own and is written as UInt8. Padding is written
//! as raw bytes. Both come back as different kinds on import.
//!
//! ## Example
//!
//! ```rust
//! use rcx::reclass_xml::{export_to_string, import_from_str, ExportOptions, ImportOptions};
//! use rcx::tree::{Node, NodeKind, NodeTree};
//!
//! let mut tree = NodeTree::new();
//! let root = tree.add_node(Node::root_struct("Player"));
//! let id = tree.nodes()[root].id;
//! tree.add_node(Node::new(NodeKind::Int32).with_name("health").with_parent(id));
//!
//! let xml = export_to_string(&tree, &ExportOptions::default())?;
//! let back = import_from_str(&xml, &ImportOptions::default())?;
//! assert_eq!(back.root_structs().len(), 1);
//! # Ok::<(), rcx::Error>(())
//! ```

mod export;
mod import;

pub use export::{export_to_file, export_to_string};
pub use import::{import_from_file, import_from_str};

use crate::tree::NodeKind;

/// Type code of a `<Class>` element
pub const CLASS_TYPE: u32 = 28;
/// Type code of an anonymous raw byte run
pub const CUSTOM_TYPE: u32 = 21;
/// Type code of an embedded struct instance
pub const INSTANCE_TYPE: u32 = 1;
/// Type code of a pointer
pub const POINTER_TYPE: u32 = 8;
/// Type code of an array
pub const ARRAY_TYPE: u32 = 27;

/// Export settings
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Spaces per nesting level
    pub indent: usize,
    /// Emit raw byte nodes for holes between members so that offsets
    /// survive re-import
    pub fill_gaps: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            indent: 4,
            fill_gaps: true,
        }
    }
}

impl ExportOptions {
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_fill_gaps(mut self, fill_gaps: bool) -> Self {
        self.fill_gaps = fill_gaps;
        self
    }
}

/// Import settings
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Kind for pointer nodes whose `Size` is neither 4 nor 8
    pub pointer_kind: NodeKind,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            pointer_kind: NodeKind::Pointer64,
        }
    }
}

impl ImportOptions {
    pub fn with_pointer_kind(mut self, pointer_kind: NodeKind) -> Self {
        self.pointer_kind = pointer_kind;
        self
    }
}

/// XML type code for a node kind
pub fn type_code(kind: NodeKind) -> u32 {
    match kind {
        NodeKind::Struct => INSTANCE_TYPE,
        NodeKind::Hex32 => 4,
        NodeKind::Hex64 => 5,
        NodeKind::Hex16 => 6,
        NodeKind::Hex8 => 7,
        NodeKind::Pointer32 | NodeKind::Pointer64 => POINTER_TYPE,
        NodeKind::Int64 => 9,
        NodeKind::Int32 => 10,
        NodeKind::Int16 => 11,
        NodeKind::Int8 => 12,
        NodeKind::Float => 13,
        NodeKind::Double => 14,
        NodeKind::UInt32 => 15,
        NodeKind::UInt16 => 16,
        NodeKind::UInt8 | NodeKind::Bool => 17,
        NodeKind::UTF8 => 18,
        NodeKind::UTF16 => 19,
        NodeKind::Vec2 => 22,
        NodeKind::Vec3 => 23,
        NodeKind::Vec4 => 24,
        NodeKind::Mat4x4 => 25,
        NodeKind::Array => ARRAY_TYPE,
        NodeKind::UInt64 => 32,
        NodeKind::Padding => CUSTOM_TYPE,
    }
}

/// Node kind for an XML type code.
///
/// Custom (21) is not a single kind and returns `None`, as do unknown codes.
/// Pointers pick their width from `size`.
pub fn kind_for_code(code: u32, size: u32, options: &ImportOptions) -> Option<NodeKind> {
    let kind = match code {
        INSTANCE_TYPE => NodeKind::Struct,
        4 => NodeKind::Hex32,
        5 => NodeKind::Hex64,
        6 => NodeKind::Hex16,
        7 => NodeKind::Hex8,
        POINTER_TYPE => match size {
            4 => NodeKind::Pointer32,
            8 => NodeKind::Pointer64,
            _ => options.pointer_kind,
        },
        9 => NodeKind::Int64,
        10 => NodeKind::Int32,
        11 => NodeKind::Int16,
        12 => NodeKind::Int8,
        13 => NodeKind::Float,
        14 => NodeKind::Double,
        15 => NodeKind::UInt32,
        16 => NodeKind::UInt16,
        17 => NodeKind::UInt8,
        18 => NodeKind::UTF8,
        19 => NodeKind::UTF16,
        22 => NodeKind::Vec2,
        23 => NodeKind::Vec3,
        24 => NodeKind::Vec4,
        25 => NodeKind::Mat4x4,
        ARRAY_TYPE => NodeKind::Array,
        32 => NodeKind::UInt64,
        _ => return None,
    };
    Some(kind)
}
