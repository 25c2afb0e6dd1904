//! Node record

use crate::tree::kind::NodeKind;

/// Default character count for new string fields
pub const DEFAULT_STR_LEN: u32 = 64;

/// One typed field or container in a [`NodeTree`](super::NodeTree)
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Stable identifier, 0 until the tree assigns one
    pub id: u64,
    /// Id of the owning Struct/Array, 0 for root-level nodes
    pub parent_id: u64,
    pub kind: NodeKind,
    /// Field or instance label
    pub name: String,
    /// Type this Struct node instantiates (distinct from `name`)
    pub struct_type_name: String,
    /// Byte offset relative to the parent's start
    pub offset: u32,
    /// Element count for Array, byte count for Padding
    pub array_len: u32,
    /// Element kind for Array
    pub element_kind: NodeKind,
    /// Character count for UTF8/UTF16
    pub str_len: u32,
    /// Pointer target or embedded type definition, 0 if none
    pub ref_id: u64,
    /// Declared size of an unexpanded Struct whose type is not in the tree
    pub size_override: Option<u32>,
    /// Display state only, never affects layout
    pub collapsed: bool,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            id: 0,
            parent_id: 0,
            kind: NodeKind::Hex64,
            name: String::new(),
            struct_type_name: String::new(),
            offset: 0,
            array_len: 1,
            element_kind: NodeKind::UInt8,
            str_len: DEFAULT_STR_LEN,
            ref_id: 0,
            size_override: None,
            collapsed: false,
        }
    }
}

impl Node {
    /// Create a node of the given kind
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Create a root-level struct whose name doubles as its type name
    pub fn root_struct(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            kind: NodeKind::Struct,
            name: type_name.clone(),
            struct_type_name: type_name,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.struct_type_name = type_name.into();
        self
    }

    pub fn with_parent(mut self, parent_id: u64) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn at(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_ref(mut self, ref_id: u64) -> Self {
        self.ref_id = ref_id;
        self
    }

    pub fn with_str_len(mut self, str_len: u32) -> Self {
        self.str_len = str_len;
        self
    }

    /// Make this node an array of `len` elements of `element_kind`
    pub fn with_array(mut self, element_kind: NodeKind, len: u32) -> Self {
        self.element_kind = element_kind;
        self.array_len = len;
        self
    }

    /// Fix the size of an opaque struct instance
    pub fn with_size_override(mut self, size: u32) -> Self {
        self.size_override = Some(size);
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Size computable from the node alone.
    ///
    /// Structs, and arrays of structs, need the tree to be sized and report 0 here.
    pub fn own_size(&self) -> u32 {
        match self.kind {
            NodeKind::UTF8 => self.str_len,
            NodeKind::UTF16 => self.str_len.saturating_mul(2),
            NodeKind::Padding => self.array_len,
            NodeKind::Array => self.array_len.saturating_mul(self.element_kind.size()),
            kind => kind.size(),
        }
    }

    /// Type name used when other nodes refer to this one
    pub fn type_name(&self) -> &str {
        if self.struct_type_name.is_empty() {
            &self.name
        } else {
            &self.struct_type_name
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id == 0
    }
}
