//! Node tree data model and layout engine
//!
//! A document is a flat arena of [`Node`]s. Each node names its owner by
//! `parent_id` and may point at another node by `ref_id` (pointer targets,
//! embedded type definitions). Parent links form a forest; ref links may
//! form arbitrary cycles.
//!
//! ## Layout
//!
//! - A node's offset is relative to its parent.
//! - A struct is as large as its furthest-reaching child.
//! - Array ancestors add `element * element_size` for a chosen element.
//!
//! ## Example
//!
//! ```rust
//! use rcx::tree::{Node, NodeKind, NodeTree};
//!
//! let mut tree = NodeTree::new();
//! let root = tree.add_node(Node::root_struct("Player"));
//! let root_id = tree.nodes()[root].id;
//! let hp = tree.add_node(Node::new(NodeKind::Int32).with_name("health").with_parent(root_id).at(0x10));
//!
//! assert_eq!(tree.compute_offset(hp), 0x10);
//! assert_eq!(tree.byte_size(root), 0x14);
//! ```

mod arena;
mod kind;
mod node;
mod validate;

pub use arena::{Layout, NodeTree};
pub use kind::{NodeKind, UnknownKind};
pub use node::{Node, DEFAULT_STR_LEN};
pub use validate::TreeIssue;
