//! # rcx
//!
//! A Rust library for describing memory layouts as trees of typed nodes.
//!
//! ## Overview
//!
//! A layout is a flat arena of nodes. Root structs are classes, their
//! children are members at byte offsets, and pointers or embedded
//! instances refer to other classes by id. This library provides:
//!
//! - Offset, size and address computation over the node tree
//! - ReClass XML export and import, including forward references
//! - Undoable edits through a command log
//! - Byte sources behind a `Provider` trait (buffers, files, thread-bound handles)
//! - Value formatting/parsing and C++ header generation
//!
//! ## Example - Building a layout
//!
//! ```rust
//! use rcx::{Node, NodeKind, NodeTree};
//!
//! let mut tree = NodeTree::with_base(0x1000);
//! let root = tree.add_node(Node::root_struct("Player"));
//! let id = tree.nodes()[root].id;
//! let health = tree.add_node(
//!     Node::new(NodeKind::Int32).with_name("health").with_parent(id).at(0x10),
//! );
//!
//! assert_eq!(tree.absolute_address(health), 0x1010);
//! assert_eq!(tree.byte_size(root), 0x14);
//! ```
//!
//! ## Example - Editing values
//!
//! ```rust,no_run
//! use rcx::Document;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut doc = Document::from_reclass_xml("player.reclass")?;
//!     doc.load_binary("player.bin")?;
//!
//!     let class = doc.tree().find_type("Player").ok_or_else(|| anyhow::anyhow!("no Player"))?;
//!     let root = doc.tree().nodes()[class].id;
//!     let health = doc.tree().children_of(root)[0];
//!     let id = doc.tree().nodes()[health].id;
//!
//!     doc.set_node_value(id, "250")?;
//!     doc.undo()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Example - ReClass XML
//!
//! ```rust,no_run
//! use rcx::reclass_xml::{export_to_file, import_from_file, ExportOptions, ImportOptions};
//!
//! fn main() -> anyhow::Result<()> {
//!     let tree = import_from_file("input.reclass", &ImportOptions::default())?;
//!     export_to_file(&tree, "output.reclass", &ExportOptions::default())?;
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod document;
pub mod error;
pub mod generator;
pub mod provider;
pub mod rcx_utils;
pub mod reclass_xml;
pub mod tree;
pub mod undo;
pub mod utils;
pub mod value;

pub use command::{Change, Command};
pub use document::Document;
pub use error::{Error, Result};
pub use provider::{AffineProvider, BufferProvider, NullProvider, Provider};
pub use tree::{Node, NodeKind, NodeTree, TreeIssue};
pub use undo::UndoLog;
pub use utils::{create_glob_matcher, format_offset, format_size, matches_filter, parse_address};
