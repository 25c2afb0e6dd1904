//! Editable document: tree, byte source and history
//!
//! [`Document`] is the single place tree and value mutations go through.
//! Every edit becomes a [`Command`], is checked, applied and recorded in
//! the undo log; a rejected edit changes nothing.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::provider::{BufferProvider, NullProvider, Provider};
use crate::reclass_xml::{export_to_file, import_from_file, ExportOptions, ImportOptions};
use crate::tree::{Node, NodeKind, NodeTree};
use crate::undo::UndoLog;
use crate::value::{format_value, parse_component, parse_value};

/// Default type name for classes created without one
pub const DEFAULT_CLASS_NAME: &str = "NewClass";

/// Tree plus the byte source it is laid over
pub struct Document {
    tree: NodeTree,
    provider: Box<dyn Provider>,
    log: UndoLog,
    path: Option<PathBuf>,
    modified: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(NodeTree::new())
    }
}

impl Document {
    /// Document with no byte source attached
    pub fn new(tree: NodeTree) -> Self {
        Self {
            tree,
            provider: Box::new(NullProvider),
            log: UndoLog::new(),
            path: None,
            modified: false,
        }
    }

    pub fn with_provider(tree: NodeTree, provider: Box<dyn Provider>) -> Self {
        let mut doc = Self::new(tree);
        doc.set_provider(provider);
        doc
    }

    pub fn with_undo_limit(mut self, limit: usize) -> Self {
        self.log = UndoLog::with_limit(limit);
        self
    }

    /// Load a ReClass XML file
    pub fn from_reclass_xml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let tree = import_from_file(path, &ImportOptions::default())?;
        let mut doc = Self::new(tree);
        doc.path = Some(path.to_path_buf());
        Ok(doc)
    }

    /// Save the tree as ReClass XML and remember the path
    pub fn export_reclass_xml(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        export_to_file(&self.tree, path, &ExportOptions::default())?;
        self.path = Some(path.to_path_buf());
        self.modified = false;
        Ok(())
    }

    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn undo_log(&self) -> &UndoLog {
        &self.log
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether anything changed since load or the last export
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Attach a new byte source.
    ///
    /// A live source keeps its own base and the tree follows it; any other
    /// source is rebased onto the tree. History is cleared because recorded
    /// value edits refer to the old source.
    pub fn set_provider(&mut self, mut provider: Box<dyn Provider>) {
        if provider.is_live() {
            self.tree.base_address = provider.base();
        } else {
            provider.set_base(self.tree.base_address);
        }
        info!(
            "Attached {} source '{}' at {:#x}",
            provider.kind(),
            provider.name(),
            self.tree.base_address
        );
        self.provider = provider;
        self.log.clear();
    }

    /// Attach the contents of a file as the byte source
    pub fn load_binary(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let provider = BufferProvider::open(path)?;
        self.set_provider(Box::new(provider));
        Ok(())
    }

    /// Move the tree and its source to a new base address
    pub fn set_base(&mut self, base: u64) {
        self.tree.base_address = base;
        self.provider.set_base(base);
        debug!("Base address set to {:#x}", base);
    }

    /// Apply a command and record it for undo
    pub fn execute(&mut self, command: Command) -> Result<()> {
        self.log
            .execute(command, &mut self.tree, self.provider.as_mut())?;
        self.modified = true;
        Ok(())
    }

    pub fn undo(&mut self) -> Result<bool> {
        let done = self.log.undo(&mut self.tree, self.provider.as_mut())?;
        self.modified |= done;
        Ok(done)
    }

    pub fn redo(&mut self) -> Result<bool> {
        let done = self.log.redo(&mut self.tree, self.provider.as_mut())?;
        self.modified |= done;
        Ok(done)
    }

    /// Insert a new node and return its id
    pub fn insert_node(
        &mut self,
        parent_id: u64,
        offset: u32,
        kind: NodeKind,
        name: &str,
    ) -> Result<u64> {
        let id = self.tree.reserve_id();
        let node = Node::new(kind)
            .with_id(id)
            .with_name(name)
            .with_parent(parent_id)
            .at(offset);
        self.execute(Command::Insert(node))?;
        Ok(id)
    }

    /// Create a root struct with a type name not yet in use and return its id
    pub fn add_class(&mut self, type_name: Option<&str>) -> Result<u64> {
        let type_name = self
            .tree
            .unique_type_name(type_name.unwrap_or(DEFAULT_CLASS_NAME));
        let id = self.tree.reserve_id();
        self.execute(Command::Insert(Node::root_struct(type_name).with_id(id)))?;
        Ok(id)
    }

    pub fn remove_node(&mut self, id: u64) -> Result<()> {
        self.execute(Command::Remove(id))
    }

    pub fn remove_nodes(&mut self, ids: Vec<u64>) -> Result<()> {
        self.execute(Command::BatchRemove(ids))
    }

    pub fn rename_node(&mut self, id: u64, name: &str) -> Result<()> {
        self.execute(Command::Rename {
            id,
            name: name.to_string(),
        })
    }

    pub fn change_node_kind(&mut self, id: u64, kind: NodeKind) -> Result<()> {
        self.execute(Command::Retype { id, kind })
    }

    pub fn toggle_collapse(&mut self, id: u64) -> Result<()> {
        self.execute(Command::ToggleCollapse(id))
    }

    pub fn move_node(&mut self, id: u64, parent_id: u64, offset: u32) -> Result<()> {
        self.execute(Command::Move {
            id,
            parent_id,
            offset,
        })
    }

    /// Parse `text` for the node's kind and write it to the source
    pub fn set_node_value(&mut self, id: u64, text: &str) -> Result<()> {
        let node = self.tree.get_by_id(id).ok_or(Error::NodeNotFound(id))?;
        let bytes = parse_value(node, text)?;
        self.execute(Command::SetValue {
            id,
            offset: 0,
            bytes,
        })
    }

    /// Write one `f32` component of a vector or matrix node
    pub fn set_component_value(&mut self, id: u64, component: usize, text: &str) -> Result<()> {
        let node = self.tree.get_by_id(id).ok_or(Error::NodeNotFound(id))?;
        let count = node.kind.float_components().unwrap_or(0);
        if component >= count {
            return Err(Error::InvalidValue(format!(
                "{} has no component {}",
                node.kind, component
            )));
        }
        let bytes = parse_component(node.kind, text)?;
        self.execute(Command::SetValue {
            id,
            offset: (component * 4) as u32,
            bytes,
        })
    }

    /// Current bytes of a node, zero-filled where the source cannot be read
    pub fn read_node_bytes(&self, id: u64) -> Result<Vec<u8>> {
        let index = self.tree.index_of_id(id).ok_or(Error::NodeNotFound(id))?;
        let addr = self.tree.absolute_address(index);
        let size = self.tree.byte_size(index) as usize;
        Ok(self.provider.read_bytes(addr, size))
    }

    /// Display text of a node's current value
    pub fn read_value(&self, id: u64) -> Result<String> {
        let bytes = self.read_node_bytes(id)?;
        let kind = self.tree.get_by_id(id).map(|n| n.kind).unwrap_or_default();
        Ok(format_value(kind, &bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Root struct with typed fields at known offsets, over a patterned buffer
    fn small_document() -> Document {
        let mut tree = NodeTree::with_base(0x1000);
        let root = tree.add_node(
            Node::new(NodeKind::Struct)
                .with_name("root")
                .with_type_name("TestStruct"),
        );
        let rid = tree.nodes()[root].id;
        for (offset, kind, name) in [
            (0, NodeKind::UInt32, "field_u32"),
            (4, NodeKind::Float, "field_float"),
            (8, NodeKind::UInt8, "field_u8"),
            (9, NodeKind::Hex16, "pad0"),
            (11, NodeKind::Hex8, "pad1"),
            (12, NodeKind::Hex32, "field_hex"),
        ] {
            tree.add_node(Node::new(kind).with_name(name).with_parent(rid).at(offset));
        }

        let mut data = vec![0u8; 64];
        data[0..4].copy_from_slice(&0xDEADBEEFu32.to_le_bytes());
        data[4..8].copy_from_slice(&3.14f32.to_le_bytes());
        data[8] = 0x42;
        data[12..16].copy_from_slice(&0xCAFEBABEu32.to_le_bytes());

        Document::with_provider(tree, Box::new(BufferProvider::new(data, "small")))
    }

    fn id_of(doc: &Document, name: &str) -> u64 {
        doc.tree().iter().find(|n| n.name == name).unwrap().id
    }

    #[test]
    fn test_provider_follows_tree_base() {
        let doc = small_document();
        assert_eq!(doc.provider().base(), 0x1000);
        assert_eq!(doc.provider().read_u32(0x1000), 0xDEADBEEF);
        assert_eq!(doc.read_value(id_of(&doc, "field_u32")).unwrap(), "3735928559");
    }

    #[test]
    fn test_set_value_undo_redo() {
        let mut doc = small_document();
        let id = id_of(&doc, "field_u32");

        doc.set_node_value(id, "42").unwrap();
        assert_eq!(doc.provider().read_u32(0x1000), 42);
        assert!(doc.is_modified());

        assert!(doc.undo().unwrap());
        assert_eq!(doc.provider().read_u32(0x1000), 0xDEADBEEF);

        assert!(doc.redo().unwrap());
        assert_eq!(doc.provider().read_u32(0x1000), 42);
    }

    #[test]
    fn test_set_float_and_hex() {
        let mut doc = small_document();
        let float = id_of(&doc, "field_float");
        doc.set_node_value(float, "1.5").unwrap();
        assert_eq!(doc.provider().read_f32(0x1004), 1.5);
        doc.undo().unwrap();
        assert!((doc.provider().read_f32(0x1004) - 3.14).abs() < 0.01);

        let hex = id_of(&doc, "field_hex");
        doc.set_node_value(hex, "AA BB CC DD").unwrap();
        assert_eq!(doc.provider().read_bytes(0x100C, 4), vec![0xAA, 0xBB, 0xCC, 0xDD]);
        doc.undo().unwrap();
        assert_eq!(doc.provider().read_u32(0x100C), 0xCAFEBABE);

        let byte = id_of(&doc, "field_u8");
        assert_eq!(doc.read_value(byte).unwrap(), "0x42");
        doc.set_node_value(byte, "0xFF").unwrap();
        assert_eq!(doc.provider().read_u8(0x1008), 0xFF);
    }

    #[test]
    fn test_bad_value_is_not_recorded() {
        let mut doc = small_document();
        let id = id_of(&doc, "field_u32");
        assert!(doc.set_node_value(id, "lots").is_err());
        assert!(doc.set_node_value(999, "1").is_err());
        assert!(!doc.undo_log().can_undo());
        assert!(!doc.is_modified());
    }

    #[test]
    fn test_rename_and_change_kind() {
        let mut doc = small_document();
        let id = id_of(&doc, "field_u32");

        doc.rename_node(id, "myRenamedField").unwrap();
        assert_eq!(doc.tree().get_by_id(id).unwrap().name, "myRenamedField");
        doc.undo().unwrap();
        assert_eq!(doc.tree().get_by_id(id).unwrap().name, "field_u32");
        doc.redo().unwrap();
        assert_eq!(doc.tree().get_by_id(id).unwrap().name, "myRenamedField");

        doc.change_node_kind(id, NodeKind::Float).unwrap();
        assert_eq!(doc.tree().get_by_id(id).unwrap().kind, NodeKind::Float);
        doc.undo().unwrap();
        assert_eq!(doc.tree().get_by_id(id).unwrap().kind, NodeKind::UInt32);
    }

    #[test]
    fn test_insert_and_remove() {
        let mut doc = small_document();
        let before = doc.tree().len();
        let root = doc.tree().nodes()[0].id;

        let id = doc.insert_node(root, 16, NodeKind::Hex64, "newHex").unwrap();
        assert_eq!(doc.tree().len(), before + 1);
        let node = doc.tree().get_by_id(id).unwrap();
        assert_eq!((node.kind, node.offset), (NodeKind::Hex64, 16));

        doc.remove_node(id).unwrap();
        assert_eq!(doc.tree().len(), before);
        doc.undo().unwrap();
        assert_eq!(doc.tree().len(), before + 1);
        assert_eq!(doc.tree().get_by_id(id).unwrap().name, "newHex");

        let pad0 = id_of(&doc, "pad0");
        let pad1 = id_of(&doc, "pad1");
        doc.remove_nodes(vec![pad0, pad1]).unwrap();
        assert_eq!(doc.tree().len(), before - 1);
        assert_eq!(doc.undo_log().undo_label(), Some("Remove nodes"));
    }

    #[test]
    fn test_toggle_collapse_history() {
        let mut doc = small_document();
        let root = doc.tree().nodes()[0].id;

        doc.toggle_collapse(root).unwrap();
        assert!(doc.tree().nodes()[0].collapsed);
        doc.toggle_collapse(root).unwrap();
        assert!(!doc.tree().nodes()[0].collapsed);

        doc.undo().unwrap();
        assert!(doc.tree().nodes()[0].collapsed);
        doc.undo().unwrap();
        assert!(!doc.tree().nodes()[0].collapsed);
    }

    #[test]
    fn test_add_class_names() {
        let mut doc = Document::default();
        let first = doc.add_class(None).unwrap();
        let second = doc.add_class(None).unwrap();
        assert_eq!(doc.tree().get_by_id(first).unwrap().struct_type_name, "NewClass");
        assert_eq!(doc.tree().get_by_id(second).unwrap().struct_type_name, "NewClass1");
        assert!(second > first);
    }

    #[test]
    fn test_component_edit() {
        let mut tree = NodeTree::new();
        let root = tree.add_node(Node::root_struct("Transform"));
        let rid = tree.nodes()[root].id;
        let pos = tree.add_node(Node::new(NodeKind::Vec3).with_name("pos").with_parent(rid));
        let pid = tree.nodes()[pos].id;
        let mut doc = Document::with_provider(tree, Box::new(BufferProvider::new(vec![0; 12], "m")));

        doc.set_component_value(pid, 1, "2.5").unwrap();
        assert_eq!(doc.read_value(pid).unwrap(), "0, 2.5, 0");
        assert!(doc.set_component_value(pid, 3, "1").is_err());

        doc.set_node_value(pid, "1 2 3").unwrap();
        assert_eq!(doc.read_value(pid).unwrap(), "1, 2, 3");
    }

    #[test]
    fn test_set_base_and_load_binary() {
        let mut doc = small_document();
        doc.set_base(0x4000);
        assert_eq!(doc.tree().base_address, 0x4000);
        assert_eq!(doc.provider().read_u32(0x4000), 0xDEADBEEF);

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("dump.bin");
        std::fs::write(&bin, 7u32.to_le_bytes()).unwrap();
        doc.load_binary(&bin).unwrap();
        assert_eq!(doc.provider().name(), "dump.bin");
        assert_eq!(doc.read_value(id_of(&doc, "field_u32")).unwrap(), "7");
        assert!(doc.load_binary(dir.path().join("none.bin")).is_err());
    }

    #[test]
    fn test_xml_save_and_load() {
        let mut doc = small_document();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.reclass");

        let id = id_of(&doc, "field_u32");
        doc.rename_node(id, "value").unwrap();
        doc.export_reclass_xml(&path).unwrap();
        assert!(!doc.is_modified());
        assert_eq!(doc.path(), Some(path.as_path()));

        let loaded = Document::from_reclass_xml(&path).unwrap();
        let tree = loaded.tree();
        assert_eq!(tree.root_structs().len(), 1);
        assert_eq!(tree.nodes()[0].name, "TestStruct");
        assert!(tree.iter().any(|n| n.name == "value" && n.kind == NodeKind::UInt32));
        assert_eq!(tree.byte_size(0), 16);
    }
}
