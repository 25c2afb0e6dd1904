//! NodeTree to ReClass XML

use std::fs;
use std::path::Path;

use quick_xml::escape::escape;
use tracing::{debug, info};

use super::{type_code, ExportOptions, CLASS_TYPE, CUSTOM_TYPE};
use crate::error::{Error, Result};
use crate::tree::{Layout, Node, NodeKind, NodeTree};

/// Indented line writer for the output document
struct XmlOut {
    buf: String,
    indent: usize,
    level: usize,
}

impl XmlOut {
    fn new(indent: usize) -> Self {
        Self {
            buf: String::new(),
            indent,
            level: 0,
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.level * self.indent {
            self.buf.push(' ');
        }
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    fn open(&mut self, tag: &str, attrs: &str) {
        self.line(&format!("<{}{}>", tag, attrs));
        self.level += 1;
    }

    fn close(&mut self, tag: &str) {
        self.level = self.level.saturating_sub(1);
        self.line(&format!("</{}>", tag));
    }

    fn empty(&mut self, tag: &str, attrs: &str) {
        self.line(&format!("<{}{}/>", tag, attrs));
    }
}

fn attrs(pairs: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (key, value) in pairs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(*value));
        out.push('"');
    }
    out
}

/// Members that export as anonymous byte runs
fn is_raw(kind: NodeKind) -> bool {
    kind.is_hex() || kind == NodeKind::Padding
}

/// Serialize a tree to ReClass XML.
///
/// Every root-level struct becomes a `<Class>`, in offset order. Fails with
/// [`Error::EmptyTree`] for an empty tree and [`Error::NoClasses`] when no
/// root struct exists.
pub fn export_to_string(tree: &NodeTree, options: &ExportOptions) -> Result<String> {
    if tree.is_empty() {
        return Err(Error::EmptyTree);
    }

    let layout = tree.layout();
    let mut out = XmlOut::new(options.indent);
    out.line(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    out.open("ReClass", "");
    out.line("<!--ReClassEx-->");

    let class_type = CLASS_TYPE.to_string();
    let mut classes = 0usize;
    for &ri in layout.children_of(0) {
        let root = &tree.nodes()[ri];
        if root.kind != NodeKind::Struct {
            debug!("Skipping root-level {} node {}", root.kind, root.id);
            continue;
        }

        // The type name, not the instance label: Pointer and Instance
        // attributes name types, and the format has room for only one name.
        let class_attrs = attrs(&[
            ("Name", root.type_name()),
            ("Type", class_type.as_str()),
            ("Comment", ""),
            ("Offset", "0"),
            ("strOffset", "0"),
            ("Code", ""),
        ]);
        let members = layout.children_of(root.id);
        if members.is_empty() {
            out.empty("Class", &class_attrs);
        } else {
            out.open("Class", &class_attrs);
            write_members(&layout, members, options, &mut out);
            out.close("Class");
        }
        classes += 1;
    }

    out.close("ReClass");

    if classes == 0 {
        return Err(Error::NoClasses);
    }
    debug!("Exported {} classes", classes);
    Ok(out.buf)
}

/// Serialize a tree to a ReClass XML file.
///
/// The document is rendered in full before the file is created, so a failed
/// export leaves nothing on disk.
pub fn export_to_file(
    tree: &NodeTree,
    path: impl AsRef<Path>,
    options: &ExportOptions,
) -> Result<()> {
    let path = path.as_ref();
    let xml = export_to_string(tree, options)?;
    fs::write(path, xml)?;
    info!("Exported {} nodes to {}", tree.len(), path.display());
    Ok(())
}

fn write_members(layout: &Layout<'_>, members: &[usize], options: &ExportOptions, out: &mut XmlOut) {
    let nodes = layout.tree().nodes();
    let custom_type = CUSTOM_TYPE.to_string();
    let mut cursor = 0u64;
    let mut i = 0;

    while i < members.len() {
        let child = &nodes[members[i]];
        let start = u64::from(child.offset);

        if options.fill_gaps && start > cursor {
            write_gap(out, start - cursor, &custom_type);
        }

        if is_raw(child.kind) {
            let mut run_end = start + u64::from(layout.byte_size(members[i]));
            let mut j = i + 1;
            while j < members.len() {
                let next = &nodes[members[j]];
                let next_start = u64::from(next.offset);
                if !is_raw(next.kind) || next_start < run_end {
                    break;
                }
                run_end = next_start + u64::from(layout.byte_size(members[j]));
                j += 1;
            }

            let name = if j - i == 1 { child.name.as_str() } else { "" };
            let size = (run_end - start).to_string();
            out.empty(
                "Node",
                &attrs(&[
                    ("Name", name),
                    ("Type", custom_type.as_str()),
                    ("Size", size.as_str()),
                    ("bHidden", "false"),
                    ("Comment", ""),
                ]),
            );
            cursor = cursor.max(run_end);
            i = j;
            continue;
        }

        let size = layout.byte_size(members[i]);
        write_member(layout, child, size, out);
        cursor = cursor.max(start + u64::from(size));
        i += 1;
    }
}

/// Anonymous filler covering a hole between members
fn write_gap(out: &mut XmlOut, size: u64, custom_type: &str) {
    let size = size.to_string();
    out.empty(
        "Node",
        &attrs(&[
            ("Name", ""),
            ("Type", custom_type),
            ("Size", size.as_str()),
            ("bHidden", "false"),
            ("Comment", ""),
        ]),
    );
}

fn write_member(layout: &Layout<'_>, node: &Node, size: u32, out: &mut XmlOut) {
    let tree = layout.tree();
    let type_str = type_code(node.kind).to_string();
    let size_str = size.to_string();
    let total = node.array_len.to_string();
    let mut pairs: Vec<(&str, &str)> = vec![
        ("Name", node.name.as_str()),
        ("Type", type_str.as_str()),
        ("Size", size_str.as_str()),
        ("bHidden", "false"),
        ("Comment", ""),
    ];

    match node.kind {
        NodeKind::Pointer32 | NodeKind::Pointer64 => {
            if let Some(target) = tree.resolve_type_name(node.ref_id) {
                pairs.push(("Pointer", target));
            } else if node.ref_id != 0 {
                debug!("Pointer {} target {} unresolved", node.id, node.ref_id);
            }
        }
        NodeKind::Struct => pairs.push(("Instance", instance_type(tree, node))),
        NodeKind::Array => {
            let element = element_type(tree, node);
            pairs.push(("Total", total.as_str()));
            out.open("Node", &attrs(&pairs));
            out.empty("Array", &attrs(&[("Name", element), ("Total", total.as_str())]));
            out.close("Node");
            return;
        }
        _ => {}
    }

    out.empty("Node", &attrs(&pairs));
}

/// Referenced type first, so renamed classes stay linked
fn instance_type<'a>(tree: &'a NodeTree, node: &'a Node) -> &'a str {
    if let Some(name) = tree.resolve_type_name(node.ref_id) {
        return name;
    }
    if node.struct_type_name.is_empty() {
        &node.name
    } else {
        &node.struct_type_name
    }
}

fn element_type<'a>(tree: &'a NodeTree, node: &'a Node) -> &'a str {
    if node.element_kind == NodeKind::Struct {
        if let Some(name) = tree.resolve_type_name(node.ref_id) {
            return name;
        }
        if !node.struct_type_name.is_empty() {
            return &node.struct_type_name;
        }
    }
    node.element_kind.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(tree: &mut NodeTree, name: &str, offset: u32) -> u64 {
        let index = tree.add_node(Node::root_struct(name).at(offset));
        tree.nodes()[index].id
    }

    #[test]
    fn test_empty_tree_rejected() {
        let tree = NodeTree::new();
        assert!(matches!(
            export_to_string(&tree, &ExportOptions::default()),
            Err(Error::EmptyTree)
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.reclass");
        assert!(export_to_file(&tree, &path, &ExportOptions::default()).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_no_classes_rejected() {
        let mut tree = NodeTree::new();
        tree.add_node(Node::new(NodeKind::Int32));
        assert!(matches!(
            export_to_string(&tree, &ExportOptions::default()),
            Err(Error::NoClasses)
        ));
    }

    #[test]
    fn test_document_shape() {
        let mut tree = NodeTree::new();
        let id = class(&mut tree, "Player", 0);
        tree.add_node(Node::new(NodeKind::Int32).with_name("health").with_parent(id));

        let xml = export_to_string(&tree, &ExportOptions::default()).unwrap();
        let expected = concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<ReClass>\n",
            "    <!--ReClassEx-->\n",
            "    <Class Name=\"Player\" Type=\"28\" Comment=\"\" Offset=\"0\" strOffset=\"0\" Code=\"\">\n",
            "        <Node Name=\"health\" Type=\"10\" Size=\"4\" bHidden=\"false\" Comment=\"\"/>\n",
            "    </Class>\n",
            "</ReClass>\n",
        );
        assert_eq!(xml, expected);
    }

    #[test]
    fn test_hex_run_collapses() {
        let mut tree = NodeTree::new();
        let id = class(&mut tree, "Blob", 0);
        for offset in 0..4 {
            tree.add_node(Node::new(NodeKind::Hex8).with_name("b").with_parent(id).at(offset));
        }
        tree.add_node(Node::new(NodeKind::Int32).with_name("value").with_parent(id).at(4));

        let xml = export_to_string(&tree, &ExportOptions::default()).unwrap();
        assert_eq!(xml.matches("<Node ").count(), 2);
        assert!(xml.contains(r#"<Node Name="" Type="21" Size="4" bHidden="false" Comment=""/>"#));
        assert!(xml.contains(r#"<Node Name="value" Type="10" Size="4""#));
    }

    #[test]
    fn test_single_hex_keeps_name() {
        let mut tree = NodeTree::new();
        let id = class(&mut tree, "A", 0);
        tree.add_node(Node::new(NodeKind::Hex32).with_name("flags").with_parent(id));

        let xml = export_to_string(&tree, &ExportOptions::default()).unwrap();
        assert!(xml.contains(r#"<Node Name="flags" Type="21" Size="4""#));
    }

    #[test]
    fn test_overlap_ends_run() {
        let mut tree = NodeTree::new();
        let id = class(&mut tree, "A", 0);
        tree.add_node(Node::new(NodeKind::Hex64).with_parent(id).at(0));
        tree.add_node(Node::new(NodeKind::Hex32).with_parent(id).at(4));

        let xml = export_to_string(&tree, &ExportOptions::default()).unwrap();
        assert!(xml.contains(r#"Type="21" Size="8""#));
        assert!(xml.contains(r#"Type="21" Size="4""#));
    }

    #[test]
    fn test_gap_filling() {
        let mut tree = NodeTree::new();
        let id = class(&mut tree, "A", 0);
        tree.add_node(Node::new(NodeKind::Int32).with_parent(id).at(0));
        tree.add_node(Node::new(NodeKind::Int32).with_parent(id).at(8));

        let filled = export_to_string(&tree, &ExportOptions::default()).unwrap();
        assert!(filled.contains(r#"<Node Name="" Type="21" Size="4""#));

        let sparse =
            export_to_string(&tree, &ExportOptions::default().with_fill_gaps(false)).unwrap();
        assert!(!sparse.contains(r#"Type="21""#));
    }

    #[test]
    fn test_gap_before_named_hex_stays_separate() {
        let mut tree = NodeTree::new();
        let id = class(&mut tree, "A", 0);
        tree.add_node(Node::new(NodeKind::Int32).with_name("a").with_parent(id));
        tree.add_node(Node::new(NodeKind::Hex32).with_name("flags").with_parent(id).at(8));

        let xml = export_to_string(&tree, &ExportOptions::default()).unwrap();
        let gap = xml.find(r#"<Node Name="" Type="21" Size="4""#).unwrap();
        let flags = xml.find(r#"<Node Name="flags" Type="21" Size="4""#).unwrap();
        assert!(gap < flags);
        assert!(!xml.contains(r#"Size="8""#));
    }

    #[test]
    fn test_class_name_is_type_name() {
        let mut tree = NodeTree::new();
        let index = tree.add_node(
            Node::new(NodeKind::Struct)
                .with_name("root")
                .with_type_name("TestStruct"),
        );
        let id = tree.nodes()[index].id;
        tree.add_node(Node::new(NodeKind::Pointer64).with_name("self_ptr").with_parent(id).with_ref(id));

        let xml = export_to_string(&tree, &ExportOptions::default()).unwrap();
        assert!(xml.contains(r#"<Class Name="TestStruct""#));
        assert!(xml.contains(r#"Pointer="TestStruct""#));
        assert!(!xml.contains(r#"Name="root""#));
    }

    #[test]
    fn test_instance_follows_referenced_class() {
        let mut tree = NodeTree::new();
        let vec_id = class(&mut tree, "Vec3f", 0);
        tree.add_node(Node::new(NodeKind::Float).with_parent(vec_id));

        let id = class(&mut tree, "Entity", 0);
        // Stale type names left behind by a class rename
        tree.add_node(
            Node::new(NodeKind::Struct)
                .with_name("pos")
                .with_type_name("Vector")
                .with_parent(id)
                .with_ref(vec_id),
        );
        tree.add_node(
            Node::new(NodeKind::Array)
                .with_name("path")
                .with_array(NodeKind::Struct, 2)
                .with_type_name("Vector")
                .with_parent(id)
                .at(4)
                .with_ref(vec_id),
        );
        tree.add_node(
            Node::new(NodeKind::Struct)
                .with_name("other")
                .with_type_name("External")
                .with_parent(id)
                .at(12)
                .with_size_override(8),
        );

        let xml = export_to_string(&tree, &ExportOptions::default()).unwrap();
        assert!(xml.contains(r#"Name="pos" Type="1" Size="4" bHidden="false" Comment="" Instance="Vec3f"/>"#));
        assert!(xml.contains(r#"<Array Name="Vec3f" Total="2"/>"#));
        assert!(xml.contains(r#"Name="other" Type="1" Size="8" bHidden="false" Comment="" Instance="External"/>"#));
        assert!(!xml.contains("\"Vector\""));
    }

    #[test]
    fn test_self_pointer() {
        let mut tree = NodeTree::new();
        let id = class(&mut tree, "ListNode", 0);
        tree.add_node(Node::new(NodeKind::Pointer64).with_name("next").with_parent(id).with_ref(id));
        tree.add_node(
            Node::new(NodeKind::Pointer64)
                .with_name("lost")
                .with_parent(id)
                .at(8)
                .with_ref(999),
        );

        let xml = export_to_string(&tree, &ExportOptions::default()).unwrap();
        assert!(xml.contains(r#"Name="next" Type="8" Size="8" bHidden="false" Comment="" Pointer="ListNode"/>"#));
        assert!(xml.contains(r#"Name="lost" Type="8" Size="8" bHidden="false" Comment=""/>"#));
    }

    #[test]
    fn test_instance_and_array() {
        let mut tree = NodeTree::new();
        let vec_id = class(&mut tree, "Vector", 0);
        tree.add_node(Node::new(NodeKind::Float).with_parent(vec_id).at(0));
        tree.add_node(Node::new(NodeKind::Float).with_parent(vec_id).at(4));

        let id = class(&mut tree, "Entity", 0);
        tree.add_node(
            Node::new(NodeKind::Struct)
                .with_name("pos")
                .with_type_name("Vector")
                .with_parent(id)
                .with_ref(vec_id),
        );
        tree.add_node(
            Node::new(NodeKind::Array)
                .with_name("ids")
                .with_array(NodeKind::Int32, 4)
                .with_parent(id)
                .at(8),
        );
        tree.add_node(
            Node::new(NodeKind::Array)
                .with_name("path")
                .with_array(NodeKind::Struct, 2)
                .with_parent(id)
                .at(24)
                .with_ref(vec_id),
        );

        let xml = export_to_string(&tree, &ExportOptions::default()).unwrap();
        assert!(xml.contains(r#"Name="pos" Type="1" Size="8" bHidden="false" Comment="" Instance="Vector"/>"#));
        assert!(xml.contains(r#"Name="ids" Type="27" Size="16" bHidden="false" Comment="" Total="4">"#));
        assert!(xml.contains(r#"<Array Name="Int32" Total="4"/>"#));
        assert!(xml.contains(r#"Name="path" Type="27" Size="16""#));
        assert!(xml.contains(r#"<Array Name="Vector" Total="2"/>"#));
    }

    #[test]
    fn test_class_order() {
        let mut tree = NodeTree::new();
        class(&mut tree, "Late", 0x200);
        class(&mut tree, "First", 0x100);
        class(&mut tree, "Second", 0x100);

        let xml = export_to_string(&tree, &ExportOptions::default()).unwrap();
        let first = xml.find("\"First\"").unwrap();
        let second = xml.find("\"Second\"").unwrap();
        let late = xml.find("\"Late\"").unwrap();
        assert!(first < second && second < late);
    }

    #[test]
    fn test_names_escaped() {
        let mut tree = NodeTree::new();
        let id = class(&mut tree, "Map<int>", 0);
        tree.add_node(Node::new(NodeKind::Int8).with_name("a&b").with_parent(id));

        let xml = export_to_string(&tree, &ExportOptions::default()).unwrap();
        assert!(xml.contains("Name=\"Map&lt;int&gt;\""));
        assert!(xml.contains("Name=\"a&amp;b\""));
    }
}
