//! C++ header generation
//!
//! Renders root structs as packed C++ definitions. Embedded types are
//! written before the structs that contain them, pointer targets are
//! forward-declared, and holes between members become explicit `pad_XXXX`
//! arrays so the layout matches byte for byte.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::error::{Error, Result};
use crate::tree::{Layout, Node, NodeKind, NodeTree};

/// Turn an arbitrary name into a C++ identifier
fn ident(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

fn primitive(kind: NodeKind) -> Option<&'static str> {
    let ty = match kind {
        NodeKind::Int8 => "int8_t",
        NodeKind::Int16 => "int16_t",
        NodeKind::Int32 => "int32_t",
        NodeKind::Int64 => "int64_t",
        NodeKind::UInt8 => "uint8_t",
        NodeKind::UInt16 => "uint16_t",
        NodeKind::UInt32 | NodeKind::Pointer32 => "uint32_t",
        NodeKind::UInt64 => "uint64_t",
        NodeKind::Float => "float",
        NodeKind::Double => "double",
        NodeKind::Bool => "bool",
        _ => return None,
    };
    Some(ty)
}

struct Generator<'a> {
    tree: &'a NodeTree,
    layout: Layout<'a>,
    emitted: HashSet<String>,
    visiting: HashSet<u64>,
    forward: BTreeSet<String>,
    body: String,
}

impl<'a> Generator<'a> {
    fn new(tree: &'a NodeTree) -> Self {
        Self {
            tree,
            layout: tree.layout(),
            emitted: HashSet::new(),
            visiting: HashSet::new(),
            forward: BTreeSet::new(),
            body: String::new(),
        }
    }

    fn node(&self, index: usize) -> &'a Node {
        &self.tree.nodes()[index]
    }

    /// C++ name of the struct defined by `index`
    fn struct_name(&self, index: usize) -> String {
        let node = self.node(index);
        let name = node.type_name();
        if name.is_empty() {
            format!("struct_{}", node.id)
        } else {
            ident(name)
        }
    }

    /// Node whose children define the layout of a struct or struct-array member
    fn definition_of(&self, index: usize) -> Option<usize> {
        let node = self.node(index);
        let embeds = node.kind == NodeKind::Struct
            || (node.kind == NodeKind::Array && node.element_kind == NodeKind::Struct);
        if !embeds {
            return None;
        }
        if !self.layout.children_of(node.id).is_empty() {
            return Some(index);
        }
        self.tree.index_of_id(node.ref_id)
    }

    fn member_name(node: &Node) -> String {
        if node.name.is_empty() {
            format!("field_{:04X}", node.offset)
        } else {
            ident(&node.name)
        }
    }

    /// Definition that can be named as a member type, i.e. not still open
    fn complete_definition(&self, index: usize) -> Option<usize> {
        self.definition_of(index)
            .filter(|&def| !self.visiting.contains(&self.node(def).id))
    }

    /// Type and declarator suffix for a member
    fn declaration(&mut self, index: usize) -> (String, String) {
        let node = self.node(index);
        let size = self.layout.byte_size(index);
        match node.kind {
            NodeKind::Hex8 | NodeKind::Hex16 | NodeKind::Hex32 | NodeKind::Hex64 | NodeKind::Padding => {
                ("uint8_t".to_string(), format!("[{}]", size))
            }
            NodeKind::Pointer64 => match self.tree.resolve_type_name(node.ref_id) {
                Some(target) => {
                    let target = ident(target);
                    self.forward.insert(target.clone());
                    (format!("{}*", target), String::new())
                }
                None => ("void*".to_string(), String::new()),
            },
            NodeKind::UTF8 => ("char".to_string(), format!("[{}]", node.str_len)),
            NodeKind::UTF16 => ("char16_t".to_string(), format!("[{}]", node.str_len)),
            NodeKind::Vec2 | NodeKind::Vec3 | NodeKind::Vec4 => (
                "float".to_string(),
                format!("[{}]", node.kind.float_components().unwrap_or(0)),
            ),
            NodeKind::Mat4x4 => ("float".to_string(), "[4][4]".to_string()),
            NodeKind::Struct => match self.complete_definition(index) {
                Some(def) => (self.struct_name(def), String::new()),
                None => ("uint8_t".to_string(), format!("[{}]", size)),
            },
            NodeKind::Array => {
                let element = match node.element_kind {
                    NodeKind::Struct => self.complete_definition(index).map(|def| self.struct_name(def)),
                    kind => primitive(kind).map(str::to_string),
                };
                match element {
                    Some(ty) => (ty, format!("[{}]", node.array_len)),
                    None => ("uint8_t".to_string(), format!("[{}]", size)),
                }
            }
            kind => (
                primitive(kind).unwrap_or("uint8_t").to_string(),
                String::new(),
            ),
        }
    }

    fn emit_struct(&mut self, index: usize) {
        let name = self.struct_name(index);
        let id = self.node(index).id;
        if self.emitted.contains(&name) || !self.visiting.insert(id) {
            return;
        }

        let members: Vec<usize> = self.layout.children_of(id).to_vec();
        for &m in &members {
            if let Some(def) = self.definition_of(m) {
                if def != index {
                    self.emit_struct(def);
                }
            }
        }

        let size = self.layout.byte_size(index);
        let mut text = format!("// size {:#06x}\nstruct {}\n{{\n", size, name);
        let mut cursor = 0u64;
        for &m in &members {
            let node = self.node(m);
            let start = u64::from(node.offset);
            let member_size = u64::from(self.layout.byte_size(m));
            let (ty, suffix) = self.declaration(m);
            let member = Self::member_name(node);

            if start < cursor {
                text.push_str(&format!(
                    "\t// {} {}{}; // {:#06x} overlaps previous member\n",
                    ty, member, suffix, start
                ));
                continue;
            }
            if member_size == 0 {
                text.push_str(&format!(
                    "\t// {} {}{}; // {:#06x} zero-sized\n",
                    ty, member, suffix, start
                ));
                continue;
            }
            if start > cursor {
                text.push_str(&format!(
                    "\tuint8_t pad_{:04X}[{}]; // {:#06x}\n",
                    cursor,
                    start - cursor,
                    cursor
                ));
            }
            text.push_str(&format!("\t{} {}{}; // {:#06x}\n", ty, member, suffix, start));
            cursor = start + member_size;
        }
        text.push_str("};\n");
        if size > 0 {
            text.push_str(&format!(
                "static_assert(sizeof({}) == {:#x}, \"{} size\");\n",
                name, size, name
            ));
        }
        text.push('\n');

        self.visiting.remove(&id);
        self.emitted.insert(name);
        self.body.push_str(&text);
    }

    fn finish(self) -> String {
        let mut out = String::from("// Generated by rcx\n#pragma once\n#include <cstdint>\n\n");
        out.push_str("#pragma pack(push, 1)\n\n");
        let pending: Vec<&String> = self.forward.iter().collect();
        if !pending.is_empty() {
            for name in pending {
                out.push_str(&format!("struct {};\n", name));
            }
            out.push('\n');
        }
        out.push_str(&self.body);
        out.push_str("#pragma pack(pop)\n");
        out
    }
}

/// C++ definitions for one root struct and every type it embeds
pub fn render_cpp(tree: &NodeTree, root_id: u64) -> Result<String> {
    let index = tree.index_of_id(root_id).ok_or(Error::NodeNotFound(root_id))?;
    if tree.nodes()[index].kind != NodeKind::Struct {
        return Err(Error::InvalidValue(format!("node {} is not a struct", root_id)));
    }
    let mut generator = Generator::new(tree);
    generator.emit_struct(index);
    debug!("Rendered {} struct definitions", generator.emitted.len());
    Ok(generator.finish())
}

/// C++ definitions for every root struct
pub fn render_cpp_all(tree: &NodeTree) -> String {
    let mut generator = Generator::new(tree);
    for index in tree.root_structs() {
        generator.emit_struct(index);
    }
    debug!("Rendered {} struct definitions", generator.emitted.len());
    generator.finish()
}
