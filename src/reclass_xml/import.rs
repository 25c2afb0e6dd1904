//! ReClass XML to NodeTree
//!
//! Parsing happens in two steps: the document is read into plain class and
//! member records, then the tree is built from them. Type references
//! (`Pointer`, `Instance`, array element classes) are resolved by class name
//! once every class has a node id.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info, warn};

use super::{kind_for_code, ImportOptions, CUSTOM_TYPE};
use crate::error::{Error, Result};
use crate::tree::{Node, NodeKind, NodeTree};

/// Largest `Type="21"` block expanded into hex nodes
pub const MAX_RAW_BYTES: u32 = 0x10_0000;

/// One `<Node>` element
#[derive(Debug, Default)]
struct RawMember {
    name: String,
    code: u32,
    size: u32,
    offset: Option<u32>,
    pointer: Option<String>,
    instance: Option<String>,
    total: Option<u32>,
    element: Option<String>,
}

/// One `<Class>` element
#[derive(Debug, Default)]
struct RawClass {
    name: String,
    members: Vec<RawMember>,
}

fn attr_map(e: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value()?.into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn number(attrs: &HashMap<String, String>, key: &str) -> Result<Option<u32>> {
    match attrs.get(key).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(v) => v.parse::<u32>().map(Some).map_err(|_| {
            Error::MalformedXml(format!("{} is not a number: {:?}", key, v))
        }),
    }
}

fn text(attrs: &HashMap<String, String>, key: &str) -> Option<String> {
    attrs.get(key).filter(|v| !v.is_empty()).cloned()
}

fn raw_member(e: &BytesStart<'_>) -> Result<RawMember> {
    let attrs = attr_map(e)?;
    let code = number(&attrs, "Type")?
        .ok_or_else(|| Error::MalformedXml("<Node> without a Type".to_string()))?;

    Ok(RawMember {
        name: attrs.get("Name").cloned().unwrap_or_default(),
        code,
        size: number(&attrs, "Size")?.unwrap_or(0),
        offset: number(&attrs, "Offset")?,
        pointer: text(&attrs, "Pointer"),
        instance: text(&attrs, "Instance"),
        total: number(&attrs, "Total")?,
        element: None,
    })
}

fn parse_document(xml: &str) -> Result<Vec<RawClass>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut classes = Vec::new();
    let mut saw_root = false;
    let mut class: Option<RawClass> = None;
    let mut member: Option<RawMember> = None;

    loop {
        let (e, is_empty) = match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(e) => {
                match e.name().as_ref() {
                    b"Node" => {
                        if let (Some(m), Some(c)) = (member.take(), class.as_mut()) {
                            c.members.push(m);
                        }
                    }
                    b"Class" => {
                        if let Some(c) = class.take() {
                            classes.push(c);
                        }
                    }
                    _ => {}
                }
                continue;
            }
            _ => continue,
        };

        match e.name().as_ref() {
            b"ReClass" => saw_root = true,
            b"Class" => {
                if class.is_some() {
                    return Err(Error::MalformedXml("nested <Class> element".to_string()));
                }
                let attrs = attr_map(&e)?;
                let raw = RawClass {
                    name: attrs.get("Name").cloned().unwrap_or_default(),
                    members: Vec::new(),
                };
                if is_empty {
                    classes.push(raw);
                } else {
                    class = Some(raw);
                }
            }
            b"Node" => {
                let Some(c) = class.as_mut() else {
                    return Err(Error::MalformedXml("<Node> outside of a <Class>".to_string()));
                };
                if member.is_some() {
                    return Err(Error::MalformedXml("nested <Node> element".to_string()));
                }
                let raw = raw_member(&e)?;
                if is_empty {
                    c.members.push(raw);
                } else {
                    member = Some(raw);
                }
            }
            b"Array" => match member.as_mut() {
                Some(m) => {
                    let attrs = attr_map(&e)?;
                    m.element = text(&attrs, "Name");
                    if m.total.is_none() {
                        m.total = number(&attrs, "Total")?;
                    }
                }
                None => debug!("Ignoring <Array> outside of a <Node>"),
            },
            other => debug!(
                "Ignoring element <{}>",
                String::from_utf8_lossy(other)
            ),
        }
    }

    if !saw_root {
        return Err(Error::MalformedXml("missing <ReClass> root element".to_string()));
    }
    if class.is_some() || member.is_some() {
        return Err(Error::MalformedXml("document ends inside a <Class>".to_string()));
    }
    Ok(classes)
}

/// Tree under construction plus the type references still to resolve
struct Builder<'a> {
    tree: NodeTree,
    options: &'a ImportOptions,
    class_names: HashSet<String>,
    pending: Vec<(u64, String)>,
}

impl<'a> Builder<'a> {
    /// Add one member and return how many bytes it covers when `Size` is absent
    fn add_member(&mut self, parent_id: u64, offset: u32, raw: &RawMember) -> Result<u32> {
        if raw.code == CUSTOM_TYPE {
            return self.add_raw_bytes(parent_id, offset, raw.size, &raw.name);
        }
        let Some(kind) = kind_for_code(raw.code, raw.size, self.options) else {
            warn!(
                "Unknown type code {} on '{}', importing {} raw bytes",
                raw.code, raw.name, raw.size
            );
            return self.add_raw_bytes(parent_id, offset, raw.size, &raw.name);
        };

        let mut node = Node::new(kind)
            .with_name(raw.name.clone())
            .with_parent(parent_id)
            .at(offset);
        let mut target = None;

        match kind {
            NodeKind::UTF8 => node.str_len = raw.size,
            NodeKind::UTF16 => node.str_len = raw.size / 2,
            NodeKind::Pointer32 | NodeKind::Pointer64 => target = raw.pointer.clone(),
            NodeKind::Struct => {
                if let Some(ty) = &raw.instance {
                    node.struct_type_name = ty.clone();
                    target = Some(ty.clone());
                }
                if raw.size > 0 {
                    node.size_override = Some(raw.size);
                }
            }
            NodeKind::Array => {
                node.array_len = raw.total.unwrap_or(1);
                if let Some(element) = &raw.element {
                    match self.element_kind(element) {
                        Some(primitive) => node.element_kind = primitive,
                        None => {
                            node.element_kind = NodeKind::Struct;
                            node.struct_type_name = element.clone();
                            target = Some(element.clone());
                        }
                    }
                }
            }
            _ => {}
        }

        let size = node.own_size();
        let index = self.tree.add_node(node);
        if let Some(type_name) = target {
            self.pending.push((self.tree.nodes()[index].id, type_name));
        }
        Ok(size)
    }

    /// Class names win over primitive names
    fn element_kind(&self, name: &str) -> Option<NodeKind> {
        if self.class_names.contains(name) {
            return None;
        }
        name.parse::<NodeKind>()
            .ok()
            .filter(|k| !k.is_container() && k.size() > 0)
    }

    /// Cover `size` bytes with the widest hex nodes that fit
    fn add_raw_bytes(&mut self, parent_id: u64, offset: u32, size: u32, name: &str) -> Result<u32> {
        if size > MAX_RAW_BYTES {
            return Err(Error::MalformedXml(format!(
                "raw block '{}' of {} bytes exceeds {} bytes",
                name, size, MAX_RAW_BYTES
            )));
        }
        let mut at = offset;
        let mut remaining = size;
        let mut first = true;
        while remaining > 0 {
            let chunk = [8u32, 4, 2, 1]
                .into_iter()
                .find(|&c| c <= remaining)
                .unwrap_or(1);
            let kind = NodeKind::hex_for_size(chunk).unwrap_or(NodeKind::Hex8);
            let mut node = Node::new(kind).with_parent(parent_id).at(at);
            if first {
                node.name = name.to_string();
                first = false;
            }
            self.tree.add_node(node);
            at = at.saturating_add(chunk);
            remaining -= chunk;
        }
        Ok(size)
    }

    fn resolve(&mut self, types: &HashMap<String, u64>) {
        for (id, type_name) in std::mem::take(&mut self.pending) {
            match types.get(&type_name) {
                Some(&target) => {
                    if let Some(node) = self.tree.node_mut_by_id(id) {
                        node.ref_id = target;
                    }
                }
                None => warn!("Unresolved type reference '{}' on node {}", type_name, id),
            }
        }
    }
}

/// Parse ReClass XML into a new tree.
///
/// Each `<Class>` becomes a root struct at offset 0, in document order.
/// Member offsets come from an explicit `Offset` attribute, otherwise from
/// the running sum of the preceding `Size`s. Fails with
/// [`Error::NoClasses`] when the document holds no class.
pub fn import_from_str(xml: &str, options: &ImportOptions) -> Result<NodeTree> {
    let classes = parse_document(xml)?;
    if classes.is_empty() {
        return Err(Error::NoClasses);
    }

    let mut builder = Builder {
        tree: NodeTree::new(),
        options,
        class_names: classes.iter().map(|c| c.name.clone()).collect(),
        pending: Vec::new(),
    };
    let mut types: HashMap<String, u64> = HashMap::new();

    for class in &classes {
        let index = builder.tree.add_node(Node::root_struct(class.name.clone()));
        let class_id = builder.tree.nodes()[index].id;
        if types.insert(class.name.clone(), class_id).is_some() {
            warn!("Duplicate class '{}', references bind to the last one", class.name);
        }

        let mut cursor = 0u32;
        for raw in &class.members {
            let offset = raw.offset.unwrap_or(cursor);
            let covered = builder.add_member(class_id, offset, raw)?;
            let advance = if raw.size > 0 { raw.size } else { covered };
            cursor = offset.saturating_add(advance);
        }
        debug!("Imported class '{}' ({} members)", class.name, class.members.len());
    }

    builder.resolve(&types);
    Ok(builder.tree)
}

/// Parse a ReClass XML file into a new tree
pub fn import_from_file(path: impl AsRef<Path>, options: &ImportOptions) -> Result<NodeTree> {
    let path = path.as_ref();
    let xml = fs::read_to_string(path)?;
    let tree = import_from_str(&xml, options)?;
    info!(
        "Imported {} classes ({} nodes) from {}",
        tree.root_structs().len(),
        tree.len(),
        path.display()
    );
    Ok(tree)
}
