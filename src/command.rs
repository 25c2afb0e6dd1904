//! Reversible tree mutations
//!
//! A [`Command`] describes what the caller wants. Applying it checks that
//! it makes sense against the current tree, performs it, and returns a
//! [`Change`] holding everything needed to revert it exactly. Commands that
//! cannot apply are rejected before anything is touched.

use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::tree::{Node, NodeKind, NodeTree, DEFAULT_STR_LEN};

/// A requested mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Add a node; a zero or taken id is replaced by a fresh one
    Insert(Node),
    /// Remove a node and everything under it
    Remove(u64),
    /// Remove several nodes and their subtrees as one step
    BatchRemove(Vec<u64>),
    Rename { id: u64, name: String },
    Retype { id: u64, kind: NodeKind },
    /// Write `bytes` at `offset` within the node's value
    SetValue { id: u64, offset: u32, bytes: Vec<u8> },
    ToggleCollapse(u64),
    /// Reparent and/or reposition a node
    Move { id: u64, parent_id: u64, offset: u32 },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Insert(node) => write!(f, "insert {} '{}'", node.kind, node.name),
            Command::Remove(id) => write!(f, "remove node {}", id),
            Command::BatchRemove(ids) => write!(f, "remove {} nodes", ids.len()),
            Command::Rename { id, name } => write!(f, "rename node {} to '{}'", id, name),
            Command::Retype { id, kind } => write!(f, "change node {} to {}", id, kind),
            Command::SetValue { id, offset, bytes } => write!(
                f,
                "write {} bytes to node {} at +{:#x}",
                bytes.len(),
                id,
                offset
            ),
            Command::ToggleCollapse(id) => write!(f, "toggle collapse of node {}", id),
            Command::Move {
                id,
                parent_id,
                offset,
            } => write!(f, "move node {} to {}+{:#x}", id, parent_id, offset),
        }
    }
}

/// An applied command with its captured prior state
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Insert {
        index: usize,
        node: Node,
    },
    /// Removed nodes with their arena positions, ascending
    Remove {
        removed: Vec<(usize, Node)>,
    },
    Rename {
        id: u64,
        old_name: String,
        old_type_name: String,
        new_name: String,
        new_type_name: String,
    },
    Retype {
        before: Node,
        after: Node,
    },
    SetValue {
        addr: u64,
        old: Vec<u8>,
        new: Vec<u8>,
    },
    ToggleCollapse {
        id: u64,
    },
    Move {
        id: u64,
        old_parent: u64,
        old_offset: u32,
        new_parent: u64,
        new_offset: u32,
    },
}

fn index_of(tree: &NodeTree, id: u64) -> Result<usize> {
    tree.index_of_id(id).ok_or(Error::NodeNotFound(id))
}

/// Parent must be 0 or an existing container
fn check_parent(tree: &NodeTree, parent_id: u64) -> Result<()> {
    if parent_id == 0 {
        return Ok(());
    }
    match tree.get_by_id(parent_id) {
        None => Err(Error::InvalidParent(format!("node {} does not exist", parent_id))),
        Some(parent) if !parent.kind.is_container() => Err(Error::InvalidParent(format!(
            "node {} is a {} and cannot own children",
            parent_id, parent.kind
        ))),
        Some(_) => Ok(()),
    }
}

impl Command {
    /// Perform the mutation and capture how to revert it
    pub fn apply(self, tree: &mut NodeTree, provider: &mut dyn Provider) -> Result<Change> {
        debug!("Applying: {}", self);
        match self {
            Command::Insert(node) => {
                check_parent(tree, node.parent_id)?;
                let index = tree.add_node(node);
                Ok(Change::Insert {
                    index,
                    node: tree.nodes()[index].clone(),
                })
            }
            Command::Remove(id) => remove(tree, &[id]),
            Command::BatchRemove(ids) => {
                if ids.is_empty() {
                    return Err(Error::Rejected("nothing to remove".to_string()));
                }
                remove(tree, &ids)
            }
            Command::Rename { id, name } => {
                let index = index_of(tree, id)?;
                let node = &tree.nodes()[index];
                if node.name == name {
                    return Err(Error::Rejected(format!("node {} is already named '{}'", id, name)));
                }
                let old_name = node.name.clone();
                let old_type_name = node.struct_type_name.clone();
                // A root struct named after its type keeps the two in step
                let names_type = node.struct_type_name.is_empty() || node.struct_type_name == node.name;
                let new_type_name = if node.is_root() && node.kind == NodeKind::Struct && names_type {
                    name.clone()
                } else {
                    old_type_name.clone()
                };
                let change = Change::Rename {
                    id,
                    old_name,
                    old_type_name,
                    new_name: name,
                    new_type_name,
                };
                change.apply(tree, provider)?;
                Ok(change)
            }
            Command::Retype { id, kind } => {
                let index = index_of(tree, id)?;
                let before = tree.nodes()[index].clone();
                if before.kind == kind {
                    return Err(Error::Rejected(format!("node {} is already {}", id, kind)));
                }
                if !kind.is_container() && !tree.children_of(id).is_empty() {
                    return Err(Error::Rejected(format!(
                        "node {} has children and cannot become {}",
                        id, kind
                    )));
                }

                let mut after = before.clone();
                after.kind = kind;
                if kind.is_string() && after.str_len == 0 {
                    after.str_len = DEFAULT_STR_LEN;
                }
                if matches!(kind, NodeKind::Array | NodeKind::Padding) && after.array_len == 0 {
                    after.array_len = 1;
                }
                let change = Change::Retype { before, after };
                change.apply(tree, provider)?;
                Ok(change)
            }
            Command::SetValue { id, offset, bytes } => {
                let index = index_of(tree, id)?;
                if bytes.is_empty() {
                    return Err(Error::Rejected("no bytes to write".to_string()));
                }
                let size = u64::from(tree.byte_size(index));
                if u64::from(offset) + bytes.len() as u64 > size {
                    return Err(Error::Rejected(format!(
                        "{} bytes at +{:#x} do not fit node {} ({} bytes)",
                        bytes.len(),
                        offset,
                        id,
                        size
                    )));
                }
                if !provider.is_writable() {
                    return Err(Error::Rejected(format!(
                        "source '{}' is not writable",
                        provider.name()
                    )));
                }

                let addr = tree.absolute_address(index).wrapping_add(u64::from(offset));
                let mut old = vec![0u8; bytes.len()];
                provider
                    .read(addr, &mut old)
                    .map_err(|e| Error::Rejected(format!("cannot read previous value: {}", e)))?;

                let change = Change::SetValue {
                    addr,
                    old,
                    new: bytes,
                };
                change.apply(tree, provider)?;
                Ok(change)
            }
            Command::ToggleCollapse(id) => {
                let index = index_of(tree, id)?;
                if !tree.nodes()[index].kind.is_container() {
                    return Err(Error::Rejected(format!("node {} cannot collapse", id)));
                }
                let change = Change::ToggleCollapse { id };
                change.apply(tree, provider)?;
                Ok(change)
            }
            Command::Move {
                id,
                parent_id,
                offset,
            } => {
                let index = index_of(tree, id)?;
                check_parent(tree, parent_id)?;
                if parent_id == id || tree.is_ancestor(id, parent_id) {
                    return Err(Error::InvalidParent(format!(
                        "node {} cannot move under its own subtree",
                        id
                    )));
                }
                let node = &tree.nodes()[index];
                if node.parent_id == parent_id && node.offset == offset {
                    return Err(Error::Rejected(format!("node {} is already there", id)));
                }
                let change = Change::Move {
                    id,
                    old_parent: node.parent_id,
                    old_offset: node.offset,
                    new_parent: parent_id,
                    new_offset: offset,
                };
                change.apply(tree, provider)?;
                Ok(change)
            }
        }
    }
}

fn remove(tree: &mut NodeTree, ids: &[u64]) -> Result<Change> {
    let mut indices = BTreeSet::new();
    for &id in ids {
        let index = index_of(tree, id)?;
        indices.extend(tree.subtree(index));
    }

    let removed: Vec<(usize, Node)> = indices
        .iter()
        .map(|&i| (i, tree.nodes()[i].clone()))
        .collect();
    tree.remove_many(&indices);
    Ok(Change::Remove { removed })
}

impl Change {
    /// Perform the change forward (redo)
    pub fn apply(&self, tree: &mut NodeTree, provider: &mut dyn Provider) -> Result<()> {
        match self {
            Change::Insert { index, node } => {
                if tree.index_of_id(node.id).is_some() {
                    return Err(Error::Rejected(format!("node {} already exists", node.id)));
                }
                tree.insert_at(*index, node.clone());
            }
            Change::Remove { removed } => {
                let mut indices = BTreeSet::new();
                for (_, node) in removed {
                    indices.insert(index_of(tree, node.id)?);
                }
                tree.remove_many(&indices);
            }
            Change::Rename {
                id,
                new_name,
                new_type_name,
                ..
            } => {
                let node = tree.node_mut_by_id(*id).ok_or(Error::NodeNotFound(*id))?;
                node.name = new_name.clone();
                node.struct_type_name = new_type_name.clone();
            }
            Change::Retype { after, .. } => replace(tree, after)?,
            Change::SetValue { addr, new, .. } => provider.write_bytes(*addr, new)?,
            Change::ToggleCollapse { id } => toggle(tree, *id)?,
            Change::Move {
                id,
                new_parent,
                new_offset,
                ..
            } => place(tree, *id, *new_parent, *new_offset)?,
        }
        Ok(())
    }

    /// Restore the state from before the change (undo)
    pub fn invert(&self, tree: &mut NodeTree, provider: &mut dyn Provider) -> Result<()> {
        match self {
            Change::Insert { node, .. } => {
                let index = index_of(tree, node.id)?;
                tree.remove_at(index);
            }
            Change::Remove { removed } => {
                if let Some((_, node)) = removed.iter().find(|(_, n)| tree.index_of_id(n.id).is_some()) {
                    return Err(Error::Rejected(format!("node {} already exists", node.id)));
                }
                tree.insert_many(removed);
            }
            Change::Rename {
                id,
                old_name,
                old_type_name,
                ..
            } => {
                let node = tree.node_mut_by_id(*id).ok_or(Error::NodeNotFound(*id))?;
                node.name = old_name.clone();
                node.struct_type_name = old_type_name.clone();
            }
            Change::Retype { before, .. } => replace(tree, before)?,
            Change::SetValue { addr, old, .. } => provider.write_bytes(*addr, old)?,
            Change::ToggleCollapse { id } => toggle(tree, *id)?,
            Change::Move {
                id,
                old_parent,
                old_offset,
                ..
            } => place(tree, *id, *old_parent, *old_offset)?,
        }
        Ok(())
    }

    /// Short label for logs and menus
    pub fn label(&self) -> &'static str {
        match self {
            Change::Insert { .. } => "Insert",
            Change::Remove { removed } if removed.len() > 1 => "Remove nodes",
            Change::Remove { .. } => "Remove",
            Change::Rename { .. } => "Rename",
            Change::Retype { .. } => "Change type",
            Change::SetValue { .. } => "Edit value",
            Change::ToggleCollapse { .. } => "Toggle collapse",
            Change::Move { .. } => "Move",
        }
    }
}

fn replace(tree: &mut NodeTree, state: &Node) -> Result<()> {
    let node = tree
        .node_mut_by_id(state.id)
        .ok_or(Error::NodeNotFound(state.id))?;
    *node = state.clone();
    Ok(())
}

fn toggle(tree: &mut NodeTree, id: u64) -> Result<()> {
    let node = tree.node_mut_by_id(id).ok_or(Error::NodeNotFound(id))?;
    node.collapsed = !node.collapsed;
    Ok(())
}

fn place(tree: &mut NodeTree, id: u64, parent_id: u64, offset: u32) -> Result<()> {
    let node = tree.node_mut_by_id(id).ok_or(Error::NodeNotFound(id))?;
    node.parent_id = parent_id;
    node.offset = offset;
    Ok(())
}
