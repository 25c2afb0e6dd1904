//! Node arena and layout engine

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::tree::kind::NodeKind;
use crate::tree::node::Node;

/// Arena of nodes for one document
///
/// Nodes are addressed by position (`index`) for fast access and by `id`
/// across mutations. Indices shift when nodes are removed; ids never do.
#[derive(Debug, Clone)]
pub struct NodeTree {
    nodes: Vec<Node>,
    /// Address that offset 0 of the tree maps to
    pub base_address: u64,
    next_id: u64,
    /// Ids handed out by `reserve_id` and not yet used by a node
    reserved: HashSet<u64>,
    id_index: HashMap<u64, usize>,
}

impl Default for NodeTree {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            base_address: 0,
            next_id: 1,
            reserved: HashSet::new(),
            id_index: HashMap::new(),
        }
    }
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base_address: u64) -> Self {
        Self {
            base_address,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn get_by_id(&self, id: u64) -> Option<&Node> {
        self.index_of_id(id).map(|i| &self.nodes[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Issue a fresh id without adding a node.
    ///
    /// The id may later be supplied on a node passed to
    /// [`add_node`](Self::add_node).
    pub fn reserve_id(&mut self) -> u64 {
        let id = self.fresh_id();
        self.reserved.insert(id);
        id
    }

    fn fresh_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Id the next call to [`reserve_id`](Self::reserve_id) will return
    pub fn peek_next_id(&self) -> u64 {
        self.next_id
    }

    /// Append a node and return its index.
    ///
    /// A supplied id is kept when it is above every id issued so far, or was
    /// reserved and is still unused. Otherwise (no id, a taken id, or an id
    /// retired by a removal) the node receives a fresh one.
    pub fn add_node(&mut self, mut node: Node) -> usize {
        let supplied = node.id;
        let usable = supplied != 0
            && !self.id_index.contains_key(&supplied)
            && (supplied >= self.next_id || self.reserved.contains(&supplied));
        if usable {
            self.reserved.remove(&supplied);
            if supplied >= self.next_id {
                self.next_id = supplied + 1;
            }
        } else {
            if supplied != 0 {
                warn!("Node id {} is taken or retired, assigning a fresh id", supplied);
            }
            node.id = self.fresh_id();
        }

        let index = self.nodes.len();
        self.id_index.insert(node.id, index);
        self.nodes.push(node);
        index
    }

    /// Insert a node at an arena position, keeping its id.
    ///
    /// Used to replay removals in reverse so that arena order survives undo.
    pub(crate) fn insert_at(&mut self, index: usize, node: Node) -> usize {
        let index = index.min(self.nodes.len());
        if node.id >= self.next_id {
            self.next_id = node.id + 1;
        }
        self.nodes.insert(index, node);
        self.rebuild_index();
        index
    }

    /// Put back nodes removed together, `(index, node)` in ascending index order
    pub(crate) fn insert_many(&mut self, entries: &[(usize, Node)]) {
        for (index, node) in entries {
            if node.id >= self.next_id {
                self.next_id = node.id + 1;
            }
            let index = (*index).min(self.nodes.len());
            self.nodes.insert(index, node.clone());
        }
        self.rebuild_index();
    }

    /// Remove every node at the given positions in one pass
    pub(crate) fn remove_many(&mut self, indices: &BTreeSet<usize>) -> usize {
        if indices.is_empty() {
            return 0;
        }
        let before = self.nodes.len();
        let mut position = 0usize;
        self.nodes.retain(|_| {
            let keep = !indices.contains(&position);
            position += 1;
            keep
        });
        self.rebuild_index();
        before - self.nodes.len()
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Option<Node> {
        if index >= self.nodes.len() {
            return None;
        }
        let node = self.nodes.remove(index);
        self.rebuild_index();
        Some(node)
    }

    pub(crate) fn node_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.nodes.get_mut(index)
    }

    pub(crate) fn node_mut_by_id(&mut self, id: u64) -> Option<&mut Node> {
        let index = self.index_of_id(id)?;
        self.nodes.get_mut(index)
    }

    fn rebuild_index(&mut self) {
        self.id_index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id, i))
            .collect();
    }

    /// Resolve an id to its current arena position
    pub fn index_of_id(&self, id: u64) -> Option<usize> {
        if id == 0 {
            return None;
        }
        self.id_index.get(&id).copied()
    }

    /// Indices of all nodes under `parent_id`, ordered by offset.
    ///
    /// Ties keep arena order.
    pub fn children_of(&self, parent_id: u64) -> Vec<usize> {
        let mut children: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent_id == parent_id)
            .map(|(i, _)| i)
            .collect();
        children.sort_by_key(|&i| self.nodes[i].offset);
        children
    }

    /// Root-level struct nodes, ordered by offset
    pub fn root_structs(&self) -> Vec<usize> {
        self.children_of(0)
            .into_iter()
            .filter(|&i| self.nodes[i].kind == NodeKind::Struct)
            .collect()
    }

    /// Parent -> ordered children map for batch traversals
    pub fn layout(&self) -> Layout<'_> {
        Layout::new(self)
    }

    /// Byte offset of a node relative to the tree start (array elements at 0)
    pub fn compute_offset(&self, index: usize) -> u64 {
        self.compute_offset_with(index, |_| 0)
    }

    /// Byte offset of a node relative to the tree start.
    ///
    /// `element_of` returns the element position to use for each Array
    /// ancestor, keyed by the array's id. A missing ancestor contributes
    /// nothing; the walk stops there.
    pub fn compute_offset_with<F>(&self, index: usize, element_of: F) -> u64
    where
        F: Fn(u64) -> u32,
    {
        let Some(mut node) = self.nodes.get(index) else {
            return 0;
        };

        let mut total = u64::from(node.offset);
        let mut steps = 0usize;
        while node.parent_id != 0 {
            let Some(parent_index) = self.index_of_id(node.parent_id) else {
                debug!(
                    "Node {} has dangling parent {}, treating as root-relative",
                    node.id, node.parent_id
                );
                break;
            };
            let parent = &self.nodes[parent_index];
            if parent.kind == NodeKind::Array {
                let element = u64::from(element_of(parent.id));
                if element > 0 {
                    total += element * u64::from(self.element_size(parent_index));
                }
            }
            total += u64::from(parent.offset);
            node = parent;

            steps += 1;
            if steps > self.nodes.len() {
                warn!("Parent chain of node index {} does not terminate", index);
                break;
            }
        }
        total
    }

    /// Address of a node: `base_address + compute_offset(index)`
    pub fn absolute_address(&self, index: usize) -> u64 {
        self.base_address.wrapping_add(self.compute_offset(index))
    }

    /// Byte size of a node
    pub fn byte_size(&self, index: usize) -> u32 {
        self.layout().byte_size(index)
    }

    /// Size of one element of an Array node
    pub fn element_size(&self, index: usize) -> u32 {
        self.layout().element_size(index)
    }

    /// Type name of the node `ref_id` points at, if it resolves to a non-empty name
    pub fn resolve_type_name(&self, ref_id: u64) -> Option<&str> {
        let node = self.get_by_id(ref_id)?;
        let name = node.type_name();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    /// First root struct whose type name equals `name`
    pub fn find_type(&self, name: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.is_root() && n.kind == NodeKind::Struct && n.type_name() == name)
    }

    /// `index` and all of its descendants, in ascending arena order
    pub fn subtree(&self, index: usize) -> Vec<usize> {
        let Some(root) = self.nodes.get(index) else {
            return Vec::new();
        };

        let mut children: HashMap<u64, Vec<usize>> = HashMap::new();
        for (i, n) in self.nodes.iter().enumerate() {
            children.entry(n.parent_id).or_default().push(i);
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut stack = vec![index];
        seen.insert(root.id);
        while let Some(i) = stack.pop() {
            out.push(i);
            if let Some(kids) = children.get(&self.nodes[i].id) {
                for &k in kids {
                    if seen.insert(self.nodes[k].id) {
                        stack.push(k);
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }

    /// Whether `ancestor_id` appears on the parent chain of `id`
    pub fn is_ancestor(&self, ancestor_id: u64, id: u64) -> bool {
        let mut current = self.get_by_id(id).map(|n| n.parent_id).unwrap_or(0);
        let mut steps = 0usize;
        while current != 0 && steps <= self.nodes.len() {
            if current == ancestor_id {
                return true;
            }
            current = self.get_by_id(current).map(|n| n.parent_id).unwrap_or(0);
            steps += 1;
        }
        false
    }

    /// `base`, or `base` followed by the smallest counter not already used
    /// as a struct type name
    pub fn unique_type_name(&self, base: &str) -> String {
        let existing: HashSet<&str> = self
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Struct && !n.struct_type_name.is_empty())
            .map(|n| n.struct_type_name.as_str())
            .collect();

        if !existing.contains(base) {
            return base.to_string();
        }
        let mut counter = 1u32;
        loop {
            let candidate = format!("{}{}", base, counter);
            if !existing.contains(candidate.as_str()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Read-only layout view over a tree with a prebuilt child map
pub struct Layout<'a> {
    tree: &'a NodeTree,
    children: HashMap<u64, Vec<usize>>,
}

impl<'a> Layout<'a> {
    fn new(tree: &'a NodeTree) -> Self {
        let mut children: HashMap<u64, Vec<usize>> = HashMap::new();
        for (i, n) in tree.nodes.iter().enumerate() {
            children.entry(n.parent_id).or_default().push(i);
        }
        for list in children.values_mut() {
            list.sort_by_key(|&i| tree.nodes[i].offset);
        }
        Self { tree, children }
    }

    pub fn tree(&self) -> &'a NodeTree {
        self.tree
    }

    /// Children of `parent_id` ordered by offset
    pub fn children_of(&self, parent_id: u64) -> &[usize] {
        self.children
            .get(&parent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn byte_size(&self, index: usize) -> u32 {
        let mut visiting = HashSet::new();
        self.size_guarded(index, &mut visiting)
    }

    pub fn element_size(&self, index: usize) -> u32 {
        let mut visiting = HashSet::new();
        self.element_size_guarded(index, &mut visiting)
    }

    /// Size of a struct's direct children: `max(offset + size)`, 0 if empty
    pub fn extent(&self, parent_id: u64) -> u32 {
        let mut visiting = HashSet::new();
        visiting.insert(parent_id);
        self.extent_guarded(parent_id, &mut visiting)
    }

    fn extent_guarded(&self, parent_id: u64, visiting: &mut HashSet<u64>) -> u32 {
        self.children_of(parent_id)
            .iter()
            .map(|&c| {
                let child = &self.tree.nodes[c];
                child
                    .offset
                    .saturating_add(self.size_guarded(c, visiting))
            })
            .max()
            .unwrap_or(0)
    }

    fn size_guarded(&self, index: usize, visiting: &mut HashSet<u64>) -> u32 {
        let Some(node) = self.tree.nodes.get(index) else {
            return 0;
        };

        match node.kind {
            NodeKind::Struct => {
                if !visiting.insert(node.id) {
                    debug!("Struct {} embeds itself, sizing the inner instance as 0", node.id);
                    return 0;
                }
                let size = if self.children_of(node.id).is_empty() {
                    // Unexpanded instance: take the size of the referenced type
                    match self.tree.index_of_id(node.ref_id) {
                        Some(ri) if ri != index => self.size_guarded(ri, visiting),
                        _ => node.size_override.unwrap_or(0),
                    }
                } else {
                    self.extent_guarded(node.id, visiting)
                };
                visiting.remove(&node.id);
                size
            }
            NodeKind::Array => {
                if !visiting.insert(node.id) {
                    return 0;
                }
                let element = self.element_size_guarded(index, visiting);
                visiting.remove(&node.id);
                node.array_len.saturating_mul(element)
            }
            _ => node.own_size(),
        }
    }

    fn element_size_guarded(&self, index: usize, visiting: &mut HashSet<u64>) -> u32 {
        let Some(node) = self.tree.nodes.get(index) else {
            return 0;
        };
        if node.kind != NodeKind::Array {
            return self.size_guarded(index, visiting);
        }
        if node.element_kind != NodeKind::Struct {
            return node.element_kind.size();
        }

        if let Some(ri) = self.tree.index_of_id(node.ref_id) {
            if ri != index {
                return self.size_guarded(ri, visiting);
            }
        }
        // Inline element template
        self.extent_guarded(node.id, visiting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player_tree() -> (NodeTree, u64) {
        let mut tree = NodeTree::new();
        let root = tree.add_node(Node::root_struct("Player"));
        let rid = tree.nodes()[root].id;
        tree.add_node(Node::new(NodeKind::Int32).with_name("health").with_parent(rid).at(0));
        tree.add_node(Node::new(NodeKind::Float).with_name("speed").with_parent(rid).at(4));
        tree.add_node(Node::new(NodeKind::UInt64).with_name("id").with_parent(rid).at(8));
        (tree, rid)
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut tree = NodeTree::new();
        let a = tree.add_node(Node::new(NodeKind::Int8));
        let b = tree.add_node(Node::new(NodeKind::Int8));
        assert_eq!(tree.nodes()[a].id, 1);
        assert_eq!(tree.nodes()[b].id, 2);

        tree.remove_at(b);
        let c = tree.add_node(Node::new(NodeKind::Int8));
        assert_eq!(tree.nodes()[c].id, 3);
    }

    #[test]
    fn test_supplied_ids_are_kept_and_duplicates_replaced() {
        let mut tree = NodeTree::new();
        let a = tree.add_node(Node::new(NodeKind::Int8).with_id(10));
        assert_eq!(tree.nodes()[a].id, 10);
        assert_eq!(tree.reserve_id(), 11);

        let b = tree.add_node(Node::new(NodeKind::Int8).with_id(10));
        assert_eq!(tree.nodes()[b].id, 12);
        assert_eq!(tree.index_of_id(10), Some(a));
        assert_eq!(tree.index_of_id(12), Some(b));
    }

    #[test]
    fn test_removed_ids_are_not_reissued() {
        let mut tree = NodeTree::new();
        tree.add_node(Node::new(NodeKind::Int8));
        let b = tree.add_node(Node::new(NodeKind::Int8));
        assert_eq!(tree.nodes()[b].id, 2);
        tree.remove_at(b);

        let again = tree.add_node(Node::new(NodeKind::Int8).with_id(2));
        assert_eq!(tree.nodes()[again].id, 3);
        let ids: Vec<u64> = tree.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 3]);

        // Reserved ids are accepted once
        let reserved = tree.reserve_id();
        let r = tree.add_node(Node::new(NodeKind::Int8).with_id(reserved));
        assert_eq!(tree.nodes()[r].id, reserved);
        tree.remove_at(r);
        let r2 = tree.add_node(Node::new(NodeKind::Int8).with_id(reserved));
        assert_ne!(tree.nodes()[r2].id, reserved);
    }

    #[test]
    fn test_bulk_remove_and_restore() {
        let (mut tree, _) = player_tree();
        let before = tree.nodes().to_vec();
        let indices: BTreeSet<usize> = [1, 3].into_iter().collect();
        let taken: Vec<(usize, Node)> = indices.iter().map(|&i| (i, tree.nodes()[i].clone())).collect();

        assert_eq!(tree.remove_many(&indices), 2);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.index_of_id(taken[0].1.id), None);
        assert_eq!(tree.get_by_id(3).unwrap().name, "speed");
        assert_eq!(tree.index_of_id(3), Some(1));

        tree.insert_many(&taken);
        assert_eq!(tree.nodes(), &before[..]);
        assert_eq!(tree.index_of_id(4), Some(3));
        assert_eq!(tree.remove_many(&BTreeSet::new()), 0);
    }

    #[test]
    fn test_index_survives_removal() {
        let (mut tree, rid) = player_tree();
        let speed = tree.index_of_id(3).unwrap();
        tree.remove_at(speed);
        assert_eq!(tree.index_of_id(3), None);
        assert_eq!(tree.get_by_id(4).unwrap().name, "id");
        assert_eq!(tree.children_of(rid).len(), 2);
    }

    #[test]
    fn test_children_sorted_by_offset_then_insertion() {
        let mut tree = NodeTree::new();
        let root = tree.add_node(Node::root_struct("S"));
        let rid = tree.nodes()[root].id;
        let late = tree.add_node(Node::new(NodeKind::Int32).with_parent(rid).at(8));
        let tie_a = tree.add_node(Node::new(NodeKind::Int8).with_parent(rid).at(0));
        let tie_b = tree.add_node(Node::new(NodeKind::Int8).with_parent(rid).at(0));
        assert_eq!(tree.children_of(rid), vec![tie_a, tie_b, late]);
    }

    #[test]
    fn test_struct_size_is_max_extent() {
        let (tree, _) = player_tree();
        assert_eq!(tree.byte_size(0), 16);

        let mut empty = NodeTree::new();
        let i = empty.add_node(Node::root_struct("Empty"));
        assert_eq!(empty.byte_size(i), 0);
    }

    #[test]
    fn test_nested_offset() {
        let mut tree = NodeTree::with_base(0x1000);
        let root = tree.add_node(Node::root_struct("Outer"));
        let rid = tree.nodes()[root].id;
        let inner = tree.add_node(
            Node::new(NodeKind::Struct)
                .with_name("inner")
                .with_type_name("Inner")
                .with_parent(rid)
                .at(0x10),
        );
        let iid = tree.nodes()[inner].id;
        let field = tree.add_node(Node::new(NodeKind::UInt32).with_parent(iid).at(0x4));

        assert_eq!(tree.compute_offset(field), 0x14);
        assert_eq!(tree.absolute_address(field), 0x1014);
        assert_eq!(tree.byte_size(root), 0x18);
    }

    #[test]
    fn test_array_element_offset() {
        let mut tree = NodeTree::new();
        let root = tree.add_node(Node::root_struct("Table"));
        let rid = tree.nodes()[root].id;
        let arr = tree.add_node(
            Node::new(NodeKind::Array)
                .with_array(NodeKind::Struct, 4)
                .with_parent(rid)
                .at(8),
        );
        let aid = tree.nodes()[arr].id;
        tree.add_node(Node::new(NodeKind::UInt32).with_parent(aid).at(0));
        let y = tree.add_node(Node::new(NodeKind::UInt32).with_parent(aid).at(4));

        assert_eq!(tree.element_size(arr), 8);
        assert_eq!(tree.byte_size(arr), 32);
        assert_eq!(tree.compute_offset(y), 12);
        assert_eq!(tree.compute_offset_with(y, |id| if id == aid { 2 } else { 0 }), 28);
    }

    #[test]
    fn test_dangling_parent_is_root_relative() {
        let mut tree = NodeTree::new();
        let orphan = tree.add_node(Node::new(NodeKind::Int32).with_parent(999).at(0x20));
        assert_eq!(tree.compute_offset(orphan), 0x20);
        assert_eq!(tree.byte_size(orphan), 4);
    }

    #[test]
    fn test_self_embedding_terminates() {
        let mut tree = NodeTree::new();
        let root = tree.add_node(Node::root_struct("Node"));
        let rid = tree.nodes()[root].id;
        tree.add_node(Node::new(NodeKind::Pointer64).with_parent(rid).with_ref(rid));
        let embed = tree.add_node(
            Node::new(NodeKind::Struct)
                .with_type_name("Node")
                .with_parent(rid)
                .at(8)
                .with_ref(rid),
        );
        // The embedded instance refers back to the struct being sized
        assert_eq!(tree.byte_size(embed), 8);
        assert_eq!(tree.byte_size(root), 8);
    }

    #[test]
    fn test_embedded_instance_takes_referenced_size() {
        let (mut tree, pid) = player_tree();
        let holder = tree.add_node(Node::root_struct("Holder").at(0x100));
        let hid = tree.nodes()[holder].id;
        let embed = tree.add_node(
            Node::new(NodeKind::Struct)
                .with_type_name("Player")
                .with_parent(hid)
                .at(8)
                .with_ref(pid),
        );
        assert_eq!(tree.byte_size(embed), 16);
        assert_eq!(tree.byte_size(holder), 24);
        assert_eq!(tree.root_structs(), vec![0, holder]);
    }

    #[test]
    fn test_subtree_and_ancestry() {
        let mut tree = NodeTree::new();
        let root = tree.add_node(Node::root_struct("A"));
        let rid = tree.nodes()[root].id;
        let inner = tree.add_node(Node::new(NodeKind::Struct).with_parent(rid));
        let iid = tree.nodes()[inner].id;
        let leaf = tree.add_node(Node::new(NodeKind::Int8).with_parent(iid));
        let lid = tree.nodes()[leaf].id;
        tree.add_node(Node::root_struct("B"));

        assert_eq!(tree.subtree(root), vec![root, inner, leaf]);
        assert!(tree.is_ancestor(rid, lid));
        assert!(!tree.is_ancestor(lid, rid));
    }

    #[test]
    fn test_unique_type_name() {
        let mut tree = NodeTree::new();
        assert_eq!(tree.unique_type_name("NewClass"), "NewClass");
        tree.add_node(Node::root_struct("NewClass"));
        assert_eq!(tree.unique_type_name("NewClass"), "NewClass1");
        tree.add_node(Node::root_struct("NewClass1"));
        assert_eq!(tree.unique_type_name("NewClass"), "NewClass2");
    }

    #[test]
    fn test_resolve_type_name() {
        let mut tree = NodeTree::new();
        let a = tree.add_node(Node::new(NodeKind::Struct).with_name("inst").with_type_name("Thing"));
        let b = tree.add_node(Node::new(NodeKind::Struct).with_name("bare"));
        let aid = tree.nodes()[a].id;
        let bid = tree.nodes()[b].id;
        assert_eq!(tree.resolve_type_name(aid), Some("Thing"));
        assert_eq!(tree.resolve_type_name(bid), Some("bare"));
        assert_eq!(tree.resolve_type_name(999), None);
        assert_eq!(tree.resolve_type_name(0), None);
    }
}
