//! Structural checks over a node tree

use std::collections::HashMap;
use std::fmt;

use crate::tree::arena::NodeTree;
use crate::tree::kind::NodeKind;

/// One structural problem found by [`NodeTree::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeIssue {
    /// `parent_id` names a node that does not exist
    DanglingParent { id: u64, parent_id: u64 },
    /// Parent exists but cannot own children
    NonContainerParent {
        id: u64,
        parent_id: u64,
        parent_kind: NodeKind,
    },
    /// Following `parent_id` from this node loops
    ParentCycle { id: u64 },
    /// `ref_id` names a node that does not exist
    DanglingRef { id: u64, ref_id: u64 },
    /// Sibling `second` starts inside `first`
    Overlap {
        parent_id: u64,
        first: u64,
        second: u64,
    },
}

impl TreeIssue {
    /// Whether the issue breaks layout invariants, as opposed to a tolerated condition
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            TreeIssue::NonContainerParent { .. } | TreeIssue::ParentCycle { .. }
        )
    }
}

impl fmt::Display for TreeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeIssue::DanglingParent { id, parent_id } => {
                write!(f, "node {} has missing parent {}", id, parent_id)
            }
            TreeIssue::NonContainerParent {
                id,
                parent_id,
                parent_kind,
            } => write!(
                f,
                "node {} is parented to {} which is a {}",
                id, parent_id, parent_kind
            ),
            TreeIssue::ParentCycle { id } => write!(f, "parent chain of node {} loops", id),
            TreeIssue::DanglingRef { id, ref_id } => {
                write!(f, "node {} refers to missing node {}", id, ref_id)
            }
            TreeIssue::Overlap {
                parent_id,
                first,
                second,
            } => write!(
                f,
                "node {} overlaps node {} in parent {}",
                second, first, parent_id
            ),
        }
    }
}

impl NodeTree {
    /// Report dangling links, bad parents, parent cycles and overlapping siblings
    pub fn validate(&self) -> Vec<TreeIssue> {
        let mut issues = Vec::new();

        for node in self.nodes() {
            if node.parent_id != 0 {
                match self.get_by_id(node.parent_id) {
                    None => issues.push(TreeIssue::DanglingParent {
                        id: node.id,
                        parent_id: node.parent_id,
                    }),
                    Some(parent) if !parent.kind.is_container() => {
                        issues.push(TreeIssue::NonContainerParent {
                            id: node.id,
                            parent_id: node.parent_id,
                            parent_kind: parent.kind,
                        })
                    }
                    Some(_) => {}
                }
            }

            if node.ref_id != 0 && self.get_by_id(node.ref_id).is_none() {
                issues.push(TreeIssue::DanglingRef {
                    id: node.id,
                    ref_id: node.ref_id,
                });
            }
        }

        issues.extend(self.parent_cycles());
        issues.extend(self.overlaps());
        issues
    }

    fn parent_cycles(&self) -> Vec<TreeIssue> {
        // 0 = unvisited, 1 = on current path, 2 = done
        let mut state: HashMap<u64, u8> = HashMap::new();
        let mut issues = Vec::new();

        for node in self.nodes() {
            let mut path = Vec::new();
            let mut current = node.id;
            loop {
                match state.get(&current).copied().unwrap_or(0) {
                    2 => break,
                    1 => {
                        issues.push(TreeIssue::ParentCycle { id: current });
                        break;
                    }
                    _ => {}
                }
                state.insert(current, 1);
                path.push(current);
                match self.get_by_id(current) {
                    Some(n) if n.parent_id != 0 => current = n.parent_id,
                    _ => break,
                }
            }
            for id in path {
                state.insert(id, 2);
            }
        }
        issues
    }

    fn overlaps(&self) -> Vec<TreeIssue> {
        let layout = self.layout();
        let mut issues = Vec::new();

        for parent in self.nodes().iter().filter(|n| n.kind == NodeKind::Struct) {
            let mut end: Option<(u64, u64)> = None;
            for &c in layout.children_of(parent.id) {
                let child = &self.nodes()[c];
                let start = u64::from(child.offset);
                if let Some((prev_id, prev_end)) = end {
                    if start < prev_end {
                        issues.push(TreeIssue::Overlap {
                            parent_id: parent.id,
                            first: prev_id,
                            second: child.id,
                        });
                    }
                }
                let child_end = start + u64::from(layout.byte_size(c));
                if end.map_or(true, |(_, e)| child_end >= e) {
                    end = Some((child.id, child_end));
                }
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    #[test]
    fn test_clean_tree_has_no_issues() {
        let mut tree = NodeTree::new();
        let root = tree.add_node(Node::root_struct("A"));
        let rid = tree.nodes()[root].id;
        tree.add_node(Node::new(NodeKind::Int32).with_parent(rid).at(0));
        tree.add_node(Node::new(NodeKind::Pointer64).with_parent(rid).at(8).with_ref(rid));
        assert!(tree.validate().is_empty());
    }

    #[test]
    fn test_reports_dangling_links() {
        let mut tree = NodeTree::new();
        let root = tree.add_node(Node::root_struct("A"));
        let rid = tree.nodes()[root].id;
        let orphan = tree.add_node(Node::new(NodeKind::Int32).with_parent(77));
        let ptr = tree.add_node(Node::new(NodeKind::Pointer64).with_parent(rid).with_ref(88));

        let issues = tree.validate();
        assert!(issues.contains(&TreeIssue::DanglingParent {
            id: tree.nodes()[orphan].id,
            parent_id: 77
        }));
        assert!(issues.contains(&TreeIssue::DanglingRef {
            id: tree.nodes()[ptr].id,
            ref_id: 88
        }));
        assert!(issues.iter().all(|i| !i.is_error()));
    }

    #[test]
    fn test_reports_non_container_parent() {
        let mut tree = NodeTree::new();
        let leaf = tree.add_node(Node::new(NodeKind::Int32));
        let lid = tree.nodes()[leaf].id;
        tree.add_node(Node::new(NodeKind::Int8).with_parent(lid));

        let issues = tree.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_error());
    }

    #[test]
    fn test_reports_parent_cycle() {
        let mut tree = NodeTree::new();
        tree.add_node(Node::new(NodeKind::Struct).with_id(1).with_parent(2));
        tree.add_node(Node::new(NodeKind::Struct).with_id(2).with_parent(1));

        let issues = tree.validate();
        assert_eq!(
            issues
                .iter()
                .filter(|i| matches!(i, TreeIssue::ParentCycle { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_reports_overlap() {
        let mut tree = NodeTree::new();
        let root = tree.add_node(Node::root_struct("A"));
        let rid = tree.nodes()[root].id;
        let wide = tree.add_node(Node::new(NodeKind::Hex64).with_parent(rid).at(0));
        let inner = tree.add_node(Node::new(NodeKind::Hex32).with_parent(rid).at(4));

        let issues = tree.validate();
        assert_eq!(
            issues,
            vec![TreeIssue::Overlap {
                parent_id: rid,
                first: tree.nodes()[wide].id,
                second: tree.nodes()[inner].id,
            }]
        );
        assert!(issues[0].to_string().contains("overlaps"));
    }
}
