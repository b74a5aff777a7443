//! Node arena shared by the business-side page document and the UI-side live
//! document. Both sides run the same command semantics, so a flushed batch
//! leaves the two trees identical.

use crate::command::DomCommand;
use crate::protocol::NodeId;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

pub const TEXT_TAG: &str = "#text";

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub tag_name: String,
    pub attributes: BTreeMap<String, Value>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub text: Option<String>,
}

impl Node {
    fn new(id: NodeId, tag_name: String) -> Self {
        Self {
            id,
            tag_name,
            attributes: BTreeMap::new(),
            children: Vec::new(),
            parent: None,
            text: None,
        }
    }

    pub fn is_text(&self) -> bool {
        self.tag_name == TEXT_TAG
    }
}

/// Why a command left the tree untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    UnknownNode(NodeId),
    NotAChild { parent: NodeId, child: NodeId },
    WouldCycle { parent: NodeId, child: NodeId },
}

impl std::fmt::Display for Skip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Skip::UnknownNode(id) => write!(f, "unknown node {id}"),
            Skip::NotAChild { parent, child } => {
                write!(f, "node {child} is not a child of {parent}")
            }
            Skip::WouldCycle { parent, child } => {
                write!(f, "inserting {child} under {parent} would create a cycle")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|node| node.parent.is_none())
            .map(|node| node.id)
            .collect();
        roots.sort_unstable();
        roots
    }

    /// Concatenated text of `id` and its descendants, in document order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };

        if let Some(text) = &node.text {
            out.push_str(text);
        }

        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                out.push(current);
                stack.extend(node.children.iter().rev());
            }
        }

        out
    }

    pub fn apply(&mut self, command: &DomCommand) -> Result<(), Skip> {
        match command {
            DomCommand::CreateNode { node_id, tag_name } => {
                if self.nodes.contains_key(node_id) {
                    self.remove_subtree(*node_id);
                }
                self.nodes
                    .insert(*node_id, Node::new(*node_id, tag_name.clone()));
                Ok(())
            }
            DomCommand::RemoveNode { node_id } => {
                if !self.nodes.contains_key(node_id) {
                    return Err(Skip::UnknownNode(*node_id));
                }
                self.remove_subtree(*node_id);
                Ok(())
            }
            DomCommand::SetAttribute {
                node_id,
                name,
                value,
            } => {
                let node = self.node_mut(*node_id)?;
                node.attributes.insert(name.clone(), value.clone());
                Ok(())
            }
            DomCommand::RemoveAttribute { node_id, name } => {
                let node = self.node_mut(*node_id)?;
                node.attributes.remove(name);
                Ok(())
            }
            DomCommand::SetText { node_id, text } => {
                let node = self.node_mut(*node_id)?;
                node.text = Some(text.clone());
                Ok(())
            }
            DomCommand::InsertChild {
                parent_id,
                child_id,
                index,
            } => self.insert_child(*parent_id, *child_id, *index),
            DomCommand::MoveChild {
                parent_id,
                child_id,
                index,
            } => self.move_child(*parent_id, *child_id, *index),
        }
    }

    pub fn teardown_commands(&self) -> Vec<DomCommand> {
        self.roots()
            .into_iter()
            .map(|node_id| DomCommand::RemoveNode { node_id })
            .collect()
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, Skip> {
        self.nodes.get_mut(&id).ok_or(Skip::UnknownNode(id))
    }

    fn insert_child(&mut self, parent: NodeId, child: NodeId, index: usize) -> Result<(), Skip> {
        if !self.nodes.contains_key(&parent) {
            return Err(Skip::UnknownNode(parent));
        }
        if !self.nodes.contains_key(&child) {
            return Err(Skip::UnknownNode(child));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(Skip::WouldCycle { parent, child });
        }

        self.detach(child);

        let parent_node = self.node_mut(parent)?;
        let index = index.min(parent_node.children.len());
        parent_node.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn move_child(&mut self, parent: NodeId, child: NodeId, index: usize) -> Result<(), Skip> {
        let parent_node = self.node_mut(parent)?;
        let Some(current) = parent_node.children.iter().position(|id| *id == child) else {
            return Err(Skip::NotAChild { parent, child });
        };

        parent_node.children.remove(current);
        let index = index.min(parent_node.children.len());
        parent_node.children.insert(index, child);
        Ok(())
    }

    fn is_ancestor_or_self(&self, candidate: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == candidate {
                return true;
            }
            match self.nodes.get(&node).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get_mut(&id).and_then(|node| node.parent.take()) else {
            return;
        };

        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.retain(|child| *child != id);
        }
    }

    fn remove_subtree(&mut self, id: NodeId) {
        self.detach(id);
        for node_id in self.subtree(id) {
            self.nodes.remove(&node_id);
        }
    }
}
