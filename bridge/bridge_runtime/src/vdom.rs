//! The business-side page document.
//!
//! Mutations apply to the local arena first and are only queued for the UI
//! context when they took effect, so the live tree never sees a command the
//! authoritative tree rejected.

use crate::canvas::CanvasContext;
use crate::command::DomCommand;
use crate::patch_queue::{FlushScheduler, FlushTarget, PatchQueue};
use crate::protocol::{CanvasMessage, NodeId, PageId, PatchMessage};
use crate::service::AppService;
use crate::tree::{Node, TEXT_TAG, Tree};
use serde_json::Value;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct DomEvent {
    pub page_id: PageId,
    pub node_id: NodeId,
    pub kind: String,
    pub args: Vec<Value>,
}

pub type EventHandler = Rc<dyn Fn(&mut AppService, &DomEvent)>;

pub struct PageDocument {
    page_id: PageId,
    next_node_id: NodeId,
    tree: Tree,
    listeners: HashMap<NodeId, HashMap<String, Vec<EventHandler>>>,
    canvases: HashMap<NodeId, CanvasContext>,
    queue: PatchQueue,
    scheduler: Rc<FlushScheduler>,
}

impl PageDocument {
    pub fn new(page_id: PageId, scheduler: Rc<FlushScheduler>) -> Self {
        Self {
            page_id,
            next_node_id: 1,
            tree: Tree::new(),
            listeners: HashMap::new(),
            canvases: HashMap::new(),
            queue: PatchQueue::new(FlushTarget::Page(page_id), Rc::clone(&scheduler)),
            scheduler,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.tree.get(node_id)
    }

    pub fn has_node(&self, node_id: NodeId) -> bool {
        self.tree.contains(node_id)
    }

    pub fn create_element(&mut self, tag_name: &str) -> NodeId {
        let node_id = self.allocate();
        self.mutate(DomCommand::CreateNode {
            node_id,
            tag_name: tag_name.to_string(),
        });
        node_id
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        let node_id = self.allocate();
        self.mutate(DomCommand::CreateNode {
            node_id,
            tag_name: TEXT_TAG.to_string(),
        });
        self.mutate(DomCommand::SetText {
            node_id,
            text: text.to_string(),
        });
        node_id
    }

    pub fn set_attribute(&mut self, node_id: NodeId, name: &str, value: impl Into<Value>) -> bool {
        self.mutate(DomCommand::SetAttribute {
            node_id,
            name: name.to_string(),
            value: value.into(),
        })
    }

    pub fn remove_attribute(&mut self, node_id: NodeId, name: &str) -> bool {
        self.mutate(DomCommand::RemoveAttribute {
            node_id,
            name: name.to_string(),
        })
    }

    pub fn insert_child(&mut self, parent_id: NodeId, child_id: NodeId, index: usize) -> bool {
        self.mutate(DomCommand::InsertChild {
            parent_id,
            child_id,
            index,
        })
    }

    pub fn append_child(&mut self, parent_id: NodeId, child_id: NodeId) -> bool {
        let index = self.tree.get(parent_id).map_or(0, |node| node.children.len());
        self.insert_child(parent_id, child_id, index)
    }

    pub fn move_child(&mut self, parent_id: NodeId, child_id: NodeId, index: usize) -> bool {
        self.mutate(DomCommand::MoveChild {
            parent_id,
            child_id,
            index,
        })
    }

    pub fn set_text(&mut self, node_id: NodeId, text: &str) -> bool {
        self.mutate(DomCommand::SetText {
            node_id,
            text: text.to_string(),
        })
    }

    /// Removes the node and everything below it, along with their handlers
    /// and canvas contexts.
    pub fn remove_node(&mut self, node_id: NodeId) -> bool {
        let removed = self.tree.subtree(node_id);
        if !self.mutate(DomCommand::RemoveNode { node_id }) {
            return false;
        }

        for id in removed {
            self.listeners.remove(&id);
            if let Some(mut canvas) = self.canvases.remove(&id) {
                canvas.discard_pending();
            }
        }
        true
    }

    pub fn add_event_listener(
        &mut self,
        node_id: NodeId,
        kind: &str,
        handler: impl Fn(&mut AppService, &DomEvent) + 'static,
    ) -> bool {
        if !self.tree.contains(node_id) {
            debug!(page_id = self.page_id, node_id, kind, "listener target missing");
            return false;
        }

        self.listeners
            .entry(node_id)
            .or_default()
            .entry(kind.to_string())
            .or_default()
            .push(Rc::new(handler));
        true
    }

    pub fn remove_event_listeners(&mut self, node_id: NodeId, kind: &str) -> usize {
        let Some(by_kind) = self.listeners.get_mut(&node_id) else {
            return 0;
        };
        let removed = by_kind.remove(kind).map_or(0, |handlers| handlers.len());
        if by_kind.is_empty() {
            self.listeners.remove(&node_id);
        }
        removed
    }

    pub fn handlers(&self, node_id: NodeId, kind: &str) -> Vec<EventHandler> {
        self.listeners
            .get(&node_id)
            .and_then(|by_kind| by_kind.get(kind))
            .cloned()
            .unwrap_or_default()
    }

    /// The 2D context of a `canvas` node, created on first use.
    pub fn canvas_context(&mut self, node_id: NodeId) -> Option<&mut CanvasContext> {
        let is_canvas = self
            .tree
            .get(node_id)
            .is_some_and(|node| node.tag_name == "canvas");
        if !is_canvas {
            return None;
        }

        let page_id = self.page_id;
        let scheduler = Rc::clone(&self.scheduler);
        Some(
            self.canvases
                .entry(node_id)
                .or_insert_with(|| CanvasContext::new(page_id, node_id, scheduler)),
        )
    }

    pub fn pending(&self) -> &[DomCommand] {
        self.queue.pending()
    }

    pub fn flush(&mut self) -> Option<PatchMessage> {
        self.queue.flush().map(|commands| PatchMessage {
            page_id: self.page_id,
            commands,
        })
    }

    pub fn flush_canvas(&mut self, node_id: NodeId) -> Option<CanvasMessage> {
        self.canvases.get_mut(&node_id).and_then(CanvasContext::flush)
    }

    pub fn discard_pending(&mut self) -> usize {
        let mut dropped = self.queue.discard();
        for canvas in self.canvases.values_mut() {
            dropped += canvas.discard_pending();
        }
        dropped
    }

    fn allocate(&mut self) -> NodeId {
        let node_id = self.next_node_id;
        self.next_node_id += 1;
        node_id
    }

    fn mutate(&mut self, command: DomCommand) -> bool {
        match self.tree.apply(&command) {
            Ok(()) => {
                self.queue.enqueue(command);
                true
            }
            Err(skip) => {
                debug!(
                    page_id = self.page_id,
                    opcode = command.opcode().name(),
                    "mutation skipped: {skip}"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> (PageDocument, Rc<FlushScheduler>) {
        let scheduler = Rc::new(FlushScheduler::new());
        (PageDocument::new(7, Rc::clone(&scheduler)), scheduler)
    }

    #[test]
    fn node_ids_start_at_one() {
        let (mut doc, _) = document();
        assert_eq!(doc.create_element("div"), 1);
        assert_eq!(doc.create_text("hi"), 2);
        assert_eq!(doc.node(2).and_then(|n| n.text.clone()), Some("hi".to_string()));
    }

    #[test]
    fn mutations_flush_as_one_patch_in_order() {
        let (mut doc, scheduler) = document();
        let root = doc.create_element("div");
        let label = doc.create_text("0");
        doc.append_child(root, label);
        doc.set_attribute(root, "class", "counter");
        doc.set_text(label, "1");

        assert_eq!(scheduler.drain(), vec![FlushTarget::Page(7)]);

        let patch = doc.flush().expect("patch");
        assert_eq!(patch.page_id, 7);
        assert_eq!(
            patch.commands,
            vec![
                DomCommand::CreateNode {
                    node_id: 1,
                    tag_name: "div".to_string()
                },
                DomCommand::CreateNode {
                    node_id: 2,
                    tag_name: TEXT_TAG.to_string()
                },
                DomCommand::SetText {
                    node_id: 2,
                    text: "0".to_string()
                },
                DomCommand::InsertChild {
                    parent_id: 1,
                    child_id: 2,
                    index: 0
                },
                DomCommand::SetAttribute {
                    node_id: 1,
                    name: "class".to_string(),
                    value: json!("counter")
                },
                DomCommand::SetText {
                    node_id: 2,
                    text: "1".to_string()
                },
            ]
        );
        assert!(doc.flush().is_none());
    }

    #[test]
    fn rejected_mutations_are_not_queued() {
        let (mut doc, scheduler) = document();
        assert!(!doc.set_attribute(42, "a", 1));
        assert!(!doc.remove_node(42));
        assert!(doc.pending().is_empty());
        assert!(!scheduler.has_scheduled());
    }

    #[test]
    fn remove_node_drops_handlers_of_subtree() {
        let (mut doc, _) = document();
        let root = doc.create_element("div");
        let button = doc.create_element("button");
        doc.append_child(root, button);
        assert!(doc.add_event_listener(button, "click", |_, _| {}));

        assert!(doc.remove_node(root));
        assert!(doc.handlers(button, "click").is_empty());
        assert!(!doc.add_event_listener(button, "click", |_, _| {}));
    }

    #[test]
    fn canvas_context_only_for_canvas_nodes() {
        let (mut doc, scheduler) = document();
        let div = doc.create_element("div");
        let canvas = doc.create_element("canvas");
        scheduler.drain();

        assert!(doc.canvas_context(div).is_none());

        let ctx = doc.canvas_context(canvas).expect("canvas context");
        ctx.fill_rect(0.0, 0.0, 1.0, 1.0);
        assert_eq!(
            scheduler.drain(),
            vec![FlushTarget::Canvas {
                page_id: 7,
                node_id: canvas
            }]
        );

        let message = doc.flush_canvas(canvas).expect("canvas message");
        assert_eq!(message.commands.len(), 1);
    }

    #[test]
    fn discard_pending_counts_all_queues() {
        let (mut doc, _) = document();
        let canvas = doc.create_element("canvas");
        if let Some(ctx) = doc.canvas_context(canvas) {
            ctx.begin_path();
        }

        assert_eq!(doc.discard_pending(), 2);
        assert!(doc.flush().is_none());
        assert!(doc.flush_canvas(canvas).is_none());
    }
}
