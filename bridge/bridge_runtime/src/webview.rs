use crate::channel::EventBus;
use crate::command::{CanvasCommand, DomCommand};
use crate::error::BridgeError;
use crate::protocol::{
    CanvasMessage, DispatchEventMessage, EventDescriptor, NodeId, PageId, Transport,
    WebViewInbound, WebViewOutbound,
};
use crate::tree::Tree;
use std::collections::HashMap;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyReport {
    pub applied: usize,
    pub skipped: usize,
}

/// The rendered tree of one page, plus the drawing commands recorded for its
/// canvas nodes.
#[derive(Debug, Default)]
pub struct LiveDocument {
    page_id: PageId,
    tree: Tree,
    canvases: HashMap<NodeId, Vec<CanvasCommand>>,
}

impl LiveDocument {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            ..Self::default()
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Applies `commands` in order. Commands naming a node this tree does not
    /// have are skipped; the rest still apply.
    pub fn apply_patch(&mut self, commands: &[DomCommand]) -> ApplyReport {
        let mut report = ApplyReport::default();

        for command in commands {
            match self.tree.apply(command) {
                Ok(()) => {
                    report.applied += 1;
                    if let DomCommand::RemoveNode { .. } = command {
                        self.drop_orphaned_canvases();
                    }
                }
                Err(skip) => {
                    report.skipped += 1;
                    debug!(
                        page_id = self.page_id,
                        opcode = command.opcode().name(),
                        "patch command skipped: {skip}"
                    );
                }
            }
        }

        report
    }

    pub fn apply_canvas(&mut self, node_id: NodeId, commands: Vec<CanvasCommand>) -> bool {
        if !self.tree.contains(node_id) {
            debug!(page_id = self.page_id, node_id, "canvas commands for stale node dropped");
            return false;
        }

        self.canvases.entry(node_id).or_default().extend(commands);
        true
    }

    pub fn canvas_commands(&self, node_id: NodeId) -> &[CanvasCommand] {
        self.canvases
            .get(&node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn inverse_commands(&self) -> Vec<DomCommand> {
        self.tree.teardown_commands()
    }

    fn drop_orphaned_canvases(&mut self) {
        let tree = &self.tree;
        self.canvases.retain(|node_id, _| tree.contains(*node_id));
    }
}

pub struct UiContext<T> {
    transport: T,
    documents: HashMap<PageId, LiveDocument>,
    bus: EventBus,
}

impl<T: Transport<WebViewOutbound>> UiContext<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            documents: HashMap::new(),
            bus: EventBus::new(),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn ready(&mut self, page_id: PageId) -> Result<(), BridgeError> {
        self.documents
            .entry(page_id)
            .or_insert_with(|| LiveDocument::new(page_id));
        self.transport.send(WebViewOutbound::Ready { page_id })
    }

    pub fn handle_inbound(&mut self, envelope: WebViewInbound) {
        match envelope {
            WebViewInbound::Patch(patch) => {
                self.apply_patch(patch.page_id, &patch.commands);
            }
            WebViewInbound::Canvas(message) => {
                self.apply_canvas(message);
            }
            WebViewInbound::Publish { channel, payload } => {
                self.bus.emit(&channel, &payload);
            }
        }
    }

    /// Replays `commands` on the page's live tree. Only `ready` opens a page,
    /// so a patch racing an unmount finds nothing and is dropped.
    pub fn apply_patch(&mut self, page_id: PageId, commands: &[DomCommand]) -> Option<ApplyReport> {
        let Some(document) = self.documents.get_mut(&page_id) else {
            debug!(page_id, commands = commands.len(), "patch for unknown page dropped");
            return None;
        };

        let report = document.apply_patch(commands);
        trace!(page_id, applied = report.applied, skipped = report.skipped, "patch applied");
        Some(report)
    }

    pub fn apply_canvas(&mut self, message: CanvasMessage) -> bool {
        match self.documents.get_mut(&message.page_id) {
            Some(document) => document.apply_canvas(message.node_id, message.commands),
            None => {
                debug!(page_id = message.page_id, "canvas commands for unknown page dropped");
                false
            }
        }
    }

    /// Sends a user interaction at `node_id` to the business context. Returns
    /// false when the node is no longer rendered.
    pub fn dispatch_event(
        &mut self,
        page_id: PageId,
        node_id: NodeId,
        event: EventDescriptor,
    ) -> Result<bool, BridgeError> {
        let rendered = self
            .documents
            .get(&page_id)
            .is_some_and(|document| document.tree.contains(node_id));
        if !rendered {
            debug!(page_id, node_id, kind = event.kind.as_str(), "interaction on stale node dropped");
            return Ok(false);
        }

        self.transport
            .send(WebViewOutbound::Dispatch(DispatchEventMessage {
                page_id,
                node_id,
                event,
            }))?;
        Ok(true)
    }

    pub fn document(&self, page_id: PageId) -> Option<&LiveDocument> {
        self.documents.get(&page_id)
    }

    pub fn remove_page(&mut self, page_id: PageId) -> bool {
        self.documents.remove(&page_id).is_some()
    }
}
