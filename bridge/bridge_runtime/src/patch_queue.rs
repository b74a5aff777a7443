use crate::command::{CanvasCommand, DomCommand};
use crate::protocol::{NodeId, PageId};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

/// Something with pending commands to flush on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushTarget {
    Page(PageId),
    Canvas { page_id: PageId, node_id: NodeId },
}

impl FlushTarget {
    pub fn page_id(self) -> PageId {
        match self {
            FlushTarget::Page(page_id) => page_id,
            FlushTarget::Canvas { page_id, .. } => page_id,
        }
    }
}

#[derive(Debug, Default)]
pub struct FlushScheduler {
    scheduled: RefCell<Vec<FlushTarget>>,
}

impl FlushScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, target: FlushTarget) {
        trace!(?target, "flush scheduled");
        self.scheduled.borrow_mut().push(target);
    }

    pub fn drain(&self) -> Vec<FlushTarget> {
        self.scheduled.borrow_mut().drain(..).collect()
    }

    pub fn has_scheduled(&self) -> bool {
        !self.scheduled.borrow().is_empty()
    }
}

/// Commands accumulated for one target between flushes. At most one flush is
/// scheduled per target per tick however many commands are enqueued.
pub struct CommandQueue<T> {
    target: FlushTarget,
    pending: Vec<T>,
    scheduled: bool,
    scheduler: Rc<FlushScheduler>,
}

pub type PatchQueue = CommandQueue<DomCommand>;
pub type CanvasQueue = CommandQueue<CanvasCommand>;

impl<T> CommandQueue<T> {
    pub fn new(target: FlushTarget, scheduler: Rc<FlushScheduler>) -> Self {
        Self {
            target,
            pending: Vec::new(),
            scheduled: false,
            scheduler,
        }
    }

    pub fn target(&self) -> FlushTarget {
        self.target
    }

    /// Appends `command`; returns true when this call scheduled the flush.
    pub fn enqueue(&mut self, command: T) -> bool {
        self.pending.push(command);

        if self.scheduled {
            return false;
        }

        self.scheduled = true;
        self.scheduler.schedule(self.target);
        true
    }

    /// Takes the pending commands. Empty queues yield nothing.
    pub fn flush(&mut self) -> Option<Vec<T>> {
        self.scheduled = false;

        if self.pending.is_empty() {
            return None;
        }

        Some(std::mem::take(&mut self.pending))
    }

    pub fn discard(&mut self) -> usize {
        self.scheduled = false;
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn pending(&self) -> &[T] {
        &self.pending
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }
}
