use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

pub type ListenerId = u64;

type Listener = Rc<dyn Fn(&Value)>;

pub type SubscribeHandler<C> = Rc<dyn Fn(&mut C, &Value)>;

/// Native -> service push registrations. Nothing is acknowledged back.
pub struct Subscriptions<C> {
    channels: HashMap<String, Vec<SubscribeHandler<C>>>,
}

impl<C> Default for Subscriptions<C> {
    fn default() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }
}

impl<C> Subscriptions<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, channel: impl Into<String>, handler: SubscribeHandler<C>) {
        self.channels.entry(channel.into()).or_default().push(handler);
    }

    /// Handlers registered for `channel`, in registration order. The returned
    /// list is a snapshot, so handlers may register more subscriptions while
    /// it is being walked.
    pub fn handlers(&self, channel: &str) -> Vec<SubscribeHandler<C>> {
        self.channels.get(channel).cloned().unwrap_or_default()
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.channels
            .get(channel)
            .is_some_and(|handlers| !handlers.is_empty())
    }
}

/// Service-internal fan-out from one channel to many listeners.
///
/// Dispatch walks a snapshot of the listener list taken when the pass starts:
/// `off` during a pass only affects later passes, and `on` during a pass does
/// not join the pass in progress.
#[derive(Default)]
pub struct EventBus {
    next_id: Cell<ListenerId>,
    channels: RefCell<HashMap<String, Vec<(ListenerId, Listener)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, channel: &str, listener: impl Fn(&Value) + 'static) -> ListenerId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.channels
            .borrow_mut()
            .entry(channel.to_string())
            .or_default()
            .push((id, Rc::new(listener)));
        id
    }

    pub fn off(&self, channel: &str, id: ListenerId) -> bool {
        let mut channels = self.channels.borrow_mut();
        let Some(listeners) = channels.get_mut(channel) else {
            return false;
        };

        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        let removed = listeners.len() != before;

        if listeners.is_empty() {
            channels.remove(channel);
        }

        removed
    }

    /// Delivers `payload` to every listener of `channel`; returns how many ran.
    pub fn emit(&self, channel: &str, payload: &Value) -> usize {
        let snapshot: Vec<Listener> = self
            .channels
            .borrow()
            .get(channel)
            .map(|listeners| listeners.iter().map(|(_, f)| Rc::clone(f)).collect())
            .unwrap_or_default();

        if snapshot.is_empty() {
            debug!(channel, "no listeners for emitted channel");
        }

        for listener in &snapshot {
            listener(payload);
        }

        snapshot.len()
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels.borrow().get(channel).map_or(0, Vec::len)
    }
}

pub const KEYBOARD_SET_VALUE: &str = "WEBVIEW_KEYBOARD_SET_VALUE";
pub const KEYBOARD_ON_SHOW: &str = "WEBVIEW_KEYBOARD_ON_SHOW";
pub const KEYBOARD_ON_HIDE: &str = "WEBVIEW_KEYBOARD_ON_HIDE";
pub const KEYBOARD_ON_CONFIRM: &str = "WEBVIEW_KEYBOARD_ON_CONFIRM";
pub const KEYBOARD_HEIGHT_CHANGE: &str = "WEBVIEW_KEYBOARD_HEIGHT_CHANGE";

pub const KEYBOARD_CHANNELS: [&str; 5] = [
    KEYBOARD_SET_VALUE,
    KEYBOARD_ON_SHOW,
    KEYBOARD_ON_HIDE,
    KEYBOARD_ON_CONFIRM,
    KEYBOARD_HEIGHT_CHANGE,
];

/// Keyboard listeners of one input field. Every keyboard channel is shared by
/// all inputs; each listener only sees payloads carrying its own `inputId`.
pub struct KeyboardListeners {
    bus: Rc<EventBus>,
    input_id: u64,
    ids: Vec<(&'static str, ListenerId)>,
}

impl KeyboardListeners {
    pub fn new(bus: Rc<EventBus>, input_id: u64) -> Self {
        Self {
            bus,
            input_id,
            ids: Vec::new(),
        }
    }

    pub fn input_id(&self) -> u64 {
        self.input_id
    }

    pub fn on_set_value(&mut self, callback: impl Fn(&Value) + 'static) -> ListenerId {
        self.listen(KEYBOARD_SET_VALUE, callback)
    }

    pub fn on_show(&mut self, callback: impl Fn(&Value) + 'static) -> ListenerId {
        self.listen(KEYBOARD_ON_SHOW, callback)
    }

    pub fn on_hide(&mut self, callback: impl Fn(&Value) + 'static) -> ListenerId {
        self.listen(KEYBOARD_ON_HIDE, callback)
    }

    pub fn on_confirm(&mut self, callback: impl Fn(&Value) + 'static) -> ListenerId {
        self.listen(KEYBOARD_ON_CONFIRM, callback)
    }

    pub fn on_height_change(&mut self, callback: impl Fn(&Value) + 'static) -> ListenerId {
        self.listen(KEYBOARD_HEIGHT_CHANGE, callback)
    }

    pub fn remove_all(&mut self) {
        for (channel, id) in self.ids.drain(..) {
            self.bus.off(channel, id);
        }
    }

    fn listen(
        &mut self,
        channel: &'static str,
        callback: impl Fn(&Value) + 'static,
    ) -> ListenerId {
        let input_id = self.input_id;
        let id = self.bus.on(channel, move |payload| {
            if payload.get("inputId").and_then(Value::as_u64) == Some(input_id) {
                callback(payload);
            }
        });
        self.ids.push((channel, id));
        id
    }
}

impl Drop for KeyboardListeners {
    fn drop(&mut self) {
        self.remove_all();
    }
}
