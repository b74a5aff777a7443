//! The business context: one per applet instance.
//!
//! `AppService` owns every piece of mutable app state (pages, router lock,
//! pending calls, subscriptions) and is driven from a single thread. Handlers
//! of all kinds receive `&mut AppService`, so there is exactly one writer.

use crate::callback::{
    AsyncReturn, CallResult, Callbacks, PendingCalls, Responder, fail_message, merge_defaults,
    responder_for,
};
use crate::canvas::CanvasContext;
use crate::channel::{EventBus, KEYBOARD_CHANNELS, Subscriptions};
use crate::error::BridgeError;
use crate::patch_queue::{FlushScheduler, FlushTarget};
use crate::protocol::{
    CallId, DispatchEventMessage, InvokeResponse, NativeEnvelope, NodeId, PageId,
    ServiceEnvelope, Transport, invoke_envelope, ready_envelope,
};
use crate::registry::{AppState, Page, PageRegistry, PageState, RouteTable};
use crate::router::decode_url;
use crate::vdom::{DomEvent, PageDocument};
use serde_json::{Map, Value};
use std::rc::Rc;
use tracing::{debug, error, info, warn};

pub const PAGE_BEGIN_MOUNT: &str = "PAGE_BEGIN_MOUNT";
pub const PAGE_UNMOUNT: &str = "PAGE_UNMOUNT";
pub const PAGE_SHOW: &str = "PAGE_SHOW";
pub const PAGE_HIDE: &str = "PAGE_HIDE";
pub const APP_SHOW: &str = "APP_SHOW";
pub const APP_HIDE: &str = "APP_HIDE";
pub const APP_SET_TAB_INDEX: &str = "APP_SET_TAB_INDEX";

pub struct AppService {
    transport: Box<dyn Transport<ServiceEnvelope>>,
    calls: PendingCalls<AppService>,
    subscriptions: Subscriptions<AppService>,
    bus: Rc<EventBus>,
    scheduler: Rc<FlushScheduler>,
    routes: RouteTable,
    pages: PageRegistry,
    app_state: AppState,
    current_page_id: PageId,
    current_tab_index: usize,
    query: Map<String, Value>,
    router_lock: bool,
    event_from_user_click: bool,
    global_data: Value,
    next_task_id: u64,
}

impl AppService {
    pub fn new(transport: impl Transport<ServiceEnvelope> + 'static, routes: RouteTable) -> Self {
        let mut app = Self {
            transport: Box::new(transport),
            calls: PendingCalls::new(),
            subscriptions: Subscriptions::new(),
            bus: Rc::new(EventBus::new()),
            scheduler: Rc::new(FlushScheduler::new()),
            routes,
            pages: PageRegistry::new(),
            app_state: AppState::Foreground,
            current_page_id: 0,
            current_tab_index: 0,
            query: Map::new(),
            router_lock: false,
            event_from_user_click: false,
            global_data: Value::Object(Map::new()),
            next_task_id: 1,
        };
        app.install_builtin_subscriptions();
        app
    }

    pub fn ready(&mut self, sid: String) -> Result<(), BridgeError> {
        self.transport.send(ready_envelope(sid))
    }

    /// Sends `event` with a fresh call id; `handler` runs once with the
    /// response. When the send fails the record is dropped, `handler` runs
    /// right away with a fail result, and the error is returned.
    pub fn invoke(
        &mut self,
        event: &str,
        params: Value,
        handler: impl FnOnce(&mut AppService, CallResult) + 'static,
    ) -> Result<CallId, BridgeError> {
        let call_id = self.calls.register(event, Box::new(handler));
        debug!(call_id, event, "invoke");

        match self
            .transport
            .send(invoke_envelope(event, params, Some(call_id)))
        {
            Ok(()) => Ok(call_id),
            Err(err) => {
                warn!(call_id, event, "invoke send failed: {err}");
                if let Some((event, handler)) = self.calls.take(call_id) {
                    handler(self, Err(fail_message(&event, &err.to_string())));
                }
                Err(err)
            }
        }
    }

    pub fn notify(&mut self, event: &str, params: Value) -> Result<(), BridgeError> {
        debug!(event, "notify");
        self.transport.send(invoke_envelope(event, params, None))
    }

    /// Drops the pending record of `call_id`; a later response is ignored.
    pub fn cancel(&mut self, call_id: CallId) -> bool {
        let cancelled = self.calls.cancel(call_id);
        debug!(call_id, cancelled, "cancel");
        cancelled
    }

    pub fn is_pending(&self, call_id: CallId) -> bool {
        self.calls.is_pending(call_id)
    }

    pub fn pending_calls(&self) -> usize {
        self.calls.len()
    }

    pub fn wrapper_async_api(
        &mut self,
        options: Value,
        defaults: Value,
        callbacks: Callbacks,
        executor: impl FnOnce(&mut AppService, Value, Responder),
    ) -> AsyncReturn {
        let (responder, ret) = responder_for(callbacks);
        executor(self, merge_defaults(options, defaults), responder);
        ret
    }

    /// The plain capability call: forwards `options` as params and resolves
    /// the callbacks (or future) from the native response.
    pub fn call_api(&mut self, event: &str, options: Value, callbacks: Callbacks) -> AsyncReturn {
        let event = event.to_string();
        self.wrapper_async_api(options, Value::Null, callbacks, move |app, params, responder| {
            // A failed send has already resolved the responder.
            let _ = app.invoke(&event, params, move |_, result| responder.resolve(result));
        })
    }

    pub fn subscribe(
        &mut self,
        channel: &str,
        handler: impl Fn(&mut AppService, &Value) + 'static,
    ) {
        self.subscriptions.subscribe(channel, Rc::new(handler));
    }

    pub fn bus(&self) -> Rc<EventBus> {
        Rc::clone(&self.bus)
    }

    pub fn handle_envelope(&mut self, envelope: NativeEnvelope) {
        match envelope {
            NativeEnvelope::Response(response) => self.handle_response(response),
            NativeEnvelope::Publish { channel, payload } => self.handle_publish(&channel, &payload),
            NativeEnvelope::Dispatch(message) => self.dispatch_event(message),
        }
    }

    pub fn handle_response(&mut self, response: InvokeResponse) {
        let Some(call_id) = response.call_id else {
            debug!("response without call id dropped");
            return;
        };

        let Some((event, handler)) = self.calls.take(call_id) else {
            debug!(call_id, "response for unknown call dropped");
            return;
        };

        debug!(call_id, event = event.as_str(), failed = response.is_failure(), "response");
        handler(self, response.into_result());
    }

    pub fn handle_publish(&mut self, channel: &str, payload: &Value) {
        let handlers = self.subscriptions.handlers(channel);
        if handlers.is_empty() {
            debug!(channel, "publish without subscribers");
        }

        for handler in handlers {
            handler(self, payload);
        }
    }

    /// Runs the handlers of the target node. A page or node that no longer
    /// exists makes this a no-op.
    pub fn dispatch_event(&mut self, message: DispatchEventMessage) {
        let DispatchEventMessage {
            page_id,
            node_id,
            event,
        } = message;

        let Some(page) = self.pages.get(page_id) else {
            debug!(page_id, node_id, "dispatch for unknown page dropped");
            return;
        };
        if !page.document.has_node(node_id) {
            debug!(page_id, node_id, "dispatch for stale node dropped");
            return;
        }

        let handlers = page.document.handlers(node_id, &event.kind);
        let dom_event = DomEvent {
            page_id,
            node_id,
            kind: event.kind,
            args: event.args,
        };

        self.event_from_user_click = dom_event.kind == "click";
        for handler in handlers {
            handler(self, &dom_event);
        }
        self.event_from_user_click = false;
    }

    /// Flushes every target scheduled since the last tick. Returns how many
    /// messages were sent; a send failure is reported after the remaining
    /// targets were attempted.
    pub fn run_tick(&mut self) -> Result<usize, BridgeError> {
        let mut sent = 0;
        let mut first_error = None;

        for target in self.scheduler.drain() {
            let envelope = match target {
                FlushTarget::Page(page_id) => self
                    .pages
                    .get_mut(page_id)
                    .and_then(|page| page.document.flush())
                    .map(ServiceEnvelope::Patch),
                FlushTarget::Canvas { page_id, node_id } => self
                    .pages
                    .get_mut(page_id)
                    .and_then(|page| page.document.flush_canvas(node_id))
                    .map(ServiceEnvelope::Canvas),
            };

            let Some(envelope) = envelope else {
                continue;
            };

            match self.transport.send(envelope) {
                Ok(()) => sent += 1,
                Err(err) => {
                    warn!(?target, "flush send failed: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(sent),
        }
    }

    /// Creates page `page_id` for `path` and renders its component. Unknown
    /// routes are logged and leave no page behind.
    pub fn mount_page(&mut self, page_id: PageId, path: &str) -> bool {
        let (route, query) = decode_url(path);
        let Some(component) = self.routes.lookup(&route) else {
            error!(page_id, route = route.as_str(), "route is not registered");
            return false;
        };

        if self.pages.contains(page_id) {
            warn!(page_id, "page id mounted twice; replacing");
            self.unmount_page(page_id);
        }

        let mut document = PageDocument::new(page_id, Rc::clone(&self.scheduler));
        let root = document.create_element("div");
        document.set_attribute(root, "id", "app");

        let mut page = Page::new(
            document,
            route,
            query,
            self.current_tab_index,
            Rc::clone(&component),
        );
        page.root = root;

        component.render(&mut page.document, root, &page.query);
        page.transition(PageState::Mounted);

        info!(page_id, route = page.route.as_str(), "page mounted");
        self.pages.insert(page);
        self.current_page_id = page_id;
        true
    }

    /// Tears page `page_id` down. Its nodes and unsent commands go with it.
    pub fn unmount_page(&mut self, page_id: PageId) -> bool {
        let Some(mut page) = self.pages.remove(page_id) else {
            debug!(page_id, "unmount for unknown page");
            return false;
        };

        page.transition(PageState::Unmounting);
        page.component.unmounted(page_id);
        let dropped = page.document.discard_pending();
        page.transition(PageState::Destroyed);

        info!(page_id, dropped, "page unmounted");
        true
    }

    pub fn show_page(&mut self, page_id: PageId) -> bool {
        let Some(page) = self.pages.get_mut(page_id) else {
            return false;
        };
        if !page.transition(PageState::Visible) {
            return false;
        }
        page.component.on_show(page_id);
        self.current_page_id = page_id;
        true
    }

    pub fn hide_page(&mut self, page_id: PageId) -> bool {
        let Some(page) = self.pages.get_mut(page_id) else {
            return false;
        };
        if !page.transition(PageState::Hidden) {
            return false;
        }
        page.component.on_hide(page_id);
        true
    }

    pub fn page(&self, page_id: PageId) -> Option<&Page> {
        self.pages.get(page_id)
    }

    pub fn document_mut(&mut self, page_id: PageId) -> Option<&mut PageDocument> {
        self.pages.get_mut(page_id).map(|page| &mut page.document)
    }

    pub fn canvas_context(&mut self, page_id: PageId, node_id: NodeId) -> Option<&mut CanvasContext> {
        self.document_mut(page_id)
            .and_then(|document| document.canvas_context(node_id))
    }

    pub fn get_current_pages(&self) -> Vec<PageId> {
        self.pages.pages_on_tab(self.current_tab_index)
    }

    pub fn current_web_view_id(&self) -> Option<PageId> {
        self.get_current_pages().last().copied()
    }

    pub fn app_state(&self) -> AppState {
        self.app_state
    }

    pub fn current_page_id(&self) -> PageId {
        self.current_page_id
    }

    pub fn current_tab_index(&self) -> usize {
        self.current_tab_index
    }

    pub fn query(&self) -> &Map<String, Value> {
        &self.query
    }

    pub fn router_lock(&self) -> bool {
        self.router_lock
    }

    /// True only while the handlers of a `click` dispatch are running.
    pub fn is_event_from_user_click(&self) -> bool {
        self.event_from_user_click
    }

    pub fn global_data(&self) -> &Value {
        &self.global_data
    }

    pub fn global_data_mut(&mut self) -> &mut Value {
        &mut self.global_data
    }

    pub(crate) fn set_router_lock(&mut self, locked: bool) {
        self.router_lock = locked;
    }

    pub(crate) fn set_query(&mut self, query: Map<String, Value>) {
        self.query = query;
    }

    pub(crate) fn set_current_tab_index(&mut self, tab_index: usize) {
        self.current_tab_index = tab_index;
    }

    pub(crate) fn allocate_task_id(&mut self) -> u64 {
        let task_id = self.next_task_id;
        self.next_task_id += 1;
        task_id
    }

    fn install_builtin_subscriptions(&mut self) {
        self.subscribe(PAGE_BEGIN_MOUNT, |app, payload| {
            let page_id = payload.get("pageId").and_then(Value::as_u64);
            let path = payload.get("path").and_then(Value::as_str);
            match (page_id, path) {
                (Some(page_id), Some(path)) => {
                    app.mount_page(page_id, path);
                }
                _ => warn!(%payload, "malformed page mount payload"),
            }
        });

        self.subscribe(PAGE_UNMOUNT, |app, payload| {
            if let Some(page_id) = page_id_of(payload) {
                app.unmount_page(page_id);
            }
        });

        self.subscribe(PAGE_SHOW, |app, payload| {
            if let Some(page_id) = page_id_of(payload) {
                app.show_page(page_id);
            }
        });

        self.subscribe(PAGE_HIDE, |app, payload| {
            if let Some(page_id) = page_id_of(payload) {
                app.hide_page(page_id);
            }
        });

        self.subscribe(APP_SHOW, |app, payload| {
            app.app_state = AppState::Foreground;
            app.bus.emit(APP_SHOW, payload);
        });

        self.subscribe(APP_HIDE, |app, payload| {
            app.app_state = AppState::Background;
            app.bus.emit(APP_HIDE, payload);
        });

        self.subscribe(APP_SET_TAB_INDEX, |app, payload| {
            if let Some(tab_index) = payload.get("tabIndex").and_then(Value::as_u64) {
                app.set_current_tab_index(tab_index as usize);
            }
        });

        for channel in KEYBOARD_CHANNELS {
            self.subscribe(channel, move |app, payload| {
                app.bus.emit(channel, payload);
            });
        }
    }
}

fn page_id_of(payload: &Value) -> Option<PageId> {
    payload.get("pageId").and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::KEYBOARD_ON_SHOW;
    use crate::error::CallError;
    use crate::protocol::{ChannelTransport, EventDescriptor, MemoryTransport};
    use crate::registry::PageComponent;
    use futures::executor::block_on;
    use serde_json::json;
    use std::cell::RefCell;

    struct Button;

    impl PageComponent for Button {
        fn render(&self, doc: &mut PageDocument, root: NodeId, _query: &Map<String, Value>) {
            let button = doc.create_element("button");
            doc.append_child(root, button);
            doc.add_event_listener(button, "click", |app, event| {
                let clicked = app.is_event_from_user_click();
                if let Some(doc) = app.document_mut(event.page_id) {
                    doc.set_attribute(event.node_id, "data-clicked", clicked);
                }
            });
            doc.add_event_listener(button, "input", |app, event| {
                let clicked = app.is_event_from_user_click();
                if let Some(doc) = app.document_mut(event.page_id) {
                    doc.set_attribute(event.node_id, "data-input-trusted", clicked);
                }
            });
        }
    }

    fn service() -> (AppService, MemoryTransport<ServiceEnvelope>) {
        let transport = MemoryTransport::new();
        let routes = RouteTable::new().with_route("pages/index/index", Button);
        (AppService::new(transport.clone(), routes), transport)
    }

    fn sent_invokes(transport: &MemoryTransport<ServiceEnvelope>) -> Vec<(String, Option<CallId>)> {
        transport
            .drain()
            .into_iter()
            .filter_map(|envelope| match envelope {
                ServiceEnvelope::Invoke(request) => Some((request.event, request.call_id)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn invoke_assigns_monotonic_call_ids() {
        let (mut app, transport) = service();
        let first = app.invoke("getStorage", json!({}), |_, _| {}).expect("invoke");
        let second = app.invoke("getStorage", json!({}), |_, _| {}).expect("invoke");

        assert_eq!((first, second), (1, 2));
        assert_eq!(
            sent_invokes(&transport),
            vec![
                ("getStorage".to_string(), Some(1)),
                ("getStorage".to_string(), Some(2))
            ]
        );
    }

    #[test]
    fn notify_carries_no_call_id() {
        let (mut app, transport) = service();
        app.notify("vibrateShort", json!({})).expect("notify");

        assert_eq!(sent_invokes(&transport), vec![("vibrateShort".to_string(), None)]);
        assert_eq!(app.pending_calls(), 0);
    }

    #[test]
    fn closed_transport_fails_the_call_immediately() {
        let (mut app, transport) = service();
        transport.close();

        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let err = app
            .invoke("login", json!({}), move |_, result| *sink.borrow_mut() = Some(result))
            .expect_err("closed transport");

        assert!(matches!(err, BridgeError::ChannelClosed));
        assert_eq!(app.pending_calls(), 0);
        assert_eq!(
            *seen.borrow(),
            Some(Err("login:fail bridge channel closed".to_string()))
        );
    }

    #[test]
    fn oversized_call_fails_and_the_next_one_goes_through() {
        let (tx, rx) = std::sync::mpsc::sync_channel(8);
        let mut app = AppService::new(
            ChannelTransport::<ServiceEnvelope>::new(tx, 8, 256),
            RouteTable::new(),
        );

        let failed = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&failed);
        app.call_api(
            "uploadFile",
            json!({"data": "x".repeat(1024)}),
            Callbacks::new().on_fail(move |err_msg| *sink.borrow_mut() = Some(err_msg)),
        );

        let err_msg = failed.borrow().clone().expect("fail callback ran");
        assert!(err_msg.starts_with("uploadFile:fail frame too large"), "{err_msg}");
        assert!(err_msg.ends_with("> 256"), "{err_msg}");
        assert_eq!(app.pending_calls(), 0);
        assert!(rx.try_recv().is_err());

        let call_id = app
            .invoke("getSystemInfo", json!({}), |_, _| {})
            .expect("small call is sent");
        assert!(app.is_pending(call_id));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn login_resolves_only_its_own_call() {
        let (mut app, _transport) = service();
        let log = Rc::new(RefCell::new(Vec::new()));

        for _ in 0..6 {
            let call_id = app.invoke("noop", json!({}), |_, _| {}).expect("invoke");
            app.cancel(call_id);
        }

        let callbacks = |tag: &'static str| {
            let success = Rc::clone(&log);
            let fail = Rc::clone(&log);
            let complete = Rc::clone(&log);
            Callbacks::new()
                .on_success(move |data| success.borrow_mut().push(format!("{tag} success {data}")))
                .on_fail(move |err| fail.borrow_mut().push(format!("{tag} fail {err}")))
                .on_complete(move || complete.borrow_mut().push(format!("{tag} complete")))
        };

        app.call_api("login", json!({}), callbacks("first"));
        app.call_api("login", json!({}), callbacks("second"));
        assert!(app.is_pending(7));
        assert!(app.is_pending(8));

        app.handle_envelope(NativeEnvelope::Response(InvokeResponse::ok(
            7,
            json!({"code": "abc"}),
        )));

        assert_eq!(
            *log.borrow(),
            vec![
                r#"first success {"code":"abc"}"#.to_string(),
                "first complete".to_string()
            ]
        );
        assert!(!app.is_pending(7));
        assert!(app.is_pending(8));
    }

    #[test]
    fn duplicate_response_is_ignored() {
        let (mut app, _transport) = service();
        let count = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&count);
        let call_id = app
            .invoke("getSystemInfo", json!({}), move |_, _| *counter.borrow_mut() += 1)
            .expect("invoke");

        app.handle_response(InvokeResponse::ok(call_id, json!({})));
        app.handle_response(InvokeResponse::ok(call_id, json!({})));
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn cancelled_call_never_fires() {
        let (mut app, _transport) = service();
        let fired = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&fired);

        let ret = app.call_api(
            "chooseImage",
            json!({}),
            Callbacks::new().on_complete(move || *flag.borrow_mut() = true),
        );
        assert!(matches!(ret, AsyncReturn::Callbacks));

        assert!(app.cancel(1));
        app.handle_response(InvokeResponse::ok(1, json!({})));
        assert!(!*fired.borrow());
    }

    #[test]
    fn cancelled_future_is_abandoned() {
        let (mut app, _transport) = service();
        let future = app
            .call_api("chooseImage", json!({}), Callbacks::new())
            .into_future()
            .expect("future");

        app.cancel(1);
        assert_eq!(block_on(future), Err(CallError::Abandoned));
    }

    #[test]
    fn future_resolves_from_response() {
        let (mut app, _transport) = service();
        let future = app
            .call_api("getLocation", json!({"type": "wgs84"}), Callbacks::new())
            .into_future()
            .expect("future");

        app.handle_response(InvokeResponse::fail(1, "getLocation:fail auth deny"));
        assert_eq!(
            block_on(future),
            Err(CallError::Fail("getLocation:fail auth deny".to_string()))
        );
    }

    #[test]
    fn begin_mount_renders_and_flushes_one_patch() {
        let (mut app, transport) = service();
        app.handle_publish(
            PAGE_BEGIN_MOUNT,
            &json!({"pageId": 3, "path": "pages/index/index?id=9"}),
        );

        let page = app.page(3).expect("mounted page");
        assert_eq!(page.state(), PageState::Mounted);
        assert_eq!(page.query.get("id"), Some(&json!("9")));
        assert_eq!(app.current_page_id(), 3);

        assert_eq!(app.run_tick().expect("tick"), 1);
        let sent = transport.drain();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            ServiceEnvelope::Patch(patch) => {
                assert_eq!(patch.page_id, 3);
                assert_eq!(
                    patch.commands[1],
                    crate::command::DomCommand::SetAttribute {
                        node_id: 1,
                        name: "id".to_string(),
                        value: json!("app"),
                    }
                );
            }
            other => panic!("expected patch, got {other:?}"),
        }

        assert_eq!(app.run_tick().expect("idle tick"), 0);
    }

    #[test]
    fn unknown_route_mounts_nothing() {
        let (mut app, _transport) = service();
        assert!(!app.mount_page(1, "pages/missing/missing"));
        assert!(app.page(1).is_none());
    }

    #[test]
    fn click_sets_user_gesture_flag_only_during_handlers() {
        let (mut app, _transport) = service();
        app.mount_page(1, "pages/index/index");

        let click = |kind: &str| DispatchEventMessage {
            page_id: 1,
            node_id: 2,
            event: EventDescriptor::new(kind),
        };

        app.dispatch_event(click("click"));
        app.dispatch_event(click("input"));
        assert!(!app.is_event_from_user_click());

        let node = app.page(1).and_then(|page| page.document.node(2)).expect("button");
        assert_eq!(node.attributes.get("data-clicked"), Some(&json!(true)));
        assert_eq!(node.attributes.get("data-input-trusted"), Some(&json!(false)));
    }

    #[test]
    fn dispatch_after_unmount_is_a_no_op() {
        let (mut app, transport) = service();
        app.mount_page(1, "pages/index/index");
        app.handle_publish(PAGE_UNMOUNT, &json!({"pageId": 1}));

        assert!(app.page(1).is_none());
        app.dispatch_event(DispatchEventMessage {
            page_id: 1,
            node_id: 2,
            event: EventDescriptor::new("click"),
        });

        assert_eq!(app.run_tick().expect("tick"), 0);
        assert!(transport.is_empty());
    }

    #[test]
    fn current_pages_follow_the_tab() {
        let (mut app, _transport) = service();
        app.mount_page(4, "pages/index/index");
        app.mount_page(2, "pages/index/index");
        app.handle_publish(APP_SET_TAB_INDEX, &json!({"tabIndex": 1}));
        app.mount_page(9, "pages/index/index");

        assert_eq!(app.get_current_pages(), vec![9]);
        app.set_current_tab_index(0);
        assert_eq!(app.get_current_pages(), vec![2, 4]);
        assert_eq!(app.current_web_view_id(), Some(4));
    }

    #[test]
    fn show_and_hide_drive_visibility() {
        let (mut app, _transport) = service();
        app.mount_page(1, "pages/index/index");
        app.mount_page(2, "pages/index/index");

        app.handle_publish(PAGE_SHOW, &json!({"pageId": 1}));
        assert!(app.page(1).is_some_and(Page::is_visible));
        assert_eq!(app.current_page_id(), 1);

        app.handle_publish(PAGE_HIDE, &json!({"pageId": 1}));
        assert_eq!(app.page(1).map(Page::state), Some(PageState::Hidden));
    }

    #[test]
    fn app_show_and_hide_reach_the_bus() {
        let (mut app, _transport) = service();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        app.bus().on(APP_HIDE, move |_| sink.borrow_mut().push("hide"));

        app.handle_publish(APP_HIDE, &json!({}));
        assert_eq!(app.app_state(), AppState::Background);
        app.handle_publish(APP_SHOW, &json!({}));
        assert_eq!(app.app_state(), AppState::Foreground);
        assert_eq!(*seen.borrow(), vec!["hide"]);
    }

    #[test]
    fn keyboard_publishes_are_forwarded() {
        let (mut app, _transport) = service();
        let count = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&count);
        app.bus().on(KEYBOARD_ON_SHOW, move |_| *counter.borrow_mut() += 1);

        app.handle_publish(KEYBOARD_ON_SHOW, &json!({"inputId": 1}));
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn canvas_commands_flush_as_canvas_message() {
        let (mut app, transport) = service();
        app.mount_page(1, "pages/index/index");
        app.run_tick().expect("initial tick");
        transport.drain();

        let canvas = app
            .document_mut(1)
            .map(|doc| doc.create_element("canvas"))
            .expect("page");
        if let Some(ctx) = app.canvas_context(1, canvas) {
            ctx.set_fill_style("red");
            ctx.fill_rect(0.0, 0.0, 4.0, 4.0);
        }

        assert_eq!(app.run_tick().expect("tick"), 2);
        let sent = transport.drain();
        assert!(matches!(&sent[0], ServiceEnvelope::Patch(_)));
        assert!(
            matches!(&sent[1], ServiceEnvelope::Canvas(message) if message.node_id == canvas && message.commands.len() == 2)
        );
    }
}
