//! In-process stand-in for the native layer.
//!
//! `Loopback` sits between one [`AppService`] and one [`UiContext`], routing
//! envelopes the way the native shell does: patches to the web view,
//! interactions back to the service, capability calls to a
//! [`CapabilityDispatcher`]. It also keeps the page stack, so navigation
//! calls mount and unmount pages.

use crate::callback::CallResult;
use crate::protocol::{
    CallId, EventDescriptor, InvokeRequest, InvokeResponse, MemoryTransport, NativeEnvelope,
    NodeId, PageId, ServiceEnvelope, WebViewInbound, WebViewOutbound,
};
use crate::router::{NAVIGATE_BACK, NAVIGATE_TO, RE_LAUNCH, REDIRECT_TO};
use crate::service::{AppService, PAGE_BEGIN_MOUNT, PAGE_HIDE, PAGE_SHOW, PAGE_UNMOUNT};
use crate::webview::UiContext;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

/// What native does with one capability call.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Now(CallResult),
    Deferred,
    Ignore,
}

pub trait CapabilityDispatcher {
    fn dispatch(&mut self, event: &str, params: &Value) -> Reply;
}

impl<F> CapabilityDispatcher for F
where
    F: FnMut(&str, &Value) -> Reply,
{
    fn dispatch(&mut self, event: &str, params: &Value) -> Reply {
        self(event, params)
    }
}

pub struct Loopback<D> {
    from_service: MemoryTransport<ServiceEnvelope>,
    from_ui: MemoryTransport<WebViewOutbound>,
    to_service: VecDeque<NativeEnvelope>,
    ui: UiContext<MemoryTransport<WebViewOutbound>>,
    dispatcher: D,
    deferred: HashMap<CallId, InvokeRequest>,
    stack: Vec<PageId>,
    next_page_id: PageId,
    sid: Option<String>,
}

impl<D: CapabilityDispatcher> Loopback<D> {
    pub fn new(dispatcher: D) -> Self {
        let from_ui = MemoryTransport::new();
        Self {
            from_service: MemoryTransport::new(),
            ui: UiContext::new(from_ui.clone()),
            from_ui,
            to_service: VecDeque::new(),
            dispatcher,
            deferred: HashMap::new(),
            stack: Vec::new(),
            next_page_id: 1,
            sid: None,
        }
    }

    pub fn service_transport(&self) -> MemoryTransport<ServiceEnvelope> {
        self.from_service.clone()
    }

    pub fn ui(&self) -> &UiContext<MemoryTransport<WebViewOutbound>> {
        &self.ui
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    pub fn page_stack(&self) -> &[PageId] {
        &self.stack
    }

    pub fn session_id(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn deferred_calls(&self) -> Vec<CallId> {
        let mut ids: Vec<CallId> = self.deferred.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn publish(&mut self, app: &mut AppService, channel: &str, payload: Value) {
        self.queue_publish(channel, payload);
        self.pump(app);
    }

    pub fn begin_mount(&mut self, app: &mut AppService, path: &str) -> PageId {
        let page_id = self.queue_mount(path);
        self.pump(app);
        page_id
    }

    pub fn unmount(&mut self, app: &mut AppService, page_id: PageId) {
        self.queue_unmount(page_id);
        self.pump(app);
    }

    /// A user click on a rendered node. False when the node is not rendered.
    pub fn tap(&mut self, app: &mut AppService, page_id: PageId, node_id: NodeId) -> bool {
        self.interact(app, page_id, node_id, EventDescriptor::new("click"))
    }

    pub fn interact(
        &mut self,
        app: &mut AppService,
        page_id: PageId,
        node_id: NodeId,
        event: EventDescriptor,
    ) -> bool {
        let sent = match self.ui.dispatch_event(page_id, node_id, event) {
            Ok(sent) => sent,
            Err(err) => {
                warn!(page_id, node_id, "interaction not sent: {err}");
                false
            }
        };
        self.pump(app);
        sent
    }

    /// Answers a deferred call. Returns false when `call_id` was not waiting.
    pub fn complete(&mut self, app: &mut AppService, call_id: CallId, result: CallResult) -> bool {
        let Some(request) = self.deferred.remove(&call_id) else {
            debug!(call_id, "completion for unknown deferred call");
            return false;
        };

        self.respond(&request, call_id, result);
        self.pump(app);
        true
    }

    /// Routes envelopes until both contexts are idle. Returns how many
    /// envelopes moved.
    pub fn pump(&mut self, app: &mut AppService) -> usize {
        let mut total = 0;

        loop {
            let mut moved = 0;

            for envelope in self.from_service.drain() {
                moved += 1;
                self.route_from_service(envelope);
            }

            for envelope in self.from_ui.drain() {
                moved += 1;
                match envelope {
                    WebViewOutbound::Dispatch(message) => {
                        self.to_service.push_back(NativeEnvelope::Dispatch(message));
                    }
                    WebViewOutbound::Ready { page_id } => debug!(page_id, "web view ready"),
                }
            }

            while let Some(envelope) = self.to_service.pop_front() {
                moved += 1;
                app.handle_envelope(envelope);
            }

            if let Err(err) = app.run_tick() {
                warn!("tick flush failed: {err}");
            }

            if moved == 0 && self.from_service.is_empty() {
                return total;
            }
            total += moved;
        }
    }

    fn route_from_service(&mut self, envelope: ServiceEnvelope) {
        match envelope {
            ServiceEnvelope::Ready { sid, .. } => {
                info!(sid = sid.as_str(), "service ready");
                self.sid = Some(sid);
            }
            ServiceEnvelope::Invoke(request) => self.route_invoke(request),
            ServiceEnvelope::Patch(patch) => self.ui.handle_inbound(WebViewInbound::Patch(patch)),
            ServiceEnvelope::Canvas(message) => {
                self.ui.handle_inbound(WebViewInbound::Canvas(message))
            }
        }
    }

    fn route_invoke(&mut self, request: InvokeRequest) {
        let reply = self.dispatcher.dispatch(&request.event, &request.params);

        let Some(call_id) = request.call_id else {
            debug!(event = request.event.as_str(), "notification delivered");
            return;
        };

        match reply {
            Reply::Now(result) => self.respond(&request, call_id, result),
            Reply::Deferred => {
                self.deferred.insert(call_id, request);
            }
            Reply::Ignore => debug!(call_id, "call left unanswered"),
        }
    }

    fn respond(&mut self, request: &InvokeRequest, call_id: CallId, result: CallResult) {
        if result.is_ok() {
            self.apply_navigation(&request.event, &request.params);
        }
        self.to_service
            .push_back(NativeEnvelope::Response(InvokeResponse::from_result(call_id, result)));
    }

    fn apply_navigation(&mut self, event: &str, params: &Value) {
        let url = params.get("url").and_then(Value::as_str);

        match (event, url) {
            (NAVIGATE_TO, Some(url)) => {
                self.queue_mount(url);
            }
            (REDIRECT_TO, Some(url)) => {
                if let Some(top) = self.stack.last().copied() {
                    self.queue_unmount(top);
                }
                self.queue_mount(url);
            }
            (RE_LAUNCH, Some(url)) => {
                for page_id in self.stack.clone().into_iter().rev() {
                    self.queue_unmount(page_id);
                }
                self.queue_mount(url);
            }
            (NAVIGATE_BACK, _) => {
                let delta = params.get("delta").and_then(Value::as_u64).unwrap_or(1) as usize;
                let keep = self.stack.len().saturating_sub(delta).max(1);
                while self.stack.len() > keep {
                    if let Some(top) = self.stack.last().copied() {
                        self.queue_unmount(top);
                    }
                }
                if let Some(top) = self.stack.last().copied() {
                    self.queue_publish(PAGE_SHOW, json!({"pageId": top}));
                }
            }
            _ => {}
        }
    }

    fn queue_mount(&mut self, path: &str) -> PageId {
        let page_id = self.next_page_id;
        self.next_page_id += 1;

        if let Some(previous) = self.stack.last().copied() {
            self.queue_publish(PAGE_HIDE, json!({"pageId": previous}));
        }
        self.stack.push(page_id);

        if let Err(err) = self.ui.ready(page_id) {
            warn!(page_id, "web view ready not sent: {err}");
        }
        self.queue_publish(PAGE_BEGIN_MOUNT, json!({"pageId": page_id, "path": path}));
        self.queue_publish(PAGE_SHOW, json!({"pageId": page_id}));
        page_id
    }

    fn queue_unmount(&mut self, page_id: PageId) {
        self.stack.retain(|id| *id != page_id);
        self.ui.remove_page(page_id);
        self.queue_publish(PAGE_UNMOUNT, json!({"pageId": page_id}));
    }

    fn queue_publish(&mut self, channel: &str, payload: Value) {
        self.to_service.push_back(NativeEnvelope::Publish {
            channel: channel.to_string(),
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::Callbacks;
    use crate::registry::{PageComponent, RouteTable};
    use crate::request::CANCEL_REQUEST;
    use crate::tree::TEXT_TAG;
    use crate::vdom::PageDocument;
    use serde_json::Map;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    struct Counter;

    impl PageComponent for Counter {
        fn render(&self, doc: &mut PageDocument, root: NodeId, query: &Map<String, Value>) {
            let start: i64 = query
                .get("start")
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(0);
            let count = Rc::new(Cell::new(start));

            let button = doc.create_element("button");
            let label = doc.create_text(&start.to_string());
            doc.append_child(button, label);
            doc.append_child(root, button);

            doc.add_event_listener(button, "click", move |app, event| {
                count.set(count.get() + 1);
                if let Some(doc) = app.document_mut(event.page_id) {
                    doc.set_text(label, &count.get().to_string());
                }
            });
        }
    }

    fn routes() -> RouteTable {
        RouteTable::new()
            .with_route("pages/counter/counter", Counter)
            .with_route("pages/detail/detail", Counter)
    }

    fn setup<D: CapabilityDispatcher>(dispatcher: D) -> (Loopback<D>, AppService) {
        let loopback = Loopback::new(dispatcher);
        let app = AppService::new(loopback.service_transport(), routes());
        (loopback, app)
    }

    fn button_label(loopback: &Loopback<impl CapabilityDispatcher>, page_id: PageId) -> String {
        loopback
            .ui()
            .document(page_id)
            .map(|doc| doc.tree().text_content(2))
            .unwrap_or_default()
    }

    fn defer_all(_: &str, _: &Value) -> Reply {
        Reply::Deferred
    }

    fn accept_all(_: &str, _: &Value) -> Reply {
        Reply::Now(Ok(json!({})))
    }

    #[test]
    fn ready_reaches_native() {
        let (mut loopback, mut app) = setup(accept_all);
        app.ready("S9".to_string()).expect("ready");
        loopback.pump(&mut app);
        assert_eq!(loopback.session_id(), Some("S9"));
    }

    #[test]
    fn mount_renders_into_the_web_view() {
        let (mut loopback, mut app) = setup(accept_all);
        let page_id = loopback.begin_mount(&mut app, "pages/counter/counter?start=5");

        let tree = loopback.ui().document(page_id).expect("live page").tree();
        assert_eq!(tree.roots(), vec![1]);
        assert_eq!(
            tree.get(1).and_then(|root| root.attributes.get("id").cloned()),
            Some(json!("app"))
        );
        assert_eq!(tree.get(3).map(|node| node.tag_name.as_str()), Some(TEXT_TAG));
        assert_eq!(button_label(&loopback, page_id), "5");
        assert!(app.page(page_id).is_some_and(|page| page.is_visible()));
    }

    #[test]
    fn tap_round_trips_through_both_contexts() {
        let (mut loopback, mut app) = setup(accept_all);
        let page_id = loopback.begin_mount(&mut app, "pages/counter/counter");

        assert!(loopback.tap(&mut app, page_id, 2));
        assert!(loopback.tap(&mut app, page_id, 2));
        assert_eq!(button_label(&loopback, page_id), "2");

        assert_eq!(
            app.page(page_id).map(|page| page.document.tree().clone()),
            loopback.ui().document(page_id).map(|doc| doc.tree().clone())
        );
    }

    #[test]
    fn stale_dispatch_after_unmount_is_dropped() {
        let (mut loopback, mut app) = setup(accept_all);
        let page_id = loopback.begin_mount(&mut app, "pages/counter/counter");
        loopback.unmount(&mut app, page_id);

        assert!(!loopback.tap(&mut app, page_id, 2));

        // Native may still deliver an interaction captured before the unmount.
        app.handle_envelope(NativeEnvelope::Dispatch(crate::protocol::DispatchEventMessage {
            page_id,
            node_id: 2,
            event: EventDescriptor::new("click"),
        }));
        assert_eq!(loopback.pump(&mut app), 0);
        assert!(app.page(page_id).is_none());
    }

    #[test]
    fn login_response_resolves_call_seven_only() {
        let (mut loopback, mut app) = setup(defer_all);
        for _ in 0..6 {
            app.notify("reportAnalytics", json!({})).expect("notify");
            let call_id = app.invoke("noop", json!({}), |_, _| {}).expect("invoke");
            app.cancel(call_id);
        }
        loopback.pump(&mut app);

        let log = Rc::new(RefCell::new(Vec::new()));
        let success = Rc::clone(&log);
        let complete = Rc::clone(&log);
        app.call_api(
            "login",
            json!({}),
            Callbacks::new()
                .on_success(move |data| success.borrow_mut().push(format!("success {data}")))
                .on_complete(move || complete.borrow_mut().push("complete".to_string())),
        );
        let other = Rc::new(Cell::new(false));
        let other_flag = Rc::clone(&other);
        app.call_api(
            "login",
            json!({}),
            Callbacks::new().on_complete(move || other_flag.set(true)),
        );
        loopback.pump(&mut app);
        assert!(loopback.deferred_calls().ends_with(&[7, 8]));

        assert!(loopback.complete(&mut app, 7, Ok(json!({"code": "abc"}))));
        assert_eq!(
            *log.borrow(),
            vec![r#"success {"code":"abc"}"#.to_string(), "complete".to_string()]
        );
        assert!(!other.get());
        assert!(app.is_pending(8));
        assert!(!loopback.complete(&mut app, 7, Ok(json!({}))));
    }

    #[test]
    fn contended_navigation_leaves_first_in_charge() {
        let (mut loopback, mut app) = setup(defer_all);
        let home = loopback.begin_mount(&mut app, "pages/counter/counter");
        assert_eq!(app.current_page_id(), home);

        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        app.navigate_to(json!({"url": "pages/detail/detail?start=1"}), Callbacks::new());
        app.navigate_to(
            json!({"url": "pages/detail/detail?start=2"}),
            Callbacks::new().on_fail(move |err| sink.borrow_mut().push(err)),
        );
        loopback.pump(&mut app);

        assert_eq!(errors.borrow().len(), 1);
        assert!(errors.borrow()[0].starts_with("navigateTo:fail navigation in progress"));
        assert_eq!(app.current_page_id(), home);
        assert_eq!(loopback.deferred_calls(), vec![1]);

        loopback.complete(&mut app, 1, Ok(json!({})));
        assert!(!app.router_lock());
        let detail = app.current_page_id();
        assert_ne!(detail, home);
        assert_eq!(loopback.page_stack(), &[home, detail]);
        assert_eq!(button_label(&loopback, detail), "1");
        assert_eq!(app.query().get("start"), Some(&json!("1")));
        assert_eq!(
            app.page(home).map(|page| page.state()),
            Some(crate::registry::PageState::Hidden)
        );
    }

    #[test]
    fn navigate_back_unmounts_the_top_page() {
        let (mut loopback, mut app) = setup(accept_all);
        let home = loopback.begin_mount(&mut app, "pages/counter/counter");
        app.navigate_to(json!({"url": "pages/detail/detail"}), Callbacks::new());
        loopback.pump(&mut app);
        let detail = app.current_page_id();
        assert_ne!(detail, home);

        app.navigate_back(Value::Null, Callbacks::new());
        loopback.pump(&mut app);

        assert_eq!(loopback.page_stack(), &[home]);
        assert!(app.page(detail).is_none());
        assert!(loopback.ui().document(detail).is_none());
        assert_eq!(app.current_page_id(), home);
        assert!(app.page(home).is_some_and(|page| page.is_visible()));
    }

    #[test]
    fn re_launch_clears_the_stack() {
        let (mut loopback, mut app) = setup(accept_all);
        loopback.begin_mount(&mut app, "pages/counter/counter");
        loopback.begin_mount(&mut app, "pages/detail/detail");

        app.re_launch(json!({"url": "pages/counter/counter"}), Callbacks::new());
        loopback.pump(&mut app);

        assert_eq!(loopback.page_stack().len(), 1);
        assert_eq!(app.get_current_pages(), loopback.page_stack().to_vec());
    }

    #[test]
    fn aborted_request_never_calls_back() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let dispatcher = move |event: &str, params: &Value| {
            log.borrow_mut().push((event.to_string(), params.clone()));
            if event == "request" {
                Reply::Deferred
            } else {
                Reply::Now(Ok(Value::Null))
            }
        };
        let (mut loopback, mut app) = setup(dispatcher);

        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let (task, _) = app.request(
            json!({"url": "https://example.com/data"}),
            Callbacks::new().on_complete(move || flag.set(true)),
        );
        loopback.pump(&mut app);

        app.abort(&task);
        loopback.pump(&mut app);
        let call_id = task.call_id().expect("request sent");
        loopback.complete(&mut app, call_id, Ok(json!({"statusCode": 200})));

        assert!(!fired.get());
        assert_eq!(
            seen.borrow().last(),
            Some(&(CANCEL_REQUEST.to_string(), json!({"taskId": task.task_id})))
        );
    }
}
