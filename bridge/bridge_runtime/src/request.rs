use crate::callback::{AsyncReturn, Callbacks, fail_message};
use crate::protocol::CallId;
use crate::service::AppService;
use serde_json::{Value, json};
use tracing::debug;

pub const REQUEST: &str = "request";
pub const CANCEL_REQUEST: &str = "cancelRequest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTask {
    pub task_id: u64,
    call_id: Option<CallId>,
}

impl RequestTask {
    pub fn call_id(&self) -> Option<CallId> {
        self.call_id
    }
}

fn request_defaults() -> Value {
    json!({
        "method": "GET",
        "header": {},
        "timeout": 60000,
        "data": "",
        "responseType": "text",
    })
}

impl AppService {
    /// Starts a request through the native network client. The response data
    /// carries `statusCode`, `header`, `cookies` and `data`.
    pub fn request(&mut self, options: Value, callbacks: Callbacks) -> (RequestTask, AsyncReturn) {
        let task_id = self.allocate_task_id();
        let mut call_id = None;

        let ret = self.wrapper_async_api(options, request_defaults(), callbacks, |app, mut params, responder| {
            let url = params.get("url").and_then(Value::as_str).unwrap_or_default();
            if url.is_empty() {
                responder.fail(fail_message(REQUEST, "url can not be empty"));
                return;
            }

            if let Value::Object(map) = &mut params {
                map.insert("taskId".to_string(), json!(task_id));
            }

            call_id = app
                .invoke(REQUEST, params, move |_, result| responder.resolve(result))
                .ok();
        });

        (RequestTask { task_id, call_id }, ret)
    }

    /// Stops waiting for `task`. Its callbacks never run; native is told to
    /// cancel the underlying work, whose late completion is discarded.
    pub fn abort(&mut self, task: &RequestTask) {
        let Some(call_id) = task.call_id else {
            return;
        };

        if !self.cancel(call_id) {
            debug!(task_id = task.task_id, "abort after completion ignored");
            return;
        }

        if let Err(err) = self.notify(CANCEL_REQUEST, json!({"taskId": task.task_id})) {
            debug!(task_id = task.task_id, "cancelRequest not sent: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use crate::protocol::{InvokeRequest, InvokeResponse, MemoryTransport, ServiceEnvelope};
    use crate::registry::RouteTable;
    use futures::executor::block_on;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn service() -> (AppService, MemoryTransport<ServiceEnvelope>) {
        let transport = MemoryTransport::new();
        (AppService::new(transport.clone(), RouteTable::new()), transport)
    }

    fn sent(transport: &MemoryTransport<ServiceEnvelope>) -> Vec<InvokeRequest> {
        transport
            .drain()
            .into_iter()
            .filter_map(|envelope| match envelope {
                ServiceEnvelope::Invoke(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn request_fills_defaults_and_task_id() {
        let (mut app, transport) = service();
        let (task, _) = app.request(json!({"url": "https://example.com"}), Callbacks::new());

        let requests = sent(&transport);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].event, REQUEST);
        assert_eq!(requests[0].call_id, task.call_id());
        assert_eq!(
            requests[0].params,
            json!({
                "url": "https://example.com",
                "method": "GET",
                "header": {},
                "timeout": 60000,
                "data": "",
                "responseType": "text",
                "taskId": task.task_id,
            })
        );
    }

    #[test]
    fn empty_url_fails_locally() {
        let (mut app, transport) = service();
        let (task, ret) = app.request(json!({"method": "POST"}), Callbacks::new());

        assert!(task.call_id().is_none());
        assert!(transport.is_empty());
        assert_eq!(
            block_on(ret.into_future().expect("future")),
            Err(CallError::Fail("request:fail url can not be empty".to_string()))
        );
    }

    #[test]
    fn abort_discards_late_completion() {
        let (mut app, transport) = service();
        let fired = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&fired);
        let (task, _) = app.request(
            json!({"url": "https://example.com"}),
            Callbacks::new().on_complete(move || *counter.borrow_mut() += 1),
        );
        transport.drain();

        app.abort(&task);
        let requests = sent(&transport);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].event, CANCEL_REQUEST);
        assert_eq!(requests[0].call_id, None);
        assert_eq!(requests[0].params, json!({"taskId": task.task_id}));

        if let Some(call_id) = task.call_id() {
            app.handle_response(InvokeResponse::ok(call_id, json!({"statusCode": 200})));
        }
        assert_eq!(*fired.borrow(), 0);
    }

    #[test]
    fn abort_after_completion_sends_nothing() {
        let (mut app, transport) = service();
        let (task, ret) = app.request(json!({"url": "https://example.com"}), Callbacks::new());
        let call_id = task.call_id().expect("sent request");
        transport.drain();

        app.handle_response(InvokeResponse::ok(call_id, json!({"statusCode": 204})));
        app.abort(&task);

        assert!(transport.is_empty());
        assert_eq!(
            block_on(ret.into_future().expect("future")),
            Ok(json!({"statusCode": 204}))
        );
    }

    #[test]
    fn task_ids_are_distinct() {
        let (mut app, _transport) = service();
        let (first, _) = app.request(json!({"url": "https://a"}), Callbacks::new());
        let (second, _) = app.request(json!({"url": "https://b"}), Callbacks::new());
        assert_ne!(first.task_id, second.task_id);
    }
}
