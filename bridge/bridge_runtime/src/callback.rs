//! Correlation of capability calls with their eventual responses, and the
//! success/fail/complete contract every async API exposes.
//!
//! A call resolves through a single [`Responder`]. The responder is consumed
//! by resolution, so a second resolution of the same call cannot be written.
//! It feeds either the caller's [`Callbacks`] or a [`CallFuture`], never both.

use crate::error::CallError;
use crate::protocol::CallId;
use futures::channel::oneshot;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pub type CallResult = Result<Value, String>;

pub type ResponseHandler<C> = Box<dyn FnOnce(&mut C, CallResult)>;

pub fn ok_message(event: &str) -> String {
    format!("{event}:ok")
}

pub fn fail_message(event: &str, reason: &str) -> String {
    format!("{event}:fail {reason}")
}

/// Pickers and requests report user or caller cancellation with a trailing
/// `cancel` / `abort` reason.
pub fn is_cancel(err_msg: &str) -> bool {
    let reason = err_msg.trim_end();
    reason.ends_with("cancel") || reason.ends_with("abort")
}

#[derive(Default)]
pub struct Callbacks {
    success: Option<Box<dyn FnOnce(Value)>>,
    fail: Option<Box<dyn FnOnce(String)>>,
    complete: Option<Box<dyn FnOnce()>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, f: impl FnOnce(Value) + 'static) -> Self {
        self.success = Some(Box::new(f));
        self
    }

    pub fn on_fail(mut self, f: impl FnOnce(String) + 'static) -> Self {
        self.fail = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce() + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.success.is_none() && self.fail.is_none() && self.complete.is_none()
    }

    fn fire(self, result: CallResult) {
        match result {
            Ok(data) => {
                if let Some(success) = self.success {
                    success(data);
                }
            }
            Err(err_msg) => {
                if let Some(fail) = self.fail {
                    fail(err_msg);
                }
            }
        }

        if let Some(complete) = self.complete {
            complete();
        }
    }
}

enum Target {
    Callbacks(Callbacks),
    Future(oneshot::Sender<CallResult>),
}

/// One-shot resolution handle for a single call. Dropping it unresolved fires
/// nothing; an attached future then completes with [`CallError::Abandoned`].
pub struct Responder {
    target: Target,
}

impl Responder {
    pub fn resolve(self, result: CallResult) {
        match self.target {
            Target::Callbacks(callbacks) => callbacks.fire(result),
            Target::Future(tx) => {
                // The awaiting side may already be gone; nothing to deliver then.
                let _ = tx.send(result);
            }
        }
    }

    pub fn succeed(self, data: Value) {
        self.resolve(Ok(data));
    }

    pub fn fail(self, err_msg: impl Into<String>) {
        self.resolve(Err(err_msg.into()));
    }
}

pub struct CallFuture {
    rx: oneshot::Receiver<CallResult>,
}

impl Future for CallFuture {
    type Output = Result<Value, CallError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(err_msg)) => Err(CallError::Fail(err_msg)),
            Err(oneshot::Canceled) => Err(CallError::Abandoned),
        })
    }
}

/// What an async API hands back: nothing when the caller supplied callbacks,
/// a future otherwise.
pub enum AsyncReturn {
    Callbacks,
    Future(CallFuture),
}

impl AsyncReturn {
    pub fn into_future(self) -> Option<CallFuture> {
        match self {
            AsyncReturn::Callbacks => None,
            AsyncReturn::Future(future) => Some(future),
        }
    }
}

impl std::fmt::Debug for AsyncReturn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AsyncReturn::Callbacks => f.write_str("AsyncReturn::Callbacks"),
            AsyncReturn::Future(_) => f.write_str("AsyncReturn::Future"),
        }
    }
}

pub fn responder_for(callbacks: Callbacks) -> (Responder, AsyncReturn) {
    if callbacks.is_empty() {
        let (tx, rx) = oneshot::channel();
        (
            Responder {
                target: Target::Future(tx),
            },
            AsyncReturn::Future(CallFuture { rx }),
        )
    } else {
        (
            Responder {
                target: Target::Callbacks(callbacks),
            },
            AsyncReturn::Callbacks,
        )
    }
}

/// Fills keys missing from `options` with the ones in `defaults`. Non-object
/// options are replaced by the defaults.
pub fn merge_defaults(options: Value, defaults: Value) -> Value {
    let Value::Object(defaults) = defaults else {
        return options;
    };

    let mut merged = match options {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    for (key, value) in defaults {
        merged.entry(key).or_insert(value);
    }

    Value::Object(merged)
}

/// Runs `executor` with merged options and the call's responder.
pub fn wrapper_async_api<F>(
    options: Value,
    defaults: Value,
    callbacks: Callbacks,
    executor: F,
) -> AsyncReturn
where
    F: FnOnce(Value, Responder),
{
    let (responder, ret) = responder_for(callbacks);
    executor(merge_defaults(options, defaults), responder);
    ret
}

struct PendingCall<C> {
    event: String,
    handler: ResponseHandler<C>,
}

pub struct PendingCalls<C> {
    next_call_id: CallId,
    pending: HashMap<CallId, PendingCall<C>>,
}

impl<C> Default for PendingCalls<C> {
    fn default() -> Self {
        Self {
            next_call_id: 1,
            pending: HashMap::new(),
        }
    }
}

impl<C> PendingCalls<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, event: impl Into<String>, handler: ResponseHandler<C>) -> CallId {
        let call_id = self.next_call_id;
        self.next_call_id = self.next_call_id.wrapping_add(1);
        self.pending.insert(
            call_id,
            PendingCall {
                event: event.into(),
                handler,
            },
        );
        call_id
    }

    /// Removes the record for `call_id`. The record is gone before the caller
    /// gets to run the handler.
    pub fn take(&mut self, call_id: CallId) -> Option<(String, ResponseHandler<C>)> {
        self.pending
            .remove(&call_id)
            .map(|pending| (pending.event, pending.handler))
    }

    pub fn cancel(&mut self, call_id: CallId) -> bool {
        self.pending.remove(&call_id).is_some()
    }

    pub fn is_pending(&self, call_id: CallId) -> bool {
        self.pending.contains_key(&call_id)
    }

    pub fn event_of(&self, call_id: CallId) -> Option<&str> {
        self.pending.get(&call_id).map(|pending| pending.event.as_str())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
