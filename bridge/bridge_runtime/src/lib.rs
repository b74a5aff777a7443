pub mod callback;
pub mod canvas;
pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod host;
pub mod loopback;
pub mod patch_queue;
pub mod protocol;
pub mod registry;
pub mod request;
pub mod router;
pub mod service;
pub mod tree;
pub mod vdom;
pub mod webview;

pub use crate::callback::{AsyncReturn, CallResult, Callbacks, Responder};
pub use crate::canvas::{CanvasContext, PaintStyle};
pub use crate::command::{CanvasCommand, DomCommand, Gradient, ImageData, Pattern};
pub use crate::config::HostConfig;
pub use crate::error::{BridgeError, CallError};
pub use crate::protocol::{
    CallId, NATIVE_TO_SERVICE_CAP, NativeEnvelope, NodeId, PageId, SERVICE_TO_NATIVE_CAP,
    ServiceEnvelope, WebViewInbound, WebViewOutbound,
};
pub use crate::registry::{PageComponent, RouteTable};
pub use crate::request::RequestTask;
pub use crate::service::AppService;
pub use crate::vdom::{DomEvent, PageDocument};
pub use crate::webview::UiContext;
pub use serde_json;
