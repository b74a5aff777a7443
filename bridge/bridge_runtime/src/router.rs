//! Navigation calls and the router lock.
//!
//! Each navigation takes the lock before it reaches native and releases it in
//! the response handler, whatever the outcome. A second navigation issued in
//! between fails at once and touches nothing.

use crate::callback::{AsyncReturn, Callbacks, Responder, fail_message, ok_message};
use crate::service::AppService;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

pub const NAVIGATE_TO: &str = "navigateTo";
pub const REDIRECT_TO: &str = "redirectTo";
pub const RE_LAUNCH: &str = "reLaunch";
pub const SWITCH_TAB: &str = "switchTab";
pub const NAVIGATE_BACK: &str = "navigateBack";

pub const ROUTER_LOCKED_REASON: &str =
    "navigation in progress, wait for the current page to open";
pub const EMPTY_URL_REASON: &str = "options url can not be empty";

impl AppService {
    pub fn navigate_to(&mut self, options: Value, callbacks: Callbacks) -> AsyncReturn {
        self.navigate_with_url(NAVIGATE_TO, options, callbacks)
    }

    pub fn redirect_to(&mut self, options: Value, callbacks: Callbacks) -> AsyncReturn {
        self.navigate_with_url(REDIRECT_TO, options, callbacks)
    }

    pub fn re_launch(&mut self, options: Value, callbacks: Callbacks) -> AsyncReturn {
        self.navigate_with_url(RE_LAUNCH, options, callbacks)
    }

    pub fn switch_tab(&mut self, options: Value, callbacks: Callbacks) -> AsyncReturn {
        self.navigate_with_url(SWITCH_TAB, options, callbacks)
    }

    /// Pops `delta` pages (default 1).
    pub fn navigate_back(&mut self, options: Value, callbacks: Callbacks) -> AsyncReturn {
        self.wrapper_async_api(options, json!({"delta": 1}), callbacks, |app, options, responder| {
            if app.router_lock() {
                responder.fail(fail_message(NAVIGATE_BACK, ROUTER_LOCKED_REASON));
                return;
            }

            let delta = options
                .get("delta")
                .and_then(Value::as_u64)
                .filter(|delta| *delta > 0)
                .unwrap_or(1);

            start_navigation(app, NAVIGATE_BACK, json!({"delta": delta}), responder, |_, _| {});
        })
    }

    fn navigate_with_url(&mut self, event: &'static str, options: Value, callbacks: Callbacks) -> AsyncReturn {
        self.wrapper_async_api(options, Value::Null, callbacks, move |app, options, responder| {
            if app.router_lock() {
                responder.fail(fail_message(event, ROUTER_LOCKED_REASON));
                return;
            }

            let url = options
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if url.is_empty() {
                responder.fail(fail_message(event, EMPTY_URL_REASON));
                return;
            }

            let query = url_get_query(&url);
            start_navigation(app, event, json!({"url": url}), responder, move |app, data| {
                match event {
                    NAVIGATE_TO => app.set_query(query),
                    SWITCH_TAB => {
                        if let Some(tab_index) = data.get("tabIndex").and_then(Value::as_u64) {
                            app.set_current_tab_index(tab_index as usize);
                        }
                    }
                    _ => {}
                }
            });
        })
    }
}

/// Takes the lock and sends `event`. `on_success` runs with the native data
/// before the caller's success callback.
fn start_navigation(
    app: &mut AppService,
    event: &'static str,
    params: Value,
    responder: Responder,
    on_success: impl FnOnce(&mut AppService, &Value) + 'static,
) {
    app.set_router_lock(true);
    debug!(event, "router locked");

    let sent = app.invoke(event, params, move |app, result| {
        app.set_router_lock(false);
        debug!(event, "router released");

        match result {
            Ok(data) => {
                on_success(app, &data);
                responder.succeed(json!({"errMsg": ok_message(event)}));
            }
            Err(err_msg) => responder.fail(err_msg),
        }
    });

    if let Err(err) = sent {
        warn!(event, "navigation not sent: {err}");
    }
}

pub fn decode_url(path: &str) -> (String, Map<String, Value>) {
    let route = path.split_once('?').map_or(path, |(route, _)| route);
    (route.to_string(), url_get_query(path))
}

/// Decodes the query string of `path`. `+` reads as a space and later keys
/// overwrite earlier ones.
pub fn url_get_query(path: &str) -> Map<String, Value> {
    let mut query = Map::new();
    let Some((_, search)) = path.split_once('?') else {
        return query;
    };

    for pair in search.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key.is_empty() {
            continue;
        }
        query.insert(decode_component(key), Value::String(decode_component(value)));
    }

    query
}

/// Percent-decoding of one query component. Malformed escapes are kept as
/// written and invalid UTF-8 is replaced.
fn decode_component(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(high), Some(low)) => {
                        out.push(high << 4 | low);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
