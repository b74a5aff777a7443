//! Pages bundled with the host binary.

use applet_bridge_runtime::serde_json::{Map, Value, json};
use applet_bridge_runtime::{Callbacks, NodeId, PageComponent, PageDocument, PageId, RouteTable};
use std::cell::Cell;
use std::rc::Rc;
use tracing::{info, warn};

pub const COUNTER_ROUTE: &str = "pages/counter/counter";
pub const DETAIL_ROUTE: &str = "pages/detail/detail";

pub fn routes() -> RouteTable {
    RouteTable::new()
        .with_route(COUNTER_ROUTE, CounterPage)
        .with_route(DETAIL_ROUTE, DetailPage)
}

/// A tap counter with a badge canvas and a link to the detail page.
struct CounterPage;

impl PageComponent for CounterPage {
    fn render(&self, doc: &mut PageDocument, root: NodeId, query: &Map<String, Value>) {
        let start: i64 = query
            .get("start")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        let count = Rc::new(Cell::new(start));

        let button = doc.create_element("button");
        doc.set_attribute(button, "class", "counter");
        let label = doc.create_text(&start.to_string());
        doc.append_child(button, label);
        doc.append_child(root, button);

        let badge = doc.create_element("canvas");
        doc.set_attribute(badge, "width", 32);
        doc.set_attribute(badge, "height", 32);
        doc.append_child(root, badge);
        if let Some(ctx) = doc.canvas_context(badge) {
            ctx.set_fill_style("#07c160");
            ctx.begin_path();
            ctx.arc(16.0, 16.0, 14.0, 0.0, std::f64::consts::TAU, false);
            ctx.fill();
        }

        let link = doc.create_element("navigator");
        let link_label = doc.create_text("details");
        doc.append_child(link, link_label);
        doc.append_child(root, link);

        doc.add_event_listener(button, "click", move |app, event| {
            count.set(count.get() + 1);
            if let Some(doc) = app.document_mut(event.page_id) {
                doc.set_text(label, &count.get().to_string());
            }
        });

        doc.add_event_listener(link, "click", |app, _| {
            let url = format!("/{DETAIL_ROUTE}?from=counter");
            app.navigate_to(
                json!({ "url": url }),
                Callbacks::new().on_fail(|err_msg| warn!("detail navigation failed: {err_msg}")),
            );
        });
    }

    fn on_show(&self, page_id: PageId) {
        info!(page_id, "counter page shown");
    }
}

/// Echoes its query and offers a way back.
struct DetailPage;

impl PageComponent for DetailPage {
    fn render(&self, doc: &mut PageDocument, root: NodeId, query: &Map<String, Value>) {
        let from = query.get("from").and_then(Value::as_str).unwrap_or("nowhere");
        let heading = doc.create_element("h1");
        let text = doc.create_text(&format!("opened from {from}"));
        doc.append_child(heading, text);
        doc.append_child(root, heading);

        let back = doc.create_element("button");
        let back_label = doc.create_text("back");
        doc.append_child(back, back_label);
        doc.append_child(root, back);

        doc.add_event_listener(back, "click", |app, _| {
            app.navigate_back(json!({}), Callbacks::new());
        });
    }

    fn unmounted(&self, page_id: PageId) {
        info!(page_id, "detail page unmounted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use applet_bridge_runtime::AppService;
    use applet_bridge_runtime::loopback::{Loopback, Reply};

    fn accept_all(_: &str, _: &Value) -> Reply {
        Reply::Now(Ok(json!({})))
    }

    #[test]
    fn counter_navigates_to_detail() {
        let mut loopback = Loopback::new(accept_all);
        let mut app = AppService::new(loopback.service_transport(), routes());

        let page_id = loopback.begin_mount(&mut app, COUNTER_ROUTE);
        assert_eq!(loopback.page_stack(), &[page_id]);

        let link = loopback
            .ui()
            .document(page_id)
            .and_then(|doc| {
                doc.tree()
                    .ids()
                    .find(|id| doc.tree().get(*id).is_some_and(|node| node.tag_name == "navigator"))
            })
            .expect("navigator rendered");
        assert!(loopback.tap(&mut app, page_id, link));

        assert_eq!(loopback.page_stack().len(), 2);
        assert_eq!(app.query().get("from"), Some(&json!("counter")));
    }
}
