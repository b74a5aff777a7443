use crate::protocol::{NodeId, PageId};
use crate::vdom::PageDocument;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppState {
    #[default]
    Foreground,
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Mounting,
    Mounted,
    Visible,
    Hidden,
    Unmounting,
    Destroyed,
}

impl PageState {
    pub fn can_transition(self, next: PageState) -> bool {
        use PageState::*;

        matches!(
            (self, next),
            (Mounting, Mounted)
                | (Mounted, Visible)
                | (Mounted, Hidden)
                | (Visible, Hidden)
                | (Hidden, Visible)
                | (Mounted, Unmounting)
                | (Visible, Unmounting)
                | (Hidden, Unmounting)
                | (Unmounting, Destroyed)
        )
    }
}

/// The renderer of one route. `render` builds the initial tree under `root`
/// and registers handlers; later updates come from those handlers.
pub trait PageComponent {
    fn render(&self, doc: &mut PageDocument, root: NodeId, query: &Map<String, Value>);

    fn unmounted(&self, _page_id: PageId) {}

    fn on_show(&self, _page_id: PageId) {}

    fn on_hide(&self, _page_id: PageId) {}
}

pub struct Page {
    pub page_id: PageId,
    pub route: String,
    pub query: Map<String, Value>,
    pub tab_index: usize,
    pub root: NodeId,
    pub document: PageDocument,
    pub(crate) component: Rc<dyn PageComponent>,
    state: PageState,
}

impl Page {
    pub(crate) fn new(
        document: PageDocument,
        route: String,
        query: Map<String, Value>,
        tab_index: usize,
        component: Rc<dyn PageComponent>,
    ) -> Self {
        Self {
            page_id: document.page_id(),
            route,
            query,
            tab_index,
            root: 0,
            document,
            component,
            state: PageState::Mounting,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn is_visible(&self) -> bool {
        self.state == PageState::Visible
    }

    /// Moves to `next` when the lifecycle allows it. Repeating the current
    /// state is accepted as a no-op.
    pub fn transition(&mut self, next: PageState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition(next) {
            return false;
        }
        self.state = next;
        true
    }
}

#[derive(Default)]
pub struct PageRegistry {
    pages: BTreeMap<PageId, Page>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, page: Page) {
        self.pages.insert(page.page_id, page);
    }

    pub fn get(&self, page_id: PageId) -> Option<&Page> {
        self.pages.get(&page_id)
    }

    pub fn get_mut(&mut self, page_id: PageId) -> Option<&mut Page> {
        self.pages.get_mut(&page_id)
    }

    pub fn remove(&mut self, page_id: PageId) -> Option<Page> {
        self.pages.remove(&page_id)
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains_key(&page_id)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages_on_tab(&self, tab_index: usize) -> Vec<PageId> {
        self.pages
            .values()
            .filter(|page| page.tab_index == tab_index)
            .map(|page| page.page_id)
            .collect()
    }
}

#[derive(Default, Clone)]
pub struct RouteTable {
    routes: HashMap<String, Rc<dyn PageComponent>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, route: &str, component: impl PageComponent + 'static) {
        self.routes
            .insert(normalize_route(route).to_string(), Rc::new(component));
    }

    pub fn with_route(mut self, route: &str, component: impl PageComponent + 'static) -> Self {
        self.register(route, component);
        self
    }

    pub fn lookup(&self, route: &str) -> Option<Rc<dyn PageComponent>> {
        self.routes.get(normalize_route(route)).cloned()
    }

    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

/// Routes are stored without a leading slash, so `/pages/a` and `pages/a`
/// name the same page.
pub fn normalize_route(route: &str) -> &str {
    route.trim_start_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch_queue::FlushScheduler;

    struct Blank;

    impl PageComponent for Blank {
        fn render(&self, _doc: &mut PageDocument, _root: NodeId, _query: &Map<String, Value>) {}
    }

    fn page(page_id: PageId, tab_index: usize) -> Page {
        let scheduler = Rc::new(FlushScheduler::new());
        Page::new(
            PageDocument::new(page_id, scheduler),
            "pages/index/index".to_string(),
            Map::new(),
            tab_index,
            Rc::new(Blank),
        )
    }

    #[test]
    fn lifecycle_follows_allowed_edges() {
        let mut page = page(1, 0);
        assert_eq!(page.state(), PageState::Mounting);
        assert!(!page.transition(PageState::Visible));
        assert!(page.transition(PageState::Mounted));
        assert!(page.transition(PageState::Visible));
        assert!(page.is_visible());
        assert!(page.transition(PageState::Hidden));
        assert!(page.transition(PageState::Visible));
        assert!(page.transition(PageState::Unmounting));
        assert!(!page.transition(PageState::Visible));
        assert!(page.transition(PageState::Destroyed));
    }

    #[test]
    fn pages_on_tab_are_sorted_by_id() {
        let mut registry = PageRegistry::new();
        registry.insert(page(5, 0));
        registry.insert(page(2, 0));
        registry.insert(page(3, 1));

        assert_eq!(registry.pages_on_tab(0), vec![2, 5]);
        assert_eq!(registry.pages_on_tab(1), vec![3]);
    }

    #[test]
    fn route_lookup_ignores_leading_slash() {
        let routes = RouteTable::new().with_route("/pages/index/index", Blank);
        assert!(routes.lookup("pages/index/index").is_some());
        assert!(routes.lookup("/pages/index/index").is_some());
        assert!(routes.lookup("pages/missing").is_none());
    }
}
