use std::collections::VecDeque;

use ahash::{AHashMap, AHashSet};
use glam::Vec2;

use crate::*;

/// The event queue and redirect table of one window.
///
/// Events are delivered in the order they were posted. For each event:
/// 1. If a redirect is set for its kind, it goes to the redirect target and then up through its superviews. It never reaches its nominal `target`.
/// 2. Otherwise it goes to its `target` (if any) and then up through its superviews.
/// 3. If nobody stopped it, it's offered to every leaf view of the window, deepest first, each followed by its superviews.
///
/// Every view sees a given event at most once.
#[derive(Debug, Default)]
pub struct EventDispatch {
    events: VecDeque<Event>,
    redirects: AHashMap<EventKind, Redirect>,
    visited: AHashSet<ViewI>,
}

// A redirect remembers the serial of its target, so that it dies with it instead of following the slot to whatever view is created there next.
#[derive(Debug, Copy, Clone, PartialEq)]
struct Redirect {
    view: ViewI,
    serial: u64,
}

impl EventDispatch {
    pub fn new() -> Self {
        return Self::default();
    }

    pub fn post_event(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Routes every event of `kind` to `to` until the redirect is cleared by passing `None`, or until `to` is destroyed.
    pub fn redirect_events(&mut self, tree: &ViewTree, kind: EventKind, to: Option<ViewI>) {
        set_redirect(&mut self.redirects, tree, kind, to);
    }

    pub fn redirect_target(&self, tree: &ViewTree, kind: EventKind) -> Option<ViewI> {
        return live_redirect(&self.redirects, tree, kind);
    }

    pub fn pending_events(&self) -> usize {
        return self.events.len();
    }

    /// Delivers every queued event, including the ones posted by handlers while this runs.
    ///
    /// `deferred` collects the callbacks that handlers schedule with [`EventCx::defer`].
    pub fn dispatch_events(&mut self, tree: &mut ViewTree, root: ViewI, deferred: &mut Vec<Deferred>) {
        let EventDispatch { events, redirects, visited } = self;
        redirects.retain(|kind, redirect| {
            let live = tree.is_same_view(redirect.view, redirect.serial);
            if !live {
                log::debug!("Dropping redirect for {kind} to destroyed view {:?}", redirect.view);
            }
            return live;
        });

        while let Some(mut event) = events.pop_front() {
            visited.clear();
            log::trace!("Dispatching {event}");

            let mut router = Router {
                tree: &mut *tree,
                events: &mut *events,
                redirects: &mut *redirects,
                visited: &mut *visited,
                deferred: &mut *deferred,
            };

            let redirect = router.redirects.get(&event.kind()).copied();
            match redirect {
                Some(redirect) if router.tree.is_same_view(redirect.view, redirect.serial) => {
                    if let Some(nominal) = event.target {
                        router.visited.insert(nominal);
                    }
                    router.dispatch_upwards(redirect.view, &mut event);
                }
                Some(stale) => {
                    log::warn!("Dropping redirect for {} to destroyed view {:?}", event.kind(), stale.view);
                    router.redirects.remove(&event.kind());
                    router.dispatch_to_target(&mut event);
                }
                None => {
                    router.dispatch_to_target(&mut event);
                }
            }

            if !event.is_propagating() {
                continue;
            }

            let leaves: Vec<ViewI> = router.tree.leaf_views(root).iter().map(|leaf| leaf.view).collect();
            for leaf in leaves {
                router.dispatch_upwards(leaf, &mut event);
                if !event.is_propagating() {
                    break;
                }
            }
        }
    }
}

fn set_redirect(redirects: &mut AHashMap<EventKind, Redirect>, tree: &ViewTree, kind: EventKind, to: Option<ViewI>) {
    let Some(view) = to else {
        redirects.remove(&kind);
        return;
    };
    match tree.serial(view) {
        Some(serial) => {
            redirects.insert(kind, Redirect { view, serial });
        }
        None => {
            log::warn!("Not redirecting {kind} to {view:?}, it's not a live view");
            redirects.remove(&kind);
        }
    }
}

fn live_redirect(redirects: &AHashMap<EventKind, Redirect>, tree: &ViewTree, kind: EventKind) -> Option<ViewI> {
    let redirect = redirects.get(&kind)?;
    if !tree.is_same_view(redirect.view, redirect.serial) {
        return None;
    }
    return Some(redirect.view);
}

// The mutable state one dispatch step needs, split out of `EventDispatch` so that the queue can be popped while handlers post to it.
struct Router<'a> {
    tree: &'a mut ViewTree,
    events: &'a mut VecDeque<Event>,
    redirects: &'a mut AHashMap<EventKind, Redirect>,
    visited: &'a mut AHashSet<ViewI>,
    deferred: &'a mut Vec<Deferred>,
}

impl Router<'_> {
    fn dispatch_to_target(&mut self, event: &mut Event) {
        let Some(target) = event.target else {
            return;
        };
        if !self.tree.contains(target) {
            log::warn!("Event target {target:?} is not a live view, skipping it");
            return;
        }
        self.dispatch_upwards(target, event);
    }

    // Delivers to `start` and then to each of its superviews, skipping the ones that already saw the event.
    fn dispatch_upwards(&mut self, start: ViewI, event: &mut Event) {
        let mut current = Some(start);
        while let Some(view) = current {
            if !event.is_propagating() || !self.tree.contains(view) {
                return;
            }
            if self.visited.insert(view) {
                self.deliver(view, event);
            }
            current = match self.tree.contains(view) {
                true => self.tree.superview(view),
                false => None,
            };
        }
    }

    fn deliver(&mut self, view: ViewI, event: &mut Event) {
        let Some(mut widget) = self.tree.views[view].widget.take() else {
            return;
        };

        if let Some(handler) = widget.as_event_handler() {
            let mut cx = EventCx {
                tree: &mut *self.tree,
                view,
                events: &mut *self.events,
                redirects: &mut *self.redirects,
                deferred: &mut *self.deferred,
            };
            handler.handle_event(&mut cx, event);
        }

        // the handler might have destroyed its own view, or replaced its widget
        if let Some(node) = self.tree.views.get_mut(view) {
            if node.widget.is_none() {
                node.widget = Some(widget);
            }
        }
    }
}

/// Passed to [`EventHandler::handle_event`].
pub struct EventCx<'a> {
    pub tree: &'a mut ViewTree,
    pub view: ViewI,
    events: &'a mut VecDeque<Event>,
    redirects: &'a mut AHashMap<EventKind, Redirect>,
    deferred: &'a mut Vec<Deferred>,
}

impl EventCx<'_> {
    /// Routes every event of `kind` to `to` until the redirect is cleared by passing `None`, or until `to` is destroyed.
    pub fn redirect_events(&mut self, kind: EventKind, to: Option<ViewI>) {
        set_redirect(self.redirects, self.tree, kind, to);
    }

    pub fn redirect_target(&self, kind: EventKind) -> Option<ViewI> {
        return live_redirect(self.redirects, self.tree, kind);
    }

    /// Queues an event. It's delivered in this same dispatch pass, after the events that were already queued.
    pub fn post_event(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Runs `f` at the start of the next tick, when no dispatch is in progress.
    pub fn defer(&mut self, f: impl FnOnce(&mut Context) + 'static) {
        self.deferred.push(Box::new(f));
    }

    pub fn invalidate(&mut self) {
        self.tree.invalidate(self.view, None);
    }

    pub fn bounds(&self) -> Rect {
        return self.tree.bounds(self.view);
    }

    /// Converts a position carried by an event to the current view's coordinates.
    pub fn local_position(&self, root_position: Vec2) -> Vec2 {
        return self.tree.convert_from_root(self.view, root_position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<ViewI>>>;

    fn recorder(log: &Log, view: ViewI) -> impl Widget + 'static {
        let log = log.clone();
        return HandlerFn(move |_cx: &mut EventCx<'_>, _event: &mut Event| {
            log.borrow_mut().push(view);
        });
    }

    fn stopper(log: &Log, view: ViewI) -> impl Widget + 'static {
        let log = log.clone();
        return HandlerFn(move |_cx: &mut EventCx<'_>, event: &mut Event| {
            log.borrow_mut().push(view);
            event.stop_propagation();
        });
    }

    struct Fixture {
        tree: ViewTree,
        root: ViewI,
        a: ViewI,
        a1: ViewI,
        b: ViewI,
        log: Log,
    }

    // root
    // ├── a
    // │   └── a1
    // └── b
    fn fixture() -> Fixture {
        let mut tree = ViewTree::new();
        let root = tree.create_window_view(Rect::from_xywh(0.0, 0.0, 100.0, 100.0));
        let a = tree.create_view(Rect::from_xywh(0.0, 0.0, 50.0, 50.0));
        let a1 = tree.create_view(Rect::from_xywh(0.0, 0.0, 10.0, 10.0));
        let b = tree.create_view(Rect::from_xywh(50.0, 50.0, 50.0, 50.0));
        tree.add_view(root, a).unwrap();
        tree.add_view(a, a1).unwrap();
        tree.add_view(root, b).unwrap();

        let log = Log::default();
        for view in [root, a, a1, b] {
            tree.set_widget(view, recorder(&log, view));
        }
        return Fixture { tree, root, a, a1, b, log };
    }

    fn run(f: &mut Fixture, dispatch: &mut EventDispatch) -> Vec<Deferred> {
        let mut deferred = Vec::new();
        dispatch.dispatch_events(&mut f.tree, f.root, &mut deferred);
        return deferred;
    }

    #[test]
    fn targeted_events_walk_up_then_fall_back_to_leaves() {
        let mut f = fixture();
        let mut dispatch = EventDispatch::new();
        dispatch.post_event(Event::custom(None, "ping", ()).with_target(f.a1));
        run(&mut f, &mut dispatch);

        // a1 -> a -> root, then the leaf fallback only adds b
        assert_eq!(*f.log.borrow(), vec![f.a1, f.a, f.root, f.b]);
        assert_eq!(dispatch.pending_events(), 0);
    }

    #[test]
    fn untargeted_events_go_to_leaves_deepest_first() {
        let mut f = fixture();
        let mut dispatch = EventDispatch::new();
        dispatch.post_event(Event::custom(None, "ping", ()));
        run(&mut f, &mut dispatch);

        assert_eq!(*f.log.borrow(), vec![f.a1, f.a, f.root, f.b]);
    }

    #[test]
    fn stop_propagation_halts_all_further_delivery() {
        let mut f = fixture();
        f.tree.set_widget(f.a, stopper(&f.log, f.a));

        let mut dispatch = EventDispatch::new();
        dispatch.post_event(Event::custom(None, "ping", ()).with_target(f.a1));
        run(&mut f, &mut dispatch);

        assert_eq!(*f.log.borrow(), vec![f.a1, f.a]);
    }

    #[test]
    fn redirected_events_skip_the_nominal_target() {
        let mut f = fixture();
        let mut dispatch = EventDispatch::new();
        dispatch.redirect_events(&f.tree, EventKind::Custom("ping"), Some(f.b));
        dispatch.post_event(Event::custom(None, "ping", ()).with_target(f.a1));
        run(&mut f, &mut dispatch);

        let log = f.log.borrow();
        assert_eq!(log[0], f.b);
        assert!(!log.contains(&f.a1));
        // still delivered once to everyone else through the fallback
        assert_eq!(*log, vec![f.b, f.root, f.a]);
    }

    #[test]
    fn clearing_a_redirect_restores_normal_routing() {
        let mut f = fixture();
        let mut dispatch = EventDispatch::new();
        dispatch.redirect_events(&f.tree, EventKind::Custom("ping"), Some(f.b));
        dispatch.redirect_events(&f.tree, EventKind::Custom("ping"), None);
        assert_eq!(dispatch.redirect_target(&f.tree, EventKind::Custom("ping")), None);

        dispatch.post_event(Event::custom(None, "ping", ()).with_target(f.a1));
        run(&mut f, &mut dispatch);
        assert_eq!(f.log.borrow()[0], f.a1);
    }

    #[test]
    fn views_without_handlers_are_skipped() {
        let mut f = fixture();
        f.tree.views[f.a].widget = None;

        let mut dispatch = EventDispatch::new();
        dispatch.post_event(Event::custom(None, "ping", ()).with_target(f.a1));
        run(&mut f, &mut dispatch);

        assert_eq!(*f.log.borrow(), vec![f.a1, f.root, f.b]);
    }

    #[test]
    fn handlers_can_post_redirect_and_defer() {
        let mut f = fixture();
        let b = f.b;
        let log = f.log.clone();
        f.tree.set_widget(f.a1, HandlerFn(move |cx: &mut EventCx<'_>, event: &mut Event| {
            log.borrow_mut().push(cx.view);
            if event.kind() == EventKind::Custom("first") {
                cx.redirect_events(EventKind::Custom("second"), Some(b));
                cx.post_event(Event::custom(None, "second", ()));
                cx.defer(|_cx| {});
                event.stop_propagation();
            }
        }));

        let mut dispatch = EventDispatch::new();
        dispatch.post_event(Event::custom(None, "first", ()).with_target(f.a1));
        let deferred = run(&mut f, &mut dispatch);

        assert_eq!(deferred.len(), 1);
        assert_eq!(dispatch.redirect_target(&f.tree, EventKind::Custom("second")), Some(b));
        // "second" was drained in the same pass, starting at the redirect target
        assert_eq!(*f.log.borrow(), vec![f.a1, b, f.root, f.a1, f.a]);
    }

    #[test]
    fn redirects_die_with_their_target_even_if_the_slot_is_reused() {
        let mut f = fixture();
        let captor = f.tree.create_view(Rect::from_xywh(0.0, 0.0, 10.0, 10.0));
        f.tree.add_view(f.root, captor).unwrap();

        let mut dispatch = EventDispatch::new();
        dispatch.redirect_events(&f.tree, EventKind::Custom("ping"), Some(captor));
        f.tree.destroy(captor);

        let newcomer = f.tree.create_view(Rect::from_xywh(60.0, 0.0, 10.0, 10.0));
        f.tree.set_widget(newcomer, recorder(&f.log, newcomer));
        assert_eq!(newcomer, captor);
        assert_eq!(dispatch.redirect_target(&f.tree, EventKind::Custom("ping")), None);

        dispatch.post_event(Event::custom(None, "ping", ()).with_target(f.a1));
        run(&mut f, &mut dispatch);
        // normal routing, and the detached newcomer isn't reachable from the root
        assert_eq!(*f.log.borrow(), vec![f.a1, f.a, f.root, f.b]);
    }

    #[test]
    fn redirecting_to_a_destroyed_view_clears_the_redirect() {
        let mut f = fixture();
        let ghost = f.tree.create_view(Rect::ZERO);
        f.tree.destroy(ghost);

        let mut dispatch = EventDispatch::new();
        dispatch.redirect_events(&f.tree, EventKind::Custom("ping"), Some(f.b));
        dispatch.redirect_events(&f.tree, EventKind::Custom("ping"), Some(ghost));
        assert_eq!(dispatch.redirect_target(&f.tree, EventKind::Custom("ping")), None);
    }

    #[test]
    fn stale_targets_are_skipped() {
        let mut f = fixture();
        let ghost = f.tree.create_view(Rect::ZERO);
        f.tree.destroy(ghost);

        let mut dispatch = EventDispatch::new();
        dispatch.post_event(Event::custom(None, "ping", ()).with_target(ghost));
        run(&mut f, &mut dispatch);

        assert_eq!(*f.log.borrow(), vec![f.a1, f.a, f.root, f.b]);
    }
}
