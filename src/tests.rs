use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::vec2;

use crate::*;

fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
    return Rect::from_xywh(x, y, w, h);
}

fn open_window(cx: &mut Context, visible: bool) -> WindowId {
    let config = WindowConfig {
        title: "test".to_owned(),
        frame: rect(0.0, 0.0, 200.0, 100.0),
        visible,
    };
    return cx.open_window(config).unwrap();
}

fn add_view(cx: &mut Context, id: WindowId, frame: Rect) -> ViewI {
    let window = cx.window_mut(id).unwrap();
    let root = window.root();
    let tree = window.tree_mut();
    let view = tree.create_view(frame);
    tree.add_view(root, view).unwrap();
    return view;
}

fn count_calls(calls: &[GpuCall], f: impl Fn(&GpuCall) -> bool) -> usize {
    return calls.iter().filter(|call| f(call)).count();
}

// Captures the mouse between press and release, and counts releases that land inside it.
struct Button {
    pressed: bool,
    clicks: Rc<Cell<u32>>,
}

impl Widget for Button {
    fn as_event_handler(&mut self) -> Option<&mut dyn EventHandler> {
        Some(self)
    }
}

impl EventHandler for Button {
    fn handle_event(&mut self, cx: &mut EventCx<'_>, event: &mut Event) {
        let (state, position) = match event.info() {
            EventInfo::MouseButton { state, position, .. } => (*state, *position),
            _ => return,
        };
        let inside = cx.bounds().contains(cx.local_position(position));

        match state {
            ElementState::Pressed if inside => {
                self.pressed = true;
                cx.redirect_events(EventKind::MouseButton, Some(cx.view));
                event.stop_propagation();
            }
            ElementState::Released if self.pressed => {
                self.pressed = false;
                cx.redirect_events(EventKind::MouseButton, None);
                if inside {
                    self.clicks.set(self.clicks.get() + 1);
                }
                event.stop_propagation();
            }
            _ => {}
        }
    }
}

fn mouse(platform: &HeadlessPlatform, id: WindowId, x: f32, y: f32, state: ElementState) {
    platform.push_event(id, PlatformEventKind::CursorMoved { position: vec2(x, y) });
    platform.push_event(id, PlatformEventKind::MouseButton { button: MouseButton::Left, state });
}

#[test]
fn button_captures_the_mouse_until_release() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, true);

    let button = add_view(&mut cx, id, rect(10.0, 10.0, 50.0, 20.0));
    let other = add_view(&mut cx, id, rect(100.0, 10.0, 50.0, 20.0));

    let clicks = Rc::new(Cell::new(0));
    let other_seen = Rc::new(Cell::new(0));
    {
        let tree = cx.window_mut(id).unwrap().tree_mut();
        tree.set_widget(button, Button { pressed: false, clicks: clicks.clone() });
        let seen = other_seen.clone();
        tree.set_widget(other, HandlerFn(move |_cx: &mut EventCx<'_>, event: &mut Event| {
            if event.kind() == EventKind::MouseButton {
                seen.set(seen.get() + 1);
            }
        }));
    }

    // press on the button, release on the other view: captured, no click
    mouse(&platform, id, 20.0, 15.0, ElementState::Pressed);
    cx.tick().unwrap();
    assert_eq!(cx.window(id).unwrap().cursor_position(), vec2(20.0, 15.0));

    mouse(&platform, id, 120.0, 15.0, ElementState::Released);
    cx.tick().unwrap();
    assert_eq!(clicks.get(), 0);
    assert_eq!(other_seen.get(), 0);

    // press and release on the button
    mouse(&platform, id, 20.0, 15.0, ElementState::Pressed);
    mouse(&platform, id, 25.0, 15.0, ElementState::Released);
    cx.tick().unwrap();
    assert_eq!(clicks.get(), 1);
    assert_eq!(other_seen.get(), 0);

    // capture is released, so the other view gets its own clicks again
    mouse(&platform, id, 120.0, 15.0, ElementState::Pressed);
    cx.tick().unwrap();
    assert_eq!(other_seen.get(), 1);
}

#[test]
fn deferred_callbacks_run_on_the_next_tick() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, true);

    let ran = Rc::new(Cell::new(0));
    let window = cx.window_mut(id).unwrap();
    let root = window.root();
    let ran_in_handler = ran.clone();
    window.tree_mut().set_widget(root, HandlerFn(move |cx: &mut EventCx<'_>, event: &mut Event| {
        if event.kind() == EventKind::Custom("ping") {
            let ran = ran_in_handler.clone();
            cx.defer(move |_cx| ran.set(ran.get() + 1));
        }
    }));
    window.post_event(Event::custom(None, "ping", ()).with_target(root)).unwrap();

    cx.tick().unwrap();
    assert_eq!(ran.get(), 0);

    cx.tick().unwrap();
    assert_eq!(ran.get(), 1);

    cx.tick().unwrap();
    assert_eq!(ran.get(), 1);
}

#[test]
fn posting_to_a_destroyed_view_is_rejected() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, false);
    let view = add_view(&mut cx, id, rect(0.0, 0.0, 10.0, 10.0));

    let window = cx.window_mut(id).unwrap();
    window.tree_mut().destroy(view);
    let result = window.post_event(Event::custom(None, "ping", ()).with_target(view));
    assert!(matches!(result, Err(UiError::InvalidTarget(v)) if v == view));
    assert_eq!(window.pending_events(), 0);
}

#[test]
fn redrawing_stops_after_max_invalidate_loops() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, true);
    let view = add_view(&mut cx, id, rect(10.0, 10.0, 20.0, 20.0));

    let draws = Rc::new(Cell::new(0));
    let counter = draws.clone();
    cx.window_mut(id).unwrap().tree_mut().set_widget(view, DrawFn(move |cx: &mut DrawCx<'_>| {
        counter.set(counter.get() + 1);
        cx.request_redraw();
    }));

    cx.tick().unwrap();
    assert_eq!(draws.get(), MAX_INVALIDATE_LOOPS);

    let calls = platform.gpu_calls(id);
    assert_eq!(count_calls(&calls, |call| matches!(call, GpuCall::Clear(_))), MAX_INVALIDATE_LOOPS);
    assert_eq!(count_calls(&calls, |call| *call == GpuCall::SwapBuffers), 1);

    // the leftover region is drawn on the next tick, without waiting for input first
    let window = cx.window(id).unwrap();
    assert!(window.tree().invalidated_region(window.root()).is_some());
    let (polls, waits) = (platform.polls(), platform.waits());
    cx.tick().unwrap();
    assert_eq!((platform.polls(), platform.waits()), (polls + 1, waits));
}

fn animate(cx: &mut Context, id: WindowId, view: ViewI, frames_left: u32) {
    if frames_left == 0 {
        return;
    }
    if let Some(window) = cx.window_mut(id) {
        window.tree_mut().invalidate(view, None);
    }
    cx.post(move |cx| animate(cx, id, view, frames_left - 1));
}

#[test]
fn invalidating_once_per_tick_draws_once_per_tick() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, true);
    let view = add_view(&mut cx, id, rect(10.0, 10.0, 20.0, 20.0));

    let draws = Rc::new(Cell::new(0));
    let counter = draws.clone();
    cx.window_mut(id).unwrap().tree_mut().set_widget(view, DrawFn(move |_cx: &mut DrawCx<'_>| {
        counter.set(counter.get() + 1);
    }));
    cx.tick().unwrap();
    assert_eq!(draws.get(), 1);

    cx.post(move |cx| animate(cx, id, view, 3));
    for expected in 2..=4 {
        cx.tick().unwrap();
        assert_eq!(draws.get(), expected);
    }

    let waits = platform.waits();
    cx.tick().unwrap();
    assert_eq!(draws.get(), 4);
    assert_eq!(platform.waits(), waits + 1);
}

#[test]
fn drawn_quads_reach_the_gpu() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, true);
    let view = add_view(&mut cx, id, rect(10.0, 10.0, 20.0, 20.0));

    cx.window_mut(id).unwrap().tree_mut().set_widget(view, DrawFn(|cx: &mut DrawCx<'_>| {
        let bounds = cx.bounds();
        cx.driver.draw_quad(None, Quad::rect(bounds).color(Color::RED)).unwrap();
    }));

    cx.tick().unwrap();

    let calls = platform.gpu_calls(id);
    assert_eq!(calls.first(), Some(&GpuCall::Bind));
    assert!(calls.contains(&GpuCall::DrawIndexed { first_index: 0, count: 6, base_vertex: 0 }));
    assert_eq!(calls.last(), Some(&GpuCall::SwapBuffers));

    // the batch doesn't outlive the frame
    let driver = cx.window(id).unwrap().driver();
    assert!(driver.vertices().is_empty());

    // nothing invalidated, nothing drawn
    platform.clear_gpu_calls(id);
    cx.tick().unwrap();
    assert!(platform.gpu_calls(id).is_empty());
}

#[test]
fn views_draw_at_their_position_in_the_window() {
    let mut tree = ViewTree::new();
    let root = tree.create_window_view(rect(300.0, 300.0, 200.0, 100.0));
    let parent = tree.create_view(rect(10.0, 10.0, 100.0, 50.0));
    let child = tree.create_view(rect(5.0, 5.0, 20.0, 20.0));
    tree.add_view(root, parent).unwrap();
    tree.add_view(parent, child).unwrap();
    tree.set_widget(child, DrawFn(|cx: &mut DrawCx<'_>| {
        let bounds = cx.bounds();
        cx.driver.draw_quad(None, Quad::rect(bounds)).unwrap();
    }));

    let mut driver = Driver::new(DriverConfig::default());
    tree.draw(root, &mut driver);

    let positions: Vec<[f32; 2]> = driver.vertices().iter().map(|v| v.position).collect();
    assert_eq!(positions, vec![[15.0, 15.0], [35.0, 15.0], [35.0, 35.0], [15.0, 35.0]]);
    assert_eq!(driver.state_depth(), 0);
}

#[test]
fn close_request_closes_and_releases_a_tick_later() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, true);

    let requests = Rc::new(Cell::new(0));
    {
        let window = cx.window_mut(id).unwrap();
        window.request_texture_rgba("white", 1, 1, &[255, 255, 255, 255]).unwrap();
        let root = window.root();
        let seen = requests.clone();
        window.tree_mut().set_widget(root, HandlerFn(move |_cx: &mut EventCx<'_>, event: &mut Event| {
            if event.kind() == EventKind::CloseRequest {
                seen.set(seen.get() + 1);
            }
        }));
    }
    cx.tick().unwrap();

    platform.push_event(id, PlatformEventKind::CloseRequested);
    cx.tick().unwrap();

    assert_eq!(requests.get(), 1);
    assert!(cx.window(id).is_none());
    let state = platform.window_state(id).unwrap();
    assert!(!state.borrow().released);

    cx.tick().unwrap();
    assert!(state.borrow().released);
    let calls = platform.gpu_calls(id);
    assert_eq!(count_calls(&calls, |call| matches!(call, GpuCall::ReleaseTexture(_))), 1);
}

#[test]
fn ignored_close_request_keeps_the_window() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, true);
    cx.window_mut(id).unwrap().set_close_policy(ClosePolicy::Ignore);

    platform.push_event(id, PlatformEventKind::CloseRequested);
    cx.tick().unwrap();
    cx.tick().unwrap();
    assert_eq!(cx.window(id).map(|w| w.state()), Some(WindowState::Shown));

    cx.close_window(id);
    assert!(cx.window(id).is_none());
    cx.tick().unwrap();
    assert!(platform.window_state(id).unwrap().borrow().released);
}

#[test]
fn run_returns_once_every_window_is_closed() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let first = open_window(&mut cx, true);
    let second = open_window(&mut cx, false);

    platform.push_event(first, PlatformEventKind::CloseRequested);
    platform.push_event(second, PlatformEventKind::CloseRequested);
    cx.run().unwrap();

    assert_eq!(cx.windows().count(), 0);
    assert!(platform.window_state(first).unwrap().borrow().released);
    assert!(platform.window_state(second).unwrap().borrow().released);
}

#[test]
fn realtime_polls_instead_of_waiting() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());

    cx.tick().unwrap();
    assert_eq!((platform.polls(), platform.waits()), (0, 1));

    cx.enable_realtime();
    cx.enable_realtime();
    cx.tick().unwrap();
    assert_eq!((platform.polls(), platform.waits()), (1, 1));

    cx.disable_realtime().unwrap();
    assert!(cx.is_realtime());
    cx.disable_realtime().unwrap();
    assert!(!cx.is_realtime());
    assert!(matches!(cx.disable_realtime(), Err(UiError::RealtimeUnderflow)));

    cx.tick().unwrap();
    assert_eq!((platform.polls(), platform.waits()), (1, 2));
}

#[test]
fn pending_work_polls() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    cx.post(|_cx| {});
    cx.post(|cx| cx.post(|_cx| {}));

    cx.tick().unwrap();
    // the callback posted from a callback is still pending
    assert_eq!((platform.polls(), platform.waits()), (1, 0));
    cx.tick().unwrap();
    assert_eq!((platform.polls(), platform.waits()), (1, 1));
}

#[test]
fn callbacks_that_invalidate_or_request_layout_poll() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, true);
    let view = add_view(&mut cx, id, rect(10.0, 10.0, 20.0, 20.0));
    cx.tick().unwrap();
    let (polls, waits) = (platform.polls(), platform.waits());

    cx.post(move |cx| cx.window_mut(id).unwrap().tree_mut().invalidate(view, None));
    cx.tick().unwrap();
    assert_eq!((platform.polls(), platform.waits()), (polls + 1, waits));

    cx.post(move |cx| cx.window_mut(id).unwrap().tree_mut().request_layout(view));
    cx.tick().unwrap();
    assert_eq!((platform.polls(), platform.waits()), (polls + 2, waits));

    cx.tick().unwrap();
    assert_eq!((platform.polls(), platform.waits()), (polls + 2, waits + 1));
}

#[test]
fn run_with_calls_back_every_tick_before_drawing() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, true);
    let view = add_view(&mut cx, id, rect(10.0, 10.0, 20.0, 20.0));

    let draws = Rc::new(Cell::new(0));
    let counter = draws.clone();
    cx.window_mut(id).unwrap().tree_mut().set_widget(view, DrawFn(move |_cx: &mut DrawCx<'_>| {
        counter.set(counter.get() + 1);
    }));

    let mut ticks = 0;
    cx.run_with(|cx| {
        ticks += 1;
        if ticks == 3 {
            cx.window_mut(id).unwrap().tree_mut().invalidate(view, None);
            cx.quit();
        }
    })
    .unwrap();

    assert_eq!(ticks, 3);
    assert!(cx.window(id).is_some());
    // the first tick draws the new view, the third one draws what the callback invalidated
    assert_eq!(draws.get(), 2);
}

#[test]
fn destroying_the_captor_releases_the_capture() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, true);

    let button = add_view(&mut cx, id, rect(10.0, 10.0, 50.0, 20.0));
    let clicks = Rc::new(Cell::new(0));
    cx.window_mut(id).unwrap().tree_mut().set_widget(button, Button { pressed: false, clicks: clicks.clone() });

    mouse(&platform, id, 20.0, 15.0, ElementState::Pressed);
    cx.tick().unwrap();
    assert_eq!(cx.window(id).unwrap().redirect_target(EventKind::MouseButton), Some(button));

    cx.window_mut(id).unwrap().tree_mut().destroy(button);
    let newcomer = add_view(&mut cx, id, rect(100.0, 10.0, 50.0, 20.0));
    // same slot, different view
    assert_eq!(newcomer, button);
    assert_eq!(cx.window(id).unwrap().redirect_target(EventKind::MouseButton), None);

    mouse(&platform, id, 20.0, 15.0, ElementState::Released);
    cx.tick().unwrap();
    assert_eq!(clicks.get(), 0);
}

#[test]
fn platform_frame_changes_are_not_sent_back() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, true);

    let sizes = Rc::new(RefCell::new(Vec::new()));
    {
        let window = cx.window_mut(id).unwrap();
        let root = window.root();
        let seen = sizes.clone();
        window.tree_mut().set_widget(root, HandlerFn(move |_cx: &mut EventCx<'_>, event: &mut Event| {
            if let EventInfo::Resize { size } = event.info() {
                seen.borrow_mut().push(*size);
            }
        }));
    }

    platform.push_event(id, PlatformEventKind::Resized { size: vec2(300.0, 200.0) });
    platform.push_event(id, PlatformEventKind::Moved { position: vec2(40.0, 50.0) });
    cx.tick().unwrap();

    let state = platform.window_state(id).unwrap();
    assert_eq!(cx.window(id).unwrap().frame(), rect(40.0, 50.0, 300.0, 200.0));
    assert_eq!(state.borrow().frame_updates, 0);
    assert_eq!(*sizes.borrow(), vec![vec2(300.0, 200.0)]);

    cx.window_mut(id).unwrap().set_frame(rect(0.0, 0.0, 100.0, 100.0));
    assert_eq!(state.borrow().frame_updates, 1);
    assert_eq!(state.borrow().frame, rect(0.0, 0.0, 100.0, 100.0));
}

#[test]
fn hidden_windows_wait_to_draw() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, false);

    cx.tick().unwrap();
    assert!(platform.gpu_calls(id).is_empty());
    assert!(!platform.window_state(id).unwrap().borrow().visible);

    cx.window_mut(id).unwrap().show();
    cx.tick().unwrap();
    assert!(platform.window_state(id).unwrap().borrow().visible);
    assert_eq!(platform.gpu_calls(id).last(), Some(&GpuCall::SwapBuffers));
}

#[test]
fn only_the_invalidated_region_is_cleared() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, true);
    let view = add_view(&mut cx, id, rect(10.0, 10.0, 20.0, 20.0));

    cx.tick().unwrap();
    assert!(platform.gpu_calls(id).contains(&GpuCall::Clear(rect(0.0, 0.0, 200.0, 100.0))));

    platform.clear_gpu_calls(id);
    cx.window_mut(id).unwrap().tree_mut().invalidate(view, None);
    cx.tick().unwrap();
    assert!(platform.gpu_calls(id).contains(&GpuCall::Clear(rect(10.0, 10.0, 20.0, 20.0))));
}

#[test]
fn contexts_that_lose_contents_clear_everything() {
    let platform = HeadlessPlatform::new();
    platform.set_preserves_contents(false);
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, true);
    let view = add_view(&mut cx, id, rect(10.0, 10.0, 20.0, 20.0));

    cx.tick().unwrap();
    platform.clear_gpu_calls(id);

    cx.window_mut(id).unwrap().tree_mut().invalidate(view, None);
    cx.tick().unwrap();
    let calls = platform.gpu_calls(id);
    assert!(calls.contains(&GpuCall::Clear(rect(0.0, 0.0, 200.0, 100.0))));
    assert!(!calls.contains(&GpuCall::Clear(rect(10.0, 10.0, 20.0, 20.0))));
}

#[test]
fn layout_runs_before_drawing() {
    struct Fill;
    impl Widget for Fill {
        fn as_layoutable(&mut self) -> Option<&mut dyn Layoutable> {
            Some(self)
        }
    }
    impl Layoutable for Fill {
        fn perform_layout(&mut self, cx: &mut LayoutCx<'_>) {
            let bounds = cx.bounds();
            for subview in cx.subviews() {
                cx.set_frame(subview, bounds);
            }
        }
    }

    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let id = open_window(&mut cx, true);
    let child = add_view(&mut cx, id, rect(0.0, 0.0, 1.0, 1.0));
    {
        let window = cx.window_mut(id).unwrap();
        let root = window.root();
        window.tree_mut().set_widget(root, Fill);
        window.tree_mut().request_layout(root);
    }

    cx.tick().unwrap();
    let window = cx.window(id).unwrap();
    assert_eq!(window.tree().frame(child), rect(0.0, 0.0, 200.0, 100.0));
    assert!(!window.tree().needs_layout(window.root()));

    // a resize from the platform lays the window out again
    platform.push_event(id, PlatformEventKind::Resized { size: vec2(50.0, 40.0) });
    cx.tick().unwrap();
    assert_eq!(cx.window(id).unwrap().tree().frame(child), rect(0.0, 0.0, 50.0, 40.0));
}

#[test]
fn textures_are_shared_per_window() {
    let platform = HeadlessPlatform::new();
    let mut cx = Context::new(platform.clone());
    let first = open_window(&mut cx, false);
    let second = open_window(&mut cx, false);
    let pixel = [0, 0, 0, 255];

    let a = cx.window_mut(first).unwrap().request_texture_rgba("pixel", 1, 1, &pixel).unwrap();
    let b = cx.window_mut(first).unwrap().request_texture_rgba("pixel", 1, 1, &pixel).unwrap();
    assert_eq!(a, b);
    cx.window_mut(second).unwrap().request_texture_rgba("pixel", 1, 1, &pixel).unwrap();

    assert_eq!(cx.window(first).unwrap().textures().ref_count("pixel"), 2);
    assert_eq!(cx.window(second).unwrap().textures().ref_count("pixel"), 1);

    assert!(!cx.release_texture(first, "pixel"));
    assert!(cx.release_texture(first, "pixel"));
    assert!(cx.window(first).unwrap().textures().is_empty());
    assert!(matches!(cx.request_texture(first, "missing", "/nonexistent/missing.png"), Err(UiError::Image(_))));
}
