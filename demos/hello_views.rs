//! Two buttons in a column and a bar that grows each time one of them is clicked.
//!
//! Pressing a button captures the mouse: releasing it outside the button doesn't count as a click.
use trellis::*;

const PADDING: f32 = 16.0;

struct Column;

impl Widget for Column {
    fn as_layoutable(&mut self) -> Option<&mut dyn Layoutable> {
        Some(self)
    }
}

impl Layoutable for Column {
    fn perform_layout(&mut self, cx: &mut LayoutCx<'_>) {
        let bounds = cx.bounds();
        let subviews = cx.subviews();
        if subviews.is_empty() {
            return;
        }

        let n = subviews.len() as f32;
        let height = (bounds.height() - PADDING * (n + 1.0)) / n;
        let width = bounds.width() - 2.0 * PADDING;
        for (i, subview) in subviews.into_iter().enumerate() {
            let y = PADDING + i as f32 * (height + PADDING);
            cx.set_frame(subview, Rect::from_xywh(PADDING, y, width, height.max(0.0)));
        }
    }
}

struct Button {
    color: Color,
    pressed: bool,
    bar: ViewI,
}

impl Widget for Button {
    fn as_event_handler(&mut self) -> Option<&mut dyn EventHandler> {
        Some(self)
    }

    fn as_drawable(&mut self) -> Option<&mut dyn Drawable> {
        Some(self)
    }
}

impl EventHandler for Button {
    fn handle_event(&mut self, cx: &mut EventCx<'_>, event: &mut Event) {
        let (button, state, position) = match event.info() {
            EventInfo::MouseButton { button, state, position, .. } => (*button, *state, *position),
            _ => return,
        };
        if button != MouseButton::Left {
            return;
        }
        let inside = cx.bounds().contains(cx.local_position(position));

        match state {
            ElementState::Pressed if inside => {
                self.pressed = true;
                cx.redirect_events(EventKind::MouseButton, Some(cx.view));
                cx.invalidate();
                event.stop_propagation();
            }
            ElementState::Released if self.pressed => {
                self.pressed = false;
                cx.redirect_events(EventKind::MouseButton, None);
                cx.invalidate();
                if inside {
                    cx.post_event(Event::custom(Some(cx.view), "clicked", self.color).with_target(self.bar));
                }
                event.stop_propagation();
            }
            _ => {}
        }
    }
}

impl Drawable for Button {
    fn draw(&mut self, cx: &mut DrawCx<'_>) {
        let color = match self.pressed {
            true => self.color.blend(Color::BLACK, 0.3),
            false => self.color,
        };
        let bounds = cx.bounds();
        if let Err(e) = cx.driver.draw_quad(None, Quad::rect(bounds).color(color)) {
            log::warn!("{e}");
        }
    }
}

#[derive(Default)]
struct Bar {
    clicks: u32,
    color: Color,
}

impl Widget for Bar {
    fn as_event_handler(&mut self) -> Option<&mut dyn EventHandler> {
        Some(self)
    }

    fn as_drawable(&mut self) -> Option<&mut dyn Drawable> {
        Some(self)
    }
}

impl EventHandler for Bar {
    fn handle_event(&mut self, cx: &mut EventCx<'_>, event: &mut Event) {
        let Some(&color) = event.custom_info::<Color>() else {
            return;
        };
        self.clicks += 1;
        self.color = color;
        cx.invalidate();

        let clicks = self.clicks;
        cx.defer(move |_cx| log::info!("{clicks} clicks so far"));
    }
}

impl Drawable for Bar {
    fn draw(&mut self, cx: &mut DrawCx<'_>) {
        let bounds = cx.bounds();
        let filled = (self.clicks as f32 * 20.0).min(bounds.width());

        let background = Quad::rect(bounds).color(Color::LIGHT_GREY);
        let fill = Quad::rect(bounds.with_size(glam::vec2(filled, bounds.height()))).color(self.color);
        for quad in [background, fill] {
            if let Err(e) = cx.driver.draw_quad(None, quad) {
                log::warn!("{e}");
            }
        }
    }
}

fn main() -> Result<(), UiError> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("trellis", log::LevelFilter::Debug)
        .filter_module("hello_views", log::LevelFilter::Info)
        .init();

    let mut cx = Context::new(WinitPlatform::new()?);
    let id = cx.open_window(WindowConfig {
        title: "Hello views".to_owned(),
        frame: Rect::from_xywh(100.0, 100.0, 400.0, 300.0),
        visible: true,
    })?;

    let Some(window) = cx.window_mut(id) else {
        return Err(UiError::Platform("window was closed before it opened".to_owned()));
    };
    let root = window.root();
    let tree = window.tree_mut();
    tree.set_widget(root, Column);

    let bar = tree.create_view(Rect::ZERO);
    tree.set_widget(bar, Bar::default());

    for color in [Color::RED, Color::BLUE] {
        let button = tree.create_view(Rect::ZERO);
        tree.set_widget(button, Button { color, pressed: false, bar });
        tree.add_view(root, button)?;
    }
    tree.add_view(root, bar)?;

    return cx.run();
}
