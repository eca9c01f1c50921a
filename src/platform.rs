use glam::Vec2;
use winit::event::{ElementState, MouseButton};
use winit::keyboard::ModifiersState;

use crate::*;

/// Identifies a [`Window`] inside a [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub(crate) u64);

#[derive(Debug, Clone, PartialEq)]
pub struct WindowConfig {
    pub title: String,
    /// Position on screen and size of the content area, in logical pixels.
    pub frame: Rect,
    /// Whether the window is shown as soon as it's opened.
    pub visible: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        return WindowConfig {
            title: "Trellis".to_owned(),
            frame: Rect::from_xywh(0.0, 0.0, 800.0, 600.0),
            visible: false,
        };
    }
}

/// Raw input and window notifications, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlatformEventKind {
    Resized { size: Vec2 },
    Moved { position: Vec2 },
    CloseRequested,
    CursorMoved { position: Vec2 },
    MouseButton { button: MouseButton, state: ElementState },
    ModifiersChanged(ModifiersState),
    ScaleFactorChanged(f32),
    RedrawRequested,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformEvent {
    pub window: WindowId,
    pub kind: PlatformEventKind,
}

/// The windowing system.
pub trait Platform {
    fn create_window(&mut self, id: WindowId, config: &WindowConfig) -> Result<Box<dyn PlatformWindow>, UiError>;

    /// Appends the pending events to `out` without blocking.
    fn poll_events(&mut self, out: &mut Vec<PlatformEvent>);

    /// Blocks until at least one event arrives, then appends the pending events to `out`.
    fn wait_events(&mut self, out: &mut Vec<PlatformEvent>);
}

/// One OS window. Dropping it closes the window.
pub trait PlatformWindow {
    fn show(&mut self);

    fn hide(&mut self);

    fn set_title(&mut self, title: &str);

    /// Moves and resizes the window, in logical pixels.
    fn set_frame(&mut self, frame: Rect);

    fn scale_factor(&self) -> f32;

    fn drawing_context(&mut self) -> &mut dyn DrawingContext;
}
