use std::any::Any;
use std::fmt;

use glam::Vec2;
use winit::event::{ElementState, MouseButton};
use winit::keyboard::ModifiersState;

use crate::*;

/// What an event is about. Redirects are keyed by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MouseButton,
    CursorMoved,
    Resize,
    Move,
    CloseRequest,
    Custom(&'static str),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::MouseButton => write!(f, "mouse_button"),
            EventKind::CursorMoved => write!(f, "cursor_moved"),
            EventKind::Resize => write!(f, "resize"),
            EventKind::Move => write!(f, "move"),
            EventKind::CloseRequest => write!(f, "close_request"),
            EventKind::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// The payload of an event. It's fixed when the event is created.
///
/// Positions of pointer events are in the coordinates of the window's root view.
pub enum EventInfo {
    None,
    MouseButton {
        button: MouseButton,
        state: ElementState,
        modifiers: ModifiersState,
        position: Vec2,
    },
    CursorMoved {
        position: Vec2,
    },
    Resize {
        size: Vec2,
    },
    Move {
        position: Vec2,
    },
    Custom(Box<dyn Any>),
}

impl fmt::Debug for EventInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventInfo::None => write!(f, "None"),
            EventInfo::MouseButton { button, state, modifiers, position } => f
                .debug_struct("MouseButton")
                .field("button", button)
                .field("state", state)
                .field("modifiers", modifiers)
                .field("position", position)
                .finish(),
            EventInfo::CursorMoved { position } => f.debug_struct("CursorMoved").field("position", position).finish(),
            EventInfo::Resize { size } => f.debug_struct("Resize").field("size", size).finish(),
            EventInfo::Move { position } => f.debug_struct("Move").field("position", position).finish(),
            EventInfo::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// An event travelling through a window's view tree.
///
/// Everything except the routing flags and the current `target` is immutable after construction.
/// `cancelled` and `propagating` only ever go one way: an event can't be un-cancelled, and a stopped event stays stopped.
#[derive(Debug)]
pub struct Event {
    sender: Option<ViewI>,
    kind: EventKind,
    info: EventInfo,
    original_target: Option<ViewI>,
    pub target: Option<ViewI>,
    cancellable: bool,
    cancelled: bool,
    propagating: bool,
}

impl Event {
    pub fn new(sender: Option<ViewI>, kind: EventKind, info: EventInfo) -> Event {
        return Event {
            sender,
            kind,
            info,
            original_target: None,
            target: None,
            cancellable: true,
            cancelled: false,
            propagating: true,
        };
    }

    pub fn mouse_button(sender: Option<ViewI>, button: MouseButton, state: ElementState, modifiers: ModifiersState, position: Vec2) -> Event {
        let info = EventInfo::MouseButton { button, state, modifiers, position };
        return Event::new(sender, EventKind::MouseButton, info);
    }

    pub fn cursor_moved(sender: Option<ViewI>, position: Vec2) -> Event {
        return Event::new(sender, EventKind::CursorMoved, EventInfo::CursorMoved { position });
    }

    pub fn resize(sender: Option<ViewI>, size: Vec2) -> Event {
        return Event::new(sender, EventKind::Resize, EventInfo::Resize { size });
    }

    pub fn moved(sender: Option<ViewI>, position: Vec2) -> Event {
        return Event::new(sender, EventKind::Move, EventInfo::Move { position });
    }

    pub fn close_request(sender: Option<ViewI>) -> Event {
        return Event::new(sender, EventKind::CloseRequest, EventInfo::None);
    }

    pub fn custom<T: Any>(sender: Option<ViewI>, name: &'static str, payload: T) -> Event {
        return Event::new(sender, EventKind::Custom(name), EventInfo::Custom(Box::new(payload)));
    }

    /// Gives the event an explicit target. This is also what [`Event::original_target`] reports afterwards.
    pub fn with_target(mut self, target: ViewI) -> Event {
        self.original_target = Some(target);
        self.target = Some(target);
        return self;
    }

    pub fn not_cancellable(mut self) -> Event {
        self.cancellable = false;
        return self;
    }

    pub fn sender(&self) -> Option<ViewI> {
        return self.sender;
    }

    pub fn kind(&self) -> EventKind {
        return self.kind;
    }

    pub fn info(&self) -> &EventInfo {
        return &self.info;
    }

    /// The payload of a [`EventKind::Custom`] event, if it has the requested type.
    pub fn custom_info<T: Any>(&self) -> Option<&T> {
        match &self.info {
            EventInfo::Custom(payload) => payload.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// The position carried by pointer and move events.
    pub fn position(&self) -> Option<Vec2> {
        match self.info {
            EventInfo::MouseButton { position, .. } => Some(position),
            EventInfo::CursorMoved { position } => Some(position),
            EventInfo::Move { position } => Some(position),
            _ => None,
        }
    }

    /// The target the event was created with, even if `target` was changed since.
    pub fn original_target(&self) -> Option<ViewI> {
        return self.original_target;
    }

    pub fn is_cancellable(&self) -> bool {
        return self.cancellable;
    }

    pub fn is_cancelled(&self) -> bool {
        return self.cancelled;
    }

    pub fn is_propagating(&self) -> bool {
        return self.propagating;
    }

    /// No handler will see this event after the current one returns.
    pub fn stop_propagation(&mut self) -> &mut Self {
        self.propagating = false;
        return self;
    }

    /// Marks the event as cancelled. This doesn't stop propagation by itself.
    pub fn cancel(&mut self) -> Result<&mut Self, UiError> {
        if !self.cancellable {
            return Err(UiError::NotCancellable);
        }
        self.cancelled = true;
        return Ok(self);
    }
}

struct OptView(Option<ViewI>);

impl fmt::Display for OptView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(view) => write!(f, "{}", view.as_usize()),
            None => write!(f, "none"),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(event (sender {}) (kind {})", OptView(self.sender), self.kind)?;
        if self.original_target.is_some() {
            write!(f, " (target {})", OptView(self.original_target))?;
        }
        match &self.info {
            EventInfo::None => {}
            EventInfo::MouseButton { button, state, modifiers, position } => {
                write!(f, " (button {button:?}) (state {state:?}) (modifiers {modifiers:?}) (position {} {})", position.x, position.y)?;
            }
            EventInfo::CursorMoved { position } | EventInfo::Move { position } => {
                write!(f, " (position {} {})", position.x, position.y)?;
            }
            EventInfo::Resize { size } => {
                write!(f, " (size {} {})", size.x, size.y)?;
            }
            EventInfo::Custom(_) => write!(f, " (custom ..)")?,
        }
        write!(f, ")")
    }
}
