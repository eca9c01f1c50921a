use crate::*;

/// A tag used to look views up with [`ViewTree::view_with_tag`].
pub type Tag = &'static str;

/// Distinguishes the views that [`ViewTree::window`] stops at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewRole {
    Plain,
    Window,
}

/// A leaf view together with its depth below the view that was queried.
///
/// The queried view itself has depth 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewDepth {
    pub view: ViewI,
    pub depth: usize,
}

/// A node in the view tree.
///
/// Views are only created and mutated through [`ViewTree`], which keeps the caches and the parent/child links consistent.
pub struct ViewNode {
    pub(crate) frame: Rect,
    pub(crate) tag: Option<Tag>,
    pub(crate) role: ViewRole,
    // unique per tree, unlike the slot index.
    pub(crate) serial: u64,

    pub(crate) superview: Option<ViewI>,
    pub(crate) subviews: Vec<ViewI>,

    pub(crate) invalidated: Option<Rect>,
    pub(crate) needs_layout: bool,

    // cleared whenever the structure below this view changes.
    pub(crate) leaf_cache: Option<Vec<ViewDepth>>,
    // cleared whenever an ancestor link above this view changes.
    pub(crate) window_cache: Option<ViewI>,
    pub(crate) root_cache: Option<ViewI>,

    // taken out while one of its methods runs, so that the widget can get a `&mut ViewTree` at the same time.
    pub(crate) widget: Option<Box<dyn Widget>>,
}

impl ViewNode {
    /// A standalone view: no parent, no children, fully invalidated and waiting for layout.
    pub(crate) fn new(frame: Rect, role: ViewRole) -> ViewNode {
        return ViewNode {
            frame,
            tag: None,
            role,
            serial: 0,
            superview: None,
            subviews: Vec::new(),
            invalidated: Some(frame.with_origin(glam::Vec2::ZERO)),
            needs_layout: true,
            leaf_cache: None,
            window_cache: None,
            root_cache: None,
            widget: None,
        };
    }

    pub fn frame(&self) -> Rect {
        return self.frame;
    }

    /// The frame moved to the origin, i.e. the view's own coordinate space.
    pub fn bounds(&self) -> Rect {
        return self.frame.with_origin(glam::Vec2::ZERO);
    }

    pub fn tag(&self) -> Option<Tag> {
        return self.tag;
    }

    pub fn role(&self) -> ViewRole {
        return self.role;
    }

    pub fn superview(&self) -> Option<ViewI> {
        return self.superview;
    }

    pub fn subviews(&self) -> &[ViewI] {
        return &self.subviews;
    }

    pub fn invalidated_region(&self) -> Option<Rect> {
        return self.invalidated;
    }

    pub fn needs_layout(&self) -> bool {
        return self.needs_layout;
    }
}

impl std::fmt::Debug for ViewNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewNode")
            .field("frame", &self.frame)
            .field("tag", &self.tag)
            .field("role", &self.role)
            .field("superview", &self.superview)
            .field("subviews", &self.subviews)
            .field("invalidated", &self.invalidated)
            .field("needs_layout", &self.needs_layout)
            .field("has_widget", &self.widget.is_some())
            .finish()
    }
}

/// Behavior attached to a view.
///
/// A widget opts into each capability by overriding the matching `as_*` method and returning `Some(self)`.
/// Views without a widget, or whose widget returns `None`, are skipped for that capability.
pub trait Widget {
    fn as_event_handler(&mut self) -> Option<&mut dyn EventHandler> {
        None
    }

    fn as_drawable(&mut self) -> Option<&mut dyn Drawable> {
        None
    }

    fn as_layoutable(&mut self) -> Option<&mut dyn Layoutable> {
        None
    }
}

pub trait EventHandler {
    fn handle_event(&mut self, cx: &mut EventCx<'_>, event: &mut Event);
}

pub trait Drawable {
    /// Draw the view into `cx.driver`. The driver's origin is already at the view's top-left corner.
    fn draw(&mut self, cx: &mut DrawCx<'_>);
}

pub trait Layoutable {
    /// Arrange the subviews. The dirty flag bookkeeping is done by [`ViewTree::perform_layout`] around this call.
    fn perform_layout(&mut self, cx: &mut LayoutCx<'_>);
}

/// A [`Widget`] that only handles events, built from a closure.
pub struct HandlerFn<F>(pub F);

impl<F> Widget for HandlerFn<F>
where
    F: FnMut(&mut EventCx<'_>, &mut Event) + 'static,
{
    fn as_event_handler(&mut self) -> Option<&mut dyn EventHandler> {
        Some(self)
    }
}

impl<F> EventHandler for HandlerFn<F>
where
    F: FnMut(&mut EventCx<'_>, &mut Event) + 'static,
{
    fn handle_event(&mut self, cx: &mut EventCx<'_>, event: &mut Event) {
        (self.0)(cx, event)
    }
}

/// A [`Widget`] that only draws, built from a closure.
pub struct DrawFn<F>(pub F);

impl<F> Widget for DrawFn<F>
where
    F: FnMut(&mut DrawCx<'_>) + 'static,
{
    fn as_drawable(&mut self) -> Option<&mut dyn Drawable> {
        Some(self)
    }
}

impl<F> Drawable for DrawFn<F>
where
    F: FnMut(&mut DrawCx<'_>) + 'static,
{
    fn draw(&mut self, cx: &mut DrawCx<'_>) {
        (self.0)(cx)
    }
}
