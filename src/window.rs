use glam::Vec2;
use winit::keyboard::ModifiersState;

use crate::*;

/// How many times a window redraws in one tick while drawing keeps invalidating it.
pub const MAX_INVALIDATE_LOOPS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Hidden,
    Shown,
    /// Terminal.
    Closed,
}

/// What happens when the platform asks to close the window (e.g. the user clicked the close button).
///
/// A [`EventKind::CloseRequest`] event is posted to the root view either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosePolicy {
    #[default]
    Close,
    /// Leave it to the application, which can close the window later with [`Context::close_window`].
    Ignore,
}

/// A platform window together with the view tree, event queue and driver that draw into it.
///
/// The root view's frame is the window's frame on screen. Its origin never affects the views inside it, which all live in root coordinates.
pub struct Window {
    id: WindowId,
    title: String,

    tree: ViewTree,
    root: ViewI,
    dispatch: EventDispatch,
    driver: Driver,
    textures: TextureCache,

    platform_window: Option<Box<dyn PlatformWindow>>,
    state: WindowState,
    close_policy: ClosePolicy,

    // set while the window applies a frame change that came from the platform, so that it isn't sent back.
    in_frame_update: bool,
    cursor_position: Vec2,
    modifiers: ModifiersState,
}

impl Window {
    pub(crate) fn new(id: WindowId, config: &WindowConfig, platform_window: Box<dyn PlatformWindow>, driver_config: DriverConfig) -> Window {
        let mut tree = ViewTree::new();
        let root = tree.create_window_view(config.frame);
        tree.scale_factor = platform_window.scale_factor();

        let mut window = Window {
            id,
            title: config.title.clone(),
            tree,
            root,
            dispatch: EventDispatch::new(),
            driver: Driver::new(driver_config),
            textures: TextureCache::new(),
            platform_window: Some(platform_window),
            state: WindowState::Hidden,
            close_policy: ClosePolicy::default(),
            in_frame_update: false,
            cursor_position: Vec2::ZERO,
            modifiers: ModifiersState::empty(),
        };

        if config.visible {
            window.show();
        }
        return window;
    }

    pub fn id(&self) -> WindowId {
        return self.id;
    }

    pub fn root(&self) -> ViewI {
        return self.root;
    }

    pub fn tree(&self) -> &ViewTree {
        return &self.tree;
    }

    pub fn tree_mut(&mut self) -> &mut ViewTree {
        return &mut self.tree;
    }

    pub fn driver(&self) -> &Driver {
        return &self.driver;
    }

    pub fn state(&self) -> WindowState {
        return self.state;
    }

    pub fn title(&self) -> &str {
        return &self.title;
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_owned();
        if let Some(platform_window) = &mut self.platform_window {
            platform_window.set_title(title);
        }
    }

    pub fn frame(&self) -> Rect {
        return self.tree.frame(self.root);
    }

    /// Moves and resizes the window on screen.
    pub fn set_frame(&mut self, frame: Rect) {
        if !self.in_frame_update {
            if let Some(platform_window) = &mut self.platform_window {
                platform_window.set_frame(frame);
            }
        }
        self.tree.set_frame(self.root, frame);
    }

    /// Ratio between physical and logical pixels.
    pub fn scale_factor(&self) -> f32 {
        return self.tree.scale_factor();
    }

    pub fn close_policy(&self) -> ClosePolicy {
        return self.close_policy;
    }

    pub fn set_close_policy(&mut self, policy: ClosePolicy) {
        self.close_policy = policy;
    }

    pub fn cursor_position(&self) -> Vec2 {
        return self.cursor_position;
    }

    pub fn show(&mut self) {
        if self.state == WindowState::Closed {
            return;
        }
        if let Some(platform_window) = &mut self.platform_window {
            platform_window.show();
        }
        self.state = WindowState::Shown;
        self.tree.invalidate(self.root, None);
    }

    pub fn hide(&mut self) {
        if self.state == WindowState::Closed {
            return;
        }
        if let Some(platform_window) = &mut self.platform_window {
            platform_window.hide();
        }
        self.state = WindowState::Hidden;
    }

    /// Marks the window as closed. The owning [`Context`] takes it off its list on the next sweep.
    pub fn close(&mut self) {
        if self.state == WindowState::Closed {
            return;
        }
        log::debug!("Closing window {:?} ({:?})", self.id, self.title);
        self.state = WindowState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        return self.state == WindowState::Closed;
    }

    // Drops the platform window and everything allocated on its GPU.
    pub(crate) fn release_platform_window(&mut self) {
        if let Some(mut platform_window) = self.platform_window.take() {
            self.textures.release_all(platform_window.drawing_context().gpu());
            log::debug!("Released platform window of {:?}", self.id);
        }
    }

    /// Queues an event for the next dispatch pass. Its target, if any, must be a view of this window.
    pub fn post_event(&mut self, event: Event) -> Result<(), UiError> {
        if let Some(target) = event.target {
            if !self.tree.contains(target) {
                return Err(UiError::InvalidTarget(target));
            }
        }
        self.dispatch.post_event(event);
        return Ok(());
    }

    pub fn redirect_events(&mut self, kind: EventKind, to: Option<ViewI>) {
        self.dispatch.redirect_events(&self.tree, kind, to);
    }

    pub fn redirect_target(&self, kind: EventKind) -> Option<ViewI> {
        return self.dispatch.redirect_target(&self.tree, kind);
    }

    pub fn pending_events(&self) -> usize {
        return self.dispatch.pending_events();
    }

    /// Turns a platform notification into tree updates and posted events.
    pub fn handle_platform_event(&mut self, kind: PlatformEventKind) {
        let root = self.root;
        match kind {
            PlatformEventKind::Resized { size } => {
                let frame = self.frame().with_size(size);
                self.apply_platform_frame(frame);
                self.dispatch.post_event(Event::resize(Some(root), size).with_target(root));
            }
            PlatformEventKind::Moved { position } => {
                let frame = self.frame().with_origin(position);
                self.apply_platform_frame(frame);
                self.dispatch.post_event(Event::moved(Some(root), position).with_target(root));
            }
            PlatformEventKind::CloseRequested => {
                self.dispatch.post_event(Event::close_request(Some(root)).with_target(root));
                if self.close_policy == ClosePolicy::Close {
                    self.close();
                }
            }
            PlatformEventKind::CursorMoved { position } => {
                self.cursor_position = position;
                self.dispatch.post_event(Event::cursor_moved(Some(root), position));
            }
            PlatformEventKind::MouseButton { button, state } => {
                let event = Event::mouse_button(Some(root), button, state, self.modifiers, self.cursor_position);
                self.dispatch.post_event(event);
            }
            PlatformEventKind::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers;
            }
            PlatformEventKind::ScaleFactorChanged(scale_factor) => {
                self.tree.scale_factor = scale_factor;
                self.tree.invalidate(root, None);
            }
            PlatformEventKind::RedrawRequested => {
                self.tree.invalidate(root, None);
            }
        }
    }

    fn apply_platform_frame(&mut self, frame: Rect) {
        if self.in_frame_update {
            return;
        }
        self.in_frame_update = true;
        self.set_frame(frame);
        self.in_frame_update = false;
    }

    pub(crate) fn dispatch_events(&mut self, deferred: &mut Vec<Deferred>) {
        self.dispatch.dispatch_events(&mut self.tree, self.root, deferred);
    }

    /// Whether the next [`Window::present`] would draw anything.
    pub fn needs_redraw(&self) -> bool {
        return self.state == WindowState::Shown && self.platform_window.is_some() && self.tree.invalidated_region(self.root).is_some();
    }

    /// Whether any view of the window is waiting for layout.
    pub fn needs_layout(&self) -> bool {
        return self.tree.needs_layout_below(self.root);
    }

    pub fn layout_if_needed(&mut self) {
        self.tree.layout_if_needed(self.root);
    }

    /// Redraws the window if anything in it was invalidated, and presents the result.
    ///
    /// If drawing invalidates the window again, it's redrawn right away, up to [`MAX_INVALIDATE_LOOPS`] times. Whatever is still pending after that waits for the next tick.
    /// Hidden windows keep their pending region until they are shown.
    pub fn present(&mut self) -> Result<(), UiError> {
        if self.state != WindowState::Shown {
            return Ok(());
        }
        if self.tree.invalidated_region(self.root).is_none() {
            return Ok(());
        }
        let Some(platform_window) = self.platform_window.as_mut() else {
            return Ok(());
        };

        let scale_factor = platform_window.scale_factor();
        let cx = platform_window.drawing_context();
        cx.bind()?;

        let bounds = self.tree.bounds(self.root);
        let mut loops = 0;
        let mut drew = false;

        while let Some(region) = self.tree.take_invalidated(self.root) {
            if loops == MAX_INVALIDATE_LOOPS {
                log::warn!("Terminating window invalidation loop after {MAX_INVALIDATE_LOOPS} runs");
                self.tree.invalidate(self.root, Some(region));
                break;
            }
            loops += 1;

            if region.is_empty() {
                continue;
            }

            let region = match cx.preserves_contents() {
                true => region,
                false => bounds,
            };
            log::trace!("Redrawing {region} of window {:?}", self.id);

            cx.clear(region, scale_factor);
            self.tree.draw(self.root, &mut self.driver);
            let flushed = self.driver.flush(cx.gpu());
            self.driver.clear();
            flushed?;
            drew = true;
        }

        if drew {
            cx.swap_buffers()?;
        }
        return Ok(());
    }

    /// Loads an image file into a texture shared by name within this window.
    pub fn request_texture(&mut self, name: &str, path: impl AsRef<std::path::Path>) -> Result<TextureId, UiError> {
        let Some(platform_window) = self.platform_window.as_mut() else {
            return Err(UiError::Platform("window was released".to_owned()));
        };
        return self.textures.request(platform_window.drawing_context().gpu(), name, path);
    }

    pub fn request_texture_rgba(&mut self, name: &str, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, UiError> {
        let Some(platform_window) = self.platform_window.as_mut() else {
            return Err(UiError::Platform("window was released".to_owned()));
        };
        return self.textures.request_rgba(platform_window.drawing_context().gpu(), name, width, height, rgba);
    }

    pub fn release_texture(&mut self, name: &str) -> bool {
        let Some(platform_window) = self.platform_window.as_mut() else {
            return false;
        };
        return self.textures.release(platform_window.drawing_context().gpu(), name);
    }

    pub fn textures(&self) -> &TextureCache {
        return &self.textures;
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        self.release_platform_window();
    }
}
