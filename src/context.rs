use std::mem;

use crate::*;

/// A callback scheduled to run at the start of a later tick.
pub type Deferred = Box<dyn FnOnce(&mut Context)>;

/// Owns the platform and every open window, and runs the loop that drives them.
///
/// One [`Context::tick`]:
/// 1. runs the callbacks deferred during previous ticks,
/// 2. polls the platform for input (or blocks waiting for it, unless realtime mode is on or there's work pending),
/// 3. dispatches every window's queued events,
/// 4. calls the callback passed to [`Context::run_with`], if any,
/// 5. lays out and redraws the windows that need it,
/// 6. drops closed windows from the list.
pub struct Context {
    platform: Box<dyn Platform>,
    windows: Vec<Window>,
    next_window_id: u64,
    driver_config: DriverConfig,

    deferred: Vec<Deferred>,
    realtime: u32,
    quit_requested: bool,

    platform_events: Vec<PlatformEvent>,
}

impl Context {
    pub fn new(platform: impl Platform + 'static) -> Context {
        return Context::with_driver_config(platform, DriverConfig::default());
    }

    pub fn with_driver_config(platform: impl Platform + 'static, driver_config: DriverConfig) -> Context {
        return Context {
            platform: Box::new(platform),
            windows: Vec::new(),
            next_window_id: 1,
            driver_config,
            deferred: Vec::new(),
            realtime: 0,
            quit_requested: false,
            platform_events: Vec::with_capacity(32),
        };
    }

    pub fn open_window(&mut self, config: WindowConfig) -> Result<WindowId, UiError> {
        let id = WindowId(self.next_window_id);
        let platform_window = self.platform.create_window(id, &config)?;
        self.next_window_id += 1;

        log::debug!("Opened window {id:?} ({:?})", config.title);
        self.windows.push(Window::new(id, &config, platform_window, self.driver_config));
        return Ok(id);
    }

    pub fn window(&self, id: WindowId) -> Option<&Window> {
        return self.windows.iter().find(|window| window.id() == id);
    }

    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        return self.windows.iter_mut().find(|window| window.id() == id);
    }

    pub fn windows(&self) -> impl Iterator<Item = &Window> {
        return self.windows.iter();
    }

    /// Closes the window and takes it off the list right away. Its platform window is released by a deferred callback.
    pub fn close_window(&mut self, id: WindowId) {
        let Some(index) = self.windows.iter().position(|window| window.id() == id) else {
            return;
        };
        let mut window = self.windows.remove(index);
        window.close();
        self.post(move |_cx| {
            drop(window);
        });
    }

    fn sweep_closed_windows(&mut self) {
        let mut i = 0;
        while i < self.windows.len() {
            if self.windows[i].is_closed() {
                let id = self.windows[i].id();
                self.close_window(id);
            } else {
                i += 1;
            }
        }
    }

    /// While at least one enable isn't matched by a disable, the loop polls for input instead of waiting for it.
    pub fn enable_realtime(&mut self) {
        self.realtime += 1;
    }

    pub fn disable_realtime(&mut self) -> Result<(), UiError> {
        if self.realtime == 0 {
            return Err(UiError::RealtimeUnderflow);
        }
        self.realtime -= 1;
        return Ok(());
    }

    pub fn is_realtime(&self) -> bool {
        return self.realtime > 0;
    }

    /// Runs `f` at the start of the next tick.
    pub fn post(&mut self, f: impl FnOnce(&mut Context) + 'static) {
        self.deferred.push(Box::new(f));
    }

    /// Makes [`Context::run`] return after the current tick.
    pub fn quit(&mut self) {
        self.quit_requested = true;
    }

    pub fn request_texture(&mut self, id: WindowId, name: &str, path: impl AsRef<std::path::Path>) -> Result<TextureId, UiError> {
        let Some(window) = self.window_mut(id) else {
            return Err(UiError::Platform(format!("no open window {id:?}")));
        };
        return window.request_texture(name, path);
    }

    pub fn release_texture(&mut self, id: WindowId, name: &str) -> bool {
        return match self.window_mut(id) {
            Some(window) => window.release_texture(name),
            None => false,
        };
    }

    // Checked after the deferred callbacks ran, so it sees whatever they invalidated.
    fn has_pending_work(&self) -> bool {
        if !self.deferred.is_empty() {
            return true;
        }
        return self.windows.iter().any(|window| window.pending_events() > 0 || window.needs_redraw() || window.needs_layout());
    }

    /// One iteration of the loop.
    pub fn tick(&mut self) -> Result<(), UiError> {
        return self.tick_with(&mut |_cx: &mut Context| {});
    }

    fn tick_with(&mut self, per_tick: &mut dyn FnMut(&mut Context)) -> Result<(), UiError> {
        // callbacks posted while they run go to the next tick
        let deferred = mem::take(&mut self.deferred);
        for f in deferred {
            f(self);
        }

        let mut events = mem::take(&mut self.platform_events);
        if self.is_realtime() || self.has_pending_work() {
            self.platform.poll_events(&mut events);
        } else {
            self.platform.wait_events(&mut events);
        }

        for event in events.drain(..) {
            match self.window_mut(event.window) {
                Some(window) => window.handle_platform_event(event.kind),
                None => log::trace!("Dropping {:?} for a window that isn't open", event.kind),
            }
        }
        self.platform_events = events;

        for window in &mut self.windows {
            window.dispatch_events(&mut self.deferred);
        }

        per_tick(self);

        for window in &mut self.windows {
            window.layout_if_needed();
            window.present()?;
        }

        self.sweep_closed_windows();
        return Ok(());
    }

    /// Ticks until [`Context::quit`] is called or no window is left open.
    pub fn run(&mut self) -> Result<(), UiError> {
        return self.run_with(|_cx: &mut Context| {});
    }

    /// Like [`Context::run`], but calls `f` on every tick, after the events were dispatched and before the windows are redrawn.
    pub fn run_with(&mut self, mut f: impl FnMut(&mut Context)) -> Result<(), UiError> {
        self.quit_requested = false;
        while !self.quit_requested && !self.windows.is_empty() {
            self.tick_with(&mut f)?;
        }
        self.quit_requested = false;

        // windows closed on the last tick are released here
        let deferred = mem::take(&mut self.deferred);
        for f in deferred {
            f(self);
        }
        return Ok(());
    }
}
