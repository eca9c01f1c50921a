//! The [`Platform`] for desktop windows: `winit` for windowing and input, `wgpu` for drawing.
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use glam::vec2;
use wgpu::{Instance, InstanceDescriptor};
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalPosition, LogicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::Window as OsWindow;

use crate::*;

// Collects the events winit hands out while it's being pumped.
#[derive(Default)]
struct EventCollector {
    ids: AHashMap<winit::window::WindowId, WindowId>,
    scale_factors: AHashMap<winit::window::WindowId, f64>,
    events: Vec<PlatformEvent>,
    exited: bool,
}

impl ApplicationHandler for EventCollector {
    fn resumed(&mut self, _event_loop: &ActiveEventLoop) {}

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, window_id: winit::window::WindowId, event: WindowEvent) {
        let Some(&window) = self.ids.get(&window_id) else {
            return;
        };
        let scale = self.scale_factors.get(&window_id).copied().unwrap_or(1.0);

        let kind = match event {
            WindowEvent::Resized(size) => {
                let size = size.to_logical::<f32>(scale);
                PlatformEventKind::Resized { size: vec2(size.width, size.height) }
            }
            WindowEvent::Moved(position) => {
                let position = position.to_logical::<f32>(scale);
                PlatformEventKind::Moved { position: vec2(position.x, position.y) }
            }
            WindowEvent::CloseRequested => PlatformEventKind::CloseRequested,
            WindowEvent::CursorMoved { position, .. } => {
                let position = position.to_logical::<f32>(scale);
                PlatformEventKind::CursorMoved { position: vec2(position.x, position.y) }
            }
            WindowEvent::MouseInput { state, button, .. } => PlatformEventKind::MouseButton { button, state },
            WindowEvent::ModifiersChanged(modifiers) => PlatformEventKind::ModifiersChanged(modifiers.state()),
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factors.insert(window_id, scale_factor);
                PlatformEventKind::ScaleFactorChanged(scale_factor as f32)
            }
            WindowEvent::RedrawRequested => PlatformEventKind::RedrawRequested,
            _ => return,
        };
        self.events.push(PlatformEvent { window, kind });
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.exited = true;
    }
}

/// A desktop platform.
///
/// All windows share one `wgpu` device, created along with the first window.
pub struct WinitPlatform {
    event_loop: EventLoop<()>,
    collector: EventCollector,
    instance: Option<Instance>,
    shared: Option<Rc<WgpuShared>>,
    config: WgpuConfig,
}

impl WinitPlatform {
    pub fn new() -> Result<Self, UiError> {
        return WinitPlatform::with_config(WgpuConfig::default());
    }

    pub fn with_config(config: WgpuConfig) -> Result<Self, UiError> {
        let event_loop = EventLoop::new().map_err(|e| UiError::Platform(e.to_string()))?;
        return Ok(WinitPlatform {
            event_loop,
            collector: EventCollector::default(),
            instance: Some(Instance::new(InstanceDescriptor::default())),
            shared: None,
            config,
        });
    }

    fn pump(&mut self, timeout: Option<Duration>, out: &mut Vec<PlatformEvent>) {
        let status = self.event_loop.pump_app_events(timeout, &mut self.collector);
        if let PumpStatus::Exit(code) = status {
            if !self.collector.exited {
                log::info!("Event loop exited with code {code}");
            }
            self.collector.exited = true;
        }
        out.append(&mut self.collector.events);
    }
}

impl Platform for WinitPlatform {
    fn create_window(&mut self, id: WindowId, config: &WindowConfig) -> Result<Box<dyn PlatformWindow>, UiError> {
        let frame = config.frame;
        let attributes = OsWindow::default_attributes()
            .with_title(&config.title)
            .with_inner_size(LogicalSize::new(frame.width(), frame.height()))
            .with_position(LogicalPosition::new(frame.origin.x, frame.origin.y))
            .with_visible(false);

        // the platform owns the loop, so windows can't be created from inside `resumed()`
        #[allow(deprecated)]
        let window = self.event_loop.create_window(attributes).map_err(|e| UiError::Platform(e.to_string()))?;
        let window = Arc::new(window);

        let surface = match (&self.shared, &self.instance) {
            (Some(shared), _) => shared.instance.create_surface(window.clone()),
            (None, Some(instance)) => instance.create_surface(window.clone()),
            (None, None) => return Err(UiError::Gpu("no wgpu instance".to_owned())),
        };
        let surface = surface.map_err(|e| UiError::Gpu(e.to_string()))?;

        let shared = match &self.shared {
            Some(shared) => shared.clone(),
            None => {
                let Some(instance) = self.instance.take() else {
                    return Err(UiError::Gpu("no wgpu instance".to_owned()));
                };
                let shared = Rc::new(WgpuShared::new(instance, &surface)?);
                self.shared = Some(shared.clone());
                shared
            }
        };

        let context = WgpuDrawingContext::new(shared, window.clone(), surface, &self.config)?;

        self.collector.ids.insert(window.id(), id);
        self.collector.scale_factors.insert(window.id(), window.scale_factor());
        log::debug!("Created OS window {:?} for {id:?}", window.id());

        return Ok(Box::new(WinitWindow { window, context }));
    }

    fn poll_events(&mut self, out: &mut Vec<PlatformEvent>) {
        self.pump(Some(Duration::ZERO), out);
    }

    fn wait_events(&mut self, out: &mut Vec<PlatformEvent>) {
        if self.collector.exited {
            return;
        }
        self.pump(None, out);
    }
}

pub struct WinitWindow {
    window: Arc<OsWindow>,
    context: WgpuDrawingContext,
}

impl WinitWindow {
    pub fn os_window(&self) -> &OsWindow {
        return &self.window;
    }
}

impl PlatformWindow for WinitWindow {
    fn show(&mut self) {
        self.window.set_visible(true);
        self.window.request_redraw();
    }

    fn hide(&mut self) {
        self.window.set_visible(false);
    }

    fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    fn set_frame(&mut self, frame: Rect) {
        self.window.set_outer_position(LogicalPosition::new(frame.origin.x, frame.origin.y));
        // the new size arrives later as a Resized event
        let _ = self.window.request_inner_size(LogicalSize::new(frame.width(), frame.height()));
    }

    fn scale_factor(&self) -> f32 {
        return self.window.scale_factor() as f32;
    }

    fn drawing_context(&mut self) -> &mut dyn DrawingContext {
        return &mut self.context;
    }
}
