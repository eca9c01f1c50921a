//! An in-memory [`Platform`] and a [`GpuBackend`] that records what it's asked to do.
//!
//! Used to drive a [`Context`] without a display: push platform events with [`HeadlessPlatform::push_event`], call [`Context::tick`], then look at the recorded calls.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use crate::*;

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    AllocateBuffer(BufferKind, usize),
    Upload { kind: BufferKind, offset: usize, len: usize },
    BindTexture(Option<TextureId>),
    DrawIndexed { first_index: u32, count: u32, base_vertex: i32 },
    CreateTexture { texture: TextureId, width: u32, height: u32 },
    ReleaseTexture(TextureId),
    Bind,
    Clear(Rect),
    SwapBuffers,
}

pub type GpuLog = Rc<RefCell<Vec<GpuCall>>>;

/// A [`GpuBackend`] that keeps buffer contents in memory and logs every call.
#[derive(Debug, Default)]
pub struct RecordingGpu {
    log: GpuLog,
    bound: Option<TextureId>,
    next_texture: u32,
    live: AHashSet<TextureId>,
    vertex_buffer: Vec<u8>,
    index_buffer: Vec<u8>,
}

impl RecordingGpu {
    pub fn with_log(log: GpuLog) -> Self {
        return RecordingGpu { log, ..Default::default() };
    }

    pub fn log(&self) -> GpuLog {
        return self.log.clone();
    }

    pub fn calls(&self) -> Vec<GpuCall> {
        return self.log.borrow().clone();
    }

    pub fn live_textures(&self) -> usize {
        return self.live.len();
    }

    pub fn buffer(&self, kind: BufferKind) -> &[u8] {
        return match kind {
            BufferKind::Vertex => &self.vertex_buffer,
            BufferKind::Index => &self.index_buffer,
        };
    }

    fn record(&self, call: GpuCall) {
        self.log.borrow_mut().push(call);
    }
}

impl GpuBackend for RecordingGpu {
    fn allocate_buffer(&mut self, kind: BufferKind, size: usize) -> Result<(), UiError> {
        match kind {
            BufferKind::Vertex => self.vertex_buffer = vec![0; size],
            BufferKind::Index => self.index_buffer = vec![0; size],
        }
        self.record(GpuCall::AllocateBuffer(kind, size));
        return Ok(());
    }

    fn upload(&mut self, kind: BufferKind, offset: usize, data: &[u8]) {
        let buffer = match kind {
            BufferKind::Vertex => &mut self.vertex_buffer,
            BufferKind::Index => &mut self.index_buffer,
        };
        let end = offset + data.len();
        if end > buffer.len() {
            log::warn!("Upload of {} bytes at {offset} overflows the {kind:?} buffer ({} bytes)", data.len(), buffer.len());
            return;
        }
        buffer[offset..end].copy_from_slice(data);
        self.record(GpuCall::Upload { kind, offset, len: data.len() });
    }

    fn bound_texture(&self) -> Option<TextureId> {
        return self.bound;
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        self.bound = texture;
        self.record(GpuCall::BindTexture(texture));
    }

    fn draw_indexed(&mut self, first_index: u32, count: u32, base_vertex: i32) {
        self.record(GpuCall::DrawIndexed { first_index, count, base_vertex });
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, UiError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(UiError::Gpu(format!("expected {expected} bytes of RGBA data, got {}", rgba.len())));
        }
        self.next_texture += 1;
        let texture = TextureId(self.next_texture);
        self.live.insert(texture);
        self.record(GpuCall::CreateTexture { texture, width, height });
        return Ok(texture);
    }

    fn release_texture(&mut self, texture: TextureId) {
        self.live.remove(&texture);
        self.record(GpuCall::ReleaseTexture(texture));
    }
}

/// The drawing side of a [`HeadlessWindow`].
#[derive(Debug)]
pub struct HeadlessDrawingContext {
    gpu: RecordingGpu,
    preserves_contents: bool,
}

impl DrawingContext for HeadlessDrawingContext {
    fn bind(&mut self) -> Result<(), UiError> {
        self.gpu.record(GpuCall::Bind);
        return Ok(());
    }

    fn preserves_contents(&self) -> bool {
        return self.preserves_contents;
    }

    fn clear(&mut self, region: Rect, _scale_factor: f32) {
        self.gpu.record(GpuCall::Clear(region));
    }

    fn gpu(&mut self) -> &mut dyn GpuBackend {
        return &mut self.gpu;
    }

    fn swap_buffers(&mut self) -> Result<(), UiError> {
        self.gpu.record(GpuCall::SwapBuffers);
        return Ok(());
    }
}

/// What a test can observe about a headless window.
#[derive(Debug)]
pub struct HeadlessWindowState {
    pub title: String,
    pub frame: Rect,
    pub visible: bool,
    pub scale_factor: f32,
    /// Set once the window has been dropped.
    pub released: bool,
    /// Number of `set_frame` calls that reached the platform.
    pub frame_updates: usize,
    pub gpu_log: GpuLog,
}

pub struct HeadlessWindow {
    state: Rc<RefCell<HeadlessWindowState>>,
    context: HeadlessDrawingContext,
}

impl PlatformWindow for HeadlessWindow {
    fn show(&mut self) {
        self.state.borrow_mut().visible = true;
    }

    fn hide(&mut self) {
        self.state.borrow_mut().visible = false;
    }

    fn set_title(&mut self, title: &str) {
        self.state.borrow_mut().title = title.to_owned();
    }

    fn set_frame(&mut self, frame: Rect) {
        let mut state = self.state.borrow_mut();
        state.frame = frame;
        state.frame_updates += 1;
    }

    fn scale_factor(&self) -> f32 {
        return self.state.borrow().scale_factor;
    }

    fn drawing_context(&mut self) -> &mut dyn DrawingContext {
        return &mut self.context;
    }
}

impl Drop for HeadlessWindow {
    fn drop(&mut self) {
        self.state.borrow_mut().released = true;
    }
}

#[derive(Debug, Default)]
struct HeadlessShared {
    queued: VecDeque<PlatformEvent>,
    windows: AHashMap<WindowId, Rc<RefCell<HeadlessWindowState>>>,
    polls: usize,
    waits: usize,
    preserves_contents: bool,
    scale_factor: f32,
}

/// A [`Platform`] whose input is scripted.
///
/// Cloning gives another handle to the same platform, so a test can keep one after moving the platform into a [`Context`].
/// Waiting for events never blocks: with an empty queue it returns right away.
#[derive(Debug, Clone)]
pub struct HeadlessPlatform {
    shared: Rc<RefCell<HeadlessShared>>,
}

impl Default for HeadlessPlatform {
    fn default() -> Self {
        return HeadlessPlatform::new();
    }
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        let shared = HeadlessShared {
            preserves_contents: true,
            scale_factor: 1.0,
            ..Default::default()
        };
        return HeadlessPlatform { shared: Rc::new(RefCell::new(shared)) };
    }

    /// Applies to windows created afterwards.
    pub fn set_preserves_contents(&self, preserves_contents: bool) {
        self.shared.borrow_mut().preserves_contents = preserves_contents;
    }

    /// Applies to windows created afterwards.
    pub fn set_scale_factor(&self, scale_factor: f32) {
        self.shared.borrow_mut().scale_factor = scale_factor;
    }

    pub fn push_event(&self, window: WindowId, kind: PlatformEventKind) {
        self.shared.borrow_mut().queued.push_back(PlatformEvent { window, kind });
    }

    pub fn window_state(&self, window: WindowId) -> Option<Rc<RefCell<HeadlessWindowState>>> {
        return self.shared.borrow().windows.get(&window).cloned();
    }

    /// The calls recorded by the window's GPU backend and drawing context so far.
    pub fn gpu_calls(&self, window: WindowId) -> Vec<GpuCall> {
        return match self.window_state(window) {
            Some(state) => state.borrow().gpu_log.borrow().clone(),
            None => Vec::new(),
        };
    }

    pub fn clear_gpu_calls(&self, window: WindowId) {
        if let Some(state) = self.window_state(window) {
            state.borrow().gpu_log.borrow_mut().clear();
        }
    }

    pub fn polls(&self) -> usize {
        return self.shared.borrow().polls;
    }

    pub fn waits(&self) -> usize {
        return self.shared.borrow().waits;
    }

    fn drain(&self, out: &mut Vec<PlatformEvent>) {
        out.extend(self.shared.borrow_mut().queued.drain(..));
    }
}

impl Platform for HeadlessPlatform {
    fn create_window(&mut self, id: WindowId, config: &WindowConfig) -> Result<Box<dyn PlatformWindow>, UiError> {
        let mut shared = self.shared.borrow_mut();
        let gpu_log = GpuLog::default();
        let state = Rc::new(RefCell::new(HeadlessWindowState {
            title: config.title.clone(),
            frame: config.frame,
            visible: false,
            scale_factor: shared.scale_factor,
            released: false,
            frame_updates: 0,
            gpu_log: gpu_log.clone(),
        }));
        shared.windows.insert(id, state.clone());

        let context = HeadlessDrawingContext {
            gpu: RecordingGpu::with_log(gpu_log),
            preserves_contents: shared.preserves_contents,
        };
        return Ok(Box::new(HeadlessWindow { state, context }));
    }

    fn poll_events(&mut self, out: &mut Vec<PlatformEvent>) {
        self.shared.borrow_mut().polls += 1;
        self.drain(out);
    }

    fn wait_events(&mut self, out: &mut Vec<PlatformEvent>) {
        self.shared.borrow_mut().waits += 1;
        self.drain(out);
    }
}
