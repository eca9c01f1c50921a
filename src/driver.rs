use std::mem::size_of;
use std::ops::{Deref, DerefMut};

use bytemuck::{Pod, Zeroable};
use glam::{vec2, Mat2, Vec2};

use crate::*;

pub const MAX_VERTICES_PER_STAGE: u32 = 65_536;
pub const DEFAULT_UV_MIN: Vec2 = Vec2::ZERO;
pub const DEFAULT_UV_MAX: Vec2 = Vec2::ONE;

const QUAD_VERTICES: u32 = 4;
const QUAD_FACES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Zeroable, Pod)]
#[repr(C)]
pub struct Vertex {
    pub position: [f32; 2],
    pub texcoord: [f32; 2],
    pub color: [f32; 4],
}

/// One triangle. Indices are relative to the stage's `base_vertex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct Face {
    pub indices: [u16; 3],
}

/// A run of consecutive quads sharing one texture, drawn with a single call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage {
    pub texture: Option<TextureId>,
    pub vertices: u32,
    /// Number of triangles.
    pub faces: u32,
    pub base_vertex: u32,
    pub base_face: u32,
}

bitflags::bitflags! {
    /// Which parts of the driver state a [`Driver::push_state`] saves.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateMask: u8 {
        const SCALE    = 1 << 0;
        const ORIGIN   = 1 << 1;
        const HANDLE   = 1 << 2;
        const ROTATION = 1 << 3;
        const COLOR    = 1 << 4;

        const ALL = Self::SCALE.bits() | Self::ORIGIN.bits() | Self::HANDLE.bits() | Self::ROTATION.bits() | Self::COLOR.bits();
    }
}

impl Default for StateMask {
    fn default() -> Self {
        return StateMask::ALL;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DrawState {
    scale: Vec2,
    origin: Vec2,
    handle: Vec2,
    rotation: f32,
    color: Color,
}

impl Default for DrawState {
    fn default() -> Self {
        return DrawState {
            scale: Vec2::ONE,
            origin: Vec2::ZERO,
            handle: Vec2::ZERO,
            rotation: 0.0,
            color: Color::WHITE,
        };
    }
}

#[derive(Debug, Clone, Copy)]
struct SavedState {
    mask: StateMask,
    state: DrawState,
}

/// The parameters of a [`Driver::draw_quad`] call.
///
/// `position` and `size` are required. The color defaults to the driver's current color, and the UVs to the whole texture.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Quad {
    pub position: Option<Vec2>,
    pub size: Option<Vec2>,
    pub color: Option<Color>,
    pub uv_min: Option<Vec2>,
    pub uv_max: Option<Vec2>,
}

impl Quad {
    pub fn new() -> Self {
        return Self::default();
    }

    pub fn rect(rect: Rect) -> Self {
        return Self::new().position(rect.origin).size(rect.size);
    }

    pub fn position(mut self, position: Vec2) -> Self {
        self.position = Some(position);
        return self;
    }

    pub fn size(mut self, size: Vec2) -> Self {
        self.size = Some(size);
        return self;
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = Some(color);
        return self;
    }

    pub fn uv(mut self, uv_min: Vec2, uv_max: Vec2) -> Self {
        self.uv_min = Some(uv_min);
        self.uv_max = Some(uv_max);
        return self;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverConfig {
    /// Number of quads the CPU-side arrays have room for before growing.
    pub initial_capacity: usize,
    /// Clamped to `4..=`[`MAX_VERTICES_PER_STAGE`] by [`Driver::new`]: a stage holds at least one quad, and its indices must fit in a `u16`.
    pub max_vertices_per_stage: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        return DriverConfig {
            initial_capacity: 64,
            max_vertices_per_stage: MAX_VERTICES_PER_STAGE,
        };
    }
}

/// Batches quads into vertex and index arrays, and submits them to a [`GpuBackend`].
///
/// Coordinates are logical pixels with y pointing down. Each quad is placed at `position + origin`, with its corners rotated and scaled around `handle` (0..1 across the quad, (0, 0) being the top-left corner).
///
/// Quads are grouped into [`Stage`]s: a new stage starts whenever the texture changes or the current stage is full. Two quads with the same texture that are separated by a different one end up in different stages.
pub struct Driver {
    config: DriverConfig,

    state: DrawState,
    saved: Vec<SavedState>,

    transform: Mat2,
    transform_dirty: bool,

    vertices: Vec<Vertex>,
    faces: Vec<Face>,
    stages: Vec<Stage>,

    // sizes of the GPU buffers, in bytes
    vertex_buffer_capacity: usize,
    index_buffer_capacity: usize,
    refresh_needed: bool,
}

impl Default for Driver {
    fn default() -> Self {
        return Driver::new(DriverConfig::default());
    }
}

impl Driver {
    pub fn new(mut config: DriverConfig) -> Self {
        let max_vertices = config.max_vertices_per_stage.clamp(QUAD_VERTICES, MAX_VERTICES_PER_STAGE);
        if max_vertices != config.max_vertices_per_stage {
            log::warn!("max_vertices_per_stage {} is out of range, using {max_vertices}", config.max_vertices_per_stage);
            config.max_vertices_per_stage = max_vertices;
        }
        let capacity = config.initial_capacity;
        return Driver {
            config,
            state: DrawState::default(),
            saved: Vec::with_capacity(16),
            transform: Mat2::IDENTITY,
            transform_dirty: true,
            vertices: Vec::with_capacity(capacity * QUAD_VERTICES as usize),
            faces: Vec::with_capacity(capacity * QUAD_FACES as usize),
            stages: Vec::with_capacity(8),
            vertex_buffer_capacity: 0,
            index_buffer_capacity: 0,
            refresh_needed: false,
        };
    }

    pub fn config(&self) -> &DriverConfig {
        return &self.config;
    }

    pub fn scale(&self) -> Vec2 {
        return self.state.scale;
    }

    pub fn set_scale(&mut self, scale: Vec2) {
        if scale != self.state.scale {
            self.transform_dirty = true;
        }
        self.state.scale = scale;
    }

    pub fn rotation(&self) -> f32 {
        return self.state.rotation;
    }

    /// Radians, clockwise on screen.
    pub fn set_rotation(&mut self, rotation: f32) {
        if rotation != self.state.rotation {
            self.transform_dirty = true;
        }
        self.state.rotation = rotation;
    }

    pub fn origin(&self) -> Vec2 {
        return self.state.origin;
    }

    pub fn set_origin(&mut self, origin: Vec2) {
        self.state.origin = origin;
    }

    pub fn handle(&self) -> Vec2 {
        return self.state.handle;
    }

    pub fn set_handle(&mut self, handle: Vec2) {
        self.state.handle = handle;
    }

    pub fn color(&self) -> Color {
        return self.state.color;
    }

    pub fn set_color(&mut self, color: Color) {
        self.state.color = color;
    }

    /// Saves the parts of the state selected by `mask`, to be restored by [`Driver::pop_state`].
    pub fn push_state(&mut self, mask: StateMask) {
        self.saved.push(SavedState { mask, state: self.state });
    }

    pub fn pop_state(&mut self) -> Result<(), UiError> {
        let Some(saved) = self.saved.pop() else {
            return Err(UiError::StateUnderflow);
        };

        if saved.mask.contains(StateMask::SCALE) {
            self.set_scale(saved.state.scale);
        }
        if saved.mask.contains(StateMask::ORIGIN) {
            self.state.origin = saved.state.origin;
        }
        if saved.mask.contains(StateMask::HANDLE) {
            self.state.handle = saved.state.handle;
        }
        if saved.mask.contains(StateMask::ROTATION) {
            self.set_rotation(saved.state.rotation);
        }
        if saved.mask.contains(StateMask::COLOR) {
            self.state.color = saved.state.color;
        }
        return Ok(());
    }

    /// Pushes the state and returns a guard that pops it (and anything pushed after it) when dropped.
    ///
    /// The guard derefs to the driver, so it can be drawn through directly.
    pub fn scoped_state(&mut self, mask: StateMask) -> StateGuard<'_> {
        let depth = self.saved.len();
        self.push_state(mask);
        return StateGuard { driver: self, depth };
    }

    pub fn state_depth(&self) -> usize {
        return self.saved.len();
    }

    /// Scale and rotation, recomputed only when one of them changed.
    pub fn transform(&mut self) -> Mat2 {
        if self.transform_dirty {
            self.transform = Mat2::from_diagonal(self.state.scale) * Mat2::from_angle(self.state.rotation);
            self.transform_dirty = false;
        }
        return self.transform;
    }

    /// Returns the index of the stage the next quad with `texture` goes into, opening a new one if needed.
    pub fn stage_for(&mut self, texture: Option<TextureId>) -> usize {
        let mut base_vertex = 0;
        let mut base_face = 0;

        if let Some(current) = self.stages.last() {
            if current.texture == texture && current.vertices + QUAD_VERTICES <= self.config.max_vertices_per_stage {
                return self.stages.len() - 1;
            }
            base_vertex = current.base_vertex + current.vertices;
            base_face = current.base_face + current.faces;
        }

        log::trace!("Opening stage {} for {:?} at vertex {}", self.stages.len(), texture, base_vertex);
        self.stages.push(Stage {
            texture,
            vertices: 0,
            faces: 0,
            base_vertex,
            base_face,
        });
        return self.stages.len() - 1;
    }

    pub fn draw_quad(&mut self, texture: Option<TextureId>, quad: Quad) -> Result<(), UiError> {
        let position = quad.position.ok_or(UiError::MissingGeometry("position"))?;
        let size = quad.size.ok_or(UiError::MissingGeometry("size"))?;
        let color = quad.color.unwrap_or(self.state.color).to_array();
        let uv_min = quad.uv_min.unwrap_or(DEFAULT_UV_MIN);
        let uv_max = quad.uv_max.unwrap_or(DEFAULT_UV_MAX);

        let transform = self.transform();
        let stage_i = self.stage_for(texture);
        self.ensure_capacity(QUAD_VERTICES as usize, QUAD_FACES as usize);
        self.refresh_needed = true;

        let anchor = position + self.state.origin;
        let top_left = -(self.state.handle * size);
        let bottom_right = top_left + size;

        let corners = [
            (top_left, vec2(uv_min.x, uv_min.y)),
            (vec2(bottom_right.x, top_left.y), vec2(uv_max.x, uv_min.y)),
            (bottom_right, vec2(uv_max.x, uv_max.y)),
            (vec2(top_left.x, bottom_right.y), vec2(uv_min.x, uv_max.y)),
        ];
        for (corner, uv) in corners {
            let position = anchor + transform * corner;
            self.vertices.push(Vertex {
                position: position.to_array(),
                texcoord: uv.to_array(),
                color,
            });
        }

        let stage = &mut self.stages[stage_i];
        let first = stage.vertices as u16;
        self.faces.push(Face { indices: [first, first + 1, first + 2] });
        self.faces.push(Face { indices: [first + 2, first + 3, first] });
        stage.vertices += QUAD_VERTICES;
        stage.faces += QUAD_FACES;

        return Ok(());
    }

    // Makes room for `vertices` and `faces` more elements, doubling the arrays when they're full.
    fn ensure_capacity(&mut self, vertices: usize, faces: usize) {
        let needed = self.vertices.len() + vertices;
        let capacity = ensure_array_capacity(self.vertices.capacity(), needed);
        self.vertices.reserve_exact(capacity - self.vertices.len());

        let needed = self.faces.len() + faces;
        let capacity = ensure_array_capacity(self.faces.capacity(), needed);
        self.faces.reserve_exact(capacity - self.faces.len());
    }

    /// Forgets everything drawn so far. The arrays keep their capacity.
    pub fn clear(&mut self) {
        self.stages.clear();
        self.vertices.clear();
        self.faces.clear();
    }

    pub fn stages(&self) -> &[Stage] {
        return &self.stages;
    }

    pub fn vertices(&self) -> &[Vertex] {
        return &self.vertices;
    }

    pub fn faces(&self) -> &[Face] {
        return &self.faces;
    }

    pub fn vertex_capacity(&self) -> usize {
        return self.vertices.capacity();
    }

    /// Size in bytes of the vertex data drawn so far.
    pub fn vertex_data_size(&self) -> usize {
        let count = match self.stages.last() {
            Some(stage) => (stage.base_vertex + stage.vertices) as usize,
            None => 0,
        };
        return count * size_of::<Vertex>();
    }

    /// Size in bytes of the index data drawn so far.
    pub fn index_data_size(&self) -> usize {
        let count = match self.stages.last() {
            Some(stage) => (stage.base_face + stage.faces) as usize,
            None => 0,
        };
        return count * size_of::<Face>();
    }

    /// Uploads the arrays if anything was drawn since the last flush, then issues one draw per non-empty stage.
    ///
    /// The texture bound before the call is bound again afterwards.
    /// Buffer bindings aren't touched here: the vertex and index buffers belong to the backend, which binds them itself.
    pub fn flush(&mut self, gpu: &mut dyn GpuBackend) -> Result<(), UiError> {
        if self.refresh_needed {
            let vertex_data: &[u8] = bytemuck::cast_slice(&self.vertices);
            let index_data: &[u8] = bytemuck::cast_slice(&self.faces);

            let new_capacity = ensure_buffer_object_capacity(self.vertex_buffer_capacity, vertex_data.len());
            if new_capacity != self.vertex_buffer_capacity {
                gpu.allocate_buffer(BufferKind::Vertex, new_capacity)?;
                self.vertex_buffer_capacity = new_capacity;
            }
            let new_capacity = ensure_buffer_object_capacity(self.index_buffer_capacity, index_data.len());
            if new_capacity != self.index_buffer_capacity {
                gpu.allocate_buffer(BufferKind::Index, new_capacity)?;
                self.index_buffer_capacity = new_capacity;
            }

            gpu.upload(BufferKind::Vertex, 0, vertex_data);
            gpu.upload(BufferKind::Index, 0, index_data);
            self.refresh_needed = false;
        }

        if self.stages.is_empty() {
            return Ok(());
        }

        log::trace!("Flushing {} stages, {} vertices", self.stages.len(), self.vertices.len());

        let previous = gpu.bound_texture();
        for stage in &self.stages {
            if stage.faces == 0 {
                continue;
            }
            gpu.bind_texture(stage.texture);
            gpu.draw_indexed(stage.base_face * 3, stage.faces * 3, stage.base_vertex as i32);
        }
        gpu.bind_texture(previous);

        return Ok(());
    }
}

/// The capacity an array should have to hold `needed` elements: unchanged if it's enough, otherwise doubled, or exactly `needed` if doubling isn't enough.
pub(crate) fn ensure_array_capacity(current: usize, needed: usize) -> usize {
    if needed <= current {
        return current;
    }
    return needed.max(current * 2);
}

/// Same policy as [`ensure_array_capacity`], for GPU buffer sizes in bytes.
pub(crate) fn ensure_buffer_object_capacity(current: usize, needed: usize) -> usize {
    return ensure_array_capacity(current, needed);
}

/// Returned by [`Driver::scoped_state`].
pub struct StateGuard<'a> {
    driver: &'a mut Driver,
    depth: usize,
}

impl Deref for StateGuard<'_> {
    type Target = Driver;
    fn deref(&self) -> &Driver {
        return &*self.driver;
    }
}

impl DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut Driver {
        return &mut *self.driver;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        while self.driver.saved.len() > self.depth {
            // can't underflow, the stack is deeper than `depth`
            let _ = self.driver.pop_state();
        }
    }
}
