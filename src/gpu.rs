use crate::*;

/// An opaque handle to a texture owned by a [`GpuBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// The GPU primitives the [`Driver`] needs.
///
/// A backend owns exactly one vertex buffer and one index buffer. Indices are `u16`, relative to the `base_vertex` passed to [`GpuBackend::draw_indexed`].
/// The backend binds those buffers itself whenever it draws, and there's no way to query or change the binding through this trait.
/// The only binding the [`Driver`] saves and restores is the texture's.
pub trait GpuBackend {
    /// (Re)allocates the buffer with room for `size` bytes. The old contents are discarded.
    fn allocate_buffer(&mut self, kind: BufferKind, size: usize) -> Result<(), UiError>;

    /// Writes `data` into the buffer, starting at `offset` bytes.
    fn upload(&mut self, kind: BufferKind, offset: usize, data: &[u8]);

    fn bound_texture(&self) -> Option<TextureId>;

    /// `None` means untextured.
    fn bind_texture(&mut self, texture: Option<TextureId>);

    /// Draws `count` indices as triangles, starting at index `first_index`.
    fn draw_indexed(&mut self, first_index: u32, count: u32, base_vertex: i32);

    /// Creates a texture from tightly packed RGBA8 pixels.
    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, UiError>;

    fn release_texture(&mut self, texture: TextureId);
}

/// Something a window can present to.
pub trait DrawingContext {
    /// Makes this the target of the following draws.
    fn bind(&mut self) -> Result<(), UiError>;

    /// Whether the previous frame's pixels survive a [`DrawingContext::swap_buffers`]. If not, the whole window is redrawn every time.
    fn preserves_contents(&self) -> bool;

    /// Clears `region` (in logical pixels) before anything is drawn. `scale_factor` converts it to physical pixels.
    fn clear(&mut self, region: Rect, scale_factor: f32);

    fn gpu(&mut self) -> &mut dyn GpuBackend;

    /// Presents everything drawn since [`DrawingContext::bind`].
    fn swap_buffers(&mut self) -> Result<(), UiError>;
}
