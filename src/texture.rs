use std::path::Path;

use ahash::AHashMap;

use crate::*;

#[derive(Debug, Clone, Copy)]
struct CachedTexture {
    id: TextureId,
    width: u32,
    height: u32,
    refs: usize,
}

/// Textures shared by name.
///
/// Every successful `request_*` or [`TextureCache::retain`] adds a reference, and every [`TextureCache::release`] drops one.
/// When the last reference goes away the GPU texture is destroyed.
#[derive(Debug, Default)]
pub struct TextureCache {
    textures: AHashMap<String, CachedTexture>,
}

impl TextureCache {
    pub fn new() -> Self {
        return Self::default();
    }

    /// Loads the image at `path` under `name`, or returns the texture already loaded under that name.
    pub fn request(&mut self, gpu: &mut dyn GpuBackend, name: &str, path: impl AsRef<Path>) -> Result<TextureId, UiError> {
        if let Some(id) = self.retain(name) {
            return Ok(id);
        }
        log::debug!("Loading texture {name:?} from {}", path.as_ref().display());
        let image = image::open(path)?.to_rgba8();
        let (width, height) = image.dimensions();
        return self.insert(gpu, name, width, height, image.as_raw());
    }

    /// Like [`TextureCache::request`], with the encoded image (PNG etc.) already in memory.
    pub fn request_encoded(&mut self, gpu: &mut dyn GpuBackend, name: &str, bytes: &[u8]) -> Result<TextureId, UiError> {
        if let Some(id) = self.retain(name) {
            return Ok(id);
        }
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = image.dimensions();
        return self.insert(gpu, name, width, height, image.as_raw());
    }

    /// Like [`TextureCache::request`], with raw RGBA8 pixels.
    pub fn request_rgba(&mut self, gpu: &mut dyn GpuBackend, name: &str, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, UiError> {
        if let Some(id) = self.retain(name) {
            return Ok(id);
        }
        return self.insert(gpu, name, width, height, rgba);
    }

    fn insert(&mut self, gpu: &mut dyn GpuBackend, name: &str, width: u32, height: u32, rgba: &[u8]) -> Result<TextureId, UiError> {
        let id = gpu.create_texture(width, height, rgba)?;
        self.textures.insert(name.to_owned(), CachedTexture { id, width, height, refs: 1 });
        return Ok(id);
    }

    /// Adds a reference to an already loaded texture.
    pub fn retain(&mut self, name: &str) -> Option<TextureId> {
        let cached = self.textures.get_mut(name)?;
        cached.refs += 1;
        return Some(cached.id);
    }

    /// Drops a reference. Returns `true` if this was the last one and the texture was destroyed.
    pub fn release(&mut self, gpu: &mut dyn GpuBackend, name: &str) -> bool {
        let Some(cached) = self.textures.get_mut(name) else {
            log::warn!("Releasing texture {name:?}, which isn't loaded");
            return false;
        };

        cached.refs -= 1;
        if cached.refs > 0 {
            return false;
        }

        let id = cached.id;
        self.textures.remove(name);
        gpu.release_texture(id);
        log::debug!("Released texture {name:?}");
        return true;
    }

    /// Destroys every texture, regardless of references.
    pub fn release_all(&mut self, gpu: &mut dyn GpuBackend) {
        for (_, cached) in self.textures.drain() {
            gpu.release_texture(cached.id);
        }
    }

    pub fn get(&self, name: &str) -> Option<TextureId> {
        return self.textures.get(name).map(|cached| cached.id);
    }

    pub fn size(&self, name: &str) -> Option<(u32, u32)> {
        return self.textures.get(name).map(|cached| (cached.width, cached.height));
    }

    pub fn ref_count(&self, name: &str) -> usize {
        return self.textures.get(name).map_or(0, |cached| cached.refs);
    }

    pub fn len(&self) -> usize {
        return self.textures.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.textures.is_empty();
    }
}
