use std::sync::{Arc, Mutex, Weak};

use crate::backend::GpuDevice;
use crate::bin_packer::BinPacker;
use crate::bitmap::Bitmap;
use crate::drawable::ImageFlags;
use crate::error::{Error, Result};
use crate::texture::{TexChunk, Texture};
use crate::utils::{lock, Rect};

/// Textures with spare room that new images may be packed into.
///
/// Only weak references are held: a texture lives as long as one of its chunks does.
/// The mutex is the one lock serializing texture allocation across threads.
#[derive(Debug)]
pub struct AtlasPool {
    device: Arc<dyn GpuDevice>,
    texture_size: u32,
    row_step: u32,
    column_step: u32,
    textures: Mutex<Vec<Weak<Texture>>>,
}

impl AtlasPool {
    pub fn new(device: Arc<dyn GpuDevice>, texture_size: u32) -> Self {
        Self::with_steps(
            device,
            texture_size,
            crate::bin_packer::DEFAULT_ROW_STEP,
            crate::bin_packer::DEFAULT_COLUMN_STEP,
        )
    }

    pub fn with_steps(
        device: Arc<dyn GpuDevice>,
        texture_size: u32,
        row_step: u32,
        column_step: u32,
    ) -> Self {
        Self {
            device,
            texture_size,
            row_step,
            column_step,
            textures: Mutex::new(Vec::new()),
        }
    }

    pub fn texture_size(&self) -> u32 {
        self.texture_size
    }

    /// Number of pooled textures still alive.
    pub fn texture_count(&self) -> usize {
        lock(&self.textures)
            .iter()
            .filter(|t| t.strong_count() > 0)
            .count()
    }

    /// Packs `src_rect` of `bitmap` into the first pooled texture with room and matching
    /// filtering, creating a new texture when none has room.
    pub fn alloc(
        &self,
        bitmap: &Bitmap,
        src_rect: Rect,
        flags: ImageFlags,
        padding: u32,
    ) -> Result<TexChunk> {
        let retro = flags.is_retro();
        let mut textures = lock(&self.textures);
        textures.retain(|t| t.strong_count() > 0);

        for texture in textures.iter().filter_map(Weak::upgrade) {
            if texture.retro() != retro {
                continue;
            }
            if let Some(chunk) = texture.try_alloc_with_flags(bitmap, src_rect, flags, padding)? {
                return Ok(chunk);
            }
        }

        let packer = BinPacker::with_steps(
            self.texture_size,
            self.texture_size,
            self.row_step,
            self.column_step,
        );
        let texture = Arc::new(Texture::with_packer(Arc::clone(&self.device), packer, retro)?);
        textures.push(Arc::downgrade(&texture));
        log::debug!("atlas pool grew to {} textures", textures.len());

        texture
            .try_alloc_with_flags(bitmap, src_rect, flags, padding)?
            .ok_or_else(|| {
                Error::logic(format!(
                    "{}x{} image does not fit a fresh {}px texture",
                    src_rect.width, src_rect.height, self.texture_size
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareDevice;

    fn pool(size: u32) -> (SoftwareDevice, AtlasPool) {
        let device = SoftwareDevice::default();
        let pool = AtlasPool::new(Arc::new(device.clone()), size);
        (device, pool)
    }

    #[test]
    fn expired_textures_are_pruned() {
        let (device, pool) = pool(32);
        let bitmap = Bitmap::new(4, 4);
        let chunk = pool.alloc(&bitmap, Rect::new(0, 0, 4, 4), ImageFlags::empty(), 1).unwrap();
        assert_eq!(pool.texture_count(), 1);
        drop(chunk);
        assert_eq!(pool.texture_count(), 0);
        assert_eq!(device.surface_count(), 0);
    }

    #[test]
    fn retro_images_get_their_own_textures() {
        let (_, pool) = pool(32);
        let bitmap = Bitmap::new(4, 4);
        let rect = Rect::new(0, 0, 4, 4);
        let smooth = pool.alloc(&bitmap, rect, ImageFlags::empty(), 1).unwrap();
        let retro = pool.alloc(&bitmap, rect, ImageFlags::RETRO, 1).unwrap();
        assert_ne!(smooth.texture().key(), retro.texture().key());
        assert!(retro.texture().retro());
        let again = pool.alloc(&bitmap, rect, ImageFlags::RETRO, 1).unwrap();
        assert_eq!(again.texture().key(), retro.texture().key());
    }

    #[test]
    fn full_texture_spills_into_a_new_one() {
        let (_, pool) = pool(16);
        let bitmap = Bitmap::new(14, 14);
        let rect = Rect::new(0, 0, 14, 14);
        let _a = pool.alloc(&bitmap, rect, ImageFlags::empty(), 1).unwrap();
        let _b = pool.alloc(&bitmap, rect, ImageFlags::empty(), 1).unwrap();
        assert_eq!(pool.texture_count(), 2);
    }

    #[test]
    fn oversized_request_is_a_logic_error() {
        let (_, pool) = pool(16);
        let bitmap = Bitmap::new(16, 16);
        let result = pool.alloc(&bitmap, Rect::new(0, 0, 16, 16), ImageFlags::empty(), 1);
        assert!(matches!(result, Err(Error::Logic(_))));
    }
}
