use std::sync::Arc;

use crate::atlas_pool::AtlasPool;
use crate::backend::GpuDevice;
use crate::bitmap::Bitmap;
use crate::config::GraphicsConfig;
use crate::drawable::{Drawable, EmptyDrawable, ImageFlags};
use crate::error::{Error, Result};
use crate::large_image::TiledDrawable;
use crate::texture::Texture;
use crate::utils::Rect;

/// Turns bitmaps into drawables. Cheap to clone and usable from any thread; clones
/// share one [`AtlasPool`].
#[derive(Debug, Clone)]
pub struct ImageFactory {
    device: Arc<dyn GpuDevice>,
    pool: Arc<AtlasPool>,
    config: GraphicsConfig,
}

impl ImageFactory {
    pub fn new(device: Arc<dyn GpuDevice>, mut config: GraphicsConfig) -> Self {
        config.max_texture_size = config.max_texture_size.min(device.max_texture_size());
        let pool = AtlasPool::with_steps(
            Arc::clone(&device),
            config.max_texture_size,
            config.packer_row_step,
            config.packer_column_step,
        );
        Self {
            device,
            pool: Arc::new(pool),
            config,
        }
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    pub fn pool(&self) -> &AtlasPool {
        &self.pool
    }

    pub fn config(&self) -> &GraphicsConfig {
        &self.config
    }

    pub fn max_texture_size(&self) -> u32 {
        self.config.max_texture_size
    }

    pub fn create_image_from(&self, bitmap: &Bitmap, flags: ImageFlags) -> Result<Box<dyn Drawable>> {
        self.create_image(bitmap, Rect::with_size(bitmap.width(), bitmap.height()), flags)
    }

    /// Creates a drawable from `src_rect` of `bitmap`.
    ///
    /// Square power-of-two tileable images get a dedicated texture; images larger than
    /// an atlas entry can be are split into tiles; everything else is packed into the
    /// pool.
    pub fn create_image(
        &self,
        bitmap: &Bitmap,
        src_rect: Rect,
        flags: ImageFlags,
    ) -> Result<Box<dyn Drawable>> {
        if !Rect::with_size(bitmap.width(), bitmap.height()).contains(&src_rect) {
            return Err(Error::invalid(format!(
                "source rect {src_rect:?} outside {}x{} bitmap",
                bitmap.width(),
                bitmap.height()
            )));
        }
        let (width, height) = (src_rect.width as u32, src_rect.height as u32);
        if width == 0 || height == 0 {
            return Ok(Box::new(EmptyDrawable::new(width, height)));
        }

        let max = self.max_texture_size();
        if width == height
            && width.is_power_of_two()
            && width >= self.config.exact_fit_min_size
            && width <= max
            && flags.contains(ImageFlags::TILEABLE)
        {
            let texture = Arc::new(Texture::new(
                Arc::clone(&self.device),
                width,
                height,
                flags.is_retro(),
            )?);
            let chunk = texture
                .try_alloc_with_flags(bitmap, src_rect, flags, 0)?
                .ok_or_else(|| Error::logic("exact-fit texture rejected its own image"))?;
            return Ok(Box::new(chunk));
        }

        let padding = self.config.atlas_padding;
        let tile_size = max.saturating_sub(2 * padding).max(1);
        if width > tile_size || height > tile_size {
            let tiled = TiledDrawable::from_bitmap(self, bitmap, src_rect, tile_size, tile_size, flags)?;
            return Ok(Box::new(tiled));
        }

        Ok(Box::new(self.pool.alloc(bitmap, src_rect, flags, padding)?))
    }
}
