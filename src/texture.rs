use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::backend::{GpuDevice, SurfaceId};
use crate::bin_packer::BinPacker;
use crate::bitmap::{self, Bitmap};
use crate::draw_op::{DrawOp, ZPos};
use crate::draw_op_queue::DrawOpQueue;
use crate::drawable::{check_subimage_rect, Drawable, GlTexInfo, ImageFlags};
use crate::error::Result;
use crate::render_state::{BlendMode, RenderState};
use crate::utils::{lock, Quad, Rect};

/// One GPU surface plus the packer tracking which parts of it are in use.
///
/// Shared through `Arc` by every [`TexChunk`] placed on it; the surface is destroyed
/// with the last reference.
#[derive(Debug)]
pub struct Texture {
    key: Uuid,
    surface: SurfaceId,
    width: u32,
    height: u32,
    retro: bool,
    packer: Mutex<BinPacker>,
    device: Arc<dyn GpuDevice>,
}

impl Texture {
    pub fn new(device: Arc<dyn GpuDevice>, width: u32, height: u32, retro: bool) -> Result<Self> {
        Self::with_packer(device, BinPacker::new(width, height), retro)
    }

    pub fn with_packer(device: Arc<dyn GpuDevice>, packer: BinPacker, retro: bool) -> Result<Self> {
        let (width, height) = (packer.width(), packer.height());
        let surface = device.create_texture(width, height, retro)?;
        log::debug!("created {width}x{height} texture {surface:?} (retro: {retro})");
        Ok(Self {
            key: Uuid::new_v4(),
            surface,
            width,
            height,
            retro,
            packer: Mutex::new(packer),
            device,
        })
    }

    pub fn key(&self) -> Uuid {
        self.key
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn retro(&self) -> bool {
        self.retro
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    /// Places `bitmap` surrounded by a transparent `padding`-pixel ring.
    pub fn try_alloc(self: &Arc<Self>, bitmap: &Bitmap, padding: u32) -> Result<Option<TexChunk>> {
        let full = Rect::with_size(bitmap.width(), bitmap.height());
        self.try_alloc_with_flags(bitmap, full, ImageFlags::empty(), padding)
    }

    /// Places `src_rect` of `bitmap` with a padding ring built from `flags`. Returns
    /// `Ok(None)` when the texture has no room left.
    pub fn try_alloc_with_flags(
        self: &Arc<Self>,
        bitmap: &Bitmap,
        src_rect: Rect,
        flags: ImageFlags,
        padding: u32,
    ) -> Result<Option<TexChunk>> {
        let padded = bitmap::apply_border_flags(bitmap, src_rect, flags, padding);
        self.try_alloc_padded(&padded, padding)
    }

    fn try_alloc_padded(self: &Arc<Self>, padded: &Bitmap, padding: u32) -> Result<Option<TexChunk>> {
        let mut packer = lock(&self.packer);
        let Some(rect) = packer.find_rect(padded.width(), padded.height()) else {
            return Ok(None);
        };
        packer.block(rect);
        if let Err(err) = self.device.upload(self.surface, rect.x as u32, rect.y as u32, padded) {
            packer.free(rect)?;
            return Err(err);
        }
        drop(packer);

        let p = padding as i32;
        let inner = Rect::new(
            rect.x + p,
            rect.y + p,
            rect.width - 2 * p,
            rect.height - 2 * p,
        );
        Ok(Some(TexChunk::new(Arc::clone(self), inner, padding)))
    }

    pub fn block(&self, rect: Rect) {
        lock(&self.packer).block(rect);
    }

    pub fn free(&self, rect: Rect) -> Result<()> {
        lock(&self.packer).free(rect)
    }

    /// Number of blocked rectangles, padding and subimage reservations included.
    pub fn block_count(&self) -> usize {
        lock(&self.packer).blocks().len()
    }

    pub fn blocks(&self) -> Vec<Rect> {
        lock(&self.packer).blocks().to_vec()
    }

    pub fn to_bitmap(&self, rect: Rect) -> Result<Bitmap> {
        self.device.read_back(self.surface, rect)
    }

    pub fn insert(&self, bitmap: &Bitmap, x: u32, y: u32) -> Result<()> {
        self.device.upload(self.surface, x, y, bitmap)
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        log::debug!("destroying texture {:?}", self.surface);
        self.device.destroy_texture(self.surface);
    }
}

/// A rectangle on a shared [`Texture`]. Dropping it returns the rectangle and its
/// padding ring to the texture.
#[derive(Debug)]
pub struct TexChunk {
    texture: Arc<Texture>,
    rect: Rect,
    padding: u32,
    info: GlTexInfo,
}

impl TexChunk {
    fn new(texture: Arc<Texture>, rect: Rect, padding: u32) -> Self {
        let (tw, th) = (texture.width() as f32, texture.height() as f32);
        let info = GlTexInfo {
            surface: texture.surface(),
            left: rect.x as f32 / tw,
            top: rect.y as f32 / th,
            right: rect.right() as f32 / tw,
            bottom: rect.bottom() as f32 / th,
        };
        Self {
            texture,
            rect,
            padding,
            info,
        }
    }

    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    /// Position and size on the texture, padding excluded.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn padding(&self) -> u32 {
        self.padding
    }
}

impl Drop for TexChunk {
    fn drop(&mut self) {
        let padded = self.rect.padded(self.padding as i32);
        if let Err(err) = self.texture.free(padded) {
            log::error!("failed to release texture chunk: {err}");
        }
    }
}

impl Drawable for TexChunk {
    fn width(&self) -> u32 {
        self.rect.width as u32
    }

    fn height(&self) -> u32 {
        self.rect.height as u32
    }

    fn draw(&self, queue: &mut DrawOpQueue, quad: &Quad, z: ZPos, mode: BlendMode) -> Result<()> {
        let state = RenderState::with_texture(Arc::clone(&self.texture), mode);
        let info = &self.info;
        queue.schedule_draw_op(DrawOp::textured_quad(
            quad,
            z,
            state,
            [info.left, info.top, info.right, info.bottom],
        ));
        Ok(())
    }

    fn gl_tex_info(&self) -> Option<GlTexInfo> {
        Some(self.info)
    }

    fn to_bitmap(&self) -> Result<Bitmap> {
        self.texture.to_bitmap(self.rect)
    }

    fn subimage(&self, rect: Rect) -> Result<Box<dyn Drawable>> {
        check_subimage_rect(&rect, self.width(), self.height())?;
        let on_texture = rect.offset(self.rect.x, self.rect.y);
        self.texture.block(on_texture);
        Ok(Box::new(TexChunk::new(
            Arc::clone(&self.texture),
            on_texture,
            0,
        )))
    }

    fn insert(&self, bitmap: &Bitmap, x: i32, y: i32) -> Result<()> {
        let target = Rect::new(x, y, bitmap.width() as i32, bitmap.height() as i32);
        let clipped = target.intersection(&Rect::with_size(self.width(), self.height()));
        if clipped.is_empty() {
            log::warn!("insert at ({x}, {y}) lies outside the {}x{} image", self.width(), self.height());
            return Ok(());
        }
        let part = bitmap::sub_bitmap(bitmap, clipped.offset(-x, -y));
        self.texture.insert(
            &part,
            (self.rect.x + clipped.x) as u32,
            (self.rect.y + clipped.y) as u32,
        )
    }
}
