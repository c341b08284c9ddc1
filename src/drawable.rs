use bitflags::bitflags;

use crate::backend::SurfaceId;
use crate::bitmap::Bitmap;
use crate::draw_op::ZPos;
use crate::draw_op_queue::DrawOpQueue;
use crate::error::{Error, Result};
use crate::render_state::BlendMode;
use crate::utils::{Quad, Rect};

bitflags! {
    /// Creation flags for images.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageFlags: u32 {
        const TILEABLE_LEFT = 1 << 1;
        const TILEABLE_TOP = 1 << 2;
        const TILEABLE_RIGHT = 1 << 3;
        const TILEABLE_BOTTOM = 1 << 4;
        const TILEABLE = Self::TILEABLE_LEFT.bits()
            | Self::TILEABLE_TOP.bits()
            | Self::TILEABLE_RIGHT.bits()
            | Self::TILEABLE_BOTTOM.bits();
        /// Nearest-neighbour filtering.
        const RETRO = 1 << 5;
    }
}

impl ImageFlags {
    /// Accepts raw flag bits, where a bare `1` is the old spelling of "tileable".
    pub fn from_legacy(bits: u32) -> Self {
        if bits == 1 {
            ImageFlags::TILEABLE
        } else {
            ImageFlags::from_bits_truncate(bits)
        }
    }

    pub fn is_retro(self) -> bool {
        self.contains(ImageFlags::RETRO)
    }
}

/// Location of an atlas-backed image inside its GPU surface, in normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlTexInfo {
    pub surface: SurfaceId,
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

/// The capability set shared by every image representation.
///
/// `gl_tex_info` returning `None` tells callers the image is not a single atlas region.
pub trait Drawable: Send + Sync + std::fmt::Debug {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn draw(&self, queue: &mut DrawOpQueue, quad: &Quad, z: ZPos, mode: BlendMode)
        -> Result<()>;

    fn gl_tex_info(&self) -> Option<GlTexInfo>;

    fn to_bitmap(&self) -> Result<Bitmap>;

    fn subimage(&self, rect: Rect) -> Result<Box<dyn Drawable>>;

    /// Overwrites pixels starting at `(x, y)`. Parts outside the image are dropped.
    fn insert(&self, bitmap: &Bitmap, x: i32, y: i32) -> Result<()>;
}

pub(crate) fn check_subimage_rect(rect: &Rect, width: u32, height: u32) -> Result<()> {
    if rect.width <= 0 || rect.height <= 0 {
        return Err(Error::invalid("cannot create an empty subimage"));
    }
    if rect.x < 0
        || rect.y < 0
        || rect.right() > width as i32
        || rect.bottom() > height as i32
    {
        return Err(Error::invalid(format!(
            "subimage {rect:?} exceeds parent bounds {width}x{height}"
        )));
    }
    Ok(())
}

/// Zero-content image of a given size; drawing it does nothing.
#[derive(Debug, Clone, Copy)]
pub struct EmptyDrawable {
    width: u32,
    height: u32,
}

impl EmptyDrawable {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Drawable for EmptyDrawable {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn draw(&self, _: &mut DrawOpQueue, _: &Quad, _: ZPos, _: BlendMode) -> Result<()> {
        Ok(())
    }

    fn gl_tex_info(&self) -> Option<GlTexInfo> {
        None
    }

    fn to_bitmap(&self) -> Result<Bitmap> {
        Ok(Bitmap::new(self.width, self.height))
    }

    fn subimage(&self, rect: Rect) -> Result<Box<dyn Drawable>> {
        check_subimage_rect(&rect, self.width, self.height)?;
        Ok(Box::new(EmptyDrawable::new(
            rect.width as u32,
            rect.height as u32,
        )))
    }

    fn insert(&self, _: &Bitmap, _: i32, _: i32) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_one_means_tileable() {
        assert_eq!(ImageFlags::from_legacy(1), ImageFlags::TILEABLE);
        assert_eq!(
            ImageFlags::from_legacy(ImageFlags::RETRO.bits()),
            ImageFlags::RETRO
        );
    }

    #[test]
    fn empty_subimage_checks_bounds() {
        let empty = EmptyDrawable::new(10, 10);
        assert!(empty.subimage(Rect::new(2, 2, 5, 5)).is_ok());
        assert!(empty.subimage(Rect::new(8, 8, 5, 5)).is_err());
        assert!(empty.subimage(Rect::new(0, 0, 0, 5)).is_err());
        assert!(empty.gl_tex_info().is_none());
    }
}
