//! Helpers over the pixel buffer type handed to the core by image loaders.

use image::imageops;

use crate::drawable::ImageFlags;
use crate::utils::{Color, Rect};

/// Row-major RGBA8 pixel buffer.
pub type Bitmap = image::RgbaImage;

/// Copies `src` into `dest` at `(x, y)`; pixels falling outside `dest` are dropped.
pub fn insert(dest: &mut Bitmap, src: &Bitmap, x: i32, y: i32) {
    imageops::replace(dest, src, x as i64, y as i64);
}

/// Like [`insert`] but only copies `src_rect` of `src`.
pub fn insert_rect(dest: &mut Bitmap, src: &Bitmap, x: i32, y: i32, src_rect: Rect) {
    let part = sub_bitmap(src, src_rect);
    insert(dest, &part, x, y);
}

/// Extracts `rect` from `src`, clamped to `src`'s bounds.
pub fn sub_bitmap(src: &Bitmap, rect: Rect) -> Bitmap {
    let clipped = rect.intersection(&Rect::with_size(src.width(), src.height()));
    imageops::crop_imm(
        src,
        clipped.x as u32,
        clipped.y as u32,
        clipped.width as u32,
        clipped.height as u32,
    )
    .to_image()
}

/// Returns a `width`×`height` copy of `src`, keeping the top-left content and filling
/// new space with `fill`.
pub fn resized(src: &Bitmap, width: u32, height: u32, fill: Color) -> Bitmap {
    let mut out = Bitmap::from_pixel(width, height, fill.to_image_rgba());
    insert(&mut out, src, 0, 0);
    out
}

/// Builds the upload image for an atlas entry: `src_rect` of `src` surrounded by a
/// `padding`-wide ring. Ring pixels repeat the nearest edge pixel on tileable sides
/// and are transparent elsewhere; corners repeat only when both sides are tileable.
pub fn apply_border_flags(src: &Bitmap, src_rect: Rect, flags: ImageFlags, padding: u32) -> Bitmap {
    let src_rect = src_rect.intersection(&Rect::with_size(src.width(), src.height()));
    let (w, h) = (src_rect.width, src_rect.height);
    let p = padding as i32;
    let mut dest = Bitmap::new((w + 2 * p) as u32, (h + 2 * p) as u32);
    if w == 0 || h == 0 {
        return dest;
    }

    let resolve = |v: i32, len: i32, low: ImageFlags, high: ImageFlags| -> Option<i32> {
        if v < 0 {
            flags.contains(low).then_some(0)
        } else if v >= len {
            flags.contains(high).then_some(len - 1)
        } else {
            Some(v)
        }
    };

    for (dx, dy, pixel) in dest.enumerate_pixels_mut() {
        let sx = resolve(
            dx as i32 - p,
            w,
            ImageFlags::TILEABLE_LEFT,
            ImageFlags::TILEABLE_RIGHT,
        );
        let sy = resolve(
            dy as i32 - p,
            h,
            ImageFlags::TILEABLE_TOP,
            ImageFlags::TILEABLE_BOTTOM,
        );
        if let (Some(sx), Some(sy)) = (sx, sy) {
            *pixel = *src.get_pixel((src_rect.x + sx) as u32, (src_rect.y + sy) as u32);
        }
    }
    dest
}
