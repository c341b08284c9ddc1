//! Images larger than one atlas entry, assembled from a grid of tiles.

use crate::bitmap::{self, Bitmap};
use crate::draw_op::ZPos;
use crate::draw_op_queue::DrawOpQueue;
use crate::drawable::{check_subimage_rect, Drawable, GlTexInfo, ImageFlags};
use crate::error::Result;
use crate::image_factory::ImageFactory;
use crate::render_state::BlendMode;
use crate::utils::{Quad, Rect};

#[derive(Debug)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub drawable: Box<dyn Drawable>,
}

impl Tile {
    fn rect(&self) -> Rect {
        Rect::new(
            self.x as i32,
            self.y as i32,
            self.drawable.width() as i32,
            self.drawable.height() as i32,
        )
    }
}

/// A composite image whose tiles exactly cover `[0, width) × [0, height)`.
#[derive(Debug)]
pub struct TiledDrawable {
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
}

impl TiledDrawable {
    pub fn new(width: u32, height: u32, tiles: Vec<Tile>) -> Self {
        Self {
            width,
            height,
            tiles,
        }
    }

    /// Splits `src_rect` of `bitmap` into tiles of at most `tile_width`×`tile_height`.
    ///
    /// Edges between tiles are tileable so filtering never pulls in transparent padding
    /// at a seam; outer edges keep whatever `flags` asked for.
    pub fn from_bitmap(
        factory: &ImageFactory,
        bitmap: &Bitmap,
        src_rect: Rect,
        tile_width: u32,
        tile_height: u32,
        flags: ImageFlags,
    ) -> Result<Self> {
        let (width, height) = (src_rect.width as u32, src_rect.height as u32);
        let columns = width.div_ceil(tile_width);
        let rows = height.div_ceil(tile_height);
        log::debug!("splitting {width}x{height} image into {columns}x{rows} tiles");

        let mut tiles = Vec::with_capacity((columns * rows) as usize);
        for row in 0..rows {
            for column in 0..columns {
                let x = column * tile_width;
                let y = row * tile_height;
                let rect = Rect::new(
                    src_rect.x + x as i32,
                    src_rect.y + y as i32,
                    tile_width.min(width - x) as i32,
                    tile_height.min(height - y) as i32,
                );

                let mut local = flags | ImageFlags::TILEABLE;
                let mut keep_outer = |edge: ImageFlags, is_outer: bool| {
                    if is_outer {
                        local.remove(edge);
                        local |= flags & edge;
                    }
                };
                keep_outer(ImageFlags::TILEABLE_LEFT, column == 0);
                keep_outer(ImageFlags::TILEABLE_RIGHT, column == columns - 1);
                keep_outer(ImageFlags::TILEABLE_TOP, row == 0);
                keep_outer(ImageFlags::TILEABLE_BOTTOM, row == rows - 1);

                tiles.push(Tile {
                    x,
                    y,
                    drawable: factory.create_image(bitmap, rect, local)?,
                });
            }
        }
        Ok(Self::new(width, height, tiles))
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }
}

impl Drawable for TiledDrawable {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn draw(&self, queue: &mut DrawOpQueue, quad: &Quad, z: ZPos, mode: BlendMode) -> Result<()> {
        let (w, h) = (self.width as f64, self.height as f64);
        for tile in &self.tiles {
            let left = tile.x as f64 / w;
            let top = tile.y as f64 / h;
            let right = (tile.x + tile.drawable.width()) as f64 / w;
            let bottom = (tile.y + tile.drawable.height()) as f64 / h;
            let part = Quad::new(
                quad.interpolate(left, top),
                quad.interpolate(right, top),
                quad.interpolate(left, bottom),
                quad.interpolate(right, bottom),
            );
            tile.drawable.draw(queue, &part, z, mode)?;
        }
        Ok(())
    }

    fn gl_tex_info(&self) -> Option<GlTexInfo> {
        None
    }

    fn to_bitmap(&self) -> Result<Bitmap> {
        let mut out = Bitmap::new(self.width, self.height);
        for tile in &self.tiles {
            let part = tile.drawable.to_bitmap()?;
            bitmap::insert(&mut out, &part, tile.x as i32, tile.y as i32);
        }
        Ok(out)
    }

    fn subimage(&self, rect: Rect) -> Result<Box<dyn Drawable>> {
        check_subimage_rect(&rect, self.width, self.height)?;

        let mut tiles = Vec::new();
        for tile in &self.tiles {
            let tile_rect = tile.rect();
            let overlap = rect.intersection(&tile_rect);
            if overlap.is_empty() {
                continue;
            }
            let drawable = tile
                .drawable
                .subimage(overlap.offset(-tile_rect.x, -tile_rect.y))?;
            tiles.push(Tile {
                x: (overlap.x - rect.x) as u32,
                y: (overlap.y - rect.y) as u32,
                drawable,
            });
        }

        if tiles.len() == 1 {
            if let Some(only) = tiles.pop() {
                return Ok(only.drawable);
            }
        }
        Ok(Box::new(TiledDrawable::new(
            rect.width as u32,
            rect.height as u32,
            tiles,
        )))
    }

    fn insert(&self, bitmap: &Bitmap, x: i32, y: i32) -> Result<()> {
        let target = Rect::new(x, y, bitmap.width() as i32, bitmap.height() as i32);
        for tile in &self.tiles {
            let tile_rect = tile.rect();
            if tile_rect.overlaps(&target) {
                tile.drawable
                    .insert(bitmap, x - tile_rect.x, y - tile_rect.y)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareDevice;
    use crate::config::GraphicsConfig;
    use crate::utils::Color;
    use std::sync::Arc;

    fn factory(max: u32) -> ImageFactory {
        ImageFactory::new(
            Arc::new(SoftwareDevice::default()),
            GraphicsConfig::default().with_max_texture_size(max),
        )
    }

    fn pattern(w: u32, h: u32) -> Bitmap {
        Bitmap::from_fn(w, h, |x, y| image::Rgba([(x * 3) as u8, (y * 5) as u8, (x ^ y) as u8, 255]))
    }

    #[test]
    fn tiles_cover_the_image() {
        let factory = factory(32);
        let source = pattern(70, 40);
        let tiled = TiledDrawable::from_bitmap(
            &factory,
            &source,
            Rect::new(0, 0, 70, 40),
            30,
            30,
            ImageFlags::empty(),
        )
        .unwrap();
        assert_eq!(tiled.tiles().len(), 6);
        let area: i32 = tiled.tiles().iter().map(|t| t.rect().width * t.rect().height).sum();
        assert_eq!(area, 70 * 40);
        assert_eq!(tiled.to_bitmap().unwrap(), source);
    }

    #[test]
    fn subimage_within_one_tile_returns_that_tile() {
        let factory = factory(32);
        let source = pattern(60, 30);
        let tiled = TiledDrawable::from_bitmap(
            &factory,
            &source,
            Rect::new(0, 0, 60, 30),
            30,
            30,
            ImageFlags::empty(),
        )
        .unwrap();
        let inside = tiled.subimage(Rect::new(31, 2, 10, 10)).unwrap();
        assert!(inside.gl_tex_info().is_some());
        let across = tiled.subimage(Rect::new(25, 5, 10, 10)).unwrap();
        assert!(across.gl_tex_info().is_none());
        assert_eq!(
            across.to_bitmap().unwrap(),
            bitmap::sub_bitmap(&source, Rect::new(25, 5, 10, 10))
        );
        assert!(tiled.subimage(Rect::new(55, 0, 10, 10)).is_err());
    }

    #[test]
    fn insert_reaches_every_overlapped_tile() {
        let factory = factory(32);
        let source = pattern(60, 30);
        let tiled = TiledDrawable::from_bitmap(
            &factory,
            &source,
            Rect::new(0, 0, 60, 30),
            30,
            30,
            ImageFlags::empty(),
        )
        .unwrap();
        let red = Bitmap::from_pixel(4, 4, Color::RED.to_image_rgba());
        tiled.insert(&red, 28, 10).unwrap();
        let out = tiled.to_bitmap().unwrap();
        for x in 28..32 {
            assert_eq!(out.get_pixel(x, 11), &Color::RED.to_image_rgba());
        }
        assert_eq!(out.get_pixel(27, 11), source.get_pixel(27, 11));
    }

    #[test]
    fn interior_edges_are_tileable() {
        let factory = factory(32);
        let mut source = Bitmap::new(60, 30);
        for y in 0..30 {
            source.put_pixel(29, y, Color::RED.to_image_rgba());
        }
        let tiled = TiledDrawable::from_bitmap(
            &factory,
            &source,
            Rect::new(0, 0, 60, 30),
            30,
            30,
            ImageFlags::empty(),
        )
        .unwrap();
        let Some(left) = tiled.tiles()[0].drawable.gl_tex_info() else {
            panic!("tile should be atlas backed");
        };
        // The padding column right of the first tile repeats its red edge.
        let ring_x = (left.right * 32.0).round() as i32;
        let ring = factory
            .device()
            .read_back(left.surface, Rect::new(ring_x, 1, 1, 1))
            .unwrap();
        assert_eq!(ring.get_pixel(0, 0), &Color::RED.to_image_rgba());
    }
}
