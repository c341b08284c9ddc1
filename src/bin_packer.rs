use crate::error::{Error, Result};
use crate::utils::Rect;

pub const DEFAULT_ROW_STEP: u32 = 16;
pub const DEFAULT_COLUMN_STEP: u32 = 8;

/// Places rectangles on a fixed-size surface without overlap.
///
/// [`find_rect`](Self::find_rect) only proposes a placement; [`block`](Self::block)
/// commits it. Freed rectangles must match a previously blocked one exactly.
#[derive(Debug, Clone)]
pub struct BinPacker {
    width: u32,
    height: u32,
    blocks: Vec<Rect>,
    first_x: u32,
    first_y: u32,
    // Largest size that is known not to fit anymore (both dimensions exceeded).
    max_w: u32,
    max_h: u32,
    row_step: u32,
    column_step: u32,
}

impl BinPacker {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_steps(width, height, DEFAULT_ROW_STEP, DEFAULT_COLUMN_STEP)
    }

    pub fn with_steps(width: u32, height: u32, row_step: u32, column_step: u32) -> Self {
        Self {
            width,
            height,
            blocks: Vec::new(),
            first_x: 0,
            first_y: 0,
            max_w: width,
            max_h: height,
            row_step: row_step.max(1),
            column_step: column_step.max(1),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn blocks(&self) -> &[Rect] {
        &self.blocks
    }

    pub fn find_rect(&mut self, width: u32, height: u32) -> Option<Rect> {
        if width == 0 || height == 0 || width > self.width || height > self.height {
            return None;
        }
        if width > self.max_w && height > self.max_h {
            return None;
        }

        let candidate = self.rect_at(self.first_x, self.first_y, width, height);
        if self.is_free(&candidate) {
            self.mark_used(&candidate);
            return Some(candidate);
        }

        for y in scan_positions(self.height - height, self.row_step) {
            for x in scan_positions(self.width - width, self.column_step) {
                if !self.is_free(&self.rect_at(x, y, width, height)) {
                    continue;
                }
                // Slide up, then left, while the rectangle stays free.
                let (mut x, mut y) = (x, y);
                while y > 0 && self.is_free(&self.rect_at(x, y - 1, width, height)) {
                    y -= 1;
                }
                while x > 0 && self.is_free(&self.rect_at(x - 1, y, width, height)) {
                    x -= 1;
                }
                let found = self.rect_at(x, y, width, height);
                self.mark_used(&found);
                return Some(found);
            }
        }

        self.max_w = width - 1;
        self.max_h = height - 1;
        None
    }

    pub fn block(&mut self, rect: Rect) {
        self.blocks.push(rect);
    }

    pub fn free(&mut self, rect: Rect) -> Result<()> {
        let index = self
            .blocks
            .iter()
            .position(|b| *b == rect)
            .ok_or_else(|| Error::logic(format!("tried to free an unknown block {rect:?}")))?;
        self.blocks.swap_remove(index);
        self.max_w = self.width;
        self.max_h = self.height;
        Ok(())
    }

    fn rect_at(&self, x: u32, y: u32, width: u32, height: u32) -> Rect {
        Rect::new(x as i32, y as i32, width as i32, height as i32)
    }

    fn is_free(&self, rect: &Rect) -> bool {
        if rect.right() as u32 > self.width || rect.bottom() as u32 > self.height {
            return false;
        }
        !self.blocks.iter().any(|b| b.overlaps(rect))
    }

    fn mark_used(&mut self, rect: &Rect) {
        let (w, h) = (rect.width as u32, rect.height as u32);
        self.first_x = rect.x as u32 + w;
        if self.first_x + w > self.width {
            self.first_x = 0;
            self.first_y = rect.y as u32 + h;
        }
        if self.first_y + h > self.height {
            self.first_x = 0;
            self.first_y = 0;
        }
    }
}

/// `0, step, 2·step, ...` up to `last`, always ending with `last` itself so that
/// strips narrower than one step along the far edge are still scanned.
fn scan_positions(last: u32, step: u32) -> impl Iterator<Item = u32> {
    let stepped = (0..=last).step_by(step as usize);
    let tail = (last % step != 0).then_some(last);
    stepped.chain(tail)
}
