use std::sync::Arc;

use crate::backend::{GpuContext, GpuDevice};
use crate::bitmap::Bitmap;
use crate::config::GraphicsConfig;
use crate::draw_op::{DrawOp, ZPos};
use crate::draw_op_queue::{DrawOpQueue, GlBlock, QueueMode};
use crate::drawable::{Drawable, ImageFlags};
use crate::error::{Error, Result};
use crate::image_factory::ImageFactory;
use crate::macros::Macro;
use crate::render_state::{BlendMode, RenderState};
use crate::transform::Transform;
use crate::utils::{Color, DrawVertex, Quad, Rect};

/// Entry point tying a context to the queue stack and image creation.
///
/// The screen queue always exists; every [`record`](Self::record) call pushes a
/// recording queue on top of it for the duration of its body.
pub struct Graphics<C: GpuContext> {
    context: C,
    factory: ImageFactory,
    screen: DrawOpQueue,
    recordings: Vec<DrawOpQueue>,
    logical_width: u32,
    logical_height: u32,
    base_transform: Transform,
    black_bar_width: f64,
    black_bar_height: f64,
}

impl<C: GpuContext> Graphics<C> {
    pub fn new(context: C, device: Arc<dyn GpuDevice>, config: GraphicsConfig) -> Self {
        let (width, height) = context.surface_size();
        Self {
            context,
            factory: ImageFactory::new(device, config),
            screen: DrawOpQueue::new(QueueMode::RenderToScreen),
            recordings: Vec::new(),
            logical_width: width,
            logical_height: height,
            base_transform: Transform::identity(),
            black_bar_width: 0.0,
            black_bar_height: 0.0,
        }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn into_context(self) -> C {
        self.context
    }

    pub fn factory(&self) -> &ImageFactory {
        &self.factory
    }

    pub fn width(&self) -> u32 {
        self.logical_width
    }

    pub fn height(&self) -> u32 {
        self.logical_height
    }

    pub fn is_recording(&self) -> bool {
        !self.recordings.is_empty()
    }

    fn queue(&mut self) -> &mut DrawOpQueue {
        self.recordings.last_mut().unwrap_or(&mut self.screen)
    }

    /// Scales a `width`×`height` logical canvas uniformly onto the physical surface,
    /// centered, leaving black bars on the sides that do not fit.
    pub fn set_resolution(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::invalid("resolution must be positive"));
        }
        let (physical_w, physical_h) = self.context.surface_size();
        let scale_x = physical_w as f64 / width as f64;
        let scale_y = physical_h as f64 / height as f64;
        let scale = scale_x.min(scale_y);

        self.black_bar_width = 0.0;
        self.black_bar_height = 0.0;
        if scale_x < scale_y {
            self.black_bar_height = (physical_h as f64 / scale - height as f64) / 2.0;
        } else if scale_y < scale_x {
            self.black_bar_width = (physical_w as f64 / scale - width as f64) / 2.0;
        }

        self.logical_width = width;
        self.logical_height = height;
        self.base_transform = Transform::translate(self.black_bar_width, self.black_bar_height)
            .concat(&Transform::scale(scale, scale, 0.0, 0.0));
        log::debug!(
            "logical resolution {width}x{height} on {physical_w}x{physical_h}, scale {scale}"
        );
        Ok(())
    }

    /// Runs one frame: clears the surface, runs `body` against the screen queue, and
    /// flushes. Recordings left open by `body` are discarded.
    pub fn frame<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.recordings.clear();
        self.screen.reset();
        self.screen.set_base_transform(self.base_transform)?;
        self.context.clear(self.factory.config().clear_color);

        let result = body(self);
        if !self.recordings.is_empty() {
            log::warn!("discarding {} unfinished recordings", self.recordings.len());
            self.recordings.clear();
        }
        match result {
            Ok(value) => {
                self.draw_black_bars();
                self.flush()?;
                Ok(value)
            }
            Err(err) => {
                self.screen.clear_queue();
                Err(err)
            }
        }
    }

    fn draw_black_bars(&mut self) {
        let (w, h) = (self.logical_width as f64, self.logical_height as f64);
        let (bw, bh) = (self.black_bar_width, self.black_bar_height);
        let bars = if bh > 0.0 {
            [(0.0, -bh, w, bh), (0.0, h, w, bh)]
        } else if bw > 0.0 {
            [(-bw, 0.0, bw, h), (w, 0.0, bw, h)]
        } else {
            return;
        };
        for (x, y, bar_w, bar_h) in bars {
            let quad = Quad::from_rect(x, y, bar_w, bar_h, Color::BLACK);
            self.screen
                .schedule_draw_op(DrawOp::quad(&quad, ZPos::INFINITY, RenderState::default()));
        }
    }

    /// Replays and empties the screen queue.
    pub fn flush(&mut self) -> Result<()> {
        if self.is_recording() {
            return Err(Error::logic("cannot flush while recording a macro"));
        }
        self.screen.perform_draw_ops_and_code(&mut self.context);
        Ok(())
    }

    pub fn draw_line(&mut self, a: DrawVertex, b: DrawVertex, z: ZPos, mode: BlendMode) {
        let op = DrawOp::line(a, b, z, RenderState::with_blend_mode(mode));
        self.queue().schedule_draw_op(op);
    }

    pub fn draw_triangle(
        &mut self,
        a: DrawVertex,
        b: DrawVertex,
        c: DrawVertex,
        z: ZPos,
        mode: BlendMode,
    ) {
        let op = DrawOp::triangle(a, b, c, z, RenderState::with_blend_mode(mode));
        self.queue().schedule_draw_op(op);
    }

    pub fn draw_quad(&mut self, quad: &Quad, z: ZPos, mode: BlendMode) {
        let op = DrawOp::quad(quad, z, RenderState::with_blend_mode(mode));
        self.queue().schedule_draw_op(op);
    }

    pub fn draw_drawable(
        &mut self,
        drawable: &dyn Drawable,
        quad: &Quad,
        z: ZPos,
        mode: BlendMode,
    ) -> Result<()> {
        drawable.draw(self.queue(), quad, z, mode)
    }

    /// Draws `drawable` at its natural size with its top-left corner at `(x, y)`.
    pub fn draw_rect(
        &mut self,
        drawable: &dyn Drawable,
        x: f64,
        y: f64,
        z: ZPos,
        color: Color,
        mode: BlendMode,
    ) -> Result<()> {
        let quad = Quad::from_rect(
            x,
            y,
            drawable.width() as f64,
            drawable.height() as f64,
            color,
        );
        self.draw_drawable(drawable, &quad, z, mode)
    }

    /// Clips everything drawn by `body` to the logical rectangle. The clip region is
    /// removed again however `body` returns.
    pub fn clip_to<T>(
        &mut self,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let (_, screen_height) = self.context.surface_size();
        self.queue().begin_clipping(x, y, width, height, screen_height)?;
        let result = body(self);
        let ended = self.queue().end_clipping();
        let value = result?;
        ended?;
        Ok(value)
    }

    /// Applies `transform` to everything drawn by `body`.
    pub fn transform<T>(
        &mut self,
        transform: Transform,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.queue().push_transform(transform);
        let result = body(self);
        let popped = self.queue().pop_transform();
        let value = result?;
        popped?;
        Ok(value)
    }

    /// Records everything `body` draws into a [`Macro`] instead of the screen.
    pub fn record(
        &mut self,
        width: u32,
        height: u32,
        body: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<Macro> {
        if width == 0 || height == 0 {
            return Err(Error::invalid("macro size must be positive"));
        }
        self.recordings.push(DrawOpQueue::new(QueueMode::RecordMacro));
        let result = body(self);
        let mut queue = self
            .recordings
            .pop()
            .ok_or_else(|| Error::logic("recording ended without being started"))?;
        result?;
        Macro::new(&mut queue, width, height, Arc::clone(self.factory.device()))
    }

    /// Schedules custom code at depth `z`.
    pub fn gl(&mut self, z: ZPos, block: GlBlock) {
        self.queue().gl(block, z);
    }

    /// Flushes pending work and runs custom code right away inside a saved state scope.
    pub fn gl_now(&mut self, block: impl FnOnce(&mut dyn GpuContext)) -> Result<()> {
        if self.is_recording() {
            return Err(Error::logic("custom code cannot run while recording a macro"));
        }
        self.flush()?;
        self.context.push_state();
        block(&mut self.context);
        self.context.pop_state();
        self.context.finish();
        Ok(())
    }

    pub fn create_image(
        &self,
        bitmap: &Bitmap,
        src_rect: Rect,
        flags: ImageFlags,
    ) -> Result<Box<dyn Drawable>> {
        self.factory.create_image(bitmap, src_rect, flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::{SoftwareContext, SoftwareDevice};

    fn graphics(w: u32, h: u32) -> Graphics<SoftwareContext> {
        let device = SoftwareDevice::default();
        let context = device.create_context(w, h);
        Graphics::new(context, Arc::new(device), GraphicsConfig::default())
    }

    #[test]
    fn frame_clears_and_flushes() {
        let mut g = graphics(4, 4);
        g.frame(|g| {
            g.draw_quad(&Quad::from_rect(0.0, 0.0, 2.0, 2.0, Color::RED), 0.0, BlendMode::Default);
            Ok(())
        })
        .unwrap();
        assert_eq!(g.context().pixel(0, 0), Color::RED);
        assert_eq!(g.context().pixel(3, 3), Color::BLACK);
    }

    #[test]
    fn clip_to_limits_drawing() {
        let mut g = graphics(4, 4);
        g.frame(|g| {
            g.clip_to(0.0, 0.0, 2.0, 4.0, |g| {
                g.draw_quad(&Quad::from_rect(0.0, 0.0, 4.0, 4.0, Color::GREEN), 0.0, BlendMode::Default);
                Ok(())
            })
        })
        .unwrap();
        assert_eq!(g.context().pixel(1, 3), Color::GREEN);
        assert_eq!(g.context().pixel(2, 0), Color::BLACK);
    }

    #[test]
    fn clip_is_popped_when_body_fails() {
        let mut g = graphics(4, 4);
        let result: Result<()> = g.clip_to(0.0, 0.0, 1.0, 1.0, |_| Err(Error::invalid("boom")));
        assert!(result.is_err());
        assert_eq!(g.screen.clip_depth(), 0);
    }

    #[test]
    fn flush_and_gl_now_are_rejected_while_recording() {
        let mut g = graphics(4, 4);
        let result = g.record(4, 4, |g| {
            assert!(matches!(g.flush(), Err(Error::Logic(_))));
            assert!(g.gl_now(|_| {}).is_err());
            Ok(())
        });
        assert!(result.is_ok());
        assert!(!g.is_recording());
    }

    #[test]
    fn black_bars_frame_a_narrow_resolution() {
        let mut g = graphics(8, 4);
        g.set_resolution(4, 4).unwrap();
        g.frame(|g| {
            g.draw_quad(&Quad::from_rect(0.0, 0.0, 4.0, 4.0, Color::WHITE), 0.0, BlendMode::Default);
            Ok(())
        })
        .unwrap();
        assert_eq!(g.context().pixel(1, 1), Color::BLACK);
        assert_eq!(g.context().pixel(2, 1), Color::WHITE);
        assert_eq!(g.context().pixel(5, 3), Color::WHITE);
        assert_eq!(g.context().pixel(6, 3), Color::BLACK);
    }
}
