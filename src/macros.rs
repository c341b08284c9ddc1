use std::sync::Arc;

use crate::backend::{GpuContext, GpuDevice};
use crate::bitmap::Bitmap;
use crate::draw_op::{VertexArray, ZPos};
use crate::draw_op_queue::DrawOpQueue;
use crate::drawable::{Drawable, GlTexInfo};
use crate::error::{Error, Result};
use crate::render_state::BlendMode;
use crate::transform::{is_parallelogram, Transform};
use crate::utils::{Color, Quad, Rect};

/// A recorded queue frozen into vertex arrays, replayable as one drawable.
#[derive(Debug)]
pub struct Macro {
    width: u32,
    height: u32,
    vertex_arrays: Arc<Vec<VertexArray>>,
    device: Arc<dyn GpuDevice>,
}

impl Macro {
    /// Compiles and empties `queue`.
    pub fn new(
        queue: &mut DrawOpQueue,
        width: u32,
        height: u32,
        device: Arc<dyn GpuDevice>,
    ) -> Result<Self> {
        let mut vertex_arrays = Vec::new();
        queue.compile_to(&mut vertex_arrays)?;
        Ok(Self {
            width,
            height,
            vertex_arrays: Arc::new(vertex_arrays),
            device,
        })
    }

    pub fn vertex_arrays(&self) -> &[VertexArray] {
        &self.vertex_arrays
    }
}

fn draw_vertex_arrays(context: &mut dyn GpuContext, arrays: &[VertexArray], transform: &Transform) {
    context.push_state();
    context.load_transform(transform);
    for array in arrays {
        context.bind_texture(array.render_state.surface());
        context.set_blend_mode(array.render_state.blend_mode);
        context.draw_vertices(array.primitive, &array.vertices);
    }
    context.pop_state();
}

impl Drawable for Macro {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    /// Blend modes are baked into the recording, so `mode` is ignored.
    fn draw(&self, queue: &mut DrawOpQueue, quad: &Quad, z: ZPos, _mode: BlendMode) -> Result<()> {
        if !quad.is_uniformly(Color::WHITE) {
            return Err(Error::invalid("macros cannot be tinted"));
        }
        let corners = quad.corners.map(|c| c.point());
        if !is_parallelogram(&corners) {
            return Err(Error::invalid(
                "macros can only be drawn onto parallelograms",
            ));
        }

        let mapping = Transform::map_rect_to_quad(self.width as f64, self.height as f64, corners)?;
        let transform = mapping.concat(&queue.current_transform().matrix);
        let arrays = Arc::clone(&self.vertex_arrays);
        queue.gl(
            Box::new(move |context: &mut dyn GpuContext| {
                draw_vertex_arrays(context, &arrays, &transform)
            }),
            z,
        );
        Ok(())
    }

    fn gl_tex_info(&self) -> Option<GlTexInfo> {
        None
    }

    fn to_bitmap(&self) -> Result<Bitmap> {
        let arrays = Arc::clone(&self.vertex_arrays);
        self.device.render_offscreen(self.width, self.height, &mut |context: &mut dyn GpuContext| {
            draw_vertex_arrays(context, &arrays, &Transform::identity())
        })
    }

    fn subimage(&self, _rect: Rect) -> Result<Box<dyn Drawable>> {
        Err(Error::Unsupported("subimage of a macro".into()))
    }

    fn insert(&self, _bitmap: &Bitmap, _x: i32, _y: i32) -> Result<()> {
        Err(Error::Unsupported("inserting pixels into a macro".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareDevice;
    use crate::draw_op::DrawOp;
    use crate::draw_op_queue::QueueMode;
    use crate::render_state::RenderState;
    use crate::utils::DrawVertex;

    fn recorded(device: &SoftwareDevice) -> Macro {
        let mut queue = DrawOpQueue::new(QueueMode::RecordMacro);
        queue.schedule_draw_op(DrawOp::quad(
            &Quad::from_rect(0.0, 0.0, 2.0, 2.0, Color::RED),
            0.0,
            RenderState::default(),
        ));
        Macro::new(&mut queue, 4, 4, Arc::new(device.clone())).unwrap()
    }

    #[test]
    fn tinted_draw_is_rejected() {
        let device = SoftwareDevice::default();
        let m = recorded(&device);
        let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
        let tinted = Quad::from_rect(0.0, 0.0, 4.0, 4.0, Color::RED);
        assert!(matches!(
            m.draw(&mut queue, &tinted, 0.0, BlendMode::Default),
            Err(Error::InvalidArgument(_))
        ));
        assert!(queue.is_empty());
    }

    #[test]
    fn non_parallelogram_is_rejected() {
        let device = SoftwareDevice::default();
        let m = recorded(&device);
        let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
        let w = Color::WHITE;
        let kite = Quad::new(
            DrawVertex::new(0.0, 0.0, w),
            DrawVertex::new(4.0, 0.0, w),
            DrawVertex::new(0.0, 4.0, w),
            DrawVertex::new(6.0, 6.0, w),
        );
        assert!(m.draw(&mut queue, &kite, 0.0, BlendMode::Default).is_err());
    }

    #[test]
    fn rotated_parallelograms_are_accepted() {
        let device = SoftwareDevice::default();
        let m = recorded(&device);
        let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
        let w = Color::WHITE;
        for step in 0..360 {
            let angle = (step as f64 + 0.3).to_radians();
            let (ux, uy) = (10.0 * angle.cos(), 10.0 * angle.sin());
            let (vx, vy) = (-uy, ux);
            let quad = Quad::new(
                DrawVertex::new(20.0, 20.0, w),
                DrawVertex::new(20.0 + ux, 20.0 + uy, w),
                DrawVertex::new(20.0 + vx, 20.0 + vy, w),
                DrawVertex::new(20.0 + ux + vx, 20.0 + uy + vy, w),
            );
            assert!(
                m.draw(&mut queue, &quad, 0.0, BlendMode::Default).is_ok(),
                "rejected at {step}.3 degrees"
            );
        }
        assert_eq!(queue.len(), 360);
    }

    #[test]
    fn to_bitmap_replays_offscreen() {
        let device = SoftwareDevice::default();
        let m = recorded(&device);
        let bitmap = m.to_bitmap().unwrap();
        assert_eq!(bitmap.dimensions(), (4, 4));
        assert_eq!(bitmap.get_pixel(1, 1), &Color::RED.to_image_rgba());
        assert_eq!(bitmap.get_pixel(2, 2).0[3], 0);
    }

    #[test]
    fn scaled_draw_covers_target() {
        let device = SoftwareDevice::default();
        let m = recorded(&device);
        let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
        let target = Quad::from_rect(0.0, 0.0, 8.0, 8.0, Color::WHITE);
        m.draw(&mut queue, &target, 0.0, BlendMode::Default).unwrap();
        let mut ctx = device.create_context(8, 8);
        queue.perform_draw_ops_and_code(&mut ctx);
        assert_eq!(ctx.pixel(3, 3), Color::RED);
        assert_eq!(ctx.pixel(4, 4), Color::NONE);
    }

    #[test]
    fn pixel_access_is_unsupported() {
        let device = SoftwareDevice::default();
        let m = recorded(&device);
        assert!(matches!(m.subimage(Rect::new(0, 0, 1, 1)), Err(Error::Unsupported(_))));
        assert!(m.insert(&Bitmap::new(1, 1), 0, 0).is_err());
    }
}
