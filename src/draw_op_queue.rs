use crate::backend::{GpuContext, Primitive};
use crate::clip_rect_stack::ClipRectStack;
use crate::draw_op::{DrawOp, DrawOpKind, VertexArray, ZPos};
use crate::error::{Error, Result};
use crate::render_state::{RenderState, RenderStateManager};
use crate::transform::Transform;
use crate::transform_stack::{ActiveTransform, TransformStack};
use crate::utils::{Rect, Vertex};

/// Custom GPU code run at its place in the depth order.
pub type GlBlock = Box<dyn FnOnce(&mut dyn GpuContext)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    RenderToScreen,
    RecordMacro,
}

/// Draw operations of one frame or one recording, with the transform and clip stacks
/// that stamp them.
pub struct DrawOpQueue {
    mode: QueueMode,
    transform_stack: TransformStack,
    clip_rect_stack: ClipRectStack,
    ops: Vec<DrawOp>,
    gl_blocks: Vec<Option<GlBlock>>,
}

impl std::fmt::Debug for DrawOpQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawOpQueue")
            .field("mode", &self.mode)
            .field("ops", &self.ops.len())
            .field("gl_blocks", &self.gl_blocks.len())
            .finish()
    }
}

impl DrawOpQueue {
    pub fn new(mode: QueueMode) -> Self {
        Self {
            mode,
            transform_stack: TransformStack::new(),
            clip_rect_stack: ClipRectStack::new(),
            ops: Vec::new(),
            gl_blocks: Vec::new(),
        }
    }

    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn schedule_draw_op(&mut self, mut op: DrawOp) {
        if self.clip_rect_stack.clipped_world_away() {
            return;
        }
        op.render_state.transform = Some(self.transform_stack.current());
        op.render_state.clip_rect = self.clip_rect_stack.effective_rect();
        self.ops.push(op);
    }

    pub fn gl(&mut self, block: GlBlock, z: ZPos) {
        if self.clip_rect_stack.clipped_world_away() {
            return;
        }
        let mut op = DrawOp::gl_block(self.gl_blocks.len(), z);
        op.render_state.transform = Some(self.transform_stack.current());
        op.render_state.clip_rect = self.clip_rect_stack.effective_rect();
        self.gl_blocks.push(Some(block));
        self.ops.push(op);
    }

    /// Pushes a clip rectangle given in logical coordinates. The rectangle is mapped
    /// through the current transform, bounded, and flipped to a bottom-left origin
    /// against `screen_height`.
    pub fn begin_clipping(
        &mut self,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        screen_height: u32,
    ) -> Result<()> {
        if self.mode == QueueMode::RecordMacro {
            return Err(Error::invalid("clipping is not allowed while recording"));
        }
        let transform = self.transform_stack.current().matrix;
        let corners = [
            transform.apply(x, y),
            transform.apply(x + width, y),
            transform.apply(x, y + height),
            transform.apply(x + width, y + height),
        ];
        let left = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let right = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
        let top = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let bottom = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);

        let left = left.round() as i32;
        let top = top.round() as i32;
        let rect = Rect::new(
            left,
            screen_height as i32 - bottom.round() as i32,
            right.round() as i32 - left,
            bottom.round() as i32 - top,
        );
        self.clip_rect_stack.push(rect);
        Ok(())
    }

    pub fn end_clipping(&mut self) -> Result<()> {
        self.clip_rect_stack.pop()
    }

    pub fn clip_depth(&self) -> usize {
        self.clip_rect_stack.depth()
    }

    pub fn set_base_transform(&mut self, base: Transform) -> Result<()> {
        self.transform_stack.set_base_transform(base)
    }

    pub fn push_transform(&mut self, transform: Transform) {
        self.transform_stack.push(transform);
    }

    pub fn pop_transform(&mut self) -> Result<()> {
        self.transform_stack.pop()
    }

    pub fn current_transform(&self) -> ActiveTransform {
        self.transform_stack.current()
    }

    /// Sorts by depth (stable) and replays everything against `context`, batching
    /// consecutive geometry that shares a render state. The queue is empty afterwards;
    /// its stacks are kept.
    pub fn perform_draw_ops_and_code(&mut self, context: &mut dyn GpuContext) {
        let mut ops = std::mem::take(&mut self.ops);
        let mut blocks = std::mem::take(&mut self.gl_blocks);
        ops.sort_by(|a, b| a.z.total_cmp(&b.z));
        log::trace!("replaying {} draw ops, {} code blocks", ops.len(), blocks.len());

        let mut manager = RenderStateManager::new(context);
        let mut batch: Vec<Vertex> = Vec::new();
        let mut batch_primitive = Primitive::Triangles;
        let mut batch_state: Option<&RenderState> = None;

        for op in &ops {
            match op.primitive() {
                Some(primitive) => {
                    let same_batch = batch_state == Some(&op.render_state)
                        && batch_primitive == primitive;
                    if !same_batch {
                        flush_batch(&mut manager, batch_primitive, &mut batch);
                        manager.set_render_state(&op.render_state);
                        batch_state = Some(&op.render_state);
                        batch_primitive = primitive;
                    }
                    op.append_vertices(&mut batch, None);
                }
                None => {
                    flush_batch(&mut manager, batch_primitive, &mut batch);
                    batch_state = None;
                    manager.set_render_state(&op.render_state);
                    if let DrawOpKind::GlBlock(index) = op.kind() {
                        if let Some(block) = blocks.get_mut(index).and_then(Option::take) {
                            block(manager.context());
                        }
                    }
                    manager.enforce_after_untrusted_gl();
                }
            }
        }
        flush_batch(&mut manager, batch_primitive, &mut batch);
        // Submits while `ops` still own their textures.
        drop(manager);
    }

    /// Bakes the queue into vertex arrays grouped by render state, transforms applied
    /// to the positions. Fails if custom code was scheduled. The queue is emptied.
    pub fn compile_to(&mut self, vertex_arrays: &mut Vec<VertexArray>) -> Result<()> {
        if !self.gl_blocks.is_empty() {
            return Err(Error::logic("custom code cannot be recorded into a macro"));
        }
        let mut ops = std::mem::take(&mut self.ops);
        ops.sort_by(|a, b| a.z.total_cmp(&b.z));

        for op in &ops {
            let Some(primitive) = op.primitive() else {
                continue;
            };
            let mut state = op.render_state.clone();
            let transform = state.transform.take().map(|t| t.matrix);
            let reuse = vertex_arrays
                .last()
                .is_some_and(|va| va.render_state == state && va.primitive == primitive);
            if !reuse {
                vertex_arrays.push(VertexArray {
                    render_state: state,
                    primitive,
                    vertices: Vec::new(),
                });
            }
            if let Some(array) = vertex_arrays.last_mut() {
                op.append_vertices(&mut array.vertices, transform.as_ref());
            }
        }
        Ok(())
    }

    /// Drops pending ops and code blocks but keeps the stacks.
    pub fn clear_queue(&mut self) {
        self.ops.clear();
        self.gl_blocks.clear();
    }

    /// Drops everything, including transforms and clip regions.
    pub fn reset(&mut self) {
        self.transform_stack.reset();
        self.clip_rect_stack.clear();
        self.clear_queue();
    }
}

fn flush_batch(manager: &mut RenderStateManager<'_>, primitive: Primitive, batch: &mut Vec<Vertex>) {
    if !batch.is_empty() {
        manager.context().draw_vertices(primitive, batch);
        batch.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareDevice;
    use crate::utils::{Color, DrawVertex, Quad};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn quad_op(x: f64, z: ZPos, color: Color) -> DrawOp {
        DrawOp::quad(&Quad::from_rect(x, 0.0, 1.0, 1.0, color), z, RenderState::default())
    }

    #[test]
    fn equal_depth_keeps_submission_order() {
        let device = SoftwareDevice::default();
        let mut ctx = device.create_context(2, 1);
        let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
        queue.schedule_draw_op(quad_op(0.0, 5.0, Color::RED));
        queue.schedule_draw_op(DrawOp::quad(
            &Quad::from_rect(0.0, 0.0, 2.0, 1.0, Color::BLUE),
            5.0,
            RenderState::default(),
        ));
        queue.schedule_draw_op(quad_op(1.0, 5.0, Color::GREEN));
        queue.perform_draw_ops_and_code(&mut ctx);
        assert_eq!(ctx.pixel(0, 0), Color::BLUE);
        assert_eq!(ctx.pixel(1, 0), Color::GREEN);
        assert!(queue.is_empty());
    }

    #[test]
    fn lower_depth_draws_first() {
        let device = SoftwareDevice::default();
        let mut ctx = device.create_context(1, 1);
        let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
        queue.schedule_draw_op(quad_op(0.0, 2.0, Color::RED));
        queue.schedule_draw_op(quad_op(0.0, 1.0, Color::BLUE));
        queue.perform_draw_ops_and_code(&mut ctx);
        assert_eq!(ctx.pixel(0, 0), Color::RED);
    }

    #[test]
    fn identical_states_batch_into_one_draw_call() {
        let device = SoftwareDevice::default();
        let mut ctx = device.create_context(8, 1);
        let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
        for x in 0..8 {
            queue.schedule_draw_op(quad_op(x as f64, 0.0, Color::WHITE));
        }
        queue.perform_draw_ops_and_code(&mut ctx);
        assert_eq!(ctx.stats().draw_calls, 1);
    }

    #[test]
    fn gl_blocks_interleave_by_depth() {
        let device = SoftwareDevice::default();
        let mut ctx = device.create_context(1, 1);
        let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        queue.gl(Box::new(move |_: &mut dyn GpuContext| log.borrow_mut().push("block")), 1.0);
        queue.schedule_draw_op(quad_op(0.0, 2.0, Color::RED));
        queue.schedule_draw_op(quad_op(0.0, 0.0, Color::BLUE));
        queue.perform_draw_ops_and_code(&mut ctx);
        assert_eq!(*seen.borrow(), vec!["block"]);
        assert_eq!(ctx.stats().draw_calls, 2);
        assert_eq!(ctx.pixel(0, 0), Color::RED);
    }

    #[test]
    fn clipped_away_ops_are_dropped() {
        let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
        queue.begin_clipping(0.0, 0.0, 10.0, 10.0, 100).unwrap();
        queue.begin_clipping(20.0, 20.0, 10.0, 10.0, 100).unwrap();
        queue.schedule_draw_op(quad_op(0.0, 0.0, Color::WHITE));
        queue.gl(Box::new(|_: &mut dyn GpuContext| {}), 0.0);
        assert!(queue.is_empty());
        queue.end_clipping().unwrap();
        queue.end_clipping().unwrap();
        assert!(queue.end_clipping().is_err());
    }

    #[test]
    fn clip_rect_is_transformed_and_flipped() {
        let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
        queue.push_transform(Transform::scale(2.0, 2.0, 0.0, 0.0));
        queue.begin_clipping(1.0, 1.0, 3.0, 2.0, 100).unwrap();
        queue.schedule_draw_op(quad_op(0.0, 0.0, Color::WHITE));
        // Device rect (2, 2, 6, 4); bottom edge at y = 6.
        assert_eq!(
            queue.ops()[0].render_state.clip_rect,
            Some(Rect::new(2, 94, 6, 4))
        );
    }

    #[test]
    fn recording_queue_rejects_clipping() {
        let mut queue = DrawOpQueue::new(QueueMode::RecordMacro);
        assert!(matches!(
            queue.begin_clipping(0.0, 0.0, 1.0, 1.0, 1),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn compile_bakes_transform_and_groups_states() {
        let mut queue = DrawOpQueue::new(QueueMode::RecordMacro);
        queue.push_transform(Transform::translate(10.0, 0.0));
        queue.schedule_draw_op(quad_op(0.0, 0.0, Color::WHITE));
        queue.schedule_draw_op(quad_op(1.0, 0.0, Color::WHITE));
        queue.pop_transform().unwrap();
        queue.schedule_draw_op(DrawOp::line(
            DrawVertex::new(0.0, 0.0, Color::WHITE),
            DrawVertex::new(4.0, 0.0, Color::WHITE),
            1.0,
            RenderState::default(),
        ));
        let mut arrays = Vec::new();
        queue.compile_to(&mut arrays).unwrap();
        assert_eq!(arrays.len(), 2);
        assert_eq!(arrays[0].vertices.len(), 12);
        assert_eq!(arrays[0].vertices[0].position, [10.0, 0.0]);
        assert!(arrays[0].render_state.transform.is_none());
        assert_eq!(arrays[1].primitive, Primitive::Lines);
    }

    #[test]
    fn compile_rejects_custom_code() {
        let mut queue = DrawOpQueue::new(QueueMode::RecordMacro);
        queue.gl(Box::new(|_: &mut dyn GpuContext| {}), 0.0);
        let mut arrays = Vec::new();
        assert!(matches!(queue.compile_to(&mut arrays), Err(Error::Logic(_))));
    }
}
