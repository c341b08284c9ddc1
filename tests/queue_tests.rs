mod common;

use std::sync::Arc;

use common::{gradient, init_logging, Rng};
use quadbatch::backend::software::SoftwareDevice;
use quadbatch::clip_rect_stack::ClipRectStack;
use quadbatch::draw_op::DrawOp;
use quadbatch::draw_op_queue::{DrawOpQueue, QueueMode};
use quadbatch::render_state::{RenderState, RenderStateManager};
use quadbatch::transform_stack::TransformStack;
use quadbatch::{
    BlendMode, Color, Error, GpuContext, GpuDevice, Graphics, GraphicsConfig, ImageFlags,
    Primitive, Quad, Rect, Texture, Transform,
};

#[test]
fn balanced_clip_pushes_restore_the_effective_rect() {
    let mut rng = Rng::with_seed(7);
    for _ in 0..50 {
        let mut stack = ClipRectStack::new();
        let outer = Rect::new(
            rng.range(0, 20) as i32,
            rng.range(0, 20) as i32,
            rng.range(0, 40) as i32,
            rng.range(0, 40) as i32,
        );
        stack.push(outer);
        let before = stack.effective_rect();

        let depth = rng.range(1, 5);
        for _ in 0..depth {
            stack.push(Rect::new(
                rng.range(0, 30) as i32,
                rng.range(0, 30) as i32,
                rng.range(0, 30) as i32,
                rng.range(0, 30) as i32,
            ));
        }
        for _ in 0..depth {
            stack.pop().unwrap();
        }
        assert_eq!(stack.effective_rect(), before);
    }
}

#[test]
fn unbalanced_pops_are_logic_errors() {
    let mut clips = ClipRectStack::new();
    assert!(matches!(clips.pop(), Err(Error::Logic(_))));

    let mut transforms = TransformStack::new();
    assert!(matches!(transforms.pop(), Err(Error::Logic(_))));

    let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
    assert!(queue.end_clipping().is_err());
    assert!(queue.pop_transform().is_err());
}

#[test]
fn base_transform_requires_an_empty_stack() {
    let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
    queue.set_base_transform(Transform::scale(2.0, 2.0, 0.0, 0.0)).unwrap();
    queue.push_transform(Transform::translate(1.0, 0.0));
    assert!(matches!(
        queue.set_base_transform(Transform::identity()),
        Err(Error::Logic(_))
    ));
    queue.pop_transform().unwrap();
    assert!(queue.set_base_transform(Transform::identity()).is_ok());
}

#[test]
fn clipping_while_recording_is_rejected() {
    init_logging();
    let device = SoftwareDevice::default();
    let context = device.create_context(8, 8);
    let mut g = Graphics::new(context, Arc::new(device), GraphicsConfig::default());
    let result = g.record(8, 8, |g| g.clip_to(0.0, 0.0, 4.0, 4.0, |_| Ok(())));
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert!(!g.is_recording());
}

fn square(x: f64, y: f64, size: f64, color: Color) -> Quad {
    Quad::from_rect(x, y, size, size, color)
}

#[test]
fn equal_depth_ops_replay_in_submission_order() {
    init_logging();
    let device = SoftwareDevice::default();
    let mut rng = Rng::with_seed(99);
    let quads: Vec<Quad> = (0..40)
        .map(|_| {
            let color = Color::rgba(
                rng.range(0, 255) as u8,
                rng.range(0, 255) as u8,
                rng.range(0, 255) as u8,
                rng.range(64, 255) as u8,
            );
            square(
                rng.range(0, 24) as f64,
                rng.range(0, 24) as f64,
                rng.range(2, 8) as f64,
                color,
            )
        })
        .collect();

    let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
    for quad in &quads {
        queue.schedule_draw_op(DrawOp::quad(quad, 5.0, RenderState::default()));
    }
    let mut batched = device.create_context(32, 32);
    queue.perform_draw_ops_and_code(&mut batched);

    let mut reference = device.create_context(32, 32);
    for quad in &quads {
        let mut vertices = Vec::new();
        DrawOp::quad(quad, 0.0, RenderState::default()).append_vertices(&mut vertices, None);
        reference.draw_vertices(Primitive::Triangles, &vertices);
    }
    assert_eq!(batched.target(), reference.target());
}

#[test]
fn lower_depth_draws_below_regardless_of_submission() {
    let device = SoftwareDevice::default();
    let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
    queue.schedule_draw_op(DrawOp::quad(&square(0.0, 0.0, 4.0, Color::RED), 2.0, RenderState::default()));
    queue.schedule_draw_op(DrawOp::quad(&square(0.0, 0.0, 4.0, Color::BLUE), 1.0, RenderState::default()));
    queue.schedule_draw_op(DrawOp::quad(&square(2.0, 2.0, 2.0, Color::GREEN), 2.0, RenderState::default()));
    let mut ctx = device.create_context(4, 4);
    queue.perform_draw_ops_and_code(&mut ctx);
    assert_eq!(ctx.pixel(0, 0), Color::RED);
    assert_eq!(ctx.pixel(3, 3), Color::GREEN);
}

#[test]
fn code_blocks_run_in_depth_order() {
    let device = SoftwareDevice::default();
    let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
    queue.gl(
        Box::new(|context: &mut dyn GpuContext| context.clear(Color::BLUE)),
        3.0,
    );
    queue.schedule_draw_op(DrawOp::quad(&square(0.0, 0.0, 2.0, Color::RED), 1.0, RenderState::default()));
    queue.schedule_draw_op(DrawOp::quad(&square(2.0, 2.0, 2.0, Color::GREEN), 4.0, RenderState::default()));
    let mut ctx = device.create_context(4, 4);
    queue.perform_draw_ops_and_code(&mut ctx);
    assert_eq!(ctx.pixel(0, 0), Color::BLUE);
    assert_eq!(ctx.pixel(3, 3), Color::GREEN);
    assert!(queue.is_empty());
}

#[test]
fn setting_the_same_state_twice_issues_no_extra_calls() {
    let device = SoftwareDevice::default();
    let texture = Arc::new(Texture::new(Arc::new(device.clone()), 16, 16, false).unwrap());
    let _chunk = texture.try_alloc(&gradient(4, 4), 1).unwrap().unwrap();
    let mut stack = TransformStack::new();
    stack.push(Transform::rotate(30.0, 4.0, 4.0));
    let state = RenderState {
        transform: Some(stack.current()),
        clip_rect: Some(Rect::new(1, 1, 6, 6)),
        ..RenderState::with_texture(Arc::clone(&texture), BlendMode::Add)
    };

    let mut once = device.create_context(8, 8);
    {
        let mut manager = RenderStateManager::new(&mut once);
        manager.set_render_state(&state);
    }
    let mut twice = device.create_context(8, 8);
    {
        let mut manager = RenderStateManager::new(&mut twice);
        manager.set_render_state(&state);
        manager.set_render_state(&state.clone());
    }
    assert_eq!(once.stats(), twice.stats());
    assert!(once.stats().state_changes() > 0);
}

#[test]
fn batches_share_one_draw_call_per_state() {
    let device = SoftwareDevice::default();
    let mut queue = DrawOpQueue::new(QueueMode::RenderToScreen);
    for i in 0..6 {
        queue.schedule_draw_op(DrawOp::quad(
            &square(i as f64, 0.0, 1.0, Color::WHITE),
            0.0,
            RenderState::default(),
        ));
    }
    queue.schedule_draw_op(DrawOp::quad(
        &square(0.0, 2.0, 1.0, Color::WHITE),
        0.0,
        RenderState::with_blend_mode(BlendMode::Add),
    ));
    let mut ctx = device.create_context(8, 8);
    queue.perform_draw_ops_and_code(&mut ctx);
    assert_eq!(ctx.stats().draw_calls, 2);
}

#[test]
fn every_replay_ends_with_one_submit() {
    let device = SoftwareDevice::default();
    let shared: Arc<dyn GpuDevice> = Arc::new(device.clone());
    let mut g = Graphics::new(device.create_context(8, 8), shared, GraphicsConfig::default());
    let image = g
        .factory()
        .create_image_from(&gradient(4, 4), ImageFlags::empty())
        .unwrap();

    g.frame(|g| g.draw_rect(image.as_ref(), 0.0, 0.0, 0.0, Color::WHITE, BlendMode::Default))
        .unwrap();
    drop(image);
    assert_eq!(g.context().stats().submits, 1);

    g.gl_now(|context| context.clear(Color::BLUE)).unwrap();
    assert_eq!(g.context().stats().submits, 3);
}
