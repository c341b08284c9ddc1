//! The GPU seam. [`GpuDevice`] owns surfaces and is shared across threads;
//! [`GpuContext`] is the single-threaded, stateful submission side.

pub mod software;
#[cfg(feature = "backend-wgpu")]
pub mod wgpu_backend;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::bitmap::Bitmap;
use crate::error::Result;
use crate::render_state::BlendMode;
use crate::transform::Transform;
use crate::utils::{Color, Rect, Vertex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

impl SurfaceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SurfaceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Lines,
    Triangles,
}

pub trait GpuDevice: Send + Sync + std::fmt::Debug {
    fn max_texture_size(&self) -> u32;

    fn create_texture(&self, width: u32, height: u32, retro: bool) -> Result<SurfaceId>;

    fn destroy_texture(&self, surface: SurfaceId);

    /// Writes `bitmap` with its top-left corner at `(x, y)`. The caller keeps the
    /// region inside the surface.
    fn upload(&self, surface: SurfaceId, x: u32, y: u32, bitmap: &Bitmap) -> Result<()>;

    fn read_back(&self, surface: SurfaceId, rect: Rect) -> Result<Bitmap>;

    /// Runs `draw` against a fresh transparent `width`×`height` target and returns
    /// its pixels.
    fn render_offscreen(
        &self,
        width: u32,
        height: u32,
        draw: &mut dyn FnMut(&mut dyn GpuContext),
    ) -> Result<Bitmap>;
}

/// Immediate-mode state machine in the style of a fixed-function pipeline.
///
/// Positions passed to [`draw_vertices`](Self::draw_vertices) are in pixels and go
/// through the loaded transform; scissor rectangles use a bottom-left origin.
pub trait GpuContext {
    fn surface_size(&self) -> (u32, u32);

    fn clear(&mut self, color: Color);

    fn bind_texture(&mut self, texture: Option<SurfaceId>);

    fn load_transform(&mut self, transform: &Transform);

    fn set_scissor(&mut self, rect: Option<Rect>);

    fn set_blend_mode(&mut self, mode: BlendMode);

    /// Saves texture, transform, scissor and blend state.
    fn push_state(&mut self);

    fn pop_state(&mut self);

    fn draw_vertices(&mut self, primitive: Primitive, vertices: &[Vertex]);

    /// Hands everything drawn so far to the device. Textures referenced by earlier
    /// draws may be destroyed once this returns.
    fn finish(&mut self) {}
}

/// Counts of state-changing calls, for verifying that redundant changes are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    pub texture_binds: usize,
    pub transform_loads: usize,
    pub scissor_changes: usize,
    pub blend_changes: usize,
    pub draw_calls: usize,
    pub submits: usize,
}

impl ContextStats {
    pub fn state_changes(&self) -> usize {
        self.texture_binds + self.transform_loads + self.scissor_changes + self.blend_changes
    }
}

/// Converts a bottom-left-origin scissor rectangle to top-left origin.
pub(crate) fn flip_scissor(rect: Rect, surface_height: u32) -> Rect {
    Rect::new(
        rect.x,
        surface_height as i32 - rect.y - rect.height,
        rect.width,
        rect.height,
    )
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SavedState {
    pub texture: Option<SurfaceId>,
    pub transform: Transform,
    pub scissor: Option<Rect>,
    pub blend: BlendMode,
}
