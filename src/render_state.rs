use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{GpuContext, SurfaceId};
use crate::texture::Texture;
use crate::transform::Transform;
use crate::transform_stack::ActiveTransform;
use crate::utils::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// Alpha-over.
    #[default]
    Default,
    Add,
    Multiply,
}

/// The GPU-visible settings a draw operation needs.
///
/// Textures compare by key and transforms by [`TransformId`](crate::transform_stack::TransformId),
/// so two states built from the same stack position are equal without comparing matrices.
#[derive(Debug, Clone, Default)]
pub struct RenderState {
    pub texture: Option<Arc<Texture>>,
    /// `None` inside compiled vertex arrays, where the transform is baked into positions.
    pub transform: Option<ActiveTransform>,
    /// Device pixels, bottom-left origin.
    pub clip_rect: Option<Rect>,
    pub blend_mode: BlendMode,
}

impl RenderState {
    pub fn with_blend_mode(blend_mode: BlendMode) -> Self {
        Self {
            blend_mode,
            ..Self::default()
        }
    }

    pub fn with_texture(texture: Arc<Texture>, blend_mode: BlendMode) -> Self {
        Self {
            texture: Some(texture),
            blend_mode,
            ..Self::default()
        }
    }

    pub fn surface(&self) -> Option<SurfaceId> {
        self.texture.as_ref().map(|t| t.surface())
    }
}

impl PartialEq for RenderState {
    fn eq(&self, other: &Self) -> bool {
        self.texture.as_ref().map(|t| t.key()) == other.texture.as_ref().map(|t| t.key())
            && self.transform == other.transform
            && self.clip_rect == other.clip_rect
            && self.blend_mode == other.blend_mode
    }
}

/// Applies render states to a context, skipping fields that did not change.
///
/// Construction saves the context state and installs the defaults; dropping the manager
/// clears clipping and texturing and restores the saved state.
pub struct RenderStateManager<'a> {
    context: &'a mut dyn GpuContext,
    texture: Option<SurfaceId>,
    // Outer `None` means nothing has been loaded yet.
    transform: Option<Option<ActiveTransform>>,
    clip_rect: Option<Rect>,
    blend_mode: BlendMode,
    last: RenderState,
}

impl<'a> RenderStateManager<'a> {
    pub fn new(context: &'a mut dyn GpuContext) -> Self {
        context.push_state();
        context.set_blend_mode(BlendMode::Default);
        context.bind_texture(None);
        context.set_scissor(None);
        Self {
            context,
            texture: None,
            transform: None,
            clip_rect: None,
            blend_mode: BlendMode::Default,
            last: RenderState::default(),
        }
    }

    pub fn context(&mut self) -> &mut dyn GpuContext {
        &mut *self.context
    }

    pub fn set_render_state(&mut self, state: &RenderState) {
        self.set_texture(state.surface());
        self.set_transform(state.transform);
        self.set_clip_rect(state.clip_rect);
        self.set_blend_mode(state.blend_mode);
        self.last = state.clone();
    }

    pub fn set_texture(&mut self, texture: Option<SurfaceId>) {
        if texture != self.texture {
            self.context.bind_texture(texture);
            self.texture = texture;
        }
    }

    pub fn set_transform(&mut self, transform: Option<ActiveTransform>) {
        if self.transform == Some(transform) {
            return;
        }
        let matrix = transform.map_or_else(Transform::identity, |t| t.matrix);
        self.context.load_transform(&matrix);
        self.transform = Some(transform);
    }

    pub fn set_clip_rect(&mut self, clip_rect: Option<Rect>) {
        if clip_rect != self.clip_rect {
            self.context.set_scissor(clip_rect);
            self.clip_rect = clip_rect;
        }
    }

    pub fn set_blend_mode(&mut self, blend_mode: BlendMode) {
        if blend_mode != self.blend_mode {
            self.context.set_blend_mode(blend_mode);
            self.blend_mode = blend_mode;
        }
    }

    /// Re-applies every field of the last state. Custom code may have changed anything.
    pub fn enforce_after_untrusted_gl(&mut self) {
        let last = self.last.clone();
        let texture = last.surface();
        self.context.bind_texture(texture);
        self.texture = texture;
        let matrix = last.transform.map_or_else(Transform::identity, |t| t.matrix);
        self.context.load_transform(&matrix);
        self.transform = Some(last.transform);
        self.context.set_scissor(last.clip_rect);
        self.clip_rect = last.clip_rect;
        self.context.set_blend_mode(last.blend_mode);
        self.blend_mode = last.blend_mode;
    }
}

impl Drop for RenderStateManager<'_> {
    fn drop(&mut self) {
        self.context.set_scissor(None);
        self.context.bind_texture(None);
        self.context.pop_state();
        self.context.finish();
    }
}
