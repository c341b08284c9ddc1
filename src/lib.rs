//! Batched 2D drawing on top of an immediate-mode GPU context.
//!
//! Draw calls are recorded into a [`DrawOpQueue`](draw_op_queue::DrawOpQueue), sorted by
//! depth and replayed with redundant state changes skipped. Images are packed into
//! shared atlas textures, tiled when too large, or baked into [`Macro`]s.

pub mod atlas_pool;
pub mod backend;
pub mod bin_packer;
pub mod bitmap;
pub mod clip_rect_stack;
pub mod config;
pub mod draw_op;
pub mod draw_op_queue;
pub mod drawable;
pub mod error;
pub mod graphics;
pub mod image_factory;
pub mod large_image;
pub mod macros;
pub mod render_state;
pub mod texture;
pub mod transform;
pub mod transform_stack;
pub mod utils;

pub use atlas_pool::AtlasPool;
pub use backend::{GpuContext, GpuDevice, Primitive, SurfaceId};
pub use bitmap::Bitmap;
pub use config::GraphicsConfig;
pub use draw_op::ZPos;
pub use drawable::{Drawable, ImageFlags};
pub use error::{Error, Result};
pub use graphics::Graphics;
pub use image_factory::ImageFactory;
pub use large_image::TiledDrawable;
pub use macros::Macro;
pub use render_state::BlendMode;
pub use texture::{TexChunk, Texture};
pub use transform::Transform;
pub use utils::{Color, DrawVertex, Point, Quad, Rect};
