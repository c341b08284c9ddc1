//! CPU reference implementation of the backend traits.
//!
//! Samples pixel centers at `(x + 0.5, y + 0.5)` and fills triangles with the
//! top-left rule, so two triangles sharing an edge never touch a pixel twice.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{
    flip_scissor, ContextStats, GpuContext, GpuDevice, Primitive, SavedState, SurfaceId,
};
use crate::bitmap::{self, Bitmap};
use crate::error::{Error, Result};
use crate::render_state::BlendMode;
use crate::transform::Transform;
use crate::utils::{lock, Color, Rect, Vertex};

pub const DEFAULT_MAX_TEXTURE_SIZE: u32 = 4096;

#[derive(Debug)]
struct Surface {
    pixels: Bitmap,
    retro: bool,
}

type SurfaceMap = Arc<Mutex<HashMap<SurfaceId, Surface>>>;

/// In-memory texture store. Cloning shares the same surfaces.
#[derive(Debug, Clone)]
pub struct SoftwareDevice {
    max_texture_size: u32,
    surfaces: SurfaceMap,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TEXTURE_SIZE)
    }
}

impl SoftwareDevice {
    pub fn new(max_texture_size: u32) -> Self {
        Self {
            max_texture_size,
            surfaces: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of live textures.
    pub fn surface_count(&self) -> usize {
        lock(&self.surfaces).len()
    }

    pub fn surface_size(&self, surface: SurfaceId) -> Option<(u32, u32)> {
        lock(&self.surfaces)
            .get(&surface)
            .map(|s| s.pixels.dimensions())
    }

    /// Creates a context drawing into a fresh transparent target.
    pub fn create_context(&self, width: u32, height: u32) -> SoftwareContext {
        SoftwareContext {
            surfaces: Arc::clone(&self.surfaces),
            target: Bitmap::new(width, height),
            state: SavedState {
                texture: None,
                transform: Transform::identity(),
                scissor: None,
                blend: BlendMode::Default,
            },
            saved: Vec::new(),
            stats: ContextStats::default(),
        }
    }
}

impl GpuDevice for SoftwareDevice {
    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    fn create_texture(&self, width: u32, height: u32, retro: bool) -> Result<SurfaceId> {
        if width == 0 || height == 0 || width > self.max_texture_size || height > self.max_texture_size {
            return Err(Error::invalid(format!(
                "texture size {width}x{height} outside 1..={}",
                self.max_texture_size
            )));
        }
        let id = SurfaceId::next();
        lock(&self.surfaces).insert(
            id,
            Surface {
                pixels: Bitmap::new(width, height),
                retro,
            },
        );
        Ok(id)
    }

    fn destroy_texture(&self, surface: SurfaceId) {
        lock(&self.surfaces).remove(&surface);
    }

    fn upload(&self, surface: SurfaceId, x: u32, y: u32, pixels: &Bitmap) -> Result<()> {
        let mut surfaces = lock(&self.surfaces);
        let target = surfaces
            .get_mut(&surface)
            .ok_or_else(|| Error::Gpu(format!("unknown surface {surface:?}")))?;
        bitmap::insert(&mut target.pixels, pixels, x as i32, y as i32);
        Ok(())
    }

    fn read_back(&self, surface: SurfaceId, rect: Rect) -> Result<Bitmap> {
        let surfaces = lock(&self.surfaces);
        let source = surfaces
            .get(&surface)
            .ok_or_else(|| Error::Gpu(format!("unknown surface {surface:?}")))?;
        let bounds = Rect::with_size(source.pixels.width(), source.pixels.height());
        if !bounds.contains(&rect) {
            return Err(Error::invalid(format!(
                "read-back {rect:?} outside surface {bounds:?}"
            )));
        }
        Ok(bitmap::sub_bitmap(&source.pixels, rect))
    }

    fn render_offscreen(
        &self,
        width: u32,
        height: u32,
        draw: &mut dyn FnMut(&mut dyn GpuContext),
    ) -> Result<Bitmap> {
        let mut context = self.create_context(width, height);
        draw(&mut context);
        Ok(context.into_target())
    }
}

#[derive(Debug)]
pub struct SoftwareContext {
    surfaces: SurfaceMap,
    target: Bitmap,
    state: SavedState,
    saved: Vec<SavedState>,
    stats: ContextStats,
}

impl SoftwareContext {
    pub fn target(&self) -> &Bitmap {
        &self.target
    }

    pub fn into_target(self) -> Bitmap {
        self.target
    }

    pub fn stats(&self) -> ContextStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = ContextStats::default();
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        Color::from_image_rgba(*self.target.get_pixel(x, y))
    }

    fn clip_bounds(&self) -> Rect {
        let full = Rect::with_size(self.target.width(), self.target.height());
        match self.state.scissor {
            Some(rect) => full.intersection(&flip_scissor(rect, self.target.height())),
            None => full,
        }
    }
}

impl GpuContext for SoftwareContext {
    fn surface_size(&self) -> (u32, u32) {
        self.target.dimensions()
    }

    fn clear(&mut self, color: Color) {
        let pixel = color.to_image_rgba();
        for p in self.target.pixels_mut() {
            *p = pixel;
        }
    }

    fn bind_texture(&mut self, texture: Option<SurfaceId>) {
        self.stats.texture_binds += 1;
        self.state.texture = texture;
    }

    fn load_transform(&mut self, transform: &Transform) {
        self.stats.transform_loads += 1;
        self.state.transform = *transform;
    }

    fn set_scissor(&mut self, rect: Option<Rect>) {
        self.stats.scissor_changes += 1;
        self.state.scissor = rect;
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.stats.blend_changes += 1;
        self.state.blend = mode;
    }

    fn push_state(&mut self) {
        self.saved.push(self.state);
    }

    fn pop_state(&mut self) {
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
    }

    fn finish(&mut self) {
        self.stats.submits += 1;
    }

    fn draw_vertices(&mut self, primitive: Primitive, vertices: &[Vertex]) {
        self.stats.draw_calls += 1;
        let clip = self.clip_bounds();
        if clip.is_empty() {
            return;
        }
        let transform = self.state.transform;
        let blend = self.state.blend;
        let surfaces = lock(&self.surfaces);
        let texture = self.state.texture.and_then(|id| surfaces.get(&id));
        let mut raster = Raster {
            target: &mut self.target,
            clip,
            blend,
            texture,
        };
        let project = |v: &Vertex| {
            transform.apply(v.position[0] as f64, v.position[1] as f64)
        };
        match primitive {
            Primitive::Triangles => {
                for tri in vertices.chunks_exact(3) {
                    let points = [project(&tri[0]), project(&tri[1]), project(&tri[2])];
                    raster.triangle([&tri[0], &tri[1], &tri[2]], points);
                }
            }
            Primitive::Lines => {
                for line in vertices.chunks_exact(2) {
                    raster.line([&line[0], &line[1]], [project(&line[0]), project(&line[1])]);
                }
            }
        }
    }
}

struct Raster<'a> {
    target: &'a mut Bitmap,
    clip: Rect,
    blend: BlendMode,
    texture: Option<&'a Surface>,
}

type P = (f64, f64);

fn edge(a: P, b: P, c: P) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

// For positive-area triangles on a y-down surface: a horizontal edge running right
// or any edge running up.
fn is_top_left(a: P, b: P) -> bool {
    (a.1 == b.1 && b.0 > a.0) || b.1 < a.1
}

fn covers(w: f64, a: P, b: P) -> bool {
    w > 0.0 || (w == 0.0 && is_top_left(a, b))
}

impl Raster<'_> {
    fn triangle(&mut self, mut v: [&Vertex; 3], mut p: [P; 3]) {
        let mut area = edge(p[0], p[1], p[2]);
        if area == 0.0 || !area.is_finite() {
            return;
        }
        if area < 0.0 {
            v.swap(1, 2);
            p.swap(1, 2);
            area = -area;
        }

        let min_x = p.iter().map(|q| q.0).fold(f64::INFINITY, f64::min);
        let max_x = p.iter().map(|q| q.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = p.iter().map(|q| q.1).fold(f64::INFINITY, f64::min);
        let max_y = p.iter().map(|q| q.1).fold(f64::NEG_INFINITY, f64::max);
        let x0 = (min_x.floor() as i32).max(self.clip.x);
        let x1 = (max_x.ceil() as i32).min(self.clip.right());
        let y0 = (min_y.floor() as i32).max(self.clip.y);
        let y1 = (max_y.ceil() as i32).min(self.clip.bottom());

        for py in y0..y1 {
            for px in x0..x1 {
                let c = (px as f64 + 0.5, py as f64 + 0.5);
                let w0 = edge(p[1], p[2], c);
                let w1 = edge(p[2], p[0], c);
                let w2 = edge(p[0], p[1], c);
                if !(covers(w0, p[1], p[2]) && covers(w1, p[2], p[0]) && covers(w2, p[0], p[1])) {
                    continue;
                }
                let l = [w0 / area, w1 / area, w2 / area];
                let mut color = [0.0f64; 4];
                let mut uv = [0.0f64; 2];
                for (weight, vertex) in l.iter().zip(v.iter()) {
                    for (k, channel) in color.iter_mut().enumerate() {
                        *channel += weight * vertex.color[k] as f64;
                    }
                    uv[0] += weight * vertex.tex_coords[0] as f64;
                    uv[1] += weight * vertex.tex_coords[1] as f64;
                }
                if let Some(texture) = self.texture {
                    let texel = sample(texture, uv[0], uv[1]);
                    for k in 0..4 {
                        color[k] *= texel[k];
                    }
                }
                self.blend_pixel(px as u32, py as u32, color);
            }
        }
    }

    fn line(&mut self, v: [&Vertex; 2], p: [P; 2]) {
        let (dx, dy) = (p[1].0 - p[0].0, p[1].1 - p[0].1);
        let steps = dx.abs().max(dy.abs()).round().max(1.0) as i32;
        for i in 0..steps {
            let t = (i as f64 + 0.5) / steps as f64;
            let x = (p[0].0 + dx * t).floor() as i32;
            let y = (p[0].1 + dy * t).floor() as i32;
            if x < self.clip.x || x >= self.clip.right() || y < self.clip.y || y >= self.clip.bottom() {
                continue;
            }
            let mut color = [0.0f64; 4];
            for (k, channel) in color.iter_mut().enumerate() {
                let (a, b) = (v[0].color[k] as f64, v[1].color[k] as f64);
                *channel = a + (b - a) * t;
            }
            self.blend_pixel(x as u32, y as u32, color);
        }
    }

    fn blend_pixel(&mut self, x: u32, y: u32, src: [f64; 4]) {
        let pixel = self.target.get_pixel_mut(x, y);
        let dst = pixel.0.map(|c| c as f64 / 255.0);
        let a = src[3];
        let mut out = [0.0f64; 4];
        match self.blend {
            BlendMode::Default => {
                for k in 0..3 {
                    out[k] = src[k] * a + dst[k] * (1.0 - a);
                }
                out[3] = a + dst[3] * (1.0 - a);
            }
            BlendMode::Add => {
                for k in 0..3 {
                    out[k] = src[k] * a + dst[k];
                }
                out[3] = a + dst[3];
            }
            BlendMode::Multiply => {
                for k in 0..3 {
                    out[k] = src[k] * dst[k] + dst[k] * (1.0 - a);
                }
                out[3] = a * dst[3] + dst[3] * (1.0 - a);
            }
        }
        pixel.0 = out.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
    }
}

fn texel(surface: &Surface, x: i64, y: i64) -> [f64; 4] {
    let (w, h) = surface.pixels.dimensions();
    let x = x.clamp(0, w as i64 - 1) as u32;
    let y = y.clamp(0, h as i64 - 1) as u32;
    surface.pixels.get_pixel(x, y).0.map(|c| c as f64 / 255.0)
}

fn sample(surface: &Surface, u: f64, v: f64) -> [f64; 4] {
    let (w, h) = surface.pixels.dimensions();
    let fx = u * w as f64;
    let fy = v * h as f64;
    if surface.retro {
        return texel(surface, fx.floor() as i64, fy.floor() as i64);
    }
    let (sx, sy) = (fx - 0.5, fy - 0.5);
    let (x0, y0) = (sx.floor(), sy.floor());
    let (tx, ty) = (sx - x0, sy - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);
    let mut out = [0.0; 4];
    let corners = [
        (texel(surface, x0, y0), (1.0 - tx) * (1.0 - ty)),
        (texel(surface, x0 + 1, y0), tx * (1.0 - ty)),
        (texel(surface, x0, y0 + 1), (1.0 - tx) * ty),
        (texel(surface, x0 + 1, y0 + 1), tx * ty),
    ];
    for (color, weight) in corners {
        for k in 0..4 {
            out[k] += color[k] * weight;
        }
    }
    out
}
