use crate::backend::Primitive;
use crate::render_state::RenderState;
use crate::transform::Transform;
use crate::utils::{DrawVertex, Quad, Vertex};

/// Depth key. Higher values are drawn later.
pub type ZPos = f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOpKind {
    Line,
    Triangle,
    Quad,
    GlBlock(usize),
}

/// One recorded primitive or custom code block.
///
/// `vertices_or_block_index` holds the vertex count (2, 3 or 4) for geometry and the
/// one's complement of the block index for custom code, so it is negative exactly for
/// code blocks.
#[derive(Debug, Clone)]
pub struct DrawOp {
    pub render_state: RenderState,
    pub vertices_or_block_index: i32,
    pub vertices: [DrawVertex; 4],
    /// Left, top, right, bottom in normalized texture space.
    pub tex_coords: [f32; 4],
    pub z: ZPos,
}

impl DrawOp {
    fn geometry(render_state: RenderState, vertices: &[DrawVertex], z: ZPos) -> Self {
        let mut padded = [DrawVertex::default(); 4];
        padded[..vertices.len()].copy_from_slice(vertices);
        Self {
            render_state,
            vertices_or_block_index: vertices.len() as i32,
            vertices: padded,
            tex_coords: [0.0; 4],
            z,
        }
    }

    pub fn line(a: DrawVertex, b: DrawVertex, z: ZPos, render_state: RenderState) -> Self {
        Self::geometry(render_state, &[a, b], z)
    }

    pub fn triangle(
        a: DrawVertex,
        b: DrawVertex,
        c: DrawVertex,
        z: ZPos,
        render_state: RenderState,
    ) -> Self {
        Self::geometry(render_state, &[a, b, c], z)
    }

    pub fn quad(quad: &Quad, z: ZPos, render_state: RenderState) -> Self {
        Self::geometry(render_state, &quad.corners, z)
    }

    pub fn textured_quad(
        quad: &Quad,
        z: ZPos,
        render_state: RenderState,
        tex_coords: [f32; 4],
    ) -> Self {
        let mut op = Self::quad(quad, z, render_state);
        op.tex_coords = tex_coords;
        op
    }

    pub(crate) fn gl_block(index: usize, z: ZPos) -> Self {
        Self {
            render_state: RenderState::default(),
            vertices_or_block_index: !(index as i32),
            vertices: [DrawVertex::default(); 4],
            tex_coords: [0.0; 4],
            z,
        }
    }

    pub fn kind(&self) -> DrawOpKind {
        match self.vertices_or_block_index {
            2 => DrawOpKind::Line,
            3 => DrawOpKind::Triangle,
            4 => DrawOpKind::Quad,
            n => DrawOpKind::GlBlock(!n as usize),
        }
    }

    /// `None` for custom code blocks.
    pub fn primitive(&self) -> Option<Primitive> {
        match self.kind() {
            DrawOpKind::Line => Some(Primitive::Lines),
            DrawOpKind::Triangle | DrawOpKind::Quad => Some(Primitive::Triangles),
            DrawOpKind::GlBlock(_) => None,
        }
    }

    /// Appends this op's vertices, quads split into the triangles (0, 1, 2) and (2, 1, 3).
    /// With `bake` set, positions are transformed up front.
    pub fn append_vertices(&self, out: &mut Vec<Vertex>, bake: Option<&Transform>) {
        let [left, top, right, bottom] = self.tex_coords;
        let corner_uv = [[left, top], [right, top], [left, bottom], [right, bottom]];
        let vertex = |i: usize| {
            let v = &self.vertices[i];
            let (x, y) = match bake {
                Some(t) => t.apply(v.x, v.y),
                None => (v.x, v.y),
            };
            Vertex {
                position: [x as f32, y as f32],
                tex_coords: corner_uv[i],
                color: v.color.to_f32_array(),
            }
        };
        match self.kind() {
            DrawOpKind::Line => out.extend([vertex(0), vertex(1)]),
            DrawOpKind::Triangle => out.extend([vertex(0), vertex(1), vertex(2)]),
            DrawOpKind::Quad => out.extend([0, 1, 2, 2, 1, 3].map(vertex)),
            DrawOpKind::GlBlock(_) => {}
        }
    }
}

/// Pre-transformed geometry sharing one render state, as compiled for macros.
#[derive(Debug, Clone)]
pub struct VertexArray {
    pub render_state: RenderState,
    pub primitive: Primitive,
    pub vertices: Vec<Vertex>,
}
