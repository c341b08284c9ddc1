//! 4×4 transforms in row-major order, applied to row vectors: `(x, y, 0, 1) · M`.
//! Translation therefore lives in elements 12 and 13, and `concat(a, b)` applies `a`
//! first, then `b`.

use crate::error::{Error, Result};
use crate::utils::Point;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform(pub [f64; 16]);

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub const fn identity() -> Self {
        Transform([
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    pub fn translate(x: f64, y: f64) -> Self {
        let mut m = Self::identity();
        m.0[12] = x;
        m.0[13] = y;
        m
    }

    /// Rotation by `degrees` (clockwise on a y-down surface) around `(around_x, around_y)`.
    pub fn rotate(degrees: f64, around_x: f64, around_y: f64) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        let rotation = Transform([
            c, s, 0.0, 0.0, //
            -s, c, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ]);
        Self::around(rotation, around_x, around_y)
    }

    pub fn scale(factor_x: f64, factor_y: f64, around_x: f64, around_y: f64) -> Self {
        let mut m = Self::identity();
        m.0[0] = factor_x;
        m.0[5] = factor_y;
        Self::around(m, around_x, around_y)
    }

    fn around(m: Transform, x: f64, y: f64) -> Self {
        if x == 0.0 && y == 0.0 {
            return m;
        }
        Transform::translate(-x, -y)
            .concat(&m)
            .concat(&Transform::translate(x, y))
    }

    /// Matrix product `self · rhs`: the result applies `self` first, then `rhs`.
    pub fn concat(&self, rhs: &Transform) -> Transform {
        let (a, b) = (&self.0, &rhs.0);
        let mut out = [0.0; 16];
        for row in 0..4 {
            for col in 0..4 {
                out[row * 4 + col] = (0..4).map(|k| a[row * 4 + k] * b[k * 4 + col]).sum();
            }
        }
        Transform(out)
    }

    /// Projects a point through the transform, including the homogeneous divide.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.0;
        let out_x = x * m[0] + y * m[4] + m[12];
        let out_y = x * m[1] + y * m[5] + m[13];
        let out_w = x * m[3] + y * m[7] + m[15];
        (out_x / out_w, out_y / out_w)
    }

    pub fn apply_point(&self, p: Point) -> Point {
        let (x, y) = self.apply(p.x, p.y);
        Point::new(x, y)
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Finds the projective transform that maps the rectangle `(0, 0, width, height)`
    /// onto `target` (corners ordered top-left, top-right, bottom-left, bottom-right).
    ///
    /// Solves the eight unknowns `a..h` of
    /// `tx = (a·sx + b·sy + c) / (g·sx + h·sy + 1)` and
    /// `ty = (d·sx + e·sy + f) / (g·sx + h·sy + 1)` for the four corner pairs.
    pub fn map_rect_to_quad(width: f64, height: f64, target: [Point; 4]) -> Result<Transform> {
        if width <= 0.0 || height <= 0.0 {
            return Err(Error::invalid("source rectangle must have a positive size"));
        }
        let [tl, tr, bl, _] = target;
        if is_parallelogram(&target) {
            // Parallelograms need no projective terms; the affine map is exact.
            return Ok(Transform([
                (tr.x - tl.x) / width, (tr.y - tl.y) / width, 0.0, 0.0, //
                (bl.x - tl.x) / height, (bl.y - tl.y) / height, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0, //
                tl.x, tl.y, 0.0, 1.0,
            ]));
        }

        let sources = [
            Point::new(0.0, 0.0),
            Point::new(width, 0.0),
            Point::new(0.0, height),
            Point::new(width, height),
        ];

        let mut system = [[0.0f64; 9]; 8];
        for (i, (s, t)) in sources.iter().zip(target.iter()).enumerate() {
            system[2 * i] = [s.x, s.y, 1.0, 0.0, 0.0, 0.0, -s.x * t.x, -s.y * t.x, t.x];
            system[2 * i + 1] = [0.0, 0.0, 0.0, s.x, s.y, 1.0, -s.x * t.y, -s.y * t.y, t.y];
        }
        let q = solve_linear_system(system)
            .ok_or_else(|| Error::invalid("target quad is degenerate"))?;

        Ok(Transform([
            q[0], q[3], 0.0, q[6], //
            q[1], q[4], 0.0, q[7], //
            0.0, 0.0, 1.0, 0.0, //
            q[2], q[5], 0.0, 1.0,
        ]))
    }
}

/// Whether opposite sides of the quad (top-left, top-right, bottom-left, bottom-right)
/// are parallel and equally long, up to rounding relative to the longest edge.
pub(crate) fn is_parallelogram(corners: &[Point; 4]) -> bool {
    let [tl, tr, bl, br] = *corners;
    let extent = [(tl, tr), (tl, bl), (tr, br), (bl, br)]
        .iter()
        .map(|(a, b)| (b.x - a.x).hypot(b.y - a.y))
        .fold(0.0, f64::max);
    let tolerance = 1e-9 * extent;
    (tl.x + br.x - tr.x - bl.x).abs() <= tolerance && (tl.y + br.y - tr.y - bl.y).abs() <= tolerance
}

/// Gaussian elimination with partial pivoting on an 8×8 augmented matrix.
fn solve_linear_system(mut m: [[f64; 9]; 8]) -> Option<[f64; 8]> {
    const N: usize = 8;
    for col in 0..N {
        let pivot = (col..N).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        for row in (col + 1)..N {
            let factor = m[row][col] / m[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..=N {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut solution = [0.0; N];
    for row in (0..N).rev() {
        let tail: f64 = ((row + 1)..N).map(|k| m[row][k] * solution[k]).sum();
        solution[row] = (m[row][N] - tail) / m[row][row];
    }
    Some(solution)
}
