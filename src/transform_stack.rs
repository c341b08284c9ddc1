use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::transform::Transform;

static NEXT_TRANSFORM_ID: AtomicU64 = AtomicU64::new(1);

/// Generation id handed out when a distinct absolute transform is registered.
/// Render states compare transforms by this id rather than by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransformId(u64);

impl TransformId {
    fn next() -> Self {
        TransformId(NEXT_TRANSFORM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ActiveTransform {
    pub id: TransformId,
    pub matrix: Transform,
}

impl PartialEq for ActiveTransform {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActiveTransform {}

/// Cumulative transform of nested `push`/`pop` scopes.
///
/// Every absolute transform ever made current is kept in a history list so that
/// returning to an identical matrix yields the same [`TransformId`]. The history is
/// indexed by matrix bits and lives until the next [`reset`](Self::reset).
#[derive(Debug)]
pub struct TransformStack {
    individual: Vec<Transform>,
    absolute: Vec<ActiveTransform>,
    by_matrix: HashMap<[u64; 16], usize>,
    current: usize,
}

impl Default for TransformStack {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformStack {
    pub fn new() -> Self {
        let mut stack = Self {
            individual: Vec::new(),
            absolute: Vec::new(),
            by_matrix: HashMap::new(),
            current: 0,
        };
        stack.reset();
        stack
    }

    pub fn reset(&mut self) {
        self.individual.clear();
        self.individual.push(Transform::identity());
        self.absolute.clear();
        self.by_matrix.clear();
        self.current = 0;
        self.make_current(Transform::identity());
    }

    /// Replaces the root transform. Only valid while nothing is pushed.
    pub fn set_base_transform(&mut self, base: Transform) -> Result<()> {
        if self.individual.len() != 1 {
            return Err(Error::logic(
                "base transform changed while transforms are pushed",
            ));
        }
        self.individual[0] = base;
        self.make_current(base);
        Ok(())
    }

    pub fn current(&self) -> ActiveTransform {
        self.absolute[self.current]
    }

    /// Number of pushed transforms above the root.
    pub fn depth(&self) -> usize {
        self.individual.len() - 1
    }

    pub fn push(&mut self, transform: Transform) {
        self.individual.push(transform);
        let result = transform.concat(&self.current().matrix);
        self.make_current(result);
    }

    pub fn pop(&mut self) -> Result<()> {
        if self.individual.len() <= 1 {
            return Err(Error::logic("pop on an empty transform stack"));
        }
        self.individual.pop();
        let result = self
            .individual
            .iter()
            .rev()
            .fold(Transform::identity(), |acc, t| acc.concat(t));
        self.make_current(result);
        Ok(())
    }

    fn make_current(&mut self, transform: Transform) {
        let absolute = &mut self.absolute;
        self.current = *self
            .by_matrix
            .entry(matrix_key(&transform))
            .or_insert_with(|| {
                absolute.push(ActiveTransform {
                    id: TransformId::next(),
                    matrix: transform,
                });
                absolute.len() - 1
            });
    }
}

/// Adding `0.0` folds `-0.0` into `0.0` so keys agree with `==` on finite matrices.
fn matrix_key(transform: &Transform) -> [u64; 16] {
    transform.0.map(|v| (v + 0.0).to_bits())
}
