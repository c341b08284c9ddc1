use crate::error::{Error, Result};
use crate::utils::Rect;

/// Nested clip regions; the effective rectangle is the intersection of all pushed
/// rectangles, or `None` when nothing clips.
#[derive(Debug, Default)]
pub struct ClipRectStack {
    stack: Vec<Rect>,
    effective: Option<Rect>,
}

impl ClipRectStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
        self.effective = None;
    }

    pub fn push(&mut self, rect: Rect) {
        self.stack.push(rect);
        self.effective = Some(match self.effective {
            Some(current) => current.intersection(&rect),
            None => rect,
        });
    }

    pub fn pop(&mut self) -> Result<()> {
        if self.stack.pop().is_none() {
            return Err(Error::logic("pop on an empty clip rect stack"));
        }
        self.effective = self
            .stack
            .iter()
            .copied()
            .reduce(|acc, rect| acc.intersection(&rect));
        Ok(())
    }

    pub fn effective_rect(&self) -> Option<Rect> {
        self.effective
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// True once the nested regions intersect to nothing; draws can be dropped.
    pub fn clipped_world_away(&self) -> bool {
        self.effective.is_some_and(|rect| rect.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_pushes_intersect() {
        let mut stack = ClipRectStack::new();
        stack.push(Rect::new(0, 0, 100, 100));
        stack.push(Rect::new(50, 50, 100, 100));
        assert_eq!(stack.effective_rect(), Some(Rect::new(50, 50, 50, 50)));
        stack.pop().unwrap();
        assert_eq!(stack.effective_rect(), Some(Rect::new(0, 0, 100, 100)));
        stack.pop().unwrap();
        assert_eq!(stack.effective_rect(), None);
    }

    #[test]
    fn disjoint_regions_clip_everything() {
        let mut stack = ClipRectStack::new();
        stack.push(Rect::new(0, 0, 10, 10));
        stack.push(Rect::new(20, 20, 10, 10));
        assert!(stack.clipped_world_away());
    }

    #[test]
    fn pop_without_push_fails() {
        let mut stack = ClipRectStack::new();
        assert!(stack.pop().is_err());
    }
}
