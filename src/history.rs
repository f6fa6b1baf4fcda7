// Undo/redo stacks of full-image snapshots for the annotation canvas.

use crate::types::Frame;

/// Two stacks of snapshots. After a committed edit the top of `undo` is the
/// pre-edit image and `redo` is empty; `redo` only fills up through `undo()`.
#[derive(Default)]
pub struct History {
    undo: Vec<Frame>,
    redo: Vec<Frame>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the image as it was before an edit. Starting an edit invalidates redo.
    pub fn push_snapshot(&mut self, before: Frame) {
        self.undo.push(before);
        self.redo.clear();
    }

    /// Snapshot on top of the undo stack (the pre-edit image while a gesture runs).
    pub fn peek(&self) -> Option<&Frame> {
        self.undo.last()
    }

    /// Drop the most recent snapshot and hand it back (gesture rollback).
    pub fn pop_snapshot(&mut self) -> Option<Frame> {
        self.undo.pop()
    }

    /// Swap `current` with the top of `undo`; returns false when there is nothing to undo.
    pub fn undo(&mut self, current: &mut Frame) -> bool {
        match self.undo.pop() {
            Some(prev) => {
                self.redo.push(std::mem::replace(current, prev));
                true
            }
            None => false,
        }
    }

    /// Swap `current` with the top of `redo`; returns false when there is nothing to redo.
    pub fn redo(&mut self, current: &mut Frame) -> bool {
        match self.redo.pop() {
            Some(next) => {
                self.undo.push(std::mem::replace(current, next));
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Image that the next `redo()` would bring back.
    pub fn redo_top(&self) -> Option<&Frame> {
        self.redo.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(v: u8) -> Frame {
        Frame::from_pixel(2, 2, Rgb([v, v, v]))
    }

    #[test]
    fn undo_and_redo_swap_the_current_image() {
        let mut h = History::new();
        let mut cur = solid(0);
        h.push_snapshot(cur.clone());
        cur = solid(1);

        assert!(h.undo(&mut cur));
        assert_eq!(cur, solid(0));
        assert_eq!(h.redo_top(), Some(&solid(1)));

        assert!(h.redo(&mut cur));
        assert_eq!(cur, solid(1));
        assert_eq!((h.undo_len(), h.redo_len()), (1, 0));
    }

    #[test]
    fn empty_stacks_are_no_ops() {
        let mut h = History::new();
        let mut cur = solid(7);
        assert!(!h.undo(&mut cur));
        assert!(!h.redo(&mut cur));
        assert_eq!(cur, solid(7));
    }

    #[test]
    fn new_snapshot_discards_redo() {
        let mut h = History::new();
        let mut cur = solid(0);
        h.push_snapshot(cur.clone());
        cur = solid(1);
        h.undo(&mut cur);
        assert_eq!(h.redo_len(), 1);

        h.push_snapshot(cur.clone());
        assert_eq!(h.redo_len(), 0);
    }
}
