// Context stack - which component is rendering and where its cursor is
//
// A component function may synchronously call another component function.
// Entering the inner render pushes the outer frame; exiting pops it back,
// cursor included, so the outer component continues at the slot it left.

use crate::registry::ComponentId;

/// Active component and its hook cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextFrame {
    /// Component whose render is in progress.
    pub component: ComponentId,
    /// Index of the next hook slot.
    pub cursor: usize,
}

/// Depth marker used to unwind the stack after a panicking render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Checkpoint(usize);

#[derive(Default)]
pub(crate) struct ContextStack {
    active: Option<ContextFrame>,
    suspended: Vec<ContextFrame>,
}

impl ContextStack {
    /// Make `component` active with a fresh cursor, suspending the current frame.
    pub(crate) fn push(&mut self, component: ComponentId) {
        if let Some(previous) = self.active.take() {
            self.suspended.push(previous);
        }
        self.active = Some(ContextFrame {
            component,
            cursor: 0,
        });
    }

    /// Leave the active frame and resume the suspended one, if any.
    ///
    /// Returns the frame that was left.
    pub(crate) fn pop(&mut self) -> Option<ContextFrame> {
        let finished = self.active.take()?;
        self.active = self.suspended.pop();
        Some(finished)
    }

    pub(crate) fn active(&self) -> Option<ContextFrame> {
        self.active
    }

    /// Claim the next slot of the active frame (post-increment).
    pub(crate) fn next_slot(&mut self) -> Option<(ComponentId, usize)> {
        let frame = self.active.as_mut()?;
        let slot = frame.cursor;
        frame.cursor += 1;
        Some((frame.component, slot))
    }

    /// Number of frames, active one included.
    pub(crate) fn depth(&self) -> usize {
        self.suspended.len() + usize::from(self.active.is_some())
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.depth())
    }

    /// Pop frames until the depth matches `checkpoint`. Returns how many were dropped.
    pub(crate) fn unwind_to(&mut self, checkpoint: Checkpoint) -> usize {
        let mut dropped = 0;
        while self.depth() > checkpoint.0 {
            self.pop();
            dropped += 1;
        }
        dropped
    }

    pub(crate) fn clear(&mut self) {
        self.active = None;
        self.suspended.clear();
    }
}
