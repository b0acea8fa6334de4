//! Ref hook: a mutable box that survives re-renders and never schedules one.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::Engine;
use crate::error::{HookError, Result};
use crate::registry::slot_cell;

/// Shared mutable cell handed out by [`Engine::use_ref`].
///
/// Every render of the owning component gets a clone of the same handle.
/// Writing through it is invisible to the scheduler.
pub struct Ref<T>(Arc<Mutex<T>>);

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ref").field(&*self.0.lock()).finish()
    }
}

impl<T> Ref<T> {
    fn new(value: T) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    /// Clone of the current value.
    pub fn current(&self) -> T
    where
        T: Clone,
    {
        self.0.lock().clone()
    }

    /// Overwrite the value.
    pub fn set(&self, value: T) {
        *self.0.lock() = value;
    }

    /// Overwrite the value and return the old one.
    pub fn replace(&self, value: T) -> T {
        std::mem::replace(&mut *self.0.lock(), value)
    }

    /// Borrow the value. Do not call back into this ref from `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.lock())
    }

    /// Mutably borrow the value. Do not call back into this ref from `f`.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.lock())
    }

    /// True if both handles point at the same cell.
    pub fn ptr_eq(&self, other: &Ref<T>) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Engine {
    /// A [`Ref`] created from `init` on the first render and reused after.
    pub fn use_ref<T, F>(&self, init: F) -> Result<Ref<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T,
    {
        let (id, slot) = self.next_slot("use_ref")?;
        let existing = {
            let store = self.store();
            let instance = store
                .registry
                .get(id)
                .ok_or(HookError::ComponentDataMissing(id))?;
            match instance.refs.get(slot).and_then(Option::as_ref) {
                Some(cell) => Some(cell.downcast_ref::<Ref<T>>().cloned().ok_or(
                    HookError::SlotTypeMismatch {
                        component: id,
                        slot,
                        expected: type_name::<Ref<T>>(),
                    },
                )?),
                None => None,
            }
        };
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let created = Ref::new(init());
        let mut store = self.store();
        let instance = store
            .registry
            .get_mut(id)
            .ok_or(HookError::ComponentDataMissing(id))?;
        *slot_cell(&mut instance.refs, slot) = Some(Box::new(created.clone()));
        Ok(created)
    }
}
