//! State hook: `use_state` and the setter it hands out.

use std::any::{Any, type_name};
use std::fmt;
use std::marker::PhantomData;

use crate::engine::{Engine, WeakEngine};
use crate::error::{HookError, Result};
use crate::registry::{ComponentId, StateSlot, slot_cell};
use crate::scheduler::{Job, Priority};

/// Writes one state slot of one component.
///
/// The owning component and slot are captured when the setter is created,
/// so it keeps addressing the right cell when called later from a timer,
/// an event handler or another thread. A setter whose component has been
/// unmounted logs a warning and does nothing.
pub struct StateSetter<T> {
    engine: WeakEngine,
    component: ComponentId,
    slot: usize,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            component: self.component,
            slot: self.slot,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("component", &self.component)
            .field("slot", &self.slot)
            .finish()
    }
}

impl<T> StateSetter<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Component this setter writes to.
    pub fn component(&self) -> ComponentId {
        self.component
    }

    /// Store `value` and schedule a re-render if it differs from the current value.
    ///
    /// Returns true if the state changed.
    pub fn set(&self, value: T) -> bool {
        self.update(move |_| value.clone())
    }

    /// Compute the next value from the current one.
    ///
    /// `f` runs without any engine lock held. If another write lands on the
    /// slot while `f` runs, `f` is called again with the newer value, so
    /// concurrent updates from several threads never overwrite each other.
    pub fn update(&self, f: impl FnMut(&T) -> T) -> bool {
        let Some(engine) = self.engine.upgrade() else {
            tracing::debug!(component = %self.component, "state setter outlived its engine");
            return false;
        };
        engine.write_state(self.component, self.slot, f)
    }

    /// Apply `value` later, from a flush at `priority`.
    ///
    /// Renders before then keep seeing the current value. Deferring again
    /// before the flush replaces the parked value.
    pub fn defer(&self, value: T, priority: Priority) -> bool {
        let Some(engine) = self.engine.upgrade() else {
            return false;
        };
        engine.park_write(self.component, self.slot, value, priority)
    }
}

/// Outcome of a versioned state write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Commit {
    Applied,
    /// The slot was written since it was read.
    Conflict,
    /// The instance or slot no longer exists.
    Gone,
}

impl Engine {
    /// Persistent state for the rendering component.
    ///
    /// `init` runs on the first render only. Returns the current value and a
    /// setter bound to this slot.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let (count, set_count) = engine.use_state(|| 0)?;
    /// set_count.update(|c| c + 1);
    /// ```
    pub fn use_state<T, F>(&self, init: F) -> Result<(T, StateSetter<T>)>
    where
        T: Clone + PartialEq + Send + 'static,
        F: FnOnce() -> T,
    {
        let (id, slot) = self.next_slot("use_state")?;
        let value = self.state_or_init(id, slot, init)?;
        Ok((value, self.setter(id, slot)))
    }

    /// [`use_state`](Self::use_state) with an eagerly built initial value.
    pub fn use_state_value<T>(&self, initial: T) -> Result<(T, StateSetter<T>)>
    where
        T: Clone + PartialEq + Send + 'static,
    {
        self.use_state(move || initial)
    }

    pub(crate) fn setter<T>(&self, component: ComponentId, slot: usize) -> StateSetter<T> {
        StateSetter {
            engine: self.downgrade(),
            component,
            slot,
            _marker: PhantomData,
        }
    }

    /// Read a state slot, or fill it from `init` if it is empty.
    pub(crate) fn state_or_init<T, F>(&self, id: ComponentId, slot: usize, init: F) -> Result<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T,
    {
        if let Some((value, _)) = self.read_state::<T>(id, slot)? {
            return Ok(value);
        }
        let value = init();
        let mut store = self.store();
        let instance = store
            .registry
            .get_mut(id)
            .ok_or(HookError::ComponentDataMissing(id))?;
        let cell = slot_cell(&mut instance.states, slot);
        if cell.is_none() {
            *cell = Some(StateSlot::new(Box::new(value.clone())));
        }
        Ok(value)
    }

    /// Current value and version of a state slot; None if it was never filled.
    pub(crate) fn read_state<T>(&self, id: ComponentId, slot: usize) -> Result<Option<(T, u64)>>
    where
        T: Clone + 'static,
    {
        let store = self.store();
        let instance = store
            .registry
            .get(id)
            .ok_or(HookError::ComponentDataMissing(id))?;
        let Some(state) = instance.states.get(slot).and_then(Option::as_ref) else {
            return Ok(None);
        };
        let value = downcast_state(state.value.as_ref(), id, slot)?;
        Ok(Some((value, state.version)))
    }

    /// Overwrite a state slot if it is still at `version`.
    pub(crate) fn commit_state<T>(
        &self,
        id: ComponentId,
        slot: usize,
        value: T,
        version: u64,
    ) -> Commit
    where
        T: Send + 'static,
    {
        let mut store = self.store();
        let Some(state) = store
            .registry
            .get_mut(id)
            .and_then(|instance| instance.states.get_mut(slot))
            .and_then(Option::as_mut)
        else {
            return Commit::Gone;
        };
        if state.version != version {
            return Commit::Conflict;
        }
        state.value = Box::new(value);
        state.version += 1;
        Commit::Applied
    }

    pub(crate) fn write_state<T, F>(&self, id: ComponentId, slot: usize, mut f: F) -> bool
    where
        T: Clone + PartialEq + Send + 'static,
        F: FnMut(&T) -> T,
    {
        loop {
            let (current, version) = match self.read_state::<T>(id, slot) {
                Ok(Some(read)) => read,
                Ok(None) => {
                    tracing::warn!(component = %id, slot, "state setter called for an empty slot");
                    return false;
                }
                Err(HookError::ComponentDataMissing(_)) => {
                    tracing::warn!(
                        component = %id,
                        slot,
                        "state setter called for an unmounted component"
                    );
                    return false;
                }
                Err(err) => {
                    tracing::warn!(component = %id, slot, error = %err, "state setter rejected");
                    return false;
                }
            };
            let next = f(&current);
            if next == current {
                cov_mark::hit!(state_unchanged);
                return false;
            }
            match self.commit_state(id, slot, next, version) {
                Commit::Applied => break,
                Commit::Conflict => {
                    cov_mark::hit!(state_write_retried);
                    tracing::trace!(component = %id, slot, "state changed underneath setter");
                }
                Commit::Gone => {
                    tracing::warn!(
                        component = %id,
                        slot,
                        "component unmounted during state update"
                    );
                    return false;
                }
            }
        }
        self.schedule_update(id, self.update_priority())
    }

    fn park_write<T>(&self, id: ComponentId, slot: usize, value: T, priority: Priority) -> bool
    where
        T: PartialEq + Send + 'static,
    {
        {
            let mut store = self.store();
            let Some(state) = store
                .registry
                .get_mut(id)
                .and_then(|instance| instance.states.get_mut(slot))
                .and_then(Option::as_mut)
            else {
                tracing::warn!(component = %id, slot, "deferred write for an unmounted component");
                return false;
            };
            state.parked = Some(Box::new(move |current: &mut Box<dyn Any + Send>| {
                match current.downcast_mut::<T>() {
                    Some(current) if *current != value => {
                        *current = value;
                        true
                    }
                    _ => false,
                }
            }));
        }
        self.enqueue_job(Job::Apply { component: id, slot }, priority);
        true
    }
}

pub(crate) fn downcast_state<T: Clone + 'static>(
    value: &(dyn Any + Send),
    component: ComponentId,
    slot: usize,
) -> Result<T> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or(HookError::SlotTypeMismatch {
            component,
            slot,
            expected: type_name::<T>(),
        })
}
