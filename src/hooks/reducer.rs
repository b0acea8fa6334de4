//! Reducer hook: state driven by actions through a pure transition function.
//!
//! The state lives in a regular state slot as an `Arc<S>`. A reducer that
//! has nothing to change returns the `Arc` it was given, which the
//! dispatcher detects with [`Arc::ptr_eq`] and treats as a no-op, so no
//! `PartialEq` bound is needed on `S`.

use std::fmt;
use std::sync::Arc;

use crate::engine::{Engine, WeakEngine};
use crate::error::{HookError, Result};
use crate::hooks::state::Commit;
use crate::registry::ComponentId;

type ReducerFn<S, A> = Arc<dyn Fn(&Arc<S>, A) -> Arc<S> + Send + Sync>;

/// Sends actions to one reducer slot.
pub struct Dispatch<S, A> {
    engine: WeakEngine,
    component: ComponentId,
    slot: usize,
    reducer: ReducerFn<S, A>,
}

impl<S, A> Clone for Dispatch<S, A> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            component: self.component,
            slot: self.slot,
            reducer: self.reducer.clone(),
        }
    }
}

impl<S, A> fmt::Debug for Dispatch<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("component", &self.component)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl<S, A> Dispatch<S, A>
where
    S: Send + Sync + 'static,
    A: Clone,
{
    /// Run the reducer on the current state.
    ///
    /// Schedules a re-render unless the reducer returned the state it was
    /// given. Returns true if an update was scheduled. The reducer runs
    /// without any engine lock held; if another write lands on the slot
    /// meanwhile, it runs again on the newer state with a clone of `action`.
    pub fn dispatch(&self, action: A) -> bool {
        let Some(engine) = self.engine.upgrade() else {
            tracing::debug!(component = %self.component, "dispatch outlived its engine");
            return false;
        };
        let (component, slot) = (self.component, self.slot);
        loop {
            let (current, version) = match engine.read_state::<Arc<S>>(component, slot) {
                Ok(Some(read)) => read,
                Ok(None) | Err(HookError::ComponentDataMissing(_)) => {
                    tracing::warn!(
                        component = %component,
                        slot,
                        "dispatch to an unmounted component"
                    );
                    return false;
                }
                Err(err) => {
                    tracing::warn!(
                        component = %component,
                        slot,
                        error = %err,
                        "dispatch rejected"
                    );
                    return false;
                }
            };
            let next = (self.reducer)(&current, action.clone());
            if Arc::ptr_eq(&current, &next) {
                cov_mark::hit!(reducer_returned_same_state);
                return false;
            }
            match engine.commit_state(component, slot, next, version) {
                Commit::Applied => break,
                Commit::Conflict => {
                    cov_mark::hit!(dispatch_retried);
                }
                Commit::Gone => {
                    tracing::warn!(
                        component = %component,
                        slot,
                        "component unmounted during dispatch"
                    );
                    return false;
                }
            }
        }
        engine.schedule_update(component, engine.update_priority())
    }
}

impl Engine {
    /// State managed by `reducer`, starting from `init`.
    ///
    /// `init` is only used on the first render. The reducer of the latest
    /// render is the one later dispatches go through.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let (count, dispatch) = engine.use_reducer(
    ///     |count: &Arc<i64>, delta: i64| {
    ///         if delta == 0 { count.clone() } else { Arc::new(**count + delta) }
    ///     },
    ///     0,
    /// )?;
    /// dispatch.dispatch(1);
    /// ```
    pub fn use_reducer<S, A, R>(
        &self,
        reducer: R,
        init: S,
    ) -> Result<(Arc<S>, Dispatch<S, A>)>
    where
        S: Send + Sync + 'static,
        R: Fn(&Arc<S>, A) -> Arc<S> + Send + Sync + 'static,
    {
        let (id, slot) = self.next_slot("use_reducer")?;
        let state = self.state_or_init(id, slot, move || Arc::new(init))?;
        let dispatch = Dispatch {
            engine: self.downgrade(),
            component: id,
            slot,
            reducer: Arc::new(reducer),
        };
        Ok((state, dispatch))
    }
}
