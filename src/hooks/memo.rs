//! Memoization hooks: `use_memo` and `use_callback`.

use std::sync::Arc;

use crate::deps::Deps;
use crate::engine::Engine;
use crate::error::{HookError, Result};
use crate::hooks::state::downcast_state;
use crate::registry::{MemoSlot, slot_cell};

impl Engine {
    /// Cache the result of `factory` until `deps` change.
    ///
    /// `factory` runs on the first render and whenever the dependency list
    /// differs from the one stored with the cached value. It runs without
    /// any engine lock held.
    pub fn use_memo<T, F>(&self, factory: F, deps: Option<Deps>) -> Result<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T,
    {
        let (id, slot) = self.next_slot("use_memo")?;
        {
            let mut guard = self.store();
            let store = &mut *guard;
            let instance = store
                .registry
                .get(id)
                .ok_or(HookError::ComponentDataMissing(id))?;
            if let Some(memo) = instance.memos.get(slot).and_then(Option::as_ref) {
                if !store.deps_cache.compare(memo.deps.as_ref(), deps.as_ref()) {
                    cov_mark::hit!(memo_reused);
                    return downcast_state(memo.value.as_ref(), id, slot);
                }
            }
        }

        let value = factory();
        let mut store = self.store();
        let instance = store
            .registry
            .get_mut(id)
            .ok_or(HookError::ComponentDataMissing(id))?;
        *slot_cell(&mut instance.memos, slot) = Some(MemoSlot {
            value: Box::new(value.clone()),
            deps,
        });
        Ok(value)
    }

    /// Keep the same `Arc` around `f` until `deps` change.
    ///
    /// Consumers can compare the result with [`Arc::ptr_eq`] to tell a new
    /// callback from the one they already hold.
    pub fn use_callback<F>(&self, f: F, deps: Option<Deps>) -> Result<Arc<F>>
    where
        F: Send + Sync + 'static,
    {
        self.use_memo(move || Arc::new(f), deps)
    }
}
