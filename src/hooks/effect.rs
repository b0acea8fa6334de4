//! Effect hooks: `use_effect` and `use_layout_effect`.
//!
//! Both share one contract:
//!
//! - the first render always runs the effect;
//! - later renders run it only when the dependency list changed
//!   (`None` means "every render", an empty list means "mount only");
//! - the previous cleanup runs right before the effect runs again, and on
//!   unmount;
//! - a panicking effect or cleanup is logged and swallowed.
//!
//! They differ in timing. A passive effect is parked in its slot and runs
//! from the next flush. A layout effect runs synchronously inside the hook
//! call, so whatever it mutates is in place before the render returns.

use crate::deps::Deps;
use crate::engine::Engine;
use crate::error::{HookError, Result};
use crate::registry::{Cleanup, EffectFn, EffectRecord, slot_cell};
use crate::scheduler::Job;

/// What an effect body may return.
///
/// `()` means no cleanup; `Some(f)` registers `f`; `None::<fn()>` is the
/// explicit "no cleanup this time".
pub trait IntoCleanup {
    /// Convert into the stored cleanup, if any.
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl<F> IntoCleanup for Option<F>
where
    F: FnOnce() + Send + 'static,
{
    fn into_cleanup(self) -> Option<Cleanup> {
        self.map(|f| Box::new(f) as Cleanup)
    }
}

impl Engine {
    /// Run `effect` after the render, from the next flush.
    ///
    /// # Example
    ///
    /// ```ignore
    /// engine.use_effect(Some(deps![user_id]), move || {
    ///     let subscription = feed.subscribe(user_id);
    ///     Some(move || subscription.cancel())
    /// })?;
    /// ```
    pub fn use_effect<F, C>(&self, deps: Option<Deps>, effect: F) -> Result<()>
    where
        F: FnOnce() -> C + Send + 'static,
        C: IntoCleanup,
    {
        self.effect_hook("use_effect", deps, effect, false)
    }

    /// Run `effect` synchronously, before the render returns.
    pub fn use_layout_effect<F, C>(&self, deps: Option<Deps>, effect: F) -> Result<()>
    where
        F: FnOnce() -> C + Send + 'static,
        C: IntoCleanup,
    {
        self.effect_hook("use_layout_effect", deps, effect, true)
    }

    fn effect_hook<F, C>(
        &self,
        hook: &'static str,
        deps: Option<Deps>,
        effect: F,
        layout: bool,
    ) -> Result<()>
    where
        F: FnOnce() -> C + Send + 'static,
        C: IntoCleanup,
    {
        let (id, slot) = self.next_slot(hook)?;
        let effect: EffectFn = Box::new(move || effect().into_cleanup());

        let inline = {
            let mut guard = self.store();
            let store = &mut *guard;
            let instance = store
                .registry
                .get_mut(id)
                .ok_or(HookError::ComponentDataMissing(id))?;
            let cell = slot_cell(&mut instance.effects, slot);
            if let Some(record) = cell.as_ref() {
                if !store.deps_cache.compare(record.deps.as_ref(), deps.as_ref()) {
                    return Ok(());
                }
            }
            let record = cell.get_or_insert_with(|| EffectRecord {
                deps: None,
                cleanup: None,
                pending: None,
                layout,
            });
            record.deps = deps;
            record.layout = layout;
            if layout {
                Some((record.cleanup.take(), effect))
            } else {
                record.pending = Some(effect);
                None
            }
        };

        match inline {
            // Passive: the flush runs the previous cleanup and the new effect
            None => {
                tracing::trace!(component = %id, slot, "effect parked");
                let priority = self.inner.config.effect_priority;
                self.enqueue_job(Job::Effect { component: id, slot }, priority);
            }
            Some((previous, effect)) => {
                if let Some(cleanup) = previous {
                    self.run_cleanup(id, slot, cleanup);
                }
                let cleanup = self.run_effect(id, slot, effect);
                self.store_cleanup(id, slot, cleanup);
            }
        }
        Ok(())
    }
}
