//! Transitions: marking updates as non-urgent.
//!
//! Inside [`Engine::start_transition`] the ambient update priority drops to
//! the configured transition priority (Low by default), so state setters,
//! dispatchers and providers called from the closure enqueue their renders
//! behind urgent work. Transitions nest; the priority is restored when the
//! outermost one ends, including by panic.

use std::fmt;

use crate::engine::{Engine, WeakEngine};
use crate::error::Result;
use crate::hooks::state::StateSetter;

struct TransitionGuard<'a> {
    engine: &'a Engine,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        let mut store = self.engine.store();
        store.transition_depth = store.transition_depth.saturating_sub(1);
    }
}

/// Starts transitions for one [`Engine::use_transition`] slot.
#[derive(Clone)]
pub struct StartTransition {
    engine: WeakEngine,
    pending: StateSetter<bool>,
}

impl fmt::Debug for StartTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartTransition")
            .field("component", &self.pending.component())
            .finish_non_exhaustive()
    }
}

impl StartTransition {
    /// Run `f` as a transition.
    ///
    /// The owning component's pending flag flips to true at the update
    /// priority and back to false at the transition priority, so the
    /// indicator clears in the same pass that applies the transition.
    pub fn start<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let engine = self.engine.upgrade()?;
        self.pending.set(true);
        let result = engine.start_transition(f);
        self.pending.defer(false, engine.config().transition_priority);
        Some(result)
    }
}

impl Engine {
    /// Run `f` with updates lowered to the transition priority.
    pub fn start_transition<R>(&self, f: impl FnOnce() -> R) -> R {
        self.store().transition_depth += 1;
        let _guard = TransitionGuard { engine: self };
        f()
    }

    /// True while a [`start_transition`](Self::start_transition) closure runs.
    pub fn in_transition(&self) -> bool {
        self.store().transition_depth > 0
    }

    /// Pending flag plus a handle that starts transitions.
    pub fn use_transition(&self) -> Result<(bool, StartTransition)> {
        let (id, slot) = self.next_slot("use_transition")?;
        let pending = self.state_or_init(id, slot, || false)?;
        let start = StartTransition {
            engine: self.downgrade(),
            pending: self.setter(id, slot),
        };
        Ok((pending, start))
    }

    /// A copy of `value` that lags behind during urgent renders.
    ///
    /// Returns the last adopted value. When `value` differs from it, adoption
    /// is deferred to a flush at the transition priority, which re-renders
    /// the component with the new value.
    pub fn use_deferred_value<T>(&self, value: T) -> Result<T>
    where
        T: Clone + PartialEq + Send + 'static,
    {
        let (id, slot) = self.next_slot("use_deferred_value")?;
        let adopted: T = self.state_or_init(id, slot, || value.clone())?;
        if adopted != value {
            self.setter::<T>(id, slot)
                .defer(value, self.inner.config.transition_priority);
        }
        Ok(adopted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ManualExecutor;
    use crate::registry::ComponentId;
    use crate::scheduler::Priority;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn transition_lowers_and_restores_update_priority() {
        let engine = Engine::new(ManualExecutor::new());
        let id = ComponentId::new();
        let (_, set) = engine.render(id, || {}, || engine.use_state_value(0)).unwrap();

        engine.start_transition(|| {
            assert!(engine.in_transition());
            engine.start_transition(|| set.set(1));
            assert!(engine.in_transition());
        });
        assert!(!engine.in_transition());
        assert_eq!(engine.pending_jobs_at(Priority::Low), 1);
        assert_eq!(engine.pending_jobs_at(Priority::Normal), 0);
    }

    #[test]
    fn transition_depth_survives_a_panic() {
        let engine = Engine::new(ManualExecutor::new());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            engine.start_transition(|| panic!("transition failed"))
        }));
        assert!(result.is_err());
        assert!(!engine.in_transition());
    }

    #[test]
    fn urgent_work_runs_before_the_transition() {
        let engine = Engine::new(ManualExecutor::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let urgent = ComponentId::new();
        let slow = ComponentId::new();

        let log = order.clone();
        let (_, set_urgent) = engine
            .render(urgent, move || log.lock().push("urgent"), || engine.use_state_value(0))
            .unwrap();
        let log = order.clone();
        let (_, set_slow) = engine
            .render(slow, move || log.lock().push("slow"), || engine.use_state_value(0))
            .unwrap();

        engine.start_transition(|| set_slow.set(1));
        set_urgent.set(1);
        engine.flush();
        assert_eq!(*order.lock(), vec!["urgent", "slow"]);
    }

    #[test]
    fn pending_flag_is_set_then_cleared_in_one_flush() {
        let engine = Engine::new(ManualExecutor::new());
        let id = ComponentId::new();
        let (pending, start) = engine.render(id, || {}, || engine.use_transition()).unwrap();
        assert!(!pending);

        assert_eq!(start.start(|| 7), Some(7));
        assert_eq!(engine.pending_jobs_at(Priority::Normal), 1);
        assert_eq!(engine.pending_jobs_at(Priority::Low), 1);
        let (pending, _) = engine.render(id, || {}, || engine.use_transition()).unwrap();
        assert!(pending);

        // Normal pass for `true`, then the low pass commits `false` and re-renders.
        assert_eq!(engine.flush(), 2);
        let (pending, _) = engine.render(id, || {}, || engine.use_transition()).unwrap();
        assert!(!pending);
    }

    #[test]
    fn deferred_value_lags_until_the_low_pass() {
        let engine = Engine::new(ManualExecutor::new());
        let id = ComponentId::new();
        let render = |query: &str| {
            engine
                .render(id, || {}, || engine.use_deferred_value(query.to_owned()))
                .unwrap()
        };

        assert_eq!(render("a"), "a");
        assert_eq!(render("ab"), "a");
        assert_eq!(engine.pending_jobs_at(Priority::Low), 1);

        engine.flush();
        assert_eq!(render("ab"), "ab");
        assert_eq!(engine.pending_jobs(), 0);
    }
}
