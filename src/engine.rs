//! The engine: one store, one executor, and the host-facing lifecycle calls.
//!
//! An [`Engine`] is a cheap, clonable handle. Every piece of mutable state
//! (registry, context stack, scheduler queues, context broadcast values,
//! comparison cache) lives in one [`Store`] behind a single lock. The lock
//! is never held while user code runs: component functions, effects,
//! cleanups, update callbacks, reducers and initializers all run with the
//! store unlocked, so they are free to call back into the engine.
//!
//! Render passes are expected to happen on one thread at a time. State
//! setters and reducer dispatchers are `Send + Sync` and may be called from
//! anywhere; they only enqueue work.

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::broadcast::Broadcast;
use crate::context_stack::{ContextFrame, ContextStack};
use crate::deps::DepsCache;
use crate::error::{HookError, Result};
use crate::executor::Executor;
use crate::registry::{ComponentId, ComponentInstance, Registry, UpdateCallback};
use crate::scheduler::{Priority, Scheduler};

/// All mutable engine state.
#[derive(Default)]
pub(crate) struct Store {
    pub(crate) registry: Registry,
    pub(crate) stack: ContextStack,
    pub(crate) scheduler: Scheduler,
    pub(crate) broadcast: Broadcast,
    pub(crate) deps_cache: DepsCache,
    pub(crate) transition_depth: usize,
    pub(crate) next_hook_id: u64,
}

/// Priorities the engine assigns on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rank used by state setters, dispatchers and providers.
    ///
    /// Default: [`Priority::Normal`]
    pub update_priority: Priority,
    /// Rank used for updates made inside a transition.
    ///
    /// Default: [`Priority::Low`]
    pub transition_priority: Priority,
    /// Rank passive effects are flushed at.
    ///
    /// Default: [`Priority::Normal`]
    pub effect_priority: Priority,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            update_priority: Priority::Normal,
            transition_priority: Priority::Low,
            effect_priority: Priority::Normal,
        }
    }
}

/// Builder for an [`Engine`].
///
/// # Example
///
/// ```ignore
/// let executor = ManualExecutor::new();
/// let engine = Engine::builder(executor.clone())
///     .transition_priority(Priority::Idle)
///     .build();
/// ```
pub struct EngineBuilder {
    executor: Box<dyn Executor>,
    config: EngineConfig,
}

impl EngineBuilder {
    /// Start from the default configuration.
    pub fn new(executor: impl Executor) -> Self {
        Self {
            executor: Box::new(executor),
            config: EngineConfig::default(),
        }
    }

    /// Set the rank used by setters, dispatchers and providers.
    pub fn update_priority(mut self, priority: Priority) -> Self {
        self.config.update_priority = priority;
        self
    }

    /// Set the rank used inside transitions.
    pub fn transition_priority(mut self, priority: Priority) -> Self {
        self.config.transition_priority = priority;
        self
    }

    /// Set the rank passive effects run at.
    pub fn effect_priority(mut self, priority: Priority) -> Self {
        self.config.effect_priority = priority;
        self
    }

    /// Create the engine.
    pub fn build(self) -> Engine {
        Engine {
            inner: Arc::new(EngineInner {
                id: next_engine_id(),
                store: Mutex::new(Store::default()),
                executor: self.executor,
                config: self.config,
            }),
        }
    }
}

fn next_engine_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

pub(crate) struct EngineInner {
    /// Process-unique; stamped on every context token this engine creates.
    pub(crate) id: u64,
    store: Mutex<Store>,
    pub(crate) executor: Box<dyn Executor>,
    pub(crate) config: EngineConfig,
}

/// Handle to a hook engine.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

/// Non-owning handle held by setters and armed tasks.
#[derive(Clone)]
pub(crate) struct WeakEngine(Weak<EngineInner>);

impl WeakEngine {
    pub(crate) fn upgrade(&self) -> Option<Engine> {
        self.0.upgrade().map(|inner| Engine { inner })
    }
}

/// Restores the context stack when a render scope ends, even by panic.
pub struct RenderGuard<'a> {
    engine: &'a Engine,
}

impl Drop for RenderGuard<'_> {
    fn drop(&mut self) {
        self.engine.exit();
    }
}

impl Engine {
    /// Create an engine with the default configuration.
    pub fn new(executor: impl Executor) -> Self {
        EngineBuilder::new(executor).build()
    }

    /// Start configuring an engine.
    pub fn builder(executor: impl Executor) -> EngineBuilder {
        EngineBuilder::new(executor)
    }

    /// The configuration this engine was built with.
    pub fn config(&self) -> EngineConfig {
        self.inner.config
    }

    pub(crate) fn store(&self) -> MutexGuard<'_, Store> {
        self.inner.store.lock()
    }

    pub(crate) fn downgrade(&self) -> WeakEngine {
        WeakEngine(Arc::downgrade(&self.inner))
    }

    /// Begin a render pass for `id`.
    ///
    /// The active render, if any, is suspended with its cursor and resumed
    /// by the matching [`exit`](Self::exit). The instance is created on first
    /// entry. `update_callback` replaces any previously registered one.
    pub fn enter<F>(&self, id: ComponentId, update_callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.enter_with(id, Arc::new(update_callback));
    }

    /// [`enter`](Self::enter) with an already shared callback.
    pub fn enter_with(&self, id: ComponentId, update_callback: UpdateCallback) {
        let mut store = self.store();
        store.stack.push(id);
        let (instance, created) = store.registry.get_or_create(id);
        instance.callback = Some(update_callback);
        if created {
            tracing::debug!(component = %id, "component instance created");
        }
    }

    /// End the active render pass and resume the suspended one.
    ///
    /// Returns the component that was left, or None if nothing was rendering.
    pub fn exit(&self) -> Option<ComponentId> {
        let mut store = self.store();
        let Some(ContextFrame { component, cursor }) = store.stack.pop() else {
            tracing::debug!("exit called with no active render");
            return None;
        };
        if let Some(instance) = store.registry.get_mut(component) {
            instance.hook_count = cursor;
            instance.render_count += 1;
            instance.mounted = true;
        }
        if store.stack.depth() == 0 && !store.scheduler.flushing {
            store.deps_cache.evict();
        }
        Some(component)
    }

    /// Run `render` as the render pass of `id`.
    ///
    /// Equivalent to `enter`, `render()`, `exit`, except that the stack is
    /// restored even if `render` panics.
    pub fn render<F, R>(&self, id: ComponentId, update_callback: F, render: impl FnOnce() -> R) -> R
    where
        F: Fn() + Send + Sync + 'static,
    {
        let _guard = self.scope(id, update_callback);
        render()
    }

    /// [`enter`](Self::enter) and return a guard that exits on drop.
    pub fn scope<F>(&self, id: ComponentId, update_callback: F) -> RenderGuard<'_>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.enter(id, update_callback);
        RenderGuard { engine: self }
    }

    /// Component whose render pass is active.
    pub fn current_component(&self) -> Option<ComponentId> {
        self.store().stack.active().map(|frame| frame.component)
    }

    /// Active component together with its hook cursor.
    pub fn active_frame(&self) -> Option<ContextFrame> {
        self.store().stack.active()
    }

    /// Number of nested render passes in progress.
    pub fn render_depth(&self) -> usize {
        self.store().stack.depth()
    }

    /// Claim the next hook slot of the active render.
    pub(crate) fn next_slot(&self, hook: &'static str) -> Result<(ComponentId, usize)> {
        let mut store = self.store();
        let (id, slot) = store
            .stack
            .next_slot()
            .ok_or(HookError::OutsideContext { hook })?;
        if !store.registry.contains(id) {
            return Err(HookError::ComponentDataMissing(id));
        }
        Ok((id, slot))
    }

    /// Active component without claiming a slot.
    pub(crate) fn require_component(&self, hook: &'static str) -> Result<ComponentId> {
        let store = self.store();
        let frame = store.stack.active().ok_or(HookError::OutsideContext { hook })?;
        if !store.registry.contains(frame.component) {
            return Err(HookError::ComponentDataMissing(frame.component));
        }
        Ok(frame.component)
    }

    /// Remove `id`, running every stored effect cleanup in slot order.
    ///
    /// Pending jobs and context subscriptions of the component are dropped
    /// as well. Returns false if `id` was not registered.
    pub fn unmount(&self, id: ComponentId) -> bool {
        let instance = {
            let mut store = self.store();
            let Some(instance) = store.registry.remove(id) else {
                return false;
            };
            let dropped_jobs = store.scheduler.purge(id);
            let subscriptions = store.broadcast.unsubscribe_all(id);
            tracing::debug!(component = %id, dropped_jobs, subscriptions, "component unmounted");
            instance
        };
        self.run_cleanups(instance);
        true
    }

    fn run_cleanups(&self, mut instance: ComponentInstance) {
        for (slot, cleanup) in instance.take_cleanups() {
            self.run_cleanup(instance.id, slot, cleanup);
        }
        // Remaining closures (callback, parked effects) drop here, unlocked.
    }

    /// Enqueue every mounted instance at the update priority.
    ///
    /// Meant for environment changes every component has to observe.
    /// Returns the number of components scheduled.
    pub fn force_update_all(&self) -> usize {
        let ids: Vec<ComponentId> = self
            .store()
            .registry
            .iter()
            .filter(|instance| instance.mounted)
            .map(|instance| instance.id)
            .collect();
        let priority = self.update_priority();
        ids.into_iter()
            .filter(|&id| self.schedule_update(id, priority))
            .count()
    }

    /// Drop every instance, pending job and subscription.
    ///
    /// Cleanups are not run. Context tokens stay valid and keep their
    /// current values.
    pub fn reset(&self) {
        let instances = {
            let mut store = self.store();
            store.stack.clear();
            store.scheduler.clear();
            store.broadcast.clear_subscribers();
            store.deps_cache.evict();
            store.transition_depth = 0;
            store.registry.take()
        };
        tracing::debug!(dropped = instances.len(), "engine reset");
    }

    /// Number of registered instances.
    pub fn component_count(&self) -> usize {
        self.store().registry.len()
    }

    /// True if `id` has an instance.
    pub fn contains(&self, id: ComponentId) -> bool {
        self.store().registry.contains(id)
    }

    /// Priority for updates requested right now.
    pub(crate) fn update_priority(&self) -> Priority {
        if self.store().transition_depth > 0 {
            self.inner.config.transition_priority
        } else {
            self.inner.config.update_priority
        }
    }
}
