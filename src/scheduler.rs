//! Priority-bucketed batching of re-renders and passive effects.
//!
//! ## How it works
//!
//! 1. [`Engine::schedule_update`] marks the instance as needing an update
//!    and puts a render job into the pending set of the requested rank.
//! 2. The first job in an idle scheduler arms a flush through the
//!    [`Executor`](crate::Executor): Immediate work on the immediate queue,
//!    everything else on the frame queue. Further jobs ride along.
//! 3. [`Engine::flush`] always takes the next job from the highest
//!    non-empty rank. Jobs scheduled while flushing are picked up by the
//!    same flush, and Immediate work scheduled mid-flush preempts whatever
//!    lower rank was being drained. The flush ends when every rank is empty.
//!
//! Duplicate requests collapse: a rank holds each job at most once, and a
//! render job whose instance no longer needs an update is skipped. Order
//! inside one rank is insertion order, but callers must not rely on it.
//!
//! Update callbacks and effects run with the store unlocked, inside
//! `catch_unwind`. A panic is logged with the component id and the flush
//! moves on to the next job.

use std::panic::{AssertUnwindSafe, catch_unwind};

use indexmap::IndexSet;

use crate::engine::Engine;
use crate::error::panic_message;
use crate::hash::IdSet;
use crate::registry::{Cleanup, ComponentId, EffectFn};

/// Update priority ranks, highest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Runs at the next tick boundary and preempts every other rank.
    Immediate,
    /// User-blocking work.
    High,
    /// Default rank for state changes and passive effects.
    Normal,
    /// Transitions and deferred values.
    Low,
    /// Work nobody is waiting for.
    Idle,
}

impl Priority {
    /// All ranks in drain order.
    pub const ALL: [Priority; 5] = [
        Priority::Immediate,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Idle,
    ];

    fn rank(self) -> usize {
        self as usize
    }
}

/// Work item held in a rank's pending set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Job {
    /// Invoke the component's update callback.
    Render(ComponentId),
    /// Run the passive effect parked in `slot`.
    Effect { component: ComponentId, slot: usize },
    /// Apply the deferred write parked on state `slot`.
    Apply { component: ComponentId, slot: usize },
}

impl Job {
    fn component(self) -> ComponentId {
        match self {
            Job::Render(component)
            | Job::Effect { component, .. }
            | Job::Apply { component, .. } => component,
        }
    }
}

/// Which executor queue a flush has to be armed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Arm {
    Immediate,
    Frame,
}

#[derive(Default)]
pub(crate) struct Scheduler {
    ranks: [IdSet<Job>; 5],
    immediate_armed: bool,
    frame_armed: bool,
    pub(crate) flushing: bool,
}

impl Scheduler {
    /// Add `job` to the rank of `priority`.
    ///
    /// Returns the queue a flush must be armed on, or None if one already is.
    pub(crate) fn enqueue(&mut self, job: Job, priority: Priority) -> Option<Arm> {
        self.ranks[priority.rank()].insert(job);
        match priority {
            Priority::Immediate if !self.immediate_armed => {
                self.immediate_armed = true;
                Some(Arm::Immediate)
            }
            Priority::Immediate => None,
            _ if !self.frame_armed => {
                self.frame_armed = true;
                Some(Arm::Frame)
            }
            _ => None,
        }
    }

    pub(crate) fn disarm(&mut self, arm: Arm) {
        match arm {
            Arm::Immediate => self.immediate_armed = false,
            Arm::Frame => self.frame_armed = false,
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.immediate_armed || self.frame_armed
    }

    /// Take the oldest job of the highest non-empty rank.
    pub(crate) fn next_job(&mut self) -> Option<(Priority, Job)> {
        Priority::ALL.into_iter().find_map(|priority| {
            let rank = &mut self.ranks[priority.rank()];
            rank.shift_remove_index(0).map(|job| (priority, job))
        })
    }

    /// Drop every pending job that belongs to `component`.
    pub(crate) fn purge(&mut self, component: ComponentId) -> usize {
        let mut removed = 0;
        for rank in &mut self.ranks {
            let before = rank.len();
            rank.retain(|job| job.component() != component);
            removed += before - rank.len();
        }
        removed
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.ranks.iter().map(IndexSet::len).sum()
    }

    pub(crate) fn pending_at(&self, priority: Priority) -> usize {
        self.ranks[priority.rank()].len()
    }

    pub(crate) fn clear(&mut self) {
        for rank in &mut self.ranks {
            rank.clear();
        }
        self.immediate_armed = false;
        self.frame_armed = false;
    }
}

/// Resets the flushing flag even if a job escapes `catch_unwind`.
struct FlushGuard<'a> {
    engine: &'a Engine,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.engine.store().scheduler.flushing = false;
    }
}

impl Engine {
    /// Request a re-render of `id` at `priority`.
    ///
    /// Returns false if no instance exists for `id`. Repeated requests for
    /// the same id before the next flush collapse into one callback.
    pub fn schedule_update(&self, id: ComponentId, priority: Priority) -> bool {
        let arm = {
            let mut store = self.store();
            let Some(instance) = store.registry.get_mut(id) else {
                tracing::debug!(
                    component = %id,
                    ?priority,
                    "ignoring update for unknown component"
                );
                return false;
            };
            instance.needs_update = true;
            instance.update_scheduled = true;
            store.scheduler.enqueue(Job::Render(id), priority)
        };
        tracing::trace!(component = %id, ?priority, "update scheduled");
        if let Some(arm) = arm {
            self.arm(arm);
        }
        true
    }

    pub(crate) fn enqueue_job(&self, job: Job, priority: Priority) {
        let arm = self.store().scheduler.enqueue(job, priority);
        if let Some(arm) = arm {
            self.arm(arm);
        }
    }

    fn arm(&self, arm: Arm) {
        let engine = self.downgrade();
        let task = Box::new(move || {
            if let Some(engine) = engine.upgrade() {
                engine.store().scheduler.disarm(arm);
                engine.flush();
            }
        });
        match arm {
            Arm::Immediate => self.inner.executor.defer_immediate(task),
            Arm::Frame => self.inner.executor.defer_frame(task),
        }
    }

    /// Drain every rank, highest first, until nothing is pending.
    ///
    /// Returns the number of update callbacks invoked. Calling `flush` from
    /// inside a running flush is a no-op; the outer flush picks the work up.
    pub fn flush(&self) -> usize {
        {
            let mut store = self.store();
            if store.scheduler.flushing {
                cov_mark::hit!(flush_reentrant_call);
                return 0;
            }
            store.scheduler.flushing = true;
            store.deps_cache.evict();
            tracing::trace!(render_pass = store.deps_cache.token(), "flush started");
        }
        let _guard = FlushGuard { engine: self };

        let mut rendered = 0;
        loop {
            let Some((priority, job)) = self.store().scheduler.next_job() else {
                break;
            };
            match job {
                Job::Render(component) => {
                    if self.run_render_job(component, priority) {
                        rendered += 1;
                    }
                }
                Job::Effect { component, slot } => self.run_effect_job(component, slot),
                Job::Apply { component, slot } => self.run_apply_job(component, slot, priority),
            }
        }
        tracing::trace!(rendered, "flush complete");
        rendered
    }

    /// True while a flush is armed on the executor and has not run yet.
    pub fn is_flush_armed(&self) -> bool {
        self.store().scheduler.is_armed()
    }

    /// Number of jobs waiting across all ranks.
    pub fn pending_jobs(&self) -> usize {
        self.store().scheduler.pending_len()
    }

    /// Number of jobs waiting at one rank.
    pub fn pending_jobs_at(&self, priority: Priority) -> usize {
        self.store().scheduler.pending_at(priority)
    }

    fn run_render_job(&self, id: ComponentId, priority: Priority) -> bool {
        let (callback, checkpoint) = {
            let mut store = self.store();
            let checkpoint = store.stack.checkpoint();
            let Some(instance) = store.registry.get_mut(id) else {
                tracing::debug!(component = %id, "dropping render for unmounted component");
                return false;
            };
            if !instance.needs_update {
                cov_mark::hit!(render_job_already_handled);
                return false;
            }
            instance.needs_update = false;
            instance.update_scheduled = false;
            let Some(callback) = instance.callback.clone() else {
                tracing::debug!(component = %id, "no update callback registered");
                return false;
            };
            (callback, checkpoint)
        };

        tracing::trace!(component = %id, ?priority, "running update callback");
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback())) {
            let unwound = self.store().stack.unwind_to(checkpoint);
            tracing::error!(
                component = %id,
                ?priority,
                unwound_frames = unwound,
                panic = panic_message(payload.as_ref()),
                "update callback panicked"
            );
        }
        true
    }

    fn run_effect_job(&self, id: ComponentId, slot: usize) {
        let (effect, previous_cleanup) = {
            let mut store = self.store();
            let Some(record) = store
                .registry
                .get_mut(id)
                .and_then(|instance| instance.effects.get_mut(slot))
                .and_then(Option::as_mut)
            else {
                tracing::debug!(component = %id, slot, "dropping effect for unmounted component");
                return;
            };
            let Some(effect) = record.pending.take() else {
                return;
            };
            (effect, record.cleanup.take())
        };

        if let Some(cleanup) = previous_cleanup {
            self.run_cleanup(id, slot, cleanup);
        }
        let cleanup = self.run_effect(id, slot, effect);
        self.store_cleanup(id, slot, cleanup);
    }

    fn run_apply_job(&self, id: ComponentId, slot: usize, priority: Priority) {
        let changed = {
            let mut store = self.store();
            let Some(state) = store
                .registry
                .get_mut(id)
                .and_then(|instance| instance.states.get_mut(slot))
                .and_then(Option::as_mut)
            else {
                return;
            };
            let Some(write) = state.parked.take() else {
                return;
            };
            let changed = write(&mut state.value);
            if changed {
                state.version += 1;
            }
            changed
        };
        if changed {
            self.schedule_update(id, priority);
        }
    }

    /// Run an effect body at the effect boundary.
    pub(crate) fn run_effect(
        &self,
        id: ComponentId,
        slot: usize,
        effect: EffectFn,
    ) -> Option<Cleanup> {
        match catch_unwind(AssertUnwindSafe(effect)) {
            Ok(cleanup) => cleanup,
            Err(payload) => {
                tracing::error!(
                    component = %id,
                    slot,
                    panic = panic_message(payload.as_ref()),
                    "effect panicked"
                );
                None
            }
        }
    }

    /// Run a cleanup at the effect boundary.
    pub(crate) fn run_cleanup(&self, id: ComponentId, slot: usize, cleanup: Cleanup) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(cleanup)) {
            tracing::error!(
                component = %id,
                slot,
                panic = panic_message(payload.as_ref()),
                "effect cleanup panicked"
            );
        }
    }

    /// Store a fresh cleanup; runs it right away if the slot is gone.
    pub(crate) fn store_cleanup(&self, id: ComponentId, slot: usize, cleanup: Option<Cleanup>) {
        let Some(cleanup) = cleanup else {
            return;
        };
        let orphan = {
            let mut store = self.store();
            match store
                .registry
                .get_mut(id)
                .and_then(|instance| instance.effects.get_mut(slot))
                .and_then(Option::as_mut)
            {
                Some(record) => {
                    record.cleanup = Some(cleanup);
                    None
                }
                None => Some(cleanup),
            }
        };
        if let Some(cleanup) = orphan {
            tracing::debug!(component = %id, slot, "component unmounted while its effect ran");
            self.run_cleanup(id, slot, cleanup);
        }
    }
}
